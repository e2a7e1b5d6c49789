//! Job orchestration: the solve runs on a worker thread behind a
//! `JobHandle`; `wait` blocks up to a timeout and then requests
//! termination through an atomic cancellation flag polled by the backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::model::{Model, Stage};
use crate::results::{FieldOutput, ResultDatabase, DEFAULT_FIELD_OUTPUTS};
use crate::solver::{self, StepFrame};

/// Attempts per solve when the backend reports a license shortage.
const DEFAULT_LICENSE_RETRIES: usize = 3;

/// Submission parameters for one analysis job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub num_cpus: usize,
    pub memory_mb: usize,
    pub max_license_retries: usize,
    pub field_outputs: Vec<FieldOutput>,
}

impl JobSpec {
    pub fn new(name: &str) -> JobSpec {
        JobSpec {
            name: name.to_owned(),
            num_cpus: 1,
            memory_mb: 2048,
            max_license_retries: DEFAULT_LICENSE_RETRIES,
            field_outputs: DEFAULT_FIELD_OUTPUTS.to_vec(),
        }
    }
}

/// A solve backend. The in-process solver is the default; the trait seam
/// exists so a remote or licensed solver can slot in behind the same job
/// surface.
pub trait SolverBackend: Send + Sync {
    fn solve(&self, model: &Model, cancel: &AtomicBool) -> Result<Vec<StepFrame>>;
}

pub struct InProcessSolver;

impl SolverBackend for InProcessSolver {
    fn solve(&self, model: &Model, cancel: &AtomicBool) -> Result<Vec<StepFrame>> {
        solver::run(model, cancel)
    }
}

/// Handle to a running job.
#[derive(Debug)]
pub struct JobHandle {
    name: String,
    cancel: Arc<AtomicBool>,
    receiver: mpsc::Receiver<Result<ResultDatabase>>,
    worker: thread::JoinHandle<()>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests termination; the backend reports `Killed` once it notices.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Blocks until the job finishes or the timeout elapses.
    ///
    /// On timeout the backend is signalled to stop and the job reports
    /// `Timeout`; the worker is left to wind down on its own.
    pub fn wait(self, timeout: Duration) -> Result<ResultDatabase> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => {
                let _ = self.worker.join();
                outcome
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.cancel.store(true, Ordering::Relaxed);
                Err(PipelineError::Timeout(format!(
                    "job '{}' exceeded {:.1} s",
                    self.name,
                    timeout.as_secs_f64()
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(PipelineError::Killed(format!(
                "job '{}': worker thread died",
                self.name
            ))),
        }
    }
}

fn check_complete(model: &Model) -> Result<()> {
    model.require_at_least(Stage::Meshed, "submit")?;
    if model.meshes.is_empty() {
        return Err(PipelineError::IncompleteModel(
            "model has no generated mesh".to_owned(),
        ));
    }
    if model.steps.is_empty() {
        return Err(PipelineError::IncompleteModel(
            "model has no analysis step".to_owned(),
        ));
    }
    if model.boundary_conditions.is_empty() {
        return Err(PipelineError::IncompleteModel(
            "model has no boundary condition".to_owned(),
        ));
    }
    Ok(())
}

/// Solve loop run on the worker; only `LicenseUnavailable` is retried.
fn solve_with_retries(
    backend: &dyn SolverBackend,
    model: &Model,
    spec: &JobSpec,
    cancel: &AtomicBool,
) -> Result<Vec<StepFrame>> {
    let mut attempt = 0;
    loop {
        match backend.solve(model, cancel) {
            Ok(frames) => return Ok(frames),
            Err(err) if err.is_retryable() && attempt < spec.max_license_retries => {
                attempt += 1;
                println!(
                    "warning: job '{}': {} (retry {}/{})",
                    spec.name, err, attempt, spec.max_license_retries
                );
            }
            Err(err) => return Err(err),
        }
    }
}

/// Submits the model for solving on a worker thread.
///
/// # Arguments
/// * `model` - A fully staged model; it advances to `Submitted`
/// * `spec` - Job parameters
/// * `backend` - The solve backend
///
/// # Returns
/// A handle whose `wait` yields the result database.
pub fn submit(
    model: &mut Model,
    spec: JobSpec,
    backend: Arc<dyn SolverBackend>,
) -> Result<JobHandle> {
    check_complete(model)?;
    model.advance(Stage::Submitted);
    println!(
        "info: submitted job '{}' ({} cpus, {} MB)",
        spec.name, spec.num_cpus, spec.memory_mb
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = mpsc::channel();
    let worker_model = model.clone();
    let worker_cancel = Arc::clone(&cancel);
    let name = spec.name.clone();
    let worker = thread::spawn(move || {
        let outcome = solve_with_retries(backend.as_ref(), &worker_model, &spec, &worker_cancel)
            .map(|frames| {
                ResultDatabase::from_frames(&worker_model, frames, &spec.field_outputs)
            });
        let _ = sender.send(outcome);
    });

    Ok(JobHandle {
        name,
        cancel,
        receiver,
        worker,
    })
}

/// Submits, waits, and advances the model to `Solved`.
pub fn run_job(
    model: &mut Model,
    spec: JobSpec,
    backend: Arc<dyn SolverBackend>,
    timeout: Duration,
) -> Result<ResultDatabase> {
    let handle = submit(model, spec, backend)?;
    let name = handle.name().to_owned();
    let database = handle.wait(timeout)?;
    model.advance(Stage::Solved);
    println!("info: job '{}' solved", name);
    Ok(database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{self, DofMask};
    use crate::geom::Point;
    use crate::mesh::{self, ElementType, Seeding};
    use crate::model::INITIAL_STEP;
    use crate::part::{EntityKind, Part, Profile, SketchPrimitive};
    use crate::properties::{self, Material, Section, SectionKind};

    fn staged_model() -> Model {
        let profile = Profile::new(vec![
            SketchPrimitive::Line {
                a: [0.0, 0.0],
                b: [1.0, 1.0],
            },
            SketchPrimitive::Line {
                a: [1.0, 1.0],
                b: [2.0, 0.0],
            },
        ]);
        let mut model = Model::new("job-test");
        model
            .add_part(Part::base_wire("Frame", &profile).unwrap())
            .unwrap();
        model
            .add_material(Material::new("steel", 7800.0, 200e9, 0.29).unwrap())
            .unwrap();
        model
            .add_section(Section::new("rod", "steel", SectionKind::Truss { area: 1e-4 }).unwrap())
            .unwrap();
        model
            .define_region(
                "members",
                "Frame",
                EntityKind::Edge,
                vec![Point::new(0.5, 0.5, 0.0), Point::new(1.5, 0.5, 0.0)],
            )
            .unwrap();
        model
            .define_region(
                "supports",
                "Frame",
                EntityKind::Vertex,
                vec![Point::new(0.0, 0.0, 0.0), Point::new(2.0, 0.0, 0.0)],
            )
            .unwrap();
        properties::assign_section(&mut model, "members", "rod").unwrap();
        model.add_step("Loading", INITIAL_STEP).unwrap();
        constraints::add_boundary_condition(
            &mut model,
            "pins",
            INITIAL_STEP,
            "supports",
            DofMask::encastre(),
        )
        .unwrap();
        mesh::set_mesh_spec(
            &mut model,
            "members",
            ElementType::Bar2,
            Seeding::ByNumber { count: 1 },
        )
        .unwrap();
        mesh::generate_mesh(&mut model).unwrap();
        model
    }

    /// Flaky backend: fails with a license shortage a fixed number of
    /// times before delegating to the real solver.
    struct FlakyBackend {
        failures: std::sync::atomic::AtomicUsize,
    }

    impl SolverBackend for FlakyBackend {
        fn solve(&self, model: &Model, cancel: &AtomicBool) -> Result<Vec<StepFrame>> {
            if self.failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(PipelineError::LicenseUnavailable(
                    "no seats left".to_owned(),
                ));
            }
            solver::run(model, cancel)
        }
    }

    struct StallingBackend;

    impl SolverBackend for StallingBackend {
        fn solve(&self, _model: &Model, cancel: &AtomicBool) -> Result<Vec<StepFrame>> {
            while !cancel.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(5));
            }
            Err(PipelineError::Killed("solve cancelled".to_owned()))
        }
    }

    #[test]
    fn run_job_solves_and_advances() {
        let mut model = staged_model();
        let db = run_job(
            &mut model,
            JobSpec::new("static"),
            Arc::new(InProcessSolver),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(model.stage(), Stage::Solved);
        assert_eq!(db.steps.len(), 1);
        assert_eq!(db.steps[0].name, "Loading");
        assert_eq!(db.nodes.len(), 3);
    }

    #[test]
    fn license_shortage_is_retried() {
        let mut model = staged_model();
        let backend = Arc::new(FlakyBackend {
            failures: std::sync::atomic::AtomicUsize::new(2),
        });
        let db = run_job(
            &mut model,
            JobSpec::new("flaky"),
            backend,
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(db.steps.len(), 1);
    }

    #[test]
    fn license_retries_are_bounded() {
        let mut model = staged_model();
        let backend = Arc::new(FlakyBackend {
            failures: std::sync::atomic::AtomicUsize::new(100),
        });
        let mut spec = JobSpec::new("hopeless");
        spec.max_license_retries = 2;
        let err = run_job(&mut model, spec, backend, Duration::from_secs(30)).unwrap_err();
        assert!(matches!(err, PipelineError::LicenseUnavailable(_)));
    }

    #[test]
    fn timeout_cancels_the_backend() {
        let mut model = staged_model();
        let handle = submit(
            &mut model,
            JobSpec::new("stuck"),
            Arc::new(StallingBackend),
        )
        .unwrap();
        let err = handle.wait(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }

    #[test]
    fn explicit_cancel_reports_killed() {
        let mut model = staged_model();
        let handle = submit(
            &mut model,
            JobSpec::new("cancelled"),
            Arc::new(StallingBackend),
        )
        .unwrap();
        handle.cancel();
        let err = handle.wait(Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, PipelineError::Killed(_)));
    }

    #[test]
    fn unmeshed_model_is_incomplete() {
        let profile = Profile::new(vec![SketchPrimitive::Line {
            a: [0.0, 0.0],
            b: [1.0, 0.0],
        }]);
        let mut model = Model::new("bare");
        model
            .add_part(Part::base_wire("Bar", &profile).unwrap())
            .unwrap();
        let err = submit(
            &mut model,
            JobSpec::new("early"),
            Arc::new(InProcessSolver),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidStageTransition { .. }));
    }
}
