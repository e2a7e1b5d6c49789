//! Error taxonomy for the model-authoring pipeline.
//!
//! Build-time errors (geometry through meshing) are fatal: the pipeline
//! halts and reports the offending region or point. Job-time errors are
//! terminal except for [`PipelineError::LicenseUnavailable`], which the
//! orchestrator retries a bounded number of times.

use thiserror::Error;

use crate::part::EntityKind;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed or self-intersecting profile, bad build parameters.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// No entity of the requested kind near the query point.
    #[error("no {kind} found at ({x:.6}, {y:.6}, {z:.6}) within tolerance {tolerance:e}")]
    NotFound {
        kind: EntityKind,
        x: f64,
        y: f64,
        z: f64,
        tolerance: f64,
    },

    /// More than one entity matched the query at the same distance.
    #[error(
        "ambiguous query: {count} {kind} entities tie at ({x:.6}, {y:.6}, {z:.6}); \
         refine the point or tolerance"
    )]
    AmbiguousQuery {
        kind: EntityKind,
        x: f64,
        y: f64,
        z: f64,
        count: usize,
    },

    /// An entity id issued before a partition was dereferenced afterward.
    #[error(
        "stale {kind} id from topology generation {issued} dereferenced at generation {current}; \
         re-resolve from the representative point"
    )]
    StaleEntity {
        kind: EntityKind,
        issued: u64,
        current: u64,
    },

    /// A re-issued partition could not be proven equivalent to an earlier one.
    #[error("duplicate partition: {0}")]
    DuplicatePartition(String),

    /// Section structural type does not match the region's entity kind.
    #[error("section '{section}' does not match region '{region}': {detail}")]
    SectionTypeMismatch {
        section: String,
        region: String,
        detail: String,
    },

    /// The region (or an entity inside it) already carries a section.
    #[error("region '{region}' already carries a section assignment")]
    OverlappingAssignment { region: String },

    /// Two constraints prescribe the same degree of freedom in one step.
    #[error(
        "dof conflict in step '{step}': dof {dof} of region '{region}' is already \
         constrained by '{existing}'"
    )]
    DofConflict {
        step: String,
        region: String,
        dof: &'static str,
        existing: String,
    },

    /// Contact surface orientation could not be reconciled.
    #[error("normal mismatch between master '{master}' and slave '{slave}': {detail}")]
    NormalMismatch {
        master: String,
        slave: String,
        detail: String,
    },

    /// A propertied region cannot be meshed as directed.
    #[error("unmeshable region '{region}': {reason}")]
    UnmeshableRegion { region: String, reason: String },

    /// A model was submitted before all stages completed.
    #[error("incomplete model: {0}")]
    IncompleteModel(String),

    /// A later-stage operation was called before its prerequisite stage.
    #[error("invalid stage transition: {operation} requires {required}, model is at {current}")]
    InvalidStageTransition {
        operation: String,
        required: &'static str,
        current: &'static str,
    },

    /// The solver failed to converge on the assembled system.
    #[error("solver divergence: {0}")]
    SolverDivergence(String),

    /// No solver license was available; retried by the orchestrator.
    #[error("solver license unavailable: {0}")]
    LicenseUnavailable(String),

    /// The job did not complete within the caller's timeout.
    #[error("job timed out: {0}")]
    Timeout(String),

    /// The job was cancelled and the solver terminated.
    #[error("job killed: {0}")]
    Killed(String),

    /// Any other diagnostic surfaced by the solver backend.
    #[error("solver error: {0}")]
    Solver(String),

    /// Malformed structured input (json or svg).
    #[error("input error: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the job orchestrator may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::LicenseUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_license_errors_are_retryable() {
        assert!(PipelineError::LicenseUnavailable("seat pool empty".into()).is_retryable());
        assert!(!PipelineError::SolverDivergence("nan residual".into()).is_retryable());
        assert!(!PipelineError::Timeout("JobA exceeded 30 s".into()).is_retryable());
    }

    #[test]
    fn not_found_names_the_point() {
        let err = PipelineError::NotFound {
            kind: EntityKind::Face,
            x: 0.5,
            y: 0.2,
            z: 0.0,
            tolerance: 1e-4,
        };
        let msg = err.to_string();
        assert!(msg.contains("face"));
        assert!(msg.contains("0.500000"));
    }
}
