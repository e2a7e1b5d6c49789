//! Result database: nodal and element fields per solved step, persisted
//! as JSON.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::geom::Point;
use crate::model::Model;
use crate::solver::{self, StepFrame};

/// Output fields a job may request into the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOutput {
    Displacement,
    Reaction,
    Stress,
    Strain,
}

pub const DEFAULT_FIELD_OUTPUTS: [FieldOutput; 4] = [
    FieldOutput::Displacement,
    FieldOutput::Reaction,
    FieldOutput::Stress,
    FieldOutput::Strain,
];

/// One result frame of a step. Fields not requested by the job are left
/// empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub time: f64,
    pub displacement: Vec<[f64; 3]>,
    pub reaction: Vec<[f64; 3]>,
    pub stress: Vec<f64>,
    pub strain: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultDatabase {
    pub model: String,
    /// Global node coordinates, in solve order.
    pub nodes: Vec<[f64; 3]>,
    pub steps: Vec<StepResult>,
}

impl ResultDatabase {
    /// Collects solver frames into a database, keeping only the requested
    /// fields. The linear static backend produces one frame per step, at
    /// step time 1.0.
    pub fn from_frames(
        model: &Model,
        frames: Vec<StepFrame>,
        fields: &[FieldOutput],
    ) -> ResultDatabase {
        let keep = |f: FieldOutput| fields.contains(&f);
        let nodes = solver::global_nodes(model)
            .iter()
            .map(|p| [p.x, p.y, p.z])
            .collect();
        let steps = frames
            .into_iter()
            .map(|frame| StepResult {
                name: frame.step,
                frames: vec![Frame {
                    time: 1.0,
                    displacement: if keep(FieldOutput::Displacement) {
                        frame.displacement
                    } else {
                        Vec::new()
                    },
                    reaction: if keep(FieldOutput::Reaction) {
                        frame.reaction
                    } else {
                        Vec::new()
                    },
                    stress: if keep(FieldOutput::Stress) {
                        frame.stress
                    } else {
                        Vec::new()
                    },
                    strain: if keep(FieldOutput::Strain) {
                        frame.strain
                    } else {
                        Vec::new()
                    },
                }],
            })
            .collect();
        ResultDatabase {
            model: model.name.clone(),
            nodes,
            steps,
        }
    }

    /// Writes the database as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|err| PipelineError::Input(format!("failed to write results: {err}")))?;
        println!("info: wrote result database to {}", path.display());
        Ok(())
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Largest displacement magnitude across all steps and frames.
    pub fn max_displacement_magnitude(&self) -> Option<f64> {
        self.steps
            .iter()
            .flat_map(|s| &s.frames)
            .flat_map(|f| &f.displacement)
            .map(|u| (u[0] * u[0] + u[1] * u[1] + u[2] * u[2]).sqrt())
            .fold(None, |acc: Option<f64>, m| {
                Some(acc.map_or(m, |a| a.max(m)))
            })
    }

    /// Index of the node closest to a query point.
    pub fn node_nearest(&self, point: &Point) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, n) in self.nodes.iter().enumerate() {
            let d = (Point::new(n[0], n[1], n[2]) - point).norm();
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best.map(|(i, _)| i)
    }
}

/// Loads a previously saved result database.
pub fn open(path: &Path) -> Result<ResultDatabase> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|err| PipelineError::Input(format!("failed to read results: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultDatabase {
        ResultDatabase {
            model: "sample".to_owned(),
            nodes: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            steps: vec![StepResult {
                name: "Loading".to_owned(),
                frames: vec![Frame {
                    time: 1.0,
                    displacement: vec![[0.0, 0.0, 0.0], [3.0, 4.0, 0.0]],
                    reaction: vec![[0.0, -5.0, 0.0], [0.0, 0.0, 0.0]],
                    stress: vec![2.5],
                    strain: vec![1e-5],
                }],
            }],
        }
    }

    #[test]
    fn save_and_open_round_trip() {
        let db = sample();
        let path = std::env::temp_dir().join("olivine_results_test.json");
        db.save(&path).unwrap();
        let loaded = open(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.model, "sample");
        assert_eq!(loaded.nodes.len(), 2);
        let step = loaded.step("Loading").unwrap();
        assert_eq!(step.frames[0].displacement[1], [3.0, 4.0, 0.0]);
    }

    #[test]
    fn max_displacement_is_the_largest_magnitude() {
        let db = sample();
        let max = db.max_displacement_magnitude().unwrap();
        assert!((max - 5.0).abs() < 1e-12);
    }

    #[test]
    fn nearest_node_lookup() {
        let db = sample();
        assert_eq!(db.node_nearest(&Point::new(0.9, 0.1, 0.0)), Some(1));
        assert_eq!(db.node_nearest(&Point::new(-1.0, 0.0, 0.0)), Some(0));
    }
}
