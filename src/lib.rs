//! Parametric FEA model authoring: staged pipeline from sketched parts
//! through partitioning, properties, constraints, and meshing to an
//! in-process linear static solve.

pub mod constraints;
pub mod elements;
pub mod error;
pub mod geom;
pub mod input;
pub mod job;
pub mod mesh;
pub mod model;
pub mod part;
pub mod partition;
pub mod properties;
pub mod resolver;
pub mod results;
pub mod solver;

pub use error::{PipelineError, Result};
pub use model::{Model, Stage};
