//! The model context: parts, named regions, layered definitions, and the
//! forward-only stage machine that keeps pipeline calls in order.
//!
//! There is no global registry; a `Model` value is threaded explicitly
//! through every pipeline call and has a single owner.

use std::collections::HashMap;

use crate::constraints::{BoundaryCondition, ContactProperty, Interaction, Load};
use crate::error::{PipelineError, Result};
use crate::geom::{Plane, Point};
use crate::mesh::{EdgeSeed, Mesh, MeshSpec};
use crate::part::{EntityId, EntityKind, Part};
use crate::partition;
use crate::properties::{Material, Section, SectionAssignment};
use crate::resolver::{self, DEFAULT_TOLERANCE};

/// Pipeline stage. Ordered; the model only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Defined,
    Partitioned,
    Propertied,
    Constrained,
    Meshed,
    Submitted,
    Solved,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Defined => "defined",
            Stage::Partitioned => "partitioned",
            Stage::Propertied => "propertied",
            Stage::Constrained => "constrained",
            Stage::Meshed => "meshed",
            Stage::Submitted => "submitted",
            Stage::Solved => "solved",
        }
    }
}

/// What happens when a later-step boundary condition touches a dof already
/// prescribed in the initial step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverridePolicy {
    /// Reject the conflicting condition.
    #[default]
    Forbid,
    /// The later step's value replaces the inherited one.
    Replace,
}

/// A named, ordered set of representative query points of one entity kind.
///
/// Regions never cache entity ids; they re-resolve their points against the
/// part's current topology every time they are used, which is what keeps
/// them valid across partitions.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub part: String,
    pub kind: EntityKind,
    pub points: Vec<Point>,
}

impl Region {
    pub fn resolve(&self, part: &Part, tolerance: f64) -> Result<Vec<EntityId>> {
        self.points
            .iter()
            .map(|p| resolver::resolve(part, self.kind, p, tolerance))
            .collect()
    }
}

/// An analysis step in the linear predecessor chain rooted at "Initial".
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub previous: String,
}

pub const INITIAL_STEP: &str = "Initial";

#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub parts: Vec<Part>,
    pub regions: Vec<Region>,
    pub materials: Vec<Material>,
    pub sections: Vec<Section>,
    pub assignments: Vec<SectionAssignment>,
    pub steps: Vec<Step>,
    pub boundary_conditions: Vec<BoundaryCondition>,
    pub loads: Vec<Load>,
    pub contact_properties: Vec<ContactProperty>,
    pub interactions: Vec<Interaction>,
    pub mesh_specs: Vec<MeshSpec>,
    pub edge_seeds: Vec<EdgeSeed>,
    pub meshes: Vec<Mesh>,
    pub override_policy: OverridePolicy,
    pub tolerance: f64,
    stage: Stage,
}

impl Model {
    pub fn new(name: &str) -> Model {
        Model {
            name: name.to_owned(),
            parts: Vec::new(),
            regions: Vec::new(),
            materials: Vec::new(),
            sections: Vec::new(),
            assignments: Vec::new(),
            steps: Vec::new(),
            boundary_conditions: Vec::new(),
            loads: Vec::new(),
            contact_properties: Vec::new(),
            interactions: Vec::new(),
            mesh_specs: Vec::new(),
            edge_seeds: Vec::new(),
            meshes: Vec::new(),
            override_policy: OverridePolicy::default(),
            tolerance: DEFAULT_TOLERANCE,
            stage: Stage::Defined,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Moves the stage forward; never backward.
    pub fn advance(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    /// Fails when the pipeline has already moved past the stage window an
    /// operation is allowed in.
    pub fn require_at_most(&self, stage: Stage, operation: &str) -> Result<()> {
        if self.stage > stage {
            return Err(PipelineError::InvalidStageTransition {
                operation: operation.to_owned(),
                required: stage.name(),
                current: self.stage.name(),
            });
        }
        Ok(())
    }

    /// Fails when an operation runs before its prerequisite stage.
    pub fn require_at_least(&self, stage: Stage, operation: &str) -> Result<()> {
        if self.stage < stage {
            return Err(PipelineError::InvalidStageTransition {
                operation: operation.to_owned(),
                required: stage.name(),
                current: self.stage.name(),
            });
        }
        Ok(())
    }

    pub fn add_part(&mut self, part: Part) -> Result<()> {
        self.require_at_most(Stage::Partitioned, "add_part")?;
        if self.parts.iter().any(|p| p.name == part.name) {
            return Err(PipelineError::Input(format!(
                "duplicate part name '{}'",
                part.name
            )));
        }
        println!(
            "info: added part '{}' to model '{}'",
            part.name, self.name
        );
        self.parts.push(part);
        Ok(())
    }

    pub fn part(&self, name: &str) -> Result<&Part> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| PipelineError::Input(format!("no part named '{}'", name)))
    }

    pub fn part_mut(&mut self, name: &str) -> Result<&mut Part> {
        self.parts
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| PipelineError::Input(format!("no part named '{}'", name)))
    }

    /// Splits a face of `part_name` along the chord `a -> b` and returns
    /// the derived sub-faces. Forbidden once properties are layered.
    pub fn partition_face_by_path(
        &mut self,
        part_name: &str,
        face_point: &Point,
        a: &Point,
        b: &Point,
    ) -> Result<Vec<EntityId>> {
        self.require_at_most(Stage::Partitioned, "partition_face_by_path")?;
        let tolerance = self.tolerance;
        let part = self.part_mut(part_name)?;
        let derived = partition::partition_face_by_path(part, face_point, a, b, tolerance)?;
        self.advance(Stage::Partitioned);
        Ok(derived)
    }

    /// Splits a cell of `part_name` with a datum plane and returns the
    /// derived sub-cells. Forbidden once properties are layered.
    pub fn partition_cell_by_plane(
        &mut self,
        part_name: &str,
        plane: &Plane,
        cell_point: &Point,
    ) -> Result<Vec<EntityId>> {
        self.require_at_most(Stage::Partitioned, "partition_cell_by_plane")?;
        let tolerance = self.tolerance;
        let part = self.part_mut(part_name)?;
        let derived = partition::partition_cell_by_plane(part, plane, cell_point, tolerance)?;
        self.advance(Stage::Partitioned);
        Ok(derived)
    }

    /// Defines a named region; every point must resolve to an entity of
    /// `kind` on the named part at definition time.
    pub fn define_region(
        &mut self,
        name: &str,
        part_name: &str,
        kind: EntityKind,
        points: Vec<Point>,
    ) -> Result<()> {
        if points.is_empty() {
            return Err(PipelineError::Input(format!(
                "region '{}' has no query points",
                name
            )));
        }
        if self.regions.iter().any(|r| r.name == name) {
            return Err(PipelineError::Input(format!(
                "duplicate region name '{}'",
                name
            )));
        }
        let part = self.part(part_name)?;
        for point in &points {
            resolver::resolve(part, kind, point, self.tolerance)?;
        }
        self.regions.push(Region {
            name: name.to_owned(),
            part: part_name.to_owned(),
            kind,
            points,
        });
        Ok(())
    }

    pub fn region(&self, name: &str) -> Result<&Region> {
        self.regions
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| PipelineError::Input(format!("no region named '{}'", name)))
    }

    /// Resolves every point of a region against its part's current topology.
    pub fn resolve_region(&self, name: &str) -> Result<Vec<EntityId>> {
        let region = self.region(name)?;
        let part = self.part(&region.part)?;
        region.resolve(part, self.tolerance)
    }

    pub fn add_material(&mut self, material: Material) -> Result<()> {
        if self.materials.iter().any(|m| m.name == material.name) {
            return Err(PipelineError::Input(format!(
                "duplicate material name '{}'",
                material.name
            )));
        }
        self.materials.push(material);
        Ok(())
    }

    pub fn material(&self, name: &str) -> Result<&Material> {
        self.materials
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| PipelineError::Input(format!("no material named '{}'", name)))
    }

    pub fn add_section(&mut self, section: Section) -> Result<()> {
        self.material(&section.material)?;
        if self.sections.iter().any(|s| s.name == section.name) {
            return Err(PipelineError::Input(format!(
                "duplicate section name '{}'",
                section.name
            )));
        }
        self.sections.push(section);
        Ok(())
    }

    pub fn section(&self, name: &str) -> Result<&Section> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| PipelineError::Input(format!("no section named '{}'", name)))
    }

    /// Appends a step to the linear chain; `previous` must be the current
    /// chain tail ("Initial" when the chain is empty).
    pub fn add_step(&mut self, name: &str, previous: &str) -> Result<()> {
        if name == INITIAL_STEP {
            return Err(PipelineError::Input(
                "the initial step is implicit and cannot be redefined".to_owned(),
            ));
        }
        let tail = self
            .steps
            .last()
            .map(|s| s.name.as_str())
            .unwrap_or(INITIAL_STEP);
        if previous != tail {
            return Err(PipelineError::Input(format!(
                "step '{}' must follow the chain tail '{}', not '{}'",
                name, tail, previous
            )));
        }
        if self.steps.iter().any(|s| s.name == name) {
            return Err(PipelineError::Input(format!(
                "duplicate step name '{}'",
                name
            )));
        }
        self.steps.push(Step {
            name: name.to_owned(),
            previous: previous.to_owned(),
        });
        Ok(())
    }

    /// True when `name` is the implicit initial step or a defined one.
    pub fn has_step(&self, name: &str) -> bool {
        name == INITIAL_STEP || self.steps.iter().any(|s| s.name == name)
    }

    /// Step position in solve order; the initial step is 0.
    pub fn step_order(&self, name: &str) -> Result<usize> {
        if name == INITIAL_STEP {
            return Ok(0);
        }
        self.steps
            .iter()
            .position(|s| s.name == name)
            .map(|i| i + 1)
            .ok_or_else(|| PipelineError::Input(format!("no step named '{}'", name)))
    }

    pub fn contact_property(&self, name: &str) -> Result<&ContactProperty> {
        self.contact_properties
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| PipelineError::Input(format!("no contact property named '{}'", name)))
    }

    /// The section assigned to a region, if any.
    pub fn assigned_section(&self, region_name: &str) -> Option<&Section> {
        self.assignments
            .iter()
            .find(|a| a.region == region_name)
            .and_then(|a| self.sections.iter().find(|s| s.name == a.section))
    }

    /// Entity-level assignment map for one part: entity id -> region name.
    /// Used by overlap checks and by the mesher's section lookup.
    pub fn assignment_coverage(&self, part_name: &str) -> Result<HashMap<EntityId, String>> {
        let mut coverage = HashMap::new();
        for assignment in &self.assignments {
            let region = self.region(&assignment.region)?;
            if region.part != part_name {
                continue;
            }
            for id in self.resolve_region(&region.name)? {
                coverage.insert(id, region.name.clone());
            }
        }
        Ok(coverage)
    }
}
