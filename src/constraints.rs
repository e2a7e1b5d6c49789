//! Boundary conditions, loads, and contact interactions.
//!
//! Constraints layer onto a propertied model. Initial-step boundary
//! conditions persist into every later step; whether a later step may
//! re-prescribe an inherited dof is governed by the model's
//! `OverridePolicy`.

use std::collections::HashSet;

use crate::error::{PipelineError, Result};
use crate::geom::Vector;
use crate::model::{Model, Stage, INITIAL_STEP};
use crate::part::EntityKind;

pub const DOF_NAMES: [&str; 6] = ["u1", "u2", "u3", "ur1", "ur2", "ur3"];

/// Six-wide mask of prescribed dof values (3 translations, 3 rotations).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DofMask {
    pub prescribed: [Option<f64>; 6],
}

impl DofMask {
    pub fn new(prescribed: [Option<f64>; 6]) -> DofMask {
        DofMask { prescribed }
    }

    /// All six dofs fixed at zero.
    pub fn encastre() -> DofMask {
        DofMask {
            prescribed: [Some(0.0); 6],
        }
    }

    /// The listed dofs fixed at zero, the rest free.
    pub fn fixed(dofs: &[usize]) -> DofMask {
        let mut prescribed = [None; 6];
        for &dof in dofs {
            prescribed[dof] = Some(0.0);
        }
        DofMask { prescribed }
    }

    /// First dof prescribed by both masks, if any.
    pub fn first_overlap(&self, other: &DofMask) -> Option<usize> {
        (0..6).find(|&i| self.prescribed[i].is_some() && other.prescribed[i].is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.prescribed.iter().all(Option::is_none)
    }
}

#[derive(Debug, Clone)]
pub struct BoundaryCondition {
    pub name: String,
    pub step: String,
    pub region: String,
    pub mask: DofMask,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadKind {
    /// Uniform pressure along the face normal, positive into the face.
    Pressure { magnitude: f64 },
    /// Force vector applied at each vertex of the region.
    ConcentratedForce { vector: [f64; 3] },
}

#[derive(Debug, Clone)]
pub struct Load {
    pub name: String,
    pub step: String,
    pub region: String,
    pub kind: LoadKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TangentialBehavior {
    Frictionless,
    Penalty { friction_coefficient: f64 },
}

/// Named contact behavior: tangential model plus hard normal contact.
#[derive(Debug, Clone)]
pub struct ContactProperty {
    pub name: String,
    pub tangential: TangentialBehavior,
    pub allow_separation: bool,
}

#[derive(Debug, Clone)]
pub struct Interaction {
    pub name: String,
    pub step: String,
    pub master: String,
    pub slave: String,
    pub property: String,
}

/// Adds a boundary condition on a region.
///
/// At most one active prescription per dof per entity per step; a later
/// step touching a dof inherited from the initial step is governed by the
/// model's `OverridePolicy`.
pub fn add_boundary_condition(
    model: &mut Model,
    name: &str,
    step: &str,
    region_name: &str,
    mask: DofMask,
) -> Result<()> {
    model.require_at_least(Stage::Propertied, "add_boundary_condition")?;
    model.require_at_most(Stage::Constrained, "add_boundary_condition")?;
    if mask.is_empty() {
        return Err(PipelineError::Input(format!(
            "boundary condition '{}' prescribes no dofs",
            name
        )));
    }
    if !model.has_step(step) {
        return Err(PipelineError::Input(format!("no step named '{}'", step)));
    }
    let region = model.region(region_name)?;
    let kind = region.kind;
    if kind == EntityKind::Cell {
        return Err(PipelineError::Input(format!(
            "boundary condition '{}' targets a cell region; constrain its bounding entities",
            name
        )));
    }
    let new_entities: HashSet<_> = model.resolve_region(region_name)?.into_iter().collect();

    let replace = model.override_policy == crate::model::OverridePolicy::Replace;
    for existing in &model.boundary_conditions {
        let same_step = existing.step == step;
        let inherited = existing.step == INITIAL_STEP && step != INITIAL_STEP;
        if !same_step && !inherited {
            continue;
        }
        if inherited && replace {
            continue;
        }
        let Some(dof) = existing.mask.first_overlap(&mask) else {
            continue;
        };
        let other_entities = model.resolve_region(&existing.region)?;
        if other_entities.iter().any(|id| new_entities.contains(id)) {
            return Err(PipelineError::DofConflict {
                step: step.to_owned(),
                region: region_name.to_owned(),
                dof: DOF_NAMES[dof],
                existing: existing.name.clone(),
            });
        }
    }

    model.boundary_conditions.push(BoundaryCondition {
        name: name.to_owned(),
        step: step.to_owned(),
        region: region_name.to_owned(),
        mask,
    });
    model.advance(Stage::Constrained);
    Ok(())
}

/// Adds a load on a region. Loads belong to analysis steps, never to the
/// initial step; pressures need face regions and concentrated forces need
/// vertex regions.
pub fn add_load(
    model: &mut Model,
    name: &str,
    step: &str,
    region_name: &str,
    kind: LoadKind,
) -> Result<()> {
    model.require_at_least(Stage::Propertied, "add_load")?;
    model.require_at_most(Stage::Constrained, "add_load")?;
    if step == INITIAL_STEP {
        return Err(PipelineError::Input(format!(
            "load '{}' cannot belong to the initial step",
            name
        )));
    }
    if !model.has_step(step) {
        return Err(PipelineError::Input(format!("no step named '{}'", step)));
    }
    let region = model.region(region_name)?;
    let expected = match kind {
        LoadKind::Pressure { .. } => EntityKind::Face,
        LoadKind::ConcentratedForce { .. } => EntityKind::Vertex,
    };
    if region.kind != expected {
        return Err(PipelineError::Input(format!(
            "load '{}' needs a {} region, region '{}' holds {} entities",
            name, expected, region_name, region.kind
        )));
    }
    model.resolve_region(region_name)?;

    model.loads.push(Load {
        name: name.to_owned(),
        step: step.to_owned(),
        region: region_name.to_owned(),
        kind,
    });
    model.advance(Stage::Constrained);
    Ok(())
}

pub fn add_contact_property(model: &mut Model, property: ContactProperty) -> Result<()> {
    if model
        .contact_properties
        .iter()
        .any(|c| c.name == property.name)
    {
        return Err(PipelineError::Input(format!(
            "duplicate contact property name '{}'",
            property.name
        )));
    }
    if let TangentialBehavior::Penalty {
        friction_coefficient,
    } = property.tangential
    {
        if friction_coefficient < 0.0 {
            return Err(PipelineError::Input(format!(
                "contact property '{}': negative friction coefficient",
                property.name
            )));
        }
    }
    model.contact_properties.push(property);
    Ok(())
}

/// Reverses the stored orientation of every face in a face region.
pub fn flip_region_normals(model: &mut Model, region_name: &str) -> Result<()> {
    let region = model.region(region_name)?.clone();
    if region.kind != EntityKind::Face {
        return Err(PipelineError::Input(format!(
            "flip targets face regions, region '{}' holds {} entities",
            region_name, region.kind
        )));
    }
    let ids = model.resolve_region(region_name)?;
    let part = model.part_mut(&region.part)?;
    for id in ids {
        part.flip_face_normal(id.index);
    }
    Ok(())
}

/// Area-weighted average normal over a face region.
fn region_normal(model: &Model, region_name: &str) -> Result<Vector> {
    let region = model.region(region_name)?;
    if region.kind != EntityKind::Face {
        return Err(PipelineError::Input(format!(
            "contact surfaces must be face regions, region '{}' holds {} entities",
            region_name, region.kind
        )));
    }
    let part = model.part(&region.part)?;
    let mut sum = Vector::zeros();
    for id in model.resolve_region(region_name)? {
        sum += part.face_normal(id.index) * part.face_area(id.index);
    }
    Ok(sum)
}

/// Adds a surface-to-surface contact interaction.
///
/// The two surfaces must agree in orientation: a negative dot product
/// between their average normals flips the slave surface automatically; a
/// near-perpendicular pair cannot be reconciled and fails with
/// `NormalMismatch`.
pub fn add_interaction(
    model: &mut Model,
    name: &str,
    step: &str,
    master_region: &str,
    slave_region: &str,
    property: &str,
) -> Result<()> {
    model.require_at_least(Stage::Propertied, "add_interaction")?;
    model.require_at_most(Stage::Constrained, "add_interaction")?;
    if !model.has_step(step) {
        return Err(PipelineError::Input(format!("no step named '{}'", step)));
    }
    model.contact_property(property)?;

    let master_normal = region_normal(model, master_region)?;
    let slave_normal = region_normal(model, slave_region)?;
    if master_normal.norm() < 1e-12 || slave_normal.norm() < 1e-12 {
        return Err(PipelineError::NormalMismatch {
            master: master_region.to_owned(),
            slave: slave_region.to_owned(),
            detail: "a contact surface has a vanishing average normal".to_owned(),
        });
    }
    let alignment = master_normal.normalize().dot(&slave_normal.normalize());
    if alignment.abs() < 0.1 {
        return Err(PipelineError::NormalMismatch {
            master: master_region.to_owned(),
            slave: slave_region.to_owned(),
            detail: format!("surfaces are nearly perpendicular (dot = {:.3})", alignment),
        });
    }
    if alignment < 0.0 {
        println!(
            "warning: slave surface '{}' opposes master '{}'; flipping its orientation",
            slave_region, master_region
        );
        flip_region_normals(model, slave_region)?;
    }

    model.interactions.push(Interaction {
        name: name.to_owned(),
        step: step.to_owned(),
        master: master_region.to_owned(),
        slave: slave_region.to_owned(),
        property: property.to_owned(),
    });
    model.advance(Stage::Constrained);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point;
    use crate::model::{Model, OverridePolicy};
    use crate::part::{Part, Profile, SketchPrimitive};
    use crate::properties::{self, Material, Section, SectionKind};

    fn constrained_plate() -> Model {
        let profile = Profile::new(vec![SketchPrimitive::Rectangle {
            p1: [0.0, 0.0],
            p2: [1.0, 0.4],
        }]);
        let mut model = Model::new("test");
        model
            .add_part(Part::base_shell("Plate", &profile).unwrap())
            .unwrap();
        model
            .add_material(Material::new("steel", 7800.0, 200e9, 0.29).unwrap())
            .unwrap();
        model
            .add_section(
                Section::new("shell", "steel", SectionKind::Shell { thickness: 0.01 }).unwrap(),
            )
            .unwrap();
        model
            .define_region(
                "surface",
                "Plate",
                EntityKind::Face,
                vec![Point::new(0.5, 0.2, 0.0)],
            )
            .unwrap();
        properties::assign_section(&mut model, "surface", "shell").unwrap();
        model
            .define_region(
                "left-edge",
                "Plate",
                EntityKind::Edge,
                vec![Point::new(0.0, 0.2, 0.0)],
            )
            .unwrap();
        model.add_step("Loading", INITIAL_STEP).unwrap();
        model
    }

    #[test]
    fn encastre_then_disjoint_dof_is_allowed() {
        let mut model = constrained_plate();
        add_boundary_condition(
            &mut model,
            "clamp",
            INITIAL_STEP,
            "left-edge",
            DofMask::fixed(&[0, 1]),
        )
        .unwrap();
        // same entities, different dofs, same step
        add_boundary_condition(
            &mut model,
            "hold-w",
            INITIAL_STEP,
            "left-edge",
            DofMask::fixed(&[2]),
        )
        .unwrap();
        assert_eq!(model.boundary_conditions.len(), 2);
    }

    #[test]
    fn same_dof_same_entity_conflicts() {
        let mut model = constrained_plate();
        add_boundary_condition(
            &mut model,
            "clamp",
            INITIAL_STEP,
            "left-edge",
            DofMask::encastre(),
        )
        .unwrap();
        let err = add_boundary_condition(
            &mut model,
            "clamp-again",
            INITIAL_STEP,
            "left-edge",
            DofMask::fixed(&[2]),
        )
        .unwrap_err();
        match err {
            PipelineError::DofConflict { dof, existing, .. } => {
                assert_eq!(dof, "u3");
                assert_eq!(existing, "clamp");
            }
            other => panic!("expected DofConflict, got {:?}", other),
        }
    }

    #[test]
    fn inherited_dof_is_forbidden_by_default() {
        let mut model = constrained_plate();
        add_boundary_condition(
            &mut model,
            "clamp",
            INITIAL_STEP,
            "left-edge",
            DofMask::encastre(),
        )
        .unwrap();
        let err = add_boundary_condition(
            &mut model,
            "push",
            "Loading",
            "left-edge",
            DofMask::new([None, Some(-3.0), None, None, None, None]),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::DofConflict { .. }));
    }

    #[test]
    fn replace_policy_allows_override() {
        let mut model = constrained_plate();
        model.override_policy = OverridePolicy::Replace;
        add_boundary_condition(
            &mut model,
            "clamp",
            INITIAL_STEP,
            "left-edge",
            DofMask::encastre(),
        )
        .unwrap();
        add_boundary_condition(
            &mut model,
            "push",
            "Loading",
            "left-edge",
            DofMask::new([None, Some(-3.0), None, None, None, None]),
        )
        .unwrap();
        assert_eq!(model.boundary_conditions.len(), 2);
    }

    #[test]
    fn loads_belong_to_analysis_steps() {
        let mut model = constrained_plate();
        let err = add_load(
            &mut model,
            "pressure",
            INITIAL_STEP,
            "surface",
            LoadKind::Pressure { magnitude: 2000.0 },
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)));
        add_load(
            &mut model,
            "pressure",
            "Loading",
            "surface",
            LoadKind::Pressure { magnitude: 2000.0 },
        )
        .unwrap();
    }

    #[test]
    fn opposed_contact_normals_flip_the_slave() {
        // two parallel unit squares, both normals +z
        let profile = Profile::new(vec![SketchPrimitive::Rectangle {
            p1: [0.0, 0.0],
            p2: [1.0, 1.0],
        }]);
        let mut model = Model::new("contact");
        let mut upper = Part::base_shell("Upper", &profile).unwrap();
        // move the master's normal to -z so the pair opposes
        upper.flip_face_normal(0);
        model.add_part(upper).unwrap();
        model
            .add_part(Part::base_shell("Lower", &profile).unwrap())
            .unwrap();
        model
            .add_material(Material::new("steel", 7800.0, 200e9, 0.29).unwrap())
            .unwrap();
        model
            .add_section(
                Section::new("shell", "steel", SectionKind::Shell { thickness: 0.01 }).unwrap(),
            )
            .unwrap();
        model
            .define_region(
                "upper-face",
                "Upper",
                EntityKind::Face,
                vec![Point::new(0.5, 0.5, 0.0)],
            )
            .unwrap();
        model
            .define_region(
                "lower-face",
                "Lower",
                EntityKind::Face,
                vec![Point::new(0.5, 0.5, 0.0)],
            )
            .unwrap();
        properties::assign_section(&mut model, "upper-face", "shell").unwrap();
        add_contact_property(
            &mut model,
            ContactProperty {
                name: "frictionless".to_owned(),
                tangential: TangentialBehavior::Frictionless,
                allow_separation: true,
            },
        )
        .unwrap();
        add_interaction(
            &mut model,
            "pair",
            INITIAL_STEP,
            "upper-face",
            "lower-face",
            "frictionless",
        )
        .unwrap();
        let slave_normal = region_normal(&model, "lower-face").unwrap();
        assert!(slave_normal.z < 0.0);
    }
}
