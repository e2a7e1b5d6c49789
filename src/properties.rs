//! Materials, sections, and section assignment.

use crate::error::{PipelineError, Result};
use crate::model::{Model, Stage};
use crate::part::EntityKind;

/// Linear-elastic material, validated on construction.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub density: f64,
    pub youngs_modulus: f64,
    pub poissons_ratio: f64,
}

impl Material {
    /// # Arguments
    /// * `density` - Mass density, must be positive
    /// * `youngs_modulus` - Must be positive
    /// * `poissons_ratio` - Must lie in (-1, 0.5)
    pub fn new(
        name: &str,
        density: f64,
        youngs_modulus: f64,
        poissons_ratio: f64,
    ) -> Result<Material> {
        if !density.is_finite() || density <= 0.0 {
            return Err(PipelineError::Input(format!(
                "material '{}': density must be positive, got {}",
                name, density
            )));
        }
        if !youngs_modulus.is_finite() || youngs_modulus <= 0.0 {
            return Err(PipelineError::Input(format!(
                "material '{}': Young's modulus must be positive, got {}",
                name, youngs_modulus
            )));
        }
        if !poissons_ratio.is_finite() || poissons_ratio <= -1.0 || poissons_ratio >= 0.5 {
            return Err(PipelineError::Input(format!(
                "material '{}': Poisson's ratio must lie in (-1, 0.5), got {}",
                name, poissons_ratio
            )));
        }
        Ok(Material {
            name: name.to_owned(),
            density,
            youngs_modulus,
            poissons_ratio,
        })
    }
}

/// Structural idealization carried by a section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SectionKind {
    Shell { thickness: f64 },
    Solid,
    Truss { area: f64 },
}

impl SectionKind {
    /// The entity kind a region must hold for this section to apply.
    pub fn region_kind(&self) -> EntityKind {
        match self {
            SectionKind::Shell { .. } => EntityKind::Face,
            SectionKind::Solid => EntityKind::Cell,
            SectionKind::Truss { .. } => EntityKind::Edge,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SectionKind::Shell { .. } => "shell",
            SectionKind::Solid => "solid",
            SectionKind::Truss { .. } => "truss",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub material: String,
    pub kind: SectionKind,
}

impl Section {
    pub fn new(name: &str, material: &str, kind: SectionKind) -> Result<Section> {
        match kind {
            SectionKind::Shell { thickness } if thickness <= 0.0 => {
                return Err(PipelineError::Input(format!(
                    "section '{}': shell thickness must be positive, got {}",
                    name, thickness
                )));
            }
            SectionKind::Truss { area } if area <= 0.0 => {
                return Err(PipelineError::Input(format!(
                    "section '{}': truss area must be positive, got {}",
                    name, area
                )));
            }
            _ => {}
        }
        Ok(Section {
            name: name.to_owned(),
            material: material.to_owned(),
            kind,
        })
    }
}

/// One section applied to one region. At most one active per region.
#[derive(Debug, Clone)]
pub struct SectionAssignment {
    pub region: String,
    pub section: String,
}

/// Assigns a section to a region.
///
/// Fails with `SectionTypeMismatch` when the section's structural type does
/// not fit the region's entity kind (shell -> face, solid -> cell, truss ->
/// wire edge), and with `OverlappingAssignment` when any entity of the
/// region is already covered by a previous assignment.
pub fn assign_section(model: &mut Model, region_name: &str, section_name: &str) -> Result<()> {
    model.require_at_most(Stage::Propertied, "assign_section")?;
    let region = model.region(region_name)?.clone();
    let section = model.section(section_name)?.clone();

    let expected = section.kind.region_kind();
    if region.kind != expected {
        return Err(PipelineError::SectionTypeMismatch {
            section: section.name.clone(),
            region: region.name.clone(),
            detail: format!(
                "{} sections apply to {} regions, region '{}' holds {} entities",
                section.kind.label(),
                expected,
                region.name,
                region.kind
            ),
        });
    }
    let part = model.part(&region.part)?;
    if matches!(section.kind, SectionKind::Truss { .. }) && !part.is_wire() {
        return Err(PipelineError::SectionTypeMismatch {
            section: section.name.clone(),
            region: region.name.clone(),
            detail: format!("part '{}' is not a wire part", part.name),
        });
    }

    let covered = model.assignment_coverage(&region.part)?;
    for id in model.resolve_region(region_name)? {
        if let Some(other) = covered.get(&id) {
            if other != region_name {
                return Err(PipelineError::OverlappingAssignment {
                    region: format!("'{}' overlaps '{}'", region_name, other),
                });
            }
            return Err(PipelineError::OverlappingAssignment {
                region: format!("'{}' is already assigned", region_name),
            });
        }
    }

    println!(
        "info: assigned section '{}' to region '{}'",
        section_name, region_name
    );
    model.assignments.push(SectionAssignment {
        region: region_name.to_owned(),
        section: section_name.to_owned(),
    });
    model.advance(Stage::Propertied);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point;
    use crate::model::Model;
    use crate::part::{Part, Profile, SketchPrimitive};

    fn propertied_plate() -> Model {
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
                Section::new("plate-section", "steel", SectionKind::Shell { thickness: 0.01 })
                    .unwrap(),
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
        model
    }

    #[test]
    fn material_validation() {
        assert!(Material::new("ok", 7800.0, 200e9, 0.29).is_ok());
        assert!(Material::new("bad-density", -1.0, 200e9, 0.29).is_err());
        assert!(Material::new("bad-modulus", 7800.0, 0.0, 0.29).is_err());
        assert!(Material::new("bad-ratio", 7800.0, 200e9, 0.5).is_err());
    }

    #[test]
    fn shell_section_applies_to_face_region() {
        let mut model = propertied_plate();
        assign_section(&mut model, "surface", "plate-section").unwrap();
        assert_eq!(model.stage(), Stage::Propertied);
        assert!(model.assigned_section("surface").is_some());
    }

    #[test]
    fn solid_section_on_face_region_mismatches() {
        let mut model = propertied_plate();
        model
            .add_section(Section::new("solid-section", "steel", SectionKind::Solid).unwrap())
            .unwrap();
        let err = assign_section(&mut model, "surface", "solid-section").unwrap_err();
        match err {
            PipelineError::SectionTypeMismatch { .. } => {}
            other => panic!("expected SectionTypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn double_assignment_overlaps() {
        let mut model = propertied_plate();
        assign_section(&mut model, "surface", "plate-section").unwrap();
        // second region over the same face
        model
            .define_region(
                "surface-again",
                "Plate",
                EntityKind::Face,
                vec![Point::new(0.5, 0.2, 0.0)],
            )
            .unwrap();
        let err = assign_section(&mut model, "surface-again", "plate-section").unwrap_err();
        match err {
            PipelineError::OverlappingAssignment { .. } => {}
            other => panic!("expected OverlappingAssignment, got {:?}", other),
        }
    }

    #[test]
    fn truss_section_requires_wire_part() {
        let mut model = propertied_plate();
        model
            .add_section(
                Section::new("rod", "steel", SectionKind::Truss { area: 1.963e-5 }).unwrap(),
            )
            .unwrap();
        model
            .define_region(
                "bottom-edge",
                "Plate",
                EntityKind::Edge,
                vec![Point::new(0.5, 0.0, 0.0)],
            )
            .unwrap();
        let err = assign_section(&mut model, "bottom-edge", "rod").unwrap_err();
        match err {
            PipelineError::SectionTypeMismatch { .. } => {}
            other => panic!("expected SectionTypeMismatch, got {:?}", other),
        }
    }
}
