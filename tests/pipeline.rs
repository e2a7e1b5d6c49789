//! End-to-end pipeline runs: author, partition, property, constrain,
//! mesh, and solve two models with known structural behavior.

use std::sync::Arc;
use std::time::Duration;

use olivine::constraints::{self, DofMask, LoadKind};
use olivine::geom::Point;
use olivine::job::{self, InProcessSolver, JobSpec};
use olivine::mesh::{self, ElementType, Seeding};
use olivine::model::{Model, Stage, INITIAL_STEP};
use olivine::part::{EntityKind, Part, Profile, SketchPrimitive};
use olivine::properties::{self, Material, Section, SectionKind};

fn steel() -> Material {
    Material::new("steel", 7800.0, 200e9, 0.29).unwrap()
}

/// 1 m x 0.4 m plate, t = 10 mm, partitioned at midspan. Left edge
/// clamped, right edge held out-of-plane only, 2 kPa pressure on both
/// panels. The deflection must stay in small-deflection territory:
/// every node defined, maximum magnitude below the thickness.
#[test]
fn pressurized_plate_stays_in_small_deflection_range() {
    let profile = Profile::new(vec![SketchPrimitive::Rectangle {
        p1: [0.0, 0.0],
        p2: [1.0, 0.4],
    }]);
    let mut model = Model::new("plate");
    model
        .add_part(Part::base_shell("Plate", &profile).unwrap())
        .unwrap();
    model
        .partition_face_by_path(
            "Plate",
            &Point::new(0.5, 0.2, 0.0),
            &Point::new(0.5, 0.0, 0.0),
            &Point::new(0.5, 0.4, 0.0),
        )
        .unwrap();

    model.add_material(steel()).unwrap();
    model
        .add_section(
            Section::new("skin", "steel", SectionKind::Shell { thickness: 0.01 }).unwrap(),
        )
        .unwrap();

    model
        .define_region(
            "panels",
            "Plate",
            EntityKind::Face,
            vec![Point::new(0.25, 0.2, 0.0), Point::new(0.75, 0.2, 0.0)],
        )
        .unwrap();
    model
        .define_region(
            "left_edge",
            "Plate",
            EntityKind::Edge,
            vec![Point::new(0.0, 0.2, 0.0)],
        )
        .unwrap();
    model
        .define_region(
            "right_edge",
            "Plate",
            EntityKind::Edge,
            vec![Point::new(1.0, 0.2, 0.0)],
        )
        .unwrap();
    model
        .define_region(
            "span_edges",
            "Plate",
            EntityKind::Edge,
            vec![
                Point::new(0.25, 0.0, 0.0),
                Point::new(0.75, 0.0, 0.0),
                Point::new(0.25, 0.4, 0.0),
                Point::new(0.75, 0.4, 0.0),
            ],
        )
        .unwrap();
    model
        .define_region(
            "width_edges",
            "Plate",
            EntityKind::Edge,
            vec![
                Point::new(0.0, 0.2, 0.0),
                Point::new(0.5, 0.2, 0.0),
                Point::new(1.0, 0.2, 0.0),
            ],
        )
        .unwrap();

    properties::assign_section(&mut model, "panels", "skin").unwrap();
    model.add_step("Loading", INITIAL_STEP).unwrap();
    constraints::add_boundary_condition(
        &mut model,
        "clamp",
        INITIAL_STEP,
        "left_edge",
        DofMask::encastre(),
    )
    .unwrap();
    constraints::add_boundary_condition(
        &mut model,
        "prop",
        INITIAL_STEP,
        "right_edge",
        DofMask::fixed(&[2]),
    )
    .unwrap();
    constraints::add_load(
        &mut model,
        "pressure",
        "Loading",
        "panels",
        LoadKind::Pressure { magnitude: 2000.0 },
    )
    .unwrap();

    mesh::set_mesh_spec(
        &mut model,
        "panels",
        ElementType::Quad4,
        Seeding::ByNumber { count: 8 },
    )
    .unwrap();
    mesh::seed_edge_region(&mut model, "span_edges", Seeding::ByNumber { count: 20 }).unwrap();
    mesh::seed_edge_region(&mut model, "width_edges", Seeding::ByNumber { count: 16 }).unwrap();
    mesh::generate_mesh(&mut model).unwrap();

    let node_count: usize = model.meshes.iter().map(|m| m.nodes.len()).sum();
    let element_count: usize = model.meshes.iter().map(|m| m.elements.len()).sum();
    assert_eq!(element_count, 2 * 20 * 16);
    assert_eq!(node_count, 2 * 21 * 17 - 17);

    let db = job::run_job(
        &mut model,
        JobSpec::new("plate-static"),
        Arc::new(InProcessSolver),
        Duration::from_secs(600),
    )
    .unwrap();
    assert_eq!(model.stage(), Stage::Solved);

    let frame = &db.step("Loading").unwrap().frames[0];
    assert_eq!(frame.displacement.len(), node_count);
    assert!(frame
        .displacement
        .iter()
        .all(|u| u.iter().all(|c| c.is_finite())));

    let max = db.max_displacement_magnitude().unwrap();
    assert!(max < 0.01, "deflection {max} exceeds the plate thickness");
    assert!(max > 1e-5, "deflection {max} is implausibly small");

    // the pressure acts into the plate, so the field points in -z
    let most_deflected = frame
        .displacement
        .iter()
        .max_by(|a, b| a[2].abs().total_cmp(&b[2].abs()))
        .unwrap();
    assert!(most_deflected[2] < 0.0);
}

/// 25 x 20 x 200 solid cantilever, one end clamped, 0.5 Pa on the top
/// face, seed size 10. The tip deflection of the coarse hex mesh must
/// land within a wide band of the Euler-Bernoulli estimate.
#[test]
fn solid_cantilever_tracks_beam_theory() {
    let profile = Profile::new(vec![SketchPrimitive::Rectangle {
        p1: [0.0, 0.0],
        p2: [25.0, 20.0],
    }]);
    let mut model = Model::new("cantilever");
    model
        .add_part(Part::base_solid_extrude("Beam", &profile, 200.0).unwrap())
        .unwrap();

    model.add_material(steel()).unwrap();
    model
        .add_section(Section::new("bulk", "steel", SectionKind::Solid).unwrap())
        .unwrap();

    model
        .define_region(
            "body",
            "Beam",
            EntityKind::Cell,
            vec![Point::new(12.5, 10.0, 100.0)],
        )
        .unwrap();
    model
        .define_region(
            "root",
            "Beam",
            EntityKind::Face,
            vec![Point::new(12.5, 10.0, 0.0)],
        )
        .unwrap();
    model
        .define_region(
            "top",
            "Beam",
            EntityKind::Face,
            vec![Point::new(12.5, 20.0, 100.0)],
        )
        .unwrap();

    properties::assign_section(&mut model, "body", "bulk").unwrap();
    model.add_step("Loading", INITIAL_STEP).unwrap();
    constraints::add_boundary_condition(
        &mut model,
        "clamp",
        INITIAL_STEP,
        "root",
        DofMask::encastre(),
    )
    .unwrap();
    constraints::add_load(
        &mut model,
        "pressure",
        "Loading",
        "top",
        LoadKind::Pressure { magnitude: 0.5 },
    )
    .unwrap();

    mesh::set_mesh_spec(
        &mut model,
        "body",
        ElementType::Hex8,
        Seeding::BySize {
            size: 10.0,
            deviation: 0.1,
        },
    )
    .unwrap();
    mesh::generate_mesh(&mut model).unwrap();

    let element_count: usize = model.meshes.iter().map(|m| m.elements.len()).sum();
    assert_eq!(element_count, 3 * 2 * 20);

    let db = job::run_job(
        &mut model,
        JobSpec::new("cantilever-static"),
        Arc::new(InProcessSolver),
        Duration::from_secs(120),
    )
    .unwrap();

    let frame = &db.step("Loading").unwrap().frames[0];
    let tip_deflection = db
        .nodes
        .iter()
        .zip(&frame.displacement)
        .filter(|(n, _)| (n[2] - 200.0).abs() < 1e-6)
        .map(|(_, u)| -u[1])
        .fold(0.0f64, f64::max);

    // Euler-Bernoulli: w = q L^4 / (8 E I), q = p * width
    let q = 0.5 * 25.0;
    let moment_of_inertia = 25.0 * 20.0f64.powi(3) / 12.0;
    let estimate = q * 200.0f64.powi(4) / (8.0 * 200e9 * moment_of_inertia);
    // coarse trilinear hexes under-predict bending, so allow shear-lock
    // softening below the beam estimate but nothing past ~40%
    let ratio = tip_deflection / estimate;
    assert!(
        (0.6..=1.1).contains(&ratio),
        "tip deflection {tip_deflection:.3e} vs estimate {estimate:.3e} (ratio {ratio:.2})"
    );
}
