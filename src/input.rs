//! Structured JSON input: parses a model description file and drives the
//! staged authoring calls, plus SVG profile import.

use json::JsonValue;

use crate::constraints::{self, ContactProperty, DofMask, LoadKind, TangentialBehavior};
use crate::error::{PipelineError, Result};
use crate::geom::{Plane, Point, Vector};
use crate::mesh::{self, ElementType, Seeding};
use crate::model::{Model, OverridePolicy, INITIAL_STEP};
use crate::part::{EntityKind, Part, Profile, SketchPrimitive};
use crate::properties::{self, Material, Section, SectionKind};
use crate::results::FieldOutput;
use crate::job::JobSpec;

/// Loads and validates the input file, builds the model through every
/// authoring stage short of meshing, and collects the job parameters.
///
/// # Arguments
/// * `input_file` - The path to the input json file
/// * `svg_override` - Optional SVG file whose profile replaces the first
///   part's sketched profile
///
/// # Returns
/// The staged model and the job spec from the `job` section.
pub fn load_model(input_file: &str, svg_override: Option<&str>) -> Result<(Model, JobSpec)> {
    let input_json = load_input_file(input_file)?;

    let name = input_json["model"]
        .as_str()
        .ok_or_else(|| PipelineError::Input("model name must be a string".to_owned()))?;
    let mut model = Model::new(name);
    if input_json["override_policy"].as_str() == Some("replace") {
        model.override_policy = OverridePolicy::Replace;
    }

    for (index, part_json) in input_json["parts"].members().enumerate() {
        let profile = if index == 0 && svg_override.is_some() {
            parse_svg(svg_override.unwrap())?
        } else {
            parse_profile(part_json)?
        };
        model.add_part(build_part(part_json, &profile)?)?;
    }

    for partition_json in input_json["partitions"].members() {
        apply_partition(&mut model, partition_json)?;
    }

    for material_json in input_json["materials"].members() {
        model.add_material(parse_material(material_json)?)?;
    }
    for section_json in input_json["sections"].members() {
        model.add_section(parse_section(section_json)?)?;
    }
    for region_json in input_json["regions"].members() {
        define_region(&mut model, region_json)?;
    }
    for assignment_json in input_json["assignments"].members() {
        let region = string_field(assignment_json, "region", "assignment")?;
        let section = string_field(assignment_json, "section", "assignment")?;
        properties::assign_section(&mut model, &region, &section)?;
    }

    for step_json in input_json["steps"].members() {
        let step_name = string_field(step_json, "name", "step")?;
        let previous = step_json["previous"].as_str().unwrap_or(INITIAL_STEP);
        model.add_step(&step_name, previous)?;
    }

    for (bc_name, bc_json) in input_json["boundary_conditions"].entries() {
        add_boundary_condition(&mut model, bc_name, bc_json)?;
    }
    for (load_name, load_json) in input_json["loads"].entries() {
        add_load(&mut model, load_name, load_json)?;
    }
    for contact_json in input_json["contact_properties"].members() {
        constraints::add_contact_property(&mut model, parse_contact_property(contact_json)?)?;
    }
    for (interaction_name, interaction_json) in input_json["interactions"].entries() {
        let step = interaction_json["step"].as_str().unwrap_or(INITIAL_STEP);
        let master = string_field(interaction_json, "master", interaction_name)?;
        let slave = string_field(interaction_json, "slave", interaction_name)?;
        let property = string_field(interaction_json, "property", interaction_name)?;
        constraints::add_interaction(
            &mut model,
            interaction_name,
            step,
            &master,
            &slave,
            &property,
        )?;
    }

    for mesh_json in input_json["mesh"].members() {
        let region = string_field(mesh_json, "region", "mesh directive")?;
        let element_type = parse_element_type(mesh_json, &region)?;
        let seeding = parse_seeding(&mesh_json["seeds"], &region)?;
        mesh::set_mesh_spec(&mut model, &region, element_type, seeding)?;
    }
    for seed_json in input_json["edge_seeds"].members() {
        let region = string_field(seed_json, "region", "edge seed")?;
        let seeding = parse_seeding(&seed_json["seeds"], &region)?;
        mesh::seed_edge_region(&mut model, &region, seeding)?;
    }

    let job = parse_job(&input_json["job"], name)?;
    Ok((model, job))
}

/// Reads and parses the input json, checking the sections every model
/// needs.
fn load_input_file(input_file: &str) -> Result<JsonValue> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(PipelineError::Input(format!(
                "Unable to open input file {}",
                input_file
            )))
        }
    };

    let input_json = match json::parse(&file_string) {
        Ok(f) => f,
        Err(err) => {
            return Err(PipelineError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    if !input_json.has_key("model") {
        return Err(PipelineError::Input(
            "Input json missing model field".to_owned(),
        ));
    }
    if !input_json.has_key("parts") {
        return Err(PipelineError::Input(
            "Input json missing parts section".to_owned(),
        ));
    }
    if !input_json.has_key("materials") {
        return Err(PipelineError::Input(
            "Input json missing materials section".to_owned(),
        ));
    }
    if !input_json.has_key("sections") {
        return Err(PipelineError::Input(
            "Input json missing sections section".to_owned(),
        ));
    }
    if !input_json.has_key("regions") {
        return Err(PipelineError::Input(
            "Input json missing regions section".to_owned(),
        ));
    }
    if !input_json.has_key("assignments") {
        return Err(PipelineError::Input(
            "Input json missing assignments section".to_owned(),
        ));
    }
    if !input_json.has_key("steps") {
        return Err(PipelineError::Input(
            "Input json missing steps section".to_owned(),
        ));
    }
    if !input_json.has_key("boundary_conditions") {
        return Err(PipelineError::Input(
            "Input json missing boundary_conditions section".to_owned(),
        ));
    }
    if !input_json.has_key("mesh") {
        return Err(PipelineError::Input(
            "Input json missing mesh section".to_owned(),
        ));
    }

    Ok(input_json)
}

fn string_field(value: &JsonValue, key: &str, context: &str) -> Result<String> {
    value[key]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| PipelineError::Input(format!("{context} is missing the {key} field")))
}

fn f64_field(value: &JsonValue, key: &str, context: &str) -> Result<f64> {
    value[key]
        .as_f64()
        .ok_or_else(|| PipelineError::Input(format!("{context} is missing the {key} field")))
}

fn parse_point(value: &JsonValue, context: &str) -> Result<Point> {
    let coords: Vec<f64> = value.members().filter_map(|v| v.as_f64()).collect();
    if coords.len() != 3 || value.members().count() != 3 {
        return Err(PipelineError::Input(format!(
            "{context}: points are [x, y, z] float triples"
        )));
    }
    Ok(Point::new(coords[0], coords[1], coords[2]))
}

fn parse_pair(value: &JsonValue, context: &str) -> Result<[f64; 2]> {
    let coords: Vec<f64> = value.members().filter_map(|v| v.as_f64()).collect();
    if coords.len() != 2 || value.members().count() != 2 {
        return Err(PipelineError::Input(format!(
            "{context}: sketch points are [x, y] float pairs"
        )));
    }
    Ok([coords[0], coords[1]])
}

fn parse_profile(part_json: &JsonValue) -> Result<Profile> {
    let mut primitives = Vec::new();
    for primitive_json in part_json["profile"].members() {
        let kind = string_field(primitive_json, "type", "profile primitive")?;
        let primitive = match kind.as_str() {
            "line" => SketchPrimitive::Line {
                a: parse_pair(&primitive_json["a"], "line")?,
                b: parse_pair(&primitive_json["b"], "line")?,
            },
            "arc" => SketchPrimitive::Arc {
                center: parse_pair(&primitive_json["center"], "arc")?,
                start: parse_pair(&primitive_json["start"], "arc")?,
                end: parse_pair(&primitive_json["end"], "arc")?,
            },
            "circle" => SketchPrimitive::Circle {
                center: parse_pair(&primitive_json["center"], "circle")?,
                radius: f64_field(primitive_json, "radius", "circle")?,
            },
            "rectangle" => SketchPrimitive::Rectangle {
                p1: parse_pair(&primitive_json["p1"], "rectangle")?,
                p2: parse_pair(&primitive_json["p2"], "rectangle")?,
            },
            other => {
                return Err(PipelineError::Input(format!(
                    "unknown profile primitive type '{other}'"
                )))
            }
        };
        primitives.push(primitive);
    }
    if primitives.is_empty() {
        return Err(PipelineError::Input(
            "part has an empty profile and no svg override".to_owned(),
        ));
    }
    let mut profile = Profile::new(primitives);
    if let Some(deviation) = part_json["deviation"].as_f64() {
        profile = profile.with_deviation(deviation);
    }
    Ok(profile)
}

fn build_part(part_json: &JsonValue, profile: &Profile) -> Result<Part> {
    let name = string_field(part_json, "name", "part")?;
    let build = &part_json["build"];
    let op = string_field(build, "op", &format!("part '{name}' build"))?;
    match op.as_str() {
        "shell" => Part::base_shell(&name, profile),
        "solid_extrude" => {
            let depth = f64_field(build, "depth", &format!("part '{name}' solid extrusion"))?;
            Part::base_solid_extrude(&name, profile, depth)
        }
        "shell_extrude" => {
            let depth = f64_field(build, "depth", &format!("part '{name}' shell extrusion"))?;
            Part::base_shell_extrude(&name, profile, depth)
        }
        "shell_revolve" => {
            let angle = build["angle"].as_f64().unwrap_or(360.0);
            let segments = build["segments"].as_usize().unwrap_or(16);
            Part::base_shell_revolve(&name, profile, angle, segments)
        }
        "wire" => Part::base_wire(&name, profile),
        other => Err(PipelineError::Input(format!(
            "unknown build op '{other}' on part '{name}'"
        ))),
    }
}

fn apply_partition(model: &mut Model, partition_json: &JsonValue) -> Result<()> {
    let kind = string_field(partition_json, "type", "partition")?;
    let part = string_field(partition_json, "part", "partition")?;
    match kind.as_str() {
        "face_path" => {
            let face = parse_point(&partition_json["face"], "face partition")?;
            let a = parse_point(&partition_json["a"], "face partition")?;
            let b = parse_point(&partition_json["b"], "face partition")?;
            model.partition_face_by_path(&part, &face, &a, &b)?;
        }
        "cell_plane" => {
            let cell = parse_point(&partition_json["cell"], "cell partition")?;
            let origin = parse_point(&partition_json["plane"]["point"], "cell partition")?;
            let n = parse_point(&partition_json["plane"]["normal"], "cell partition")?;
            let plane = Plane::from_point_normal(origin, Vector::new(n.x, n.y, n.z))?;
            model.partition_cell_by_plane(&part, &plane, &cell)?;
        }
        other => {
            return Err(PipelineError::Input(format!(
                "unknown partition type '{other}'"
            )))
        }
    }
    Ok(())
}

fn parse_material(material_json: &JsonValue) -> Result<Material> {
    let name = string_field(material_json, "name", "material")?;
    Material::new(
        &name,
        f64_field(material_json, "density", &format!("material '{name}'"))?,
        f64_field(material_json, "elasticity", &format!("material '{name}'"))?,
        f64_field(
            material_json,
            "poisson_ratio",
            &format!("material '{name}'"),
        )?,
    )
}

fn parse_section(section_json: &JsonValue) -> Result<Section> {
    let name = string_field(section_json, "name", "section")?;
    let material = string_field(section_json, "material", &format!("section '{name}'"))?;
    let kind = match string_field(section_json, "type", &format!("section '{name}'"))?.as_str() {
        "shell" => SectionKind::Shell {
            thickness: f64_field(section_json, "thickness", &format!("shell section '{name}'"))?,
        },
        "solid" => SectionKind::Solid,
        "truss" => SectionKind::Truss {
            area: f64_field(section_json, "area", &format!("truss section '{name}'"))?,
        },
        other => {
            return Err(PipelineError::Input(format!(
                "unknown section type '{other}' on section '{name}'"
            )))
        }
    };
    Section::new(&name, &material, kind)
}

fn parse_entity_kind(value: &str) -> Result<EntityKind> {
    match value {
        "vertex" => Ok(EntityKind::Vertex),
        "edge" => Ok(EntityKind::Edge),
        "face" => Ok(EntityKind::Face),
        "cell" => Ok(EntityKind::Cell),
        other => Err(PipelineError::Input(format!(
            "unknown entity kind '{other}'"
        ))),
    }
}

fn define_region(model: &mut Model, region_json: &JsonValue) -> Result<()> {
    let name = string_field(region_json, "name", "region")?;
    let part = string_field(region_json, "part", &format!("region '{name}'"))?;
    let kind = parse_entity_kind(&string_field(
        region_json,
        "kind",
        &format!("region '{name}'"),
    )?)?;
    let mut points = Vec::new();
    for point_json in region_json["points"].members() {
        points.push(parse_point(point_json, &format!("region '{name}'"))?);
    }
    model.define_region(&name, &part, kind, points)?;
    if region_json["flip_normal"].as_bool() == Some(true) {
        constraints::flip_region_normals(model, &name)?;
    }
    Ok(())
}

fn add_boundary_condition(model: &mut Model, name: &str, bc_json: &JsonValue) -> Result<()> {
    let step = bc_json["step"].as_str().unwrap_or(INITIAL_STEP);
    let region = string_field(bc_json, "region", &format!("boundary condition '{name}'"))?;
    let mask = if bc_json["encastre"].as_bool() == Some(true) {
        DofMask::encastre()
    } else {
        let mut prescribed = [None; 6];
        for (dof_name, value) in bc_json["dofs"].entries() {
            let Some(index) = constraints::DOF_NAMES.iter().position(|n| *n == dof_name) else {
                return Err(PipelineError::Input(format!(
                    "boundary condition '{name}': unknown dof '{dof_name}'"
                )));
            };
            prescribed[index] = Some(value.as_f64().ok_or_else(|| {
                PipelineError::Input(format!(
                    "boundary condition '{name}': dof '{dof_name}' needs a float value"
                ))
            })?);
        }
        DofMask::new(prescribed)
    };
    constraints::add_boundary_condition(model, name, step, &region, mask)
}

fn add_load(model: &mut Model, name: &str, load_json: &JsonValue) -> Result<()> {
    let step = string_field(load_json, "step", &format!("load '{name}'"))?;
    let region = string_field(load_json, "region", &format!("load '{name}'"))?;
    let kind = match string_field(load_json, "type", &format!("load '{name}'"))?.as_str() {
        "pressure" => LoadKind::Pressure {
            magnitude: f64_field(load_json, "magnitude", &format!("pressure load '{name}'"))?,
        },
        "force" => {
            let p = parse_point(&load_json["vector"], &format!("force load '{name}'"))?;
            LoadKind::ConcentratedForce {
                vector: [p.x, p.y, p.z],
            }
        }
        other => {
            return Err(PipelineError::Input(format!(
                "unknown load type '{other}' on load '{name}'"
            )))
        }
    };
    constraints::add_load(model, name, &step, &region, kind)
}

fn parse_contact_property(contact_json: &JsonValue) -> Result<ContactProperty> {
    let name = string_field(contact_json, "name", "contact property")?;
    let tangential = match contact_json["friction_coefficient"].as_f64() {
        Some(friction_coefficient) => TangentialBehavior::Penalty {
            friction_coefficient,
        },
        None => TangentialBehavior::Frictionless,
    };
    Ok(ContactProperty {
        name,
        tangential,
        allow_separation: contact_json["allow_separation"].as_bool().unwrap_or(true),
    })
}

fn parse_element_type(mesh_json: &JsonValue, region: &str) -> Result<ElementType> {
    match string_field(mesh_json, "element", &format!("mesh directive '{region}'"))?.as_str() {
        "tri3" => Ok(ElementType::Tri3),
        "quad4" => Ok(ElementType::Quad4),
        "hex8" => Ok(ElementType::Hex8),
        "bar2" => Ok(ElementType::Bar2),
        other => Err(PipelineError::Input(format!(
            "unknown element type '{other}' on region '{region}'"
        ))),
    }
}

fn parse_seeding(seeds_json: &JsonValue, region: &str) -> Result<Seeding> {
    if let Some(count) = seeds_json["number"].as_usize() {
        return Ok(Seeding::ByNumber { count });
    }
    if let Some(size) = seeds_json["size"].as_f64() {
        return Ok(Seeding::BySize {
            size,
            deviation: seeds_json["deviation"].as_f64().unwrap_or(0.1),
        });
    }
    Err(PipelineError::Input(format!(
        "mesh directive on region '{region}' needs seeds.number or seeds.size"
    )))
}

fn parse_job(job_json: &JsonValue, model_name: &str) -> Result<JobSpec> {
    let mut spec = JobSpec::new(job_json["name"].as_str().unwrap_or(model_name));
    if let Some(cpus) = job_json["cpus"].as_usize() {
        spec.num_cpus = cpus.max(1);
    }
    if let Some(memory) = job_json["memory_mb"].as_usize() {
        spec.memory_mb = memory;
    }
    if let Some(retries) = job_json["license_retries"].as_usize() {
        spec.max_license_retries = retries;
    }
    if job_json.has_key("field_outputs") {
        let mut fields = Vec::new();
        for field_json in job_json["field_outputs"].members() {
            let field = match field_json.as_str() {
                Some("displacement") => FieldOutput::Displacement,
                Some("reaction") => FieldOutput::Reaction,
                Some("stress") => FieldOutput::Stress,
                Some("strain") => FieldOutput::Strain,
                other => {
                    return Err(PipelineError::Input(format!(
                        "unknown field output {:?}",
                        other
                    )))
                }
            };
            fields.push(field);
        }
        spec.field_outputs = fields;
    }
    Ok(spec)
}

/// Imports a profile from an SVG file.
///
/// Recognizes `polyline`, `polygon`, and `rect` elements; polyline and
/// polygon points become line primitives (y inverted, svg y points down),
/// rects become rectangle primitives.
pub fn parse_svg(svg_file: &str) -> Result<Profile> {
    let contents = match std::fs::read_to_string(svg_file) {
        Ok(file) => file,
        Err(_err) => {
            return Err(PipelineError::Input(format!(
                "Unable to open svg file {}",
                svg_file
            )));
        }
    };
    let doc = match roxmltree::Document::parse(&contents) {
        Ok(doc) => doc,
        Err(err) => {
            return Err(PipelineError::Input(format!(
                "Error in svg file: {err}"
            )))
        }
    };

    let mut primitives: Vec<SketchPrimitive> = Vec::new();
    for node in doc.descendants() {
        match node.tag_name().name() {
            tag @ ("polyline" | "polygon") => {
                let points_raw = node.attribute("points").ok_or_else(|| {
                    PipelineError::Input(format!(
                        "Error in svg file. No points in {tag} element {:?}",
                        node.id()
                    ))
                })?;
                let mut flat: Vec<f64> = Vec::new();
                for token in points_raw.split([' ', ',']).filter(|t| !t.is_empty()) {
                    let value: f64 = token.parse().map_err(|_| {
                        PipelineError::Input(format!(
                            "Non-float value in svg points at {tag} {:?}",
                            node.id()
                        ))
                    })?;
                    flat.push(value);
                }
                if flat.len() < 4 || flat.len() % 2 != 0 {
                    return Err(PipelineError::Input(format!(
                        "Malformed points list in {tag} {:?}",
                        node.id()
                    )));
                }
                // invert y: svg y points down
                let points: Vec<[f64; 2]> = flat.chunks(2).map(|c| [c[0], -c[1]]).collect();
                for pair in points.windows(2) {
                    primitives.push(SketchPrimitive::Line {
                        a: pair[0],
                        b: pair[1],
                    });
                }
                if tag == "polygon" {
                    primitives.push(SketchPrimitive::Line {
                        a: points[points.len() - 1],
                        b: points[0],
                    });
                }
            }
            "rect" => {
                let attr = |name: &str| node.attribute(name).and_then(|v| v.parse::<f64>().ok());
                let x = attr("x").unwrap_or(0.0);
                let y = attr("y").unwrap_or(0.0);
                let width = attr("width").ok_or_else(|| {
                    PipelineError::Input(format!("rect {:?} is missing width", node.id()))
                })?;
                let height = attr("height").ok_or_else(|| {
                    PipelineError::Input(format!("rect {:?} is missing height", node.id()))
                })?;
                primitives.push(SketchPrimitive::Rectangle {
                    p1: [x, -(y + height)],
                    p2: [x + width, -y],
                });
            }
            _ => {}
        }
    }

    if primitives.is_empty() {
        return Err(PipelineError::Input(
            "svg file holds no polyline, polygon, or rect geometry".to_owned(),
        ));
    }
    println!(
        "info: imported {} sketch primitives from {}",
        primitives.len(),
        svg_file
    );
    Ok(Profile::new(primitives))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    const TRUSS_INPUT: &str = r#"{
        "model": "truss",
        "parts": [{
            "name": "Frame",
            "profile": [
                {"type": "line", "a": [0.0, 0.0], "b": [1.0, 1.0]},
                {"type": "line", "a": [1.0, 1.0], "b": [2.0, 0.0]}
            ],
            "build": {"op": "wire"}
        }],
        "materials": [{
            "name": "steel", "density": 7800.0,
            "elasticity": 200e9, "poisson_ratio": 0.29
        }],
        "sections": [{
            "name": "rod", "material": "steel", "type": "truss", "area": 1e-4
        }],
        "regions": [
            {"name": "members", "part": "Frame", "kind": "edge",
             "points": [[0.5, 0.5, 0.0], [1.5, 0.5, 0.0]]},
            {"name": "supports", "part": "Frame", "kind": "vertex",
             "points": [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]]},
            {"name": "apex", "part": "Frame", "kind": "vertex",
             "points": [[1.0, 1.0, 0.0]]}
        ],
        "assignments": [{"region": "members", "section": "rod"}],
        "steps": [{"name": "Loading"}],
        "boundary_conditions": {
            "pins": {"region": "supports", "encastre": true}
        },
        "loads": {
            "tip": {"step": "Loading", "region": "apex",
                    "type": "force", "vector": [0.0, -1000.0, 0.0]}
        },
        "mesh": [{"region": "members", "element": "bar2",
                  "seeds": {"number": 1}}],
        "job": {"name": "static", "cpus": 2, "field_outputs": ["displacement"]}
    }"#;

    #[test]
    fn truss_input_builds_a_staged_model() {
        let path = write_temp("olivine_input_truss.json", TRUSS_INPUT);
        let (model, job) = load_model(path.to_str().unwrap(), None).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(model.name, "truss");
        assert_eq!(model.parts.len(), 1);
        assert_eq!(model.regions.len(), 3);
        assert_eq!(model.steps.len(), 1);
        assert_eq!(model.boundary_conditions.len(), 1);
        assert_eq!(model.loads.len(), 1);
        assert_eq!(model.mesh_specs.len(), 1);
        assert_eq!(job.name, "static");
        assert_eq!(job.num_cpus, 2);
        assert_eq!(job.field_outputs, vec![FieldOutput::Displacement]);
    }

    #[test]
    fn missing_sections_are_rejected() {
        let path = write_temp("olivine_input_bare.json", r#"{"model": "empty"}"#);
        let err = load_model(path.to_str().unwrap(), None).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, PipelineError::Input(_)));
    }

    #[test]
    fn unknown_dof_names_are_rejected() {
        let bad = TRUSS_INPUT.replace("\"encastre\": true", "\"dofs\": {\"u9\": 0.0}");
        let path = write_temp("olivine_input_baddof.json", &bad);
        let err = load_model(path.to_str().unwrap(), None).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, PipelineError::Input(_)));
    }

    #[test]
    fn svg_rect_becomes_a_rectangle_profile() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
            <rect x="0" y="0" width="40" height="20"/>
        </svg>"#;
        let path = write_temp("olivine_profile.svg", svg);
        let profile = parse_svg(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(profile.primitives.len(), 1);
        match &profile.primitives[0] {
            SketchPrimitive::Rectangle { p1, p2 } => {
                assert_eq!(*p1, [0.0, -20.0]);
                assert_eq!(*p2, [40.0, 0.0]);
            }
            other => panic!("expected a rectangle, got {:?}", other),
        }
    }

    #[test]
    fn svg_polygon_becomes_closed_lines() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
            <polygon points="0,0 10,0 10,5 0,5"/>
        </svg>"#;
        let path = write_temp("olivine_polygon.svg", svg);
        let profile = parse_svg(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(profile.primitives.len(), 4);
        let chains = profile.chains().unwrap();
        assert_eq!(chains.len(), 1);
        assert!(chains[0].closed);
    }
}
