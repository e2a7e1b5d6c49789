//! Face and cell partitioning.
//!
//! Both operations rebuild the owning part's arenas wholesale and bump the
//! topology generation, so partitioning only ever grows entity counts and
//! every previously issued id goes stale. Callers get the derived
//! sub-entities back by re-resolving representative points against the new
//! topology.
//!
//! Re-issuing an equivalent partition is a no-op: the existing boundary at
//! the requested path or plane is detected and the entities on both sides
//! are returned unchanged.

use std::collections::HashMap;

use crate::error::{PipelineError, Result};
use crate::geom::{self, Plane, Point};
use crate::part::{CellSpec, EntityId, EntityKind, FaceSpec, Part};
use crate::resolver;

/// Splits the face at `face_point` along the chord `a -> b`, both chord
/// endpoints lying on the face boundary.
///
/// # Returns
/// The two derived sub-faces (or the existing pair when the chord already
/// exists as an edge).
pub fn partition_face_by_path(
    part: &mut Part,
    face_point: &Point,
    a: &Point,
    b: &Point,
    tolerance: f64,
) -> Result<Vec<EntityId>> {
    let face_id = resolver::resolve(part, EntityKind::Face, face_point, tolerance)?;

    // Idempotence: the chord may already exist as an edge.
    if let Some(edge_index) = find_edge_spanning(part, a, b, tolerance) {
        let adjacent = faces_adjacent_to_edge(part, edge_index);
        // a partition chord always separates two faces; a boundary edge is
        // a degenerate re-issue, not a prior partition
        if adjacent.len() < 2 {
            return Err(PipelineError::DuplicatePartition(format!(
                "path ({:.4}, {:.4}, {:.4}) -> ({:.4}, {:.4}, {:.4}) matches an existing \
                 boundary edge of part '{}'",
                a.x, a.y, a.z, b.x, b.y, b.z, part.name
            )));
        }
        println!(
            "info: partition path on part '{}' already exists; returning {} adjacent face(s)",
            part.name,
            adjacent.len()
        );
        return Ok(adjacent.iter().map(|&fi| part.id(EntityKind::Face, fi)).collect());
    }

    let ring = part.face_ring_points(face_id.index);
    let normal = part.face_normal(face_id.index);
    let (loop1, loop2) = match geom::slice_loop(&ring, a, b, tolerance) {
        Ok(split) => split,
        Err(PipelineError::Geometry(reason))
            if reason.contains("boundary") || reason.contains("degenerate") =>
        {
            return Err(PipelineError::DuplicatePartition(format!(
                "path on part '{}' follows an existing boundary: {}",
                part.name, reason
            )));
        }
        Err(other) => return Err(other),
    };
    let rep1 = geom::polygon_centroid(&loop1);
    let rep2 = geom::polygon_centroid(&loop2);

    // Rebuild every face, swapping the sliced one for its two halves.
    let mut faces: Vec<FaceSpec> = Vec::with_capacity(part.faces().len() + 1);
    let mut remap: HashMap<usize, Vec<usize>> = HashMap::new();
    for fi in 0..part.faces().len() {
        if fi == face_id.index {
            remap.insert(fi, vec![faces.len(), faces.len() + 1]);
            faces.push(FaceSpec {
                ring: loop1.clone(),
                normal_hint: Some(normal),
            });
            faces.push(FaceSpec {
                ring: loop2.clone(),
                normal_hint: Some(normal),
            });
        } else {
            remap.insert(fi, vec![faces.len()]);
            faces.push(FaceSpec {
                ring: part.face_ring_points(fi),
                normal_hint: Some(part.face_normal(fi)),
            });
        }
    }
    let cells = remap_cells(part, &remap);
    part.install(faces, cells, Vec::new());

    Ok(vec![
        resolver::resolve(part, EntityKind::Face, &rep1, tolerance)?,
        resolver::resolve(part, EntityKind::Face, &rep2, tolerance)?,
    ])
}

/// Splits the cell at `cell_point` with a datum plane: bounding faces are
/// classified against the plane, crossing faces are split, and both halves
/// are closed with a shared cap face on the plane.
///
/// # Returns
/// The two derived sub-cells (or the existing pair when a coplanar interior
/// face already separates them).
pub fn partition_cell_by_plane(
    part: &mut Part,
    plane: &Plane,
    cell_point: &Point,
    tolerance: f64,
) -> Result<Vec<EntityId>> {
    let cell_id = resolver::resolve(part, EntityKind::Cell, cell_point, tolerance)?;

    // Idempotence: a coplanar face already on the plane means this (or an
    // equivalent) partition ran before.
    let coplanar: Vec<usize> = (0..part.faces().len())
        .filter(|&fi| face_on_plane(part, fi, plane, tolerance))
        .collect();
    if !coplanar.is_empty() {
        let mut cells: Vec<usize> = Vec::new();
        for ci in 0..part.cells().len() {
            if part
                .cell_face_indices(ci)
                .iter()
                .any(|fi| coplanar.contains(fi))
            {
                cells.push(ci);
            }
        }
        if cells.len() < 2 {
            return Err(PipelineError::DuplicatePartition(format!(
                "plane coincides with an existing boundary face of part '{}'",
                part.name
            )));
        }
        println!(
            "info: partition plane on part '{}' already exists; returning {} adjacent cell(s)",
            part.name,
            cells.len()
        );
        return Ok(cells.iter().map(|&ci| part.id(EntityKind::Cell, ci)).collect());
    }

    // Classify and split the target cell's bounding faces.
    let mut neg_faces: Vec<FaceSpec> = Vec::new();
    let mut pos_faces: Vec<FaceSpec> = Vec::new();
    let mut cuts: Vec<Point> = Vec::new();
    let mut crossed = false;
    for &fi in part.cell_face_indices(cell_id.index) {
        let ring = part.face_ring_points(fi);
        let normal = part.face_normal(fi);
        match geom::split_loop_by_plane(&ring, plane, tolerance) {
            Some((neg_ring, pos_ring, face_cuts)) => {
                crossed = true;
                neg_faces.push(FaceSpec {
                    ring: neg_ring,
                    normal_hint: Some(normal),
                });
                pos_faces.push(FaceSpec {
                    ring: pos_ring,
                    normal_hint: Some(normal),
                });
                cuts.extend(face_cuts);
            }
            None => {
                let spec = FaceSpec {
                    ring: ring.clone(),
                    normal_hint: Some(normal),
                };
                let side: f64 = ring.iter().map(|p| plane.signed_distance(p)).sum();
                if side <= 0.0 {
                    neg_faces.push(spec);
                } else {
                    pos_faces.push(spec);
                }
            }
        }
    }
    if !crossed {
        return Err(PipelineError::Geometry(format!(
            "partition plane does not intersect the cell interior of part '{}'",
            part.name
        )));
    }
    let cap = cap_ring(&cuts, plane, tolerance)?;

    // Pre-compute representative points of both halves for re-resolution.
    let rep_of = |specs: &[FaceSpec]| -> Point {
        let mut sum = geom::Vector::zeros();
        let mut count = 0usize;
        for spec in specs {
            for p in &spec.ring {
                sum += p.coords;
                count += 1;
            }
        }
        Point::from(sum / count.max(1) as f64)
    };
    let rep_neg = rep_of(&neg_faces);
    let rep_pos = rep_of(&pos_faces);

    // Rebuild the part: untouched faces keep their loops, the target cell
    // becomes two cells that share the cap face.
    let mut faces: Vec<FaceSpec> = Vec::new();
    let mut remap: HashMap<usize, Vec<usize>> = HashMap::new();
    let target: Vec<usize> = part.cell_face_indices(cell_id.index).to_vec();
    for fi in 0..part.faces().len() {
        if !target.contains(&fi) {
            remap.insert(fi, vec![faces.len()]);
            faces.push(FaceSpec {
                ring: part.face_ring_points(fi),
                normal_hint: Some(part.face_normal(fi)),
            });
        }
    }
    let neg_start = faces.len();
    faces.extend(neg_faces);
    let pos_start = faces.len();
    faces.extend(pos_faces);
    let cap_index = faces.len();
    faces.push(FaceSpec {
        ring: cap,
        normal_hint: Some(plane.normal),
    });

    let mut cells: Vec<CellSpec> = Vec::new();
    for ci in 0..part.cells().len() {
        if ci == cell_id.index {
            let mut neg: Vec<usize> = (neg_start..pos_start).collect();
            neg.push(cap_index);
            let mut pos: Vec<usize> = (pos_start..cap_index).collect();
            pos.push(cap_index);
            cells.push(CellSpec { face_indices: neg });
            cells.push(CellSpec { face_indices: pos });
        } else {
            let face_indices = part
                .cell_face_indices(ci)
                .iter()
                .map(|fi| remap[fi][0])
                .collect();
            cells.push(CellSpec { face_indices });
        }
    }
    part.install(faces, cells, Vec::new());
    part.orient_cell_faces_outward();

    Ok(vec![
        resolver::resolve(part, EntityKind::Cell, &rep_neg, tolerance)?,
        resolver::resolve(part, EntityKind::Cell, &rep_pos, tolerance)?,
    ])
}

/// Orders the collected intersection points into a polygon on the plane.
fn cap_ring(cuts: &[Point], plane: &Plane, tolerance: f64) -> Result<Vec<Point>> {
    let mut unique: Vec<Point> = Vec::new();
    for p in cuts {
        if !unique.iter().any(|q| geom::points_close(p, q, tolerance)) {
            unique.push(*p);
        }
    }
    if unique.len() < 3 {
        return Err(PipelineError::Geometry(
            "partition plane intersection is degenerate".to_owned(),
        ));
    }
    let mut center = geom::Vector::zeros();
    for p in &unique {
        center += p.coords;
    }
    let center = Point::from(center / unique.len() as f64);
    let (u, v) = geom::plane_basis(&plane.normal);
    unique.sort_by(|p, q| {
        let pa = (p - center).dot(&v).atan2((p - center).dot(&u));
        let qa = (q - center).dot(&v).atan2((q - center).dot(&u));
        pa.total_cmp(&qa)
    });
    Ok(unique)
}

fn face_on_plane(part: &Part, face_index: usize, plane: &Plane, tolerance: f64) -> bool {
    part.face_ring_points(face_index)
        .iter()
        .all(|p| plane.signed_distance(p).abs() <= tolerance)
}

fn find_edge_spanning(part: &Part, a: &Point, b: &Point, tolerance: f64) -> Option<usize> {
    for (ei, edge) in part.edges().iter().enumerate() {
        let p0 = part.vertex_point(edge.ends[0]);
        let p1 = part.vertex_point(edge.ends[1]);
        let forward =
            geom::points_close(&p0, a, tolerance) && geom::points_close(&p1, b, tolerance);
        let backward =
            geom::points_close(&p0, b, tolerance) && geom::points_close(&p1, a, tolerance);
        if forward || backward {
            return Some(ei);
        }
    }
    None
}

fn faces_adjacent_to_edge(part: &Part, edge_index: usize) -> Vec<usize> {
    let ends = part.edges()[edge_index].ends;
    let mut adjacent = Vec::new();
    for (fi, face) in part.faces().iter().enumerate() {
        let n = face.ring.len();
        for i in 0..n {
            let (v0, v1) = (face.ring[i], face.ring[(i + 1) % n]);
            if (v0 == ends[0] && v1 == ends[1]) || (v0 == ends[1] && v1 == ends[0]) {
                adjacent.push(fi);
                break;
            }
        }
    }
    adjacent
}

fn remap_cells(part: &Part, remap: &HashMap<usize, Vec<usize>>) -> Vec<CellSpec> {
    part.cells()
        .iter()
        .map(|cell| CellSpec {
            face_indices: cell
                .faces
                .iter()
                .flat_map(|fi| remap[fi].iter().copied())
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::{Profile, SketchPrimitive};

    fn plate() -> Part {
        let profile = Profile::new(vec![SketchPrimitive::Rectangle {
            p1: [0.0, 0.0],
            p2: [1.0, 0.4],
        }]);
        Part::base_shell("Plate", &profile).unwrap()
    }

    fn beam() -> Part {
        let profile = Profile::new(vec![SketchPrimitive::Rectangle {
            p1: [0.0, 0.0],
            p2: [0.05, 0.05],
        }]);
        Part::base_solid_extrude("Beam", &profile, 0.5).unwrap()
    }

    #[test]
    fn face_partition_yields_two_sub_faces() {
        let mut part = plate();
        let sub = partition_face_by_path(
            &mut part,
            &Point::new(0.5, 0.2, 0.0),
            &Point::new(0.5, 0.0, 0.0),
            &Point::new(0.5, 0.4, 0.0),
            1e-6,
        )
        .unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(part.entity_count(EntityKind::Face), 2);
        assert_eq!(part.entity_count(EntityKind::Edge), 7);
        assert_eq!(part.entity_count(EntityKind::Vertex), 6);
        let a0 = part.face_area(sub[0].index);
        let a1 = part.face_area(sub[1].index);
        assert!((a0 + a1 - 0.4).abs() < 1e-9);
    }

    #[test]
    fn face_partition_is_idempotent() {
        let mut part = plate();
        let a = Point::new(0.5, 0.0, 0.0);
        let b = Point::new(0.5, 0.4, 0.0);
        partition_face_by_path(&mut part, &Point::new(0.5, 0.2, 0.0), &a, &b, 1e-6).unwrap();
        let generation = part.generation();
        let again =
            partition_face_by_path(&mut part, &Point::new(0.25, 0.2, 0.0), &a, &b, 1e-6).unwrap();
        assert_eq!(part.generation(), generation);
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn boundary_path_reports_duplicate() {
        let mut part = plate();
        // the full bottom edge already exists as a boundary edge
        let err = partition_face_by_path(
            &mut part,
            &Point::new(0.5, 0.2, 0.0),
            &Point::new(0.0, 0.0, 0.0),
            &Point::new(1.0, 0.0, 0.0),
            1e-6,
        )
        .unwrap_err();
        match err {
            PipelineError::DuplicatePartition(_) => {}
            other => panic!("expected DuplicatePartition, got {:?}", other),
        }
    }

    #[test]
    fn representative_points_survive_partition() {
        let mut part = plate();
        let left_rep = Point::new(0.25, 0.2, 0.0);
        partition_face_by_path(
            &mut part,
            &Point::new(0.5, 0.2, 0.0),
            &Point::new(0.5, 0.0, 0.0),
            &Point::new(0.5, 0.4, 0.0),
            1e-6,
        )
        .unwrap();
        let id = resolver::resolve(&part, EntityKind::Face, &left_rep, 1e-6).unwrap();
        assert!((part.face_area(id.index) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn cell_partition_yields_two_boxes() {
        let mut part = beam();
        let sub = partition_cell_by_plane(
            &mut part,
            &Plane::xy(0.25),
            &Point::new(0.025, 0.025, 0.25),
            1e-6,
        )
        .unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(part.entity_count(EntityKind::Cell), 2);
        assert_eq!(part.entity_count(EntityKind::Face), 11);
        assert_eq!(part.entity_count(EntityKind::Vertex), 12);
    }

    #[test]
    fn cell_partition_is_idempotent() {
        let mut part = beam();
        let mid = Point::new(0.025, 0.025, 0.25);
        partition_cell_by_plane(&mut part, &Plane::xy(0.25), &mid, 1e-6).unwrap();
        let generation = part.generation();
        let again = partition_cell_by_plane(&mut part, &Plane::xy(0.25), &mid, 1e-6).unwrap();
        assert_eq!(part.generation(), generation);
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn boundary_plane_reports_duplicate() {
        let mut part = beam();
        let err = partition_cell_by_plane(
            &mut part,
            &Plane::xy(0.0),
            &Point::new(0.025, 0.025, 0.25),
            1e-6,
        )
        .unwrap_err();
        match err {
            PipelineError::DuplicatePartition(_) => {}
            other => panic!("expected DuplicatePartition, got {:?}", other),
        }
    }
}
