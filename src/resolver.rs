//! Coordinate-to-entity resolution.
//!
//! Entities are found by geometric proximity to a query point, never by
//! index, so lookups written against the original topology keep working
//! after partitioning renumbers everything. The nearest entity within the
//! tolerance wins; an exact tie between two candidates is an error rather
//! than an arbitrary pick.

use crate::error::{PipelineError, Result};
use crate::geom::{self, Point};
use crate::part::{EntityId, EntityKind, Part};

/// Default query tolerance, in model length units.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Distance margin below which two candidates count as tied.
const TIE_TOL: f64 = 1e-9;

/// Distance from a query point to one entity of the given kind.
fn entity_distance(part: &Part, kind: EntityKind, index: usize, point: &Point) -> f64 {
    match kind {
        EntityKind::Vertex => (part.vertex_point(index) - point).norm(),
        EntityKind::Edge => {
            let edge = &part.edges()[index];
            geom::dist_point_segment(
                point,
                &part.vertex_point(edge.ends[0]),
                &part.vertex_point(edge.ends[1]),
            )
        }
        EntityKind::Face => geom::dist_point_polygon(point, &part.face_ring_points(index)),
        EntityKind::Cell => geom::dist_point_cell(point, &part.cell_face_loops(index)),
    }
}

/// Resolves the entity of `kind` nearest to `point`, within `tolerance`.
///
/// # Returns
/// The winning entity's id, stamped with the part's current generation.
pub fn resolve(part: &Part, kind: EntityKind, point: &Point, tolerance: f64) -> Result<EntityId> {
    let count = part.entity_count(kind);
    let mut best: Option<(usize, f64)> = None;
    let mut tied = 0usize;
    for index in 0..count {
        let distance = entity_distance(part, kind, index, point);
        if distance > tolerance {
            continue;
        }
        match best {
            None => {
                best = Some((index, distance));
                tied = 1;
            }
            Some((_, best_distance)) => {
                if distance < best_distance - TIE_TOL {
                    best = Some((index, distance));
                    tied = 1;
                } else if distance <= best_distance + TIE_TOL {
                    // within the tie band the first-seen, lowest arena
                    // index stays the anchor, so the tie count (and the
                    // ambiguity error it feeds) does not depend on float
                    // noise in the scan order
                    tied += 1;
                    if distance < best_distance {
                        best = Some((best.unwrap().0, distance));
                    }
                }
            }
        }
    }
    match best {
        Some((index, _)) if tied == 1 => Ok(part.id(kind, index)),
        Some(_) => Err(PipelineError::AmbiguousQuery {
            kind,
            x: point.x,
            y: point.y,
            z: point.z,
            count: tied,
        }),
        None => Err(PipelineError::NotFound {
            kind,
            x: point.x,
            y: point.y,
            z: point.z,
            tolerance,
        }),
    }
}

/// Resolves every entity of `kind` touching `point` within `tolerance`.
/// Unlike [`resolve`], multiple hits are expected here (e.g. the faces on
/// both sides of a partition edge).
pub fn resolve_all(
    part: &Part,
    kind: EntityKind,
    point: &Point,
    tolerance: f64,
) -> Result<Vec<EntityId>> {
    let count = part.entity_count(kind);
    let mut hits = Vec::new();
    for index in 0..count {
        if entity_distance(part, kind, index, point) <= tolerance {
            hits.push(part.id(kind, index));
        }
    }
    if hits.is_empty() {
        return Err(PipelineError::NotFound {
            kind,
            x: point.x,
            y: point.y,
            z: point.z,
            tolerance,
        });
    }
    Ok(hits)
}
