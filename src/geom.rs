//! Geometric primitives shared by the topology, resolver, and partition
//! layers.
//!
//! Parts are tessellated into planar polygon faces and polyhedral cells, so
//! everything here reduces to point/segment/polygon/polyhedron math. All
//! polygons are stored as ordered vertex loops; face normals follow the
//! right-hand rule around the loop.

use nalgebra::{Point3, Vector3};

use crate::error::{PipelineError, Result};

pub type Point = Point3<f64>;
pub type Vector = Vector3<f64>;

/// Absolute epsilon for degenerate-geometry checks.
pub const EPS: f64 = 1e-9;

/// An infinite plane in Hessian normal form: `normal . x == offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector,
    pub offset: f64,
}

impl Plane {
    /// Creates a plane from a (not necessarily unit) normal and offset.
    pub fn new(normal: Vector, offset: f64) -> Result<Plane> {
        let norm = normal.norm();
        if norm < EPS {
            return Err(PipelineError::Geometry(
                "plane normal has zero length".to_owned(),
            ));
        }
        Ok(Plane {
            normal: normal / norm,
            offset: offset / norm,
        })
    }

    pub fn from_point_normal(point: Point, normal: Vector) -> Result<Plane> {
        let norm = normal.norm();
        if norm < EPS {
            return Err(PipelineError::Geometry(
                "plane normal has zero length".to_owned(),
            ));
        }
        let unit = normal / norm;
        Ok(Plane {
            normal: unit,
            offset: unit.dot(&point.coords),
        })
    }

    /// Principal plane parallel to XY at `z = offset`.
    pub fn xy(offset: f64) -> Plane {
        Plane {
            normal: Vector::z(),
            offset,
        }
    }

    /// Principal plane parallel to YZ at `x = offset`.
    pub fn yz(offset: f64) -> Plane {
        Plane {
            normal: Vector::x(),
            offset,
        }
    }

    /// Principal plane parallel to XZ at `y = offset`.
    pub fn xz(offset: f64) -> Plane {
        Plane {
            normal: Vector::y(),
            offset,
        }
    }

    pub fn signed_distance(&self, point: &Point) -> f64 {
        self.normal.dot(&point.coords) - self.offset
    }

    /// True when `other` describes the same plane, regardless of the
    /// normal's sign.
    pub fn is_coincident(&self, other: &Plane, tol: f64) -> bool {
        let cross = self.normal.cross(&other.normal).norm();
        if cross > tol {
            return false;
        }
        if self.normal.dot(&other.normal) > 0.0 {
            (self.offset - other.offset).abs() <= tol
        } else {
            (self.offset + other.offset).abs() <= tol
        }
    }
}

pub fn points_close(a: &Point, b: &Point, tol: f64) -> bool {
    (a - b).norm() <= tol
}

/// Quantizes a point onto a grid of pitch `tol`, for hashing shared nodes.
pub fn point_key(p: &Point, tol: f64) -> (i64, i64, i64) {
    (
        (p.x / tol).round() as i64,
        (p.y / tol).round() as i64,
        (p.z / tol).round() as i64,
    )
}

pub fn lerp(a: &Point, b: &Point, t: f64) -> Point {
    Point::from(a.coords * (1.0 - t) + b.coords * t)
}

/// Newell's method; the result has magnitude `2 * area` and is not
/// normalized.
pub fn newell_normal(loop_points: &[Point]) -> Vector {
    let mut n = Vector::zeros();
    let count = loop_points.len();
    for i in 0..count {
        let a = &loop_points[i];
        let b = &loop_points[(i + 1) % count];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    n
}

pub fn polygon_area(loop_points: &[Point]) -> f64 {
    newell_normal(loop_points).norm() / 2.0
}

/// Area-weighted centroid of a planar polygon (fan decomposition).
pub fn polygon_centroid(loop_points: &[Point]) -> Point {
    let n = newell_normal(loop_points);
    let norm = n.norm();
    if norm < EPS || loop_points.len() < 3 {
        // degenerate loop, fall back to the vertex mean
        let mut sum = Vector::zeros();
        for p in loop_points {
            sum += p.coords;
        }
        return Point::from(sum / loop_points.len().max(1) as f64);
    }
    let unit = n / norm;
    let p0 = &loop_points[0];
    let mut area_sum = 0.0;
    let mut centroid = Vector::zeros();
    for i in 1..loop_points.len() - 1 {
        let p1 = &loop_points[i];
        let p2 = &loop_points[i + 1];
        let tri_area = 0.5 * (p1 - p0).cross(&(p2 - p0)).dot(&unit);
        let tri_centroid = (p0.coords + p1.coords + p2.coords) / 3.0;
        area_sum += tri_area;
        centroid += tri_centroid * tri_area;
    }
    if area_sum.abs() < EPS {
        return *p0;
    }
    Point::from(centroid / area_sum)
}

pub fn dist_point_segment(p: &Point, a: &Point, b: &Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < EPS * EPS {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - lerp(a, b, t)).norm()
}

/// Builds an orthonormal basis spanning the plane normal to `normal`.
pub fn plane_basis(normal: &Vector) -> (Vector, Vector) {
    let n = normal.normalize();
    let helper = if n.x.abs() < 0.9 {
        Vector::x()
    } else {
        Vector::y()
    };
    let u = n.cross(&helper).normalize();
    let v = n.cross(&u);
    (u, v)
}

/// 2D crossing-number containment test after projecting onto the polygon's
/// plane basis. The point is assumed to lie (near) the polygon's plane.
pub fn point_in_polygon(p: &Point, loop_points: &[Point], tol: f64) -> bool {
    let normal = newell_normal(loop_points);
    if normal.norm() < EPS {
        return false;
    }
    let (u, v) = plane_basis(&normal);
    let origin = loop_points[0];
    let px = (p - origin).dot(&u);
    let py = (p - origin).dot(&v);

    // boundary points count as inside
    let count = loop_points.len();
    for i in 0..count {
        if dist_point_segment(p, &loop_points[i], &loop_points[(i + 1) % count]) <= tol {
            return true;
        }
    }

    let mut inside = false;
    for i in 0..count {
        let a = &loop_points[i];
        let b = &loop_points[(i + 1) % count];
        let (ax, ay) = ((a - origin).dot(&u), (a - origin).dot(&v));
        let (bx, by) = ((b - origin).dot(&u), (b - origin).dot(&v));
        if (ay > py) != (by > py) {
            let x_cross = ax + (py - ay) / (by - ay) * (bx - ax);
            if px < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

/// True geometric distance from a point to a planar polygon.
pub fn dist_point_polygon(p: &Point, loop_points: &[Point]) -> f64 {
    let normal = newell_normal(loop_points);
    let norm = normal.norm();
    if norm < EPS {
        return loop_points
            .iter()
            .map(|v| (p - v).norm())
            .fold(f64::INFINITY, f64::min);
    }
    let unit = normal / norm;
    let plane_dist = unit.dot(&(p - loop_points[0]));
    let projected = Point::from(p.coords - unit * plane_dist);
    if point_in_polygon(&projected, loop_points, EPS) {
        return plane_dist.abs();
    }
    let count = loop_points.len();
    let mut best = f64::INFINITY;
    for i in 0..count {
        best = best.min(dist_point_segment(
            p,
            &loop_points[i],
            &loop_points[(i + 1) % count],
        ));
    }
    best
}

/// Ray/triangle intersection (Moller-Trumbore). Returns the ray parameter
/// and whether the hit landed near the triangle boundary.
fn ray_triangle(origin: &Point, dir: &Vector, a: &Point, b: &Point, c: &Point) -> Option<(f64, bool)> {
    let e1 = b - a;
    let e2 = c - a;
    let pvec = dir.cross(&e2);
    let det = e1.dot(&pvec);
    if det.abs() < EPS {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = origin - a;
    let u = tvec.dot(&pvec) * inv_det;
    if !(-EPS..=1.0 + EPS).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(&e1);
    let v = dir.dot(&qvec) * inv_det;
    if v < -EPS || u + v > 1.0 + EPS {
        return None;
    }
    let t = e2.dot(&qvec) * inv_det;
    if t <= EPS {
        return None;
    }
    let edge_margin = 1e-7;
    let grazing = u < edge_margin || v < edge_margin || u + v > 1.0 - edge_margin;
    Some((t, grazing))
}

/// Parity-based containment test against a closed set of polygon faces.
pub fn point_in_cell(p: &Point, face_loops: &[Vec<Point>]) -> bool {
    // A few fixed irrational-ish directions; retry when a ray grazes an
    // edge and the parity would be unreliable.
    let directions = [
        Vector::new(0.577_215, 0.301_029, 0.757_858),
        Vector::new(-0.318_309, 0.693_147, 0.646_601),
        Vector::new(0.707_106, -0.414_213, 0.573_421),
    ];
    let mut last_parity = false;
    for dir in &directions {
        let dir = dir.normalize();
        let mut hits = 0usize;
        let mut clean = true;
        for loop_points in face_loops {
            let p0 = &loop_points[0];
            for i in 1..loop_points.len() - 1 {
                if let Some((_, grazing)) =
                    ray_triangle(p, &dir, p0, &loop_points[i], &loop_points[i + 1])
                {
                    if grazing {
                        clean = false;
                    }
                    hits += 1;
                }
            }
        }
        last_parity = hits % 2 == 1;
        if clean {
            return last_parity;
        }
    }
    last_parity
}

pub fn dist_point_cell(p: &Point, face_loops: &[Vec<Point>]) -> f64 {
    if point_in_cell(p, face_loops) {
        return 0.0;
    }
    face_loops
        .iter()
        .map(|loop_points| dist_point_polygon(p, loop_points))
        .fold(f64::INFINITY, f64::min)
}

/// Splits a closed loop along the chord `a -> b`, both endpoints lying on
/// the loop boundary. Returns the two sub-loops; each contains the chord.
pub fn slice_loop(
    loop_points: &[Point],
    a: &Point,
    b: &Point,
    tol: f64,
) -> Result<(Vec<Point>, Vec<Point>)> {
    let count = loop_points.len();
    if count < 3 {
        return Err(PipelineError::Geometry(
            "cannot slice a loop with fewer than 3 vertices".to_owned(),
        ));
    }

    // Augment the loop with the chord endpoints inserted on their edges.
    let mut augmented: Vec<Point> = Vec::with_capacity(count + 2);
    for i in 0..count {
        let v0 = &loop_points[i];
        let v1 = &loop_points[(i + 1) % count];
        augmented.push(*v0);
        let mut on_edge: Vec<(f64, Point)> = Vec::new();
        for candidate in [a, b] {
            if points_close(candidate, v0, tol) || points_close(candidate, v1, tol) {
                continue;
            }
            if dist_point_segment(candidate, v0, v1) <= tol {
                let t = (candidate - v0).norm() / (v1 - v0).norm();
                on_edge.push((t, *candidate));
            }
        }
        on_edge.sort_by(|x, y| x.0.total_cmp(&y.0));
        for (_, p) in on_edge {
            augmented.push(p);
        }
    }

    let find = |target: &Point| -> Option<usize> {
        augmented
            .iter()
            .position(|p| points_close(p, target, tol))
    };
    let idx_a = find(a).ok_or_else(|| {
        PipelineError::Geometry(format!(
            "path endpoint ({:.6}, {:.6}, {:.6}) is not on the face boundary",
            a.x, a.y, a.z
        ))
    })?;
    let idx_b = find(b).ok_or_else(|| {
        PipelineError::Geometry(format!(
            "path endpoint ({:.6}, {:.6}, {:.6}) is not on the face boundary",
            b.x, b.y, b.z
        ))
    })?;
    if idx_a == idx_b {
        return Err(PipelineError::Geometry(
            "slice path endpoints coincide".to_owned(),
        ));
    }

    let n = augmented.len();
    let walk = |from: usize, to: usize| -> Vec<Point> {
        let mut out = Vec::new();
        let mut i = from;
        loop {
            out.push(augmented[i]);
            if i == to {
                break;
            }
            i = (i + 1) % n;
        }
        out
    };
    let loop1 = walk(idx_a, idx_b);
    let loop2 = walk(idx_b, idx_a);

    if loop1.len() < 3 || loop2.len() < 3 {
        return Err(PipelineError::Geometry(
            "slice path lies along the boundary".to_owned(),
        ));
    }
    if polygon_area(&loop1) < EPS || polygon_area(&loop2) < EPS {
        return Err(PipelineError::Geometry(
            "slice produces a degenerate sub-face".to_owned(),
        ));
    }
    Ok((loop1, loop2))
}

/// Splits a closed loop by a plane. Returns `(negative side, positive side,
/// intersection points)` or `None` when the plane does not cross the loop
/// interior.
pub fn split_loop_by_plane(
    loop_points: &[Point],
    plane: &Plane,
    tol: f64,
) -> Option<(Vec<Point>, Vec<Point>, Vec<Point>)> {
    let count = loop_points.len();
    let dist: Vec<f64> = loop_points
        .iter()
        .map(|p| plane.signed_distance(p))
        .collect();
    if !dist.iter().any(|d| *d > tol) || !dist.iter().any(|d| *d < -tol) {
        return None;
    }

    let mut neg: Vec<Point> = Vec::new();
    let mut pos: Vec<Point> = Vec::new();
    let mut cuts: Vec<Point> = Vec::new();
    for i in 0..count {
        let j = (i + 1) % count;
        let (p_i, d_i) = (&loop_points[i], dist[i]);
        let (p_j, d_j) = (&loop_points[j], dist[j]);
        if d_i <= tol {
            neg.push(*p_i);
        }
        if d_i >= -tol {
            pos.push(*p_i);
        }
        if (d_i > tol && d_j < -tol) || (d_i < -tol && d_j > tol) {
            let t = d_i / (d_i - d_j);
            let cut = lerp(p_i, p_j, t);
            neg.push(cut);
            pos.push(cut);
            cuts.push(cut);
        }
    }
    // on-plane vertices also belong to the section polygon
    for (i, d) in dist.iter().enumerate() {
        if d.abs() <= tol {
            cuts.push(loop_points[i]);
        }
    }
    if neg.len() < 3 || pos.len() < 3 {
        return None;
    }
    Some((neg, pos, cuts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(1.0, 1.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn newell_normal_of_square_points_up() {
        let n = newell_normal(&unit_square());
        assert!((n.normalize() - Vector::z()).norm() < 1e-12);
        assert!((polygon_area(&unit_square()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn centroid_of_square() {
        let c = polygon_centroid(&unit_square());
        assert!(points_close(&c, &Point::new(0.5, 0.5, 0.0), 1e-12));
    }

    #[test]
    fn polygon_distance_inside_and_out() {
        let square = unit_square();
        assert!((dist_point_polygon(&Point::new(0.5, 0.5, 0.3), &square) - 0.3).abs() < 1e-12);
        let d = dist_point_polygon(&Point::new(2.0, 0.5, 0.0), &square);
        assert!((d - 1.0).abs() < 1e-12);
    }

    #[test]
    fn slice_square_in_half() {
        let square = unit_square();
        let (l1, l2) = slice_loop(
            &square,
            &Point::new(0.5, 0.0, 0.0),
            &Point::new(0.5, 1.0, 0.0),
            1e-6,
        )
        .unwrap();
        assert!((polygon_area(&l1) - 0.5).abs() < 1e-9);
        assert!((polygon_area(&l2) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn slice_along_boundary_is_rejected() {
        let square = unit_square();
        let result = slice_loop(
            &square,
            &Point::new(0.0, 0.0, 0.0),
            &Point::new(1.0, 0.0, 0.0),
            1e-6,
        );
        assert!(result.is_err());
    }

    #[test]
    fn split_square_by_plane() {
        let square = unit_square();
        let plane = Plane::yz(0.25);
        let (neg, pos, cuts) = split_loop_by_plane(&square, &plane, 1e-9).unwrap();
        assert!((polygon_area(&neg) - 0.25).abs() < 1e-9);
        assert!((polygon_area(&pos) - 0.75).abs() < 1e-9);
        assert_eq!(cuts.len(), 2);
    }

    #[test]
    fn cube_containment() {
        let faces = vec![
            // bottom, top, four sides of the unit cube
            vec![
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(1.0, 1.0, 0.0),
                Point::new(0.0, 1.0, 0.0),
            ],
            vec![
                Point::new(0.0, 0.0, 1.0),
                Point::new(1.0, 0.0, 1.0),
                Point::new(1.0, 1.0, 1.0),
                Point::new(0.0, 1.0, 1.0),
            ],
            vec![
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 1.0),
                Point::new(0.0, 0.0, 1.0),
            ],
            vec![
                Point::new(0.0, 1.0, 0.0),
                Point::new(1.0, 1.0, 0.0),
                Point::new(1.0, 1.0, 1.0),
                Point::new(0.0, 1.0, 1.0),
            ],
            vec![
                Point::new(0.0, 0.0, 0.0),
                Point::new(0.0, 1.0, 0.0),
                Point::new(0.0, 1.0, 1.0),
                Point::new(0.0, 0.0, 1.0),
            ],
            vec![
                Point::new(1.0, 0.0, 0.0),
                Point::new(1.0, 1.0, 0.0),
                Point::new(1.0, 1.0, 1.0),
                Point::new(1.0, 0.0, 1.0),
            ],
        ];
        assert!(point_in_cell(&Point::new(0.4, 0.6, 0.5), &faces));
        assert!(!point_in_cell(&Point::new(1.5, 0.5, 0.5), &faces));
        assert!((dist_point_cell(&Point::new(0.5, 0.5, 2.0), &faces) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn coincident_planes_ignore_normal_sign() {
        let a = Plane::xy(2.0);
        let b = Plane::new(Vector::new(0.0, 0.0, -3.0), -6.0).unwrap();
        assert!(a.is_coincident(&b, 1e-9));
        assert!(!a.is_coincident(&Plane::xy(2.5), 1e-9));
    }
}
