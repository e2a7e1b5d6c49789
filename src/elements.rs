//! Element stiffness formulations for the in-process linear static solver.
//!
//! - `Tri3`: constant-strain plane-stress triangle (2 dof/node).
//! - `Quad4`: 12-dof rectangular plate-bending element over the polynomial
//!   basis {1, x, y, x2, xy, y2, x3, x2y, xy2, y3, x3y, xy3}, nodal dofs
//!   (w, w_x, w_y), Gauss-integrated.
//! - `Hex8`: trilinear isoparametric brick, 2x2x2 Gauss quadrature.
//! - `Bar2`: planar 2-node truss.

use nalgebra::{Matrix2, Matrix3, SMatrix, SVector};

use crate::error::{PipelineError, Result};
use crate::geom::{self, Point};

/// 2-point Gauss rule on [-1, 1].
const GAUSS_2: [(f64, f64); 2] = [(-0.577_350_269_189_625_8, 1.0), (0.577_350_269_189_625_8, 1.0)];

/// 3-point Gauss rule on [-1, 1].
const GAUSS_3: [(f64, f64); 3] = [
    (-0.774_596_669_241_483_4, 0.555_555_555_555_555_6),
    (0.0, 0.888_888_888_888_888_9),
    (0.774_596_669_241_483_4, 0.555_555_555_555_555_6),
];

/// Plane-stress constitutive matrix.
fn plane_stress_d(youngs: f64, poisson: f64) -> Matrix3<f64> {
    let c = youngs / (1.0 - poisson * poisson);
    Matrix3::new(
        c,
        c * poisson,
        0.0,
        c * poisson,
        c,
        0.0,
        0.0,
        0.0,
        c * (1.0 - poisson) / 2.0,
    )
}

/// Isotropic 3D constitutive matrix.
fn solid_d(youngs: f64, poisson: f64) -> SMatrix<f64, 6, 6> {
    let c = youngs / ((1.0 + poisson) * (1.0 - 2.0 * poisson));
    let diag = c * (1.0 - poisson);
    let off = c * poisson;
    let shear = c * (1.0 - 2.0 * poisson) / 2.0;
    let mut d = SMatrix::<f64, 6, 6>::zeros();
    for i in 0..3 {
        for j in 0..3 {
            d[(i, j)] = if i == j { diag } else { off };
        }
        d[(i + 3, i + 3)] = shear;
    }
    d
}

// ---------------------------------------------------------------------------
// Tri3: constant-strain triangle
// ---------------------------------------------------------------------------

/// Strain-displacement matrix and area of a CST triangle in the xy plane.
fn tri3_b(coords: &[[f64; 2]; 3]) -> Result<(SMatrix<f64, 3, 6>, f64)> {
    let [p0, p1, p2] = coords;
    let det = (p1[0] - p0[0]) * (p2[1] - p0[1]) - (p2[0] - p0[0]) * (p1[1] - p0[1]);
    let area = det / 2.0;
    if area <= 1e-14 {
        return Err(PipelineError::Solver(
            "triangle element with non-positive area".to_owned(),
        ));
    }
    let b1 = p1[1] - p2[1];
    let b2 = p2[1] - p0[1];
    let b3 = p0[1] - p1[1];
    let c1 = p2[0] - p1[0];
    let c2 = p0[0] - p2[0];
    let c3 = p1[0] - p0[0];
    let mut b = SMatrix::<f64, 3, 6>::zeros();
    b[(0, 0)] = b1;
    b[(0, 2)] = b2;
    b[(0, 4)] = b3;
    b[(1, 1)] = c1;
    b[(1, 3)] = c2;
    b[(1, 5)] = c3;
    b[(2, 0)] = c1;
    b[(2, 1)] = b1;
    b[(2, 2)] = c2;
    b[(2, 3)] = b2;
    b[(2, 4)] = c3;
    b[(2, 5)] = b3;
    b /= det;
    Ok((b, area))
}

/// Stiffness of a plane-stress CST triangle (dofs u1, u2 per node).
pub fn tri3_stiffness(
    coords: &[[f64; 2]; 3],
    youngs: f64,
    poisson: f64,
    thickness: f64,
) -> Result<SMatrix<f64, 6, 6>> {
    let (b, area) = tri3_b(coords)?;
    let d = plane_stress_d(youngs, poisson);
    Ok(b.transpose() * d * b * area * thickness)
}

/// Von Mises stress and strain magnitude of a CST triangle from its nodal
/// displacement vector.
pub fn tri3_recover(
    coords: &[[f64; 2]; 3],
    youngs: f64,
    poisson: f64,
    u: &SVector<f64, 6>,
) -> Result<(f64, f64)> {
    let (b, _) = tri3_b(coords)?;
    let strain = b * u;
    let stress = plane_stress_d(youngs, poisson) * strain;
    let vm = (stress[0].powi(2) - stress[0] * stress[1] + stress[1].powi(2)
        + 3.0 * stress[2].powi(2))
    .sqrt();
    let sm = (strain[0].powi(2) + strain[1].powi(2) + strain[2].powi(2) / 2.0).sqrt();
    Ok((vm, sm))
}

// ---------------------------------------------------------------------------
// Quad4: rectangular plate bending
// ---------------------------------------------------------------------------

/// Local rectangle geometry of a plate element: in-plane side lengths.
/// The four corner points must form a rectangle traversed in order.
pub fn plate_rectangle(points: &[Point; 4]) -> Result<(f64, f64)> {
    let e1 = points[1] - points[0];
    let e2 = points[3] - points[0];
    let a = e1.norm();
    let b = e2.norm();
    if a < 1e-12 || b < 1e-12 {
        return Err(PipelineError::Solver(
            "plate element with a degenerate side".to_owned(),
        ));
    }
    let skew = e1.dot(&e2).abs() / (a * b);
    let closure = (points[0].coords + e1 + e2 - points[2].coords).norm();
    if skew > 1e-6 || closure > 1e-9 * (a + b) {
        return Err(PipelineError::Solver(
            "plate bending elements must be rectangles".to_owned(),
        ));
    }
    Ok((a, b))
}

/// Polynomial basis row at (x, y).
fn plate_p(x: f64, y: f64) -> SVector<f64, 12> {
    SVector::<f64, 12>::from_row_slice(&[
        1.0,
        x,
        y,
        x * x,
        x * y,
        y * y,
        x * x * x,
        x * x * y,
        x * y * y,
        y * y * y,
        x * x * x * y,
        x * y * y * y,
    ])
}

fn plate_p_x(x: f64, y: f64) -> SVector<f64, 12> {
    SVector::<f64, 12>::from_row_slice(&[
        0.0,
        1.0,
        0.0,
        2.0 * x,
        y,
        0.0,
        3.0 * x * x,
        2.0 * x * y,
        y * y,
        0.0,
        3.0 * x * x * y,
        y * y * y,
    ])
}

fn plate_p_y(x: f64, y: f64) -> SVector<f64, 12> {
    SVector::<f64, 12>::from_row_slice(&[
        0.0,
        0.0,
        1.0,
        0.0,
        x,
        2.0 * y,
        0.0,
        x * x,
        2.0 * x * y,
        3.0 * y * y,
        x * x * x,
        3.0 * x * y * y,
    ])
}

/// Curvature rows (w_xx, w_yy, 2 w_xy) of the polynomial basis.
fn plate_b(x: f64, y: f64) -> SMatrix<f64, 3, 12> {
    let mut b = SMatrix::<f64, 3, 12>::zeros();
    // w_xx
    b[(0, 3)] = 2.0;
    b[(0, 6)] = 6.0 * x;
    b[(0, 7)] = 2.0 * y;
    b[(0, 10)] = 6.0 * x * y;
    // w_yy
    b[(1, 5)] = 2.0;
    b[(1, 8)] = 2.0 * x;
    b[(1, 9)] = 6.0 * y;
    b[(1, 11)] = 6.0 * x * y;
    // 2 w_xy
    b[(2, 4)] = 2.0;
    b[(2, 7)] = 4.0 * x;
    b[(2, 8)] = 4.0 * y;
    b[(2, 10)] = 6.0 * x * x;
    b[(2, 11)] = 6.0 * y * y;
    b
}

/// Maps polynomial coefficients to nodal dofs (w, w_x, w_y) at the four
/// corners of the [0,a]x[0,b] rectangle, inverted numerically.
fn plate_a_inverse(a: f64, b: f64) -> Result<SMatrix<f64, 12, 12>> {
    let corners = [[0.0, 0.0], [a, 0.0], [a, b], [0.0, b]];
    let mut m = SMatrix::<f64, 12, 12>::zeros();
    for (n, [x, y]) in corners.iter().enumerate() {
        m.set_row(3 * n, &plate_p(*x, *y).transpose());
        m.set_row(3 * n + 1, &plate_p_x(*x, *y).transpose());
        m.set_row(3 * n + 2, &plate_p_y(*x, *y).transpose());
    }
    m.try_inverse().ok_or_else(|| {
        PipelineError::Solver("plate element basis matrix is singular".to_owned())
    })
}

fn plate_bending_d(youngs: f64, poisson: f64, thickness: f64) -> Matrix3<f64> {
    let rigidity = youngs * thickness.powi(3) / (12.0 * (1.0 - poisson * poisson));
    Matrix3::new(
        rigidity,
        rigidity * poisson,
        0.0,
        rigidity * poisson,
        rigidity,
        0.0,
        0.0,
        0.0,
        rigidity * (1.0 - poisson) / 2.0,
    )
}

/// Stiffness of the a x b rectangular plate-bending element, dofs
/// (w, w_x, w_y) per node.
pub fn plate_stiffness(
    a: f64,
    b: f64,
    youngs: f64,
    poisson: f64,
    thickness: f64,
) -> Result<SMatrix<f64, 12, 12>> {
    let a_inv = plate_a_inverse(a, b)?;
    let d = plate_bending_d(youngs, poisson, thickness);
    let mut k_poly = SMatrix::<f64, 12, 12>::zeros();
    for (gx, wx) in GAUSS_3 {
        for (gy, wy) in GAUSS_3 {
            let x = a * (gx + 1.0) / 2.0;
            let y = b * (gy + 1.0) / 2.0;
            let bm = plate_b(x, y);
            k_poly += bm.transpose() * d * bm * (wx * wy * a * b / 4.0);
        }
    }
    Ok(a_inv.transpose() * k_poly * a_inv)
}

/// Consistent nodal load vector for a uniform transverse pressure on the
/// a x b plate element.
pub fn plate_pressure_load(a: f64, b: f64, pressure: f64) -> Result<SVector<f64, 12>> {
    let a_inv = plate_a_inverse(a, b)?;
    let mut f_poly = SVector::<f64, 12>::zeros();
    for (gx, wx) in GAUSS_3 {
        for (gy, wy) in GAUSS_3 {
            let x = a * (gx + 1.0) / 2.0;
            let y = b * (gy + 1.0) / 2.0;
            f_poly += plate_p(x, y) * (pressure * wx * wy * a * b / 4.0);
        }
    }
    Ok(a_inv.transpose() * f_poly)
}

/// Surface von Mises stress and bending strain magnitude at the element
/// center from nodal dofs (w, w_x, w_y) x 4.
pub fn plate_recover(
    a: f64,
    b: f64,
    youngs: f64,
    poisson: f64,
    thickness: f64,
    u: &SVector<f64, 12>,
) -> Result<(f64, f64)> {
    let a_inv = plate_a_inverse(a, b)?;
    let coeffs = a_inv * u;
    let curvature = plate_b(a / 2.0, b / 2.0) * coeffs;
    let moments = plate_bending_d(youngs, poisson, thickness) * curvature;
    let factor = 6.0 / (thickness * thickness);
    let sx = moments[0] * factor;
    let sy = moments[1] * factor;
    let txy = moments[2] * factor;
    let vm = (sx * sx - sx * sy + sy * sy + 3.0 * txy * txy).sqrt();
    let half_t = thickness / 2.0;
    let strain = (curvature[0].powi(2) + curvature[1].powi(2) + curvature[2].powi(2) / 2.0)
        .sqrt()
        * half_t;
    Ok((vm, strain))
}

// ---------------------------------------------------------------------------
// Hex8: trilinear solid brick
// ---------------------------------------------------------------------------

/// Natural coordinates of the 8 corners (bottom ring CCW, then top ring).
const HEX_SIGNS: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// Shape-function derivatives w.r.t. natural coordinates at (xi, eta, zeta).
fn hex8_dn(xi: f64, eta: f64, zeta: f64) -> SMatrix<f64, 3, 8> {
    let mut dn = SMatrix::<f64, 3, 8>::zeros();
    for (n, s) in HEX_SIGNS.iter().enumerate() {
        dn[(0, n)] = s[0] * (1.0 + s[1] * eta) * (1.0 + s[2] * zeta) / 8.0;
        dn[(1, n)] = s[1] * (1.0 + s[0] * xi) * (1.0 + s[2] * zeta) / 8.0;
        dn[(2, n)] = s[2] * (1.0 + s[0] * xi) * (1.0 + s[1] * eta) / 8.0;
    }
    dn
}

/// Strain-displacement matrix and Jacobian determinant at one Gauss point.
fn hex8_b(
    coords: &SMatrix<f64, 3, 8>,
    xi: f64,
    eta: f64,
    zeta: f64,
) -> Result<(SMatrix<f64, 6, 24>, f64)> {
    let dn = hex8_dn(xi, eta, zeta);
    let jac = dn * coords.transpose();
    let det = jac.determinant();
    if det <= 1e-14 {
        return Err(PipelineError::Solver(
            "hex element with non-positive Jacobian".to_owned(),
        ));
    }
    let jac_inv = jac
        .try_inverse()
        .ok_or_else(|| PipelineError::Solver("singular hex Jacobian".to_owned()))?;
    let grads = jac_inv * dn; // 3x8, spatial derivatives of shape functions
    let mut b = SMatrix::<f64, 6, 24>::zeros();
    for n in 0..8 {
        let (gx, gy, gz) = (grads[(0, n)], grads[(1, n)], grads[(2, n)]);
        b[(0, 3 * n)] = gx;
        b[(1, 3 * n + 1)] = gy;
        b[(2, 3 * n + 2)] = gz;
        b[(3, 3 * n)] = gy;
        b[(3, 3 * n + 1)] = gx;
        b[(4, 3 * n + 1)] = gz;
        b[(4, 3 * n + 2)] = gy;
        b[(5, 3 * n)] = gz;
        b[(5, 3 * n + 2)] = gx;
    }
    Ok((b, det))
}

/// Stiffness of the trilinear brick (dofs u1, u2, u3 per node).
pub fn hex8_stiffness(
    points: &[Point; 8],
    youngs: f64,
    poisson: f64,
) -> Result<SMatrix<f64, 24, 24>> {
    let mut coords = SMatrix::<f64, 3, 8>::zeros();
    for (n, p) in points.iter().enumerate() {
        coords.set_column(n, &p.coords);
    }
    let d = solid_d(youngs, poisson);
    let mut k = SMatrix::<f64, 24, 24>::zeros();
    for (xi, wx) in GAUSS_2 {
        for (eta, wy) in GAUSS_2 {
            for (zeta, wz) in GAUSS_2 {
                let (b, det) = hex8_b(&coords, xi, eta, zeta)?;
                k += b.transpose() * d * b * (det * wx * wy * wz);
            }
        }
    }
    Ok(k)
}

/// Centroid von Mises stress and strain magnitude of a brick.
pub fn hex8_recover(
    points: &[Point; 8],
    youngs: f64,
    poisson: f64,
    u: &SVector<f64, 24>,
) -> Result<(f64, f64)> {
    let mut coords = SMatrix::<f64, 3, 8>::zeros();
    for (n, p) in points.iter().enumerate() {
        coords.set_column(n, &p.coords);
    }
    let (b, _) = hex8_b(&coords, 0.0, 0.0, 0.0)?;
    let strain = b * u;
    let stress = solid_d(youngs, poisson) * strain;
    let (sx, sy, sz, txy, tyz, tzx) =
        (stress[0], stress[1], stress[2], stress[3], stress[4], stress[5]);
    let vm = (0.5
        * ((sx - sy).powi(2) + (sy - sz).powi(2) + (sz - sx).powi(2))
        + 3.0 * (txy * txy + tyz * tyz + tzx * tzx))
        .sqrt();
    let sm = strain.norm();
    Ok((vm, sm))
}

// ---------------------------------------------------------------------------
// Bar2: planar truss
// ---------------------------------------------------------------------------

/// Stiffness of a 2-node planar truss bar (dofs u1, u2 per node).
pub fn bar2_stiffness(
    coords: &[[f64; 2]; 2],
    youngs: f64,
    area: f64,
) -> Result<SMatrix<f64, 4, 4>> {
    let dx = coords[1][0] - coords[0][0];
    let dy = coords[1][1] - coords[0][1];
    let length = (dx * dx + dy * dy).sqrt();
    if length < 1e-12 {
        return Err(PipelineError::Solver(
            "truss bar with zero length".to_owned(),
        ));
    }
    let c = dx / length;
    let s = dy / length;
    let k = youngs * area / length;
    let local = Matrix2::new(c * c, c * s, c * s, s * s);
    let mut out = SMatrix::<f64, 4, 4>::zeros();
    for i in 0..2 {
        for j in 0..2 {
            out[(i, j)] = k * local[(i, j)];
            out[(i, j + 2)] = -k * local[(i, j)];
            out[(i + 2, j)] = -k * local[(i, j)];
            out[(i + 2, j + 2)] = k * local[(i, j)];
        }
    }
    Ok(out)
}

/// Axial stress and strain of a truss bar.
pub fn bar2_recover(
    coords: &[[f64; 2]; 2],
    youngs: f64,
    u: &SVector<f64, 4>,
) -> Result<(f64, f64)> {
    let dx = coords[1][0] - coords[0][0];
    let dy = coords[1][1] - coords[0][1];
    let length = (dx * dx + dy * dy).sqrt();
    let c = dx / length;
    let s = dy / length;
    let strain = ((u[2] - u[0]) * c + (u[3] - u[1]) * s) / length;
    Ok(((youngs * strain).abs(), strain.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symmetric<const N: usize>(k: &SMatrix<f64, N, N>, scale: f64) -> bool {
        for i in 0..N {
            for j in 0..N {
                if (k[(i, j)] - k[(j, i)]).abs() > 1e-9 * scale {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn tri3_stiffness_is_symmetric_with_rigid_body_nullspace() {
        let coords = [[0.0, 0.0], [1.0, 0.0], [0.3, 0.8]];
        let k = tri3_stiffness(&coords, 200e9, 0.29, 0.01).unwrap();
        assert!(symmetric(&k, 200e9));
        // uniform translation produces no force
        let translation = SVector::<f64, 6>::from_row_slice(&[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert!((k * translation).norm() < 1e-3 * k.norm());
    }

    #[test]
    fn plate_stiffness_nullspace_contains_rigid_modes() {
        let k = plate_stiffness(0.05, 0.025, 200e9, 0.29, 0.01).unwrap();
        assert!(symmetric(&k, k.norm()));
        // uniform deflection
        let mut w = SVector::<f64, 12>::zeros();
        for n in 0..4 {
            w[3 * n] = 1.0;
        }
        assert!((k * w).norm() < 1e-6 * k.norm());
        // pure tilt about y: w = x, w_x = 1
        let corners = [[0.0, 0.0], [0.05, 0.0], [0.05, 0.025], [0.0, 0.025]];
        let mut tilt = SVector::<f64, 12>::zeros();
        for (n, [x, _]) in corners.iter().enumerate() {
            tilt[3 * n] = *x;
            tilt[3 * n + 1] = 1.0;
        }
        assert!((k * tilt).norm() < 1e-6 * k.norm());
    }

    #[test]
    fn plate_pressure_load_matches_total_force() {
        let (a, b, p) = (0.05, 0.025, 2000.0);
        let f = plate_pressure_load(a, b, p).unwrap();
        // deflection dofs carry the resultant
        let total: f64 = (0..4).map(|n| f[3 * n]).sum();
        assert!((total - p * a * b).abs() < 1e-9 * (p * a * b).abs());
    }

    #[test]
    fn hex8_stiffness_is_symmetric_with_rigid_body_nullspace() {
        let points = [
            Point::new(0.0, 0.0, 0.0),
            Point::new(2.0, 0.0, 0.0),
            Point::new(2.0, 1.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(0.0, 0.0, 1.5),
            Point::new(2.0, 0.0, 1.5),
            Point::new(2.0, 1.0, 1.5),
            Point::new(0.0, 1.0, 1.5),
        ];
        let k = hex8_stiffness(&points, 200e9, 0.29).unwrap();
        assert!(symmetric(&k, k.norm()));
        let mut translation = SVector::<f64, 24>::zeros();
        for n in 0..8 {
            translation[3 * n + 2] = 1.0;
        }
        assert!((k * translation).norm() < 1e-6 * k.norm());
    }

    #[test]
    fn bar2_axial_stretch() {
        let coords = [[0.0, 0.0], [2.0, 0.0]];
        let (e, area) = (200e9, 1.963e-5);
        let k = bar2_stiffness(&coords, e, area).unwrap();
        // stretch by 1e-3 along the axis
        let u = SVector::<f64, 4>::from_row_slice(&[0.0, 0.0, 1e-3, 0.0]);
        let f = k * u;
        let expected = e * area * 1e-3 / 2.0;
        assert!((f[2] - expected).abs() < 1e-6 * expected);
        let (stress, strain) = bar2_recover(&coords, e, &u).unwrap();
        assert!((strain - 5e-4).abs() < 1e-12);
        assert!((stress - e * 5e-4).abs() < 1e-3);
    }

    #[test]
    fn non_rectangular_plate_is_rejected() {
        let points = [
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(1.2, 1.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
        ];
        assert!(plate_rectangle(&points).is_err());
    }
}
