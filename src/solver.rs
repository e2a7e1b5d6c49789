//! In-process linear static solver.
//!
//! Assembles the global stiffness from the generated meshes, applies the
//! active boundary conditions and loads of each analysis step, and solves
//! the reduced system. Small systems go through a dense Cholesky
//! factorization; larger ones use conjugate gradient over the sparse
//! stiffness with a progress-bar observer.
//!
//! The backend supports one nodal dof family per solve: planar membranes
//! and trusses (u1, u2), plate bending (w, w_x, w_y), or solid bricks
//! (u1, u2, u3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        ArgminFloat, Error, Executor, Operator, State, KV,
    },
    solver::conjugategradient::ConjugateGradient,
};
use indicatif::ProgressBar;
use nalgebra::{DMatrix, DVector, SVector};
use nalgebra_sparse::{coo::CooMatrix, csr::CsrMatrix};

use crate::constraints::LoadKind;
use crate::elements;
use crate::error::{PipelineError, Result};
use crate::geom::{self, Point, Vector};
use crate::mesh::{DofFamily, ElementType};
use crate::model::Model;
use crate::part::EntityKind;
use crate::properties::SectionKind;

pub const MAX_CG_ITER: u64 = 1e6 as u64;

/// Free-dof count above which the dense direct path gives way to CG.
const DIRECT_SOLVE_LIMIT: usize = 5000;

/// Tolerance for matching mesh nodes to geometry.
const NODE_TOL: f64 = 1e-6;

/// Nodal results of one solved analysis step.
#[derive(Debug, Clone)]
pub struct StepFrame {
    pub step: String,
    /// Per node: translations (u1, u2, u3); for plate meshes only the
    /// transverse deflection is carried, in the third slot.
    pub displacement: Vec<[f64; 3]>,
    /// Per node reaction force at prescribed dofs, same layout.
    pub reaction: Vec<[f64; 3]>,
    /// Per element scalar stress (von Mises or axial).
    pub stress: Vec<f64>,
    /// Per element scalar strain magnitude.
    pub strain: Vec<f64>,
}

struct SectionParams {
    kind: SectionKind,
    youngs: f64,
    poisson: f64,
}

/// One element with globally numbered nodes.
struct GlobalElement {
    element_type: ElementType,
    nodes: Vec<usize>,
    region: String,
}

struct Assembled {
    nodes: Vec<Point>,
    /// (part name, node offset, node count) per mesh.
    part_ranges: Vec<(String, usize, usize)>,
    elements: Vec<GlobalElement>,
    family: DofFamily,
    triplets: Vec<(usize, usize, f64)>,
}

/// Solves every analysis step of a staged, meshed model.
///
/// # Arguments
/// * `model` - A meshed model with at least one analysis step
/// * `cancel` - Cooperative cancellation flag polled between phases
///
/// # Returns
/// One result frame per analysis step, in chain order.
pub fn run(model: &Model, cancel: &AtomicBool) -> Result<Vec<StepFrame>> {
    if model.meshes.is_empty() {
        return Err(PipelineError::IncompleteModel(
            "model has no generated mesh".to_owned(),
        ));
    }
    if model.steps.is_empty() {
        return Err(PipelineError::IncompleteModel(
            "model has no analysis step".to_owned(),
        ));
    }

    let assembled = assemble(model, cancel)?;
    let ndof = assembled.nodes.len() * assembled.family.dofs_per_node();
    println!(
        "info: assembled {} elements, {} dofs",
        assembled.elements.len(),
        ndof
    );

    let mut frames = Vec::with_capacity(model.steps.len());
    for (index, step) in model.steps.iter().enumerate() {
        check_cancelled(cancel)?;
        let order = index + 1;
        let prescribed = prescribed_dofs(model, &assembled, order)?;
        if prescribed.is_empty() {
            return Err(PipelineError::IncompleteModel(format!(
                "step '{}' has no active boundary condition",
                step.name
            )));
        }
        let force = load_vector(model, &assembled, order, ndof)?;
        let u = solve_system(&assembled.triplets, ndof, &prescribed, &force, cancel)?;
        let reaction = reactions(&assembled.triplets, &u, &force, &prescribed);
        let (stress, strain) = recover(model, &assembled, &u)?;
        println!("info: solved step '{}'", step.name);
        frames.push(StepFrame {
            step: step.name.clone(),
            displacement: nodal_field(&u, &assembled, None),
            reaction: nodal_field(&reaction, &assembled, Some(&prescribed)),
            stress,
            strain,
        });
    }
    Ok(frames)
}

fn check_cancelled(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        return Err(PipelineError::Killed("solve cancelled".to_owned()));
    }
    Ok(())
}

fn section_params(model: &Model, region: &str) -> Result<SectionParams> {
    let section = model.assigned_section(region).ok_or_else(|| {
        PipelineError::IncompleteModel(format!("region '{}' has no section", region))
    })?;
    let material = model.material(&section.material)?;
    Ok(SectionParams {
        kind: section.kind,
        youngs: material.youngs_modulus,
        poisson: material.poissons_ratio,
    })
}

/// Builds global node numbering and the stiffness triplets.
fn assemble(model: &Model, cancel: &AtomicBool) -> Result<Assembled> {
    let family = model.meshes[0].dof_family().ok_or_else(|| {
        PipelineError::IncompleteModel("generated mesh has no elements".to_owned())
    })?;
    let mut nodes: Vec<Point> = Vec::new();
    let mut part_ranges = Vec::new();
    let mut elements: Vec<GlobalElement> = Vec::new();
    for mesh in &model.meshes {
        if mesh.dof_family() != Some(family) {
            return Err(PipelineError::Solver(
                "meshes mix nodal dof families; the in-process backend solves one at a time"
                    .to_owned(),
            ));
        }
        let offset = nodes.len();
        part_ranges.push((mesh.part.clone(), offset, mesh.nodes.len()));
        nodes.extend(mesh.nodes.iter().copied());
        for element in &mesh.elements {
            elements.push(GlobalElement {
                element_type: element.element_type,
                nodes: element.nodes.iter().map(|n| n + offset).collect(),
                region: element.region.clone(),
            });
        }
    }

    let mut params: HashMap<String, SectionParams> = HashMap::new();
    for element in &elements {
        if !params.contains_key(&element.region) {
            params.insert(
                element.region.clone(),
                section_params(model, &element.region)?,
            );
        }
    }

    let per_node = family.dofs_per_node();
    let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
    let bar = ProgressBar::new(elements.len() as u64);
    for element in &elements {
        check_cancelled(cancel)?;
        let p = &params[&element.region];
        match element.element_type {
            ElementType::Tri3 => {
                let coords = planar_coords::<3>(&nodes, &element.nodes)?;
                let SectionKind::Shell { thickness } = p.kind else {
                    return Err(PipelineError::Solver(format!(
                        "region '{}': membrane triangles need a shell section",
                        element.region
                    )));
                };
                let k = elements::tri3_stiffness(&coords, p.youngs, p.poisson, thickness)?;
                scatter(&mut triplets, &element.nodes, per_node, k.as_slice());
            }
            ElementType::Quad4 => {
                let (points, oriented) = plate_corners(&nodes, &element.nodes);
                let (a, b) = elements::plate_rectangle(&points)?;
                let SectionKind::Shell { thickness } = p.kind else {
                    return Err(PipelineError::Solver(format!(
                        "region '{}': plate quads need a shell section",
                        element.region
                    )));
                };
                let k = elements::plate_stiffness(a, b, p.youngs, p.poisson, thickness)?;
                scatter(&mut triplets, &oriented, per_node, k.as_slice());
            }
            ElementType::Hex8 => {
                let points = corner_points::<8>(&nodes, &element.nodes);
                let k = elements::hex8_stiffness(&points, p.youngs, p.poisson)?;
                scatter(&mut triplets, &element.nodes, per_node, k.as_slice());
            }
            ElementType::Bar2 => {
                let coords = planar_coords::<2>(&nodes, &element.nodes)?;
                let SectionKind::Truss { area } = p.kind else {
                    return Err(PipelineError::Solver(format!(
                        "region '{}': truss bars need a truss section",
                        element.region
                    )));
                };
                let k = elements::bar2_stiffness(&coords, p.youngs, area)?;
                scatter(&mut triplets, &element.nodes, per_node, k.as_slice());
            }
        }
        bar.inc(1);
    }
    bar.finish();

    Ok(Assembled {
        nodes,
        part_ranges,
        elements,
        family,
        triplets,
    })
}

/// Column-major element stiffness scattered into global triplets.
fn scatter(
    triplets: &mut Vec<(usize, usize, f64)>,
    element_nodes: &[usize],
    per_node: usize,
    k: &[f64],
) {
    let edofs: Vec<usize> = element_nodes
        .iter()
        .flat_map(|&n| (0..per_node).map(move |s| n * per_node + s))
        .collect();
    let n = edofs.len();
    for col in 0..n {
        for row in 0..n {
            let v = k[col * n + row];
            if v != 0.0 {
                triplets.push((edofs[row], edofs[col], v));
            }
        }
    }
}

fn corner_points<const N: usize>(nodes: &[Point], element_nodes: &[usize]) -> [Point; N] {
    let mut out = [Point::origin(); N];
    for (i, &n) in element_nodes.iter().enumerate() {
        out[i] = nodes[n];
    }
    out
}

/// Canonical corner order for an axis-aligned plate rectangle.
///
/// Slope dofs live in the element's local frame, so every plate element
/// must agree on that frame where meshes meet. Axis-aligned rectangles are
/// reordered to (xmin,ymin), (xmax,ymin), (xmax,ymax), (xmin,ymax); other
/// rectangles keep their structured-grid order, which is already uniform
/// within a face.
fn plate_corners(
    nodes: &[Point],
    element_nodes: &[usize],
) -> ([Point; 4], [usize; 4]) {
    let points = corner_points::<4>(nodes, element_nodes);
    let xmin = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let xmax = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let ymin = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let ymax = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    let tol = NODE_TOL * (1.0 + (xmax - xmin).abs() + (ymax - ymin).abs());

    let mut order = [usize::MAX; 4];
    for (i, p) in points.iter().enumerate() {
        let at = |v: f64, bound: f64| (v - bound).abs() <= tol;
        let slot = match (at(p.x, xmin), at(p.x, xmax), at(p.y, ymin), at(p.y, ymax)) {
            (true, false, true, false) => 0,
            (false, true, true, false) => 1,
            (false, true, false, true) => 2,
            (true, false, false, true) => 3,
            _ => {
                // not axis-aligned; keep the given order
                let fallback = [element_nodes[0], element_nodes[1], element_nodes[2], element_nodes[3]];
                return (points, fallback);
            }
        };
        order[slot] = i;
    }

    let mut oriented_points = [Point::origin(); 4];
    let mut oriented_nodes = [0usize; 4];
    for (slot, &i) in order.iter().enumerate() {
        oriented_points[slot] = points[i];
        oriented_nodes[slot] = element_nodes[i];
    }
    (oriented_points, oriented_nodes)
}

/// Planar element coordinates; the mesh must lie in the z = 0 plane.
fn planar_coords<const N: usize>(
    nodes: &[Point],
    element_nodes: &[usize],
) -> Result<[[f64; 2]; N]> {
    let mut out = [[0.0; 2]; N];
    for (i, &n) in element_nodes.iter().enumerate() {
        let p = nodes[n];
        if p.z.abs() > NODE_TOL {
            return Err(PipelineError::Solver(
                "planar elements must lie in the z = 0 plane".to_owned(),
            ));
        }
        out[i] = [p.x, p.y];
    }
    Ok(out)
}

/// Maps the 6-wide dof indices onto this family's nodal slots.
fn dof_slot(family: DofFamily, dof: usize) -> Option<usize> {
    match family {
        DofFamily::PlanarTranslation => match dof {
            0 => Some(0),
            1 => Some(1),
            _ => None,
        },
        DofFamily::PlateBending => match dof {
            2 => Some(0), // w
            4 => Some(1), // ur2 constrains the x slope
            3 => Some(2), // ur1 constrains the y slope
            _ => None,
        },
        DofFamily::SolidTranslation => match dof {
            0 => Some(0),
            1 => Some(1),
            2 => Some(2),
            _ => None,
        },
    }
}

/// Mesh node indices lying on an entity of the given region.
fn region_node_indices(
    model: &Model,
    assembled: &Assembled,
    region_name: &str,
) -> Result<Vec<usize>> {
    let region = model.region(region_name)?;
    let (_, offset, count) = assembled
        .part_ranges
        .iter()
        .find(|(name, _, _)| *name == region.part)
        .ok_or_else(|| {
            PipelineError::IncompleteModel(format!(
                "region '{}' targets unmeshed part '{}'",
                region_name, region.part
            ))
        })?;
    let part = model.part(&region.part)?;
    let ids = model.resolve_region(region_name)?;

    let mut hits = Vec::new();
    for ni in *offset..offset + count {
        let p = &assembled.nodes[ni];
        let on_entity = ids.iter().any(|id| match id.kind {
            EntityKind::Vertex => geom::points_close(p, &part.vertex_point(id.index), NODE_TOL),
            EntityKind::Edge => {
                let edge = &part.edges()[id.index];
                geom::dist_point_segment(
                    p,
                    &part.vertex_point(edge.ends[0]),
                    &part.vertex_point(edge.ends[1]),
                ) <= NODE_TOL
            }
            EntityKind::Face => {
                geom::dist_point_polygon(p, &part.face_ring_points(id.index)) <= NODE_TOL
            }
            EntityKind::Cell => {
                geom::dist_point_cell(p, &part.cell_face_loops(id.index)) <= NODE_TOL
            }
        });
        if on_entity {
            hits.push(ni);
        }
    }
    if hits.is_empty() {
        return Err(PipelineError::Solver(format!(
            "no mesh node lies on region '{}'",
            region_name
        )));
    }
    Ok(hits)
}

/// Active prescribed dofs at the given step order. Conditions activate at
/// their creation step and persist; a later activation overwrites an
/// inherited value, which the constraint layer only admits under the
/// Replace policy.
fn prescribed_dofs(
    model: &Model,
    assembled: &Assembled,
    order: usize,
) -> Result<HashMap<usize, f64>> {
    let per_node = assembled.family.dofs_per_node();
    let mut active: Vec<_> = model
        .boundary_conditions
        .iter()
        .filter(|bc| {
            model
                .step_order(&bc.step)
                .map(|o| o <= order)
                .unwrap_or(false)
        })
        .collect();
    active.sort_by_key(|bc| model.step_order(&bc.step).unwrap_or(0));

    let mut prescribed = HashMap::new();
    for bc in active {
        let node_indices = region_node_indices(model, assembled, &bc.region)?;
        for dof in 0..6 {
            let Some(value) = bc.mask.prescribed[dof] else {
                continue;
            };
            let Some(slot) = dof_slot(assembled.family, dof) else {
                continue;
            };
            for &ni in &node_indices {
                prescribed.insert(ni * per_node + slot, value);
            }
        }
    }
    Ok(prescribed)
}

/// Assembles the global force vector for one step.
fn load_vector(
    model: &Model,
    assembled: &Assembled,
    order: usize,
    ndof: usize,
) -> Result<DVector<f64>> {
    let per_node = assembled.family.dofs_per_node();
    let mut f = DVector::<f64>::zeros(ndof);
    for load in &model.loads {
        if model.step_order(&load.step)? > order {
            continue;
        }
        match &load.kind {
            LoadKind::ConcentratedForce { vector } => {
                let node_indices = region_node_indices(model, assembled, &load.region)?;
                for &ni in &node_indices {
                    for (dof, value) in vector.iter().enumerate() {
                        if let Some(slot) = dof_slot(assembled.family, dof) {
                            f[ni * per_node + slot] += value;
                        }
                    }
                }
            }
            LoadKind::Pressure { magnitude } => {
                apply_pressure(model, assembled, &load.region, *magnitude, &mut f)?;
            }
        }
    }
    Ok(f)
}

/// Distributes a face pressure to the mesh. Positive pressure acts against
/// the face normal (pushes into the surface).
fn apply_pressure(
    model: &Model,
    assembled: &Assembled,
    region_name: &str,
    magnitude: f64,
    f: &mut DVector<f64>,
) -> Result<()> {
    let region = model.region(region_name)?;
    let part = model.part(&region.part)?;
    let per_node = assembled.family.dofs_per_node();
    let loaded: Vec<(Vec<Point>, Vector)> = model
        .resolve_region(region_name)?
        .iter()
        .map(|id| (part.face_ring_points(id.index), part.face_normal(id.index)))
        .collect();
    let on_loaded_face = |p: &Point| {
        loaded
            .iter()
            .any(|(ring, _)| geom::dist_point_polygon(p, ring) <= NODE_TOL)
    };

    match assembled.family {
        DofFamily::PlateBending => {
            // consistent load on every plate element lying inside a loaded
            // face; positive pressure acts against the +w direction
            for element in &assembled.elements {
                if element.element_type != ElementType::Quad4 {
                    continue;
                }
                let (points, oriented) = plate_corners(&assembled.nodes, &element.nodes);
                let centroid = geom::polygon_centroid(&points);
                if !on_loaded_face(&centroid) {
                    continue;
                }
                let (a, b) = elements::plate_rectangle(&points)?;
                let fe = elements::plate_pressure_load(a, b, -magnitude)?;
                for (i, &n) in oriented.iter().enumerate() {
                    for s in 0..3 {
                        f[n * per_node + s] += fe[3 * i + s];
                    }
                }
            }
        }
        DofFamily::SolidTranslation => {
            // tributary lumping over boundary quads of the loaded faces
            const HEX_FACES: [[usize; 4]; 6] = [
                [0, 1, 2, 3],
                [4, 5, 6, 7],
                [0, 1, 5, 4],
                [1, 2, 6, 5],
                [2, 3, 7, 6],
                [3, 0, 4, 7],
            ];
            for element in &assembled.elements {
                if element.element_type != ElementType::Hex8 {
                    continue;
                }
                for local in HEX_FACES {
                    let quad: Vec<Point> = local
                        .iter()
                        .map(|&i| assembled.nodes[element.nodes[i]])
                        .collect();
                    let Some((_, normal)) = loaded.iter().find(|(ring, _)| {
                        quad.iter()
                            .all(|p| geom::dist_point_polygon(p, ring) <= NODE_TOL)
                    }) else {
                        continue;
                    };
                    let area = geom::polygon_area(&quad);
                    let traction = normal * (-magnitude) * (area / 4.0);
                    for &i in &local {
                        let n = element.nodes[i];
                        for s in 0..3 {
                            f[n * per_node + s] += traction[s];
                        }
                    }
                }
            }
        }
        DofFamily::PlanarTranslation => {
            return Err(PipelineError::Solver(format!(
                "pressure load on region '{}' is not supported on planar meshes",
                region_name
            )));
        }
    }
    Ok(())
}

/// Solves K u = f with the prescribed dofs eliminated.
fn solve_system(
    triplets: &[(usize, usize, f64)],
    ndof: usize,
    prescribed: &HashMap<usize, f64>,
    force: &DVector<f64>,
    cancel: &AtomicBool,
) -> Result<DVector<f64>> {
    let mut free_index: Vec<Option<usize>> = vec![None; ndof];
    let mut free_count = 0;
    for (dof, slot) in free_index.iter_mut().enumerate() {
        if !prescribed.contains_key(&dof) {
            *slot = Some(free_count);
            free_count += 1;
        }
    }
    if free_count == 0 {
        return Err(PipelineError::Solver(
            "every dof is prescribed; nothing to solve".to_owned(),
        ));
    }

    let mut rhs = DVector::<f64>::zeros(free_count);
    for dof in 0..ndof {
        if let Some(fi) = free_index[dof] {
            rhs[fi] = force[dof];
        }
    }
    let mut reduced: Vec<(usize, usize, f64)> = Vec::new();
    for &(row, col, v) in triplets {
        match (free_index[row], free_index[col]) {
            (Some(fr), Some(fc)) => reduced.push((fr, fc, v)),
            (Some(fr), None) => rhs[fr] -= v * prescribed[&col],
            _ => {}
        }
    }

    check_cancelled(cancel)?;
    let u_free = if free_count <= DIRECT_SOLVE_LIMIT {
        let mut k = DMatrix::<f64>::zeros(free_count, free_count);
        for (row, col, v) in reduced {
            k[(row, col)] += v;
        }
        k.cholesky()
            .ok_or_else(|| {
                PipelineError::Solver(
                    "stiffness matrix is not positive definite; check boundary conditions"
                        .to_owned(),
                )
            })?
            .solve(&rhs)
    } else {
        let mut coo = CooMatrix::<f64>::new(free_count, free_count);
        for (row, col, v) in reduced {
            coo.push(row, col, v);
        }
        let csr = CsrMatrix::from(&coo);
        run_conjugate_gradient(&csr, &rhs, cancel)?
    };

    let mut u = DVector::<f64>::zeros(ndof);
    for dof in 0..ndof {
        u[dof] = match free_index[dof] {
            Some(fi) => u_free[fi],
            None => prescribed[&dof],
        };
    }
    Ok(u)
}

/// Runs multiplication for the conjugate gradient solver.
struct ConjugateGradientOperator<'a> {
    a: &'a CsrMatrix<f64>,
    cancel: &'a AtomicBool,
}

impl Operator for ConjugateGradientOperator<'_> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> std::result::Result<Self::Output, Error> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(argmin::core::Error::msg("cancelled"));
        }
        let mut y = vec![0.0; x.len()];
        for (i, row) in self.a.row_iter().enumerate() {
            let mut sum = 0.0;
            for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                sum += v * x[j];
            }
            y[i] = sum;
        }
        Ok(y)
    }
}

/// Observer bar for the argmin solver.
struct ConjugateGradientObserverBar {
    bar: ProgressBar,
    final_mag: f64,
}

impl ConjugateGradientObserverBar {
    fn new(target_cost: f64) -> ConjugateGradientObserverBar {
        ConjugateGradientObserverBar {
            bar: ProgressBar::new(1000),
            final_mag: target_cost.log10().floor(),
        }
    }

    fn argmin_float_to_f64<F: ArgminFloat>(&self, value: F) -> Option<f64> {
        format!("{:?}", value).parse().ok()
    }
}

impl<I> Observe<I> for ConjugateGradientObserverBar
where
    I: State,
{
    fn observe_init(&mut self, _name: &str, _state: &I, _kv: &KV) -> std::result::Result<(), Error> {
        Ok(())
    }

    fn observe_iter(&mut self, state: &I, _kv: &KV) -> std::result::Result<(), Error> {
        let Some(cost) = self.argmin_float_to_f64(state.get_cost()) else {
            return Ok(());
        };
        let cost_mag = cost.log10().floor();
        let progress = (1000. / f64::sqrt((cost_mag - self.final_mag).max(1.0))) as u64;
        self.bar.set_position(progress);
        Ok(())
    }

    fn observe_final(&mut self, _state: &I) -> std::result::Result<(), Error> {
        self.bar.finish();
        Ok(())
    }
}

/// Approximates x in `Ax = b` by conjugate gradient over the sparse matrix.
fn run_conjugate_gradient(
    a: &CsrMatrix<f64>,
    b: &DVector<f64>,
    cancel: &AtomicBool,
) -> Result<DVector<f64>> {
    let b_flat: Vec<f64> = b.iter().copied().collect();
    let target_cost = (1e-10 * b.norm().max(1e-30)).powi(2);
    let solver: ConjugateGradient<_, f64> = ConjugateGradient::new(b_flat);
    let initial_guess: Vec<f64> = vec![0.0; b.nrows()];

    let operator = ConjugateGradientOperator { a, cancel };
    let observer = ConjugateGradientObserverBar::new(target_cost);

    let res = match Executor::new(operator, solver)
        .configure(|state| {
            state
                .param(initial_guess)
                .max_iters(MAX_CG_ITER)
                .target_cost(target_cost)
        })
        .add_observer(observer, ObserverMode::NewBest)
        .run()
    {
        Ok(r) => r,
        Err(err) => {
            if cancel.load(Ordering::Relaxed) {
                return Err(PipelineError::Killed("solve cancelled".to_owned()));
            }
            return Err(PipelineError::Solver(format!(
                "conjugate gradient error: {err}"
            )));
        }
    };

    match &res.state().best_param {
        Some(vec) => Ok(DVector::from_vec(vec.clone())),
        None => Err(PipelineError::SolverDivergence(
            "conjugate gradient produced no best parameter".to_owned(),
        )),
    }
}

/// Reaction vector r = K u - f, nonzero only at prescribed dofs.
fn reactions(
    triplets: &[(usize, usize, f64)],
    u: &DVector<f64>,
    force: &DVector<f64>,
    prescribed: &HashMap<usize, f64>,
) -> DVector<f64> {
    let mut r = -force.clone();
    for &(row, col, v) in triplets {
        r[row] += v * u[col];
    }
    for dof in 0..r.nrows() {
        if !prescribed.contains_key(&dof) {
            r[dof] = 0.0;
        }
    }
    r
}

/// Expands a dof vector into per-node translation triples.
fn nodal_field(
    values: &DVector<f64>,
    assembled: &Assembled,
    restrict_to: Option<&HashMap<usize, f64>>,
) -> Vec<[f64; 3]> {
    let per_node = assembled.family.dofs_per_node();
    let mut out = vec![[0.0; 3]; assembled.nodes.len()];
    for (ni, entry) in out.iter_mut().enumerate() {
        for slot in 0..per_node {
            let dof = ni * per_node + slot;
            if let Some(map) = restrict_to {
                if !map.contains_key(&dof) {
                    continue;
                }
            }
            let axis = match assembled.family {
                DofFamily::PlanarTranslation | DofFamily::SolidTranslation => slot,
                // only the transverse deflection is a translation
                DofFamily::PlateBending => {
                    if slot == 0 {
                        2
                    } else {
                        continue;
                    }
                }
            };
            entry[axis] = values[dof];
        }
    }
    out
}

/// Per-element scalar stress and strain recovery.
fn recover(
    model: &Model,
    assembled: &Assembled,
    u: &DVector<f64>,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let per_node = assembled.family.dofs_per_node();
    let gather = |element: &GlobalElement, out: &mut [f64]| {
        for (i, &n) in element.nodes.iter().enumerate() {
            for s in 0..per_node {
                out[i * per_node + s] = u[n * per_node + s];
            }
        }
    };

    let mut stress = Vec::with_capacity(assembled.elements.len());
    let mut strain = Vec::with_capacity(assembled.elements.len());
    for element in &assembled.elements {
        let p = section_params(model, &element.region)?;
        let (s, e) = match element.element_type {
            ElementType::Tri3 => {
                let coords = planar_coords::<3>(&assembled.nodes, &element.nodes)?;
                let mut ue = SVector::<f64, 6>::zeros();
                gather(element, ue.as_mut_slice());
                elements::tri3_recover(&coords, p.youngs, p.poisson, &ue)?
            }
            ElementType::Quad4 => {
                let (points, oriented) = plate_corners(&assembled.nodes, &element.nodes);
                let (a, b) = elements::plate_rectangle(&points)?;
                let SectionKind::Shell { thickness } = p.kind else {
                    return Err(PipelineError::Solver(format!(
                        "region '{}': plate quads need a shell section",
                        element.region
                    )));
                };
                let mut ue = SVector::<f64, 12>::zeros();
                for (i, &n) in oriented.iter().enumerate() {
                    for s in 0..per_node {
                        ue[i * per_node + s] = u[n * per_node + s];
                    }
                }
                elements::plate_recover(a, b, p.youngs, p.poisson, thickness, &ue)?
            }
            ElementType::Hex8 => {
                let points = corner_points::<8>(&assembled.nodes, &element.nodes);
                let mut ue = SVector::<f64, 24>::zeros();
                gather(element, ue.as_mut_slice());
                elements::hex8_recover(&points, p.youngs, p.poisson, &ue)?
            }
            ElementType::Bar2 => {
                let coords = planar_coords::<2>(&assembled.nodes, &element.nodes)?;
                let mut ue = SVector::<f64, 4>::zeros();
                gather(element, ue.as_mut_slice());
                elements::bar2_recover(&coords, p.youngs, &ue)?
            }
        };
        stress.push(s);
        strain.push(e);
    }
    Ok((stress, strain))
}

/// Global node coordinates of the assembled model, in solve order.
pub fn global_nodes(model: &Model) -> Vec<Point> {
    model
        .meshes
        .iter()
        .flat_map(|m| m.nodes.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{self, DofMask};
    use crate::mesh::{self, Seeding};
    use crate::model::INITIAL_STEP;
    use crate::part::{Part, Profile, SketchPrimitive};
    use crate::properties::{self, Material, Section};

    /// Symmetric two-bar truss with a downward apex force; the apex drop
    /// and bar stresses have closed forms.
    #[test]
    fn two_bar_truss_matches_hand_solution() {
        let profile = Profile::new(vec![
            SketchPrimitive::Line {
                a: [0.0, 0.0],
                b: [1.0, 1.0],
            },
            SketchPrimitive::Line {
                a: [1.0, 1.0],
                b: [2.0, 0.0],
            },
        ]);
        let mut model = Model::new("truss");
        model
            .add_part(Part::base_wire("Frame", &profile).unwrap())
            .unwrap();
        model
            .add_material(Material::new("steel", 7800.0, 200e9, 0.29).unwrap())
            .unwrap();
        model
            .add_section(Section::new("rod", "steel", SectionKind::Truss { area: 1e-4 }).unwrap())
            .unwrap();
        model
            .define_region(
                "members",
                "Frame",
                EntityKind::Edge,
                vec![Point::new(0.5, 0.5, 0.0), Point::new(1.5, 0.5, 0.0)],
            )
            .unwrap();
        model
            .define_region(
                "supports",
                "Frame",
                EntityKind::Vertex,
                vec![Point::new(0.0, 0.0, 0.0), Point::new(2.0, 0.0, 0.0)],
            )
            .unwrap();
        model
            .define_region(
                "apex",
                "Frame",
                EntityKind::Vertex,
                vec![Point::new(1.0, 1.0, 0.0)],
            )
            .unwrap();
        properties::assign_section(&mut model, "members", "rod").unwrap();
        model.add_step("Loading", INITIAL_STEP).unwrap();
        constraints::add_boundary_condition(
            &mut model,
            "pins",
            INITIAL_STEP,
            "supports",
            DofMask::encastre(),
        )
        .unwrap();
        constraints::add_load(
            &mut model,
            "tip",
            "Loading",
            "apex",
            LoadKind::ConcentratedForce {
                vector: [0.0, -1000.0, 0.0],
            },
        )
        .unwrap();
        mesh::set_mesh_spec(
            &mut model,
            "members",
            ElementType::Bar2,
            Seeding::ByNumber { count: 1 },
        )
        .unwrap();
        mesh::generate_mesh(&mut model).unwrap();

        let cancel = AtomicBool::new(false);
        let frames = run(&model, &cancel).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];

        // vertical apex stiffness of two 45-degree bars: 2 (EA/L) sin^2(45)
        let length = 2f64.sqrt();
        let k_v = 2.0 * (200e9 * 1e-4 / length) * 0.5;
        let expected_drop = 1000.0 / k_v;
        let nodes = global_nodes(&model);
        let apex = nodes
            .iter()
            .position(|p| geom::points_close(p, &Point::new(1.0, 1.0, 0.0), 1e-9))
            .unwrap();
        let drop = -frame.displacement[apex][1];
        assert!(
            (drop - expected_drop).abs() < 1e-9,
            "expected {expected_drop}, got {drop}"
        );
        // supports carry the full load
        let total_reaction: f64 = frame.reaction.iter().map(|r| r[1]).sum();
        assert!((total_reaction - 1000.0).abs() < 1e-6);
        // bar force F / (2 cos 45), stress = force / area
        let axial = 1000.0 / (2.0 * (0.5f64).sqrt()) / 1e-4;
        for s in &frame.stress {
            assert!((s - axial).abs() < 1e-3 * axial);
        }
    }

    #[test]
    fn cancellation_kills_the_solve() {
        let profile = Profile::new(vec![SketchPrimitive::Line {
            a: [0.0, 0.0],
            b: [1.0, 0.0],
        }]);
        let mut model = Model::new("bar");
        model
            .add_part(Part::base_wire("Bar", &profile).unwrap())
            .unwrap();
        model
            .add_material(Material::new("steel", 7800.0, 200e9, 0.29).unwrap())
            .unwrap();
        model
            .add_section(Section::new("rod", "steel", SectionKind::Truss { area: 1e-4 }).unwrap())
            .unwrap();
        model
            .define_region(
                "member",
                "Bar",
                EntityKind::Edge,
                vec![Point::new(0.5, 0.0, 0.0)],
            )
            .unwrap();
        properties::assign_section(&mut model, "member", "rod").unwrap();
        model.add_step("Loading", INITIAL_STEP).unwrap();
        model
            .define_region(
                "end",
                "Bar",
                EntityKind::Vertex,
                vec![Point::new(0.0, 0.0, 0.0)],
            )
            .unwrap();
        constraints::add_boundary_condition(
            &mut model,
            "pin",
            INITIAL_STEP,
            "end",
            DofMask::encastre(),
        )
        .unwrap();
        mesh::set_mesh_spec(
            &mut model,
            "member",
            ElementType::Bar2,
            Seeding::ByNumber { count: 1 },
        )
        .unwrap();
        mesh::generate_mesh(&mut model).unwrap();

        let cancel = AtomicBool::new(true);
        let err = run(&model, &cancel).unwrap_err();
        assert!(matches!(err, PipelineError::Killed(_)));
    }
}
