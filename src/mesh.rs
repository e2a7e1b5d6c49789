//! Mesh directives and mesh generation.
//!
//! Meshing is driven by the section assignments: every propertied entity
//! must be covered by a mesh spec naming a compatible element type.
//! Four-sided faces get structured quad grids (divisions from edge seeds
//! where present, otherwise from the mesh spec seeding), other faces fall back
//! to a triangular fan. Cells must be axis-aligned boxes for the
//! structured hex grid; anything else is unmeshable. Wire edges are
//! subdivided into 2-node bars.

use std::collections::HashMap;

use crate::error::{PipelineError, Result};
use crate::geom::{self, Point};
use crate::model::{Model, Stage};
use crate::part::{EntityId, EntityKind, Part};

/// Nodal dof family of an element formulation. One mesh may not mix
/// families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DofFamily {
    /// In-plane translations (u1, u2).
    PlanarTranslation,
    /// Transverse deflection and its two slopes (w, w_x, w_y).
    PlateBending,
    /// Spatial translations (u1, u2, u3).
    SolidTranslation,
}

impl DofFamily {
    pub fn dofs_per_node(&self) -> usize {
        match self {
            DofFamily::PlanarTranslation => 2,
            DofFamily::PlateBending => 3,
            DofFamily::SolidTranslation => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// Constant-strain plane-stress triangle.
    Tri3,
    /// Rectangular plate-bending quad.
    Quad4,
    /// Trilinear solid brick.
    Hex8,
    /// 2-node planar truss bar.
    Bar2,
}

impl ElementType {
    pub fn node_count(&self) -> usize {
        match self {
            ElementType::Tri3 => 3,
            ElementType::Quad4 => 4,
            ElementType::Hex8 => 8,
            ElementType::Bar2 => 2,
        }
    }

    pub fn dof_family(&self) -> DofFamily {
        match self {
            ElementType::Tri3 | ElementType::Bar2 => DofFamily::PlanarTranslation,
            ElementType::Quad4 => DofFamily::PlateBending,
            ElementType::Hex8 => DofFamily::SolidTranslation,
        }
    }

    /// The entity kind this element meshes.
    pub fn region_kind(&self) -> EntityKind {
        match self {
            ElementType::Tri3 | ElementType::Quad4 => EntityKind::Face,
            ElementType::Hex8 => EntityKind::Cell,
            ElementType::Bar2 => EntityKind::Edge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Seeding {
    ByNumber { count: usize },
    /// Target element size; `deviation` is the chordal-deviation factor
    /// (deviation / element size) honored along curved boundaries.
    BySize { size: f64, deviation: f64 },
}

impl Seeding {
    /// Division count for a straight span of the given length.
    fn divisions(&self, length: f64) -> usize {
        self.curved_divisions(length, None)
    }

    /// Division count for a span curving with the given radius. The
    /// target size is capped so a chord of that size deviates from the
    /// arc by no more than `deviation` times the size (sagitta of a
    /// chord h on radius r is h^2 / 8r).
    fn curved_divisions(&self, length: f64, radius: Option<f64>) -> usize {
        match self {
            Seeding::ByNumber { count } => (*count).max(1),
            Seeding::BySize { size, deviation } => {
                let target = match radius {
                    Some(r) => size.min(8.0 * deviation * r),
                    None => *size,
                };
                ((length / target).ceil() as usize).max(1)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeshSpec {
    pub region: String,
    pub element_type: ElementType,
    pub seeding: Seeding,
}

/// Seed directive on an edge region, overriding the mesh spec seeding along
/// the grid direction that follows the edge.
#[derive(Debug, Clone)]
pub struct EdgeSeed {
    pub region: String,
    pub seeding: Seeding,
}

#[derive(Debug, Clone)]
pub struct MeshElement {
    pub element_type: ElementType,
    pub nodes: Vec<usize>,
    /// The propertied region the element belongs to (section lookup key).
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub part: String,
    pub nodes: Vec<Point>,
    pub elements: Vec<MeshElement>,
}

impl Mesh {
    pub fn dof_family(&self) -> Option<DofFamily> {
        self.elements.first().map(|e| e.element_type.dof_family())
    }
}

/// Declares the element type and seeding for a region.
pub fn set_mesh_spec(
    model: &mut Model,
    region_name: &str,
    element_type: ElementType,
    seeding: Seeding,
) -> Result<()> {
    model.require_at_least(Stage::Propertied, "set_mesh_spec")?;
    model.require_at_most(Stage::Constrained, "set_mesh_spec")?;
    let region = model.region(region_name)?;
    if region.kind != element_type.region_kind() {
        return Err(PipelineError::UnmeshableRegion {
            region: region_name.to_owned(),
            reason: format!(
                "{:?} elements mesh {} entities, region holds {} entities",
                element_type,
                element_type.region_kind(),
                region.kind
            ),
        });
    }
    if let Seeding::BySize { size, deviation } = seeding {
        if size <= 0.0 {
            return Err(PipelineError::Input(format!(
                "seed size must be positive, got {}",
                size
            )));
        }
        if deviation <= 0.0 {
            return Err(PipelineError::Input(format!(
                "seed deviation factor must be positive, got {}",
                deviation
            )));
        }
    }
    model.mesh_specs.push(MeshSpec {
        region: region_name.to_owned(),
        element_type,
        seeding,
    });
    Ok(())
}

/// Seeds an edge region with a fixed division count or target size.
pub fn seed_edge_region(model: &mut Model, region_name: &str, seeding: Seeding) -> Result<()> {
    model.require_at_least(Stage::Propertied, "seed_edge_region")?;
    model.require_at_most(Stage::Constrained, "seed_edge_region")?;
    let region = model.region(region_name)?;
    if region.kind != EntityKind::Edge {
        return Err(PipelineError::Input(format!(
            "edge seeds need an edge region, region '{}' holds {} entities",
            region_name, region.kind
        )));
    }
    model.edge_seeds.push(EdgeSeed {
        region: region_name.to_owned(),
        seeding,
    });
    Ok(())
}

/// Per-part list of seeded edges: (midpoint, division count).
fn seeded_edges(model: &Model, part_name: &str) -> Result<Vec<(Point, usize)>> {
    let mut seeds = Vec::new();
    for seed in &model.edge_seeds {
        let region = model.region(&seed.region)?;
        if region.part != part_name {
            continue;
        }
        let part = model.part(part_name)?;
        for id in model.resolve_region(&seed.region)? {
            let [a, b] = part.edge_endpoints(&id)?;
            let count = seed.seeding.divisions((b - a).norm());
            seeds.push((geom::lerp(&a, &b, 0.5), count));
        }
    }
    Ok(seeds)
}

fn seed_on_segment(
    seeds: &[(Point, usize)],
    a: &Point,
    b: &Point,
    tolerance: f64,
) -> Option<usize> {
    let mid = geom::lerp(a, b, 0.5);
    seeds
        .iter()
        .find(|(rep, _)| geom::points_close(rep, &mid, tolerance))
        .map(|(_, count)| *count)
}

/// Generates meshes for every part that carries section assignments and
/// records them on the model.
pub fn generate_mesh(model: &mut Model) -> Result<()> {
    model.require_at_least(Stage::Propertied, "generate_mesh")?;
    model.require_at_most(Stage::Constrained, "generate_mesh")?;

    // entity -> (owning propertied region, element type, seeding)
    let mut plans: HashMap<String, Vec<(EntityId, String, ElementType, Seeding)>> = HashMap::new();
    for assignment in &model.assignments {
        let region = model.region(&assignment.region)?.clone();
        let spec = model
            .mesh_specs
            .iter()
            .find(|s| {
                covers(model, &s.region, &region.name).unwrap_or(false)
            })
            .cloned()
            .ok_or_else(|| PipelineError::UnmeshableRegion {
                region: region.name.clone(),
                reason: "no mesh spec covers the region".to_owned(),
            })?;
        for id in model.resolve_region(&region.name)? {
            plans.entry(region.part.clone()).or_default().push((
                id,
                region.name.clone(),
                spec.element_type,
                spec.seeding,
            ));
        }
    }
    if plans.is_empty() {
        return Err(PipelineError::IncompleteModel(
            "no propertied regions to mesh".to_owned(),
        ));
    }

    let mut meshes = Vec::new();
    for (part_name, plan) in plans {
        let family = plan[0].2.dof_family();
        if plan.iter().any(|(_, _, et, _)| et.dof_family() != family) {
            return Err(PipelineError::UnmeshableRegion {
                region: part_name.clone(),
                reason: "mesh mixes incompatible nodal dof families".to_owned(),
            });
        }
        let seeds = seeded_edges(model, &part_name)?;
        let part = model.part(&part_name)?;
        let mut builder = MeshBuilder::new(&part_name);
        for (id, region_name, element_type, seeding) in &plan {
            match element_type {
                ElementType::Quad4 | ElementType::Tri3 => builder.mesh_face(
                    part,
                    id.index,
                    region_name,
                    *element_type,
                    seeding,
                    &seeds,
                    model.tolerance,
                )?,
                ElementType::Hex8 => {
                    builder.mesh_cell(part, id.index, region_name, seeding)?
                }
                ElementType::Bar2 => builder.mesh_edge(part, id, region_name, seeding)?,
            }
        }
        let mesh = builder.finish();
        println!(
            "info: meshed part '{}': {} nodes, {} elements",
            part_name,
            mesh.nodes.len(),
            mesh.elements.len()
        );
        meshes.push(mesh);
    }
    model.meshes = meshes;
    model.advance(Stage::Meshed);
    Ok(())
}

/// True when every entity of `target` is also an entity of `spec_region`.
fn covers(model: &Model, spec_region: &str, target: &str) -> Result<bool> {
    if spec_region == target {
        return Ok(true);
    }
    let spec_ids = model.resolve_region(spec_region)?;
    let target_ids = model.resolve_region(target)?;
    Ok(target_ids.iter().all(|id| spec_ids.contains(id)))
}

struct MeshBuilder {
    part: String,
    nodes: Vec<Point>,
    index_of: HashMap<(i64, i64, i64), usize>,
    elements: Vec<MeshElement>,
}

impl MeshBuilder {
    fn new(part: &str) -> MeshBuilder {
        MeshBuilder {
            part: part.to_owned(),
            nodes: Vec::new(),
            index_of: HashMap::new(),
            elements: Vec::new(),
        }
    }

    fn node(&mut self, p: Point) -> usize {
        let key = geom::point_key(&p, 1e-9);
        if let Some(&i) = self.index_of.get(&key) {
            return i;
        }
        self.nodes.push(p);
        self.index_of.insert(key, self.nodes.len() - 1);
        self.nodes.len() - 1
    }

    fn push_element(
        &mut self,
        element_type: ElementType,
        nodes: Vec<usize>,
        region: &str,
    ) -> Result<()> {
        let mut sorted = nodes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != nodes.len() {
            return Err(PipelineError::UnmeshableRegion {
                region: region.to_owned(),
                reason: "degenerate element with repeated nodes".to_owned(),
            });
        }
        self.elements.push(MeshElement {
            element_type,
            nodes,
            region: region.to_owned(),
        });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn mesh_face(
        &mut self,
        part: &Part,
        face_index: usize,
        region: &str,
        element_type: ElementType,
        seeding: &Seeding,
        seeds: &[(Point, usize)],
        tolerance: f64,
    ) -> Result<()> {
        let ring = part.face_ring_points(face_index);
        if ring.len() == 4 {
            // per-direction divisions: edge seeds beat the mesh spec seeding
            let len_u = ((ring[1] - ring[0]).norm() + (ring[2] - ring[3]).norm()) / 2.0;
            let len_v = ((ring[2] - ring[1]).norm() + (ring[3] - ring[0]).norm()) / 2.0;
            let nu = seed_on_segment(seeds, &ring[0], &ring[1], tolerance)
                .or_else(|| seed_on_segment(seeds, &ring[3], &ring[2], tolerance))
                .unwrap_or_else(|| seeding.divisions(len_u));
            let nv = seed_on_segment(seeds, &ring[1], &ring[2], tolerance)
                .or_else(|| seed_on_segment(seeds, &ring[0], &ring[3], tolerance))
                .unwrap_or_else(|| seeding.divisions(len_v));
            self.structured_quad_grid(&ring, nu, nv, region, element_type)
        } else {
            if element_type == ElementType::Quad4 {
                return Err(PipelineError::UnmeshableRegion {
                    region: region.to_owned(),
                    reason: format!(
                        "structured quads need a 4-sided face, got {} sides",
                        ring.len()
                    ),
                });
            }
            self.triangle_fan(&ring, seeding, region)
        }
    }

    /// Bilinear grid over a 4-sided planar face.
    fn structured_quad_grid(
        &mut self,
        ring: &[Point],
        nu: usize,
        nv: usize,
        region: &str,
        element_type: ElementType,
    ) -> Result<()> {
        let mut grid = vec![vec![0usize; nv + 1]; nu + 1];
        for (i, row) in grid.iter_mut().enumerate() {
            let s = i as f64 / nu as f64;
            for (j, slot) in row.iter_mut().enumerate() {
                let t = j as f64 / nv as f64;
                let p = ring[0].coords * ((1.0 - s) * (1.0 - t))
                    + ring[1].coords * (s * (1.0 - t))
                    + ring[2].coords * (s * t)
                    + ring[3].coords * ((1.0 - s) * t);
                *slot = self.node(Point::from(p));
            }
        }
        for i in 0..nu {
            for j in 0..nv {
                let quad = [grid[i][j], grid[i + 1][j], grid[i + 1][j + 1], grid[i][j + 1]];
                match element_type {
                    ElementType::Quad4 => {
                        self.push_element(element_type, quad.to_vec(), region)?;
                    }
                    _ => {
                        self.push_element(
                            ElementType::Tri3,
                            vec![quad[0], quad[1], quad[2]],
                            region,
                        )?;
                        self.push_element(
                            ElementType::Tri3,
                            vec![quad[0], quad[2], quad[3]],
                            region,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Free triangular fallback: boundary subdivision fanned to the
    /// centroid. Ring segments that tessellate an arc are refined per
    /// the seeding deviation factor.
    fn triangle_fan(&mut self, ring: &[Point], seeding: &Seeding, region: &str) -> Result<()> {
        let center = self.node(geom::polygon_centroid(ring));
        let n = ring.len();
        let mut boundary: Vec<usize> = Vec::new();
        for i in 0..n {
            let a = ring[i];
            let b = ring[(i + 1) % n];
            let k = seeding.curved_divisions((b - a).norm(), segment_radius(ring, i));
            for m in 0..k {
                boundary.push(self.node(geom::lerp(&a, &b, m as f64 / k as f64)));
            }
        }
        let count = boundary.len();
        for i in 0..count {
            self.push_element(
                ElementType::Tri3,
                vec![center, boundary[i], boundary[(i + 1) % count]],
                region,
            )?;
        }
        Ok(())
    }

    /// Structured hex grid; the cell must be an axis-aligned box.
    fn mesh_cell(
        &mut self,
        part: &Part,
        cell_index: usize,
        region: &str,
        seeding: &Seeding,
    ) -> Result<()> {
        let loops = part.cell_face_loops(cell_index);
        let (min, max) = box_bounds(&loops, region)?;
        let extent = max - min;
        let nx = seeding.divisions(extent.x);
        let ny = seeding.divisions(extent.y);
        let nz = seeding.divisions(extent.z);

        let mut grid = vec![vec![vec![0usize; nz + 1]; ny + 1]; nx + 1];
        for i in 0..=nx {
            for j in 0..=ny {
                for k in 0..=nz {
                    let p = Point::new(
                        min.x + extent.x * i as f64 / nx as f64,
                        min.y + extent.y * j as f64 / ny as f64,
                        min.z + extent.z * k as f64 / nz as f64,
                    );
                    grid[i][j][k] = self.node(p);
                }
            }
        }
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    self.push_element(
                        ElementType::Hex8,
                        vec![
                            grid[i][j][k],
                            grid[i + 1][j][k],
                            grid[i + 1][j + 1][k],
                            grid[i][j + 1][k],
                            grid[i][j][k + 1],
                            grid[i + 1][j][k + 1],
                            grid[i + 1][j + 1][k + 1],
                            grid[i][j + 1][k + 1],
                        ],
                        region,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn mesh_edge(
        &mut self,
        part: &Part,
        id: &EntityId,
        region: &str,
        seeding: &Seeding,
    ) -> Result<()> {
        let [a, b] = part.edge_endpoints(id)?;
        let k = seeding.divisions((b - a).norm());
        for m in 0..k {
            let n0 = self.node(geom::lerp(&a, &b, m as f64 / k as f64));
            let n1 = self.node(geom::lerp(&a, &b, (m + 1) as f64 / k as f64));
            self.push_element(ElementType::Bar2, vec![n0, n1], region)?;
        }
        Ok(())
    }

    fn finish(self) -> Mesh {
        Mesh {
            part: self.part,
            nodes: self.nodes,
            elements: self.elements,
        }
    }
}

/// Local curvature radius at segment `i` of a boundary ring, estimated
/// from the circumcircle through each neighbouring point triple. Gentle
/// turns mark a tessellated arc; straight runs and sharp corners carry
/// no curvature.
fn segment_radius(ring: &[Point], i: usize) -> Option<f64> {
    let n = ring.len();
    let prev = ring[(i + n - 1) % n];
    let a = ring[i];
    let b = ring[(i + 1) % n];
    let next = ring[(i + 2) % n];
    match (arc_radius(&prev, &a, &b), arc_radius(&a, &b, &next)) {
        (Some(r1), Some(r2)) => Some(r1.min(r2)),
        (r1, None) => r1,
        (None, r2) => r2,
    }
}

/// Circumradius of a point triple, or `None` when the turn at `q` reads
/// as a straight run (under ~0.5 degrees) or a corner (over 45 degrees).
fn arc_radius(p: &Point, q: &Point, r: &Point) -> Option<f64> {
    let u = q - p;
    let v = r - q;
    let (lu, lv) = (u.norm(), v.norm());
    if lu < geom::EPS || lv < geom::EPS {
        return None;
    }
    let turn = (u.dot(&v) / (lu * lv)).clamp(-1.0, 1.0).acos();
    if !(0.01..=std::f64::consts::FRAC_PI_4).contains(&turn) {
        return None;
    }
    let w = r - p;
    let area = u.cross(&v).norm() / 2.0;
    Some(lu * lv * w.norm() / (4.0 * area))
}

/// Bounds of an axis-aligned box cell; errors when the cell is not one.
fn box_bounds(loops: &[Vec<Point>], region: &str) -> Result<(Point, Point)> {
    let mut min = Point::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for ring in loops {
        for p in ring {
            min = Point::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Point::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
    }
    let tol = 1e-9 * (max - min).norm().max(1.0);
    let corner = |v: f64, lo: f64, hi: f64| (v - lo).abs() <= tol || (v - hi).abs() <= tol;
    for ring in loops {
        if ring.len() != 4 {
            return Err(PipelineError::UnmeshableRegion {
                region: region.to_owned(),
                reason: "structured hex meshing needs a box cell with quad faces".to_owned(),
            });
        }
        for p in ring {
            if !corner(p.x, min.x, max.x)
                || !corner(p.y, min.y, max.y)
                || !corner(p.z, min.z, max.z)
            {
                return Err(PipelineError::UnmeshableRegion {
                    region: region.to_owned(),
                    reason: "cell is not an axis-aligned box".to_owned(),
                });
            }
        }
    }
    Ok((min, max))
}
