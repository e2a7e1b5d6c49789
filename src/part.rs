//! Part topology: entity arenas built from 2D sketch profiles.
//!
//! A part owns growable arenas of vertices, edges, faces, and cells. Entity
//! ids are ephemeral: every id carries the topology generation it was issued
//! under, and partitioning bumps the generation and rebuilds the arenas, so
//! stale ids are rejected instead of silently pointing at renumbered
//! entities. Representative points are the only lookup keys that survive a
//! partition.
//!
//! Curved sketch primitives (arcs, circles) are tessellated into segments at
//! build time; downstream code only ever sees planar polygon faces and
//! polyhedral cells.

use std::collections::HashMap;
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::geom::{self, Plane, Point, Vector};

/// Vertex dedup pitch used while building arenas.
const MERGE_TOL: f64 = 1e-9;

/// Profile chain matching tolerance.
const CHAIN_TOL: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Vertex,
    Edge,
    Face,
    Cell,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Vertex => "vertex",
            EntityKind::Edge => "edge",
            EntityKind::Face => "face",
            EntityKind::Cell => "cell",
        };
        write!(f, "{}", name)
    }
}

/// Ephemeral handle to a topological entity.
///
/// Valid only while the owning part stays at `generation`; any partition
/// invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub kind: EntityKind,
    pub index: usize,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimensionality {
    TwoD,
    ThreeD,
}

/// Construction-only geometry driving partitions; never part of topology.
#[derive(Debug, Clone)]
pub enum Datum {
    Point(Point),
    Plane(Plane),
}

#[derive(Debug, Clone)]
pub struct VertexEnt {
    pub point: Point,
}

#[derive(Debug, Clone)]
pub struct EdgeEnt {
    pub ends: [usize; 2],
    /// Midpoint, used as the canonical representative point.
    pub rep: Point,
}

#[derive(Debug, Clone)]
pub struct FaceEnt {
    /// Ordered vertex loop.
    pub ring: Vec<usize>,
    pub normal: Vector,
    pub rep: Point,
}

#[derive(Debug, Clone)]
pub struct CellEnt {
    pub faces: Vec<usize>,
    pub rep: Point,
}

/// 2D sketch primitive, in profile coordinates.
#[derive(Debug, Clone)]
pub enum SketchPrimitive {
    Line { a: [f64; 2], b: [f64; 2] },
    /// Counter-clockwise arc from `start` to `end` around `center`.
    Arc {
        center: [f64; 2],
        start: [f64; 2],
        end: [f64; 2],
    },
    Circle { center: [f64; 2], radius: f64 },
    Rectangle { p1: [f64; 2], p2: [f64; 2] },
}

/// An ordered set of sketch primitives plus the chord-deviation tolerance
/// used to tessellate curved ones.
#[derive(Debug, Clone)]
pub struct Profile {
    pub primitives: Vec<SketchPrimitive>,
    pub deviation: f64,
}

/// A tessellated run of profile points.
#[derive(Debug, Clone)]
pub struct Chain {
    pub points: Vec<[f64; 2]>,
    pub closed: bool,
}

impl Profile {
    pub fn new(primitives: Vec<SketchPrimitive>) -> Profile {
        Profile {
            primitives,
            deviation: 0.02,
        }
    }

    pub fn with_deviation(mut self, deviation: f64) -> Profile {
        self.deviation = deviation.max(1e-4);
        self
    }

    fn arc_segment_count(&self, sweep: f64) -> usize {
        // sagitta <= deviation * radius per segment
        let max_step = 2.0 * (1.0 - self.deviation).acos();
        ((sweep / max_step).ceil() as usize).max(4)
    }

    fn tessellate(&self, primitive: &SketchPrimitive) -> (Vec<[f64; 2]>, bool) {
        match primitive {
            SketchPrimitive::Line { a, b } => (vec![*a, *b], false),
            SketchPrimitive::Rectangle { p1, p2 } => (
                vec![
                    [p1[0], p1[1]],
                    [p2[0], p1[1]],
                    [p2[0], p2[1]],
                    [p1[0], p2[1]],
                ],
                true,
            ),
            SketchPrimitive::Circle { center, radius } => {
                let n = self.arc_segment_count(std::f64::consts::TAU);
                let points = (0..n)
                    .map(|i| {
                        let theta = std::f64::consts::TAU * i as f64 / n as f64;
                        [
                            center[0] + radius * theta.cos(),
                            center[1] + radius * theta.sin(),
                        ]
                    })
                    .collect();
                (points, true)
            }
            SketchPrimitive::Arc { center, start, end } => {
                let radius = ((start[0] - center[0]).powi(2) + (start[1] - center[1]).powi(2))
                    .sqrt();
                let a0 = (start[1] - center[1]).atan2(start[0] - center[0]);
                let a1 = (end[1] - center[1]).atan2(end[0] - center[0]);
                let mut sweep = a1 - a0;
                if sweep <= 0.0 {
                    sweep += std::f64::consts::TAU;
                }
                let n = self.arc_segment_count(sweep);
                let points = (0..=n)
                    .map(|i| {
                        let theta = a0 + sweep * i as f64 / n as f64;
                        [
                            center[0] + radius * theta.cos(),
                            center[1] + radius * theta.sin(),
                        ]
                    })
                    .collect();
                (points, false)
            }
        }
    }

    /// Tessellates and chains the primitives into polyline runs, joining
    /// segments whose endpoints coincide.
    ///
    /// # Returns
    /// Closed loops and open runs, in input order.
    pub fn chains(&self) -> Result<Vec<Chain>> {
        if self.primitives.is_empty() {
            return Err(PipelineError::Geometry("empty profile".to_owned()));
        }
        let close = |a: &[f64; 2], b: &[f64; 2]| {
            (a[0] - b[0]).abs() <= CHAIN_TOL && (a[1] - b[1]).abs() <= CHAIN_TOL
        };

        let mut chains: Vec<Chain> = Vec::new();
        let mut open: Vec<Vec<[f64; 2]>> = Vec::new();
        for primitive in &self.primitives {
            let (points, closed) = self.tessellate(primitive);
            if closed {
                chains.push(Chain { points, closed: true });
            } else {
                open.push(points);
            }
        }

        // Greedy endpoint chaining of the open runs.
        while let Some(mut run) = open.pop() {
            let mut extended = true;
            while extended {
                extended = false;
                let head = run[0];
                let tail = run[run.len() - 1];
                let mut matched: Option<(usize, bool, bool)> = None;
                for (i, other) in open.iter().enumerate() {
                    let o_head = other[0];
                    let o_tail = other[other.len() - 1];
                    if close(&tail, &o_head) {
                        matched = Some((i, false, false)); // append forward
                    } else if close(&tail, &o_tail) {
                        matched = Some((i, false, true)); // append reversed
                    } else if close(&head, &o_tail) {
                        matched = Some((i, true, false)); // prepend forward
                    } else if close(&head, &o_head) {
                        matched = Some((i, true, true)); // prepend reversed
                    }
                    if matched.is_some() {
                        break;
                    }
                }
                if let Some((i, prepend, reverse)) = matched {
                    let mut other = open.swap_remove(i);
                    if reverse {
                        other.reverse();
                    }
                    if prepend {
                        other.pop(); // drop duplicated joint
                        other.extend(run);
                        run = other;
                    } else {
                        run.extend(other.into_iter().skip(1));
                    }
                    extended = true;
                }
            }
            let closed = run.len() > 3 && close(&run[0], &run[run.len() - 1]);
            if closed {
                run.pop();
            }
            chains.push(Chain { points: run, closed });
        }

        for chain in chains.iter().filter(|c| c.closed) {
            if chain_self_intersects(&chain.points) {
                return Err(PipelineError::Geometry(
                    "profile loop is self-intersecting".to_owned(),
                ));
            }
        }
        Ok(chains)
    }
}

/// Proper-crossing test between non-adjacent segments of a closed polyline.
fn chain_self_intersects(points: &[[f64; 2]]) -> bool {
    let n = points.len();
    let orient = |a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]| {
        (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
    };
    for i in 0..n {
        let (a1, a2) = (&points[i], &points[(i + 1) % n]);
        for j in i + 1..n {
            // skip adjacent segments (shared endpoint)
            if j == i || (j + 1) % n == i || (i + 1) % n == j {
                continue;
            }
            let (b1, b2) = (&points[j], &points[(j + 1) % n]);
            let d1 = orient(b1, b2, a1);
            let d2 = orient(b1, b2, a2);
            let d3 = orient(a1, a2, b1);
            let d4 = orient(a1, a2, b2);
            if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
                && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
            {
                return true;
            }
        }
    }
    false
}

/// A face to (re)build, as a point loop plus an orientation hint carried
/// over from the previous topology.
#[derive(Debug, Clone)]
pub struct FaceSpec {
    pub ring: Vec<Point>,
    pub normal_hint: Option<Vector>,
}

/// A cell to (re)build, referencing faces by index into the face list.
#[derive(Debug, Clone)]
pub struct CellSpec {
    pub face_indices: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub dimensionality: Dimensionality,
    generation: u64,
    vertices: Vec<VertexEnt>,
    edges: Vec<EdgeEnt>,
    faces: Vec<FaceEnt>,
    cells: Vec<CellEnt>,
    datums: Vec<Datum>,
}

impl Part {
    fn empty(name: &str, dimensionality: Dimensionality) -> Part {
        Part {
            name: name.to_owned(),
            dimensionality,
            generation: 0,
            vertices: Vec::new(),
            edges: Vec::new(),
            faces: Vec::new(),
            cells: Vec::new(),
            datums: Vec::new(),
        }
    }

    /// Builds a planar shell part: one face per closed profile loop at z=0.
    pub fn base_shell(name: &str, profile: &Profile) -> Result<Part> {
        let mut part = Part::empty(name, Dimensionality::ThreeD);
        let chains = profile.chains()?;
        let mut faces = Vec::new();
        for chain in &chains {
            if !chain.closed {
                return Err(PipelineError::Geometry(format!(
                    "open profile chain in shell build of part '{}'",
                    name
                )));
            }
            faces.push(FaceSpec {
                ring: lift(&chain.points),
                normal_hint: Some(Vector::z()),
            });
        }
        if faces.is_empty() {
            return Err(PipelineError::Geometry(
                "shell build requires at least one closed loop".to_owned(),
            ));
        }
        part.install(faces, Vec::new(), Vec::new());
        Ok(part)
    }

    /// Extrudes a single closed profile loop into a solid cell.
    ///
    /// # Arguments
    /// * `profile` - The 2D cross section; exactly one closed loop
    /// * `depth` - Extrusion depth along +z
    pub fn base_solid_extrude(name: &str, profile: &Profile, depth: f64) -> Result<Part> {
        if depth <= geom::EPS {
            return Err(PipelineError::Geometry(format!(
                "non-positive extrusion depth {depth}"
            )));
        }
        let chains = profile.chains()?;
        let loops: Vec<&Chain> = chains.iter().filter(|c| c.closed).collect();
        if loops.len() != 1 || loops.len() != chains.len() {
            return Err(PipelineError::Geometry(
                "solid extrusion requires exactly one closed profile loop".to_owned(),
            ));
        }
        let base = ccw(&loops[0].points);
        let n = base.len();

        let bottom: Vec<Point> = base.iter().map(|p| Point::new(p[0], p[1], 0.0)).collect();
        let top: Vec<Point> = base.iter().map(|p| Point::new(p[0], p[1], depth)).collect();

        let mut faces = Vec::with_capacity(n + 2);
        // bottom ring reversed so its normal points out of the cell (-z)
        let mut bottom_ring = bottom.clone();
        bottom_ring.reverse();
        faces.push(FaceSpec {
            ring: bottom_ring,
            normal_hint: Some(-Vector::z()),
        });
        faces.push(FaceSpec {
            ring: top.clone(),
            normal_hint: Some(Vector::z()),
        });
        for i in 0..n {
            let j = (i + 1) % n;
            faces.push(FaceSpec {
                ring: vec![bottom[i], bottom[j], top[j], top[i]],
                normal_hint: None,
            });
        }
        let cell = CellSpec {
            face_indices: (0..faces.len()).collect(),
        };

        let mut part = Part::empty(name, Dimensionality::ThreeD);
        part.install(faces, vec![cell], Vec::new());
        part.orient_cell_faces_outward();
        Ok(part)
    }

    /// Extrudes profile chains into shell faces (one quad per segment).
    pub fn base_shell_extrude(name: &str, profile: &Profile, depth: f64) -> Result<Part> {
        if depth <= geom::EPS {
            return Err(PipelineError::Geometry(format!(
                "non-positive extrusion depth {depth}"
            )));
        }
        let chains = profile.chains()?;
        let mut faces = Vec::new();
        for chain in &chains {
            let count = if chain.closed {
                chain.points.len()
            } else {
                chain.points.len() - 1
            };
            for i in 0..count {
                let a = chain.points[i];
                let b = chain.points[(i + 1) % chain.points.len()];
                faces.push(FaceSpec {
                    ring: vec![
                        Point::new(a[0], a[1], 0.0),
                        Point::new(b[0], b[1], 0.0),
                        Point::new(b[0], b[1], depth),
                        Point::new(a[0], a[1], depth),
                    ],
                    normal_hint: None,
                });
            }
        }
        if faces.is_empty() {
            return Err(PipelineError::Geometry(
                "shell extrusion produced no faces".to_owned(),
            ));
        }
        let mut part = Part::empty(name, Dimensionality::ThreeD);
        part.install(faces, Vec::new(), Vec::new());
        Ok(part)
    }

    /// Revolves profile chains about the sketch y-axis into shell faces.
    ///
    /// # Arguments
    /// * `angle_deg` - Total sweep angle in degrees (0 < angle <= 360)
    /// * `segments` - Angular subdivision count
    pub fn base_shell_revolve(
        name: &str,
        profile: &Profile,
        angle_deg: f64,
        segments: usize,
    ) -> Result<Part> {
        if !(f64::EPSILON..=360.0).contains(&angle_deg) || segments == 0 {
            return Err(PipelineError::Geometry(format!(
                "invalid revolution: angle {angle_deg} deg, {segments} segments"
            )));
        }
        let chains = profile.chains()?;
        let sweep = angle_deg.to_radians();
        let place = |p: &[f64; 2], theta: f64| -> Result<Point> {
            if p[0] < geom::EPS {
                return Err(PipelineError::Geometry(
                    "revolved profile must stay strictly on the +x side of the axis".to_owned(),
                ));
            }
            Ok(Point::new(p[0] * theta.cos(), p[1], p[0] * theta.sin()))
        };
        let mut faces = Vec::new();
        for chain in &chains {
            let count = if chain.closed {
                chain.points.len()
            } else {
                chain.points.len() - 1
            };
            for i in 0..count {
                let a = chain.points[i];
                let b = chain.points[(i + 1) % chain.points.len()];
                for s in 0..segments {
                    let t0 = sweep * s as f64 / segments as f64;
                    let t1 = sweep * (s + 1) as f64 / segments as f64;
                    faces.push(FaceSpec {
                        ring: vec![
                            place(&a, t0)?,
                            place(&b, t0)?,
                            place(&b, t1)?,
                            place(&a, t1)?,
                        ],
                        normal_hint: None,
                    });
                }
            }
        }
        let mut part = Part::empty(name, Dimensionality::ThreeD);
        part.install(faces, Vec::new(), Vec::new());
        Ok(part)
    }

    /// Builds a planar wire part: edges only, at z=0.
    pub fn base_wire(name: &str, profile: &Profile) -> Result<Part> {
        let chains = profile.chains()?;
        let mut segments: Vec<[Point; 2]> = Vec::new();
        for chain in &chains {
            let count = if chain.closed {
                chain.points.len()
            } else {
                chain.points.len() - 1
            };
            for i in 0..count {
                let a = chain.points[i];
                let b = chain.points[(i + 1) % chain.points.len()];
                segments.push([Point::new(a[0], a[1], 0.0), Point::new(b[0], b[1], 0.0)]);
            }
        }
        if segments.is_empty() {
            return Err(PipelineError::Geometry(
                "wire build produced no edges".to_owned(),
            ));
        }
        let mut part = Part::empty(name, Dimensionality::TwoD);
        part.install(Vec::new(), Vec::new(), segments);
        Ok(part)
    }

    /// Rebuilds the arenas from face/cell specs and standalone edges, and
    /// bumps the topology generation. Entity counts may only grow across a
    /// rebuild triggered by partitioning.
    pub(crate) fn install(
        &mut self,
        faces: Vec<FaceSpec>,
        cells: Vec<CellSpec>,
        wire_edges: Vec<[Point; 2]>,
    ) {
        let mut vertices: Vec<VertexEnt> = Vec::new();
        let mut index_of: HashMap<(i64, i64, i64), usize> = HashMap::new();
        let mut intern = |p: &Point| -> usize {
            let key = geom::point_key(p, MERGE_TOL);
            *index_of.entry(key).or_insert_with(|| {
                vertices.push(VertexEnt { point: *p });
                vertices.len() - 1
            })
        };

        let mut edge_of: HashMap<(usize, usize), usize> = HashMap::new();
        let mut edges: Vec<EdgeEnt> = Vec::new();
        let mut intern_edge = |a: usize, b: usize, pa: &Point, pb: &Point| {
            let key = if a < b { (a, b) } else { (b, a) };
            edge_of.entry(key).or_insert_with(|| {
                edges.push(EdgeEnt {
                    ends: [a, b],
                    rep: geom::lerp(pa, pb, 0.5),
                });
                edges.len() - 1
            });
        };

        let mut built_faces: Vec<FaceEnt> = Vec::with_capacity(faces.len());
        for spec in &faces {
            let ring: Vec<usize> = spec.ring.iter().map(&mut intern).collect();
            let mut normal = geom::newell_normal(&spec.ring);
            let norm = normal.norm();
            if norm > geom::EPS {
                normal /= norm;
            }
            if let Some(hint) = spec.normal_hint {
                if normal.dot(&hint) < 0.0 {
                    normal = -normal;
                }
            }
            let rep = geom::polygon_centroid(&spec.ring);
            for i in 0..ring.len() {
                let j = (i + 1) % ring.len();
                intern_edge(ring[i], ring[j], &spec.ring[i], &spec.ring[(i + 1) % ring.len()]);
            }
            built_faces.push(FaceEnt {
                ring,
                normal,
                rep,
            });
        }

        for [a, b] in &wire_edges {
            let ia = intern(a);
            let ib = intern(b);
            intern_edge(ia, ib, a, b);
        }

        let mut built_cells: Vec<CellEnt> = Vec::with_capacity(cells.len());
        for spec in &cells {
            let mut sum = Vector::zeros();
            let mut count = 0usize;
            for &fi in &spec.face_indices {
                for &vi in &built_faces[fi].ring {
                    sum += vertices[vi].point.coords;
                    count += 1;
                }
            }
            let rep = Point::from(sum / count.max(1) as f64);
            built_cells.push(CellEnt {
                faces: spec.face_indices.clone(),
                rep,
            });
        }

        self.vertices = vertices;
        self.edges = edges;
        self.faces = built_faces;
        self.cells = built_cells;
        self.generation += 1;
    }

    /// Flips cell-bounding face normals to point away from the cell rep.
    pub(crate) fn orient_cell_faces_outward(&mut self) {
        let reps: Vec<(usize, Point)> = self
            .cells
            .iter()
            .flat_map(|c| c.faces.iter().map(|&fi| (fi, c.rep)))
            .collect();
        for (fi, cell_rep) in reps {
            let face_rep = self.faces[fi].rep;
            let outward = face_rep - cell_rep;
            if self.faces[fi].normal.dot(&outward) < 0.0 {
                self.faces[fi].normal = -self.faces[fi].normal;
                self.faces[fi].ring.reverse();
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn id(&self, kind: EntityKind, index: usize) -> EntityId {
        EntityId {
            kind,
            index,
            generation: self.generation,
        }
    }

    /// Rejects ids issued before the latest topology change.
    pub fn check(&self, id: &EntityId) -> Result<()> {
        if id.generation != self.generation {
            return Err(PipelineError::StaleEntity {
                kind: id.kind,
                issued: id.generation,
                current: self.generation,
            });
        }
        let count = self.entity_count(id.kind);
        if id.index >= count {
            return Err(PipelineError::Geometry(format!(
                "{} index {} out of range ({} present)",
                id.kind, id.index, count
            )));
        }
        Ok(())
    }

    pub fn entity_count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Vertex => self.vertices.len(),
            EntityKind::Edge => self.edges.len(),
            EntityKind::Face => self.faces.len(),
            EntityKind::Cell => self.cells.len(),
        }
    }

    pub fn rep_point(&self, id: &EntityId) -> Result<Point> {
        self.check(id)?;
        Ok(match id.kind {
            EntityKind::Vertex => self.vertices[id.index].point,
            EntityKind::Edge => self.edges[id.index].rep,
            EntityKind::Face => self.faces[id.index].rep,
            EntityKind::Cell => self.cells[id.index].rep,
        })
    }

    pub fn vertex_point(&self, index: usize) -> Point {
        self.vertices[index].point
    }

    pub fn edge_endpoints(&self, id: &EntityId) -> Result<[Point; 2]> {
        self.check(id)?;
        let edge = &self.edges[id.index];
        Ok([
            self.vertices[edge.ends[0]].point,
            self.vertices[edge.ends[1]].point,
        ])
    }

    pub fn face_ring_points(&self, index: usize) -> Vec<Point> {
        self.faces[index]
            .ring
            .iter()
            .map(|&vi| self.vertices[vi].point)
            .collect()
    }

    pub fn face_normal(&self, index: usize) -> Vector {
        self.faces[index].normal
    }

    pub fn face_area(&self, index: usize) -> f64 {
        geom::polygon_area(&self.face_ring_points(index))
    }

    pub fn cell_face_loops(&self, index: usize) -> Vec<Vec<Point>> {
        self.cells[index]
            .faces
            .iter()
            .map(|&fi| self.face_ring_points(fi))
            .collect()
    }

    pub fn cell_face_indices(&self, index: usize) -> &[usize] {
        &self.cells[index].faces
    }

    pub fn edges(&self) -> &[EdgeEnt] {
        &self.edges
    }

    pub fn faces(&self) -> &[FaceEnt] {
        &self.faces
    }

    pub fn cells(&self) -> &[CellEnt] {
        &self.cells
    }

    pub fn vertices(&self) -> &[VertexEnt] {
        &self.vertices
    }

    /// Reverses a face's stored orientation. Topology is unchanged, so the
    /// generation is not bumped.
    pub fn flip_face_normal(&mut self, index: usize) {
        self.faces[index].normal = -self.faces[index].normal;
        self.faces[index].ring.reverse();
    }

    pub fn add_datum_point(&mut self, point: Point) -> usize {
        self.datums.push(Datum::Point(point));
        self.datums.len() - 1
    }

    pub fn add_datum_plane(&mut self, plane: Plane) -> usize {
        self.datums.push(Datum::Plane(plane));
        self.datums.len() - 1
    }

    pub fn datum_point(&self, index: usize) -> Result<Point> {
        match self.datums.get(index) {
            Some(Datum::Point(p)) => Ok(*p),
            Some(Datum::Plane(_)) => Err(PipelineError::Geometry(format!(
                "datum {index} is a plane, not a point"
            ))),
            None => Err(PipelineError::Geometry(format!("no datum {index}"))),
        }
    }

    pub fn datum_plane(&self, index: usize) -> Result<Plane> {
        match self.datums.get(index) {
            Some(Datum::Plane(p)) => Ok(*p),
            Some(Datum::Point(_)) => Err(PipelineError::Geometry(format!(
                "datum {index} is a point, not a plane"
            ))),
            None => Err(PipelineError::Geometry(format!("no datum {index}"))),
        }
    }

    /// True when the part was built as a wire (edges without faces).
    pub fn is_wire(&self) -> bool {
        self.faces.is_empty() && !self.edges.is_empty()
    }
}

fn lift(points: &[[f64; 2]]) -> Vec<Point> {
    ccw(points)
        .iter()
        .map(|p| Point::new(p[0], p[1], 0.0))
        .collect()
}

/// Ensures counter-clockwise winding (positive signed area).
fn ccw(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut area = 0.0;
    let n = points.len();
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i][0] * points[j][1] - points[j][0] * points[i][1];
    }
    let mut out = points.to_vec();
    if area < 0.0 {
        out.reverse();
    }
    out
}
