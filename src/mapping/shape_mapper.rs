use log::{debug, warn};
use nalgebra::{Point2, Vector2};

use crate::curve::NurbsCurve2D;
use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;
use crate::surface::NurbsSurface3D;
use crate::topology::{Edge, Face, FaceEdge, Shape, Shell, Solid};

use super::{sort_flat_edges, BoundarySorter, FlatEdge, FlatWire, Quad};

/// Options of the mapping feature
#[derive(Debug, Clone)]
pub struct ShapeMapperOptions<T> {
    pub offset: T,
    pub thickness: T,
    pub fill_faces: bool,
    pub fill_extrusion: bool,
    /// attempt solid promotion cleanup
    pub refine: bool,
    pub reverse_u: bool,
    pub reverse_v: bool,
    pub swap_uv: bool,
    pub tolerance: T,
}

impl<T: FloatingPoint> Default for ShapeMapperOptions<T> {
    fn default() -> Self {
        Self {
            offset: T::zero(),
            thickness: T::zero(),
            fill_faces: false,
            fill_extrusion: true,
            refine: false,
            reverse_u: false,
            reverse_v: false,
            swap_uv: false,
            tolerance: T::from_f64(1e-7).unwrap(),
        }
    }
}

/// Maps planar source geometry onto a target parametric face,
/// optionally through a transfer quad.
pub struct ShapeMapper<T: FloatingPoint> {
    target: Face<T>,
    transfer: Option<Quad<T>>,
    tolerance: T,
}

impl<T: FloatingPoint> ShapeMapper<T> {
    pub fn new(target: Face<T>, transfer: Option<Quad<T>>, tolerance: T) -> Self {
        Self {
            target,
            transfer,
            tolerance,
        }
    }

    /// Mapper for a planar sketch: a hugely stretched transfer quad from
    /// the sketch bounds onto the target parameter range, with the
    /// touch-up flips applied.
    pub fn for_sketch(
        target: Face<T>,
        sketch_bounds: (T, T, T, T),
        options: &ShapeMapperOptions<T>,
    ) -> Result<Self> {
        let mut range = target.parameter_range();
        if options.swap_uv {
            range = (range.2, range.3, range.0, range.1);
        }
        let mut quad =
            super::stretched_quad(sketch_bounds, range, T::from_f64(1000.0).unwrap())?;
        if options.reverse_u {
            quad.reverse_u();
        }
        if options.reverse_v {
            quad.reverse_v();
        }
        if options.swap_uv {
            quad.swap_uv();
        }
        Ok(Self {
            target,
            transfer: Some(quad),
            tolerance: options.tolerance,
        })
    }

    pub fn target(&self) -> &Face<T> {
        &self.target
    }

    /// Obtain the parameter-space pcurves of the source edges.
    /// Without a transfer the source face must already carry them;
    /// otherwise the flat source is pushed through the transfer quad.
    pub fn source_pcurves(
        &self,
        source: &Shape<T>,
        source_face: Option<&Face<T>>,
    ) -> Result<Vec<FlatEdge<T>>> {
        let mut flats = vec![];
        for edge in source.edges() {
            let mut found = None;
            if self.transfer.is_none() {
                if let Some(face) = source_face {
                    found = face.curve_on_surface(edge, self.tolerance);
                }
            }
            let (pcurve, fp, lp) = match (found, &self.transfer) {
                (Some(hit), _) => hit,
                (None, Some(quad)) => {
                    let flat = flatten_edge(edge, self.tolerance)?;
                    let mapped = quad.map_pcurve(&flat)?;
                    let (a, b) = mapped.knots_domain();
                    (mapped, a, b)
                }
                (None, None) => {
                    return Err(Error::InvalidInput(
                        "no transfer surface and no intrinsic pcurves".to_string(),
                    ))
                }
            };

            let mut flat = FlatEdge::new(pcurve, fp, lp);
            flat.closed_hint = edge.is_closed(self.tolerance);

            // a closed source edge must stay closed in parameter space
            let gap = (flat.end_point() - flat.start_point()).norm();
            if flat.closed_hint && gap > self.tolerance {
                debug!("force closing 2D curve");
                let first_pole = flat.pcurve.pole_at(0);
                let last = flat.pcurve.pole_count() - 1;
                flat.pcurve.set_pole(last, &first_pole);
            }

            if let Some(seam) = self.find_seam(&flat) {
                flats.push(seam);
            }
            flats.push(flat);
        }
        Ok(flats)
    }

    /// A pcurve lying on the seam of a closed target also exists on the
    /// other side of the period; return the translated copy.
    fn find_seam(&self, flat: &FlatEdge<T>) -> Option<FlatEdge<T>> {
        let (u0, u1, v0, v1) = self.target.surface().bounds();
        let tol = self.tolerance * T::from_f64(3.0).unwrap();

        let probe = |f: &FlatEdge<T>, pick_u: bool, at: T| -> bool {
            let mid = (f.first + f.last) / T::from_f64(2.0).unwrap();
            [f.first, mid, f.last]
                .iter()
                .map(|t| {
                    let p = f.pcurve.point_at(*t);
                    if pick_u {
                        (p.x - at).abs()
                    } else {
                        (p.y - at).abs()
                    }
                })
                .fold(T::zero(), |a, b| a + b)
                < tol
        };

        if self.target.is_u_closed(self.tolerance) {
            if probe(flat, true, u0) {
                debug!("pcurve sits on the u0 seam");
                return Some(translate_flat(flat, Vector2::new(u1 - u0, T::zero())));
            }
            if probe(flat, true, u1) {
                debug!("pcurve sits on the u1 seam");
                return Some(translate_flat(flat, Vector2::new(u0 - u1, T::zero())));
            }
        }
        if self.target.is_v_closed(self.tolerance) {
            if probe(flat, false, v0) {
                return Some(translate_flat(flat, Vector2::new(T::zero(), v1 - v0)));
            }
            if probe(flat, false, v1) {
                return Some(translate_flat(flat, Vector2::new(T::zero(), v0 - v1)));
            }
        }
        None
    }

    /// Sort flat edges into wires; open wires crossing the seam of a
    /// periodic target are paired and rebuilt as closed ones.
    pub fn assemble_wires(&self, flats: Vec<FlatEdge<T>>) -> Vec<FlatWire<T>> {
        let mut wires = sort_flat_edges(flats, self.tolerance.max(T::from_f64(1e-9).unwrap()));
        if self.target.is_u_closed(self.tolerance) || self.target.is_v_closed(self.tolerance) {
            wires = self.pair_seam_wires(wires);
        }
        wires
    }

    fn pair_seam_wires(&self, wires: Vec<FlatWire<T>>) -> Vec<FlatWire<T>> {
        let (u0, u1, v0, v1) = self.target.surface().bounds();
        let u_period = u1 - u0;
        let v_period = v1 - v0;
        let (closed, mut open): (Vec<_>, Vec<_>) = wires.into_iter().partition(|w| w.closed);
        let mut merged: Vec<FlatWire<T>> = closed;

        'outer: while let Some(first) = open.pop() {
            for i in 0..open.len() {
                for shift in [
                    Vector2::new(u_period, T::zero()),
                    Vector2::new(-u_period, T::zero()),
                    Vector2::new(T::zero(), v_period),
                    Vector2::new(T::zero(), -v_period),
                ] {
                    let translated: Vec<FlatEdge<T>> = open[i]
                        .edges
                        .iter()
                        .map(|e| translate_flat(e, shift))
                        .collect();
                    let mut pool = first.edges.clone();
                    pool.extend(translated);
                    let rebuilt = sort_flat_edges(pool, self.tolerance.max(T::from_f64(1e-9).unwrap()));
                    if rebuilt.len() == 1 && rebuilt[0].closed {
                        debug!("paired two open wires across the seam");
                        merged.push(rebuilt.into_iter().next().unwrap());
                        open.remove(i);
                        continue 'outer;
                    }
                }
            }
            merged.push(first);
        }
        merged
    }

    /// Lift a flat wire onto a face, producing boundary edges with both
    /// representations.
    fn lift_wire(&self, face: &Face<T>, wire: &FlatWire<T>) -> Result<Vec<FaceEdge<T>>> {
        wire.edges
            .iter()
            .map(|fe| {
                let edge = face.lift_pcurve(&fe.pcurve, fe.first, fe.last)?;
                Ok(FaceEdge {
                    edge,
                    pcurve: fe.pcurve.clone(),
                    first: fe.first,
                    last: fe.last,
                    seam: false,
                })
            })
            .collect()
    }

    /// Build one face from a sorted group `{outer, holes...}`,
    /// doubling the closure tolerance on failure up to `1e-4`.
    pub fn build_face(&self, surface: &NurbsSurface3D<T>, group: &[FlatWire<T>]) -> Result<Face<T>> {
        let natural = Face::from_surface(surface.clone())?;

        let mut tolerance = self.tolerance;
        let limit = T::from_f64(1e-4).unwrap();
        loop {
            match self.try_build_face(&natural, surface, group, tolerance) {
                Ok(face) => return Ok(face),
                Err(e) => {
                    tolerance *= T::from_f64(2.0).unwrap();
                    if tolerance > limit {
                        return Err(e);
                    }
                    debug!("face build retry with doubled tolerance");
                }
            }
        }
    }

    fn try_build_face(
        &self,
        natural: &Face<T>,
        surface: &NurbsSurface3D<T>,
        group: &[FlatWire<T>],
        tolerance: T,
    ) -> Result<Face<T>> {
        let mut outer = group[0].clone();
        if !wire_is_closed(&outer, tolerance) {
            return Err(Error::TopologyFailure(
                "outer wire is not closed".to_string(),
            ));
        }
        // fix orientation: outer counter-clockwise, holes clockwise
        if !outer.is_counter_clockwise() {
            outer.reverse();
        }

        let outer_edges = self.lift_wire(natural, &outer)?;

        let mut holes = vec![];
        for hole in &group[1..] {
            let mut hole = hole.clone();
            if !wire_is_closed(&hole, tolerance) {
                return Err(Error::TopologyFailure(
                    "hole wire is not closed".to_string(),
                ));
            }
            if hole.is_counter_clockwise() {
                hole.reverse();
            }
            holes.push(self.lift_wire(natural, &hole)?);
        }

        Ok(Face::new(surface.clone(), outer_edges, holes))
    }

    /// Offset a face along its normals.
    /// Zero distance returns the face unchanged; a C0 surface is rejected
    /// with [`Error::ContinuityTooLow`].
    pub fn offset_face(&self, face: &Face<T>, distance: T) -> Result<Face<T>> {
        if distance == T::zero() {
            return Ok(face.clone());
        }
        let surface = face.surface().try_offset(distance, 16)?;
        let shifted = Face::from_surface(surface.clone())?;

        // carry the boundary pcurves over to the offset geometry
        let outer: Result<Vec<FaceEdge<T>>> = face
            .outer()
            .iter()
            .map(|fe| {
                let edge = shifted.lift_pcurve(&fe.pcurve, fe.first, fe.last)?;
                Ok(FaceEdge {
                    edge,
                    pcurve: fe.pcurve.clone(),
                    first: fe.first,
                    last: fe.last,
                    seam: fe.seam,
                })
            })
            .collect();
        let holes: Result<Vec<Vec<FaceEdge<T>>>> = face
            .holes()
            .iter()
            .map(|hole| {
                hole.iter()
                    .map(|fe| {
                        let edge = shifted.lift_pcurve(&fe.pcurve, fe.first, fe.last)?;
                        Ok(FaceEdge {
                            edge,
                            pcurve: fe.pcurve.clone(),
                            first: fe.first,
                            last: fe.last,
                            seam: fe.seam,
                        })
                    })
                    .collect()
            })
            .collect();
        Ok(Face::new(surface, outer?, holes?))
    }

    /// Map the source onto a single offset of the target.
    /// Closed groups become faces when `fill_faces` is set, otherwise
    /// compounds of lifted wires; open wires always map to edge compounds.
    pub fn map_at_offset(
        &self,
        flats: Vec<FlatEdge<T>>,
        distance: T,
        fill_faces: bool,
    ) -> Result<Vec<Shape<T>>> {
        let face = self.offset_face(&self.target, distance)?;
        let wires = self.assemble_wires(flats);

        let mut shapes = vec![];
        if fill_faces {
            let (closed, open): (Vec<_>, Vec<_>) = wires.into_iter().partition(|w| w.closed);
            if !closed.is_empty() {
                let groups = BoundarySorter::new(closed, true).sort();
                for group in groups {
                    shapes.push(Shape::Face(self.build_face(face.surface(), &group)?));
                }
            }
            for wire in open {
                shapes.push(self.wire_to_compound(&face, &wire)?);
            }
        } else {
            for wire in wires {
                shapes.push(self.wire_to_compound(&face, &wire)?);
            }
        }
        Ok(shapes)
    }

    fn wire_to_compound(&self, face: &Face<T>, wire: &FlatWire<T>) -> Result<Shape<T>> {
        let edges = self.lift_wire(face, wire)?;
        Ok(Shape::Compound(
            edges.into_iter().map(|fe| Shape::Edge(fe.edge)).collect(),
        ))
    }

    /// Two offset mappings connected by ruled faces per edge pair,
    /// aggregated into one shell per source wire.
    pub fn get_extrusion(&self, flats: Vec<FlatEdge<T>>, d1: T, d2: T) -> Result<Vec<Shell<T>>> {
        let f1 = self.offset_face(&self.target, d1)?;
        let f2 = self.offset_face(&self.target, d2)?;
        let wires = self.assemble_wires(flats);

        let mut shells = vec![];
        for wire in &wires {
            let lifted1 = self.lift_wire(&f1, wire)?;
            let lifted2 = self.lift_wire(&f2, wire)?;
            let mut faces = vec![];
            for (a, b) in lifted1.iter().zip(lifted2.iter()) {
                faces.push(ruled_between(&a.edge, &b.edge)?);
            }
            shells.push(Shell {
                faces,
                closed: false,
            });
        }
        Ok(shells)
    }

    /// Faces at both offsets sewn with their side rails; each group is
    /// promoted to a solid when everything built, and returned as a shell
    /// otherwise.
    pub fn get_solids(&self, flats: Vec<FlatEdge<T>>, d1: T, d2: T) -> Result<Vec<Shape<T>>> {
        let f1 = self.offset_face(&self.target, d1)?;
        let f2 = self.offset_face(&self.target, d2)?;
        let wires = self.assemble_wires(flats);
        let (closed, _open): (Vec<_>, Vec<_>) = wires.into_iter().partition(|w| w.closed);
        let groups = BoundarySorter::new(closed, true).sort();

        let mut out = vec![];
        for group in groups {
            let bottom = self.build_face(f1.surface(), &group);
            let top = self.build_face(f2.surface(), &group);

            let mut faces = vec![];
            let mut complete = true;
            match (&bottom, &top) {
                (Ok(b), Ok(t)) => {
                    faces.push(b.clone());
                    faces.push(t.clone());
                }
                _ => complete = false,
            }
            for wire in &group {
                let lifted1 = self.lift_wire(&f1, wire);
                let lifted2 = self.lift_wire(&f2, wire);
                match (lifted1, lifted2) {
                    (Ok(l1), Ok(l2)) => {
                        for (a, b) in l1.iter().zip(l2.iter()) {
                            match ruled_between(&a.edge, &b.edge) {
                                Ok(f) => faces.push(f),
                                Err(_) => complete = false,
                            }
                        }
                    }
                    _ => complete = false,
                }
            }

            let shell = Shell {
                faces,
                closed: complete,
            };
            if complete {
                out.push(Shape::Solid(Solid { shell }));
            } else {
                warn!("failed to close a mapped solid, returning the shell");
                out.push(Shape::Shell(shell));
            }
        }
        Ok(out)
    }

    /// The full mapping feature: offset, optional thickness with filled
    /// extrusion walls, best-effort solids.
    pub fn map(
        &self,
        flats: Vec<FlatEdge<T>>,
        options: &ShapeMapperOptions<T>,
    ) -> Result<Shape<T>> {
        if options.thickness == T::zero() {
            let shapes = self.map_at_offset(flats, options.offset, options.fill_faces)?;
            return Ok(Shape::Compound(shapes));
        }

        let d1 = options.offset;
        let d2 = options.offset + options.thickness;

        if !options.fill_extrusion {
            let mut shapes = self.map_at_offset(flats.clone(), d1, options.fill_faces)?;
            shapes.extend(self.map_at_offset(flats, d2, options.fill_faces)?);
            return Ok(Shape::Compound(shapes));
        }

        if options.fill_faces {
            let mut shapes = self.get_solids(flats, d1, d2)?;
            if options.refine {
                shapes = shapes.into_iter().map(drop_degenerate_faces).collect();
            }
            Ok(Shape::Compound(shapes))
        } else {
            let shells = self.get_extrusion(flats, d1, d2)?;
            Ok(Shape::Compound(
                shells.into_iter().map(Shape::Shell).collect(),
            ))
        }
    }
}

/// Cleanup pass of the refine option: strip collapsed wall faces whose
/// boundary has no extent.
fn drop_degenerate_faces<T: FloatingPoint>(shape: Shape<T>) -> Shape<T> {
    let degenerate = |face: &Face<T>| {
        face.outer().iter().all(|fe| {
            (fe.edge.start_point() - fe.edge.end_point()).norm()
                <= T::from_f64(1e-9).unwrap()
        })
    };
    match shape {
        Shape::Solid(mut solid) => {
            solid.shell.faces.retain(|f| !degenerate(f));
            Shape::Solid(solid)
        }
        Shape::Shell(mut shell) => {
            shell.faces.retain(|f| !degenerate(f));
            Shape::Shell(shell)
        }
        other => other,
    }
}

/// Project a nominally planar 3D edge into the XY plane
fn flatten_edge<T: FloatingPoint>(edge: &Edge<T>, tolerance: T) -> Result<NurbsCurve2D<T>> {
    let curve = edge.try_trimmed_curve()?;
    let poles = curve.dehomogenized_control_points();
    let planar_tol = tolerance.max(T::from_f64(1e-5).unwrap());
    if poles.iter().any(|p| p.z.abs() > planar_tol) {
        return Err(Error::InvalidInput(
            "source shape is not in the XY plane".to_string(),
        ));
    }
    let weights = curve.weights();
    let poles2d: Vec<nalgebra::Point3<T>> = poles
        .iter()
        .zip(weights.iter())
        .map(|(p, w)| nalgebra::Point3::new(p.x * *w, p.y * *w, *w))
        .collect();
    Ok(NurbsCurve2D::new_unchecked(
        curve.degree(),
        poles2d,
        curve.knots().clone(),
    ))
}

fn translate_flat<T: FloatingPoint>(flat: &FlatEdge<T>, shift: Vector2<T>) -> FlatEdge<T> {
    let moved = flat
        .pcurve
        .map_control_points(|p| Point2::from(p.coords + shift));
    let mut out = FlatEdge::new(moved, flat.first, flat.last);
    out.closed_hint = flat.closed_hint;
    out
}

fn wire_is_closed<T: FloatingPoint>(wire: &FlatWire<T>, tolerance: T) -> bool {
    if wire.edges.is_empty() {
        return false;
    }
    let mut previous = wire.edges[wire.edges.len() - 1].end_point();
    for e in &wire.edges {
        if (e.start_point() - previous).norm() > tolerance {
            return false;
        }
        previous = e.end_point();
    }
    true
}

/// Ruled face between two lifted edges
fn ruled_between<T: FloatingPoint>(a: &Edge<T>, b: &Edge<T>) -> Result<Face<T>> {
    let ca = a.try_trimmed_curve()?;
    let cb = b.try_trimmed_curve()?;
    let surface = NurbsSurface3D::try_ruled(&ca, &cb)?;
    Face::from_surface(surface)
}
