//! Mixed curve: the 3D intersection of two extruded planar shapes.

use log::{debug, warn};
use nalgebra::{Point2, Point3, Vector3};

use crate::curve::{intersect_curves_2d, NurbsCurve2D, NurbsCurve3D};
use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;
use crate::ops::{join, JoinOptions};
use crate::surface::NurbsSurface3D;
use crate::topology::{edges_to_wires, Edge, Face, Shape};

const TOL: f64 = 1e-7;

/// Options of the mixed-curve feature.
/// A missing direction falls back to the shape's plane normal,
/// or to the global z axis when the shape does not span a plane.
#[derive(Debug, Clone, Default)]
pub struct MixedCurveOptions<T: FloatingPoint> {
    pub direction1: Option<Vector3<T>>,
    pub direction2: Option<Vector3<T>>,
    pub fill_face1: bool,
    pub fill_face2: bool,
}

/// Builds a 3D curve as the intersection of two projected curves.
pub struct MixedCurve<T: FloatingPoint> {
    shape1: Shape<T>,
    shape2: Shape<T>,
    dir1: Vector3<T>,
    dir2: Vector3<T>,
    fill_face1: bool,
    fill_face2: bool,
}

impl<T: FloatingPoint> MixedCurve<T> {
    pub fn try_new(
        shape1: Shape<T>,
        shape2: Shape<T>,
        options: &MixedCurveOptions<T>,
    ) -> Result<Self> {
        let dir1 = resolve_direction(&shape1, options.direction1)?;
        let dir2 = resolve_direction(&shape2, options.direction2)?;
        Ok(Self {
            shape1,
            shape2,
            dir1,
            dir2,
            fill_face1: options.fill_face1,
            fill_face2: options.fill_face2,
        })
    }

    /// Intersect every pair of extruded faces, gather the intersection
    /// edges, drop the ones shorter than the tolerance and sort the rest
    /// into wires.
    pub fn try_shape(&self) -> Result<Shape<T>> {
        let tol = T::from_f64(TOL).unwrap();

        let curves1 = shape_curves(&self.shape1)?;
        let curves2 = shape_curves(&self.shape2)?;
        if curves1.is_empty() || curves2.is_empty() {
            return Err(Error::InvalidInput("a source shape is empty".to_string()));
        }

        let mut edges: Vec<Edge<T>> = vec![];
        for c1 in &curves1 {
            for c2 in &curves2 {
                edges.extend(intersect_extrusions(c1, &self.dir1, c2, &self.dir2)?);
            }
        }

        // discard degenerate slivers
        let mut kept = vec![];
        for e in edges {
            if e.try_length()? > tol {
                kept.push(e);
            }
        }
        if kept.is_empty() {
            return Err(Error::KernelFailure(
                "the extrusions do not intersect".to_string(),
            ));
        }

        let wires = edges_to_wires(kept, T::from_f64(1e-6).unwrap())?;
        debug!("mixed curve produced {} wire(s)", wires.len());

        let mut shapes: Vec<Shape<T>> = vec![];
        if self.fill_face1 {
            match self.fill_face(&curves1, &wires) {
                Ok(faces) => shapes.extend(faces),
                Err(e) => warn!("failed to build fill face 1: {}", e),
            }
        }
        if self.fill_face2 {
            match self.fill_face(&curves2, &wires) {
                Ok(faces) => shapes.extend(faces),
                Err(e) => warn!("failed to build fill face 2: {}", e),
            }
        }

        let mut wire_shapes: Vec<Shape<T>> =
            wires.into_iter().map(Shape::Wire).collect();
        if shapes.is_empty() && wire_shapes.len() == 1 {
            return Ok(wire_shapes.remove(0));
        }
        wire_shapes.extend(shapes);
        Ok(Shape::Compound(wire_shapes))
    }

    /// Ruled faces between a source profile and the mixed result
    fn fill_face(
        &self,
        curves: &[NurbsCurve3D<T>],
        wires: &[crate::topology::Wire<T>],
    ) -> Result<Vec<Shape<T>>> {
        let options = JoinOptions {
            tolerance: T::from_f64(1e-6).unwrap(),
            corner_break: false,
            force_contact: true,
            ..JoinOptions::default()
        };
        let source = single_curve(curves, &options)?;

        let mut faces = vec![];
        for wire in wires {
            let target_curves: Vec<NurbsCurve3D<T>> = wire
                .edges()
                .iter()
                .map(|e| e.try_trimmed_curve())
                .collect::<Result<_>>()?;
            let target = single_curve(&target_curves, &options)?;
            let surface = NurbsSurface3D::try_ruled(&source, &target)?;
            faces.push(Shape::Face(Face::from_surface(surface)?));
        }
        Ok(faces)
    }
}

fn single_curve<T: FloatingPoint>(
    curves: &[NurbsCurve3D<T>],
    options: &JoinOptions<T>,
) -> Result<NurbsCurve3D<T>> {
    let mut joined = join(curves, options)?;
    if joined.len() != 1 {
        return Err(Error::TopologyFailure(
            "profile does not join into a single curve".to_string(),
        ));
    }
    Ok(joined.remove(0))
}

/// Direction fallback: explicit vector, else the shape plane normal,
/// else the global z axis. An explicit null vector is rejected.
fn resolve_direction<T: FloatingPoint>(
    shape: &Shape<T>,
    direction: Option<Vector3<T>>,
) -> Result<Vector3<T>> {
    match direction {
        Some(d) => {
            if d.norm() <= T::default_epsilon() {
                Err(Error::InvalidInput("direction vector is null".to_string()))
            } else {
                Ok(d)
            }
        }
        None => match shape_plane_normal(shape) {
            Some(n) => Ok(n),
            None => Ok(Vector3::z()),
        },
    }
}

/// Newell plane normal over the tessellated shape points
fn shape_plane_normal<T: FloatingPoint>(shape: &Shape<T>) -> Option<Vector3<T>> {
    let mut points: Vec<Point3<T>> = vec![];
    for e in shape.edges() {
        let c = e.try_trimmed_curve().ok()?;
        points.extend(c.tessellate(Some(T::from_f64(1e-4).unwrap())));
    }
    if points.len() < 3 {
        return None;
    }
    let n = points.len();
    let inv = T::one() / T::from_usize(n).unwrap();
    let centroid = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        * inv;
    let mut normal = Vector3::zeros();
    for i in 0..n {
        let a = points[i].coords - centroid;
        let b = points[(i + 1) % n].coords - centroid;
        normal += a.cross(&b);
    }
    if normal.norm() <= T::from_f64(1e-9).unwrap() {
        None
    } else {
        Some(normal.normalize())
    }
}

fn shape_curves<T: FloatingPoint>(shape: &Shape<T>) -> Result<Vec<NurbsCurve3D<T>>> {
    shape
        .edges()
        .iter()
        .map(|e| e.try_trimmed_curve())
        .collect()
}

/// Intersection edges between the extrusion of `c1` along `d1` and the
/// extrusion of `c2` along `d2`, both over the sweep range `[0, 1]` of
/// their vectors.
fn intersect_extrusions<T: FloatingPoint>(
    c1: &NurbsCurve3D<T>,
    d1: &Vector3<T>,
    c2: &NurbsCurve3D<T>,
    d2: &Vector3<T>,
) -> Result<Vec<Edge<T>>> {
    let n1 = d1.normalize();
    let n2 = d2.normalize();
    if n1.cross(&n2).norm() <= T::from_f64(1e-9).unwrap() {
        intersect_parallel_extrusions(c1, d1, c2, d2)
    } else {
        intersect_skew_extrusions(c1, d1, c2, d2)
    }
}

/// Both sweeps run the same way: intersect the base curves in the common
/// projection plane; each crossing spawns a straight edge along the sweep,
/// clipped to the overlap of the two extents.
fn intersect_parallel_extrusions<T: FloatingPoint>(
    c1: &NurbsCurve3D<T>,
    d1: &Vector3<T>,
    c2: &NurbsCurve3D<T>,
    d2: &Vector3<T>,
) -> Result<Vec<Edge<T>>> {
    let axis = d1.normalize();
    let (e1, e2) = plane_basis(&axis);

    let p1 = project_curve(c1, &axis, &e1, &e2)?;
    let p2 = project_curve(c2, &axis, &e1, &e2)?;

    let (a0, a1) = c1.knots_domain();
    let (b0, b1) = c2.knots_domain();
    let hits = intersect_curves_2d(&p1, a0, a1, &p2, b0, b1);

    let mut edges = vec![];
    for (ta, tb, _) in hits {
        let q1 = c1.point_at(ta);
        let q2 = c2.point_at(tb);

        // both sweep intervals expressed along the axis from q1
        let s2 = (q2 - q1).dot(&axis);
        let len1 = d1.dot(&axis);
        let len2 = d2.dot(&axis);
        let (lo1, hi1) = ordered(T::zero(), len1);
        let (lo2, hi2) = ordered(s2, s2 + len2);
        let lo = lo1.max(lo2);
        let hi = hi1.min(hi2);
        if hi - lo <= T::from_f64(1e-12).unwrap() {
            continue;
        }
        let start = q1 + axis * lo;
        let end = q1 + axis * hi;
        edges.push(Edge::new(NurbsCurve3D::polyline(&[start, end])));
    }
    Ok(edges)
}

fn ordered<T: FloatingPoint>(a: T, b: T) -> (T, T) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// March along the first base curve; at every sample the sweep line is
/// projected along `d2` into the second shape's plane and intersected
/// with the second base curve. The resulting point chains are
/// re-interpolated into curves.
fn intersect_skew_extrusions<T: FloatingPoint>(
    c1: &NurbsCurve3D<T>,
    d1: &Vector3<T>,
    c2: &NurbsCurve3D<T>,
    d2: &Vector3<T>,
) -> Result<Vec<Edge<T>>> {
    // plane of the second profile; a straight profile takes the plane
    // spanned by itself and the sweep direction
    let origin = c2.first_point();
    let eps = T::from_f64(1e-12).unwrap();
    let normal = curve_plane_normal(c2)
        .filter(|n| d2.dot(n).abs() > eps)
        .or_else(|| {
            let chord = c2.last_point() - c2.first_point();
            let len = chord.norm();
            if len <= T::default_epsilon() {
                return None;
            }
            let s = chord / len;
            let n = d2 - s * s.dot(d2);
            if n.norm() <= eps {
                None
            } else {
                Some(n.normalize())
            }
        })
        .ok_or(Error::GeometricDegeneracy(
            "cannot span a projection plane for the second profile".to_string(),
        ))?;
    let denom = d2.dot(&normal);
    if denom.abs() <= eps {
        return Err(Error::GeometricDegeneracy(
            "second sweep direction is parallel to its profile plane".to_string(),
        ));
    }

    let project = |p: &Point3<T>| -> Point3<T> {
        let t = (p - origin).dot(&normal) / denom;
        p - d2 * t
    };
    let (e1, e2) = plane_basis(&normal);
    let to_2d = |p: &Point3<T>| -> Point2<T> {
        let rel = p - origin;
        Point2::new(rel.dot(&e1), rel.dot(&e2))
    };

    // projected second profile, exact through its poles
    let p2 = {
        let poles = c2.dehomogenized_control_points();
        let weights = c2.weights();
        let projected: Vec<nalgebra::Point3<T>> = poles
            .iter()
            .zip(weights.iter())
            .map(|(p, w)| {
                let q = to_2d(&project(p));
                nalgebra::Point3::new(q.x * *w, q.y * *w, *w)
            })
            .collect();
        NurbsCurve2D::new_unchecked(c2.degree(), projected, c2.knots().clone())
    };
    let (b0, b1) = c2.knots_domain();

    let samples = 64;
    let (a0, a1) = c1.knots_domain();

    // chains of intersection points, one per crossing branch
    let mut chains: Vec<Vec<Point3<T>>> = vec![];
    let mut previous_count = 0;

    for i in 0..=samples {
        let f = T::from_usize(i).unwrap() / T::from_usize(samples).unwrap();
        let u = a0 + (a1 - a0) * f;
        let base = c1.point_at(u);
        let tip = base + d1;

        let q0 = to_2d(&project(&base));
        let q1 = to_2d(&project(&tip));
        let sweep = crate::topology::pcurve_segment(q0, q1, T::zero(), T::one());

        let mut hits = intersect_curves_2d(&sweep, T::zero(), T::one(), &p2, b0, b1);
        hits.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap());

        if hits.len() != previous_count {
            previous_count = hits.len();
            for _ in chains.len()..(chains.len() + hits.len()) {
                chains.push(vec![]);
            }
        }
        let base_chain = chains.len() - hits.len();
        for (k, (s, tb, _)) in hits.iter().enumerate() {
            let x = base + d1 * *s;
            // confirm the point sits inside the second sweep extent
            let foot = c2.point_at(*tb);
            let along = (x - foot).dot(&d2.normalize()) / d2.norm();
            if along < -T::from_f64(1e-9).unwrap() || along > T::one() + T::from_f64(1e-9).unwrap()
            {
                continue;
            }
            chains[base_chain + k].push(x);
        }
    }

    let mut edges = vec![];
    for chain in chains {
        if chain.len() < 2 {
            continue;
        }
        let degree = 3.min(chain.len() - 1);
        match NurbsCurve3D::try_interpolate(&chain, degree) {
            Ok(curve) => edges.push(Edge::new(curve)),
            Err(e) => debug!("skipping a mixed curve branch: {}", e),
        }
    }
    Ok(edges)
}

/// Drop the axis coordinate of every pole: the projection of the curve
/// along `axis` onto the plane spanned by `(e1, e2)`, exact through the
/// homogeneous poles.
fn project_curve<T: FloatingPoint>(
    curve: &NurbsCurve3D<T>,
    _axis: &Vector3<T>,
    e1: &Vector3<T>,
    e2: &Vector3<T>,
) -> Result<NurbsCurve2D<T>> {
    let poles = curve.dehomogenized_control_points();
    let weights = curve.weights();
    let projected: Vec<nalgebra::Point3<T>> = poles
        .iter()
        .zip(weights.iter())
        .map(|(p, w)| {
            let x = p.coords.dot(e1);
            let y = p.coords.dot(e2);
            nalgebra::Point3::new(x * *w, y * *w, *w)
        })
        .collect();
    Ok(NurbsCurve2D::new_unchecked(
        curve.degree(),
        projected,
        curve.knots().clone(),
    ))
}

fn curve_plane_normal<T: FloatingPoint>(curve: &NurbsCurve3D<T>) -> Option<Vector3<T>> {
    let points = curve.tessellate(Some(T::from_f64(1e-4).unwrap()));
    if points.len() < 3 {
        return None;
    }
    let origin = points[0];
    let mut normal = Vector3::zeros();
    for w in points.windows(2) {
        normal += (w[0] - origin).cross(&(w[1] - origin));
    }
    if normal.norm() <= T::from_f64(1e-9).unwrap() {
        None
    } else {
        Some(normal.normalize())
    }
}

/// Any orthonormal basis of the plane orthogonal to `axis`
fn plane_basis<T: FloatingPoint>(axis: &Vector3<T>) -> (Vector3<T>, Vector3<T>) {
    let helper = if axis.x.abs() < T::from_f64(0.9).unwrap() {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let e1 = axis.cross(&helper).normalize();
    let e2 = axis.cross(&e1).normalize();
    (e1, e2)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    use super::*;
    use crate::topology::{Edge, Shape};

    fn segment(a: Point3<f64>, b: Point3<f64>) -> Shape<f64> {
        Shape::Edge(Edge::new(crate::curve::NurbsCurve3D::polyline(&[a, b])))
    }

    #[test]
    fn perpendicular_segments_intersect_in_a_vertical_edge() {
        let s1 = segment(Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let s2 = segment(Point3::new(0.0, -1.0, 0.0), Point3::new(0.0, 1.0, 0.0));
        let options = MixedCurveOptions {
            direction1: Some(Vector3::new(0.0, 0.0, 2.0)),
            direction2: Some(Vector3::new(0.0, 0.0, 2.0)),
            ..MixedCurveOptions::default()
        };
        let mixed = MixedCurve::try_new(s1, s2, &options).unwrap();
        let shape = mixed.try_shape().unwrap();

        let edges = shape.edges();
        assert_eq!(edges.len(), 1);
        let e = edges[0];
        let len = e.try_length().unwrap();
        assert_relative_eq!(len, 2.0, epsilon = 1e-6);

        let a = e.point_at(e.first_parameter());
        let b = e.point_at(e.last_parameter());
        assert_relative_eq!(a.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(a.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!((b - a).normalize(), Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn null_direction_is_rejected() {
        let s1 = segment(Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let s2 = segment(Point3::new(0.0, -1.0, 0.0), Point3::new(0.0, 1.0, 0.0));
        let options = MixedCurveOptions {
            direction1: Some(Vector3::zeros()),
            direction2: Some(Vector3::new(0.0, 0.0, 1.0)),
            ..MixedCurveOptions::default()
        };
        assert!(MixedCurve::try_new(s1, s2, &options).is_err());
    }

    #[test]
    fn skew_projections_meet_on_a_curve() {
        // two crossing profiles swept along different axes:
        // a segment on the floor swept up, a vertical segment swept sideways
        let s1 = segment(Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let s2 = segment(Point3::new(0.0, -1.0, 1.0), Point3::new(0.0, 1.0, 1.0));
        let options = MixedCurveOptions {
            direction1: Some(Vector3::new(0.0, 0.0, 2.0)),
            direction2: Some(Vector3::new(1.0, 0.0, 0.0)),
            ..MixedCurveOptions::default()
        };
        let mixed = MixedCurve::try_new(s1, s2, &options).unwrap();
        let shape = mixed.try_shape().unwrap();
        let edges = shape.edges();
        assert!(!edges.is_empty());

        // every point of the result lies on both swept surfaces:
        // x >= 0 plane band swept from the vertical segment, z in [0,2]
        for e in edges {
            let mid = e.point_at((e.first_parameter() + e.last_parameter()) / 2.0);
            assert_relative_eq!(mid.y, 0.0, epsilon = 1e-6);
            assert_relative_eq!(mid.z, 1.0, epsilon = 1e-6);
        }
    }
}
