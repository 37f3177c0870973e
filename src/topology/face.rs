use nalgebra::{Point2, Vector3};

use crate::curve::{NurbsCurve2D, NurbsCurve3D};
use crate::errors::{Error, Result};
use crate::knot::KnotVector;
use crate::misc::{FloatingPoint, Invertible};
use crate::surface::NurbsSurface3D;

use super::Edge;

/// An edge of a face boundary carrying both representations:
/// the 3D edge and its 2D curve in the surface parameter domain.
#[derive(Debug, Clone)]
pub struct FaceEdge<T: FloatingPoint> {
    pub edge: Edge<T>,
    pub pcurve: NurbsCurve2D<T>,
    pub first: T,
    pub last: T,
    /// duplicated boundary on a closed surface
    pub seam: bool,
}

/// A trimmed region of a surface: the underlying geometry, an outer wire
/// and zero or more hole wires, all with pcurves.
#[derive(Debug, Clone)]
pub struct Face<T: FloatingPoint> {
    surface: NurbsSurface3D<T>,
    outer: Vec<FaceEdge<T>>,
    holes: Vec<Vec<FaceEdge<T>>>,
}

/// Degree-1 pcurve from `p0` to `p1` parameterized over `[t0, t1]`
pub fn pcurve_segment<T: FloatingPoint>(
    p0: Point2<T>,
    p1: Point2<T>,
    t0: T,
    t1: T,
) -> NurbsCurve2D<T> {
    NurbsCurve2D::new_unchecked(
        1,
        vec![
            nalgebra::Point3::new(p0.x, p0.y, T::one()),
            nalgebra::Point3::new(p1.x, p1.y, T::one()),
        ],
        KnotVector::new(vec![t0, t0, t1, t1]),
    )
}

impl<T: FloatingPoint> Face<T> {
    pub fn new(
        surface: NurbsSurface3D<T>,
        outer: Vec<FaceEdge<T>>,
        holes: Vec<Vec<FaceEdge<T>>>,
    ) -> Self {
        Self {
            surface,
            outer,
            holes,
        }
    }

    /// The natural rectangular face of a surface: four boundary edges with
    /// exact iso-curve geometry, counter-clockwise in the parameter domain.
    /// On a closed surface the duplicated boundary pair is flagged as seam.
    pub fn from_surface(surface: NurbsSurface3D<T>) -> Result<Self> {
        let (u0, u1, v0, v1) = surface.bounds();

        let seam_tol = T::from_f64(1e-9).unwrap();
        let u_seam = surface.is_u_periodic()
            || (0..=4).all(|i| {
                let v = v0 + (v1 - v0) * T::from_usize(i).unwrap() / T::from_usize(4).unwrap();
                (surface.point_at(u0, v) - surface.point_at(u1, v)).norm() <= seam_tol
            });
        let v_seam = surface.is_v_periodic()
            || (0..=4).all(|i| {
                let u = u0 + (u1 - u0) * T::from_usize(i).unwrap() / T::from_usize(4).unwrap();
                (surface.point_at(u, v0) - surface.point_at(u, v1)).norm() <= seam_tol
            });

        let bottom = FaceEdge {
            edge: Edge::with_range(surface.v_iso(v0), u0, u1)?,
            pcurve: pcurve_segment(Point2::new(u0, v0), Point2::new(u1, v0), u0, u1),
            first: u0,
            last: u1,
            seam: v_seam,
        };
        let right = FaceEdge {
            edge: Edge::with_range(surface.u_iso(u1), v0, v1)?,
            pcurve: pcurve_segment(Point2::new(u1, v0), Point2::new(u1, v1), v0, v1),
            first: v0,
            last: v1,
            seam: u_seam,
        };
        // the loop direction of the upper and left edges comes from their
        // reversed flag; pcurves always follow the edge parameterization
        let top = FaceEdge {
            edge: Edge::with_range(surface.v_iso(v1), u0, u1)?.reversed(),
            pcurve: pcurve_segment(Point2::new(u0, v1), Point2::new(u1, v1), u0, u1),
            first: u0,
            last: u1,
            seam: v_seam,
        };
        let left = FaceEdge {
            edge: Edge::with_range(surface.u_iso(u0), v0, v1)?.reversed(),
            pcurve: pcurve_segment(Point2::new(u0, v0), Point2::new(u0, v1), v0, v1),
            first: v0,
            last: v1,
            seam: u_seam,
        };

        Ok(Self {
            surface,
            outer: vec![bottom, right, top, left],
            holes: vec![],
        })
    }

    pub fn surface(&self) -> &NurbsSurface3D<T> {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut NurbsSurface3D<T> {
        &mut self.surface
    }

    pub fn outer(&self) -> &[FaceEdge<T>] {
        &self.outer
    }

    pub fn holes(&self) -> &[Vec<FaceEdge<T>>] {
        &self.holes
    }

    /// The trimmed parameter rectangle, bounded by the pcurve pole hulls
    pub fn parameter_range(&self) -> (T, T, T, T) {
        if self.outer.is_empty() {
            return self.surface.bounds();
        }
        let mut u_min = <T as nalgebra::RealField>::max_value().unwrap();
        let mut u_max = -u_min;
        let mut v_min = u_min;
        let mut v_max = -u_min;
        for fe in &self.outer {
            for p in fe.pcurve.dehomogenized_control_points() {
                u_min = u_min.min(p.x);
                u_max = u_max.max(p.x);
                v_min = v_min.min(p.y);
                v_max = v_max.max(p.y);
            }
        }
        (u_min, u_max, v_min, v_max)
    }

    /// Surface normal, normalized
    pub fn normal_at(&self, u: T, v: T) -> Result<Vector3<T>> {
        let n = self.surface.normal_at(u, v);
        let len = n.norm();
        if len <= T::default_epsilon() {
            return Err(Error::GeometricDegeneracy(
                "degenerate surface normal".to_string(),
            ));
        }
        Ok(n / len)
    }

    /// Find the 2D representation of `edge` among the boundary edges
    pub fn curve_on_surface(&self, edge: &Edge<T>, tolerance: T) -> Option<(NurbsCurve2D<T>, T, T)> {
        self.outer
            .iter()
            .chain(self.holes.iter().flatten())
            .find(|fe| fe.edge.is_same(edge, tolerance))
            .map(|fe| (fe.pcurve.clone(), fe.first, fe.last))
    }

    /// Index of the boundary edge matching `edge` in the outer wire
    pub fn outer_index_of(&self, edge: &Edge<T>, tolerance: T) -> Option<usize> {
        self.outer.iter().position(|fe| fe.edge.is_same(edge, tolerance))
    }

    /// Lift a pcurve onto the surface, producing a 3D edge whose
    /// parameterization matches the pcurve range.
    ///
    /// Iso-aligned pcurves are lifted exactly through the surface iso
    /// curves; general pcurves are sampled and re-interpolated.
    pub fn lift_pcurve(&self, pcurve: &NurbsCurve2D<T>, first: T, last: T) -> Result<Edge<T>> {
        let eps = T::from_f64(1e-9).unwrap();
        let samples = (pcurve.pole_count() * 4).max(16);
        let pts = pcurve.sample_regular_range_with_parameter(first, last, samples);

        let u_const = pts.iter().all(|(_, p)| (p.x - pts[0].1.x).abs() <= eps);
        let v_const = pts.iter().all(|(_, p)| (p.y - pts[0].1.y).abs() <= eps);

        if u_const {
            let iso = self.surface.u_iso(pts[0].1.x);
            return lift_iso_segment(iso, pts[0].1.y, pts[pts.len() - 1].1.y);
        }
        if v_const {
            let iso = self.surface.v_iso(pts[0].1.y);
            return lift_iso_segment(iso, pts[0].1.x, pts[pts.len() - 1].1.x);
        }

        let params: Vec<T> = pts.iter().map(|(t, _)| *t).collect();
        let points: Vec<_> = pts
            .iter()
            .map(|(_, p)| self.surface.point_at(p.x, p.y))
            .collect();
        let degree = 3.min(points.len() - 1);
        let mut lifted =
            NurbsCurve3D::try_interpolate_with_parameters(&points, degree, &params)?;
        lifted.knots_mut().remap(first, last);
        Edge::with_range(lifted, first, last)
    }

    /// Whether the face geometry closes onto itself in the u direction
    pub fn is_u_closed(&self, tolerance: T) -> bool {
        if self.surface.is_u_periodic() {
            return true;
        }
        let (u0, u1, v0, v1) = self.surface.bounds();
        (0..=4).all(|i| {
            let v = v0 + (v1 - v0) * T::from_usize(i).unwrap() / T::from_usize(4).unwrap();
            (self.surface.point_at(u0, v) - self.surface.point_at(u1, v)).norm() <= tolerance
        })
    }

    /// Whether the face geometry closes onto itself in the v direction
    pub fn is_v_closed(&self, tolerance: T) -> bool {
        if self.surface.is_v_periodic() {
            return true;
        }
        let (u0, u1, v0, v1) = self.surface.bounds();
        (0..=4).all(|i| {
            let u = u0 + (u1 - u0) * T::from_usize(i).unwrap() / T::from_usize(4).unwrap();
            (self.surface.point_at(u, v0) - self.surface.point_at(u, v1)).norm() <= tolerance
        })
    }

    /// Edges of the face boundary adjacent to `edge` at its endpoints:
    /// the one sharing the start vertex and the one sharing the end vertex.
    pub fn adjacent_edges(
        &self,
        edge: &Edge<T>,
        tolerance: T,
    ) -> (Option<&FaceEdge<T>>, Option<&FaceEdge<T>>) {
        let start = edge.start_point();
        let end = edge.end_point();
        let mut at_start = None;
        let mut at_end = None;
        for fe in self.outer.iter().chain(self.holes.iter().flatten()) {
            if fe.edge.is_same(edge, tolerance) {
                continue;
            }
            for v in [fe.edge.start_point(), fe.edge.end_point()] {
                if (v - start).norm() <= tolerance {
                    at_start = Some(fe);
                }
                if (v - end).norm() <= tolerance {
                    at_end = Some(fe);
                }
            }
        }
        (at_start, at_end)
    }

    /// 2D tangent of the adjacent boundary pcurve at the shared start vertex
    pub fn adjacent_edge_tangent(
        &self,
        edge: &Edge<T>,
        tolerance: T,
    ) -> Result<nalgebra::Vector2<T>> {
        let (at_start, _) = self.adjacent_edges(edge, tolerance);
        let neighbor = at_start.ok_or(Error::TopologyFailure(
            "no adjacent boundary edge at the start vertex".to_string(),
        ))?;
        let (u, v) = self
            .surface
            .find_closest_parameter(&edge.start_point())?;
        let target = Point2::new(u, v);
        let par = neighbor.pcurve.find_closest_parameter(&target)?;
        Ok(neighbor.pcurve.tangent_at(par))
    }
}

fn lift_iso_segment<T: FloatingPoint>(iso: NurbsCurve3D<T>, a: T, b: T) -> Result<Edge<T>> {
    if a < b {
        let segment = iso.try_segment(a, b)?;
        Edge::with_range(segment, a, b)
    } else {
        let segment = iso.try_segment(b, a)?;
        let mut curve = segment;
        curve.invert();
        let (f, l) = curve.knots_domain();
        Edge::with_range(curve, f, l)
    }
}
