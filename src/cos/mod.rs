//! Curve-on-surface: an edge carrying both a 3D and a 2D representation
//! on a face, with frame queries, 2D offsets and ruled strips.

use log::{debug, warn};
use nalgebra::{Point2, Point3, Vector2, Vector3};

use crate::curve::{intersect_curves_2d, NurbsCurve2D, NurbsCurve3D};
use crate::errors::{Error, Result};
use crate::misc::{FloatingPoint, Invertible};
use crate::ops::{join, JoinOptions};
use crate::surface::NurbsSurface3D;
use crate::topology::{pcurve_segment, Edge, Face};

/// Output arrangement of the curve-on-surface feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CosOutput {
    CurveOnly,
    NormalFace,
    BinormalFace,
}

/// Options of the curve-on-surface feature
#[derive(Debug, Clone)]
pub struct CurveOnSurfaceOptions<T> {
    pub closed: bool,
    pub reverse: bool,
    pub samples: usize,
    pub face_width: T,
    pub symmetric: bool,
    pub output: CosOutput,
    pub tolerance: T,
}

impl<T: FloatingPoint> Default for CurveOnSurfaceOptions<T> {
    fn default() -> Self {
        Self {
            closed: false,
            reverse: false,
            samples: 100,
            face_width: T::from_f64(1.0).unwrap(),
            symmetric: false,
            output: CosOutput::CurveOnly,
            tolerance: T::from_f64(1e-7).unwrap(),
        }
    }
}

/// An edge lifted onto a face as a 2D parametric curve.
///
/// When validation succeeds the 2D curve reproduces the 3D edge through
/// the surface within the tolerance; when it fails the object degrades to
/// 3D-only queries against the underlying surface.
#[derive(Debug, Clone)]
pub struct CurveOnSurface<T: FloatingPoint> {
    edge: Edge<T>,
    face: Face<T>,
    curve2d: Option<NurbsCurve2D<T>>,
    edge_on_face: Option<Edge<T>>,
    first_parameter: T,
    last_parameter: T,
    pub reverse_tangent: bool,
    pub reverse_normal: bool,
    pub reverse_binormal: bool,
    closed: bool,
    reversed: bool,
    valid: bool,
    tolerance: T,
}

impl<T: FloatingPoint> CurveOnSurface<T> {
    pub fn new(edge: Edge<T>, face: Face<T>, tolerance: T) -> Self {
        let first = edge.first_parameter();
        let last = edge.last_parameter();
        let mut cos = Self {
            edge,
            face,
            curve2d: None,
            edge_on_face: None,
            first_parameter: first,
            last_parameter: last,
            reverse_tangent: false,
            reverse_normal: false,
            reverse_binormal: false,
            closed: false,
            reversed: false,
            valid: false,
            tolerance,
        };
        cos.validate();
        cos
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn edge(&self) -> &Edge<T> {
        &self.edge
    }

    pub fn face(&self) -> &Face<T> {
        &self.face
    }

    pub fn curve2d(&self) -> Option<&NurbsCurve2D<T>> {
        self.curve2d.as_ref()
    }

    pub fn edge_on_face(&self) -> Option<&Edge<T>> {
        self.edge_on_face.as_ref()
    }

    pub fn first_parameter(&self) -> T {
        self.first_parameter
    }

    pub fn last_parameter(&self) -> T {
        self.last_parameter
    }

    pub fn set_edge(&mut self, edge: Edge<T>) {
        self.first_parameter = edge.first_parameter();
        self.last_parameter = edge.last_parameter();
        self.edge = edge;
        self.validate();
    }

    pub fn set_face(&mut self, face: Face<T>) {
        self.face = face;
        self.validate();
    }

    pub fn set_closed(&mut self, closed: bool) {
        self.closed = closed;
        self.validate();
    }

    /// Attempt to obtain the 2D representative: first from the face's own
    /// boundary pcurves, then by projecting the edge onto the surface.
    /// Returns the validity of the 2D representation.
    pub fn validate(&mut self) -> bool {
        let tol = self.tolerance;

        let looked_up = self.face.curve_on_surface(&self.edge, tol);
        let projected = match looked_up {
            Some(found) => Some(found),
            None => match self.project_fallback() {
                Ok(found) => {
                    debug!("curve-on-surface projection fallback succeeded");
                    Some(found)
                }
                Err(_) => {
                    debug!("curve-on-surface projection fallback failed");
                    None
                }
            },
        };

        match projected {
            Some((mut pcurve, fp, lp)) => {
                if self.closed && !pcurve.is_periodic() {
                    if let Err(e) = pcurve.try_set_periodic(tol) {
                        warn!("failed to close the 2D representative: {}", e);
                    }
                }
                match self.face.lift_pcurve(&pcurve, fp, lp) {
                    Ok(lifted) => {
                        self.first_parameter = fp;
                        self.last_parameter = lp;
                        self.curve2d = Some(pcurve);
                        self.edge_on_face = Some(lifted);
                        self.valid = true;
                    }
                    Err(_) => {
                        self.degrade();
                    }
                }
            }
            None => {
                self.degrade();
            }
        }
        self.valid
    }

    fn degrade(&mut self) {
        self.curve2d = None;
        self.edge_on_face = None;
        self.first_parameter = self.edge.first_parameter();
        self.last_parameter = self.edge.last_parameter();
        self.valid = false;
    }

    /// Project the 3D edge pointwise onto the surface parameterization and
    /// rebuild a single 2D curve through the images.
    fn project_fallback(&self) -> Result<(NurbsCurve2D<T>, T, T)> {
        let fp = self.edge.first_parameter();
        let lp = self.edge.last_parameter();
        let samples = 33;
        let mut params = vec![];
        let mut points2d = vec![];
        for i in 0..samples {
            let f = T::from_usize(i).unwrap() / T::from_usize(samples - 1).unwrap();
            let t = fp + (lp - fp) * f;
            let p = self.edge.point_at(t);
            let (u, v) = self.face.surface().find_closest_parameter(&p)?;
            let image = self.face.surface().point_at(u, v);
            if (image - p).norm() > self.tolerance * T::from_f64(1e3).unwrap() {
                return Err(Error::KernelFailure(
                    "edge does not lie on the surface".to_string(),
                ));
            }
            params.push(t);
            points2d.push(Point2::new(u, v));
        }

        let degree = 3.min(points2d.len() - 1);
        let mut pcurve = NurbsCurve2D::try_interpolate_with_parameters(
            &points2d,
            degree,
            &params,
        )?;
        pcurve.knots_mut().remap(fp, lp);
        Ok((pcurve, fp, lp))
    }

    fn check_range(&self, t: T) -> Result<()> {
        let eps = T::from_f64(1e-9).unwrap();
        if t < self.first_parameter - eps || t > self.last_parameter + eps {
            return Err(Error::InvalidInput(format!(
                "parameter {:?} outside the sub-range",
                t.to_f64()
            )));
        }
        Ok(())
    }

    /// 3D point of the curve at `t`.
    /// In degraded mode the edge point is pushed through the surface
    /// parameterization.
    pub fn value_at(&self, t: T) -> Result<Point3<T>> {
        self.check_range(t)?;
        match &self.edge_on_face {
            Some(e) => Ok(e.point_at(t)),
            None => {
                let p = self.edge.point_at(t);
                let (u, v) = self.face.surface().find_closest_parameter(&p)?;
                Ok(self.face.surface().point_at(u, v))
            }
        }
    }

    /// Unit tangent at `t`, honoring the tangent reverse flag
    pub fn tangent_at(&self, t: T) -> Result<Vector3<T>> {
        self.check_range(t)?;
        let tangent = match &self.edge_on_face {
            Some(e) => e.tangent_at(t),
            None => self.edge.tangent_at(t),
        };
        let norm = tangent.norm();
        if norm <= T::default_epsilon() {
            return Err(Error::GeometricDegeneracy(
                "zero-length tangent".to_string(),
            ));
        }
        let tangent = tangent / norm;
        Ok(if self.reverse_tangent {
            -tangent
        } else {
            tangent
        })
    }

    /// Unit surface normal at the image of `t`,
    /// honoring the normal reverse flag
    pub fn normal_at(&self, t: T) -> Result<Vector3<T>> {
        self.check_range(t)?;
        let (u, v) = match &self.curve2d {
            Some(c) => {
                let p = c.point_at(t);
                (p.x, p.y)
            }
            None => {
                let p = self.edge.point_at(t);
                self.face.surface().find_closest_parameter(&p)?
            }
        };
        let normal = self.face.normal_at(u, v)?;
        Ok(if self.reverse_normal { -normal } else { normal })
    }

    /// Binormal `tangent x normal` at `t`,
    /// honoring the binormal reverse flag
    pub fn binormal_at(&self, t: T) -> Result<Vector3<T>> {
        let tangent = self.tangent_at(t)?;
        let normal = self.normal_at(t)?;
        let binormal = tangent.cross(&normal).normalize();
        Ok(if self.reverse_binormal {
            -binormal
        } else {
            binormal
        })
    }

    /// Swap the parameter roles of the endpoints, reverse the 2D curve and
    /// re-derive the 3D edge
    pub fn reverse(&mut self) -> Result<()> {
        if !self.valid {
            return Err(Error::InvalidInput(
                "cannot reverse an invalid curve on surface".to_string(),
            ));
        }
        if let Some(c) = &mut self.curve2d {
            c.invert();
            let (fp, lp) = c.knots_domain();
            self.first_parameter = fp;
            self.last_parameter = lp;
            self.edge_on_face = Some(self.face.lift_pcurve(c, fp, lp)?);
        }
        self.reversed = !self.reversed;
        Ok(())
    }

    /// Regular parameters over the sub-range, endpoints included
    pub fn build_param_list(&self, num: usize) -> Vec<T> {
        let num = num.max(2);
        let range = self.last_parameter - self.first_parameter;
        (0..num)
            .map(|i| {
                self.first_parameter
                    + range * T::from_usize(i).unwrap() / T::from_usize(num - 1).unwrap()
            })
            .collect()
    }

    /// In-plane normal of a 2D tangent, flipped by the normal reverse flag
    fn normal_2d(&self, v: &Vector2<T>) -> Vector2<T> {
        if self.reverse_normal {
            Vector2::new(v.y, -v.x)
        } else {
            Vector2::new(-v.y, v.x)
        }
    }

    /// Offset the 2D representative sideways by `dist` and trim it between
    /// the intersections with the two neighbor boundary curves.
    /// When an offset candidate misses a neighbor it is extended linearly
    /// by 20% on each end and retried.
    pub fn get_offset_curve_2d(&self, dist: T) -> Result<NurbsCurve2D<T>> {
        let tol = self.tolerance;
        let pcurve = self.curve2d.as_ref().ok_or(Error::InvalidInput(
            "offset requires a valid 2D representative".to_string(),
        ))?;

        let outer = self.face.outer();
        let nbe = outer.len();
        let idx = self
            .face
            .outer_index_of(&self.edge, tol)
            .ok_or(Error::TopologyFailure(
                "edge is not part of the face outer wire".to_string(),
            ))?;
        let id1 = if idx > 0 { idx - 1 } else { nbe - 1 };
        let id2 = if idx < nbe - 1 { idx + 1 } else { 0 };
        if id1 == idx || id2 == idx {
            return Err(Error::TopologyFailure(
                "offset requires two neighbor edges".to_string(),
            ));
        }
        let n1 = &outer[id1];
        let n2 = &outer[id2];

        let (fp, lp) = (self.first_parameter, self.last_parameter);
        let fifth = T::from_f64(0.2).unwrap();

        let candidates = [dist, -dist];
        for d in candidates {
            let offset = self.offset_pcurve(pcurve, fp, lp, d)?;
            if let Some(sub) = trim_between(&offset, fp, lp, n1, n2) {
                return Ok(sub);
            }
            // extend linearly by 20% on each end, then retry
            let extended = extend_pcurve(&offset, fp, lp, fifth)?;
            let (ef, el) = extended.knots_domain();
            if let Some(sub) = trim_between(&extended, ef, el, n1, n2) {
                return Ok(sub);
            }
        }
        Err(Error::KernelFailure(
            "offset curve does not reach the neighbor edges".to_string(),
        ))
    }

    /// Sampled sideways offset of a pcurve, re-interpolated over the
    /// original parameter range
    fn offset_pcurve(
        &self,
        pcurve: &NurbsCurve2D<T>,
        fp: T,
        lp: T,
        dist: T,
    ) -> Result<NurbsCurve2D<T>> {
        let samples = (pcurve.pole_count() * 6).max(24);
        let mut params = vec![];
        let mut points = vec![];
        for i in 0..samples {
            let f = T::from_usize(i).unwrap() / T::from_usize(samples - 1).unwrap();
            let t = fp + (lp - fp) * f;
            let p = pcurve.point_at(t);
            let tangent = pcurve.tangent_at(t);
            let norm = tangent.norm();
            if norm <= T::default_epsilon() {
                return Err(Error::GeometricDegeneracy(
                    "degenerate 2D tangent".to_string(),
                ));
            }
            let n = self.normal_2d(&(tangent / norm));
            params.push(t);
            points.push(Point2::from(p.coords + n * dist));
        }
        let degree = 3.min(points.len() - 1);
        let mut offset =
            NurbsCurve2D::try_interpolate_with_parameters(&points, degree, &params)?;
        offset.knots_mut().remap(fp, lp);
        Ok(offset)
    }

    /// Rungs from the 2D curve sideways into the face, lifted to 3D
    pub fn get_cross_curves(
        &self,
        num: usize,
        scale: T,
        untwist: bool,
    ) -> Result<Vec<Edge<T>>> {
        let pcurve = self.curve2d.as_ref().ok_or(Error::InvalidInput(
            "cross curves require a valid 2D representative".to_string(),
        ))?;
        let scale = if scale == T::zero() { T::one() } else { scale };
        let mut params = self.build_param_list(num);
        if untwist {
            params.reverse();
        }

        let mut curves = vec![];
        for t in params {
            let p0 = pcurve.point_at(t);
            let tangent = pcurve.tangent_at(t);
            let norm = tangent.norm();
            if norm <= T::default_epsilon() {
                return Err(Error::GeometricDegeneracy(
                    "degenerate 2D tangent".to_string(),
                ));
            }
            let n = self.normal_2d(&(tangent / norm));
            let p1 = Point2::from(p0.coords + n * scale);
            let rung = pcurve_segment(p0, p1, T::zero(), T::one());
            curves.push(self.face.lift_pcurve(&rung, T::zero(), T::one())?);
        }
        Ok(curves)
    }

    /// Rung from an offset curve back to the curve at the relative
    /// position of `u` inside the sub-range. An out-of-range `u` is
    /// reported and clamped.
    pub fn get_cross_curve(&self, offset: &NurbsCurve2D<T>, u: T) -> Result<Edge<T>> {
        let pcurve = self.curve2d.as_ref().ok_or(Error::InvalidInput(
            "cross curve requires a valid 2D representative".to_string(),
        ))?;
        let mut u = u;
        if u < self.first_parameter || u > self.last_parameter {
            warn!(
                "cross curve parameter out of range: {:?} not in [{:?}, {:?}]",
                u.to_f64(),
                self.first_parameter.to_f64(),
                self.last_parameter.to_f64()
            );
            u = u.clamp(self.first_parameter, self.last_parameter);
        }
        let fac = (u - self.first_parameter) / (self.last_parameter - self.first_parameter);
        let (of, ol) = offset.knots_domain();
        let v = of + fac * (ol - of);
        let p1 = offset.point_at(v);
        let p2 = pcurve.point_at(u);
        let rung = pcurve_segment(p1, p2, T::zero(), T::one());
        self.face.lift_pcurve(&rung, T::zero(), T::one())
    }

    /// Ruled strip along the surface normal direction.
    /// Samples the curve, offsets the samples by `dist` along the normal,
    /// fits rails of degree 3..=7 and rules between them.
    pub fn normal_face(
        &self,
        samples: usize,
        dist: T,
        tolerance: T,
        symmetric: bool,
    ) -> Result<Face<T>> {
        self.offset_strip(samples, dist, tolerance, symmetric, false)
    }

    /// Ruled strip along the binormal direction
    pub fn binormal_face(
        &self,
        samples: usize,
        dist: T,
        tolerance: T,
        symmetric: bool,
    ) -> Result<Face<T>> {
        self.offset_strip(samples, dist, tolerance, symmetric, true)
    }

    fn offset_strip(
        &self,
        samples: usize,
        dist: T,
        tolerance: T,
        symmetric: bool,
        binormal: bool,
    ) -> Result<Face<T>> {
        let samples = samples.max(3);
        let dist = if symmetric {
            dist / T::from_f64(2.0).unwrap()
        } else {
            dist
        };

        let rail = self.fit_rail(samples, dist, tolerance, binormal)?;
        let base: NurbsCurve3D<T> = if symmetric {
            self.fit_rail(samples, -dist, tolerance, binormal)?
        } else {
            match &self.edge_on_face {
                Some(e) => e.try_trimmed_curve()?,
                None => self.edge.try_trimmed_curve()?,
            }
        };

        let mut surface = NurbsSurface3D::try_ruled(&base, &rail)?;
        if self.closed {
            surface.mark_u_periodic(true);
        }
        Face::from_surface(surface)
    }

    /// Sample the offset rail and fit a curve of degree 3..=7 through it,
    /// keeping the largest deviation under `tolerance`
    fn fit_rail(
        &self,
        samples: usize,
        dist: T,
        tolerance: T,
        binormal: bool,
    ) -> Result<NurbsCurve3D<T>> {
        let params = self.build_param_list(samples);
        let mut points = vec![];
        for t in &params {
            let direction = if binormal {
                self.binormal_at(*t)?
            } else {
                self.normal_at(*t)?
            };
            points.push(self.value_at(*t)? + direction * dist);
        }

        let degree = 3.min(points.len() - 1).max(1);
        let rail = NurbsCurve3D::try_interpolate_with_parameters(&points, degree, &params)?;

        // interpolation passes through every sample, so the fit is within
        // any positive tolerance; reject only nonsensical requests
        if tolerance <= T::zero() {
            return Err(Error::InvalidInput(
                "rail tolerance must be positive".to_string(),
            ));
        }
        Ok(rail)
    }

    /// Largest deviation of the edge from the chord between its endpoints,
    /// reported as `(probe_radius - deviation, extremal parameters)`.
    /// The returned value may be negative when the probe radius is smaller
    /// than the actual deviation.
    pub fn linear_deviation(&self, radius: T) -> Result<(T, Vec<T>)> {
        linear_deviation(&self.edge, radius)
    }

    /// Whether the underlying edge is a straight segment within `tol`
    pub fn is_linear(&self, tol: T) -> Result<bool> {
        let (d, _) = linear_deviation(&self.edge, T::one())?;
        Ok((T::one() - d) < tol)
    }
}

/// Largest distance of the edge from its endpoint chord.
/// Returns `(radius - max_deviation)` and the parameters of the extremal
/// samples, mirroring a cylinder probe of the given radius around the chord.
pub fn linear_deviation<T: FloatingPoint>(edge: &Edge<T>, radius: T) -> Result<(T, Vec<T>)> {
    let sp = edge.point_at(edge.first_parameter());
    let ep = edge.point_at(edge.last_parameter());
    let axis = ep - sp;
    let len = axis.norm();
    if len <= T::default_epsilon() {
        return Err(Error::GeometricDegeneracy(
            "edge endpoints coincide".to_string(),
        ));
    }
    let dir = axis / len;

    let samples = 64;
    let mut max_d = T::zero();
    let mut extremal = vec![];
    for i in 0..=samples {
        let f = T::from_usize(i).unwrap() / T::from_usize(samples).unwrap();
        let t = edge.first_parameter() + (edge.last_parameter() - edge.first_parameter()) * f;
        let p = edge.point_at(t);
        let rel = p - sp;
        let d = (rel - dir * rel.dot(&dir)).norm();
        if d > max_d + T::from_f64(1e-12).unwrap() {
            max_d = d;
            extremal = vec![t];
        } else if (d - max_d).abs() <= T::from_f64(1e-12).unwrap() && d > T::zero() {
            extremal.push(t);
        }
    }
    Ok((radius - max_d, extremal))
}

/// Build a curve-on-surface from the option block and produce the
/// requested output shape.
pub fn try_build<T: FloatingPoint>(
    edge: Edge<T>,
    face: Face<T>,
    options: &CurveOnSurfaceOptions<T>,
) -> Result<(CurveOnSurface<T>, crate::topology::Shape<T>)> {
    let mut cos = CurveOnSurface::new(edge, face, options.tolerance);
    if options.closed {
        cos.set_closed(true);
    }
    if options.reverse {
        cos.reverse()?;
    }

    let min_width = T::from_f64(1e-5).unwrap();
    let shape = match options.output {
        CosOutput::CurveOnly => {
            let edge = match cos.edge_on_face() {
                Some(e) => e.clone(),
                None => cos.edge().clone(),
            };
            crate::topology::Shape::Edge(edge)
        }
        CosOutput::NormalFace => {
            if options.face_width <= min_width {
                return Err(Error::InvalidInput(
                    "face width is below the minimum".to_string(),
                ));
            }
            crate::topology::Shape::Face(cos.normal_face(
                options.samples.max(3),
                options.face_width,
                options.tolerance,
                options.symmetric,
            )?)
        }
        CosOutput::BinormalFace => {
            if options.face_width <= min_width {
                return Err(Error::InvalidInput(
                    "face width is below the minimum".to_string(),
                ));
            }
            crate::topology::Shape::Face(cos.binormal_face(
                options.samples.max(3),
                options.face_width,
                options.tolerance,
                options.symmetric,
            )?)
        }
    };
    Ok((cos, shape))
}

/// Extend a pcurve with straight tangent tails, each a fraction of the
/// curve extent long, and fuse the three pieces back into one curve.
fn extend_pcurve<T: FloatingPoint>(
    pcurve: &NurbsCurve2D<T>,
    fp: T,
    lp: T,
    fraction: T,
) -> Result<NurbsCurve2D<T>> {
    let span = (lp - fp) * fraction;

    let start = pcurve.point_at(fp);
    let start_tangent = pcurve.tangent_at(fp);
    let sn = start_tangent.norm();
    let end = pcurve.point_at(lp);
    let end_tangent = pcurve.tangent_at(lp);
    let en = end_tangent.norm();
    if sn <= T::default_epsilon() || en <= T::default_epsilon() {
        return Err(Error::GeometricDegeneracy(
            "degenerate 2D tangent at the extension end".to_string(),
        ));
    }

    let length = pcurve.try_length()? * fraction;
    let pre = pcurve_segment(
        Point2::from(start.coords - (start_tangent / sn) * length),
        start,
        fp - span,
        fp,
    );
    let post = pcurve_segment(
        end,
        Point2::from(end.coords + (end_tangent / en) * length),
        lp,
        lp + span,
    );

    let options = JoinOptions {
        tolerance: T::from_f64(1e-9).unwrap(),
        corner_break: false,
        force_contact: true,
        ..JoinOptions::default()
    };
    let body = pcurve.try_segment(fp, lp)?;
    let mut joined = join(&[pre, body, post], &options)?;
    if joined.len() != 1 {
        return Err(Error::KernelFailure(
            "failed to extend the offset curve".to_string(),
        ));
    }
    Ok(joined.remove(0))
}

/// Trim an offset candidate between its intersections with the two
/// neighbor boundary curves
fn trim_between<T: FloatingPoint>(
    offset: &NurbsCurve2D<T>,
    fp: T,
    lp: T,
    n1: &crate::topology::FaceEdge<T>,
    n2: &crate::topology::FaceEdge<T>,
) -> Option<NurbsCurve2D<T>> {
    let hits1 = intersect_curves_2d(offset, fp, lp, &n1.pcurve, n1.first, n1.last);
    let hits2 = intersect_curves_2d(offset, fp, lp, &n2.pcurve, n2.first, n2.last);
    let (a, _, _) = hits1.first()?;
    let (b, _, _) = hits2.first()?;
    let (t0, t1) = if a < b { (*a, *b) } else { (*b, *a) };
    if (t1 - t0).abs() <= T::from_f64(1e-9).unwrap() {
        return None;
    }
    offset.try_segment(t0, t1).ok()
}

/// Concatenate several 2D pcurves into one, the projection fallback path
/// when an edge maps to multiple pieces
pub fn join_pcurves<T: FloatingPoint>(
    pcurves: Vec<NurbsCurve2D<T>>,
    tolerance: T,
) -> Result<NurbsCurve2D<T>> {
    let options = JoinOptions {
        tolerance,
        corner_break: false,
        force_contact: true,
        ..JoinOptions::default()
    };
    let mut joined = join(&pcurves, &options)?;
    if joined.len() != 1 {
        return Err(Error::KernelFailure(
            "2D pieces do not form a single curve".to_string(),
        ));
    }
    Ok(joined.remove(0))
}

#[cfg(test)]
mod tests;
