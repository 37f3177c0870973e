//! Extraction of bounded iso curves from trimmed faces.

use nalgebra::Point2;

use crate::errors::{Error, Result};
use crate::misc::{FloatingPoint, Line};
use crate::topology::{pcurve_segment, Edge, Face, FaceEdge};

const TOL: f64 = 1e-7;

/// Direction of an iso curve in the surface parameter domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoDirection {
    U,
    V,
}

/// A single bounded iso curve of a face
#[derive(Debug, Clone)]
pub struct IsoCurve<T: FloatingPoint> {
    face: Face<T>,
    direction: IsoDirection,
    parameter: T,
}

impl<T: FloatingPoint> IsoCurve<T> {
    pub fn new(face: Face<T>, direction: IsoDirection, parameter: T) -> Self {
        Self {
            face,
            direction,
            parameter,
        }
    }

    /// Intersect the scanline at the fixed parameter with the outer wire
    /// pcurves and lift the segment between the two outermost hits.
    /// Returns `None` when the hits are absent or coincident.
    pub fn try_shape(&self) -> Result<Option<Edge<T>>> {
        let (u0, u1, v0, v1) = self.face.parameter_range();
        let p = self.parameter;

        let (line, a, b) = match self.direction {
            IsoDirection::U => {
                if p < u0 || p > u1 {
                    return Err(Error::InvalidInput(
                        "iso parameter outside the face range".to_string(),
                    ));
                }
                (
                    Line::new(Point2::new(p, v0), Point2::new(p, v1)),
                    v0,
                    v1,
                )
            }
            IsoDirection::V => {
                if p < v0 || p > v1 {
                    return Err(Error::InvalidInput(
                        "iso parameter outside the face range".to_string(),
                    ));
                }
                (
                    Line::new(Point2::new(u0, p), Point2::new(u1, p)),
                    u0,
                    u1,
                )
            }
        };

        let boundary = dedup_seams(self.face.outer(), T::from_f64(TOL).unwrap());
        let mut hits: Vec<T> = vec![];
        for fe in boundary {
            hits.extend(scanline_hits(fe, &line));
        }

        if hits.len() < 2 {
            return Ok(None);
        }
        hits.sort_by(|x, y| x.partial_cmp(y).unwrap());
        let (t0, t1) = (hits[0], hits[hits.len() - 1]);
        // hit parameters are fractions along the scanline
        let (w0, w1) = (a + (b - a) * t0, a + (b - a) * t1);
        if (w1 - w0).abs() <= T::from_f64(1e-9).unwrap() {
            return Ok(None);
        }

        let pcurve = match self.direction {
            IsoDirection::U => {
                pcurve_segment(Point2::new(p, w0), Point2::new(p, w1), w0, w1)
            }
            IsoDirection::V => {
                pcurve_segment(Point2::new(w0, p), Point2::new(w1, p), w0, w1)
            }
        };
        self.face.lift_pcurve(&pcurve, w0, w1).map(Some)
    }
}

/// Skip boundary pcurves that duplicate an already seen one,
/// the seam case on closed surfaces.
fn dedup_seams<T: FloatingPoint>(edges: &[FaceEdge<T>], tolerance: T) -> Vec<&FaceEdge<T>> {
    let mut kept: Vec<&FaceEdge<T>> = vec![];
    for fe in edges {
        let duplicate = fe.seam
            && kept
                .iter()
                .any(|other| pcurves_equal(fe, other, tolerance));
        if !duplicate {
            kept.push(fe);
        }
    }
    kept
}

fn pcurves_equal<T: FloatingPoint>(a: &FaceEdge<T>, b: &FaceEdge<T>, tolerance: T) -> bool {
    let n = 6;
    (0..=n).all(|i| {
        let f = T::from_usize(i).unwrap() / T::from_usize(n).unwrap();
        let ta = a.first + (a.last - a.first) * f;
        let tb = b.first + (b.last - b.first) * f;
        (a.pcurve.point_at(ta) - b.pcurve.point_at(tb)).norm() <= tolerance
            || (a.pcurve.point_at(ta) - b.pcurve.point_at(b.last - (tb - b.first))).norm()
                <= tolerance
    })
}

/// Intersections between a boundary pcurve and an axis scanline.
/// Returns fractions in `[0, 1]` along the scanline, found by sign
/// changes of the side distance and refined by bisection.
fn scanline_hits<T: FloatingPoint>(fe: &FaceEdge<T>, line: &Line<T>) -> Vec<T> {
    let dir = line.tangent();
    let len = dir.norm();
    if len <= T::default_epsilon() {
        return vec![];
    }

    let side = |p: &Point2<T>| {
        let rel = p - line.start();
        (dir.x * rel.y - dir.y * rel.x) / len
    };

    let samples = (fe.pcurve.pole_count() * 8).max(32);
    let pts = fe
        .pcurve
        .sample_regular_range_with_parameter(fe.first, fe.last, samples);

    let eps = T::from_f64(1e-12).unwrap();
    let mut hits = vec![];
    for w in pts.windows(2) {
        let (ta, pa) = &w[0];
        let (tb, pb) = &w[1];
        let sa = side(pa);
        let sb = side(pb);
        if sa.abs() <= eps {
            hits.push(fraction_on_line(line, pa));
            continue;
        }
        if sa * sb < T::zero() {
            // bisect the pcurve parameter across the crossing
            let mut lo = (*ta, sa);
            let mut hi = (*tb, sb);
            for _ in 0..40 {
                let mid = (lo.0 + hi.0) * T::from_f64(0.5).unwrap();
                let sm = side(&fe.pcurve.point_at(mid));
                if sm.abs() <= eps {
                    lo = (mid, sm);
                    break;
                }
                if sm * lo.1 < T::zero() {
                    hi = (mid, sm);
                } else {
                    lo = (mid, sm);
                }
            }
            hits.push(fraction_on_line(line, &fe.pcurve.point_at(lo.0)));
        }
    }
    // the final sample may touch the line as well
    if let Some((_, last)) = pts.last() {
        if side(last).abs() <= eps {
            hits.push(fraction_on_line(line, last));
        }
    }

    hits.retain(|h| *h >= -T::from_f64(1e-9).unwrap() && *h <= T::one() + T::from_f64(1e-9).unwrap());
    hits
}

fn fraction_on_line<T: FloatingPoint>(line: &Line<T>, p: &Point2<T>) -> T {
    let dir = line.tangent();
    let denom = dir.dot(&dir);
    (p - line.start()).dot(&dir) / denom
}

/// A uniformly distributed set of iso curves over a face.
#[derive(Debug, Clone)]
pub struct MultiIso<T: FloatingPoint> {
    face: Face<T>,
    params_u: Vec<T>,
    params_v: Vec<T>,
}

impl<T: FloatingPoint> MultiIso<T> {
    pub fn new(face: Face<T>, number_u: usize, number_v: usize) -> Self {
        let mut multi = Self {
            face,
            params_u: vec![],
            params_v: vec![],
        };
        if number_u > 0 {
            multi.set_number_u(number_u);
        }
        if number_v > 0 {
            multi.set_number_v(number_v);
        }
        multi
    }

    /// A single explicit parameter in one direction
    pub fn single(face: Face<T>, direction: IsoDirection, parameter: T) -> Self {
        let mut multi = Self {
            face,
            params_u: vec![],
            params_v: vec![],
        };
        match direction {
            IsoDirection::U => multi.params_u.push(parameter),
            IsoDirection::V => multi.params_v.push(parameter),
        }
        multi
    }

    fn param_list(n: usize, fp: T, lp: T) -> Vec<T> {
        let range = lp - fp;
        match n {
            0 => vec![],
            1 => vec![fp + range / T::from_f64(2.0).unwrap()],
            2 => vec![fp, lp],
            _ => (0..n)
                .map(|i| {
                    fp + range * T::from_usize(i).unwrap() / T::from_usize(n - 1).unwrap()
                })
                .collect(),
        }
    }

    /// Distribute `n` u parameters; when the face closes in u and the
    /// trimmed range spans the full period, the duplicated seam sample
    /// is dropped.
    pub fn set_number_u(&mut self, n: usize) {
        let (fp, lp, _, _) = self.face.parameter_range();
        let (su0, su1, _, _) = self.face.surface().bounds();
        let period = su1 - su0;
        let tol = T::from_f64(TOL).unwrap();
        let closed =
            self.face.is_u_closed(tol) && ((lp - fp) - period).abs() < tol;
        self.params_u = if closed {
            let mut params = Self::param_list(n + 1, fp, lp);
            params.pop();
            params
        } else {
            Self::param_list(n, fp, lp)
        };
    }

    /// Distribute `n` v parameters with the same seam handling as u
    pub fn set_number_v(&mut self, n: usize) {
        let (_, _, fp, lp) = self.face.parameter_range();
        let (_, _, sv0, sv1) = self.face.surface().bounds();
        let period = sv1 - sv0;
        let tol = T::from_f64(TOL).unwrap();
        let closed =
            self.face.is_v_closed(tol) && ((lp - fp) - period).abs() < tol;
        self.params_v = if closed {
            let mut params = Self::param_list(n + 1, fp, lp);
            params.pop();
            params
        } else {
            Self::param_list(n, fp, lp)
        };
    }

    pub fn params_u(&self) -> &[T] {
        &self.params_u
    }

    pub fn params_v(&self) -> &[T] {
        &self.params_v
    }

    /// Extract all iso edges; positions without a bounded segment are skipped
    pub fn try_shapes(&self) -> Result<Vec<Edge<T>>> {
        let mut edges = vec![];
        for u in &self.params_u {
            if let Some(e) =
                IsoCurve::new(self.face.clone(), IsoDirection::U, *u).try_shape()?
            {
                edges.push(e);
            }
        }
        for v in &self.params_v {
            if let Some(e) =
                IsoCurve::new(self.face.clone(), IsoDirection::V, *v).try_shape()?
            {
                edges.push(e);
            }
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Point4};

    use super::*;
    use crate::surface::NurbsSurface3D;
    use crate::topology::Face;

    fn flat_face() -> Face<f64> {
        let surface = NurbsSurface3D::new(
            1,
            1,
            vec![0., 0., 2., 2.],
            vec![0., 0., 1., 1.],
            vec![
                vec![Point4::new(0., 0., 0., 1.), Point4::new(0., 1., 0., 1.)],
                vec![Point4::new(2., 0., 0., 1.), Point4::new(2., 1., 0., 1.)],
            ],
        );
        Face::from_surface(surface).unwrap()
    }

    #[test]
    fn iso_curve_spans_the_face() {
        let face = flat_face();
        let iso = IsoCurve::new(face, IsoDirection::U, 1.0);
        let edge = iso.try_shape().unwrap().unwrap();
        let a = edge.point_at(edge.first_parameter());
        let b = edge.point_at(edge.last_parameter());
        assert_relative_eq!(a, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(b, Point3::new(1.0, 1.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn multi_iso_counts() {
        let face = flat_face();
        let multi = MultiIso::new(face, 3, 2);
        assert_eq!(multi.params_u().len(), 3);
        assert_eq!(multi.params_v().len(), 2);
        let edges = multi.try_shapes().unwrap();
        assert_eq!(edges.len(), 5);
    }

    #[test]
    fn closed_direction_drops_seam_duplicate() {
        // a tube: circle profile extruded along z, closed in v
        let w = std::f64::consts::FRAC_1_SQRT_2;
        let circle = crate::curve::NurbsCurve3D::<f64>::try_new(
            2,
            vec![
                Point4::new(1.0, 0.0, 0.0, 1.0),
                Point4::new(w, w, 0.0, w),
                Point4::new(0.0, 1.0, 0.0, 1.0),
                Point4::new(-w, w, 0.0, w),
                Point4::new(-1.0, 0.0, 0.0, 1.0),
                Point4::new(-w, -w, 0.0, w),
                Point4::new(0.0, -1.0, 0.0, 1.0),
                Point4::new(w, -w, 0.0, w),
                Point4::new(1.0, 0.0, 0.0, 1.0),
            ],
            vec![
                0., 0., 0., 0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 1., 1., 1.,
            ],
        )
        .unwrap();
        let tube = NurbsSurface3D::extrude(&circle, &nalgebra::Vector3::new(0.0, 0.0, 3.0));
        let face = Face::from_surface(tube).unwrap();
        assert!(face.is_v_closed(1e-9));

        let mut multi = MultiIso::new(face, 0, 0);
        multi.set_number_v(4);
        // four distinct iso curves, none duplicated on the seam
        assert_eq!(multi.params_v().len(), 4);
        let (_, _, v0, v1) = multi.face.parameter_range();
        assert!(multi
            .params_v()
            .iter()
            .all(|p| *p < v1 - 1e-9 || (*p - v0).abs() < 1e-9));
    }
}
