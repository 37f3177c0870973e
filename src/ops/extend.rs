use nalgebra::Point3;

use crate::curve::NurbsCurve3D;
use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;

/// Which curve end to extend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendEnd {
    Start,
    End,
    Both,
}

/// Geometric continuity of the extension tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendContinuity {
    /// straight tangent tail
    G1,
    /// curvature-matching tail on the osculating circle
    G2,
}

/// Output arrangement of the extension feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutput {
    /// fuse the tails with the input into a single curve
    SingleEdge,
    /// keep the input and its tails as separate curves
    Wire,
}

#[derive(Debug, Clone)]
pub struct ExtendOptions<T> {
    pub length: T,
    pub end: ExtendEnd,
    pub continuity: ExtendContinuity,
    pub output: ExtendOutput,
}

/// Build the extension tail of `curve` at one end.
///
/// With [`ExtendContinuity::G1`] the tail is a straight segment of the
/// requested length along the endpoint tangent. With
/// [`ExtendContinuity::G2`] a three-pole Bezier matches the osculating
/// circle at the endpoint and is trimmed back to the requested arc length.
/// A non-positive length returns the input unchanged; curvature failures
/// fall back to the straight tail.
pub fn extend_curve<T: FloatingPoint>(
    curve: &NurbsCurve3D<T>,
    end: ExtendEnd,
    length: T,
    continuity: ExtendContinuity,
) -> Result<NurbsCurve3D<T>> {
    if length <= T::zero() {
        return Ok(curve.clone());
    }
    let at_start = match end {
        ExtendEnd::Start => true,
        ExtendEnd::End => false,
        ExtendEnd::Both => {
            return Err(Error::InvalidInput(
                "extend one end at a time; use extend() for both".to_string(),
            ))
        }
    };

    let (first, last) = curve.knots_domain();
    let p = if at_start { first } else { last };

    let val = curve.point_at(p);
    let tangent = curve.tangent_at(p);
    let norm = tangent.norm();
    if norm <= T::default_epsilon() {
        return Err(Error::GeometricDegeneracy(
            "zero-length tangent at the extension end".to_string(),
        ));
    }
    let dir = if at_start {
        -tangent / norm
    } else {
        tangent / norm
    };
    let tan = dir * length;

    if continuity == ExtendContinuity::G1 {
        return Ok(straight_tail(&val, &tan));
    }

    // G2: curvature and principal normal; straight spans fall back to G1
    let curvature = match curve.curvature_at(p) {
        Ok(c) if c.abs() > T::from_f64(1e-9).unwrap() => c,
        _ => return Ok(straight_tail(&val, &tan)),
    };
    let normal = match curve.principal_normal_at(p) {
        Ok(n) => n,
        Err(_) => return Ok(straight_tail(&val, &tan)),
    };

    // height of the third pole over the tangent line so the quadratic
    // Bezier reproduces the endpoint curvature
    let two = T::from_f64(2.0).unwrap();
    let height = two * curvature * length * length;
    let opp = (length * length - height * height).abs().sqrt();

    let p1 = &val + &tan;
    let p2 = &val + dir * (length + opp) + normal * height;

    let bezier = NurbsCurve3D::try_new(
        2,
        vec![
            crate::curve::nurbs_curve::homogenize(&val, T::one()),
            crate::curve::nurbs_curve::homogenize(&p1, T::one()),
            crate::curve::nurbs_curve::homogenize(&p2, T::one()),
        ],
        vec![
            T::zero(),
            T::zero(),
            T::zero(),
            T::one(),
            T::one(),
            T::one(),
        ],
    )?;

    // cut the tail back to the requested arc length
    let t = bezier.try_parameter_at_length(length, T::from_f64(1e-9).unwrap())?;
    let (start, _) = bezier.knots_domain();
    if t <= start + T::from_f64(1e-12).unwrap() {
        return Ok(straight_tail(&val, &tan));
    }
    bezier.try_segment(start, t)
}

fn straight_tail<T: FloatingPoint>(
    val: &Point3<T>,
    tan: &nalgebra::Vector3<T>,
) -> NurbsCurve3D<T> {
    NurbsCurve3D::polyline(&[*val, val + tan])
}

/// Extend a curve according to the option block.
/// Returns the resulting curves: a single fused curve for
/// [`ExtendOutput::SingleEdge`], otherwise the input with its tails.
pub fn extend<T: FloatingPoint>(
    curve: &NurbsCurve3D<T>,
    options: &ExtendOptions<T>,
) -> Result<Vec<NurbsCurve3D<T>>> {
    if options.length <= T::zero() {
        return Ok(vec![curve.clone()]);
    }

    let mut parts: Vec<NurbsCurve3D<T>> = vec![];
    if matches!(options.end, ExtendEnd::Start | ExtendEnd::Both) {
        let mut tail = extend_curve(curve, ExtendEnd::Start, options.length, options.continuity)?;
        // orient the tail so chains run start -> end
        crate::misc::Invertible::invert(&mut tail);
        parts.push(tail);
    }
    parts.push(curve.clone());
    if matches!(options.end, ExtendEnd::End | ExtendEnd::Both) {
        parts.push(extend_curve(
            curve,
            ExtendEnd::End,
            options.length,
            options.continuity,
        )?);
    }

    match options.output {
        ExtendOutput::Wire => Ok(parts),
        ExtendOutput::SingleEdge => {
            let join_options = super::join::JoinOptions {
                tolerance: T::from_f64(1e-7).unwrap(),
                corner_break: false,
                force_contact: true,
                ..super::join::JoinOptions::default()
            };
            super::join::join(&parts, &join_options)
        }
    }
}

/// Extend the curve toward `point`: build the tail in its direction and
/// elevate the Bezier once, appending `point` as the final pole.
pub fn extend_to_point<T: FloatingPoint>(
    curve: &NurbsCurve3D<T>,
    point: &Point3<T>,
    end: ExtendEnd,
    continuity: ExtendContinuity,
) -> Result<NurbsCurve3D<T>> {
    let at_start = match end {
        ExtendEnd::Start => true,
        ExtendEnd::End => false,
        ExtendEnd::Both => {
            return Err(Error::InvalidInput(
                "extend_to_point targets a single end".to_string(),
            ))
        }
    };
    let (first, last) = curve.knots_domain();
    let anchor = curve.point_at(if at_start { first } else { last });
    let length = (point - anchor).norm();
    if length <= T::default_epsilon() {
        return Err(Error::InvalidInput(
            "target point coincides with the curve end".to_string(),
        ));
    }

    let tail = extend_curve(curve, end, length, continuity)?;

    // single Bezier degree elevation, appending the target as last pole
    let poles = tail.dehomogenized_control_points();
    let degree = tail.degree();
    let n1 = T::from_usize(degree + 1).unwrap();
    let mut elevated = vec![poles[0]];
    for i in 1..=degree {
        let f = T::from_usize(i).unwrap() / n1;
        elevated.push(Point3::from(
            poles[i - 1].coords * f + poles[i].coords * (T::one() - f),
        ));
    }
    elevated.push(*point);

    let mut knots = vec![T::zero(); degree + 2];
    knots.extend(vec![T::one(); degree + 2]);
    NurbsCurve3D::try_new(
        degree + 1,
        elevated
            .iter()
            .map(|p| crate::curve::nurbs_curve::homogenize(p, T::one()))
            .collect(),
        knots,
    )
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    use super::*;
    use crate::curve::{NurbsCurve2D, NurbsCurve3D};

    /// Quarter of the unit circle, from (1,0,0) to (0,1,0)
    fn quarter_arc() -> NurbsCurve3D<f64> {
        let w = std::f64::consts::FRAC_1_SQRT_2;
        NurbsCurve2D::try_new(
            2,
            vec![
                Point3::new(1.0, 0.0, 1.0),
                Point3::new(w, w, w),
                Point3::new(0.0, 1.0, 1.0),
            ],
            vec![0., 0., 0., 1., 1., 1.],
        )
        .unwrap()
        .elevate_dimension()
    }

    #[test]
    fn straight_extension_follows_the_tangent() {
        let line = NurbsCurve3D::<f64>::polyline(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ]);
        let tail = extend_curve(&line, ExtendEnd::End, 1.5, ExtendContinuity::G1).unwrap();
        assert_relative_eq!(tail.first_point(), Point3::new(2.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(tail.last_point(), Point3::new(3.5, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn g2_extension_matches_curvature_and_length() {
        let arc = quarter_arc();
        let length = std::f64::consts::FRAC_PI_4;
        let tail = extend_curve(&arc, ExtendEnd::End, length, ExtendContinuity::G2).unwrap();

        // tail starts at the arc end with the same tangent
        assert_relative_eq!(tail.first_point(), Point3::new(0.0, 1.0, 0.0), epsilon = 1e-9);
        let (t0, _) = tail.knots_domain();
        let tan = tail.tangent_at(t0).normalize();
        assert_relative_eq!(tan, nalgebra::Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-9);

        // endpoint curvature of the tail matches the circle
        let kappa = tail.curvature_at(t0).unwrap();
        assert_relative_eq!(kappa, 1.0, epsilon = 1e-6);

        // arc length of the tail is the requested length
        let len = tail.try_length().unwrap();
        assert_relative_eq!(len, length, epsilon = 1e-6);

        // the tail endpoint stays close to the circle point at 3pi/4
        let target = Point3::new(
            (3.0 * std::f64::consts::FRAC_PI_4).cos(),
            (3.0 * std::f64::consts::FRAC_PI_4).sin(),
            0.0,
        );
        let end = tail.last_point();
        assert!((end - target).norm() < 1e-1);
    }

    #[test]
    fn zero_length_returns_input() {
        let arc = quarter_arc();
        let same = extend_curve(&arc, ExtendEnd::End, 0.0, ExtendContinuity::G2).unwrap();
        assert_eq!(same.pole_count(), arc.pole_count());
    }

    #[test]
    fn both_ends_make_a_three_curve_wire() {
        let line = NurbsCurve3D::<f64>::polyline(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ]);
        let options = ExtendOptions {
            length: 0.5,
            end: ExtendEnd::Both,
            continuity: ExtendContinuity::G1,
            output: ExtendOutput::Wire,
        };
        let parts = extend(&line, &options).unwrap();
        assert_eq!(parts.len(), 3);
        assert_relative_eq!(
            parts[0].first_point(),
            Point3::new(-0.5, 0.0, 0.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            parts[2].last_point(),
            Point3::new(1.5, 0.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn single_edge_output_is_fused() {
        let line = NurbsCurve3D::<f64>::polyline(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ]);
        let options = ExtendOptions {
            length: 0.5,
            end: ExtendEnd::Both,
            continuity: ExtendContinuity::G1,
            output: ExtendOutput::SingleEdge,
        };
        let fused = extend(&line, &options).unwrap();
        assert_eq!(fused.len(), 1);
        assert_relative_eq!(
            fused[0].first_point(),
            Point3::new(-0.5, 0.0, 0.0),
            epsilon = 1e-9
        );
        assert_relative_eq!(
            fused[0].last_point(),
            Point3::new(1.5, 0.0, 0.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn extend_to_point_ends_at_the_target() {
        let line = NurbsCurve3D::<f64>::polyline(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ]);
        let target = Point3::new(2.0, 0.5, 0.0);
        let tail = extend_to_point(&line, &target, ExtendEnd::End, ExtendContinuity::G1).unwrap();
        assert_relative_eq!(tail.last_point(), target, epsilon = 1e-9);
        assert_relative_eq!(
            tail.first_point(),
            Point3::new(1.0, 0.0, 0.0),
            epsilon = 1e-9
        );
    }
}
