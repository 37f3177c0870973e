pub mod curve;

use nalgebra::{Point3, Vector3};

use crate::curve::{KnotStyle, NurbsCurve3D};
use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;

/// Configurable point interpolation.
///
/// Wraps the low-level solvers with the option set of the interpolation
/// feature: parameterization style or explicit parameters, per-point
/// tangent constraints, the linear-segment directive and periodic closure.
#[derive(Debug, Clone)]
pub struct Interpolator<T: FloatingPoint> {
    pub tolerance: T,
    pub periodic: bool,
    pub knot_style: KnotStyle<T>,
    /// Explicit parameters overriding the style
    pub parameters: Option<Vec<T>>,
    /// Optional tangent per point with an activation flag
    pub tangents: Option<Vec<Vector3<T>>>,
    pub tangent_flags: Option<Vec<bool>>,
    /// One flag per segment; a flagged segment keeps both of its endpoint
    /// tangents on the chord so the parameterization cannot bend it.
    pub linear_segments: Option<Vec<bool>>,
}

impl<T: FloatingPoint> Default for Interpolator<T> {
    fn default() -> Self {
        Self {
            tolerance: T::from_f64(1e-7).unwrap(),
            periodic: false,
            knot_style: KnotStyle::ChordLength,
            parameters: None,
            tangents: None,
            tangent_flags: None,
            linear_segments: None,
        }
    }
}

impl<T: FloatingPoint> Interpolator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interpolate(&self, points: &[Point3<T>], degree: usize) -> Result<NurbsCurve3D<T>> {
        if points.len() < 2 {
            return Err(Error::InvalidInput(
                "at least two points are required".to_string(),
            ));
        }

        if self.periodic {
            return NurbsCurve3D::try_periodic_interpolate(points, degree, self.knot_style);
        }

        let params = match &self.parameters {
            Some(p) => p.clone(),
            None => self.knot_style.parameterize(points, false),
        };

        let mut tangents = match &self.tangents {
            Some(t) => t.clone(),
            None => vec![Vector3::zeros(); points.len()],
        };
        let mut flags = match &self.tangent_flags {
            Some(f) => f.clone(),
            None => vec![false; points.len()],
        };
        if tangents.len() != points.len() || flags.len() != points.len() {
            return Err(Error::InvalidInput(
                "tangent data does not match point count".to_string(),
            ));
        }

        if let Some(linear) = &self.linear_segments {
            if linear.len() != points.len() - 1 {
                return Err(Error::InvalidInput(
                    "one linear flag per segment is required".to_string(),
                ));
            }
            for (i, flagged) in linear.iter().enumerate() {
                if !flagged {
                    continue;
                }
                let span = params[i + 1] - params[i];
                if span <= T::default_epsilon() {
                    return Err(Error::InvalidInput(
                        "degenerate segment in linear directive".to_string(),
                    ));
                }
                let chord = (points[i + 1] - points[i]) / span;
                tangents[i] = chord;
                tangents[i + 1] = chord;
                flags[i] = true;
                flags[i + 1] = true;
            }
        }

        let any_constraint = flags.iter().any(|f| *f);
        if any_constraint {
            NurbsCurve3D::try_interpolate_with_tangents(
                points,
                degree,
                Some(params.as_slice()),
                Some((tangents.as_slice(), flags.as_slice())),
            )
        } else {
            NurbsCurve3D::try_interpolate_with_parameters(points, degree, &params)
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    use super::*;

    fn sample_points() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(4.0, 0.5, 0.0),
            Point3::new(6.0, 2.0, 0.0),
            Point3::new(8.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn open_interpolation_passes_through_points() {
        let points = sample_points();
        let interp = Interpolator::<f64>::new();
        let curve = interp.interpolate(&points, 3).unwrap();

        let params = interp.knot_style.parameterize(&points, false);
        let total = params[params.len() - 1];
        for (p, t) in points.iter().zip(params.iter()) {
            let on_curve = curve.point_at(t / total);
            assert_relative_eq!(on_curve, *p, epsilon = 1e-8);
        }
    }

    #[test]
    fn periodic_interpolation_closes_with_matching_tangents() {
        let points = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
        ];
        let interp = Interpolator {
            periodic: true,
            knot_style: KnotStyle::Centripetal,
            ..Interpolator::default()
        };
        let curve = interp.interpolate(&points, 3).unwrap();
        let (start, end) = curve.knots_domain();
        assert_relative_eq!(curve.point_at(start), curve.point_at(end), epsilon = 1e-9);

        let t0 = curve.tangent_at(start).normalize();
        let t1 = curve.tangent_at(end).normalize();
        assert_relative_eq!(t0, t1, epsilon = 1e-7);
    }

    #[test]
    fn periodic_input_with_duplicate_closing_point() {
        let mut points = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.5, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, -1.5, 0.0),
        ];
        points.push(points[0]);
        let interp = Interpolator {
            periodic: true,
            ..Interpolator::default()
        };
        let curve = interp.interpolate(&points, 3).unwrap();
        let (start, end) = curve.knots_domain();
        assert_relative_eq!(curve.point_at(start), points[0], epsilon = 1e-9);
        assert_relative_eq!(curve.point_at(end), points[0], epsilon = 1e-9);
    }

    #[test]
    fn linear_segment_stays_on_chord() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
            Point3::new(3.0, 2.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(6.0, 1.0, 0.0),
        ];
        let interp = Interpolator {
            linear_segments: Some(vec![false, true, false, false]),
            ..Interpolator::default()
        };
        let curve = interp.interpolate(&points, 3).unwrap();

        let params = interp.knot_style.parameterize(&points, false);
        let total = params[params.len() - 1];
        let (t1, t2) = (params[1] / total, params[2] / total);
        // probe the flagged span: samples stay close to the chord,
        // and the endpoint tangents are exactly on it
        for i in 1..10 {
            let t = t1 + (t2 - t1) * (i as f64) / 10.0;
            let p = curve.point_at(t);
            assert_relative_eq!(p.y, 2.0, epsilon = 2e-2);
        }
        let tan1 = curve.tangent_at(t1).normalize();
        let tan2 = curve.tangent_at(t2).normalize();
        assert_relative_eq!(tan1.y, 0.0, epsilon = 1e-8);
        assert_relative_eq!(tan2.y, 0.0, epsilon = 1e-8);
    }
}
