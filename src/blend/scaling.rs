use nalgebra::Point2;

use crate::curve::NurbsCurve2D;
use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;

/// Scale profile of a blend: `(parameter, scale1, scale2)` samples fitted
/// with a linear or quadratic curve per side.
#[derive(Debug, Clone)]
pub struct ScalingCurve<T: FloatingPoint> {
    entries: Vec<(T, T, T)>,
    quadratic: bool,
}

impl<T: FloatingPoint> ScalingCurve<T> {
    /// Entries are sorted by parameter; duplicated parameters are rejected.
    pub fn try_new(mut entries: Vec<(T, T, T)>, quadratic: bool) -> Result<Self> {
        if entries.len() < 2 {
            return Err(Error::InvalidInput(
                "at least two scale entries are required".to_string(),
            ));
        }
        entries.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        if entries
            .windows(2)
            .any(|w| (w[1].0 - w[0].0) <= T::default_epsilon())
        {
            return Err(Error::NonMonotonic);
        }
        Ok(Self { entries, quadratic })
    }

    pub fn domain(&self) -> (T, T) {
        (self.entries[0].0, self.entries[self.entries.len() - 1].0)
    }

    fn side_curve(&self, pick_first: bool) -> Result<NurbsCurve2D<T>> {
        let points: Vec<Point2<T>> = self
            .entries
            .iter()
            .map(|(t, s1, s2)| Point2::new(*t, if pick_first { *s1 } else { *s2 }))
            .collect();
        let params: Vec<T> = self.entries.iter().map(|(t, _, _)| *t).collect();
        let degree = if self.quadratic { 2 } else { 1 }.min(points.len() - 1);
        let mut curve = NurbsCurve2D::try_interpolate_with_parameters(&points, degree, &params)?;
        let (a, b) = self.domain();
        curve.knots_mut().remap(a, b);
        Ok(curve)
    }

    /// Evaluate both scales at `t`, clamped to the entry range
    pub fn scales_at(&self, t: T) -> Result<(T, T)> {
        let (a, b) = self.domain();
        let t = t.clamp(a, b);
        let s1 = self.side_curve(true)?.point_at(t).y;
        let s2 = self.side_curve(false)?.point_at(t).y;
        Ok((s1, s2))
    }

    /// Evaluate both scales at a list of parameters
    pub fn sample(&self, params: &[T]) -> Result<Vec<(T, T)>> {
        let (a, b) = self.domain();
        let first = self.side_curve(true)?;
        let second = self.side_curve(false)?;
        params
            .iter()
            .map(|t| {
                let t = t.clamp(a, b);
                Ok((first.point_at(t).y, second.point_at(t).y))
            })
            .collect()
    }
}
