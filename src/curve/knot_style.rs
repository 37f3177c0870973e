use nalgebra::{allocator::Allocator, DefaultAllocator, DimName, OPoint};

use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;

use super::NurbsCurve;

/// Parameterization style for point interpolation.
/// The exponent applied to chord lengths interpolates between uniform (0),
/// centripetal (0.5) and chord-length (1) spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KnotStyle<T> {
    Uniform,
    Centripetal,
    ChordLength,
    Factor(T),
}

impl<T: FloatingPoint> KnotStyle<T> {
    pub fn factor(&self) -> T {
        match self {
            KnotStyle::Uniform => T::zero(),
            KnotStyle::Centripetal => T::from_f64(0.5).unwrap(),
            KnotStyle::ChordLength => T::one(),
            KnotStyle::Factor(a) => *a,
        }
    }

    /// Cumulative parameters for a point sequence.
    /// For a closed sequence one extra parameter is produced for the
    /// wrap-around chord back to the first point.
    ///
    /// # Example
    /// ```
    /// use raccordo::prelude::KnotStyle;
    /// use nalgebra::Point3;
    /// let pts = vec![
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(3.0, 0.0, 0.0),
    ///     Point3::new(3.0, 4.0, 0.0),
    ///     Point3::new(3.0, 4.0, 12.0),
    /// ];
    /// let params = KnotStyle::ChordLength.parameterize(&pts, false);
    /// assert_eq!(params, vec![0.0, 3.0, 7.0, 19.0]);
    /// ```
    pub fn parameterize<D: DimName>(&self, points: &[OPoint<T, D>], closed: bool) -> Vec<T>
    where
        DefaultAllocator: Allocator<D>,
    {
        let a = self.factor();
        let pts = if closed {
            periodic_extend(points, 0)
        } else {
            points.to_vec()
        };
        let mut params = vec![T::zero()];
        for i in 1..pts.len() {
            let chord = (&pts[i] - &pts[i - 1]).norm();
            let increment = if a == T::one() {
                chord
            } else if a == T::zero() {
                T::one()
            } else {
                chord.powf(a)
            };
            let last = params[params.len() - 1];
            params.push(last + increment);
        }
        params
    }
}

/// Extend a point sequence with `degree + 1` wrap-around points copied from
/// the front, so downstream interpolation can close the loop seamlessly.
pub fn periodic_extend<T: FloatingPoint, D: DimName>(
    points: &[OPoint<T, D>],
    degree: usize,
) -> Vec<OPoint<T, D>>
where
    DefaultAllocator: Allocator<D>,
{
    let mut extended = points.to_vec();
    for i in 0..=degree {
        extended.push(points[i % points.len()].clone());
    }
    extended
}

/// Parameters taken from the projection of each point onto an axis curve.
/// Fails with [`Error::NonMonotonic`] as soon as a projected parameter does
/// not strictly increase.
pub fn parameters_along_curve<T: FloatingPoint, D: DimName>(
    points: &[OPoint<T, D>],
    axis: &NurbsCurve<T, nalgebra::DimNameSum<D, nalgebra::U1>>,
) -> Result<Vec<T>>
where
    D: DimName,
    nalgebra::DimNameSum<D, nalgebra::U1>: DimName + nalgebra::DimNameSub<nalgebra::U1, Output = D>,
    D: nalgebra::DimNameAdd<nalgebra::U1>,
    DefaultAllocator: Allocator<D>,
    DefaultAllocator: Allocator<nalgebra::DimNameSum<D, nalgebra::U1>>,
{
    let eps = T::from_f64(1e-10).unwrap();
    let mut params: Vec<T> = vec![];
    for p in points {
        let par = axis.find_closest_parameter(p)?;
        if let Some(last) = params.last() {
            if par <= *last + eps {
                return Err(Error::NonMonotonic);
            }
        }
        params.push(par);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use nalgebra::Point3;

    use super::*;
    use crate::curve::NurbsCurve3D;

    #[test]
    fn factor_extremes() {
        let pts = vec![
            Point3::new(0.0_f64, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(3.0, 4.0, 0.0),
            Point3::new(3.0, 4.0, 12.0),
        ];
        let uniform = KnotStyle::Uniform.parameterize(&pts, false);
        assert_eq!(uniform, vec![0.0, 1.0, 2.0, 3.0]);

        let chord = KnotStyle::ChordLength.parameterize(&pts, false);
        assert_eq!(chord, vec![0.0, 3.0, 7.0, 19.0]);
    }

    #[test]
    fn closed_appends_wrap_chord() {
        let pts = vec![
            Point3::new(0.0_f64, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let params = KnotStyle::ChordLength.parameterize(&pts, true);
        assert_eq!(params.len(), 5);
        assert_eq!(params[4], 4.0);
    }

    #[test]
    fn axis_parameters_reject_backtracking() {
        let axis = NurbsCurve3D::<f64>::polyline(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
        ]);
        let forward = vec![
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(4.0, -1.0, 0.0),
            Point3::new(8.0, 0.5, 0.0),
        ];
        let params = parameters_along_curve(&forward, &axis).unwrap();
        assert!(params.windows(2).all(|w| w[0] < w[1]));

        let backtracking = vec![
            Point3::new(4.0, 1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
        ];
        assert!(matches!(
            parameters_along_curve(&backtracking, &axis),
            Err(crate::errors::Error::NonMonotonic)
        ));
    }
}
