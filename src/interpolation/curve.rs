use itertools::Itertools;
use nalgebra::{
    allocator::Allocator, DMatrix, DVector, DefaultAllocator, DimName, DimNameDiff, DimNameSub,
    OPoint, OVector, U1,
};

use crate::curve::{KnotStyle, NurbsCurve};
use crate::errors::{Error, Result};
use crate::knot::KnotVector;
use crate::misc::FloatingPoint;

impl<T: FloatingPoint, D: DimName> NurbsCurve<T, D>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    /// Try to create a clamped curve interpolating a set of points
    /// with chord-length parameters.
    /// # Example
    /// ```
    /// use raccordo::prelude::*;
    /// use nalgebra::Point3;
    /// use approx::assert_relative_eq;
    ///
    /// let points: Vec<Point3<f64>> = vec![
    ///     Point3::new(-1.0, -1.0, 0.),
    ///     Point3::new(1.0, -1.0, 0.),
    ///     Point3::new(1.0, 1.0, 0.),
    ///     Point3::new(-1.0, 1.0, 0.),
    ///     Point3::new(-1.0, 2.0, 0.),
    ///     Point3::new(1.0, 2.5, 0.),
    /// ];
    /// let curve = NurbsCurve3D::try_interpolate(&points, 3).unwrap();
    /// let (start, end) = curve.knots_domain();
    /// assert_relative_eq!(curve.point_at(start), points[0]);
    /// assert_relative_eq!(curve.point_at(end), points[points.len() - 1]);
    /// ```
    pub fn try_interpolate(
        points: &[OPoint<T, DimNameDiff<D, U1>>],
        degree: usize,
    ) -> Result<Self> {
        let params = KnotStyle::ChordLength.parameterize(points, false);
        Self::try_interpolate_with_parameters(points, degree, &params)
    }

    /// Interpolate with an explicit parameter sequence.
    pub fn try_interpolate_with_parameters(
        points: &[OPoint<T, DimNameDiff<D, U1>>],
        degree: usize,
        parameters: &[T],
    ) -> Result<Self> {
        Self::try_interpolate_with_tangents(points, degree, Some(parameters), None)
    }

    /// Global interpolation with optional per-point tangent constraints.
    /// `tangents` holds one vector per point together with an activation
    /// flag; only flagged tangents become derivative constraints.
    #[allow(clippy::type_complexity)]
    pub fn try_interpolate_with_tangents(
        points: &[OPoint<T, DimNameDiff<D, U1>>],
        degree: usize,
        parameters: Option<&[T]>,
        tangents: Option<(&[OVector<T, DimNameDiff<D, U1>>], &[bool])>,
    ) -> Result<Self> {
        let n = points.len();
        if n < degree + 1 {
            return Err(Error::InvalidInput(
                "too few points for interpolation".to_string(),
            ));
        }

        let us: Vec<T> = match parameters {
            Some(p) => {
                if p.len() != n {
                    return Err(Error::InvalidInput(
                        "parameter count does not match point count".to_string(),
                    ));
                }
                for w in p.windows(2) {
                    if w[1] <= w[0] {
                        return Err(Error::NonMonotonic);
                    }
                }
                p.to_vec()
            }
            None => KnotStyle::ChordLength.parameterize(points, false),
        };

        // normalize parameters into [0, 1]
        let min = us[0];
        let max = us[us.len() - 1];
        let range = max - min;
        let us: Vec<T> = us.iter().map(|u| (*u - min) / range).collect();

        if let Some((vectors, flags)) = tangents {
            if vectors.len() != n || flags.len() != n {
                return Err(Error::InvalidInput(
                    "tangent count does not match point count".to_string(),
                ));
            }
            // tangent derivatives are taken against the normalized parameters
            let scaled: Vec<_> = vectors.iter().map(|t| t * range).collect();
            Self::try_interpolate_constrained(points, degree, &us, &scaled, flags)
        } else {
            Self::try_interpolate_unconstrained(points, degree, &us)
        }
    }

    fn try_interpolate_unconstrained(
        points: &[OPoint<T, DimNameDiff<D, U1>>],
        degree: usize,
        us: &[T],
    ) -> Result<Self> {
        let mut knots_start = vec![T::zero(); degree + 1];

        let start = 1;
        let end = us.len() - degree;
        for i in start..end {
            let mut weight_sums = T::zero();
            for j in 0..degree {
                weight_sums += us[i + j];
            }
            knots_start.push(weight_sums / T::from_usize(degree).unwrap());
        }

        let knots = KnotVector::new([knots_start, vec![T::one(); degree + 1]].concat());
        let plen = points.len();

        let n = plen - 1;
        let ld = plen - (degree + 1);

        // build the basis coefficient matrix
        let mut m_a = DMatrix::<T>::zeros(us.len(), degree + 1 + ld);
        for (i, u) in us.iter().enumerate() {
            let knot_span_index = knots.find_knot_span_index(n, degree, *u);
            let basis = knots.basis_functions(knot_span_index, *u, degree);

            let ls = knot_span_index - degree;
            let row_start = vec![T::zero(); ls];
            let row_end = vec![T::zero(); ld - ls];
            let e = [row_start, basis, row_end].concat();
            for (j, v) in e.iter().enumerate() {
                m_a[(i, j)] = *v;
            }
        }

        let control_points = try_solve_interpolation::<T, D>(m_a, points, None)?;

        Ok(Self::new_unchecked(degree, control_points, knots))
    }

    /// Interpolation with flagged derivative rows inserted after their
    /// anchoring point rows. The knot vector averages over the parameter
    /// multiset in which every flagged parameter appears twice.
    fn try_interpolate_constrained(
        points: &[OPoint<T, DimNameDiff<D, U1>>],
        degree: usize,
        us: &[T],
        tangents: &[OVector<T, DimNameDiff<D, U1>>],
        flags: &[bool],
    ) -> Result<Self> {
        let n = points.len();
        let constrained = flags.iter().filter(|f| **f).count();
        if constrained == 0 {
            return Self::try_interpolate_unconstrained(points, degree, us);
        }

        // expanded parameter multiset
        let mut expanded = vec![];
        for (i, u) in us.iter().enumerate() {
            expanded.push(*u);
            if flags[i] {
                expanded.push(*u);
            }
        }
        let unknowns = expanded.len();
        if unknowns < degree + 1 {
            return Err(Error::InvalidInput(
                "too few constraints for the requested degree".to_string(),
            ));
        }

        let mut knots_start = vec![T::zero(); degree + 1];
        for i in 1..(unknowns - degree) {
            let mut sum = T::zero();
            for j in 0..degree {
                sum += expanded[i + j];
            }
            knots_start.push(sum / T::from_usize(degree).unwrap());
        }
        let knots = KnotVector::new([knots_start, vec![T::one(); degree + 1]].concat());

        let span_n = unknowns - 1;
        let mut m_a = DMatrix::<T>::zeros(unknowns, unknowns);
        let mut rhs_rows: Vec<RhsRow<T, D>> = vec![];

        let mut row = 0;
        for i in 0..n {
            let u = us[i];
            let span = knots.find_knot_span_index(span_n, degree, u);
            let basis = knots.basis_functions(span, u, degree);
            for (k, v) in basis.iter().enumerate() {
                m_a[(row, span - degree + k)] = *v;
            }
            rhs_rows.push(RhsRow::Point(points[i].clone()));
            row += 1;

            if flags[i] {
                let ders = knots.derivative_basis_functions(span, u, degree, 1);
                for (k, v) in ders[1].iter().enumerate() {
                    m_a[(row, span - degree + k)] = *v;
                }
                rhs_rows.push(RhsRow::Tangent(tangents[i].clone()));
                row += 1;
            }
        }

        let control_points =
            try_solve_interpolation::<T, D>(m_a, points, Some(rhs_rows.as_slice()))?;
        Ok(Self::new_unchecked(degree, control_points, knots))
    }

    /// Try to create a periodic curve interpolating a set of points.
    /// A duplicated closing point is detected within `1e-7` and dropped
    /// before solving.
    /// # Example
    /// ```
    /// use raccordo::prelude::*;
    /// use nalgebra::Point3;
    /// use approx::assert_relative_eq;
    ///
    /// let points: Vec<Point3<f64>> = vec![
    ///     Point3::new(-1.0, -1.0, 0.),
    ///     Point3::new(1.0, -1.0, 0.),
    ///     Point3::new(1.0, 1.0, 0.),
    ///     Point3::new(-1.0, 1.0, 0.),
    /// ];
    /// let closed = NurbsCurve3D::try_periodic_interpolate(&points, 3, KnotStyle::Centripetal).unwrap();
    /// let (start, end) = closed.knots_domain();
    /// assert_relative_eq!(closed.point_at(start), points[0], epsilon = 1e-10);
    /// assert_relative_eq!(closed.point_at(end), points[0], epsilon = 1e-10);
    /// ```
    pub fn try_periodic_interpolate(
        points: &[OPoint<T, DimNameDiff<D, U1>>],
        degree: usize,
        knot_style: KnotStyle<T>,
    ) -> Result<Self> {
        let tol = T::from_f64(1e-7).unwrap();
        let points = if points.len() > 1
            && (&points[points.len() - 1] - &points[0]).norm() < tol
        {
            &points[..points.len() - 1]
        } else {
            points
        };

        let n = points.len();
        if n < degree + 1 {
            return Err(Error::InvalidInput(
                "too few points for periodic interpolation".to_string(),
            ));
        }

        // chord increments around the closed loop
        let cumulative = knot_style.parameterize(points, true);
        let parameters: Vec<T> = cumulative.windows(2).map(|w| w[1] - w[0]).collect();

        let head = &parameters[0..(degree.saturating_sub(1))];
        let tail = &parameters[(parameters.len() + 1 - degree.max(1))..];
        let start_parameters = if degree > 1 { tail.to_vec() } else { vec![] };

        let knots = [start_parameters, parameters.clone(), head.to_vec()].concat();

        let m = n + degree;

        let knots = [
            vec![T::zero()],
            knots
                .iter()
                .scan(T::zero(), |p, x| {
                    *p += *x;
                    Some(*p)
                })
                .collect_vec(),
        ]
        .concat();

        // pad the ends so the domain sits strictly inside the knot vector
        let k0 = if degree > 2 {
            knots[0] - (knots[m + 1] - knots[m])
        } else {
            knots[0]
        };
        let k1 = if degree > 2 {
            knots[knots.len() - 1] + (knots[degree + 1] - knots[degree])
        } else {
            knots[knots.len() - 1]
        };
        let knots = [vec![k0], knots, vec![k1]].concat();

        let knots_vec = KnotVector::new(knots.clone());
        let plen = n;

        let mut m_a = DMatrix::<T>::zeros(plen, plen);
        let zero_pad = vec![T::zero(); plen - (degree + 1)];

        let span_n = knots_vec.len() - degree - 2;
        for i in 0..plen {
            let u = knots[i + degree];
            let knot_span_index = knots_vec.find_knot_span_index(span_n, degree, u);

            let basis = knots_vec.basis_functions(knot_span_index, u, degree);
            let basis_padded = [basis, zero_pad.clone()].concat();

            let ls = knot_span_index - degree;

            // In a closed periodic curve the control points loop.
            // The solver only solves for the non-looping control points,
            // so the coefficient rows wrap to represent the duplicates.
            let nn = basis_padded.len() - ls;
            let mut e = basis_padded[nn..].to_vec();
            e.extend_from_slice(&basis_padded[0..nn]);

            for (j, v) in e.iter().enumerate() {
                m_a[(i, j)] = *v;
            }
        }

        let mut control_points = try_solve_interpolation::<T, D>(m_a, points, None)?;

        // wrap the first `degree` poles
        for i in 0..degree {
            control_points.push(control_points[i].clone());
        }

        Ok(Self::new_periodic_unchecked(
            degree,
            control_points,
            knots_vec,
        ))
    }
}

enum RhsRow<T: FloatingPoint, D: DimName>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    Point(OPoint<T, DimNameDiff<D, U1>>),
    Tangent(OVector<T, DimNameDiff<D, U1>>),
}

/// Solve the interpolation system with an LU decomposition,
/// one right-hand side per spatial dimension.
fn try_solve_interpolation<T: FloatingPoint, D: DimName>(
    m_a: DMatrix<T>,
    points: &[OPoint<T, DimNameDiff<D, U1>>],
    rhs_rows: Option<&[RhsRow<T, D>]>,
) -> Result<Vec<OPoint<T, D>>>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    let rows = m_a.nrows();
    let dim = D::dim() - 1;

    let lu = m_a.lu();
    let mut m_x = DMatrix::<T>::zeros(rows, dim);
    for i in 0..dim {
        let b: Vec<T> = match rhs_rows {
            Some(rr) => rr
                .iter()
                .map(|r| match r {
                    RhsRow::Point(p) => p[i],
                    RhsRow::Tangent(t) => t[i],
                })
                .collect(),
            None => points.iter().map(|p| p[i]).collect(),
        };
        let b = DVector::from_vec(b);
        let xs = lu
            .solve(&b)
            .ok_or(Error::KernelFailure("interpolation solve failed".to_string()))?;
        for j in 0..rows {
            m_x[(j, i)] = xs[j];
        }
    }

    // extract homogeneous control points from the solution
    let mut control_points = vec![];
    for i in 0..m_x.nrows() {
        let mut coords = vec![];
        for j in 0..m_x.ncols() {
            coords.push(m_x[(i, j)]);
        }
        coords.push(T::one());
        control_points.push(OPoint::from_slice(&coords));
    }

    Ok(control_points)
}
