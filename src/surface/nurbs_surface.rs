use nalgebra::allocator::Allocator;
use nalgebra::{
    Const, DefaultAllocator, DimName, DimNameDiff, DimNameSub, OPoint, OVector, Vector3, U1,
};

use crate::curve::nurbs_curve::dehomogenize;
use crate::curve::{KnotStyle, NurbsCurve};
use crate::errors::{Error, Result};
use crate::knot::{sorted_set_sub, sorted_set_union, KnotVector};
use crate::misc::{transpose_control_points, Binomial, FloatingPoint};

/// NURBS surface representation
/// The control point grid is indexed `[u][v]` with homogeneous coordinates.
#[derive(Clone, Debug)]
pub struct NurbsSurface<T: FloatingPoint, D: DimName>
where
    DefaultAllocator: Allocator<D>,
{
    control_points: Vec<Vec<OPoint<T, D>>>,
    u_degree: usize,
    v_degree: usize,
    u_knots: KnotVector<T>,
    v_knots: KnotVector<T>,
    u_periodic: bool,
    v_periodic: bool,
}

/// 3D NURBS surface alias
pub type NurbsSurface3D<T> = NurbsSurface<T, Const<4>>;

impl<T: FloatingPoint, D: DimName> NurbsSurface<T, D>
where
    DefaultAllocator: Allocator<D>,
{
    pub fn new(
        u_degree: usize,
        v_degree: usize,
        u_knots: Vec<T>,
        v_knots: Vec<T>,
        control_points: Vec<Vec<OPoint<T, D>>>,
    ) -> Self {
        Self {
            u_degree,
            v_degree,
            u_knots: KnotVector::new(u_knots),
            v_knots: KnotVector::new(v_knots),
            control_points,
            u_periodic: false,
            v_periodic: false,
        }
    }

    pub fn try_new(
        u_degree: usize,
        v_degree: usize,
        u_knots: Vec<T>,
        v_knots: Vec<T>,
        control_points: Vec<Vec<OPoint<T, D>>>,
    ) -> Result<Self> {
        if control_points.len() <= u_degree {
            return Err(Error::InvalidInput(
                "too few control point rows for surface".to_string(),
            ));
        }
        let cols = control_points[0].len();
        if cols <= v_degree {
            return Err(Error::InvalidInput(
                "too few control point columns for surface".to_string(),
            ));
        }
        if control_points.iter().any(|row| row.len() != cols) {
            return Err(Error::InvalidInput(
                "control point grid is ragged".to_string(),
            ));
        }
        if u_knots.len() != control_points.len() + u_degree + 1 {
            return Err(Error::InvalidInput(
                "invalid u knot count".to_string(),
            ));
        }
        if v_knots.len() != cols + v_degree + 1 {
            return Err(Error::InvalidInput(
                "invalid v knot count".to_string(),
            ));
        }
        Ok(Self::new(u_degree, v_degree, u_knots, v_knots, control_points))
    }

    pub fn u_degree(&self) -> usize {
        self.u_degree
    }

    pub fn v_degree(&self) -> usize {
        self.v_degree
    }

    pub fn u_knots(&self) -> &KnotVector<T> {
        &self.u_knots
    }

    pub fn v_knots(&self) -> &KnotVector<T> {
        &self.v_knots
    }

    pub fn control_points(&self) -> &Vec<Vec<OPoint<T, D>>> {
        &self.control_points
    }

    pub fn is_u_periodic(&self) -> bool {
        self.u_periodic
    }

    pub fn is_v_periodic(&self) -> bool {
        self.v_periodic
    }

    pub fn mark_u_periodic(&mut self, periodic: bool) {
        self.u_periodic = periodic;
    }

    pub fn mark_v_periodic(&mut self, periodic: bool) {
        self.v_periodic = periodic;
    }

    /// Get the u domain of the knot vector by degree
    pub fn u_knots_domain(&self) -> (T, T) {
        self.u_knots.domain(self.u_degree)
    }

    /// Get the v domain of the knot vector by degree
    pub fn v_knots_domain(&self) -> (T, T) {
        self.v_knots.domain(self.v_degree)
    }

    /// Parameter bounds as `(u0, u1, v0, v1)`
    pub fn bounds(&self) -> (T, T, T, T) {
        let (u0, u1) = self.u_knots_domain();
        let (v0, v1) = self.v_knots_domain();
        (u0, u1, v0, v1)
    }

    /// Evaluate the surface at the given parameters to get a homogeneous point
    pub fn point(&self, u: T, v: T) -> OPoint<T, D> {
        let n = self.u_knots.len() - self.u_degree - 2;
        let m = self.v_knots.len() - self.v_degree - 2;

        let knot_span_index_u = self.u_knots.find_knot_span_index(n, self.u_degree, u);
        let knot_span_index_v = self.v_knots.find_knot_span_index(m, self.v_degree, v);
        let u_basis_vals = self
            .u_knots
            .basis_functions(knot_span_index_u, u, self.u_degree);
        let v_basis_vals = self
            .v_knots
            .basis_functions(knot_span_index_v, v, self.v_degree);
        let uind = knot_span_index_u - self.u_degree;

        let mut position = OPoint::<T, D>::origin();
        for l in 0..=self.v_degree {
            let mut temp = OPoint::<T, D>::origin();
            let vind = knot_span_index_v - self.v_degree + l;

            for k in 0..=self.u_degree {
                temp.coords += &self.control_points[uind + k][vind].coords * u_basis_vals[k];
            }

            position.coords += temp.coords * v_basis_vals[l];
        }

        position
    }

    /// Evaluate the homogeneous derivatives at the given parameters
    fn derivatives(&self, u: T, v: T, derivs: usize) -> Vec<Vec<OVector<T, D>>> {
        let n = self.u_knots.len() - self.u_degree - 2;
        let m = self.v_knots.len() - self.v_degree - 2;

        let du = if derivs < self.u_degree {
            derivs
        } else {
            self.u_degree
        };
        let dv = if derivs < self.v_degree {
            derivs
        } else {
            self.v_degree
        };
        let mut skl = vec![vec![OVector::<T, D>::zeros(); derivs + 1]; derivs + 1];
        let knot_span_index_u = self.u_knots.find_knot_span_index(n, self.u_degree, u);
        let knot_span_index_v = self.v_knots.find_knot_span_index(m, self.v_degree, v);
        let uders = self
            .u_knots
            .derivative_basis_functions(knot_span_index_u, u, self.u_degree, du);
        let vders = self
            .v_knots
            .derivative_basis_functions(knot_span_index_v, v, self.v_degree, dv);
        let mut temp = vec![OPoint::<T, D>::origin(); self.v_degree + 1];

        for k in 0..=du {
            for s in 0..=self.v_degree {
                temp[s] = OPoint::<T, D>::origin();
                for r in 0..=self.u_degree {
                    let w = &self.control_points[knot_span_index_u - self.u_degree + r]
                        [knot_span_index_v - self.v_degree + s]
                        * uders[k][r];
                    let column = temp.get_mut(s).unwrap();
                    w.coords.iter().enumerate().for_each(|(i, v)| {
                        column[i] += *v;
                    });
                }
            }

            let nk = derivs - k;
            let dd = if nk < dv { nk } else { dv };

            for l in 0..=dd {
                for (s, item) in temp.iter().enumerate().take(self.v_degree + 1) {
                    let w = item * vders[l][s];
                    let column = skl[k].get_mut(l).unwrap();
                    w.coords.iter().enumerate().for_each(|(i, v)| {
                        column[i] += *v;
                    });
                }
            }
        }

        skl
    }

    /// Exchange the u and v directions
    pub fn exchange_uv(&mut self) {
        self.control_points = transpose_control_points(&self.control_points);
        std::mem::swap(&mut self.u_degree, &mut self.v_degree);
        std::mem::swap(&mut self.u_knots, &mut self.v_knots);
        std::mem::swap(&mut self.u_periodic, &mut self.v_periodic);
    }

    /// Replace the u knot values keeping the count
    pub fn try_set_u_knots(&mut self, knots: Vec<T>) -> Result<()> {
        if knots.len() != self.u_knots.len() {
            return Err(Error::InvalidInput(
                "u knot count cannot change".to_string(),
            ));
        }
        if knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::NonMonotonic);
        }
        self.u_knots = KnotVector::new(knots);
        Ok(())
    }

    /// Replace the v knot values keeping the count
    pub fn try_set_v_knots(&mut self, knots: Vec<T>) -> Result<()> {
        if knots.len() != self.v_knots.len() {
            return Err(Error::InvalidInput(
                "v knot count cannot change".to_string(),
            ));
        }
        if knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::NonMonotonic);
        }
        self.v_knots = KnotVector::new(knots);
        Ok(())
    }

    /// Apply a curve operation along every u-direction pole column
    fn try_map_u_curves<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(NurbsCurve<T, D>) -> Result<NurbsCurve<T, D>>,
    {
        let transposed = transpose_control_points(&self.control_points);
        let mut mapped: Vec<NurbsCurve<T, D>> = vec![];
        for poles in transposed.into_iter() {
            let curve =
                NurbsCurve::new_unchecked(self.u_degree, poles, self.u_knots.clone());
            mapped.push(f(curve)?);
        }
        let last = mapped
            .last()
            .ok_or(Error::KernelFailure("empty surface".to_string()))?;
        self.u_degree = last.degree();
        self.u_knots = last.knots().clone();
        let rows: Vec<Vec<OPoint<T, D>>> = mapped
            .into_iter()
            .map(|c| c.control_points().clone())
            .collect();
        self.control_points = transpose_control_points(&rows);
        Ok(())
    }

    /// Apply a curve operation along every v-direction pole row
    fn try_map_v_curves<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(NurbsCurve<T, D>) -> Result<NurbsCurve<T, D>>,
    {
        let mut mapped: Vec<NurbsCurve<T, D>> = vec![];
        for poles in self.control_points.clone().into_iter() {
            let curve =
                NurbsCurve::new_unchecked(self.v_degree, poles, self.v_knots.clone());
            mapped.push(f(curve)?);
        }
        let last = mapped
            .last()
            .ok_or(Error::KernelFailure("empty surface".to_string()))?;
        self.v_degree = last.degree();
        self.v_knots = last.knots().clone();
        self.control_points = mapped
            .into_iter()
            .map(|c| c.control_points().clone())
            .collect();
        Ok(())
    }

    /// Raise the u degree to `target`
    pub fn try_elevate_u_degree(&mut self, target: usize) -> Result<()> {
        if target <= self.u_degree {
            return Ok(());
        }
        self.try_map_u_curves(|c| c.try_elevate_degree(target))
    }

    /// Raise the v degree to `target`
    pub fn try_elevate_v_degree(&mut self, target: usize) -> Result<()> {
        if target <= self.v_degree {
            return Ok(());
        }
        self.try_map_v_curves(|c| c.try_elevate_degree(target))
    }

    /// Insert the u knot `value` `times` times
    pub fn try_insert_u_knot(&mut self, value: T, times: usize) -> Result<()> {
        let insert = vec![value; times];
        self.try_map_u_curves(|mut c| {
            c.try_refine_knot(insert.clone())?;
            Ok(c)
        })
    }

    /// Insert the v knot `value` `times` times
    pub fn try_insert_v_knot(&mut self, value: T, times: usize) -> Result<()> {
        let insert = vec![value; times];
        self.try_map_v_curves(|mut c| {
            c.try_refine_knot(insert.clone())?;
            Ok(c)
        })
    }

    /// Multiplicity of the u knot at `value`, zero when absent
    pub fn u_multiplicity_at(&self, value: T) -> usize {
        let eps = T::from_f64(1e-10).unwrap();
        self.u_knots
            .iter()
            .filter(|k| (**k - value).abs() <= eps)
            .count()
    }

    /// Multiplicity of the v knot at `value`, zero when absent
    pub fn v_multiplicity_at(&self, value: T) -> usize {
        let eps = T::from_f64(1e-10).unwrap();
        self.v_knots
            .iter()
            .filter(|k| (**k - value).abs() <= eps)
            .count()
    }

    /// Lift the multiplicity of the existing u knot at `value` to `target`
    pub fn try_increase_u_multiplicity(&mut self, value: T, target: usize) -> Result<()> {
        let current = self.u_multiplicity_at(value);
        if current == 0 {
            return Err(Error::InvalidInput(
                "u knot to raise is not present".to_string(),
            ));
        }
        if target > current {
            self.try_insert_u_knot(value, target - current)?;
        }
        Ok(())
    }

    /// Lift the multiplicity of the existing v knot at `value` to `target`
    pub fn try_increase_v_multiplicity(&mut self, value: T, target: usize) -> Result<()> {
        let current = self.v_multiplicity_at(value);
        if current == 0 {
            return Err(Error::InvalidInput(
                "v knot to raise is not present".to_string(),
            ));
        }
        if target > current {
            self.try_insert_v_knot(value, target - current)?;
        }
        Ok(())
    }

    /// True when no interior u knot reaches multiplicity `u_degree`,
    /// i.e. the surface is at least G1 across every u knot line
    pub fn u_continuity_at_least_g1(&self) -> bool {
        let (start, end) = self.u_knots_domain();
        let eps = T::from_f64(1e-10).unwrap();
        self.u_knots.multiplicity().iter().all(|m| {
            let k = *m.knot();
            k <= start + eps || k >= end - eps || m.multiplicity() < self.u_degree
        })
    }

    /// True when no interior v knot reaches multiplicity `v_degree`
    pub fn v_continuity_at_least_g1(&self) -> bool {
        let (start, end) = self.v_knots_domain();
        let eps = T::from_f64(1e-10).unwrap();
        self.v_knots.multiplicity().iter().all(|m| {
            let k = *m.knot();
            k <= start + eps || k >= end - eps || m.multiplicity() < self.v_degree
        })
    }
}

impl<T: FloatingPoint, D: DimName> NurbsSurface<T, D>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    /// Evaluate the surface at the given parameters to get a dehomogenized point
    pub fn point_at(&self, u: T, v: T) -> OPoint<T, DimNameDiff<D, U1>> {
        let p = self.point(u, v);
        dehomogenize(&p).unwrap()
    }

    /// Evaluate the rational derivatives at the given u, v parameters
    pub fn rational_derivatives(
        &self,
        u: T,
        v: T,
        derivs: usize,
    ) -> Vec<Vec<OVector<T, DimNameDiff<D, U1>>>> {
        let ders = self.derivatives(u, v, derivs);
        rational_derivatives(&ders, derivs)
    }

    /// Extract the iso curve at a fixed u parameter, running along v
    pub fn u_iso(&self, u: T) -> NurbsCurve<T, D> {
        let n = self.u_knots.len() - self.u_degree - 2;
        let span = self.u_knots.find_knot_span_index(n, self.u_degree, u);
        let basis = self.u_knots.basis_functions(span, u, self.u_degree);
        let uind = span - self.u_degree;

        let cols = self.control_points[0].len();
        let mut poles = vec![OPoint::<T, D>::origin(); cols];
        for (j, pole) in poles.iter_mut().enumerate() {
            for k in 0..=self.u_degree {
                pole.coords += &self.control_points[uind + k][j].coords * basis[k];
            }
        }

        NurbsCurve::new_unchecked(self.v_degree, poles, self.v_knots.clone())
    }

    /// Extract the iso curve at a fixed v parameter, running along u
    pub fn v_iso(&self, v: T) -> NurbsCurve<T, D> {
        let m = self.v_knots.len() - self.v_degree - 2;
        let span = self.v_knots.find_knot_span_index(m, self.v_degree, v);
        let basis = self.v_knots.basis_functions(span, v, self.v_degree);
        let vind = span - self.v_degree;

        let rows = self.control_points.len();
        let mut poles = vec![OPoint::<T, D>::origin(); rows];
        for (i, pole) in poles.iter_mut().enumerate() {
            for k in 0..=self.v_degree {
                pole.coords += &self.control_points[i][vind + k].coords * basis[k];
            }
        }

        NurbsCurve::new_unchecked(self.u_degree, poles, self.u_knots.clone())
    }

    /// Extrude a profile curve along an axis vector.
    /// The profile runs along v; u is the linear sweep from the profile
    /// (u = 0) to the translated copy (u = 1).
    pub fn extrude(profile: &NurbsCurve<T, D>, axis: &OVector<T, DimNameDiff<D, U1>>) -> Self {
        let prof_points = profile.dehomogenized_control_points();
        let prof_weights = profile.weights();

        let half = axis * T::from_f64(0.5).unwrap();

        let mut control_points = vec![vec![], vec![], vec![]];
        for i in 0..prof_points.len() {
            let p0 = &prof_points[i];
            let p1 = &prof_points[i] + &half;
            let p2 = &prof_points[i] + axis;

            let w = prof_weights[i];
            control_points[0].push(weighted(p0, w));
            control_points[1].push(weighted(&p1, w));
            control_points[2].push(weighted(&p2, w));
        }

        Self {
            u_degree: 2,
            v_degree: profile.degree(),
            u_knots: KnotVector::new(vec![
                T::zero(),
                T::zero(),
                T::zero(),
                T::one(),
                T::one(),
                T::one(),
            ]),
            v_knots: profile.knots().clone(),
            control_points,
            u_periodic: false,
            v_periodic: profile.is_periodic(),
        }
    }

    /// Build a ruled surface between two rails.
    /// The rails are first harmonized to a common degree and knot vector;
    /// u runs along the rails and v crosses from the first to the second.
    pub fn try_ruled(rail0: &NurbsCurve<T, D>, rail1: &NurbsCurve<T, D>) -> Result<Self> {
        let unified = try_unify_curve_knot_vectors(&[rail0.clone(), rail1.clone()])?;
        let (a, b) = (&unified[0], &unified[1]);

        let control_points: Vec<Vec<OPoint<T, D>>> = a
            .control_points()
            .iter()
            .zip(b.control_points().iter())
            .map(|(p0, p1)| vec![p0.clone(), p1.clone()])
            .collect();

        Ok(Self {
            u_degree: a.degree(),
            v_degree: 1,
            u_knots: a.knots().clone(),
            v_knots: KnotVector::new(vec![T::zero(), T::zero(), T::one(), T::one()]),
            control_points,
            u_periodic: rail0.is_periodic() && rail1.is_periodic(),
            v_periodic: false,
        })
    }

    /// Try to loft a collection of section curves into a surface.
    /// Sections are harmonized first; u runs along the sections and v
    /// crosses them at the given parameters (chord-averaged when omitted).
    pub fn try_loft(
        curves: &[NurbsCurve<T, D>],
        v_parameters: Option<&[T]>,
        degree_v: Option<usize>,
    ) -> Result<Self> {
        if curves.len() < 2 {
            return Err(Error::InvalidInput(
                "at least two sections are required for a loft".to_string(),
            ));
        }
        let unified_curves = try_unify_curve_knot_vectors(curves)?;

        let degree_u = unified_curves[0].degree();
        let degree_v = degree_v.unwrap_or(degree_u).min(unified_curves.len() - 1);

        if let Some(params) = v_parameters {
            if params.len() != curves.len() {
                return Err(Error::InvalidInput(
                    "one v parameter per section is required".to_string(),
                ));
            }
        }

        let knots_u = unified_curves[0].knots().clone();

        // interpolate each pole column across the sections
        let v_curves: Result<Vec<NurbsCurve<T, D>>> = (0..unified_curves[0].control_points().len())
            .map(|i| {
                let points: Vec<_> = unified_curves
                    .iter()
                    .map(|c| dehomogenize(&c.control_points()[i]).unwrap())
                    .collect();
                match v_parameters {
                    Some(params) => {
                        NurbsCurve::try_interpolate_with_parameters(&points, degree_v, params)
                    }
                    None => NurbsCurve::try_interpolate(&points, degree_v),
                }
            })
            .collect();
        let v_curves = v_curves?;

        let mut control_points = vec![];
        v_curves.iter().for_each(|c| {
            control_points.push(c.control_points().clone());
        });
        let knots_v = v_curves.last().unwrap().knots().clone();

        Ok(Self {
            control_points,
            u_degree: degree_u,
            v_degree: degree_v,
            u_knots: knots_u,
            v_knots: knots_v,
            u_periodic: false,
            v_periodic: false,
        })
    }

    /// Interpolate a rectangular grid of points with a surface,
    /// skinning first along u then along v with averaged chord parameters.
    pub fn try_interpolate_grid(
        points: &[Vec<OPoint<T, DimNameDiff<D, U1>>>],
        u_degree: usize,
        v_degree: usize,
    ) -> Result<Self> {
        let rows = points.len();
        if rows < u_degree + 1 {
            return Err(Error::InvalidInput("too few grid rows".to_string()));
        }
        let cols = points[0].len();
        if cols < v_degree + 1 {
            return Err(Error::InvalidInput("too few grid columns".to_string()));
        }
        if points.iter().any(|r| r.len() != cols) {
            return Err(Error::InvalidInput("grid is ragged".to_string()));
        }

        // averaged chord parameters in both directions
        let mut u_params = vec![T::zero(); rows];
        for j in 0..cols {
            let column: Vec<_> = (0..rows).map(|i| points[i][j].clone()).collect();
            let params = KnotStyle::ChordLength.parameterize(&column, false);
            let total = params[rows - 1];
            if total <= T::default_epsilon() {
                return Err(Error::GeometricDegeneracy(
                    "degenerate grid column".to_string(),
                ));
            }
            for i in 0..rows {
                u_params[i] += params[i] / total;
            }
        }
        let cols_t = T::from_usize(cols).unwrap();
        u_params.iter_mut().for_each(|p| *p /= cols_t);

        let mut v_params = vec![T::zero(); cols];
        for row in points.iter() {
            let params = KnotStyle::ChordLength.parameterize(row, false);
            let total = params[cols - 1];
            if total <= T::default_epsilon() {
                return Err(Error::GeometricDegeneracy(
                    "degenerate grid row".to_string(),
                ));
            }
            for j in 0..cols {
                v_params[j] += params[j] / total;
            }
        }
        let rows_t = T::from_usize(rows).unwrap();
        v_params.iter_mut().for_each(|p| *p /= rows_t);

        // interpolate along u for every column
        let u_curves: Result<Vec<NurbsCurve<T, D>>> = (0..cols)
            .map(|j| {
                let column: Vec<_> = (0..rows).map(|i| points[i][j].clone()).collect();
                NurbsCurve::try_interpolate_with_parameters(&column, u_degree, &u_params)
            })
            .collect();
        let u_curves = u_curves?;
        let u_knots = u_curves[0].knots().clone();

        // interpolate the resulting pole rows along v
        let pole_rows = u_curves[0].control_points().len();
        let v_curves: Result<Vec<NurbsCurve<T, D>>> = (0..pole_rows)
            .map(|i| {
                let row: Vec<_> = u_curves
                    .iter()
                    .map(|c| dehomogenize(&c.control_points()[i]).unwrap())
                    .collect();
                NurbsCurve::try_interpolate_with_parameters(&row, v_degree, &v_params)
            })
            .collect();
        let v_curves = v_curves?;
        let v_knots = v_curves[0].knots().clone();

        let control_points: Vec<Vec<OPoint<T, D>>> = v_curves
            .iter()
            .map(|c| c.control_points().clone())
            .collect();

        Ok(Self {
            u_degree,
            v_degree,
            u_knots,
            v_knots,
            control_points,
            u_periodic: false,
            v_periodic: false,
        })
    }

    /// Find the surface parameters of the closest point,
    /// seeded on a sample grid and polished with a damped Newton iteration.
    pub fn find_closest_parameter(
        &self,
        point: &OPoint<T, DimNameDiff<D, U1>>,
    ) -> Result<(T, T)> {
        let (u0, u1, v0, v1) = self.bounds();

        let divs_u = (self.control_points.len() * self.u_degree).clamp(8, 64);
        let divs_v = (self.control_points[0].len() * self.v_degree).clamp(8, 64);

        let mut best = (u0, v0);
        let mut min = <T as nalgebra::RealField>::max_value().unwrap();
        for i in 0..=divs_u {
            let u = u0 + (u1 - u0) * T::from_usize(i).unwrap() / T::from_usize(divs_u).unwrap();
            for j in 0..=divs_v {
                let v =
                    v0 + (v1 - v0) * T::from_usize(j).unwrap() / T::from_usize(divs_v).unwrap();
                let d = (self.point_at(u, v) - point).norm_squared();
                if d < min {
                    min = d;
                    best = (u, v);
                }
            }
        }

        let gamma = T::from_f64(0.5).unwrap();
        let eps = T::from_f64(1e-16).unwrap();
        let step_eps = T::from_f64(1e-13).unwrap();
        let (mut cu, mut cv) = best;
        let mut cost = min;

        for _ in 0..64 {
            let e = self.rational_derivatives(cu, cv, 2);
            let dif = &e[0][0] - &point.coords;

            let s_u = &e[1][0];
            let s_v = &e[0][1];
            let s_uu = &e[2][0];
            let s_vv = &e[0][2];
            let s_uv = &e[1][1];

            let gu = s_u.dot(&dif);
            let gv = s_v.dot(&dif);

            if dif.norm_squared() < eps {
                break;
            }

            let j00 = s_u.dot(s_u) + s_uu.dot(&dif);
            let j01 = s_u.dot(s_v) + s_uv.dot(&dif);
            let j11 = s_v.dot(s_v) + s_vv.dot(&dif);

            let det = j00 * j11 - j01 * j01;
            let (du, dv) = if det.abs() > T::default_epsilon() {
                (
                    (-gu * j11 + gv * j01) / det,
                    (gu * j01 - gv * j00) / det,
                )
            } else if j00.abs() > T::default_epsilon() {
                (-gu / j00, T::zero())
            } else if j11.abs() > T::default_epsilon() {
                (T::zero(), -gv / j11)
            } else {
                break;
            };

            let nu = constrain(cu + du * gamma, (u0, u1), self.u_periodic);
            let nv = constrain(cv + dv * gamma, (v0, v1), self.v_periodic);

            let new_cost = (self.point_at(nu, nv) - point).norm_squared();
            if new_cost >= cost {
                break;
            }
            cost = new_cost;
            let step = (nu - cu).abs() + (nv - cv).abs();
            cu = nu;
            cv = nv;
            if step < step_eps {
                break;
            }
        }

        Ok((cu, cv))
    }
}

impl<T: FloatingPoint> NurbsSurface3D<T> {
    /// Surface normal at the given parameters
    pub fn normal_at(&self, u: T, v: T) -> Vector3<T> {
        let deriv = self.rational_derivatives(u, v, 1);
        let v0 = &deriv[1][0];
        let v1 = &deriv[0][1];
        v0.cross(v1)
    }

    /// Offset every point of the surface along its normal by `distance`,
    /// approximating the result on a sampled grid with the same degrees.
    pub fn try_offset(&self, distance: T, samples: usize) -> Result<Self> {
        if distance == T::zero() {
            return Ok(self.clone());
        }
        if !self.u_continuity_at_least_g1() || !self.v_continuity_at_least_g1() {
            return Err(Error::ContinuityTooLow);
        }

        let (u0, u1, v0, v1) = self.bounds();
        let rows = samples.max(self.u_degree + 1);
        let cols = samples.max(self.v_degree + 1);

        let mut grid = vec![];
        for i in 0..rows {
            let u = u0 + (u1 - u0) * T::from_usize(i).unwrap() / T::from_usize(rows - 1).unwrap();
            let mut row = vec![];
            for j in 0..cols {
                let v =
                    v0 + (v1 - v0) * T::from_usize(j).unwrap() / T::from_usize(cols - 1).unwrap();
                let normal = self.normal_at(u, v);
                let len = normal.norm();
                if len <= T::default_epsilon() {
                    return Err(Error::GeometricDegeneracy(
                        "degenerate surface normal".to_string(),
                    ));
                }
                row.push(self.point_at(u, v) + normal * (distance / len));
            }
            grid.push(row);
        }

        NurbsSurface3D::try_interpolate_grid(&grid, self.u_degree, self.v_degree)
    }
}

fn weighted<T: FloatingPoint, D: DimName>(
    point: &OPoint<T, DimNameDiff<D, U1>>,
    w: T,
) -> OPoint<T, D>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    let mut coords = vec![];
    for i in 0..(D::dim() - 1) {
        coords.push(point[i] * w);
    }
    coords.push(w);
    OPoint::from_slice(&coords)
}

fn constrain<T: FloatingPoint>(parameter: T, domain: (T, T), closed: bool) -> T {
    if parameter < domain.0 {
        if closed {
            domain.1 - (domain.0 - parameter)
        } else {
            domain.0
        }
    } else if parameter > domain.1 {
        if closed {
            domain.0 + (parameter - domain.1)
        } else {
            domain.1
        }
    } else {
        parameter
    }
}

/// Compute the rational derivatives from homogeneous ones
fn rational_derivatives<T, D>(
    ders: &[Vec<OVector<T, D>>],
    derivs: usize,
) -> Vec<Vec<OVector<T, DimNameDiff<D, U1>>>>
where
    T: FloatingPoint,
    D: DimName,
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    let a_ders: Vec<_> = ders
        .iter()
        .map(|row| {
            row.iter()
                .map(|d| {
                    let mut a_ders = vec![];
                    for i in 0..D::dim() - 1 {
                        a_ders.push(d[i]);
                    }
                    OVector::<T, DimNameDiff<D, U1>>::from_vec(a_ders)
                })
                .collect::<Vec<_>>()
        })
        .collect();
    let w_ders: Vec<_> = ders
        .iter()
        .map(|row| row.iter().map(|d| d[D::dim() - 1]).collect::<Vec<_>>())
        .collect();

    let mut skl: Vec<Vec<OVector<T, DimNameDiff<D, U1>>>> = vec![];
    let mut binom = Binomial::<T>::new();

    for k in 0..=derivs {
        let mut row = vec![];

        for l in 0..=(derivs - k) {
            let mut v = a_ders[k][l].clone();
            for j in 1..=l {
                let coef = binom.get(l, j) * w_ders[0][j];
                v -= &row[l - j] * coef;
            }

            for i in 1..=k {
                let coef = binom.get(k, i) * w_ders[i][0];
                v -= &skl[k - i][l] * coef;
                let mut v2 = OVector::<T, DimNameDiff<D, U1>>::zeros();
                for j in 1..=l {
                    v2 += &skl[k - i][l - j] * binom.get(l, j) * w_ders[i][j];
                }
                v -= v2 * binom.get(k, i);
            }

            let v = v / w_ders[0][0];
            row.push(v);
        }

        skl.push(row);
    }

    skl
}

/// Harmonize a set of curves: common max degree, shared normalized knot
/// span and merged knot vectors.
pub fn try_unify_curve_knot_vectors<T, D>(
    curves: &[NurbsCurve<T, D>],
) -> Result<Vec<NurbsCurve<T, D>>>
where
    T: FloatingPoint,
    D: DimName,
    DefaultAllocator: Allocator<D>,
{
    let max_degree = curves.iter().fold(0, |d, c| d.max(c.degree()));

    // elevate all curves to the same degree
    let mut curves = curves
        .iter()
        .map(|c| {
            if c.degree() < max_degree {
                c.try_elevate_degree(max_degree)
            } else {
                Ok(c.clone())
            }
        })
        .collect::<Result<Vec<NurbsCurve<T, D>>>>()?;

    let knot_intervals = curves
        .iter()
        .map(|c| {
            let knots = c.knots();
            (knots.first(), knots.last())
        })
        .collect::<Vec<_>>();

    // shift all knot vectors to start at zero
    curves.iter_mut().enumerate().for_each(|(i, c)| {
        let min = knot_intervals[i].0;
        c.knots_mut().iter_mut().for_each(|x| *x -= min);
    });

    // scale every vector to the longest span
    let knot_spans = knot_intervals
        .iter()
        .map(|(min, max)| *max - *min)
        .collect::<Vec<_>>();
    let max_knot_span = knot_spans.iter().fold(T::zero(), |x, a| a.max(x));

    curves.iter_mut().enumerate().for_each(|(i, c)| {
        let scale = max_knot_span / knot_spans[i];
        c.knots_mut().iter_mut().for_each(|x| *x *= scale);
    });

    // merge and refine
    let merged_knots = curves
        .iter()
        .fold(vec![], |a, c| sorted_set_union(c.knots().as_slice(), &a));

    for curve in curves.iter_mut() {
        let rem = sorted_set_sub(&merged_knots, curve.knots().as_slice());
        if !rem.is_empty() {
            curve.try_refine_knot(rem)?;
        }
    }

    Ok(curves)
}

#[cfg(feature = "serde")]
impl<T, D: DimName> serde::Serialize for NurbsSurface<T, D>
where
    T: FloatingPoint + serde::Serialize,
    DefaultAllocator: Allocator<D>,
    OPoint<T, D>: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        (
            self.u_degree,
            self.v_degree,
            &self.u_knots,
            &self.v_knots,
            &self.control_points,
            self.u_periodic,
            self.v_periodic,
        )
            .serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de, T, D: DimName> serde::Deserialize<'de> for NurbsSurface<T, D>
where
    T: FloatingPoint + serde::Deserialize<'de>,
    DefaultAllocator: Allocator<D>,
    OPoint<T, D>: serde::Deserialize<'de>,
{
    fn deserialize<De>(deserializer: De) -> std::result::Result<Self, De::Error>
    where
        De: serde::Deserializer<'de>,
    {
        #[allow(clippy::type_complexity)]
        let (u_degree, v_degree, u_knots, v_knots, control_points, u_periodic, v_periodic): (
            usize,
            usize,
            KnotVector<T>,
            KnotVector<T>,
            Vec<Vec<OPoint<T, D>>>,
            bool,
            bool,
        ) = serde::Deserialize::deserialize(deserializer)?;
        Ok(Self {
            u_degree,
            v_degree,
            u_knots,
            v_knots,
            control_points,
            u_periodic,
            v_periodic,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Point4, Vector3};

    use super::*;
    use crate::curve::NurbsCurve3D;

    fn flat_quad() -> NurbsSurface3D<f64> {
        NurbsSurface3D::new(
            1,
            1,
            vec![0., 0., 1., 1.],
            vec![0., 0., 1., 1.],
            vec![
                vec![Point4::new(0., 0., 0., 1.), Point4::new(0., 1., 0., 1.)],
                vec![Point4::new(1., 0., 0., 1.), Point4::new(1., 1., 0., 1.)],
            ],
        )
    }

    #[test]
    fn bilinear_evaluation() {
        let quad = flat_quad();
        let p = quad.point_at(0.5, 0.25);
        assert_relative_eq!(p, Point3::new(0.5, 0.25, 0.0), epsilon = 1e-12);
        let n = quad.normal_at(0.3, 0.7).normalize();
        assert_relative_eq!(n, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn iso_curves_track_the_surface() {
        let quad = flat_quad();
        let iso = quad.u_iso(0.25);
        let p = iso.point_at(0.5);
        assert_relative_eq!(p, Point3::new(0.25, 0.5, 0.0), epsilon = 1e-12);

        let iso_v = quad.v_iso(0.75);
        let q = iso_v.point_at(0.1);
        assert_relative_eq!(q, Point3::new(0.1, 0.75, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn extrusion_sweeps_the_profile() {
        let profile = NurbsCurve3D::<f64>::polyline(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ]);
        let surface = NurbsSurface3D::extrude(&profile, &Vector3::new(0.0, 0.0, 2.0));
        let (u0, u1, v0, v1) = surface.bounds();
        assert_relative_eq!(
            surface.point_at(u0, v0),
            Point3::new(0.0, 0.0, 0.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            surface.point_at(u1, v1),
            Point3::new(1.0, 0.0, 2.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn ruled_surface_blends_rails() {
        let r0 = NurbsCurve3D::<f64>::polyline(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ]);
        let r1 = NurbsCurve3D::<f64>::try_interpolate(
            &[
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.5, 0.0),
                Point3::new(2.0, 1.0, 0.0),
            ],
            2,
        )
        .unwrap();
        let ruled = NurbsSurface3D::try_ruled(&r0, &r1).unwrap();
        let (u0, u1, v0, v1) = ruled.bounds();
        // v = 0 tracks the first rail, v = 1 the second
        assert_relative_eq!(
            ruled.point_at(u0, v0),
            Point3::new(0.0, 0.0, 0.0),
            epsilon = 1e-9
        );
        assert_relative_eq!(
            ruled.point_at(u1, v1),
            Point3::new(2.0, 1.0, 0.0),
            epsilon = 1e-9
        );
        // midway points are on the straight connector
        let mid_u = (u0 + u1) / 2.0;
        let top = ruled.point_at(mid_u, v1);
        let bottom = ruled.point_at(mid_u, v0);
        let middle = ruled.point_at(mid_u, (v0 + v1) / 2.0);
        assert_relative_eq!(
            middle,
            Point3::from((top.coords + bottom.coords) / 2.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn closest_parameter_on_flat_quad() {
        let quad = flat_quad();
        let (u, v) = quad
            .find_closest_parameter(&Point3::new(0.3, 0.8, 0.5))
            .unwrap();
        assert_relative_eq!(u, 0.3, epsilon = 1e-5);
        assert_relative_eq!(v, 0.8, epsilon = 1e-5);
    }

    #[test]
    fn offset_moves_along_normal() {
        let quad = flat_quad();
        let offset = quad.try_offset(0.5, 8).unwrap();
        let p = offset.point_at(0.5, 0.5);
        assert_relative_eq!(p.z, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn offset_of_c0_surface_is_rejected() {
        // degree 2 surface with an interior u knot of full multiplicity
        let mk = |x: f64, y: f64| Point4::new(x, y, (x - 1.0).abs(), 1.0);
        let surface = NurbsSurface3D::new(
            2,
            1,
            vec![0., 0., 0., 1., 1., 2., 2., 2.],
            vec![0., 0., 1., 1.],
            (0..5)
                .map(|i| {
                    let x = i as f64 / 2.0;
                    vec![mk(x, 0.0), mk(x, 1.0)]
                })
                .collect(),
        );
        assert!(!surface.u_continuity_at_least_g1());
        assert!(matches!(
            surface.try_offset(0.1, 8),
            Err(Error::ContinuityTooLow)
        ));
    }
}
