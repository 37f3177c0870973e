use gauss_quad::GaussLegendre;
use nalgebra::allocator::Allocator;
use nalgebra::{
    Const, DefaultAllocator, DimName, DimNameAdd, DimNameDiff, DimNameSub, DimNameSum, OPoint,
    OVector, Point3, Vector2, U1,
};
use rand::rngs::ThreadRng;
use rand::Rng;

use crate::errors::{Error, Result};
use crate::knot::KnotVector;
use crate::misc::{Binomial, FloatingPoint, Invertible};

/// NURBS curve representation
/// By generics, it can be used for 2D or 3D curves with f32 or f64 scalar types
#[derive(Clone, Debug)]
pub struct NurbsCurve<T: FloatingPoint, D: DimName>
where
    DefaultAllocator: Allocator<D>,
{
    /// control points with homogeneous coordinates
    /// the last element of each point is the `weight`
    control_points: Vec<OPoint<T, D>>,
    degree: usize,
    /// knot vector whose length equals `# of control points + degree + 1`
    knots: KnotVector<T>,
    /// whether the pole table wraps around with no explicit seam
    periodic: bool,
}

/// 2D NURBS curve alias
pub type NurbsCurve2D<T> = NurbsCurve<T, Const<3>>;

/// 3D NURBS curve alias
pub type NurbsCurve3D<T> = NurbsCurve<T, Const<4>>;

impl<T: FloatingPoint, D: DimName> NurbsCurve<T, D>
where
    DefaultAllocator: Allocator<D>,
{
    /// Create a new clamped NURBS curve
    /// # Failures
    /// - if the number of control points is not greater than the degree
    /// - if the number of knots does not equal `# of control points + degree + 1`
    pub fn try_new(
        degree: usize,
        control_points: Vec<OPoint<T, D>>,
        knots: Vec<T>,
    ) -> Result<Self> {
        if control_points.len() <= degree {
            return Err(Error::InvalidInput(
                "too few control points for curve".to_string(),
            ));
        }
        if knots.len() != control_points.len() + degree + 1 {
            return Err(Error::InvalidInput(format!(
                "invalid number of knots, got {}, expected {}",
                knots.len(),
                control_points.len() + degree + 1
            )));
        }
        let mut knots = knots;
        knots.sort_by(|a, b| a.partial_cmp(b).unwrap());

        Ok(Self {
            degree,
            control_points,
            knots: KnotVector::new(knots),
            periodic: false,
        })
    }

    pub fn new_unchecked(
        degree: usize,
        control_points: Vec<OPoint<T, D>>,
        knots: KnotVector<T>,
    ) -> Self {
        Self {
            degree,
            control_points,
            knots,
            periodic: false,
        }
    }

    pub(crate) fn new_periodic_unchecked(
        degree: usize,
        control_points: Vec<OPoint<T, D>>,
        knots: KnotVector<T>,
    ) -> Self {
        Self {
            degree,
            control_points,
            knots,
            periodic: true,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn knots(&self) -> &KnotVector<T> {
        &self.knots
    }

    pub fn knots_mut(&mut self) -> &mut KnotVector<T> {
        &mut self.knots
    }

    pub fn control_points(&self) -> &Vec<OPoint<T, D>> {
        &self.control_points
    }

    pub fn control_points_mut(&mut self) -> &mut Vec<OPoint<T, D>> {
        &mut self.control_points
    }

    pub fn pole_count(&self) -> usize {
        self.control_points.len()
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    pub fn knots_domain(&self) -> (T, T) {
        self.knots.domain(self.degree)
    }

    pub fn knots_domain_interval(&self) -> T {
        let (d0, d1) = self.knots_domain();
        d1 - d0
    }

    /// Evaluate the curve at a given parameter to get a homogeneous point
    pub(crate) fn point(&self, t: T) -> OPoint<T, D> {
        let n = self.knots.len() - self.degree - 2;
        let knot_span_index = self.knots.find_knot_span_index(n, self.degree, t);
        let basis = self.knots.basis_functions(knot_span_index, t, self.degree);
        let mut position = OPoint::<T, D>::origin();
        for i in 0..=self.degree {
            position.coords +=
                &self.control_points[knot_span_index - self.degree + i].coords * basis[i];
        }
        position
    }

    /// Evaluate the homogeneous derivatives at a given parameter
    fn derivatives(&self, u: T, derivs: usize) -> Vec<OVector<T, D>> {
        let n = self.knots.len() - self.degree - 2;

        let du = if derivs < self.degree {
            derivs
        } else {
            self.degree
        };
        let mut derivatives = vec![OVector::<T, D>::zeros(); derivs + 1];

        let knot_span_index = self.knots.find_knot_span_index(n, self.degree, u);
        let nders = self
            .knots
            .derivative_basis_functions(knot_span_index, u, self.degree, du);
        for k in 0..=du {
            for j in 0..=self.degree {
                let w = &self.control_points[knot_span_index - self.degree + j] * nders[k][j];
                let column = derivatives.get_mut(k).unwrap();
                w.coords.iter().enumerate().for_each(|(i, v)| {
                    column[i] += *v;
                });
            }
        }

        derivatives
    }

    /// Check if the curve is clamped
    pub fn is_clamped(&self) -> bool {
        self.knots.is_clamped(self.degree)
    }

    /// Try to add a knot to the curve without changing its shape
    pub fn try_add_knot(&mut self, knot: T) -> Result<()> {
        if knot < self.knots[0] || knot > self.knots[self.knots.len() - 1] {
            return Err(Error::InvalidInput(
                "knot is outside of the knot vector".to_string(),
            ));
        }

        let k = self.degree;
        let n = self.control_points.len();
        let idx = self.knots.add(knot);
        let start = if idx > k { idx - k } else { 0 };
        let end = if idx > n {
            self.control_points
                .push(self.control_points.last().unwrap().clone());
            n + 1
        } else {
            self.control_points
                .insert(idx - 1, self.control_points[idx - 1].clone());
            idx
        };

        for i in start..end {
            let i0 = end + start - i - 1;
            let delta = self.knots[i0 + k + 1] - self.knots[i0];
            let inv = if delta != T::zero() {
                T::one() / delta
            } else {
                T::zero()
            };
            let a = (self.knots[idx] - self.knots[i0]) * inv;
            let delta_control_point = if i0 == 0 {
                self.control_points[i0].coords.clone_owned()
            } else if i0 == self.control_points.len() {
                -self.control_points[i0 - 1].coords.clone_owned()
            } else {
                &self.control_points[i0] - &self.control_points[i0 - 1]
            };
            let p = delta_control_point * (T::one() - a);
            self.control_points[i0].coords -= p;
        }

        Ok(())
    }

    /// Try to refine the curve by inserting a sorted list of knots
    pub fn try_refine_knot(&mut self, knots_to_insert: Vec<T>) -> Result<()> {
        if !self.is_clamped() {
            return Err(Error::InvalidInput(
                "curve must be clamped to refine knots".to_string(),
            ));
        }

        if knots_to_insert.is_empty() {
            return Ok(());
        }

        let degree = self.degree;
        let control_points = &self.control_points;

        let n = control_points.len() - 1;
        let m = n + degree + 1;
        let r = knots_to_insert.len() - 1;
        let a = self
            .knots
            .find_knot_span_index(n, degree, knots_to_insert[0]);
        let b = self
            .knots
            .find_knot_span_index(n, degree, knots_to_insert[r])
            + 1;

        let mut control_points_post = vec![OPoint::<T, D>::origin(); n + r + 2];
        let mut knots_post = vec![T::zero(); m + 1 + r + 1];

        control_points_post[..((a - degree) + 1)]
            .clone_from_slice(&control_points[..((a - degree) + 1)]);
        for i in (b - 1)..=n {
            control_points_post[i + r + 1] = control_points[i].clone();
        }

        for i in 0..=a {
            knots_post[i] = self.knots[i];
        }
        for i in (b + degree)..=m {
            knots_post[i + r + 1] = self.knots[i];
        }

        let mut i = b + degree - 1;
        let mut k = b + degree + r;

        for j in (0..=r).rev() {
            while knots_to_insert[j] <= self.knots[i] && i > a {
                control_points_post[k - degree - 1] = control_points[i - degree - 1].clone();
                knots_post[k] = self.knots[i];
                k -= 1;
                i -= 1;
            }
            control_points_post[k - degree - 1] = control_points_post[k - degree].clone();
            for l in 1..=degree {
                let ind = k - degree + l;
                let alpha = knots_post[k + l] - knots_to_insert[j];
                if alpha.abs() < T::default_epsilon() {
                    control_points_post[ind - 1] = control_points_post[ind].clone();
                } else {
                    let denom = knots_post[k + l] - self.knots[i - degree + l];
                    let weight = if denom != T::zero() {
                        alpha / denom
                    } else {
                        T::zero()
                    };
                    control_points_post[ind - 1] = OPoint::from(
                        control_points_post[ind - 1]
                            .coords
                            .lerp(&control_points_post[ind].coords, T::one() - weight),
                    );
                }
            }
            knots_post[k] = knots_to_insert[j];
            k -= 1;
        }

        self.knots = KnotVector::new(knots_post);
        self.control_points = control_points_post;

        Ok(())
    }

    /// Try to remove the knot `u` up to `times` times.
    /// A removal is only applied when the curve deviation it causes stays
    /// below `tolerance`; returns the number of removals actually performed.
    pub fn try_remove_knot(&mut self, u: T, times: usize, tolerance: T) -> Result<usize> {
        let degree = self.degree;
        let n = self.control_points.len() - 1;
        let m = n + degree + 1;

        let eps = T::from_f64(1e-10).unwrap();
        let r = match self.knots.iter().rposition(|k| (*k - u).abs() <= eps) {
            Some(r) => r,
            None => {
                return Err(Error::InvalidInput(
                    "knot to remove is not present".to_string(),
                ))
            }
        };
        let s = self.knots.iter().filter(|k| (**k - u).abs() <= eps).count();
        let (start, end) = self.knots_domain();
        if (u - start).abs() <= eps || (u - end).abs() <= eps {
            return Err(Error::InvalidInput(
                "cannot remove a boundary knot".to_string(),
            ));
        }

        let ord = degree + 1;
        let fout = (2 * r - s - degree) / 2;
        let mut first = r - degree;
        let mut last = r - s;

        let mut ctrl = self.control_points.clone();
        let knots = &self.knots;

        let mut t = 0;
        while t < times {
            let off = first - 1;
            let mut temp = vec![OPoint::<T, D>::origin(); last + 2 - off];
            temp[0] = ctrl[off].clone();
            temp[last + 1 - off] = ctrl[last + 1].clone();

            let mut i = first;
            let mut j = last;
            let mut ii = 1;
            let mut jj = last - off;
            let mut removable = false;

            while j as isize - i as isize > t as isize {
                let alfi = (u - knots[i]) / (knots[i + ord + t] - knots[i]);
                let alfj = (u - knots[j - t]) / (knots[j + ord] - knots[j - t]);
                temp[ii] = OPoint::from(
                    (&ctrl[i].coords - &temp[ii - 1].coords * (T::one() - alfi)) / alfi,
                );
                temp[jj] = OPoint::from(
                    (&ctrl[j].coords - &temp[jj + 1].coords * alfj) / (T::one() - alfj),
                );
                i += 1;
                ii += 1;
                j -= 1;
                jj -= 1;
            }

            if (j as isize - i as isize) < t as isize {
                let d = (&temp[ii - 1].coords - &temp[jj + 1].coords).norm();
                if d <= tolerance {
                    removable = true;
                }
            } else {
                let alfi = (u - knots[i]) / (knots[i + ord + t] - knots[i]);
                let blend = &temp[ii + t + 1].coords * alfi
                    + &temp[ii - 1].coords * (T::one() - alfi);
                let d = (&ctrl[i].coords - blend).norm();
                if d <= tolerance {
                    removable = true;
                }
            }

            if !removable {
                break;
            }

            let mut i = first;
            let mut j = last;
            while j as isize - i as isize > t as isize {
                ctrl[i] = temp[i - off].clone();
                ctrl[j] = temp[j - off].clone();
                i += 1;
                j -= 1;
            }

            first -= 1;
            last += 1;
            t += 1;
        }

        if t == 0 {
            return Ok(0);
        }

        let mut new_knots = self.knots.to_vec();
        for k in (r + 1)..=m {
            new_knots[k - t] = new_knots[k];
        }
        new_knots.truncate(m + 1 - t);

        let mut j = fout;
        let mut i = j;
        for k in 1..t {
            if k % 2 == 1 {
                i += 1;
            } else {
                j -= 1;
            }
        }
        for k in (i + 1)..=n {
            ctrl[j] = ctrl[k].clone();
            j += 1;
        }
        ctrl.truncate(ctrl.len() - t);

        self.knots = KnotVector::new(new_knots);
        self.control_points = ctrl;
        Ok(t)
    }

    /// Try to elevate the degree of the curve
    pub fn try_elevate_degree(&self, target_degree: usize) -> Result<Self> {
        if target_degree <= self.degree {
            return Ok(self.clone());
        }

        let n = self.knots.len() - self.degree - 2;
        let new_degree = self.degree;
        let knots = &self.knots;
        let control_points = &self.control_points;
        let degree_inc = target_degree - self.degree;

        // intermediate values
        let mut bezalfs = vec![vec![T::zero(); new_degree + 1]; new_degree + degree_inc + 1];
        let new_control_point_count = control_points.len() + degree_inc + 3;
        let mut bpts = vec![OPoint::origin(); new_control_point_count];
        let mut e_bpts = vec![OPoint::origin(); new_control_point_count];
        let mut next_bpts = vec![OPoint::origin(); new_control_point_count];

        let m = n + new_degree + 1;
        let ph = target_degree;
        let ph2 = ph / 2;

        let mut q_w: Vec<OPoint<T, D>> = vec![OPoint::origin(); new_control_point_count];
        let mut u_h = vec![T::zero(); q_w.len() + target_degree + 1];

        bezalfs[0][0] = T::one();
        bezalfs[ph][new_degree] = T::one();

        let mut binom = Binomial::new();

        for i in 1..=ph2 {
            let inv = T::one() / binom.get(ph, i);
            let mpi = new_degree.min(i);
            for j in i.saturating_sub(degree_inc)..=mpi {
                bezalfs[i][j] = inv * binom.get(new_degree, j) * binom.get(degree_inc, i - j);
            }
        }

        for i in (ph2 + 1)..ph {
            let mpi = new_degree.min(i);
            for j in i.saturating_sub(degree_inc)..=mpi {
                bezalfs[i][j] = bezalfs[ph - i][new_degree - j];
            }
        }

        let mh = ph;
        let mut kind = ph + 1;
        let mut r: isize = -1;
        let mut a = new_degree;
        let mut b = new_degree + 1;
        let mut cind = 1;
        let mut ua = knots[0];
        q_w[0] = control_points[0].clone();
        for i in 0..=ph {
            u_h[i] = ua;
        }

        bpts[..(new_degree + 1)].clone_from_slice(&control_points[..(new_degree + 1)]);

        while b < m {
            let i = b;
            while b < m && knots[b] == knots[b + 1] {
                b += 1;
            }
            let mul = b - i + 1;
            let _mh = mh + mul + degree_inc;
            let ub = knots[b];
            let oldr = r;
            r = new_degree as isize - mul as isize;
            let lbz = if oldr > 0 {
                ((oldr + 2) / 2) as usize
            } else {
                1
            };
            let rbz = if r > 0 {
                ph - ((r + 1) / 2) as usize
            } else {
                ph
            };
            if r > 0 {
                let numer = ub - ua;
                let mut alfs = vec![T::zero(); new_degree];
                let mut k = new_degree;
                while k > mul {
                    alfs[k - mul - 1] = numer / (knots[a + k] - ua);
                    k -= 1;
                }
                for j in 1..=(r as usize) {
                    let save = (r as usize) - j;
                    let s = mul + j;
                    let mut k = new_degree;
                    while k >= s {
                        bpts[k] = OPoint::from(
                            bpts[k]
                                .coords
                                .lerp(&bpts[k - 1].coords, T::one() - alfs[k - s]),
                        );
                        k -= 1;
                    }
                    next_bpts[save] = bpts[new_degree].clone();
                }
            }

            for i in lbz..=ph {
                e_bpts[i] = OPoint::origin();
                let mpi = new_degree.min(i);
                for j in i.saturating_sub(degree_inc)..=mpi {
                    e_bpts[i].coords = &e_bpts[i].coords + &bpts[j].coords * bezalfs[i][j];
                }
            }

            if oldr > 1 {
                let mut first = kind - 2;
                let mut last = kind;
                let den = ub - ua;
                let bet = (ub - u_h[kind - 1]) / den;
                for tr in 1..oldr {
                    let mut i = first as isize;
                    let mut j = last as isize;
                    let mut kj = j - kind as isize + 1;
                    while j - i > tr {
                        if (i as usize) < cind {
                            let alf = (ub - u_h[i as usize]) / (ua - u_h[i as usize]);
                            q_w[i as usize] = OPoint::from(
                                q_w[i as usize]
                                    .coords
                                    .lerp(&q_w[i as usize - 1].coords, T::one() - alf),
                            );
                        }
                        if j >= lbz as isize {
                            if j - tr <= (kind as isize - ph as isize + oldr) {
                                let gam = (ub - u_h[(j - tr) as usize]) / den;
                                e_bpts[kj as usize] = OPoint::from(
                                    e_bpts[kj as usize]
                                        .coords
                                        .lerp(&e_bpts[kj as usize + 1].coords, T::one() - gam),
                                );
                            }
                        } else {
                            e_bpts[kj as usize] = OPoint::from(
                                e_bpts[kj as usize]
                                    .coords
                                    .lerp(&e_bpts[kj as usize + 1].coords, T::one() - bet),
                            );
                        }
                        i += 1;
                        j -= 1;
                        kj -= 1;
                    }
                    first -= 1;
                    last += 1;
                }
            }

            if a != new_degree {
                for _i in 0..(ph as isize - oldr) {
                    u_h[kind] = ua;
                    kind += 1;
                }
            }

            for j in lbz..=rbz {
                q_w[cind] = e_bpts[j].clone();
                cind += 1;
            }

            if b < m {
                let ur = r as usize;
                bpts[..ur].clone_from_slice(&next_bpts[..ur]);
                for j in ur..=new_degree {
                    bpts[j] = control_points[b - new_degree + j].clone();
                }
                a = b;
                b += 1;
                ua = ub;
            } else {
                for i in 0..=ph {
                    u_h[kind + i] = ub;
                }
            }
        }

        let final_knots = u_h[..(cind + target_degree + 1)].to_vec();
        q_w.truncate(cind);

        Ok(Self {
            degree: target_degree,
            control_points: q_w,
            knots: KnotVector::new(final_knots),
            periodic: false,
        })
    }

    /// Trim the curve into two curves before and after the parameter
    pub fn try_trim(&self, u: T) -> Result<(Self, Self)> {
        let knots_to_insert: Vec<_> = (0..=self.degree).map(|_| u).collect();
        let mut cloned = self.clone();
        cloned.try_refine_knot(knots_to_insert)?;

        let n = self.knots.len() - self.degree - 2;
        let s = self.knots.find_knot_span_index(n, self.degree, u);
        let knots0 = cloned.knots.as_slice()[0..=(s + self.degree + 1)].to_vec();
        let knots1 = cloned.knots.as_slice()[s + 1..].to_vec();
        let cpts0 = cloned.control_points[0..=s].to_vec();
        let cpts1 = cloned.control_points[s + 1..].to_vec();
        Ok((
            Self {
                degree: self.degree,
                control_points: cpts0,
                knots: KnotVector::new(knots0),
                periodic: false,
            },
            Self {
                degree: self.degree,
                control_points: cpts1,
                knots: KnotVector::new(knots1),
                periodic: false,
            },
        ))
    }

    /// Extract the sub-curve over `[t0, t1]`
    pub fn try_segment(&self, t0: T, t1: T) -> Result<Self> {
        if t0 >= t1 {
            return Err(Error::InvalidInput(
                "segment range must be increasing".to_string(),
            ));
        }
        let (start, end) = self.knots_domain();
        let eps = T::from_f64(1e-10).unwrap();
        let mut segment = if t0 > start + eps {
            self.try_trim(t0)?.1
        } else {
            self.clone()
        };
        if t1 < end - eps {
            segment = segment.try_trim(t1)?.0;
        }
        Ok(segment)
    }

    /// Try to clamp knots of the curve.
    /// Multiplexes the start/end part of the knot vector so that both ends
    /// have `degree + 1` multiplicity.
    pub fn try_clamp(&mut self) -> Result<()> {
        let degree = self.degree();

        let start = self.knots.first();
        let end = self.knots.last();
        let multiplicity = self.knots.multiplicity();
        let start_knot_count = multiplicity
            .iter()
            .find(|m| *m.knot() == start)
            .ok_or(Error::KernelFailure("start knot not found".to_string()))?
            .multiplicity();
        let end_knot_count = multiplicity
            .iter()
            .find(|m| *m.knot() == end)
            .ok_or(Error::KernelFailure("end knot not found".to_string()))?
            .multiplicity();

        for _ in start_knot_count..=degree {
            self.try_add_knot(start)?;
        }
        for _ in end_knot_count..=degree {
            self.try_add_knot(end)?;
        }
        self.periodic = false;

        Ok(())
    }

    /// Decompose the curve into Bezier segments
    pub fn try_decompose_bezier_segments(&self) -> Result<Vec<Self>> {
        let mut cloned = self.clone();
        if !cloned.is_clamped() {
            cloned.try_clamp()?;
        }

        let knot_mults = cloned.knots.multiplicity();
        let req_mult = cloned.degree + 1;

        for knot_mult in knot_mults.iter() {
            if knot_mult.multiplicity() < req_mult {
                let knots_insert = vec![*knot_mult.knot(); req_mult - knot_mult.multiplicity()];
                cloned.try_refine_knot(knots_insert)?;
            }
        }

        let div = cloned.knots().len() / req_mult - 1;
        let knot_length = req_mult * 2;
        let mut segments = vec![];

        for i in 0..div {
            let start = i * req_mult;
            let end = start + knot_length;
            let knots = cloned.knots().as_slice()[start..end].to_vec();
            let control_points = cloned.control_points[start..(start + req_mult)].to_vec();
            segments.push(Self {
                degree: self.degree,
                control_points,
                knots: KnotVector::new(knots),
                periodic: false,
            });
        }

        Ok(segments)
    }
}

impl<T: FloatingPoint, D: DimName> NurbsCurve<T, D>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    /// Return the dehomogenized control points
    pub fn dehomogenized_control_points(&self) -> Vec<OPoint<T, DimNameDiff<D, U1>>> {
        self.control_points
            .iter()
            .map(|p| dehomogenize(p).unwrap())
            .collect()
    }

    pub fn weights(&self) -> Vec<T> {
        self.control_points
            .iter()
            .map(|p| p[D::dim() - 1])
            .collect()
    }

    /// Dehomogenized pole at `index`
    pub fn pole_at(&self, index: usize) -> OPoint<T, DimNameDiff<D, U1>> {
        dehomogenize(&self.control_points[index]).unwrap()
    }

    /// Move the pole at `index` keeping its weight
    pub fn set_pole(&mut self, index: usize, point: &OPoint<T, DimNameDiff<D, U1>>) {
        let w = self.control_points[index][D::dim() - 1];
        for i in 0..D::dim() - 1 {
            self.control_points[index][i] = point[i] * w;
        }
    }

    /// Create a degree 1 curve through the given points with chord-length knots
    pub fn polyline(points: &[OPoint<T, DimNameDiff<D, U1>>]) -> Self {
        let mut knots = vec![T::zero(), T::zero()];

        let mut acc = T::zero();
        for i in 0..points.len() - 1 {
            acc += (&points[i + 1] - &points[i]).norm();
            knots.push(acc);
        }
        knots.push(acc);

        let control_points = points
            .iter()
            .map(|p| {
                let mut coords = vec![];
                for i in 0..(D::dim() - 1) {
                    coords.push(p[i]);
                }
                coords.push(T::one());
                OPoint::from_slice(&coords)
            })
            .collect();

        Self {
            degree: 1,
            control_points,
            knots: KnotVector::new(knots),
            periodic: false,
        }
    }

    /// Evaluate the curve at a given parameter to get a dehomogenized point
    pub fn point_at(&self, t: T) -> OPoint<T, DimNameDiff<D, U1>> {
        let p = self.point(t);
        dehomogenize(&p).unwrap()
    }

    /// First point of the curve at the start of its domain
    pub fn first_point(&self) -> OPoint<T, DimNameDiff<D, U1>> {
        self.point_at(self.knots_domain().0)
    }

    /// Last point of the curve at the end of its domain
    pub fn last_point(&self) -> OPoint<T, DimNameDiff<D, U1>> {
        self.point_at(self.knots_domain().1)
    }

    /// Whether both curve ends coincide within `tolerance`
    pub fn is_closed(&self, tolerance: T) -> bool {
        (self.first_point() - self.last_point()).norm() <= tolerance
    }

    /// Evaluate the curve at a given parameter to get a tangent vector
    pub fn tangent_at(&self, u: T) -> OVector<T, DimNameDiff<D, U1>> {
        let deriv = self.rational_derivatives(u, 1);
        deriv[1].clone()
    }

    /// Evaluate the rational derivatives at a given parameter
    pub fn rational_derivatives(
        &self,
        u: T,
        derivs: usize,
    ) -> Vec<OVector<T, DimNameDiff<D, U1>>> {
        let ders = self.derivatives(u, derivs);
        let a_ders: Vec<_> = ders
            .iter()
            .map(|d| {
                let mut a_ders = vec![];
                for i in 0..D::dim() - 1 {
                    a_ders.push(d[i]);
                }
                OVector::<T, DimNameDiff<D, U1>>::from_vec(a_ders)
            })
            .collect();
        let w_ders: Vec<_> = ders.iter().map(|d| d[D::dim() - 1]).collect();

        let mut ck = vec![];
        let mut binom = Binomial::<T>::new();
        for k in 0..=derivs {
            let mut v = a_ders[k].clone();

            for i in 1..=k {
                let coef = binom.get(k, i) * w_ders[i];
                v -= &ck[k - i] * coef;
            }

            let dehom = v / w_ders[0];
            ck.push(dehom);
        }
        ck
    }

    /// Sample the curve at a given number of points between the start and end parameters
    pub fn sample_regular_range(
        &self,
        start: T,
        end: T,
        samples: usize,
    ) -> Vec<OPoint<T, DimNameDiff<D, U1>>> {
        let mut points = vec![];
        let us = T::from_usize(samples).unwrap();
        let step = (end - start) / (us - T::one());
        for i in 0..samples {
            let t = start + T::from_usize(i).unwrap() * step;
            points.push(self.point_at(t));
        }
        points
    }

    #[allow(clippy::type_complexity)]
    /// Sample the curve at a given number of points between the start and end
    /// Return the vector of tuples of parameter and point
    pub fn sample_regular_range_with_parameter(
        &self,
        start: T,
        end: T,
        samples: usize,
    ) -> Vec<(T, OPoint<T, DimNameDiff<D, U1>>)> {
        let mut points = vec![];
        let us = T::from_usize(samples).unwrap();
        let step = (end - start) / (us - T::one());
        for i in 0..samples {
            let t = start + T::from_usize(i).unwrap() * step;
            points.push((t, self.point_at(t)));
        }
        points
    }

    /// Tessellate the curve using an adaptive algorithm,
    /// subdividing where the curve is not locally flat
    pub fn tessellate(&self, tolerance: Option<T>) -> Vec<OPoint<T, DimNameDiff<D, U1>>> {
        if self.degree == 1 {
            return self.dehomogenized_control_points();
        }

        let mut rng = rand::rng();
        let tol = tolerance.unwrap_or(T::from_f64(1e-3).unwrap());
        let (start, end) = self.knots_domain();
        self.tessellate_adaptive(start, end, tol, &mut rng)
    }

    /// Tessellate the curve with parameters using an adaptive algorithm
    pub fn tessellate_with_parameter(
        &self,
        tolerance: Option<T>,
    ) -> Vec<(T, OPoint<T, DimNameDiff<D, U1>>)> {
        let (start, end) = self.knots_domain();
        if self.degree == 1 {
            let points = self.dehomogenized_control_points();
            return points
                .into_iter()
                .enumerate()
                .map(|(i, p)| (self.knots[i + 1], p))
                .collect();
        }
        let mut rng = rand::rng();
        let tol = tolerance.unwrap_or(T::from_f64(1e-3).unwrap());
        self.tessellate_adaptive_with_parameter(start, end, tol, &mut rng)
    }

    fn tessellate_adaptive(
        &self,
        start: T,
        end: T,
        tol: T,
        rng: &mut ThreadRng,
    ) -> Vec<OPoint<T, DimNameDiff<D, U1>>> {
        self.tessellate_adaptive_with_parameter(start, end, tol, rng)
            .into_iter()
            .map(|(_, p)| p)
            .collect()
    }

    /// Subdivide recursively with a jittered midpoint probe;
    /// if the span between [start ~ end] is flat enough, keep only the end points
    fn tessellate_adaptive_with_parameter(
        &self,
        start: T,
        end: T,
        tol: T,
        rng: &mut ThreadRng,
    ) -> Vec<(T, OPoint<T, DimNameDiff<D, U1>>)> {
        let p1 = self.point_at(start);
        let p3 = self.point_at(end);

        let t = 0.5_f64 + 0.2_f64 * rng.random::<f64>();
        let delta = end - start;
        if delta < T::from_f64(1e-8).unwrap() {
            return vec![(start, p1)];
        }

        let mid = start + delta * T::from_f64(t).unwrap();
        let p2 = self.point_at(mid);

        let diff = &p1 - &p3;
        let diff2 = &p1 - &p2;
        if (diff.dot(&diff) < tol && diff2.dot(&diff2) > tol)
            || !three_points_are_flat(&p1, &p2, &p3, tol)
        {
            let exact_mid = start + (end - start) * T::from_f64(0.5).unwrap();
            let mut left_pts =
                self.tessellate_adaptive_with_parameter(start, exact_mid, tol, rng);
            let right_pts = self.tessellate_adaptive_with_parameter(exact_mid, end, tol, rng);
            left_pts.pop();
            [left_pts, right_pts].concat()
        } else {
            vec![(start, p1), (end, p3)]
        }
    }

    /// Compute the total arc length by Gauss-Legendre quadrature
    pub fn try_length(&self) -> Result<T> {
        let (_, end) = self.knots_domain();
        self.try_length_at(end)
    }

    /// Arc length from the start of the domain up to `t`
    pub fn try_length_at(&self, t: T) -> Result<T> {
        let gauss = GaussLegendre::new(16 + self.degree).unwrap();
        let (start, end) = self.knots_domain();
        if t <= start {
            return Ok(T::zero());
        }
        let t = t.min(end);

        // integrate span by span so knot discontinuities stay on quadrature boundaries
        let mut sum = T::zero();
        let mut prev = start;
        for m in self.knots.multiplicity().iter() {
            let k = *m.knot();
            if k <= prev + T::default_epsilon() {
                continue;
            }
            let upper = k.min(t);
            if upper <= prev {
                break;
            }
            sum += self.integrate_span(prev, upper, &gauss);
            prev = k;
            if prev >= t {
                break;
            }
        }
        Ok(sum)
    }

    fn integrate_span(&self, a: T, b: T, gauss: &GaussLegendre) -> T {
        let left = a.to_f64().unwrap();
        let right = b.to_f64().unwrap();
        let sum = gauss.integrate(left, right, |x| {
            let x = T::from_f64(x).unwrap();
            let deriv = self.rational_derivatives(x, 1);
            let tan = deriv[1].norm();
            tan.to_f64().unwrap()
        });
        T::from_f64(sum).unwrap()
    }

    /// Find the parameter at a given arc length by bisection.
    /// The search is bounded at 64 halvings and fails with
    /// [`Error::TrimNonConverged`] when the budget is exhausted.
    pub fn try_parameter_at_length(&self, length: T, tolerance: T) -> Result<T> {
        let total = self.try_length()?;
        let (k0, k1) = self.knots_domain();
        if length <= T::zero() {
            return Ok(k0);
        }
        if length >= total {
            return Ok(k1);
        }

        let eps = T::from_f64(1e-12).unwrap();
        let inv = T::from_f64(0.5).unwrap();
        let mut start = (k0, T::zero());
        let mut end = (k1, total);

        for _ in 0..64 {
            let mid_param = (start.0 + end.0) * inv;
            let mid_len = self.try_length_at(mid_param)?;
            if (mid_len - length).abs() < tolerance || (end.0 - start.0) < eps {
                return Ok(mid_param);
            }
            if mid_len > length {
                end = (mid_param, mid_len);
            } else {
                start = (mid_param, mid_len);
            }
        }
        Err(Error::TrimNonConverged)
    }

    /// Find the parameter of the closest point on the curve to a given point,
    /// seeded by regular sampling and polished with a damped Newton iteration.
    pub fn find_closest_parameter(&self, point: &OPoint<T, DimNameDiff<D, U1>>) -> Result<T> {
        let (min_u, max_u) = self.knots_domain();
        let samples = (self.control_points.len() * self.degree).max(8);
        let pts = self.sample_regular_range_with_parameter(min_u, max_u, samples);

        let mut min = <T as nalgebra::RealField>::max_value().unwrap();
        let mut u = min_u;

        let closed = self.is_closed(T::default_epsilon());

        for i in 0..pts.len() - 1 {
            let u0 = pts[i].0;
            let u1 = pts[i + 1].0;

            let p0 = &pts[i].1;
            let p1 = &pts[i + 1].1;

            // closest point on the sampled chord
            let dir = p1 - p0;
            let denom = dir.dot(&dir);
            let f = if denom <= T::default_epsilon() {
                T::zero()
            } else {
                ((point - p0).dot(&dir) / denom).clamp(T::zero(), T::one())
            };
            let proj = p0 + &dir * f;
            let d = (point - &proj).norm();

            if d < min {
                min = d;
                u = u0 + (u1 - u0) * f;
            }
        }

        let mut cu = u;
        let eps = T::default_epsilon();
        for _ in 0..12 {
            let e = self.rational_derivatives(cu, 2);
            let dif = &e[0] - &point.coords;

            let c1v = dif.norm();
            let c2n = e[1].dot(&dif);
            let c2d = e[1].norm() * c1v;
            let c2v = if c2d > eps { c2n / c2d } else { T::zero() };

            if c1v < eps || c2v.abs() < eps {
                return Ok(cu);
            }

            let f = c2n;
            let s0 = e[2].dot(&dif);
            let s1 = e[1].dot(&e[1]);
            let df = s0 + s1;
            if df.abs() <= eps {
                return Ok(cu);
            }
            let mut ct = cu - f / df;

            if ct < min_u {
                ct = if closed { max_u - (ct - min_u) } else { min_u };
            } else if ct > max_u {
                ct = if closed { min_u + (ct - max_u) } else { max_u };
            }

            let c3v = (&e[1] * (ct - cu)).norm();
            if c3v < eps {
                return Ok(cu);
            }

            cu = ct;
        }
        Ok(cu)
    }

    /// Elevate the dimension of the curve (e.g. 2D -> 3D)
    pub fn elevate_dimension(&self) -> NurbsCurve<T, DimNameSum<D, U1>>
    where
        D: DimNameAdd<U1>,
        DefaultAllocator: Allocator<DimNameSum<D, U1>>,
    {
        let mut control_points = vec![];
        for p in self.control_points.iter() {
            let mut coords = vec![];
            for i in 0..(D::dim() - 1) {
                coords.push(p[i]);
            }
            coords.push(T::zero());
            coords.push(p[D::dim() - 1]);
            control_points.push(OPoint::from_slice(&coords));
        }

        NurbsCurve {
            control_points,
            degree: self.degree,
            knots: self.knots.clone(),
            periodic: self.periodic,
        }
    }

    /// Apply a mapping to the dehomogenized poles, keeping weights.
    pub fn map_control_points<F>(&self, f: F) -> Self
    where
        F: Fn(&OPoint<T, DimNameDiff<D, U1>>) -> OPoint<T, DimNameDiff<D, U1>>,
    {
        let mut mapped = self.clone();
        for i in 0..self.control_points.len() {
            let p = f(&self.pole_at(i));
            mapped.set_pole(i, &p);
        }
        mapped
    }

    /// Convert a clamped closed curve into a periodic curve.
    /// The first `degree` poles are wrapped and the seam knot drops to
    /// multiplicity one; the shape may change near the seam when the input
    /// was not smooth there.
    pub fn try_set_periodic(&mut self, tolerance: T) -> Result<()> {
        if self.periodic {
            return Ok(());
        }
        if !self.is_clamped() {
            return Err(Error::InvalidInput(
                "only clamped curves can be made periodic".to_string(),
            ));
        }
        if !self.is_closed(tolerance) {
            return Err(Error::InvalidInput(
                "curve ends do not coincide".to_string(),
            ));
        }
        let p = self.degree;
        let n = self.control_points.len();
        if n <= 2 * p {
            return Err(Error::InvalidInput(
                "too few poles for a periodic conversion".to_string(),
            ));
        }

        let mults = self.knots.multiplicity();
        let distinct: Vec<T> = mults.iter().map(|m| *m.knot()).collect();
        let inner_mults: Vec<usize> = mults[1..mults.len() - 1]
            .iter()
            .map(|m| m.multiplicity())
            .collect();
        let s = distinct.len() - 1;
        let spans: Vec<T> = (0..s).map(|i| distinct[i + 1] - distinct[i]).collect();

        // seam at multiplicity one, interior multiplicities preserved
        let mut core = vec![distinct[0]];
        for (i, m) in inner_mults.iter().enumerate() {
            for _ in 0..*m {
                core.push(distinct[i + 1]);
            }
        }
        core.push(distinct[s]);

        let mut head = vec![];
        let mut acc = distinct[0];
        for i in 0..p {
            acc -= spans[(s + s - 1 - i) % s];
            head.push(acc);
        }
        head.reverse();

        let mut tail = vec![];
        let mut acc = distinct[s];
        for i in 0..p {
            acc += spans[i % s];
            tail.push(acc);
        }

        let knots = [head, core, tail].concat();
        let unique = n - p;
        let mut poles = self.control_points[..unique].to_vec();
        for i in 0..p {
            poles.push(self.control_points[i].clone());
        }

        debug_assert_eq!(knots.len(), poles.len() + p + 1);

        self.knots = KnotVector::new(knots);
        self.control_points = poles;
        self.periodic = true;
        Ok(())
    }

    /// Rotate the origin of a periodic curve forward by `offset` distinct
    /// domain knots.
    pub fn try_set_origin(&mut self, offset: isize) -> Result<()> {
        if !self.periodic {
            return Err(Error::InvalidInput(
                "origin rotation requires a periodic curve".to_string(),
            ));
        }
        let p = self.degree;
        let (a, b) = self.knots_domain();
        let eps = T::from_f64(1e-10).unwrap();

        // distinct knots in [a, b] with their multiplicities
        let mults: Vec<_> = self
            .knots
            .multiplicity()
            .into_iter()
            .filter(|m| *m.knot() >= a - eps && *m.knot() <= b + eps)
            .collect();
        let s = mults.len() - 1;
        if s == 0 {
            return Ok(());
        }
        let k = offset.rem_euclid(s as isize) as usize;
        if k == 0 {
            return Ok(());
        }

        // spans with the multiplicity of the knot closing each span
        let spans: Vec<(T, usize)> = (0..s)
            .map(|i| {
                let len = *mults[i + 1].knot() - *mults[i].knot();
                let m = if i + 1 == s {
                    1
                } else {
                    mults[i + 1].multiplicity()
                };
                (len, m)
            })
            .collect();

        let pole_shift: usize = spans[..k].iter().map(|(_, m)| m).sum();

        let unique = self.control_points.len() - p;
        let mut rotated: Vec<_> = self.control_points[..unique].to_vec();
        rotated.rotate_left(pole_shift % unique);
        for i in 0..p {
            rotated.push(rotated[i].clone());
        }

        let mut core = vec![a];
        let mut acc = a;
        for i in 0..s {
            let (len, m) = spans[(i + k) % s];
            acc += len;
            let m = if i + 1 == s { 1 } else { m };
            for _ in 0..m {
                core.push(acc);
            }
        }

        let mut head = vec![];
        let mut hacc = a;
        for i in 0..p {
            let (len, _) = spans[(s + s - 1 - i + k) % s];
            hacc -= len;
            head.push(hacc);
        }
        head.reverse();

        let mut tail = vec![];
        let mut tacc = core[core.len() - 1];
        for i in 0..p {
            let (len, _) = spans[(i + k) % s];
            tacc += len;
            tail.push(tacc);
        }

        let knots = [head, core, tail].concat();
        debug_assert_eq!(knots.len(), rotated.len() + p + 1);

        self.knots = KnotVector::new(knots);
        self.control_points = rotated;
        Ok(())
    }
}

/// 2D specific queries
impl<T: FloatingPoint> NurbsCurve2D<T> {
    /// Signed curvature at `u`
    pub fn curvature_at(&self, u: T) -> Result<T> {
        let ders = self.rational_derivatives(u, 2);
        let d1 = &ders[1];
        let d2 = &ders[2];
        let speed = d1.norm();
        if speed <= T::default_epsilon() {
            return Err(Error::GeometricDegeneracy(
                "zero-length tangent".to_string(),
            ));
        }
        let cross = d1.x * d2.y - d1.y * d2.x;
        Ok(cross / (speed * speed * speed))
    }

    /// In-plane normal at `u`: the tangent rotated a quarter turn counter-clockwise
    pub fn normal_at_2d(&self, u: T) -> Result<Vector2<T>> {
        let tangent = self.tangent_at(u);
        let norm = tangent.norm();
        if norm <= T::default_epsilon() {
            return Err(Error::GeometricDegeneracy(
                "zero-length tangent".to_string(),
            ));
        }
        Ok(Vector2::new(-tangent.y / norm, tangent.x / norm))
    }
}

/// 3D specific queries
impl<T: FloatingPoint> NurbsCurve3D<T> {
    /// Curvature magnitude at `u`
    pub fn curvature_at(&self, u: T) -> Result<T> {
        let ders = self.rational_derivatives(u, 2);
        let d1 = &ders[1];
        let d2 = &ders[2];
        let speed = d1.norm();
        if speed <= T::default_epsilon() {
            return Err(Error::GeometricDegeneracy(
                "zero-length tangent".to_string(),
            ));
        }
        Ok(d1.cross(d2).norm() / (speed * speed * speed))
    }

    /// Principal normal at `u`, failing on straight spans
    pub fn principal_normal_at(&self, u: T) -> Result<nalgebra::Vector3<T>> {
        let ders = self.rational_derivatives(u, 2);
        let d1 = &ders[1];
        let d2 = &ders[2];
        let binormal = d1.cross(d2);
        if binormal.norm() <= T::default_epsilon() {
            return Err(Error::GeometricDegeneracy(
                "curvature query on a straight span".to_string(),
            ));
        }
        Ok(binormal.cross(d1).normalize())
    }
}

impl<T: FloatingPoint, D: DimName> Invertible for NurbsCurve<T, D>
where
    DefaultAllocator: Allocator<D>,
{
    /// Reverse the direction of the curve
    /// # Example
    /// ```
    /// use raccordo::prelude::*;
    /// use nalgebra::Point2;
    /// use approx::assert_relative_eq;
    /// let points = vec![
    ///     Point2::new(0.0, 0.0),
    ///     Point2::new(1.0, 0.0),
    ///     Point2::new(1.0, 1.0),
    ///     Point2::new(0.0, 1.0),
    /// ];
    /// let mut curve = NurbsCurve2D::try_interpolate(&points, 3).unwrap();
    /// curve.invert();
    /// let (start, end) = curve.knots_domain();
    /// assert_relative_eq!(curve.point_at(start), points[points.len() - 1]);
    /// assert_relative_eq!(curve.point_at(end), points[0]);
    /// ```
    fn invert(&mut self) {
        self.control_points.reverse();
        self.knots.invert();
    }
}

/// Dehomogenize a point
pub fn dehomogenize<T: FloatingPoint, D: DimName>(
    point: &OPoint<T, D>,
) -> Option<OPoint<T, DimNameDiff<D, U1>>>
where
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<D>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    let v = &point.coords;
    let idx = D::dim() - 1;
    let w = v[idx];
    if w != T::zero() {
        let coords =
            v.generic_view((0, 0), (<D as DimNameSub<U1>>::Output::name(), Const::<1>)) / w;
        Some(OPoint { coords })
    } else {
        None
    }
}

/// Homogenize a point with a weight
pub fn homogenize<T: FloatingPoint>(point: &Point3<T>, weight: T) -> nalgebra::Point4<T> {
    nalgebra::Point4::new(
        point.x * weight,
        point.y * weight,
        point.z * weight,
        weight,
    )
}

/// Flatness test used by the adaptive tessellation
pub fn three_points_are_flat<T: FloatingPoint, D: DimName>(
    p1: &OPoint<T, D>,
    p2: &OPoint<T, D>,
    p3: &OPoint<T, D>,
    tolerance: T,
) -> bool
where
    DefaultAllocator: Allocator<D>,
{
    // twice the triangle area against the squared base length
    let v1 = p2 - p1;
    let v2 = p3 - p1;

    let norm1 = v1.norm_squared();
    let norm2 = v2.norm_squared();
    let dot = v1.dot(&v2);
    let cross_sq = norm1 * norm2 - dot * dot;
    let area_sq = cross_sq / T::from_f64(4.0).unwrap();
    let base_sq = norm1;
    area_sq <= tolerance * base_sq * base_sq
}

#[cfg(feature = "serde")]
impl<T, D: DimName> serde::Serialize for NurbsCurve<T, D>
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
            self.degree,
            &self.knots,
            &self.control_points,
            self.periodic,
        )
            .serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de, T, D: DimName> serde::Deserialize<'de> for NurbsCurve<T, D>
where
    T: FloatingPoint + serde::Deserialize<'de>,
    DefaultAllocator: Allocator<D>,
    OPoint<T, D>: serde::Deserialize<'de>,
{
    fn deserialize<De>(deserializer: De) -> std::result::Result<Self, De::Error>
    where
        De: serde::Deserializer<'de>,
    {
        let (degree, knots, control_points, periodic) =
            <(usize, KnotVector<T>, Vec<OPoint<T, D>>, bool)>::deserialize(deserializer)?;
        Ok(Self {
            degree,
            knots,
            control_points,
            periodic,
        })
    }
}
