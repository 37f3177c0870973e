use std::ops::Index;

use nalgebra::{convert, RealField};
use simba::scalar::SupersetOf;

use crate::misc::{FloatingPoint, Invertible};

use super::KnotMultiplicity;

/// Knot vector representation
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KnotVector<T>(Vec<T>);

impl<T: RealField + Copy> KnotVector<T> {
    pub fn new(knots: Vec<T>) -> Self {
        Self(knots)
    }

    /// Create a clamped uniform knot vector with `n` interior values
    /// and `degree` end multiplicity on each side.
    /// # Example
    /// ```
    /// use raccordo::prelude::KnotVector;
    /// let knots: KnotVector<f64> = KnotVector::uniform(3, 2);
    /// assert_eq!(knots.to_vec(), vec![0., 0., 0., 1., 2., 2., 2.]);
    /// ```
    pub fn uniform(n: usize, degree: usize) -> Self {
        let mut knots = vec![];
        knots.extend(std::iter::repeat_n(T::zero(), degree));
        for i in 0..n {
            knots.push(T::from_usize(i).unwrap());
        }
        knots.extend(std::iter::repeat_n(T::from_usize(n - 1).unwrap(), degree));
        Self(knots)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.0.clone()
    }

    pub fn first(&self) -> T {
        self.0[0]
    }

    pub fn last(&self) -> T {
        self.0[self.0.len() - 1]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<T> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<T> {
        self.0.iter_mut()
    }

    /// Get the domain of the knot vector by degree
    pub fn domain(&self, degree: usize) -> (T, T) {
        (self.0[degree], self.0[self.0.len() - 1 - degree])
    }

    pub fn clamp_parameter(&self, degree: usize, u: T) -> T {
        let (min, max) = self.domain(degree);
        u.clamp(min, max)
    }

    /// Returns the index of the last knot less than or equal to `knot`
    pub fn floor(&self, knot: T) -> Option<usize> {
        self.iter().rposition(|t| *t <= knot)
    }

    /// Add a knot and return the index of the added knot
    pub fn add(&mut self, knot: T) -> usize {
        match self.floor(knot) {
            Some(idx) => {
                self.0.insert(idx + 1, knot);
                idx + 1
            }
            None => {
                self.0.insert(0, knot);
                0
            }
        }
    }

    /// Get the multiplicity of each distinct knot
    /// # Example
    /// ```
    /// use raccordo::prelude::KnotVector;
    /// let knots = KnotVector::new(vec![0., 0., 0., 1., 2., 3., 3., 3.]);
    /// let mults = knots.multiplicity();
    /// assert_eq!(mults[0].multiplicity(), 3);
    /// assert_eq!(mults[1].multiplicity(), 1);
    /// assert_eq!(mults[2].multiplicity(), 1);
    /// assert_eq!(mults[3].multiplicity(), 3);
    /// ```
    pub fn multiplicity(&self) -> Vec<KnotMultiplicity<T>> {
        let mut mult = vec![];

        let mut current = KnotMultiplicity::new(self.0[0], 0);
        self.0.iter().for_each(|knot| {
            if (*knot - *current.knot()).abs() > T::default_epsilon() {
                mult.push(current.clone());
                current = KnotMultiplicity::new(*knot, 0);
            }
            current.increment_multiplicity();
        });
        mult.push(current);

        mult
    }

    /// Check if the knot vector is clamped,
    /// i.e. the first and last knots have multiplicity greater than the degree.
    pub fn is_clamped(&self, degree: usize) -> bool {
        let multiplicity = self.multiplicity();
        let start = multiplicity.first();
        let end = multiplicity.last();
        match (start, end) {
            (Some(start), Some(end)) => {
                start.multiplicity() > degree && end.multiplicity() > degree
            }
            _ => false,
        }
    }

    /// Find the knot span index by binary search,
    /// clamped at the right endpoint to the last non-empty span.
    ///
    /// # Example
    /// ```
    /// use raccordo::prelude::KnotVector;
    /// let knots = KnotVector::new(vec![0., 0., 0., 1., 2., 3., 3., 3.]);
    /// let idx = knots.find_knot_span_index(4, 2, 2.5);
    /// assert_eq!(idx, 4);
    /// ```
    pub fn find_knot_span_index(&self, n: usize, degree: usize, u: T) -> usize {
        if u > self[n + 1] - T::default_epsilon() {
            return n;
        }

        if u < self[degree] + T::default_epsilon() {
            return degree;
        }

        // binary search
        let mut low = degree;
        let mut high = n + 1;
        let mut mid = (low + high) / 2;
        while u < self[mid] || self[mid + 1] <= u {
            if u < self[mid] {
                high = mid;
            } else {
                low = mid;
            }
            let next = (low + high) / 2;
            if mid == next {
                break;
            }
            mid = next;
        }

        mid
    }

    /// Compute the non-vanishing basis functions at `u`.
    /// A vanishing knot-difference denominator contributes zero, never a division by zero.
    pub fn basis_functions(&self, knot_span_index: usize, u: T, degree: usize) -> Vec<T> {
        let mut basis_functions = vec![T::zero(); degree + 1];
        let mut left = vec![T::zero(); degree + 1];
        let mut right = vec![T::zero(); degree + 1];

        basis_functions[0] = T::one();

        for j in 1..=degree {
            left[j] = u - self[knot_span_index + 1 - j];
            right[j] = self[knot_span_index + j] - u;
            let mut saved = T::zero();

            for r in 0..j {
                let denom = right[r + 1] + left[j - r];
                let temp = if denom.abs() <= T::default_epsilon() {
                    T::zero()
                } else {
                    basis_functions[r] / denom
                };
                basis_functions[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }

            basis_functions[j] = saved;
        }

        basis_functions
    }

    /// Compute the non-vanishing basis functions and their derivatives.
    /// Returns a (n+1) x (degree+1) table whose first row holds the basis
    /// function values and whose k-th row holds the k-th derivatives,
    /// computed with the triangular `ndu` scheme.
    pub fn derivative_basis_functions(
        &self,
        knot_index: usize,
        u: T,
        degree: usize,
        n: usize,
    ) -> Vec<Vec<T>> {
        let mut ndu = vec![vec![T::zero(); degree + 1]; degree + 1];
        let mut left = vec![T::zero(); degree + 1];
        let mut right = vec![T::zero(); degree + 1];

        ndu[0][0] = T::one();

        for j in 1..=degree {
            left[j] = u - self[knot_index + 1 - j];
            right[j] = self[knot_index + j] - u;

            let mut saved = T::zero();
            for r in 0..j {
                // lower triangle
                ndu[j][r] = right[r + 1] + left[j - r];
                let temp = if ndu[j][r].abs() <= T::default_epsilon() {
                    T::zero()
                } else {
                    ndu[r][j - 1] / ndu[j][r]
                };

                // upper triangle
                ndu[r][j] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            ndu[j][j] = saved;
        }

        let mut ders = vec![vec![T::zero(); degree + 1]; n + 1];
        let mut a = vec![vec![T::zero(); degree + 1]; 2];

        // load the basis functions
        for j in 0..=degree {
            ders[0][j] = ndu[j][degree];
        }

        let idegree = degree as isize;
        let n = n as isize;

        // compute the derivatives
        for r in 0..=idegree {
            // alternate rows in array a
            let mut s1 = 0;
            let mut s2 = 1;
            a[0][0] = T::one();

            // loop to compute the kth derivative
            for k in 1..=n {
                let mut d = T::zero();
                let rk = r - k;
                let pk = idegree - k;

                if r >= k {
                    a[s2][0] = a[s1][0] / ndu[(pk + 1) as usize][rk as usize];
                    d = a[s2][0] * ndu[rk as usize][pk as usize];
                }

                let j1 = if rk >= -1 { 1 } else { -rk };
                let j2 = if r - 1 <= pk { k - 1 } else { idegree - r };

                for j in j1..=j2 {
                    a[s2][j as usize] = (a[s1][j as usize] - a[s1][j as usize - 1])
                        / ndu[(pk + 1) as usize][(rk + j) as usize];
                    d += a[s2][j as usize] * ndu[(rk + j) as usize][pk as usize];
                }

                let uk = k as usize;
                let ur = r as usize;
                if r <= pk {
                    a[s2][uk] = -a[s1][(k - 1) as usize] / ndu[(pk + 1) as usize][ur];
                    d += a[s2][uk] * ndu[ur][pk as usize];
                }

                ders[uk][ur] = d;

                // switch rows
                std::mem::swap(&mut s1, &mut s2);
            }
        }

        let mut acc = idegree;
        for k in 1..=n {
            for j in 0..=idegree {
                ders[k as usize][j as usize] *= T::from_isize(acc).unwrap();
            }
            acc *= idegree - k;
        }
        ders
    }

    /// Broadcast the `d`-th derivative of the non-vanishing basis functions
    /// into a full row indexed by pole, with zeros outside the active span.
    /// Derivatives beyond the degree vanish identically.
    pub fn evaluate_basis_row(&self, degree: usize, u: T, d: usize) -> Vec<T> {
        let mut row = vec![T::zero(); self.len() - degree - 1];
        if d > degree {
            return row;
        }
        let n = self.len() - degree - 2;
        let span = self.find_knot_span_index(n, degree, u);
        let ders = self.derivative_basis_functions(span, u, degree, d);
        for (i, val) in ders[d].iter().enumerate() {
            row[span - degree + i] = *val;
        }
        row
    }

    /// Affinely remap all knots so the full vector spans `[min, max]`.
    pub fn remap(&mut self, min: T, max: T) {
        let first = self.first();
        let last = self.last();
        let range = last - first;
        if range.abs() <= T::default_epsilon() {
            return;
        }
        let target = max - min;
        self.0
            .iter_mut()
            .for_each(|k| *k = min + target * (*k - first) / range);
    }

    /// Cast the knot vector to another floating point type
    pub fn cast<F: FloatingPoint + SupersetOf<T>>(&self) -> KnotVector<F> {
        KnotVector::new(self.0.iter().map(|v| convert(*v)).collect())
    }
}

impl<T> Index<usize> for KnotVector<T> {
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<T> FromIterator<T> for KnotVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: FloatingPoint> Invertible for KnotVector<T> {
    /// Reverses the knot vector while keeping its first value and spacing.
    /// # Example
    /// ```
    /// use raccordo::prelude::*;
    /// let mut knot = KnotVector::new(vec![0., 0., 0., 1., 2., 2.5, 3.5, 4.0, 4.0]);
    /// knot.invert();
    ///
    /// let dst = vec![0.0, 0.0, 0.5, 1.5, 2.0, 3.0, 4.0, 4.0, 4.0];
    /// knot.iter().enumerate().for_each(|(i, v)| {
    ///     assert_eq!(*v, dst[i]);
    /// });
    /// ```
    fn invert(&mut self) {
        let min = self.0.first().unwrap();

        let mut next = vec![*min];
        let len = self.len();
        for i in 1..len {
            next.push(next[i - 1] + (self[len - i] - self[len - i - 1]));
        }

        self.0 = next;
    }
}

/// Union of two sorted knot sequences, merging values equal within epsilon.
pub fn sorted_set_union<T: FloatingPoint>(a: &[T], b: &[T]) -> Vec<T> {
    let eps = T::from_f64(1e-10).unwrap();
    let mut merged: Vec<T> = vec![];
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = match (a.get(i), b.get(j)) {
            (Some(&x), Some(&y)) => {
                if (x - y).abs() <= eps {
                    i += 1;
                    j += 1;
                    x
                } else if x < y {
                    i += 1;
                    x
                } else {
                    j += 1;
                    y
                }
            }
            (Some(&x), None) => {
                i += 1;
                x
            }
            (None, Some(&y)) => {
                j += 1;
                y
            }
            (None, None) => break,
        };
        merged.push(next);
    }
    merged
}

/// Values of `a` that are missing from `b`, both sorted.
pub fn sorted_set_sub<T: FloatingPoint>(a: &[T], b: &[T]) -> Vec<T> {
    let eps = T::from_f64(1e-10).unwrap();
    let mut result = vec![];
    let mut j = 0;
    for &x in a {
        while j < b.len() && b[j] < x - eps {
            j += 1;
        }
        if j < b.len() && (b[j] - x).abs() <= eps {
            j += 1;
        } else {
            result.push(x);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::KnotVector;

    const KNOTS: [f64; 10] = [0., 0., 0., 0., 1., 2., 3., 3., 3., 3.];

    #[test]
    fn span_at_right_end_is_clamped() {
        let knots = KnotVector::new(KNOTS.to_vec());
        let n = knots.len() - 3 - 2;
        assert_eq!(knots.find_knot_span_index(n, 3, 3.0), 5);
        assert_eq!(knots.find_knot_span_index(n, 3, 0.0), 3);
        assert_eq!(knots.find_knot_span_index(n, 3, 1.5), 4);
    }

    #[test]
    fn cubic_basis_and_derivatives_at_end() {
        let knots = KnotVector::new(KNOTS.to_vec());
        let span = knots.find_knot_span_index(knots.len() - 5, 3, 3.0);
        let basis = knots.basis_functions(span, 3.0, 3);
        let expected = [0.0, 0.0, 0.0, 1.0];
        for (b, e) in basis.iter().zip(expected.iter()) {
            assert!((b - e).abs() < 1e-12);
        }

        let ders = knots.derivative_basis_functions(span, 3.0, 3, 2);
        let d1 = [0.0, 0.0, -3.0, 3.0];
        let d2 = [0.0, 6.0, -12.0, 6.0];
        for (v, e) in ders[1].iter().zip(d1.iter()) {
            assert!((v - e).abs() < 1e-12);
        }
        for (v, e) in ders[2].iter().zip(d2.iter()) {
            assert!((v - e).abs() < 1e-12);
        }
    }

    #[test]
    fn basis_partition_of_unity() {
        let knots = KnotVector::new(KNOTS.to_vec());
        let n = knots.len() - 5;
        for i in 0..=30 {
            let u = 3.0 * (i as f64) / 30.0;
            let span = knots.find_knot_span_index(n, 3, u);
            let sum: f64 = knots.basis_functions(span, u, 3).iter().sum();
            assert!((sum - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn evaluate_broadcasts_by_pole() {
        let knots = KnotVector::new(KNOTS.to_vec());
        let row0 = knots.evaluate_basis_row(3, 3.0, 0);
        assert_eq!(row0.len(), 6);
        assert!((row0[5] - 1.0).abs() < 1e-12);
        assert!(row0[..5].iter().all(|v| v.abs() < 1e-12));

        let row2 = knots.evaluate_basis_row(3, 3.0, 2);
        assert!((row2[3] - 6.0).abs() < 1e-12);
        assert!((row2[4] + 12.0).abs() < 1e-12);
        assert!((row2[5] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn remap_preserves_relative_spacing() {
        let mut knots = KnotVector::new(KNOTS.to_vec());
        knots.remap(0.0, 1.0);
        assert_eq!(knots.first(), 0.0);
        assert_eq!(knots.last(), 1.0);
        assert!((knots[4] - 1.0 / 3.0).abs() < 1e-12);
    }
}
