use nalgebra::{Point3, Vector3};

use crate::curve::NurbsCurve3D;
use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;

/// A point of the topology layer
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vertex<T: FloatingPoint> {
    pub point: Point3<T>,
}

impl<T: FloatingPoint> Vertex<T> {
    pub fn new(point: Point3<T>) -> Self {
        Self { point }
    }

    pub fn is_same(&self, other: &Self, tolerance: T) -> bool {
        (self.point - other.point).norm() <= tolerance
    }
}

/// An oriented handle to a curve restricted to a parameter sub-range.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(bound(serialize = "T: serde::Serialize")))]
#[cfg_attr(
    feature = "serde",
    serde(bound(deserialize = "T: serde::Deserialize<'de>"))
)]
pub struct Edge<T: FloatingPoint> {
    curve: NurbsCurve3D<T>,
    first: T,
    last: T,
    reversed: bool,
}

impl<T: FloatingPoint> Edge<T> {
    /// Edge over the curve's whole domain
    pub fn new(curve: NurbsCurve3D<T>) -> Self {
        let (first, last) = curve.knots_domain();
        Self {
            curve,
            first,
            last,
            reversed: false,
        }
    }

    /// Edge over `[first, last]`, which must be increasing and inside the
    /// curve domain
    pub fn with_range(curve: NurbsCurve3D<T>, first: T, last: T) -> Result<Self> {
        if first >= last {
            return Err(Error::InvalidInput(
                "edge range must be increasing".to_string(),
            ));
        }
        let (a, b) = curve.knots_domain();
        let eps = T::from_f64(1e-9).unwrap();
        if first < a - eps || last > b + eps {
            return Err(Error::InvalidInput(
                "edge range exceeds the curve domain".to_string(),
            ));
        }
        Ok(Self {
            curve,
            first,
            last,
            reversed: false,
        })
    }

    pub fn curve(&self) -> &NurbsCurve3D<T> {
        &self.curve
    }

    pub fn first_parameter(&self) -> T {
        self.first
    }

    pub fn last_parameter(&self) -> T {
        self.last
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn reverse(&mut self) {
        self.reversed = !self.reversed;
    }

    pub fn reversed(&self) -> Self {
        let mut e = self.clone();
        e.reverse();
        e
    }

    /// Geometric evaluation, ignoring orientation
    pub fn point_at(&self, t: T) -> Point3<T> {
        self.curve.point_at(t)
    }

    /// Tangent respecting the orientation flag
    pub fn tangent_at(&self, t: T) -> Vector3<T> {
        let tangent = self.curve.tangent_at(t);
        if self.reversed {
            -tangent
        } else {
            tangent
        }
    }

    /// Start point respecting the orientation flag
    pub fn start_point(&self) -> Point3<T> {
        if self.reversed {
            self.curve.point_at(self.last)
        } else {
            self.curve.point_at(self.first)
        }
    }

    /// End point respecting the orientation flag
    pub fn end_point(&self) -> Point3<T> {
        if self.reversed {
            self.curve.point_at(self.first)
        } else {
            self.curve.point_at(self.last)
        }
    }

    pub fn is_closed(&self, tolerance: T) -> bool {
        (self.point_at(self.first) - self.point_at(self.last)).norm() <= tolerance
    }

    /// Arc length of the restricted range
    pub fn try_length(&self) -> Result<T> {
        let to_last = self.curve.try_length_at(self.last)?;
        let to_first = self.curve.try_length_at(self.first)?;
        Ok(to_last - to_first)
    }

    /// Extract the sub-range as a standalone clamped curve
    pub fn try_trimmed_curve(&self) -> Result<NurbsCurve3D<T>> {
        let (a, b) = self.curve.knots_domain();
        let eps = T::from_f64(1e-10).unwrap();
        if self.first <= a + eps && self.last >= b - eps && !self.curve.is_periodic() {
            return Ok(self.curve.clone());
        }
        if self.curve.is_periodic() {
            // clamp a copy before segmenting
            let mut clamped = self.curve.clone();
            clamped.try_clamp()?;
            return clamped.try_segment(self.first, self.last);
        }
        self.curve.try_segment(self.first, self.last)
    }

    /// Geometric equality test by comparing samples in both orientations,
    /// the partnership test of the topology layer
    pub fn is_same(&self, other: &Self, tolerance: T) -> bool {
        let n = 8;
        let mut forward = true;
        let mut backward = true;
        for i in 0..=n {
            let f = T::from_usize(i).unwrap() / T::from_usize(n).unwrap();
            let t0 = self.first + (self.last - self.first) * f;
            let t1 = other.first + (other.last - other.first) * f;
            let t1r = other.last - (other.last - other.first) * f;
            let p0 = self.point_at(t0);
            if (p0 - other.point_at(t1)).norm() > tolerance {
                forward = false;
            }
            if (p0 - other.point_at(t1r)).norm() > tolerance {
                backward = false;
            }
            if !forward && !backward {
                return false;
            }
        }
        forward || backward
    }
}
