use nalgebra::{Point2, Vector2};

use super::{orientation, FloatingPoint, Orientation};

/// A parameterized line segment in 2D space.
/// The parameter runs linearly from `first` at the start point
/// to `last` at the end point.
#[derive(Debug, Clone, PartialEq)]
pub struct Line<T: FloatingPoint> {
    start: Point2<T>,
    end: Point2<T>,
    first: T,
    last: T,
}

impl<T: FloatingPoint> Line<T> {
    pub fn new(start: Point2<T>, end: Point2<T>) -> Self {
        Self {
            start,
            end,
            first: T::zero(),
            last: T::one(),
        }
    }

    /// Create a segment whose parameter range matches the chord length.
    pub fn with_chord_parameters(start: Point2<T>, end: Point2<T>) -> Self {
        let length = (end - start).norm();
        Self {
            start,
            end,
            first: T::zero(),
            last: length,
        }
    }

    /// Create a segment with an explicit parameter range.
    pub fn with_params(start: Point2<T>, end: Point2<T>, first: T, last: T) -> Self {
        Self {
            start,
            end,
            first,
            last,
        }
    }

    pub fn start(&self) -> &Point2<T> {
        &self.start
    }

    pub fn end(&self) -> &Point2<T> {
        &self.end
    }

    pub fn first_parameter(&self) -> T {
        self.first
    }

    pub fn last_parameter(&self) -> T {
        self.last
    }

    pub fn tangent(&self) -> Vector2<T> {
        self.end - self.start
    }

    pub fn length(&self) -> T {
        self.tangent().norm()
    }

    pub fn point_at(&self, t: T) -> Point2<T> {
        let f = (t - self.first) / (self.last - self.first);
        Point2::from(self.start.coords.lerp(&self.end.coords, f))
    }

    /// Parameter of the closest position on the segment's carrier line.
    pub fn parameter(&self, point: &Point2<T>) -> T {
        let tan = self.tangent();
        let denom = tan.dot(&tan);
        if denom <= T::default_epsilon() {
            return self.first;
        }
        let f = (point - self.start).dot(&tan) / denom;
        self.first + f * (self.last - self.first)
    }

    /// Quick rejection test between two segments using robust predicates.
    pub fn intersects(&self, other: &Line<T>) -> bool {
        let p_q1 = orientation(&self.start, &self.end, &other.start);
        let p_q2 = orientation(&self.start, &self.end, &other.end);
        if matches!(
            (p_q1, p_q2),
            (Orientation::Clockwise, Orientation::Clockwise)
                | (Orientation::CounterClockwise, Orientation::CounterClockwise)
        ) {
            return false;
        }

        let q_p1 = orientation(&other.start, &other.end, &self.start);
        let q_p2 = orientation(&other.start, &other.end, &self.end);
        if matches!(
            (q_p1, q_p2),
            (Orientation::Clockwise, Orientation::Clockwise)
                | (Orientation::CounterClockwise, Orientation::CounterClockwise)
        ) {
            return false;
        }

        !matches!(
            (p_q1, p_q2, q_p1, q_p2),
            (
                Orientation::Collinear,
                Orientation::Collinear,
                Orientation::Collinear,
                Orientation::Collinear
            )
        )
    }

    /// Intersection point between two segments with both parameters,
    /// or `None` when the segments do not cross.
    pub fn intersection(&self, other: &Line<T>) -> Option<(Point2<T>, T, T)> {
        let r = self.tangent();
        let s = other.tangent();
        let denom = r.x * s.y - r.y * s.x;
        if denom.abs() <= T::default_epsilon() {
            return None;
        }
        let qp = other.start - self.start;
        let t = (qp.x * s.y - qp.y * s.x) / denom;
        let u = (qp.x * r.y - qp.y * r.x) / denom;

        let pad = T::from_f64(1e-9).unwrap();
        if t < -pad || t > T::one() + pad || u < -pad || u > T::one() + pad {
            return None;
        }

        let point = Point2::from(self.start.coords + r * t);
        let pt = self.first + t * (self.last - self.first);
        let pu = other.first + u * (other.last - other.first);
        Some((point, pt, pu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_segments() {
        let a = Line::new(Point2::new(-1.0_f64, 0.0), Point2::new(1.0, 0.0));
        let b = Line::new(Point2::new(0.0_f64, -1.0), Point2::new(0.0, 1.0));
        assert!(a.intersects(&b));
        let (p, t, u) = a.intersection(&b).unwrap();
        assert!((p.x).abs() < 1e-12 && (p.y).abs() < 1e-12);
        assert!((t - 0.5).abs() < 1e-12);
        assert!((u - 0.5).abs() < 1e-12);
    }

    #[test]
    fn disjoint_segments() {
        let a = Line::new(Point2::new(0.0_f64, 0.0), Point2::new(1.0, 0.0));
        let b = Line::new(Point2::new(0.0_f64, 1.0), Point2::new(1.0, 1.0));
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_none());
    }
}
