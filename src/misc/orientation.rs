use nalgebra::Point2;
use num_traits::NumCast;
use robust::{orient2d, Coord};

use super::FloatingPoint;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Orientation {
    CounterClockwise,
    Clockwise,
    Collinear,
}

/// Robust orientation test for three points.
pub fn orientation<T: FloatingPoint>(p: &Point2<T>, q: &Point2<T>, r: &Point2<T>) -> Orientation {
    let orientation = orient2d(
        Coord {
            x: <f64 as NumCast>::from(p.x).unwrap(),
            y: <f64 as NumCast>::from(p.y).unwrap(),
        },
        Coord {
            x: <f64 as NumCast>::from(q.x).unwrap(),
            y: <f64 as NumCast>::from(q.y).unwrap(),
        },
        Coord {
            x: <f64 as NumCast>::from(r.x).unwrap(),
            y: <f64 as NumCast>::from(r.y).unwrap(),
        },
    );

    if orientation < 0. {
        Orientation::Clockwise
    } else if orientation > 0. {
        Orientation::CounterClockwise
    } else {
        Orientation::Collinear
    }
}

/// Signed area of a closed polygon, positive for counter-clockwise loops.
pub fn signed_area<T: FloatingPoint>(polygon: &[Point2<T>]) -> T {
    let mut sum = T::zero();
    let n = polygon.len();
    for i in 0..n {
        let p = &polygon[i];
        let q = &polygon[(i + 1) % n];
        sum += p.x * q.y - q.x * p.y;
    }
    sum / T::from_f64(2.0).unwrap()
}
