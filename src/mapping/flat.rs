use nalgebra::Point2;

use crate::curve::NurbsCurve2D;
use crate::misc::{signed_area, FloatingPoint, Invertible};

/// A pcurve materialized as a flat edge in the source or parameter plane
#[derive(Debug, Clone)]
pub struct FlatEdge<T: FloatingPoint> {
    pub pcurve: NurbsCurve2D<T>,
    pub first: T,
    pub last: T,
    /// the source edge was closed even if the pcurve is not
    pub closed_hint: bool,
}

impl<T: FloatingPoint> FlatEdge<T> {
    pub fn new(pcurve: NurbsCurve2D<T>, first: T, last: T) -> Self {
        Self {
            pcurve,
            first,
            last,
            closed_hint: false,
        }
    }

    pub fn start_point(&self) -> Point2<T> {
        self.pcurve.point_at(self.first)
    }

    pub fn end_point(&self) -> Point2<T> {
        self.pcurve.point_at(self.last)
    }

    pub fn reversed(&self) -> Self {
        let mut pcurve = self.pcurve.clone();
        pcurve.invert();
        let (first, last) = pcurve.knots_domain();
        Self {
            pcurve,
            first,
            last,
            closed_hint: self.closed_hint,
        }
    }

    /// Sampled polyline of the edge
    pub fn polyline(&self, samples: usize) -> Vec<Point2<T>> {
        self.pcurve
            .sample_regular_range(self.first, self.last, samples.max(2))
    }
}

/// A joined sequence of flat edges
#[derive(Debug, Clone)]
pub struct FlatWire<T: FloatingPoint> {
    pub edges: Vec<FlatEdge<T>>,
    pub closed: bool,
}

impl<T: FloatingPoint> FlatWire<T> {
    /// Axis-aligned bounding box of the pole hulls
    pub fn bounding_box(&self) -> (Point2<T>, Point2<T>) {
        let mut min = Point2::new(
            <T as nalgebra::RealField>::max_value().unwrap(),
            <T as nalgebra::RealField>::max_value().unwrap(),
        );
        let mut max = Point2::new(-min.x, -min.y);
        for e in &self.edges {
            for p in e.pcurve.dehomogenized_control_points() {
                min.x = min.x.min(p.x);
                min.y = min.y.min(p.y);
                max.x = max.x.max(p.x);
                max.y = max.y.max(p.y);
            }
        }
        (min, max)
    }

    /// Closed polygonal approximation of the wire
    pub fn polygon(&self, samples_per_edge: usize) -> Vec<Point2<T>> {
        let mut polygon = vec![];
        for e in &self.edges {
            let mut pts = e.polyline(samples_per_edge);
            pts.pop();
            polygon.extend(pts);
        }
        polygon
    }

    /// Whether the wire loops counter-clockwise
    pub fn is_counter_clockwise(&self) -> bool {
        signed_area(&self.polygon(8)) > T::zero()
    }

    pub fn reverse(&mut self) {
        self.edges.reverse();
        self.edges = self.edges.iter().map(|e| e.reversed()).collect();
    }
}

/// Sort loose flat edges into connected sequences by the squared-distance
/// contact test between any pairing of endpoints.
pub fn sort_flat_edges<T: FloatingPoint>(
    edges: Vec<FlatEdge<T>>,
    tolerance: T,
) -> Vec<FlatWire<T>> {
    let tol2 = tolerance * tolerance;
    let mut pool = edges;
    let mut wires = vec![];

    while let Some(seed) = pool.pop() {
        let mut chain = vec![seed];
        loop {
            let head = chain[0].start_point();
            let tail = chain[chain.len() - 1].end_point();

            let mut attached = false;
            for i in 0..pool.len() {
                let s = pool[i].start_point();
                let e = pool[i].end_point();
                if (tail - s).norm_squared() <= tol2 {
                    chain.push(pool.remove(i));
                    attached = true;
                    break;
                } else if (tail - e).norm_squared() <= tol2 {
                    let r = pool.remove(i).reversed();
                    chain.push(r);
                    attached = true;
                    break;
                } else if (head - e).norm_squared() <= tol2 {
                    chain.insert(0, pool.remove(i));
                    attached = true;
                    break;
                } else if (head - s).norm_squared() <= tol2 {
                    let r = pool.remove(i).reversed();
                    chain.insert(0, r);
                    attached = true;
                    break;
                }
            }
            if !attached {
                break;
            }
        }

        let closed = (chain[chain.len() - 1].end_point() - chain[0].start_point())
            .norm_squared()
            <= tol2;
        wires.push(FlatWire {
            edges: chain,
            closed,
        });
    }
    wires
}
