use log::debug;

use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;

use super::Edge;

/// A connected sequence of edges
#[derive(Debug, Clone)]
pub struct Wire<T: FloatingPoint> {
    edges: Vec<Edge<T>>,
    closed: bool,
}

impl<T: FloatingPoint> Wire<T> {
    /// Build a wire from edges that already chain head-to-tail within
    /// `tolerance`.
    pub fn try_new(edges: Vec<Edge<T>>, tolerance: T) -> Result<Self> {
        if edges.is_empty() {
            return Err(Error::TopologyFailure("wire without edges".to_string()));
        }
        for pair in edges.windows(2) {
            let gap = (pair[0].end_point() - pair[1].start_point()).norm();
            if gap > tolerance {
                return Err(Error::TopologyFailure(
                    "wire edges are not connected".to_string(),
                ));
            }
        }
        let closed = (edges[edges.len() - 1].end_point() - edges[0].start_point()).norm()
            <= tolerance;
        Ok(Self { edges, closed })
    }

    pub fn edges(&self) -> &[Edge<T>] {
        &self.edges
    }

    pub fn into_edges(self) -> Vec<Edge<T>> {
        self.edges
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn try_length(&self) -> Result<T> {
        let mut sum = T::zero();
        for e in &self.edges {
            sum += e.try_length()?;
        }
        Ok(sum)
    }

    pub fn reverse(&mut self) {
        self.edges.reverse();
        self.edges.iter_mut().for_each(|e| e.reverse());
    }
}

/// Sort loose edges into connected, consistently oriented sequences.
/// Contact is a squared-distance test between any pairing of endpoints.
pub fn sort_edges<T: FloatingPoint>(edges: Vec<Edge<T>>, tolerance: T) -> Vec<Vec<Edge<T>>> {
    let tol2 = tolerance * tolerance;
    let mut pool: Vec<Edge<T>> = edges;
    let mut groups: Vec<Vec<Edge<T>>> = vec![];

    while let Some(seed) = pool.pop() {
        let mut chain = vec![seed];

        loop {
            let head = chain[0].start_point();
            let tail = chain[chain.len() - 1].end_point();

            let mut attached = false;
            for i in 0..pool.len() {
                let candidate = &pool[i];
                let s = candidate.start_point();
                let e = candidate.end_point();

                if (tail - s).norm_squared() <= tol2 {
                    chain.push(pool.remove(i));
                    attached = true;
                    break;
                } else if (tail - e).norm_squared() <= tol2 {
                    chain.push(pool.remove(i).reversed());
                    attached = true;
                    break;
                } else if (head - e).norm_squared() <= tol2 {
                    chain.insert(0, pool.remove(i));
                    attached = true;
                    break;
                } else if (head - s).norm_squared() <= tol2 {
                    chain.insert(0, pool.remove(i).reversed());
                    attached = true;
                    break;
                }
            }
            if !attached {
                break;
            }
        }
        groups.push(chain);
    }

    debug!("sorted edges into {} groups", groups.len());
    groups
}

/// Sort loose edges and upgrade every connected sequence to a wire.
pub fn edges_to_wires<T: FloatingPoint>(
    edges: Vec<Edge<T>>,
    tolerance: T,
) -> Result<Vec<Wire<T>>> {
    sort_edges(edges, tolerance)
        .into_iter()
        .map(|chain| Wire::try_new(chain, tolerance))
        .collect()
}

#[cfg(test)]
mod tests {
    use nalgebra::Point3;

    use super::*;
    use crate::curve::NurbsCurve3D;

    fn segment(a: [f64; 3], b: [f64; 3]) -> Edge<f64> {
        Edge::new(NurbsCurve3D::polyline(&[
            Point3::new(a[0], a[1], a[2]),
            Point3::new(b[0], b[1], b[2]),
        ]))
    }

    #[test]
    fn shuffled_square_sorts_into_one_closed_wire() {
        let edges = vec![
            segment([0., 0., 0.], [1., 0., 0.]),
            segment([1., 1., 0.], [0., 1., 0.]),
            // reversed on purpose
            segment([1., 1., 0.], [1., 0., 0.]),
            segment([0., 0., 0.], [0., 1., 0.]),
        ];
        let wires = edges_to_wires(edges, 1e-9).unwrap();
        assert_eq!(wires.len(), 1);
        assert!(wires[0].is_closed());
        assert_eq!(wires[0].edges().len(), 4);
    }

    #[test]
    fn distant_edges_form_separate_groups() {
        let edges = vec![
            segment([0., 0., 0.], [1., 0., 0.]),
            segment([5., 0., 0.], [6., 0., 0.]),
        ];
        let groups = sort_edges(edges, 1e-9);
        assert_eq!(groups.len(), 2);
    }
}
