use log::debug;

use crate::misc::FloatingPoint;

use super::FlatWire;

/// Partition closed flat wires into `{outer, inners...}` groups by
/// bounding-box containment.
///
/// Wires with no remaining parent become group outers; wires with exactly
/// one parent are assigned to it. When a pass removes nothing the sort is
/// declared done with whatever remains.
pub struct BoundarySorter<T: FloatingPoint> {
    wires: Vec<FlatWire<T>>,
    parents: Vec<Option<Vec<usize>>>,
    sorted: Vec<Vec<FlatWire<T>>>,
    done: bool,
}

impl<T: FloatingPoint> BoundarySorter<T> {
    pub fn new(wires: Vec<FlatWire<T>>, only_closed: bool) -> Self {
        let mut kept = vec![];
        for w in wires {
            if only_closed && !w.closed {
                debug!("skipping open wire");
                continue;
            }
            kept.push(w);
        }
        let n = kept.len();
        Self {
            wires: kept,
            parents: vec![Some(vec![]); n],
            sorted: vec![vec![]; n],
            done: false,
        }
    }

    fn check_inside(&mut self) {
        for i in 0..self.wires.len() {
            for j in 0..self.wires.len() {
                if i == j {
                    continue;
                }
                let (imin, imax) = self.wires[i].bounding_box();
                let (jmin, jmax) = self.wires[j].bounding_box();
                let contains = jmin.x <= imin.x
                    && jmin.y <= imin.y
                    && imax.x <= jmax.x
                    && imax.y <= jmax.y;
                if contains {
                    if let Some(p) = &mut self.parents[i] {
                        p.push(j);
                    }
                }
            }
        }
    }

    fn sort_pass(&mut self) {
        let mut to_remove = vec![];
        for i in 0..self.parents.len() {
            if let Some(p) = &self.parents[i] {
                if p.is_empty() {
                    to_remove.push(i);
                    let w = self.wires[i].clone();
                    self.sorted[i].push(w);
                    self.parents[i] = None;
                }
            }
        }
        for i in 0..self.parents.len() {
            if let Some(p) = &self.parents[i] {
                if p.len() == 1 {
                    let owner = p[0];
                    to_remove.push(i);
                    let w = self.wires[i].clone();
                    self.sorted[owner].push(w);
                    self.parents[i] = None;
                }
            }
        }
        if to_remove.is_empty() {
            self.done = true;
        } else {
            for p in self.parents.iter_mut().flatten() {
                p.retain(|r| !to_remove.contains(r));
            }
        }
    }

    /// Run the passes and collect the non-empty groups,
    /// each led by its outer wire.
    pub fn sort(mut self) -> Vec<Vec<FlatWire<T>>> {
        self.check_inside();
        while !self.done && self.parents.iter().any(|p| p.is_some()) {
            self.sort_pass();
        }
        self.sorted.into_iter().filter(|g| !g.is_empty()).collect()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Point2;

    use super::*;
    use crate::mapping::{sort_flat_edges, FlatEdge};
    use crate::topology::pcurve_segment;

    fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64) -> FlatWire<f64> {
        let corners = [
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ];
        let edges: Vec<FlatEdge<f64>> = (0..4)
            .map(|i| {
                let a = corners[i];
                let b = corners[(i + 1) % 4];
                FlatEdge::new(pcurve_segment(a, b, 0.0, 1.0), 0.0, 1.0)
            })
            .collect();
        let mut wires = sort_flat_edges(edges, 1e-9);
        assert_eq!(wires.len(), 1);
        wires.pop().unwrap()
    }

    #[test]
    fn hole_is_assigned_to_its_outer() {
        let outer = rectangle(0.0, 0.0, 10.0, 10.0);
        let hole = rectangle(2.0, 2.0, 4.0, 4.0);
        let isolated = rectangle(20.0, 0.0, 22.0, 2.0);

        let groups = BoundarySorter::new(vec![outer, hole, isolated], true).sort();
        assert_eq!(groups.len(), 2);
        let with_hole = groups.iter().find(|g| g.len() == 2).unwrap();
        let (omin, omax) = with_hole[0].bounding_box();
        assert!(omin.x <= 0.0 + 1e-9 && omax.x >= 10.0 - 1e-9);
    }

    #[test]
    fn nested_rings_alternate() {
        let a = rectangle(0.0, 0.0, 10.0, 10.0);
        let b = rectangle(1.0, 1.0, 9.0, 9.0);
        let c = rectangle(2.0, 2.0, 8.0, 8.0);

        let groups = BoundarySorter::new(vec![a, b, c], true).sort();
        // a owns b; c is freed once b is assigned, becoming its own outer
        assert_eq!(groups.len(), 2);
    }
}
