use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, DimNameDiff, DimNameSub, U1};

use crate::curve::NurbsCurve;
use crate::errors::{Error, Result};
use crate::knot::KnotVector;
use crate::misc::{FloatingPoint, Invertible};
use crate::surface::try_unify_curve_knot_vectors;

/// Options of the join operation
#[derive(Debug, Clone)]
pub struct JoinOptions<T> {
    pub tolerance: T,
    /// do not fuse across sharp corners
    pub corner_break: bool,
    /// snap the nearer endpoints together when the fuse fails
    pub force_contact: bool,
    /// snap the last pole of the last output curve onto the first pole of the first
    pub force_closed: bool,
    /// reverse every output curve
    pub reverse: bool,
    /// origin rotation of a closed result, in distinct domain knots
    pub start_offset: isize,
    /// extra origin knot at a percentage of the total length
    pub offset_parameter: Option<T>,
}

impl<T: FloatingPoint> Default for JoinOptions<T> {
    fn default() -> Self {
        Self {
            tolerance: T::from_f64(0.01).unwrap(),
            corner_break: false,
            force_contact: true,
            force_closed: false,
            reverse: false,
            start_offset: 0,
            offset_parameter: None,
        }
    }
}

/// Remove interior knots whose multiplicity blocks C1 continuity.
/// A knot is left untouched when its removal would deviate beyond `tol`.
/// Returns true when every interior knot ended below multiplicity `degree`.
pub fn force_c1<T: FloatingPoint, D: DimName>(
    curve: &mut NurbsCurve<T, D>,
    tol: T,
) -> Result<bool>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    let degree = curve.degree();
    let (start, end) = curve.knots_domain();
    let eps = T::from_f64(1e-10).unwrap();

    let interior: Vec<(T, usize)> = curve
        .knots()
        .multiplicity()
        .iter()
        .filter(|m| *m.knot() > start + eps && *m.knot() < end - eps)
        .map(|m| (*m.knot(), m.multiplicity()))
        .collect();

    let mut smooth = true;
    for (knot, mult) in interior {
        if mult >= degree {
            let excess = mult - (degree - 1);
            match curve.try_remove_knot(knot, excess, tol) {
                Ok(removed) if removed >= excess => {}
                _ => {
                    debug!("failed to raise continuity across a corner");
                    smooth = false;
                }
            }
        }
    }
    Ok(smooth)
}

/// Whether the end tangent of `c0` and the start tangent of `c1`
/// point the same way within `tol`.
pub fn aligned_tangents<T: FloatingPoint, D: DimName>(
    c0: &NurbsCurve<T, D>,
    c1: &NurbsCurve<T, D>,
    tol: T,
) -> bool
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    let t0 = c0.tangent_at(c0.knots_domain().1);
    let t1 = c1.tangent_at(c1.knots_domain().0);
    let n0 = t0.norm();
    let n1 = t1.norm();
    if n0 <= T::default_epsilon() || n1 <= T::default_epsilon() {
        return false;
    }
    ((t0 / n0) - (t1 / n1)).norm() < tol
}

/// Fuse two clamped curves whose matching endpoints already touch
/// within `tol`. The curves are reoriented as needed; the junction keeps
/// C0 multiplicity which `force_c1` may later reduce.
pub fn join_pair<T: FloatingPoint, D: DimName>(
    c0: &NurbsCurve<T, D>,
    c1: &NurbsCurve<T, D>,
    tol: T,
) -> Result<NurbsCurve<T, D>>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    if !c0.is_clamped() || !c1.is_clamped() {
        return Err(Error::InvalidInput(
            "join requires clamped curves".to_string(),
        ));
    }

    let d1 = (c0.last_point() - c1.first_point()).norm();
    let d2 = (c0.last_point() - c1.last_point()).norm();
    let d3 = (c0.first_point() - c1.first_point()).norm();
    let d4 = (c0.first_point() - c1.last_point()).norm();
    let min = d1.min(d2).min(d3).min(d4);
    if min > tol {
        return Err(Error::KernelFailure(
            "curve endpoints do not touch".to_string(),
        ));
    }

    let (head, tail) = if min == d1 {
        (c0.clone(), c1.clone())
    } else if min == d2 {
        (c0.clone(), c1.inverse())
    } else if min == d3 {
        (c0.inverse(), c1.clone())
    } else {
        (c1.clone(), c0.clone())
    };

    fuse(&head, &tail)
}

fn fuse<T: FloatingPoint, D: DimName>(
    head: &NurbsCurve<T, D>,
    tail: &NurbsCurve<T, D>,
) -> Result<NurbsCurve<T, D>>
where
    DefaultAllocator: Allocator<D>,
{
    // common degree first
    let degree = head.degree().max(tail.degree());
    let head = head.try_elevate_degree(degree)?;
    let mut tail = tail.try_elevate_degree(degree)?;

    // shift the tail domain to continue the head domain
    let join_at = head.knots().last();
    let offset = join_at - tail.knots().first();
    tail.knots_mut().iter_mut().for_each(|k| *k += offset);

    let mut knots = head.knots().as_slice()[..head.knots().len() - 1].to_vec();
    knots.extend_from_slice(&tail.knots().as_slice()[degree + 1..]);

    let mut poles = head.control_points().clone();
    poles.extend_from_slice(&tail.control_points()[1..]);

    if knots.len() != poles.len() + degree + 1 {
        return Err(Error::KernelFailure("curve fuse failed".to_string()));
    }

    Ok(NurbsCurve::new_unchecked(
        degree,
        poles,
        KnotVector::new(knots),
    ))
}

/// Four-way endpoint distance test: snap the nearer endpoint pole of `c1`
/// onto the nearer endpoint pole of `c0`, then retry the fuse.
pub fn force_join<T: FloatingPoint, D: DimName>(
    c0: &NurbsCurve<T, D>,
    c1: &NurbsCurve<T, D>,
    tol: T,
) -> Result<NurbsCurve<T, D>>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    let p1 = c0.pole_at(0);
    let p2 = c0.pole_at(c0.pole_count() - 1);
    let q1 = c1.pole_at(0);
    let q2 = c1.pole_at(c1.pole_count() - 1);

    let d1 = (&p1 - &q1).norm();
    let d2 = (&p1 - &q2).norm();
    let d3 = (&p2 - &q1).norm();
    let d4 = (&p2 - &q2).norm();
    let min = d1.min(d2).min(d3).min(d4);

    let mut snapped = c1.clone();
    let last = c1.pole_count() - 1;
    if min == d1 {
        snapped.set_pole(0, &p1);
    } else if min == d2 {
        snapped.set_pole(last, &p1);
    } else if min == d3 {
        snapped.set_pole(0, &p2);
    } else {
        snapped.set_pole(last, &p2);
    }

    let r = join_pair(c0, &snapped, min + tol + T::default_epsilon());
    match &r {
        Ok(_) => debug!("gap detected, successfully fixed"),
        Err(_) => debug!("failed to fix gap"),
    }
    r
}

/// Fold `join_pair` across a list of curves.
///
/// Breakpoints are introduced on sharp corners (`corner_break`), on fuse
/// failures without `force_contact`, and where raising continuity to C1
/// fails with `corner_break` set. A closed single result is promoted to a
/// periodic curve with optional origin control.
pub fn join<T: FloatingPoint, D: DimName>(
    curves: &[NurbsCurve<T, D>],
    options: &JoinOptions<T>,
) -> Result<Vec<NurbsCurve<T, D>>>
where
    DefaultAllocator: Allocator<D>,
    D: DimNameSub<U1>,
    DefaultAllocator: Allocator<DimNameDiff<D, U1>>,
{
    if curves.is_empty() {
        return Err(Error::InvalidInput("no curves to join".to_string()));
    }

    let tol = options.tolerance;
    let mut c0 = curves[0].clone();
    let mut out: Vec<NurbsCurve<T, D>> = vec![];

    for (n, c) in curves[1..].iter().enumerate() {
        debug!("joining curves {} and {}", n + 1, n + 2);
        let before_join = c0.clone();

        if !aligned_tangents(&c0, c, tol) && options.corner_break {
            out.push(c0);
            c0 = c.clone();
            debug!("no tangency, adding breakpoint");
            continue;
        }

        let joined = match join_pair(&c0, c, tol) {
            Ok(j) => Some(j),
            Err(_) if options.force_contact => force_join(&c0, c, tol).ok(),
            Err(_) => None,
        };

        match joined {
            Some(j) => {
                c0 = j;
                let smooth = force_c1(&mut c0, tol)?;
                if !smooth && options.corner_break {
                    out.push(before_join);
                    c0 = c.clone();
                    debug!("failed to smooth junction, adding breakpoint");
                }
            }
            None => {
                out.push(c0);
                c0 = c.clone();
                debug!("joining failed, adding breakpoint");
            }
        }
    }
    out.push(c0);

    if options.force_closed {
        let first_pole = out[0].pole_at(0);
        let last = out.len() - 1;
        let last_idx = out[last].pole_count() - 1;
        if (out[last].pole_at(last_idx) - &first_pole).norm() > tol {
            out[last].set_pole(last_idx, &first_pole);
        }
    }

    if options.reverse {
        out.iter_mut().for_each(|c| c.invert());
    }

    if out.len() == 1 && out[0].is_closed(tol) && !out[0].is_periodic() {
        let mut origin_offset = options.start_offset;

        if let Some(pct) = options.offset_parameter {
            let hundred = T::from_f64(100.0).unwrap();
            let total = out[0].try_length()?;
            let t = out[0]
                .try_parameter_at_length(total * pct / hundred, T::from_f64(1e-9).unwrap())?;
            let eps = T::from_f64(1e-10).unwrap();
            let exists = out[0].knots().iter().any(|k| (*k - t).abs() <= eps);
            if !exists {
                out[0].try_add_knot(t)?;
            }
            // rotate the origin onto the inserted knot
            let (start, end) = out[0].knots_domain();
            let position = out[0]
                .knots()
                .multiplicity()
                .iter()
                .filter(|m| *m.knot() >= start - eps && *m.knot() < end - eps)
                .position(|m| (*m.knot() - t).abs() <= eps);
            if let Some(idx) = position {
                origin_offset += idx as isize;
            }
        }

        out[0].try_set_periodic(tol)?;
        if origin_offset != 0 {
            out[0].try_set_origin(origin_offset)?;
        }
    }

    Ok(out)
}

/// Bring a set of curves to an evaluation-compatible layout:
/// shared degree, domain and knot vector.
pub fn harmonize_curves<T: FloatingPoint, D: DimName>(
    curves: &[NurbsCurve<T, D>],
) -> Result<Vec<NurbsCurve<T, D>>>
where
    DefaultAllocator: Allocator<D>,
{
    try_unify_curve_knot_vectors(curves)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    use super::*;
    use crate::curve::NurbsCurve3D;

    fn unit_segment(from: Point3<f64>, to: Point3<f64>) -> NurbsCurve3D<f64> {
        NurbsCurve3D::polyline(&[from, to])
    }

    #[test]
    fn corner_break_keeps_two_curves() {
        let c0 = unit_segment(Point3::new(-1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0));
        let c1 = unit_segment(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0));
        let options = JoinOptions {
            tolerance: 1e-6,
            corner_break: true,
            ..JoinOptions::default()
        };
        let joined = join(&[c0, c1], &options).unwrap();
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn force_contact_fuses_into_one_c0_curve() {
        let c0 = unit_segment(Point3::new(-1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0));
        let c1 = unit_segment(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0));
        let options = JoinOptions {
            tolerance: 1e-6,
            corner_break: false,
            force_contact: true,
            ..JoinOptions::default()
        };
        let joined = join(&[c0, c1], &options).unwrap();
        assert_eq!(joined.len(), 1);
        let curve = &joined[0];

        // the junction pole is exactly the shared origin
        let poles = curve.dehomogenized_control_points();
        assert!(poles
            .iter()
            .any(|p| p.coords.norm() < 1e-12));
        assert_relative_eq!(
            curve.first_point(),
            Point3::new(-1.0, 0.0, 0.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            curve.last_point(),
            Point3::new(0.0, 1.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn gap_is_snapped_with_force_contact() {
        let c0 = unit_segment(Point3::new(-1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0));
        let c1 = unit_segment(Point3::new(0.004, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let options = JoinOptions {
            tolerance: 1e-3,
            force_contact: true,
            ..JoinOptions::default()
        };
        let joined = join(&[c0, c1], &options).unwrap();
        assert_eq!(joined.len(), 1);
    }

    #[test]
    fn aligned_smooth_join_is_c1() {
        let points_a = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let points_b = vec![
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, -1.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
        ];
        let a = NurbsCurve3D::try_interpolate(&points_a, 2).unwrap();
        let b = NurbsCurve3D::try_interpolate(&points_b, 2).unwrap();
        let options = JoinOptions {
            tolerance: 1e-2,
            ..JoinOptions::default()
        };
        let joined = join(&[a, b], &options).unwrap();
        assert_eq!(joined.len(), 1);
    }

    #[test]
    fn harmonized_curves_share_structure_and_shape() {
        let a = NurbsCurve3D::try_interpolate(
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ],
            2,
        )
        .unwrap();
        let b = NurbsCurve3D::try_interpolate(
            &[
                Point3::new(0.0, 2.0, 0.0),
                Point3::new(0.7, 2.5, 0.0),
                Point3::new(1.4, 2.0, 0.0),
                Point3::new(2.0, 2.8, 0.0),
                Point3::new(2.6, 2.0, 0.0),
            ],
            3,
        )
        .unwrap();

        let unified = harmonize_curves(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(unified[0].degree(), unified[1].degree());
        assert_eq!(unified[0].knots().len(), unified[1].knots().len());
        for (x, y) in unified[0].knots().iter().zip(unified[1].knots().iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-9);
        }
        assert_eq!(unified[0].pole_count(), unified[1].pole_count());

        // evaluation of each curve is unchanged at proportional parameters
        let (a0, a1) = a.knots_domain();
        let (u0, u1) = unified[0].knots_domain();
        for i in 0..=16 {
            let f = (i as f64) / 16.0;
            assert_relative_eq!(
                a.point_at(a0 + (a1 - a0) * f),
                unified[0].point_at(u0 + (u1 - u0) * f),
                epsilon = 1e-8
            );
        }
    }

    #[test]
    fn closed_chain_is_promoted_to_periodic() {
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let sides = vec![
            unit_segment(p[0], p[1]),
            unit_segment(p[1], p[2]),
            unit_segment(p[2], p[3]),
            unit_segment(p[3], p[0]),
        ];
        let options = JoinOptions {
            tolerance: 1e-6,
            corner_break: false,
            ..JoinOptions::default()
        };
        let joined = join(&sides, &options).unwrap();
        assert_eq!(joined.len(), 1);
        assert!(joined[0].is_periodic());
    }
}
