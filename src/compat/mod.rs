//! Harmonization of two NURBS surfaces to a common parametric and
//! topological structure.
//!
//! The four steps must run in order: degree match, range match, knot merge,
//! multiplicity match. Each later step fails when an earlier one was
//! skipped, so harmonized surfaces always end up with identical knot and
//! multiplicity vectors and differ only in poles and weights.

use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName};

use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;
use crate::surface::NurbsSurface;

const KNOT_EQ_TOL: f64 = 1e-10;

fn same<T: FloatingPoint>(a: T, b: T) -> bool {
    (a - b).abs() <= T::from_f64(KNOT_EQ_TOL).unwrap()
}

/// Raise the u degree of both surfaces to their maximum
pub fn match_u_degree<T: FloatingPoint, D: DimName>(
    s1: &mut NurbsSurface<T, D>,
    s2: &mut NurbsSurface<T, D>,
) -> Result<()>
where
    DefaultAllocator: Allocator<D>,
{
    if s1.u_degree() > s2.u_degree() {
        debug!(
            "u degree of surface 2 increased from {} to {}",
            s2.u_degree(),
            s1.u_degree()
        );
        s2.try_elevate_u_degree(s1.u_degree())?;
    } else if s1.u_degree() < s2.u_degree() {
        debug!(
            "u degree of surface 1 increased from {} to {}",
            s1.u_degree(),
            s2.u_degree()
        );
        s1.try_elevate_u_degree(s2.u_degree())?;
    }
    Ok(())
}

/// Raise the v degree of both surfaces to their maximum
pub fn match_v_degree<T: FloatingPoint, D: DimName>(
    s1: &mut NurbsSurface<T, D>,
    s2: &mut NurbsSurface<T, D>,
) -> Result<()>
where
    DefaultAllocator: Allocator<D>,
{
    if s1.v_degree() > s2.v_degree() {
        s2.try_elevate_v_degree(s1.v_degree())?;
    } else if s1.v_degree() < s2.v_degree() {
        s1.try_elevate_v_degree(s2.v_degree())?;
    }
    Ok(())
}

/// Affinely remap the u knots of `s1` onto the u domain of `s2`
pub fn match_u_range<T: FloatingPoint, D: DimName>(
    s1: &mut NurbsSurface<T, D>,
    s2: &NurbsSurface<T, D>,
) -> Result<()>
where
    DefaultAllocator: Allocator<D>,
{
    if s1.u_degree() != s2.u_degree() {
        return Err(Error::InvalidInput("u degree mismatch".to_string()));
    }
    let (s1fp, s1lp) = s1.u_knots_domain();
    let (s2fp, s2lp) = s2.u_knots_domain();
    if same(s1fp, s2fp) && same(s1lp, s2lp) {
        debug!("u parameter ranges already matching");
        return Ok(());
    }
    let s1_range = s1lp - s1fp;
    let s2_range = s2lp - s2fp;
    let new_knots: Vec<T> = s1
        .u_knots()
        .iter()
        .map(|k| s2fp + s2_range * (*k - s1fp) / s1_range)
        .collect();
    debug!(
        "u knots of surface 1 remapped from [{:?},{:?}] to [{:?},{:?}]",
        s1fp.to_f64(),
        s1lp.to_f64(),
        s2fp.to_f64(),
        s2lp.to_f64()
    );
    s1.try_set_u_knots(new_knots)
}

/// Affinely remap the v knots of `s1` onto the v domain of `s2`
pub fn match_v_range<T: FloatingPoint, D: DimName>(
    s1: &mut NurbsSurface<T, D>,
    s2: &NurbsSurface<T, D>,
) -> Result<()>
where
    DefaultAllocator: Allocator<D>,
{
    if s1.v_degree() != s2.v_degree() {
        return Err(Error::InvalidInput("v degree mismatch".to_string()));
    }
    let (s1fp, s1lp) = s1.v_knots_domain();
    let (s2fp, s2lp) = s2.v_knots_domain();
    if same(s1fp, s2fp) && same(s1lp, s2lp) {
        return Ok(());
    }
    let s1_range = s1lp - s1fp;
    let s2_range = s2lp - s2fp;
    let new_knots: Vec<T> = s1
        .v_knots()
        .iter()
        .map(|k| s2fp + s2_range * (*k - s1fp) / s1_range)
        .collect();
    s1.try_set_v_knots(new_knots)
}

fn distinct_knots<T: FloatingPoint>(knots: &[T]) -> Vec<T> {
    let mut out: Vec<T> = vec![];
    for k in knots {
        if out.last().map(|l| !same(*l, *k)).unwrap_or(true) {
            out.push(*k);
        }
    }
    out
}

/// Insert the missing u knot values of each surface into the other
pub fn match_u_knots<T: FloatingPoint, D: DimName>(
    s1: &mut NurbsSurface<T, D>,
    s2: &mut NurbsSurface<T, D>,
) -> Result<()>
where
    DefaultAllocator: Allocator<D>,
{
    if s1.u_degree() != s2.u_degree() {
        return Err(Error::InvalidInput("u degree mismatch".to_string()));
    }
    let (a1, b1) = s1.u_knots_domain();
    let (a2, b2) = s2.u_knots_domain();
    if !same(a1, a2) || !same(b1, b2) {
        return Err(Error::InvalidInput("u range mismatch".to_string()));
    }

    let k1 = distinct_knots(s1.u_knots().as_slice());
    let k2 = distinct_knots(s2.u_knots().as_slice());
    for k in k2.iter() {
        if !k1.iter().any(|v| same(*v, *k)) {
            s1.try_insert_u_knot(*k, 1)?;
        }
    }
    for k in k1.iter() {
        if !k2.iter().any(|v| same(*v, *k)) {
            s2.try_insert_u_knot(*k, 1)?;
        }
    }
    Ok(())
}

/// Insert the missing v knot values of each surface into the other
pub fn match_v_knots<T: FloatingPoint, D: DimName>(
    s1: &mut NurbsSurface<T, D>,
    s2: &mut NurbsSurface<T, D>,
) -> Result<()>
where
    DefaultAllocator: Allocator<D>,
{
    if s1.v_degree() != s2.v_degree() {
        return Err(Error::InvalidInput("v degree mismatch".to_string()));
    }
    let (a1, b1) = s1.v_knots_domain();
    let (a2, b2) = s2.v_knots_domain();
    if !same(a1, a2) || !same(b1, b2) {
        return Err(Error::InvalidInput("v range mismatch".to_string()));
    }

    let k1 = distinct_knots(s1.v_knots().as_slice());
    let k2 = distinct_knots(s2.v_knots().as_slice());
    for k in k2.iter() {
        if !k1.iter().any(|v| same(*v, *k)) {
            s1.try_insert_v_knot(*k, 1)?;
        }
    }
    for k in k1.iter() {
        if !k2.iter().any(|v| same(*v, *k)) {
            s2.try_insert_v_knot(*k, 1)?;
        }
    }
    Ok(())
}

/// Lift the multiplicity of every common u knot to the maximum of the two
pub fn match_u_mults<T: FloatingPoint, D: DimName>(
    s1: &mut NurbsSurface<T, D>,
    s2: &mut NurbsSurface<T, D>,
) -> Result<()>
where
    DefaultAllocator: Allocator<D>,
{
    let k1 = distinct_knots(s1.u_knots().as_slice());
    let k2 = distinct_knots(s2.u_knots().as_slice());
    if k1.len() != k2.len() || k1.iter().zip(k2.iter()).any(|(a, b)| !same(*a, *b)) {
        return Err(Error::InvalidInput("u knot mismatch".to_string()));
    }

    for k in k1.iter() {
        let m1 = s1.u_multiplicity_at(*k);
        let m2 = s2.u_multiplicity_at(*k);
        if m1 > m2 {
            s2.try_increase_u_multiplicity(*k, m1)?;
        } else if m1 < m2 {
            s1.try_increase_u_multiplicity(*k, m2)?;
        }
    }
    Ok(())
}

/// Lift the multiplicity of every common v knot to the maximum of the two
pub fn match_v_mults<T: FloatingPoint, D: DimName>(
    s1: &mut NurbsSurface<T, D>,
    s2: &mut NurbsSurface<T, D>,
) -> Result<()>
where
    DefaultAllocator: Allocator<D>,
{
    let k1 = distinct_knots(s1.v_knots().as_slice());
    let k2 = distinct_knots(s2.v_knots().as_slice());
    if k1.len() != k2.len() || k1.iter().zip(k2.iter()).any(|(a, b)| !same(*a, *b)) {
        return Err(Error::InvalidInput("v knot mismatch".to_string()));
    }

    for k in k1.iter() {
        let m1 = s1.v_multiplicity_at(*k);
        let m2 = s2.v_multiplicity_at(*k);
        if m1 > m2 {
            s2.try_increase_v_multiplicity(*k, m1)?;
        } else if m1 < m2 {
            s1.try_increase_v_multiplicity(*k, m2)?;
        }
    }
    Ok(())
}

/// Run the full harmonization: degree, range, knots, multiplicities,
/// in both parametric directions.
pub fn match_surfaces<T: FloatingPoint, D: DimName>(
    s1: &mut NurbsSurface<T, D>,
    s2: &mut NurbsSurface<T, D>,
) -> Result<()>
where
    DefaultAllocator: Allocator<D>,
{
    match_u_degree(s1, s2)?;
    match_v_degree(s1, s2)?;
    match_u_range(s1, s2)?;
    match_v_range(s1, s2)?;
    match_u_knots(s1, s2)?;
    match_v_knots(s1, s2)?;
    match_u_mults(s1, s2)?;
    match_v_mults(s1, s2)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    use super::*;
    use crate::curve::NurbsCurve3D;
    use crate::surface::NurbsSurface3D;

    fn wavy_surface() -> NurbsSurface3D<f64> {
        let c0 = NurbsCurve3D::try_interpolate(
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.6),
                Point3::new(2.0, 0.0, -0.2),
                Point3::new(3.0, 0.0, 0.0),
            ],
            3,
        )
        .unwrap();
        NurbsSurface3D::extrude(&c0, &Vector3::new(0.0, 2.0, 0.0))
    }

    fn ruled_strip() -> NurbsSurface3D<f64> {
        let r0 = NurbsCurve3D::<f64>::polyline(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ]);
        let r1 = NurbsCurve3D::<f64>::polyline(&[
            Point3::new(0.0, 2.0, 0.5),
            Point3::new(3.0, 2.0, 0.5),
        ]);
        NurbsSurface3D::try_ruled(&r0, &r1).unwrap()
    }

    #[test]
    fn harmonized_surfaces_share_structure() {
        let mut s1 = wavy_surface();
        let mut s2 = ruled_strip();
        match_surfaces(&mut s1, &mut s2).unwrap();

        assert_eq!(s1.u_degree(), s2.u_degree());
        assert_eq!(s1.v_degree(), s2.v_degree());
        assert_eq!(s1.u_knots().len(), s2.u_knots().len());
        assert_eq!(s1.v_knots().len(), s2.v_knots().len());
        for (a, b) in s1.u_knots().iter().zip(s2.u_knots().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
        for (a, b) in s1.v_knots().iter().zip(s2.v_knots().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
        assert_eq!(
            s1.control_points().len(),
            s2.control_points().len()
        );
        assert_eq!(
            s1.control_points()[0].len(),
            s2.control_points()[0].len()
        );
    }

    #[test]
    fn harmonization_preserves_evaluation() {
        let original = wavy_surface();
        let mut s1 = original.clone();
        let mut s2 = ruled_strip();
        match_surfaces(&mut s1, &mut s2).unwrap();

        let (u0, u1, v0, v1) = original.bounds();
        let (m0, m1, n0, n1) = s1.bounds();
        for i in 0..=8 {
            for j in 0..=8 {
                let fu = (i as f64) / 8.0;
                let fv = (j as f64) / 8.0;
                let p = original.point_at(u0 + (u1 - u0) * fu, v0 + (v1 - v0) * fv);
                let q = s1.point_at(m0 + (m1 - m0) * fu, n0 + (n1 - n0) * fv);
                assert_relative_eq!(p, q, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn skipped_steps_are_rejected() {
        let mut s1 = wavy_surface();
        let mut s2 = ruled_strip();
        // range match before degree match
        assert!(match_u_range(&mut s1, &s2.clone()).is_err());

        match_u_degree(&mut s1, &mut s2).unwrap();
        match_v_degree(&mut s1, &mut s2).unwrap();
        match_u_range(&mut s1, &s2.clone()).unwrap();

        // desynchronize the knot sets, then skip the merge step
        let (a, b) = s1.u_knots_domain();
        s1.try_insert_u_knot(a + (b - a) * 0.5, 1).unwrap();
        assert!(match_u_mults(&mut s1, &mut s2).is_err());
    }
}
