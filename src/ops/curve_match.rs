use nalgebra::Point3;

use crate::curve::NurbsCurve3D;
use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;

/// Move the leading poles of `follower` so that it continues `leader`
/// with G`level` contact at the junction.
///
/// The follower's knot sequence may be scaled first to tune the derivative
/// magnitudes. Level 0 matches position, 1 adds the tangent, 2 the second
/// derivative, and so on up to `follower.degree()`.
pub fn match_curves<T: FloatingPoint>(
    leader: &NurbsCurve3D<T>,
    follower: &NurbsCurve3D<T>,
    level: usize,
    scale: T,
) -> Result<NurbsCurve3D<T>> {
    if level >= follower.pole_count() {
        return Err(Error::InvalidInput(
            "continuity level exceeds the follower's pole count".to_string(),
        ));
    }
    if scale <= T::zero() {
        return Err(Error::InvalidInput(
            "knot scale must be positive".to_string(),
        ));
    }

    let mut follower = follower.clone();
    follower.knots_mut().iter_mut().for_each(|k| *k *= scale);

    let leader_end = leader.knots_domain().1;
    let follower_start = follower.knots_domain().0;

    let p1 = leader.dehomogenized_control_points();
    let mut p2 = follower.dehomogenized_control_points();

    for l in 0..=level {
        let ev1 = leader
            .knots()
            .evaluate_basis_row(leader.degree(), leader_end, l);
        let ev2 = follower
            .knots()
            .evaluate_basis_row(follower.degree(), follower_start, l);

        let mut pole1 = Point3::origin();
        for (i, w) in ev1.iter().enumerate() {
            pole1.coords += p1[i].coords * *w;
        }

        let val = ev2[l];
        if val.abs() <= T::default_epsilon() {
            return Err(Error::GeometricDegeneracy(
                "vanishing basis derivative at the junction".to_string(),
            ));
        }

        let mut pole2 = Point3::origin();
        for (i, w) in ev2.iter().enumerate().take(l) {
            pole2.coords += p2[i].coords * *w;
        }

        p2[l] = Point3::from((pole1.coords - pole2.coords) / val);
    }

    for (i, p) in p2.iter().enumerate() {
        follower.set_pole(i, p);
    }
    Ok(follower)
}
