use approx::assert_relative_eq;
use nalgebra::{Point2, Point3};

use crate::curve::{NurbsCurve2D, NurbsCurve3D};
use crate::misc::Invertible;

/// Rational quadratic quarter circle from (1,0) to (0,1)
fn quarter_circle() -> NurbsCurve2D<f64> {
    let w = std::f64::consts::FRAC_1_SQRT_2;
    NurbsCurve2D::try_new(
        2,
        vec![
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(w, w, w),
            Point3::new(0.0, 1.0, 1.0),
        ],
        vec![0., 0., 0., 1., 1., 1.],
    )
    .unwrap()
}

#[test]
fn quarter_circle_stays_on_unit_circle() {
    let arc = quarter_circle();
    let (start, end) = arc.knots_domain();
    for i in 0..=20 {
        let t = start + (end - start) * (i as f64) / 20.0;
        let p = arc.point_at(t);
        assert_relative_eq!(p.coords.norm(), 1.0, epsilon = 1e-12);
    }
    assert_relative_eq!(arc.curvature_at(0.3).unwrap().abs(), 1.0, epsilon = 1e-9);
}

#[test]
fn quarter_circle_length_matches_arc() {
    let arc = quarter_circle();
    let len = arc.try_length().unwrap();
    assert_relative_eq!(len, std::f64::consts::FRAC_PI_2, epsilon = 1e-6);
}

#[test]
fn parameter_at_length_inverts_length() {
    let arc = quarter_circle();
    let len = arc.try_length().unwrap();
    let t = arc.try_parameter_at_length(len / 2.0, 1e-9).unwrap();
    let there = arc.try_length_at(t).unwrap();
    assert_relative_eq!(there, len / 2.0, epsilon = 1e-6);
}

#[test]
fn insert_then_remove_knot_roundtrips() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 2.0, 0.0),
        Point3::new(3.0, -1.0, 1.0),
        Point3::new(5.0, 1.0, 0.0),
        Point3::new(7.0, 0.0, 2.0),
        Point3::new(8.0, 2.0, 0.0),
    ];
    let curve = NurbsCurve3D::try_interpolate(&points, 3).unwrap();
    let mut modified = curve.clone();
    let (start, end) = curve.knots_domain();
    let u = start + (end - start) * 0.37;
    modified.try_add_knot(u).unwrap();
    assert_eq!(modified.pole_count(), curve.pole_count() + 1);

    let removed = modified.try_remove_knot(u, 1, 1e-6).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(modified.pole_count(), curve.pole_count());

    for i in 0..=32 {
        let t = start + (end - start) * (i as f64) / 32.0;
        assert_relative_eq!(modified.point_at(t), curve.point_at(t), epsilon = 1e-7);
    }
}

#[test]
fn knot_insertion_preserves_shape() {
    let curve = quarter_circle();
    let mut refined = curve.clone();
    refined.try_refine_knot(vec![0.25, 0.5, 0.75]).unwrap();
    let (start, end) = curve.knots_domain();
    for i in 0..=20 {
        let t = start + (end - start) * (i as f64) / 20.0;
        assert_relative_eq!(refined.point_at(t), curve.point_at(t), epsilon = 1e-10);
    }
}

#[test]
fn degree_elevation_preserves_shape() {
    let points = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 2.0),
        Point2::new(3.0, -1.0),
        Point2::new(5.0, 1.0),
    ];
    let curve = NurbsCurve2D::try_interpolate(&points, 2).unwrap();
    let elevated = curve.try_elevate_degree(3).unwrap();
    assert_eq!(elevated.degree(), 3);
    let (start, end) = curve.knots_domain();
    for i in 0..=25 {
        let t = start + (end - start) * (i as f64) / 25.0;
        assert_relative_eq!(elevated.point_at(t), curve.point_at(t), epsilon = 1e-8);
    }
}

#[test]
fn segment_matches_original_range() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 2.0, 0.0),
        Point3::new(3.0, -1.0, 0.0),
        Point3::new(5.0, 1.0, 0.0),
        Point3::new(6.0, 0.0, 0.0),
    ];
    let curve = NurbsCurve3D::try_interpolate(&points, 3).unwrap();
    let (start, end) = curve.knots_domain();
    let (t0, t1) = (start + 0.2 * (end - start), start + 0.7 * (end - start));
    let segment = curve.try_segment(t0, t1).unwrap();
    let (s0, s1) = segment.knots_domain();
    assert_relative_eq!(s0, t0, epsilon = 1e-12);
    assert_relative_eq!(s1, t1, epsilon = 1e-12);
    for i in 0..=10 {
        let t = t0 + (t1 - t0) * (i as f64) / 10.0;
        assert_relative_eq!(segment.point_at(t), curve.point_at(t), epsilon = 1e-9);
    }
}

#[test]
fn reverse_swaps_endpoints() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 2.0, 0.0),
        Point3::new(3.0, -1.0, 0.0),
        Point3::new(5.0, 1.0, 0.0),
    ];
    let curve = NurbsCurve3D::try_interpolate(&points, 3).unwrap();
    let reversed = curve.inverse();
    assert_relative_eq!(reversed.first_point(), curve.last_point(), epsilon = 1e-12);
    assert_relative_eq!(reversed.last_point(), curve.first_point(), epsilon = 1e-12);
}

#[test]
fn closest_parameter_recovers_on_curve_points() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 1.0, 0.0),
        Point3::new(4.0, -1.0, 0.0),
        Point3::new(6.0, 0.5, 0.0),
    ];
    let curve = NurbsCurve3D::try_interpolate(&points, 3).unwrap();
    let (start, end) = curve.knots_domain();
    for i in 1..8 {
        let t = start + (end - start) * (i as f64) / 8.0;
        let p = curve.point_at(t);
        let found = curve.find_closest_parameter(&p).unwrap();
        assert_relative_eq!(curve.point_at(found), p, epsilon = 1e-6);
    }
}

#[test]
fn periodic_conversion_keeps_interior_shape() {
    let points = vec![
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.5, 0.9, 0.0),
        Point3::new(-0.5, 0.9, 0.0),
        Point3::new(-1.0, 0.0, 0.0),
        Point3::new(-0.5, -0.9, 0.0),
        Point3::new(0.5, -0.9, 0.0),
        Point3::new(1.0, 0.0, 0.0),
    ];
    let mut curve = NurbsCurve3D::try_interpolate(&points, 3).unwrap();
    curve.try_set_periodic(1e-7).unwrap();
    assert!(curve.is_periodic());

    let (start, end) = curve.knots_domain();
    assert_relative_eq!(
        curve.point_at(start),
        curve.point_at(end),
        epsilon = 1e-9
    );
}

#[cfg(feature = "serde")]
#[test]
fn serde_roundtrips_the_defining_tuple() {
    let curve = quarter_circle();
    let json = serde_json::to_string(&curve).unwrap();
    let back: NurbsCurve2D<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(back.degree(), curve.degree());
    assert_eq!(back.knots().to_vec(), curve.knots().to_vec());
    let (start, end) = curve.knots_domain();
    for i in 0..=10 {
        let t = start + (end - start) * (i as f64) / 10.0;
        assert_relative_eq!(back.point_at(t), curve.point_at(t), epsilon = 1e-12);
    }
}

#[test]
fn origin_rotation_keeps_the_loop() {
    let points = vec![
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(-1.0, 0.0, 0.0),
        Point3::new(0.0, -1.0, 0.0),
    ];
    let mut curve =
        NurbsCurve3D::try_periodic_interpolate(&points, 3, crate::curve::KnotStyle::ChordLength)
            .unwrap();
    let before = curve.point_at(curve.knots_domain().0);
    curve.try_set_origin(1).unwrap();
    let after = curve.point_at(curve.knots_domain().0);
    // the origin moved to another point of the same loop
    assert!((before - after).norm() > 1e-3);
    let (start, end) = curve.knots_domain();
    assert_relative_eq!(curve.point_at(start), curve.point_at(end), epsilon = 1e-9);
}
