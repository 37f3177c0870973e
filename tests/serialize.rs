#![cfg(feature = "serde")]

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use raccordo::prelude::*;

#[test]
fn curve_roundtrip() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 2.0, 0.0),
        Point3::new(3.0, -1.0, 1.0),
        Point3::new(5.0, 1.0, 0.0),
    ];
    let curve = NurbsCurve3D::try_interpolate(&points, 3).unwrap();
    let json = serde_json::to_string(&curve).unwrap();
    let back: NurbsCurve3D<f64> = serde_json::from_str(&json).unwrap();

    let (start, end) = curve.knots_domain();
    for i in 0..=16 {
        let t = start + (end - start) * (i as f64) / 16.0;
        assert_relative_eq!(back.point_at(t), curve.point_at(t), epsilon = 1e-12);
    }
}

#[test]
fn surface_roundtrip() {
    let profile = NurbsCurve3D::<f64>::try_interpolate(
        &[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.5),
            Point3::new(2.0, 0.0, -0.5),
            Point3::new(3.0, 0.0, 0.0),
        ],
        3,
    )
    .unwrap();
    let surface = NurbsSurface3D::extrude(&profile, &Vector3::new(0.0, 2.0, 0.0));
    let json = serde_json::to_string(&surface).unwrap();
    let back: NurbsSurface3D<f64> = serde_json::from_str(&json).unwrap();

    let (u0, u1, v0, v1) = surface.bounds();
    for i in 0..=8 {
        for j in 0..=8 {
            let u = u0 + (u1 - u0) * (i as f64) / 8.0;
            let v = v0 + (v1 - v0) * (j as f64) / 8.0;
            assert_relative_eq!(back.point_at(u, v), surface.point_at(u, v), epsilon = 1e-12);
        }
    }
}
