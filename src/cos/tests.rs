use approx::assert_relative_eq;
use nalgebra::{Point2, Point3, Point4, Vector3};

use super::*;
use crate::surface::NurbsSurface3D;
use crate::topology::{Edge, Face};

fn flat_face() -> Face<f64> {
    let surface = NurbsSurface3D::new(
        1,
        1,
        vec![0., 0., 1., 1.],
        vec![0., 0., 1., 1.],
        vec![
            vec![Point4::new(0., 0., 0., 1.), Point4::new(0., 1., 0., 1.)],
            vec![Point4::new(1., 0., 0., 1.), Point4::new(1., 1., 0., 1.)],
        ],
    );
    Face::from_surface(surface).unwrap()
}

fn bottom_edge(face: &Face<f64>) -> Edge<f64> {
    face.outer()[0].edge.clone()
}

#[test]
fn boundary_edge_validates_from_pcurves() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let cos = CurveOnSurface::new(edge, face, 1e-7);
    assert!(cos.is_valid());
    assert!(cos.curve2d().is_some());

    // the lifted 2D curve reproduces the 3D edge
    for i in 0..=10 {
        let t = cos.first_parameter()
            + (cos.last_parameter() - cos.first_parameter()) * (i as f64) / 10.0;
        let p2 = cos.curve2d().unwrap().point_at(t);
        let on_surface = cos.face().surface().point_at(p2.x, p2.y);
        assert_relative_eq!(on_surface, cos.value_at(t).unwrap(), epsilon = 1e-7);
    }
}

#[test]
fn frame_queries_with_reverse_flags() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let mut cos = CurveOnSurface::new(edge, face, 1e-7);

    let t = 0.5;
    let tangent = cos.tangent_at(t).unwrap();
    let normal = cos.normal_at(t).unwrap();
    let binormal = cos.binormal_at(t).unwrap();
    assert_relative_eq!(tangent, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
    assert_relative_eq!(normal, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-9);
    assert_relative_eq!(binormal, tangent.cross(&normal), epsilon = 1e-9);

    cos.reverse_tangent = true;
    cos.reverse_normal = true;
    cos.reverse_binormal = true;
    assert_relative_eq!(cos.tangent_at(t).unwrap(), -tangent, epsilon = 1e-9);
    assert_relative_eq!(cos.normal_at(t).unwrap(), -normal, epsilon = 1e-9);
    // the binormal flag applies on top of the flipped frame
    let flipped = cos.tangent_at(t).unwrap().cross(&cos.normal_at(t).unwrap());
    assert_relative_eq!(cos.binormal_at(t).unwrap(), -flipped, epsilon = 1e-9);
}

#[test]
fn out_of_range_parameters_are_reported() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let cos = CurveOnSurface::new(edge, face, 1e-7);
    assert!(cos.value_at(2.0).is_err());
    assert!(cos.tangent_at(-1.0).is_err());
}

#[test]
fn projection_fallback_recovers_an_interior_curve() {
    let face = flat_face();
    // a diagonal edge inside the face: not part of the boundary,
    // so only the projection fallback can lift it
    let diagonal = Edge::new(crate::curve::NurbsCurve3D::polyline(&[
        Point3::new(0.1, 0.1, 0.0),
        Point3::new(0.9, 0.8, 0.0),
    ]));
    let cos = CurveOnSurface::new(diagonal, face, 1e-6);
    assert!(cos.is_valid());
    let mid = (cos.first_parameter() + cos.last_parameter()) / 2.0;
    let p = cos.value_at(mid).unwrap();
    assert_relative_eq!(p.z, 0.0, epsilon = 1e-9);
    // the midpoint lies on the chord between the endpoints
    assert_relative_eq!(p.x, 0.5, epsilon = 1e-3);
    assert_relative_eq!(p.y, 0.45, epsilon = 1e-3);
}

#[test]
fn reverse_flips_the_lifted_edge() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let mut cos = CurveOnSurface::new(edge, face, 1e-7);
    let start = cos.value_at(cos.first_parameter()).unwrap();
    let end = cos.value_at(cos.last_parameter()).unwrap();

    cos.reverse().unwrap();
    assert!(cos.is_reversed());
    let new_start = cos.value_at(cos.first_parameter()).unwrap();
    let new_end = cos.value_at(cos.last_parameter()).unwrap();
    assert_relative_eq!(new_start, end, epsilon = 1e-9);
    assert_relative_eq!(new_end, start, epsilon = 1e-9);
}

#[test]
fn offset_curve_stays_inside_the_face() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let cos = CurveOnSurface::new(edge, face, 1e-7);
    let offset = cos.get_offset_curve_2d(0.25).unwrap();
    let (f, l) = offset.knots_domain();
    for i in 0..=10 {
        let t = f + (l - f) * (i as f64) / 10.0;
        let p = offset.point_at(t);
        assert_relative_eq!(p.y, 0.25, epsilon = 1e-6);
        assert!(p.x >= -1e-6 && p.x <= 1.0 + 1e-6);
    }
}

#[test]
fn normal_strip_is_offset_by_the_width() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let cos = CurveOnSurface::new(edge, face, 1e-7);
    let strip = cos.normal_face(10, 0.5, 1e-5, false).unwrap();
    let (u0, u1, v0, v1) = strip.surface().bounds();
    let mid_u = (u0 + u1) / 2.0;
    // v0 rail is the curve itself, v1 rail floats half a unit above
    let base = strip.surface().point_at(mid_u, v0);
    let rail = strip.surface().point_at(mid_u, v1);
    assert_relative_eq!(base.z, 0.0, epsilon = 1e-6);
    assert_relative_eq!(rail.z, 0.5, epsilon = 1e-6);
}

#[test]
fn binormal_strip_spreads_sideways() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let cos = CurveOnSurface::new(edge, face, 1e-7);
    let strip = cos.binormal_face(10, 0.4, 1e-5, true).unwrap();
    let (u0, u1, v0, v1) = strip.surface().bounds();
    let mid_u = (u0 + u1) / 2.0;
    let side_a = strip.surface().point_at(mid_u, v0);
    let side_b = strip.surface().point_at(mid_u, v1);
    // symmetric: half the width on each side of the curve
    assert_relative_eq!((side_a.y - side_b.y).abs(), 0.4, epsilon = 1e-6);
}

#[test]
fn cross_curves_walk_into_the_face() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let cos = CurveOnSurface::new(edge, face, 1e-7);
    let rungs = cos.get_cross_curves(5, 0.3, false).unwrap();
    assert_eq!(rungs.len(), 5);
    for rung in &rungs {
        let tip = rung.point_at(rung.last_parameter());
        assert_relative_eq!(tip.y, 0.3, epsilon = 1e-6);
    }
}

#[test]
fn single_cross_curve_bridges_offset_and_curve() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let cos = CurveOnSurface::new(edge, face, 1e-7);
    let offset = cos.get_offset_curve_2d(0.25).unwrap();
    let rung = cos.get_cross_curve(&offset, 0.5).unwrap();
    let a = rung.point_at(rung.first_parameter());
    let b = rung.point_at(rung.last_parameter());
    assert_relative_eq!(a.y, 0.25, epsilon = 1e-5);
    assert_relative_eq!(b.y, 0.0, epsilon = 1e-9);
    // an out-of-range parameter is clamped, not rejected
    let clamped = cos.get_cross_curve(&offset, 2.0).unwrap();
    let tip = clamped.point_at(clamped.last_parameter());
    assert_relative_eq!(tip.x, 1.0, epsilon = 1e-5);
}

#[test]
fn adjacent_edges_share_the_endpoints() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let cos = CurveOnSurface::new(edge.clone(), face.clone(), 1e-7);
    let (at_start, at_end) = cos.face().adjacent_edges(&edge, 1e-9);
    assert!(at_start.is_some());
    assert!(at_end.is_some());

    // the neighbor at the start runs along the v direction
    let tangent = face.adjacent_edge_tangent(&edge, 1e-9).unwrap();
    assert_relative_eq!(tangent.normalize().x.abs(), 0.0, epsilon = 1e-9);
    assert_relative_eq!(tangent.normalize().y.abs(), 1.0, epsilon = 1e-9);
}

#[test]
fn straight_edges_report_as_linear() {
    let face = flat_face();
    let edge = bottom_edge(&face);
    let cos = CurveOnSurface::new(edge, face, 1e-7);
    assert!(cos.is_linear(1e-7).unwrap());

    let (deviation, _) = cos.linear_deviation(1.0).unwrap();
    assert_relative_eq!(deviation, 1.0, epsilon = 1e-9);
}

#[test]
fn pcurve_pieces_join_into_one() {
    let a = crate::topology::pcurve_segment(
        Point2::new(0.0, 0.0),
        Point2::new(0.5, 0.0),
        0.0,
        0.5,
    );
    let b = crate::topology::pcurve_segment(
        Point2::new(0.5, 0.0),
        Point2::new(1.0, 0.3),
        0.5,
        1.0,
    );
    let joined = join_pcurves(vec![a, b], 1e-7).unwrap();
    assert_relative_eq!(
        joined.point_at(joined.knots_domain().0),
        Point2::new(0.0, 0.0),
        epsilon = 1e-9
    );
    assert_relative_eq!(
        joined.point_at(joined.knots_domain().1),
        Point2::new(1.0, 0.3),
        epsilon = 1e-9
    );
}
