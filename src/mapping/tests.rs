use approx::assert_relative_eq;
use nalgebra::{Point3, Point4};

use super::*;
use crate::misc::signed_area;
use crate::surface::NurbsSurface3D;
use crate::topology::{Edge, Face, Shape};

fn flat_target() -> Face<f64> {
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

fn square_source(x0: f64, y0: f64, x1: f64, y1: f64) -> Shape<f64> {
    let corners = [
        Point3::new(x0, y0, 0.0),
        Point3::new(x1, y0, 0.0),
        Point3::new(x1, y1, 0.0),
        Point3::new(x0, y1, 0.0),
    ];
    let edges: Vec<Shape<f64>> = (0..4)
        .map(|i| {
            Shape::Edge(Edge::new(crate::curve::NurbsCurve3D::polyline(&[
                corners[i],
                corners[(i + 1) % 4],
            ])))
        })
        .collect();
    Shape::Compound(edges)
}

fn identity_mapper(target: Face<f64>) -> ShapeMapper<f64> {
    let options = ShapeMapperOptions::default();
    ShapeMapper::for_sketch(target, (0.0, 1.0, 0.0, 1.0), &options).unwrap()
}

#[test]
fn unit_square_maps_onto_the_flat_target() {
    let target = flat_target();
    let mapper = identity_mapper(target);
    let source = square_source(0.0, 0.0, 1.0, 1.0);
    let flats = mapper.source_pcurves(&source, None).unwrap();
    assert_eq!(flats.len(), 4);

    let shapes = mapper.map_at_offset(flats, 0.0, true).unwrap();
    assert_eq!(shapes.len(), 1);
    let face = match &shapes[0] {
        Shape::Face(f) => f,
        other => panic!("expected a face, got {:?}", std::mem::discriminant(other)),
    };
    assert_eq!(face.outer().len(), 4);
    assert!(face.holes().is_empty());

    // the mapped area equals the source area
    let wire = FlatWire {
        edges: face
            .outer()
            .iter()
            .map(|fe| FlatEdge::new(fe.pcurve.clone(), fe.first, fe.last))
            .collect(),
        closed: true,
    };
    let area = signed_area(&wire.polygon(8)).abs();
    assert_relative_eq!(area, 1.0, epsilon = 1e-5);

    // the outer wire matches the source corners on the target
    let corners = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    for corner in &corners {
        let hit = face.outer().iter().any(|fe| {
            (fe.edge.start_point() - corner).norm() < 1e-5
                || (fe.edge.end_point() - corner).norm() < 1e-5
        });
        assert!(hit);
    }
}

#[test]
fn inner_square_cuts_a_hole() {
    let target = flat_target();
    let mapper = identity_mapper(target);
    let mut edges = vec![];
    for source in [
        square_source(0.05, 0.05, 0.95, 0.95),
        square_source(0.3, 0.3, 0.6, 0.6),
    ] {
        edges.extend(mapper.source_pcurves(&source, None).unwrap());
    }

    let shapes = mapper.map_at_offset(edges, 0.0, true).unwrap();
    assert_eq!(shapes.len(), 1);
    match &shapes[0] {
        Shape::Face(face) => {
            assert_eq!(face.holes().len(), 1);
            assert_eq!(face.holes()[0].len(), 4);
        }
        _ => panic!("expected a face with a hole"),
    }
}

#[test]
fn open_wires_map_to_edge_compounds() {
    let target = flat_target();
    let mapper = identity_mapper(target);
    let polyline = Shape::Edge(Edge::new(crate::curve::NurbsCurve3D::polyline(&[
        Point3::new(0.1, 0.1, 0.0),
        Point3::new(0.8, 0.4, 0.0),
    ])));
    let flats = mapper.source_pcurves(&polyline, None).unwrap();
    let shapes = mapper.map_at_offset(flats, 0.0, true).unwrap();
    assert_eq!(shapes.len(), 1);
    assert!(matches!(&shapes[0], Shape::Compound(inner) if inner.len() == 1));
}

#[test]
fn extrusion_builds_one_wall_per_edge() {
    let target = flat_target();
    let mapper = identity_mapper(target);
    let source = square_source(0.2, 0.2, 0.8, 0.8);
    let flats = mapper.source_pcurves(&source, None).unwrap();

    let shells = mapper.get_extrusion(flats, 0.0, 0.5).unwrap();
    assert_eq!(shells.len(), 1);
    assert_eq!(shells[0].faces.len(), 4);

    // walls stretch from the base plane to the offset plane
    let wall = &shells[0].faces[0];
    let (u0, u1, v0, v1) = wall.surface().bounds();
    let base = wall.surface().point_at((u0 + u1) / 2.0, v0);
    let lid = wall.surface().point_at((u0 + u1) / 2.0, v1);
    assert_relative_eq!(base.z, 0.0, epsilon = 1e-6);
    assert_relative_eq!(lid.z, 0.5, epsilon = 1e-6);
}

#[test]
fn filled_thickness_promotes_to_a_solid() {
    let target = flat_target();
    let mapper = identity_mapper(target);
    let source = square_source(0.2, 0.2, 0.8, 0.8);
    let flats = mapper.source_pcurves(&source, None).unwrap();

    let solids = mapper.get_solids(flats, 0.0, 0.4).unwrap();
    assert_eq!(solids.len(), 1);
    match &solids[0] {
        Shape::Solid(solid) => {
            // bottom + top + four walls
            assert_eq!(solid.shell.faces.len(), 6);
            assert!(solid.shell.closed);
        }
        _ => panic!("expected a solid"),
    }
}

#[test]
fn offset_mapping_floats_above_the_target() {
    let target = flat_target();
    let mapper = identity_mapper(target);
    let source = square_source(0.2, 0.2, 0.8, 0.8);
    let flats = mapper.source_pcurves(&source, None).unwrap();

    let shapes = mapper.map_at_offset(flats, 0.25, false).unwrap();
    for shape in &shapes {
        for edge in shape.edges() {
            let mid = (edge.first_parameter() + edge.last_parameter()) / 2.0;
            assert_relative_eq!(edge.point_at(mid).z, 0.25, epsilon = 1e-5);
        }
    }
}
