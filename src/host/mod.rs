//! The boundary to the embedding host: opaque reference decoding and the
//! store that resolves references to concrete geometry.
//!
//! Sub-element references arrive as strings of the form `"Vertex<k>"`,
//! `"Edge<k>"` or `"Face<k>"` with 1-based indices. They are decoded here,
//! once, at the boundary; no string ever travels further inward.

use std::collections::HashMap;

use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;
use crate::topology::{Edge, Face, Shape, Vertex};

/// A decoded sub-element reference with a zero-based index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubRef {
    Vertex(usize),
    Edge(usize),
    Face(usize),
}

impl SubRef {
    /// Parse `"Vertex<k>"` / `"Edge<k>"` / `"Face<k>"` with 1-based `k`
    pub fn parse(name: &str) -> Result<Self> {
        let (kind, digits) = name.split_at(
            name.find(|c: char| c.is_ascii_digit())
                .ok_or_else(|| invalid(name))?,
        );
        let index: usize = digits.parse().map_err(|_| invalid(name))?;
        if index == 0 {
            return Err(Error::InvalidInput(format!(
                "sub-element indices are 1-based: {name}"
            )));
        }
        match kind {
            "Vertex" => Ok(SubRef::Vertex(index - 1)),
            "Edge" => Ok(SubRef::Edge(index - 1)),
            "Face" => Ok(SubRef::Face(index - 1)),
            _ => Err(invalid(name)),
        }
    }
}

fn invalid(name: &str) -> Error {
    Error::InvalidInput(format!("unrecognized sub-element reference: {name}"))
}

/// A selection: a host object identifier plus a sub-element name
pub type Selection = (String, String);

/// Resolves opaque references to concrete geometry and receives the
/// output shapes of the features.
#[derive(Default)]
pub struct GeometryStore<T: FloatingPoint> {
    objects: HashMap<String, Shape<T>>,
}

impl<T: FloatingPoint> GeometryStore<T> {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: impl Into<String>, shape: Shape<T>) {
        self.objects.insert(id.into(), shape);
    }

    pub fn remove(&mut self, id: &str) -> Option<Shape<T>> {
        self.objects.remove(id)
    }

    pub fn get(&self, id: &str) -> Result<&Shape<T>> {
        self.objects
            .get(id)
            .ok_or_else(|| Error::InvalidInput(format!("unknown object reference: {id}")))
    }

    /// Resolve a `(object, sub-name)` selection pair
    pub fn resolve(&self, selection: &Selection) -> Result<ResolvedRef<'_, T>> {
        let shape = self.get(&selection.0)?;
        let subref = SubRef::parse(&selection.1)?;
        match subref {
            SubRef::Edge(i) => {
                let edges = shape.edges();
                edges
                    .get(i)
                    .copied()
                    .map(ResolvedRef::Edge)
                    .ok_or_else(|| out_of_range(&selection.1))
            }
            SubRef::Face(i) => {
                let faces = shape.faces();
                faces
                    .get(i)
                    .copied()
                    .map(ResolvedRef::Face)
                    .ok_or_else(|| out_of_range(&selection.1))
            }
            SubRef::Vertex(i) => {
                let vertices = shape_vertices(shape);
                vertices
                    .into_iter()
                    .nth(i)
                    .map(ResolvedRef::Vertex)
                    .ok_or_else(|| out_of_range(&selection.1))
            }
        }
    }

    /// Resolve every selection of a list to an edge
    pub fn resolve_edges(&self, selections: &[Selection]) -> Result<Vec<Edge<T>>> {
        selections
            .iter()
            .map(|s| match self.resolve(s)? {
                ResolvedRef::Edge(e) => Ok(e.clone()),
                _ => Err(Error::InvalidInput(format!(
                    "expected an edge reference: {}",
                    s.1
                ))),
            })
            .collect()
    }
}

fn out_of_range(name: &str) -> Error {
    Error::InvalidInput(format!("sub-element index out of range: {name}"))
}

/// The geometry behind a resolved reference
pub enum ResolvedRef<'a, T: FloatingPoint> {
    Vertex(Vertex<T>),
    Edge(&'a Edge<T>),
    Face(&'a Face<T>),
}

/// The persisted state of a feature embedding a curve-on-surface:
/// the references and flags needed to rebuild it against a live store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CosRecord<T> {
    pub edge: Selection,
    pub face: Selection,
    pub reverse_tangent: bool,
    pub reverse_normal: bool,
    pub reverse_binormal: bool,
    pub closed: bool,
    pub samples: usize,
    pub tolerance: T,
}

/// Endpoint vertices of every edge, in traversal order
fn shape_vertices<T: FloatingPoint>(shape: &Shape<T>) -> Vec<Vertex<T>> {
    let mut out = vec![];
    for e in shape.edges() {
        out.push(Vertex::new(e.start_point()));
        out.push(Vertex::new(e.end_point()));
    }
    out
}

#[cfg(test)]
mod tests {
    use nalgebra::Point3;

    use super::*;
    use crate::curve::NurbsCurve3D;
    use crate::topology::Edge;

    #[test]
    fn subref_parsing() {
        assert_eq!(SubRef::parse("Edge3").unwrap(), SubRef::Edge(2));
        assert_eq!(SubRef::parse("Vertex1").unwrap(), SubRef::Vertex(0));
        assert_eq!(SubRef::parse("Face12").unwrap(), SubRef::Face(11));
        assert!(SubRef::parse("Edge0").is_err());
        assert!(SubRef::parse("Solid1").is_err());
        assert!(SubRef::parse("Edge").is_err());
    }

    #[test]
    fn cos_record_round_trips_selections() {
        let record = CosRecord {
            edge: ("sketch".to_string(), "Edge2".to_string()),
            face: ("body".to_string(), "Face1".to_string()),
            reverse_tangent: false,
            reverse_normal: true,
            reverse_binormal: false,
            closed: false,
            samples: 100,
            tolerance: 1e-7_f64,
        };
        assert_eq!(SubRef::parse(&record.edge.1).unwrap(), SubRef::Edge(1));
        assert_eq!(SubRef::parse(&record.face.1).unwrap(), SubRef::Face(0));
    }

    #[test]
    fn store_resolves_edges() {
        let mut store = GeometryStore::<f64>::new();
        let e0 = Edge::new(NurbsCurve3D::polyline(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ]));
        let e1 = Edge::new(NurbsCurve3D::polyline(&[
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ]));
        store.insert(
            "sketch",
            Shape::Compound(vec![Shape::Edge(e0), Shape::Edge(e1)]),
        );

        let edges = store
            .resolve_edges(&[
                ("sketch".to_string(), "Edge1".to_string()),
                ("sketch".to_string(), "Edge2".to_string()),
            ])
            .unwrap();
        assert_eq!(edges.len(), 2);

        assert!(store
            .resolve(&("sketch".to_string(), "Edge3".to_string()))
            .is_err());
        assert!(store
            .resolve(&("missing".to_string(), "Edge1".to_string()))
            .is_err());
    }
}
