use crate::misc::FloatingPoint;

use super::{Edge, Face, Vertex, Wire};

/// A connected set of faces
#[derive(Debug, Clone)]
pub struct Shell<T: FloatingPoint> {
    pub faces: Vec<Face<T>>,
    pub closed: bool,
}

/// A region of space bounded by a closed shell
#[derive(Debug, Clone)]
pub struct Solid<T: FloatingPoint> {
    pub shell: Shell<T>,
}

/// The tagged union the host adapter exchanges with the toolkit
#[derive(Debug, Clone)]
pub enum Shape<T: FloatingPoint> {
    Vertex(Vertex<T>),
    Edge(Edge<T>),
    Wire(Wire<T>),
    Face(Face<T>),
    Shell(Shell<T>),
    Solid(Solid<T>),
    Compound(Vec<Shape<T>>),
}

impl<T: FloatingPoint> Shape<T> {
    /// All edges reachable from this shape, in traversal order
    pub fn edges(&self) -> Vec<&Edge<T>> {
        let mut out = vec![];
        self.collect_edges(&mut out);
        out
    }

    fn collect_edges<'a>(&'a self, out: &mut Vec<&'a Edge<T>>) {
        match self {
            Shape::Vertex(_) => {}
            Shape::Edge(e) => out.push(e),
            Shape::Wire(w) => out.extend(w.edges().iter()),
            Shape::Face(f) => {
                out.extend(f.outer().iter().map(|fe| &fe.edge));
                for hole in f.holes() {
                    out.extend(hole.iter().map(|fe| &fe.edge));
                }
            }
            Shape::Shell(s) => {
                for f in &s.faces {
                    out.extend(f.outer().iter().map(|fe| &fe.edge));
                }
            }
            Shape::Solid(s) => {
                for f in &s.shell.faces {
                    out.extend(f.outer().iter().map(|fe| &fe.edge));
                }
            }
            Shape::Compound(shapes) => {
                for s in shapes {
                    s.collect_edges(out);
                }
            }
        }
    }

    /// All faces reachable from this shape
    pub fn faces(&self) -> Vec<&Face<T>> {
        let mut out = vec![];
        self.collect_faces(&mut out);
        out
    }

    fn collect_faces<'a>(&'a self, out: &mut Vec<&'a Face<T>>) {
        match self {
            Shape::Face(f) => out.push(f),
            Shape::Shell(s) => out.extend(s.faces.iter()),
            Shape::Solid(s) => out.extend(s.shell.faces.iter()),
            Shape::Compound(shapes) => {
                for s in shapes {
                    s.collect_faces(out);
                }
            }
            _ => {}
        }
    }

    /// All wires directly contained in this shape
    pub fn wires(&self) -> Vec<&Wire<T>> {
        let mut out = vec![];
        if let Shape::Wire(w) = self {
            out.push(w);
        }
        if let Shape::Compound(shapes) = self {
            for s in shapes {
                if let Shape::Wire(w) = s {
                    out.push(w);
                }
            }
        }
        out
    }
}
