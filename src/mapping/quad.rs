use nalgebra::{Point2, Point4};

use crate::curve::NurbsCurve2D;
use crate::errors::{Error, Result};
use crate::misc::FloatingPoint;
use crate::surface::NurbsSurface3D;
use crate::topology::Face;

/// Rectangular bilinear transfer surface.
///
/// The pole rectangle (the *limits*) lives in the source geometry plane;
/// the knot rectangle (the *bounds*) is the target parameter range.
/// The mapping between the two stays affine through every manipulation.
#[derive(Debug, Clone)]
pub struct Quad<T: FloatingPoint> {
    surface: NurbsSurface3D<T>,
}

impl<T: FloatingPoint> Quad<T> {
    /// A quad whose limits and bounds both equal `(u0, u1, v0, v1)`
    pub fn new(limits: (T, T, T, T)) -> Self {
        let (u0, u1, v0, v1) = limits;
        let surface = NurbsSurface3D::new(
            1,
            1,
            vec![u0, u0, u1, u1],
            vec![v0, v0, v1, v1],
            vec![
                vec![
                    Point4::new(u0, v0, T::zero(), T::one()),
                    Point4::new(u0, v1, T::zero(), T::one()),
                ],
                vec![
                    Point4::new(u1, v0, T::zero(), T::one()),
                    Point4::new(u1, v1, T::zero(), T::one()),
                ],
            ],
        );
        Self { surface }
    }

    pub fn surface(&self) -> &NurbsSurface3D<T> {
        &self.surface
    }

    pub fn face(&self) -> Result<Face<T>> {
        Face::from_surface(self.surface.clone())
    }

    /// Corner rectangle of the pole grid
    pub fn limits(&self) -> (T, T, T, T) {
        let grid = self.surface.control_points();
        let p00 = &grid[0][0];
        let p11 = &grid[1][1];
        (
            p00[0] / p00[3],
            p11[0] / p11[3],
            p00[1] / p00[3],
            p11[1] / p11[3],
        )
    }

    pub fn set_limits(&mut self, limits: (T, T, T, T)) {
        let (u0, u1, v0, v1) = limits;
        let mut rebuilt = Quad::new((u0, u1, v0, v1));
        let bounds = self.bounds();
        rebuilt.set_bounds(bounds);
        self.surface = rebuilt.surface;
    }

    /// Knot rectangle, i.e. the parameter range of the mapping target
    pub fn bounds(&self) -> (T, T, T, T) {
        self.surface.bounds()
    }

    pub fn set_bounds(&mut self, bounds: (T, T, T, T)) {
        let (u0, u1, v0, v1) = bounds;
        // degree-1 knot vectors carry exactly the two bound values
        let _ = self.surface.try_set_u_knots(vec![u0, u0, u1, u1]);
        let _ = self.surface.try_set_v_knots(vec![v0, v0, v1, v1]);
    }

    /// Enlarge the limits while moving the bounds proportionally,
    /// preserving the affine correspondence.
    pub fn extend(&mut self, du: T, dv: T) {
        let (u0, u1, v0, v1) = self.limits();
        self.extend_to((u0 - du, u1 + du, v0 - dv, v1 + dv));
    }

    /// Extend the limits to an explicit rectangle, adjusting the bounds
    /// proportionally on every side that grows.
    pub fn extend_to(&mut self, new_limits: (T, T, T, T)) {
        let (u0, u1, v0, v1) = self.limits();
        let (s0, s1, t0, t1) = new_limits;
        let (ku0, ku1, kv0, kv1) = self.bounds();
        let (mut nu0, mut nu1, mut nv0, mut nv1) = (ku0, ku1, kv0, kv1);

        if s0 < u0 {
            nu0 += (ku1 - ku0) * (s0 - u0) / (u1 - u0);
        }
        if s1 > u1 {
            nu1 += (ku1 - ku0) * (s1 - u1) / (u1 - u0);
        }
        if t0 < v0 {
            nv0 += (kv1 - kv0) * (t0 - v0) / (v1 - v0);
        }
        if t1 > v1 {
            nv1 += (kv1 - kv0) * (t1 - v1) / (v1 - v0);
        }
        self.set_limits((s0, s1, t0, t1));
        self.set_bounds((nu0, nu1, nv0, nv1));
    }

    /// Mirror the mapping in the u direction
    pub fn reverse_u(&mut self) {
        let grid = self.surface.control_points().clone();
        let rebuilt = vec![
            vec![grid[1][0].clone(), grid[1][1].clone()],
            vec![grid[0][0].clone(), grid[0][1].clone()],
        ];
        self.replace_grid(rebuilt);
    }

    /// Mirror the mapping in the v direction
    pub fn reverse_v(&mut self) {
        let grid = self.surface.control_points().clone();
        let rebuilt = vec![
            vec![grid[0][1].clone(), grid[0][0].clone()],
            vec![grid[1][1].clone(), grid[1][0].clone()],
        ];
        self.replace_grid(rebuilt);
    }

    /// Exchange the roles of u and v: the source x axis maps to the
    /// target v direction and vice versa.
    pub fn swap_uv(&mut self) {
        let grid = self.surface.control_points().clone();
        let transposed = vec![
            vec![grid[0][0].clone(), grid[1][0].clone()],
            vec![grid[0][1].clone(), grid[1][1].clone()],
        ];
        let (u0, u1, v0, v1) = self.bounds();
        self.surface = NurbsSurface3D::new(
            1,
            1,
            vec![v0, v0, v1, v1],
            vec![u0, u0, u1, u1],
            transposed,
        );
    }

    fn replace_grid(&mut self, grid: Vec<Vec<Point4<T>>>) {
        let (u0, u1, v0, v1) = self.bounds();
        self.surface = NurbsSurface3D::new(
            1,
            1,
            vec![u0, u0, u1, u1],
            vec![v0, v0, v1, v1],
            grid,
        );
    }

    /// Target parameters of a source plane point
    pub fn parameter(&self, point: &Point2<T>) -> Result<(T, T)> {
        let p3 = nalgebra::Point3::new(point.x, point.y, T::zero());
        self.surface.find_closest_parameter(&p3)
    }

    /// Map a source plane pcurve into the target parameter space.
    /// The mapping is affine, so transforming the poles is exact.
    pub fn map_pcurve(&self, pcurve: &NurbsCurve2D<T>) -> Result<NurbsCurve2D<T>> {
        let mut mapped = pcurve.clone();
        for i in 0..pcurve.pole_count() {
            let pole = pcurve.pole_at(i);
            let (u, v) = self.parameter(&pole)?;
            mapped.set_pole(i, &Point2::new(u, v));
        }
        Ok(mapped)
    }
}

/// The stretched transfer plane of the mapping feature: source sketch
/// bounds on the pole side, the target face parameter range on the knot
/// side, massively extended so projections slightly outside the sketch
/// still land on it.
pub fn stretched_quad<T: FloatingPoint>(
    sketch_bounds: (T, T, T, T),
    target_range: (T, T, T, T),
    extension: T,
) -> Result<Quad<T>> {
    let (x0, x1, y0, y1) = sketch_bounds;
    if x1 - x0 <= T::default_epsilon() || y1 - y0 <= T::default_epsilon() {
        return Err(Error::InvalidInput(
            "degenerate sketch bounds".to_string(),
        ));
    }
    let mut quad = Quad::new(sketch_bounds);
    quad.set_bounds(target_range);
    if extension > T::zero() {
        let dx = (x1 - x0) * extension;
        let dy = (y1 - y0) * extension;
        quad.extend(dx, dy);
    }
    Ok(quad)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    use super::*;

    #[test]
    fn identity_quad_maps_points_to_themselves() {
        let quad = Quad::new((0.0_f64, 2.0, 0.0, 1.0));
        let (u, v) = quad.parameter(&Point2::new(0.5, 0.25)).unwrap();
        assert_relative_eq!(u, 0.5, epsilon = 1e-6);
        assert_relative_eq!(v, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn bounds_rescale_the_mapping() {
        let mut quad = Quad::new((0.0_f64, 2.0, 0.0, 2.0));
        quad.set_bounds((0.0, 1.0, 0.0, 4.0));
        let (u, v) = quad.parameter(&Point2::new(1.0, 1.0)).unwrap();
        assert_relative_eq!(u, 0.5, epsilon = 1e-6);
        assert_relative_eq!(v, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn extension_preserves_the_affine_map() {
        let mut quad = Quad::new((0.0_f64, 2.0, 0.0, 2.0));
        quad.set_bounds((0.0, 1.0, 0.0, 1.0));
        quad.extend(2.0, 2.0);
        // interior points keep their image
        let (u, v) = quad.parameter(&Point2::new(1.0, 1.0)).unwrap();
        assert_relative_eq!(u, 0.5, epsilon = 1e-6);
        assert_relative_eq!(v, 0.5, epsilon = 1e-6);
        // points outside the original limits now resolve too
        let (u, v) = quad.parameter(&Point2::new(-1.0, 3.0)).unwrap();
        assert_relative_eq!(u, -0.5, epsilon = 1e-6);
        assert_relative_eq!(v, 1.5, epsilon = 1e-6);
    }

    #[test]
    fn reverse_u_mirrors_the_image() {
        let mut quad = Quad::new((0.0_f64, 1.0, 0.0, 1.0));
        quad.reverse_u();
        let (u, v) = quad.parameter(&Point2::new(0.25, 0.5)).unwrap();
        assert_relative_eq!(u, 0.75, epsilon = 1e-6);
        assert_relative_eq!(v, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn swap_uv_exchanges_directions() {
        let mut quad = Quad::new((0.0_f64, 1.0, 0.0, 1.0));
        quad.swap_uv();
        let (u, v) = quad.parameter(&Point2::new(0.25, 0.5)).unwrap();
        assert_relative_eq!(u, 0.5, epsilon = 1e-6);
        assert_relative_eq!(v, 0.25, epsilon = 1e-6);
    }
}
