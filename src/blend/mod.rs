//! Blend surfaces between two curves-on-surfaces: sampled cross Beziers,
//! scale profiles and a Gordon-style assembly of the surface network.

pub mod scaling;
pub use scaling::*;

use log::debug;

use crate::compat::match_surfaces;
use crate::cos::CurveOnSurface;
use crate::curve::NurbsCurve3D;
use crate::errors::{Error, Result};
use crate::knot::KnotVector;
use crate::misc::FloatingPoint;
use crate::surface::NurbsSurface3D;
use crate::topology::Face;

/// A cubic blend section between two rail points, with handles along the
/// rail binormals sized by a third of the chord times the scale.
fn blend_section<T: FloatingPoint>(
    cos1: &CurveOnSurface<T>,
    t1: T,
    cos2: &CurveOnSurface<T>,
    t2: T,
    scale1: T,
    scale2: T,
) -> Result<NurbsCurve3D<T>> {
    let p1 = cos1.value_at(t1)?;
    let p2 = cos2.value_at(t2)?;
    let chord = (p2 - p1).norm();
    if chord <= T::default_epsilon() {
        return Err(Error::GeometricDegeneracy(
            "blend rails touch at the sampled parameter".to_string(),
        ));
    }
    let third = chord / T::from_f64(3.0).unwrap();
    let h1 = cos1.binormal_at(t1)? * (third * scale1);
    let h2 = cos2.binormal_at(t2)? * (third * scale2);

    let poles = vec![p1, p1 + h1, p2 + h2, p2];
    let homogeneous = poles
        .iter()
        .map(|p| crate::curve::nurbs_curve::homogenize(p, T::one()))
        .collect();
    Ok(NurbsCurve3D::new_unchecked(
        3,
        homogeneous,
        KnotVector::new(vec![
            T::zero(),
            T::zero(),
            T::zero(),
            T::zero(),
            T::one(),
            T::one(),
            T::one(),
            T::one(),
        ]),
    ))
}

/// Blend surface between two curves-on-surfaces.
pub struct BlendSurface<T: FloatingPoint> {
    cos1: CurveOnSurface<T>,
    cos2: CurveOnSurface<T>,
    pub scale1: T,
    pub scale2: T,
    /// variable scale profile overriding the constant scales
    pub scaling: Option<ScalingCurve<T>>,
    pub rail_samples: usize,
    pub untwist: bool,
    sections: Vec<NurbsCurve3D<T>>,
    parameters: Vec<T>,
}

impl<T: FloatingPoint> BlendSurface<T> {
    pub fn new(cos1: CurveOnSurface<T>, cos2: CurveOnSurface<T>) -> Self {
        Self {
            cos1,
            cos2,
            scale1: T::one(),
            scale2: T::one(),
            scaling: None,
            rail_samples: 20,
            untwist: false,
            sections: vec![],
            parameters: vec![],
        }
    }

    pub fn sections(&self) -> &[NurbsCurve3D<T>] {
        &self.sections
    }

    /// The straight connector between the two rails
    pub fn ruled_surface(&self) -> Result<NurbsSurface3D<T>> {
        let r1 = self.rail_curve(&self.cos1)?;
        let r2 = self.rail_curve(&self.cos2)?;
        NurbsSurface3D::try_ruled(&r1, &r2)
    }

    fn rail_curve(&self, cos: &CurveOnSurface<T>) -> Result<NurbsCurve3D<T>> {
        match cos.edge_on_face() {
            Some(e) => e.try_trimmed_curve(),
            None => cos.edge().try_trimmed_curve(),
        }
    }

    /// Uniform arc-length fractions along the connector, mapped back to
    /// the connector's u domain
    pub fn sample(&self, num: usize) -> Result<Vec<T>> {
        let num = num.max(2);
        let ruled = self.ruled_surface()?;
        let (_, _, v0, _) = ruled.bounds();
        let rail = ruled.v_iso(v0);

        let total = rail.try_length()?;
        let tol = T::from_f64(1e-9).unwrap();
        let mut params = vec![];
        for i in 0..num {
            let f = T::from_usize(i).unwrap() / T::from_usize(num - 1).unwrap();
            params.push(rail.try_parameter_at_length(total * f, tol)?);
        }
        Ok(params)
    }

    /// Map a connector parameter to a rail's own sub-range
    fn rail_parameter(&self, cos: &CurveOnSurface<T>, fraction: T, reverse: bool) -> T {
        let range = cos.last_parameter() - cos.first_parameter();
        if reverse {
            cos.last_parameter() - fraction * range
        } else {
            cos.first_parameter() + fraction * range
        }
    }

    /// Build the cross sections at uniformly spaced arc-length samples
    pub fn perform(&mut self, num: usize) -> Result<()> {
        let params = self.sample(num)?;
        let ruled = self.ruled_surface()?;
        let (u0, u1, _, _) = ruled.bounds();

        let scales = match &self.scaling {
            Some(profile) => {
                let fractions: Vec<T> =
                    params.iter().map(|p| (*p - u0) / (u1 - u0)).collect();
                profile.sample(&fractions)?
            }
            None => vec![(self.scale1, self.scale2); params.len()],
        };

        let mut sections = vec![];
        for (p, (s1, s2)) in params.iter().zip(scales.iter()) {
            let fraction = (*p - u0) / (u1 - u0);
            let t1 = self.rail_parameter(&self.cos1, fraction, false);
            let t2 = self.rail_parameter(&self.cos2, fraction, self.untwist);
            sections.push(blend_section(
                &self.cos1, t1, &self.cos2, t2, *s1, *s2,
            )?);
        }
        debug!("built {} blend sections", sections.len());
        self.sections = sections;
        self.parameters = params;
        Ok(())
    }

    /// Assemble the Gordon-style surface: the loft through the sections,
    /// plus the ruled connector, minus the bilinear interpolator, all
    /// harmonized to a common structure before the pole exchange.
    pub fn surface(&mut self) -> Result<NurbsSurface3D<T>> {
        if self.sections.is_empty() {
            self.perform(self.rail_samples)?;
        }

        // loft through the sections: u along each section, v across
        let mut s1 =
            NurbsSurface3D::try_loft(&self.sections, Some(self.parameters.as_slice()), Some(3))?;

        // ruled connector between the rails, reoriented to match
        let mut s2 = self.ruled_surface()?;
        s2.exchange_uv();

        // bilinear interpolator between the section boundaries of the loft
        let (su0, su1, _, _) = s1.bounds();
        let mut s3 = NurbsSurface3D::try_ruled(&s1.u_iso(su0), &s1.u_iso(su1))?;
        s3.exchange_uv();

        match_surfaces(&mut s1, &mut s2)?;
        match_surfaces(&mut s2, &mut s3)?;
        match_surfaces(&mut s3, &mut s1)?;
        // close the loop: the third pass may have refined s1 again
        match_surfaces(&mut s1, &mut s2)?;
        match_surfaces(&mut s2, &mut s3)?;

        gordon_combine(&s1, &s2, &s3)
    }

    pub fn face(&mut self) -> Result<Face<T>> {
        Face::from_surface(self.surface()?)
    }
}

/// `G = S1 + S2 - S3` over the pole grids of three structure-matched
/// surfaces
fn gordon_combine<T: FloatingPoint>(
    s1: &NurbsSurface3D<T>,
    s2: &NurbsSurface3D<T>,
    s3: &NurbsSurface3D<T>,
) -> Result<NurbsSurface3D<T>> {
    let g1 = s1.control_points();
    let g2 = s2.control_points();
    let g3 = s3.control_points();
    if g1.len() != g2.len()
        || g1.len() != g3.len()
        || g1[0].len() != g2[0].len()
        || g1[0].len() != g3[0].len()
    {
        return Err(Error::KernelFailure(
            "surfaces were not harmonized before the pole exchange".to_string(),
        ));
    }

    let combined: Vec<Vec<nalgebra::Point4<T>>> = g1
        .iter()
        .zip(g2.iter())
        .zip(g3.iter())
        .map(|((r1, r2), r3)| {
            r1.iter()
                .zip(r2.iter())
                .zip(r3.iter())
                .map(|((p1, p2), p3)| {
                    nalgebra::Point4::from(p1.coords + p2.coords - p3.coords)
                })
                .collect()
        })
        .collect();

    Ok(NurbsSurface3D::new(
        s1.u_degree(),
        s1.v_degree(),
        s1.u_knots().to_vec(),
        s1.v_knots().to_vec(),
        combined,
    ))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Point4;

    use super::*;
    use crate::cos::CurveOnSurface;
    use crate::surface::NurbsSurface3D;
    use crate::topology::Face;

    /// A flat strip in the plane z = 0 covering `[x0, x1] x [y0, y1]`
    fn strip(x0: f64, x1: f64, y0: f64, y1: f64) -> Face<f64> {
        let surface = NurbsSurface3D::new(
            1,
            1,
            vec![0., 0., 1., 1.],
            vec![0., 0., 1., 1.],
            vec![
                vec![
                    Point4::new(x0, y0, 0., 1.),
                    Point4::new(x0, y1, 0., 1.),
                ],
                vec![
                    Point4::new(x1, y0, 0., 1.),
                    Point4::new(x1, y1, 0., 1.),
                ],
            ],
        );
        Face::from_surface(surface).unwrap()
    }

    fn coplanar_blend() -> BlendSurface<f64> {
        // two strips with facing edges at y = 1 and y = 2
        let f1 = strip(0.0, 3.0, 0.0, 1.0);
        let f2 = strip(0.0, 3.0, 2.0, 3.0);
        // top edge of the first strip, bottom edge of the second
        let e1 = f1.outer()[2].edge.clone();
        let e2 = f2.outer()[0].edge.clone();
        let mut cos1 = CurveOnSurface::new(e1, f1, 1e-7);
        let cos2 = CurveOnSurface::new(e2, f2, 1e-7);
        assert!(cos1.is_valid() && cos2.is_valid());
        // aim the first rail's binormal across the gap
        cos1.reverse_binormal = true;
        BlendSurface::new(cos1, cos2)
    }

    #[test]
    fn sections_connect_the_rails() {
        let mut blend = coplanar_blend();
        blend.perform(8).unwrap();
        assert_eq!(blend.sections().len(), 8);
        for section in blend.sections() {
            let start = section.first_point();
            let end = section.last_point();
            assert_relative_eq!(start.y, 1.0, epsilon = 1e-6);
            assert_relative_eq!(end.y, 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn coplanar_blend_stays_in_plane() {
        let mut blend = coplanar_blend();
        let surface = blend.surface().unwrap();
        let (u0, u1, v0, v1) = surface.bounds();
        for i in 0..=6 {
            for j in 0..=6 {
                let u = u0 + (u1 - u0) * (i as f64) / 6.0;
                let v = v0 + (v1 - v0) * (j as f64) / 6.0;
                let p = surface.point_at(u, v);
                assert_relative_eq!(p.z, 0.0, epsilon = 1e-7);
                assert!(p.y >= 1.0 - 1e-6 && p.y <= 2.0 + 1e-6);
            }
        }
    }

    #[test]
    fn blend_surface_interpolates_both_rails() {
        let mut blend = coplanar_blend();
        let surface = blend.surface().unwrap();
        let (u0, u1, v0, v1) = surface.bounds();
        for j in 0..=8 {
            let v = v0 + (v1 - v0) * (j as f64) / 8.0;
            let a = surface.point_at(u0, v);
            let b = surface.point_at(u1, v);
            assert_relative_eq!(a.y, 1.0, epsilon = 1e-5);
            assert_relative_eq!(b.y, 2.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn variable_scaling_is_accepted() {
        let mut blend = coplanar_blend();
        blend.scaling = Some(
            ScalingCurve::try_new(vec![(0.0, 1.0, 1.0), (1.0, 0.5, 2.0)], false).unwrap(),
        );
        blend.perform(6).unwrap();
        assert_eq!(blend.sections().len(), 6);
    }
}
