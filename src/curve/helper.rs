use nalgebra::Point2;

use crate::misc::{FloatingPoint, Line};

use super::NurbsCurve2D;

/// Intersections between two 2D curves restricted to parameter ranges.
/// Both curves are tessellated; crossing chord pairs are refined by
/// shrinking local chords around the hit.
/// Returns `(parameter on a, parameter on b, point)` triples.
pub fn intersect_curves_2d<T: FloatingPoint>(
    a: &NurbsCurve2D<T>,
    af: T,
    al: T,
    b: &NurbsCurve2D<T>,
    bf: T,
    bl: T,
) -> Vec<(T, T, Point2<T>)> {
    let na = (a.pole_count() * 8).max(48);
    let nb = (b.pole_count() * 8).max(48);
    let pa = a.sample_regular_range_with_parameter(af, al, na);
    let pb = b.sample_regular_range_with_parameter(bf, bl, nb);

    let mut out: Vec<(T, T, Point2<T>)> = vec![];
    let min_gap = (al - af) / T::from_usize(na).unwrap();

    for wa in pa.windows(2) {
        let seg_a = Line::with_params(wa[0].1, wa[1].1, wa[0].0, wa[1].0);
        for wb in pb.windows(2) {
            let seg_b = Line::with_params(wb[0].1, wb[1].1, wb[0].0, wb[1].0);
            if let Some((point, ta, tb)) = seg_a.intersection(&seg_b) {
                // keep one hit per crossing
                let duplicate = out
                    .iter()
                    .any(|(prev, _, _)| (*prev - ta).abs() < min_gap);
                if !duplicate {
                    out.push((ta, tb, point));
                }
            }
        }
    }

    // shrink local chords around each hit to polish the parameters
    let half = T::from_f64(0.5).unwrap();
    for (ta, tb, point) in out.iter_mut() {
        let mut ha = (al - af) / T::from_usize(na).unwrap();
        let mut hb = (bl - bf) / T::from_usize(nb).unwrap();
        for _ in 0..8 {
            let (a0, a1) = ((*ta - ha).max(af), (*ta + ha).min(al));
            let (b0, b1) = ((*tb - hb).max(bf), (*tb + hb).min(bl));
            let chord_a = Line::with_params(a.point_at(a0), a.point_at(a1), a0, a1);
            let chord_b = Line::with_params(b.point_at(b0), b.point_at(b1), b0, b1);
            if let Some((p, ra, rb)) = chord_a.intersection(&chord_b) {
                *ta = ra;
                *tb = rb;
                *point = p;
            } else {
                break;
            }
            ha *= half;
            hb *= half;
        }
    }

    out
}
