// src/contour.rs - Contour synthesis from truncated elliptical Fourier series

use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::coefficients::{CoefficientSet, CoefficientStore};

/// Sample the closed contour x(t), y(t) at `num_points` parameter values
/// spanning t = 0..2pi inclusive, so the first and last points coincide.
///
/// x(t) = sum a_n cos(nt) + b_n sin(nt)
/// y(t) = sum c_n cos(nt) + d_n sin(nt)
///
/// Absent coefficients contribute nothing.
pub fn reconstruct(coefficients: &CoefficientSet, num_points: usize) -> Vec<(f64, f64)> {
    let step = if num_points > 1 {
        2.0 * PI / (num_points - 1) as f64
    } else {
        0.0
    };

    let harmonics: Vec<(f64, [f64; 4])> = (1..=coefficients.harmonics())
        .map(|n| (n as f64, coefficients.harmonic_or_zero(n)))
        .collect();

    (0..num_points)
        .map(|i| {
            let t = i as f64 * step;
            harmonics.iter().fold((0.0, 0.0), |(x, y), &(n, [a, b, c, d])| {
                let (sin, cos) = (n * t).sin_cos();
                (x + a * cos + b * sin, y + c * cos + d * sin)
            })
        })
        .collect()
}

/// Pointwise mean of several contours.
///
/// All contours must have been sampled with the same number of points.
pub fn average_contours(contours: &[Vec<(f64, f64)>]) -> Vec<(f64, f64)> {
    let Some(first) = contours.first() else {
        return Vec::new();
    };
    debug_assert!(
        contours.iter().all(|c| c.len() == first.len()),
        "contours sampled at different resolutions"
    );

    let count = contours.len() as f64;
    let mut sum = vec![(0.0, 0.0); first.len()];
    for contour in contours {
        for (acc, &(x, y)) in sum.iter_mut().zip(contour) {
            acc.0 += x;
            acc.1 += y;
        }
    }
    sum.into_iter().map(|(x, y)| (x / count, y / count)).collect()
}

/// Mean contour of one species x sex cell
#[derive(Debug, Clone)]
pub struct GroupContour {
    pub species: String,
    pub sex: String,
    pub specimen_count: usize,
    pub points: Vec<(f64, f64)>,
}

/// Reconstruct every specimen and average within each observed
/// species x sex group, ordered by (species, sex)
pub fn group_mean_contours(store: &CoefficientStore, num_points: usize) -> Vec<GroupContour> {
    let mut groups: BTreeMap<(String, String), Vec<Vec<(f64, f64)>>> = BTreeMap::new();
    for specimen in store.specimens() {
        groups
            .entry(specimen.group_key())
            .or_default()
            .push(reconstruct(&specimen.coefficients, num_points));
    }

    groups
        .into_iter()
        .map(|((species, sex), contours)| GroupContour {
            species,
            sex,
            specimen_count: contours.len(),
            points: average_contours(&contours),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::Specimen;
    use assert_approx_eq::assert_approx_eq;

    fn unit_circle() -> CoefficientSet {
        CoefficientSet::from_harmonics(&[[1.0, 0.0, 0.0, 1.0], [0.0; 4], [0.0; 4]])
    }

    #[test]
    fn unit_circle_literal_points() {
        // 5 points: t = 0, pi/2, pi, 3pi/2, 2pi
        let pts = reconstruct(&unit_circle(), 5);
        assert_eq!(pts.len(), 5);
        assert_approx_eq!(pts[0].0, 1.0, 1e-12);
        assert_approx_eq!(pts[0].1, 0.0, 1e-12);
        assert_approx_eq!(pts[1].0, 0.0, 1e-12);
        assert_approx_eq!(pts[1].1, 1.0, 1e-12);
        assert_approx_eq!(pts[2].0, -1.0, 1e-12);
    }

    #[test]
    fn contour_is_closed() {
        let set = CoefficientSet::from_harmonics(&[[1.0, 0.2, -0.1, 0.8], [0.1, 0.05, 0.02, -0.03]]);
        let pts = reconstruct(&set, 300);
        let (first, last) = (pts[0], pts[299]);
        assert_approx_eq!(first.0, last.0, 1e-9);
        assert_approx_eq!(first.1, last.1, 1e-9);
    }

    #[test]
    fn missing_harmonics_contribute_zero() {
        let mut values: Vec<Option<f64>> = unit_circle().values().to_vec();
        // drop every coefficient of harmonics 2 and 3
        for (i, v) in values.iter_mut().enumerate() {
            if i % 3 != 0 {
                *v = None;
            }
        }
        let sparse = CoefficientSet::new(3, values).unwrap();
        assert_eq!(reconstruct(&sparse, 64), reconstruct(&unit_circle(), 64));
    }

    #[test]
    fn degenerate_sizes() {
        assert!(reconstruct(&unit_circle(), 0).is_empty());
        let single = reconstruct(&unit_circle(), 1);
        assert_approx_eq!(single[0].0, 1.0, 1e-12);
    }

    #[test]
    fn group_means_average_pointwise() {
        let specimens = vec![
            Specimen::new("1", "A", "male", CoefficientSet::from_harmonics(&[[1.0, 0.0, 0.0, 1.0]])),
            Specimen::new("2", "A", "male", CoefficientSet::from_harmonics(&[[3.0, 0.0, 0.0, 3.0]])),
            Specimen::new("3", "A", "female", CoefficientSet::from_harmonics(&[[5.0, 0.0, 0.0, 5.0]])),
        ];
        let store = CoefficientStore::from_specimens(1, specimens).unwrap();
        let groups = group_mean_contours(&store, 9);
        assert_eq!(groups.len(), 2);
        assert_eq!((groups[0].sex.as_str(), groups[0].specimen_count), ("female", 1));
        let male = &groups[1];
        assert_eq!(male.specimen_count, 2);
        assert_approx_eq!(male.points[0].0, 2.0, 1e-12);
        assert_approx_eq!(male.points[2].1, 2.0, 1e-12);
    }
}
