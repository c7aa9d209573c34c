// src/normalization.rs - Size normalization of EFD coefficients by the first-harmonic semi-major axis

use nalgebra::Matrix2;
use rayon::prelude::*;

use crate::coefficients::{CoefficientSet, CoefficientStore, Specimen};
use crate::errors::{Result, WingShapeError};

/// Local fallback applied while computing the scale factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SizeFallback {
    /// First harmonic has zero extent; p was replaced by 1
    DegenerateSize,
    /// Largest eigenvalue came out slightly negative; its magnitude was used
    NegativeEigenvalue,
}

/// Semi-major axis of the first-harmonic ellipse, ready for division
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemiMajorAxis {
    pub p: f64,
    pub fallback: Option<SizeFallback>,
}

/// Result of normalizing one specimen
#[derive(Debug, Clone)]
pub struct NormalizedSpecimen {
    pub coefficients: CoefficientSet,
    pub scale: SemiMajorAxis,
}

/// Per-run counts of locally resolved numeric edge cases
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct NormalizationReport {
    pub specimens: usize,
    pub degenerate_size: usize,
    pub negative_eigenvalue: usize,
}

/// Compute p = sqrt(|lambda_max|) of M = T T^t, T = [[a1, b1], [c1, d1]].
///
/// Scaling every coefficient by k scales T by k, M by k^2 and p by k,
/// so dividing by p removes size. T is divided by its largest entry before
/// M is formed, so squaring can neither underflow nor overflow.
pub fn semi_major_axis(first_harmonic: [f64; 4]) -> SemiMajorAxis {
    let [a1, b1, c1, d1] = first_harmonic;
    let t = Matrix2::new(a1, b1, c1, d1);

    let magnitude = t.amax();
    if magnitude == 0.0 {
        return SemiMajorAxis {
            p: 1.0,
            fallback: Some(SizeFallback::DegenerateSize),
        };
    }

    let unit = t / magnitude;
    let m = unit * unit.transpose();
    let lambda_max = m
        .symmetric_eigenvalues()
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    let mut fallback = None;
    if lambda_max < 0.0 {
        fallback = Some(SizeFallback::NegativeEigenvalue);
    }
    let p = lambda_max.abs().sqrt() * magnitude;

    if p == 0.0 {
        return SemiMajorAxis {
            p: 1.0,
            fallback: Some(SizeFallback::DegenerateSize),
        };
    }

    SemiMajorAxis { p, fallback }
}

/// Rescale one specimen's coefficients to unit semi-major axis.
///
/// The input is left untouched; absent coefficients stay absent.
pub fn normalize(specimen: &Specimen) -> Result<NormalizedSpecimen> {
    let first = specimen.coefficients.first_harmonic().ok_or_else(|| {
        WingShapeError::data_format(&specimen.id, "first-harmonic coefficients (a1, b1, c1, d1) are missing")
    })?;

    if first.iter().any(|v| !v.is_finite()) {
        return Err(WingShapeError::data_format(
            &specimen.id,
            "first-harmonic coefficients must be finite",
        ));
    }

    let scale = semi_major_axis(first);
    if !scale.p.is_finite() {
        return Err(WingShapeError::Numeric(format!(
            "semi-major axis of specimen '{}' overflows",
            specimen.id
        )));
    }
    match scale.fallback {
        Some(SizeFallback::DegenerateSize) => {
            log::warn!("Specimen '{}' has zero first-harmonic size, leaving it unscaled", specimen.id)
        }
        Some(SizeFallback::NegativeEigenvalue) => {
            log::debug!("Specimen '{}': negative eigenvalue noise absorbed", specimen.id)
        }
        None => {}
    }

    Ok(NormalizedSpecimen {
        coefficients: specimen.coefficients.scaled(1.0 / scale.p),
        scale,
    })
}

/// Normalize every specimen of a store, producing a new store with the
/// same row order and metadata
pub fn normalize_store(
    store: &CoefficientStore,
    use_parallel: bool,
) -> Result<(CoefficientStore, NormalizationReport)> {
    log::info!("Normalizing {} specimens", store.len());

    let results: Vec<NormalizedSpecimen> = if use_parallel {
        store
            .specimens()
            .par_iter()
            .map(normalize)
            .collect::<Result<Vec<_>>>()?
    } else {
        store
            .specimens()
            .iter()
            .map(normalize)
            .collect::<Result<Vec<_>>>()?
    };

    let mut report = NormalizationReport {
        specimens: results.len(),
        ..Default::default()
    };
    for r in &results {
        match r.scale.fallback {
            Some(SizeFallback::DegenerateSize) => report.degenerate_size += 1,
            Some(SizeFallback::NegativeEigenvalue) => report.negative_eigenvalue += 1,
            None => {}
        }
    }

    let normalized = store.with_coefficients(results.into_iter().map(|r| r.coefficients).collect())?;
    Ok((normalized, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn wing() -> Specimen {
        Specimen::new(
            "w",
            "Lucilia sericata",
            "female",
            CoefficientSet::from_harmonics(&[
                [3.2, -0.7, 0.4, 1.9],
                [0.15, 0.02, -0.08, 0.11],
                [-0.03, 0.04, 0.01, -0.02],
            ]),
        )
    }

    fn flat(set: &CoefficientSet) -> Vec<f64> {
        set.values().iter().map(|v| v.unwrap()).collect()
    }

    #[test]
    fn circle_has_unit_axis() {
        let scale = semi_major_axis([2.0, 0.0, 0.0, 2.0]);
        assert_approx_eq!(scale.p, 2.0, 1e-12);
        assert_eq!(scale.fallback, None);
    }

    #[test]
    fn ellipse_axis_is_largest_singular_value() {
        // T = diag(3, 1) rotated: p is still 3
        let (s, c) = (0.3f64.sin(), 0.3f64.cos());
        let scale = semi_major_axis([3.0 * c, -s, 3.0 * s, c]);
        assert_approx_eq!(scale.p, 3.0, 1e-12);
    }

    #[test]
    fn scale_invariance() {
        let base = normalize(&wing()).unwrap();
        for k in [0.001, 0.5, 7.0, 1234.5] {
            let mut scaled = wing();
            scaled.coefficients = scaled.coefficients.scaled(k);
            let out = normalize(&scaled).unwrap();
            for (x, y) in flat(&out.coefficients).iter().zip(flat(&base.coefficients)) {
                assert!((x - y).abs() <= 1e-9 * y.abs().max(1e-12), "k={} {} vs {}", k, x, y);
            }
        }
    }

    #[test]
    fn scale_invariance_at_extreme_magnitudes() {
        let base = normalize(&wing()).unwrap();
        for k in [1e-170, 1e160] {
            let mut scaled = wing();
            scaled.coefficients = scaled.coefficients.scaled(k);
            let out = normalize(&scaled).unwrap();
            assert_eq!(out.scale.fallback, None, "k={}", k);
            for (x, y) in flat(&out.coefficients).iter().zip(flat(&base.coefficients)) {
                assert!((x - y).abs() <= 1e-9 * y.abs().max(1e-12), "k={} {} vs {}", k, x, y);
            }
        }
    }

    #[test]
    fn non_finite_first_harmonic_is_format_error() {
        let s = Specimen::new("inf", "X", "male", CoefficientSet::from_harmonics(&[[f64::INFINITY, 0.0, 0.0, 1.0]]));
        assert!(matches!(normalize(&s), Err(WingShapeError::DataFormat { .. })));
    }

    #[test]
    fn idempotent() {
        let once = normalize(&wing()).unwrap();
        let mut again_in = wing();
        again_in.coefficients = once.coefficients.clone();
        let twice = normalize(&again_in).unwrap();
        assert_approx_eq!(twice.scale.p, 1.0, 1e-12);
        for (x, y) in flat(&twice.coefficients).iter().zip(flat(&once.coefficients)) {
            assert_approx_eq!(*x, y, 1e-12);
        }
    }

    #[test]
    fn degenerate_specimen_stays_zero() {
        let s = Specimen::new("zero", "X", "male", CoefficientSet::from_harmonics(&[[0.0; 4], [0.0; 4]]));
        let out = normalize(&s).unwrap();
        assert_eq!(out.scale.p, 1.0);
        assert_eq!(out.scale.fallback, Some(SizeFallback::DegenerateSize));
        assert!(flat(&out.coefficients).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn missing_first_harmonic_is_format_error() {
        let set = CoefficientSet::new(1, vec![Some(1.0), None, Some(0.0), Some(1.0)]).unwrap();
        let s = Specimen::new("broken", "X", "male", set);
        match normalize(&s) {
            Err(WingShapeError::DataFormat { specimen, .. }) => assert_eq!(specimen, "broken"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn store_normalization_matches_sequential() {
        let specimens: Vec<Specimen> = (1..=6)
            .map(|i| {
                let mut s = wing();
                s.id = format!("w{}", i);
                s.coefficients = s.coefficients.scaled(i as f64);
                s
            })
            .collect();
        let store = CoefficientStore::from_specimens(3, specimens).unwrap();
        let (par, report) = normalize_store(&store, true).unwrap();
        let (seq, _) = normalize_store(&store, false).unwrap();
        assert_eq!(report.specimens, 6);
        assert_eq!(report.degenerate_size, 0);
        assert_eq!(par.specimens(), seq.specimens());
        // original store untouched
        assert_approx_eq!(store.specimens()[5].coefficients.get(crate::coefficients::Coefficient::A, 1).unwrap(), 19.2, 1e-12);
    }
}
