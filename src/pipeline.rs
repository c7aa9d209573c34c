// src/pipeline.rs - Stage orchestration: normalization, decomposition, contours, ordination

use std::path::PathBuf;

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::Serialize;

use crate::coefficients::CoefficientStore;
use crate::config::Config;
use crate::contour::{group_mean_contours, reconstruct};
use crate::design::{build_design_matrix, DesignMatrix, ModelTerm, RankDeficiency};
use crate::errors::Result;
use crate::normalization::{normalize_store, NormalizationReport};
use crate::ordination::{standardize, LdaModel, PcaModel};
use crate::output;
use crate::sscp::{type_iii_sscp, SscpResult};

/// Response used for one decomposition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Configuration {
    /// All standardized coefficient columns
    Standardized,
    /// Scores on the first k principal components of the standardized columns
    PrincipalComponents(usize),
}

/// One configuration's SSCP scores and percentage table
#[derive(Debug, Clone)]
pub struct ConfigurationResult {
    pub label: String,
    pub configuration: Configuration,
    pub responses: usize,
    pub sscp: SscpResult,
    pub percentages: Vec<(ModelTerm, f64)>,
}

/// All decompositions of one analysis run, sharing a single design
#[derive(Debug, Clone)]
pub struct DecompositionRun {
    pub design: DesignMatrix,
    pub results: Vec<ConfigurationResult>,
}

impl DecompositionRun {
    pub fn rank_deficiency(&self) -> Option<RankDeficiency> {
        self.design.rank_deficiency()
    }
}

/// Resolve requested PC counts against what the data supports.
///
/// Counts that clamp to one already listed are dropped so every label
/// appears once.
fn configurations(pc_counts: &[usize], available: usize) -> Vec<Configuration> {
    let mut out = vec![Configuration::Standardized];
    for &k in pc_counts {
        let k = if k > available {
            log::warn!("Requested {} PCs but only {} are available, using {}", k, available, available);
            available
        } else {
            k
        };
        let configuration = Configuration::PrincipalComponents(k);
        if out.contains(&configuration) {
            log::debug!("Skipping duplicate {}-PC configuration", k);
            continue;
        }
        out.push(configuration);
    }
    out
}

/// Type-III SSCP decompositions of the coefficients under every configuration
pub fn decompose_configurations(store: &CoefficientStore, config: &Config) -> Result<DecompositionRun> {
    let design = build_design_matrix(&store.species_labels(), &store.sex_labels(), config.coding)?;

    let y_std = standardize(&store.coefficient_matrix()?);
    let pca = PcaModel::fit(&y_std)?;
    let y_pca = pca.transform(&y_std, pca.n_components());

    let run_one = |configuration: &Configuration| -> Result<ConfigurationResult> {
        let (label, response): (String, DMatrix<f64>) = match *configuration {
            Configuration::Standardized => (format!("All Features ({})", y_std.ncols()), y_std.clone()),
            Configuration::PrincipalComponents(k) => (
                format!("{} PCs ({:.1}%)", k, pca.cumulative_ratio(k) * 100.0),
                y_pca.columns(0, k).into_owned(),
            ),
        };
        log::debug!("Decomposing '{}' ({} responses)", label, response.ncols());
        let sscp = type_iii_sscp(&response, &design)?;
        let percentages = sscp.percentages();
        Ok(ConfigurationResult {
            label,
            configuration: *configuration,
            responses: response.ncols(),
            sscp,
            percentages,
        })
    };

    let configs = configurations(&config.pc_counts, pca.n_components());
    log::info!("Running {} decomposition configurations", configs.len());
    let results = if config.use_parallel {
        configs.par_iter().map(run_one).collect::<Result<Vec<_>>>()?
    } else {
        configs.iter().map(run_one).collect::<Result<Vec<_>>>()?
    };

    Ok(DecompositionRun { design, results })
}

/// Score tables for the ordination outputs
#[derive(Debug, Clone)]
pub struct OrdinationScores {
    pub pca_scores: DMatrix<f64>,
    pub pca_ratios: Vec<f64>,
    pub lda_species: Option<(DMatrix<f64>, Vec<f64>)>,
    pub lda_sex: Option<(DMatrix<f64>, Vec<f64>)>,
}

/// PCA scores and species / sex discriminant scores of the standardized coefficients.
///
/// A discriminant analysis that cannot be fitted is skipped with a warning.
pub fn ordinate(store: &CoefficientStore, components: usize) -> Result<OrdinationScores> {
    let y_std = standardize(&store.coefficient_matrix()?);
    let pca = PcaModel::fit(&y_std)?;
    let k = components.min(pca.n_components());

    let lda = |labels: Vec<&str>, n: usize, factor: &str| match LdaModel::fit(&y_std, &labels, n, factor) {
        Ok(model) => Some((model.transform(&y_std), model.explained_variance_ratio)),
        Err(e) => {
            log::warn!("Skipping discriminant analysis by {}: {}", factor, e);
            None
        }
    };

    Ok(OrdinationScores {
        pca_scores: pca.transform(&y_std, k),
        pca_ratios: pca.explained_variance_ratio.iter().take(k).copied().collect(),
        lda_species: lda(store.species_labels(), components, "species"),
        lda_sex: lda(store.sex_labels(), 1, "sex"),
    })
}

/// Stages the CLI can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Decompose,
    Contours,
    Ordination,
    All,
}

impl Stage {
    fn includes(self, other: Stage) -> bool {
        self == Stage::All || self == other
    }
}

#[derive(Debug, Serialize)]
pub struct TermSummary {
    pub term: ModelTerm,
    pub score: f64,
    pub percent: f64,
}

#[derive(Debug, Serialize)]
pub struct ConfigurationSummary {
    pub label: String,
    pub responses: usize,
    pub terms: Vec<TermSummary>,
}

#[derive(Debug, Serialize)]
pub struct DesignSummary {
    pub columns: usize,
    pub rank: usize,
    pub species_levels: Vec<String>,
    pub sex_levels: Vec<String>,
    pub rank_deficiency: Option<RankDeficiency>,
}

/// Machine-readable record of a run, written as `summary.json`
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub specimens: usize,
    pub harmonics: usize,
    pub normalization: Option<NormalizationReport>,
    pub design: Option<DesignSummary>,
    pub configurations: Vec<ConfigurationSummary>,
}

fn format_ratios(ratios: &[f64]) -> String {
    ratios
        .iter()
        .map(|r| format!("{:.1}%", r * 100.0))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run the requested stages on the configured input, writing every output
pub fn run(config: &Config, stage: Stage, skip_normalization: bool) -> Result<RunSummary> {
    let out_dir = PathBuf::from(&config.output_base_dir);
    let raw = CoefficientStore::from_csv_path(&config.input_path, config)?;

    let mut summary = RunSummary {
        specimens: raw.len(),
        harmonics: raw.harmonics(),
        normalization: None,
        design: None,
        configurations: Vec::new(),
    };

    let store = if skip_normalization {
        log::info!("Input treated as already normalized");
        raw
    } else {
        let (normalized, report) = normalize_store(&raw, config.use_parallel)?;
        if report.degenerate_size > 0 {
            log::warn!("{} specimens had zero size and were left unscaled", report.degenerate_size);
        }
        output::write_coefficient_table(&normalized, out_dir.join("normalized_coefficients.csv"))?;
        summary.normalization = Some(report);
        normalized
    };

    if stage == Stage::Normalize {
        output::write_summary(&summary, out_dir.join("summary.json"))?;
        return Ok(summary);
    }

    if stage.includes(Stage::Decompose) {
        let run = decompose_configurations(&store, config)?;
        output::write_percentage_table(&run.results, out_dir.join("sscp_percentages.csv"))?;

        for result in &run.results {
            let line: Vec<String> = result
                .percentages
                .iter()
                .map(|(term, pct)| format!("{}={:.2}%", term, pct))
                .collect();
            log::info!("{:<24} {}", result.label, line.join("  "));
        }

        summary.design = Some(DesignSummary {
            columns: run.design.matrix().ncols(),
            rank: run.design.rank(),
            species_levels: run.design.species_levels().to_vec(),
            sex_levels: run.design.sex_levels().to_vec(),
            rank_deficiency: run.rank_deficiency(),
        });
        summary.configurations = run
            .results
            .iter()
            .map(|r| ConfigurationSummary {
                label: r.label.clone(),
                responses: r.responses,
                terms: r
                    .sscp
                    .scores
                    .iter()
                    .zip(&r.percentages)
                    .map(|(&(term, score), &(_, percent))| TermSummary { term, score, percent })
                    .collect(),
            })
            .collect();
    }

    if stage.includes(Stage::Contours) {
        let groups = group_mean_contours(&store, config.contour_points);
        log::info!("Synthesized mean contours for {} species x sex groups", groups.len());
        output::write_group_contours(&groups, out_dir.join("contours").join("group_means.csv"))?;

        if config.write_individual_contours {
            let contours: Vec<(String, Vec<(f64, f64)>)> = store
                .specimens()
                .iter()
                .map(|s| (s.id.clone(), reconstruct(&s.coefficients, config.contour_points)))
                .collect();
            output::write_specimen_contours(&contours, out_dir.join("contours").join("specimens.csv"))?;
        }
    }

    if stage.includes(Stage::Ordination) {
        let scores = ordinate(&store, config.ordination_components)?;
        let dir = out_dir.join("ordination");
        output::write_score_table(&store, &scores.pca_scores, "PC", dir.join("pca_scores.csv"))?;
        log::info!("PCA explained variance: {}", format_ratios(&scores.pca_ratios));
        for (factor, lda) in [("species", &scores.lda_species), ("sex", &scores.lda_sex)] {
            if let Some((s, ratios)) = lda {
                log::info!("LDA by {} explained variance: {}", factor, format_ratios(ratios));
                output::write_score_table(&store, s, "LD", dir.join(format!("lda_{}.csv", factor)))?;
            }
        }
    }

    output::write_summary(&summary, out_dir.join("summary.json"))?;
    Ok(summary)
}
