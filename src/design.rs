// src/design.rs - Factorial design matrix for species x sex models

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;

use nalgebra::DMatrix;
use serde::{Serialize, Serializer};

use crate::config::Coding;
use crate::errors::{Result, WingShapeError};
use crate::linalg;

/// A term of the `species * sex` model, plus the residual pseudo-term
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelTerm {
    Intercept,
    Species,
    Sex,
    SpeciesBySex,
    Residual,
}

impl ModelTerm {
    pub fn label(self) -> &'static str {
        match self {
            ModelTerm::Intercept => "Intercept",
            ModelTerm::Species => "species",
            ModelTerm::Sex => "sex",
            ModelTerm::SpeciesBySex => "species:sex",
            ModelTerm::Residual => "Residuals",
        }
    }
}

impl fmt::Display for ModelTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ModelTerm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Contiguous design columns belonging to one term
#[derive(Debug, Clone, PartialEq)]
pub struct TermSlice {
    pub term: ModelTerm,
    pub columns: Range<usize>,
    pub column_names: Vec<String>,
}

/// The design's numerical rank fell short of its column count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankDeficiency {
    pub columns: usize,
    pub rank: usize,
}

/// Intercept + species + sex + species:sex encoding of the factor labels.
///
/// Built once per label set and shared, read-only, by every decomposition.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    matrix: DMatrix<f64>,
    terms: Vec<TermSlice>,
    species_levels: Vec<String>,
    sex_levels: Vec<String>,
    rank: usize,
}

impl DesignMatrix {
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn terms(&self) -> &[TermSlice] {
        &self.terms
    }

    pub fn term(&self, term: ModelTerm) -> Option<&TermSlice> {
        self.terms.iter().find(|t| t.term == term)
    }

    pub fn species_levels(&self) -> &[String] {
        &self.species_levels
    }

    pub fn sex_levels(&self) -> &[String] {
        &self.sex_levels
    }

    pub fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// `Some` when aliased or empty cells leave the design short of full rank
    pub fn rank_deficiency(&self) -> Option<RankDeficiency> {
        (self.rank < self.matrix.ncols()).then_some(RankDeficiency {
            columns: self.matrix.ncols(),
            rank: self.rank,
        })
    }
}

/// Sorted distinct labels
fn levels(labels: &[&str]) -> Vec<String> {
    labels
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Contrast matrix rows (one per level) with `levels - 1` columns
fn contrasts(n_levels: usize, coding: Coding) -> Vec<Vec<f64>> {
    let k = n_levels.saturating_sub(1);
    (0..n_levels)
        .map(|level| match coding {
            Coding::Treatment => (1..n_levels).map(|j| if level == j { 1.0 } else { 0.0 }).collect(),
            Coding::Sum => (0..k)
                .map(|j| {
                    if level == j {
                        1.0
                    } else if level == k {
                        -1.0
                    } else {
                        0.0
                    }
                })
                .collect(),
        })
        .collect()
}

/// Names of the contrast columns for one factor
fn contrast_names(factor: &str, levels: &[String], coding: Coding) -> Vec<String> {
    match coding {
        Coding::Treatment => levels[1..].iter().map(|l| format!("{}[T.{}]", factor, l)).collect(),
        Coding::Sum => levels[..levels.len().saturating_sub(1)]
            .iter()
            .map(|l| format!("{}[S.{}]", factor, l))
            .collect(),
    }
}

/// Encode species and sex labels as a full factorial design with intercept
pub fn build_design_matrix(species: &[&str], sex: &[&str], coding: Coding) -> Result<DesignMatrix> {
    if species.len() != sex.len() {
        return Err(WingShapeError::Numeric(format!(
            "{} species labels but {} sex labels",
            species.len(),
            sex.len()
        )));
    }
    if species.is_empty() {
        return Err(WingShapeError::EmptyDataset);
    }

    let species_levels = levels(species);
    let sex_levels = levels(sex);
    let species_contrasts = contrasts(species_levels.len(), coding);
    let sex_contrasts = contrasts(sex_levels.len(), coding);

    let species_names = contrast_names("species", &species_levels, coding);
    let sex_names = contrast_names("sex", &sex_levels, coding);
    let interaction_names: Vec<String> = species_names
        .iter()
        .flat_map(|sp| sex_names.iter().map(move |sx| format!("{}:{}", sp, sx)))
        .collect();

    let n_species = species_names.len();
    let n_sex = sex_names.len();
    let n_cols = 1 + n_species + n_sex + n_species * n_sex;

    let mut terms = Vec::with_capacity(4);
    let mut start = 0;
    for (term, names) in [
        (ModelTerm::Intercept, vec!["Intercept".to_string()]),
        (ModelTerm::Species, species_names),
        (ModelTerm::Sex, sex_names),
        (ModelTerm::SpeciesBySex, interaction_names),
    ] {
        let end = start + names.len();
        terms.push(TermSlice {
            term,
            columns: start..end,
            column_names: names,
        });
        start = end;
    }

    let mut matrix = DMatrix::zeros(species.len(), n_cols);
    for (row, (sp, sx)) in species.iter().zip(sex).enumerate() {
        // labels come from the same slices, so the lookups cannot miss
        let sp_row = &species_contrasts[species_levels.iter().position(|l| l == sp).unwrap_or(0)];
        let sx_row = &sex_contrasts[sex_levels.iter().position(|l| l == sx).unwrap_or(0)];

        matrix[(row, 0)] = 1.0;
        for (j, v) in sp_row.iter().enumerate() {
            matrix[(row, 1 + j)] = *v;
        }
        for (j, v) in sx_row.iter().enumerate() {
            matrix[(row, 1 + n_species + j)] = *v;
        }
        for (i, a) in sp_row.iter().enumerate() {
            for (j, b) in sx_row.iter().enumerate() {
                matrix[(row, 1 + n_species + n_sex + i * n_sex + j)] = a * b;
            }
        }
    }

    let rank = linalg::rank(&matrix);
    let design = DesignMatrix {
        matrix,
        terms,
        species_levels,
        sex_levels,
        rank,
    };

    log::info!(
        "Design matrix: {} rows x {} columns ({} species, {} sexes, {:?} coding), rank {}",
        design.nrows(),
        n_cols,
        design.species_levels.len(),
        design.sex_levels.len(),
        coding,
        rank
    );
    if let Some(deficiency) = design.rank_deficiency() {
        log::warn!(
            "Design is rank deficient ({} of {} columns); aliased effects are absorbed by the pseudo-inverse",
            deficiency.rank,
            deficiency.columns
        );
    }

    Ok(design)
}
