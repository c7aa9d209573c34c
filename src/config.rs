// src/config.rs - Analysis configuration loaded from TOML

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::errors::{WingShapeError, Result};

/// Configuration for WingShapeR
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub input_path: String,
    pub output_base_dir: String,

    /// Harmonic order H; every specimen carries 4H coefficients
    #[serde(default = "default_harmonics")]
    pub harmonics: usize,

    /// The four coefficient symbols, in a/b/c/d order
    #[serde(default = "default_coefficient_symbols")]
    pub coefficient_symbols: String,

    #[serde(default = "default_species_column")]
    pub species_column: String,

    #[serde(default = "default_sex_column")]
    pub sex_column: String,

    /// Optional identifier column; rows without one are named by position
    #[serde(default = "default_id_column")]
    pub id_column: String,

    // Contour synthesis
    #[serde(default = "default_contour_points")]
    pub contour_points: usize,

    #[serde(default = "default_write_individual_contours")]
    pub write_individual_contours: bool,

    // Variance decomposition
    #[serde(default = "default_pc_counts")]
    pub pc_counts: Vec<usize>,

    #[serde(default)]
    pub coding: Coding,

    // Ordination score tables
    #[serde(default = "default_ordination_components")]
    pub ordination_components: usize,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,
}

/// Categorical coding scheme for the factorial design
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Coding {
    /// Dummy coding against the first (sorted) level
    #[default]
    Treatment,
    /// Deviation coding (+1 / -1 against the last level); orthogonal for balanced designs
    Sum,
}

fn default_harmonics() -> usize {
    10
}

fn default_coefficient_symbols() -> String {
    "abcd".to_string()
}

fn default_species_column() -> String {
    "species".to_string()
}

fn default_sex_column() -> String {
    "sex".to_string()
}

fn default_id_column() -> String {
    "image_id".to_string()
}

fn default_contour_points() -> usize {
    300
}

fn default_write_individual_contours() -> bool {
    false
}

fn default_pc_counts() -> Vec<usize> {
    vec![10, 20, 30, 40]
}

fn default_ordination_components() -> usize {
    3
}

fn default_parallel() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: "./efd_coefficients.csv".to_string(),
            output_base_dir: "./output".to_string(),
            harmonics: default_harmonics(),
            coefficient_symbols: default_coefficient_symbols(),
            species_column: default_species_column(),
            sex_column: default_sex_column(),
            id_column: default_id_column(),
            contour_points: default_contour_points(),
            write_individual_contours: default_write_individual_contours(),
            pc_counts: default_pc_counts(),
            coding: Coding::default(),
            ordination_components: default_ordination_components(),
            use_parallel: default_parallel(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            WingShapeError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| WingShapeError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::info!(
                "Config file '{}' not found, using defaults",
                path.as_ref().display()
            );
            Ok(Self::default())
        }
    }

    /// The four coefficient symbols as chars, in a/b/c/d order
    pub fn symbols(&self) -> [char; 4] {
        let mut out = ['a', 'b', 'c', 'd'];
        for (slot, c) in out.iter_mut().zip(self.coefficient_symbols.chars()) {
            *slot = c;
        }
        out
    }

    /// Validate numeric parameters (does not touch the filesystem)
    pub fn validate(&self) -> Result<()> {
        if self.harmonics == 0 {
            return Err(WingShapeError::Config(
                "harmonics must be > 0".to_string(),
            ));
        }

        let symbols: Vec<char> = self.coefficient_symbols.chars().collect();
        if symbols.len() != 4 {
            return Err(WingShapeError::Config(format!(
                "coefficient_symbols must contain exactly 4 characters, got '{}'",
                self.coefficient_symbols
            )));
        }
        for (i, c) in symbols.iter().enumerate() {
            if symbols[i + 1..].contains(c) {
                return Err(WingShapeError::Config(format!(
                    "coefficient_symbols contains duplicate symbol '{}'",
                    c
                )));
            }
        }

        if self.species_column.is_empty() || self.sex_column.is_empty() {
            return Err(WingShapeError::Config(
                "species_column and sex_column must be non-empty".to_string(),
            ));
        }

        if self.contour_points < 2 {
            return Err(WingShapeError::Config(
                "contour_points must be >= 2".to_string(),
            ));
        }

        if self.pc_counts.iter().any(|&k| k == 0) {
            return Err(WingShapeError::Config(
                "pc_counts entries must be > 0".to_string(),
            ));
        }

        if self.ordination_components == 0 {
            return Err(WingShapeError::Config(
                "ordination_components must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check the input path and create the output directory tree
    pub fn prepare_paths(&self) -> Result<()> {
        let input_path = PathBuf::from(&self.input_path);
        if !input_path.is_file() {
            return Err(WingShapeError::InvalidPath(input_path));
        }

        let base_dir = PathBuf::from(&self.output_base_dir);
        for dir in [base_dir.clone(), base_dir.join("contours"), base_dir.join("ordination")] {
            fs::create_dir_all(&dir).map_err(|e| {
                WingShapeError::Io(io::Error::new(
                    ErrorKind::Other,
                    format!("Failed to create output directory '{}': {}", dir.display(), e),
                ))
            })?;
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            WingShapeError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}
