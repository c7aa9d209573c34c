// src/lib.rs - Library interface for WingShapeR

pub mod coefficients;
pub mod config;
pub mod contour;
pub mod design;
pub mod errors;
pub mod linalg;
pub mod normalization;
pub mod ordination;
pub mod output;
pub mod pipeline;
pub mod sscp;

// Re-export commonly used types and functions
pub use errors::{WingShapeError, Result};
pub use config::{Coding, Config};
pub use coefficients::{Coefficient, CoefficientSet, CoefficientStore, Specimen};

// Size normalization
pub use normalization::{
    normalize,
    normalize_store,
    semi_major_axis,
    NormalizationReport,
    SemiMajorAxis,
    SizeFallback,
};

// Contour synthesis
pub use contour::{average_contours, group_mean_contours, reconstruct, GroupContour};

// Variance decomposition
pub use design::{build_design_matrix, DesignMatrix, ModelTerm, RankDeficiency, TermSlice};
pub use linalg::projection;
pub use sscp::{type_iii_sscp, SscpResult};
pub use pipeline::{decompose_configurations, run, Configuration, ConfigurationResult, DecompositionRun, Stage};

// Ordination
pub use ordination::{standardize, LdaModel, PcaModel};
