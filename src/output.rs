use std::fs;
use std::path::Path;
use csv::Writer;
use nalgebra::DMatrix;

use crate::coefficients::CoefficientStore;
use crate::contour::GroupContour;
use crate::errors::{WingShapeError, Result};
use crate::pipeline::{ConfigurationResult, RunSummary};

/// Open a CSV writer, creating the parent directory if needed
fn create_writer(path: &Path) -> Result<Writer<fs::File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(WingShapeError::Io)?;
    }
    Writer::from_path(path).map_err(WingShapeError::Csv)
}

/// Write the coefficient table with the input's schema and row order;
/// only coefficient cells differ
pub fn write_coefficient_table<P: AsRef<Path>>(store: &CoefficientStore, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create_writer(path)?;

    let (headers, rows) = store.table_records();
    writer.write_record(&headers)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    log::info!("Wrote {} specimens to '{}'", rows.len(), path.display());
    Ok(())
}

/// Write the (configuration, term) percentage table
pub fn write_percentage_table<P: AsRef<Path>>(results: &[ConfigurationResult], path: P) -> Result<()> {
    let mut writer = create_writer(path.as_ref())?;

    writer.write_record(["Configuration", "Term", "SSCP_Trace", "Percent"])?;
    for result in results {
        for ((term, score), (_, percent)) in result.sscp.scores.iter().zip(&result.percentages) {
            writer.write_record(&[
                result.label.clone(),
                term.to_string(),
                format!("{:.6}", score),
                format!("{:.4}", percent),
            ])?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Write group-mean contours as long-format point rows
pub fn write_group_contours<P: AsRef<Path>>(groups: &[GroupContour], path: P) -> Result<()> {
    let mut writer = create_writer(path.as_ref())?;

    writer.write_record(["Species", "Sex", "Specimen_Count", "Point_Index", "X", "Y"])?;
    for group in groups {
        let count = group.specimen_count.to_string();
        for (i, (x, y)) in group.points.iter().enumerate() {
            writer.write_record(&[
                group.species.clone(),
                group.sex.clone(),
                count.clone(),
                i.to_string(),
                format!("{:.6}", x),
                format!("{:.6}", y),
            ])?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Write individually reconstructed contours keyed by specimen id
pub fn write_specimen_contours<P: AsRef<Path>>(contours: &[(String, Vec<(f64, f64)>)], path: P) -> Result<()> {
    let mut writer = create_writer(path.as_ref())?;

    writer.write_record(["Specimen", "Point_Index", "X", "Y"])?;
    for (id, points) in contours {
        for (i, (x, y)) in points.iter().enumerate() {
            writer.write_record(&[
                id.clone(),
                i.to_string(),
                format!("{:.6}", x),
                format!("{:.6}", y),
            ])?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Write per-specimen ordination scores with species and sex
pub fn write_score_table<P: AsRef<Path>>(
    store: &CoefficientStore,
    scores: &DMatrix<f64>,
    prefix: &str,
    path: P,
) -> Result<()> {
    let mut writer = create_writer(path.as_ref())?;

    let mut header = vec!["Specimen".to_string(), "Species".to_string(), "Sex".to_string()];
    header.extend((1..=scores.ncols()).map(|i| format!("{}{}", prefix, i)));
    writer.write_record(&header)?;

    for (specimen, row) in store.specimens().iter().zip(scores.row_iter()) {
        let mut record = vec![specimen.id.clone(), specimen.species.clone(), specimen.sex.clone()];
        record.extend(row.iter().map(|v| format!("{:.6}", v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(())
}

/// Write the run summary as pretty JSON
pub fn write_summary<P: AsRef<Path>>(summary: &RunSummary, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}
