use std::fs;
use std::path::Path;

use assert_approx_eq::assert_approx_eq;
use tempfile::tempdir;
use wing_shape_rust_lib::{
    decompose_configurations, normalize_store, run, Coding, CoefficientStore, Config, ModelTerm, Stage,
};

/// Two species x two sexes, one harmonic. After normalization every
/// specimen has a1 = 1, b1 = c1 = 0 and d1 in {0.2, 0.4, 0.6, 1.0}.
const FIXTURE: &str = "\
image_id,species,sex,a1,b1,c1,d1
af,A,female,2,0,0,0.4
am,A,male,0.5,0,0,0.2
bf,B,female,3,0,0,1.8
bm,B,male,1,0,0,1
";

fn fixture_config(dir: &Path) -> Config {
    let input = dir.join("coefficients.csv");
    fs::write(&input, FIXTURE).unwrap();
    Config {
        input_path: input.to_string_lossy().into_owned(),
        output_base_dir: dir.join("out").to_string_lossy().into_owned(),
        harmonics: 1,
        pc_counts: vec![1, 4],
        contour_points: 5,
        use_parallel: false,
        ..Config::default()
    }
}

fn percent(result: &[(ModelTerm, f64)], term: ModelTerm) -> f64 {
    result.iter().find(|(t, _)| *t == term).map(|(_, p)| *p).unwrap()
}

#[test]
fn treatment_coded_percentages_are_fixed() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    let config = fixture_config(dir);
    let raw = CoefficientStore::from_csv_path(&config.input_path, &config).unwrap();
    let (store, report) = normalize_store(&raw, false).unwrap();
    assert_eq!(report.specimens, 4);

    let run = decompose_configurations(&store, &config).unwrap();
    let labels: Vec<&str> = run.results.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["All Features (4)", "1 PCs (100.0%)", "4 PCs (100.0%)"]);

    for result in &run.results {
        assert_approx_eq!(percent(&result.percentages, ModelTerm::Species), 800.0 / 11.0, 1e-6);
        assert_approx_eq!(percent(&result.percentages, ModelTerm::Sex), 200.0 / 11.0, 1e-6);
        assert_approx_eq!(percent(&result.percentages, ModelTerm::SpeciesBySex), 100.0 / 11.0, 1e-6);
        assert_approx_eq!(percent(&result.percentages, ModelTerm::Residual), 0.0, 1e-6);
    }

    // saturated single-replicate design under dummy coding: scores fall
    // well short of the total (4.0 for z-scored data)
    assert_approx_eq!(run.results[0].sscp.total(), 0.11 / 0.0875, 1e-9);
}

#[test]
fn sum_coded_scores_partition_total() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    let mut config = fixture_config(dir);
    config.coding = Coding::Sum;
    let raw = CoefficientStore::from_csv_path(&config.input_path, &config).unwrap();
    let (store, _) = normalize_store(&raw, true).unwrap();

    let run = decompose_configurations(&store, &config).unwrap();
    let sscp = &run.results[0].sscp;
    assert_approx_eq!(sscp.total(), 4.0, 1e-6);
    assert_approx_eq!(sscp.get(ModelTerm::Species).unwrap(), 1.0 / 0.35, 1e-9);
    assert_approx_eq!(sscp.get(ModelTerm::Sex).unwrap(), 0.36 / 0.35, 1e-9);
    assert_approx_eq!(sscp.get(ModelTerm::SpeciesBySex).unwrap(), 0.04 / 0.35, 1e-9);
}

#[test]
fn default_pc_counts_collapse_to_one_configuration() {
    let tmp = tempdir().unwrap();
    let config = Config {
        pc_counts: Config::default().pc_counts,
        ..fixture_config(tmp.path())
    };
    let raw = CoefficientStore::from_csv_path(&config.input_path, &config).unwrap();
    let (store, _) = normalize_store(&raw, false).unwrap();

    let run = decompose_configurations(&store, &config).unwrap();
    let labels: Vec<&str> = run.results.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["All Features (4)", "4 PCs (100.0%)"]);
}

#[test]
fn full_run_writes_outputs() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    let config = fixture_config(dir);
    config.prepare_paths().unwrap();

    let summary = run(&config, Stage::All, false).unwrap();
    assert_eq!(summary.specimens, 4);
    assert_eq!(summary.configurations.len(), 3);
    assert!(summary.design.as_ref().unwrap().rank_deficiency.is_none());

    let out = dir.join("out");

    // normalized table keeps schema and row order
    let mut reader = csv::Reader::from_path(out.join("normalized_coefficients.csv")).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(headers, vec!["image_id", "species", "sex", "a1", "b1", "c1", "d1"]);
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 4);
    assert_eq!(&rows[0][0], "af");
    let d1: Vec<f64> = rows.iter().map(|r| r[6].parse().unwrap()).collect();
    for (got, want) in d1.iter().zip([0.2, 0.4, 0.6, 1.0]) {
        assert_approx_eq!(*got, want, 1e-12);
    }

    // percentage table: 3 configurations x (3 terms + residual)
    let mut reader = csv::Reader::from_path(out.join("sscp_percentages.csv")).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 12);
    assert_eq!(&rows[0][0], "All Features (4)");
    assert_eq!(&rows[0][1], "species");
    assert_eq!(&rows[3][1], "Residuals");

    // 4 groups x 5 points
    let reader = csv::Reader::from_path(out.join("contours").join("group_means.csv")).unwrap();
    assert_eq!(reader.into_records().count(), 20);

    assert!(out.join("ordination").join("pca_scores.csv").is_file());
    assert!(out.join("ordination").join("lda_sex.csv").is_file());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
    assert_eq!(json["specimens"], 4);
    assert_eq!(json["configurations"][0]["terms"][0]["term"], "species");
}

#[test]
fn missing_column_aborts_run() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    let input = dir.join("coefficients.csv");
    fs::write(&input, "species,sex,a1,b1,c1\nA,male,1,0,0\n").unwrap();
    let config = Config {
        input_path: input.to_string_lossy().into_owned(),
        output_base_dir: dir.join("out").to_string_lossy().into_owned(),
        harmonics: 1,
        ..Config::default()
    };
    let err = run(&config, Stage::Normalize, false).unwrap_err();
    assert!(err.to_string().contains("d1"));
}
