use std::time::Instant;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use wing_shape_rust_lib::{Config, Stage};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "WingShapeR - Insect Wing EFD Shape Analysis")]
struct Args {
    /// Path to the coefficient CSV
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Harmonic order (overwrites config)
    #[clap(long)]
    harmonics: Option<usize>,

    /// Which stage to run
    #[clap(short, long, value_enum, default_value = "all")]
    stage: StageArg,

    /// Treat the input as already size-normalized
    #[clap(long)]
    skip_normalization: bool,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StageArg {
    Normalize,
    Decompose,
    Contours,
    Ordination,
    All,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Normalize => Stage::Normalize,
            StageArg::Decompose => Stage::Decompose,
            StageArg::Contours => Stage::Contours,
            StageArg::Ordination => Stage::Ordination,
            StageArg::All => Stage::All,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    // Load configuration
    let mut config = Config::from_file_or_default(&args.config)
        .with_context(|| format!("loading configuration '{}'", args.config))?;

    // Override config with command-line arguments
    if let Some(input) = args.input {
        config.input_path = input;
    }
    if let Some(output) = args.output {
        config.output_base_dir = output;
    }
    if let Some(harmonics) = args.harmonics {
        config.harmonics = harmonics;
    }

    config.validate().context("invalid configuration")?;
    config.prepare_paths().context("preparing input/output paths")?;

    let start_time = Instant::now();

    let summary = wing_shape_rust_lib::run(&config, args.stage.into(), args.skip_normalization)
        .with_context(|| format!("analysing '{}'", config.input_path))?;

    if let Some(deficiency) = summary.design.as_ref().and_then(|d| d.rank_deficiency) {
        log::warn!(
            "Design rank {} is below its {} columns; results were computed with a pseudo-inverse",
            deficiency.rank,
            deficiency.columns
        );
    }

    log::info!(
        "Processed {} specimens in {:.2} seconds, outputs in '{}'",
        summary.specimens,
        start_time.elapsed().as_secs_f64(),
        config.output_base_dir
    );

    Ok(())
}
