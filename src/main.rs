// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation stage CLI for the water potability classifier
//!
//! Usage:
//!   evaluate-model
//!   evaluate-model --model ./src/model/model.json --metrics ./reports/metrics.json

use anyhow::{Context, Result};
use clap::Parser;
use potability_eval::pipeline::{EvaluationConfig, EvaluationPipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "evaluate-model")]
#[command(about = "Evaluate the trained potability model on the held-out test set")]
#[command(version)]
struct Args {
    /// Processed test dataset (CSV)
    #[arg(long, default_value = "./src/data/processed/test_processed.csv")]
    data: PathBuf,

    /// Trained model artifact
    #[arg(long, default_value = "./src/model/model.json")]
    model: PathBuf,

    /// Output path for the metrics report
    #[arg(long, default_value = "./reports/metrics.json")]
    metrics: PathBuf,

    /// Pipeline settings file
    #[arg(long, default_value = "params.yaml")]
    params: PathBuf,

    /// Experiment tracking directory
    #[arg(long, default_value = "dvclive")]
    tracking_dir: PathBuf,

    /// Do not append this run to the experiment log
    #[arg(long)]
    no_save_exp: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = EvaluationConfig {
        test_data_path: args.data,
        model_path: args.model,
        metrics_path: args.metrics,
        params_path: args.params,
        ..EvaluationConfig::default()
    };
    config.tracking.dir = args.tracking_dir;
    config.tracking.save_experiment = !args.no_save_exp;

    tracing::info!("Potability Model Evaluation");
    tracing::info!("Test data: {}", config.test_data_path.display());
    tracing::info!("Model: {}", config.model_path.display());

    let pipeline = EvaluationPipeline::new(config);
    let metrics = pipeline.run().context("An error occurred")?;

    println!("\n{}", "=".repeat(40));
    println!("{}", metrics.format());
    println!("{}", "=".repeat(40));
    println!("Metrics saved to: {}", pipeline.config().metrics_path.display());

    Ok(())
}
