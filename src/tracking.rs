// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Local experiment tracking
//!
//! A [`Live`] session records named metrics and parameters for one run into a
//! tracking directory:
//!
//! ```text
//! dvclive/
//!   metrics.json            latest value of every metric
//!   params.json             every logged parameter
//!   plots/metrics/<name>.tsv  step/value history per metric
//!   experiments.jsonl       one appended entry per finished run
//! ```
//!
//! The session is flushed exactly once, either by [`Live::end`], by [`Live::scoped`]
//! on both success and failure of its closure, or by `Drop` as a last resort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const METRICS_FILE: &str = "metrics.json";
const PARAMS_FILE: &str = "params.json";
const EXPERIMENTS_FILE: &str = "experiments.jsonl";
const PLOTS_DIR: &str = "plots/metrics";

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("failed to write tracking output {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize tracking record")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid tracking name '{0}'")]
    InvalidName(String),
}

/// Where and how runs are recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Tracking directory
    pub dir: PathBuf,
    /// Append an entry to the experiment log when a run ends
    pub save_experiment: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dvclive"),
            save_experiment: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

/// One line of the experiment log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentEntry {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub metrics: BTreeMap<String, f64>,
    pub params: BTreeMap<String, serde_json::Value>,
}

/// An open tracking session
#[derive(Debug)]
pub struct Live {
    config: TrackingConfig,
    run_id: String,
    started_at: DateTime<Utc>,
    metrics: BTreeMap<String, f64>,
    params: BTreeMap<String, serde_json::Value>,
    steps: BTreeMap<String, u64>,
    closed: bool,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TrackingError + '_ {
    move |source| TrackingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Names become file names, so keep them to a portable character set
fn validate_name(name: &str) -> Result<(), TrackingError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(TrackingError::InvalidName(name.to_string()))
    }
}

impl Live {
    /// Start a new run; plot histories from a previous run are discarded
    pub fn open(config: &TrackingConfig) -> Result<Self, TrackingError> {
        let plots = config.dir.join(PLOTS_DIR);
        if plots.exists() {
            fs::remove_dir_all(&plots).map_err(io_error(&plots))?;
        }
        fs::create_dir_all(&plots).map_err(io_error(&plots))?;

        let run_id = format!("exp-{:08x}", rand::random::<u32>());
        tracing::info!("Tracking run {} in {}", run_id, config.dir.display());

        Ok(Self {
            config: config.clone(),
            run_id,
            started_at: Utc::now(),
            metrics: BTreeMap::new(),
            params: BTreeMap::new(),
            steps: BTreeMap::new(),
            closed: false,
        })
    }

    /// Run `f` inside a session that is always ended before the result is returned
    pub fn scoped<T, E, F>(config: &TrackingConfig, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Live) -> Result<T, E>,
        E: From<TrackingError>,
    {
        let mut live = Live::open(config)?;
        match f(&mut live) {
            Ok(value) => {
                live.finish(RunStatus::Success)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(flush_err) = live.finish(RunStatus::Failed) {
                    tracing::warn!("Failed to flush tracking run {}: {}", live.run_id, flush_err);
                }
                Err(err)
            }
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_metric(&mut self, name: &str, value: f64) -> Result<(), TrackingError> {
        validate_name(name)?;

        let step = self.steps.entry(name.to_string()).or_insert(0);
        let path = self.config.dir.join(PLOTS_DIR).join(format!("{}.tsv", name));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;

        let mut row = String::new();
        if *step == 0 {
            row.push_str(&format!("step\t{}\n", name));
        }
        row.push_str(&format!("{}\t{}\n", step, value));
        file.write_all(row.as_bytes()).map_err(io_error(&path))?;
        *step += 1;

        tracing::debug!("metric {} = {}", name, value);
        self.metrics.insert(name.to_string(), value);
        Ok(())
    }

    pub fn log_param<V: Serialize>(&mut self, name: &str, value: V) -> Result<(), TrackingError> {
        validate_name(name)?;
        let value = serde_json::to_value(value)?;
        tracing::debug!("param {} = {}", name, value);
        self.params.insert(name.to_string(), value);
        Ok(())
    }

    /// Flush and close the session
    pub fn end(mut self) -> Result<ExperimentEntry, TrackingError> {
        self.finish(RunStatus::Success)
    }

    fn finish(&mut self, status: RunStatus) -> Result<ExperimentEntry, TrackingError> {
        self.closed = true;

        fs::create_dir_all(&self.config.dir).map_err(io_error(&self.config.dir))?;
        write_json(&self.config.dir.join(METRICS_FILE), &self.metrics)?;
        write_json(&self.config.dir.join(PARAMS_FILE), &self.params)?;

        let entry = ExperimentEntry {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            status,
            metrics: self.metrics.clone(),
            params: self.params.clone(),
        };

        if self.config.save_experiment {
            let path = self.config.dir.join(EXPERIMENTS_FILE);
            let mut line = serde_json::to_string(&entry)?;
            line.push('\n');
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .and_then(|mut file| file.write_all(line.as_bytes()))
                .map_err(io_error(&path))?;
        }

        tracing::info!("Tracking run {} closed ({:?})", self.run_id, status);
        Ok(entry)
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.finish(RunStatus::Failed) {
            tracing::warn!("Failed to flush tracking run {} on drop: {}", self.run_id, e);
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), TrackingError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(io_error(path))
}

/// Read every entry of a tracking directory's experiment log
pub fn read_experiments(dir: &Path) -> Result<Vec<ExperimentEntry>, TrackingError> {
    let path = dir.join(EXPERIMENTS_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(&path).map_err(io_error(&path))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(TrackingError::from))
        .collect()
}
