// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Test dataset loading and feature/target preparation

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Name of the binary target column
pub const TARGET_COLUMN: &str = "Potability";

/// Errors raised while parsing or splitting a dataset
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("dataset has no columns")]
    NoColumns,

    #[error("empty column name at position {0}")]
    EmptyColumnName(usize),

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("target column '{0}' not found")]
    MissingColumn(String),

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow { row: usize, expected: usize, found: usize },

    #[error("invalid target value {value:?} at row {row}: expected 0 or 1")]
    InvalidLabel { row: usize, value: String },
}

/// Binary potability label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// Water classified as safe to drink (positive class)
    Potable,
    /// Water classified as unsafe
    NotPotable,
}

impl Label {
    /// Numeric value as stored in the dataset
    pub fn to_binary(self) -> u8 {
        match self {
            Label::Potable => 1,
            Label::NotPotable => 0,
        }
    }

    /// Create from binary value (1 = potable, anything else = not potable)
    pub fn from_binary(value: u8) -> Self {
        if value == 1 {
            Label::Potable
        } else {
            Label::NotPotable
        }
    }

    /// Parse a dataset cell; only exact 0 and 1 are labels
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if *n == 1.0 => Some(Label::Potable),
            Value::Number(n) if *n == 0.0 => Some(Label::NotPotable),
            _ => None,
        }
    }
}

/// A single dataset cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Category(String),
    Missing,
}

impl Value {
    /// Parse a raw CSV field
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Category(trimmed.to_string()),
        }
    }

    /// Numeric view; missing cells become NaN, categories have none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Missing => Some(f64::NAN),
            Value::Category(_) => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Category(s) => write!(f, "{}", s),
            Value::Missing => write!(f, ""),
        }
    }
}

/// A loaded tabular dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Dataset minus the target column
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Target labels aligned with the rows of a [`FeatureTable`]
pub type TargetSeries = Vec<Label>;

impl Dataset {
    /// Parse CSV with a header row from any reader
    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        if columns.is_empty() {
            return Err(DatasetError::NoColumns);
        }

        let mut seen = HashSet::new();
        for (idx, name) in columns.iter().enumerate() {
            if name.is_empty() {
                return Err(DatasetError::EmptyColumnName(idx));
            }
            if !seen.insert(name.as_str()) {
                return Err(DatasetError::DuplicateColumn(name.clone()));
            }
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(Value::parse).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Split off `target` as labels; the remaining columns keep their order
    pub fn split_target(&self, target: &str) -> std::result::Result<(FeatureTable, TargetSeries), DatasetError> {
        let target_idx = self
            .column_index(target)
            .ok_or_else(|| DatasetError::MissingColumn(target.to_string()))?;

        let columns = self
            .columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != target_idx)
            .map(|(_, name)| name.clone())
            .collect();

        let mut rows = Vec::with_capacity(self.rows.len());
        let mut labels = Vec::with_capacity(self.rows.len());

        for (row_idx, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(DatasetError::RaggedRow {
                    row: row_idx,
                    expected: self.columns.len(),
                    found: row.len(),
                });
            }
            let cell = &row[target_idx];
            let label = Label::from_value(cell).ok_or_else(|| DatasetError::InvalidLabel {
                row: row_idx,
                value: cell.to_string(),
            })?;
            labels.push(label);

            let mut features = row.clone();
            features.remove(target_idx);
            rows.push(features);
        }

        Ok((FeatureTable { columns, rows }, labels))
    }

    /// Get label distribution for a target series
    pub fn label_distribution(labels: &[Label]) -> HashMap<Label, usize> {
        let mut dist = HashMap::new();
        for label in labels {
            *dist.entry(*label).or_insert(0) += 1;
        }
        dist
    }
}

impl FeatureTable {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Load the test dataset from a CSV file
pub fn load_data(path: &Path) -> Result<Dataset> {
    let wrap = |source: DatasetError| EvalError::DataLoad {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|e| wrap(csv::Error::from(e).into()))?;
    let dataset = Dataset::from_reader(file).map_err(wrap)?;

    tracing::info!(
        "Loaded {} rows x {} columns from {}",
        dataset.n_rows(),
        dataset.n_columns(),
        path.display()
    );
    Ok(dataset)
}

/// Split a dataset into features and the potability target
pub fn prepare_data(dataset: &Dataset) -> Result<(FeatureTable, TargetSeries)> {
    let (features, target) = dataset.split_target(TARGET_COLUMN).map_err(EvalError::DataPrep)?;

    let dist = Dataset::label_distribution(&target);
    tracing::info!(
        "Prepared {} features; potable={}, not potable={}",
        features.n_columns(),
        dist.get(&Label::Potable).copied().unwrap_or(0),
        dist.get(&Label::NotPotable).copied().unwrap_or(0)
    );
    Ok((features, target))
}
