// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Trained model artifacts and the prediction interface
//!
//! A model reaches this stage as a JSON artifact exported by the training stage.
//! Supported estimators:
//! - Random forest (mean of per-tree potable probabilities)
//! - Single decision tree
//! - Logistic regression
//!
//! The evaluator only sees the [`Classifier`] trait, so anything that can label a
//! [`FeatureTable`] can be evaluated.

use crate::datasets::{FeatureTable, Label};
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Format tag every artifact must carry
pub const MODEL_FORMAT: &str = "potability-model";

/// Artifact layout version understood by this crate
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Probability above which a sample is labelled potable
const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Error, Debug)]
pub enum ModelLoadFailure {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed model artifact")]
    Decode(#[from] serde_json::Error),

    #[error("unsupported artifact format '{0}'")]
    ForeignFormat(String),

    #[error("unsupported artifact version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid model: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum PredictError {
    #[error("feature column '{0}' missing from input")]
    MissingFeature(String),

    #[error("non-numeric value {value:?} in column '{column}' at row {row}")]
    NonNumeric { column: String, row: usize, value: String },

    #[error("missing value in column '{column}' at row {row}")]
    MissingValue { column: String, row: usize },
}

/// Anything that can label a feature table
pub trait Classifier {
    /// Predict one label per row, in row order
    fn predict(&self, features: &FeatureTable) -> std::result::Result<Vec<Label>, PredictError>;

    /// Get model name
    fn name(&self) -> &str;
}

/// Prediction output for a single row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    pub probability: f64, // P(potable)
}

impl Prediction {
    fn from_probability(probability: f64) -> Self {
        Self {
            label: if probability > DECISION_THRESHOLD { Label::Potable } else { Label::NotPotable },
            probability,
        }
    }
}

/// Serialized model as written by the training stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format: String,
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    /// Input columns in the order the estimator indexes them
    pub feature_names: Vec<String>,
    pub estimator: Estimator,
}

impl ModelArtifact {
    pub fn new(name: &str, feature_names: Vec<String>, estimator: Estimator) -> Self {
        Self {
            format: MODEL_FORMAT.to_string(),
            version: MODEL_FORMAT_VERSION,
            name: Some(name.to_string()),
            feature_names,
            estimator,
        }
    }
}

/// Only the fields needed to reject foreign artifacts before a full parse
#[derive(Deserialize)]
struct ArtifactHeader {
    format: String,
    version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    RandomForest { trees: Vec<DecisionTree> },
    DecisionTree(DecisionTree),
    LogisticRegression { coefficients: Vec<f64>, intercept: f64 },
}

/// Flat node array; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Route NaN inputs to the left child
        #[serde(default)]
        missing_left: bool,
    },
    Leaf {
        /// P(potable) at this leaf
        value: f64,
    },
}

impl DecisionTree {
    /// Children must point forward, so traversal always terminates
    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split { feature, threshold, left, right, .. } => {
                    if *feature >= n_features {
                        return Err(format!("node {} splits on feature {} of {}", idx, feature, n_features));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has non-finite threshold", idx));
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child index {}", idx, child));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if !(0.0..=1.0).contains(value) {
                        return Err(format!("leaf {} has probability {} outside [0, 1]", idx, value));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right, missing_left } => {
                    let x = row[*feature];
                    let go_left = if x.is_nan() { *missing_left } else { x <= *threshold };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }
}

impl Estimator {
    fn kind(&self) -> &'static str {
        match self {
            Estimator::RandomForest { .. } => "random_forest",
            Estimator::DecisionTree(_) => "decision_tree",
            Estimator::LogisticRegression { .. } => "logistic_regression",
        }
    }

    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        match self {
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err("random forest has no trees".to_string());
                }
                for (idx, tree) in trees.iter().enumerate() {
                    tree.validate(n_features).map_err(|e| format!("tree {}: {}", idx, e))?;
                }
                Ok(())
            }
            Estimator::DecisionTree(tree) => tree.validate(n_features),
            Estimator::LogisticRegression { coefficients, intercept } => {
                if coefficients.len() != n_features {
                    return Err(format!(
                        "{} coefficients for {} features",
                        coefficients.len(),
                        n_features
                    ));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("non-finite logistic regression weights".to_string());
                }
                Ok(())
            }
        }
    }

    fn rejects_missing(&self) -> bool {
        matches!(self, Estimator::LogisticRegression { .. })
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        match self {
            Estimator::RandomForest { trees } => {
                let sum: f64 = trees.iter().map(|t| t.predict_proba(row)).sum();
                sum / trees.len() as f64
            }
            Estimator::DecisionTree(tree) => tree.predict_proba(row),
            Estimator::LogisticRegression { coefficients, intercept } => {
                let z: f64 = intercept + coefficients.iter().zip(row).map(|(w, x)| w * x).sum::<f64>();
                1.0 / (1.0 + (-z).exp())
            }
        }
    }
}

/// A validated model ready for prediction
#[derive(Debug, Clone)]
pub struct TrainedModel {
    name: String,
    feature_names: Vec<String>,
    estimator: Estimator,
}

impl TrainedModel {
    /// Decode and validate an artifact from raw bytes
    pub fn from_slice(bytes: &[u8]) -> std::result::Result<Self, ModelLoadFailure> {
        let header: ArtifactHeader = serde_json::from_slice(bytes)?;
        if header.format != MODEL_FORMAT {
            return Err(ModelLoadFailure::ForeignFormat(header.format));
        }
        if header.version != MODEL_FORMAT_VERSION {
            return Err(ModelLoadFailure::UnsupportedVersion(header.version));
        }

        let artifact: ModelArtifact = serde_json::from_slice(bytes)?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> std::result::Result<Self, ModelLoadFailure> {
        if artifact.feature_names.is_empty() {
            return Err(ModelLoadFailure::Invalid("no feature names".to_string()));
        }
        let mut seen = HashSet::new();
        for name in &artifact.feature_names {
            if !seen.insert(name.as_str()) {
                return Err(ModelLoadFailure::Invalid(format!("duplicate feature name '{}'", name)));
            }
        }

        artifact
            .estimator
            .validate(artifact.feature_names.len())
            .map_err(ModelLoadFailure::Invalid)?;

        Ok(Self {
            name: artifact.name.unwrap_or_else(|| artifact.estimator.kind().to_string()),
            feature_names: artifact.feature_names,
            estimator: artifact.estimator,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Number of fitted estimators (trees for a forest, otherwise 1)
    pub fn n_estimators(&self) -> usize {
        match &self.estimator {
            Estimator::RandomForest { trees } => trees.len(),
            _ => 1,
        }
    }

    /// Predict potable probabilities and labels for every row
    pub fn predict_batch(&self, features: &FeatureTable) -> std::result::Result<Vec<Prediction>, PredictError> {
        let indices = self
            .feature_names
            .iter()
            .map(|name| {
                features
                    .column_index(name)
                    .ok_or_else(|| PredictError::MissingFeature(name.clone()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut predictions = Vec::with_capacity(features.n_rows());
        let mut row_values = vec![0.0; indices.len()];

        for (row_idx, row) in features.rows.iter().enumerate() {
            for (slot, (&col, name)) in indices.iter().zip(&self.feature_names).enumerate() {
                let cell = row
                    .get(col)
                    .ok_or_else(|| PredictError::MissingFeature(name.clone()))?;
                let x = cell.as_f64().ok_or_else(|| PredictError::NonNumeric {
                    column: name.clone(),
                    row: row_idx,
                    value: cell.to_string(),
                })?;
                if x.is_nan() && self.estimator.rejects_missing() {
                    return Err(PredictError::MissingValue {
                        column: name.clone(),
                        row: row_idx,
                    });
                }
                row_values[slot] = x;
            }
            predictions.push(Prediction::from_probability(self.estimator.predict_proba(&row_values)));
        }

        Ok(predictions)
    }
}

impl Classifier for TrainedModel {
    fn predict(&self, features: &FeatureTable) -> std::result::Result<Vec<Label>, PredictError> {
        Ok(self.predict_batch(features)?.into_iter().map(|p| p.label).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Load a trained model artifact from disk
pub fn load_model(path: &Path) -> Result<TrainedModel> {
    let wrap = |source: ModelLoadFailure| EvalError::ModelLoad {
        path: path.to_path_buf(),
        source,
    };

    let bytes = std::fs::read(path).map_err(|e| wrap(e.into()))?;
    let model = TrainedModel::from_slice(&bytes).map_err(wrap)?;

    tracing::info!(
        "Loaded model '{}' ({}, {} estimators, {} features) from {}",
        model.name(),
        model.estimator.kind(),
        model.n_estimators(),
        model.feature_names.len(),
        path.display()
    );
    Ok(model)
}
