// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation stage for the water potability classifier
//!
//! This crate provides:
//! - Test dataset loading and feature/target preparation
//! - Trained model artifacts behind a narrow `Classifier` interface
//! - Binary classification metrics (Accuracy, Precision, Recall, F1)
//! - Scoped experiment tracking of metrics and hyperparameters
//! - JSON metrics reports for downstream pipeline stages

pub mod datasets;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod settings;
pub mod tracking;

pub use datasets::{load_data, prepare_data, Dataset, FeatureTable, Label, TargetSeries, Value};
pub use error::{EvalError, EvaluationFailure};
pub use metrics::{ConfusionMatrix, MetricsRecord};
pub use models::{load_model, Classifier, ModelArtifact, TrainedModel};
pub use pipeline::{evaluate_model, EvaluationConfig, EvaluationPipeline};
pub use report::save_metrics;
pub use settings::Settings;
pub use tracking::{Live, TrackingConfig};
