// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy for the evaluation stage
//!
//! Every pipeline step fails with exactly one [`EvalError`] kind. The kind names the
//! step, the payload carries the path involved (where there is one) and the typed
//! cause from the module that failed.

use crate::datasets::DatasetError;
use crate::metrics::MetricsError;
use crate::models::{ModelLoadFailure, PredictError};
use crate::tracking::TrackingError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline steps
pub type Result<T> = std::result::Result<T, EvalError>;

/// Failure of one pipeline step
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Error loading data from {}", path.display())]
    DataLoad {
        path: PathBuf,
        #[source]
        source: DatasetError,
    },

    #[error("Error preparing data")]
    DataPrep(#[source] DatasetError),

    #[error("Error loading model from {}", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ModelLoadFailure,
    },

    #[error("Error evaluating model")]
    Evaluation(#[source] EvaluationFailure),

    #[error("Error saving metrics to {}", path.display())]
    MetricsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Underlying cause of an [`EvalError::Evaluation`]
#[derive(Error, Debug)]
pub enum EvaluationFailure {
    #[error("failed to read settings from {}", path.display())]
    Settings {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("prediction failed")]
    Prediction(#[from] PredictError),

    #[error("metric computation failed")]
    Metrics(#[from] MetricsError),

    #[error("experiment tracking failed")]
    Tracking(#[from] TrackingError),
}

impl From<EvaluationFailure> for EvalError {
    fn from(failure: EvaluationFailure) -> Self {
        EvalError::Evaluation(failure)
    }
}

impl From<TrackingError> for EvalError {
    fn from(err: TrackingError) -> Self {
        EvalError::Evaluation(EvaluationFailure::Tracking(err))
    }
}
