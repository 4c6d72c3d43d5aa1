// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Binary classification metrics
//!
//! Potable is the positive class. A ratio with a zero denominator is reported as 0.0
//! and logged as a warning.

use crate::datasets::Label;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetricsError {
    #[error("cannot compute metrics on an empty prediction set")]
    Empty,

    #[error("prediction count {predictions} does not match target count {targets}")]
    LengthMismatch { predictions: usize, targets: usize },
}

/// Confusion matrix for binary classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// True Positives (potable predicted as potable)
    pub tp: usize,
    /// True Negatives (not potable predicted as not potable)
    pub tn: usize,
    /// False Positives (not potable predicted as potable)
    pub fp: usize,
    /// False Negatives (potable predicted as not potable)
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Create from predictions and ground truth labels
    pub fn from_predictions(predictions: &[Label], ground_truth: &[Label]) -> Result<Self, MetricsError> {
        if predictions.len() != ground_truth.len() {
            return Err(MetricsError::LengthMismatch {
                predictions: predictions.len(),
                targets: ground_truth.len(),
            });
        }
        if predictions.is_empty() {
            return Err(MetricsError::Empty);
        }

        let mut matrix = Self::default();

        for (pred, truth) in predictions.iter().zip(ground_truth.iter()) {
            match (pred, truth) {
                (Label::Potable, Label::Potable) => matrix.tp += 1,
                (Label::NotPotable, Label::NotPotable) => matrix.tn += 1,
                (Label::Potable, Label::NotPotable) => matrix.fp += 1,
                (Label::NotPotable, Label::Potable) => matrix.fn_ += 1,
            }
        }

        Ok(matrix)
    }

    /// Total number of samples
    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Accuracy: (TP + TN) / Total
    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall (Sensitivity): TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// F1 Score: 2 * (Precision * Recall) / (Precision + Recall)
    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let denom = precision + recall;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

/// The four metrics persisted per evaluation run
///
/// Field order is the key order of the written report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub acc: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl MetricsRecord {
    /// Compute the record from a confusion matrix, warning on zero denominators
    pub fn from_confusion_matrix(cm: &ConfusionMatrix) -> Self {
        if cm.tp + cm.fp == 0 {
            tracing::warn!("Precision is ill-defined: no potable predictions, reporting 0.0");
        }
        if cm.tp + cm.fn_ == 0 {
            tracing::warn!("Recall is ill-defined: no potable samples in target, reporting 0.0");
        }

        Self {
            acc: cm.accuracy(),
            precision: cm.precision(),
            recall: cm.recall(),
            f1_score: cm.f1_score(),
        }
    }

    pub fn from_predictions(predictions: &[Label], ground_truth: &[Label]) -> Result<Self, MetricsError> {
        let cm = ConfusionMatrix::from_predictions(predictions, ground_truth)?;
        Ok(Self::from_confusion_matrix(&cm))
    }

    /// Names and values in report order
    pub fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("acc", self.acc),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1_score", self.f1_score),
        ]
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        format!(
            r#"Evaluation Metrics
==================
Accuracy:  {:.4} ({:.2}%)
Precision: {:.4}
Recall:    {:.4}
F1 Score:  {:.4}
"#,
            self.acc,
            self.acc * 100.0,
            self.precision,
            self.recall,
            self.f1_score,
        )
    }
}
