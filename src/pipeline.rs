// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation stage of the potability pipeline
//!
//! Orchestrates, strictly in order:
//! - Test dataset loading
//! - Feature/target preparation
//! - Model loading
//! - Prediction, metrics and experiment tracking
//! - Metrics report serialization

use crate::datasets::{self, Dataset, FeatureTable, Label};
use crate::error::{EvalError, EvaluationFailure, Result};
use crate::metrics::{ConfusionMatrix, MetricsRecord};
use crate::models::{self, Classifier};
use crate::report;
use crate::settings::Settings;
use crate::tracking::{Live, TrackingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File locations for one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Processed test split (CSV)
    pub test_data_path: PathBuf,
    /// Trained model artifact (JSON)
    pub model_path: PathBuf,
    /// Metrics report output
    pub metrics_path: PathBuf,
    /// Pipeline settings file (YAML)
    pub params_path: PathBuf,
    /// Experiment tracking store
    pub tracking: TrackingConfig,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_data_path: PathBuf::from("./src/data/processed/test_processed.csv"),
            model_path: PathBuf::from("./src/model/model.json"),
            metrics_path: PathBuf::from("./reports/metrics.json"),
            params_path: PathBuf::from("params.yaml"),
            tracking: TrackingConfig::default(),
        }
    }
}

/// Predict, score and record one model against a prepared test set
pub fn evaluate_model(
    model: &dyn Classifier,
    features: &FeatureTable,
    target: &[Label],
    params_path: &Path,
    tracking: &TrackingConfig,
) -> Result<MetricsRecord> {
    let settings = Settings::load_from_path(params_path).map_err(|source| {
        EvaluationFailure::Settings {
            path: params_path.to_path_buf(),
            source,
        }
    })?;

    tracing::info!("Evaluating model: {}", model.name());
    let predictions = model.predict(features).map_err(EvaluationFailure::from)?;

    let cm = ConfusionMatrix::from_predictions(&predictions, target).map_err(EvaluationFailure::from)?;
    tracing::info!(
        "Confusion matrix: tp={} tn={} fp={} fn={} (n={})",
        cm.tp,
        cm.tn,
        cm.fp,
        cm.fn_,
        cm.total()
    );
    let metrics = MetricsRecord::from_confusion_matrix(&cm);

    Live::scoped(tracking, |live| -> std::result::Result<(), EvalError> {
        live.log_metric("accuracy", metrics.acc)?;
        live.log_metric("precision", metrics.precision)?;
        live.log_metric("recall", metrics.recall)?;
        live.log_metric("f1_score", metrics.f1_score)?;
        live.log_param("test_size", settings.data_collection.test_size)?;
        live.log_param("n_estimators", settings.model_building.n_estimators)?;
        Ok(())
    })?;

    tracing::info!(
        "{} - Accuracy: {:.4}, Precision: {:.4}, Recall: {:.4}, F1: {:.4}",
        model.name(),
        metrics.acc,
        metrics.precision,
        metrics.recall,
        metrics.f1_score
    );
    Ok(metrics)
}

/// Main evaluation pipeline
pub struct EvaluationPipeline {
    config: EvaluationConfig,
}

impl EvaluationPipeline {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Run the full evaluation pipeline
    pub fn run(&self) -> Result<MetricsRecord> {
        let test_data: Dataset = datasets::load_data(&self.config.test_data_path)?;
        let (features, target) = datasets::prepare_data(&test_data)?;
        let model = models::load_model(&self.config.model_path)?;
        let metrics = evaluate_model(
            &model,
            &features,
            &target,
            &self.config.params_path,
            &self.config.tracking,
        )?;
        report::save_metrics(&metrics, &self.config.metrics_path)?;
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::DatasetError;
    use crate::models::{DecisionTree, Estimator, ModelArtifact, ModelLoadFailure, Node, PredictError};
    use crate::tracking::{read_experiments, RunStatus};

    const PARAMS: &str = "data_collection:\n  test_size: 0.2\nmodel_building:\n  n_estimators: 100\n";

    /// Predicts potable for every row
    struct AlwaysPotable;

    impl Classifier for AlwaysPotable {
        fn predict(&self, features: &FeatureTable) -> std::result::Result<Vec<Label>, PredictError> {
            Ok(vec![Label::Potable; features.n_rows()])
        }

        fn name(&self) -> &str {
            "AlwaysPotable"
        }
    }

    /// Replays a fixed label sequence
    struct Oracle(Vec<Label>);

    impl Classifier for Oracle {
        fn predict(&self, _features: &FeatureTable) -> std::result::Result<Vec<Label>, PredictError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "Oracle"
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn predict(&self, _features: &FeatureTable) -> std::result::Result<Vec<Label>, PredictError> {
            Err(PredictError::MissingFeature("ph".to_string()))
        }

        fn name(&self) -> &str {
            "Broken"
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        config: EvaluationConfig,
    }

    /// Balanced test set: even rows potable, ph 7.0 on potable rows and 9.0 otherwise
    fn fixture(rows: usize) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        let mut csv = String::from("ph,Hardness,Potability\n");
        for i in 0..rows {
            let potable = i % 2 == 0;
            let ph = if potable { 7.0 } else { 9.0 };
            csv.push_str(&format!("{},{},{}\n", ph, 150 + i, u8::from(potable)));
        }
        std::fs::write(root.join("test.csv"), csv).unwrap();
        std::fs::write(root.join("params.yaml"), PARAMS).unwrap();
        std::fs::create_dir(root.join("reports")).unwrap();

        let artifact = ModelArtifact::new(
            "forest",
            vec!["ph".to_string(), "Hardness".to_string()],
            Estimator::RandomForest {
                trees: vec![DecisionTree {
                    nodes: vec![
                        Node::Split { feature: 0, threshold: 8.0, left: 1, right: 2, missing_left: false },
                        Node::Leaf { value: 1.0 },
                        Node::Leaf { value: 0.0 },
                    ],
                }],
            },
        );
        std::fs::write(root.join("model.json"), serde_json::to_vec(&artifact).unwrap()).unwrap();

        let config = EvaluationConfig {
            test_data_path: root.join("test.csv"),
            model_path: root.join("model.json"),
            metrics_path: root.join("reports").join("metrics.json"),
            params_path: root.join("params.yaml"),
            tracking: TrackingConfig {
                dir: root.join("dvclive"),
                save_experiment: true,
            },
        };
        Fixture { _tmp: tmp, config }
    }

    fn prepared(config: &EvaluationConfig) -> (FeatureTable, Vec<Label>) {
        let dataset = datasets::load_data(&config.test_data_path).unwrap();
        datasets::prepare_data(&dataset).unwrap()
    }

    #[test]
    fn test_all_positive_model() {
        let fx = fixture(100);
        let (features, target) = prepared(&fx.config);

        let metrics = evaluate_model(
            &AlwaysPotable,
            &features,
            &target,
            &fx.config.params_path,
            &fx.config.tracking,
        )
        .unwrap();

        assert!((metrics.acc - 0.5).abs() < 1e-6);
        assert!((metrics.precision - 0.5).abs() < 1e-6);
        assert!((metrics.recall - 1.0).abs() < 1e-6);
        assert!((metrics.f1_score - 0.667).abs() < 1e-3);
    }

    #[test]
    fn test_perfect_model() {
        let fx = fixture(10);
        let (features, target) = prepared(&fx.config);

        let metrics = evaluate_model(
            &Oracle(target.clone()),
            &features,
            &target,
            &fx.config.params_path,
            &fx.config.tracking,
        )
        .unwrap();

        assert_eq!(metrics, MetricsRecord { acc: 1.0, precision: 1.0, recall: 1.0, f1_score: 1.0 });
    }

    #[test]
    fn test_evaluation_tracks_metrics_and_params() {
        let fx = fixture(10);
        let (features, target) = prepared(&fx.config);

        evaluate_model(&AlwaysPotable, &features, &target, &fx.config.params_path, &fx.config.tracking).unwrap();

        let entries = read_experiments(&fx.config.tracking.dir).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.status, RunStatus::Success);
        assert_eq!(
            entry.metrics.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["accuracy", "f1_score", "precision", "recall"]
        );
        assert_eq!(entry.params["test_size"], serde_json::json!(0.2));
        assert_eq!(entry.params["n_estimators"], serde_json::json!(100));
    }

    #[test]
    fn test_missing_settings_is_evaluation_error() {
        let fx = fixture(4);
        let (features, target) = prepared(&fx.config);

        let err = evaluate_model(
            &AlwaysPotable,
            &features,
            &target,
            Path::new("missing/params.yaml"),
            &fx.config.tracking,
        )
        .unwrap_err();

        assert!(matches!(err, EvalError::Evaluation(EvaluationFailure::Settings { .. })));
    }

    #[test]
    fn test_prediction_failure_is_evaluation_error() {
        let fx = fixture(4);
        let (features, target) = prepared(&fx.config);

        let err = evaluate_model(&Broken, &features, &target, &fx.config.params_path, &fx.config.tracking)
            .unwrap_err();

        assert!(matches!(err, EvalError::Evaluation(EvaluationFailure::Prediction(_))));
        assert!(read_experiments(&fx.config.tracking.dir).unwrap().is_empty());
    }

    #[test]
    fn test_empty_test_set_is_evaluation_error() {
        let fx = fixture(0);
        let (features, target) = prepared(&fx.config);

        let err = evaluate_model(&AlwaysPotable, &features, &target, &fx.config.params_path, &fx.config.tracking)
            .unwrap_err();

        assert!(matches!(err, EvalError::Evaluation(EvaluationFailure::Metrics(_))));
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let fx = fixture(20);
        let pipeline = EvaluationPipeline::new(fx.config.clone());

        let metrics = pipeline.run().unwrap();

        // The stump separates the classes on ph exactly
        assert_eq!(metrics, MetricsRecord { acc: 1.0, precision: 1.0, recall: 1.0, f1_score: 1.0 });

        let written: MetricsRecord =
            serde_json::from_str(&std::fs::read_to_string(&fx.config.metrics_path).unwrap()).unwrap();
        assert_eq!(written, metrics);
    }

    #[test]
    fn test_pipeline_is_reproducible() {
        let fx = fixture(30);
        let pipeline = EvaluationPipeline::new(fx.config.clone());

        pipeline.run().unwrap();
        let first = std::fs::read(&fx.config.metrics_path).unwrap();
        pipeline.run().unwrap();
        let second = std::fs::read(&fx.config.metrics_path).unwrap();

        assert_eq!(first, second);
        assert_eq!(read_experiments(&fx.config.tracking.dir).unwrap().len(), 2);
    }

    #[test]
    fn test_pipeline_missing_target() {
        let fx = fixture(4);
        std::fs::write(&fx.config.test_data_path, "ph,Hardness\n7.0,100\n").unwrap();

        let err = EvaluationPipeline::new(fx.config.clone()).run().unwrap_err();
        assert!(matches!(err, EvalError::DataPrep(DatasetError::MissingColumn(_))));
    }

    #[test]
    fn test_pipeline_missing_model() {
        let fx = fixture(4);
        let config = EvaluationConfig {
            model_path: PathBuf::from("no/such/model.json"),
            ..fx.config.clone()
        };

        let err = EvaluationPipeline::new(config).run().unwrap_err();
        assert!(matches!(err, EvalError::ModelLoad { source: ModelLoadFailure::Io(_), .. }));
    }

    #[test]
    fn test_pipeline_missing_report_dir() {
        let fx = fixture(4);
        std::fs::remove_dir(fx.config.metrics_path.parent().unwrap()).unwrap();

        let err = EvaluationPipeline::new(fx.config.clone()).run().unwrap_err();
        assert!(matches!(err, EvalError::MetricsWrite { .. }));
    }

    #[test]
    fn test_pipeline_missing_data() {
        let fx = fixture(4);
        std::fs::remove_file(&fx.config.test_data_path).unwrap();

        let err = EvaluationPipeline::new(fx.config.clone()).run().unwrap_err();
        assert!(matches!(err, EvalError::DataLoad { .. }));
    }

    #[test]
    fn test_default_paths() {
        let config = EvaluationConfig::default();
        assert_eq!(config.metrics_path, PathBuf::from("./reports/metrics.json"));
        assert_eq!(config.params_path, PathBuf::from("params.yaml"));
        assert!(config.tracking.save_experiment);
    }
}
