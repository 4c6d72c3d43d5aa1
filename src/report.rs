// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Metrics report file

use crate::error::{EvalError, Result};
use crate::metrics::MetricsRecord;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serialize with 4-space indentation
pub fn to_json(metrics: &MetricsRecord) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    metrics.serialize(&mut ser)?;
    Ok(buf)
}

/// Write the metrics record, replacing any existing file
///
/// The parent directory must already exist.
pub fn save_metrics(metrics: &MetricsRecord, path: &Path) -> Result<()> {
    let wrap = |source: std::io::Error| EvalError::MetricsWrite {
        path: path.to_path_buf(),
        source,
    };

    let json = to_json(metrics).map_err(|e| wrap(e.into()))?;
    let mut writer = BufWriter::new(File::create(path).map_err(wrap)?);
    writer.write_all(&json).map_err(wrap)?;
    writer.flush().map_err(wrap)?;

    tracing::info!("Metrics saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MetricsRecord {
        MetricsRecord {
            acc: 0.5,
            precision: 0.5,
            recall: 1.0,
            f1_score: 2.0 / 3.0,
        }
    }

    #[test]
    fn test_json_layout() {
        let json = String::from_utf8(to_json(&record()).unwrap()).unwrap();
        assert_eq!(
            json,
            "{\n    \"acc\": 0.5,\n    \"precision\": 0.5,\n    \"recall\": 1.0,\n    \"f1_score\": 0.6666666666666666\n}"
        );
    }

    #[test]
    fn test_save_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metrics.json");

        save_metrics(&record(), &path).unwrap();

        let parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let mut keys: Vec<String> = parsed.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["acc", "f1_score", "precision", "recall"]);
        assert!(parsed.values().all(|v| v.is_f64()));

        let back: MetricsRecord = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, record());
    }

    #[test]
    fn test_overwrites_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metrics.json");
        std::fs::write(&path, "x".repeat(4096)).unwrap();

        save_metrics(&record(), &path).unwrap();

        let back: MetricsRecord = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, record());
    }

    #[test]
    fn test_repeated_writes_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metrics.json");

        save_metrics(&record(), &path).unwrap();
        let first = std::fs::read(&path).unwrap();
        save_metrics(&record(), &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_missing_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reports").join("metrics.json");

        let err = save_metrics(&record(), &path).unwrap_err();
        match err {
            EvalError::MetricsWrite { path: failed, .. } => assert_eq!(failed, path),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!path.exists());
    }
}
