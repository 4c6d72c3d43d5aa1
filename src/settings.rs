// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Pipeline settings file (`params.yaml`)
//!
//! Only the two hyperparameters recorded alongside evaluation metrics are read here;
//! every other section of the file belongs to other stages and is ignored.

use config::{Config, ConfigError, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings consumed by the evaluation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data_collection: DataCollection,
    pub model_building: ModelBuilding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCollection {
    /// Fraction of the raw data held out as the test split
    pub test_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBuilding {
    /// Number of trees in the trained forest
    pub n_estimators: u64,
}

impl Settings {
    /// Load settings from a YAML file regardless of its extension
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Yaml))
            .build()?;

        config.try_deserialize()
    }
}
