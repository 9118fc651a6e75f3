//! Pipeline configuration loaded from a YAML document, with environment
//! variable overrides for the layer paths.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::gold::AggregateConfig;
use crate::schema::TableSchema;
use crate::silver::CleanConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub input_path: PathBuf,
    pub bronze_path: PathBuf,
    pub silver_path: PathBuf,
    pub gold_path: PathBuf,
    /// Copy accepted source files into `<bronze_path>/raw` for lineage.
    #[serde(default = "default_lineage")]
    pub lineage: bool,
    pub schema: TableSchema,
    #[serde(default)]
    pub cleaning: CleanConfig,
    #[serde(default)]
    pub aggregation: AggregateConfig,
}

fn default_lineage() -> bool {
    true
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&text)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        for (variable, field) in [
            ("MEDALLION_INPUT_PATH", &mut self.input_path),
            ("MEDALLION_BRONZE_PATH", &mut self.bronze_path),
            ("MEDALLION_SILVER_PATH", &mut self.silver_path),
            ("MEDALLION_GOLD_PATH", &mut self.gold_path),
        ] {
            if let Ok(value) = std::env::var(variable) {
                *field = PathBuf::from(value);
            }
        }
    }
}
