// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub runner: RunnerConfig,
    pub progress: ProgressConfig,
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Root that unit identifiers and relative parameters resolve against.
    pub project_root: PathBuf,
    /// Program used to launch out-of-process units. Empty runs the unit file directly.
    #[serde(default)]
    pub interpreter: String,
    /// Search-path variable that gets `project_root` prepended for each launch.
    pub search_path_var: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProgressConfig {
    pub ui_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub units: Vec<String>,
    pub labels_dir: PathBuf,
    pub source_extension: String,
    pub result_extension: String,
    pub poll_interval_ms: u64,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(config::File::from(Path::new("config/default.toml")));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FOREST_PIPELINE")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("detection.units")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            runner: RunnerConfig {
                project_root: PathBuf::from("."),
                interpreter: "python3".to_string(),
                search_path_var: "PYTHONPATH".to_string(),
            },
            progress: ProgressConfig {
                ui_interval_ms: 100,
            },
            detection: DetectionConfig {
                units: vec!["cli/yolo_predict_cli.py".to_string()],
                labels_dir: PathBuf::from("runs/detect/predict/labels"),
                source_extension: "tif".to_string(),
                result_extension: "txt".to_string(),
                poll_interval_ms: 500,
            },
        }
    }

    /// Resolves a possibly relative path against the project root.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.runner.project_root.join(path)
        }
    }

    pub fn labels_dir(&self) -> PathBuf {
        self.resolve_path(&self.detection.labels_dir)
    }

    pub fn ui_interval(&self) -> Duration {
        Duration::from_millis(self.progress.ui_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.detection.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.detection.poll_interval_ms == 0 {
            return Err(PipelineError::Config(
                "detection.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.detection.source_extension.is_empty() || self.detection.result_extension.is_empty()
        {
            return Err(PipelineError::Config(
                "detection extensions must not be empty".to_string(),
            ));
        }

        if self.runner.search_path_var.is_empty() {
            return Err(PipelineError::Config(
                "runner.search_path_var must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
