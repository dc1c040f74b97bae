use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Options recognised by a [`crate::DataSource`].
///
/// The configuration is immutable once a data source has been built from it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// File suffixes (case-insensitive) that may be imported into the engine.
    pub supported_types: Vec<String>,
    /// Advisory batch size reported to callers; not enforced mid-stream.
    pub batch_size: usize,
    /// Row bound for structured queries issued without an explicit limit.
    pub preview_limit: i64,
    /// Row bound for raw queries issued without an explicit limit. Negative means unbounded.
    pub raw_limit: i64,
    /// Extensions installed and loaded, in order, whenever a connection is validated.
    pub extensions: Vec<String>,
    /// Number of engine batches buffered ahead of the consumer.
    pub prefetch_batches: usize,
    /// Directory backing the engine's virtual filesystem. A fresh temp directory when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Log format: "compact" or "json".
    pub log_format: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            supported_types: vec![".csv".to_string(), ".parquet".to_string()],
            batch_size: 10_000,
            preview_limit: 1_000,
            raw_limit: -1,
            extensions: Vec::new(),
            prefetch_batches: 2,
            scratch_dir: None,
            log_format: "compact".to_string(),
        }
    }
}

impl SourceConfig {
    /// Load defaults overlaid with `DUCKBRIDGE_*` environment variables.
    ///
    /// List-valued options (`DUCKBRIDGE_EXTENSIONS`, `DUCKBRIDGE_SUPPORTED_TYPES`) are
    /// comma separated.
    pub fn load() -> anyhow::Result<Self> {
        let defaults_json = serde_json::to_string(&Self::default())
            .with_context(|| "failed to serialize defaults")?;
        let settings = config::Config::builder()
            .add_source(
                config::File::from_str(&defaults_json, config::FileFormat::Json).required(false),
            )
            .add_source(
                config::Environment::with_prefix("DUCKBRIDGE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("extensions")
                    .with_list_parse_key("supported_types"),
            )
            .build()
            .with_context(|| "failed to load configuration")?;
        let cfg: SourceConfig = settings
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;
        cfg.validate()
    }

    /// Normalise suffixes and reject values the data source cannot work with.
    pub fn validate(mut self) -> anyhow::Result<Self> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than zero");
        }
        if self.prefetch_batches == 0 {
            anyhow::bail!("prefetch_batches must be greater than zero");
        }
        self.supported_types = self
            .supported_types
            .iter()
            .map(|suffix| suffix.trim().to_lowercase())
            .filter(|suffix| !suffix.is_empty())
            .collect();
        self.extensions = self
            .extensions
            .iter()
            .map(|ext| ext.trim().to_string())
            .filter(|ext| !ext.is_empty())
            .collect();
        match self.log_format.as_str() {
            "compact" | "json" => Ok(self),
            other => anyhow::bail!("unknown log_format {other:?}"),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_supported_types<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_types = suffixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Whether `file_name` ends with one of the supported suffixes.
    pub fn is_supported_file(&self, file_name: &str) -> bool {
        let lowered = file_name.to_lowercase();
        self.supported_types
            .iter()
            .any(|suffix| lowered.ends_with(&suffix.to_lowercase()))
    }
}
