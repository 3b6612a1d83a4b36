//! Pipeline configuration management.
//!
//! One serializable struct covers every stage of dataset preparation, so a
//! run can be reproduced from a single TOML or JSON file.
//!
//! # Sections
//!
//! | Section | Controls |
//! |---------|----------|
//! | `window` | sequence length L, streaming gap limit |
//! | `chunks` | output directory, records per cursor batch, chunk cap |
//! | `scalers` | scaler file locations, fit-if-missing policy |
//! | `generator` | batch size, shuffling, batch-count rounding |
//! | `split` | chunk-level train/validation split |
//! | `balance` | in-memory minority upsampling |
//!
//! Every section has defaults, so a config file only needs the keys it
//! changes.
//!
//! # Example
//!
//! ```ignore
//! use seismic_dataset::config::PipelineConfig;
//!
//! let config = PipelineConfig::default().with_sequence_length(50);
//! config.save_toml("configs/experiment1.toml")?;
//!
//! let loaded = PipelineConfig::load_toml("configs/experiment1.toml")?;
//! assert_eq!(loaded.window.sequence_length, 50);
//! ```

use crate::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Unified pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub window: WindowConfig,
    pub chunks: ChunkConfig,
    pub scalers: ScalerConfig,
    pub generator: GeneratorConfig,
    pub split: SplitConfig,
    pub balance: BalanceConfig,

    /// Experiment metadata (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExperimentMetadata>,
}

/// Windowing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Records per input sequence (L)
    pub sequence_length: usize,

    /// Largest gap, in seconds, across which the streaming windower joins
    /// consecutive cursor batches. Unlimited when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_gap_seconds: Option<u64>,
}

/// Chunk building parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Directory holding chunk files
    pub output_dir: PathBuf,

    /// Records pulled from the cursor per chunk
    pub records_per_batch: usize,

    /// Stop after reading this many cursor batches. Batches too short to
    /// window still count, so fewer chunks than this may be written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_chunks: Option<usize>,

    /// Carry the trailing L+1 records into the next batch so windows span
    /// batch boundaries
    pub carry_overlap: bool,
}

/// Scaler persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    /// Min-max scaler for the four input features
    pub feature_scaler_path: PathBuf,

    /// Per-target min-max scalers; regression targets stay unscaled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_scaler_path: Option<PathBuf>,

    /// Fit and persist a scaler when its file is missing
    pub fit_if_missing: bool,
}

/// How many batches an epoch has when the last one would be short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchRounding {
    /// `ceil(n / batch_size)`; the last batch may be smaller
    #[default]
    KeepPartial,
    /// `floor(n / batch_size)`; trailing sequences are left out of the epoch
    DropPartial,
}

impl BatchRounding {
    /// Batches for `n` sequences.
    pub fn batch_count(&self, n: usize, batch_size: usize) -> usize {
        match self {
            BatchRounding::KeepPartial => n.div_ceil(batch_size),
            BatchRounding::DropPartial => n / batch_size,
        }
    }
}

/// Batch generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub batch_size: usize,

    /// Reshuffle the iteration order at every epoch end
    pub shuffle: bool,

    /// Seed for the shuffle RNG
    pub seed: u64,

    pub rounding: BatchRounding,

    /// Read the chunks of one batch on the rayon pool
    pub parallel_reads: bool,
}

/// Chunk-level train/validation split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of chunks held out for validation
    pub validation_fraction: f64,
    pub seed: u64,
}

/// Minority upsampling of the occurrence label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub enabled: bool,
    pub seed: u64,
}

/// Experiment metadata for tracking and reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    /// Experiment name
    pub name: String,

    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Version or git commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Custom tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sequence_length: 30,
            max_gap_seconds: None,
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs/processed"),
            records_per_batch: 10_000,
            max_chunks: None,
            carry_overlap: false,
        }
    }
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            feature_scaler_path: PathBuf::from("outputs/scalers/feature_scaler.json"),
            target_scaler_path: Some(PathBuf::from("outputs/scalers/target_scalers.json")),
            fit_if_missing: true,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            shuffle: true,
            seed: 42,
            rounding: BatchRounding::KeepPartial,
            parallel_reads: false,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seed: 42,
        }
    }
}

impl PipelineConfig {
    /// Create default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, metadata: ExperimentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_sequence_length(mut self, sequence_length: usize) -> Self {
        self.window.sequence_length = sequence_length;
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.chunks.output_dir = dir.into();
        self
    }

    pub fn with_records_per_batch(mut self, records: usize) -> Self {
        self.chunks.records_per_batch = records;
        self
    }

    pub fn with_feature_scaler_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.scalers.feature_scaler_path = path.into();
        self
    }

    pub fn with_target_scaler_path<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.scalers.target_scaler_path = path.map(Into::into);
        self
    }

    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_balancing(mut self, enabled: bool) -> Self {
        self.balance.enabled = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// Returns Ok(()) if valid, Err(msg) otherwise.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.window.validate()?;
        self.chunks.validate(self.window.sequence_length)?;
        self.scalers.validate()?;
        self.generator.validate()?;
        self.split.validate()?;
        Ok(())
    }

    /// Save configuration to TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Load and validate configuration from TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&contents)?;
        config.validate().map_err(DatasetError::InvalidConfig)?;
        Ok(config)
    }

    /// Save configuration to JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        fs::write(path, json_string)?;
        Ok(())
    }

    /// Load and validate configuration from JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate().map_err(DatasetError::InvalidConfig)?;
        Ok(config)
    }
}

impl WindowConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sequence_length == 0 {
            return Err("window.sequence_length must be > 0".to_string());
        }
        if self.max_gap_seconds == Some(0) {
            return Err("window.max_gap_seconds must be > 0 when set".to_string());
        }
        Ok(())
    }
}

impl ChunkConfig {
    pub fn validate(&self, sequence_length: usize) -> std::result::Result<(), String> {
        if self.records_per_batch < sequence_length + 2 {
            return Err(format!(
                "chunks.records_per_batch ({}) must be at least sequence_length + 2 ({})",
                self.records_per_batch,
                sequence_length + 2
            ));
        }
        if self.max_chunks == Some(0) {
            return Err("chunks.max_chunks must be > 0 when set".to_string());
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err("chunks.output_dir must not be empty".to_string());
        }
        Ok(())
    }
}

impl ScalerConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.feature_scaler_path.as_os_str().is_empty() {
            return Err("scalers.feature_scaler_path must not be empty".to_string());
        }
        if self.target_scaler_path.as_ref() == Some(&self.feature_scaler_path) {
            return Err("scalers.target_scaler_path must differ from feature_scaler_path".to_string());
        }
        Ok(())
    }
}

impl GeneratorConfig {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_rounding(mut self, rounding: BatchRounding) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_parallel_reads(mut self, enabled: bool) -> Self {
        self.parallel_reads = enabled;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.batch_size == 0 {
            return Err("generator.batch_size must be > 0".to_string());
        }
        Ok(())
    }
}

impl SplitConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(format!(
                "split.validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            ));
        }
        Ok(())
    }
}
