pub mod capture;
pub mod error;
pub mod pipeline;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{FrameSource, ProcessedFrame, RawFrame};
pub use error::{ConfigError, DecodeError, SourceError};
pub use pipeline::{LivePreview, PipelineState};

/// Environment prefix for configuration overrides, e.g. `LIVEVIEW__PROCESSING__WORKER_COUNT=4`
pub const ENV_PREFIX: &str = "LIVEVIEW";

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub processing: ProcessingConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum spacing between two calls into the frame source
    pub min_frame_interval_ms: u64,
    /// Pause after a failed source call before retrying
    pub error_backoff_ms: u64,
    /// At most one source-failure log line per interval
    pub error_log_interval_ms: u64,
    /// Forward only every second frame
    pub frame_skipping: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub worker_count: usize,
    /// Decoded frames wider than this are downscaled, aspect preserved
    pub max_width: u32,
    /// Worker sleep when the raw queue is empty
    pub idle_poll_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_queue_capacity: usize,
    pub processed_queue_capacity: usize,
    pub metrics_window_ms: u64,
    pub frame_event_capacity: usize,
    pub status_event_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_frame_interval_ms: 20, // 50Hz ceiling
            error_backoff_ms: 100,
            error_log_interval_ms: 1000,
            frame_skipping: false,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            max_width: 1920,
            idle_poll_ms: 5,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_queue_capacity: 3,
            processed_queue_capacity: 2,
            metrics_window_ms: 1000,
            frame_event_capacity: 2,
            status_event_capacity: 8,
        }
    }
}

impl CaptureConfig {
    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_millis(self.min_frame_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::from_millis(self.error_log_interval_ms)
    }
}

impl ProcessingConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl PipelineConfig {
    pub fn metrics_window(&self) -> Duration {
        Duration::from_millis(self.metrics_window_ms)
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `LIVEVIEW__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("pipeline.raw_queue_capacity", self.pipeline.raw_queue_capacity == 0),
            (
                "pipeline.processed_queue_capacity",
                self.pipeline.processed_queue_capacity == 0,
            ),
            ("pipeline.metrics_window_ms", self.pipeline.metrics_window_ms == 0),
            ("pipeline.frame_event_capacity", self.pipeline.frame_event_capacity == 0),
            ("pipeline.status_event_capacity", self.pipeline.status_event_capacity == 0),
            ("processing.worker_count", self.processing.worker_count == 0),
            ("processing.max_width", self.processing.max_width == 0),
        ];

        match checks.iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ConfigError::Invalid {
                field: *field,
                reason: "must be greater than zero",
            }),
            None => Ok(()),
        }
    }
}
