//! Error types for the preview pipeline
//!
//! None of these escape the pipeline threads: source and decode failures are
//! logged and recovered where they happen. Only configuration errors reach
//! the caller.

use thiserror::Error;

/// Raw status code reported by a live-view device
pub type DeviceStatus = u32;

/// Generic device failure code used by the device SDK
pub const DEVICE_ERROR_GENERIC: DeviceStatus = 0x8001;

/// Transient failure of a frame source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("device reported status {0:#06x}")]
    Device(DeviceStatus),
    #[error("device disconnected")]
    Disconnected,
    #[error("frame source failed: {0}")]
    Other(String),
}

/// Per-frame decode or transform failure
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    #[error("jpeg decode failed: {0}")]
    Jpeg(String),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("decoded {len} bytes do not describe a {width}x{height} image")]
    Geometry { width: u32, height: u32, len: usize },
    #[error("unsupported pixel layout with {0} channels")]
    Channels(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
