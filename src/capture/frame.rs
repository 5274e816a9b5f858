use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;

/// One encoded frame as delivered by the device
///
/// Moved from the acquisition loop into the raw queue and from there into
/// exactly one processing worker; never shared.
pub struct RawFrame {
    /// Arrival order assigned by the source
    pub sequence: u64,

    /// Capture timestamp for latency tracking
    pub captured_at: Instant,

    /// Encoded image bytes
    pub data: Bytes,
}

impl RawFrame {
    pub fn new(sequence: u64, data: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            captured_at: Instant::now(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("sequence", &self.sequence)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Decoded, display-ready frame
///
/// Pixels are RGBA8, row-major, `width * 4` bytes per row. The buffer is
/// frozen on creation; cloning shares it.
#[derive(Clone)]
pub struct ProcessedFrame {
    sequence: u64,
    captured_at: Instant,
    width: u32,
    height: u32,
    pixels: Bytes,
}

impl ProcessedFrame {
    pub(crate) fn new(
        sequence: u64,
        captured_at: Instant,
        width: u32,
        height: u32,
        pixels: Bytes,
    ) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        Self {
            sequence,
            captured_at,
            width,
            height,
            pixels,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Time since the encoded frame left the device
    pub fn latency(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

impl fmt::Debug for ProcessedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessedFrame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
