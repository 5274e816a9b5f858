//! Synthetic live-view source
//!
//! Renders a scrolling gradient and encodes it as JPEG, standing in for a
//! real device in the demo binary and in tests.

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::capture::{FrameSource, RawFrame};
use crate::error::SourceError;

pub struct SyntheticSource {
    width: u32,
    height: u32,
    quality: u8,
    sequence: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            quality: 80,
            sequence: 0,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Encode the frame for `sequence` without advancing the source
    pub fn render(&self, sequence: u64) -> Result<Vec<u8>, SourceError> {
        let (w, h) = (self.width.max(1), self.height.max(1));
        let shift = (sequence.wrapping_mul(4) % u64::from(w)) as u32;
        let image = RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                ((x + shift) % w * 255 / w) as u8,
                (y * 255 / h) as u8,
                (sequence % 256) as u8,
            ])
        });

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.quality)
            .encode_image(&image)
            .map_err(|e| SourceError::Other(e.to_string()))?;
        Ok(encoded)
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        self.sequence += 1;
        let encoded = self.render(self.sequence)?;
        Ok(Some(RawFrame::new(self.sequence, encoded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_sequenced_jpeg_frames() {
        let mut source = SyntheticSource::new(64, 48);

        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();

        assert_eq!((first.sequence, second.sequence), (1, 2));
        assert!(first.data.starts_with(&[0xFF, 0xD8]));
        assert_ne!(first.data, second.data);
    }
}
