//! Live-view adapter for devices that exchange images through a data block
//!
//! The device SDK fills a caller-owned block: the host sizes the buffer, asks
//! the device for the current live-view image, then reads back how many bytes
//! of it are valid. The block is kept across calls and only grown when the
//! device reports an image larger than the buffer.

use tracing::{debug, trace};

use crate::capture::{FrameSource, RawFrame};
use crate::error::{DeviceStatus, SourceError};

/// Initial buffer size; live-view JPEGs are typically well under this
pub const DEFAULT_BLOCK_SIZE: usize = 512 * 1024;

/// Caller-owned exchange buffer for one live-view image
#[derive(Debug)]
pub struct ImageDataBlock {
    frame_no: u32,
    time_code: u32,
    buffer: Vec<u8>,
    image_size: usize,
}

impl ImageDataBlock {
    pub fn with_size(size: usize) -> Self {
        Self {
            frame_no: 0,
            time_code: 0,
            buffer: vec![0; size],
            image_size: 0,
        }
    }

    /// Capacity the device may write into
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn set_size(&mut self, size: usize) {
        self.buffer.resize(size, 0);
    }

    pub fn frame_no(&self) -> u32 {
        self.frame_no
    }

    pub fn time_code(&self) -> u32 {
        self.time_code
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Device side: publish an image of `image_size` bytes.
    ///
    /// When the image does not fit, only the size is recorded so the host can
    /// grow the block and ask again.
    pub fn fill(&mut self, frame_no: u32, time_code: u32, image: &[u8]) {
        self.frame_no = frame_no;
        self.time_code = time_code;
        self.image_size = image.len();
        if let Some(dst) = self.buffer.get_mut(..image.len()) {
            dst.copy_from_slice(image);
        }
    }

    /// Valid image bytes, or `None` when nothing fits in the buffer
    pub fn image(&self) -> Option<&[u8]> {
        if self.image_size == 0 {
            return None;
        }
        self.buffer.get(..self.image_size)
    }

    fn reset(&mut self) {
        self.image_size = 0;
    }
}

/// Device that can copy its current live-view image into a block
pub trait LiveViewDevice: Send + 'static {
    fn fetch_live_view(&mut self, block: &mut ImageDataBlock) -> Result<(), DeviceStatus>;
}

/// Adapts a [`LiveViewDevice`] into a [`FrameSource`]
pub struct LiveViewSource<D> {
    device: D,
    block: ImageDataBlock,
}

impl<D: LiveViewDevice> LiveViewSource<D> {
    pub fn new(device: D) -> Self {
        Self::with_block_size(device, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(device: D, size: usize) -> Self {
        Self {
            device,
            block: ImageDataBlock::with_size(size),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block.size()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    fn fetch(&mut self) -> Result<(), SourceError> {
        self.block.reset();
        self.device
            .fetch_live_view(&mut self.block)
            .map_err(SourceError::Device)
    }
}

impl<D: LiveViewDevice> FrameSource for LiveViewSource<D> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        self.fetch()?;

        if self.block.image_size() > self.block.size() {
            debug!(
                image_size = self.block.image_size(),
                block_size = self.block.size(),
                "Growing live-view block"
            );
            self.block.set_size(self.block.image_size());
            self.fetch()?;
        }

        let Some(image) = self.block.image() else {
            trace!("No live-view image available");
            return Ok(None);
        };

        Ok(Some(RawFrame::new(
            u64::from(self.block.frame_no()),
            image.to_vec(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DEVICE_ERROR_GENERIC;

    struct FakeDevice {
        images: Vec<Result<Vec<u8>, DeviceStatus>>,
        calls: usize,
    }

    impl LiveViewDevice for FakeDevice {
        fn fetch_live_view(&mut self, block: &mut ImageDataBlock) -> Result<(), DeviceStatus> {
            let index = self.calls.min(self.images.len() - 1);
            self.calls += 1;
            let image = self.images[index].clone()?;
            block.fill(index as u32 + 1, 0, &image);
            Ok(())
        }
    }

    #[test]
    fn copies_image_out_of_block() {
        let device = FakeDevice {
            images: vec![Ok(vec![0xFF, 0xD8, 1, 2, 3])],
            calls: 0,
        };
        let mut source = LiveViewSource::with_block_size(device, 16);

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(&frame.data[..], &[0xFF, 0xD8, 1, 2, 3]);
        assert_eq!(frame.sequence, 1);
        assert_eq!(source.block_size(), 16);
    }

    #[test]
    fn empty_image_is_no_frame() {
        let device = FakeDevice {
            images: vec![Ok(Vec::new())],
            calls: 0,
        };
        let mut source = LiveViewSource::with_block_size(device, 16);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn oversized_image_grows_block_and_refetches() {
        let big = vec![7u8; 64];
        let device = FakeDevice {
            images: vec![Ok(big.clone())],
            calls: 0,
        };
        let mut source = LiveViewSource::with_block_size(device, 8);

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.data.len(), 64);
        assert_eq!(source.block_size(), 64);
        assert_eq!(source.device().calls, 2);
    }

    #[test]
    fn device_status_is_surfaced_as_source_error() {
        let device = FakeDevice {
            images: vec![Err(DEVICE_ERROR_GENERIC)],
            calls: 0,
        };
        let mut source = LiveViewSource::with_block_size(device, 8);

        match source.next_frame() {
            Err(SourceError::Device(code)) => assert_eq!(code, DEVICE_ERROR_GENERIC),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
