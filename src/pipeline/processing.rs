//! Processing pool workers: decode, downscale and freeze raw frames

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba, RgbaImage};
use tracing::{debug, trace};

use super::RunContext;
use crate::capture::decode::{decode_frame, DecodedImage};
use crate::capture::{ProcessedFrame, RawFrame};
use crate::error::DecodeError;
use crate::ProcessingConfig;

/// Reusable RGBA workspace, reallocated only when the requested size changes
///
/// Owned by exactly one worker; never shared between threads.
#[derive(Debug)]
pub struct ScratchBuffer {
    canvas: RgbaImage,
    allocations: usize,
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
            allocations: 0,
        }
    }

    /// Canvas of exactly `width` x `height`, contents unspecified
    pub fn acquire(&mut self, width: u32, height: u32) -> &mut RgbaImage {
        if self.canvas.dimensions() != (width, height) {
            trace!(width, height, "Resizing scratch buffer");
            self.canvas = RgbaImage::new(width, height);
            self.allocations += 1;
        }
        &mut self.canvas
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// How many times the canvas had to be (re)allocated
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn release(&mut self) {
        self.canvas = RgbaImage::new(0, 0);
    }
}

/// Output size for a decoded frame: unchanged up to `max_width`, otherwise
/// scaled down to `max_width` with the aspect ratio kept.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        return (width, height);
    }
    let scaled = (f64::from(height) * f64::from(max_width) / f64::from(width)).round();
    (max_width, (scaled as u32).max(1))
}

/// Decode `raw`, fit it to `max_width` and freeze the result.
pub fn render_frame(
    raw: &RawFrame,
    max_width: u32,
    scratch: &mut ScratchBuffer,
) -> Result<ProcessedFrame, DecodeError> {
    let decoded = decode_frame(&raw.data)?;
    let (width, height) = target_dimensions(decoded.width, decoded.height, max_width);
    let canvas = scratch.acquire(width, height);

    match decoded.channels {
        1 => draw::<Luma<u8>>(&decoded, canvas)?,
        3 => draw::<Rgb<u8>>(&decoded, canvas)?,
        4 => draw::<Rgba<u8>>(&decoded, canvas)?,
        other => return Err(DecodeError::Channels(other)),
    }

    let pixels = Bytes::copy_from_slice(canvas.as_raw());
    Ok(ProcessedFrame::new(
        raw.sequence,
        raw.captured_at,
        width,
        height,
        pixels,
    ))
}

/// Convert the decoded samples to RGBA on `canvas`, resampling when the
/// canvas is smaller than the source.
fn draw<P>(decoded: &DecodedImage, canvas: &mut RgbaImage) -> Result<(), DecodeError>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let source: ImageBuffer<P, &[u8]> =
        ImageBuffer::from_raw(decoded.width, decoded.height, decoded.data.as_slice()).ok_or(
            DecodeError::Geometry {
                width: decoded.width,
                height: decoded.height,
                len: decoded.data.len(),
            },
        )?;

    if source.dimensions() == canvas.dimensions() {
        for (dst, src) in canvas.pixels_mut().zip(source.pixels()) {
            *dst = src.to_rgba();
        }
    } else {
        let (width, height) = canvas.dimensions();
        let scaled = imageops::resize(&source, width, height, FilterType::Triangle);
        for (dst, src) in canvas.pixels_mut().zip(scaled.pixels()) {
            *dst = src.to_rgba();
        }
    }
    Ok(())
}

/// One symmetric member of the processing pool
pub(crate) struct ProcessingWorker {
    id: usize,
    run: Arc<RunContext>,
    max_width: u32,
    idle_poll: Duration,
    scratch: ScratchBuffer,
}

impl ProcessingWorker {
    pub fn new(id: usize, run: Arc<RunContext>, config: &ProcessingConfig) -> Self {
        Self {
            id,
            run,
            max_width: config.max_width,
            idle_poll: config.idle_poll(),
            scratch: ScratchBuffer::new(),
        }
    }

    /// Loop until the run is cancelled. Bad frames are dropped, never fatal.
    pub fn run(mut self) {
        debug!(worker = self.id, "Processing worker started");

        while !self.run.cancel.is_cancelled() {
            let Some(raw) = self.run.raw.dequeue() else {
                thread::sleep(self.idle_poll);
                continue;
            };

            self.process(raw);
            self.run.publish_metrics();
        }

        self.scratch.release();
        debug!(worker = self.id, "Processing worker exiting");
    }

    fn process(&mut self, raw: RawFrame) {
        let started = Instant::now();

        let frame = match render_frame(&raw, self.max_width, &mut self.scratch) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(
                    worker = self.id,
                    sequence = raw.sequence,
                    error = %e,
                    "Dropping undecodable frame"
                );
                ::metrics::counter!("liveview_decode_failures_total").increment(1);
                return;
            }
        };

        ::metrics::histogram!("liveview_decode_time_us").record(started.elapsed().as_micros() as f64);

        // a stopped run must not publish anything more
        if self.run.cancel.is_cancelled() {
            return;
        }

        if let Some(evicted) = self.run.processed.enqueue(frame.clone()) {
            trace!(
                sequence = evicted.sequence(),
                "Processed queue full, evicted oldest frame"
            );
        }
        self.run.notifier.frame_ready(frame);
        self.run.metrics.record_processed();
        ::metrics::counter!("liveview_frames_processed_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

    use super::*;

    fn png(img: impl Into<DynamicImage>) -> RawFrame {
        let mut out = Cursor::new(Vec::new());
        img.into().write_to(&mut out, ImageFormat::Png).unwrap();
        RawFrame::new(7, out.into_inner())
    }

    #[test]
    fn target_dimensions_preserve_aspect() {
        assert_eq!(target_dimensions(1280, 720, 1920), (1280, 720));
        assert_eq!(target_dimensions(1920, 1080, 1920), (1920, 1080));
        assert_eq!(target_dimensions(3840, 2160, 1920), (1920, 1080));
        assert_eq!(target_dimensions(6000, 4000, 1920), (1920, 1280));
        assert_eq!(target_dimensions(10_000, 1, 100), (100, 1));
    }

    #[test]
    fn scratch_is_reused_while_size_is_stable() {
        let mut scratch = ScratchBuffer::new();
        scratch.acquire(4, 3);
        scratch.acquire(4, 3);
        assert_eq!(scratch.allocations(), 1);

        scratch.acquire(8, 6);
        assert_eq!(scratch.allocations(), 2);
        assert_eq!(scratch.dimensions(), (8, 6));

        scratch.release();
        assert_eq!(scratch.dimensions(), (0, 0));
    }

    #[test]
    fn renders_small_frame_unscaled() {
        let raw = png(RgbImage::from_pixel(6, 4, Rgb([10, 20, 30])));
        let mut scratch = ScratchBuffer::new();

        let frame = render_frame(&raw, 1920, &mut scratch).unwrap();
        assert_eq!((frame.width(), frame.height()), (6, 4));
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.pixels().len(), 6 * 4 * 4);
        assert_eq!(&frame.pixels()[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn downscales_wide_frame() {
        let raw = png(RgbImage::from_pixel(400, 100, Rgb([0, 128, 255])));
        let mut scratch = ScratchBuffer::new();

        let frame = render_frame(&raw, 100, &mut scratch).unwrap();
        assert_eq!((frame.width(), frame.height()), (100, 25));
        let expected = [0i16, 128, 255, 255];
        for (got, want) in frame.pixels()[..4].iter().zip(expected) {
            assert!((i16::from(*got) - want).abs() <= 1, "{got} vs {want}");
        }
        assert_eq!(scratch.dimensions(), (100, 25));
    }

    #[test]
    fn expands_grayscale() {
        let raw = png(GrayImage::from_pixel(3, 3, Luma([90])));
        let frame = render_frame(&raw, 1920, &mut ScratchBuffer::new()).unwrap();
        assert_eq!(&frame.pixels()[..4], &[90, 90, 90, 255]);
    }

    #[test]
    fn frames_do_not_alias_the_scratch_buffer() {
        let mut scratch = ScratchBuffer::new();
        let red_raw = png(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])));
        let blue_raw = png(RgbImage::from_pixel(2, 2, Rgb([0, 0, 255])));

        let red = render_frame(&red_raw, 1920, &mut scratch).unwrap();
        let blue = render_frame(&blue_raw, 1920, &mut scratch).unwrap();

        assert_eq!(scratch.allocations(), 1);
        assert_eq!(&red.pixels()[..4], &[255, 0, 0, 255]);
        assert_eq!(&blue.pixels()[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn undecodable_frame_is_an_error() {
        let raw = RawFrame::new(1, vec![0xFF, 0xD8, 0xFF]);
        assert!(render_frame(&raw, 1920, &mut ScratchBuffer::new()).is_err());
    }
}
