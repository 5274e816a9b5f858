//! Dedicated acquisition thread: rate-limited pulls from the frame source

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::RunContext;
use crate::capture::FrameSource;
use crate::error::SourceError;
use crate::CaptureConfig;

pub(crate) struct AcquisitionLoop<S> {
    source: S,
    run: Arc<RunContext>,
    frame_skipping: Arc<AtomicBool>,
    error_backoff: Duration,
    limiter: RateLimiter,
    skipper: FrameSkipper,
    errors: ErrorThrottle,
}

impl<S: FrameSource> AcquisitionLoop<S> {
    pub fn new(
        source: S,
        run: Arc<RunContext>,
        frame_skipping: Arc<AtomicBool>,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            source,
            run,
            frame_skipping,
            error_backoff: config.error_backoff(),
            limiter: RateLimiter::new(config.min_frame_interval()),
            skipper: FrameSkipper::default(),
            errors: ErrorThrottle::new(config.error_log_interval()),
        }
    }

    /// Loop until the run is cancelled. Source failures never end the loop.
    pub fn run(mut self) {
        debug!("Acquisition loop started");

        while !self.run.cancel.is_cancelled() {
            self.limiter.wait();

            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    self.run.metrics.record_acquired();
                    ::metrics::counter!("liveview_frames_acquired_total").increment(1);

                    if !self.skipper.keep(self.frame_skipping.load(Ordering::Relaxed)) {
                        trace!(sequence = frame.sequence, "Skipping frame");
                        ::metrics::counter!("liveview_frames_skipped_total").increment(1);
                    } else if let Some(evicted) = self.run.raw.enqueue(frame) {
                        trace!(sequence = evicted.sequence, "Raw queue full, evicted oldest frame");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.errors.report(&e);
                    thread::sleep(self.error_backoff);
                }
            }

            self.run.publish_metrics();
        }

        debug!("Acquisition loop exiting");
    }
}

/// Keeps successive source calls at least `interval` apart
pub(crate) struct RateLimiter {
    interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: None,
        }
    }

    /// Sleep until the next call is allowed, then mark it as made.
    pub fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// Alternating keep/drop decision, starting with keep
#[derive(Debug, Default)]
pub(crate) struct FrameSkipper {
    drop_next: bool,
}

impl FrameSkipper {
    pub fn keep(&mut self, skipping: bool) -> bool {
        if !skipping {
            // re-enabling starts over with a kept frame
            self.drop_next = false;
            return true;
        }
        let keep = !self.drop_next;
        self.drop_next = keep;
        keep
    }
}

/// Logs source failures at most once per interval
pub(crate) struct ErrorThrottle {
    interval: Duration,
    last_logged: Option<Instant>,
    suppressed: u64,
}

impl ErrorThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: None,
            suppressed: 0,
        }
    }

    /// Returns whether this failure was logged.
    pub fn report(&mut self, error: &SourceError) -> bool {
        ::metrics::counter!("liveview_source_errors_total").increment(1);

        let due = self
            .last_logged
            .map_or(true, |last| last.elapsed() >= self.interval);
        if !due {
            self.suppressed += 1;
            return false;
        }

        warn!(
            error = %error,
            suppressed = self.suppressed,
            "Frame source failed, backing off"
        );
        self.last_logged = Some(Instant::now());
        self.suppressed = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipper_alternates_starting_with_keep() {
        let mut skipper = FrameSkipper::default();
        let decisions: Vec<bool> = (0..6).map(|_| skipper.keep(true)).collect();
        assert_eq!(decisions, [true, false, true, false, true, false]);
    }

    #[test]
    fn skipper_forwards_everything_when_disabled_and_restarts_on_enable() {
        let mut skipper = FrameSkipper::default();
        assert!(skipper.keep(true));
        assert!((0..4).all(|_| skipper.keep(false)));
        assert!(skipper.keep(true));
        assert!(!skipper.keep(true));
    }

    #[test]
    fn limiter_spaces_calls() {
        let interval = Duration::from_millis(15);
        let mut limiter = RateLimiter::new(interval);

        let mut stamps = Vec::new();
        for _ in 0..4 {
            limiter.wait();
            stamps.push(Instant::now());
        }
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[test]
    fn throttle_suppresses_within_interval() {
        let mut throttle = ErrorThrottle::new(Duration::from_secs(3600));
        assert!(throttle.report(&SourceError::Disconnected));
        assert!(!throttle.report(&SourceError::Disconnected));
        assert!(!throttle.report(&SourceError::Other("again".into())));
        assert_eq!(throttle.suppressed, 2);

        let mut eager = ErrorThrottle::new(Duration::ZERO);
        assert!(eager.report(&SourceError::Disconnected));
        assert!(eager.report(&SourceError::Disconnected));
    }
}
