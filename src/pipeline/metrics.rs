//! Rolling throughput window shared by the acquisition loop and the workers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam::utils::CachePadded;

/// Throughput figures from the last completed window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub capture_fps: f64,
    pub process_fps: f64,
    pub queued_raw_frames: usize,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Human-readable summary published on the status channel
    pub fn status_line(&self) -> String {
        format!(
            "Capture: {:.1} FPS, Process: {:.1} FPS, Queue: {}",
            self.capture_fps, self.process_fps, self.queued_raw_frames
        )
    }
}

/// Frame counters plus a window start, rolled into FPS figures once per window
///
/// Counters are bumped from different threads; whichever thread first sees
/// the window expire wins a compare-and-swap on the window start and is the
/// only one to reset the counters for that window.
pub struct MetricsTracker {
    origin: Instant,
    window: Duration,
    acquired: CachePadded<AtomicU64>,
    processed: CachePadded<AtomicU64>,
    /// Nanoseconds since `origin`
    window_start: AtomicU64,
    latest: ArcSwap<MetricsSnapshot>,
}

impl MetricsTracker {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(Instant::now(), window)
    }

    /// Tracker whose first window opens at `origin`
    pub fn starting_at(origin: Instant, window: Duration) -> Self {
        Self {
            origin,
            window,
            acquired: CachePadded::new(AtomicU64::new(0)),
            processed: CachePadded::new(AtomicU64::new(0)),
            window_start: AtomicU64::new(0),
            latest: ArcSwap::from_pointee(MetricsSnapshot::default()),
        }
    }

    pub fn record_acquired(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts accumulated in the current, still open window
    pub fn pending(&self) -> (u64, u64) {
        (
            self.acquired.load(Ordering::Relaxed),
            self.processed.load(Ordering::Relaxed),
        )
    }

    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.latest.load_full()
    }

    pub fn roll(&self, queued_raw_frames: usize) -> Option<MetricsSnapshot> {
        self.roll_at(Instant::now(), queued_raw_frames)
    }

    /// Close the window if it has run for at least the configured length.
    ///
    /// Returns the new snapshot to the single caller that closed the window,
    /// `None` to everyone else.
    pub fn roll_at(&self, now: Instant, queued_raw_frames: usize) -> Option<MetricsSnapshot> {
        let now_ns = self.nanos_since_origin(now);
        let start_ns = self.window_start.load(Ordering::Acquire);
        let elapsed_ns = now_ns.saturating_sub(start_ns);
        if elapsed_ns < self.window.as_nanos() as u64 {
            return None;
        }

        self.window_start
            .compare_exchange(start_ns, now_ns, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        let acquired = self.acquired.swap(0, Ordering::AcqRel);
        let processed = self.processed.swap(0, Ordering::AcqRel);
        let elapsed = Duration::from_nanos(elapsed_ns);
        let secs = elapsed.as_secs_f64();

        let snapshot = MetricsSnapshot {
            capture_fps: acquired as f64 / secs,
            process_fps: processed as f64 / secs,
            queued_raw_frames,
            elapsed,
        };

        ::metrics::gauge!("liveview_capture_fps").set(snapshot.capture_fps);
        ::metrics::gauge!("liveview_process_fps").set(snapshot.process_fps);
        self.latest.store(Arc::new(snapshot.clone()));
        Some(snapshot)
    }

    fn nanos_since_origin(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.origin).as_nanos() as u64
    }
}
