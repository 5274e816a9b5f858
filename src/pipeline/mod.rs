//! Concurrent frame pipeline: acquisition, drop-oldest queues, decode workers

mod acquisition;
mod cancel;
mod controller;
pub mod metrics;
mod notify;
pub mod processing;
pub mod ringbuf;

use tracing::debug;

pub use cancel::CancelToken;
pub use controller::{LivePreview, PipelineState};
pub use metrics::{MetricsSnapshot, MetricsTracker};
pub use notify::{Notifier, Subscriptions};
pub use processing::ScratchBuffer;
pub use ringbuf::{DropOldestQueue, QueueStats};

use crate::capture::{ProcessedFrame, RawFrame};
use crate::PipelineConfig;

/// State shared by the threads of one start/stop cycle
///
/// Created on start and dropped once the controller and every thread of the
/// run have let go of it. A restart builds a new one, so stragglers from a
/// stopped run can only touch queues nobody reads any more.
pub(crate) struct RunContext {
    pub raw: DropOldestQueue<RawFrame>,
    pub processed: DropOldestQueue<ProcessedFrame>,
    pub metrics: MetricsTracker,
    pub cancel: CancelToken,
    pub notifier: Notifier,
}

impl RunContext {
    pub fn new(config: &PipelineConfig, notifier: Notifier) -> Self {
        Self {
            raw: DropOldestQueue::new("raw", config.raw_queue_capacity),
            processed: DropOldestQueue::new("processed", config.processed_queue_capacity),
            metrics: MetricsTracker::new(config.metrics_window()),
            cancel: CancelToken::new(),
            notifier,
        }
    }

    /// Roll the metrics window if due and publish the status line.
    ///
    /// A cancelled run publishes nothing.
    pub fn publish_metrics(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        let queued = self.raw.len();
        ::metrics::gauge!("liveview_raw_queue_depth").set(queued as f64);

        if let Some(snapshot) = self.metrics.roll(queued) {
            let line = snapshot.status_line();
            debug!(status = %line, "Pipeline status");
            self.notifier.status_update(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn short_window() -> PipelineConfig {
        PipelineConfig {
            metrics_window_ms: 1,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn publishes_status_once_window_elapses() {
        let (notifier, subscriptions) = Notifier::bounded(1, 4);
        let run = RunContext::new(&short_window(), notifier);

        thread::sleep(Duration::from_millis(5));
        run.publish_metrics();

        let line = subscriptions.status.try_recv().unwrap();
        assert!(line.starts_with("Capture: "), "{line}");
    }

    #[test]
    fn cancelled_run_publishes_nothing() {
        let (notifier, subscriptions) = Notifier::bounded(1, 4);
        let run = RunContext::new(&short_window(), notifier);
        run.cancel.cancel();

        thread::sleep(Duration::from_millis(5));
        run.publish_metrics();

        assert!(subscriptions.status.try_recv().is_err());
        assert_eq!(run.metrics.latest().capture_fps, 0.0);
    }
}
