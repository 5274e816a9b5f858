use flume::{Receiver, Sender, TrySendError};
use tracing::trace;

use crate::capture::ProcessedFrame;

/// Fire-and-forget push side of the pipeline
///
/// Both channels are bounded and never block the sender. A full channel
/// gives up its oldest pending item to the new one, so a busy consumer sees
/// a coalesced stream that still ends on the most recent frame and status.
#[derive(Clone)]
pub struct Notifier {
    frames: Sender<ProcessedFrame>,
    /// Used only to evict stale frames from a full channel
    stale_frames: Receiver<ProcessedFrame>,
    status: Sender<String>,
    stale_status: Receiver<String>,
}

/// Receiving ends handed out to consumers
#[derive(Clone)]
pub struct Subscriptions {
    pub frames: Receiver<ProcessedFrame>,
    pub status: Receiver<String>,
}

impl Notifier {
    pub fn bounded(frame_capacity: usize, status_capacity: usize) -> (Self, Subscriptions) {
        let (frames, frames_rx) = flume::bounded(frame_capacity);
        let (status, status_rx) = flume::bounded(status_capacity);
        (
            Self {
                frames,
                stale_frames: frames_rx.clone(),
                status,
                stale_status: status_rx.clone(),
            },
            Subscriptions {
                frames: frames_rx,
                status: status_rx,
            },
        )
    }

    pub fn frame_ready(&self, frame: ProcessedFrame) {
        let Err(TrySendError::Full(frame)) = self.frames.try_send(frame) else {
            return;
        };

        if let Ok(stale) = self.stale_frames.try_recv() {
            trace!(sequence = stale.sequence(), "Frame notification coalesced");
            ::metrics::counter!("liveview_frame_events_dropped_total").increment(1);
        }
        // Another worker may have refilled the slot first; either frame is recent.
        let _ = self.frames.try_send(frame);
    }

    /// Empty the frame channel, returning how many notifications were pending.
    pub fn discard_pending_frames(&self) -> usize {
        self.stale_frames.drain().count()
    }

    /// Empty the status channel, returning how many lines were pending.
    pub fn discard_pending_status(&self) -> usize {
        self.stale_status.drain().count()
    }

    pub fn status_update(&self, line: String) {
        let Err(TrySendError::Full(line)) = self.status.try_send(line) else {
            return;
        };

        if let Ok(stale) = self.stale_status.try_recv() {
            trace!(status = %stale, "Status notification replaced");
        }
        let _ = self.status.try_send(line);
    }
}
