//! Start/stop lifecycle of the live preview pipeline

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use flume::Receiver;
use tracing::{debug, error, info, warn};

use super::acquisition::AcquisitionLoop;
use super::processing::ProcessingWorker;
use super::{MetricsSnapshot, Notifier, RunContext, Subscriptions};
use crate::capture::{FrameSource, ProcessedFrame};
use crate::error::ConfigError;
use crate::Config;

/// Lifecycle state of a [`LivePreview`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    /// Threads of the current run
    threads: Vec<JoinHandle<()>>,
    /// Threads of stopped runs that nobody has joined yet
    retired: Vec<JoinHandle<()>>,
}

/// Live preview pipeline
///
/// One acquisition thread pulls frames from a [`FrameSource`] into a small
/// drop-oldest raw queue; a pool of workers decodes and downscales them into
/// a drop-oldest processed queue. Consumers either poll
/// [`try_get_next_processed_frame`](Self::try_get_next_processed_frame) or
/// listen on [`frame_events`](Self::frame_events).
///
/// All methods take `&self`; the pipeline can be shared behind an `Arc`.
pub struct LivePreview {
    config: Config,
    state: AtomicU8,
    frame_skipping: Arc<AtomicBool>,
    notifier: Notifier,
    subscriptions: Subscriptions,
    current: ArcSwapOption<RunContext>,
    lifecycle: Mutex<Lifecycle>,
}

impl LivePreview {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: Config) -> Self {
        let (notifier, subscriptions) = Notifier::bounded(
            config.pipeline.frame_event_capacity,
            config.pipeline.status_event_capacity,
        );

        Self {
            frame_skipping: Arc::new(AtomicBool::new(config.capture.frame_skipping)),
            config,
            state: AtomicU8::new(PipelineState::Idle as u8),
            notifier,
            subscriptions,
            current: ArcSwapOption::empty(),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Start acquiring from `source`.
    ///
    /// Returns `false` and drops `source` if the pipeline is already running
    /// or its threads could not be spawned.
    pub fn start<S: FrameSource>(&self, source: S) -> bool {
        let mut lifecycle = self.lifecycle();
        if self.state() != PipelineState::Idle {
            debug!("Start ignored, pipeline already running");
            return false;
        }

        let run = Arc::new(RunContext::new(&self.config.pipeline, self.notifier.clone()));
        let worker_count = self.config.processing.worker_count;
        let mut threads = Vec::with_capacity(worker_count + 1);

        for id in 0..worker_count {
            let worker = ProcessingWorker::new(id, Arc::clone(&run), &self.config.processing);
            let spawned = thread::Builder::new()
                .name(format!("liveview-worker-{id}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => return self.abort_start(&run, threads, &e, &mut lifecycle),
            }
        }

        let acquisition = AcquisitionLoop::new(
            source,
            Arc::clone(&run),
            Arc::clone(&self.frame_skipping),
            &self.config.capture,
        );
        let spawned = thread::Builder::new()
            .name("liveview-acquire".into())
            .spawn(move || acquisition.run());
        match spawned {
            Ok(handle) => threads.push(handle),
            Err(e) => return self.abort_start(&run, threads, &e, &mut lifecycle),
        }

        lifecycle.threads = threads;
        self.current.store(Some(run));
        self.set_state(PipelineState::Running);

        info!(
            workers = worker_count,
            frame_skipping = self.frame_skipping(),
            "Live preview started"
        );
        true
    }

    /// Like [`start`](Self::start), but a missing source is a no-op.
    pub fn start_optional<S: FrameSource>(&self, source: Option<S>) -> bool {
        match source {
            Some(source) => self.start(source),
            None => {
                debug!("Start ignored, no frame source");
                false
            }
        }
    }

    fn abort_start(
        &self,
        run: &RunContext,
        spawned: Vec<JoinHandle<()>>,
        cause: &std::io::Error,
        lifecycle: &mut Lifecycle,
    ) -> bool {
        error!(error = %cause, "Failed to spawn pipeline thread");
        run.cancel.cancel();
        lifecycle.retired.extend(spawned);
        false
    }

    /// Signal every thread of the current run to exit and empty both queues.
    ///
    /// Does not wait for the threads; use [`join`](Self::join) or
    /// [`stop_and_join`](Self::stop_and_join) for that. No-op when idle.
    pub fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle();
        if self.state() != PipelineState::Running {
            return false;
        }
        self.set_state(PipelineState::Stopping);

        if let Some(run) = self.current.swap(None) {
            run.cancel.cancel();
            let raw = run.raw.clear();
            let processed = run.processed.clear();
            debug!(raw, processed, "Discarded queued frames");
        }
        let pending = self.notifier.discard_pending_frames();
        let status = self.notifier.discard_pending_status();
        if pending + status > 0 {
            debug!(pending, status, "Discarded undelivered notifications");
        }

        let threads = std::mem::take(&mut lifecycle.threads);
        lifecycle.retired.extend(threads);
        self.set_state(PipelineState::Idle);

        info!("Live preview stopped");
        true
    }

    /// Wait for the threads of every stopped run to exit.
    ///
    /// Threads of a run that is still going are left alone.
    pub fn join(&self) {
        let retired = std::mem::take(&mut self.lifecycle().retired);
        for handle in retired {
            let name = handle.thread().name().unwrap_or("unnamed").to_owned();
            if handle.join().is_err() {
                warn!(thread = %name, "Pipeline thread panicked");
            }
        }
    }

    pub fn stop_and_join(&self) {
        self.stop();
        self.join();
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Takes effect on the next acquired frame, also across restarts.
    pub fn set_frame_skipping(&self, enabled: bool) {
        self.frame_skipping.store(enabled, Ordering::Relaxed);
        debug!(enabled, "Frame skipping updated");
    }

    pub fn frame_skipping(&self) -> bool {
        self.frame_skipping.load(Ordering::Relaxed)
    }

    /// Oldest frame in the processed queue, if any. Never blocks.
    pub fn try_get_next_processed_frame(&self) -> Option<ProcessedFrame> {
        self.current.load().as_deref()?.processed.dequeue()
    }

    /// Frame-ready notifications.
    ///
    /// Receivers are clones of one channel: each notification goes to a
    /// single receiver. Frames may be coalesced when the receiver lags.
    pub fn frame_events(&self) -> Receiver<ProcessedFrame> {
        self.subscriptions.frames.clone()
    }

    /// Status lines, roughly one per metrics window
    pub fn status_events(&self) -> Receiver<String> {
        self.subscriptions.status.clone()
    }

    /// Throughput of the last completed window; zeros when idle
    pub fn metrics(&self) -> MetricsSnapshot {
        self.current
            .load()
            .as_deref()
            .map(|run| MetricsSnapshot::clone(&run.metrics.latest()))
            .unwrap_or_default()
    }

    pub fn capture_fps(&self) -> f64 {
        self.metrics().capture_fps
    }

    pub fn process_fps(&self) -> f64 {
        self.metrics().process_fps
    }

    pub fn queued_raw_frame_count(&self) -> usize {
        self.current.load().as_deref().map_or(0, |run| run.raw.len())
    }

    pub fn queued_processed_frame_count(&self) -> usize {
        self.current.load().as_deref().map_or(0, |run| run.processed.len())
    }

    /// Raw frames evicted by the drop-oldest policy during the current run
    pub fn dropped_raw_frames(&self) -> usize {
        self.current
            .load()
            .as_deref()
            .map_or(0, |run| run.raw.stats().evicted)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Default for LivePreview {
    fn default() -> Self {
        Self::with_valid_config(Config::default())
    }
}

impl Drop for LivePreview {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
