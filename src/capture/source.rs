//! Frame source abstraction consumed by the acquisition loop

use std::collections::VecDeque;

use crate::capture::RawFrame;
use crate::error::SourceError;

/// Anything that can hand out freshly rendered frames
///
/// Called from the acquisition thread only. `Ok(None)` means no frame is
/// ready yet; errors are treated as transient and retried after a backoff.
pub trait FrameSource: Send + 'static {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;
}

impl FrameSource for Box<dyn FrameSource> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        (**self).next_frame()
    }
}

/// Replays a fixed script of results, then reports no data forever
///
/// Useful for driving the pipeline deterministically in tests and demos.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<Option<RawFrame>, SourceError>>,
    calls: usize,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Result<Option<RawFrame>, SourceError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    /// Script that yields each frame once, in order
    pub fn from_frames(frames: impl IntoIterator<Item = RawFrame>) -> Self {
        Self::new(frames.into_iter().map(|frame| Ok(Some(frame))))
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        self.calls += 1;
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_source_drains_then_idles() {
        let mut source = ScriptedSource::new([
            Ok(Some(RawFrame::new(1, vec![1u8]))),
            Err(SourceError::Disconnected),
        ]);

        assert_eq!(source.next_frame().unwrap().unwrap().sequence, 1);
        assert!(source.next_frame().is_err());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.calls(), 4);
        assert_eq!(source.remaining(), 0);
    }
}
