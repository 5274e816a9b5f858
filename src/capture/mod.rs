pub mod decode;
pub mod frame;
pub mod live_view;
pub mod source;
pub mod synthetic;

pub use frame::{ProcessedFrame, RawFrame};
pub use live_view::{ImageDataBlock, LiveViewDevice, LiveViewSource};
pub use source::{FrameSource, ScriptedSource};
pub use synthetic::SyntheticSource;
