pub mod frame;
pub mod source;

pub use frame::{ColorMode, Frame, ImageShape};
pub use source::{
    FrameIter, FrameSource, FrameSourceExt, ImageSequenceOpener, ImageSequenceSource,
    MemorySource, VideoOpener,
};
