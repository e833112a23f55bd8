//! reelplay - a double-buffered video playback engine
//!
//! A [`Movie`] decodes a video track on a background thread into a bounded
//! CPU frame buffer, uploads frames through a rotating ring of transfer
//! buffers into a bounded GPU frame buffer, and on every [`Movie::update`]
//! picks the frame that is due according to its clock, playback rate,
//! looping and seek state.

pub mod decoder;
pub mod player;
pub mod renderer;
pub mod utils;

pub use decoder::{
    default_source, ContainerInfo, DecodedPicture, MediaSource, PixelFormat, TestPattern,
    TrackDescriptor, TrackKind,
};
pub use player::{
    Clock, DecodeStats, ManualClock, Movie, MovieBuilder, MovieOptions, PlaybackState,
    SystemClock,
};
pub use renderer::{FrameTexture, GpuContext, HostContext, HostTexture, WgpuContext};
pub use utils::error::{PlayerError, Result};
