//! Renderer module for reelplay
//!
//! The playback engine never touches GPU objects directly. It is handed a
//! [`GpuContext`] at construction and uses it only from the update thread,
//! to upload decoded pictures through a ring of transfer slots into
//! textures the application can draw.

pub mod host;
pub mod texture;

pub use host::{HostContext, HostTexture};
pub use texture::WgpuContext;

use crate::decoder::{DecodedPicture, PixelFormat};
use crate::utils::error::Result;
use std::time::Duration;

/// GPU capability used by the upload step
pub trait GpuContext {
    /// Texture produced by an upload
    type Texture: Send + Sync + 'static;

    /// Create `count` transfer slots sized for `width` x `height` pictures
    fn allocate_slots(
        &mut self,
        count: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<()>;

    /// Upload a picture through transfer slot `slot` into a new texture
    fn upload(&mut self, slot: usize, picture: &DecodedPicture) -> Result<Self::Texture>;

    /// Free every transfer slot
    fn release_slots(&mut self);

    /// Number of allocated transfer slots
    fn slot_count(&self) -> usize;
}

/// A frame resident on the GPU
#[derive(Debug)]
pub struct FrameTexture<T> {
    /// Uploaded texture
    pub texture: T,

    /// Transfer slot the frame went through
    pub slot: usize,

    /// Sample index within the track
    pub sample: u64,

    /// Presentation timestamp
    pub timestamp: Duration,

    /// Texture width
    pub width: u32,

    /// Texture height
    pub height: u32,
}

/// Bytes per row after padding `row_bytes` to `alignment`
pub fn padded_row_bytes(row_bytes: usize, alignment: usize) -> usize {
    row_bytes.div_ceil(alignment) * alignment
}
