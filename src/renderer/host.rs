//! CPU-memory GPU stand-in
//!
//! [`HostContext`] implements [`GpuContext`] with plain byte buffers. It is
//! what headless runs fall back to when no adapter is available and what
//! the tests drive playback with.

use super::GpuContext;
use crate::decoder::{DecodedPicture, PixelFormat};
use crate::utils::error::{PlayerError, Result};

/// "Texture" produced by [`HostContext`]: tightly packed pixel rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTexture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

/// In-memory [`GpuContext`]
#[derive(Debug, Default)]
pub struct HostContext {
    slots: Vec<Vec<u8>>,
    uploads: u64,
    failures_pending: u32,
}

impl HostContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful uploads
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Make the next `count` uploads fail
    pub fn fail_next_uploads(&mut self, count: u32) {
        self.failures_pending = count;
    }
}

impl Clone for HostContext {
    /// Clones share nothing; the copy starts without slots
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl GpuContext for HostContext {
    type Texture = HostTexture;

    fn allocate_slots(
        &mut self,
        count: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<()> {
        let size = width as usize * height as usize * format.bytes_per_pixel();
        self.slots = (0..count).map(|_| vec![0; size]).collect();
        log::debug!("Allocated {} host slots of {} bytes", count, size);
        Ok(())
    }

    fn upload(&mut self, slot: usize, picture: &DecodedPicture) -> Result<HostTexture> {
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(PlayerError::Gpu("injected upload failure".to_string()));
        }

        let staging = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| PlayerError::Gpu(format!("transfer slot {} not allocated", slot)))?;

        let row_bytes = picture.row_bytes();
        staging.clear();
        for y in 0..picture.height {
            staging.extend_from_slice(picture.row(y));
        }
        debug_assert_eq!(staging.len(), row_bytes * picture.height as usize);

        self.uploads += 1;
        Ok(HostTexture {
            width: picture.width,
            height: picture.height,
            format: picture.format,
            pixels: staging.clone(),
        })
    }

    fn release_slots(&mut self) {
        self.slots.clear();
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
