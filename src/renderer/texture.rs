//! wgpu upload path for video frames
//!
//! [`WgpuContext`] keeps a ring of `COPY_SRC | COPY_DST` transfer buffers.
//! Each upload writes the picture into its slot with rows padded to
//! `COPY_BYTES_PER_ROW_ALIGNMENT`, then copies the slot into a fresh texture
//! so the texture stays valid after the slot is reused.

use super::{padded_row_bytes, GpuContext};
use crate::decoder::{DecodedPicture, PixelFormat};
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use log::{debug, info};
use std::sync::Arc;

struct TransferSlot {
    buffer: wgpu::Buffer,
    size: u64,
}

/// [`GpuContext`] backed by a wgpu device
pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    slots: Vec<TransferSlot>,

    /// Reused staging memory for row padding
    scratch: Vec<u8>,
}

impl WgpuContext {
    /// Wrap an existing device and queue, e.g. the ones the application renders with
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            slots: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Create a device without a surface, for headless playback
    pub fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .gpu_err("No suitable GPU adapter")?;

        let info = adapter.get_info();
        info!("Using GPU adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("reelplay"),
            ..Default::default()
        }))
        .gpu_err("Failed to create device")?;

        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    /// Device the textures are created on
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Queue uploads are submitted to
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    fn create_slot(&self, size: u64) -> TransferSlot {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Transfer Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        TransferSlot { buffer, size }
    }
}

impl Clone for WgpuContext {
    /// Clones share the device and queue but get their own transfer ring
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.device), Arc::clone(&self.queue))
    }
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
    }
}

fn slot_size(width: u32, height: u32, format: PixelFormat) -> u64 {
    let row = padded_row_bytes(
        width as usize * format.bytes_per_pixel(),
        wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize,
    );
    (row * height as usize) as u64
}

impl GpuContext for WgpuContext {
    type Texture = wgpu::Texture;

    fn allocate_slots(
        &mut self,
        count: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<()> {
        let size = slot_size(width, height, format);
        self.slots = (0..count).map(|_| self.create_slot(size)).collect();
        debug!("Allocated {} transfer buffers of {} bytes", count, size);
        Ok(())
    }

    fn upload(&mut self, slot: usize, picture: &DecodedPicture) -> Result<wgpu::Texture> {
        let needed = slot_size(picture.width, picture.height, picture.format);
        let too_small = self
            .slots
            .get(slot)
            .map(|s| s.size < needed)
            .ok_or_else(|| PlayerError::Gpu(format!("transfer slot {} not allocated", slot)))?;
        if too_small {
            debug!("Growing transfer buffer {} to {} bytes", slot, needed);
            self.slots[slot] = self.create_slot(needed);
        }

        let row_bytes = picture.row_bytes();
        let padded = padded_row_bytes(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize);

        let data: &[u8] = if picture.stride == padded {
            &picture.data[..padded * (picture.height as usize - 1) + row_bytes]
        } else {
            self.scratch.clear();
            self.scratch.resize(needed as usize, 0);
            for y in 0..picture.height {
                let dst = y as usize * padded;
                self.scratch[dst..dst + row_bytes].copy_from_slice(picture.row(y));
            }
            &self.scratch
        };

        let buffer = &self.slots[slot].buffer;
        self.queue.write_buffer(buffer, 0, data);

        let size = wgpu::Extent3d {
            width: picture.width,
            height: picture.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Video Frame Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(picture.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Upload"),
            });
        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded as u32),
                    rows_per_image: Some(picture.height),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            size,
        );
        self.queue.submit(Some(encoder.finish()));

        Ok(texture)
    }

    fn release_slots(&mut self) {
        for slot in self.slots.drain(..) {
            slot.buffer.destroy();
        }
        self.scratch = Vec::new();
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
