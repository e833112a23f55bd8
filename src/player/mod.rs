//! Player module for reelplay
//!
//! This module holds the movie facade and everything the update thread
//! needs to drive playback: the playback state shared with the decode
//! worker, the presentation clock and the options a movie is built with.

pub mod clock;
pub mod movie;
pub(crate) mod state;

pub use clock::{Clock, FrameScheduler, ManualClock, SystemClock};
pub use movie::{DecodeStats, Movie, MovieBuilder};

use crate::utils::config::PlaybackConfig;
use crate::utils::error::{PlayerError, Result};
use std::fmt;
use std::time::Duration;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlaybackState {
    /// Positioned but not advancing; the decode worker idles
    #[default]
    Stopped = 0,

    /// Frames advance with the clock
    Playing = 1,

    /// The clock is frozen; the decode worker keeps the buffers full
    Paused = 2,
}

impl PlaybackState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Options a movie is constructed with; immutable afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct MovieOptions {
    /// Fill the GPU buffer during construction
    pub prebuffer: bool,

    /// Capacity of the decoded frame buffer
    pub cpu_buffer_size: usize,

    /// Capacity of the GPU frame buffer and size of the upload ring
    pub gpu_buffer_size: usize,

    /// Longest a forced refresh may wait for a decoded frame
    pub refresh_timeout: Duration,
}

impl Default for MovieOptions {
    fn default() -> Self {
        Self {
            prebuffer: true,
            cpu_buffer_size: 2,
            gpu_buffer_size: 2,
            refresh_timeout: Duration::from_millis(50),
        }
    }
}

impl MovieOptions {
    pub fn with_prebuffer(mut self, prebuffer: bool) -> Self {
        self.prebuffer = prebuffer;
        self
    }

    pub fn with_cpu_buffer_size(mut self, size: usize) -> Self {
        self.cpu_buffer_size = size;
        self
    }

    pub fn with_gpu_buffer_size(mut self, size: usize) -> Self {
        self.gpu_buffer_size = size;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Reject capacities the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cpu_buffer_size == 0 {
            return Err(PlayerError::InvalidInput(
                "CPU buffer size must be at least 1".to_string(),
            ));
        }
        if self.gpu_buffer_size == 0 {
            return Err(PlayerError::InvalidInput(
                "GPU buffer size must be at least 1".to_string(),
            ));
        }
        if self.gpu_buffer_size == 1 {
            log::warn!("GPU buffer size 1 leaves no room to upload ahead of presentation");
        }
        Ok(())
    }
}

impl From<&PlaybackConfig> for MovieOptions {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            prebuffer: config.prebuffer,
            cpu_buffer_size: config.cpu_buffer_size,
            gpu_buffer_size: config.gpu_buffer_size,
            refresh_timeout: Duration::from_millis(config.refresh_timeout_ms),
        }
    }
}
