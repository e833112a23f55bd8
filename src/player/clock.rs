//! Presentation timing
//!
//! [`FrameScheduler`] turns wall-clock time into a count of frame periods
//! that are due. Time comes from an injectable [`Clock`] so playback can be
//! driven deterministically with a [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tolerance, in frames, for floating point error at period boundaries
const EPSILON_FRAMES: f64 = 1e-6;

/// Source of monotonic time
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Monotonic wall clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::AcqRel);
    }

    /// Jump to an absolute time
    pub fn set(&self, to: Duration) {
        self.nanos.store(to.as_nanos() as u64, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// Decides how many frames are due at each update
///
/// The anchor is the instant the current frame became due. Each adopted
/// frame moves the anchor forward by one period scaled by the playback rate,
/// so frames the GPU buffer could not supply stay owed and are caught up
/// once frames arrive.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    /// Seconds per frame at rate 1.0, in nanoseconds
    frame_interval_ns: f64,

    /// Playback rate multiplier
    rate: f64,

    /// When the current frame became due
    anchor: Option<Duration>,
}

impl FrameScheduler {
    /// Create a scheduler for `framerate` frames per second
    pub fn new(framerate: f64) -> Self {
        let framerate = if framerate.is_finite() && framerate > 0.0 {
            framerate
        } else {
            log::warn!("Invalid framerate {}, assuming 30 fps", framerate);
            30.0
        };

        Self {
            frame_interval_ns: 1e9 / framerate,
            rate: 1.0,
            anchor: None,
        }
    }

    /// Duration of one frame at rate 1.0
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(self.frame_interval_ns.round() as u64)
    }

    /// Current playback rate
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Change the playback rate, rebasing the anchor so time already
    /// elapsed keeps the meaning it had under the old rate
    pub fn set_rate(&mut self, rate: f64, now: Duration) {
        if let Some(anchor) = self.anchor {
            if self.rate > 0.0 && rate > 0.0 {
                let elapsed = now.saturating_sub(anchor).as_nanos() as f64;
                let rebased = elapsed * self.rate / rate;
                self.anchor = Some(now.saturating_sub(Duration::from_nanos(rebased as u64)));
            } else {
                self.anchor = Some(now);
            }
        }
        self.rate = rate;
    }

    /// Start timing from `now`
    pub fn reset(&mut self, now: Duration) {
        self.anchor = Some(now);
    }

    /// Stop timing until the next [`reset`](Self::reset)
    pub fn clear(&mut self) {
        self.anchor = None;
    }

    /// Number of whole frame periods elapsed since the anchor
    pub fn frames_due(&self, now: Duration) -> u64 {
        let Some(anchor) = self.anchor else {
            return 0;
        };
        if self.rate <= 0.0 {
            return 0;
        }
        let elapsed = now.saturating_sub(anchor).as_nanos() as f64;
        (elapsed * self.rate / self.frame_interval_ns + EPSILON_FRAMES).floor() as u64
    }

    /// Record that `frames` periods were consumed
    pub fn advance(&mut self, frames: u64) {
        if frames == 0 || self.rate <= 0.0 {
            return;
        }
        if let Some(anchor) = self.anchor {
            let step = frames as f64 * self.frame_interval_ns / self.rate;
            self.anchor = Some(anchor + Duration::from_nanos(step.round() as u64));
        }
    }
}
