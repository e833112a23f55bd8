//! Playback state shared between the movie and its decode worker
//!
//! Everything here is either atomic or internally synchronized. The control
//! side changes a flag first and then calls [`SharedPlayback::notify`], which
//! takes the signal mutex before waking; the worker re-checks its condition
//! under that same mutex, so a wakeup cannot slip in between the check and
//! the wait.

use crate::decoder::{Frame, FrameBuffer, ProgressCounter, ProgressSnapshot};
use crate::player::PlaybackState;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

pub(crate) struct SharedPlayback {
    state: AtomicU8,
    looping: AtomicBool,

    /// Decode ahead even while stopped, until the next stop
    prebuffer: AtomicBool,

    /// Decode ahead while stopped so a seek can show its target frame
    refresh_pending: AtomicBool,

    shutdown: AtomicBool,

    /// The worker ran out of samples and is idling
    end_of_stream: AtomicBool,

    pub progress: ProgressCounter,
    pub cpu: FrameBuffer<Frame>,

    pub frames_decoded: AtomicU64,
    pub samples_skipped: AtomicU64,

    signal: Mutex<()>,
    wake: Condvar,
}

impl SharedPlayback {
    pub fn new(cpu_capacity: usize) -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Stopped as u8),
            looping: AtomicBool::new(false),
            prebuffer: AtomicBool::new(false),
            refresh_pending: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            end_of_stream: AtomicBool::new(false),
            progress: ProgressCounter::new(),
            cpu: FrameBuffer::new(cpu_capacity),
            frames_decoded: AtomicU64::new(0),
            samples_skipped: AtomicU64::new(0),
            signal: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::Release);
        self.notify();
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
        self.notify();
    }

    pub fn set_prebuffer(&self, armed: bool) {
        self.prebuffer.store(armed, Ordering::Release);
        self.notify();
    }

    pub fn set_refresh_pending(&self, pending: bool) {
        self.refresh_pending.store(pending, Ordering::Release);
        if pending {
            self.notify();
        }
    }

    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream.load(Ordering::Acquire)
    }

    pub fn set_end_of_stream(&self, reached: bool) {
        self.end_of_stream.store(reached, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Ask the worker to exit and unblock anything it may be waiting on
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.cpu.close();
        self.notify();
    }

    /// Whether the worker should be producing frames
    pub fn is_active(&self) -> bool {
        matches!(self.state(), PlaybackState::Playing | PlaybackState::Paused)
            || self.prebuffer.load(Ordering::Acquire)
            || self.refresh_pending.load(Ordering::Acquire)
    }

    /// Wake the worker after a flag or the position changed
    pub fn notify(&self) {
        let _guard = self.signal.lock();
        self.wake.notify_all();
    }

    /// Block until the worker should run; returns `false` on shutdown
    pub fn wait_until_active(&self) -> bool {
        let mut guard = self.signal.lock();
        while !self.is_shutdown() && !self.is_active() {
            self.wake.wait(&mut guard);
        }
        !self.is_shutdown()
    }

    /// Block at end of stream until the position moves, looping turns on
    /// or the worker is shut down
    pub fn wait_for_change(&self, snapshot: ProgressSnapshot) {
        let mut guard = self.signal.lock();
        while !self.is_shutdown() && !self.is_looping() && self.progress.load() == snapshot {
            self.wake.wait(&mut guard);
        }
    }
}
