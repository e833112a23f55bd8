//! Integration test utilities for reelplay
//!
//! Movies are opened on the synthetic `testsrc:` source with a manual clock
//! and host-memory uploads, so every test controls time exactly and needs
//! neither media files nor a GPU.

use anyhow::Result;
use reelplay::decoder::test_pattern::PatternSpec;
use reelplay::{HostContext, ManualClock, Movie, MovieBuilder, MovieOptions, TestPattern};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Refresh wait used by fixtures; generous so slow CI machines still see
/// the first frame of a seek on the same update
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(2);

/// A movie on a manual clock
pub struct MovieFixture {
    pub movie: Movie<HostContext>,
    pub clock: Arc<ManualClock>,
}

impl MovieFixture {
    /// Open a test pattern clip with both buffers sized `buffer`
    pub fn open(spec: &PatternSpec, buffer: usize) -> Result<Self> {
        Self::open_with(&spec.uri(), options(buffer, buffer))
    }

    /// Open any `testsrc:` URI with explicit options
    pub fn open_with(uri: &str, options: MovieOptions) -> Result<Self> {
        let clock = Arc::new(ManualClock::new());
        let movie = MovieBuilder::new(uri)
            .with_source(Arc::new(TestPattern))
            .with_clock(clock.clone())
            .with_options(options)
            .build(HostContext::new())?;
        Ok(Self { movie, clock })
    }

    /// Show the first frame and start playing
    pub fn start(&mut self) -> &mut Self {
        self.movie.update();
        self.movie.play();
        self
    }

    /// Let the decoder catch up, advance the clock by `ms` and update once
    ///
    /// Returns the sample on screen after the update.
    pub fn tick(&mut self, ms: u64) -> u64 {
        self.movie.prebuffer();
        self.clock.advance(Duration::from_millis(ms));
        self.movie.update();
        self.movie.current_sample()
    }

    /// Advance the clock by `ms` and update once, the way a render loop does
    ///
    /// Nothing is prebuffered: the update only sees what the worker has
    /// already decoded. Before advancing, waits (bounded) until a frame is
    /// buffered or the worker has run out of samples, so slow machines do
    /// not turn into under-runs.
    pub fn tick_live(&mut self, ms: u64) -> u64 {
        let deadline = Instant::now() + REFRESH_TIMEOUT;
        while self.movie.buffered_cpu_frames() + self.movie.buffered_gpu_frames() == 0
            && !self.movie.end_of_stream()
            && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(1));
        }
        self.clock.advance(Duration::from_millis(ms));
        self.movie.update();
        self.movie.current_sample()
    }

    /// Tick `count` times by `ms`, collecting the sample shown after each
    pub fn ticks(&mut self, count: usize, ms: u64) -> Vec<u64> {
        (0..count).map(|_| self.tick(ms)).collect()
    }
}

/// Options with both buffers sized and a long refresh wait
pub fn options(cpu: usize, gpu: usize) -> MovieOptions {
    MovieOptions::default()
        .with_cpu_buffer_size(cpu)
        .with_gpu_buffer_size(gpu)
        .with_refresh_timeout(REFRESH_TIMEOUT)
}

/// Clip description for `frames` samples at `fps`, with tiny pictures
pub fn clip(frames: u64, fps: f64) -> PatternSpec {
    PatternSpec {
        width: 4,
        height: 2,
        ..PatternSpec::new(frames, fps)
    }
}
