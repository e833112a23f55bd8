//! Movie playback facade
//!
//! A [`Movie`] owns the whole pipeline for one video track:
//!
//! ```text
//!  decode thread                     update() thread
//!  ─────────────                     ───────────────
//!  demux ─► decode ─► CPU buffer ─► upload (transfer ring) ─► GPU buffer ─► current frame
//!              ▲                                                   │
//!              └──────── progress counter ◄── seek / stop ─────────┘
//! ```
//!
//! The decode worker is the only producer of the CPU buffer and the only
//! thread that advances the progress counter. Everything right of the CPU
//! buffer happens inside [`Movie::update`] on the caller's thread, which is
//! the only place the [`GpuContext`] is used.

use crate::decoder::worker::DecodeWorker;
use crate::decoder::{
    default_source, ContainerInfo, Frame, FrameBuffer, MediaSource, PixelFormat, QueueStats,
    TrackDescriptor,
};
use crate::player::clock::{Clock, FrameScheduler, SystemClock};
use crate::player::state::SharedPlayback;
use crate::player::{MovieOptions, PlaybackState};
use crate::renderer::{FrameTexture, GpuContext};
use crate::utils::error::{PlayerError, Result};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Longest [`Movie::prebuffer`] waits for the GPU buffer to fill
const PREBUFFER_TIMEOUT: Duration = Duration::from_secs(5);

/// How long [`Movie::prebuffer`] waits for each decoded frame before re-checking
const PREBUFFER_POLL: Duration = Duration::from_millis(10);

/// Builder for [`Movie`]
pub struct MovieBuilder {
    filename: String,
    options: MovieOptions,
    source: Option<Arc<dyn MediaSource>>,
    clock: Option<Arc<dyn Clock>>,
    looping: bool,
    playback_rate: f64,
}

impl MovieBuilder {
    /// Start building a movie for `filename`
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            options: MovieOptions::default(),
            source: None,
            clock: None,
            looping: false,
            playback_rate: 1.0,
        }
    }

    /// Set the buffering options
    pub fn with_options(mut self, options: MovieOptions) -> Self {
        self.options = options;
        self
    }

    /// Open the file through `source` instead of [`default_source`]
    pub fn with_source(mut self, source: Arc<dyn MediaSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Time presentation with `clock` instead of the system clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Start with looping enabled or disabled
    pub fn with_loop(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Start with the given playback rate
    pub fn with_playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = rate;
        self
    }

    /// Open the movie and start its decode worker
    pub fn build<G: GpuContext>(self, gpu: G) -> Result<Movie<G>> {
        Movie::new_with_builder(self, gpu)
    }
}

/// Decode and upload counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Frames the worker decoded and queued
    pub frames_decoded: u64,

    /// Samples skipped after a read or decode failure
    pub samples_skipped: u64,

    /// Frames dropped because their upload failed
    pub uploads_failed: u64,

    /// Frames dropped because a seek made them stale
    pub stale_frames: u64,

    /// Frames adopted as the current frame
    pub frames_presented: u64,

    /// CPU buffer statistics
    pub cpu_queue: QueueStats,

    /// GPU buffer statistics
    pub gpu_queue: QueueStats,
}

/// A playing video track
///
/// Controls return `&mut Self` so they can be chained:
///
/// ```no_run
/// # use reelplay::{HostContext, Movie, MovieOptions};
/// # use std::time::Duration;
/// # fn main() -> reelplay::Result<()> {
/// let mut movie = Movie::open(HostContext::new(), "testsrc:frames=300,fps=30", MovieOptions::default())?;
/// movie.set_loop(true).seek(Duration::from_secs(2)).play();
/// loop {
///     movie.update();
///     if let Some(frame) = movie.current_frame() {
///         // draw frame.texture
///     }
/// #   break;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Movie<G: GpuContext> {
    id: u64,
    filename: String,
    options: MovieOptions,
    source: Arc<dyn MediaSource>,
    clock: Arc<dyn Clock>,

    info: ContainerInfo,
    track: TrackDescriptor,
    framerate: f64,

    gpu: G,
    gpu_frames: FrameBuffer<FrameTexture<G::Texture>>,

    /// Next transfer slot to upload through
    slot: usize,
    slot_count: usize,

    shared: Arc<SharedPlayback>,
    worker: Option<JoinHandle<()>>,

    scheduler: FrameScheduler,
    current: Option<Arc<FrameTexture<G::Texture>>>,
    current_sample: u64,

    /// Adopt the next frame on the next update regardless of timing
    force_refresh: bool,

    /// Playback stopped itself at the end of the track
    finished: bool,

    uploads_failed: u64,
    stale_frames: u64,
    frames_presented: u64,
}

impl<G: GpuContext> Movie<G> {
    /// Open `filename` with the default source and system clock
    pub fn open(gpu: G, filename: &str, options: MovieOptions) -> Result<Self> {
        MovieBuilder::new(filename).with_options(options).build(gpu)
    }

    fn new_with_builder(builder: MovieBuilder, mut gpu: G) -> Result<Self> {
        let MovieBuilder {
            filename,
            options,
            source,
            clock,
            looping,
            playback_rate,
        } = builder;

        options.validate()?;

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let source = source.unwrap_or_else(default_source);
        let clock: Arc<dyn Clock> = clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        let demuxer = source.open(&filename)?;
        let info = demuxer.container().clone();

        let track = info.primary_video().cloned().ok_or_else(|| {
            PlayerError::UnsupportedFormat(format!("{}: no video track", filename))
        })?;
        if info.video_track_count() > 1 {
            return Err(PlayerError::UnsupportedFormat(format!(
                "{}: {} video tracks, expected one",
                filename,
                info.video_track_count()
            )));
        }
        if track.sample_count == 0 {
            return Err(PlayerError::UnsupportedFormat(format!(
                "{}: video track has no samples",
                filename
            )));
        }

        let decoder = demuxer.create_decoder(&track)?;

        let framerate = if track.framerate.is_finite() && track.framerate > 0.0 {
            track.framerate
        } else {
            track.sample_count as f64 / track.duration.as_secs_f64()
        };

        let slot_count = options.gpu_buffer_size.max(2);
        gpu.allocate_slots(
            slot_count,
            track.width,
            track.height,
            PixelFormat::Rgba8,
        )?;

        let shared = Arc::new(SharedPlayback::new(options.cpu_buffer_size));
        shared.set_looping(looping);
        shared.set_refresh_pending(true);

        let worker = DecodeWorker::new(id, demuxer, decoder, track.clone(), Arc::clone(&shared))
            .spawn()?;

        info!(
            "Opened movie {} '{}': {} {}x{} @ {:.3} fps, {} samples, {:.3}s",
            id,
            filename,
            track.codec,
            track.width,
            track.height,
            framerate,
            track.sample_count,
            info.duration.as_secs_f64()
        );

        let mut movie = Self {
            id,
            filename,
            gpu_frames: FrameBuffer::new(options.gpu_buffer_size),
            options,
            source,
            clock,
            info,
            track,
            framerate,
            gpu,
            slot: 0,
            slot_count,
            shared,
            worker: Some(worker),
            scheduler: FrameScheduler::new(framerate),
            current: None,
            current_sample: 0,
            force_refresh: false,
            finished: false,
            uploads_failed: 0,
            stale_frames: 0,
            frames_presented: 0,
        };

        movie.set_playback_rate(playback_rate);

        if movie.options.prebuffer {
            movie.prebuffer();
        }

        Ok(movie)
    }

    /// Open a second, independent movie on the same file
    ///
    /// The copy has its own buffers, transfer ring and decode thread and
    /// starts stopped at the first sample.
    pub fn try_clone(&self) -> Result<Self>
    where
        G: Clone,
    {
        MovieBuilder::new(self.filename.clone())
            .with_options(self.options.clone())
            .with_source(Arc::clone(&self.source))
            .with_clock(Arc::clone(&self.clock))
            .build(self.gpu.clone())
    }

    // ----------------------------------------------------------------------
    // Controls
    // ----------------------------------------------------------------------

    /// Start or resume playback
    pub fn play(&mut self) -> &mut Self {
        if self.state() == PlaybackState::Playing {
            return self;
        }

        if self.finished {
            debug!("Movie {} restarting from the first sample", self.id);
            self.seek_to_sample(0);
        }

        self.shared.set_state(PlaybackState::Playing);
        self.scheduler.reset(self.clock.now());
        debug!("Movie {} playing", self.id);
        self
    }

    /// Freeze the current frame; the decode worker keeps filling the buffers
    pub fn pause(&mut self) -> &mut Self {
        if self.state() != PlaybackState::Playing {
            return self;
        }

        self.shared.set_state(PlaybackState::Paused);
        self.scheduler.clear();
        debug!("Movie {} paused at sample {}", self.id, self.current_sample);
        self
    }

    /// Stop and rewind to the first sample
    pub fn stop(&mut self) -> &mut Self {
        if self.state() == PlaybackState::Stopped {
            return self;
        }

        self.shared.set_state(PlaybackState::Stopped);
        self.shared.set_prebuffer(false);
        self.scheduler.clear();
        self.rewind_to(0);
        debug!("Movie {} stopped", self.id);
        self
    }

    /// Jump to the sample containing `time`
    ///
    /// Negative times clamp to the start. Times at or past the duration
    /// wrap back to the first sample.
    pub fn seek(&mut self, time: Duration) -> &mut Self {
        let duration = self.duration();
        let n = self.track.sample_count;

        let sample = if duration.is_zero() || time >= duration {
            0
        } else {
            (time.as_nanos() * n as u128 / duration.as_nanos()) as u64
        };

        self.seek_to_sample(sample)
    }

    /// Jump to the first sample
    pub fn seek_to_start(&mut self) -> &mut Self {
        self.seek_to_sample(0)
    }

    /// Jump to sample `sample`, clamped to the last sample
    pub fn seek_to_sample(&mut self, sample: u64) -> &mut Self {
        let sample = sample.min(self.track.sample_count - 1);
        debug!("Movie {} seeking to sample {}", self.id, sample);
        self.rewind_to(sample);
        self
    }

    /// Set the playback rate; negative and NaN rates are treated as 0
    pub fn set_playback_rate(&mut self, rate: f64) -> &mut Self {
        let rate = if rate.is_nan() || rate < 0.0 {
            warn!("Playback rate {} is unsupported, using 0", rate);
            0.0
        } else {
            rate
        };
        self.scheduler.set_rate(rate, self.clock.now());
        self
    }

    /// Enable or disable looping
    pub fn set_loop(&mut self, looping: bool) -> &mut Self {
        self.shared.set_looping(looping);
        self
    }

    /// Reset the pipeline to `sample` and request a refresh
    fn rewind_to(&mut self, sample: u64) {
        let generation = self
            .shared
            .progress
            .reset_to_sample(sample, self.track.sample_count);
        let dropped = self.shared.cpu.flush() + self.gpu_frames.flush();
        trace!(
            "Movie {} entered generation {}, dropped {} buffered frames",
            self.id,
            generation,
            dropped
        );

        self.shared.set_end_of_stream(false);
        self.finished = false;
        self.force_refresh = true;
        self.shared.set_refresh_pending(true);
    }

    // ----------------------------------------------------------------------
    // Per-tick work
    // ----------------------------------------------------------------------

    /// Advance playback; call once per render tick on the GPU thread
    pub fn update(&mut self) {
        let refresh = self.current.is_none() || self.force_refresh;
        self.promote_frames(refresh);
        self.select_frame(refresh);
        self.check_end_of_stream();
    }

    /// Move decoded frames into the GPU buffer until it is full
    ///
    /// On a forced refresh with nothing uploaded yet, waits up to
    /// `refresh_timeout` for the worker to deliver the first frame.
    fn promote_frames(&mut self, refresh: bool) {
        let wait_until = (refresh
            && self.gpu_frames.is_empty()
            && !self.options.refresh_timeout.is_zero()
            && self.shared.is_active()
            && !self.worker_finished())
        .then(|| Instant::now() + self.options.refresh_timeout);
        let mut staged_any = false;

        while !self.gpu_frames.is_full() {
            let frame = match self.shared.cpu.try_pop() {
                Some(frame) => frame,
                None => match wait_until {
                    Some(deadline) if !staged_any => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        match self.shared.cpu.pop_timeout(left) {
                            Some(frame) => frame,
                            None => break,
                        }
                    }
                    _ => break,
                },
            };

            if self.stage_frame(frame) {
                staged_any = true;
            }
        }
    }

    /// Upload one decoded frame into the GPU buffer; returns whether it was queued
    fn stage_frame(&mut self, frame: Frame) -> bool {
        let generation = self.shared.progress.load().generation();
        if frame.generation != generation {
            self.stale_frames += 1;
            trace!(
                "Movie {} dropping stale sample {} from generation {}",
                self.id,
                frame.sample,
                frame.generation
            );
            return false;
        }

        let slot = self.slot;
        let texture = match self.gpu.upload(slot, &frame.picture) {
            Ok(texture) => texture,
            Err(e) => {
                error!(
                    "Movie {} failed to upload sample {}: {}",
                    self.id, frame.sample, e
                );
                self.uploads_failed += 1;
                return false;
            }
        };
        self.slot = (self.slot + 1) % self.slot_count;

        let staged = FrameTexture {
            texture,
            slot,
            sample: frame.sample,
            timestamp: frame.timestamp,
            width: frame.picture.width,
            height: frame.picture.height,
        };

        if self.gpu_frames.try_push(staged).is_err() {
            warn!("Movie {} GPU buffer rejected sample {}", self.id, frame.sample);
            return false;
        }
        true
    }

    /// Adopt the frames that are due as the current frame
    fn select_frame(&mut self, refresh: bool) {
        let now = self.clock.now();

        if refresh {
            if let Some(frame) = self.gpu_frames.try_pop() {
                self.adopt(frame);
                self.force_refresh = false;
                self.shared.set_refresh_pending(false);
                if self.state() == PlaybackState::Playing {
                    self.scheduler.reset(now);
                }
            }
            return;
        }

        if self.state() != PlaybackState::Playing {
            return;
        }

        let due = self.scheduler.frames_due(now);
        let mut adopted = 0;
        while adopted < due {
            match self.gpu_frames.try_pop() {
                Some(frame) => {
                    self.adopt(frame);
                    adopted += 1;
                }
                None => break,
            }
        }
        self.scheduler.advance(adopted);

        if adopted < due && !self.worker_finished() {
            trace!(
                "Movie {} under-run: {} of {} due frames available",
                self.id,
                adopted,
                due
            );
        }
    }

    fn adopt(&mut self, frame: FrameTexture<G::Texture>) {
        self.current_sample = frame.sample;
        self.current = Some(Arc::new(frame));
        self.frames_presented += 1;
    }

    /// Stop by itself once the last sample has been shown
    fn check_end_of_stream(&mut self) {
        if self.state() != PlaybackState::Playing || self.is_looping() {
            return;
        }
        if self.worker_finished() && self.shared.cpu.is_empty() && self.gpu_frames.is_empty() {
            info!(
                "Movie {} finished at sample {}",
                self.id, self.current_sample
            );
            self.shared.set_state(PlaybackState::Stopped);
            self.scheduler.clear();
            self.finished = true;
        }
    }

    /// Whether the worker has decoded the last sample and is idling
    fn worker_finished(&self) -> bool {
        self.shared.end_of_stream()
            && self.shared.progress.sample_index(self.track.sample_count) >= self.track.sample_count
    }

    /// Fill the GPU buffer before playback starts
    ///
    /// Keeps the decode worker running while stopped until the next
    /// [`stop`](Self::stop). Returns once the GPU buffer is full, the track
    /// has no more samples, or a few seconds have passed.
    pub fn prebuffer(&mut self) -> &mut Self {
        self.shared.set_prebuffer(true);

        let deadline = Instant::now() + PREBUFFER_TIMEOUT;
        while !self.gpu_frames.is_full() {
            if Instant::now() >= deadline {
                warn!(
                    "Movie {} prebuffer timed out with {} of {} frames",
                    self.id,
                    self.gpu_frames.len(),
                    self.gpu_frames.capacity()
                );
                break;
            }
            if self.worker_finished() && self.shared.cpu.is_empty() {
                break;
            }
            if let Some(frame) = self.shared.cpu.pop_timeout(PREBUFFER_POLL) {
                self.stage_frame(frame);
            }
        }

        debug!(
            "Movie {} prebuffered {} GPU / {} CPU frames",
            self.id,
            self.gpu_frames.len(),
            self.shared.cpu.len()
        );
        self
    }

    // ----------------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------------

    /// Process-unique movie id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// File or URI the movie was opened from
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Container format string
    pub fn format(&self) -> &str {
        &self.info.format
    }

    /// Codec of the playing video track
    pub fn codec(&self) -> &str {
        &self.track.codec
    }

    /// Number of tracks in the container
    pub fn track_count(&self) -> usize {
        self.info.tracks.len()
    }

    /// Descriptor of track `index` in container order
    pub fn track_description(&self, index: usize) -> Result<&TrackDescriptor> {
        self.info.tracks.get(index).ok_or_else(|| {
            PlayerError::InvalidInput(format!(
                "track {} out of range ({} tracks)",
                index,
                self.info.tracks.len()
            ))
        })
    }

    /// Descriptor of the playing video track
    pub fn video_track(&self) -> &TrackDescriptor {
        &self.track
    }

    /// Total duration
    pub fn duration(&self) -> Duration {
        if self.info.duration.is_zero() {
            self.track.duration
        } else {
            self.info.duration
        }
    }

    /// Position of the current frame
    pub fn elapsed_time(&self) -> Duration {
        let n = self.track.sample_count as u128;
        let sample = self.current_sample.min(self.track.sample_count) as u128;
        let nanos = self.duration().as_nanos() * sample / n;
        Duration::from_nanos(nanos as u64)
    }

    /// Time left after the current frame
    pub fn remaining_time(&self) -> Duration {
        self.duration().saturating_sub(self.elapsed_time())
    }

    /// Frames per second
    pub fn framerate(&self) -> f64 {
        self.framerate
    }

    pub fn width(&self) -> u32 {
        self.track.width
    }

    pub fn height(&self) -> u32 {
        self.track.height
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn playback_rate(&self) -> f64 {
        self.scheduler.rate()
    }

    pub fn is_looping(&self) -> bool {
        self.shared.is_looping()
    }

    /// Sample index of the current frame
    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    /// Number of samples in the video track
    pub fn sample_count(&self) -> u64 {
        self.track.sample_count
    }

    /// Frame to draw, if one has been produced yet
    pub fn current_frame(&self) -> Option<Arc<FrameTexture<G::Texture>>> {
        self.current.clone()
    }

    /// Decoded frames waiting for upload
    pub fn buffered_cpu_frames(&self) -> usize {
        self.shared.cpu.len()
    }

    /// Uploaded frames waiting for presentation
    pub fn buffered_gpu_frames(&self) -> usize {
        self.gpu_frames.len()
    }

    /// Whether the decode worker has run out of samples
    pub fn end_of_stream(&self) -> bool {
        self.worker_finished()
    }

    /// Options the movie was built with
    pub fn options(&self) -> &MovieOptions {
        &self.options
    }

    /// Decode and upload counters
    pub fn decode_stats(&self) -> DecodeStats {
        DecodeStats {
            frames_decoded: self.shared.frames_decoded.load(Ordering::Relaxed),
            samples_skipped: self.shared.samples_skipped.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed,
            stale_frames: self.stale_frames,
            frames_presented: self.frames_presented,
            cpu_queue: self.shared.cpu.stats(),
            gpu_queue: self.gpu_frames.stats(),
        }
    }

    /// GPU context the movie uploads through
    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    /// Mutable access to the GPU context
    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }
}

impl<G: GpuContext> Drop for Movie<G> {
    fn drop(&mut self) {
        self.shared.set_state(PlaybackState::Stopped);
        self.shared.shutdown();
        self.gpu_frames.close();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Decode worker for movie {} panicked", self.id);
            }
        }

        self.shared.cpu.flush();
        self.gpu_frames.flush();
        self.current = None;
        self.gpu.release_slots();
        debug!("Movie {} released", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{CodedSample, Decoder, Demuxer, TestPattern};
    use crate::player::clock::ManualClock;
    use crate::renderer::HostContext;

    fn open(uri: &str, options: MovieOptions) -> (Movie<HostContext>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let movie = MovieBuilder::new(uri)
            .with_source(Arc::new(TestPattern))
            .with_clock(clock.clone())
            .with_options(options)
            .build(HostContext::new())
            .unwrap();
        (movie, clock)
    }

    fn buffered(cpu: usize, gpu: usize) -> MovieOptions {
        MovieOptions::default()
            .with_cpu_buffer_size(cpu)
            .with_gpu_buffer_size(gpu)
            .with_refresh_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_metadata_queries() {
        let (movie, _) = open("testsrc:frames=50,fps=25,size=8x6,audio=1", buffered(2, 2));

        assert_eq!(movie.filename(), "testsrc:frames=50,fps=25,size=8x6,audio=1");
        assert_eq!(movie.format(), "testsrc");
        assert_eq!(movie.codec(), "raw-rgba");
        assert_eq!(movie.track_count(), 2);
        assert_eq!(movie.track_description(0).unwrap().codec, "pcm_s16le");
        assert!(movie.track_description(2).is_err());
        assert_eq!(movie.duration(), Duration::from_secs(2));
        assert_eq!(movie.framerate(), 25.0);
        assert_eq!((movie.width(), movie.height()), (8, 6));
        assert_eq!(movie.sample_count(), 50);
        assert_eq!(movie.state(), PlaybackState::Stopped);
        assert_eq!(movie.gpu().slot_count(), 2);
    }

    #[test]
    fn test_prebuffer_fills_gpu_buffer() {
        let (movie, _) = open("testsrc:frames=20,size=2x2", buffered(2, 4));
        assert_eq!(movie.buffered_gpu_frames(), 4);
        assert!(movie.current_frame().is_none());
    }

    #[test]
    fn test_first_update_shows_first_sample() {
        let (mut movie, _) = open("testsrc:frames=20,size=2x2", buffered(2, 2).with_prebuffer(false));
        movie.update();

        let frame = movie.current_frame().expect("no frame after refresh");
        assert_eq!(frame.sample, 0);
        assert_eq!(movie.current_sample(), 0);
    }

    #[test]
    fn test_transfer_slots_rotate() {
        let (mut movie, clock) = open("testsrc:frames=20,fps=10,size=2x2", buffered(2, 3));
        movie.update();
        movie.play();

        let mut slots = Vec::new();
        for _ in 0..5 {
            clock.advance(Duration::from_millis(100));
            movie.prebuffer();
            movie.update();
            slots.push(movie.current_frame().unwrap().slot);
        }
        assert_eq!(slots, vec![1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_negative_rate_clamps_to_zero() {
        let (mut movie, clock) = open("testsrc:frames=20,fps=10,size=2x2", buffered(2, 4));
        movie.update();
        movie.set_playback_rate(-1.0).play();
        assert_eq!(movie.playback_rate(), 0.0);

        clock.advance(Duration::from_secs(1));
        movie.update();
        assert_eq!(movie.current_sample(), 0);
    }

    #[test]
    fn test_seek_time_mapping() {
        let (mut movie, _) = open("testsrc:frames=10,fps=10,size=2x2", buffered(2, 2));

        movie.seek(Duration::from_millis(550)).update();
        assert_eq!(movie.current_sample(), 5);

        movie.seek(Duration::from_secs(1)).update();
        assert_eq!(movie.current_sample(), 0);

        movie.seek_to_sample(1_000).update();
        assert_eq!(movie.current_sample(), 9);
        assert_eq!(movie.elapsed_time(), Duration::from_millis(900));
        assert_eq!(movie.remaining_time(), Duration::from_millis(100));
    }

    #[test]
    fn test_upload_failure_drops_frame() {
        let (mut movie, _) = open("testsrc:frames=10,size=2x2", buffered(2, 2).with_prebuffer(false));
        movie.gpu_mut().fail_next_uploads(1);
        movie.update();

        assert_eq!(movie.decode_stats().uploads_failed, 1);
        // The refresh stays pending until a frame makes it through
        let deadline = Instant::now() + Duration::from_secs(5);
        while movie.current_frame().is_none() && Instant::now() < deadline {
            movie.update();
        }
        assert_eq!(movie.current_sample(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _) = open("testsrc:frames=2,size=2x2", buffered(1, 2));
        let (b, _) = open("testsrc:frames=2,size=2x2", buffered(1, 2));
        assert_ne!(a.id(), b.id());
    }

    /// Test pattern whose container lists its video track twice
    struct DuplicateVideo;

    struct DuplicateVideoDemuxer {
        inner: Box<dyn Demuxer>,
        info: ContainerInfo,
    }

    impl MediaSource for DuplicateVideo {
        fn open(&self, path: &str) -> Result<Box<dyn Demuxer>> {
            let inner = TestPattern.open(path)?;
            let mut info = inner.container().clone();
            let mut copy = info.primary_video().cloned().unwrap();
            copy.id = 7;
            info.tracks.push(copy);
            Ok(Box::new(DuplicateVideoDemuxer { inner, info }))
        }
    }

    impl Demuxer for DuplicateVideoDemuxer {
        fn container(&self) -> &ContainerInfo {
            &self.info
        }

        fn read_sample(&mut self, _track_id: u32, index: u64) -> Result<CodedSample> {
            self.inner.read_sample(1, index)
        }

        fn create_decoder(&self, track: &TrackDescriptor) -> Result<Box<dyn Decoder>> {
            self.inner.create_decoder(track)
        }
    }

    #[test]
    fn test_second_video_track_rejected() {
        let result = MovieBuilder::new("testsrc:frames=4,size=2x2")
            .with_source(Arc::new(DuplicateVideo))
            .build(HostContext::new());
        assert!(matches!(
            result,
            Err(PlayerError::UnsupportedFormat(msg)) if msg.contains("2 video tracks")
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = MovieBuilder::new("testsrc:")
            .with_source(Arc::new(TestPattern))
            .with_options(MovieOptions::default().with_cpu_buffer_size(0))
            .build(HostContext::new());
        assert!(matches!(result, Err(PlayerError::InvalidInput(_))));
    }
}
