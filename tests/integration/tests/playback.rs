//! Integration tests for reelplay movie playback
//!
//! These tests drive complete movies through the public API:
//! - Frame timing at different playback rates
//! - Looping, end of stream and restarting
//! - Seek, pause and stop transitions
//! - Recovery from bad samples and construction failures
//! - Independent copies and teardown

use anyhow::Result;
use mockall::mock;
use reelplay::decoder::{Demuxer, MediaSource};
use reelplay::utils::Config;
use reelplay::{
    GpuContext, HostContext, ManualClock, MovieBuilder, MovieOptions, PlaybackState, PlayerError,
    TestPattern,
};
use reelplay_integration_tests::{clip, options, MovieFixture, REFRESH_TIMEOUT};
use std::sync::Arc;
use std::time::{Duration, Instant};

mock! {
    pub Source {}

    impl MediaSource for Source {
        fn open(&self, path: &str) -> reelplay::Result<Box<dyn Demuxer>>;
    }
}

#[test]
fn test_rate_one_advances_by_elapsed_frames() -> Result<()> {
    let mut fixture = MovieFixture::open(&clip(10, 10.0), 8)?;
    fixture.start();
    assert_eq!(fixture.movie.current_sample(), 0);

    // 0.35s of wall time at 0.1s per frame is 3 frames, not 4
    fixture.tick(100);
    fixture.tick(100);
    fixture.tick(150);

    assert_eq!(fixture.movie.current_sample(), 3);
    Ok(())
}

#[test]
fn test_rate_two_doubles_frame_advance() -> Result<()> {
    let mut fixture = MovieFixture::open(&clip(10, 10.0), 8)?;
    fixture.movie.set_playback_rate(2.0);
    fixture.start();

    fixture.tick(100);
    fixture.tick(100);
    fixture.tick(150);

    assert_eq!(fixture.movie.current_sample(), 7);
    Ok(())
}

#[test]
fn test_rate_zero_freezes_playback() -> Result<()> {
    let mut fixture = MovieFixture::open(&clip(30, 10.0), 4)?;
    fixture.start();
    assert_eq!(fixture.tick(100), 1);

    fixture.movie.set_playback_rate(0.0);
    assert_eq!(fixture.ticks(3, 100), vec![1, 1, 1]);
    assert!(fixture.movie.is_playing());

    fixture.movie.set_playback_rate(1.0);
    assert_eq!(fixture.tick(100), 2);
    Ok(())
}

#[test]
fn test_displayed_pixels_match_sample() -> Result<()> {
    let mut fixture = MovieFixture::open(&clip(10, 10.0), 4)?;
    fixture.start();
    fixture.ticks(2, 100);

    let frame = fixture.movie.current_frame().expect("no current frame");
    let first = u32::from_ne_bytes(frame.texture.pixels[..4].try_into()?);
    assert_eq!(first as u64, frame.sample);
    assert_eq!(frame.sample, 2);
    assert_eq!((frame.width, frame.height), (4, 2));
    Ok(())
}

#[test]
fn test_loop_wraps_to_first_sample() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let movie = MovieBuilder::new(clip(5, 10.0).uri())
        .with_source(Arc::new(TestPattern))
        .with_clock(clock.clone())
        .with_options(options(4, 4))
        .with_loop(true)
        .build(HostContext::new())?;
    let mut fixture = MovieFixture { movie, clock };

    fixture.start();
    assert_eq!(fixture.ticks(8, 100), vec![1, 2, 3, 4, 0, 1, 2, 3]);
    assert!(fixture.movie.is_playing());
    assert!(!fixture.movie.end_of_stream());
    Ok(())
}

#[test]
fn test_live_loop_without_prebuffer() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let movie = MovieBuilder::new(clip(10, 10.0).uri())
        .with_source(Arc::new(TestPattern))
        .with_clock(clock.clone())
        .with_options(options(1, 2).with_prebuffer(false))
        .with_loop(true)
        .build(HostContext::new())?;
    let mut fixture = MovieFixture { movie, clock };
    fixture.start();

    let mut previous = fixture.movie.current_sample();
    let mut wraps = 0;
    for _ in 0..25 {
        let sample = fixture.tick_live(100);
        assert!(
            sample == previous + 1 || (sample == 0 && previous == 9),
            "sample {} after {}",
            sample,
            previous
        );
        assert!(fixture.movie.elapsed_time() < fixture.movie.duration());
        if sample == 0 {
            wraps += 1;
        }
        previous = sample;
    }

    assert_eq!(wraps, 2);
    assert_eq!(previous, 5);
    assert!(fixture.movie.is_playing());
    Ok(())
}

#[test]
fn test_live_end_of_stream_without_prebuffer() -> Result<()> {
    let mut fixture = MovieFixture::open_with(
        &clip(5, 10.0).uri(),
        options(1, 2).with_prebuffer(false),
    )?;
    fixture.start();

    let mut shown = Vec::new();
    while fixture.movie.state() == PlaybackState::Playing && shown.len() < 20 {
        shown.push(fixture.tick_live(100));
    }

    // The stop can land a few updates after the last frame
    assert_eq!(fixture.movie.state(), PlaybackState::Stopped);
    assert_eq!(&shown[..4], &[1, 2, 3, 4]);
    assert!(shown[4..].iter().all(|&sample| sample == 4));
    assert!(fixture.movie.end_of_stream());
    assert_eq!(fixture.movie.remaining_time(), Duration::from_millis(100));
    Ok(())
}

#[test]
fn test_end_of_stream_stops_and_keeps_last_frame() -> Result<()> {
    let mut fixture = MovieFixture::open(&clip(5, 10.0), 8)?;
    fixture.start();

    assert_eq!(fixture.ticks(4, 100), vec![1, 2, 3, 4]);
    assert!(!fixture.movie.is_playing());
    assert_eq!(fixture.movie.state(), PlaybackState::Stopped);
    assert!(fixture.movie.end_of_stream());

    let last = fixture.movie.current_frame().expect("no frame at end");
    for _ in 0..3 {
        fixture.tick(100);
        let frame = fixture.movie.current_frame().expect("frame disappeared");
        assert!(Arc::ptr_eq(&last, &frame));
    }
    assert_eq!(fixture.movie.remaining_time(), Duration::from_millis(100));

    // Playing again restarts from the top
    fixture.movie.play();
    fixture.movie.update();
    assert_eq!(fixture.movie.current_sample(), 0);
    assert_eq!(fixture.tick(100), 1);
    Ok(())
}

#[test]
fn test_seek_while_playing() -> Result<()> {
    let mut fixture = MovieFixture::open(&clip(30, 10.0), 4)?;
    fixture.start();
    assert_eq!(fixture.ticks(3, 100), vec![1, 2, 3]);

    fixture.movie.seek_to_sample(20);
    fixture.movie.update();
    assert_eq!(fixture.movie.current_sample(), 20);
    assert_eq!(fixture.ticks(2, 100), vec![21, 22]);

    // Backwards, by time
    fixture.movie.seek(Duration::from_millis(500));
    fixture.movie.update();
    assert_eq!(fixture.movie.current_sample(), 5);
    assert_eq!(fixture.ticks(2, 100), vec![6, 7]);
    assert!(fixture.movie.is_playing());
    Ok(())
}

#[test]
fn test_seek_while_stopped_shows_target() -> Result<()> {
    let mut fixture = MovieFixture::open(&clip(30, 10.0), 4)?;
    fixture.movie.update();

    fixture.movie.seek(Duration::from_millis(1_250));
    fixture.movie.update();
    assert_eq!(fixture.movie.current_sample(), 12);
    assert_eq!(fixture.movie.elapsed_time(), Duration::from_millis(1_200));
    assert_eq!(fixture.movie.state(), PlaybackState::Stopped);

    // Stopped movies do not advance
    assert_eq!(fixture.tick(500), 12);
    Ok(())
}

#[test]
fn test_pause_is_idempotent() -> Result<()> {
    let mut fixture = MovieFixture::open(&clip(30, 10.0), 4)?;
    fixture.start();
    assert_eq!(fixture.tick(100), 1);

    fixture.movie.pause();
    fixture.movie.pause();
    assert_eq!(fixture.movie.state(), PlaybackState::Paused);
    assert_eq!(fixture.ticks(2, 100), vec![1, 1]);

    fixture.movie.play();
    assert_eq!(fixture.tick(100), 2);
    Ok(())
}

#[test]
fn test_stop_rewinds_and_is_idempotent() -> Result<()> {
    let mut fixture = MovieFixture::open(&clip(30, 10.0), 4)?;
    fixture.start();
    assert_eq!(fixture.ticks(3, 100), vec![1, 2, 3]);

    fixture.movie.stop();
    fixture.movie.stop();
    assert_eq!(fixture.movie.state(), PlaybackState::Stopped);

    fixture.movie.update();
    assert_eq!(fixture.movie.current_sample(), 0);
    assert_eq!(fixture.tick(200), 0);
    Ok(())
}

#[test]
fn test_bad_samples_are_skipped() -> Result<()> {
    let mut spec = clip(8, 10.0);
    spec.corrupt.insert(2);
    spec.unreadable.insert(5);

    let mut fixture = MovieFixture::open(&spec, 4)?;
    fixture.start();

    assert_eq!(fixture.ticks(5, 100), vec![1, 3, 4, 6, 7]);
    assert_eq!(fixture.movie.decode_stats().samples_skipped, 2);
    assert!(!fixture.movie.is_playing());
    Ok(())
}

#[test]
fn test_missing_video_track_is_unsupported_format() {
    let result = MovieBuilder::new("testsrc:video=0,audio=1")
        .with_source(Arc::new(TestPattern))
        .build(HostContext::new());
    assert!(matches!(result, Err(PlayerError::UnsupportedFormat(_))));
}

#[test]
fn test_unknown_codec_is_unsupported_codec() {
    let result = MovieBuilder::new("testsrc:codec=h264")
        .with_source(Arc::new(TestPattern))
        .build(HostContext::new());
    assert!(matches!(result, Err(PlayerError::UnsupportedCodec(_))));
}

#[test]
fn test_source_failure_aborts_construction() {
    let mut source = MockSource::new();
    source
        .expect_open()
        .withf(|path| path == "broken.mov")
        .times(1)
        .returning(|_| Err(PlayerError::UnsupportedFormat("truncated moov".to_string())));

    let result = MovieBuilder::new("broken.mov")
        .with_source(Arc::new(source))
        .build(HostContext::new());
    assert!(matches!(result, Err(PlayerError::UnsupportedFormat(_))));
}

#[test]
fn test_clone_reopens_through_same_source() -> Result<()> {
    let uri = clip(20, 10.0).uri();
    let mut source = MockSource::new();
    source
        .expect_open()
        .times(2)
        .returning(|path| TestPattern.open(path));

    let clock = Arc::new(ManualClock::new());
    let movie = MovieBuilder::new(uri.clone())
        .with_source(Arc::new(source))
        .with_clock(clock.clone())
        .with_options(options(4, 4))
        .build(HostContext::new())?;
    let mut fixture = MovieFixture { movie, clock };

    fixture.start();
    assert_eq!(fixture.ticks(3, 100), vec![1, 2, 3]);

    let mut copy = fixture.movie.try_clone()?;
    assert_ne!(copy.id(), fixture.movie.id());
    assert_eq!(copy.filename(), uri);
    assert_eq!(copy.state(), PlaybackState::Stopped);

    copy.update();
    assert_eq!(copy.current_sample(), 0);
    assert_eq!(fixture.movie.current_sample(), 3);

    // Stopping the copy leaves the original playing
    copy.play();
    copy.stop();
    assert!(fixture.movie.is_playing());
    assert_eq!(fixture.tick(100), 4);
    Ok(())
}

#[test]
fn test_options_from_config_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[playback]\nprebuffer = true\ncpu_buffer_size = 3\ngpu_buffer_size = 5\n",
    )?;

    let config = Config::from_file(&path)?;
    let options = MovieOptions::from(&config.playback).with_refresh_timeout(REFRESH_TIMEOUT);
    let fixture = MovieFixture::open_with(&clip(20, 10.0).uri(), options)?;

    assert_eq!(fixture.movie.options().cpu_buffer_size, 3);
    assert_eq!(fixture.movie.buffered_gpu_frames(), 5);
    assert_eq!(fixture.movie.gpu().slot_count(), 5);
    Ok(())
}

#[test]
fn test_drop_with_blocked_worker() -> Result<()> {
    let mut fixture = MovieFixture::open_with(
        &clip(100, 10.0).uri(),
        options(1, 2).with_prebuffer(false),
    )?;
    fixture.start();
    fixture.tick(100);

    // The worker is now blocked on a full CPU buffer
    let started = Instant::now();
    drop(fixture);
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}
