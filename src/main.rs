use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{debug, info, warn};
use reelplay::player::MovieOptions;
use reelplay::utils::{format_duration, load_config};
use reelplay::{GpuContext, HostContext, MovieBuilder, WgpuContext};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// reelplay - headless movie playback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file or testsrc: URI to play
    #[arg(value_name = "FILE")]
    file: String,

    /// Loop playback
    #[arg(short, long = "loop")]
    looping: bool,

    /// Playback rate multiplier
    #[arg(short, long, value_name = "RATE")]
    rate: Option<f64>,

    /// Start position in seconds
    #[arg(short, long, value_name = "SECONDS", value_parser = parse_seconds)]
    seek: Option<Duration>,

    /// Stop after this many seconds of wall time
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    duration: Option<Duration>,

    /// Decoded (CPU) frame buffer capacity
    #[arg(long, value_name = "FRAMES")]
    cpu_buffer: Option<usize>,

    /// GPU frame buffer capacity
    #[arg(long, value_name = "FRAMES")]
    gpu_buffer: Option<usize>,

    /// Do not fill the buffers before playback starts
    #[arg(long = "no-prebuffer", action = ArgAction::SetFalse)]
    prebuffer: bool,

    /// Upload into host memory instead of a GPU
    #[arg(long)]
    host_gpu: bool,

    /// Update tick interval in milliseconds
    #[arg(long, value_name = "MS", default_value = "16")]
    tick_ms: u64,

    /// Write the merged configuration to this file and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Parse a non-negative, finite number of seconds
fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if seconds < 0.0 {
        return Err(format!("{} is negative", seconds));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("{}: {}", value, e))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config().context("Failed to load configuration")?;

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting reelplay v{}", env!("CARGO_PKG_VERSION"));

    if let Some(path) = &args.write_config {
        config
            .save_to(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    let mut options = MovieOptions::from(&config.playback).with_prebuffer(args.prebuffer);
    if let Some(size) = args.cpu_buffer {
        options = options.with_cpu_buffer_size(size);
    }
    if let Some(size) = args.gpu_buffer {
        options = options.with_gpu_buffer_size(size);
    }

    if args.host_gpu {
        return run(HostContext::new(), &args, options, &config.playback);
    }

    match WgpuContext::headless() {
        Ok(gpu) => run(gpu, &args, options, &config.playback),
        Err(e) => {
            warn!("{}; falling back to host memory uploads", e);
            run(HostContext::new(), &args, options, &config.playback)
        }
    }
}

fn run<G: GpuContext>(
    gpu: G,
    args: &Args,
    options: MovieOptions,
    playback: &reelplay::utils::PlaybackConfig,
) -> Result<()> {
    let mut movie = MovieBuilder::new(args.file.clone())
        .with_options(options)
        .with_loop(args.looping || playback.loop_playback)
        .with_playback_rate(args.rate.unwrap_or(playback.playback_rate))
        .build(gpu)
        .with_context(|| format!("Failed to open {}", args.file))?;

    for index in 0..movie.track_count() {
        if let Ok(track) = movie.track_description(index) {
            info!("Track {}", track.description());
        }
    }
    info!(
        "Format {}, duration {}",
        movie.format(),
        format_duration(movie.duration())
    );

    if let Some(position) = args.seek {
        movie.seek(position);
    }
    movie.update();
    movie.play();

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let limit = args.duration;
    let started = Instant::now();
    let mut last_report = Instant::now();
    let mut last_sample = movie.current_sample();

    while movie.is_playing() {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            info!("Run time limit reached");
            break;
        }

        movie.update();

        if movie.current_sample() != last_sample {
            last_sample = movie.current_sample();
            debug!("Showing sample {}", last_sample);
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            info!(
                "{} / {}  sample {}/{}  buffers cpu {} gpu {}",
                format_duration(movie.elapsed_time()),
                format_duration(movie.duration()),
                movie.current_sample(),
                movie.sample_count(),
                movie.buffered_cpu_frames(),
                movie.buffered_gpu_frames()
            );
        }

        std::thread::sleep(tick);
    }

    movie.stop();

    let stats = movie.decode_stats();
    info!(
        "Done: {} decoded, {} presented, {} skipped, {} upload failures",
        stats.frames_decoded, stats.frames_presented, stats.samples_skipped, stats.uploads_failed
    );

    Ok(())
}
