//! Synthetic test-pattern source
//!
//! Opens `testsrc:` URIs such as
//! `testsrc:frames=120,fps=30,size=64x36,corrupt=4;9` and produces RGBA
//! gradient frames whose first pixel carries the sample index, so tests and
//! the CLI can check exactly which sample is on screen without any media
//! files or FFmpeg.
//!
//! Recognised keys: `frames`, `fps`, `size`, `codec`, `corrupt` (samples
//! whose payload is truncated so decoding fails), `unreadable` (samples
//! whose read fails), `delay_ms` (artificial decode cost), `audio=1` (adds
//! an audio track) and `video=0` (no video track at all).

use super::{
    CodedSample, ContainerInfo, DecodedPicture, Decoder, Demuxer, MediaSource, PixelFormat,
    TrackDescriptor, TrackKind,
};
use crate::utils::error::{PlayerError, Result};
use std::collections::BTreeSet;
use std::time::Duration;

/// URI scheme handled by this source
pub const SCHEME: &str = "testsrc:";

/// Codec the pattern decoder understands
pub const PATTERN_CODEC: &str = "raw-rgba";

const VIDEO_TRACK_ID: u32 = 1;
const AUDIO_TRACK_ID: u32 = 2;

/// Parameters of a synthetic clip
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSpec {
    pub frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub corrupt: BTreeSet<u64>,
    pub unreadable: BTreeSet<u64>,
    pub decode_delay: Duration,
    pub audio: bool,
    pub video: bool,
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self {
            frames: 30,
            fps: 30.0,
            width: 64,
            height: 36,
            codec: PATTERN_CODEC.to_string(),
            corrupt: BTreeSet::new(),
            unreadable: BTreeSet::new(),
            decode_delay: Duration::ZERO,
            audio: false,
            video: true,
        }
    }
}

impl PatternSpec {
    /// Clip with `frames` samples at `fps`
    pub fn new(frames: u64, fps: f64) -> Self {
        Self {
            frames,
            fps,
            ..Self::default()
        }
    }

    /// Parse a `testsrc:` URI
    pub fn parse(uri: &str) -> Result<Self> {
        let body = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| PlayerError::UnsupportedFormat(format!("not a test pattern: {}", uri)))?;

        let mut spec = Self::default();
        for pair in body.split(',').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| invalid(uri, pair))?;
            match key {
                "frames" => spec.frames = value.parse().map_err(|_| invalid(uri, pair))?,
                "fps" => spec.fps = value.parse().map_err(|_| invalid(uri, pair))?,
                "size" => {
                    let (w, h) = value.split_once('x').ok_or_else(|| invalid(uri, pair))?;
                    spec.width = w.parse().map_err(|_| invalid(uri, pair))?;
                    spec.height = h.parse().map_err(|_| invalid(uri, pair))?;
                }
                "codec" => spec.codec = value.to_string(),
                "corrupt" => spec.corrupt = parse_set(value).ok_or_else(|| invalid(uri, pair))?,
                "unreadable" => {
                    spec.unreadable = parse_set(value).ok_or_else(|| invalid(uri, pair))?
                }
                "delay_ms" => {
                    let ms = value.parse().map_err(|_| invalid(uri, pair))?;
                    spec.decode_delay = Duration::from_millis(ms);
                }
                "audio" => spec.audio = value == "1",
                "video" => spec.video = value != "0",
                _ => return Err(invalid(uri, pair)),
            }
        }

        if spec.frames == 0 || !(spec.fps.is_finite() && spec.fps > 0.0) {
            return Err(PlayerError::UnsupportedFormat(format!(
                "{}: frames and fps must be positive",
                uri
            )));
        }
        if Duration::try_from_secs_f64(spec.frames as f64 / spec.fps).is_err() {
            return Err(PlayerError::UnsupportedFormat(format!(
                "{}: clip duration out of range",
                uri
            )));
        }
        if spec.width == 0 || spec.height == 0 {
            return Err(PlayerError::UnsupportedFormat(format!("{}: empty frame size", uri)));
        }

        Ok(spec)
    }

    /// Render back into a `testsrc:` URI
    pub fn uri(&self) -> String {
        let mut uri = format!(
            "{}frames={},fps={},size={}x{},codec={}",
            SCHEME, self.frames, self.fps, self.width, self.height, self.codec
        );
        if !self.corrupt.is_empty() {
            uri.push_str(&format!(",corrupt={}", join_set(&self.corrupt)));
        }
        if !self.unreadable.is_empty() {
            uri.push_str(&format!(",unreadable={}", join_set(&self.unreadable)));
        }
        if !self.decode_delay.is_zero() {
            uri.push_str(&format!(",delay_ms={}", self.decode_delay.as_millis()));
        }
        if self.audio {
            uri.push_str(",audio=1");
        }
        if !self.video {
            uri.push_str(",video=0");
        }
        uri
    }

    /// Clip duration, `frames / fps`
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.frames as f64 / self.fps).unwrap_or(Duration::MAX)
    }
}

fn invalid(uri: &str, pair: &str) -> PlayerError {
    PlayerError::UnsupportedFormat(format!("{}: bad parameter '{}'", uri, pair))
}

fn parse_set(value: &str) -> Option<BTreeSet<u64>> {
    value.split(';').map(|v| v.parse().ok()).collect()
}

fn join_set(set: &BTreeSet<u64>) -> String {
    set.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

/// [`MediaSource`] for `testsrc:` URIs
#[derive(Debug, Default, Clone, Copy)]
pub struct TestPattern;

impl TestPattern {
    /// Sample index encoded in a picture produced by this source
    pub fn sample_of(picture: &DecodedPicture) -> Option<u64> {
        let first = picture.data.get(0..4)?;
        Some(bytemuck::pod_read_unaligned::<u32>(first) as u64)
    }
}

impl MediaSource for TestPattern {
    fn open(&self, path: &str) -> Result<Box<dyn Demuxer>> {
        let spec = PatternSpec::parse(path)?;
        log::debug!("Opened test pattern {}", spec.uri());
        Ok(Box::new(PatternDemuxer::new(spec)))
    }
}

struct PatternDemuxer {
    spec: PatternSpec,
    info: ContainerInfo,
}

impl PatternDemuxer {
    fn new(spec: PatternSpec) -> Self {
        let duration = spec.duration();
        let mut tracks = Vec::new();

        if spec.audio {
            tracks.push(TrackDescriptor {
                id: AUDIO_TRACK_ID,
                kind: TrackKind::Audio,
                codec: "pcm_s16le".to_string(),
                width: 0,
                height: 0,
                framerate: 0.0,
                duration,
                sample_count: spec.frames,
            });
        }
        if spec.video {
            tracks.push(TrackDescriptor {
                id: VIDEO_TRACK_ID,
                kind: TrackKind::Video,
                codec: spec.codec.clone(),
                width: spec.width,
                height: spec.height,
                framerate: spec.fps,
                duration,
                sample_count: spec.frames,
            });
        }

        let info = ContainerInfo {
            format: "testsrc".to_string(),
            duration,
            tracks,
        };

        Self { spec, info }
    }
}

impl Demuxer for PatternDemuxer {
    fn container(&self) -> &ContainerInfo {
        &self.info
    }

    fn read_sample(&mut self, track_id: u32, index: u64) -> Result<CodedSample> {
        if track_id != VIDEO_TRACK_ID || !self.spec.video {
            return Err(PlayerError::sample_read(index, format!("no track {}", track_id)));
        }
        if index >= self.spec.frames {
            return Err(PlayerError::sample_read(index, "past end of track"));
        }
        if self.spec.unreadable.contains(&index) {
            return Err(PlayerError::sample_read(index, "unreadable sample"));
        }

        let data = if self.spec.corrupt.contains(&index) {
            vec![0xff; 3]
        } else {
            index.to_le_bytes().to_vec()
        };

        Ok(CodedSample {
            index,
            timestamp: Duration::from_secs_f64(index as f64 / self.spec.fps),
            data,
        })
    }

    fn create_decoder(&self, track: &TrackDescriptor) -> Result<Box<dyn Decoder>> {
        if track.codec != PATTERN_CODEC {
            return Err(PlayerError::UnsupportedCodec(track.codec.clone()));
        }
        Ok(Box::new(PatternDecoder {
            width: track.width,
            height: track.height,
            delay: self.spec.decode_delay,
        }))
    }
}

struct PatternDecoder {
    width: u32,
    height: u32,
    delay: Duration,
}

impl Decoder for PatternDecoder {
    fn decode(&mut self, sample: &CodedSample) -> Result<DecodedPicture> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let payload: [u8; 8] = sample
            .data
            .as_slice()
            .try_into()
            .map_err(|_| PlayerError::decode(sample.index, "truncated payload"))?;
        let index = u64::from_le_bytes(payload);

        let (w, h) = (self.width as usize, self.height as usize);
        let mut pixels = vec![0u32; w * h];
        for (y, row) in pixels.chunks_exact_mut(w).enumerate() {
            for (x, px) in row.iter_mut().enumerate() {
                let r = (x * 255 / (w.max(2) - 1)) as u8;
                let g = (y * 255 / (h.max(2) - 1)) as u8;
                let b = (index % 256) as u8;
                *px = u32::from_ne_bytes([r, g, b, 0xff]);
            }
        }
        pixels[0] = index as u32;

        Ok(DecodedPicture {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba8,
            stride: w * 4,
            data: bytemuck::cast_slice(&pixels).to_vec(),
        })
    }
}
