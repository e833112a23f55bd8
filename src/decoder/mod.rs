//! Decoder module for reelplay
//!
//! This module defines the narrow interfaces the playback engine consumes
//! (container demuxing and per-sample decoding) together with the frame
//! pipeline pieces that run off the update thread: the bounded frame
//! buffers, the progress counter and the decode worker.

#[cfg(feature = "ffmpeg")]
mod ffmpeg_decoder;
pub mod frame_queue;
pub mod progress;
pub mod test_pattern;
pub(crate) mod worker;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg_decoder::FfmpegSource;
pub use frame_queue::{FrameBuffer, PushError, QueueStats};
pub use progress::{ProgressCounter, ProgressSnapshot};
pub use test_pattern::TestPattern;

use crate::utils::error::{PlayerError, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opens containers by path
///
/// Implementations must be shareable so a movie can reopen its source when
/// it is duplicated.
pub trait MediaSource: Send + Sync {
    /// Open a container and read its track table
    ///
    /// Fails with [`PlayerError::UnsupportedFormat`] if the container cannot
    /// be parsed.
    fn open(&self, path: &str) -> Result<Box<dyn Demuxer>>;
}

/// An open demux session over one container
///
/// The session is moved into the decode thread after construction and is
/// only ever used from there.
pub trait Demuxer: Send {
    /// Container level information resolved at open
    fn container(&self) -> &ContainerInfo;

    /// Read the coded bytes of one sample
    fn read_sample(&mut self, track_id: u32, index: u64) -> Result<CodedSample>;

    /// Create a decoder for a track
    ///
    /// Fails with [`PlayerError::UnsupportedCodec`] if the codec is unknown.
    fn create_decoder(&self, track: &TrackDescriptor) -> Result<Box<dyn Decoder>>;
}

/// Turns coded samples into pictures
pub trait Decoder: Send {
    /// Decode one sample; failures are per-sample and recoverable
    fn decode(&mut self, sample: &CodedSample) -> Result<DecodedPicture>;
}

/// Container information
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    /// Container format string (brand and version when the container carries one)
    pub format: String,

    /// Total duration
    pub duration: Duration,

    /// All tracks in container order
    pub tracks: Vec<TrackDescriptor>,
}

impl ContainerInfo {
    /// First video track, which is the one a movie plays
    pub fn primary_video(&self) -> Option<&TrackDescriptor> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    /// Number of video tracks
    pub fn video_track_count(&self) -> usize {
        self.tracks
            .iter()
            .filter(|t| t.kind == TrackKind::Video)
            .count()
    }
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Subtitle => "subtitle",
            TrackKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Track information, resolved once at load and immutable afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    /// Container track id
    pub id: u32,

    /// Media kind
    pub kind: TrackKind,

    /// Codec name
    pub codec: String,

    /// Picture width (0 for non-video tracks)
    pub width: u32,

    /// Picture height (0 for non-video tracks)
    pub height: u32,

    /// Frames per second
    pub framerate: f64,

    /// Track duration
    pub duration: Duration,

    /// Number of samples in the track
    pub sample_count: u64,
}

impl TrackDescriptor {
    /// Human readable one-line summary
    pub fn description(&self) -> String {
        match self.kind {
            TrackKind::Video => format!(
                "#{} video: {} {}x{} @ {:.2} fps, {} samples",
                self.id, self.codec, self.width, self.height, self.framerate, self.sample_count
            ),
            kind => format!("#{} {}: {}, {} samples", self.id, kind, self.codec, self.sample_count),
        }
    }

    /// Presentation time of a sample, `index / sample_count * duration`
    pub fn sample_time(&self, index: u64) -> Duration {
        if self.sample_count == 0 {
            return Duration::ZERO;
        }
        let index = index.min(self.sample_count) as u128;
        let nanos = self.duration.as_nanos() * index / self.sample_count as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// Coded bytes of one container sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedSample {
    /// Sample index within the track
    pub index: u64,

    /// Presentation timestamp
    pub timestamp: Duration,

    /// Coded payload
    pub data: Vec<u8>,
}

/// Pixel layout of decoded pictures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGBA
    Rgba8,

    /// 8-bit BGRA
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }
}

/// Decoded raster picture in CPU memory
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedPicture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,

    /// Bytes per row, at least `width * bytes_per_pixel`
    pub stride: usize,

    pub data: Vec<u8>,
}

impl DecodedPicture {
    /// Tightly packed bytes per row
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Pixel bytes of row `y`, without stride padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Check that the buffer holds every row the dimensions promise
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PlayerError::InvalidInput("empty picture".to_string()));
        }
        if self.stride < self.row_bytes() {
            return Err(PlayerError::InvalidInput(format!(
                "stride {} shorter than row of {} bytes",
                self.stride,
                self.row_bytes()
            )));
        }
        let needed = self.stride * (self.height as usize - 1) + self.row_bytes();
        if self.data.len() < needed {
            return Err(PlayerError::InvalidInput(format!(
                "picture data is {} bytes, {} needed",
                self.data.len(),
                needed
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for DecodedPicture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedPicture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A decoded frame waiting in the CPU buffer
#[derive(Debug)]
pub struct Frame {
    /// Decoded pixels
    pub picture: DecodedPicture,

    /// Sample index within the track
    pub sample: u64,

    /// Presentation timestamp
    pub timestamp: Duration,

    /// Seek generation the frame was decoded in
    pub generation: u16,
}

/// Routes `testsrc:` URIs to [`TestPattern`] and everything else to FFmpeg
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSource;

impl MediaSource for DefaultSource {
    fn open(&self, path: &str) -> Result<Box<dyn Demuxer>> {
        if path.starts_with(test_pattern::SCHEME) {
            return TestPattern::default().open(path);
        }

        #[cfg(feature = "ffmpeg")]
        {
            FfmpegSource::new()?.open(path)
        }

        #[cfg(not(feature = "ffmpeg"))]
        {
            Err(PlayerError::UnsupportedFormat(format!(
                "{}: container demuxing requires the `ffmpeg` feature",
                path
            )))
        }
    }
}

/// Media source used when none is supplied
pub fn default_source() -> Arc<dyn MediaSource> {
    Arc::new(DefaultSource)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_track() -> TrackDescriptor {
        TrackDescriptor {
            id: 1,
            kind: TrackKind::Video,
            codec: "mjpeg".to_string(),
            width: 640,
            height: 360,
            framerate: 25.0,
            duration: Duration::from_secs(4),
            sample_count: 100,
        }
    }

    #[test]
    fn test_primary_video_skips_other_tracks() {
        let audio = TrackDescriptor {
            id: 0,
            kind: TrackKind::Audio,
            codec: "aac".to_string(),
            width: 0,
            height: 0,
            framerate: 0.0,
            duration: Duration::from_secs(4),
            sample_count: 188,
        };
        let info = ContainerInfo {
            format: "qt  512".to_string(),
            duration: Duration::from_secs(4),
            tracks: vec![audio, video_track()],
        };

        assert_eq!(info.primary_video().map(|t| t.id), Some(1));
        assert_eq!(info.video_track_count(), 1);
    }

    #[test]
    fn test_sample_time() {
        let track = video_track();
        assert_eq!(track.sample_time(0), Duration::ZERO);
        assert_eq!(track.sample_time(25), Duration::from_secs(1));
        assert_eq!(track.sample_time(1_000), Duration::from_secs(4));
    }

    #[test]
    fn test_description() {
        assert_eq!(
            video_track().description(),
            "#1 video: mjpeg 640x360 @ 25.00 fps, 100 samples"
        );
    }

    #[test]
    fn test_picture_validation() {
        let mut picture = DecodedPicture {
            width: 2,
            height: 2,
            format: PixelFormat::Rgba8,
            stride: 12,
            data: vec![0; 20],
        };
        assert!(picture.validate().is_ok());
        assert_eq!(picture.row(1).len(), 8);

        picture.data.truncate(19);
        assert!(picture.validate().is_err());

        picture.stride = 4;
        assert!(picture.validate().is_err());
    }

    #[test]
    fn test_default_source_routes_test_pattern() {
        let demuxer = default_source().open("testsrc:frames=5,fps=5").unwrap();
        let track = demuxer.container().primary_video().unwrap();
        assert_eq!(track.sample_count, 5);
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_default_source_without_ffmpeg() {
        let result = default_source().open("clip.mov");
        assert!(matches!(result, Err(PlayerError::UnsupportedFormat(_))));
    }
}
