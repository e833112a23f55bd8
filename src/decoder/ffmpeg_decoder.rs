//! FFmpeg-backed media source
//!
//! Containers are scanned once at open to build a per-track sample table,
//! so any sample can be read by index later. Only intra-frame codecs are
//! accepted: every sample must decode on its own for seeking and looping
//! to stay exact.

use super::{
    CodedSample, ContainerInfo, DecodedPicture, Decoder, Demuxer, MediaSource, PixelFormat,
    TrackDescriptor, TrackKind,
};
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, media};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Duration;

/// Codecs whose samples are all key frames
const INTRA_CODECS: &[codec::Id] = &[
    codec::Id::MJPEG,
    codec::Id::PNG,
    codec::Id::PRORES,
    codec::Id::DNXHD,
    codec::Id::HAP,
    codec::Id::JPEG2000,
    codec::Id::TIFF,
    codec::Id::RAWVIDEO,
];

/// Opens files through libavformat
#[derive(Debug, Clone, Copy)]
pub struct FfmpegSource {
    _private: (),
}

impl FfmpegSource {
    /// Initialize FFmpeg
    pub fn new() -> Result<Self> {
        ffmpeg::init().format_err("Failed to initialize FFmpeg")?;
        ffmpeg::log::set_level(ffmpeg::log::Level::Error);
        Ok(Self { _private: () })
    }
}

impl MediaSource for FfmpegSource {
    fn open(&self, path: &str) -> Result<Box<dyn Demuxer>> {
        Ok(Box::new(FfmpegDemuxer::open(path)?))
    }
}

/// One entry of a track's sample table
#[derive(Debug, Clone, Copy)]
struct SampleEntry {
    /// Packet pts (or dts when the container has no pts)
    key: i64,

    /// Absolute position in `AV_TIME_BASE` units, for seeking
    seek_ts: i64,

    /// Presentation time relative to the first sample
    timestamp: Duration,
}

struct FfmpegDemuxer {
    input: format::context::Input,
    info: ContainerInfo,
    tables: HashMap<u32, Vec<SampleEntry>>,

    /// Track and index the next packet read will return without seeking
    cursor: Option<(u32, u64)>,
}

fn seconds(value: i64, time_base: ffmpeg::Rational) -> f64 {
    value as f64 * f64::from(time_base)
}

/// Stream time as a duration; out-of-range values from broken headers become zero
fn stream_time(value: i64, time_base: ffmpeg::Rational) -> Duration {
    Duration::try_from_secs_f64(seconds(value, time_base)).unwrap_or(Duration::ZERO)
}

fn container_format(brand: Option<&str>, version: Option<&str>, name: &str) -> String {
    match brand {
        Some(brand) if !brand.is_empty() => format!("{}{}", brand, version.unwrap_or("")),
        _ => name.to_string(),
    }
}

fn track_kind(medium: media::Type) -> TrackKind {
    match medium {
        media::Type::Video => TrackKind::Video,
        media::Type::Audio => TrackKind::Audio,
        media::Type::Subtitle => TrackKind::Subtitle,
        _ => TrackKind::Other,
    }
}

fn is_intra_only(id: codec::Id) -> bool {
    INTRA_CODECS.contains(&id)
}

impl FfmpegDemuxer {
    fn open(path: &str) -> Result<Self> {
        let mut input = format::input(&path).format_err(path)?;
        let tables = Self::scan(&mut input);

        let metadata = input.metadata();
        let format = container_format(
            metadata.get("major_brand"),
            metadata.get("minor_version"),
            input.format().name(),
        );
        let container_duration = if input.duration() > 0 {
            Duration::from_micros(input.duration() as u64)
        } else {
            Duration::ZERO
        };

        let mut tracks = Vec::new();
        for stream in input.streams() {
            let id = stream.index() as u32;
            let parameters = stream.parameters();
            let kind = track_kind(parameters.medium());
            let time_base = stream.time_base();

            let (width, height) = if kind == TrackKind::Video {
                let decoder = codec::context::Context::from_parameters(parameters.clone())
                    .and_then(|context| context.decoder().video());
                match decoder {
                    Ok(video) => (video.width(), video.height()),
                    Err(e) => {
                        warn!("Could not read dimensions of track {}: {}", id, e);
                        (0, 0)
                    }
                }
            } else {
                (0, 0)
            };

            let sample_count = tables
                .get(&id)
                .map(|t| t.len() as u64)
                .unwrap_or_else(|| stream.frames().max(0) as u64);
            let duration = if stream.duration() > 0 {
                stream_time(stream.duration(), time_base)
            } else {
                container_duration
            };
            let framerate = {
                let rate = f64::from(stream.avg_frame_rate());
                if rate.is_finite() && rate > 0.0 {
                    rate
                } else if !duration.is_zero() {
                    sample_count as f64 / duration.as_secs_f64()
                } else {
                    0.0
                }
            };

            tracks.push(TrackDescriptor {
                id,
                kind,
                codec: parameters.id().name().to_string(),
                width,
                height,
                framerate,
                duration,
                sample_count,
            });
        }

        let info = ContainerInfo {
            format,
            duration: container_duration,
            tracks,
        };
        info!(
            "Opened {} ({}, {} tracks)",
            path,
            info.format,
            info.tracks.len()
        );

        // The scan consumed the packets; start over for sequential reads
        let input = format::input(&path).format_err(path)?;

        Ok(Self {
            input,
            info,
            tables,
            cursor: None,
        })
    }

    /// Build sample tables for the video tracks
    fn scan(input: &mut format::context::Input) -> HashMap<u32, Vec<SampleEntry>> {
        let mut tables: HashMap<u32, (ffmpeg::Rational, Vec<SampleEntry>)> = input
            .streams()
            .filter(|s| s.parameters().medium() == media::Type::Video)
            .map(|s| (s.index() as u32, (s.time_base(), Vec::new())))
            .collect();

        for (stream, packet) in input.packets() {
            let Some((time_base, table)) = tables.get_mut(&(stream.index() as u32)) else {
                continue;
            };
            let Some(key) = packet.pts().or(packet.dts()) else {
                debug!("Skipping packet without timestamps on track {}", stream.index());
                continue;
            };
            let first = table.first().map(|e| e.key).unwrap_or(key);
            table.push(SampleEntry {
                key,
                seek_ts: (seconds(key, *time_base) * 1_000_000.0) as i64,
                timestamp: stream_time(key - first, *time_base),
            });
        }

        tables
            .into_iter()
            .map(|(id, (_, table))| {
                debug!("Track {} has {} samples", id, table.len());
                (id, table)
            })
            .collect()
    }
}

impl Demuxer for FfmpegDemuxer {
    fn container(&self) -> &ContainerInfo {
        &self.info
    }

    fn read_sample(&mut self, track_id: u32, index: u64) -> Result<CodedSample> {
        let entry = self
            .tables
            .get(&track_id)
            .and_then(|t| t.get(index as usize))
            .copied()
            .ok_or_else(|| {
                PlayerError::sample_read(index, format!("no sample in track {}", track_id))
            })?;

        if self.cursor != Some((track_id, index)) {
            // Land at or before the sample, then read forward to it
            self.input
                .seek(entry.seek_ts, ..entry.seek_ts + 1)
                .map_err(|e| PlayerError::sample_read(index, e.to_string()))?;
            self.cursor = None;
        }

        for (stream, packet) in self.input.packets() {
            if stream.index() as u32 != track_id {
                continue;
            }
            if packet.pts().or(packet.dts()) != Some(entry.key) {
                continue;
            }
            let data = packet
                .data()
                .map(<[u8]>::to_vec)
                .ok_or_else(|| PlayerError::sample_read(index, "empty packet"))?;
            self.cursor = Some((track_id, index + 1));
            return Ok(CodedSample {
                index,
                timestamp: entry.timestamp,
                data,
            });
        }

        self.cursor = None;
        Err(PlayerError::sample_read(index, "packet not found after seek"))
    }

    fn create_decoder(&self, track: &TrackDescriptor) -> Result<Box<dyn Decoder>> {
        let stream = self
            .input
            .stream(track.id as usize)
            .ok_or_else(|| PlayerError::UnsupportedCodec(format!("no track {}", track.id)))?;
        let parameters = stream.parameters();

        if !is_intra_only(parameters.id()) {
            return Err(PlayerError::UnsupportedCodec(format!(
                "{} is not an intra-frame codec",
                track.codec
            )));
        }

        let decoder = codec::context::Context::from_parameters(parameters)
            .and_then(|context| context.decoder().video())
            .codec_err(&track.codec)?;

        debug!("Created {} decoder for track {}", track.codec, track.id);
        Ok(Box::new(FfmpegDecoder { decoder }))
    }
}

struct FfmpegDecoder {
    decoder: codec::decoder::Video,
}

impl Decoder for FfmpegDecoder {
    fn decode(&mut self, sample: &CodedSample) -> Result<DecodedPicture> {
        let failed = |e: ffmpeg::Error| PlayerError::decode(sample.index, e.to_string());

        let packet = ffmpeg::Packet::copy(&sample.data);
        self.decoder.send_packet(&packet).map_err(failed)?;

        let mut frame = ffmpeg::frame::Video::empty();
        self.decoder.receive_frame(&mut frame).map_err(failed)?;

        // Scaler is created per frame; intra codecs may change size mid-stream
        let mut scaler = ffmpeg::software::scaling::Context::get(
            frame.format(),
            frame.width(),
            frame.height(),
            format::Pixel::RGBA,
            frame.width(),
            frame.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(failed)?;

        let mut rgba = ffmpeg::frame::Video::empty();
        scaler.run(&frame, &mut rgba).map_err(failed)?;

        Ok(DecodedPicture {
            width: rgba.width(),
            height: rgba.height(),
            format: PixelFormat::Rgba8,
            stride: rgba.stride(0),
            data: rgba.data(0).to_vec(),
        })
    }
}
