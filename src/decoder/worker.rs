//! Background decode thread
//!
//! The worker owns the demux session and decoder for one movie. It reads
//! samples in order starting at the shared progress position, decodes them
//! and pushes the frames into the CPU buffer, blocking there when the buffer
//! is full. Between samples it re-reads the position, so a seek takes effect
//! on the very next sample.

use crate::decoder::{Decoder, Demuxer, Frame, TrackDescriptor};
use crate::player::state::SharedPlayback;
use crate::utils::error::{PlayerError, Result};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) struct DecodeWorker {
    movie_id: u64,
    demuxer: Box<dyn Demuxer>,
    decoder: Box<dyn Decoder>,
    track: TrackDescriptor,
    shared: Arc<SharedPlayback>,
}

impl DecodeWorker {
    pub fn new(
        movie_id: u64,
        demuxer: Box<dyn Demuxer>,
        decoder: Box<dyn Decoder>,
        track: TrackDescriptor,
        shared: Arc<SharedPlayback>,
    ) -> Self {
        Self {
            movie_id,
            demuxer,
            decoder,
            track,
            shared,
        }
    }

    /// Start the worker on its own named thread
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("decode-{}", self.movie_id))
            .spawn(move || self.run())
            .map_err(|e| PlayerError::Internal(format!("Failed to spawn decode thread: {}", e)))
    }

    fn run(mut self) {
        let sample_count = self.track.sample_count;
        info!(
            "Decode worker for movie {} started ({} samples)",
            self.movie_id, sample_count
        );

        while self.shared.wait_until_active() {
            let snapshot = self.shared.progress.load();
            let index = snapshot.sample_index(sample_count);

            if index >= sample_count {
                if self.shared.is_looping() {
                    if self.shared.progress.wrap(snapshot) {
                        debug!("Movie {} wrapped to the first sample", self.movie_id);
                    }
                    continue;
                }

                if !self.shared.end_of_stream() {
                    debug!("Movie {} reached end of stream", self.movie_id);
                    self.shared.set_end_of_stream(true);
                }
                self.shared.wait_for_change(snapshot);
                continue;
            }

            self.shared.set_end_of_stream(false);

            match self.decode_sample(index) {
                Ok(picture_frame) => {
                    let frame = Frame {
                        generation: snapshot.generation(),
                        ..picture_frame
                    };
                    if self.shared.cpu.push(frame).is_err() {
                        if self.shared.is_shutdown() {
                            break;
                        }
                        continue;
                    }
                    self.shared.frames_decoded.fetch_add(1, Ordering::Relaxed);
                    trace!("Movie {} decoded sample {}", self.movie_id, index);
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Movie {} skipping sample {}: {}", self.movie_id, index, e);
                    self.shared.samples_skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!("Movie {} failed on sample {}: {}", self.movie_id, index, e);
                    self.shared.samples_skipped.fetch_add(1, Ordering::Relaxed);
                }
            }

            if !self.shared.progress.advance_from(snapshot, sample_count) {
                trace!(
                    "Movie {} position moved while decoding sample {}",
                    self.movie_id,
                    index
                );
            }
        }

        info!("Decode worker for movie {} stopped", self.movie_id);
    }

    fn decode_sample(&mut self, index: u64) -> Result<Frame> {
        let sample = self.demuxer.read_sample(self.track.id, index)?;
        let picture = self.decoder.decode(&sample)?;
        picture.validate().map_err(|e| PlayerError::decode(index, e.to_string()))?;

        Ok(Frame {
            picture,
            sample: index,
            timestamp: sample.timestamp,
            generation: 0,
        })
    }
}
