//! Decoder-buffer chain pipeline
//!
//! # Pipeline
//!
//! 1. **Decoder**: Chunk-based audio decoding using symphonia
//! 2. **Resampler**: Sample rate conversion to working_sample_rate
//! 3. **Fader**: Sample-accurate fade-in/fade-out application
//! 4. **Buffer**: Pushed into the passage's [`BufferManager`]-owned ring buffer
//!
//! Maintains state across chunks: decoder position/EOF, resampler filter
//! history (avoids phase discontinuities), and fader frame position.
//!
//! Used by [`crate::playback::decoder_worker::DecoderWorker`] for serial,
//! per-passage chunk processing.

use crate::audio::{StatefulResampler, StreamingDecoder};
use crate::db::passages::PassageWithTiming;
use crate::error::{Error, Result};
use crate::fade_curves::FadeCurve;
use crate::playback::buffer_manager::BufferManager;
use crate::playback::fader::Fader;
use std::path::PathBuf;
use uuid::Uuid;

/// Native-rate stereo frames decoded per chunk (~1 second at 44.1kHz).
const CHUNK_FRAMES: usize = 44_100;

/// Default gap (ms) before the passage end used to resolve an unspecified
/// lead-out/fade-out point, matching the `global_crossfade_time` default.
const DEFAULT_CROSSFADE_MS: u64 = 2_000;

/// Processing result from chunk decode
#[derive(Debug)]
pub enum ProcessResult {
    /// Chunk processed successfully
    Processed {
        /// Number of stereo frames pushed to buffer
        frames_pushed: usize,
    },

    /// Buffer full, decoder must yield
    BufferFull {
        /// Number of stereo frames pushed before buffer full
        frames_pushed: usize,
    },

    /// Decoding complete
    Finished {
        /// Total stereo frames pushed to buffer
        total_frames: usize,
    },
}

/// Decoder-buffer chain pipeline: Decoder -> Resampler -> Fader -> BufferManager
pub struct DecoderChain {
    queue_entry_id: Uuid,
    chain_index: usize,
    passage_id: Option<Uuid>,
    file_path: PathBuf,

    decoder: StreamingDecoder,
    resampler: StatefulResampler,
    fader: Fader,

    source_sample_rate: u32,
    working_sample_rate: u32,

    /// Expected passage duration in ms, used for partial-decode detection.
    expected_duration_ms: Option<u64>,

    total_frames_pushed: usize,
    finished: bool,
}

impl DecoderChain {
    /// Start a new chain for `passage`, decoding into the buffer registered
    /// with `buffer_manager` under `queue_entry_id`.
    pub async fn new(
        queue_entry_id: Uuid,
        chain_index: usize,
        passage: &PassageWithTiming,
        buffer_manager: &BufferManager,
        working_sample_rate: u32,
    ) -> Result<Self> {
        let start_ms = passage.start_time_ms;
        let end_ms = passage.end_time_ms.unwrap_or(0);

        let decoder = StreamingDecoder::new(&passage.file_path, start_ms, end_ms)?;
        let source_sample_rate = decoder.sample_rate();
        let channels = decoder.channels().max(1);

        let resampler = StatefulResampler::new(
            source_sample_rate,
            working_sample_rate,
            channels,
            CHUNK_FRAMES,
        )?;

        let lead_out_ms = passage
            .lead_out_point_ms
            .or_else(|| passage.end_time_ms.map(|e| e.saturating_sub(DEFAULT_CROSSFADE_MS)))
            .unwrap_or(start_ms);
        let fade_out_ms = passage
            .fade_out_point_ms
            .or_else(|| passage.end_time_ms.map(|e| e.saturating_sub(DEFAULT_CROSSFADE_MS)))
            .unwrap_or(start_ms);
        let passage_end_ms = passage.end_time_ms.unwrap_or(end_ms.max(start_ms));

        let fader = Fader::new(
            crate::timing::ms_to_ticks(start_ms as i64),
            crate::timing::ms_to_ticks(passage.fade_in_point_ms as i64),
            crate::timing::ms_to_ticks(passage.lead_in_point_ms as i64),
            crate::timing::ms_to_ticks(lead_out_ms as i64),
            crate::timing::ms_to_ticks(fade_out_ms as i64),
            crate::timing::ms_to_ticks(passage_end_ms as i64),
            passage.fade_in_curve,
            passage.fade_out_curve,
            working_sample_rate,
        );

        buffer_manager.register_decoding(queue_entry_id).await;
        buffer_manager
            .set_file_path(queue_entry_id, passage.file_path.display().to_string())
            .await
            .map_err(Error::Playback)?;

        Ok(Self {
            queue_entry_id,
            chain_index,
            passage_id: passage.passage_id,
            file_path: passage.file_path.clone(),
            decoder,
            resampler,
            fader,
            source_sample_rate,
            working_sample_rate,
            expected_duration_ms: passage.end_time_ms.map(|e| e.saturating_sub(start_ms)),
            total_frames_pushed: 0,
            finished: false,
        })
    }

    /// Process one chunk: decode, resample, fade, and push into the buffer.
    pub async fn process_chunk(&mut self, buffer_manager: &BufferManager) -> Result<ProcessResult> {
        if self.finished {
            return Ok(ProcessResult::Finished {
                total_frames: self.total_frames_pushed,
            });
        }

        let chunk = match self.decoder.decode_chunk(CHUNK_FRAMES)? {
            Some(chunk) => chunk,
            None => {
                self.finished = true;
                buffer_manager
                    .set_decode_completed(self.queue_entry_id)
                    .await
                    .ok();
                return Ok(ProcessResult::Finished {
                    total_frames: self.total_frames_pushed,
                });
            }
        };

        let mut samples = self.resampler.process_chunk(&chunk)?;

        self.fader.apply_fade(&mut samples)?;

        let frames_pushed = buffer_manager
            .push_samples(self.queue_entry_id, &samples)
            .await
            .map_err(Error::Playback)?;
        self.total_frames_pushed += frames_pushed;

        if frames_pushed < samples.len() / 2 {
            return Ok(ProcessResult::BufferFull { frames_pushed });
        }

        Ok(ProcessResult::Processed { frames_pushed })
    }

    /// Chain index, assigned round-robin for cache-friendly decode ordering.
    pub fn chain_index(&self) -> usize {
        self.chain_index
    }

    /// Passage UUID (`None` for ephemeral ad-hoc passages).
    pub fn passage_id(&self) -> Option<Uuid> {
        self.passage_id
    }

    /// Source audio file path.
    pub fn file_path(&self) -> &PathBuf {
        &self.file_path
    }

    /// Native sample rate of the source file, before resampling.
    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    /// Total stereo frames pushed to the buffer so far.
    pub fn total_frames_pushed(&self) -> usize {
        self.total_frames_pushed
    }

    /// Whether decoding has finished (EOF or passage end reached).
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// If decoding finished short of the passage's expected duration,
    /// returns `(expected_ms, actual_ms, percentage)`.
    pub fn get_partial_decode_info(&self) -> Option<(u64, u64, f64)> {
        let expected_ms = self.expected_duration_ms?;
        if expected_ms == 0 {
            return None;
        }

        let actual_ms =
            (self.total_frames_pushed as u64 * 1000) / self.working_sample_rate as u64;

        if actual_ms >= expected_ms {
            return None;
        }

        let percentage = (actual_ms as f64 / expected_ms as f64) * 100.0;
        Some((expected_ms, actual_ms, percentage))
    }
}

// ========================================
// Tests
// ========================================
