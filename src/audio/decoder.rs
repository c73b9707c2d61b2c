//! Audio decoder using symphonia.
//!
//! Decodes various audio formats (MP3, FLAC, AAC, Vorbis, Opus) to PCM
//! samples. Uses a decode-from-start-and-skip approach: audio is always
//! decoded from the beginning of the file and trimmed to the passage's
//! start/end time, since compressed-stream seeking is not sample-accurate
//! for most codecs.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use symphonia::core::codecs::CodecRegistry;
use symphonia_adapter_libopus::OpusDecoder;
use std::sync::OnceLock;

/// Codec registry with Opus support (via libopus FFI) layered on symphonia's
/// built-in decoders.
fn get_codec_registry() -> &'static CodecRegistry {
    static CODEC_REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    CODEC_REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        registry.register_all::<OpusDecoder>();
        registry.register_all::<symphonia::default::codecs::MpaDecoder>();
        registry.register_all::<symphonia::default::codecs::PcmDecoder>();
        registry.register_all::<symphonia::default::codecs::VorbisDecoder>();
        registry.register_all::<symphonia::default::codecs::FlacDecoder>();
        registry.register_all::<symphonia::default::codecs::AdpcmDecoder>();
        registry.register_all::<symphonia::default::codecs::AacDecoder>();
        registry
    })
}

/// Incremental, chunk-based audio decoder.
///
/// Opens a file once and keeps the symphonia format reader and codec
/// decoder alive across repeated [`decode_chunk`](Self::decode_chunk) calls,
/// so a [`crate::playback::decoder_chain::DecoderChain`] can pull a few
/// hundred milliseconds at a time instead of decoding a whole passage up
/// front. Skips samples before `start_ms` and stops emitting once `end_ms`
/// is reached, discarding the decoded-but-unwanted tail.
pub struct StreamingDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    /// Stereo frames still to discard before start_ms is reached.
    skip_frames_remaining: usize,
    /// Stereo frame index (at native sample rate) where the passage ends;
    /// `None` means "decode to end of file".
    end_frame: Option<usize>,
    /// Stereo frames emitted so far (post-skip, pre-truncation count).
    frames_emitted: usize,
    eof: bool,
}

impl StreamingDecoder {
    /// Open `path` for streaming decode, trimmed to `[start_ms, end_ms)`.
    ///
    /// `end_ms == 0` means decode to end of file.
    pub fn new(path: &Path, start_ms: u64, end_ms: u64) -> Result<Self> {
        debug!(
            "Opening streaming decoder: {} ({}ms - {}ms)",
            path.display(),
            start_ms,
            end_ms
        );

        let file = std::fs::File::open(path).map_err(|e| Error::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension() {
            if let Some(ext_str) = extension.to_str() {
                hint.with_extension(ext_str);
            }
        }

        let format_opts = FormatOptions::default();
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        debug!(
            "Audio format: sample_rate={}, channels={}",
            sample_rate, channels
        );

        let decoder_opts = DecoderOptions::default();
        let decoder = get_codec_registry()
            .make(&codec_params, &decoder_opts)
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let skip_frames_remaining = ((start_ms * sample_rate as u64) / 1000) as usize;
        let end_frame = if end_ms == 0 {
            None
        } else {
            Some(((end_ms * sample_rate as u64) / 1000) as usize)
        };

        if let Some(end) = end_frame {
            if end <= skip_frames_remaining {
                return Err(Error::InvalidTiming(format!(
                    "Invalid passage timing: start={}ms, end={}ms",
                    start_ms, end_ms
                )));
            }
        }

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            skip_frames_remaining,
            end_frame,
            frames_emitted: 0,
            eof: false,
        })
    }

    /// Native sample rate of the source file, before resampling.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Native channel count of the source file.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Decode and return the next chunk of up to `chunk_frames` native-rate
    /// stereo frames. Returns `Ok(None)` once the passage's end time (or
    /// EOF) has been reached and no further data remains.
    pub fn decode_chunk(&mut self, chunk_frames: usize) -> Result<Option<Vec<f32>>> {
        if self.eof {
            return Ok(None);
        }

        let mut samples: Vec<f32> = Vec::new();

        while samples.len() / 2 < chunk_frames {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    self.eof = true;
                    break;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => Self::convert_samples_to_f32(&decoded, &mut samples),
                Err(e) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
            }
        }

        // Discard samples before start_ms.
        if self.skip_frames_remaining > 0 {
            let have_frames = samples.len() / 2;
            let drop_frames = have_frames.min(self.skip_frames_remaining);
            samples.drain(0..drop_frames * 2);
            self.skip_frames_remaining -= drop_frames;
        }

        // Truncate at end_ms.
        if let Some(end_frame) = self.end_frame {
            let frame_after_chunk = self.frames_emitted + samples.len() / 2;
            if frame_after_chunk >= end_frame {
                let allowed_frames = end_frame.saturating_sub(self.frames_emitted);
                samples.truncate(allowed_frames * 2);
                self.eof = true;
            }
        }

        self.frames_emitted += samples.len() / 2;

        if samples.is_empty() {
            return Ok(None);
        }

        Ok(Some(samples))
    }

    /// Convert symphonia AudioBufferRef to f32 samples.
    ///
    /// Handles various sample formats and normalizes to [-1.0, 1.0] range.
    fn convert_samples_to_f32(decoded: &AudioBufferRef, output: &mut Vec<f32>) {
        match decoded {
            AudioBufferRef::F32(buf) => {
                Self::interleave_planar_f32(buf, output);
            }
            AudioBufferRef::F64(buf) => {
                Self::interleave_planar_f64(buf, output);
            }
            AudioBufferRef::S32(buf) => {
                Self::interleave_planar_s32(buf, output);
            }
            AudioBufferRef::S16(buf) => {
                Self::interleave_planar_s16(buf, output);
            }
            AudioBufferRef::U32(buf) => {
                Self::interleave_planar_u32(buf, output);
            }
            AudioBufferRef::U16(buf) => {
                Self::interleave_planar_u16(buf, output);
            }
            AudioBufferRef::U8(buf) => {
                Self::interleave_planar_u8(buf, output);
            }
            AudioBufferRef::S24(buf) => {
                Self::interleave_planar_s24(buf, output);
            }
            AudioBufferRef::U24(buf) => {
                Self::interleave_planar_u24(buf, output);
            }
            AudioBufferRef::S8(buf) => {
                Self::interleave_planar_s8(buf, output);
            }
        }
    }

    fn interleave_planar_f32(buf: &symphonia::core::audio::AudioBuffer<f32>, output: &mut Vec<f32>) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                output.push(buf.chan(ch_idx)[frame_idx]);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    fn interleave_planar_f64(buf: &symphonia::core::audio::AudioBuffer<f64>, output: &mut Vec<f32>) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                output.push(buf.chan(ch_idx)[frame_idx] as f32);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    fn interleave_planar_s32(buf: &symphonia::core::audio::AudioBuffer<i32>, output: &mut Vec<f32>) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                let sample = buf.chan(ch_idx)[frame_idx];
                output.push(sample as f32 / i32::MAX as f32);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    fn interleave_planar_s16(buf: &symphonia::core::audio::AudioBuffer<i16>, output: &mut Vec<f32>) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                let sample = buf.chan(ch_idx)[frame_idx];
                output.push(sample as f32 / i16::MAX as f32);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    fn interleave_planar_u32(buf: &symphonia::core::audio::AudioBuffer<u32>, output: &mut Vec<f32>) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                let sample = buf.chan(ch_idx)[frame_idx];
                let signed = sample as i32;
                output.push(signed as f32 / i32::MAX as f32);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    fn interleave_planar_u16(buf: &symphonia::core::audio::AudioBuffer<u16>, output: &mut Vec<f32>) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                let sample = buf.chan(ch_idx)[frame_idx];
                let signed = (sample as i32) - 32768;
                output.push(signed as f32 / 32768.0);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    fn interleave_planar_u8(buf: &symphonia::core::audio::AudioBuffer<u8>, output: &mut Vec<f32>) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                let sample = buf.chan(ch_idx)[frame_idx];
                let signed = (sample as i32) - 128;
                output.push(signed as f32 / 128.0);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    fn interleave_planar_s24(
        buf: &symphonia::core::audio::AudioBuffer<symphonia::core::sample::i24>,
        output: &mut Vec<f32>,
    ) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                let sample = buf.chan(ch_idx)[frame_idx];
                let sample_i32 = sample.inner();
                output.push(sample_i32 as f32 / 8_388_608.0);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    fn interleave_planar_u24(
        buf: &symphonia::core::audio::AudioBuffer<symphonia::core::sample::u24>,
        output: &mut Vec<f32>,
    ) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                let sample = buf.chan(ch_idx)[frame_idx];
                let sample_u32 = sample.inner();
                let signed = (sample_u32 as i32) - 8_388_608;
                output.push(signed as f32 / 8_388_608.0);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    fn interleave_planar_s8(buf: &symphonia::core::audio::AudioBuffer<i8>, output: &mut Vec<f32>) {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                let sample = buf.chan(ch_idx)[frame_idx];
                output.push(sample as f32 / i8::MAX as f32);
            }
        }

        if num_channels == 1 {
            Self::mono_to_stereo(output);
        }
    }

    /// Convert mono samples to stereo by duplicating channel.
    ///
    /// Modifies the output vector in place: [L, L, L] -> [L, L, L, L, L, L]
    fn mono_to_stereo(samples: &mut Vec<f32>) {
        let original_len = samples.len();
        samples.reserve(original_len);

        for i in (0..original_len).rev() {
            let sample = samples[i];
            samples.insert(i + 1, sample);
        }
    }
}

/// Decode an entire audio file in one call, bypassing the chunked
/// [`StreamingDecoder`] state machine. Used by library-scan metadata
/// extraction, where the whole file is wanted at once.
pub fn decode_file(path: &PathBuf) -> Result<(Vec<f32>, u32, u16)> {
    let mut decoder = StreamingDecoder::new(path, 0, 0)?;
    let sample_rate = decoder.sample_rate();
    let channels = decoder.channels();

    const WHOLE_FILE_CHUNK_FRAMES: usize = 44_100;
    let mut samples = Vec::new();
    while let Some(chunk) = decoder.decode_chunk(WHOLE_FILE_CHUNK_FRAMES)? {
        samples.extend(chunk);
    }

    debug!(
        "Decoded {} samples ({} frames)",
        samples.len(),
        samples.len() / 2
    );

    Ok((samples, sample_rate, channels))
}
