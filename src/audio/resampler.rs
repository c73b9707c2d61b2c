//! Audio resampling using rubato.
//!
//! Converts audio to the working sample rate for playback.

use crate::error::{Error, Result};
use rubato::{
    FastFixedIn, Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Standard output sample rate for all audio
///
/// Reserved for future configuration flexibility.
#[allow(dead_code)]
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Stateful audio resampler that maintains filter state across chunks
///
/// Prevents phase discontinuities by reusing the same rubato resampler instance
/// across multiple chunk processing calls. This is critical for high-quality
/// streaming audio where chunks are processed sequentially.
///
/// **Architecture:** Used in the new single-threaded decoder pipeline to ensure
/// seamless resampling across chunk boundaries.
pub enum StatefulResampler {
    /// No resampling needed (input rate == output rate)
    ///
    /// Simply copies input to output without processing.
    ///
    /// **Phase 4:** Channels field reserved for future multi-channel support beyond stereo
    PassThrough {
        #[allow(dead_code)]
        channels: u16
    },

    /// Active resampling with maintained filter state
    ///
    /// Reuses the same rubato resampler instance to preserve filter state.
    ///
    /// **Phase 4:** Rate/channel/chunk fields reserved for future telemetry and diagnostics
    Active {
        resampler: FastFixedIn<f32>,
        #[allow(dead_code)]
        input_rate: u32,
        #[allow(dead_code)]
        output_rate: u32,
        channels: u16,
        #[allow(dead_code)]
        chunk_size: usize,
    },
}

impl StatefulResampler {
    /// Create a new stateful resampler
    ///
    /// # Arguments
    /// * `input_rate` - Input sample rate (e.g., 48000 Hz)
    /// * `output_rate` - Output sample rate (typically 44100 Hz)
    /// * `channels` - Number of channels (typically 2 for stereo)
    /// * `chunk_size` - Expected chunk size in frames (for pre-allocation)
    ///
    /// # Returns
    /// Resampler instance (either PassThrough or Active based on rates)
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        channels: u16,
        chunk_size: usize,
    ) -> Result<Self> {
        if input_rate == output_rate {
            debug!(
                "Creating pass-through resampler ({}Hz, {} channels)",
                input_rate, channels
            );
            Ok(Self::PassThrough { channels })
        } else {
            debug!(
                "Creating stateful resampler: {}Hz -> {}Hz ({} channels, chunk_size={})",
                input_rate, output_rate, channels, chunk_size
            );
            let resampler = Resampler::create_resampler(
                input_rate,
                output_rate,
                channels,
                chunk_size,
            )?;
            Ok(Self::Active {
                resampler,
                input_rate,
                output_rate,
                channels,
                chunk_size,
            })
        }
    }

    /// Process a chunk of audio, maintaining filter state
    ///
    /// # Arguments
    /// * `input` - Interleaved audio samples to process
    ///
    /// # Returns
    /// Resampled audio at output rate (or copy if pass-through)
    ///
    /// # Notes
    /// - Filter state is preserved between calls for seamless streaming
    /// - **Input chunk size must match the chunk_size specified in `new()`** for Active resamplers
    /// - PassThrough mode accepts any chunk size
    pub fn process_chunk(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        match self {
            Self::PassThrough { .. } => {
                // No resampling needed, just copy
                Ok(input.to_vec())
            }
            Self::Active {
                resampler,
                channels,
                ..
            } => {
                // De-interleave samples for rubato
                let planar_input = Resampler::deinterleave(input, *channels);

                // Process through stateful resampler
                let planar_output = resampler
                    .process(&planar_input, None)
                    .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

                // Re-interleave output
                Ok(Resampler::interleave(planar_output))
            }
        }
    }

    /// Check if this resampler is in pass-through mode
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough { .. })
    }

    /// Get the output rate for this resampler
    ///
    /// **Phase 4:** Output rate accessor reserved for future telemetry and diagnostics
    #[allow(dead_code)]
    pub fn output_rate(&self) -> u32 {
        match self {
            Self::PassThrough { .. } => TARGET_SAMPLE_RATE,
            Self::Active { output_rate, .. } => *output_rate,
        }
    }

    /// Get the input rate for this resampler
    ///
    /// **Phase 4:** Input rate accessor reserved for future telemetry and diagnostics
    #[allow(dead_code)]
    pub fn input_rate(&self) -> u32 {
        match self {
            Self::PassThrough { .. } => TARGET_SAMPLE_RATE,
            Self::Active { input_rate, .. } => *input_rate,
        }
    }
}

/// Audio resampler using rubato for high-quality sample rate conversion.
///
/// **Note:** For streaming use cases, prefer `StatefulResampler` to maintain
/// filter state across chunks and avoid phase discontinuities.
pub struct Resampler;

impl Resampler {
    /// Resample audio to target sample rate (44.1kHz).
    ///
    /// All audio normalized to 44.1kHz for consistent playback.
    ///
    /// # Arguments
    /// - `input`: Interleaved audio samples
    /// - `input_rate`: Input sample rate
    /// - `channels`: Number of channels (typically 2 for stereo)
    ///
    /// # Returns
    /// Resampled interleaved audio at 44.1kHz
    ///
    /// # Notes
    /// If input is already at 44.1kHz, returns a copy without resampling
    ///
    /// **Phase 4:** One-shot resampling reserved for future features (superseded by StatefulResampler)
    #[allow(dead_code)]
    pub fn resample(input: &[f32], input_rate: u32, channels: u16) -> Result<Vec<f32>> {
        let output_rate = TARGET_SAMPLE_RATE;

        // If already at target rate, return copy
        if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(input.to_vec());
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );

        // De-interleave samples for rubato (which expects planar format)
        let planar_input = Self::deinterleave(input, channels);

        // Calculate the number of frames in the input
        let input_frames = planar_input[0].len();

        // Create resampler
        let mut resampler = Self::create_resampler(input_rate, output_rate, channels, input_frames)?;

        // Resample each channel
        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        // Re-interleave samples
        let interleaved_output = Self::interleave(planar_output);

        debug!(
            "Resampled {} input frames to {} output frames",
            input_frames,
            interleaved_output.len() / channels as usize
        );

        Ok(interleaved_output)
    }

    /// Create a rubato resampler.
    ///
    /// Uses FastFixedIn for efficiency (good quality/performance tradeoff).
    /// For highest quality, could use SincFixedIn but with higher CPU cost.
    ///
    /// Returns `ResamplingInitFailed` on initialization errors.
    fn create_resampler(
        input_rate: u32,
        output_rate: u32,
        channels: u16,
        chunk_size: usize,
    ) -> Result<FastFixedIn<f32>> {
        // Use FastFixedIn for good quality and efficiency
        // Alternative: SincFixedIn for highest quality (slower)
        let resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0, // max_relative_ratio (no runtime changes)
            rubato::PolynomialDegree::Septic, // High quality polynomial
            chunk_size,
            channels as usize,
        )
        .map_err(|e| Error::ResamplingInitFailed {
            source_rate: input_rate,
            target_rate: output_rate,
            message: format!("Failed to create resampler: {}", e),
        })?;

        Ok(resampler)
    }

    /// Create a high-quality sinc resampler (alternative to FastFixedIn).
    ///
    /// This provides the highest quality but is more CPU intensive.
    /// Currently not used, but available for future quality improvements.
    #[allow(dead_code)]
    fn create_sinc_resampler(
        input_rate: u32,
        output_rate: u32,
        channels: u16,
        chunk_size: usize,
    ) -> Result<SincFixedIn<f32>> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            params,
            chunk_size,
            channels as usize,
        )
        .map_err(|e| Error::Decode(format!("Failed to create sinc resampler: {}", e)))?;

        Ok(resampler)
    }

    /// Convert interleaved samples to planar format.
    ///
    /// Input:  [L, R, L, R, L, R, ...]
    /// Output: [[L, L, L, ...], [R, R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;

        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                let sample = samples[frame_idx * num_channels + ch_idx];
                planar[ch_idx].push(sample);
            }
        }

        planar
    }

    /// Convert planar samples to interleaved format.
    ///
    /// Input:  [[L, L, L, ...], [R, R, R, ...]]
    /// Output: [L, R, L, R, L, R, ...]
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        if planar.is_empty() {
            return Vec::new();
        }

        let num_channels = planar.len();
        let num_frames = planar[0].len();
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);

        for frame_idx in 0..num_frames {
            for ch_idx in 0..num_channels {
                interleaved.push(planar[ch_idx][frame_idx]);
            }
        }

        interleaved
    }
}
