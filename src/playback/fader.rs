//! Tick-accurate fade-in/fade-out application.
//!
//! # Timing Points
//!
//! - **Start**: Passage begins (silence before)
//! - **Fade-In**: Volume ramp starts
//! - **Lead-In**: Full volume begins
//! - **Lead-Out**: Fade-out begins
//! - **Fade-Out**: Volume ramp to zero starts
//! - **End**: Passage ends (silence after)
//!
//! Used by [`crate::playback::decoder_chain::DecoderChain`] to apply fades to
//! decoded/resampled audio before it reaches the buffer.

use crate::fade_curves::FadeCurve;
use crate::Result;

/// Applies fade-in/fade-out curves to a passage's samples based on
/// tick-based position, advancing its own position across calls.
///
/// # Examples
///
/// ```ignore
/// let mut fader = Fader::new(
///     0,                  // passage_start_ticks
///     0,                  // fade_in_start_ticks
///     28_224_000,         // lead_in_start_ticks (1 second)
///     282_240_000,        // lead_out_start_ticks (10 seconds)
///     282_240_000,        // fade_out_start_ticks
///     310_464_000,        // passage_end_ticks (11 seconds)
///     FadeCurve::Squared,
///     FadeCurve::Squared,
///     44100,
/// );
///
/// let mut samples = vec![1.0f32; 8];  // 4 stereo samples
/// fader.apply_fade(&mut samples)?;
/// ```
pub struct Fader {
    /// Passage start in ticks
    passage_start_ticks: i64,

    /// Fade-in start in ticks
    fade_in_start_ticks: i64,

    /// Lead-in start in ticks (full volume begins)
    lead_in_start_ticks: i64,

    /// Lead-out start in ticks (fade-out begins)
    lead_out_start_ticks: i64,

    /// Fade-out start in ticks
    fade_out_start_ticks: i64,

    /// Passage end in ticks
    passage_end_ticks: i64,

    /// Fade-in curve type
    fade_in_curve: FadeCurve,

    /// Fade-out curve type
    fade_out_curve: FadeCurve,

    /// Current position in ticks
    position_ticks: i64,

    /// Working sample rate (for tick to sample conversion)
    sample_rate: u32,
}

impl Fader {
    /// Create new fader with timing points
    ///
    /// # Arguments
    ///
    /// * `passage_start_ticks` - Passage start (silence before)
    /// * `fade_in_start_ticks` - Fade-in begins
    /// * `lead_in_start_ticks` - Full volume begins
    /// * `lead_out_start_ticks` - Fade-out begins
    /// * `fade_out_start_ticks` - Volume ramp to zero begins
    /// * `passage_end_ticks` - Passage ends (silence after)
    /// * `fade_in_curve` - Curve type for fade-in
    /// * `fade_out_curve` - Curve type for fade-out
    /// * `sample_rate` - Working sample rate (typically 44100)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        passage_start_ticks: i64,
        fade_in_start_ticks: i64,
        lead_in_start_ticks: i64,
        lead_out_start_ticks: i64,
        fade_out_start_ticks: i64,
        passage_end_ticks: i64,
        fade_in_curve: FadeCurve,
        fade_out_curve: FadeCurve,
        sample_rate: u32,
    ) -> Self {
        Self {
            passage_start_ticks,
            fade_in_start_ticks,
            lead_in_start_ticks,
            lead_out_start_ticks,
            fade_out_start_ticks,
            passage_end_ticks,
            fade_in_curve,
            fade_out_curve,
            position_ticks: passage_start_ticks,
            sample_rate,
        }
    }

    /// Apply fade to audio samples in-place
    ///
    /// Modifies samples based on current position and fade curves.
    /// Advances position by sample count.
    ///
    /// # Arguments
    ///
    /// * `samples` - Interleaved stereo f32 samples [L, R, L, R, ...]
    pub fn apply_fade(&mut self, samples: &mut [f32]) -> Result<()> {
        if samples.len() % 2 != 0 {
            return Err(crate::Error::InvalidSampleCount(samples.len()));
        }

        let frames = samples.len() / 2;
        let ticks_per_sample = crate::timing::ticks_per_sample(self.sample_rate);

        for frame_idx in 0..frames {
            let frame_ticks = self.position_ticks + (frame_idx as i64 * ticks_per_sample);
            let multiplier = self.calculate_multiplier(frame_ticks);

            samples[frame_idx * 2] *= multiplier;
            samples[frame_idx * 2 + 1] *= multiplier;
        }

        self.position_ticks += frames as i64 * ticks_per_sample;

        Ok(())
    }

    /// Calculate fade multiplier (0.0 to 1.0) for given tick position
    fn calculate_multiplier(&self, ticks: i64) -> f32 {
        if ticks < self.passage_start_ticks {
            return 0.0;
        }

        if ticks >= self.passage_end_ticks {
            return 0.0;
        }

        // Fade-in region
        if ticks < self.lead_in_start_ticks {
            let fade_start = self.fade_in_start_ticks;
            let fade_end = self.lead_in_start_ticks;
            let fade_duration = fade_end - fade_start;

            if fade_duration <= 0 {
                return 1.0;
            }

            let progress = (ticks - fade_start) as f64 / fade_duration as f64;
            let progress = progress.clamp(0.0, 1.0) as f32;

            return self.fade_in_curve.fade_in(progress);
        }

        // Lead-out region (full volume)
        if ticks < self.lead_out_start_ticks {
            return 1.0;
        }

        // Fade-out region
        if ticks < self.passage_end_ticks {
            let fade_start = self.fade_out_start_ticks;
            let fade_end = self.passage_end_ticks;
            let fade_duration = fade_end - fade_start;

            if fade_duration <= 0 {
                return 1.0;
            }

            let progress = (ticks - fade_start) as f64 / fade_duration as f64;
            let progress = progress.clamp(0.0, 1.0) as f32;

            return self.fade_out_curve.fade_out(progress);
        }

        0.0
    }

    /// Get current position in ticks
    pub fn position_ticks(&self) -> i64 {
        self.position_ticks
    }

    /// Seek to specific tick position
    pub fn seek(&mut self, ticks: i64) {
        self.position_ticks = ticks;
    }
}
