//! Fade curve families used for crossfade envelopes.
//!
//! Each curve has an independent fade-in and fade-out formula; passages select
//! one curve for fade-in and (usually the paired) curve for fade-out.

use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

/// Fade curve families.
///
/// - `Linear`: constant rate of change.
/// - `Squared`: slow-start fade-in (`t²`), fast-start fade-out (`(1-t)²`).
/// - `CosineS`: smooth S-shaped acceleration/deceleration.
/// - `EqualPower`: constant perceived loudness during a crossfade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FadeCurve {
    Linear,
    Squared,
    CosineS,
    EqualPower,
}

impl FadeCurve {
    /// Fade-in multiplier at normalized position `t` in `[0.0, 1.0]`.
    ///
    /// Returns 0.0 at `t=0.0` and 1.0 at `t=1.0`.
    pub fn fade_in(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => t,
            FadeCurve::Squared => t * t,
            FadeCurve::CosineS => 0.5 * (1.0 - (std::f32::consts::PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Fade-out multiplier at normalized position `t` in `[0.0, 1.0]`.
    ///
    /// Returns 1.0 at `t=0.0` and 0.0 at `t=1.0`.
    pub fn fade_out(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Squared => {
                let inv = 1.0 - t;
                inv * inv
            }
            FadeCurve::CosineS => 0.5 * (1.0 + (std::f32::consts::PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos(),
        }
    }

    /// Parse a curve from its database string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Some(FadeCurve::Linear),
            "squared" | "exponential" | "logarithmic" => Some(FadeCurve::Squared),
            "cosine" | "cosine_s" | "scurve" | "s_curve" | "s-curve" => Some(FadeCurve::CosineS),
            "equal_power" | "equalpower" => Some(FadeCurve::EqualPower),
            _ => None,
        }
    }

    /// Canonical database string representation.
    pub fn to_db_string(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "linear",
            FadeCurve::Squared => "squared",
            FadeCurve::CosineS => "cosine",
            FadeCurve::EqualPower => "equal_power",
        }
    }
}

impl Default for FadeCurve {
    fn default() -> Self {
        FadeCurve::Squared
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
