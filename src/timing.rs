//! Tick-based timing for sample-accurate audio positioning.
//!
//! WKMP-AP uses a unified tick rate of 28,224,000 Hz, the LCM of every
//! supported audio sample rate (8 kHz through 192 kHz). This makes
//! tick-to-sample conversion exact for every rate, with zero rounding error.
//!
//! Three time representations are used across the system:
//! - **Ticks** (`i64`, 28,224,000 Hz): persisted and passed across the
//!   engine's internal command/event boundary.
//! - **Milliseconds** (`u64`): the HTTP/SSE API boundary, translated to/from
//!   ticks at the outermost edge.
//! - **Samples** (`usize`, `working_sample_rate` Hz): used inside the
//!   decode/resample/fade/mix pipeline.

/// Tick rate: 28,224,000 Hz. LCM of all supported sample rates.
pub const TICK_RATE: i64 = 28_224_000;

/// Ticks per millisecond: 28,224. `ticks = milliseconds * TICKS_PER_MS`.
pub const TICKS_PER_MS: i64 = 28_224;

/// Ticks-per-sample lookup table for the common sample rates.
///
/// Rates outside this table fall back to `TICK_RATE / sample_rate`.
pub const TICKS_PER_SAMPLE_TABLE: [(u32, i64); 11] = [
    (8000, 3528),
    (11025, 2560),
    (16000, 1764),
    (22050, 1280),
    (32000, 882),
    (44100, 640),
    (48000, 588),
    (88200, 320),
    (96000, 294),
    (176400, 160),
    (192000, 147),
];

/// Convert milliseconds to ticks. Exact: `ticks = milliseconds * 28_224`.
pub fn ms_to_ticks(milliseconds: i64) -> i64 {
    milliseconds * TICKS_PER_MS
}

/// Convert ticks to milliseconds, truncating. Max rounding error ~0.035ms.
pub fn ticks_to_ms(ticks: i64) -> i64 {
    ticks / TICKS_PER_MS
}

/// Convert ticks to samples at `sample_rate`. Exact for every supported rate.
///
/// Panics if `sample_rate` is 0.
pub fn ticks_to_samples(ticks: i64, sample_rate: u32) -> usize {
    assert!(sample_rate > 0, "sample_rate must be > 0");
    ((ticks * sample_rate as i64) / TICK_RATE) as usize
}

/// Convert samples to ticks at `sample_rate`. Exact for every supported rate.
///
/// Panics if `sample_rate` is 0.
pub fn samples_to_ticks(samples: usize, sample_rate: u32) -> i64 {
    assert!(sample_rate > 0, "sample_rate must be > 0");
    samples as i64 * (TICK_RATE / sample_rate as i64)
}

/// Convert ticks to seconds (lossy, for display/logging only).
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICK_RATE as f64
}

/// Convert seconds to ticks, rounding to the nearest tick (lossy).
pub fn seconds_to_ticks(seconds: f64) -> i64 {
    (seconds * TICK_RATE as f64).round() as i64
}

/// Ticks per sample at `sample_rate`: table lookup, falling back to division.
///
/// Panics if `sample_rate` is 0.
pub fn ticks_per_sample(sample_rate: u32) -> i64 {
    assert!(sample_rate > 0, "sample_rate must be > 0");
    if let Some(&(_, ticks)) = TICKS_PER_SAMPLE_TABLE.iter().find(|(rate, _)| *rate == sample_rate) {
        return ticks;
    }
    TICK_RATE / sample_rate as i64
}

/// A passage's six timing points, in milliseconds (HTTP API representation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassageTimingMs {
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub fade_in_point_ms: u64,
    pub fade_out_point_ms: u64,
    pub lead_in_point_ms: u64,
    pub lead_out_point_ms: u64,
}

/// A passage's six timing points, in ticks (internal/database representation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassageTimingTicks {
    pub start_time_ticks: i64,
    pub end_time_ticks: i64,
    pub fade_in_point_ticks: i64,
    pub fade_out_point_ticks: i64,
    pub lead_in_point_ticks: i64,
    pub lead_out_point_ticks: i64,
}

impl From<PassageTimingMs> for PassageTimingTicks {
    fn from(ms: PassageTimingMs) -> Self {
        PassageTimingTicks {
            start_time_ticks: ms_to_ticks(ms.start_time_ms as i64),
            end_time_ticks: ms_to_ticks(ms.end_time_ms as i64),
            fade_in_point_ticks: ms_to_ticks(ms.fade_in_point_ms as i64),
            fade_out_point_ticks: ms_to_ticks(ms.fade_out_point_ms as i64),
            lead_in_point_ticks: ms_to_ticks(ms.lead_in_point_ms as i64),
            lead_out_point_ticks: ms_to_ticks(ms.lead_out_point_ms as i64),
        }
    }
}

impl From<PassageTimingTicks> for PassageTimingMs {
    fn from(ticks: PassageTimingTicks) -> Self {
        PassageTimingMs {
            start_time_ms: ticks_to_ms(ticks.start_time_ticks) as u64,
            end_time_ms: ticks_to_ms(ticks.end_time_ticks) as u64,
            fade_in_point_ms: ticks_to_ms(ticks.fade_in_point_ticks) as u64,
            fade_out_point_ms: ticks_to_ms(ticks.fade_out_point_ticks) as u64,
            lead_in_point_ms: ticks_to_ms(ticks.lead_in_point_ticks) as u64,
            lead_out_point_ms: ticks_to_ms(ticks.lead_out_point_ticks) as u64,
        }
    }
}

/// True if a millisecond value survives a ms -> ticks -> ms roundtrip exactly.
pub fn validate_tick_conversion(original_ms: u64) -> bool {
    let ticks = ms_to_ticks(original_ms as i64);
    ticks_to_ms(ticks) == original_ms as i64
}

/// Maximum roundtrip error in nanoseconds for a ms value, always < 35,000ns.
pub fn max_roundtrip_error_ns(ms: u64) -> f64 {
    let ticks = ms_to_ticks(ms as i64);
    let roundtrip_ms = ticks_to_ms(ticks);
    (ms as i64 - roundtrip_ms).abs() as f64 * 1_000_000.0
}
