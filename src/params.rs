//! Global parameter management.
//!
//! Centralizes the handful of database-backed parameters that affect timing
//! and buffer sizing, behind a single `PARAMS` singleton. Read-frequently,
//! write-rarely: readers never block each other.
//!
//! ```ignore
//! use crate::params::PARAMS;
//!
//! let sample_rate = *PARAMS.working_sample_rate.read().unwrap();
//! *PARAMS.working_sample_rate.write().unwrap() = 48000;
//! ```

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// Global parameters singleton, initialized with defaults and overwritten
/// from the database at startup.
pub static PARAMS: Lazy<GlobalParams> = Lazy::new(GlobalParams::default);

pub struct GlobalParams {
    /// Working sample rate for decoded audio, in Hz.
    ///
    /// Valid range: [8000, 192000]. Default: 44100.
    /// Affects every timing calculation, position tracking, and crossfade.
    pub working_sample_rate: RwLock<u32>,

    /// Max parallel decoder chains.
    ///
    /// Valid range: [1, 32]. Default: 12.
    pub maximum_decode_streams: RwLock<usize>,

    /// How often a decoder re-checks its priority, in ms.
    ///
    /// Valid range: [100, 60000]. Default: 5000.
    pub decode_work_period: RwLock<u64>,

    /// `PlayoutRingBuffer` capacity for each passage, in samples.
    ///
    /// Valid range: [44100, 10000000]. Default: 661941 (15.01s @ 44.1kHz).
    pub playout_ringbuffer_size: RwLock<usize>,

    /// Decoder pause threshold: pause when free space <= this, in samples.
    ///
    /// Valid range: [2205, 88200]. Default: 4410 (0.1s @ 44.1kHz).
    pub playout_ringbuffer_headroom: RwLock<usize>,

    /// Gap between pause and resume thresholds, preventing oscillation.
    /// Resume when free_space >= headroom + this value.
    ///
    /// Valid range: [2205, 441000]. Default: 44100 (1.0s @ 44.1kHz).
    pub decoder_resume_hysteresis_samples: RwLock<u64>,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            working_sample_rate: RwLock::new(44100),
            maximum_decode_streams: RwLock::new(12),
            decode_work_period: RwLock::new(5000),
            playout_ringbuffer_size: RwLock::new(661941),
            playout_ringbuffer_headroom: RwLock::new(4410),
            decoder_resume_hysteresis_samples: RwLock::new(44100),
        }
    }
}

impl GlobalParams {
    /// Load parameter values from the settings table, logging and falling
    /// back to the default on any missing key, type mismatch, or
    /// out-of-range value rather than failing startup.
    pub async fn init_from_database(
        db_pool: &sqlx::SqlitePool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Self::load_u32(db_pool, "working_sample_rate", &PARAMS.working_sample_rate, 8000, 192000).await;
        Self::load_usize(db_pool, "maximum_decode_streams", &PARAMS.maximum_decode_streams, 1, 32).await;
        Self::load_u64(db_pool, "decode_work_period", &PARAMS.decode_work_period, 100, 60000).await;
        Self::load_usize(
            db_pool,
            "playout_ringbuffer_size",
            &PARAMS.playout_ringbuffer_size,
            44100,
            10_000_000,
        )
        .await;
        Self::load_usize(
            db_pool,
            "playout_ringbuffer_headroom",
            &PARAMS.playout_ringbuffer_headroom,
            2205,
            88200,
        )
        .await;
        Self::load_u64(
            db_pool,
            "decoder_resume_hysteresis_samples",
            &PARAMS.decoder_resume_hysteresis_samples,
            2205,
            441_000,
        )
        .await;

        Ok(())
    }

    async fn load_u32(db: &sqlx::SqlitePool, key: &str, slot: &RwLock<u32>, min: u32, max: u32) {
        match Self::fetch_setting(db, key).await {
            Some(raw) => match raw.parse::<u32>() {
                Ok(v) if v >= min && v <= max => *slot.write().unwrap() = v,
                Ok(v) => tracing::warn!("{key}={v} out of range [{min}, {max}], using default"),
                Err(_) => tracing::warn!("{key}={raw:?} is not a valid u32, using default"),
            },
            None => tracing::debug!("{key} not set, using default"),
        }
    }

    async fn load_usize(db: &sqlx::SqlitePool, key: &str, slot: &RwLock<usize>, min: usize, max: usize) {
        match Self::fetch_setting(db, key).await {
            Some(raw) => match raw.parse::<usize>() {
                Ok(v) if v >= min && v <= max => *slot.write().unwrap() = v,
                Ok(v) => tracing::warn!("{key}={v} out of range [{min}, {max}], using default"),
                Err(_) => tracing::warn!("{key}={raw:?} is not a valid usize, using default"),
            },
            None => tracing::debug!("{key} not set, using default"),
        }
    }

    async fn load_u64(db: &sqlx::SqlitePool, key: &str, slot: &RwLock<u64>, min: u64, max: u64) {
        match Self::fetch_setting(db, key).await {
            Some(raw) => match raw.parse::<u64>() {
                Ok(v) if v >= min && v <= max => *slot.write().unwrap() = v,
                Ok(v) => tracing::warn!("{key}={v} out of range [{min}, {max}], using default"),
                Err(_) => tracing::warn!("{key}={raw:?} is not a valid u64, using default"),
            },
            None => tracing::debug!("{key} not set, using default"),
        }
    }

    async fn fetch_setting(db: &sqlx::SqlitePool, key: &str) -> Option<String> {
        sqlx::query_as::<_, (String,)>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await
            .ok()
            .flatten()
            .map(|(v,)| v)
    }
}
