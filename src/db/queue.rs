//! Playback queue persistence model.

use serde::{Deserialize, Serialize};

/// A single entry in the playback queue, as stored in the `queue` table.
///
/// Timing fields are optional: when absent, the passage plays in full with
/// no fade/lead points and boundaries taken from the underlying file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueEntry {
    pub guid: String,
    pub file_path: String,
    pub passage_guid: Option<String>,
    pub play_order: i64,
    pub start_time_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
    pub lead_in_point_ms: Option<i64>,
    pub lead_out_point_ms: Option<i64>,
    pub fade_in_point_ms: Option<i64>,
    pub fade_out_point_ms: Option<i64>,
    pub fade_in_curve: Option<String>,
    pub fade_out_curve: Option<String>,
}
