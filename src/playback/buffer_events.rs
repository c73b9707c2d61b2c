//! Buffer lifecycle state and events used internally by [`BufferManager`](super::buffer_manager::BufferManager).

use std::time::Instant;
use uuid::Uuid;

/// Lifecycle state of a single decode chain's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Allocated, no samples written yet
    Empty,
    /// Below the ready threshold
    Filling,
    /// At or above the ready threshold, safe to start/continue playback
    Ready,
    /// Actively being read by the mixer
    Playing,
    /// Decode completed, all samples consumed
    Finished,
}

/// Per-buffer bookkeeping maintained by `BufferManager`.
#[derive(Debug, Clone)]
pub struct BufferMetadata {
    pub state: BufferState,
    pub file_path: Option<String>,
    pub source_sample_rate: Option<u32>,
    pub write_position: usize,
    pub read_position: usize,
    pub total_samples: Option<usize>,
    pub discovered_end_ticks: Option<i64>,
    pub ready_notified: bool,
    pub created_at: Instant,
    pub first_sample_at: Option<Instant>,
    pub ready_at: Option<Instant>,
    pub playing_at: Option<Instant>,
    pub decode_started_at: Option<Instant>,
    pub decode_completed_at: Option<Instant>,
}

impl BufferMetadata {
    pub fn new() -> Self {
        Self {
            state: BufferState::Empty,
            file_path: None,
            source_sample_rate: None,
            write_position: 0,
            read_position: 0,
            total_samples: None,
            discovered_end_ticks: None,
            ready_notified: false,
            created_at: Instant::now(),
            first_sample_at: None,
            ready_at: None,
            playing_at: None,
            decode_started_at: None,
            decode_completed_at: None,
        }
    }
}

impl Default for BufferMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferMetadata {
    /// Samples written but not yet consumed by the mixer.
    pub fn headroom(&self) -> usize {
        self.write_position.saturating_sub(self.read_position)
    }
}

/// Events broadcast by `BufferManager` as a buffer moves through its lifecycle.
#[derive(Debug, Clone)]
pub enum BufferEvent {
    /// Buffer transitioned between lifecycle states
    StateChanged {
        queue_entry_id: Uuid,
        old_state: BufferState,
        new_state: BufferState,
        samples_buffered: usize,
    },

    /// Buffer reached the ready threshold and can start playback
    ReadyForStart {
        queue_entry_id: Uuid,
        samples_buffered: usize,
        buffer_duration_ms: u64,
    },

    /// Decode discovered the passage's actual end position (e.g. after a seek or EOF)
    EndpointDiscovered {
        queue_entry_id: Uuid,
        actual_end_ticks: i64,
    },

    /// Buffer headroom dropped below the warning threshold while playing
    Exhausted {
        queue_entry_id: Uuid,
        headroom: usize,
    },

    /// Decoding finished and all samples have been written
    Finished {
        queue_entry_id: Uuid,
        total_samples: usize,
    },
}
