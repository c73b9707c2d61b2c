//! Event system for the audio player.
//!
//! WKMP uses hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many event broadcasting, consumed
//!   by the SSE handler.
//! - **Command channels** (tokio::mpsc): request -> single handler.
//! - **Shared state** (Arc<RwLock<T>>): read-heavy access.
//!
//! This module defines both the externally-visible [`WkmpEvent`] broadcast to
//! SSE clients and the internal mixer/decoder event types that never leave
//! the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Coarse playback state, as exposed over the API and in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Buffer fill state for a single decode chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStatus {
    Empty,
    Decoding,
    Ready,
    Underrun,
}

/// Where an enqueue request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueSource {
    Api,
    AutoSelection,
}

/// What triggered a queue contents change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueChangeTrigger {
    Enqueue,
    Dequeue,
    Reorder,
    PassageCompleted,
}

/// Why a passage stopped playing, carried on [`WkmpEvent::PassageCompleted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Played to its end (or handed off cleanly into a crossfade).
    Natural,
    /// Removed from the queue, or otherwise skipped, before it finished.
    Skipped,
    /// Phase 3 rejected the passage's timing immediately before decode.
    InvalidTiming,
    /// The decoder chain failed partway through.
    DecodeFailed,
    /// Dequeued via the API while not yet playing.
    Removed,
}

/// User-initiated action kinds carried on a handful of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserActionType {
    Play,
    Pause,
    Skip,
    Seek,
}

/// Events broadcast to SSE clients.
///
/// Scoped to what the audio player itself produces: playback lifecycle,
/// queue changes, volume, buffer health, and the error-band events a client
/// needs to show degraded-mode status. Events belonging to other WKMP
/// services (import sessions, taste/flavor selection, timeslots, library
/// scans, social actions) are out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WkmpEvent {
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: DateTime<Utc>,
    },
    PassageStarted {
        queue_entry_id: Uuid,
        passage_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },
    PassageCompleted {
        queue_entry_id: Uuid,
        passage_id: Option<Uuid>,
        reason: CompletionReason,
        timestamp: DateTime<Utc>,
    },
    CurrentSongChanged {
        queue_entry_id: Uuid,
        passage_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },
    PlaybackProgress {
        passage_id: Uuid,
        position_ms: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    QueueChanged {
        trigger: QueueChangeTrigger,
        queue_length: usize,
        timestamp: DateTime<Utc>,
    },
    QueueEmpty {
        timestamp: DateTime<Utc>,
    },
    VolumeChanged {
        volume: f32,
        action: Option<UserActionType>,
    },
    BufferStateChanged {
        queue_entry_id: Uuid,
        status: BufferStatus,
    },
    CrossfadeStarted {
        outgoing_queue_entry_id: Uuid,
        incoming_queue_entry_id: Uuid,
    },
    DecodeFailed {
        queue_entry_id: Uuid,
        reason: String,
    },
    UnsupportedCodec {
        queue_entry_id: Uuid,
        format: String,
    },
    BufferUnderrun {
        queue_entry_id: Uuid,
    },
    AudioDeviceLost,
    AudioDeviceRestored,
    ResamplingFailed {
        queue_entry_id: Uuid,
        reason: String,
    },
    TimingSystemFailure {
        reason: String,
    },
    DegradedMode {
        reason: String,
    },
    ShutdownRequired {
        reason: String,
    },
    WatchdogIntervention {
        total_interventions: u64,
    },
}

impl WkmpEvent {
    /// SSE `event:` field value for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            WkmpEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            WkmpEvent::PassageStarted { .. } => "PassageStarted",
            WkmpEvent::PassageCompleted { .. } => "PassageCompleted",
            WkmpEvent::CurrentSongChanged { .. } => "CurrentSongChanged",
            WkmpEvent::PlaybackProgress { .. } => "PlaybackProgress",
            WkmpEvent::QueueChanged { .. } => "QueueChanged",
            WkmpEvent::QueueEmpty { .. } => "QueueEmpty",
            WkmpEvent::VolumeChanged { .. } => "VolumeChanged",
            WkmpEvent::BufferStateChanged { .. } => "BufferStateChanged",
            WkmpEvent::CrossfadeStarted { .. } => "CrossfadeStarted",
            WkmpEvent::DecodeFailed { .. } => "DecodeFailed",
            WkmpEvent::UnsupportedCodec { .. } => "UnsupportedCodec",
            WkmpEvent::BufferUnderrun { .. } => "BufferUnderrun",
            WkmpEvent::AudioDeviceLost => "AudioDeviceLost",
            WkmpEvent::AudioDeviceRestored => "AudioDeviceRestored",
            WkmpEvent::ResamplingFailed { .. } => "ResamplingFailed",
            WkmpEvent::TimingSystemFailure { .. } => "TimingSystemFailure",
            WkmpEvent::DegradedMode { .. } => "DegradedMode",
            WkmpEvent::ShutdownRequired { .. } => "ShutdownRequired",
            WkmpEvent::WatchdogIntervention { .. } => "WatchdogIntervention",
        }
    }
}

/// Broadcast wrapper around a `tokio::sync::broadcast` channel of [`WkmpEvent`].
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WkmpEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WkmpEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Errors if there are currently no subscribers.
    pub fn emit(&self, event: WkmpEvent) -> Result<usize, broadcast::error::SendError<WkmpEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where there are no receivers.
    pub fn emit_lossy(&self, event: WkmpEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.tx.len().max(self.tx.receiver_count())
    }
}

/// Mixer state context carried on internal position events.
#[derive(Debug, Clone)]
pub enum MixerStateContext {
    /// Single passage playing, no crossfade active.
    Immediate,

    /// Crossfade in progress.
    Crossfading {
        /// Queue entry ID of the incoming passage.
        incoming_queue_entry_id: Uuid,
    },
}

/// Internal playback events, exchanged between the mixer and decoder worker.
///
/// Not serialized and never forwarded to SSE clients: one-to-one MPSC
/// pattern (mixer -> handler), non-blocking emission (`try_send` so the
/// audio thread never stalls on a full channel).
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// Position update from the mixer, at a configurable interval
    /// (database setting `position_event_interval_ms`, default 1000ms).
    PositionUpdate {
        queue_entry_id: Uuid,
        position_frames: usize,
        sample_rate: u32,
        state: MixerStateContext,
    },

    /// Mixer state changed, e.g. a crossfade started.
    StateChanged {
        queue_entry_id: Uuid,
        new_state: MixerStateContext,
    },
}
