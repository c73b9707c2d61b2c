//! Shared playback state
//!
//! Thread-safe shared state for playback coordination between components.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::events::{PlaybackState, WkmpEvent};

/// Current passage information
#[derive(Debug, Clone)]
pub struct CurrentPassage {
    /// Queue entry ID
    pub queue_entry_id: Uuid,
    /// Passage ID (may be None for ephemeral passages)
    pub passage_id: Option<Uuid>,
    /// Current position in milliseconds
    pub position_ms: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
}

/// Shared state accessible by all components
///
/// Uses RwLock for concurrent read access with rare writes
///
/// **Traceability:** CO-145 (Appropriate mutex selection for async)
pub struct SharedState {
    /// Current playback state (Playing or Paused)
    pub playback_state: RwLock<PlaybackState>,

    /// Currently playing passage (None if queue empty)
    pub current_passage: RwLock<Option<CurrentPassage>>,

    /// Master volume (0.0-1.0, system-level scale)
    pub volume: RwLock<f32>,

    /// Event broadcaster for SSE events
    pub event_tx: broadcast::Sender<WkmpEvent>,

    /// Count of times the watchdog had to intervene after an event system failure.
    pub watchdog_interventions_total: AtomicU64,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100); // Buffer up to 100 events
        Self {
            playback_state: RwLock::new(PlaybackState::Playing), // Default to Playing on startup
            current_passage: RwLock::new(None),
            volume: RwLock::new(0.75), // Default 75% volume
            event_tx,
            watchdog_interventions_total: AtomicU64::new(0),
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: WkmpEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<WkmpEvent> {
        self.event_tx.subscribe()
    }

    /// Get current playback state
    pub async fn get_playback_state(&self) -> PlaybackState {
        *self.playback_state.read().await
    }

    /// Set playback state
    pub async fn set_playback_state(&self, state: PlaybackState) {
        *self.playback_state.write().await = state;
    }

    /// Get current passage information
    pub async fn get_current_passage(&self) -> Option<CurrentPassage> {
        self.current_passage.read().await.clone()
    }

    /// Set current passage
    pub async fn set_current_passage(&self, passage: Option<CurrentPassage>) {
        *self.current_passage.write().await = passage;
    }

    /// Get master volume (0.0-1.0)
    pub async fn get_volume(&self) -> f32 {
        *self.volume.read().await
    }

    /// Set master volume (0.0-1.0)
    pub async fn set_volume(&self, volume: f32) {
        *self.volume.write().await = volume.clamp(0.0, 1.0);
    }

    /// Record a watchdog intervention.
    pub fn increment_watchdog_interventions(&self) {
        self.watchdog_interventions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Total watchdog interventions since startup.
    pub fn get_watchdog_interventions(&self) -> u64 {
        self.watchdog_interventions_total.load(Ordering::Relaxed)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
