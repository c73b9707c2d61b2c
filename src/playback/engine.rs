//! Playback engine: ties together the queue, decoder-buffer-decoder pipeline,
//! mixer, and audio output into the single object the API layer drives.

use crate::audio::AudioOutput;
use crate::audio::types::AudioFrame;
use crate::db::passages::{create_ephemeral_passage, get_passage_with_timing, PassageWithTiming};
use crate::error::{Error, Result};
use crate::playback::buffer_manager::BufferManager;
use crate::playback::decoder_worker::DecoderWorker;
use crate::playback::mixer::{Mixer, MixerState, MarkerEvent, PositionMarker};
use crate::playback::queue::QueueManager;
use crate::playback::ring_buffer::AudioRingBuffer;
use crate::playback::types::DecodePriority;
use crate::state::SharedState;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Target working sample rate, matching `crate::audio::resampler::TARGET_SAMPLE_RATE`.
const WORKING_SAMPLE_RATE: u32 = 44_100;

/// Number of stereo frames pulled from the mixer per fill iteration.
const MIX_CHUNK_FRAMES: usize = 512;

/// Playback transport state exposed over the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Body of `POST /playback/enqueue`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub file_path: String,
    pub passage_id: Option<Uuid>,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
}

/// A single entry as returned by `GET /playback/queue` and the enqueue response.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntryInfo {
    pub queue_entry_id: Uuid,
    pub passage_id: Option<Uuid>,
    pub play_order: i64,
    pub file_path: String,
    pub timing_override: Option<serde_json::Value>,
}

/// Snapshot returned by `GET /playback/position`.
#[derive(Debug, Clone)]
pub struct PositionInfo {
    pub passage_id: Option<Uuid>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub state: PlaybackState,
}

struct ActivePlayback {
    queue_entry_id: Uuid,
    passage_id: Option<Uuid>,
    duration_ms: u64,
    timing: PassageWithTiming,
}

/// Bookkeeping for a crossfade that has been scheduled (markers placed on the
/// mixer and the incoming passage's decode submitted) but has not yet started.
///
/// Lets [`PlaybackEngine::complete_crossfade_transition`] promote the incoming
/// passage to "current" without re-deriving its timing or resubmitting decode.
struct PendingCrossfade {
    next_queue_entry_id: Uuid,
    next_passage: PassageWithTiming,
    /// Tick (absolute, within the incoming passage's own file) at which its
    /// consumption begins once the crossfade starts.
    next_start_tick: i64,
    /// Tick (in the outgoing passage's timeline) at which the crossfade began.
    marker_tick: i64,
    /// Set once the StartCrossfade marker has fired and the incoming buffer
    /// was ready, i.e. the mixer is actually running in crossfade mode.
    active: bool,
}

pub struct PlaybackEngine {
    db_pool: Pool<Sqlite>,
    shared_state: Arc<SharedState>,
    root_folder: PathBuf,

    queue_manager: Arc<RwLock<QueueManager>>,
    buffer_manager: Arc<BufferManager>,
    decoder_worker: Arc<DecoderWorker>,
    mixer: Arc<Mutex<Mixer>>,

    working_sample_rate: Arc<StdRwLock<u32>>,
    current: RwLock<Option<ActivePlayback>>,
    pending_crossfade: RwLock<Option<PendingCrossfade>>,
    running: AtomicBool,
    decoder_handle: Mutex<Option<JoinHandle<()>>>,
    mixer_handle: Mutex<Option<JoinHandle<()>>>,
    progress_handle: Mutex<Option<JoinHandle<()>>>,
    audio_output: Mutex<Option<AudioOutput>>,
}

impl PlaybackEngine {
    /// Construct the engine. Does not start the decoder worker, mixer loop,
    /// or audio output device; call [`PlaybackEngine::start`] for that.
    pub async fn new(db_pool: Pool<Sqlite>, shared_state: Arc<SharedState>) -> Result<Self> {
        Self::with_root_folder(db_pool, shared_state, PathBuf::from(".")).await
    }

    pub async fn with_root_folder(
        db_pool: Pool<Sqlite>,
        shared_state: Arc<SharedState>,
        root_folder: PathBuf,
    ) -> Result<Self> {
        let queue_manager = QueueManager::new(db_pool.clone(), root_folder.clone());
        queue_manager.init().await.map_err(Error::Other)?;
        let queue_manager = Arc::new(RwLock::new(queue_manager));

        let buffer_manager = Arc::new(BufferManager::new());
        let working_sample_rate = Arc::new(StdRwLock::new(WORKING_SAMPLE_RATE));

        let decoder_worker = Arc::new(DecoderWorker::new(
            Arc::clone(&buffer_manager),
            Arc::clone(&shared_state),
            db_pool.clone(),
            Arc::clone(&working_sample_rate),
            Arc::clone(&queue_manager),
        ));

        let volume = shared_state.get_volume().await;
        let mixer = Arc::new(Mutex::new(Mixer::new(volume)));

        Ok(Self {
            db_pool,
            shared_state,
            root_folder,
            queue_manager,
            buffer_manager,
            decoder_worker,
            mixer,
            working_sample_rate,
            current: RwLock::new(None),
            pending_crossfade: RwLock::new(None),
            running: AtomicBool::new(false),
            decoder_handle: Mutex::new(None),
            mixer_handle: Mutex::new(None),
            progress_handle: Mutex::new(None),
            audio_output: Mutex::new(None),
        })
    }

    /// Start the decoder worker, open the audio output device, and begin
    /// advancing the queue.
    ///
    /// Takes `Arc<Self>` because the mixer loop and the progress ticker both
    /// call back into engine methods (queue advancement, crossfade handoff)
    /// from their own spawned tasks.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        *self.decoder_handle.lock().await = Some(Arc::clone(&self.decoder_worker).start());

        let sample_rate = *self.working_sample_rate.read().unwrap();
        let audio_expected = Arc::new(AtomicBool::new(true));
        let ring = AudioRingBuffer::new(None, 500, Arc::clone(&audio_expected));
        let (mut producer, consumer) = ring.split();

        let mut output = AudioOutput::new(None)?;
        let mut consumer = consumer;
        output.start(move || consumer.pop().unwrap_or(AudioFrame::zero()))?;
        *self.audio_output.lock().await = Some(output);

        self.advance_to_next().await?;

        let engine = Arc::clone(self);
        *self.mixer_handle.lock().await = Some(tokio::spawn(async move {
            let mut chunk = vec![0.0f32; MIX_CHUNK_FRAMES * 2];
            loop {
                let result = {
                    let mut mixer = engine.mixer.lock().await;
                    let crossfade_target = engine
                        .pending_crossfade
                        .read()
                        .await
                        .as_ref()
                        .filter(|p| p.active)
                        .map(|p| p.next_queue_entry_id);

                    if let Some(next_queue_entry_id) = crossfade_target {
                        let current_queue_entry_id =
                            mixer.get_current_queue_entry_id().unwrap_or_else(Uuid::nil);
                        mixer
                            .mix_crossfade(&engine.buffer_manager, current_queue_entry_id, next_queue_entry_id, &mut chunk)
                            .await
                    } else {
                        let passage_id = mixer.get_current_passage_id().unwrap_or_else(Uuid::nil);
                        mixer.mix_single(&engine.buffer_manager, passage_id, &mut chunk).await
                    }
                };

                match result {
                    Ok(markers) => {
                        for pair in chunk.chunks(2) {
                            if !producer.push(AudioFrame::from_stereo(pair[0], pair[1])) {
                                break;
                            }
                        }
                        for marker in markers {
                            engine.handle_marker_event(marker).await;
                        }
                    }
                    Err(e) => {
                        debug!("Mixer idle: {}", e);
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }));

        let progress_engine = Arc::clone(self);
        *self.progress_handle.lock().await = Some(tokio::spawn(async move {
            loop {
                let interval_ms = crate::db::settings::load_progress_interval(&progress_engine.db_pool)
                    .await
                    .unwrap_or(5000);
                tokio::time::sleep(std::time::Duration::from_millis(interval_ms)).await;

                if let Some(active) = progress_engine.current.read().await.as_ref() {
                    let frames_written = progress_engine.mixer.lock().await.get_frames_written();
                    let position_ms = (frames_written * 1000) / WORKING_SAMPLE_RATE as u64;
                    progress_engine
                        .shared_state
                        .broadcast_event(crate::events::WkmpEvent::PlaybackProgress {
                            passage_id: active.passage_id.unwrap_or(active.queue_entry_id),
                            position_ms,
                            duration_ms: active.duration_ms,
                            timestamp: chrono::Utc::now(),
                        });
                }
            }
        }));

        info!("Playback engine started");
        Ok(())
    }

    /// Stop the decoder worker and audio output.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(handle) = self.mixer_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.progress_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(mut output) = self.audio_output.lock().await.take() {
            output.stop();
        }
        Arc::clone(&self.decoder_worker).shutdown().await;
        if let Some(handle) = self.decoder_handle.lock().await.take() {
            let _ = handle.await;
        }

        info!("Playback engine stopped");
        Ok(())
    }

    pub async fn play(&self) -> Result<()> {
        self.mixer.lock().await.set_state(MixerState::Playing);
        self.shared_state
            .set_playback_state(crate::events::PlaybackState::Playing)
            .await;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.mixer.lock().await.set_state(MixerState::Paused);
        self.shared_state
            .set_playback_state(crate::events::PlaybackState::Paused)
            .await;
        Ok(())
    }

    pub async fn get_state(&self) -> PlaybackState {
        match self.mixer.lock().await.state() {
            MixerState::Playing => PlaybackState::Playing,
            MixerState::Paused => PlaybackState::Paused,
        }
    }

    pub fn get_buffer_manager(&self) -> Arc<BufferManager> {
        Arc::clone(&self.buffer_manager)
    }

    pub async fn get_position(&self) -> PositionInfo {
        let state = self.get_state().await;
        let current = self.current.read().await;
        match current.as_ref() {
            Some(active) => {
                let frames_written = self.mixer.lock().await.get_frames_written();
                let position_ms = (frames_written * 1000) / WORKING_SAMPLE_RATE as u64;
                PositionInfo {
                    passage_id: active.passage_id,
                    position_ms,
                    duration_ms: active.duration_ms,
                    state,
                }
            }
            None => PositionInfo {
                passage_id: None,
                position_ms: 0,
                duration_ms: 0,
                state,
            },
        }
    }

    pub async fn get_queue(&self) -> Vec<QueueEntryInfo> {
        self.queue_manager
            .read()
            .await
            .get_all()
            .await
            .into_iter()
            .map(|entry| QueueEntryInfo {
                queue_entry_id: Uuid::parse_str(&entry.guid).unwrap_or_else(|_| Uuid::nil()),
                passage_id: entry
                    .passage_guid
                    .as_deref()
                    .and_then(|g| Uuid::parse_str(g).ok()),
                play_order: entry.play_order,
                file_path: entry.file_path,
                timing_override: entry.start_time_ms.map(|_| {
                    serde_json::json!({
                        "start_time_ms": entry.start_time_ms,
                        "end_time_ms": entry.end_time_ms,
                    })
                }),
            })
            .collect()
    }

    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<QueueEntryInfo> {
        // Phase 1: reject structurally invalid timing at the API boundary.
        crate::db::passages::validate_enqueue_timing(
            request.start_time_ms.unwrap_or(0),
            request.end_time_ms,
        )?;

        let guid = self
            .queue_manager
            .read()
            .await
            .enqueue(
                request.file_path.clone(),
                request.passage_id.map(|id| id.to_string()),
                request.start_time_ms.map(|v| v as i64),
                request.end_time_ms.map(|v| v as i64),
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .await
            .map_err(Error::Other)?;

        let queue_entry_id = Uuid::parse_str(&guid).map_err(|e| Error::Playback(e.to_string()))?;
        let entries = self.queue_manager.read().await.get_all().await;
        let entry = entries
            .into_iter()
            .find(|e| e.guid == guid)
            .ok_or_else(|| Error::Playback("enqueued entry vanished".to_string()))?;

        self.shared_state.broadcast_event(crate::events::WkmpEvent::QueueChanged {
            trigger: crate::events::QueueChangeTrigger::Enqueue,
            queue_length: self.queue_manager.read().await.size().await,
            timestamp: chrono::Utc::now(),
        });

        if self.current.read().await.is_none() {
            self.advance_to_next().await?;
        } else if self.pending_crossfade.read().await.is_none() {
            // A passage is already playing but had nothing queued behind it
            // to crossfade into; now it does.
            self.schedule_crossfade().await;
        }

        Ok(QueueEntryInfo {
            queue_entry_id,
            passage_id: request.passage_id,
            play_order: entry.play_order,
            file_path: entry.file_path,
            timing_override: None,
        })
    }

    pub async fn dequeue(&self, queue_entry_id: Uuid) -> Result<()> {
        let guid = queue_entry_id.to_string();
        self.queue_manager
            .read()
            .await
            .remove(&guid)
            .await
            .map_err(Error::Other)?;
        self.decoder_worker.cancel_decode(queue_entry_id).await;
        self.buffer_manager.remove(queue_entry_id).await;

        self.shared_state.broadcast_event(crate::events::WkmpEvent::QueueChanged {
            trigger: crate::events::QueueChangeTrigger::Dequeue,
            queue_length: self.queue_manager.read().await.size().await,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Pull the next queue entry and hand it to the decoder worker / mixer.
    ///
    /// Skips over entries whose timing is still unplayable after Phase 2
    /// storage-time clamping (Phase 3), emitting `PassageCompleted{reason:
    /// invalid_timing}` for each and moving on to the following entry.
    async fn advance_to_next(&self) -> Result<()> {
        loop {
            let next = self.queue_manager.read().await.get_next().await;
            let Some(entry) = next else {
                self.shared_state
                    .broadcast_event(crate::events::WkmpEvent::QueueEmpty { timestamp: chrono::Utc::now() });
                return Ok(());
            };

            let queue_entry_id =
                Uuid::parse_str(&entry.guid).map_err(|e| Error::Playback(e.to_string()))?;
            let file_path = PathBuf::from(&entry.file_path);

            let passage = if let Some(passage_guid) = entry.passage_guid.as_deref() {
                let passage_id =
                    Uuid::parse_str(passage_guid).map_err(|e| Error::Playback(e.to_string()))?;
                get_passage_with_timing(&self.db_pool, passage_id).await?
            } else {
                create_ephemeral_passage(file_path.clone())
            };

            // Phase 3: last check right before submitting to the decoder.
            if !crate::db::passages::passage_timing_is_playable(&passage) {
                warn!(
                    "Skipping queue entry {} ({}): timing still invalid after Phase 2",
                    queue_entry_id, entry.file_path
                );
                self.queue_manager
                    .read()
                    .await
                    .remove(&entry.guid)
                    .await
                    .map_err(Error::Other)?;
                self.shared_state.broadcast_event(crate::events::WkmpEvent::PassageCompleted {
                    queue_entry_id,
                    passage_id: passage.passage_id,
                    reason: crate::events::CompletionReason::InvalidTiming,
                    timestamp: chrono::Utc::now(),
                });
                continue;
            }

            let duration_ms = passage
                .end_time_ms
                .map(|e| e.saturating_sub(passage.start_time_ms))
                .unwrap_or(0);

            self.decoder_worker
                .submit(queue_entry_id, passage.clone(), DecodePriority::Immediate, false)
                .await?;

            // The entry is now "current", not "queued" - drop it from the queue.
            self.queue_manager
                .read()
                .await
                .remove(&entry.guid)
                .await
                .map_err(Error::Other)?;

            {
                let mut mixer = self.mixer.lock().await;
                let start_tick = crate::timing::ms_to_ticks(passage.start_time_ms as i64);
                mixer.set_current_passage(
                    passage.passage_id.unwrap_or_else(Uuid::nil),
                    queue_entry_id,
                    start_tick,
                );
            }

            *self.current.write().await = Some(ActivePlayback {
                queue_entry_id,
                passage_id: passage.passage_id,
                duration_ms,
                timing: passage.clone(),
            });

            self.shared_state
                .set_current_passage(Some(crate::state::CurrentPassage {
                    queue_entry_id,
                    passage_id: passage.passage_id,
                    position_ms: 0,
                    duration_ms,
                }))
                .await;
            self.shared_state.broadcast_event(crate::events::WkmpEvent::PassageStarted {
                queue_entry_id,
                passage_id: passage.passage_id,
                timestamp: chrono::Utc::now(),
            });

            self.schedule_crossfade().await;
            return Ok(());
        }
    }

    /// Look at what's queued behind the current passage and, if a crossfade
    /// is geometrically possible (§4.9: `min(L_A, L_B) > 0`), prefetch its
    /// decode and arm the mixer markers that will trigger the handoff.
    ///
    /// A no-op if there's nothing queued, the current passage has no
    /// lead-out, or the computed overlap collapses to zero.
    async fn schedule_crossfade(&self) {
        *self.pending_crossfade.write().await = None;

        let (current_queue_entry_id, current_passage_id, current_timing) = {
            let current = self.current.read().await;
            match current.as_ref() {
                Some(c) => (c.queue_entry_id, c.passage_id, c.timing.clone()),
                None => return,
            }
        };

        let Some(end_a_ms) = current_timing.end_time_ms else {
            return;
        };
        let Some(lead_out_a_ms) = current_timing.lead_out_point_ms else {
            return;
        };
        let l_a_ms = end_a_ms.saturating_sub(lead_out_a_ms);
        if l_a_ms == 0 {
            return;
        }

        let Some(next_entry) = self.queue_manager.read().await.get_next().await else {
            return;
        };
        let Ok(next_queue_entry_id) = Uuid::parse_str(&next_entry.guid) else {
            return;
        };

        let next_passage = if let Some(passage_guid) = next_entry.passage_guid.as_deref() {
            let Ok(passage_id) = Uuid::parse_str(passage_guid) else {
                return;
            };
            match get_passage_with_timing(&self.db_pool, passage_id).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("Could not load timing for crossfade candidate {}: {}", next_queue_entry_id, e);
                    return;
                }
            }
        } else {
            create_ephemeral_passage(PathBuf::from(&next_entry.file_path))
        };

        let l_b_ms = next_passage.lead_in_point_ms.saturating_sub(next_passage.start_time_ms);
        let crossfade_duration_ms = std::cmp::min(l_a_ms, l_b_ms);
        if crossfade_duration_ms == 0 {
            return;
        }

        let crossfade_duration_ticks = crate::timing::ms_to_ticks(crossfade_duration_ms as i64);
        let end_a_tick = crate::timing::ms_to_ticks(end_a_ms as i64);
        let crossfade_start_tick = end_a_tick - crossfade_duration_ticks;
        let next_start_tick =
            crate::timing::ms_to_ticks(next_passage.lead_in_point_ms as i64) - crossfade_duration_ticks;

        if let Err(e) = self
            .decoder_worker
            .submit(next_queue_entry_id, next_passage.clone(), DecodePriority::Next, false)
            .await
        {
            warn!("Could not prefetch crossfade candidate {}: {}", next_queue_entry_id, e);
            return;
        }

        {
            let mut mixer = self.mixer.lock().await;
            let passage_marker_id = current_passage_id.unwrap_or_else(Uuid::nil);
            mixer.add_marker(PositionMarker {
                tick: crossfade_start_tick,
                passage_id: passage_marker_id,
                event_type: MarkerEvent::StartCrossfade { next_passage_id: next_queue_entry_id },
            });
            mixer.add_marker(PositionMarker {
                tick: end_a_tick,
                passage_id: passage_marker_id,
                event_type: MarkerEvent::PassageComplete,
            });
        }

        debug!(
            "Crossfade scheduled: {} -> {} ({}ms overlap)",
            current_queue_entry_id, next_queue_entry_id, crossfade_duration_ms
        );

        *self.pending_crossfade.write().await = Some(PendingCrossfade {
            next_queue_entry_id,
            next_passage,
            next_start_tick,
            marker_tick: crossfade_start_tick,
            active: false,
        });
    }

    /// Dispatch a marker event surfaced by the mixer loop.
    async fn handle_marker_event(&self, event: MarkerEvent) {
        match event {
            MarkerEvent::PositionUpdate { .. } => {}
            MarkerEvent::StartCrossfade { next_passage_id } => {
                self.activate_crossfade(next_passage_id).await;
            }
            MarkerEvent::SongBoundary { new_song_id } => {
                if let Some(active) = self.current.read().await.as_ref() {
                    self.shared_state.broadcast_event(crate::events::WkmpEvent::CurrentSongChanged {
                        queue_entry_id: active.queue_entry_id,
                        passage_id: new_song_id,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            MarkerEvent::PassageComplete
            | MarkerEvent::EndOfFile { .. }
            | MarkerEvent::EndOfFileBeforeLeadOut { .. } => {
                let crossfading = matches!(
                    self.pending_crossfade.read().await.as_ref(),
                    Some(p) if p.active
                );
                if crossfading {
                    self.complete_crossfade_transition().await;
                } else {
                    self.complete_current(crate::events::CompletionReason::Natural).await;
                }
            }
        }
    }

    /// The StartCrossfade marker fired: switch the mixer loop into crossfade
    /// mode if the incoming buffer is actually ready, otherwise let the
    /// current passage play its tail out alone (§4.9 degraded case).
    async fn activate_crossfade(&self, next_queue_entry_id: Uuid) {
        let mut pending_guard = self.pending_crossfade.write().await;
        let Some(pending) = pending_guard.as_mut() else { return };
        if pending.next_queue_entry_id != next_queue_entry_id {
            return;
        }

        if !self.buffer_manager.is_ready(next_queue_entry_id).await {
            warn!(
                "Crossfade target {} not ready at lead-out point, playing tail out without overlap",
                next_queue_entry_id
            );
            return;
        }

        pending.active = true;
        drop(pending_guard);

        if let Some(active) = self.current.read().await.as_ref() {
            self.shared_state.broadcast_event(crate::events::WkmpEvent::CrossfadeStarted {
                outgoing_queue_entry_id: active.queue_entry_id,
                incoming_queue_entry_id: next_queue_entry_id,
            });
            info!("Crossfade started: {} -> {}", active.queue_entry_id, next_queue_entry_id);
        }
    }

    /// Retire the current passage with no crossfade involved: release its
    /// chain/buffer, drop it from the queue, emit `PassageCompleted`, and
    /// load whatever comes next.
    async fn complete_current(&self, reason: crate::events::CompletionReason) {
        let old = self.current.write().await.take();
        *self.pending_crossfade.write().await = None;

        let Some(old) = old else { return };

        {
            let mut mixer = self.mixer.lock().await;
            mixer.clear_markers_for_passage(old.passage_id.unwrap_or_else(Uuid::nil));
            mixer.clear_passage();
        }

        let _ = self.queue_manager.read().await.remove(&old.queue_entry_id.to_string()).await;
        self.buffer_manager.remove(old.queue_entry_id).await;
        self.decoder_worker.cancel_decode(old.queue_entry_id).await;

        self.shared_state.broadcast_event(crate::events::WkmpEvent::PassageCompleted {
            queue_entry_id: old.queue_entry_id,
            passage_id: old.passage_id,
            reason,
            timestamp: chrono::Utc::now(),
        });

        if let Err(e) = self.advance_to_next().await {
            error!("Failed to advance queue after passage completion: {}", e);
        }
    }

    /// The outgoing passage's PassageComplete marker fired while a crossfade
    /// was active: retire it, promote the incoming passage to "current"
    /// (mixer already has it playing), and schedule the next crossfade.
    async fn complete_crossfade_transition(&self) {
        let Some(pending) = self.pending_crossfade.write().await.take() else {
            return;
        };

        let old = self.current.write().await.take();
        if let Some(old) = &old {
            let _ = self.queue_manager.read().await.remove(&old.queue_entry_id.to_string()).await;
            self.buffer_manager.remove(old.queue_entry_id).await;
            self.shared_state.broadcast_event(crate::events::WkmpEvent::PassageCompleted {
                queue_entry_id: old.queue_entry_id,
                passage_id: old.passage_id,
                reason: crate::events::CompletionReason::Natural,
                timestamp: chrono::Utc::now(),
            });
        }

        let next_passage = pending.next_passage;
        let duration_ms = next_passage
            .end_time_ms
            .map(|e| e.saturating_sub(next_passage.start_time_ms))
            .unwrap_or(0);

        // The incoming passage was only peeked (not popped) when the crossfade
        // was scheduled; it's "current" now, so drop it from the queue.
        let _ = self
            .queue_manager
            .read()
            .await
            .remove(&pending.next_queue_entry_id.to_string())
            .await;

        {
            let mut mixer = self.mixer.lock().await;
            let handoff_tick = pending.next_start_tick + (mixer.get_current_tick() - pending.marker_tick);
            if let Some(old) = &old {
                mixer.clear_markers_for_passage(old.passage_id.unwrap_or_else(Uuid::nil));
            }
            mixer.set_current_passage(
                next_passage.passage_id.unwrap_or_else(Uuid::nil),
                pending.next_queue_entry_id,
                handoff_tick,
            );
        }

        *self.current.write().await = Some(ActivePlayback {
            queue_entry_id: pending.next_queue_entry_id,
            passage_id: next_passage.passage_id,
            duration_ms,
            timing: next_passage.clone(),
        });

        self.shared_state
            .set_current_passage(Some(crate::state::CurrentPassage {
                queue_entry_id: pending.next_queue_entry_id,
                passage_id: next_passage.passage_id,
                position_ms: 0,
                duration_ms,
            }))
            .await;
        self.shared_state.broadcast_event(crate::events::WkmpEvent::PassageStarted {
            queue_entry_id: pending.next_queue_entry_id,
            passage_id: next_passage.passage_id,
            timestamp: chrono::Utc::now(),
        });

        info!("Crossfade complete, now playing queue entry {}", pending.next_queue_entry_id);

        self.schedule_crossfade().await;
    }
}
