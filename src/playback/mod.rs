//! Audio playback subsystem
//!
//! Implements the decoder-buffer-decoder pipeline: a [`DecoderWorker`] drives
//! per-passage [`DecoderChain`]s that decode, resample, and fade samples into
//! [`BufferManager`]-owned ring buffers, from which the [`Mixer`] reads and
//! crossfades for audio output.

pub mod buffer_events;
pub mod buffer_manager;
pub mod decoder_chain;
pub mod decoder_worker;
pub mod engine;
pub mod fader;
pub mod mixer;
pub mod playout_ring_buffer;
pub mod queue;
pub mod ring_buffer;
pub mod types;

pub use buffer_manager::BufferManager;
pub use decoder_chain::DecoderChain;
pub use decoder_worker::DecoderWorker;
pub use engine::PlaybackEngine;
pub use mixer::Mixer;
pub use queue::QueueManager;
