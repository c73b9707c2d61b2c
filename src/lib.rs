//! # WKMP Audio Player Library (wkmp-ap)
//!
//! Core playback engine with sample-accurate crossfading.
//!
//! **Purpose:** Decode audio files, manage playback queue, perform sample-accurate
//! crossfading, and provide HTTP/SSE control interface.
//!
//! **Architecture:** Single-stream audio pipeline using symphonia + rubato + cpal

pub mod api;
pub mod audio;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod params;
pub mod playback;
pub mod state;
pub mod timing;

pub use error::{Error, Result};
pub use events::WkmpEvent;
pub use fade_curves::FadeCurve;
pub use state::SharedState;
