//! Audio decode, resample, and output layer.

pub mod decoder;
pub mod output;
pub mod resampler;
pub mod types;

pub use decoder::StreamingDecoder;
pub use output::AudioOutput;
pub use resampler::StatefulResampler;
pub use types::{AudioFrame, BufferStatus, PassageBuffer};
