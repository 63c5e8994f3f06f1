//! Realtime-safe synthesis core for a sequenced polyphonic synthesizer.
//!
//! The crate is layered bottom-up: [`dsp`] holds allocation-free synthesis
//! primitives, [`buffer`] the multi-channel sample buffers they write into,
//! [`engine`] the shared audio spec, musical timing and cache scheduling,
//! and [`synth`] the per-note voices and the instrument facade that mixes
//! them.

pub mod buffer;
pub mod dsp;
pub mod engine;
pub mod synth; // Voice management and polyphony

pub use buffer::SampleBuffer;
pub use dsp::Waveform;
pub use engine::{Engine, EngineSpec, Timing};
pub use synth::{Instrument, SynthVoice, Timbre, VoiceId};
