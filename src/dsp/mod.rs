//! Low-level DSP primitives used by the voice render path.
//!
//! These components are allocation-free and realtime-safe, making them safe to
//! embed directly inside voice structs. They intentionally stay focused on the
//! signal-processing math so the voice layer can own orchestration, caching
//! and cross-thread control.

/// Stepped pitch-table module (arpeggiator).
pub mod arpeggio;
/// Fixed-capacity FIFO delay line for plucked-string synthesis.
pub mod delay;
/// Window-applied ADSR envelope.
pub mod envelope;
/// Xorshift noise source.
pub mod noise;
/// Waveform tag and per-sample amplitude functions.
pub mod waveform;

pub use arpeggio::Arpeggiator;
pub use delay::DelayLine;
pub use envelope::Envelope;
pub use noise::Xorshift32;
pub use waveform::Waveform;
