use crate::dsp::{Arpeggiator, Envelope, Waveform};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Secondary-oscillator settings. The secondary oscillator is a full voice
/// owned by its parent; these settings describe how its pitch is derived
/// from the parent's frequency.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct Osc2Settings {
    pub active: bool,
    pub waveform: Waveform,
    /// Detune in cents (1200 cents to the octave).
    pub detune_cents: f32,
    /// Whole-octave shift; negative divides, positive multiplies.
    pub octave_shift: i32,
    /// Fractional semitone shift, signed.
    pub fine_shift: f32,
}

impl Default for Osc2Settings {
    fn default() -> Self {
        Self {
            active: false,
            waveform: Waveform::Sine,
            detune_cents: 0.0,
            octave_shift: 0,
            fine_shift: 0.0,
        }
    }
}

/// The sound design of an instrument: everything a voice copies at note-on.
///
/// Voices snapshot these settings when they are created; edits made here
/// afterwards reach sounding voices through
/// [`Instrument::apply_timbre`](crate::synth::Instrument::apply_timbre).
#[derive(Debug, Clone)]
pub struct Timbre {
    pub waveform: Waveform,
    pub volume: f32,
    pub envelope: Envelope,
    pub arpeggiator: Arpeggiator,
    pub arpeggiator_active: bool,
    pub osc2: Osc2Settings,
}

impl Default for Timbre {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            volume: 0.8,
            envelope: Envelope::default(),
            arpeggiator: Arpeggiator::new(4_096, Vec::new()),
            arpeggiator_active: false,
            osc2: Osc2Settings::default(),
        }
    }
}
