use std::f32::consts::{PI, TAU};

use crate::dsp::noise::Xorshift32;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Waveform generators
===================

All generators except Pulse and Plucked evaluate a piecewise-parabolic shape
over a phase accumulator in [0, 1): two symmetric parabola segments per cycle
approximate a sine far cheaper than calling sin() per sample, and the same
parabola doubles as the spectral envelope for the square, triangle and noise
variants.

Pulse runs its own phase accumulator over [0, 2π) because the comparison
against the modulated pulse-width threshold is naturally expressed in
radians. Plucked is not a phase-driven shape at all; it steps a feedback
delay line (see dsp::delay).

The per-waveform scale factors are deliberate level compensation: parabolic
sines clip easily when voices overlap (×0.7), the squared-2π square wave gets
very loud (×0.01), and pulse-width modulation reads quiet (×4).
*/

/// Selects the per-sample generation algorithm of a voice.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Sawtooth,
    Square,
    Triangle,
    /// Pulse train whose width is swept by a slow sinusoidal LFO.
    Pulse,
    /// Pitched noise: the parabolic envelope times a fresh random sample.
    Noise,
    /// Karplus–Strong plucked string (feedback delay line).
    Plucked,
}

/// Sines distort easily when several voices overlap.
const SINE_LEVEL: f32 = 0.7;
const SQUARE_LEVEL: f32 = 0.01;
const TRIANGLE_LEVEL: f32 = 0.75;
/// Pulse-width sweep range of the LFO, just shy of the full half-cycle.
const PULSE_WIDTH_RANGE: f32 = PI / 1.05;
const PULSE_AMPLITUDE: f32 = 0.075;
/// PWM reads quiet; make up the perceived loudness.
const PULSE_MAKEUP_GAIN: f32 = 4.0;
const PULSE_LFO_DIVISOR: f32 = 0x4800 as f32;

/// Two symmetric parabola segments per cycle, output in [-1, 1].
#[inline]
pub(crate) fn parabolic(phase: f32) -> f32 {
    if phase < 0.5 {
        let t = phase * 4.0 - 1.0;
        1.0 - t * t
    } else {
        let t = phase * 4.0 - 3.0;
        t * t - 1.0
    }
}

#[inline]
pub fn sine(phase: f32) -> f32 {
    parabolic(phase) * SINE_LEVEL
}

/// Linear ramp: the phase minus its integer part, sign-aware.
#[inline]
pub fn sawtooth(phase: f32) -> f32 {
    if phase < 0.0 {
        phase - (phase - 1.0).trunc()
    } else {
        phase - phase.trunc()
    }
}

#[inline]
pub fn square(phase: f32) -> f32 {
    let amp = if phase < 0.5 {
        let t = TAU * (phase * 4.0 - 1.0);
        1.0 - t * t
    } else {
        let t = TAU * (phase * 4.0 - 3.0);
        t * t - 1.0
    };
    amp * SQUARE_LEVEL
}

/// Rectified parabola.
#[inline]
pub fn triangle(phase: f32) -> f32 {
    (parabolic(phase) * TRIANGLE_LEVEL).abs()
}

/// `lfo_position` is the running sample counter driving the width LFO;
/// `phase` lives in [0, 2π) and is advanced by the caller.
#[inline]
pub fn pulse(phase: f32, lfo_position: f32) -> f32 {
    let width = (lfo_position / PULSE_LFO_DIVISOR).sin() * PULSE_WIDTH_RANGE;
    let amp = if phase < PI - width {
        PULSE_AMPLITUDE
    } else {
        -PULSE_AMPLITUDE
    };
    amp * PULSE_MAKEUP_GAIN
}

/// Colored noise: the parabolic pitch envelope times an independent uniform
/// random sample.
#[inline]
pub fn noise(phase: f32, rng: &mut Xorshift32) -> f32 {
    parabolic(phase) * rng.next_bipolar()
}
