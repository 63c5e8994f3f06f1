use crate::buffer::SampleBuffer;

/*
Window-applied ADSR
===================

Unlike a gate-driven envelope generator, this envelope is a pure function of
absolute position within a note of known total length: attack, decay and
release are stored as fractions of that length, sustain as a level. The voice
applies it over whatever window it just rendered by passing the window's
start offset, which keeps the envelope correct across quantum-sized partial
renders, full-event cache passes, and live one-shot renders alike.

Stage fractions are clamped to [0, 1]; release is anchored to the end of the
note. Positions at or past the total length read as silence.
*/

/// Amplitude envelope owned by one voice, applied over rendered windows.
#[derive(Debug, Clone)]
pub struct Envelope {
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    total_samples: usize,
}

impl Default for Envelope {
    /// Flat unity envelope: no shaping until stages are configured.
    fn default() -> Self {
        Self::adsr(0.0, 0.0, 1.0, 0.0)
    }
}

impl Envelope {
    /// Stage lengths as fractions of the note length, sustain as a level.
    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.clamp(0.0, 1.0),
            decay: decay.clamp(0.0, 1.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.clamp(0.0, 1.0),
            total_samples: 0,
        }
    }

    /// Copy stage parameters from another envelope without disturbing the
    /// configured note length.
    pub fn clone_stages(&mut self, other: &Envelope) {
        self.attack = other.attack;
        self.decay = other.decay;
        self.sustain = other.sustain;
        self.release = other.release;
    }

    pub fn attack(&self) -> f32 {
        self.attack
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn set_decay(&mut self, decay: f32) {
        self.decay = decay.clamp(0.0, 1.0);
    }

    pub fn sustain(&self) -> f32 {
        self.sustain
    }

    pub fn release(&self) -> f32 {
        self.release
    }

    /// Anchor the envelope to a note length in samples.
    pub fn set_total_length(&mut self, samples: usize) {
        self.total_samples = samples;
    }

    pub fn total_length(&self) -> usize {
        self.total_samples
    }

    /// Envelope level at an absolute position within the note.
    pub fn amplitude_at(&self, position: usize) -> f32 {
        if self.total_samples == 0 {
            return 1.0;
        }
        let total = self.total_samples as f32;
        let pos = position as f32;
        if pos >= total {
            return 0.0;
        }

        let attack_end = self.attack * total;
        let decay_end = attack_end + self.decay * total;
        let release_start = total - self.release * total;

        if pos >= release_start && self.release > 0.0 {
            let progress = (pos - release_start) / (total - release_start);
            return self.sustain * (1.0 - progress);
        }
        if pos < attack_end {
            return pos / attack_end;
        }
        if pos < decay_end {
            let progress = (pos - attack_end) / (decay_end - attack_end);
            return 1.0 - progress * (1.0 - self.sustain);
        }
        self.sustain
    }

    /// Shape an entire rendered window, whose first frame sits at absolute
    /// note position `offset`.
    pub fn apply(&self, buffer: &mut SampleBuffer, offset: usize) {
        let frames = buffer.frames();
        for channel in buffer.channels_mut() {
            for (i, sample) in channel.iter_mut().take(frames).enumerate() {
                *sample *= self.amplitude_at(offset + i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::pool::SilentPool;
    use std::sync::Arc;

    #[test]
    fn default_envelope_is_unity() {
        let mut env = Envelope::default();
        env.set_total_length(1_000);
        assert_eq!(env.amplitude_at(0), 1.0);
        assert_eq!(env.amplitude_at(500), 1.0);
    }

    #[test]
    fn attack_ramps_from_zero() {
        let mut env = Envelope::adsr(0.1, 0.0, 1.0, 0.0);
        env.set_total_length(1_000);

        assert_eq!(env.amplitude_at(0), 0.0);
        assert!((env.amplitude_at(50) - 0.5).abs() < 1e-3);
        assert!((env.amplitude_at(100) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn decay_settles_on_sustain() {
        let mut env = Envelope::adsr(0.0, 0.2, 0.5, 0.0);
        env.set_total_length(1_000);

        assert!((env.amplitude_at(200) - 0.5).abs() < 1e-2);
        assert!((env.amplitude_at(600) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn release_reaches_silence_at_note_end() {
        let mut env = Envelope::adsr(0.0, 0.0, 1.0, 0.25);
        env.set_total_length(1_000);

        assert_eq!(env.amplitude_at(700), 1.0);
        assert!(env.amplitude_at(990) < 0.05);
        assert_eq!(env.amplitude_at(1_000), 0.0);
    }

    #[test]
    fn clone_stages_keeps_length() {
        let mut env = Envelope::default();
        env.set_total_length(4_096);
        env.clone_stages(&Envelope::adsr(0.1, 0.2, 0.3, 0.4));

        assert_eq!(env.total_length(), 4_096);
        assert!((env.decay() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn apply_shapes_window_at_offset() {
        let pool = Arc::new(SilentPool::new(512));
        let mut buffer = SampleBuffer::new(1, 100, pool);
        for channel in buffer.channels_mut() {
            channel.fill(1.0);
        }

        let mut env = Envelope::adsr(0.5, 0.0, 1.0, 0.0);
        env.set_total_length(200);
        // window starts mid-attack
        env.apply(&mut buffer, 50);

        let channel = buffer.channel(0).unwrap();
        assert!((channel[0] - 0.5).abs() < 1e-3);
        assert!((channel[49] - 0.99).abs() < 1e-2);
        assert_eq!(channel[60], 1.0);
    }
}
