/// Stepped pitch-table module cloned into a voice from its timbre.
///
/// The voice calls `advance` once per rendered sample; when it reports a step
/// boundary the voice re-derives its frequency from `pitch_for_step` relative
/// to the voice's base frequency, leaving the base-frequency memory itself
/// untouched.
#[derive(Debug, Clone)]
pub struct Arpeggiator {
    /// Semitone offsets, one per step, relative to the base frequency.
    pattern: Vec<f32>,
    step_samples: usize,
    counter: usize,
    step: usize,
}

impl Arpeggiator {
    pub fn new(step_samples: usize, pattern: Vec<f32>) -> Self {
        Self {
            pattern: if pattern.is_empty() { vec![0.0] } else { pattern },
            step_samples: step_samples.max(1),
            counter: 0,
            step: 0,
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn step_count(&self) -> usize {
        self.pattern.len()
    }

    pub fn set_step_samples(&mut self, step_samples: usize) {
        self.step_samples = step_samples.max(1);
    }

    /// Advance one sample; true exactly when a new step begins.
    #[inline]
    pub fn advance(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.step_samples {
            self.counter = 0;
            self.step = (self.step + 1) % self.pattern.len();
            true
        } else {
            false
        }
    }

    /// Pitch for a step, relative to `base_frequency`.
    pub fn pitch_for_step(&self, step: usize, base_frequency: f32) -> f32 {
        let semitones = self.pattern[step % self.pattern.len()];
        base_frequency * 2.0_f32.powf(semitones / 12.0)
    }
}
