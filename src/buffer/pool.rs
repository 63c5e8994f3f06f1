/// Shared source of silent channel data for quantum-sized buffers.
///
/// Buffers sized to the engine's render quantum are created and silenced
/// constantly (scratch buffers, live-note buffers, per-quantum render
/// targets), so those take a `copy_from_slice` from one shared zeroed
/// template. Any other size is filled in place.
///
/// The pool is passed in explicitly and shared by reference (`Arc`) among the
/// buffers that need it; there is no process-global instance.
#[derive(Debug)]
pub struct SilentPool {
    quantum: usize,
    template: Vec<f32>,
}

impl SilentPool {
    pub fn new(quantum: usize) -> Self {
        Self {
            quantum,
            template: vec![0.0; quantum],
        }
    }

    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// The read-only quantum-sized silent template.
    pub fn template(&self) -> &[f32] {
        &self.template
    }

    /// A freshly allocated silent channel of any size.
    pub fn silent_channel(&self, frames: usize) -> Vec<f32> {
        if frames == self.quantum {
            self.template.clone()
        } else {
            vec![0.0; frames]
        }
    }

    /// Erase a channel's contents, using the template when sizes match.
    pub fn silence(&self, channel: &mut [f32]) {
        if channel.len() == self.quantum {
            channel.copy_from_slice(&self.template);
        } else {
            channel.fill(0.0);
        }
    }
}
