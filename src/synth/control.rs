use std::fmt;

use rtrb::Producer;

use crate::synth::timbre::Timbre;
use crate::synth::voice::CancelToken;

/// A mutation applied to a voice at the start of its next render pass.
///
/// Commands travel over a wait-free SPSC ring so a UI or sequencer thread
/// never takes a lock the audio thread could be holding.
#[derive(Debug)]
pub enum VoiceCommand {
    SetFrequency(f32),
    SetVolume(f32),
    /// Schedule the voice for removal (live voices ring out first).
    RequestDeletion,
    UpdateProperties {
        position: usize,
        length: f32,
        timbre: Box<Timbre>,
    },
    Lock,
    Unlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// The command ring is full; the voice has not drained it yet.
    QueueFull,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::QueueFull => write!(f, "voice command queue is full"),
        }
    }
}

impl std::error::Error for ControlError {}

/// Control-thread handle to one voice, created by
/// [`SynthVoice::controller`](crate::synth::SynthVoice::controller).
#[derive(Debug)]
pub struct VoiceController {
    commands: Producer<VoiceCommand>,
    cancel: CancelToken,
}

impl VoiceController {
    pub(crate) fn new(commands: Producer<VoiceCommand>, cancel: CancelToken) -> Self {
        Self { commands, cancel }
    }

    /// Queue a command; applied when the voice next renders.
    pub fn send(&mut self, command: VoiceCommand) -> Result<(), ControlError> {
        self.commands
            .push(command)
            .map_err(|_| ControlError::QueueFull)
    }

    /// Interrupt the voice's current render pass immediately.
    pub fn cancel_render(&self) {
        self.cancel.request();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineSpec, Timing};
    use crate::synth::voice::SynthVoice;

    #[test]
    fn full_queue_reports_an_error() {
        let engine = Engine::new(EngineSpec::default(), Timing::new(512.0, 2_048));
        let mut voice = SynthVoice::live(&engine, &Timbre::default(), 220.0);
        let mut controller = voice.controller(1);

        assert!(controller.send(VoiceCommand::SetVolume(0.5)).is_ok());
        assert_eq!(
            controller.send(VoiceCommand::SetVolume(0.6)),
            Err(ControlError::QueueFull)
        );
    }

    #[test]
    fn cancel_sets_the_shared_token() {
        let engine = Engine::new(EngineSpec::default(), Timing::new(512.0, 2_048));
        let mut voice = SynthVoice::live(&engine, &Timbre::default(), 220.0);
        let controller = voice.controller(4);

        controller.cancel_render();
        assert!(voice.cancel_token().is_requested());
    }
}
