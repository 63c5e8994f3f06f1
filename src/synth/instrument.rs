use std::sync::Arc;

use tracing::debug;

use crate::buffer::SampleBuffer;
use crate::engine::cache::BulkCacher;
use crate::engine::Engine;
use crate::synth::registry::{VoiceId, VoiceRegistry};
use crate::synth::timbre::Timbre;
use crate::synth::voice::SynthVoice;

/// One playable instrument: a timbre plus the voices currently sounding
/// with it.
///
/// Sequenced and live voices live in separate registries because their
/// lifecycles differ: sequenced voices belong to timeline positions and are
/// mixed by buffer position, live voices belong to held keys and are
/// synthesized quantum by quantum until released and rung out.
#[derive(Debug)]
pub struct Instrument {
    pub timbre: Timbre,
    engine: Arc<Engine>,
    sequenced: VoiceRegistry,
    live: VoiceRegistry,
}

impl Instrument {
    pub fn new(engine: Arc<Engine>, timbre: Timbre) -> Self {
        Self {
            timbre,
            engine,
            sequenced: VoiceRegistry::new(),
            live: VoiceRegistry::new(),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn sequenced_voices(&self) -> &VoiceRegistry {
        &self.sequenced
    }

    pub fn sequenced_voices_mut(&mut self) -> &mut VoiceRegistry {
        &mut self.sequenced
    }

    pub fn live_voices(&self) -> &VoiceRegistry {
        &self.live
    }

    pub fn live_voices_mut(&mut self) -> &mut VoiceRegistry {
        &mut self.live
    }

    /// Place a note on the timeline at `position` for `length` steps.
    pub fn note_on_sequenced(&mut self, frequency: f32, position: usize, length: f32) -> VoiceId {
        let voice = SynthVoice::sequenced(&self.engine, &self.timbre, frequency, position, length);
        debug!(frequency, position, length, "sequenced note added");
        self.sequenced.insert(voice)
    }

    /// Start sounding a key immediately.
    pub fn note_on_live(&mut self, frequency: f32) -> VoiceId {
        let voice = SynthVoice::live(&self.engine, &self.timbre, frequency);
        debug!(frequency, "live note started");
        self.live.insert(voice)
    }

    /// Release a live key. The voice keeps sounding through its minimum
    /// ring-out, then reaps itself on a later render.
    pub fn note_off(&mut self, id: VoiceId) {
        if let Some(voice) = self.live.get_mut(id) {
            voice.request_deletion(true);
            debug!(frequency = voice.frequency(), "live note released");
        }
    }

    /// Remove a sequenced note from the timeline.
    pub fn remove_sequenced(&mut self, id: VoiceId) -> bool {
        self.sequenced.remove(id).is_some()
    }

    /// Push the instrument's current timbre to every sounding voice.
    pub fn apply_timbre(&mut self) {
        let timbre = self.timbre.clone();
        for registry in [&mut self.sequenced, &mut self.live] {
            for (_, voice) in registry.iter_mut() {
                let position = voice.position();
                let length = voice.length();
                voice.update_properties(position, length, &timbre);
            }
        }
    }

    /// Recalculate every voice after a tempo change.
    pub fn on_tempo_changed(&mut self) {
        for registry in [&mut self.sequenced, &mut self.live] {
            for (_, voice) in registry.iter_mut() {
                voice.calculate_buffers();
            }
        }
    }

    /// Mix all sequenced voices overlapping the output window starting at
    /// timeline position `buffer_pos`, then drop any that became deletable.
    pub fn render_sequenced_into(&mut self, output: &mut SampleBuffer, buffer_pos: usize) {
        for (_, voice) in self.sequenced.iter_mut() {
            if !voice.is_deletable() {
                voice.compose_into(output, buffer_pos);
            }
        }
        self.sequenced.reap();
    }

    /// Synthesize one quantum of every live voice into `output`, then drop
    /// any that finished ringing out.
    pub fn render_live_into(&mut self, output: &mut SampleBuffer) {
        let frames = output.frames();
        for (_, voice) in self.live.iter_mut() {
            voice.render_once(frames);
            if let Some(rendered) = voice.buffer() {
                output.mix(rendered, 0, 0, 1.0);
            }
        }
        let reaped = self.live.reap();
        if reaped > 0 {
            debug!(reaped, "live voices rung out");
        }
    }

    /// Queue every sequenced voice for background pre-rendering.
    pub fn queue_bulk_cache(&self, cacher: &mut BulkCacher) {
        cacher.enqueue_all(self.sequenced.ids());
    }

    /// Run queued cache passes to exhaustion; returns how many voices were
    /// cached.
    pub fn run_bulk_cache(&mut self, cacher: &mut BulkCacher) -> usize {
        cacher.cache_all(&mut self.sequenced)
    }
}
