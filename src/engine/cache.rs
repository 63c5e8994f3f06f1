use std::collections::VecDeque;

use tracing::debug;

use crate::synth::registry::{VoiceId, VoiceRegistry};

/// Schedules background pre-rendering ("bulk caching") across sequenced
/// voices, one cache pass at a time.
///
/// A cache pass runs to completion before `cache_next` returns, which is the
/// completion signal the next unit of work waits for; callers decide how
/// many units to spend per idle period (`cache_next` in a loop, or
/// `cache_all` when time does not matter).
#[derive(Debug, Default)]
pub struct BulkCacher {
    queue: VecDeque<VoiceId>,
}

impl BulkCacher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, id: VoiceId) {
        self.queue.push_back(id);
    }

    pub fn enqueue_all<I: IntoIterator<Item = VoiceId>>(&mut self, ids: I) {
        self.queue.extend(ids);
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Run one cache pass. Voices removed from the registry since they were
    /// queued are skipped. Returns the voice that was cached, if any.
    pub fn cache_next(&mut self, voices: &mut VoiceRegistry) -> Option<VoiceId> {
        while let Some(id) = self.queue.pop_front() {
            if let Some(voice) = voices.get_mut(id) {
                voice.set_bulk_cacheable(true);
                voice.start_cache();
                debug!(?id, "bulk cache pass completed");
                return Some(id);
            }
        }
        None
    }

    /// Drain the queue; returns the number of voices cached.
    pub fn cache_all(&mut self, voices: &mut VoiceRegistry) -> usize {
        let mut cached = 0;
        while self.cache_next(voices).is_some() {
            cached += 1;
        }
        cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineSpec, Timing};
    use crate::synth::timbre::Timbre;
    use crate::synth::voice::SynthVoice;

    fn registry_with_voices(count: usize) -> (VoiceRegistry, Vec<VoiceId>) {
        let engine = Engine::new(EngineSpec::default(), Timing::new(64.0, 2_048));
        let timbre = Timbre::default();
        let mut registry = VoiceRegistry::default();
        let ids = (0..count)
            .map(|i| {
                let voice = SynthVoice::sequenced(&engine, &timbre, 220.0 + i as f32, i, 1.0);
                registry.insert(voice)
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn caches_queued_voices_in_order() {
        let (mut registry, ids) = registry_with_voices(3);
        let mut cacher = BulkCacher::new();
        cacher.enqueue_all(ids.iter().copied());

        assert_eq!(cacher.cache_next(&mut registry), Some(ids[0]));
        assert_eq!(cacher.pending(), 2);
        assert_eq!(cacher.cache_all(&mut registry), 2);
        assert!(!cacher.has_pending());

        for id in ids {
            assert!(registry.get(id).is_some_and(|v| v.caching_completed()));
        }
    }

    #[test]
    fn skips_voices_removed_before_their_turn() {
        let (mut registry, ids) = registry_with_voices(2);
        let mut cacher = BulkCacher::new();
        cacher.enqueue_all(ids.iter().copied());

        registry.remove(ids[0]);
        assert_eq!(cacher.cache_next(&mut registry), Some(ids[1]));
        assert_eq!(cacher.cache_next(&mut registry), None);
    }
}
