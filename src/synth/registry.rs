use crate::synth::voice::SynthVoice;

/// Generational handle to a registered voice. Stale handles (their voice was
/// removed, even if the slot was reused) resolve to nothing instead of
/// aliasing a newer note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    voice: Option<SynthVoice>,
}

/// Slab of voices owned by an instrument, addressed by [`VoiceId`].
///
/// Slots are recycled with a bumped generation so removal invalidates every
/// outstanding handle to the old occupant.
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, voice: SynthVoice) -> VoiceId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.voice = Some(voice);
                VoiceId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    voice: Some(voice),
                });
                VoiceId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    pub fn get(&self, id: VoiceId) -> Option<&SynthVoice> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.voice.as_ref())
    }

    pub fn get_mut(&mut self, id: VoiceId) -> Option<&mut SynthVoice> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.voice.as_mut())
    }

    pub fn contains(&self, id: VoiceId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: VoiceId) -> Option<SynthVoice> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let voice = slot.voice.take()?;
        slot.generation += 1;
        self.free.push(id.index);
        Some(voice)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (VoiceId, &SynthVoice)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.voice.as_ref().map(|voice| {
                (
                    VoiceId {
                        index,
                        generation: slot.generation,
                    },
                    voice,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (VoiceId, &mut SynthVoice)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let generation = slot.generation;
                slot.voice
                    .as_mut()
                    .map(|voice| (VoiceId { index, generation }, voice))
            })
    }

    pub fn ids(&self) -> Vec<VoiceId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Remove every voice flagged deletable; returns how many were reaped.
    pub fn reap(&mut self) -> usize {
        let deletable: Vec<VoiceId> = self
            .iter()
            .filter(|(_, voice)| voice.is_deletable())
            .map(|(id, _)| id)
            .collect();
        let reaped = deletable.len();
        for id in deletable {
            self.remove(id);
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineSpec, Timing};
    use crate::synth::timbre::Timbre;
    use std::sync::Arc;

    fn engine() -> Arc<Engine> {
        Engine::new(EngineSpec::default(), Timing::new(64.0, 2_048))
    }

    fn voice(engine: &Arc<Engine>, frequency: f32) -> SynthVoice {
        SynthVoice::sequenced(engine, &Timbre::default(), frequency, 0, 1.0)
    }

    #[test]
    fn insert_and_lookup_round_trip() {
        let engine = engine();
        let mut registry = VoiceRegistry::new();

        let a = registry.insert(voice(&engine, 220.0));
        let b = registry.insert(voice(&engine, 440.0));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(a).unwrap().frequency(), 220.0);
        assert_eq!(registry.get(b).unwrap().frequency(), 440.0);
    }

    #[test]
    fn stale_handles_miss_after_slot_reuse() {
        let engine = engine();
        let mut registry = VoiceRegistry::new();

        let old = registry.insert(voice(&engine, 220.0));
        assert!(registry.remove(old).is_some());

        let new = registry.insert(voice(&engine, 440.0));
        assert!(!registry.contains(old));
        assert!(registry.get(old).is_none());
        assert_eq!(registry.get(new).unwrap().frequency(), 440.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reap_removes_only_deletable_voices() {
        let engine = engine();
        let mut registry = VoiceRegistry::new();

        let keep = registry.insert(voice(&engine, 220.0));
        let drop = registry.insert(voice(&engine, 440.0));
        registry.get_mut(drop).unwrap().request_deletion(true);

        assert_eq!(registry.reap(), 1);
        assert!(registry.contains(keep));
        assert!(!registry.contains(drop));
    }

    #[test]
    fn iter_mut_visits_every_voice() {
        let engine = engine();
        let mut registry = VoiceRegistry::new();
        registry.insert(voice(&engine, 220.0));
        registry.insert(voice(&engine, 440.0));

        for (_, voice) in registry.iter_mut() {
            voice.set_volume(0.1);
        }
        assert!(registry.iter().all(|(_, v)| v.volume() == 0.1));
    }
}
