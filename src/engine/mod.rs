//! Process-wide engine configuration, musical timing, and cache scheduling.

/// Background pre-render scheduling across sequenced voices.
pub mod cache;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer::pool::SilentPool;

/// Fixed audio properties, read-only during a render.
#[derive(Debug, Clone, Copy)]
pub struct EngineSpec {
    pub sample_rate: f32,
    /// Per-callback render buffer size in frames.
    pub quantum: usize,
    pub channels: usize,
    /// When true, sequenced voices pre-render their full event buffer;
    /// when false they synthesize one quantum at a time.
    pub event_caching: bool,
}

impl Default for EngineSpec {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            quantum: 512,
            channels: 2,
            event_caching: true,
        }
    }
}

/// Musical timing in samples, settable from a control thread and readable
/// lock-free from the render path. Samples-per-step is fractional so tempos
/// that do not divide evenly stay accurate over long sequences.
#[derive(Debug)]
pub struct Timing {
    samples_per_step: AtomicU64, // f64 bits
    samples_per_bar: AtomicU64,
}

impl Timing {
    pub fn new(samples_per_step: f64, samples_per_bar: u64) -> Self {
        Self {
            samples_per_step: AtomicU64::new(samples_per_step.to_bits()),
            samples_per_bar: AtomicU64::new(samples_per_bar),
        }
    }

    /// Derive timing from a tempo: four beats to the bar, a bar divided
    /// evenly into `steps_per_bar` sequencer steps.
    pub fn from_tempo(sample_rate: f32, bpm: f32, steps_per_bar: u32) -> Self {
        let samples_per_beat = f64::from(sample_rate) * 60.0 / f64::from(bpm);
        let samples_per_bar = samples_per_beat * 4.0;
        Self::new(
            samples_per_bar / f64::from(steps_per_bar.max(1)),
            samples_per_bar.round() as u64,
        )
    }

    pub fn samples_per_step(&self) -> f64 {
        f64::from_bits(self.samples_per_step.load(Ordering::Relaxed))
    }

    pub fn samples_per_bar(&self) -> usize {
        self.samples_per_bar.load(Ordering::Relaxed) as usize
    }

    /// Retune timing (tempo change). Sounding voices pick the new values up
    /// on their next buffer recalculation.
    pub fn set(&self, samples_per_step: f64, samples_per_bar: u64) {
        self.samples_per_step
            .store(samples_per_step.to_bits(), Ordering::Relaxed);
        self.samples_per_bar.store(samples_per_bar, Ordering::Relaxed);
    }

    pub fn set_tempo(&self, sample_rate: f32, bpm: f32, steps_per_bar: u32) {
        let retuned = Self::from_tempo(sample_rate, bpm, steps_per_bar);
        self.set(retuned.samples_per_step(), retuned.samples_per_bar() as u64);
    }
}

/// Engine context shared by every voice: audio spec, musical timing, and the
/// silent-template pool. Handed around as `Arc<Engine>`.
#[derive(Debug)]
pub struct Engine {
    pub spec: EngineSpec,
    pub timing: Timing,
    pool: Arc<SilentPool>,
}

impl Engine {
    pub fn new(spec: EngineSpec, timing: Timing) -> Arc<Self> {
        let pool = Arc::new(SilentPool::new(spec.quantum));
        Arc::new(Self { spec, timing, pool })
    }

    pub fn pool(&self) -> &Arc<SilentPool> {
        &self.pool
    }
}
