use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Xorshift pseudo-random generator for audio noise.
///
/// Realtime-safe: no allocation, no OS entropy after construction. Audio
/// noise does not need cryptographic quality, it needs to be cheap enough to
/// call once per sample.
#[derive(Debug, Clone)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    pub fn new(seed: u32) -> Self {
        Self {
            // xorshift gets stuck on zero
            state: if seed == 0 { 0x9E3779B9 } else { seed },
        }
    }

    /// Seed from wall-clock nanos mixed with a process-wide counter, so two
    /// voices constructed in the same instant still diverge.
    pub fn from_clock() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let salt = COUNTER.fetch_add(0x9E3779B9, Ordering::Relaxed);

        Self::new(nanos ^ salt.rotate_left(13))
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform sample in [-1.0, 1.0].
    #[inline]
    pub fn next_bipolar(&mut self) -> f32 {
        const SCALE: f32 = 2.0 / u32::MAX as f32;
        self.next_u32() as f32 * SCALE - 1.0
    }
}
