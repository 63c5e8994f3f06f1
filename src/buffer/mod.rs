//! Multi-channel sample buffers and the shared silent-template pool.

/// Shared silent-template source for quantum-sized fills.
pub mod pool;

use std::fmt;
use std::sync::Arc;

use pool::SilentPool;

/// Errors from indexed channel access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Requested channel index does not exist on this buffer.
    ChannelOutOfRange { index: usize, channels: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::ChannelOutOfRange { index, channels } => {
                write!(f, "channel index {} out of range ({} channels)", index, channels)
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// A fixed-shape block of audio: one owned sample array per channel, every
/// channel exactly `frames` samples long.
///
/// `loopable` affects reads only: when a mix source runs past its end the
/// read index wraps to zero instead of stopping that channel's write.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
    pub loopable: bool,
    pool: Arc<SilentPool>,
}

impl SampleBuffer {
    /// A silent buffer of `channel_count` channels by `frames` samples.
    /// Quantum-sized channels are copied from the pool's shared template.
    pub fn new(channel_count: usize, frames: usize, pool: Arc<SilentPool>) -> Self {
        let channels = (0..channel_count.max(1))
            .map(|_| pool.silent_channel(frames))
            .collect();
        Self {
            channels,
            frames,
            loopable: false,
            pool,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, index: usize) -> Result<&[f32], BufferError> {
        self.channels
            .get(index)
            .map(|c| c.as_slice())
            .ok_or(BufferError::ChannelOutOfRange {
                index,
                channels: self.channels.len(),
            })
    }

    pub fn channel_mut(&mut self, index: usize) -> Result<&mut [f32], BufferError> {
        let channels = self.channels.len();
        self.channels
            .get_mut(index)
            .map(|c| c.as_mut_slice())
            .ok_or(BufferError::ChannelOutOfRange { index, channels })
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(|c| c.as_slice())
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.channels.iter_mut().map(|c| c.as_mut_slice())
    }

    /// Write one value to the same frame of every channel.
    #[inline]
    pub fn write_frame(&mut self, frame: usize, value: f32) {
        for channel in &mut self.channels {
            channel[frame] = value;
        }
    }

    /// Overlap-add `source` into this buffer: for every channel the two
    /// buffers share, `self[write_offset + k] += source[read_offset + k] *
    /// gain`. Writes clamp to this buffer's length; a read past the source's
    /// end wraps to zero when the source is loopable and stops that channel
    /// otherwise. Channels beyond the source's count are left untouched.
    ///
    /// Returns the number of samples written per channel, so callers can
    /// detect short mixes. A write offset at or past this buffer's length is
    /// a no-op returning zero.
    pub fn mix(
        &mut self,
        source: &SampleBuffer,
        read_offset: usize,
        write_offset: usize,
        gain: f32,
    ) -> usize {
        if write_offset >= self.frames {
            return 0;
        }

        let source_len = source.frames;
        let write_len = source_len.min(self.frames - write_offset);
        let write_end = write_offset + write_len;

        let mut written = 0usize;
        let mut channels_mixed = 0usize;

        for (target, src) in self.channels.iter_mut().zip(source.channels.iter()) {
            channels_mixed += 1;
            let mut r = read_offset;
            for i in write_offset..write_end {
                if r >= source_len {
                    if source.loopable {
                        r = 0;
                    } else {
                        break;
                    }
                }
                target[i] += src[r] * gain;
                r += 1;
                written += 1;
            }
        }

        if channels_mixed == 0 {
            0
        } else {
            written / channels_mixed
        }
    }

    /// Overwrite every channel with silence.
    pub fn silence(&mut self) {
        let pool = self.pool.clone();
        for channel in &mut self.channels {
            pool.silence(channel);
        }
    }

    /// Multiply every sample in every channel by `gain`.
    pub fn scale_volume(&mut self, gain: f32) {
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Copy channel 0 over every other channel. No-op for mono buffers.
    pub fn duplicate_mono_to_all(&mut self) {
        if let Some((mono, rest)) = self.channels.split_first_mut() {
            for channel in rest {
                channel.copy_from_slice(mono);
            }
        }
    }
}
