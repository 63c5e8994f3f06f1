use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::buffer::SampleBuffer;
use crate::dsp::waveform;
use crate::dsp::{Arpeggiator, DelayLine, Envelope, Waveform, Xorshift32};
use crate::engine::Engine;
use crate::synth::timbre::Timbre;

#[cfg(feature = "rtrb")]
use crate::synth::control::{VoiceCommand, VoiceController};

/// Karplus-Strong feedback damping per step.
const ENERGY_DECAY: f32 = 0.990;

/// Live notes with a decay stage shorter than this have the stage disabled
/// entirely; the ring-out fade supplies the tail instead.
const LIVE_DECAY_THRESHOLD: f32 = 0.75;

/// A released live note keeps sounding for at least this fraction of a bar.
const RING_OUT_DIVISOR: usize = 32;

/// Cross-thread render interruption flag.
///
/// Stored by a control thread (Release), observed once per rendered sample
/// inside the synthesis loop (Acquire). A set token makes the current render
/// pass stop early; the voice clears it again before the next pass so a
/// single request can never pin the voice silent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cache lifecycle of a sequenced voice's pre-rendered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// No cache pass running; contents may be absent or stale.
    Idle,
    /// A cache pass is filling the buffer.
    Caching,
    /// The buffer holds the note in its entirety.
    Completed,
}

/// A single sounding note.
///
/// Sequenced voices know their position on the timeline and can pre-render
/// ("cache") their entire buffer during idle time; live voices synthesize a
/// quantum at a time for as long as the key is held, then ring out. A voice
/// may own a secondary-oscillator child voice whose output is merged into
/// the parent's buffer; the child never has a buffer of its own.
#[derive(Debug)]
pub struct SynthVoice {
    engine: Arc<Engine>,

    frequency: f32,
    base_frequency: f32,
    position: usize,
    /// Note length in sequencer steps; fractional lengths are valid.
    length: f32,
    volume: f32,
    is_sequenced: bool,
    has_parent: bool,

    waveform: Waveform,
    envelope: Envelope,
    phase: f32,
    phase_increment: f32,
    pulse_phase: f32,
    pulse_lfo_position: f32,
    rng: Xorshift32,
    string: Option<DelayLine>,
    arpeggiator: Option<Arpeggiator>,
    osc2: Option<Box<SynthVoice>>,

    buffer: Option<SampleBuffer>,
    sample_start: usize,
    sample_end: usize,
    sample_length: usize,
    write_index: usize,

    state: RenderState,
    cancel: CancelToken,
    locked: bool,
    pending_recalc: bool,
    auto_cache: bool,
    bulk_cacheable: bool,

    min_ring_out: isize,
    has_min_length: bool,
    queued_for_deletion: bool,
    deletable: bool,

    #[cfg(feature = "rtrb")]
    commands: Option<rtrb::Consumer<VoiceCommand>>,
}

impl SynthVoice {
    /// A voice bound to a sequencer range: audible from `position` for
    /// `length` steps, eligible for full-buffer caching.
    pub fn sequenced(
        engine: &Arc<Engine>,
        timbre: &Timbre,
        frequency: f32,
        position: usize,
        length: f32,
    ) -> Self {
        Self::init(engine, timbre, frequency, position, length, true, false, false)
    }

    /// Like [`sequenced`](Self::sequenced), but caches itself immediately on
    /// construction and again after every recalculation, instead of waiting
    /// for a bulk-cache pass or the first playback read.
    pub fn sequenced_with_auto_cache(
        engine: &Arc<Engine>,
        timbre: &Timbre,
        frequency: f32,
        position: usize,
        length: f32,
    ) -> Self {
        Self::init(engine, timbre, frequency, position, length, true, false, true)
    }

    /// A voice played live: synthesized quantum by quantum until released.
    pub fn live(engine: &Arc<Engine>, timbre: &Timbre, frequency: f32) -> Self {
        Self::init(engine, timbre, frequency, 0, 0.0, false, false, false)
    }

    fn init(
        engine: &Arc<Engine>,
        timbre: &Timbre,
        frequency: f32,
        position: usize,
        length: f32,
        is_sequenced: bool,
        has_parent: bool,
        auto_cache: bool,
    ) -> Self {
        let mut envelope = timbre.envelope.clone();
        if !is_sequenced && envelope.decay() < LIVE_DECAY_THRESHOLD {
            envelope.set_decay(0.0);
        }

        let mut voice = Self {
            engine: Arc::clone(engine),
            frequency,
            base_frequency: frequency,
            position,
            length,
            volume: timbre.volume,
            is_sequenced,
            has_parent,
            waveform: timbre.waveform,
            envelope,
            phase: 0.0,
            phase_increment: 0.0,
            pulse_phase: 0.0,
            pulse_lfo_position: 0.0,
            rng: Xorshift32::from_clock(),
            string: None,
            arpeggiator: None,
            osc2: None,
            buffer: None,
            sample_start: 0,
            sample_end: 0,
            sample_length: 0,
            write_index: 0,
            state: RenderState::Idle,
            cancel: CancelToken::default(),
            locked: false,
            pending_recalc: false,
            auto_cache,
            bulk_cacheable: false,
            min_ring_out: 0,
            // sequenced events play their full range, no early release
            has_min_length: is_sequenced,
            queued_for_deletion: false,
            deletable: false,
            #[cfg(feature = "rtrb")]
            commands: None,
        };

        if !has_parent && timbre.osc2.active {
            voice.attach_secondary(position, length, timbre);
        }
        voice.set_frequency_full(frequency, true, true);
        voice.apply_modules(timbre);
        voice.calculate_buffers();
        voice
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn base_frequency(&self) -> f32 {
        self.base_frequency
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn is_sequenced(&self) -> bool {
        self.is_sequenced
    }

    pub fn sample_start(&self) -> usize {
        self.sample_start
    }

    pub fn sample_end(&self) -> usize {
        self.sample_end
    }

    pub fn sample_length(&self) -> usize {
        self.sample_length
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn caching_completed(&self) -> bool {
        self.state == RenderState::Completed
    }

    pub fn is_deletable(&self) -> bool {
        self.deletable
    }

    pub fn is_queued_for_deletion(&self) -> bool {
        self.queued_for_deletion
    }

    pub fn secondary(&self) -> Option<&SynthVoice> {
        self.osc2.as_deref()
    }

    /// The voice's own buffer: the cached note for sequenced voices, the
    /// last rendered quantum for live ones. Secondary oscillators have none.
    pub fn buffer(&self) -> Option<&SampleBuffer> {
        self.buffer.as_ref()
    }

    /// The voice's buffer, guaranteed up to date: a sequenced voice whose
    /// cache is incomplete fills it inline before returning.
    pub fn refresh_buffer(&mut self) -> Option<&SampleBuffer> {
        if self.cached_mode() && self.state != RenderState::Completed {
            self.start_cache();
        }
        self.buffer.as_ref()
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    /// A handle other threads may use to interrupt a running render pass.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.set_frequency_full(frequency, true, true);
    }

    /// Retune the voice. `all_oscillators` scales the secondary oscillator
    /// by the same ratio, preserving its detune relative to the parent;
    /// `store_as_base` overwrites the remembered base pitch (false for
    /// transient retunes such as arpeggiator steps).
    pub fn set_frequency_full(
        &mut self,
        frequency: f32,
        all_oscillators: bool,
        store_as_base: bool,
    ) {
        let previous = self.frequency;
        self.frequency = frequency;
        self.phase_increment = frequency / self.engine.spec.sample_rate;
        if store_as_base {
            self.base_frequency = frequency;
        }
        if self.waveform == Waveform::Plucked {
            self.init_pluck();
        }
        if all_oscillators {
            if let Some(osc2) = &mut self.osc2 {
                let ratio = if previous > 0.0 { frequency / previous } else { 1.0 };
                let retuned = osc2.frequency * ratio;
                osc2.set_frequency_full(retuned, true, store_as_base);
            }
        }
    }

    /// Size the string to one period of the current frequency and excite it
    /// with noise. An existing line of the right size is re-plucked in place.
    fn init_pluck(&mut self) {
        let capacity = ((self.engine.spec.sample_rate / self.frequency).round() as usize).max(1);
        match &mut self.string {
            Some(line) if line.capacity() == capacity => line.flush(),
            _ => self.string = Some(DelayLine::new(capacity)),
        }
        if let Some(line) = &mut self.string {
            line.pluck(&mut self.rng);
        }
    }

    /// Defer buffer recalculation until [`unlock`](Self::unlock).
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Lift the lock; a recalculation requested in the meantime runs now,
    /// once, no matter how many times it was asked for.
    pub fn unlock(&mut self) {
        self.locked = false;
        if std::mem::take(&mut self.pending_recalc) {
            self.calculate_buffers();
        }
    }

    /// Re-derive sample range, envelope length and buffer storage from the
    /// current timing and note properties. Runs after construction, tempo
    /// changes and property updates; deferred while the voice is locked.
    pub fn calculate_buffers(&mut self) {
        if self.locked {
            self.pending_recalc = true;
            return;
        }

        let spec = self.engine.spec;
        if self.is_sequenced {
            if self.state == RenderState::Caching {
                self.cancel.request();
            }
            let step = self.engine.timing.samples_per_step();
            self.sample_length = (f64::from(self.length) * step).round() as usize;
            self.sample_start = (self.position as f64 * step).round() as usize;
            self.sample_end = self.sample_start + self.sample_length;
        } else {
            let bar = self.engine.timing.samples_per_bar();
            // a quick release should still ring for a 32nd note
            self.min_ring_out = (bar / RING_OUT_DIVISOR) as isize;
            // the full bar length drives the amplitude swell of a held note
            self.sample_length = bar;
            self.has_min_length = false;
        }

        self.envelope.set_total_length(self.sample_length);

        // secondary oscillators write into their parent's buffer
        if !self.has_parent {
            let frames = if spec.event_caching && self.is_sequenced {
                self.sample_length
            } else {
                spec.quantum
            };
            let reallocate = self.buffer.as_ref().map_or(true, |b| b.frames() != frames);
            if reallocate {
                self.buffer = Some(SampleBuffer::new(
                    spec.channels,
                    frames,
                    self.engine.pool().clone(),
                ));
            }
        }

        if self.is_sequenced {
            if self.waveform == Waveform::Plucked {
                self.init_pluck();
            }
            if spec.event_caching {
                // reset here, not in start_cache, so a stale cancel can
                // never pin the voice in a permanently empty cache
                self.reset_cache();
                if self.auto_cache && !self.has_parent {
                    if self.state == RenderState::Caching {
                        self.cancel.request();
                    } else {
                        self.start_cache();
                    }
                }
            }
        }
    }

    fn reset_cache(&mut self) {
        self.write_index = 0;
        if self.state != RenderState::Caching {
            self.state = RenderState::Idle;
            self.cancel.clear();
        }
    }

    pub fn set_bulk_cacheable(&mut self, value: bool) {
        self.bulk_cacheable = value;
    }

    /// Pre-render the whole note into the voice's own buffer.
    pub fn start_cache(&mut self) {
        if self.buffer.is_none() {
            return;
        }
        self.state = RenderState::Caching;
        self.render_into_own_buffer();
    }

    /// Adopt new note properties and a (possibly edited) timbre. A running
    /// cache pass is cancelled and restarts with the new properties;
    /// otherwise buffers are recalculated immediately.
    pub fn update_properties(&mut self, position: usize, length: f32, timbre: &Timbre) {
        self.waveform = timbre.waveform;
        self.position = position;
        self.length = length;
        self.envelope.clone_stages(&timbre.envelope);

        self.attach_secondary(position, length, timbre);
        self.apply_modules(timbre);

        if self.state == RenderState::Caching {
            if let Some(osc2) = &mut self.osc2 {
                osc2.cancel.request();
            }
            self.cancel.request();
        } else {
            self.calculate_buffers();
        }
    }

    /// Install the timbre's modules (currently the arpeggiator) on this
    /// voice and its secondary oscillator, restoring base pitches when a
    /// module that bent them is removed.
    pub fn apply_modules(&mut self, timbre: &Timbre) {
        let osc2_base = self.osc2.as_ref().map(|osc2| osc2.base_frequency);

        self.arpeggiator = timbre
            .arpeggiator_active
            .then(|| timbre.arpeggiator.clone());

        if let Some(osc2) = &mut self.osc2 {
            osc2.apply_modules(timbre);
        }

        let base = self.base_frequency;
        if let Some(arpeggiator) = &self.arpeggiator {
            let pitch = arpeggiator.pitch_for_step(arpeggiator.step(), base);
            self.set_frequency_full(pitch, true, false);
        } else {
            self.set_frequency_full(base, false, true);
            if let (Some(osc2), Some(osc2_base)) = (&mut self.osc2, osc2_base) {
                osc2.set_frequency_full(osc2_base, false, true);
            }
        }
    }

    /// Create or retune the secondary oscillator from the timbre's settings;
    /// inactive settings remove it.
    fn attach_secondary(&mut self, position: usize, length: f32, timbre: &Timbre) {
        let settings = timbre.osc2;
        if !settings.active {
            self.detach_secondary();
            return;
        }

        let detuned = self.frequency + self.frequency / 1_200.0 * settings.detune_cents;
        let mut target = detuned;
        if settings.octave_shift != 0 {
            if settings.octave_shift < 0 {
                target = detuned / ((settings.octave_shift * 2) as f32).abs();
            } else {
                target += detuned * ((settings.octave_shift * 2 - 1) as f32).abs();
            }
        }
        let fine = detuned / 12.0 * settings.fine_shift.abs();
        if settings.fine_shift < 0.0 {
            target -= fine;
        } else {
            target += fine;
        }

        if self.osc2.is_none() {
            // never auto-caching: only the parent may invoke the render
            self.osc2 = Some(Box::new(Self::init(
                &self.engine,
                timbre,
                self.frequency,
                position,
                length,
                self.is_sequenced,
                true,
                false,
            )));
        }
        if let Some(osc2) = &mut self.osc2 {
            osc2.waveform = settings.waveform;
            osc2.position = position;
            osc2.length = length;
            osc2.set_frequency_full(target, true, true);
            if osc2.state == RenderState::Caching {
                osc2.cancel.request();
            }
        }
    }

    fn detach_secondary(&mut self) {
        if let Some(osc2) = &mut self.osc2 {
            if osc2.state == RenderState::Caching {
                osc2.cancel.request();
            }
        }
        self.osc2 = None;
    }

    /// Flag the voice for removal. Sequenced voices (and live voices that
    /// already rang out) become deletable at once; a freshly released live
    /// voice is queued instead and becomes deletable after its minimum
    /// ring-out. Propagates to the secondary oscillator.
    pub fn request_deletion(&mut self, value: bool) {
        if self.is_sequenced || self.has_min_length {
            self.deletable = value;
        } else {
            self.queued_for_deletion = value;
        }
        if let Some(osc2) = &mut self.osc2 {
            osc2.request_deletion(value);
        }
    }

    /// Mix this sequenced voice into `output`, which covers the timeline
    /// range starting at `buffer_pos`. Reads from the cache when event
    /// caching is enabled (filling it first if needed), synthesizes the
    /// overlapping snippet on the fly otherwise.
    pub fn compose_into(&mut self, output: &mut SampleBuffer, buffer_pos: usize) {
        #[cfg(feature = "rtrb")]
        self.drain_commands();

        let frames = output.frames();
        let in_range = buffer_pos + frames > self.sample_start && buffer_pos < self.sample_end;
        if !in_range {
            return;
        }

        if self.cached_mode() {
            if self.state != RenderState::Completed {
                self.start_cache();
            }
            if let Some(cached) = self.buffer.take() {
                let read_offset = buffer_pos.saturating_sub(self.sample_start);
                let write_offset = self.sample_start.saturating_sub(buffer_pos);
                output.mix(&cached, read_offset, write_offset, 1.0);
                self.buffer = Some(cached);
            }
        } else {
            self.write_index = buffer_pos.saturating_sub(self.sample_start);
            let write_offset = self.sample_start.saturating_sub(buffer_pos);
            self.render_into_own_buffer();
            if let Some(rendered) = &self.buffer {
                output.mix(rendered, 0, write_offset, 1.0);
            }
            // end of the event reached; rewind for the next sequencer loop
            if self.write_index >= self.sample_length {
                self.calculate_buffers();
            }
        }
    }

    /// Synthesize one live quantum of `frames` samples into the voice's own
    /// buffer, counting down the post-release ring-out and fading the tail
    /// just before the voice becomes deletable.
    pub fn render_once(&mut self, frames: usize) {
        #[cfg(feature = "rtrb")]
        self.drain_commands();

        let reallocate = self.buffer.as_ref().map_or(true, |b| b.frames() != frames);
        if reallocate {
            self.buffer = Some(SampleBuffer::new(
                self.engine.spec.channels,
                frames,
                self.engine.pool().clone(),
            ));
        }
        self.render_into_own_buffer();

        if self.queued_for_deletion && self.min_ring_out > 0 {
            self.min_ring_out -= frames as isize;
        }
        if self.min_ring_out <= 0 {
            self.has_min_length = true;
            let queued = self.queued_for_deletion;
            self.request_deletion(queued);
            if queued {
                self.fade_tail(frames);
            }
        }
    }

    fn fade_tail(&mut self, frames: usize) {
        if let Some(buffer) = &mut self.buffer {
            let fade_len = frames.div_ceil(4);
            let fade_start = frames.saturating_sub(fade_len);
            let step = 1.0 / fade_len as f32;
            for channel in buffer.channels_mut() {
                let mut amp = 1.0;
                for sample in &mut channel[fade_start..] {
                    *sample *= amp;
                    amp -= step;
                }
            }
        }
    }

    fn cached_mode(&self) -> bool {
        self.engine.spec.event_caching && self.is_sequenced
    }

    fn render_into_own_buffer(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            self.render(&mut buffer);
            self.buffer = Some(buffer);
        }
    }

    /// The synthesis loop: fill `out` sample by sample from the current
    /// waveform, merge in the secondary oscillator, apply the envelope and
    /// advance the cache state machine.
    pub fn render(&mut self, out: &mut SampleBuffer) {
        #[cfg(feature = "rtrb")]
        self.drain_commands();

        let frames = out.frames();
        let render_start = if self.cached_mode() { self.write_index } else { 0 };
        if self.sample_length == 0 || render_start >= self.sample_length || frames == 0 {
            out.silence();
            return;
        }

        let max_index = self.sample_length - 1;
        let mut render_end = render_start + frames - 1;
        if render_end > max_index {
            // shorter than the buffer; the unwritten tail must stay silent
            render_end = max_index;
            out.silence();
        }

        let has_osc2 = self.osc2.is_some();
        let mut cancelled = false;
        let mut cursor = render_start;

        while cursor <= render_end {
            let mut amp = self.next_amplitude();
            if has_osc2 {
                // each oscillator contributes at half strength
                amp *= 0.5;
            }
            out.write_frame(cursor - render_start, amp * self.volume);

            if self.cancel.is_requested() {
                cancelled = true;
                break;
            }
            cursor += 1;
        }
        let rendered = if cancelled {
            cursor - render_start
        } else {
            render_end - render_start + 1
        };

        if has_osc2 && !cancelled {
            // a scratch buffer keeps the child's write target stable even
            // when this voice's own buffer is reallocated mid-note
            let scratch_len = if self.cached_mode() {
                render_end - render_start + 1
            } else {
                frames
            };
            let mut scratch =
                SampleBuffer::new(out.channel_count(), scratch_len, self.engine.pool().clone());
            if let Some(osc2) = &mut self.osc2 {
                osc2.render(&mut scratch);
            }
            out.mix(&scratch, 0, 0, 1.0);
        }

        if !self.has_parent {
            self.envelope.apply(out, self.write_index);
            self.write_index += rendered;
        }

        if self.cached_mode() {
            self.state = RenderState::Idle;
            if cancelled {
                // clear before recalculating, or the restarted pass would
                // cancel itself immediately
                self.cancel.clear();
                debug!(
                    position = self.position,
                    "cache pass cancelled, recalculating"
                );
                self.calculate_buffers();
            } else {
                if render_end == max_index {
                    self.state = RenderState::Completed;
                }
                if self.bulk_cacheable {
                    self.auto_cache = true;
                }
            }
        }
        self.cancel.clear();
    }

    /// One sample of the current waveform, with phase bookkeeping and the
    /// per-sample arpeggiator step.
    fn next_amplitude(&mut self) -> f32 {
        let amp = match self.waveform {
            Waveform::Sine => waveform::sine(self.phase),
            Waveform::Sawtooth => waveform::sawtooth(self.phase),
            Waveform::Square => waveform::square(self.phase),
            Waveform::Triangle => waveform::triangle(self.phase),
            Waveform::Pulse => {
                let amp = waveform::pulse(self.pulse_phase, self.pulse_lfo_position);
                self.pulse_phase += TAU * self.phase_increment;
                if self.pulse_phase >= TAU {
                    self.pulse_phase -= TAU;
                }
                self.pulse_lfo_position += 1.0;
                amp
            }
            Waveform::Noise => waveform::noise(self.phase, &mut self.rng),
            Waveform::Plucked => match &mut self.string {
                Some(line) => line.pluck_step(ENERGY_DECAY),
                None => 0.0,
            },
        };

        self.phase += self.phase_increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let base = self.base_frequency;
        let retuned = self.arpeggiator.as_mut().and_then(|arpeggiator| {
            arpeggiator
                .advance()
                .then(|| arpeggiator.pitch_for_step(arpeggiator.step(), base))
        });
        if let Some(pitch) = retuned {
            self.set_frequency_full(pitch, true, false);
        }
        amp
    }

    /// Hand out a control handle connected to this voice; commands are
    /// drained at the start of every render pass.
    #[cfg(feature = "rtrb")]
    pub fn controller(&mut self, capacity: usize) -> VoiceController {
        let (producer, consumer) = rtrb::RingBuffer::new(capacity);
        self.commands = Some(consumer);
        VoiceController::new(producer, self.cancel.clone())
    }

    #[cfg(feature = "rtrb")]
    fn drain_commands(&mut self) {
        let Some(mut commands) = self.commands.take() else {
            return;
        };
        while let Ok(command) = commands.pop() {
            self.apply_command(command);
        }
        self.commands = Some(commands);
    }

    #[cfg(feature = "rtrb")]
    fn apply_command(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::SetFrequency(frequency) => self.set_frequency(frequency),
            VoiceCommand::SetVolume(volume) => self.volume = volume,
            VoiceCommand::RequestDeletion => self.request_deletion(true),
            VoiceCommand::UpdateProperties {
                position,
                length,
                timbre,
            } => self.update_properties(position, length, &timbre),
            VoiceCommand::Lock => self.lock(),
            VoiceCommand::Unlock => self.unlock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineSpec, Timing};

    fn test_engine(event_caching: bool) -> Arc<Engine> {
        let spec = EngineSpec {
            sample_rate: 44_100.0,
            quantum: 512,
            channels: 2,
            event_caching,
        };
        Engine::new(spec, Timing::new(5_512.5, 88_200))
    }

    fn small_engine() -> Arc<Engine> {
        // one step = one quantum, tiny bar for fast ring-out tests
        let spec = EngineSpec {
            sample_rate: 44_100.0,
            quantum: 512,
            channels: 2,
            event_caching: true,
        };
        Engine::new(spec, Timing::new(512.0, 2_048))
    }

    #[test]
    fn phase_increment_is_frequency_over_sample_rate() {
        let engine = test_engine(true);
        let voice = SynthVoice::sequenced(&engine, &Timbre::default(), 440.0, 0, 1.0);
        assert!((voice.phase_increment - 440.0 / 44_100.0).abs() < 1e-9);
    }

    #[test]
    fn sequenced_range_follows_timing() {
        let engine = test_engine(true);
        let voice = SynthVoice::sequenced(&engine, &Timbre::default(), 440.0, 2, 2.0);

        assert_eq!(voice.sample_start(), 11_025);
        assert_eq!(voice.sample_length(), 11_025);
        assert_eq!(voice.sample_end(), 22_050);
        assert_eq!(voice.envelope.total_length(), 11_025);
    }

    #[test]
    fn plucked_string_spans_one_period() {
        let engine = test_engine(true);
        let mut timbre = Timbre::default();
        timbre.waveform = Waveform::Plucked;
        let voice = SynthVoice::sequenced(&engine, &timbre, 441.0, 0, 1.0);

        let string = voice.string.as_ref().unwrap();
        assert_eq!(string.capacity(), 100); // 44100 / 441
        assert!(string.is_full());
    }

    #[test]
    fn cache_completes_in_one_pass() {
        let engine = small_engine();
        let mut voice = SynthVoice::sequenced(&engine, &Timbre::default(), 440.0, 0, 1.0);

        assert_eq!(voice.state(), RenderState::Idle);
        voice.start_cache();
        assert!(voice.caching_completed());
        assert_eq!(voice.write_index, voice.sample_length());
    }

    #[test]
    fn auto_cache_variant_caches_at_construction() {
        let engine = small_engine();
        let voice =
            SynthVoice::sequenced_with_auto_cache(&engine, &Timbre::default(), 440.0, 0, 1.0);
        assert!(voice.caching_completed());
    }

    #[test]
    fn refresh_buffer_fills_an_incomplete_cache_inline() {
        let engine = small_engine();
        let mut voice = SynthVoice::sequenced(&engine, &Timbre::default(), 440.0, 0, 1.0);
        assert!(!voice.caching_completed());

        let buffer = voice.refresh_buffer().unwrap();
        assert!(buffer.channel(0).unwrap().iter().any(|&s| s != 0.0));
        assert!(voice.caching_completed());
    }

    #[test]
    fn sine_note_renders_bounded_audio_on_all_channels() {
        let engine = test_engine(true);
        let pool = engine.pool().clone();
        let mut voice = SynthVoice::sequenced(&engine, &Timbre::default(), 440.0, 0, 1.0);
        let mut output = SampleBuffer::new(2, 512, pool);

        voice.compose_into(&mut output, 0);

        for channel in output.channels() {
            let peak = channel.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(peak > 0.0, "channel stayed silent");
            assert!(peak <= 1.0, "channel clipped: {peak}");
        }
    }

    #[test]
    fn uncached_compose_matches_event_window() {
        let engine = small_engine();
        let spec_uncached = EngineSpec {
            event_caching: false,
            ..engine.spec
        };
        let engine = Engine::new(spec_uncached, Timing::new(512.0, 2_048));
        let pool = engine.pool().clone();

        // event occupies steps 1..2, i.e. samples 512..1024
        let mut voice = SynthVoice::sequenced(&engine, &Timbre::default(), 440.0, 1, 1.0);
        let mut output = SampleBuffer::new(2, 512, pool.clone());

        voice.compose_into(&mut output, 0);
        assert!(output.channel(0).unwrap().iter().all(|&s| s == 0.0));

        voice.compose_into(&mut output, 512);
        assert!(output.channel(0).unwrap().iter().any(|&s| s != 0.0));
    }

    #[test]
    fn lock_defers_recalculation_until_unlock() {
        let engine = test_engine(true);
        let mut voice = SynthVoice::sequenced(&engine, &Timbre::default(), 440.0, 0, 1.0);

        voice.lock();
        let start_before = voice.sample_start();
        voice.position = 4;
        voice.calculate_buffers();
        voice.calculate_buffers();
        assert_eq!(voice.sample_start(), start_before);
        assert!(voice.pending_recalc);

        voice.unlock();
        assert_eq!(voice.sample_start(), (4.0 * 5_512.5_f64).round() as usize);
        assert!(!voice.pending_recalc);
    }

    #[test]
    fn cancel_interrupts_and_recovers() {
        let engine = small_engine();
        let mut voice = SynthVoice::sequenced(&engine, &Timbre::default(), 440.0, 0, 2.0);

        voice.cancel_token().request();
        voice.start_cache();
        // the cancelled pass recalculates and clears the token; a second
        // pass runs to completion
        assert!(!voice.cancel.is_requested());
        voice.start_cache();
        assert!(voice.caching_completed());
    }

    #[test]
    fn secondary_oscillator_is_detuned() {
        let engine = test_engine(true);
        let mut timbre = Timbre::default();
        timbre.osc2.active = true;
        timbre.osc2.detune_cents = 100.0;

        let voice = SynthVoice::sequenced(&engine, &timbre, 440.0, 0, 1.0);
        let osc2 = voice.secondary().unwrap();

        // 440 + 440/1200*100
        assert!((osc2.frequency() - 476.666_66).abs() < 1e-2);
        assert!(osc2.buffer().is_none());
    }

    #[test]
    fn octave_shift_down_divides_frequency() {
        let engine = test_engine(true);
        let mut timbre = Timbre::default();
        timbre.osc2.active = true;
        timbre.osc2.octave_shift = -1;

        let voice = SynthVoice::sequenced(&engine, &timbre, 440.0, 0, 1.0);
        assert!((voice.secondary().unwrap().frequency() - 220.0).abs() < 1e-3);
    }

    #[test]
    fn retune_preserves_secondary_ratio() {
        let engine = test_engine(true);
        let mut timbre = Timbre::default();
        timbre.osc2.active = true;
        timbre.osc2.detune_cents = 50.0;

        let mut voice = SynthVoice::sequenced(&engine, &timbre, 440.0, 0, 1.0);
        let ratio = voice.secondary().unwrap().frequency() / voice.frequency();

        voice.set_frequency(550.0);
        let new_ratio = voice.secondary().unwrap().frequency() / voice.frequency();
        assert!((ratio - new_ratio).abs() < 1e-4);
    }

    #[test]
    fn deactivating_osc2_removes_the_child() {
        let engine = test_engine(true);
        let mut timbre = Timbre::default();
        timbre.osc2.active = true;

        let mut voice = SynthVoice::sequenced(&engine, &timbre, 440.0, 0, 1.0);
        assert!(voice.secondary().is_some());

        timbre.osc2.active = false;
        voice.update_properties(0, 1.0, &timbre);
        assert!(voice.secondary().is_none());
    }

    #[test]
    fn live_voice_rings_out_before_deletion() {
        let engine = small_engine();
        let mut voice = SynthVoice::live(&engine, &Timbre::default(), 330.0);

        // bar = 2048 -> minimum ring-out = 64 samples
        voice.request_deletion(true);
        assert!(voice.is_queued_for_deletion());
        assert!(!voice.is_deletable());

        voice.render_once(512);
        assert!(voice.is_deletable());

        // the final quantum fades to (near) silence at its very end
        let channel = voice.buffer().unwrap().channel(0).unwrap();
        assert!(channel[511].abs() < 0.01);
    }

    #[test]
    fn live_voice_with_short_decay_drops_the_stage() {
        let engine = test_engine(true);
        let mut timbre = Timbre::default();
        timbre.envelope = Envelope::adsr(0.0, 0.5, 0.6, 0.0);

        let voice = SynthVoice::live(&engine, &timbre, 440.0);
        assert_eq!(voice.envelope.decay(), 0.0);

        let sequenced = SynthVoice::sequenced(&engine, &timbre, 440.0, 0, 1.0);
        assert_eq!(sequenced.envelope.decay(), 0.5);
    }

    #[test]
    fn arpeggiator_retunes_without_touching_base() {
        let engine = small_engine();
        let mut timbre = Timbre::default();
        timbre.arpeggiator = Arpeggiator::new(64, vec![0.0, 12.0]);
        timbre.arpeggiator_active = true;

        let mut voice = SynthVoice::live(&engine, &timbre, 220.0);
        voice.render_once(512);

        assert_eq!(voice.base_frequency(), 220.0);
        // after several 64-sample steps the voice sits on one of the
        // pattern's pitches
        let f = voice.frequency();
        assert!(
            (f - 220.0).abs() < 1e-2 || (f - 440.0).abs() < 1e-2,
            "unexpected frequency {f}"
        );
    }

    #[cfg(feature = "rtrb")]
    #[test]
    fn commands_are_applied_at_render_time() {
        use crate::synth::control::VoiceCommand;

        let engine = small_engine();
        let mut voice = SynthVoice::live(&engine, &Timbre::default(), 220.0);
        let mut controller = voice.controller(8);

        controller.send(VoiceCommand::SetVolume(0.25)).unwrap();
        controller.send(VoiceCommand::SetFrequency(330.0)).unwrap();
        assert_eq!(voice.volume(), 0.8);

        voice.render_once(512);
        assert_eq!(voice.volume(), 0.25);
        assert_eq!(voice.frequency(), 330.0);
    }
}
