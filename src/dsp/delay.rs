use crate::dsp::noise::Xorshift32;

/// Fixed-capacity FIFO sample queue feeding the plucked-string algorithm.
///
/// The feedback loop keeps the line full once plucked: every render step
/// dequeues one sample and enqueues one sample, so in correct use the queue
/// never runs dry. `dequeue`/`peek` still report emptiness explicitly rather
/// than reading stale data.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    head: usize,
    len: usize,
}

impl DelayLine {
    /// Create an empty line holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0.0; capacity],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buffer.len()
    }

    /// Append a sample. When the line is full the oldest sample is dropped
    /// to make room, keeping enqueue usable from the feedback loop.
    pub fn enqueue(&mut self, value: f32) {
        let capacity = self.buffer.len();
        let tail = (self.head + self.len) % capacity;
        self.buffer[tail] = value;
        if self.len < capacity {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % capacity;
        }
    }

    /// Remove and return the oldest sample.
    pub fn dequeue(&mut self) -> Option<f32> {
        if self.len == 0 {
            return None;
        }
        let value = self.buffer[self.head];
        self.head = (self.head + 1) % self.buffer.len();
        self.len -= 1;
        Some(value)
    }

    /// Read the next-out sample without removing it.
    pub fn peek(&self) -> Option<f32> {
        if self.len == 0 {
            None
        } else {
            Some(self.buffer[self.head])
        }
    }

    /// Clear to empty without changing capacity.
    pub fn flush(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Fill the line completely with noise: the initial excitation ("pluck")
    /// of the string.
    pub fn pluck(&mut self, noise: &mut Xorshift32) {
        self.flush();
        for _ in 0..self.buffer.len() {
            self.enqueue(noise.next_bipolar());
        }
    }

    /// One Karplus–Strong step: average the two oldest samples, damp by
    /// `decay`, feed the result back, and return the new front of the line.
    #[inline]
    pub fn pluck_step(&mut self, decay: f32) -> f32 {
        let first = self.dequeue().unwrap_or(0.0);
        let second = self.peek().unwrap_or(first);
        let fed_back = decay * ((first + second) / 2.0);
        self.enqueue(fed_back);
        self.peek().unwrap_or(fed_back)
    }
}
