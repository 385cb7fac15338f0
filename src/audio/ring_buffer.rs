use serde::{Deserialize, Serialize};
use crate::error::AudioError;

/// What a write does when the buffer has no room left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Accept only what fits; the caller retries the rest
    #[default]
    Reject,
    /// Drop the oldest buffered bytes to make room
    Overwrite,
}

/// Fixed-capacity byte FIFO for compressed audio
///
/// Not synchronized on its own: the player keeps it behind its ring lock and
/// every access must happen with that lock held.
#[derive(Debug)]
pub struct ByteRingBuffer {
    buffer: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    used: usize,
    policy: OverflowPolicy,
}

impl ByteRingBuffer {
    /// Allocate a ring of `capacity` bytes
    pub fn with_capacity(capacity: usize, policy: OverflowPolicy) -> Result<Self, AudioError> {
        if capacity == 0 {
            return Err(AudioError::InitializationFailed(
                "ring buffer capacity must be non-zero".to_string(),
            ));
        }

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|e| AudioError::AllocationFailed(format!("ring buffer of {} bytes ({})", capacity, e)))?;
        buffer.resize(capacity, 0);

        Ok(Self {
            buffer,
            read_pos: 0,
            write_pos: 0,
            used: 0,
            policy,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes available for reading
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes that can be written without overflow
    pub fn free(&self) -> usize {
        self.capacity() - self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn is_full(&self) -> bool {
        self.used == self.capacity()
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Append bytes, returning how many were accepted
    ///
    /// With `Reject` this stops at the first byte that does not fit. With
    /// `Overwrite` the oldest bytes are dropped and the whole input is
    /// accepted; only its last `capacity` bytes survive when it is larger
    /// than the ring.
    pub fn write(&mut self, data: &[u8]) -> usize {
        match self.policy {
            OverflowPolicy::Reject => {
                let to_write = data.len().min(self.free());
                self.copy_in(&data[..to_write]);
                to_write
            }
            OverflowPolicy::Overwrite => {
                let capacity = self.capacity();
                let tail = if data.len() > capacity {
                    &data[data.len() - capacity..]
                } else {
                    data
                };

                let overflow = tail.len().saturating_sub(self.free());
                if overflow > 0 {
                    self.skip(overflow);
                }
                self.copy_in(tail);
                data.len()
            }
        }
    }

    /// Copy up to `out.len()` buffered bytes into `out`, returning the count
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let to_read = out.len().min(self.used);
        if to_read == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = to_read.min(capacity - self.read_pos);
        out[..first].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + first]);

        let second = to_read - first;
        if second > 0 {
            out[first..to_read].copy_from_slice(&self.buffer[..second]);
        }

        self.read_pos = (self.read_pos + to_read) % capacity;
        self.used -= to_read;
        to_read
    }

    /// Drop everything buffered
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.used = 0;
    }

    fn skip(&mut self, count: usize) {
        let count = count.min(self.used);
        self.read_pos = (self.read_pos + count) % self.capacity();
        self.used -= count;
    }

    fn copy_in(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= self.free());
        if data.is_empty() {
            return;
        }

        let capacity = self.capacity();
        let first = data.len().min(capacity - self.write_pos);
        self.buffer[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);

        let second = data.len() - first;
        if second > 0 {
            self.buffer[..second].copy_from_slice(&data[first..]);
        }

        self.write_pos = (self.write_pos + data.len()) % capacity;
        self.used += data.len();
    }
}
