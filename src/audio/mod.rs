pub mod adapter;
pub mod clock;
pub mod decoder;
pub mod device;
pub mod mpeg;
pub mod player;
pub mod resampler;
pub mod ring_buffer;
pub mod session;
mod task;

#[cfg(test)]
pub mod tests;

use std::sync::{Mutex, MutexGuard, PoisonError};
use crate::error::AudioError;

// Re-export the caller-facing player types
pub use player::{Player, PlayerState, PlayerStatus};

// Re-export decoding types
pub use adapter::{DecodeOutcome, DecoderAdapter};
pub use decoder::{DecoderFactory, FrameDecoder, FrameInfo, Mp3FrameDecoder};

// Re-export buffering and timing types
pub use clock::{Clock, ManualClock, PrimingGate, StarvationTimer, SystemClock};
pub use ring_buffer::{ByteRingBuffer, OverflowPolicy};
pub use session::SessionGuard;

pub use device::{CpalSink, DeviceManager};
pub use resampler::LinearResampler;

/// One block of decoded 16-bit PCM, interleaved across channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmBlock<'a> {
    pub samples: &'a [i16],
    pub channels: u16,
    pub sample_rate: u32,
}

impl<'a> PcmBlock<'a> {
    /// Size of the block in bytes (2 bytes per sample)
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Destination for decoded PCM
///
/// The player calls `push` from its background thread only, one block at a
/// time and in decode order.
pub trait PlaybackSink: Send {
    /// Hand one block of PCM to the output
    fn push(&mut self, block: &PcmBlock<'_>) -> Result<(), AudioError>;

    /// Halt output and drop anything still queued
    fn stop(&mut self) -> Result<(), AudioError>;
}

impl<S: PlaybackSink + ?Sized> PlaybackSink for Box<S> {
    fn push(&mut self, block: &PcmBlock<'_>) -> Result<(), AudioError> {
        (**self).push(block)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        (**self).stop()
    }
}

/// Lock a mutex, recovering the data if another thread panicked while holding it
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
