//! Test doubles shared by the audio module tests.

mod session_races;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::decoder::{DecoderFactory, FrameDecoder, FrameInfo};
use crate::audio::{PcmBlock, PlaybackSink};
use crate::config::PlayerConfig;
use crate::error::{AudioError, DecodeError};

/// Decoder stub that turns every `frame` input bytes into `frame` samples
/// carrying the byte values, so tests can check delivery order
pub struct EchoDecoder {
    frame: usize,
}

impl FrameDecoder for EchoDecoder {
    fn decode_frame(&mut self, input: &[u8], pcm: &mut [i16]) -> Result<FrameInfo, DecodeError> {
        if input.len() < self.frame {
            return Ok(FrameInfo::default());
        }

        for (out, &byte) in pcm.iter_mut().zip(&input[..self.frame]) {
            *out = byte as i16;
        }

        Ok(FrameInfo {
            frame_bytes: self.frame,
            samples: self.frame,
            channels: 1,
            sample_rate: 8000,
        })
    }

    fn reset(&mut self) {}
}

pub fn echo_factory(frame: usize) -> DecoderFactory {
    Box::new(move || Ok(Box::new(EchoDecoder { frame }) as Box<dyn FrameDecoder>))
}

pub fn failing_factory() -> DecoderFactory {
    Box::new(|| Err(DecodeError::DecoderInit("out of memory".to_string())))
}

/// Fails the first `failures` calls, then hands out echo decoders
pub fn flaky_factory(failures: usize, frame: usize) -> DecoderFactory {
    let mut remaining = failures;
    Box::new(move || {
        if remaining > 0 {
            remaining -= 1;
            return Err(DecodeError::DecoderInit("codec busy".to_string()));
        }
        Ok(Box::new(EchoDecoder { frame }) as Box<dyn FrameDecoder>)
    })
}

/// Decoder whose every call fails
pub struct BrokenDecoder;

impl FrameDecoder for BrokenDecoder {
    fn decode_frame(&mut self, _input: &[u8], _pcm: &mut [i16]) -> Result<FrameInfo, DecodeError> {
        Err(DecodeError::DecodeFailed("bitstream error".to_string()))
    }

    fn reset(&mut self) {}
}

/// `count` silent MPEG-1 Layer III frames: 128 kbps, 44.1 kHz, mono, 417 bytes each
pub fn silent_mp3_frames(count: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(count * 417);
    for _ in 0..count {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0xC0]);
        data.extend(frame);
    }
    data
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBlock {
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Sink that keeps everything pushed to it; clones share the recording
#[derive(Clone, Default)]
pub struct RecordingSink {
    blocks: Arc<Mutex<Vec<RecordedBlock>>>,
    stops: Arc<AtomicUsize>,
    fail_pushes: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that records nothing and rejects every push
    pub fn failing() -> Self {
        Self {
            fail_pushes: true,
            ..Self::default()
        }
    }

    pub fn blocks(&self) -> Vec<RecordedBlock> {
        self.blocks.lock().unwrap().clone()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn total_samples(&self) -> usize {
        self.blocks.lock().unwrap().iter().map(|b| b.samples.len()).sum()
    }

    /// Samples of an echo-decoded stream turned back into the bytes they came from
    pub fn echoed_bytes(&self) -> Vec<u8> {
        self.blocks
            .lock()
            .unwrap()
            .iter()
            .flat_map(|b| b.samples.iter().map(|&s| s as u8))
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl PlaybackSink for RecordingSink {
    fn push(&mut self, block: &PcmBlock<'_>) -> Result<(), AudioError> {
        if self.fail_pushes {
            return Err(AudioError::StreamError("device unplugged".to_string()));
        }

        self.blocks.lock().unwrap().push(RecordedBlock {
            samples: block.samples.to_vec(),
            channels: block.channels,
            sample_rate: block.sample_rate,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Defaults with a smaller ring and generous handshake timeouts for slow CI machines
pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        ring_buffer_capacity: 16 * 1024,
        start_timeout_ms: 2000,
        handshake_warn_ms: 500,
        alert_directory: PathBuf::from("alerts"),
        ..PlayerConfig::default()
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
