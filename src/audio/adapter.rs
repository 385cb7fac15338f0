use std::sync::Mutex;

use crate::audio::decoder::{DecoderFactory, FrameDecoder, FrameInfo};
use crate::audio::ring_buffer::ByteRingBuffer;
use crate::audio::{lock, PcmBlock};
use crate::error::{AudioError, DecodeError};

/// Result of one `feed_and_decode` step
#[derive(Debug, PartialEq)]
pub enum DecodeOutcome<'a> {
    /// One frame decoded; the block borrows the adapter's PCM arena
    Decoded(PcmBlock<'a>),
    /// Bytes were consumed without producing audio
    Skipped { bytes: usize },
    /// Nothing decodable until more bytes arrive
    NeedMoreData,
}

/// Staging arena between the ring buffer and a `FrameDecoder`
///
/// The raw and PCM buffers are allocated once and reused for every session;
/// only the counters are reset when a new session starts.
pub struct DecoderAdapter {
    decoder: Option<Box<dyn FrameDecoder>>,
    raw: Vec<u8>,
    cursor: usize,
    staged: usize,
    pcm: Vec<i16>,
    last_frame: FrameInfo,
    frames_decoded: u64,
}

impl DecoderAdapter {
    pub fn new(raw_capacity: usize, pcm_capacity: usize) -> Result<Self, AudioError> {
        Ok(Self {
            decoder: None,
            raw: allocate(raw_capacity, "decoder staging buffer")?,
            cursor: 0,
            staged: 0,
            pcm: allocate(pcm_capacity, "PCM buffer")?,
            last_frame: FrameInfo::default(),
            frames_decoded: 0,
        })
    }

    /// Get the decoder ready for a new stream
    ///
    /// The decoder is created on the first call and reset on later ones.
    pub fn prepare(&mut self, factory: &mut DecoderFactory) -> Result<(), DecodeError> {
        match self.decoder.as_mut() {
            Some(decoder) => decoder.reset(),
            None => self.decoder = Some(factory()?),
        }

        self.cursor = 0;
        self.staged = 0;
        self.last_frame = FrameInfo::default();
        self.frames_decoded = 0;
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.decoder.is_some()
    }

    /// Bytes held in the staging buffer and not yet consumed
    pub fn staged(&self) -> usize {
        self.staged
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn last_frame(&self) -> FrameInfo {
        self.last_frame
    }

    /// Drop whatever is staged, returning how many bytes were discarded
    pub fn discard_staged(&mut self) -> usize {
        let dropped = self.staged;
        self.cursor = 0;
        self.staged = 0;
        dropped
    }

    /// Pull bytes from `ring` and decode at most one frame
    ///
    /// The ring lock is held only while bytes are copied out of it.
    pub fn feed_and_decode(&mut self, ring: &Mutex<ByteRingBuffer>) -> Result<DecodeOutcome<'_>, DecodeError> {
        if self.staged == 0 && lock(ring).is_empty() {
            return Ok(DecodeOutcome::NeedMoreData);
        }

        if self.cursor > 0 {
            self.raw.copy_within(self.cursor..self.cursor + self.staged, 0);
            self.cursor = 0;
        }

        if self.staged < self.raw.len() {
            let read = lock(ring).read(&mut self.raw[self.staged..]);
            self.staged += read;
        }

        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| DecodeError::DecoderInit("decoder used before prepare()".to_string()))?;
        let info = decoder.decode_frame(&self.raw[..self.staged], &mut self.pcm)?;
        let consumed = info.frame_bytes.min(self.staged);

        if consumed == 0 {
            if self.staged == self.raw.len() {
                // A full staging buffer that still cannot be decoded never will be
                log::warn!("Dropping {} undecodable staged bytes", self.staged);
                let bytes = self.discard_staged();
                return Ok(DecodeOutcome::Skipped { bytes });
            }
            return Ok(DecodeOutcome::NeedMoreData);
        }

        self.cursor += consumed;
        self.staged -= consumed;

        if info.samples == 0 {
            return Ok(DecodeOutcome::Skipped { bytes: consumed });
        }

        self.last_frame = info;
        self.frames_decoded += 1;

        Ok(DecodeOutcome::Decoded(PcmBlock {
            samples: &self.pcm[..info.samples.min(self.pcm.len())],
            channels: info.channels,
            sample_rate: info.sample_rate,
        }))
    }
}

fn allocate<T: Default + Clone>(len: usize, what: &str) -> Result<Vec<T>, AudioError> {
    if len == 0 {
        return Err(AudioError::InitializationFailed(format!("{} size must be non-zero", what)));
    }

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|e| AudioError::AllocationFailed(format!("{} ({})", what, e)))?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring_buffer::OverflowPolicy;
    use crate::audio::tests::{echo_factory, failing_factory};

    fn ring_with(data: &[u8]) -> Mutex<ByteRingBuffer> {
        let mut ring = ByteRingBuffer::with_capacity(4096, OverflowPolicy::Reject).unwrap();
        ring.write(data);
        Mutex::new(ring)
    }

    fn prepared(raw: usize, frame: usize) -> DecoderAdapter {
        let mut adapter = DecoderAdapter::new(raw, 256).unwrap();
        adapter.prepare(&mut echo_factory(frame)).unwrap();
        adapter
    }

    #[test]
    fn test_empty_input_needs_more_data() {
        let mut adapter = prepared(64, 8);
        let ring = ring_with(&[]);

        assert_eq!(adapter.feed_and_decode(&ring).unwrap(), DecodeOutcome::NeedMoreData);
    }

    #[test]
    fn test_decodes_frames_in_order() {
        let mut adapter = prepared(20, 8);
        let data: Vec<u8> = (0..24).collect();
        let ring = ring_with(&data);
        let mut echoed = Vec::new();

        for _ in 0..3 {
            match adapter.feed_and_decode(&ring).unwrap() {
                DecodeOutcome::Decoded(block) => {
                    assert_eq!(block.samples.len(), 8);
                    assert_eq!(block.byte_len(), 16);
                    echoed.extend(block.samples.iter().map(|&s| s as u8));
                }
                other => panic!("Expected decoded block, got {:?}", other),
            }
        }

        assert_eq!(echoed, data);
        assert_eq!(adapter.frames_decoded(), 3);
        assert_eq!(adapter.staged(), 0);
        assert_eq!(adapter.feed_and_decode(&ring).unwrap(), DecodeOutcome::NeedMoreData);
    }

    #[test]
    fn test_partial_frame_stays_staged() {
        let mut adapter = prepared(64, 8);
        let ring = ring_with(&[1, 2, 3, 4, 5]);

        assert_eq!(adapter.feed_and_decode(&ring).unwrap(), DecodeOutcome::NeedMoreData);
        assert_eq!(adapter.staged(), 5);

        lock(&ring).write(&[6, 7, 8]);
        match adapter.feed_and_decode(&ring).unwrap() {
            DecodeOutcome::Decoded(block) => assert_eq!(block.samples, &[1, 2, 3, 4, 5, 6, 7, 8]),
            other => panic!("Expected decoded block, got {:?}", other),
        }
    }

    #[test]
    fn test_discard_staged() {
        let mut adapter = prepared(64, 8);
        let ring = ring_with(&[1, 2, 3]);

        adapter.feed_and_decode(&ring).unwrap();
        assert_eq!(adapter.discard_staged(), 3);
        assert_eq!(adapter.staged(), 0);
    }

    #[test]
    fn test_prepare_resets_counters() {
        let mut adapter = prepared(64, 4);
        let ring = ring_with(&[1, 2, 3, 4, 5, 6]);

        adapter.feed_and_decode(&ring).unwrap();
        assert_eq!(adapter.frames_decoded(), 1);
        assert_eq!(adapter.staged(), 2);

        adapter.prepare(&mut echo_factory(4)).unwrap();
        assert_eq!(adapter.frames_decoded(), 0);
        assert_eq!(adapter.staged(), 0);
        assert_eq!(adapter.last_frame(), FrameInfo::default());
    }

    #[test]
    fn test_prepare_failure() {
        let mut adapter = DecoderAdapter::new(64, 64).unwrap();

        let result = adapter.prepare(&mut failing_factory());
        assert!(matches!(result, Err(DecodeError::DecoderInit(_))));
        assert!(!adapter.is_prepared());
    }

    #[test]
    fn test_zero_sized_arena_rejected() {
        assert!(matches!(DecoderAdapter::new(0, 64), Err(AudioError::InitializationFailed(_))));
        assert!(matches!(DecoderAdapter::new(64, 0), Err(AudioError::InitializationFailed(_))));
    }

    #[test]
    fn test_real_frames_decode_and_skip_garbage() {
        use crate::audio::decoder::mp3_factory;
        use crate::audio::tests::silent_mp3_frames;

        let mut adapter = DecoderAdapter::new(1940, 2304).unwrap();
        adapter.prepare(&mut mp3_factory()).unwrap();

        let mut data = vec![0x00, 0x11, 0x22];
        data.extend(silent_mp3_frames(3));
        let ring = ring_with(&data);
        let mut samples = 0;

        for _ in 0..3 {
            match adapter.feed_and_decode(&ring).unwrap() {
                DecodeOutcome::Decoded(block) => {
                    assert_eq!(block.channels, 1);
                    assert_eq!(block.sample_rate, 44100);
                    samples += block.samples.len();
                }
                other => panic!("Expected decoded block, got {:?}", other),
            }
        }

        assert_eq!(samples, 3 * 1152);
        assert_eq!(adapter.last_frame().frame_bytes, 417);
    }
}
