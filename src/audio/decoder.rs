use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_MP3};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use crate::audio::mpeg::{find_frame, FrameSync};
use crate::error::DecodeError;

/// Metadata of one `decode_frame` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Input bytes consumed, including any garbage skipped before the frame
    pub frame_bytes: usize,
    /// Interleaved samples written to the PCM buffer
    pub samples: usize,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Single-frame decoder
///
/// Each call looks at the start of `input`, decodes at most one frame into
/// `pcm` and reports how much input it consumed:
/// - `frame_bytes > 0`, `samples > 0`: a frame was decoded
/// - `frame_bytes > 0`, `samples == 0`: garbage or a damaged frame was skipped
/// - `frame_bytes == 0`: more input is needed
pub trait FrameDecoder: Send {
    fn decode_frame(&mut self, input: &[u8], pcm: &mut [i16]) -> Result<FrameInfo, DecodeError>;

    /// Forget inter-frame state before a new stream
    fn reset(&mut self);
}

/// Creates a decoder the first time a session starts
pub type DecoderFactory = Box<dyn FnMut() -> Result<Box<dyn FrameDecoder>, DecodeError> + Send>;

/// Factory for the symphonia-backed MP3 decoder
pub fn mp3_factory() -> DecoderFactory {
    Box::new(|| Ok(Box::new(Mp3FrameDecoder::new()?) as Box<dyn FrameDecoder>))
}

/// MPEG Layer III decoder using symphonia's codec directly, one frame per packet
pub struct Mp3FrameDecoder {
    decoder: Box<dyn Decoder>,
    sample_buf: Option<SampleBuffer<i16>>,
}

impl Mp3FrameDecoder {
    pub fn new() -> Result<Self, DecodeError> {
        let mut params = CodecParameters::new();
        params.for_codec(CODEC_TYPE_MP3);

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::DecoderInit(format!("Failed to create MP3 decoder: {}", e)))?;

        Ok(Self {
            decoder,
            sample_buf: None,
        })
    }

    fn skipped(bytes: usize) -> FrameInfo {
        FrameInfo {
            frame_bytes: bytes,
            ..FrameInfo::default()
        }
    }
}

impl FrameDecoder for Mp3FrameDecoder {
    fn decode_frame(&mut self, input: &[u8], pcm: &mut [i16]) -> Result<FrameInfo, DecodeError> {
        let (offset, header) = match find_frame(input) {
            FrameSync::Frame { offset, header } => (offset, header),
            // Skip garbage ahead of a partial frame, or wait for its tail
            FrameSync::Incomplete { offset, .. } => return Ok(Self::skipped(offset)),
            FrameSync::NotFound { discard } => return Ok(Self::skipped(discard)),
        };

        let frame_len = header.frame_len();
        let consumed = offset + frame_len;
        let packet = Packet::new_from_slice(0, 0, 0, &input[offset..consumed]);

        let decoded = match self.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping damaged frame ({} bytes): {}", frame_len, msg);
                return Ok(Self::skipped(consumed));
            }
            Err(e) => return Err(DecodeError::DecodeFailed(e.to_string())),
        };

        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;
        let needs_new_buffer = match &self.sample_buf {
            Some(buf) => buf.capacity() < decoded.capacity() * spec.channels.count(),
            None => true,
        };
        if needs_new_buffer {
            self.sample_buf = Some(SampleBuffer::<i16>::new(capacity, spec));
        }

        let sample_buf = match self.sample_buf.as_mut() {
            Some(buf) => buf,
            None => return Err(DecodeError::DecodeFailed("sample buffer unavailable".to_string())),
        };
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();
        if samples.len() > pcm.len() {
            return Err(DecodeError::DecodeFailed(format!(
                "PCM buffer too small: frame has {} samples, buffer holds {}",
                samples.len(),
                pcm.len()
            )));
        }
        pcm[..samples.len()].copy_from_slice(samples);

        Ok(FrameInfo {
            frame_bytes: consumed,
            samples: samples.len(),
            channels: spec.channels.count() as u16,
            sample_rate: spec.rate,
        })
    }

    fn reset(&mut self) {
        self.decoder.reset();
    }
}
