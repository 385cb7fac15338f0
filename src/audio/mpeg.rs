//! MPEG audio frame headers and frame sync for Layer III streams.

/// Size of a frame header in bytes
pub const HEADER_LEN: usize = 4;

/// Largest Layer III frame: MPEG-1, 320 kbps, 32 kHz, padded
pub const MAX_FRAME_BYTES: usize = 1441;

/// Most interleaved samples one frame can produce (MPEG-1 stereo)
pub const MAX_FRAME_SAMPLES: usize = 1152 * 2;

const BITRATES_V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2_L3: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl MpegVersion {
    fn sample_rates(&self) -> [u32; 3] {
        match self {
            MpegVersion::Mpeg1 => [44100, 48000, 32000],
            MpegVersion::Mpeg2 => [22050, 24000, 16000],
            MpegVersion::Mpeg25 => [11025, 12000, 8000],
        }
    }
}

/// Decoded fields of a Layer III frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channels: u16,
    pub crc_protected: bool,
}

impl FrameHeader {
    /// Parse a header from the first four bytes of `bytes`
    ///
    /// Returns `None` for anything that is not a Layer III header with a
    /// usable bitrate and sample rate. Free-format streams are not supported.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let (b1, b2, b3) = (bytes[1], bytes[2], bytes[3]);

        if bytes[0] != 0xFF || b1 & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (b1 >> 3) & 0x03 {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return None,
        };

        // Layer bits: 01 is Layer III
        if (b1 >> 1) & 0x03 != 0x01 {
            return None;
        }

        let bitrate_index = (b2 >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let bitrate_kbps = match version {
            MpegVersion::Mpeg1 => BITRATES_V1_L3[bitrate_index],
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => BITRATES_V2_L3[bitrate_index],
        };

        let rate_index = ((b2 >> 2) & 0x03) as usize;
        if rate_index == 3 {
            return None;
        }

        Some(Self {
            version,
            bitrate_kbps,
            sample_rate: version.sample_rates()[rate_index],
            padding: (b2 >> 1) & 0x01 == 1,
            channels: if b3 >> 6 == 0x03 { 1 } else { 2 },
            crc_protected: b1 & 0x01 == 0,
        })
    }

    /// Total frame length in bytes, header included
    pub fn frame_len(&self) -> usize {
        let coefficient = match self.version {
            MpegVersion::Mpeg1 => 144,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 72,
        };
        (coefficient * self.bitrate_kbps * 1000 / self.sample_rate) as usize + self.padding as usize
    }

    pub fn samples_per_channel(&self) -> usize {
        match self.version {
            MpegVersion::Mpeg1 => 1152,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 576,
        }
    }

    /// Interleaved sample count of one decoded frame
    pub fn interleaved_samples(&self) -> usize {
        self.samples_per_channel() * self.channels as usize
    }

    /// Whether `other` can belong to the same stream as `self`
    fn continues_with(&self, other: &FrameHeader) -> bool {
        self.version == other.version && self.sample_rate == other.sample_rate
    }
}

/// Result of scanning a byte slice for the next frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSync {
    /// A complete frame starts at `offset`
    Frame { offset: usize, header: FrameHeader },
    /// A frame starts at `offset` but its tail has not arrived yet
    Incomplete { offset: usize, header: FrameHeader },
    /// No header anywhere; the first `discard` bytes can be dropped
    NotFound { discard: usize },
}

/// Locate the next plausible frame in `data`
///
/// When the header that follows a candidate frame is already in `data`, it
/// must also parse and agree on version and sample rate; otherwise the
/// candidate is treated as a false sync inside payload bytes.
pub fn find_frame(data: &[u8]) -> FrameSync {
    if data.len() < HEADER_LEN {
        return FrameSync::NotFound { discard: 0 };
    }

    for offset in 0..=data.len() - HEADER_LEN {
        let header = match FrameHeader::parse(&data[offset..]) {
            Some(header) => header,
            None => continue,
        };

        let end = offset + header.frame_len();
        if end > data.len() {
            return FrameSync::Incomplete { offset, header };
        }

        if end + HEADER_LEN <= data.len() {
            match FrameHeader::parse(&data[end..]) {
                Some(next) if header.continues_with(&next) => {}
                _ => continue,
            }
        }

        return FrameSync::Frame { offset, header };
    }

    // Keep the last bytes: they may be the start of a split header
    FrameSync::NotFound { discard: data.len() - (HEADER_LEN - 1) }
}
