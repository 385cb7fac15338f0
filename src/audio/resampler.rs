/*!
A streaming linear resampler for decoded PCM on its way to the output device.

- Converts from the decoded stream's sample rate to the device's sample rate.
- Operates on interleaved frames (LRLR...) for an arbitrary number of channels.
- Keeps one frame of history across calls so block boundaries do not click.
- `process_block` takes the player's 16-bit `PcmBlock`s directly, converting to f32 and
  remapping to the device channel count first.

Typical usage:

    use voice_stream_player::audio::resampler::LinearResampler;
    # use voice_stream_player::audio::PcmBlock;
    # fn demo(block: PcmBlock<'_>) {

    let mut rs = LinearResampler::new(22_050, 48_000, 2);
    let output = rs.process_block(&block);
    // 'output' is interleaved stereo f32 at 48 kHz
    # let _ = output;
    # }

MP3 streams can change sample rate between frames. `process_block` follows the block's
rate and restarts interpolation when it changes.
*/

use cpal::Sample;

use crate::audio::PcmBlock;

#[derive(Debug, Clone)]
pub struct LinearResampler {
    src_rate: u32,
    dst_rate: u32,
    channels: usize,

    // source frames per output frame (src/dst)
    step: f64,

    // position relative to the start of `prev_frame`
    pos: f64,
    prev_frame: Vec<f32>,
}

impl LinearResampler {
    /// Create a new resampler.
    /// - src_rate: decoded sample rate (Hz)
    /// - dst_rate: output sample rate (Hz)
    /// - channels: number of interleaved output channels
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Self {
        Self {
            src_rate,
            dst_rate,
            channels,
            step: step_for(src_rate, dst_rate),
            pos: 0.0,
            prev_frame: Vec::new(),
        }
    }

    /// Drop the interpolation history
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.prev_frame.clear();
    }

    /// Change the source and destination rates. Keeps the streaming phase unless `reset_state` is true.
    pub fn set_rates(&mut self, src_rate: u32, dst_rate: u32, reset_state: bool) {
        self.src_rate = src_rate;
        self.dst_rate = dst_rate;
        self.step = step_for(src_rate, dst_rate);
        if reset_state {
            self.reset();
        }
    }

    /// (source rate, destination rate, channels)
    pub fn config(&self) -> (u32, u32, usize) {
        (self.src_rate, self.dst_rate, self.channels)
    }

    /// Resample interleaved f32 samples from src_rate to dst_rate, preserving state across calls.
    ///
    /// `input` must already carry `channels` interleaved channels. Repeated calls with
    /// consecutive blocks produce the same output as one call over the joined input.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.channels == 0 || self.dst_rate == 0 || self.src_rate == 0 {
            return Vec::new();
        }

        let ch = self.channels;
        let in_frames = input.len() / ch;

        // [prev_frame, input_frames...] so interpolation can span the block boundary
        let mut work = Vec::with_capacity((in_frames + 1) * ch);
        if self.prev_frame.len() == ch {
            work.extend_from_slice(&self.prev_frame);
        } else if in_frames > 0 {
            work.extend(std::iter::repeat(0.0).take(ch));
        } else {
            return Vec::new();
        }
        work.extend_from_slice(&input[..in_frames * ch]);

        let total_frames = work.len() / ch;

        let expected_out_frames =
            ((in_frames as f64) * (self.dst_rate as f64 / self.src_rate as f64)).ceil() as usize + 4;
        let mut out = Vec::with_capacity(expected_out_frames * ch);

        while self.pos < (total_frames as f64 - 1.0) {
            let i = self.pos.floor() as usize;
            let frac = (self.pos - i as f64) as f32;

            let base0 = i * ch;
            let base1 = (i + 1) * ch;

            out.extend((0..ch).map(|c| {
                let s0 = work[base0 + c];
                let s1 = work[base1 + c];
                s0 + (s1 - s0) * frac
            }));

            self.pos += self.step;
        }

        // The last frame becomes index 0 of the next call
        let last_base = (total_frames - 1) * ch;
        self.prev_frame.clear();
        self.prev_frame.extend_from_slice(&work[last_base..last_base + ch]);
        self.pos -= total_frames as f64 - 1.0;

        out
    }

    /// Convert one decoded block to f32 at the destination rate and channel count
    pub fn process_block(&mut self, block: &PcmBlock<'_>) -> Vec<f32> {
        if block.sample_rate != self.src_rate {
            self.set_rates(block.sample_rate, self.dst_rate, true);
        }

        let samples: Vec<f32> = block.samples.iter().map(|&s| s.to_sample::<f32>()).collect();
        let remapped = remap_channels(&samples, block.channels as usize, self.channels);

        if self.src_rate == self.dst_rate {
            return remapped;
        }
        self.process(&remapped)
    }
}

fn step_for(src_rate: u32, dst_rate: u32) -> f64 {
    if dst_rate == 0 {
        0.0
    } else {
        src_rate as f64 / dst_rate as f64
    }
}

/// Change the channel count of interleaved samples.
///
/// Mono is copied to every output channel and stereo is averaged down to mono. Other
/// layouts keep the leading channels and pad with silence.
pub fn remap_channels(input: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return if from == to { input.to_vec() } else { Vec::new() };
    }

    let frames = input.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in input.chunks_exact(from) {
        match (from, to) {
            (1, _) => out.extend(std::iter::repeat(frame[0]).take(to)),
            (2, 1) => out.push((frame[0] + frame[1]) * 0.5),
            _ if to < from => out.extend_from_slice(&frame[..to]),
            _ => {
                out.extend_from_slice(frame);
                out.extend(std::iter::repeat(0.0).take(to - from));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::min;

    fn gen_sine(f_hz: f32, sr: u32, frames: usize, ch: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * ch);
        for n in 0..frames {
            let t = n as f32 / sr as f32;
            let s = (2.0 * std::f32::consts::PI * f_hz * t).sin();
            for _ in 0..ch {
                out.push(s);
            }
        }
        out
    }

    #[test]
    fn resample_length_mono_22k05_to_48k() {
        let src = 22_050;
        let dst = 48_000;

        let in_frames = 2205; // 0.1s
        let input = gen_sine(1000.0, src, in_frames, 1);

        let mut rs = LinearResampler::new(src, dst, 1);
        let out = rs.process(&input);

        let expected = (in_frames as f64 * (dst as f64 / src as f64)).round() as isize;
        let actual = out.len() as isize;
        assert!((actual - expected).abs() <= 3, "expected ~{}, got {}", expected, actual);
    }

    #[test]
    fn streaming_consistency_split_buffers() {
        let src = 44_100;
        let dst = 48_000;
        let ch = 2usize;

        let in_frames = 10_000;
        let input = gen_sine(440.0, src, in_frames, ch);

        let mut one = LinearResampler::new(src, dst, ch);
        let out_one = one.process(&input);

        // 1152 is one Layer III frame
        let mut two = LinearResampler::new(src, dst, ch);
        let mut out_streamed = Vec::new();
        let mut idx = 0usize;
        while idx < in_frames {
            let take = min(in_frames - idx, 1152);
            out_streamed.extend(two.process(&input[idx * ch..(idx + take) * ch]));
            idx += take;
        }

        assert_eq!(out_one.len(), out_streamed.len());
        for (k, (a, b)) in out_one.iter().zip(&out_streamed).enumerate() {
            assert!((a - b).abs() < 1e-4, "mismatch at {}, {} vs {}", k, a, b);
        }
    }

    #[test]
    fn block_boundaries_keep_phase() {
        // A ramp resamples to a ramp; a dropped or repeated position shows up as a step
        let src = 44_100;
        let dst = 48_000;
        // Starts at 1 so the silent lead-in frame continues the ramp
        let input: Vec<f32> = (1..=4608).map(|n| n as f32).collect();

        let mut rs = LinearResampler::new(src, dst, 1);
        let mut out = Vec::new();
        for block in input.chunks(1152) {
            out.extend(rs.process(block));
        }

        let step = src as f32 / dst as f32;
        assert_eq!(out.len(), (4608.0 / step).ceil() as usize);
        for pair in out.windows(2) {
            assert!(((pair[1] - pair[0]) - step).abs() < 2e-3, "step {} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn process_block_converts_and_upmixes() {
        let samples = [i16::MAX, 0, i16::MIN, 0];
        let block = PcmBlock {
            samples: &samples,
            channels: 1,
            sample_rate: 48_000,
        };

        let mut rs = LinearResampler::new(48_000, 48_000, 2);
        let out = rs.process_block(&block);

        assert_eq!(out.len(), 8);
        assert!((out[0] - 1.0).abs() < 1e-3);
        assert_eq!(out[0], out[1]);
        assert_eq!(out[4], -1.0);
        assert_eq!(out[5], -1.0);
    }

    #[test]
    fn process_block_follows_rate_changes() {
        let samples = vec![1000i16; 2304];
        let mut rs = LinearResampler::new(44_100, 48_000, 2);

        let block = PcmBlock {
            samples: &samples,
            channels: 2,
            sample_rate: 24_000,
        };
        let out = rs.process_block(&block);

        assert_eq!(rs.config(), (24_000, 48_000, 2));
        // 1152 frames doubled
        assert_eq!(out.len() / 2, 2304);
    }

    #[test]
    fn remap_stereo_to_mono_averages() {
        let out = remap_channels(&[0.5, -0.5, 1.0, 0.0], 2, 1);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn remap_pads_and_truncates() {
        assert_eq!(remap_channels(&[0.1, 0.2], 2, 4), vec![0.1, 0.2, 0.0, 0.0]);
        assert_eq!(remap_channels(&[0.1, 0.2, 0.3], 3, 2), vec![0.1, 0.2]);
        assert!(remap_channels(&[0.1], 1, 0).is_empty());
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut rs = LinearResampler::new(44_100, 48_000, 2);
        assert!(rs.process(&[]).is_empty());
    }
}
