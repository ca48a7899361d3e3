//! The PCM collaborator interfaces (spec §6): the only surface where
//! this crate touches raw sample data rather than encoded bytes. No
//! concrete WAV/file-backed implementation ships here — that belongs
//! to a higher-level format wrapper outside this crate's scope.

use crate::error::Result;

/// A source of interleaved PCM samples driving the FLAC encoder.
pub trait PcmSource {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u8;
    fn channel_mask(&self) -> u32;
    fn bits_per_sample(&self) -> u8;

    /// Reads up to `max_pcm_frames` interleaved frames into `out`
    /// (`channels() * frames_read` samples, widest-first per frame).
    /// Returns the number of frames actually read; `0` signals end of
    /// stream.
    fn read(&mut self, max_pcm_frames: usize, out: &mut Vec<i32>) -> Result<usize>;
}

/// A sink for interleaved PCM samples receiving the FLAC decoder's output.
pub trait PcmSink {
    fn write(&mut self, samples: &[i32]) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// An in-memory `PcmSource` over pre-interleaved samples, used only
    /// by this crate's own round-trip tests.
    pub struct VecPcmSource {
        sample_rate: u32,
        channels: u8,
        channel_mask: u32,
        bits_per_sample: u8,
        samples: Vec<i32>,
        cursor: usize,
    }

    impl VecPcmSource {
        pub fn new(
            sample_rate: u32,
            channels: u8,
            bits_per_sample: u8,
            samples: Vec<i32>,
        ) -> Self {
            VecPcmSource {
                sample_rate,
                channels,
                channel_mask: 0,
                bits_per_sample,
                samples,
                cursor: 0,
            }
        }
    }

    impl PcmSource for VecPcmSource {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
        fn channels(&self) -> u8 {
            self.channels
        }
        fn channel_mask(&self) -> u32 {
            self.channel_mask
        }
        fn bits_per_sample(&self) -> u8 {
            self.bits_per_sample
        }
        fn read(&mut self, max_pcm_frames: usize, out: &mut Vec<i32>) -> Result<usize> {
            let per_frame = self.channels as usize;
            let remaining_frames = (self.samples.len() - self.cursor) / per_frame;
            let frames = max_pcm_frames.min(remaining_frames);
            let count = frames * per_frame;
            out.clear();
            out.extend_from_slice(&self.samples[self.cursor..self.cursor + count]);
            self.cursor += count;
            Ok(frames)
        }
    }

    /// An in-memory `PcmSink` collecting every sample written, used only
    /// by this crate's own round-trip tests.
    #[derive(Default)]
    pub struct VecPcmSink {
        pub samples: Vec<i32>,
    }

    impl PcmSink for VecPcmSink {
        fn write(&mut self, samples: &[i32]) -> Result<()> {
            self.samples.extend_from_slice(samples);
            Ok(())
        }
    }
}
