//! The FLAC stream driver's write side: emits the magic number and a
//! placeholder STREAMINFO, drives `frame::write_frame_header`/
//! `encode_subframe` per block read from a `PcmSource`, and patches
//! the placeholder STREAMINFO once the final sample/frame-size/MD5
//! totals are known.

use md5::{Digest, Md5};

use crate::bitstream::{BitWriter, ByteSink, Position, VecSink};
use crate::error::Result;
use crate::flac::crc::RunningCrc16;
use crate::flac::frame::{self, ChannelAssignment, SubframeEncodeOptions};
use crate::flac::metadata::{MetadataBlock, MetadataBlockData, StreamInfo};
use crate::flac::pcm::PcmSource;
use crate::flac::stream::{update_md5, FrameRecord};

/// Mirrors the reference encoder's option defaults: 4096-sample fixed
/// blocks, order-12 LPC, heuristic (non-exhaustive) model search, no
/// forced mid/side.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub block_size: u32,
    pub max_lpc_order: u32,
    pub exhaustive_model_search: bool,
    pub mid_side: bool,
    pub adaptive_mid_side: bool,
    pub min_residual_partition_order: u32,
    pub max_residual_partition_order: u32,
    pub max_rice_parameter: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            block_size: 4096,
            max_lpc_order: 12,
            exhaustive_model_search: false,
            mid_side: false,
            adaptive_mid_side: false,
            min_residual_partition_order: 0,
            max_residual_partition_order: 6,
            max_rice_parameter: 14,
        }
    }
}

impl EncoderConfig {
    fn subframe_options(&self) -> SubframeEncodeOptions {
        SubframeEncodeOptions {
            max_lpc_order: self.max_lpc_order,
            exhaustive_model_search: self.exhaustive_model_search,
            max_rice_parameter: self.max_rice_parameter,
            max_residual_partition_order: self.max_residual_partition_order,
        }
    }
}

/// Encodes PCM from a `PcmSource` into a FLAC bitstream.
pub struct FlacEncoder<S: ByteSink> {
    writer: BitWriter<S>,
    config: EncoderConfig,
    sample_rate: u32,
    channels: u8,
    bits_per_sample: u8,
    streaminfo_pos: Position,
    streaminfo_is_last: bool,
    frame_number: u64,
    total_samples: u64,
    min_frame_size: u32,
    max_frame_size: u32,
    md5: Md5,
}

impl<S: ByteSink> FlacEncoder<S> {
    /// Writes the magic number and a placeholder STREAMINFO (and any
    /// extra metadata blocks the caller wants carried along), leaving
    /// the writer positioned at the first frame.
    pub fn new(
        mut writer: BitWriter<S>,
        config: EncoderConfig,
        sample_rate: u32,
        channels: u8,
        bits_per_sample: u8,
        extra_blocks: Vec<MetadataBlock>,
    ) -> Result<Self> {
        let placeholder = StreamInfo {
            min_block_size: config.block_size as u16,
            max_block_size: config.block_size as u16,
            min_frame_size: 0,
            max_frame_size: 0,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples: 0,
            md5_signature: [0; 16],
        };

        let mut blocks = vec![MetadataBlock::new(MetadataBlockData::StreamInfo(placeholder))];
        blocks.extend(extra_blocks);
        let last = blocks.len() - 1;
        blocks[last].is_last = true;
        let streaminfo_is_last = last == 0;

        writer.write_bytes(b"fLaC")?;
        let streaminfo_pos = writer.get_pos()?;
        for block in &blocks {
            block.write(&mut writer)?;
        }

        Ok(FlacEncoder {
            writer,
            streaminfo_is_last,
            config,
            sample_rate,
            channels,
            bits_per_sample,
            streaminfo_pos,
            frame_number: 0,
            total_samples: 0,
            min_frame_size: u32::MAX,
            max_frame_size: 0,
            md5: Md5::new(),
        })
    }

    /// Reads `config.block_size`-sized chunks from `source` until
    /// exhausted, encoding one frame per chunk.
    pub fn encode<Source: PcmSource>(&mut self, source: &mut Source) -> Result<Vec<FrameRecord>> {
        let mut records = Vec::new();
        let mut buffer = Vec::new();

        loop {
            let frames_read = source.read(self.config.block_size as usize, &mut buffer)?;
            if frames_read == 0 {
                break;
            }

            let channels: Vec<Vec<i32>> = (0..self.channels as usize)
                .map(|ch| {
                    buffer
                        .iter()
                        .skip(ch)
                        .step_by(self.channels as usize)
                        .copied()
                        .collect()
                })
                .collect();

            let record = self.encode_frame(&channels, frames_read as u32)?;
            update_md5(&mut self.md5, &buffer, self.bits_per_sample);
            records.push(record);

            self.total_samples += frames_read as u64;
            self.frame_number += 1;
        }

        Ok(records)
    }

    fn encode_frame(&mut self, channels: &[Vec<i32>], block_size: u32) -> Result<FrameRecord> {
        let (assignment, subframe_samples) = self.choose_channel_assignment(channels)?;

        let crc16 = std::sync::Arc::new(std::sync::Mutex::new(RunningCrc16::new()));
        let crc16_for_cb = std::sync::Arc::clone(&crc16);
        self.writer.add_callback(Box::new(move |byte| {
            crc16_for_cb.lock().unwrap().update(byte);
        }));

        let result = (|| -> Result<()> {
            frame::write_frame_header(
                &mut self.writer,
                block_size,
                self.sample_rate,
                self.bits_per_sample,
                self.frame_number,
                assignment,
            )?;

            let options = self.config.subframe_options();
            for (channel, samples) in subframe_samples.iter().enumerate() {
                let bps = frame::channel_bits_per_sample(assignment, channel as u8, self.bits_per_sample);
                frame::encode_subframe(&mut self.writer, samples, bps, &options)?;
            }

            self.writer.byte_align()?;
            Ok(())
        })();

        self.writer.pop_callback();
        result?;

        let crc16_value = crc16.lock().unwrap().value();
        self.writer.write_unsigned(16, crc16_value as u32)?;

        let byte_size = crc16.lock().unwrap().len() as u64 + 2;
        self.min_frame_size = self.min_frame_size.min(byte_size as u32);
        self.max_frame_size = self.max_frame_size.max(byte_size as u32);

        Ok(FrameRecord {
            byte_size,
            pcm_frame_count: block_size,
        })
    }

    /// Tries independent, left-side, side-right, and mid-side coding
    /// (in that priority order on ties) for a stereo frame, picking the
    /// smallest total bit cost; anything else is encoded independently.
    fn choose_channel_assignment(
        &self,
        channels: &[Vec<i32>],
    ) -> Result<(ChannelAssignment, Vec<Vec<i32>>)> {
        if self.channels != 2 || !(self.config.mid_side || self.config.adaptive_mid_side) {
            return Ok((ChannelAssignment::Independent(self.channels), channels.to_vec()));
        }

        let left = &channels[0];
        let right = &channels[1];
        let (average, difference) = frame::correlate_stereo(left, right);

        let options = self.config.subframe_options();
        let candidates: Vec<(ChannelAssignment, Vec<Vec<i32>>)> = vec![
            (ChannelAssignment::Independent(2), vec![left.clone(), right.clone()]),
            (ChannelAssignment::LeftSide, vec![left.clone(), difference.clone()]),
            (ChannelAssignment::SideRight, vec![difference.clone(), right.clone()]),
            (ChannelAssignment::MidSide, vec![average, difference]),
        ];

        let mut best_index = 0;
        let mut best_bits = u64::MAX;
        for (i, (assignment, subframes)) in candidates.iter().enumerate() {
            let mut total = 0u64;
            let mut fits = true;
            for (channel, samples) in subframes.iter().enumerate() {
                let bps = frame::channel_bits_per_sample(*assignment, channel as u8, self.bits_per_sample);
                let mut recorder = BitWriter::<VecSink>::recorder(self.writer.endian());
                if frame::encode_subframe(&mut recorder, samples, bps, &options).is_err() {
                    fits = false;
                    break;
                }
                total += recorder.bits_written();
            }
            if fits && total < best_bits {
                best_bits = total;
                best_index = i;
            }
        }

        let (assignment, subframes) = candidates.into_iter().nth(best_index).unwrap();
        Ok((assignment, subframes))
    }

    /// Rewinds to the placeholder STREAMINFO and rewrites it with the
    /// final sample count, frame-size bounds, and PCM MD5, then returns
    /// the underlying sink.
    pub fn finish(mut self) -> Result<S> {
        let digest = self.md5.finalize();
        let mut md5_signature = [0u8; 16];
        md5_signature.copy_from_slice(&digest);

        let final_info = StreamInfo {
            min_block_size: self.config.block_size as u16,
            max_block_size: self.config.block_size as u16,
            min_frame_size: if self.min_frame_size == u32::MAX { 0 } else { self.min_frame_size },
            max_frame_size: self.max_frame_size,
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
            total_samples: self.total_samples,
            md5_signature,
        };

        let return_pos = self.writer.get_pos()?;
        self.writer.set_pos(self.streaminfo_pos)?;

        let mut block = MetadataBlock::new(MetadataBlockData::StreamInfo(final_info));
        block.is_last = self.streaminfo_is_last;
        block.write(&mut self.writer)?;

        self.writer.set_pos(return_pos)?;
        Ok(self.writer.into_sink())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitEndian, BitReader, SliceSource};
    use crate::flac::decoder::FlacDecoder;
    use crate::flac::pcm::test_support::{VecPcmSink, VecPcmSource};

    #[test]
    fn round_trips_simple_ramp_mono_stream() {
        let samples: Vec<i32> = (0..4096).collect();
        let mut source = VecPcmSource::new(44100, 1, 16, samples.clone());

        let writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
        let config = EncoderConfig {
            max_lpc_order: 0,
            ..EncoderConfig::default()
        };
        let mut encoder = FlacEncoder::new(writer, config, 44100, 1, 16, Vec::new()).unwrap();
        encoder.encode(&mut source).unwrap();
        let data = encoder.finish().unwrap().into_data();

        let reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
        let mut decoder = FlacDecoder::new(reader).unwrap();
        assert_eq!(decoder.stream_info().total_samples, 4096);

        let mut sink = VecPcmSink::default();
        decoder.decode_all(&mut sink).unwrap();
        assert_eq!(sink.samples, samples);
    }

    #[test]
    fn round_trips_stereo_stream_with_mid_side_enabled() {
        let mut interleaved = Vec::new();
        for i in 0..2048i32 {
            interleaved.push(i);
            interleaved.push(i / 2 + 3);
        }
        let mut source = VecPcmSource::new(44100, 2, 16, interleaved.clone());

        let writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
        let config = EncoderConfig {
            block_size: 2048,
            max_lpc_order: 8,
            adaptive_mid_side: true,
            ..EncoderConfig::default()
        };
        let mut encoder = FlacEncoder::new(writer, config, 44100, 2, 16, Vec::new()).unwrap();
        encoder.encode(&mut source).unwrap();
        let data = encoder.finish().unwrap().into_data();

        let reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
        let mut decoder = FlacDecoder::new(reader).unwrap();
        let mut sink = VecPcmSink::default();
        decoder.decode_all(&mut sink).unwrap();
        assert_eq!(sink.samples, interleaved);
    }
}
