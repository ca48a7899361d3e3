//! The FLAC stream driver's read side: reads metadata once, then
//! drives `frame::read_frame_header`/`read_subframe` per frame,
//! maintaining a running MD5 of the decoded PCM (spec's component 8).

use std::sync::{Arc, Mutex};

use md5::{Digest, Md5};

use crate::bitstream::{BitReader, Position};
use crate::error::{FlacError, Result};
use crate::flac::crc::RunningCrc16;
use crate::flac::frame;
use crate::flac::metadata::{self, resolve_channel_mask, MetadataBlock, MetadataBlockData, StreamInfo};
use crate::flac::pcm::PcmSink;
use crate::flac::stream::{update_md5, FrameRecord};

/// Decodes a FLAC bitstream frame by frame.
pub struct FlacDecoder {
    reader: BitReader,
    stream_info: StreamInfo,
    blocks: Vec<MetadataBlock>,
    metadata_end: Position,
    md5: Md5,
    md5_enabled: bool,
    remaining_samples: u64,
}

impl FlacDecoder {
    /// Reads the magic number and metadata chain, leaving the reader
    /// positioned at the first frame.
    pub fn new(mut reader: BitReader) -> Result<Self> {
        let blocks = metadata::read_metadata(&mut reader)?;
        let stream_info = blocks
            .iter()
            .find_map(|b| match &b.data {
                MetadataBlockData::StreamInfo(si) => Some(si.clone()),
                _ => None,
            })
            .ok_or(FlacError::InvalidFirstBlock)?;

        let metadata_end = reader.get_pos();
        let md5_enabled = !stream_info.md5_disabled();
        let remaining_samples = stream_info.total_samples;

        Ok(FlacDecoder {
            reader,
            stream_info,
            blocks,
            metadata_end,
            md5: Md5::new(),
            md5_enabled,
            remaining_samples,
        })
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    pub fn metadata_blocks(&self) -> &[MetadataBlock] {
        &self.blocks
    }

    pub fn channel_mask(&self) -> u32 {
        resolve_channel_mask(&self.stream_info, &self.blocks)
    }

    /// Decodes every remaining frame, delivering interleaved PCM to
    /// `sink` and verifying the running MD5 once the stream is
    /// exhausted cleanly. MD5 is never checked on early termination by
    /// the caller (this method simply isn't called again).
    pub fn decode_all<Sink: PcmSink>(&mut self, sink: &mut Sink) -> Result<Vec<FrameRecord>> {
        let mut records = Vec::new();

        while self.remaining_samples > 0 {
            let (pcm, frame_samples, byte_size) = self.decode_frame()?;
            sink.write(&pcm)?;
            records.push(FrameRecord {
                byte_size,
                pcm_frame_count: frame_samples as u32,
            });
            self.remaining_samples = self.remaining_samples.saturating_sub(frame_samples as u64);
        }

        if self.md5_enabled {
            let digest = self.md5.clone().finalize();
            if digest.as_slice() != self.stream_info.md5_signature {
                return Err(FlacError::MD5Mismatch.into());
            }
        }

        Ok(records)
    }

    fn decode_frame(&mut self) -> Result<(Vec<i32>, usize, u64)> {
        let crc16 = Arc::new(Mutex::new(RunningCrc16::new()));
        let crc16_for_cb = Arc::clone(&crc16);
        self.reader.add_callback(Box::new(move |byte| {
            crc16_for_cb.lock().unwrap().update(byte);
        }));

        let result = (|| -> Result<(frame::FrameHeader, Vec<i32>)> {
            let header = frame::read_frame_header(&mut self.reader, &self.stream_info)?;
            let block_size = (header.block_size as u64).min(self.remaining_samples.max(1)) as u32;
            let channel_count = header.channel_assignment.channel_count();

            let mut subframes = Vec::with_capacity(channel_count as usize);
            for channel in 0..channel_count {
                let bps = frame::channel_bits_per_sample(
                    header.channel_assignment,
                    channel,
                    header.bits_per_sample,
                );
                subframes.push(frame::read_subframe(&mut self.reader, block_size, bps)?);
            }

            self.reader.byte_align()?;
            self.reader.read_unsigned(16)?;

            Ok((header, subframes))
        })();

        self.reader.pop_callback();
        let (header, subframes) = result?;

        if crc16.lock().unwrap().value() != 0 {
            return Err(FlacError::InvalidCRC16.into());
        }

        let block_size = (header.block_size as u64).min(self.remaining_samples.max(1)) as usize;
        let pcm = frame::decorrelate(header.channel_assignment, &subframes);

        if self.md5_enabled {
            update_md5(&mut self.md5, &pcm, self.stream_info.bits_per_sample);
        }

        let byte_size = crc16.lock().unwrap().len() as u64;
        Ok((pcm, block_size, byte_size))
    }

    /// Seeks to sample 0, restarting the running MD5 from a clean
    /// state. Seeking to any other sample is unsupported without a
    /// seek-table walk (Non-goal: seek-table construction/consumption
    /// is out of scope), and disables further MD5 verification since
    /// the running hash would no longer cover the whole stream.
    pub fn seek(&mut self, sample: u64) -> Result<()> {
        if sample == 0 {
            self.reader.set_pos(self.metadata_end)?;
            self.remaining_samples = self.stream_info.total_samples;
            self.md5 = Md5::new();
            self.md5_enabled = !self.stream_info.md5_disabled();
        } else {
            self.md5_enabled = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitEndian, BitWriter, SliceSource, VecSink};
    use crate::flac::frame::{ChannelAssignment, SubframeEncodeOptions};
    use crate::flac::metadata::write_metadata;
    use crate::flac::pcm::test_support::VecPcmSink;

    fn encode_minimal_constant_stream(value: i32, block_size: u32) -> Vec<u8> {
        let stream_info = StreamInfo {
            min_block_size: block_size as u16,
            max_block_size: block_size as u16,
            min_frame_size: 0,
            max_frame_size: 0,
            sample_rate: 44100,
            channels: 1,
            bits_per_sample: 16,
            total_samples: block_size as u64,
            md5_signature: [0; 16],
        };
        let mut writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
        let mut block = MetadataBlock::new(MetadataBlockData::StreamInfo(stream_info));
        block.is_last = true;
        write_metadata(&mut writer, &[block]).unwrap();

        frame::write_frame_header(
            &mut writer,
            block_size,
            44100,
            16,
            0,
            ChannelAssignment::Independent(1),
        )
        .unwrap();

        let options = SubframeEncodeOptions {
            max_lpc_order: 0,
            exhaustive_model_search: false,
            max_rice_parameter: 14,
            max_residual_partition_order: 0,
        };
        let samples = vec![value; block_size as usize];
        frame::encode_subframe(&mut writer, &samples, 16, &options).unwrap();
        writer.byte_align().unwrap();

        // CRC-16 placeholder; a real encoder wraps this whole section in a
        // callback, exercised end-to-end in `encoder.rs`'s tests.
        writer.write_unsigned(16, 0).unwrap();
        writer.into_recorder_data().unwrap()
    }

    #[test]
    fn decodes_constant_subframe_stream_without_crc_check() {
        // Builds a stream by hand (bypassing the real CRC16 wiring) just
        // to exercise metadata + frame-header + subframe decode wiring;
        // full CRC-checked round trips live in `encoder.rs`.
        let data = encode_minimal_constant_stream(100, 4096);
        let reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
        let mut decoder = FlacDecoder::new(reader).unwrap();
        assert_eq!(decoder.stream_info().total_samples, 4096);
        assert_eq!(decoder.stream_info().channels, 1);

        // CRC-16 will not validate since it wasn't accumulated while
        // constructing the test fixture; only exercise metadata parsing here.
        let mut sink = VecPcmSink::default();
        let result = decoder.decode_all(&mut sink);
        assert!(result.is_err());
    }
}
