//! End-to-end encode -> decode round trips over the public API, plus
//! the concrete worked scenarios the design's test tooling calls for.

use anni_flac_core::{
    BitEndian, BitReader, BitWriter, EncoderConfig, FlacDecoder, FlacEncoder, PcmSink, PcmSource,
    Result, SliceSource, VecSink,
};

struct VecSource {
    sample_rate: u32,
    channels: u8,
    bits_per_sample: u8,
    samples: Vec<i32>,
    cursor: usize,
}

impl VecSource {
    fn new(sample_rate: u32, channels: u8, bits_per_sample: u8, samples: Vec<i32>) -> Self {
        VecSource {
            sample_rate,
            channels,
            bits_per_sample,
            samples,
            cursor: 0,
        }
    }
}

impl PcmSource for VecSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn channels(&self) -> u8 {
        self.channels
    }
    fn channel_mask(&self) -> u32 {
        0
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

#[derive(Default)]
struct VecSink2 {
    samples: Vec<i32>,
}

impl PcmSink for VecSink2 {
    fn write(&mut self, samples: &[i32]) -> Result<()> {
        self.samples.extend_from_slice(samples);
        Ok(())
    }
}

fn encode_mono_16_bit(samples: &[i32], max_lpc_order: u32) -> Vec<u8> {
    let mut source = VecSource::new(44100, 1, 16, samples.to_vec());
    let writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
    let config = EncoderConfig {
        max_lpc_order,
        ..EncoderConfig::default()
    };
    let mut encoder = FlacEncoder::new(writer, config, 44100, 1, 16, Vec::new()).unwrap();
    encoder.encode(&mut source).unwrap();
    encoder.finish().unwrap().into_data()
}

#[test]
fn ramp_mono_stream_round_trips_with_lpc_disabled() {
    let samples: Vec<i32> = (0..4096).collect();
    let data = encode_mono_16_bit(&samples, 0);

    let reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
    let mut decoder = FlacDecoder::new(reader).unwrap();
    assert_eq!(decoder.stream_info().total_samples, 4096);
    assert_eq!(decoder.stream_info().channels, 1);
    assert_eq!(decoder.stream_info().bits_per_sample, 16);

    let mut sink = VecSink2::default();
    decoder.decode_all(&mut sink).unwrap();
    assert_eq!(sink.samples, samples);
}

#[test]
fn constant_value_stream_round_trips_exactly() {
    let samples = vec![100i32; 4096];
    let data = encode_mono_16_bit(&samples, 0);

    let reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
    let mut decoder = FlacDecoder::new(reader).unwrap();

    let mut sink = VecSink2::default();
    decoder.decode_all(&mut sink).unwrap();
    assert_eq!(sink.samples, samples);
}

#[test]
fn lpc_enabled_stream_round_trips_on_a_non_trivial_waveform() {
    let samples: Vec<i32> = (0..8192)
        .map(|i: i32| ((i as f64 * 0.05).sin() * 8000.0) as i32)
        .collect();
    let data = encode_mono_16_bit(&samples, 8);

    let reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
    let mut decoder = FlacDecoder::new(reader).unwrap();

    let mut sink = VecSink2::default();
    decoder.decode_all(&mut sink).unwrap();
    assert_eq!(sink.samples, samples);
}

#[test]
fn stereo_mid_side_round_trips_exactly() {
    let mut interleaved = Vec::new();
    for i in 0..4096i32 {
        interleaved.push((i % 2000) - 1000);
        interleaved.push(((i / 3) % 2000) - 1000 + 5);
    }
    let mut source = VecSource::new(44100, 2, 16, interleaved.clone());

    let writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
    let config = EncoderConfig {
        max_lpc_order: 4,
        adaptive_mid_side: true,
        ..EncoderConfig::default()
    };
    let mut encoder = FlacEncoder::new(writer, config, 44100, 2, 16, Vec::new()).unwrap();
    encoder.encode(&mut source).unwrap();
    let data = encoder.finish().unwrap().into_data();

    let reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
    let mut decoder = FlacDecoder::new(reader).unwrap();
    assert_eq!(decoder.stream_info().channels, 2);

    let mut sink = VecSink2::default();
    decoder.decode_all(&mut sink).unwrap();
    assert_eq!(sink.samples, interleaved);
}

#[test]
fn partial_final_block_is_handled() {
    let samples: Vec<i32> = (0..5000).map(|i| i % 100).collect();
    let data = encode_mono_16_bit(&samples, 0);

    let reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
    let mut decoder = FlacDecoder::new(reader).unwrap();
    assert_eq!(decoder.stream_info().total_samples, 5000);

    let mut sink = VecSink2::default();
    decoder.decode_all(&mut sink).unwrap();
    assert_eq!(sink.samples, samples);
}

#[test]
fn seeking_to_sample_zero_allows_a_second_full_decode() {
    let samples: Vec<i32> = (0..2048).map(|i| (i % 50) - 25).collect();
    let data = encode_mono_16_bit(&samples, 0);

    let reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
    let mut decoder = FlacDecoder::new(reader).unwrap();

    let mut first = VecSink2::default();
    decoder.decode_all(&mut first).unwrap();
    assert_eq!(first.samples, samples);

    decoder.seek(0).unwrap();
    let mut second = VecSink2::default();
    decoder.decode_all(&mut second).unwrap();
    assert_eq!(second.samples, samples);
}
