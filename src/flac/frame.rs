//! The FLAC frame: header (with CRC-8), the four subframe forms, and
//! inter-channel decorrelation. Built on `residual`/`lpc` and the
//! bitstream engine's callback stack for CRC accumulation.

use std::sync::{Arc, Mutex};

use crate::bitstream::{BitReader, BitWriter, ByteSink};
use crate::error::{FlacError, Result};
use crate::flac::crc::{RunningCrc16, RunningCrc8};
use crate::flac::metadata::StreamInfo;
use crate::flac::residual;

/// Channel assignment as encoded in the 4-bit frame-header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    Independent(u8),
    LeftSide,
    SideRight,
    MidSide,
}

impl ChannelAssignment {
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0x0..=0x7 => Ok(ChannelAssignment::Independent(code as u8 + 1)),
            0x8 => Ok(ChannelAssignment::LeftSide),
            0x9 => Ok(ChannelAssignment::SideRight),
            0xA => Ok(ChannelAssignment::MidSide),
            _ => Err(FlacError::InvalidChannelAssignment.into()),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            ChannelAssignment::Independent(n) => (n - 1) as u32,
            ChannelAssignment::LeftSide => 0x8,
            ChannelAssignment::SideRight => 0x9,
            ChannelAssignment::MidSide => 0xA,
        }
    }

    pub fn channel_count(self) -> u8 {
        match self {
            ChannelAssignment::Independent(n) => n,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub blocking_strategy: u8,
    pub block_size: u32,
    pub sample_rate: u32,
    pub channel_assignment: ChannelAssignment,
    pub bits_per_sample: u8,
    pub frame_or_sample_number: u64,
}

fn encode_block_size(block_size: u32) -> u32 {
    match block_size {
        192 => 1,
        576 => 2,
        1152 => 3,
        2304 => 4,
        4608 => 5,
        256 => 8,
        512 => 9,
        1024 => 10,
        2048 => 11,
        4096 => 12,
        8192 => 13,
        16384 => 14,
        32768 => 15,
        n if n <= (1 << 8) => 6,
        n if n <= (1 << 16) => 7,
        _ => 0,
    }
}

fn encode_sample_rate(sample_rate: u32) -> u32 {
    match sample_rate {
        88200 => 1,
        176400 => 2,
        192000 => 3,
        8000 => 4,
        16000 => 5,
        22050 => 6,
        24000 => 7,
        32000 => 8,
        44100 => 9,
        48000 => 10,
        96000 => 11,
        n if n % 1000 == 0 && n <= 255_000 => 12,
        n if n % 10 == 0 && n <= 655_350 => 13,
        n if n < (1 << 16) => 14,
        _ => 0,
    }
}

fn encode_bits_per_sample(bps: u8) -> u32 {
    match bps {
        8 => 1,
        12 => 2,
        16 => 4,
        20 => 5,
        24 => 6,
        _ => 0,
    }
}

/// Writes a UTF-8-style multi-byte value, mirroring FLAC's
/// unary-length-prefixed, 6-bit-continuation coding.
fn write_utf8<S: ByteSink>(writer: &mut BitWriter<S>, value: u64) -> Result<()> {
    if value <= 0x7F {
        writer.write_unsigned(8, value as u32)?;
        return Ok(());
    }

    let total_bytes: u32 = if value <= 0x7FF {
        2
    } else if value <= 0xFFFF {
        3
    } else if value <= 0x1F_FFFF {
        4
    } else if value <= 0x3FF_FFFF {
        5
    } else if value <= 0x7FFF_FFFF {
        6
    } else {
        7
    };

    let mut shift = (total_bytes as i32 - 1) * 6;
    writer.write_unary(0, total_bytes)?;
    writer.write_unsigned(7 - total_bytes, (value >> shift) as u32)?;

    shift -= 6;
    while shift >= 0 {
        writer.write_unary(0, 1)?;
        writer.write_unsigned(6, ((value >> shift) & 0x3F) as u32)?;
        shift -= 6;
    }

    Ok(())
}

fn read_utf8(reader: &mut BitReader) -> Result<u64> {
    let total_bytes = reader.read_unary(0)?;
    let mut value = reader.read_unsigned(7 - total_bytes.min(7))? as u64;
    for _ in 1..total_bytes {
        let byte = reader.read_unsigned(8)?;
        value = (value << 6) | (byte as u64 & 0x3F);
    }
    Ok(value)
}

/// Parses a frame header, verifying its CRC-8 and cross-checking the
/// decoded fields against STREAMINFO.
pub fn read_frame_header(reader: &mut BitReader, stream_info: &StreamInfo) -> Result<FrameHeader> {
    let crc = Arc::new(Mutex::new(RunningCrc8::new()));
    let crc_for_cb = Arc::clone(&crc);
    reader.add_callback(Box::new(move |byte| {
        crc_for_cb.lock().unwrap().update(byte);
    }));

    let result = (|| -> Result<FrameHeader> {
        let sync = reader.read_unsigned(14)?;
        if sync != 0x3FFE {
            return Err(FlacError::InvalidSyncCode.into());
        }
        if reader.read_unsigned(1)? != 0 {
            return Err(FlacError::InvalidReservedBit.into());
        }

        let blocking_strategy = reader.read_unsigned(1)? as u8;
        let block_size_bits = reader.read_unsigned(4)?;
        let sample_rate_bits = reader.read_unsigned(4)?;
        let channel_assignment = ChannelAssignment::from_code(reader.read_unsigned(4)?)?;

        let bits_per_sample = match reader.read_unsigned(3)? {
            0 => stream_info.bits_per_sample,
            1 => 8,
            2 => 12,
            4 => 16,
            5 => 20,
            6 => 24,
            _ => return Err(FlacError::InvalidBitsPerSample.into()),
        };

        if reader.read_unsigned(1)? != 0 {
            return Err(FlacError::InvalidReservedBit.into());
        }

        let frame_or_sample_number = read_utf8(reader)?;

        let block_size = match block_size_bits {
            0x0 => stream_info.max_block_size as u32,
            0x1 => 192,
            0x2 => 576,
            0x3 => 1152,
            0x4 => 2304,
            0x5 => 4608,
            0x6 => reader.read_unsigned(8)? + 1,
            0x7 => reader.read_unsigned(16)? + 1,
            code => 256u32 << (code - 8),
        };

        let sample_rate = match sample_rate_bits {
            0x0 => stream_info.sample_rate,
            0x1 => 88200,
            0x2 => 176400,
            0x3 => 192000,
            0x4 => 8000,
            0x5 => 16000,
            0x6 => 22050,
            0x7 => 24000,
            0x8 => 32000,
            0x9 => 44100,
            0xA => 48000,
            0xB => 96000,
            0xC => reader.read_unsigned(8)? * 1000,
            0xD => reader.read_unsigned(16)?,
            0xE => reader.read_unsigned(16)? * 10,
            _ => return Err(FlacError::InvalidSampleRate.into()),
        };

        reader.read_unsigned(8)?; // crc-8, checked below

        Ok(FrameHeader {
            blocking_strategy,
            block_size,
            sample_rate,
            channel_assignment,
            bits_per_sample,
            frame_or_sample_number,
        })
    })();

    reader.pop_callback();
    let header = result?;

    if crc.lock().unwrap().value() != 0 {
        return Err(FlacError::InvalidCRC8.into());
    }

    if header.sample_rate != stream_info.sample_rate
        || header.channel_assignment.channel_count() != stream_info.channels
        || header.bits_per_sample != stream_info.bits_per_sample
    {
        return Err(FlacError::MetadataFieldMismatch.into());
    }
    if header.block_size > stream_info.max_block_size as u32 {
        return Err(FlacError::BlockSizeExceedsMax.into());
    }

    Ok(header)
}

/// Writes a frame header, appending its own CRC-8.
pub fn write_frame_header<S: ByteSink>(
    writer: &mut BitWriter<S>,
    block_size: u32,
    sample_rate: u32,
    bits_per_sample: u8,
    frame_number: u64,
    channel_assignment: ChannelAssignment,
) -> Result<()> {
    let crc = Arc::new(Mutex::new(RunningCrc8::new()));
    let crc_for_cb = Arc::clone(&crc);
    writer.add_callback(Box::new(move |byte| {
        crc_for_cb.lock().unwrap().update(byte);
    }));

    let encoded_block_size = encode_block_size(block_size);
    let encoded_sample_rate = encode_sample_rate(sample_rate);
    let encoded_bps = encode_bits_per_sample(bits_per_sample);

    let result = (|| -> Result<()> {
        writer.write_unsigned(14, 0x3FFE)?;
        writer.write_unsigned(1, 0)?;
        writer.write_unsigned(1, 0)?;
        writer.write_unsigned(4, encoded_block_size)?;
        writer.write_unsigned(4, encoded_sample_rate)?;
        writer.write_unsigned(4, channel_assignment.code())?;
        writer.write_unsigned(3, encoded_bps)?;
        writer.write_unsigned(1, 0)?;

        write_utf8(writer, frame_number)?;

        if encoded_block_size == 6 {
            writer.write_unsigned(8, block_size - 1)?;
        } else if encoded_block_size == 7 {
            writer.write_unsigned(16, block_size - 1)?;
        }

        if encoded_sample_rate == 12 {
            writer.write_unsigned(8, sample_rate / 1000)?;
        } else if encoded_sample_rate == 13 {
            writer.write_unsigned(16, sample_rate)?;
        } else if encoded_sample_rate == 14 {
            writer.write_unsigned(16, sample_rate / 10)?;
        }

        Ok(())
    })();

    writer.pop_callback();
    result?;

    let crc8 = crc.lock().unwrap().value();
    writer.write_unsigned(8, crc8 as u32)?;

    Ok(())
}

/// Undoes inter-channel decorrelation, producing interleaved samples
/// in channel order.
pub fn decorrelate(
    channel_assignment: ChannelAssignment,
    subframes: &[Vec<i32>],
) -> Vec<i32> {
    let block_size = subframes[0].len();
    let channel_count = subframes.len();
    let mut out = Vec::with_capacity(block_size * channel_count);

    match channel_assignment {
        ChannelAssignment::LeftSide => {
            for i in 0..block_size {
                let left = subframes[0][i];
                let side = subframes[1][i];
                out.push(left);
                out.push(left - side);
            }
        }
        ChannelAssignment::SideRight => {
            for i in 0..block_size {
                let side = subframes[0][i];
                let right = subframes[1][i];
                out.push(side + right);
                out.push(right);
            }
        }
        ChannelAssignment::MidSide => {
            for i in 0..block_size {
                let mid = subframes[0][i] as i64;
                let side = subframes[1][i] as i64;
                let mid = (mid << 1) | (side & 1);
                out.push(((mid + side) >> 1) as i32);
                out.push(((mid - side) >> 1) as i32);
            }
        }
        ChannelAssignment::Independent(_) => {
            for i in 0..block_size {
                for ch in subframes {
                    out.push(ch[i]);
                }
            }
        }
    }

    out
}

/// Computes the `(average, difference)` pair the mid/side candidates
/// are built from, per spec's inter-channel correlation step.
pub fn correlate_stereo(left: &[i32], right: &[i32]) -> (Vec<i32>, Vec<i32>) {
    let average = left
        .iter()
        .zip(right)
        .map(|(&l, &r)| (l + r) >> 1)
        .collect();
    let difference = left.iter().zip(right).map(|(&l, &r)| l - r).collect();
    (average, difference)
}

/// The effective bits-per-sample for one channel of a frame: the
/// difference channel of each stereo mode carries one extra bit.
pub fn channel_bits_per_sample(
    assignment: ChannelAssignment,
    channel: u8,
    bits_per_sample: u8,
) -> u8 {
    match (assignment, channel) {
        (ChannelAssignment::LeftSide, 1) => bits_per_sample + 1,
        (ChannelAssignment::SideRight, 0) => bits_per_sample + 1,
        (ChannelAssignment::MidSide, 1) => bits_per_sample + 1,
        _ => bits_per_sample,
    }
}

fn wasted_bits(samples: &[i32]) -> u32 {
    let combined = samples.iter().fold(0u32, |acc, &s| acc | (s as u32));
    if combined == 0 {
        0
    } else {
        combined.trailing_zeros()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubframeType {
    Constant,
    Verbatim,
    Fixed(u32),
    Lpc(u32),
}

fn read_subframe_header(reader: &mut BitReader) -> Result<(SubframeType, u32)> {
    reader.read_unsigned(1)?; // padding
    let subframe_type = reader.read_unsigned(6)?;

    let kind = if subframe_type == 0 {
        SubframeType::Constant
    } else if subframe_type == 1 {
        SubframeType::Verbatim
    } else if subframe_type & 0x38 == 0x08 {
        let order = subframe_type & 0x07;
        if order > 4 {
            return Err(FlacError::InvalidFixedOrder.into());
        }
        SubframeType::Fixed(order)
    } else if subframe_type & 0x20 == 0x20 {
        SubframeType::Lpc((subframe_type & 0x1F) + 1)
    } else {
        return Err(FlacError::InvalidSubframeHeader.into());
    };

    let wasted = if reader.read_unsigned(1)? == 0 {
        0
    } else {
        reader.read_unary(1)? + 1
    };

    Ok((kind, wasted))
}

fn write_subframe_header<S: ByteSink>(
    writer: &mut BitWriter<S>,
    kind: SubframeType,
    wasted: u32,
) -> Result<()> {
    writer.write_unsigned(1, 0)?;
    match kind {
        SubframeType::Constant => writer.write_unsigned(6, 0)?,
        SubframeType::Verbatim => writer.write_unsigned(6, 1)?,
        SubframeType::Fixed(order) => {
            writer.write_unsigned(3, 1)?;
            writer.write_unsigned(3, order)?;
        }
        SubframeType::Lpc(order) => {
            writer.write_unsigned(1, 1)?;
            writer.write_unsigned(5, order - 1)?;
        }
    }

    if wasted > 0 {
        writer.write_unsigned(1, 1)?;
        writer.write_unary(1, wasted - 1)?;
    } else {
        writer.write_unsigned(1, 0)?;
    }

    Ok(())
}

fn reconstruct_fixed(order: u32, warmup: &[i32], residual: &[i32]) -> Vec<i32> {
    let mut s = warmup.to_vec();
    s.reserve(residual.len());
    match order {
        0 => s.extend_from_slice(residual),
        1 => {
            for (i, &r) in residual.iter().enumerate() {
                let prev = s[order as usize + i - 1];
                s.push(prev + r);
            }
        }
        2 => {
            for (i, &r) in residual.iter().enumerate() {
                let n = order as usize + i;
                s.push(2 * s[n - 1] - s[n - 2] + r);
            }
        }
        3 => {
            for (i, &r) in residual.iter().enumerate() {
                let n = order as usize + i;
                s.push(3 * s[n - 1] - 3 * s[n - 2] + s[n - 3] + r);
            }
        }
        4 => {
            for (i, &r) in residual.iter().enumerate() {
                let n = order as usize + i;
                s.push(4 * s[n - 1] - 6 * s[n - 2] + 4 * s[n - 3] - s[n - 4] + r);
            }
        }
        _ => unreachable!("FIXED order validated to 0..=4 at the subframe header"),
    }
    s
}

/// Reads one subframe's decoded samples.
pub fn read_subframe(
    reader: &mut BitReader,
    block_size: u32,
    bits_per_sample: u8,
) -> Result<Vec<i32>> {
    let (kind, wasted) = read_subframe_header(reader)?;
    let effective_bps = bits_per_sample as u32 - wasted;

    let mut samples = match kind {
        SubframeType::Constant => {
            let value = reader.read_signed(effective_bps)?;
            vec![value; block_size as usize]
        }
        SubframeType::Verbatim => {
            let mut samples = Vec::with_capacity(block_size as usize);
            for _ in 0..block_size {
                samples.push(reader.read_signed(effective_bps)?);
            }
            samples
        }
        SubframeType::Fixed(order) => {
            if order > block_size {
                return Err(FlacError::InvalidFixedOrder.into());
            }
            let mut warmup = Vec::with_capacity(order as usize);
            for _ in 0..order {
                warmup.push(reader.read_signed(effective_bps)?);
            }
            let residual = residual::read_residual(reader, order as usize, block_size as usize)?;
            reconstruct_fixed(order, &warmup, &residual)
        }
        SubframeType::Lpc(order) => {
            if order >= block_size {
                return Err(FlacError::InvalidLpcOrder.into());
            }
            let mut warmup = Vec::with_capacity(order as usize);
            for _ in 0..order {
                warmup.push(reader.read_signed(effective_bps)?);
            }
            let precision = reader.read_unsigned(4)? + 1;
            let shift = reader.read_signed(5)?.max(0) as u32;
            let mut coeffs = Vec::with_capacity(order as usize);
            for _ in 0..order {
                coeffs.push(reader.read_signed(precision)?);
            }
            let residual = residual::read_residual(reader, order as usize, block_size as usize)?;

            let mut samples = warmup;
            samples.reserve(residual.len());
            for (i, &r) in residual.iter().enumerate() {
                let n = order as usize + i;
                let mut acc: i64 = 0;
                for (j, &c) in coeffs.iter().enumerate() {
                    acc += c as i64 * samples[n - j - 1] as i64;
                }
                samples.push((acc >> shift) as i32 + r);
            }
            samples
        }
    };

    if wasted > 0 {
        for s in samples.iter_mut() {
            *s <<= wasted;
        }
    }

    Ok(samples)
}

/// Encoder knobs threaded down from `EncoderConfig`.
#[derive(Debug, Clone, Copy)]
pub struct SubframeEncodeOptions {
    pub max_lpc_order: u32,
    pub exhaustive_model_search: bool,
    pub max_rice_parameter: u32,
    pub max_residual_partition_order: u32,
}

fn encode_constant<S: ByteSink>(writer: &mut BitWriter<S>, value: i32, bps: u32, wasted: u32) -> Result<()> {
    write_subframe_header(writer, SubframeType::Constant, wasted)?;
    writer.write_signed(bps, value)?;
    Ok(())
}

fn encode_verbatim<S: ByteSink>(writer: &mut BitWriter<S>, samples: &[i32], bps: u32, wasted: u32) -> Result<()> {
    write_subframe_header(writer, SubframeType::Verbatim, wasted)?;
    for &s in samples {
        writer.write_signed(bps, s)?;
    }
    Ok(())
}

fn encode_fixed<S: ByteSink>(
    writer: &mut BitWriter<S>,
    samples: &[i32],
    bps: u32,
    wasted: u32,
    options: &SubframeEncodeOptions,
) -> Result<()> {
    let max_order = (samples.len().saturating_sub(1)).min(4) as u32;
    let mut best_order = 0u32;
    let mut best_sum = samples.iter().map(|&v| (v as i64).unsigned_abs()).sum::<u64>();
    let mut best_residual = samples.to_vec();

    let mut current = samples.to_vec();
    for order in 1..=max_order {
        let mut next = Vec::with_capacity(current.len() - 1);
        for i in 1..current.len() {
            next.push(current[i] - current[i - 1]);
        }
        current = next;
        let sum: u64 = current.iter().map(|&v| (v as i64).unsigned_abs()).sum();
        if sum < best_sum {
            best_sum = sum;
            best_order = order;
            best_residual = current.clone();
        }
    }

    write_subframe_header(writer, SubframeType::Fixed(best_order), wasted)?;
    for &s in &samples[..best_order as usize] {
        writer.write_signed(bps, s)?;
    }

    let plan = residual::choose_residual_plan(
        &best_residual,
        best_order as usize,
        samples.len(),
        options.max_rice_parameter,
        options.max_residual_partition_order,
    );
    residual::write_residual(writer, &best_residual, best_order as usize, samples.len(), &plan)?;
    Ok(())
}

fn lpc_residual_for_order(order: usize, samples: &[i32], coeffs: &[i32], shift: u32) -> Vec<i32> {
    let mut residual = Vec::with_capacity(samples.len() - order);
    for i in order..samples.len() {
        let mut acc: i64 = 0;
        for (j, &c) in coeffs.iter().enumerate() {
            acc += c as i64 * samples[i - j - 1] as i64;
        }
        let prediction = (acc >> shift) as i32;
        residual.push(samples[i] - prediction);
    }
    residual
}

fn encode_lpc<S: ByteSink>(
    writer: &mut BitWriter<S>,
    samples: &[i32],
    bps: u32,
    wasted: u32,
    options: &SubframeEncodeOptions,
) -> Result<()> {
    let max_order = (options.max_lpc_order as usize).min(samples.len().saturating_sub(1)).min(crate::flac::lpc::MAX_LPC_ORDER);
    let precision = crate::flac::lpc::precision_for_block_size(samples.len() as u32);

    let windowed: Vec<f64> = {
        let window = crate::flac::lpc::tukey_window(samples.len(), 0.5);
        samples.iter().zip(&window).map(|(&s, &w)| s as f64 * w).collect()
    };
    let autoc = crate::flac::lpc::autocorrelate(&windowed, max_order);
    let (lp_coeff, error) = crate::flac::lpc::levinson_durbin(&autoc, max_order);

    let orders: Vec<usize> = if options.exhaustive_model_search {
        (1..=max_order).collect()
    } else {
        vec![crate::flac::lpc::estimate_best_order(bps, precision, samples.len(), max_order, &error)]
    };

    let mut best: Option<(usize, Vec<i32>, u32, Vec<i32>)> = None;

    for order in orders {
        let (qlp, shift) = crate::flac::lpc::quantize_coefficients(&lp_coeff[order - 1], precision);
        let residual = lpc_residual_for_order(order, samples, &qlp, shift);
        let cost: u64 = residual.iter().map(|&v| (v as i64).unsigned_abs()).sum();
        if best.as_ref().map(|(_, _, _, r)| {
            r.iter().map(|&v: &i32| (v as i64).unsigned_abs()).sum::<u64>()
        }).map_or(true, |best_cost| cost < best_cost) {
            best = Some((order, qlp, shift, residual));
        }
    }

    let (order, qlp, shift, residual) = best.expect("at least one LPC order attempted");

    write_subframe_header(writer, SubframeType::Lpc(order as u32), wasted)?;
    for &s in &samples[..order] {
        writer.write_signed(bps, s)?;
    }
    writer.write_unsigned(4, precision - 1)?;
    writer.write_signed(5, shift as i32)?;
    for &c in &qlp {
        writer.write_signed(precision, c)?;
    }

    let plan = residual::choose_residual_plan(
        &residual,
        order,
        samples.len(),
        options.max_rice_parameter,
        options.max_residual_partition_order,
    );
    residual::write_residual(writer, &residual, order, samples.len(), &plan)?;
    Ok(())
}

/// Picks the smallest subframe encoding for one channel's samples,
/// using a limited recorder to reject FIXED/LPC candidates that would
/// exceed the best size found so far.
enum ChosenSubframe {
    Fixed,
    Lpc,
    Verbatim,
}

pub fn encode_subframe<S: ByteSink>(
    writer: &mut BitWriter<S>,
    samples: &[i32],
    bits_per_sample: u8,
    options: &SubframeEncodeOptions,
) -> Result<()> {
    if samples.iter().all(|&s| s == samples[0]) {
        return encode_constant(writer, samples[0], bits_per_sample as u32, 0);
    }

    let wasted = wasted_bits(samples);
    let effective_bps = bits_per_sample as u32 - wasted;
    let shifted: Vec<i32> = if wasted > 0 {
        samples.iter().map(|&s| s >> wasted).collect()
    } else {
        samples.to_vec()
    };

    // Each candidate is trial-encoded into a limited recorder so the
    // bit cost can be compared without committing to the real writer;
    // the winner is then re-encoded directly onto `writer`.
    let mut smallest_bits = (8 + wasted + effective_bps * shifted.len() as u32) as u64;
    let mut chosen = ChosenSubframe::Verbatim;

    {
        let mut candidate = BitWriter::<crate::bitstream::VecSink>::limited_recorder(
            crate::bitstream::BitEndian::Big,
            smallest_bits,
        );
        if encode_fixed(&mut candidate, &shifted, effective_bps, wasted, options).is_ok() {
            smallest_bits = candidate.bits_written();
            chosen = ChosenSubframe::Fixed;
        }
    }

    if options.max_lpc_order > 0 && shifted.len() > 1 {
        let mut candidate = BitWriter::<crate::bitstream::VecSink>::limited_recorder(
            crate::bitstream::BitEndian::Big,
            smallest_bits.max(1),
        );
        if encode_lpc(&mut candidate, &shifted, effective_bps, wasted, options).is_ok()
            && candidate.bits_written() <= smallest_bits
        {
            chosen = ChosenSubframe::Lpc;
        }
    }

    match chosen {
        ChosenSubframe::Fixed => encode_fixed(writer, &shifted, effective_bps, wasted, options),
        ChosenSubframe::Lpc => encode_lpc(writer, &shifted, effective_bps, wasted, options),
        ChosenSubframe::Verbatim => encode_verbatim(writer, &shifted, effective_bps, wasted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitEndian, SliceSource, VecSink};

    #[test]
    fn channel_assignment_from_code_rejects_reserved_values() {
        assert!(ChannelAssignment::from_code(0xB).is_err());
        assert!(ChannelAssignment::from_code(0xF).is_err());
        assert_eq!(
            ChannelAssignment::from_code(0x0).unwrap(),
            ChannelAssignment::Independent(1)
        );
    }

    #[test]
    fn decorrelate_difference_right_matches_worked_example() {
        let difference = vec![3, 5, 7];
        let right = vec![1, 2, 3];
        let out = decorrelate(ChannelAssignment::SideRight, &[difference, right]);
        assert_eq!(out, vec![4, 1, 7, 2, 10, 3]);
    }

    #[test]
    fn utf8_number_round_trips_across_byte_widths() {
        for value in [0u64, 0x7F, 0x80, 0x7FF, 0x800, 0xFFFF, 0x1_0000, 68_719_476_735] {
            let mut writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
            write_utf8(&mut writer, value).unwrap();
            let data = writer.into_recorder_data().unwrap();
            let mut reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
            assert_eq!(read_utf8(&mut reader).unwrap(), value);
        }
    }

    #[test]
    fn fixed_subframe_round_trips() {
        let samples: Vec<i32> = (0..64).collect();
        let options = SubframeEncodeOptions {
            max_lpc_order: 0,
            exhaustive_model_search: false,
            max_rice_parameter: 14,
            max_residual_partition_order: 4,
        };
        let mut writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
        encode_subframe(&mut writer, &samples, 16, &options).unwrap();
        let data = writer.into_recorder_data().unwrap();

        let mut reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
        let decoded = read_subframe(&mut reader, samples.len() as u32, 16).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn constant_subframe_round_trips() {
        let samples = vec![100i32; 4096];
        let options = SubframeEncodeOptions {
            max_lpc_order: 0,
            exhaustive_model_search: false,
            max_rice_parameter: 14,
            max_residual_partition_order: 4,
        };
        let mut writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
        encode_subframe(&mut writer, &samples, 16, &options).unwrap();
        let data = writer.into_recorder_data().unwrap();

        let mut reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
        let decoded = read_subframe(&mut reader, samples.len() as u32, 16).unwrap();
        assert_eq!(decoded, samples);
    }
}
