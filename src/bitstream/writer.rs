use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use num_bigint::{BigInt, BigUint, Sign};

use crate::error::{BitResult, BitstreamError};

use super::endian::BitEndian;
use super::format::{parse_format, FormatAction};
use super::huffman::HuffmanTable;
use super::position::Position;
use super::sink::{ByteSink, FileSink, VecSink};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

type Callback = Box<dyn FnMut(u8) + Send>;

impl ByteSink for Box<dyn ByteSink> {
    fn write_bytes(&mut self, data: &[u8]) -> std::io::Result<()> {
        (**self).write_bytes(data)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        (**self).flush()
    }
    fn supports_position(&self) -> bool {
        (**self).supports_position()
    }
    fn tell(&mut self) -> BitResult<u64> {
        (**self).tell()
    }
    fn seek_to(&mut self, pos: u64) -> BitResult<()> {
        (**self).seek_to(pos)
    }
    fn close(&mut self) -> std::io::Result<()> {
        (**self).close()
    }
}

/// A bit-granular writer over any `ByteSink`.
///
/// Mirrors `BitReader`: a partial-bit accumulator, a callback stack
/// fired in push order on every full byte produced, and an optional
/// write budget (`limit`) that turns this into the "limited recorder"
/// of spec §4.2 — the mechanism the FLAC encoder uses to abandon a
/// candidate subframe the moment it can no longer beat the best one
/// found so far.
pub struct BitWriter<S: ByteSink = Box<dyn ByteSink>> {
    id: u64,
    sink: S,
    endian: BitEndian,
    cur_byte: u8,
    cur_bits: u8,
    total_bits: u64,
    limit_bits: Option<u64>,
    callbacks: Vec<Callback>,
    open_scopes: u32,
}

impl<S: ByteSink> BitWriter<S> {
    pub fn new(sink: S, endian: BitEndian) -> Self {
        BitWriter {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            sink,
            endian,
            cur_byte: 0,
            cur_bits: 0,
            total_bits: 0,
            limit_bits: None,
            callbacks: Vec::new(),
            open_scopes: 0,
        }
    }

    pub fn endian(&self) -> BitEndian {
        self.endian
    }

    pub fn set_endianness(&mut self, endian: BitEndian) -> BitResult<()> {
        self.byte_align()?;
        self.endian = endian;
        Ok(())
    }

    pub fn with_limit_bits(mut self, max_bits: u64) -> Self {
        self.limit_bits = Some(max_bits);
        self
    }

    pub fn add_callback(&mut self, f: Callback) {
        self.callbacks.push(f);
    }

    pub fn pop_callback(&mut self) -> Option<Callback> {
        let cb = self.callbacks.pop();
        if cb.is_none() {
            log::warn!("pop_callback called on an empty callback stack");
        }
        cb
    }

    pub fn call_callbacks(&mut self, byte: u8) {
        for cb in self.callbacks.iter_mut().rev() {
            cb(byte);
        }
    }

    pub fn enter_scope(&mut self) {
        self.open_scopes += 1;
    }

    pub fn exit_scope(&mut self) {
        self.open_scopes = self.open_scopes.saturating_sub(1);
    }

    fn push_bit(&mut self, bit: u8) -> BitResult<()> {
        if let Some(max) = self.limit_bits {
            if self.total_bits + 1 > max {
                return Err(BitstreamError::LimitExceeded);
            }
        }

        match self.endian {
            BitEndian::Big => self.cur_byte = (self.cur_byte << 1) | (bit & 1),
            BitEndian::Little => self.cur_byte |= (bit & 1) << self.cur_bits,
        }
        self.cur_bits += 1;
        self.total_bits += 1;

        if self.cur_bits == 8 {
            let byte = self.cur_byte;
            self.sink.write_bytes(&[byte])?;
            for cb in self.callbacks.iter_mut().rev() {
                cb(byte);
            }
            self.cur_byte = 0;
            self.cur_bits = 0;
        }
        Ok(())
    }

    pub fn write_unsigned(&mut self, bits: u32, value: u32) -> BitResult<()> {
        assert!(bits <= 32);
        assert!(bits == 32 || value < (1u32 << bits), "value out of range for {bits} bits");
        for i in (0..bits).rev() {
            self.push_bit(((value >> i) & 1) as u8)?;
        }
        Ok(())
    }

    pub fn write_signed(&mut self, bits: u32, value: i32) -> BitResult<()> {
        assert!(bits >= 1 && bits <= 32);
        let lo = -(1i64 << (bits - 1));
        let hi = 1i64 << (bits - 1);
        assert!((value as i64) >= lo && (value as i64) < hi, "value out of range for {bits} bits");

        let pattern: u32 = if bits == 32 {
            value as u32
        } else {
            (value as u32) & ((1u32 << bits) - 1)
        };
        let sign = (pattern >> (bits - 1)) & 1;
        let mag = pattern & ((1u32 << (bits - 1)) - 1);

        match self.endian {
            BitEndian::Big => {
                self.push_bit(sign as u8)?;
                self.write_unsigned(bits - 1, mag)?;
            }
            BitEndian::Little => {
                self.write_unsigned(bits - 1, mag)?;
                self.push_bit(sign as u8)?;
            }
        }
        Ok(())
    }

    pub fn write_u64(&mut self, bits: u32, value: u64) -> BitResult<()> {
        assert!(bits <= 64);
        for i in (0..bits).rev() {
            self.push_bit(((value >> i) & 1) as u8)?;
        }
        Ok(())
    }

    pub fn write_s64(&mut self, bits: u32, value: i64) -> BitResult<()> {
        assert!(bits >= 1 && bits <= 64);
        let pattern: u64 = if bits == 64 {
            value as u64
        } else {
            (value as u64) & ((1u64 << bits) - 1)
        };
        let sign = (pattern >> (bits - 1)) & 1;
        let mag = pattern & ((1u64 << (bits - 1)) - 1);

        match self.endian {
            BitEndian::Big => {
                self.push_bit(sign as u8)?;
                self.write_u64(bits - 1, mag)?;
            }
            BitEndian::Little => {
                self.write_u64(bits - 1, mag)?;
                self.push_bit(sign as u8)?;
            }
        }
        Ok(())
    }

    pub fn write_big_unsigned(&mut self, bits: u64, value: &BigUint) -> BitResult<()> {
        for i in (0..bits).rev() {
            self.push_bit(value.bit(i) as u8)?;
        }
        Ok(())
    }

    pub fn write_big_signed(&mut self, bits: u64, value: &BigInt) -> BitResult<()> {
        assert!(bits >= 1);
        let bias = BigInt::from_biguint(Sign::Plus, BigUint::from(1u32) << (bits - 1) as u32);
        let (sign, magnitude) = if value.sign() == num_bigint::Sign::Minus {
            (1u8, (value + &bias).to_biguint().unwrap())
        } else {
            (0u8, value.to_biguint().unwrap())
        };

        match self.endian {
            BitEndian::Big => {
                self.push_bit(sign)?;
                self.write_big_unsigned(bits - 1, &magnitude)?;
            }
            BitEndian::Little => {
                self.write_big_unsigned(bits - 1, &magnitude)?;
                self.push_bit(sign)?;
            }
        }
        Ok(())
    }

    pub fn write_unary(&mut self, stop_bit: u8, value: u32) -> BitResult<()> {
        let stop = stop_bit & 1;
        let run = 1 - stop;
        for _ in 0..value {
            self.push_bit(run)?;
        }
        self.push_bit(stop)
    }

    pub fn write_huffman(&mut self, table: &HuffmanTable, value: i32) -> BitResult<()> {
        let (bits, code) = table.code_for(value)?;
        for i in (0..bits).rev() {
            self.push_bit(((code >> i) & 1) as u8)?;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> BitResult<()> {
        if self.byte_aligned() {
            if let Some(max) = self.limit_bits {
                if self.total_bits + (bytes.len() as u64) * 8 > max {
                    return Err(BitstreamError::LimitExceeded);
                }
            }
            self.sink.write_bytes(bytes)?;
            self.total_bits += bytes.len() as u64 * 8;
            for &b in bytes {
                for cb in self.callbacks.iter_mut().rev() {
                    cb(b);
                }
            }
            Ok(())
        } else {
            for &b in bytes {
                self.write_unsigned(8, b as u32)?;
            }
            Ok(())
        }
    }

    pub fn byte_aligned(&self) -> bool {
        self.cur_bits == 0
    }

    pub fn byte_align(&mut self) -> BitResult<()> {
        while self.cur_bits != 0 {
            self.push_bit(0)?;
        }
        Ok(())
    }

    /// Flushes any buffered whole bytes to the sink. Does **not**
    /// byte-align: a partial bit accumulator, if any, stays buffered.
    pub fn flush(&mut self) -> BitResult<()> {
        self.sink.flush()?;
        Ok(())
    }

    pub fn get_pos(&mut self) -> BitResult<Position> {
        if !self.sink.supports_position() {
            return Err(BitstreamError::PositionUnsupported);
        }
        Ok(Position {
            stream_id: self.id,
            byte_offset: self.sink.tell()?,
            bit_pos: self.cur_bits,
            unread_bit: None,
        })
    }

    /// Restores a previously saved position for later patching (e.g.
    /// fixing up a STREAMINFO block with computed values). Requires
    /// the sink to support random access.
    pub fn set_pos(&mut self, pos: Position) -> BitResult<()> {
        if pos.stream_id != self.id {
            return Err(BitstreamError::ForeignPosition);
        }
        if !self.byte_aligned() {
            // Only byte-aligned writers patch cleanly; mid-byte seeks
            // are not a pattern this encoder ever needs.
            return Err(BitstreamError::PositionUnsupported);
        }
        self.sink.seek_to(pos.byte_offset)
    }

    pub fn build(&mut self, fmt: &str, fields: &[WriteField]) -> BitResult<()> {
        let actions = parse_format(fmt)?;
        let mut fields = fields.iter();
        for action in actions {
            match action {
                FormatAction::Unsigned(n) => {
                    self.write_unsigned(n, expect_unsigned(fields.next()))?
                }
                FormatAction::Signed(n) => self.write_signed(n, expect_signed(fields.next()))?,
                FormatAction::U64(n) => self.write_u64(n, expect_u64(fields.next()))?,
                FormatAction::S64(n) => self.write_s64(n, expect_s64(fields.next()))?,
                FormatAction::BigUnsigned(n) => {
                    self.write_big_unsigned(n as u64, expect_big_unsigned(fields.next()))?
                }
                FormatAction::BigSigned(n) => {
                    self.write_big_signed(n as u64, expect_big_signed(fields.next()))?
                }
                FormatAction::SkipBits(n) => {
                    for _ in 0..n {
                        self.push_bit(0)?;
                    }
                }
                FormatAction::SkipBytes(n) => {
                    self.write_bytes(&vec![0u8; n as usize])?;
                }
                FormatAction::Bytes(_) => self.write_bytes(expect_bytes(fields.next()))?,
                FormatAction::Align => self.byte_align()?,
            }
        }
        Ok(())
    }

    pub fn bits_written(&self) -> u64 {
        self.total_bits
    }

    pub fn bytes_written(&self) -> u64 {
        self.total_bits / 8
    }

    /// Unwraps the underlying sink, bypassing the usual `close()` on
    /// drop — used by callers (e.g. the FLAC encoder's `finish`) that
    /// need the sink back to hand its contents to someone else.
    pub fn into_sink(self) -> S {
        let mut this = std::mem::ManuallyDrop::new(self);
        unsafe { std::ptr::read(&this.sink) }
    }
}

impl<S: ByteSink> Drop for BitWriter<S> {
    fn drop(&mut self) {
        if self.open_scopes > 0 {
            log::warn!(
                "BitWriter dropped with {} unclosed checkpoint scope(s)",
                self.open_scopes
            );
        }
        let _ = self.sink.close();
    }
}

impl BitWriter<Box<dyn ByteSink>> {
    pub fn from_file(file: File, endian: BitEndian) -> Self {
        BitWriter::new(Box::new(FileSink::new(file)) as Box<dyn ByteSink>, endian)
    }

    pub fn create<P: AsRef<Path>>(path: P, endian: BitEndian) -> std::io::Result<Self> {
        Ok(Self::from_file(File::create(path)?, endian))
    }
}

/// A writer backed by an in-memory `VecSink`. Exposes the extra
/// measurement/copy/reset operations spec §4.2 attaches to a
/// "recorder" writer.
impl BitWriter<VecSink> {
    pub fn recorder(endian: BitEndian) -> Self {
        BitWriter::new(VecSink::new(), endian)
    }

    pub fn limited_recorder(endian: BitEndian, max_bits: u64) -> Self {
        BitWriter::new(VecSink::new(), endian).with_limit_bits(max_bits)
    }

    pub fn data(&self) -> &[u8] {
        self.sink.data()
    }

    pub fn into_recorder_data(self) -> BitResult<Vec<u8>> {
        if !self.byte_aligned() {
            return Err(BitstreamError::PositionUnsupported);
        }
        Ok(self.sink.data().to_vec())
    }

    pub fn reset(&mut self) {
        self.sink.reset();
        self.cur_byte = 0;
        self.cur_bits = 0;
        self.total_bits = 0;
    }

    /// Copies this recorder's buffered bytes into `target`. Both
    /// writers must be byte-aligned.
    pub fn copy_to<T: ByteSink>(&self, target: &mut BitWriter<T>) -> BitResult<()> {
        target.write_bytes(self.sink.data())
    }
}

fn expect_unsigned(f: Option<&WriteField>) -> u32 {
    match f {
        Some(WriteField::Unsigned(v)) => *v,
        _ => panic!("build(): expected an unsigned field"),
    }
}
fn expect_signed(f: Option<&WriteField>) -> i32 {
    match f {
        Some(WriteField::Signed(v)) => *v,
        _ => panic!("build(): expected a signed field"),
    }
}
fn expect_u64(f: Option<&WriteField>) -> u64 {
    match f {
        Some(WriteField::U64(v)) => *v,
        _ => panic!("build(): expected a u64 field"),
    }
}
fn expect_s64(f: Option<&WriteField>) -> i64 {
    match f {
        Some(WriteField::S64(v)) => *v,
        _ => panic!("build(): expected an s64 field"),
    }
}
fn expect_big_unsigned(f: Option<&WriteField>) -> &BigUint {
    match f {
        Some(WriteField::BigUnsigned(v)) => v,
        _ => panic!("build(): expected a big-unsigned field"),
    }
}
fn expect_big_signed(f: Option<&WriteField>) -> &BigInt {
    match f {
        Some(WriteField::BigSigned(v)) => v,
        _ => panic!("build(): expected a big-signed field"),
    }
}
fn expect_bytes(f: Option<&WriteField>) -> &[u8] {
    match f {
        Some(WriteField::Bytes(v)) => v,
        _ => panic!("build(): expected a bytes field"),
    }
}

/// One value consumed by `BitWriter::build`, mirroring `ParsedField`.
#[derive(Debug, Clone)]
pub enum WriteField {
    Unsigned(u32),
    Signed(i32),
    U64(u64),
    S64(i64),
    BigUnsigned(BigUint),
    BigSigned(BigInt),
    Bytes(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_scenario_1() {
        let mut w = BitWriter::recorder(BitEndian::Big);
        w.write_unsigned(3, 3).unwrap();
        w.write_unsigned(5, 13).unwrap();
        assert_eq!(w.data(), &[0x6D]);
    }

    #[test]
    fn little_endian_scenario_2() {
        let mut w = BitWriter::recorder(BitEndian::Little);
        w.write_unsigned(3, 3).unwrap();
        w.write_unsigned(5, 13).unwrap();
        assert_eq!(w.data(), &[0x6B]);
    }

    #[test]
    fn unary_scenario_3() {
        let mut w = BitWriter::recorder(BitEndian::Big);
        w.write_unary(0, 5).unwrap();
        w.byte_align().unwrap();
        assert_eq!(w.data(), &[0xF8]);
    }

    #[test]
    fn signed_round_trip_big_and_little() {
        for &endian in &[BitEndian::Big, BitEndian::Little] {
            let mut w = BitWriter::recorder(endian);
            w.write_signed(5, -7).unwrap();
            w.byte_align().unwrap();
            let bytes = w.data().to_vec();
            let mut r = crate::bitstream::BitReader::from_bytes(bytes, endian);
            assert_eq!(r.read_signed(5).unwrap(), -7);
        }
    }

    #[test]
    fn limited_recorder_aborts_on_overflow() {
        let mut w = BitWriter::limited_recorder(BitEndian::Big, 8);
        w.write_unsigned(8, 0xAB).unwrap();
        let err = w.write_unsigned(1, 1).unwrap_err();
        assert!(matches!(err, BitstreamError::LimitExceeded));
    }
}
