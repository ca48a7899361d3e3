use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

use crate::error::{BitResult, BitstreamError};

use super::endian::BitEndian;
use super::format::{parse_format, FormatAction};
use super::huffman::{HuffmanTable, StepResult};
use super::position::Position;
use super::source::{ByteSource, FileSource, QueueSource, SliceSource};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

type Callback = Box<dyn FnMut(u8) + Send>;

/// Result of `read_limited_unary`: distinguishes "count reached
/// exactly `max`" from "a genuine count of `max`" (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryResult {
    Count(u32),
    LimitReached,
}

/// A bit-granular reader over any `ByteSource`.
///
/// Owns its source; dropping the reader closes it. Tracks, per spec
/// §3: a partial-byte read cursor, a stack of byte callbacks fired in
/// push order on every full byte crossed, and a nesting counter that
/// stands in for the "exception frame" stack — every bitstream
/// operation here already propagates failure via `?`, so the counter
/// exists only to log the warning spec §4.4 calls for when a reader is
/// dropped with an open `checkpoint` scope.
pub struct BitReader {
    id: u64,
    source: Box<dyn ByteSource>,
    endian: BitEndian,
    buf: Vec<u8>,
    buf_base: u64,
    byte_pos: usize,
    bit_pos: u8,
    unread_bit: Option<u8>,
    fired_callbacks: usize,
    callbacks: Vec<Callback>,
    open_scopes: u32,
}

impl BitReader {
    pub fn new(source: Box<dyn ByteSource>, endian: BitEndian) -> Self {
        BitReader {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            source,
            endian,
            buf: Vec::new(),
            buf_base: 0,
            byte_pos: 0,
            bit_pos: 0,
            unread_bit: None,
            fired_callbacks: 0,
            callbacks: Vec::new(),
            open_scopes: 0,
        }
    }

    pub fn from_file(file: File, endian: BitEndian) -> Self {
        Self::new(Box::new(FileSource::new(file)), endian)
    }

    pub fn open<P: AsRef<Path>>(path: P, endian: BitEndian) -> std::io::Result<Self> {
        Ok(Self::from_file(File::open(path)?, endian))
    }

    pub fn from_bytes(data: Vec<u8>, endian: BitEndian) -> Self {
        Self::new(Box::new(SliceSource::new(data)), endian)
    }

    pub fn from_queue(endian: BitEndian) -> (Self, ()) {
        (Self::new(Box::new(QueueSource::new()), endian), ())
    }

    pub fn endian(&self) -> BitEndian {
        self.endian
    }

    /// Changing endianness byte-aligns the stream and resets any
    /// partial-bit state (spec §3).
    pub fn set_endianness(&mut self, endian: BitEndian) -> BitResult<()> {
        self.byte_align()?;
        self.endian = endian;
        Ok(())
    }

    pub fn supports_position(&self) -> bool {
        true
    }

    // -- callback stack -------------------------------------------------

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

    /// Synthesises a callback invocation for `byte` without consuming
    /// any input, for callers re-injecting bytes from a
    /// position-preserved region.
    pub fn call_callbacks(&mut self, byte: u8) {
        for cb in self.callbacks.iter_mut().rev() {
            cb(byte);
        }
    }

    fn fire_byte(&mut self, byte: u8) {
        for cb in self.callbacks.iter_mut().rev() {
            cb(byte);
        }
    }

    // -- checkpoint scope (stands in for the exception-frame stack) -----

    pub fn enter_scope(&mut self) {
        self.open_scopes += 1;
    }

    pub fn exit_scope(&mut self) {
        self.open_scopes = self.open_scopes.saturating_sub(1);
    }

    /// The `try`/`etry` exception frame of spec §4.4, translated to
    /// ordinary Rust control flow: on failure, the stream position is
    /// rewound to where the checkpoint began (the "else arm of the
    /// try") before the error propagates to the caller. Checkpoints
    /// nest through `open_scopes` the same way exception frames do.
    pub fn checkpoint<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> BitResult<T>,
    ) -> BitResult<T> {
        self.enter_scope();
        let pos = self.get_pos();
        let result = f(self);
        self.exit_scope();
        if result.is_err() {
            let _ = self.set_pos(pos);
        }
        result
    }

    // -- low-level byte access -------------------------------------------

    fn ensure_byte(&mut self) -> BitResult<()> {
        while self.byte_pos >= self.buf.len() {
            let n = self.source.fill(&mut self.buf, 4096)?;
            if n == 0 {
                return Err(BitstreamError::EndOfStream);
            }
        }
        Ok(())
    }

    fn next_bit(&mut self) -> BitResult<u8> {
        if let Some(b) = self.unread_bit.take() {
            return Ok(b);
        }

        self.ensure_byte()?;
        let byte = self.buf[self.byte_pos];
        let bit = match self.endian {
            BitEndian::Big => (byte >> (7 - self.bit_pos)) & 1,
            BitEndian::Little => (byte >> self.bit_pos) & 1,
        };

        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            if self.byte_pos == self.fired_callbacks {
                self.fire_byte(byte);
                self.fired_callbacks += 1;
            }
            self.byte_pos += 1;
        }

        Ok(bit)
    }

    /// Pushes a single bit back onto the stream. Only one bit of
    /// lookahead is guaranteed.
    pub fn unread(&mut self, bit: u8) {
        self.unread_bit = Some(bit & 1);
    }

    // -- fixed-width integers ---------------------------------------------

    pub fn read_unsigned(&mut self, bits: u32) -> BitResult<u32> {
        assert!(bits <= 32);
        let mut value: u32 = 0;
        for _ in 0..bits {
            value = (value << 1) | self.next_bit()? as u32;
        }
        Ok(value)
    }

    pub fn read_signed(&mut self, bits: u32) -> BitResult<i32> {
        assert!(bits >= 1 && bits <= 32);
        match self.endian {
            BitEndian::Big => {
                let sign = self.next_bit()?;
                let mag = self.read_unsigned(bits - 1)?;
                Ok(sign_extend_from_parts(sign, mag, bits))
            }
            BitEndian::Little => {
                let mag = self.read_unsigned(bits - 1)?;
                let sign = self.next_bit()?;
                Ok(sign_extend_from_parts(sign, mag, bits))
            }
        }
    }

    pub fn read_u64(&mut self, bits: u32) -> BitResult<u64> {
        assert!(bits <= 64);
        let mut value: u64 = 0;
        for _ in 0..bits {
            value = (value << 1) | self.next_bit()? as u64;
        }
        Ok(value)
    }

    pub fn read_s64(&mut self, bits: u32) -> BitResult<i64> {
        assert!(bits >= 1 && bits <= 64);
        let (sign, mag) = match self.endian {
            BitEndian::Big => {
                let sign = self.next_bit()?;
                let mag = self.read_u64(bits - 1)?;
                (sign, mag)
            }
            BitEndian::Little => {
                let mag = self.read_u64(bits - 1)?;
                let sign = self.next_bit()?;
                (sign, mag)
            }
        };
        if sign == 0 {
            Ok(mag as i64)
        } else {
            Ok((mag as i64) - (1i64 << (bits - 1)))
        }
    }

    pub fn read_big_unsigned(&mut self, bits: u64) -> BitResult<BigUint> {
        let mut value = BigUint::zero();
        for _ in 0..bits {
            value <<= 1u32;
            value += self.next_bit()? as u32;
        }
        Ok(value)
    }

    pub fn read_big_signed(&mut self, bits: u64) -> BitResult<BigInt> {
        assert!(bits >= 1);
        let (sign_bit, magnitude) = match self.endian {
            BitEndian::Big => {
                let s = self.next_bit()?;
                let m = self.read_big_unsigned(bits - 1)?;
                (s, m)
            }
            BitEndian::Little => {
                let m = self.read_big_unsigned(bits - 1)?;
                let s = self.next_bit()?;
                (s, m)
            }
        };
        if sign_bit == 0 {
            Ok(BigInt::from_biguint(Sign::Plus, magnitude))
        } else {
            let bias = BigUint::from(1u32) << (bits - 1);
            let value = BigInt::from_biguint(Sign::Plus, magnitude)
                - BigInt::from_biguint(Sign::Plus, bias);
            Ok(value)
        }
    }

    // -- skip / bytes -------------------------------------------------------

    pub fn skip(&mut self, bits: u32) -> BitResult<()> {
        for _ in 0..bits {
            self.next_bit()?;
        }
        Ok(())
    }

    pub fn skip_bytes(&mut self, bytes: u32) -> BitResult<()> {
        if self.byte_aligned() {
            for _ in 0..bytes {
                self.ensure_byte()?;
                let byte = self.buf[self.byte_pos];
                self.fire_if_new(byte);
                self.byte_pos += 1;
            }
            Ok(())
        } else {
            self.skip(bytes * 8)
        }
    }

    fn fire_if_new(&mut self, byte: u8) {
        if self.byte_pos == self.fired_callbacks {
            self.fire_byte(byte);
            self.fired_callbacks += 1;
        }
    }

    /// Byte-aligned fast path when at a boundary; bit-granular slow
    /// path otherwise.
    pub fn read_bytes(&mut self, n: usize) -> BitResult<Vec<u8>> {
        if self.byte_aligned() {
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                self.ensure_byte()?;
                let byte = self.buf[self.byte_pos];
                self.fire_if_new(byte);
                self.byte_pos += 1;
                out.push(byte);
            }
            Ok(out)
        } else {
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                out.push(self.read_unsigned(8)? as u8);
            }
            Ok(out)
        }
    }

    // -- unary ----------------------------------------------------------

    pub fn read_unary(&mut self, stop_bit: u8) -> BitResult<u32> {
        let stop = stop_bit & 1;
        let mut count = 0u32;
        loop {
            let bit = self.next_bit()?;
            if bit == stop {
                return Ok(count);
            }
            count += 1;
        }
    }

    pub fn read_limited_unary(&mut self, stop_bit: u8, max: u32) -> BitResult<UnaryResult> {
        let stop = stop_bit & 1;
        let mut count = 0u32;
        while count < max {
            let bit = self.next_bit()?;
            if bit == stop {
                return Ok(UnaryResult::Count(count));
            }
            count += 1;
        }
        Ok(UnaryResult::LimitReached)
    }

    // -- huffman ----------------------------------------------------------

    pub fn read_huffman(&mut self, table: &HuffmanTable) -> BitResult<i32> {
        let mut node = HuffmanTable::root();
        loop {
            let bit = self.next_bit()?;
            match table.advance(node, bit)? {
                StepResult::Continue(next) => node = next,
                StepResult::Done(value) => return Ok(value),
            }
        }
    }

    // -- alignment / position ---------------------------------------------

    pub fn byte_aligned(&self) -> bool {
        self.bit_pos == 0 && self.unread_bit.is_none()
    }

    pub fn byte_align(&mut self) -> BitResult<()> {
        if self.bit_pos != 0 {
            // Discard the rest of the partially-read byte; it was
            // already fired to callbacks when it was first touched,
            // consistent with "always on full bytes only".
            self.bit_pos = 0;
            if self.byte_pos == self.fired_callbacks {
                self.fire_if_new(self.buf[self.byte_pos]);
            }
            self.byte_pos += 1;
        }
        self.unread_bit = None;
        Ok(())
    }

    pub fn get_pos(&self) -> Position {
        Position {
            stream_id: self.id,
            byte_offset: self.buf_base + self.byte_pos as u64,
            bit_pos: self.bit_pos,
            unread_bit: self.unread_bit,
        }
    }

    pub fn set_pos(&mut self, pos: Position) -> BitResult<()> {
        if pos.stream_id != self.id {
            return Err(BitstreamError::ForeignPosition);
        }
        if pos.byte_offset < self.buf_base {
            return Err(BitstreamError::PositionUnsupported);
        }
        let idx = (pos.byte_offset - self.buf_base) as usize;
        if idx > self.buf.len() {
            return Err(BitstreamError::PositionUnsupported);
        }
        self.byte_pos = idx;
        self.bit_pos = pos.bit_pos;
        self.unread_bit = pos.unread_bit;
        // Rewinding must let bytes between the new position and the old
        // high-water mark fire again on the next read, the same way a
        // fresh `seek` does; only ever lower the mark, never raise it
        // past bytes that were genuinely skipped rather than read.
        self.fired_callbacks = self.fired_callbacks.min(idx);
        Ok(())
    }

    /// Absolute seek. Clears the partial state and does not invoke
    /// callbacks on skipped bytes, unlike a sequential `skip`.
    pub fn seek(&mut self, offset: u64) -> BitResult<()> {
        if !self.source.supports_position() {
            return Err(BitstreamError::PositionUnsupported);
        }
        self.source.seek_to(offset)?;
        self.buf.clear();
        self.buf_base = offset;
        self.byte_pos = 0;
        self.bit_pos = 0;
        self.unread_bit = None;
        self.fired_callbacks = 0;
        Ok(())
    }

    // -- substreams -------------------------------------------------------

    /// Copies the next `n` bytes into a new reader, invoking this
    /// reader's callbacks for each copied byte as it is pulled in.
    pub fn substream(&mut self, n: usize) -> BitResult<BitReader> {
        let bytes = self.read_bytes(n)?;
        if bytes.len() < n {
            return Err(BitstreamError::EndOfStream);
        }
        Ok(BitReader::from_bytes(bytes, self.endian))
    }

    /// Like `substream`, but appends into an existing growable queue
    /// reader instead of allocating a new one.
    pub fn enqueue(&mut self, n: usize, queue: &mut QueueReader) -> BitResult<()> {
        let bytes = self.read_bytes(n)?;
        if bytes.len() < n {
            return Err(BitstreamError::EndOfStream);
        }
        queue.push_bytes(&bytes);
        Ok(())
    }

    // -- format mini-language ---------------------------------------------

    pub fn parse(&mut self, fmt: &str) -> BitResult<Vec<ParsedField>> {
        let actions = parse_format(fmt)?;
        let mut out = Vec::with_capacity(actions.len());
        for action in actions {
            out.push(match action {
                FormatAction::Unsigned(n) => ParsedField::Unsigned(self.read_unsigned(n)?),
                FormatAction::Signed(n) => ParsedField::Signed(self.read_signed(n)?),
                FormatAction::U64(n) => ParsedField::U64(self.read_u64(n)?),
                FormatAction::S64(n) => ParsedField::S64(self.read_s64(n)?),
                FormatAction::BigUnsigned(n) => {
                    ParsedField::BigUnsigned(self.read_big_unsigned(n as u64)?)
                }
                FormatAction::BigSigned(n) => {
                    ParsedField::BigSigned(self.read_big_signed(n as u64)?)
                }
                FormatAction::SkipBits(n) => {
                    self.skip(n)?;
                    ParsedField::None
                }
                FormatAction::SkipBytes(n) => {
                    self.skip_bytes(n)?;
                    ParsedField::None
                }
                FormatAction::Bytes(n) => ParsedField::Bytes(self.read_bytes(n as usize)?),
                FormatAction::Align => {
                    self.byte_align()?;
                    ParsedField::None
                }
            });
        }
        Ok(out)
    }
}

impl Drop for BitReader {
    fn drop(&mut self) {
        if self.open_scopes > 0 {
            log::warn!(
                "BitReader dropped with {} unclosed checkpoint scope(s)",
                self.open_scopes
            );
        }
        let _ = self.source.close();
    }
}

/// A reader backed by a growable queue, as used by `enqueue`'s producer
/// side.
pub struct QueueReader {
    inner: super::source::QueueSource,
}

impl QueueReader {
    pub fn new() -> Self {
        QueueReader {
            inner: super::source::QueueSource::new(),
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.inner.push_bytes(bytes);
    }

    pub fn into_reader(self, endian: BitEndian) -> BitReader {
        BitReader::new(Box::new(self.inner), endian)
    }
}

impl Default for QueueReader {
    fn default() -> Self {
        Self::new()
    }
}

/// One value produced by `BitReader::parse`.
#[derive(Debug, Clone)]
pub enum ParsedField {
    Unsigned(u32),
    Signed(i32),
    U64(u64),
    S64(i64),
    BigUnsigned(BigUint),
    BigSigned(BigInt),
    Bytes(Vec<u8>),
    None,
}

fn sign_extend_from_parts(sign: u8, magnitude: u32, bits: u32) -> i32 {
    if sign == 0 {
        magnitude as i32
    } else {
        (magnitude as i64 - (1i64 << (bits - 1))) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_unsigned_fields() {
        let mut reader = BitReader::from_bytes(vec![0x6D], BitEndian::Big);
        assert_eq!(reader.read_unsigned(3).unwrap(), 3);
        assert_eq!(reader.read_unsigned(5).unwrap(), 13);
    }

    #[test]
    fn little_endian_unsigned_fields() {
        let mut reader = BitReader::from_bytes(vec![0x6B], BitEndian::Little);
        assert_eq!(reader.read_unsigned(3).unwrap(), 3);
        assert_eq!(reader.read_unsigned(5).unwrap(), 13);
    }

    #[test]
    fn unary_scenario_3() {
        let mut reader = BitReader::from_bytes(vec![0xF8], BitEndian::Big);
        assert_eq!(reader.read_unary(0).unwrap(), 5);
    }

    #[test]
    fn position_restore() {
        let mut reader = BitReader::from_bytes(vec![0xAB, 0xCD, 0xEF], BitEndian::Big);
        let _ = reader.read_unsigned(5).unwrap();
        let pos = reader.get_pos();
        let x1 = reader.read_unsigned(11).unwrap();
        reader.set_pos(pos).unwrap();
        let x2 = reader.read_unsigned(11).unwrap();
        assert_eq!(x1, x2);
    }

    #[test]
    fn limited_unary_limit_reached_vs_exact() {
        // 0b11110... : four 1s before the stop bit (reading stop_bit=0)
        let mut reader = BitReader::from_bytes(vec![0b1111_0000], BitEndian::Big);
        assert_eq!(reader.read_limited_unary(0, 4).unwrap(), UnaryResult::LimitReached);

        let mut reader = BitReader::from_bytes(vec![0b1110_0000], BitEndian::Big);
        assert_eq!(
            reader.read_limited_unary(0, 4).unwrap(),
            UnaryResult::Count(3)
        );
    }

    #[test]
    fn callbacks_fire_once_per_full_byte() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let mut reader = BitReader::from_bytes(vec![0x12, 0x34], BitEndian::Big);
        reader.add_callback(Box::new(move |b| seen2.borrow_mut().push(b)));
        reader.read_unsigned(4).unwrap();
        reader.read_unsigned(4).unwrap();
        assert_eq!(*seen.borrow(), vec![0x12]);
        reader.read_unsigned(8).unwrap();
        assert_eq!(*seen.borrow(), vec![0x12, 0x34]);
    }
}
