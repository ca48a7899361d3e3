use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{BitResult, BitstreamError};

/// Abstraction over a seekable/non-seekable byte stream that feeds a
/// `BitReader`.
///
/// `fill` must *append* to `buf`, never overwrite it — a reader may
/// hold a position checkpoint that still needs the bytes already
/// buffered (mirrors the "append, not overwrite" contract of the C
/// byte-source callback this is modeled on).
pub trait ByteSource {
    /// Appends up to `want` more bytes to `buf`. Returns the number of
    /// bytes appended; 0 means the source is exhausted.
    fn fill(&mut self, buf: &mut Vec<u8>, want: usize) -> io::Result<usize>;

    fn supports_position(&self) -> bool {
        false
    }

    fn tell(&mut self) -> BitResult<u64> {
        Err(BitstreamError::PositionUnsupported)
    }

    fn seek_to(&mut self, _pos: u64) -> BitResult<()> {
        Err(BitstreamError::PositionUnsupported)
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A file-backed source. Supports seeking and positions.
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn new(file: File) -> Self {
        FileSource { file }
    }
}

impl ByteSource for FileSource {
    fn fill(&mut self, buf: &mut Vec<u8>, want: usize) -> io::Result<usize> {
        let start = buf.len();
        buf.resize(start + want, 0);
        let n = self.file.read(&mut buf[start..])?;
        buf.truncate(start + n);
        Ok(n)
    }

    fn supports_position(&self) -> bool {
        true
    }

    fn tell(&mut self) -> BitResult<u64> {
        Ok(self.file.stream_position()?)
    }

    fn seek_to(&mut self, pos: u64) -> BitResult<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

/// An immutable in-memory buffer with a cursor. Supports seeking and
/// positions.
pub struct SliceSource {
    data: Vec<u8>,
    pos: usize,
}

impl SliceSource {
    pub fn new(data: Vec<u8>) -> Self {
        SliceSource { data, pos: 0 }
    }
}

impl ByteSource for SliceSource {
    fn fill(&mut self, buf: &mut Vec<u8>, want: usize) -> io::Result<usize> {
        let remaining = self.data.len() - self.pos;
        let n = remaining.min(want);
        buf.extend_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn supports_position(&self) -> bool {
        true
    }

    fn tell(&mut self) -> BitResult<u64> {
        Ok(self.pos as u64)
    }

    fn seek_to(&mut self, pos: u64) -> BitResult<()> {
        if pos as usize > self.data.len() {
            return Err(BitstreamError::EndOfStream);
        }
        self.pos = pos as usize;
        Ok(())
    }
}

/// A growable producer/consumer queue. Bytes are pushed in by
/// `substream`/`enqueue` and drained by reads; it never supports
/// position restore since there is no stable backing store to seek.
#[derive(Default)]
pub struct QueueSource {
    queue: VecDeque<u8>,
}

impl QueueSource {
    pub fn new() -> Self {
        QueueSource::default()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.queue.extend(bytes.iter().copied());
    }
}

impl ByteSource for QueueSource {
    fn fill(&mut self, buf: &mut Vec<u8>, want: usize) -> io::Result<usize> {
        let n = self.queue.len().min(want);
        buf.extend(self.queue.drain(..n));
        Ok(n)
    }
}

type ReadCb = Box<dyn FnMut(&mut Vec<u8>, usize) -> io::Result<usize> + Send>;
type SeekCb = Box<dyn FnMut(u64) -> BitResult<()> + Send>;
type TellCb = Box<dyn FnMut() -> BitResult<u64> + Send>;
type CloseCb = Box<dyn FnMut() -> io::Result<()> + Send>;

/// Stands in for the `{read, seek, get_pos, set_pos, close, free}`
/// collaborator trio of external byte sources (spec §6). `seek`/`tell`
/// are optional; omitting them means the reader rejects `seek`/
/// `set_pos` on this stream.
pub struct CallbackSource {
    read: ReadCb,
    seek: Option<SeekCb>,
    tell: Option<TellCb>,
    close: Option<CloseCb>,
}

impl CallbackSource {
    pub fn new(read: ReadCb) -> Self {
        CallbackSource {
            read,
            seek: None,
            tell: None,
            close: None,
        }
    }

    pub fn with_position(mut self, seek: SeekCb, tell: TellCb) -> Self {
        self.seek = Some(seek);
        self.tell = Some(tell);
        self
    }

    pub fn with_close(mut self, close: CloseCb) -> Self {
        self.close = Some(close);
        self
    }
}

impl ByteSource for CallbackSource {
    fn fill(&mut self, buf: &mut Vec<u8>, want: usize) -> io::Result<usize> {
        (self.read)(buf, want)
    }

    fn supports_position(&self) -> bool {
        self.seek.is_some() && self.tell.is_some()
    }

    fn tell(&mut self) -> BitResult<u64> {
        match &mut self.tell {
            Some(f) => f(),
            None => Err(BitstreamError::PositionUnsupported),
        }
    }

    fn seek_to(&mut self, pos: u64) -> BitResult<()> {
        match &mut self.seek {
            Some(f) => f(pos),
            None => Err(BitstreamError::PositionUnsupported),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match &mut self.close {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}
