use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

use crate::error::{BitResult, BitstreamError};

/// Abstraction over a seekable/non-seekable byte sink that drains a
/// `BitWriter`.
pub trait ByteSink {
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

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
        self.flush()
    }
}

pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn new(file: File) -> Self {
        FileSink { file }
    }
}

impl ByteSink for FileSink {
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
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

/// An in-memory sink. Backs `Recorder`/`LimitedRecorder`.
///
/// `cursor` tracks the write position: it starts equal to `data.len()`
/// (pure append) but `seek_to` can rewind it so a later `write_bytes`
/// patches bytes already present, which is how the encoder fixes up
/// STREAMINFO's placeholder MD5/frame-size fields after the fact.
#[derive(Default)]
pub struct VecSink {
    data: Vec<u8>,
    cursor: usize,
}

impl VecSink {
    pub fn new() -> Self {
        VecSink::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }
}

impl ByteSink for VecSink {
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        let end = self.cursor + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.cursor..end].copy_from_slice(data);
        self.cursor = end;
        Ok(())
    }

    fn supports_position(&self) -> bool {
        true
    }

    fn tell(&mut self) -> BitResult<u64> {
        Ok(self.cursor as u64)
    }

    fn seek_to(&mut self, pos: u64) -> BitResult<()> {
        if pos as usize > self.data.len() {
            return Err(BitstreamError::EndOfStream);
        }
        self.cursor = pos as usize;
        Ok(())
    }
}

type WriteCb = Box<dyn FnMut(&[u8]) -> io::Result<()> + Send>;
type FlushCb = Box<dyn FnMut() -> io::Result<()> + Send>;
type SeekCb = Box<dyn FnMut(u64) -> BitResult<()> + Send>;
type TellCb = Box<dyn FnMut() -> BitResult<u64> + Send>;
type CloseCb = Box<dyn FnMut() -> io::Result<()> + Send>;

/// Stands in for the `{write, flush, get_pos, set_pos, close, free}`
/// collaborator trio of external byte sinks (spec §6).
pub struct CallbackSink {
    write: WriteCb,
    flush: Option<FlushCb>,
    seek: Option<SeekCb>,
    tell: Option<TellCb>,
    close: Option<CloseCb>,
}

impl CallbackSink {
    pub fn new(write: WriteCb) -> Self {
        CallbackSink {
            write,
            flush: None,
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

    pub fn with_flush(mut self, flush: FlushCb) -> Self {
        self.flush = Some(flush);
        self
    }

    pub fn with_close(mut self, close: CloseCb) -> Self {
        self.close = Some(close);
        self
    }
}

impl ByteSink for CallbackSink {
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        (self.write)(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.flush {
            Some(f) => f(),
            None => Ok(()),
        }
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
