//! The bit-granular I/O engine that drives every codec in this crate.
//!
//! Big- and little-endian bit order, unary codes, Huffman jump
//! tables, stream-position save/restore, byte callbacks for CRC/MD5
//! accumulation, substreams, growable record buffers, and the `parse`/
//! `build` mini-language all live here; `flac` is the first (and for
//! now only) consumer.

mod endian;
mod format;
mod huffman;
mod position;
mod reader;
mod sink;
mod source;
mod writer;

pub use endian::BitEndian;
pub use format::{parse_format, FormatAction};
pub use huffman::HuffmanTable;
pub use position::Position;
pub use reader::{BitReader, ParsedField, QueueReader, UnaryResult};
pub use sink::{ByteSink, CallbackSink, FileSink, VecSink};
pub use source::{ByteSource, CallbackSource, FileSource, QueueSource, SliceSource};
pub use writer::{BitWriter, WriteField};
