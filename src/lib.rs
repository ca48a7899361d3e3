//! Bitstream I/O engine and FLAC codec core.
//!
//! `bitstream` is a codec-agnostic bit-granular reader/writer; `flac`
//! builds the FLAC format on top of it. Nothing here pulls in a
//! concrete audio file format (WAV, container muxing) — callers supply
//! PCM through the `flac::PcmSource`/`PcmSink` traits.

pub mod bitstream;
pub mod error;
pub mod flac;

pub use bitstream::{
    BitEndian, BitReader, BitWriter, ByteSink, ByteSource, CallbackSink, CallbackSource,
    FileSink, FileSource, HuffmanTable, ParsedField, Position, QueueReader, QueueSource,
    SliceSource, UnaryResult, VecSink, WriteField,
};
pub use error::{BitResult, BitstreamError, FlacError, Result};
pub use flac::{
    Application, CueSheet, CueSheetTrack, CueSheetTrackIndex, EncoderConfig, FlacDecoder,
    FlacEncoder, FrameRecord, MetadataBlock, MetadataBlockData, PcmSink, PcmSource, Picture,
    PictureType, SeekPoint, SeekTable, StreamInfo, UserComment, VorbisComment,
};
