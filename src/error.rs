use std::string::FromUtf8Error;
use thiserror::Error;

/// Errors raised by the bit-granular reader/writer.
///
/// These stay codec-agnostic: nothing in `bitstream` knows about FLAC.
/// A `FlacError` wraps one of these with `#[from]` wherever the codec
/// drives the engine.
#[derive(Error, Debug)]
pub enum BitstreamError {
    #[error("end of stream")]
    EndOfStream,
    #[error("write would exceed recorder limit")]
    LimitExceeded,
    #[error("position token belongs to a different stream")]
    ForeignPosition,
    #[error("unknown action in format string: {0}")]
    BadFormat(char),
    #[error("value has no matching huffman code")]
    UnknownHuffmanValue,
    #[error("stream does not support seeking/positions")]
    PositionUnsupported,
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

pub type BitResult<T> = std::result::Result<T, BitstreamError>;

/// Errors raised while parsing or producing a FLAC stream.
#[derive(Error, Debug)]
pub enum FlacError {
    #[error("invalid magic number")]
    InvalidMagicNumber,
    #[error("invalid first block, must be StreamInfo")]
    InvalidFirstBlock,
    #[error("invalid block type 0xff")]
    InvalidBlockType,
    #[error("invalid seek table size")]
    InvalidSeekTableSize,
    #[error("invalid picture type")]
    InvalidPictureType,

    #[error("frame sync code mismatch")]
    InvalidSyncCode,
    #[error("reserved bit set where zero was required")]
    InvalidReservedBit,
    #[error("frame header encodes a reserved bits-per-sample value")]
    InvalidBitsPerSample,
    #[error("frame header encodes a reserved sample rate value")]
    InvalidSampleRate,
    #[error("frame header encodes an invalid channel assignment")]
    InvalidChannelAssignment,
    #[error("malformed UTF-8 coded frame/sample number")]
    InvalidUtf8Number,
    #[error("subframe header uses a reserved type field")]
    InvalidSubframeHeader,
    #[error("fixed predictor order out of range")]
    InvalidFixedOrder,
    #[error("LPC order out of range")]
    InvalidLpcOrder,
    #[error("residual coding method out of range")]
    InvalidCodingMethod,
    #[error("frame header CRC-8 mismatch")]
    InvalidCRC8,
    #[error("frame CRC-16 mismatch")]
    InvalidCRC16,
    #[error("frame header field disagrees with STREAMINFO")]
    MetadataFieldMismatch,
    #[error("frame block size exceeds STREAMINFO maximum")]
    BlockSizeExceedsMax,
    #[error("decoded PCM MD5 does not match STREAMINFO signature")]
    MD5Mismatch,

    #[error(transparent)]
    Bitstream(#[from] BitstreamError),
    #[error(transparent)]
    InvalidString(#[from] FromUtf8Error),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl From<FlacError> for BitstreamError {
    fn from(e: FlacError) -> Self {
        match e {
            FlacError::Bitstream(b) => b,
            FlacError::IO(e) => BitstreamError::IO(e),
            other => BitstreamError::IO(std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlacError>;
