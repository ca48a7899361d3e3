//! FLAC codec built on the bitstream engine: metadata blocks, frame
//! header/subframe/residual coding, LPC analysis, and the stream
//! driver tying encode/decode to a PCM collaborator.

pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod lpc;
pub mod metadata;
pub mod pcm;
pub mod residual;
pub mod stream;

pub use decoder::FlacDecoder;
pub use encoder::{EncoderConfig, FlacEncoder};
pub use metadata::{
    read_metadata, resolve_channel_mask, write_metadata, Application, CueSheet, CueSheetTrack,
    CueSheetTrackIndex, MetadataBlock, MetadataBlockData, Picture, PictureType, SeekPoint,
    SeekTable, StreamInfo, UserComment, VorbisComment,
};
pub use pcm::{PcmSink, PcmSource};
pub use stream::FrameRecord;
