//! FLAC metadata blocks: STREAMINFO, SEEKTABLE, VORBIS_COMMENT, and
//! the rest of the block types FLAC defines but spec only requires
//! skipping — grounded on `anni-flac`'s `blocks/*.rs` and `header.rs`,
//! rebuilt on top of this crate's `BitReader`/`BitWriter` instead of
//! `byteorder` + `std::io::Read`/`Write`.

use crate::bitstream::{BitEndian, BitReader, BitWriter, ByteSink};
use crate::error::{FlacError, Result};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::collections::HashMap;

/// (Minimum blocksize == maximum blocksize) implies a fixed-blocksize stream.
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    /// Actual channel count (1..=8), already adjusted from the wire's `count - 1`.
    pub channels: u8,
    /// Actual bits per sample (4..=32), already adjusted from the wire's `count - 1`.
    pub bits_per_sample: u8,
    pub total_samples: u64,
    pub md5_signature: [u8; 16],
}

impl StreamInfo {
    pub fn is_fixed_blocksize_stream(&self) -> bool {
        self.min_block_size == self.max_block_size
    }

    /// MD5 verification is skipped entirely when the signature is all-zero (spec §7).
    pub fn md5_disabled(&self) -> bool {
        self.md5_signature == [0u8; 16]
    }

    /// Default channel mask by position when VORBIS_COMMENT supplies none
    /// (spec §4.5): 1ch -> centre, 2ch -> L+R, up to 8ch -> surround+LFE.
    pub fn default_channel_mask(&self) -> u32 {
        match self.channels {
            1 => 0x4,
            2 => 0x3,
            3 => 0x7,
            4 => 0x33,
            5 => 0x37,
            6 => 0x3f,
            7 => 0x13f,
            8 => 0x63f,
            _ => 0,
        }
    }

    pub(crate) fn read(reader: &mut BitReader) -> Result<Self> {
        let min_block_size = reader.read_unsigned(16)? as u16;
        let max_block_size = reader.read_unsigned(16)? as u16;
        let min_frame_size = reader.read_unsigned(24)?;
        let max_frame_size = reader.read_unsigned(24)?;
        let sample_rate = reader.read_unsigned(20)?;
        let channels = reader.read_unsigned(3)? as u8 + 1;
        let bits_per_sample = reader.read_unsigned(5)? as u8 + 1;
        let total_samples = reader.read_u64(36)?;
        let md5 = reader.read_bytes(16)?;
        let mut md5_signature = [0u8; 16];
        md5_signature.copy_from_slice(&md5);

        Ok(StreamInfo {
            min_block_size,
            max_block_size,
            min_frame_size,
            max_frame_size,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
            md5_signature,
        })
    }

    pub(crate) fn write<S: ByteSink>(&self, writer: &mut BitWriter<S>) -> Result<()> {
        writer.write_unsigned(16, self.min_block_size as u32)?;
        writer.write_unsigned(16, self.max_block_size as u32)?;
        writer.write_unsigned(24, self.min_frame_size)?;
        writer.write_unsigned(24, self.max_frame_size)?;
        writer.write_unsigned(20, self.sample_rate)?;
        writer.write_unsigned(3, (self.channels - 1) as u32)?;
        writer.write_unsigned(5, (self.bits_per_sample - 1) as u32)?;
        writer.write_u64(36, self.total_samples)?;
        writer.write_bytes(&self.md5_signature)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeekPoint {
    /// Sample number of the first sample in the target frame, or
    /// `0xFFFF_FFFF_FFFF_FFFF` for a placeholder point.
    pub sample_number: u64,
    pub byte_offset: u64,
    pub frame_samples: u16,
}

impl SeekPoint {
    pub fn is_placeholder(&self) -> bool {
        self.sample_number == u64::MAX
    }
}

pub struct SeekTable {
    pub seek_points: Vec<SeekPoint>,
}

impl SeekTable {
    pub(crate) fn read(reader: &mut BitReader, payload_len: usize) -> Result<Self> {
        if payload_len % 18 != 0 {
            return Err(FlacError::InvalidSeekTableSize);
        }
        let count = payload_len / 18;
        let mut seek_points = Vec::with_capacity(count);
        for _ in 0..count {
            let sample_number = reader.read_u64(64)?;
            let byte_offset = reader.read_u64(64)?;
            let frame_samples = reader.read_unsigned(16)? as u16;
            seek_points.push(SeekPoint {
                sample_number,
                byte_offset,
                frame_samples,
            });
        }
        Ok(SeekTable { seek_points })
    }

    pub(crate) fn write<S: ByteSink>(&self, writer: &mut BitWriter<S>) -> Result<()> {
        for point in &self.seek_points {
            writer.write_u64(64, point.sample_number)?;
            writer.write_u64(64, point.byte_offset)?;
            writer.write_unsigned(16, point.frame_samples as u32)?;
        }
        Ok(())
    }

    pub fn byte_len(&self) -> usize {
        self.seek_points.len() * 18
    }
}

/// A single `KEY=value` Vorbis comment entry.
#[derive(Debug, Clone)]
pub struct UserComment {
    entry: String,
    value_offset: Option<usize>,
}

impl UserComment {
    pub fn new(entry: String) -> Self {
        let value_offset = entry.find('=');
        Self {
            entry,
            value_offset,
        }
    }

    pub fn key(&self) -> String {
        self.key_raw().to_ascii_uppercase()
    }

    pub fn key_raw(&self) -> &str {
        match self.value_offset {
            Some(offset) => &self.entry[..offset],
            None => &self.entry,
        }
    }

    pub fn value(&self) -> &str {
        match self.value_offset {
            Some(offset) => &self.entry[offset + 1..],
            None => "",
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn len(&self) -> usize {
        self.entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_empty()
    }
}

pub struct VorbisComment {
    pub vendor_string: String,
    pub comments: Vec<UserComment>,
}

const CHANNEL_MASK_KEY: &str = "WAVEFORMATEXTENSIBLE_CHANNEL_MASK";

impl VorbisComment {
    pub fn to_map(&self) -> HashMap<String, &UserComment> {
        let mut map = HashMap::new();
        for comment in &self.comments {
            if !(map.contains_key(&comment.key()) && comment.value().is_empty()) {
                map.insert(comment.key(), comment);
            }
        }
        map
    }

    /// Scans the comment list for a `WAVEFORMATEXTENSIBLE_CHANNEL_MASK=`
    /// entry (case-insensitive key) and returns its value as a mask, but
    /// only if the mask has exactly `channels` bits set (spec §4.5); a
    /// malformed or disagreeing mask is ignored in favor of the
    /// STREAMINFO-derived default.
    pub fn channel_mask_override(&self, channels: u8) -> Option<u32> {
        for comment in &self.comments {
            if comment.key() == CHANNEL_MASK_KEY {
                let raw = comment
                    .value()
                    .trim_start_matches("0x")
                    .trim_start_matches("0X");
                if let Ok(mask) = u32::from_str_radix(raw, 16) {
                    if mask.count_ones() == channels as u32 {
                        return Some(mask);
                    }
                }
            }
        }
        None
    }

    pub(crate) fn read(reader: &mut BitReader) -> Result<Self> {
        let saved_endian = reader.endian();
        reader.set_endianness(BitEndian::Little)?;

        let vendor_length = reader.read_unsigned(32)?;
        let vendor_string = String::from_utf8(reader.read_bytes(vendor_length as usize)?)?;

        let comment_count = reader.read_unsigned(32)?;
        let mut comments = Vec::with_capacity(comment_count as usize);
        for _ in 0..comment_count {
            let len = reader.read_unsigned(32)?;
            let bytes = reader.read_bytes(len as usize)?;
            comments.push(UserComment::new(String::from_utf8(bytes)?));
        }

        reader.set_endianness(saved_endian)?;
        Ok(VorbisComment {
            vendor_string,
            comments,
        })
    }

    pub(crate) fn write<S: ByteSink>(&self, writer: &mut BitWriter<S>) -> Result<()> {
        let saved_endian = writer.endian();
        writer.set_endianness(BitEndian::Little)?;

        writer.write_unsigned(32, self.vendor_string.len() as u32)?;
        writer.write_bytes(self.vendor_string.as_bytes())?;
        writer.write_unsigned(32, self.comments.len() as u32)?;
        for comment in &self.comments {
            writer.write_unsigned(32, comment.len() as u32)?;
            writer.write_bytes(comment.entry().as_bytes())?;
        }

        writer.set_endianness(saved_endian)?;
        Ok(())
    }

    pub fn byte_len(&self) -> usize {
        8 + self.vendor_string.len() + self.comments.iter().map(|c| 4 + c.len()).sum::<usize>()
    }
}

pub struct Application {
    pub application_id: u32,
    pub data: Vec<u8>,
}

impl Application {
    pub(crate) fn read(reader: &mut BitReader, payload_len: usize) -> Result<Self> {
        let application_id = reader.read_unsigned(32)?;
        let data = reader.read_bytes(payload_len - 4)?;
        Ok(Application {
            application_id,
            data,
        })
    }

    pub(crate) fn write<S: ByteSink>(&self, writer: &mut BitWriter<S>) -> Result<()> {
        writer.write_unsigned(32, self.application_id)?;
        writer.write_bytes(&self.data)?;
        Ok(())
    }

    pub fn byte_len(&self) -> usize {
        4 + self.data.len()
    }
}

#[derive(Debug)]
pub struct CueSheetTrackIndex {
    pub sample_offset: u64,
    pub index_point: u8,
}

#[derive(Debug)]
pub struct CueSheetTrack {
    pub track_offset: u64,
    pub track_number: u8,
    pub isrc: [u8; 12],
    pub is_audio: bool,
    pub is_pre_emphasis: bool,
    pub track_index: Vec<CueSheetTrackIndex>,
}

pub struct CueSheet {
    pub catalog: String,
    pub leadin_samples: u64,
    pub is_cd: bool,
    pub tracks: Vec<CueSheetTrack>,
}

impl CueSheet {
    pub(crate) fn read(reader: &mut BitReader) -> Result<Self> {
        let catalog_bytes = reader.read_bytes(128)?;
        let catalog = String::from_utf8(
            catalog_bytes
                .into_iter()
                .take_while(|&b| b != 0)
                .collect(),
        )?;
        let leadin_samples = reader.read_u64(64)?;
        let is_cd = reader.read_unsigned(1)? != 0;
        reader.skip_bytes(258)?;
        let track_number = reader.read_unsigned(8)? as u8;

        let mut tracks = Vec::with_capacity(track_number as usize);
        for _ in 0..track_number {
            let track_offset = reader.read_u64(64)?;
            let track_num = reader.read_unsigned(8)? as u8;
            let isrc_bytes = reader.read_bytes(12)?;
            let mut isrc = [0u8; 12];
            isrc.copy_from_slice(&isrc_bytes);
            let is_audio = reader.read_unsigned(1)? == 0;
            let is_pre_emphasis = reader.read_unsigned(1)? != 0;
            reader.skip(6)?;
            reader.skip_bytes(13)?;
            let index_point_number = reader.read_unsigned(8)? as u8;
            let mut track_index = Vec::with_capacity(index_point_number as usize);
            for _ in 0..index_point_number {
                let sample_offset = reader.read_u64(64)?;
                let index_point = reader.read_unsigned(8)? as u8;
                reader.skip_bytes(3)?;
                track_index.push(CueSheetTrackIndex {
                    sample_offset,
                    index_point,
                });
            }
            tracks.push(CueSheetTrack {
                track_offset,
                track_number: track_num,
                isrc,
                is_audio,
                is_pre_emphasis,
                track_index,
            });
        }

        Ok(CueSheet {
            catalog,
            leadin_samples,
            is_cd,
            tracks,
        })
    }

    pub(crate) fn write<S: ByteSink>(&self, writer: &mut BitWriter<S>) -> Result<()> {
        let mut catalog_bytes = [0u8; 128];
        let bytes = self.catalog.as_bytes();
        catalog_bytes[..bytes.len()].copy_from_slice(bytes);
        writer.write_bytes(&catalog_bytes)?;
        writer.write_u64(64, self.leadin_samples)?;
        writer.write_unsigned(1, self.is_cd as u32)?;
        writer.write_unsigned(7, 0)?;
        writer.write_bytes(&[0u8; 258])?;
        writer.write_unsigned(8, self.tracks.len() as u32)?;
        for track in &self.tracks {
            writer.write_u64(64, track.track_offset)?;
            writer.write_unsigned(8, track.track_number as u32)?;
            writer.write_bytes(&track.isrc)?;
            writer.write_unsigned(1, !track.is_audio as u32)?;
            writer.write_unsigned(1, track.is_pre_emphasis as u32)?;
            writer.write_unsigned(6, 0)?;
            writer.write_bytes(&[0u8; 13])?;
            writer.write_unsigned(8, track.track_index.len() as u32)?;
            for index in &track.track_index {
                writer.write_u64(64, index.sample_offset)?;
                writer.write_unsigned(8, index.index_point as u32)?;
                writer.write_bytes(&[0u8; 3])?;
            }
        }
        Ok(())
    }

    pub fn byte_len(&self) -> usize {
        396 + self
            .tracks
            .iter()
            .map(|t| 36 + t.track_index.len() * 12)
            .sum::<usize>()
    }
}

/// Picture type per the ID3v2 APIC frame (spec §4.5 supplement).
#[repr(u32)]
#[derive(Copy, Clone, Debug, FromPrimitive)]
pub enum PictureType {
    Other,
    FileIcon,
    OtherFileIcon,
    CoverFront,
    CoverBack,
    LeafletPage,
    Media,
    LeadArtist,
    Artist,
    Conductor,
    Band,
    Composer,
    Lyricist,
    RecordingLocation,
    DuringRecording,
    DuringPerformance,
    MovieVideoScreenCapture,
    BrightColoredFish,
    Illustration,
    BandArtistLogotype,
    PublisherStudioLogotype,
    Unknown,
}

pub struct Picture {
    pub picture_type: PictureType,
    pub mime_type: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub colors: u32,
    pub data: Vec<u8>,
}

impl Picture {
    pub fn color_indexed(&self) -> bool {
        self.colors != 0
    }

    pub(crate) fn read(reader: &mut BitReader) -> Result<Self> {
        let picture_type =
            FromPrimitive::from_u32(reader.read_unsigned(32)?).unwrap_or(PictureType::Unknown);
        let mime_len = reader.read_unsigned(32)?;
        let mime_type = String::from_utf8(reader.read_bytes(mime_len as usize)?)?;

        let desc_len = reader.read_unsigned(32)?;
        let description = String::from_utf8(reader.read_bytes(desc_len as usize)?)?;

        let width = reader.read_unsigned(32)?;
        let height = reader.read_unsigned(32)?;
        let depth = reader.read_unsigned(32)?;
        let colors = reader.read_unsigned(32)?;

        let data_len = reader.read_unsigned(32)?;
        let data = reader.read_bytes(data_len as usize)?;

        Ok(Picture {
            picture_type,
            mime_type,
            description,
            width,
            height,
            depth,
            colors,
            data,
        })
    }

    pub(crate) fn write<S: ByteSink>(&self, writer: &mut BitWriter<S>) -> Result<()> {
        writer.write_unsigned(32, self.picture_type as u32)?;
        writer.write_unsigned(32, self.mime_type.len() as u32)?;
        writer.write_bytes(self.mime_type.as_bytes())?;
        writer.write_unsigned(32, self.description.len() as u32)?;
        writer.write_bytes(self.description.as_bytes())?;
        writer.write_unsigned(32, self.width)?;
        writer.write_unsigned(32, self.height)?;
        writer.write_unsigned(32, self.depth)?;
        writer.write_unsigned(32, self.colors)?;
        writer.write_unsigned(32, self.data.len() as u32)?;
        writer.write_bytes(&self.data)?;
        Ok(())
    }

    pub fn byte_len(&self) -> usize {
        32 + self.mime_type.len() + self.description.len() + self.data.len()
    }
}

pub enum MetadataBlockData {
    StreamInfo(StreamInfo),
    Padding(usize),
    Application(Application),
    SeekTable(SeekTable),
    Comment(VorbisComment),
    CueSheet(CueSheet),
    Picture(Picture),
    Reserved(u8, Vec<u8>),
}

impl MetadataBlockData {
    pub fn block_type(&self) -> u8 {
        match self {
            MetadataBlockData::StreamInfo(_) => 0,
            MetadataBlockData::Padding(_) => 1,
            MetadataBlockData::Application(_) => 2,
            MetadataBlockData::SeekTable(_) => 3,
            MetadataBlockData::Comment(_) => 4,
            MetadataBlockData::CueSheet(_) => 5,
            MetadataBlockData::Picture(_) => 6,
            MetadataBlockData::Reserved(t, _) => *t,
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            MetadataBlockData::StreamInfo(_) => 34,
            MetadataBlockData::Padding(n) => *n,
            MetadataBlockData::Application(a) => a.byte_len(),
            MetadataBlockData::SeekTable(s) => s.byte_len(),
            MetadataBlockData::Comment(c) => c.byte_len(),
            MetadataBlockData::CueSheet(c) => c.byte_len(),
            MetadataBlockData::Picture(p) => p.byte_len(),
            MetadataBlockData::Reserved(_, data) => data.len(),
        }
    }
}

pub struct MetadataBlock {
    pub is_last: bool,
    pub data: MetadataBlockData,
}

impl MetadataBlock {
    pub fn new(data: MetadataBlockData) -> Self {
        MetadataBlock {
            is_last: false,
            data,
        }
    }

    pub(crate) fn read(reader: &mut BitReader) -> Result<Self> {
        let is_last = reader.read_unsigned(1)? != 0;
        let block_type = reader.read_unsigned(7)? as u8;
        let length = reader.read_unsigned(24)? as usize;

        let data = match block_type {
            0 => MetadataBlockData::StreamInfo(StreamInfo::read(reader)?),
            1 => {
                reader.skip_bytes(length as u32)?;
                MetadataBlockData::Padding(length)
            }
            2 => MetadataBlockData::Application(Application::read(reader, length)?),
            3 => MetadataBlockData::SeekTable(SeekTable::read(reader, length)?),
            4 => MetadataBlockData::Comment(VorbisComment::read(reader)?),
            5 => MetadataBlockData::CueSheet(CueSheet::read(reader)?),
            6 => MetadataBlockData::Picture(Picture::read(reader)?),
            0x7f => return Err(FlacError::InvalidBlockType),
            other => MetadataBlockData::Reserved(other, reader.read_bytes(length)?),
        };

        Ok(MetadataBlock { is_last, data })
    }

    pub(crate) fn write<S: ByteSink>(&self, writer: &mut BitWriter<S>) -> Result<()> {
        writer.write_unsigned(1, self.is_last as u32)?;
        writer.write_unsigned(7, self.data.block_type() as u32)?;
        writer.write_unsigned(24, self.data.byte_len() as u32)?;
        match &self.data {
            MetadataBlockData::StreamInfo(s) => s.write(writer)?,
            MetadataBlockData::Padding(n) => writer.write_bytes(&vec![0u8; *n])?,
            MetadataBlockData::Application(a) => a.write(writer)?,
            MetadataBlockData::SeekTable(s) => s.write(writer)?,
            MetadataBlockData::Comment(c) => c.write(writer)?,
            MetadataBlockData::CueSheet(c) => c.write(writer)?,
            MetadataBlockData::Picture(p) => p.write(writer)?,
            MetadataBlockData::Reserved(_, data) => writer.write_bytes(data)?,
        }
        Ok(())
    }
}

/// Reads the `"fLaC"` magic number and every metadata block up to and
/// including the one with the last-block flag set (spec §4.5).
pub fn read_metadata(reader: &mut BitReader) -> Result<Vec<MetadataBlock>> {
    let magic = reader.read_bytes(4)?;
    if magic.as_slice() != b"fLaC" {
        return Err(FlacError::InvalidMagicNumber);
    }

    let first = MetadataBlock::read(reader)?;
    if !matches!(first.data, MetadataBlockData::StreamInfo(_)) {
        return Err(FlacError::InvalidFirstBlock);
    }

    let mut is_last = first.is_last;
    let mut blocks = vec![first];
    while !is_last {
        let block = MetadataBlock::read(reader)?;
        is_last = block.is_last;
        blocks.push(block);
    }
    Ok(blocks)
}

pub fn write_metadata<S: ByteSink>(
    writer: &mut BitWriter<S>,
    blocks: &[MetadataBlock],
) -> Result<()> {
    writer.write_bytes(b"fLaC")?;
    for block in blocks {
        block.write(writer)?;
    }
    Ok(())
}

/// Resolves the channel mask that applies to a stream: the
/// VORBIS_COMMENT override if present and consistent with the channel
/// count, else STREAMINFO's positional default (spec §4.5).
pub fn resolve_channel_mask(stream_info: &StreamInfo, blocks: &[MetadataBlock]) -> u32 {
    for block in blocks {
        if let MetadataBlockData::Comment(comment) = &block.data {
            if let Some(mask) = comment.channel_mask_override(stream_info.channels) {
                return mask;
            }
        }
    }
    stream_info.default_channel_mask()
}
