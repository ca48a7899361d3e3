/// An opaque token recording enough state to restore a reader or
/// writer to a previous point: the underlying byte offset plus the
/// partial-byte state at that offset.
///
/// Spec §3 describes the partial-byte state as a packed 9-bit integer
/// (`0x100 | remaining_bits << (8-count)`) so the jump-table machinery
/// can dispatch on it directly. That packing is an implementation
/// detail of a byte-at-a-time jump table (spec §9: "the observable
/// contract is identical" regardless of internal representation); this
/// crate's `BitReader`/`BitWriter` walk bits one at a time (see
/// `huffman.rs`), so the fields below store the same information
/// unpacked — bit offset within the current byte, plus the single
/// unread bit `unread()` may have pushed back.
///
/// Tokens are tagged with the id of the stream that produced them;
/// `set_pos` on a token from a different stream fails with
/// `BitstreamError::ForeignPosition` rather than silently producing
/// garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub(crate) stream_id: u64,
    pub(crate) byte_offset: u64,
    pub(crate) bit_pos: u8,
    pub(crate) unread_bit: Option<u8>,
}
