/// Bit ordering within each byte of a bitstream.
///
/// Changing endianness on a live reader/writer byte-aligns it and
/// resets the partial-bit state (see `BitReader::set_endianness`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitEndian {
    /// MSB-first within each byte.
    Big,
    /// LSB-first within each byte.
    Little,
}
