use std::collections::HashMap;

use crate::error::BitstreamError;

/// One decode step of a compiled Huffman tree.
///
/// The canonical implementation (spec §3, §4.1) packs `{continue: 1
/// bit, next_node: 7 bits, new_state: 9 bits, value: remainder}` into a
/// single integer indexed by `[node][partial-byte state]` so decoding
/// advances one byte per table lookup. That packing is a speed
/// optimisation over the reader's 9-bit partial-byte state, not a
/// semantic requirement (spec §9): this crate compiles the same
/// prefix-free code set into a node trie addressed one *bit* at a time
/// instead of one *byte* at a time, which is observably identical
/// (same values decoded, same bits consumed) and does not need to
/// reach into `BitReader`'s internal partial-byte representation to
/// build.
#[derive(Debug, Clone, Copy)]
enum Link {
    Node(u32),
    Value(i32),
}

#[derive(Debug, Clone, Copy, Default)]
struct TrieNode {
    zero: Option<Link>,
    one: Option<Link>,
}

/// A compiled Huffman code table, usable for both decoding
/// (`BitReader::read_huffman`) and encoding (`BitWriter::write_huffman`).
#[derive(Debug, Clone)]
pub struct HuffmanTable {
    nodes: Vec<TrieNode>,
    encode: HashMap<i32, (u32, u32)>,
}

impl HuffmanTable {
    /// Builds a table from `(value, code_bits)` pairs, where
    /// `code_bits` is the code written MSB-first (the order it will be
    /// read from the stream, independent of the stream's own
    /// endianness — `BitReader`/`BitWriter` already normalize bit order
    /// before `read_huffman`/`write_huffman` see it).
    pub fn new(codes: &[(i32, &[u8])]) -> Self {
        let mut nodes = vec![TrieNode::default()];
        let mut encode = HashMap::new();

        for &(value, bits) in codes {
            let mut node = 0u32;
            for (i, &bit) in bits.iter().enumerate() {
                let last = i + 1 == bits.len();
                let link = if last {
                    Some(Link::Value(value))
                } else {
                    let new_node = nodes.len() as u32;
                    nodes.push(TrieNode::default());
                    Some(Link::Node(new_node))
                };

                let slot = if bit == 0 {
                    &mut nodes[node as usize].zero
                } else {
                    &mut nodes[node as usize].one
                };

                match (*slot, link) {
                    (Some(Link::Node(n)), _) if !last => node = n,
                    (None, Some(Link::Node(n))) => {
                        *slot = Some(Link::Node(n));
                        node = n;
                    }
                    (None, Some(l)) => *slot = Some(l),
                    _ => {}
                }
            }

            let mut code_bits = 0u32;
            for &b in bits {
                code_bits = (code_bits << 1) | (b as u32);
            }
            encode.insert(value, (bits.len() as u32, code_bits));
        }

        HuffmanTable { nodes, encode }
    }

    pub(crate) fn step(&self, node: u32, bit: u8) -> Option<Link> {
        let n = &self.nodes[node as usize];
        if bit == 0 {
            n.zero
        } else {
            n.one
        }
    }

    pub(crate) fn root() -> u32 {
        0
    }

    pub fn code_for(&self, value: i32) -> Result<(u32, u32), BitstreamError> {
        self.encode
            .get(&value)
            .copied()
            .ok_or(BitstreamError::UnknownHuffmanValue)
    }
}

pub(crate) enum StepResult {
    Continue(u32),
    Done(i32),
}

impl HuffmanTable {
    pub(crate) fn advance(&self, node: u32, bit: u8) -> Result<StepResult, BitstreamError> {
        match self.step(node, bit) {
            Some(Link::Node(n)) => Ok(StepResult::Continue(n)),
            Some(Link::Value(v)) => Ok(StepResult::Done(v)),
            None => Err(BitstreamError::UnknownHuffmanValue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitEndian, BitReader, BitWriter};

    #[test]
    fn round_trips_through_reader_and_writer() {
        // A small canonical unary-ish prefix code: 0=0x0, 10=0x1, 11=0x2.
        let table = HuffmanTable::new(&[(0, &[0]), (1, &[1, 0]), (2, &[1, 1])]);

        let mut writer = BitWriter::recorder(BitEndian::Big);
        writer.write_huffman(&table, 1).unwrap();
        writer.write_huffman(&table, 0).unwrap();
        writer.write_huffman(&table, 2).unwrap();
        writer.byte_align().unwrap();
        let bytes = writer.into_recorder_data().unwrap();

        let mut reader = BitReader::from_bytes(bytes, BitEndian::Big);
        assert_eq!(reader.read_huffman(&table).unwrap(), 1);
        assert_eq!(reader.read_huffman(&table).unwrap(), 0);
        assert_eq!(reader.read_huffman(&table).unwrap(), 2);
    }
}
