//! Conversions between bytes, bits and fixed-width unsigned integers.
//!
//! Bits are plain `bool`s, most significant bit first within every byte and
//! every integer field.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Expand a byte buffer into `8 * bytes.len()` bits, MSB first.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for byte in bytes {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1 == 1);
        }
    }
    bits
}

/// Pack bits into bytes, padding a partial trailing byte with zero bits.
pub fn bits_to_bytes(bits: &[bool]) -> Bytes {
    let mut out = BytesMut::with_capacity(bits.len().div_ceil(8));
    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for (i, bit) in chunk.iter().enumerate() {
            if *bit {
                byte |= 0x80 >> i;
            }
        }
        out.put_u8(byte);
    }
    out.freeze()
}

/// Encode `n` as exactly `width` bits, MSB first.
///
/// Bits above `width` are dropped silently; range checks belong to the caller.
pub fn uint_to_bits(n: u32, width: usize) -> Vec<bool> {
    (0..width)
        .rev()
        .map(|shift| shift < u32::BITS as usize && (n >> shift) & 1 == 1)
        .collect()
}

/// Decode an MSB-first bit sequence into an integer.
pub fn bits_to_uint(bits: &[bool]) -> u32 {
    bits.iter()
        .fold(0u32, |acc, bit| (acc << 1) | u32::from(*bit))
}

/// Parse a literal such as `"10 0101010"` into bits. Whitespace is ignored.
pub fn parse_bit_string(literal: &str) -> Result<Vec<bool>> {
    literal
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            other => Err(ProtocolError::InvalidBitLiteral(other)),
        })
        .collect()
}

/// Sequential reader over a bit sequence.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bits: &'a [bool],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bits: &'a [bool]) -> Self {
        Self { bits, pos: 0 }
    }

    /// Read the next `width` bits as an integer, or `None` if too few remain.
    pub fn read_uint(&mut self, width: usize) -> Option<u32> {
        let end = self.pos.checked_add(width)?;
        let slice = self.bits.get(self.pos..end)?;
        self.pos = end;
        Some(bits_to_uint(slice))
    }

    /// Bits consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bits not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bits.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_expand_msb_first() {
        let bits = bytes_to_bits(&[0b1000_0001, 0b0100_0000]);
        assert_eq!(bits.len(), 16);
        assert!(bits[0]);
        assert!(bits[7]);
        assert!(bits[9]);
        assert_eq!(bits.iter().filter(|b| **b).count(), 3);
    }

    #[test]
    fn empty_buffer_has_no_bits() {
        assert!(bytes_to_bits(&[]).is_empty());
        assert!(bits_to_bytes(&[]).is_empty());
    }

    #[test]
    fn partial_byte_is_zero_padded() {
        let bytes = bits_to_bytes(&[true, false, true]);
        assert_eq!(bytes.as_ref(), &[0b1010_0000]);

        let bits = parse_bit_string("01 0000 011 1").unwrap();
        assert_eq!(bits_to_bytes(&bits).as_ref(), &[0b0100_0001, 0b1100_0000]);
    }

    #[test]
    fn whole_bytes_survive_a_trip_through_bits() {
        let original = [0x00, 0xFF, 0xA5, 0x3C];
        assert_eq!(bits_to_bytes(&bytes_to_bits(&original)).as_ref(), &original);
    }

    #[test]
    fn uint_fields_are_big_endian() {
        assert_eq!(uint_to_bits(0b101, 3), vec![true, false, true]);
        assert_eq!(uint_to_bits(1, 4), vec![false, false, false, true]);
        assert_eq!(bits_to_uint(&[true, false, true, false, true, false, true, false]), 170);
        assert_eq!(bits_to_uint(&[]), 0);
    }

    #[test]
    fn uint_to_bits_truncates_high_bits() {
        assert_eq!(uint_to_bits(0b1_0110, 3), vec![true, true, false]);
        assert_eq!(bits_to_uint(&uint_to_bits(300, 8)), 300 % 256);
    }

    #[test]
    fn parse_rejects_non_binary_characters() {
        assert_eq!(
            parse_bit_string("10 2").unwrap_err(),
            ProtocolError::InvalidBitLiteral('2')
        );
    }

    #[test]
    fn reader_walks_fields_and_stops_at_end() {
        let bits = parse_bit_string("10 0101010 1").unwrap();
        let mut reader = BitReader::new(&bits);
        assert_eq!(reader.read_uint(2), Some(0b10));
        assert_eq!(reader.read_uint(7), Some(42));
        assert_eq!(reader.position(), 9);
        assert_eq!(reader.read_uint(2), None);
        assert_eq!(reader.remaining(), 1);
        assert_eq!(reader.read_uint(1), Some(1));
    }
}
