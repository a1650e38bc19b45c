//! The unknown-field store.
//!
//! Fields present in a parsed byte stream that the schema does not
//! recognize are not errors; their bytes (tag included) are preserved
//! verbatim, in arrival order, and re-emitted after all known fields when
//! the message is serialized.

use crate::arena::{Arena, ArenaVec};
use crate::error::Result;
use crate::wire::{self, WireType};

/// Preserved bytes of unrecognized fields.
#[derive(Debug)]
pub struct UnknownFields<'a> {
    bytes: ArenaVec<'a, u8>,
}

impl<'a> UnknownFields<'a> {
    pub(crate) fn new(arena: &'a Arena) -> Self {
        UnknownFields {
            bytes: arena.vec(),
        }
    }

    /// Appends one verbatim field record (tag and payload).
    pub(crate) fn push_record(&mut self, record: &[u8]) {
        self.bytes.extend(record.iter().copied());
    }

    /// Appends a varint field reconstructed from its parts, as used for
    /// out-of-range closed enum values.
    pub(crate) fn push_varint(&mut self, field_number: u32, value: u64) {
        let mut buf = Vec::with_capacity(12);
        wire::put_varint(&mut buf, wire::make_tag(field_number, WireType::Varint) as u64);
        wire::put_varint(&mut buf, value);
        self.bytes.extend(buf.iter().copied());
    }

    /// The preserved bytes, in arrival order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns true if no unknown fields were preserved.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Total preserved length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Iterates over the preserved records as `(field_number, wire_type,
    /// record_bytes)` triples. Stops early if the store is somehow
    /// malformed; the parser only ever appends whole records.
    pub fn iter(&self) -> UnknownFieldIter<'_> {
        UnknownFieldIter {
            bytes: &self.bytes,
            pos: 0,
        }
    }
}

/// Iterator over unknown-field records.
#[derive(Debug)]
pub struct UnknownFieldIter<'m> {
    bytes: &'m [u8],
    pos: usize,
}

impl<'m> UnknownFieldIter<'m> {
    fn next_record(&mut self) -> Result<Option<(u32, WireType, &'m [u8])>> {
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }
        let start = self.pos;
        let (tag, tag_len) = wire::decode_varint(&self.bytes[self.pos..], self.pos)?;
        let field_number = (tag >> 3) as u32;
        let wire_type = WireType::from_tag_bits((tag & 7) as u8, self.pos, field_number)?;
        self.pos += tag_len;

        match wire_type {
            WireType::Varint => {
                let (_, len) = wire::decode_varint(&self.bytes[self.pos..], self.pos)?;
                self.pos += len;
            }
            WireType::I64 => self.pos += 8,
            WireType::I32 => self.pos += 4,
            WireType::Len => {
                let (len, len_len) = wire::decode_varint(&self.bytes[self.pos..], self.pos)?;
                self.pos += len_len + len as usize;
            }
            WireType::StartGroup | WireType::EndGroup => {
                // Group records are preserved as one blob from start tag to
                // end tag; scan forward to the matching end.
                let mut depth = match wire_type {
                    WireType::StartGroup => 1usize,
                    _ => return Ok(None),
                };
                while depth > 0 && self.pos < self.bytes.len() {
                    let (inner_tag, inner_len) =
                        wire::decode_varint(&self.bytes[self.pos..], self.pos)?;
                    self.pos += inner_len;
                    match (inner_tag & 7) as u8 {
                        3 => depth += 1,
                        4 => depth -= 1,
                        0 => {
                            let (_, l) = wire::decode_varint(&self.bytes[self.pos..], self.pos)?;
                            self.pos += l;
                        }
                        1 => self.pos += 8,
                        5 => self.pos += 4,
                        2 => {
                            let (l, ll) = wire::decode_varint(&self.bytes[self.pos..], self.pos)?;
                            self.pos += ll + l as usize;
                        }
                        _ => return Ok(None),
                    }
                }
            }
        }

        if self.pos > self.bytes.len() {
            return Ok(None);
        }
        Ok(Some((field_number, wire_type, &self.bytes[start..self.pos])))
    }
}

impl<'m> Iterator for UnknownFieldIter<'m> {
    type Item = (u32, WireType, &'m [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().ok().flatten()
    }
}

impl PartialEq for UnknownFields<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_iterate() {
        let arena = Arena::new();
        let mut unknown = UnknownFields::new(&arena);
        assert!(unknown.is_empty());

        // Field 7, varint 5: tag 0x38.
        unknown.push_record(&[0x38, 0x05]);
        // Field 3, LEN "hi": tag 0x1A.
        unknown.push_record(&[0x1A, 0x02, b'h', b'i']);

        let records: Vec<_> = unknown.iter().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], (7, WireType::Varint, &[0x38, 0x05][..]));
        assert_eq!(records[1].0, 3);
        assert_eq!(records[1].1, WireType::Len);
    }

    #[test]
    fn test_push_varint_roundtrip() {
        let arena = Arena::new();
        let mut unknown = UnknownFields::new(&arena);
        unknown.push_varint(2, 300);
        let records: Vec<_> = unknown.iter().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, 2);
        assert_eq!(records[0].2, &[0x10, 0xAC, 0x02][..]);
    }
}
