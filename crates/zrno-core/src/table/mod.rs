//! Compact per-message runtime tables.
//!
//! A [`MiniTable`] is the POD-layout descendant of a message descriptor that
//! the hot parse and serialize paths consume: packed field entries sorted by
//! field number, a slot plan for the message buffer, presence-bit indices,
//! a 32-slot fast dispatch table keyed by the low bits of the decoded tag,
//! and index links to sub-tables.
//!
//! Tables are compiled once per message by the descriptor pool (see
//! [`compile`]) and are immutable afterwards; they link to each other through
//! [`TableId`] indices into the pool rather than references, so recursive
//! message types need no cycles.

mod compile;

pub use compile::{compile, FieldPlan};
pub(crate) use compile::natural_wire_type;

use crate::schema::field_descriptor_proto::Type;

/// Index of a message table inside a pool: file index and table index
/// within that file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId {
    /// Pool file index
    pub file: u32,
    /// Message index within the file
    pub index: u32,
}

/// Index of an enum table inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId {
    /// Pool file index
    pub file: u32,
    /// Enum index within the file
    pub index: u32,
}

/// Storage and presence discipline of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepMode {
    /// Singular with implicit presence (present iff non-default)
    Scalar,
    /// Singular with a hasbit
    Optional,
    /// Member of a oneof; presence tracked by the case word
    Oneof,
    /// Repeated, expanded encoding preferred on output
    Repeated,
    /// Repeated, packed encoding preferred on output
    Packed,
    /// Map field; the sub-table is the synthetic entry message
    Map,
}

/// One field of a [`MiniTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldEntry {
    /// Field number
    pub number: u32,
    /// Slot index into the message buffer's cell array
    pub slot: u32,
    /// Presence bit index, for fields with explicit presence outside oneofs
    pub hasbit: Option<u32>,
    /// Index of the containing oneof's case word
    pub oneof: Option<u16>,
    /// Storage mode
    pub rep: RepMode,
    /// Declared type
    pub ty: Type,
    /// Sub-message table, for message, group, and map fields
    pub sub_message: Option<TableId>,
    /// Enum table, for enum fields
    pub sub_enum: Option<EnumId>,
    /// Whether string payloads must be validated as UTF-8
    pub validate_utf8: bool,
    /// Whether the field is required (drives `is_initialized`)
    pub required: bool,
}

/// Specialized parse operation for a fast-table slot.
///
/// The decoder matches on this; conceptually each variant is a direct
/// pointer to a type-specialized handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastOp {
    /// Plain varint scalar (bool, int32/64, uint32/64)
    Varint,
    /// ZigZag-decoded sint32
    ZigZag32,
    /// ZigZag-decoded sint64
    ZigZag64,
    /// 32-bit fixed-width scalar
    Fixed32,
    /// 64-bit fixed-width scalar
    Fixed64,
    /// Length-delimited string or bytes
    Chunk,
    /// Length-prefixed sub-message
    Message,
}

/// One slot of the fast dispatch table. A zero tag marks an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastSlot {
    /// Full expected tag; the decoded tag must match exactly
    pub tag: u32,
    /// The specialized operation
    pub op: FastOp,
    /// Index into [`MiniTable::fields`]
    pub field: u16,
}

/// Number of fast-table slots; the index is `(tag >> 3) & (FAST_SLOTS - 1)`.
pub const FAST_SLOTS: usize = 32;

/// Per-enum runtime table: the closed-ness flag and, for closed enums, the
/// sorted set of defined values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumTable {
    /// Whether unknown values are routed to the unknown-field set
    pub closed: bool,
    /// Sorted defined values; only consulted for closed enums
    pub values: Vec<i32>,
}

impl EnumTable {
    /// Returns true if `value` is a defined value of this enum, or if the
    /// enum is open (open enums accept any int32).
    pub fn accepts(&self, value: i32) -> bool {
        !self.closed || self.values.binary_search(&value).is_ok()
    }
}

/// Compact, immutable runtime table for one message type.
#[derive(Debug, Clone, PartialEq)]
pub struct MiniTable {
    /// Number of value slots in the message buffer
    pub size: u32,
    /// Number of 64-bit hasbit words
    pub hasbit_words: u32,
    /// Number of oneof case words
    pub oneof_count: u32,
    /// Field numbers at or below this value index directly into `fields`
    pub dense_below: u32,
    /// Field entries, sorted by field number
    pub fields: Vec<FieldEntry>,
    /// Indices into `fields` of required fields
    pub required: Vec<u16>,
    /// Fast dispatch table
    pub fast: [FastSlot; FAST_SLOTS],
    /// Extension number ranges, `[start, end)`, sorted
    pub extension_ranges: Vec<(u32, u32)>,
    /// Whether this table describes a synthetic map entry message
    pub map_entry: bool,
}

/// An empty fast slot.
pub const EMPTY_FAST_SLOT: FastSlot = FastSlot {
    tag: 0,
    op: FastOp::Varint,
    field: 0,
};

impl MiniTable {
    /// Looks up a field entry by number: a direct index below the dense
    /// threshold, binary search above it.
    pub fn find_field(&self, number: u32) -> Option<&FieldEntry> {
        if number == 0 {
            return None;
        }
        if number <= self.dense_below {
            return Some(&self.fields[(number - 1) as usize]);
        }
        self.fields
            .binary_search_by_key(&number, |entry| entry.number)
            .ok()
            .map(|index| &self.fields[index])
    }

    /// Returns the fast slot a decoded tag dispatches to, if its full tag
    /// matches.
    #[inline]
    pub fn fast_slot(&self, tag: u32) -> Option<&FastSlot> {
        let slot = &self.fast[((tag >> 3) & (FAST_SLOTS as u32 - 1)) as usize];
        (slot.tag == tag).then_some(slot)
    }

    /// Returns true if `number` falls inside one of the message's extension
    /// ranges.
    pub fn in_extension_range(&self, number: u32) -> bool {
        self.extension_ranges
            .iter()
            .any(|&(start, end)| number >= start && number < end)
    }

    /// Returns the number of fields that track presence with a hasbit.
    pub fn hasbit_count(&self) -> usize {
        self.fields.iter().filter(|f| f.hasbit.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(number: u32) -> FieldEntry {
        FieldEntry {
            number,
            slot: number - 1,
            hasbit: None,
            oneof: None,
            rep: RepMode::Scalar,
            ty: Type::Int32,
            sub_message: None,
            sub_enum: None,
            validate_utf8: false,
            required: false,
        }
    }

    fn table_with_numbers(numbers: &[u32], dense_below: u32) -> MiniTable {
        MiniTable {
            size: numbers.len() as u32,
            hasbit_words: 0,
            oneof_count: 0,
            dense_below,
            fields: numbers.iter().copied().map(entry).collect(),
            required: vec![],
            fast: [EMPTY_FAST_SLOT; FAST_SLOTS],
            extension_ranges: vec![],
            map_entry: false,
        }
    }

    #[test]
    fn test_find_field_dense() {
        let table = table_with_numbers(&[1, 2, 3], 3);
        assert_eq!(table.find_field(2).unwrap().number, 2);
        assert_eq!(table.find_field(4), None);
        assert_eq!(table.find_field(0), None);
    }

    #[test]
    fn test_find_field_sparse() {
        let table = table_with_numbers(&[1, 5, 100], 1);
        assert_eq!(table.find_field(5).unwrap().number, 5);
        assert_eq!(table.find_field(100).unwrap().number, 100);
        assert_eq!(table.find_field(6), None);
    }

    #[test]
    fn test_extension_range_lookup() {
        let mut table = table_with_numbers(&[1], 1);
        table.extension_ranges = vec![(1000, 2000)];
        assert!(table.in_extension_range(1000));
        assert!(table.in_extension_range(1999));
        assert!(!table.in_extension_range(2000));
        assert!(!table.in_extension_range(5));
    }

    #[test]
    fn test_enum_table_accepts() {
        let open = EnumTable {
            closed: false,
            values: vec![0, 1],
        };
        assert!(open.accepts(99));

        let closed = EnumTable {
            closed: true,
            values: vec![0, 1, 5],
        };
        assert!(closed.accepts(5));
        assert!(!closed.accepts(99));
    }
}
