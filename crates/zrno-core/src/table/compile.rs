//! MiniTable compilation.
//!
//! Takes the resolved field plans of a validated message descriptor and
//! emits the packed [`MiniTable`]: hasbit assignment, oneof case words, the
//! slot plan (size-class descending, field-number order within a class, so
//! layouts are stable across runs), the dense-lookup threshold, the
//! required-field list, and the fast dispatch table.

use tracing::trace;

use super::{
    EnumId, FastOp, FastSlot, FieldEntry, MiniTable, RepMode, TableId, EMPTY_FAST_SLOT,
    FAST_SLOTS,
};
use crate::schema::field_descriptor_proto::Type;
use crate::wire::{make_tag, WireType};

/// Resolved compile input for one field, produced by the pool after
/// cross-linking and feature resolution.
#[derive(Debug, Clone, Copy)]
pub struct FieldPlan {
    /// Field number
    pub number: u32,
    /// Declared type
    pub ty: Type,
    /// Whether the field is repeated
    pub repeated: bool,
    /// Effective packed preference, for repeated fields
    pub packed: bool,
    /// Whether a singular field tracks presence explicitly
    pub explicit_presence: bool,
    /// Whether the field is required
    pub required: bool,
    /// Containing oneof index, for real (non-synthetic) oneof members
    pub oneof: Option<u16>,
    /// Whether this is a map field
    pub is_map: bool,
    /// Sub-message table, for message, group, and map fields
    pub sub_message: Option<TableId>,
    /// Enum table, for enum fields
    pub sub_enum: Option<EnumId>,
    /// Whether string payloads must be validated as UTF-8
    pub validate_utf8: bool,
}

/// Slot size class of a field, used to order the layout. Wider storage
/// first, field-number order within a class.
fn size_class(plan: &FieldPlan) -> u8 {
    if plan.repeated || plan.is_map {
        return 0;
    }
    match plan.ty {
        Type::Double
        | Type::Int64
        | Type::Uint64
        | Type::Fixed64
        | Type::Sfixed64
        | Type::Sint64
        | Type::String
        | Type::Bytes
        | Type::Group
        | Type::Message => 0,
        Type::Float
        | Type::Int32
        | Type::Uint32
        | Type::Fixed32
        | Type::Sfixed32
        | Type::Sint32
        | Type::Enum => 1,
        Type::Bool => 2,
    }
}

/// The wire type a field's values are tagged with on the wire, given the
/// field's effective encoding.
pub(crate) fn natural_wire_type(ty: Type, packed: bool) -> WireType {
    if packed {
        return WireType::Len;
    }
    match ty {
        Type::Bool
        | Type::Int32
        | Type::Int64
        | Type::Uint32
        | Type::Uint64
        | Type::Sint32
        | Type::Sint64
        | Type::Enum => WireType::Varint,
        Type::Fixed64 | Type::Sfixed64 | Type::Double => WireType::I64,
        Type::Fixed32 | Type::Sfixed32 | Type::Float => WireType::I32,
        Type::String | Type::Bytes | Type::Message => WireType::Len,
        Type::Group => WireType::StartGroup,
    }
}

/// The specialized fast op for a singular field, if one exists.
fn fast_op(entry: &FieldEntry) -> Option<FastOp> {
    if matches!(entry.rep, RepMode::Repeated | RepMode::Packed | RepMode::Map) {
        return None;
    }
    match entry.ty {
        Type::Bool | Type::Int32 | Type::Int64 | Type::Uint32 | Type::Uint64 => {
            Some(FastOp::Varint)
        }
        Type::Sint32 => Some(FastOp::ZigZag32),
        Type::Sint64 => Some(FastOp::ZigZag64),
        Type::Fixed32 | Type::Sfixed32 | Type::Float => Some(FastOp::Fixed32),
        Type::Fixed64 | Type::Sfixed64 | Type::Double => Some(FastOp::Fixed64),
        Type::String | Type::Bytes => Some(FastOp::Chunk),
        Type::Message => Some(FastOp::Message),
        // Enum values may need validation against the enum table, and
        // groups are bracketed; both stay on the generic path.
        Type::Enum | Type::Group => None,
    }
}

/// Compiles a message's field plans into a [`MiniTable`].
///
/// `plans` must already be sorted by field number and free of duplicates;
/// the pool's validation sweep guarantees both.
pub fn compile(
    plans: &[FieldPlan],
    oneof_count: u32,
    extension_ranges: Vec<(u32, u32)>,
    map_entry: bool,
) -> MiniTable {
    debug_assert!(plans.windows(2).all(|w| w[0].number < w[1].number));

    // Hasbits are handed out in field-number order.
    let mut next_hasbit = 0u32;
    let mut entries: Vec<FieldEntry> = plans
        .iter()
        .map(|plan| {
            let rep = if plan.is_map {
                RepMode::Map
            } else if plan.repeated {
                if plan.packed {
                    RepMode::Packed
                } else {
                    RepMode::Repeated
                }
            } else if plan.oneof.is_some() {
                RepMode::Oneof
            } else if plan.explicit_presence {
                RepMode::Optional
            } else {
                RepMode::Scalar
            };

            let hasbit = if rep == RepMode::Optional {
                let bit = next_hasbit;
                next_hasbit += 1;
                Some(bit)
            } else {
                None
            };

            FieldEntry {
                number: plan.number,
                slot: 0, // assigned below
                hasbit,
                oneof: plan.oneof,
                rep,
                ty: plan.ty,
                sub_message: plan.sub_message,
                sub_enum: plan.sub_enum,
                validate_utf8: plan.validate_utf8,
                required: plan.required,
            }
        })
        .collect();

    // Slot plan: size-class descending (wider first), field number within a
    // class. Slots index the message buffer's cell array; hasbit words and
    // oneof case words live in their own arrays ahead of it.
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by_key(|&i| (size_class(&plans[i]), plans[i].number));
    for (slot, &i) in order.iter().enumerate() {
        entries[i].slot = slot as u32;
    }

    // Dense threshold: the longest prefix where number == position + 1.
    let mut dense_below = 0u32;
    for (position, entry) in entries.iter().enumerate() {
        if entry.number == position as u32 + 1 {
            dense_below = entry.number;
        } else {
            break;
        }
    }

    let required: Vec<u16> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.required)
        .map(|(i, _)| i as u16)
        .collect();

    // Fast table: first field to claim a slot keeps it; a later field whose
    // number shares the low five bits falls to the generic path.
    let mut fast = [EMPTY_FAST_SLOT; FAST_SLOTS];
    for (index, entry) in entries.iter().enumerate() {
        let Some(op) = fast_op(entry) else { continue };
        let packed = entry.rep == RepMode::Packed;
        let tag = make_tag(entry.number, natural_wire_type(entry.ty, packed));
        let slot = ((tag >> 3) & (FAST_SLOTS as u32 - 1)) as usize;
        if fast[slot].tag == 0 {
            fast[slot] = FastSlot {
                tag,
                op,
                field: index as u16,
            };
        } else {
            trace!(
                number = entry.number,
                "fast slot conflict, field takes the slow path"
            );
        }
    }

    MiniTable {
        size: entries.len() as u32,
        hasbit_words: next_hasbit.div_ceil(64),
        oneof_count,
        dense_below,
        fields: entries,
        required,
        fast,
        extension_ranges,
        map_entry,
    }
}
