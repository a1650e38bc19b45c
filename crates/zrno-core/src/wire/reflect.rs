//! The reflection-driven codec.
//!
//! Same wire contract as the table-driven engine, but every dispatch
//! decision (type, cardinality, packing, UTF-8 policy, sub-message types)
//! is read from the descriptor graph instead of a compiled MiniTable; only
//! slot addressing still goes through the table, since the message buffer is
//! table-shaped. Used for dynamically loaded messages; several times slower
//! than the fast path, semantically identical.
//!
//! The serializer here recomputes sub-message sizes on demand rather than
//! keeping a size stack; output is byte-identical to the deterministic mode
//! of [`crate::wire::encode`].

use bytes::BufMut;

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::message::{Cell, DynamicMessage};
use crate::pool::{FieldDescriptor, MessageDescriptor};
use crate::schema::feature_set::Utf8Validation;
use crate::schema::field_descriptor_proto::Type;
use crate::table::natural_wire_type;
use crate::wire::decode::{DecodeOptions, Decoder};
use crate::wire::{self, WireType};

/// Parses a message using descriptor-driven dispatch.
pub fn decode_with_descriptor<'a>(
    desc: &MessageDescriptor,
    arena: &'a Arena,
    bytes: &[u8],
) -> Result<DynamicMessage<'a>> {
    decode_with_descriptor_options(desc, arena, bytes, &DecodeOptions::default())
}

/// [`decode_with_descriptor`] with explicit options.
pub fn decode_with_descriptor_options<'a>(
    desc: &MessageDescriptor,
    arena: &'a Arena,
    bytes: &[u8],
    options: &DecodeOptions,
) -> Result<DynamicMessage<'a>> {
    let staged = arena.alloc_bytes(bytes);
    let mut msg = DynamicMessage::new(desc.clone(), arena);
    let pool = desc.pool().clone();
    let mut decoder = Decoder::new(&pool, arena, staged, options);
    parse_reflected(&mut decoder, &mut msg, None)?;
    Ok(msg)
}

fn validate_utf8(field: &FieldDescriptor) -> bool {
    field.kind() == Type::String && field.features().utf8_validation == Utf8Validation::Verify
}

fn parse_reflected<'a>(
    dec: &mut Decoder<'a, '_>,
    msg: &mut DynamicMessage<'a>,
    group: Option<u32>,
) -> Result<()> {
    while !dec.at_limit() {
        let tag_start = dec.pos;
        let (number, wire_type) = dec.read_tag()?;

        if wire_type == WireType::EndGroup {
            if group == Some(number) {
                return Ok(());
            }
            return Err(Error::UnterminatedGroup {
                offset: tag_start,
                field_number: number,
            });
        }

        let Some(field) = msg.descriptor().field(number) else {
            dec.save_unknown(msg, wire_type, tag_start, number)?;
            continue;
        };
        parse_reflected_field(dec, msg, &field, wire_type, tag_start)?;
    }

    if let Some(number) = group {
        return Err(Error::UnterminatedGroup {
            offset: dec.limit,
            field_number: number,
        });
    }
    Ok(())
}

fn parse_reflected_field<'a>(
    dec: &mut Decoder<'a, '_>,
    msg: &mut DynamicMessage<'a>,
    field: &FieldDescriptor,
    wire_type: WireType,
    tag_start: usize,
) -> Result<()> {
    // The descriptor and the MiniTable share the sorted-by-number field
    // order, so the table entry at the descriptor's index addresses the
    // matching slot.
    let entry = msg.table().fields[field.index() as usize];
    let ty = field.kind();
    let scalar_wire = natural_wire_type(ty, false);

    if field.is_map() {
        if wire_type != WireType::Len {
            return dec.save_unknown(msg, wire_type, tag_start, field.number());
        }
        return parse_reflected_map_entry(dec, msg, field, &entry);
    }

    if field.is_repeated() {
        match ty {
            Type::String | Type::Bytes => {
                if wire_type != WireType::Len {
                    return dec.save_unknown(msg, wire_type, tag_start, field.number());
                }
                let offset = dec.pos;
                let chunk = dec.read_chunk()?;
                if validate_utf8(field) {
                    dec.check_utf8(chunk, offset)?;
                }
                msg.chunk_list(entry.slot as usize).push(chunk);
                Ok(())
            }
            Type::Message | Type::Group => {
                let expected = if ty == Type::Group {
                    WireType::StartGroup
                } else {
                    WireType::Len
                };
                if wire_type != expected {
                    return dec.save_unknown(msg, wire_type, tag_start, field.number());
                }
                let mut child = new_child(dec, field)?;
                parse_reflected_child(dec, &mut child, field, ty)?;
                msg.message_list(entry.slot as usize).push(child);
                Ok(())
            }
            Type::Enum => {
                if wire_type == scalar_wire {
                    let raw = dec.read_varint()?;
                    append_reflected_enum(msg, field, &entry, raw)
                } else if wire_type == WireType::Len {
                    let len = dec.read_varint()? as usize;
                    dec.check_len(len, "packed run")?;
                    let end = dec.pos + len;
                    while dec.pos < end {
                        let raw = dec.read_varint()?;
                        append_reflected_enum(msg, field, &entry, raw)?;
                    }
                    Ok(())
                } else {
                    dec.save_unknown(msg, wire_type, tag_start, field.number())
                }
            }
            ty => {
                if wire_type == scalar_wire {
                    let word = dec.read_scalar_word(ty)?;
                    msg.word_list(entry.slot as usize).push(word);
                    Ok(())
                } else if wire_type == WireType::Len {
                    let len = dec.read_varint()? as usize;
                    dec.check_len(len, "packed run")?;
                    let end = dec.pos + len;
                    while dec.pos < end {
                        let word = dec.read_scalar_word(ty)?;
                        msg.word_list(entry.slot as usize).push(word);
                    }
                    Ok(())
                } else {
                    dec.save_unknown(msg, wire_type, tag_start, field.number())
                }
            }
        }
    } else {
        if wire_type != scalar_wire {
            return dec.save_unknown(msg, wire_type, tag_start, field.number());
        }
        match ty {
            Type::String | Type::Bytes => {
                let offset = dec.pos;
                let chunk = dec.read_chunk()?;
                if validate_utf8(field) {
                    dec.check_utf8(chunk, offset)?;
                }
                msg.mark_present(&entry);
                msg.cells[entry.slot as usize] = Cell::Chunk(chunk);
                Ok(())
            }
            Type::Message | Type::Group => {
                msg.mark_present(&entry);
                let slot = entry.slot as usize;
                if !matches!(msg.cells[slot], Cell::Message(_)) {
                    let child = new_child(dec, field)?;
                    msg.cells[slot] = Cell::Message(Box::new(child));
                }
                let Cell::Message(child) = &mut msg.cells[slot] else {
                    unreachable!("slot was just set to a message cell");
                };
                parse_reflected_child(dec, child, field, ty)
            }
            Type::Enum => {
                let raw = dec.read_varint()?;
                let value = raw as u32 as i32;
                let enum_desc = field
                    .enum_type()
                    .ok_or_else(|| Error::internal("enum type failed to load"))?;
                let accepted = !enum_desc.is_closed()
                    || enum_desc.values().any(|v| v.number() == value);
                if !accepted {
                    msg.unknown.push_varint(field.number(), raw);
                    return Ok(());
                }
                msg.mark_present(&entry);
                msg.cells[entry.slot as usize] = Cell::Word(value as u32 as u64);
                Ok(())
            }
            ty => {
                let word = dec.read_scalar_word(ty)?;
                msg.mark_present(&entry);
                msg.cells[entry.slot as usize] = Cell::Word(word);
                Ok(())
            }
        }
    }
}

fn new_child<'a>(dec: &Decoder<'a, '_>, field: &FieldDescriptor) -> Result<DynamicMessage<'a>> {
    let child_desc = field
        .message_type()
        .ok_or_else(|| Error::internal("sub-message type failed to load"))?;
    Ok(DynamicMessage::new(child_desc, dec.arena))
}

fn parse_reflected_child<'a>(
    dec: &mut Decoder<'a, '_>,
    child: &mut DynamicMessage<'a>,
    field: &FieldDescriptor,
    ty: Type,
) -> Result<()> {
    if ty == Type::Group {
        dec.enter_child()?;
        parse_reflected(dec, child, Some(field.number()))?;
        dec.leave_child();
        return Ok(());
    }
    let len = dec.read_varint()? as usize;
    dec.check_len(len, "sub-message")?;
    let old_limit = dec.limit;
    dec.limit = dec.pos + len;
    dec.enter_child()?;
    parse_reflected(dec, child, None)?;
    dec.leave_child();
    dec.limit = old_limit;
    Ok(())
}

fn append_reflected_enum<'a>(
    msg: &mut DynamicMessage<'a>,
    field: &FieldDescriptor,
    entry: &crate::table::FieldEntry,
    raw: u64,
) -> Result<()> {
    let value = raw as u32 as i32;
    let enum_desc = field
        .enum_type()
        .ok_or_else(|| Error::internal("enum type failed to load"))?;
    let accepted = !enum_desc.is_closed() || enum_desc.values().any(|v| v.number() == value);
    if !accepted {
        msg.unknown.push_varint(field.number(), raw);
        return Ok(());
    }
    msg.word_list(entry.slot as usize).push(value as u32 as u64);
    Ok(())
}

fn parse_reflected_map_entry<'a>(
    dec: &mut Decoder<'a, '_>,
    msg: &mut DynamicMessage<'a>,
    field: &FieldDescriptor,
    entry: &crate::table::FieldEntry,
) -> Result<()> {
    let entry_desc = field
        .message_type()
        .ok_or_else(|| Error::internal("map entry type failed to load"))?;
    let len = dec.read_varint()? as usize;
    dec.check_len(len, "map entry")?;
    let mut entry_msg = DynamicMessage::new(entry_desc, dec.arena);
    let old_limit = dec.limit;
    dec.limit = dec.pos + len;
    dec.enter_child()?;
    parse_reflected(dec, &mut entry_msg, None)?;
    dec.leave_child();
    dec.limit = old_limit;

    let table = entry_msg.table().clone();
    let key = match table.find_field(1) {
        Some(key_entry) => super::decode::map_key_from_cell(
            key_entry.ty,
            &entry_msg.cells[key_entry.slot as usize],
        ),
        None => crate::message::MapKey::I32(0),
    };
    let value_cell = match table.find_field(2) {
        Some(value_entry) => std::mem::replace(
            &mut entry_msg.cells[value_entry.slot as usize],
            Cell::Empty,
        ),
        None => Cell::Empty,
    };
    msg.map_cell(entry.slot as usize).insert(key, value_cell);
    Ok(())
}

/// Serializes a message using descriptor-driven traversal: fields in
/// ascending number order, map entries in key order, unknown fields last.
pub fn encode_with_descriptor(msg: &DynamicMessage<'_>, buf: &mut impl BufMut) -> Result<()> {
    let mut out = Vec::with_capacity(reflected_len(msg)?);
    emit_reflected_body(msg, &mut out)?;
    buf.put_slice(&out);
    Ok(())
}

/// Computes the encoded size of a message by descriptor traversal.
pub fn reflected_len(msg: &DynamicMessage<'_>) -> Result<usize> {
    // The reflection path trades the size stack for recomputation; it sizes
    // by serializing sub-messages into scratch space.
    let mut scratch = Vec::new();
    emit_reflected_body(msg, &mut scratch)?;
    Ok(scratch.len())
}

fn emit_reflected_body(msg: &DynamicMessage<'_>, out: &mut Vec<u8>) -> Result<()> {
    for field in msg.descriptor().fields() {
        if !msg.has_field(&field) {
            continue;
        }
        let entry = msg.table().fields[field.index() as usize];
        let cell = &msg.cells[entry.slot as usize];
        emit_reflected_field(msg, &field, cell, out)?;
    }
    out.extend_from_slice(msg.unknown.as_bytes());
    Ok(())
}

fn emit_tag(out: &mut Vec<u8>, number: u32, wire_type: WireType) {
    wire::put_varint(out, wire::make_tag(number, wire_type) as u64);
}

fn emit_scalar(out: &mut Vec<u8>, ty: Type, word: u64) {
    match ty {
        Type::Fixed32 | Type::Sfixed32 | Type::Float => out.put_u32_le(word as u32),
        Type::Fixed64 | Type::Sfixed64 | Type::Double => out.put_u64_le(word),
        Type::Int32 | Type::Enum => {
            wire::put_varint(out, (word as u32 as i32) as i64 as u64);
        }
        Type::Sint32 => wire::put_varint(out, wire::zigzag_encode32(word as u32 as i32) as u64),
        Type::Sint64 => wire::put_varint(out, wire::zigzag_encode64(word as i64)),
        _ => wire::put_varint(out, word),
    }
}

fn emit_length_prefixed(out: &mut Vec<u8>, number: u32, payload: &[u8]) {
    emit_tag(out, number, WireType::Len);
    wire::put_varint(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

fn emit_reflected_field(
    msg: &DynamicMessage<'_>,
    field: &FieldDescriptor,
    cell: &Cell<'_>,
    out: &mut Vec<u8>,
) -> Result<()> {
    let number = field.number();
    let ty = field.kind();
    match cell {
        Cell::Empty => {}
        Cell::Word(word) => {
            emit_tag(out, number, natural_wire_type(ty, false));
            emit_scalar(out, ty, *word);
        }
        Cell::Chunk(chunk) => emit_length_prefixed(out, number, chunk),
        Cell::Message(child) => {
            let mut body = Vec::new();
            emit_reflected_body(child, &mut body)?;
            if ty == Type::Group {
                emit_tag(out, number, WireType::StartGroup);
                out.extend_from_slice(&body);
                emit_tag(out, number, WireType::EndGroup);
            } else {
                emit_length_prefixed(out, number, &body);
            }
        }
        Cell::WordList(list) => {
            if field.is_packed() {
                let mut payload = Vec::new();
                for &word in list.iter() {
                    emit_scalar(&mut payload, ty, word);
                }
                emit_length_prefixed(out, number, &payload);
            } else {
                for &word in list.iter() {
                    emit_tag(out, number, natural_wire_type(ty, false));
                    emit_scalar(out, ty, word);
                }
            }
        }
        Cell::ChunkList(list) => {
            for chunk in list.iter() {
                emit_length_prefixed(out, number, chunk);
            }
        }
        Cell::MessageList(list) => {
            for child in list {
                let mut body = Vec::new();
                emit_reflected_body(child, &mut body)?;
                if ty == Type::Group {
                    emit_tag(out, number, WireType::StartGroup);
                    out.extend_from_slice(&body);
                    emit_tag(out, number, WireType::EndGroup);
                } else {
                    emit_length_prefixed(out, number, &body);
                }
            }
        }
        Cell::Map(map) => {
            let entry_desc = field
                .message_type()
                .ok_or_else(|| Error::internal("map entry type failed to load"))?;
            let entry_table = entry_desc.mini_table();
            let key_ty = entry_table
                .fields
                .first()
                .map(|f| f.ty)
                .unwrap_or(Type::Int32);
            let value_ty = entry_table.fields.get(1).map(|f| f.ty).unwrap_or(Type::Int32);

            for (key, value) in map {
                let mut body = Vec::new();
                match key {
                    crate::message::MapKey::Str(s) => emit_length_prefixed(&mut body, 1, s.as_bytes()),
                    key => {
                        emit_tag(&mut body, 1, natural_wire_type(key_ty, false));
                        let word = match key {
                            crate::message::MapKey::Bool(v) => *v as u64,
                            crate::message::MapKey::I32(v) => *v as u32 as u64,
                            crate::message::MapKey::I64(v) => *v as u64,
                            crate::message::MapKey::U32(v) => *v as u64,
                            crate::message::MapKey::U64(v) => *v,
                            crate::message::MapKey::Str(_) => 0,
                        };
                        emit_scalar(&mut body, key_ty, word);
                    }
                }
                match value {
                    Cell::Word(word) => {
                        emit_tag(&mut body, 2, natural_wire_type(value_ty, false));
                        emit_scalar(&mut body, value_ty, *word);
                    }
                    Cell::Chunk(chunk) => emit_length_prefixed(&mut body, 2, chunk),
                    Cell::Message(child) => {
                        let mut child_body = Vec::new();
                        emit_reflected_body(child, &mut child_body)?;
                        emit_length_prefixed(&mut body, 2, &child_body);
                    }
                    _ => {}
                }
                emit_length_prefixed(out, number, &body);
            }
        }
    }
    Ok(())
}
