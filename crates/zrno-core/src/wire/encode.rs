//! The two-pass wire serializer.
//!
//! The first pass walks the message computing every sub-message's byte size
//! into a preorder size stack (the stand-in for the cached-size word of the
//! table layout); the second pass walks the identical order, consuming the
//! stack to write length prefixes up front, so output is a single forward
//! pass with no backpatching.
//!
//! Deterministic mode emits fields in strictly ascending field-number order
//! with extensions interleaved by number, and map entries sorted by key;
//! unknown fields always come last, in preserved order. Non-deterministic
//! mode emits declared fields first and extensions after, which is the
//! storage order.

use bytes::BufMut;

use crate::error::{Error, Result};
use crate::message::{Cell, DynamicMessage, MapKey};
use crate::schema::field_descriptor_proto::Type;
use crate::table::{natural_wire_type, FieldEntry, RepMode};
use crate::wire::{self, WireType};

/// Serializer configuration.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Sort map entries by key and interleave extensions in field-number
    /// order, yielding byte-identical output for logically equal messages
    pub deterministic: bool,
}

/// Computes the encoded size of a message in bytes.
pub fn encoded_len(msg: &DynamicMessage<'_>) -> Result<usize> {
    let encoder = Encoder {
        options: EncodeOptions::default(),
    };
    let mut sizes = Vec::new();
    encoder.body_size(msg, &mut sizes)
}

/// Serializes a message to a fresh vector.
pub fn encode_to_vec(msg: &DynamicMessage<'_>) -> Result<Vec<u8>> {
    encode_to_vec_with_options(msg, &EncodeOptions::default())
}

/// [`encode_to_vec`] with explicit options.
pub fn encode_to_vec_with_options(
    msg: &DynamicMessage<'_>,
    options: &EncodeOptions,
) -> Result<Vec<u8>> {
    let encoder = Encoder {
        options: options.clone(),
    };
    let mut sizes = Vec::new();
    let total = encoder.body_size(msg, &mut sizes)?;
    let mut buf = Vec::with_capacity(total);
    let mut cursor = 0;
    encoder.emit_body(msg, &mut buf, &sizes, &mut cursor)?;
    debug_assert_eq!(buf.len(), total);
    Ok(buf)
}

/// Serializes a message into the provided buffer.
pub fn encode(msg: &DynamicMessage<'_>, buf: &mut impl BufMut) -> Result<()> {
    encode_with_options(msg, buf, &EncodeOptions::default())
}

/// [`encode`] with explicit options.
pub fn encode_with_options(
    msg: &DynamicMessage<'_>,
    buf: &mut impl BufMut,
    options: &EncodeOptions,
) -> Result<()> {
    let bytes = encode_to_vec_with_options(msg, options)?;
    buf.put_slice(&bytes);
    Ok(())
}

/// The varint bit pattern a stored word serializes as, per type.
fn varint_repr(ty: Type, word: u64) -> u64 {
    match ty {
        // int32 and enum sign-extend to 64 bits on the wire.
        Type::Int32 | Type::Enum => (word as u32 as i32) as i64 as u64,
        Type::Sint32 => wire::zigzag_encode32(word as u32 as i32) as u64,
        Type::Sint64 => wire::zigzag_encode64(word as i64),
        _ => word,
    }
}

fn scalar_value_len(ty: Type, word: u64) -> usize {
    match ty {
        Type::Fixed32 | Type::Sfixed32 | Type::Float => 4,
        Type::Fixed64 | Type::Sfixed64 | Type::Double => 8,
        ty => wire::varint_len(varint_repr(ty, word)),
    }
}

fn emit_scalar_value(buf: &mut Vec<u8>, ty: Type, word: u64) {
    match ty {
        Type::Fixed32 | Type::Sfixed32 | Type::Float => {
            buf.put_u32_le(word as u32);
        }
        Type::Fixed64 | Type::Sfixed64 | Type::Double => {
            buf.put_u64_le(word);
        }
        ty => wire::put_varint(buf, varint_repr(ty, word)),
    }
}

fn tag_len(number: u32, wire_type: WireType) -> usize {
    wire::varint_len(wire::make_tag(number, wire_type) as u64)
}

fn emit_tag(buf: &mut Vec<u8>, number: u32, wire_type: WireType) {
    wire::put_varint(buf, wire::make_tag(number, wire_type) as u64);
}

fn chunk_field_len(number: u32, chunk: &[u8]) -> usize {
    tag_len(number, WireType::Len) + wire::varint_len(chunk.len() as u64) + chunk.len()
}

fn emit_chunk_field(buf: &mut Vec<u8>, number: u32, chunk: &[u8]) {
    emit_tag(buf, number, WireType::Len);
    wire::put_varint(buf, chunk.len() as u64);
    buf.put_slice(chunk);
}

/// A map key's stored word, or its chunk for string keys. The declared key
/// type of the entry table decides the wire encoding.
fn map_key_parts<'k>(key: &MapKey<'k>) -> (u64, Option<&'k [u8]>) {
    match key {
        MapKey::Bool(v) => (*v as u64, None),
        MapKey::I32(v) => (*v as u32 as u64, None),
        MapKey::I64(v) => (*v as u64, None),
        MapKey::U32(v) => (*v as u64, None),
        MapKey::U64(v) => (*v, None),
        MapKey::Str(s) => (0, Some(s.as_bytes())),
    }
}

struct Encoder {
    options: EncodeOptions,
}

enum Item<'m, 'a> {
    Field(FieldEntry),
    Ext(&'m crate::message::ExtensionEntry<'a>, Type),
}

impl Encoder {
    /// The emission-ordered items of a message: present fields, plus
    /// extensions, interleaved by number in deterministic mode.
    fn items<'m, 'a>(&self, msg: &'m DynamicMessage<'a>) -> Result<Vec<Item<'m, 'a>>> {
        let table = msg.table();
        let mut fields: Vec<Item<'m, 'a>> = table
            .fields
            .iter()
            .filter(|entry| msg.entry_present(entry))
            .map(|entry| Item::Field(*entry))
            .collect();

        let pool = msg.descriptor().pool();
        let mut exts: Vec<(u32, Item<'m, 'a>)> = Vec::with_capacity(msg.extensions.len());
        for ext in &msg.extensions {
            let desc = crate::pool::ExtensionDescriptor::from_ids(pool, ext.ids.0, ext.ids.1)
                .ok_or_else(|| Error::internal("extension type failed to load"))?;
            exts.push((ext.number, Item::Ext(ext, desc.kind())));
        }

        if self.options.deterministic {
            exts.sort_by_key(|(number, _)| *number);
            let mut merged = Vec::with_capacity(fields.len() + exts.len());
            let mut ext_iter = exts.into_iter().peekable();
            for item in fields.drain(..) {
                let number = match &item {
                    Item::Field(entry) => entry.number,
                    Item::Ext(ext, _) => ext.number,
                };
                while ext_iter
                    .peek()
                    .map(|(ext_number, _)| *ext_number < number)
                    .unwrap_or(false)
                {
                    let (_, ext_item) = ext_iter
                        .next()
                        .unwrap_or_else(|| unreachable!("peek said more"));
                    merged.push(ext_item);
                }
                merged.push(item);
            }
            merged.extend(ext_iter.map(|(_, item)| item));
            Ok(merged)
        } else {
            fields.extend(exts.into_iter().map(|(_, item)| item));
            Ok(fields)
        }
    }

    fn body_size(&self, msg: &DynamicMessage<'_>, sizes: &mut Vec<usize>) -> Result<usize> {
        let mut total = 0;
        for item in self.items(msg)? {
            total += match item {
                Item::Field(entry) => self.field_size(msg, &entry, sizes)?,
                Item::Ext(ext, ty) => self.cell_field_size(ext.number, ty, &ext.cell, sizes)?,
            };
        }
        total += msg.unknown.len();
        Ok(total)
    }

    fn emit_body(
        &self,
        msg: &DynamicMessage<'_>,
        buf: &mut Vec<u8>,
        sizes: &[usize],
        cursor: &mut usize,
    ) -> Result<()> {
        for item in self.items(msg)? {
            match item {
                Item::Field(entry) => self.emit_field(msg, &entry, buf, sizes, cursor)?,
                Item::Ext(ext, ty) => {
                    self.emit_cell_field(ext.number, ty, &ext.cell, buf, sizes, cursor)?
                }
            }
        }
        buf.put_slice(msg.unknown.as_bytes());
        Ok(())
    }

    /// Size of one declared field, in emission form.
    fn field_size(
        &self,
        msg: &DynamicMessage<'_>,
        entry: &FieldEntry,
        sizes: &mut Vec<usize>,
    ) -> Result<usize> {
        let cell = &msg.cells[entry.slot as usize];
        match entry.rep {
            RepMode::Scalar | RepMode::Optional | RepMode::Oneof => {
                self.cell_field_size(entry.number, entry.ty, cell, sizes)
            }
            RepMode::Repeated => match cell {
                Cell::WordList(list) => Ok(list
                    .iter()
                    .map(|&word| {
                        tag_len(entry.number, natural_wire_type(entry.ty, false))
                            + scalar_value_len(entry.ty, word)
                    })
                    .sum()),
                Cell::ChunkList(list) => Ok(list
                    .iter()
                    .map(|chunk| chunk_field_len(entry.number, chunk))
                    .sum()),
                Cell::MessageList(list) => {
                    let mut total = 0;
                    for child in list {
                        total += self.child_field_size(entry, child, sizes)?;
                    }
                    Ok(total)
                }
                _ => Ok(0),
            },
            RepMode::Packed => match cell {
                Cell::WordList(list) => {
                    let payload: usize = list
                        .iter()
                        .map(|&word| scalar_value_len(entry.ty, word))
                        .sum();
                    Ok(tag_len(entry.number, WireType::Len)
                        + wire::varint_len(payload as u64)
                        + payload)
                }
                // Packed preference only applies to numeric scalars; any
                // other storage serializes in expanded form.
                Cell::ChunkList(list) => Ok(list
                    .iter()
                    .map(|chunk| chunk_field_len(entry.number, chunk))
                    .sum()),
                Cell::MessageList(list) => {
                    let mut total = 0;
                    for child in list {
                        total += self.child_field_size(entry, child, sizes)?;
                    }
                    Ok(total)
                }
                _ => Ok(0),
            },
            RepMode::Map => match cell {
                Cell::Map(map) => {
                    let (key_ty, value_ty) = self.map_entry_types(msg, entry)?;
                    let mut total = 0;
                    for (key, value) in map {
                        total +=
                            self.map_entry_size(entry.number, key, key_ty, value_ty, value, sizes)?;
                    }
                    Ok(total)
                }
                _ => Ok(0),
            },
        }
    }

    fn emit_field(
        &self,
        msg: &DynamicMessage<'_>,
        entry: &FieldEntry,
        buf: &mut Vec<u8>,
        sizes: &[usize],
        cursor: &mut usize,
    ) -> Result<()> {
        let cell = &msg.cells[entry.slot as usize];
        match entry.rep {
            RepMode::Scalar | RepMode::Optional | RepMode::Oneof => {
                self.emit_cell_field(entry.number, entry.ty, cell, buf, sizes, cursor)
            }
            RepMode::Repeated => match cell {
                Cell::WordList(list) => {
                    let wire_type = natural_wire_type(entry.ty, false);
                    for &word in list.iter() {
                        emit_tag(buf, entry.number, wire_type);
                        emit_scalar_value(buf, entry.ty, word);
                    }
                    Ok(())
                }
                Cell::ChunkList(list) => {
                    for chunk in list.iter() {
                        emit_chunk_field(buf, entry.number, chunk);
                    }
                    Ok(())
                }
                Cell::MessageList(list) => {
                    for child in list {
                        self.emit_child_field(entry, child, buf, sizes, cursor)?;
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
            RepMode::Packed => match cell {
                Cell::WordList(list) => {
                    let payload: usize = list
                        .iter()
                        .map(|&word| scalar_value_len(entry.ty, word))
                        .sum();
                    emit_tag(buf, entry.number, WireType::Len);
                    wire::put_varint(buf, payload as u64);
                    for &word in list.iter() {
                        emit_scalar_value(buf, entry.ty, word);
                    }
                    Ok(())
                }
                Cell::ChunkList(list) => {
                    for chunk in list.iter() {
                        emit_chunk_field(buf, entry.number, chunk);
                    }
                    Ok(())
                }
                Cell::MessageList(list) => {
                    for child in list {
                        self.emit_child_field(entry, child, buf, sizes, cursor)?;
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
            RepMode::Map => match cell {
                Cell::Map(map) => {
                    let (key_ty, value_ty) = self.map_entry_types(msg, entry)?;
                    for (key, value) in map {
                        self.emit_map_entry(
                            entry.number,
                            key,
                            key_ty,
                            value_ty,
                            value,
                            buf,
                            sizes,
                            cursor,
                        )?;
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
        }
    }

    /// Size of one singular value cell, tag included.
    fn cell_field_size(
        &self,
        number: u32,
        ty: Type,
        cell: &Cell<'_>,
        sizes: &mut Vec<usize>,
    ) -> Result<usize> {
        Ok(match cell {
            Cell::Empty => 0,
            Cell::Word(word) => {
                tag_len(number, natural_wire_type(ty, false)) + scalar_value_len(ty, *word)
            }
            Cell::Chunk(chunk) => chunk_field_len(number, chunk),
            Cell::Message(child) => {
                if ty == Type::Group {
                    let index = sizes.len();
                    sizes.push(0);
                    let body = self.body_size(child, sizes)?;
                    sizes[index] = body;
                    tag_len(number, WireType::StartGroup)
                        + body
                        + tag_len(number, WireType::EndGroup)
                } else {
                    let index = sizes.len();
                    sizes.push(0);
                    let body = self.body_size(child, sizes)?;
                    sizes[index] = body;
                    tag_len(number, WireType::Len) + wire::varint_len(body as u64) + body
                }
            }
            _ => 0,
        })
    }

    fn emit_cell_field(
        &self,
        number: u32,
        ty: Type,
        cell: &Cell<'_>,
        buf: &mut Vec<u8>,
        sizes: &[usize],
        cursor: &mut usize,
    ) -> Result<()> {
        match cell {
            Cell::Empty => {}
            Cell::Word(word) => {
                emit_tag(buf, number, natural_wire_type(ty, false));
                emit_scalar_value(buf, ty, *word);
            }
            Cell::Chunk(chunk) => emit_chunk_field(buf, number, chunk),
            Cell::Message(child) => {
                let body = sizes[*cursor];
                *cursor += 1;
                if ty == Type::Group {
                    emit_tag(buf, number, WireType::StartGroup);
                    self.emit_body(child, buf, sizes, cursor)?;
                    emit_tag(buf, number, WireType::EndGroup);
                } else {
                    emit_tag(buf, number, WireType::Len);
                    wire::put_varint(buf, body as u64);
                    self.emit_body(child, buf, sizes, cursor)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn child_field_size(
        &self,
        entry: &FieldEntry,
        child: &DynamicMessage<'_>,
        sizes: &mut Vec<usize>,
    ) -> Result<usize> {
        let index = sizes.len();
        sizes.push(0);
        let body = self.body_size(child, sizes)?;
        sizes[index] = body;
        Ok(if entry.ty == Type::Group {
            tag_len(entry.number, WireType::StartGroup)
                + body
                + tag_len(entry.number, WireType::EndGroup)
        } else {
            tag_len(entry.number, WireType::Len) + wire::varint_len(body as u64) + body
        })
    }

    fn emit_child_field(
        &self,
        entry: &FieldEntry,
        child: &DynamicMessage<'_>,
        buf: &mut Vec<u8>,
        sizes: &[usize],
        cursor: &mut usize,
    ) -> Result<()> {
        let body = sizes[*cursor];
        *cursor += 1;
        if entry.ty == Type::Group {
            emit_tag(buf, entry.number, WireType::StartGroup);
            self.emit_body(child, buf, sizes, cursor)?;
            emit_tag(buf, entry.number, WireType::EndGroup);
        } else {
            emit_tag(buf, entry.number, WireType::Len);
            wire::put_varint(buf, body as u64);
            self.emit_body(child, buf, sizes, cursor)?;
        }
        Ok(())
    }

    /// The declared key and value types of a map field's entry table.
    fn map_entry_types(&self, msg: &DynamicMessage<'_>, entry: &FieldEntry) -> Result<(Type, Type)> {
        let table_id = entry
            .sub_message
            .ok_or_else(|| Error::internal("map field without an entry table"))?;
        let pool = msg.descriptor().pool();
        let table = pool
            .inner()
            .mini_table(table_id)
            .ok_or_else(|| Error::internal("map entry table failed to load"))?;
        match (table.fields.first(), table.fields.get(1)) {
            (Some(key), Some(value)) => Ok((key.ty, value.ty)),
            _ => Err(Error::internal("malformed map entry table")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn map_entry_parts_size(
        &self,
        key: &MapKey<'_>,
        key_ty: Type,
        value_ty: Type,
        value: &Cell<'_>,
        sizes: &mut Vec<usize>,
    ) -> Result<usize> {
        let (key_word, key_chunk) = map_key_parts(key);
        let key_size = match key_chunk {
            Some(chunk) => chunk_field_len(1, chunk),
            None => tag_len(1, natural_wire_type(key_ty, false)) + scalar_value_len(key_ty, key_word),
        };
        let value_size = self.cell_field_size(2, value_ty, value, sizes)?;
        Ok(key_size + value_size)
    }

    #[allow(clippy::too_many_arguments)]
    fn map_entry_size(
        &self,
        number: u32,
        key: &MapKey<'_>,
        key_ty: Type,
        value_ty: Type,
        value: &Cell<'_>,
        sizes: &mut Vec<usize>,
    ) -> Result<usize> {
        let index = sizes.len();
        sizes.push(0);
        let body = self.map_entry_parts_size(key, key_ty, value_ty, value, sizes)?;
        sizes[index] = body;
        Ok(tag_len(number, WireType::Len) + wire::varint_len(body as u64) + body)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_map_entry(
        &self,
        number: u32,
        key: &MapKey<'_>,
        key_ty: Type,
        value_ty: Type,
        value: &Cell<'_>,
        buf: &mut Vec<u8>,
        sizes: &[usize],
        cursor: &mut usize,
    ) -> Result<()> {
        let body = sizes[*cursor];
        *cursor += 1;
        emit_tag(buf, number, WireType::Len);
        wire::put_varint(buf, body as u64);

        let (key_word, key_chunk) = map_key_parts(key);
        match key_chunk {
            Some(chunk) => emit_chunk_field(buf, 1, chunk),
            None => {
                emit_tag(buf, 1, natural_wire_type(key_ty, false));
                emit_scalar_value(buf, key_ty, key_word);
            }
        }
        self.emit_cell_field(2, value_ty, value, buf, sizes, cursor)?;
        Ok(())
    }
}
