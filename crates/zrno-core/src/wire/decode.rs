//! The tag-dispatched wire parser.
//!
//! Input is a borrowed byte range; output is a [`DynamicMessage`] allocated
//! on the caller's arena. Dispatch is two-tiered: the low five bits of each
//! decoded tag index the message's fast table, and a full-tag match runs the
//! specialized op; everything else (repeated fields, packed runs, groups,
//! enums with closed semantics, extensions, unknown fields) takes the
//! generic path, which looks fields up through the MiniTable's dense/binary
//! search.
//!
//! Bounds discipline: the reader tracks a `limit` index that sub-messages
//! push and pop; every read checks against it, which is the slice-native
//! rendition of the C epsilon-copy stream (same limits, same errors, no slop
//! reads).
//!
//! In copy mode ([`decode`]) the input is staged into the arena once up
//! front and all string/bytes cells alias the staged copy; in alias mode
//! ([`decode_aliased`]) they alias the caller's buffer directly, which the
//! signature pins to outlive the arena borrow.

use tracing::trace;

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::message::{Cell, DynamicMessage, MapKey};
use crate::pool::{DescriptorPool, MessageDescriptor};
use crate::schema::field_descriptor_proto::Type;
use crate::table::{EnumId, FastOp, FieldEntry, RepMode, TableId};
use crate::wire::{self, WireType, MAX_FIELD_NUMBER};

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Maximum sub-message nesting depth before `DepthExceeded`
    pub recursion_limit: usize,
    /// Optional cap on bytes the parse may retain (chunks and message
    /// storage); exceeding it fails with `OutOfMemory`
    pub alloc_budget: Option<usize>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            recursion_limit: 100,
            alloc_budget: None,
        }
    }
}

/// Parses a message, copying the input into the arena first so the result
/// does not borrow `bytes`.
pub fn decode<'a>(
    desc: &MessageDescriptor,
    arena: &'a Arena,
    bytes: &[u8],
) -> Result<DynamicMessage<'a>> {
    decode_with_options(desc, arena, bytes, &DecodeOptions::default())
}

/// [`decode`] with explicit options.
pub fn decode_with_options<'a>(
    desc: &MessageDescriptor,
    arena: &'a Arena,
    bytes: &[u8],
    options: &DecodeOptions,
) -> Result<DynamicMessage<'a>> {
    // One staging copy; every chunk cell below is a view into it.
    let staged = arena.alloc_bytes(bytes);
    decode_aliased_with_options(desc, arena, staged, options)
}

/// Parses a message with string and bytes cells aliasing the input buffer.
/// The borrow requires `bytes` to outlive the arena borrow, which is the
/// caller's lifetime assertion.
pub fn decode_aliased<'a>(
    desc: &MessageDescriptor,
    arena: &'a Arena,
    bytes: &'a [u8],
) -> Result<DynamicMessage<'a>> {
    decode_aliased_with_options(desc, arena, bytes, &DecodeOptions::default())
}

/// [`decode_aliased`] with explicit options.
pub fn decode_aliased_with_options<'a>(
    desc: &MessageDescriptor,
    arena: &'a Arena,
    bytes: &'a [u8],
    options: &DecodeOptions,
) -> Result<DynamicMessage<'a>> {
    let mut msg = DynamicMessage::new(desc.clone(), arena);
    let pool = desc.pool().clone();
    let mut decoder = Decoder::new(&pool, arena, bytes, options);
    decoder.parse_message(&mut msg, None)?;
    Ok(msg)
}

pub(crate) struct Decoder<'a, 'p> {
    pub buf: &'a [u8],
    pub pos: usize,
    pub limit: usize,
    pub depth: usize,
    depth_limit: usize,
    budget: Option<usize>,
    budget_total: usize,
    pub pool: &'p DescriptorPool,
    pub arena: &'a Arena,
}

impl<'a, 'p> Decoder<'a, 'p> {
    pub(crate) fn new(
        pool: &'p DescriptorPool,
        arena: &'a Arena,
        bytes: &'a [u8],
        options: &DecodeOptions,
    ) -> Self {
        Decoder {
            buf: bytes,
            pos: 0,
            limit: bytes.len(),
            depth: options.recursion_limit,
            depth_limit: options.recursion_limit,
            budget: options.alloc_budget,
            budget_total: options.alloc_budget.unwrap_or(0),
            pool,
            arena,
        }
    }

    fn charge(&mut self, bytes: usize) -> Result<()> {
        if let Some(remaining) = &mut self.budget {
            if *remaining < bytes {
                return Err(Error::OutOfMemory {
                    budget: self.budget_total,
                });
            }
            *remaining -= bytes;
        }
        Ok(())
    }

    pub(crate) fn at_limit(&self) -> bool {
        self.pos >= self.limit
    }

    /// Verifies that `len` announced bytes fit before the current limit,
    /// overflow included.
    pub(crate) fn check_len(&self, len: usize, what: &str) -> Result<()> {
        match self.pos.checked_add(len) {
            Some(end) if end <= self.limit => Ok(()),
            _ => Err(Error::truncated(self.pos, what)),
        }
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64> {
        let slice = &self.buf[self.pos..self.limit];
        if slice.is_empty() {
            return Err(Error::truncated(self.pos, "varint"));
        }
        match wire::decode_varint(slice, self.pos) {
            Ok((value, len)) => {
                self.pos += len;
                Ok(value)
            }
            Err(err) => {
                // Distinguish truncation from a genuinely over-long varint:
                // fewer than ten bytes remaining, all with continuation bits.
                if slice.len() < 10 && slice.iter().all(|b| b & 0x80 != 0) {
                    Err(Error::truncated(self.pos, "varint"))
                } else {
                    Err(err)
                }
            }
        }
    }

    pub(crate) fn read_fixed32(&mut self) -> Result<u32> {
        if self.pos + 4 > self.limit {
            return Err(Error::truncated(self.pos, "fixed32"));
        }
        let bytes: [u8; 4] = self.buf[self.pos..self.pos + 4]
            .try_into()
            .unwrap_or_default();
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    pub(crate) fn read_fixed64(&mut self) -> Result<u64> {
        if self.pos + 8 > self.limit {
            return Err(Error::truncated(self.pos, "fixed64"));
        }
        let bytes: [u8; 8] = self.buf[self.pos..self.pos + 8]
            .try_into()
            .unwrap_or_default();
        self.pos += 8;
        Ok(u64::from_le_bytes(bytes))
    }

    pub(crate) fn read_chunk(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        self.check_len(len, "length-delimited field")?;
        self.charge(len)?;
        let chunk = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(chunk)
    }

    pub(crate) fn read_tag(&mut self) -> Result<(u32, WireType)> {
        let offset = self.pos;
        let raw = self.read_varint()?;
        let number = raw >> 3;
        let wire_bits = (raw & 7) as u8;
        if number == 0 || number > MAX_FIELD_NUMBER as u64 {
            return Err(Error::TagOutOfRange {
                offset,
                field_number: number as u32,
                wire_type: wire_bits,
            });
        }
        let wire_type = WireType::from_tag_bits(wire_bits, offset, number as u32)?;
        Ok((number as u32, wire_type))
    }

    pub(crate) fn check_utf8(&self, chunk: &[u8], offset: usize) -> Result<()> {
        if std::str::from_utf8(chunk).is_err() {
            return Err(Error::Utf8Invalid { offset });
        }
        Ok(())
    }

    pub(crate) fn normalize_varint(ty: Type, raw: u64) -> u64 {
        match ty {
            Type::Bool => (raw != 0) as u64,
            Type::Int32 | Type::Uint32 | Type::Enum => raw as u32 as u64,
            Type::Sint32 => wire::zigzag_decode32(raw as u32) as u32 as u64,
            Type::Sint64 => wire::zigzag_decode64(raw) as u64,
            _ => raw,
        }
    }

    fn child_descriptor(&self, table_id: TableId) -> Result<MessageDescriptor> {
        MessageDescriptor::from_ids(self.pool, table_id.file, table_id.index)
            .ok_or_else(|| Error::internal("sub-message type failed to load"))
    }

    pub(crate) fn enum_accepts(&self, id: EnumId, value: i32) -> Result<bool> {
        self.pool
            .inner()
            .enum_table(id)
            .map(|table| table.accepts(value))
            .ok_or_else(|| Error::internal("enum type failed to load"))
    }

    /// Parses fields until the current limit, or until the end tag of
    /// `group` if this is a group body.
    pub(crate) fn parse_message(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        group: Option<u32>,
    ) -> Result<()> {
        while !self.at_limit() {
            let tag_start = self.pos;
            let (number, wire_type) = self.read_tag()?;

            if wire_type == WireType::EndGroup {
                if group == Some(number) {
                    return Ok(());
                }
                return Err(Error::UnterminatedGroup {
                    offset: tag_start,
                    field_number: number,
                });
            }

            let tag = wire::make_tag(number, wire_type);
            if let Some(slot) = msg.table().fast_slot(tag) {
                let (op, field_index) = (slot.op, slot.field as usize);
                let entry = msg.table().fields[field_index];
                self.run_fast_op(msg, &entry, op)?;
                continue;
            }

            self.slow_path(msg, number, wire_type, tag_start)?;
        }

        if let Some(number) = group {
            return Err(Error::UnterminatedGroup {
                offset: self.limit,
                field_number: number,
            });
        }
        Ok(())
    }

    fn run_fast_op(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        entry: &FieldEntry,
        op: FastOp,
    ) -> Result<()> {
        let cell = match op {
            FastOp::Varint => {
                let raw = self.read_varint()?;
                Cell::Word(Self::normalize_varint(entry.ty, raw))
            }
            FastOp::ZigZag32 => {
                let raw = self.read_varint()?;
                Cell::Word(wire::zigzag_decode32(raw as u32) as u32 as u64)
            }
            FastOp::ZigZag64 => {
                let raw = self.read_varint()?;
                Cell::Word(wire::zigzag_decode64(raw) as u64)
            }
            FastOp::Fixed32 => Cell::Word(self.read_fixed32()? as u64),
            FastOp::Fixed64 => Cell::Word(self.read_fixed64()?),
            FastOp::Chunk => {
                let offset = self.pos;
                let chunk = self.read_chunk()?;
                if entry.validate_utf8 {
                    self.check_utf8(chunk, offset)?;
                }
                Cell::Chunk(chunk)
            }
            FastOp::Message => {
                return self.parse_length_prefixed_child(msg, entry);
            }
        };
        msg.mark_present(entry);
        msg.cells[entry.slot as usize] = cell;
        Ok(())
    }

    /// Parses a length-prefixed sub-message into the field's (possibly
    /// pre-existing) child message.
    fn parse_length_prefixed_child(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        entry: &FieldEntry,
    ) -> Result<()> {
        let len = self.read_varint()? as usize;
        self.check_len(len, "sub-message")?;
        let table_id = entry
            .sub_message
            .ok_or_else(|| Error::internal("message field without a sub-table"))?;
        self.charge(64)?;

        msg.mark_present(entry);
        let slot = entry.slot as usize;
        if !matches!(msg.cells[slot], Cell::Message(_)) {
            let child_desc = self.child_descriptor(table_id)?;
            msg.cells[slot] =
                Cell::Message(Box::new(DynamicMessage::new(child_desc, self.arena)));
        }

        let old_limit = self.limit;
        self.limit = self.pos + len;
        self.enter_child()?;
        {
            let Cell::Message(child) = &mut msg.cells[slot] else {
                unreachable!("slot was just set to a message cell");
            };
            self.parse_message(child, None)?;
        }
        self.leave_child();
        self.limit = old_limit;
        Ok(())
    }

    pub(crate) fn enter_child(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::DepthExceeded {
                limit: self.depth_limit,
            });
        }
        self.depth -= 1;
        Ok(())
    }

    pub(crate) fn leave_child(&mut self) {
        self.depth += 1;
    }

    fn slow_path(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        number: u32,
        wire_type: WireType,
        tag_start: usize,
    ) -> Result<()> {
        let entry = msg.table().find_field(number).copied();
        match entry {
            Some(entry) => self.parse_known_field(msg, &entry, wire_type, tag_start),
            None => {
                if msg.table().in_extension_range(number) {
                    if let Some(ext) = self
                        .pool
                        .find_extension_by_number(msg.descriptor().full_name(), number)
                    {
                        return self.parse_extension(msg, &ext, wire_type, tag_start);
                    }
                }
                self.save_unknown(msg, wire_type, tag_start, number)
            }
        }
    }

    fn parse_known_field(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        entry: &FieldEntry,
        wire_type: WireType,
        tag_start: usize,
    ) -> Result<()> {
        use crate::table::natural_wire_type;

        match entry.rep {
            RepMode::Scalar | RepMode::Optional | RepMode::Oneof => {
                if wire_type != natural_wire_type(entry.ty, false) {
                    // Wire-type mismatch is not an error; the data is
                    // preserved as an unknown field.
                    return self.save_unknown(msg, wire_type, tag_start, entry.number);
                }
                match entry.ty {
                    Type::Group => {
                        return self.parse_group_child(msg, entry);
                    }
                    Type::Message => {
                        return self.parse_length_prefixed_child(msg, entry);
                    }
                    Type::Enum => {
                        let raw = self.read_varint()?;
                        let value = raw as u32 as i32;
                        let id = entry
                            .sub_enum
                            .ok_or_else(|| Error::internal("enum field without an enum table"))?;
                        if !self.enum_accepts(id, value)? {
                            trace!(number = entry.number, value, "closed enum miss");
                            msg.unknown.push_varint(entry.number, raw);
                            return Ok(());
                        }
                        msg.mark_present(entry);
                        msg.cells[entry.slot as usize] = Cell::Word(value as u32 as u64);
                        return Ok(());
                    }
                    Type::String | Type::Bytes => {
                        let offset = self.pos;
                        let chunk = self.read_chunk()?;
                        if entry.validate_utf8 {
                            self.check_utf8(chunk, offset)?;
                        }
                        msg.mark_present(entry);
                        msg.cells[entry.slot as usize] = Cell::Chunk(chunk);
                        return Ok(());
                    }
                    _ => {
                        let word = self.read_scalar_word(entry.ty)?;
                        msg.mark_present(entry);
                        msg.cells[entry.slot as usize] = Cell::Word(word);
                        return Ok(());
                    }
                }
            }
            RepMode::Repeated | RepMode::Packed => {
                self.parse_repeated(msg, entry, wire_type, tag_start)
            }
            RepMode::Map => {
                if wire_type != WireType::Len {
                    return self.save_unknown(msg, wire_type, tag_start, entry.number);
                }
                self.parse_map_entry(msg, entry)
            }
        }
    }

    pub(crate) fn read_scalar_word(&mut self, ty: Type) -> Result<u64> {
        Ok(match ty {
            Type::Fixed32 | Type::Sfixed32 | Type::Float => self.read_fixed32()? as u64,
            Type::Fixed64 | Type::Sfixed64 | Type::Double => self.read_fixed64()?,
            ty => {
                let raw = self.read_varint()?;
                Self::normalize_varint(ty, raw)
            }
        })
    }

    fn parse_repeated(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        entry: &FieldEntry,
        wire_type: WireType,
        tag_start: usize,
    ) -> Result<()> {
        use crate::table::natural_wire_type;
        let scalar_wire = natural_wire_type(entry.ty, false);

        match entry.ty {
            Type::String | Type::Bytes => {
                if wire_type != WireType::Len {
                    return self.save_unknown(msg, wire_type, tag_start, entry.number);
                }
                let offset = self.pos;
                let chunk = self.read_chunk()?;
                if entry.validate_utf8 {
                    self.check_utf8(chunk, offset)?;
                }
                msg.chunk_list(entry.slot as usize).push(chunk);
                Ok(())
            }
            Type::Message => {
                if wire_type != WireType::Len {
                    return self.save_unknown(msg, wire_type, tag_start, entry.number);
                }
                self.parse_repeated_child(msg, entry)
            }
            Type::Group => {
                if wire_type != WireType::StartGroup {
                    return self.save_unknown(msg, wire_type, tag_start, entry.number);
                }
                self.parse_repeated_group_child(msg, entry)
            }
            Type::Enum => match wire_type {
                w if w == scalar_wire => {
                    let raw = self.read_varint()?;
                    self.append_enum(msg, entry, raw)
                }
                WireType::Len => {
                    let end = self.packed_run_end()?;
                    while self.pos < end {
                        let raw = self.read_varint_below(end)?;
                        self.append_enum(msg, entry, raw)?;
                    }
                    Ok(())
                }
                _ => self.save_unknown(msg, wire_type, tag_start, entry.number),
            },
            // Packable numeric scalars: accept both the expanded and packed
            // encodings regardless of the field's output preference.
            ty => match wire_type {
                w if w == scalar_wire => {
                    let word = self.read_scalar_word(ty)?;
                    msg.word_list(entry.slot as usize).push(word);
                    Ok(())
                }
                WireType::Len => {
                    let end = self.packed_run_end()?;
                    while self.pos < end {
                        let word = match ty {
                            Type::Fixed32 | Type::Sfixed32 | Type::Float => {
                                self.read_fixed32()? as u64
                            }
                            Type::Fixed64 | Type::Sfixed64 | Type::Double => self.read_fixed64()?,
                            ty => Self::normalize_varint(ty, self.read_varint_below(end)?),
                        };
                        msg.word_list(entry.slot as usize).push(word);
                    }
                    Ok(())
                }
                _ => self.save_unknown(msg, wire_type, tag_start, entry.number),
            },
        }
    }

    fn packed_run_end(&mut self) -> Result<usize> {
        let len = self.read_varint()? as usize;
        self.check_len(len, "packed run")?;
        self.charge(len)?;
        Ok(self.pos + len)
    }

    /// Reads a varint that must terminate before `end` (inside a packed
    /// run).
    fn read_varint_below(&mut self, end: usize) -> Result<u64> {
        let saved_limit = self.limit;
        self.limit = end;
        let result = self.read_varint();
        self.limit = saved_limit;
        result
    }

    fn append_enum(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        entry: &FieldEntry,
        raw: u64,
    ) -> Result<()> {
        let value = raw as u32 as i32;
        let id = entry
            .sub_enum
            .ok_or_else(|| Error::internal("enum field without an enum table"))?;
        if !self.enum_accepts(id, value)? {
            msg.unknown.push_varint(entry.number, raw);
            return Ok(());
        }
        msg.word_list(entry.slot as usize).push(value as u32 as u64);
        Ok(())
    }

    fn parse_repeated_child(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        entry: &FieldEntry,
    ) -> Result<()> {
        let len = self.read_varint()? as usize;
        self.check_len(len, "sub-message")?;
        let table_id = entry
            .sub_message
            .ok_or_else(|| Error::internal("message field without a sub-table"))?;
        self.charge(64)?;
        let child_desc = self.child_descriptor(table_id)?;
        let mut child = DynamicMessage::new(child_desc, self.arena);

        let old_limit = self.limit;
        self.limit = self.pos + len;
        self.enter_child()?;
        self.parse_message(&mut child, None)?;
        self.leave_child();
        self.limit = old_limit;

        msg.message_list(entry.slot as usize).push(child);
        Ok(())
    }

    fn parse_group_child(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        entry: &FieldEntry,
    ) -> Result<()> {
        let table_id = entry
            .sub_message
            .ok_or_else(|| Error::internal("group field without a sub-table"))?;
        self.charge(64)?;

        msg.mark_present(entry);
        let slot = entry.slot as usize;
        if !matches!(msg.cells[slot], Cell::Message(_)) {
            let child_desc = self.child_descriptor(table_id)?;
            msg.cells[slot] =
                Cell::Message(Box::new(DynamicMessage::new(child_desc, self.arena)));
        }

        self.enter_child()?;
        {
            let Cell::Message(child) = &mut msg.cells[slot] else {
                unreachable!("slot was just set to a message cell");
            };
            self.parse_message(child, Some(entry.number))?;
        }
        self.leave_child();
        Ok(())
    }

    fn parse_repeated_group_child(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        entry: &FieldEntry,
    ) -> Result<()> {
        let table_id = entry
            .sub_message
            .ok_or_else(|| Error::internal("group field without a sub-table"))?;
        self.charge(64)?;
        let child_desc = self.child_descriptor(table_id)?;
        let mut child = DynamicMessage::new(child_desc, self.arena);
        self.enter_child()?;
        self.parse_message(&mut child, Some(entry.number))?;
        self.leave_child();
        msg.message_list(entry.slot as usize).push(child);
        Ok(())
    }

    fn parse_map_entry(&mut self, msg: &mut DynamicMessage<'a>, entry: &FieldEntry) -> Result<()> {
        let table_id = entry
            .sub_message
            .ok_or_else(|| Error::internal("map field without an entry table"))?;
        let len = self.read_varint()? as usize;
        self.check_len(len, "map entry")?;
        self.charge(64)?;
        let entry_desc = self.child_descriptor(table_id)?;
        let mut entry_msg = DynamicMessage::new(entry_desc, self.arena);

        let old_limit = self.limit;
        self.limit = self.pos + len;
        self.enter_child()?;
        self.parse_message(&mut entry_msg, None)?;
        self.leave_child();
        self.limit = old_limit;

        // Entry tables are validated to have the key at number 1 and the
        // value at number 2; either may be absent on the wire and defaults.
        let table = entry_msg.table().clone();
        let key_entry = table.find_field(1);
        let value_entry = table.find_field(2);

        let key = match key_entry {
            Some(key_entry) => {
                let cell = &entry_msg.cells[key_entry.slot as usize];
                map_key_from_cell(key_entry.ty, cell)
            }
            None => MapKey::I32(0),
        };
        let value_cell = match value_entry {
            Some(value_entry) => std::mem::replace(
                &mut entry_msg.cells[value_entry.slot as usize],
                Cell::Empty,
            ),
            None => Cell::Empty,
        };

        msg.map_cell(entry.slot as usize).insert(key, value_cell);
        Ok(())
    }

    fn parse_extension(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        ext: &crate::pool::ExtensionDescriptor,
        wire_type: WireType,
        tag_start: usize,
    ) -> Result<()> {
        use crate::table::natural_wire_type;
        let ty = ext.kind();
        let number = ext.number();

        // Extensions are parsed on the generic path; repeated extensions
        // and groups fall back to the unknown store.
        if matches!(ty, Type::Group) || wire_type != natural_wire_type(ty, false) {
            return self.save_unknown(msg, wire_type, tag_start, number);
        }
        let cell = match ty {
            Type::String | Type::Bytes => {
                let chunk = self.read_chunk()?;
                Cell::Chunk(chunk)
            }
            Type::Message => {
                let len = self.read_varint()? as usize;
                self.check_len(len, "extension sub-message")?;
                let child_desc = ext
                    .message_type()
                    .ok_or_else(|| Error::internal("extension message type failed to load"))?;
                self.charge(64)?;
                let mut child = DynamicMessage::new(child_desc, self.arena);
                let old_limit = self.limit;
                self.limit = self.pos + len;
                self.enter_child()?;
                self.parse_message(&mut child, None)?;
                self.leave_child();
                self.limit = old_limit;
                Cell::Message(Box::new(child))
            }
            ty => Cell::Word(self.read_scalar_word(ty)?),
        };
        msg.set_extension_cell(number, ext.ids(), cell);
        Ok(())
    }

    /// Skips a field's payload and preserves its verbatim bytes, tag
    /// included, in the unknown-field store.
    pub(crate) fn save_unknown(
        &mut self,
        msg: &mut DynamicMessage<'a>,
        wire_type: WireType,
        tag_start: usize,
        number: u32,
    ) -> Result<()> {
        self.skip_value(wire_type, number)?;
        let record = &self.buf[tag_start..self.pos];
        self.charge(record.len())?;
        msg.unknown.push_record(record);
        trace!(number, ?wire_type, len = record.len(), "unknown field preserved");
        Ok(())
    }

    fn skip_value(&mut self, wire_type: WireType, number: u32) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::I64 => {
                self.read_fixed64()?;
            }
            WireType::I32 => {
                self.read_fixed32()?;
            }
            WireType::Len => {
                let len = self.read_varint()? as usize;
                self.check_len(len, "length-delimited field")?;
                self.pos += len;
            }
            WireType::StartGroup => {
                self.enter_child()?;
                loop {
                    if self.at_limit() {
                        return Err(Error::UnterminatedGroup {
                            offset: self.limit,
                            field_number: number,
                        });
                    }
                    let (inner_number, inner_type) = self.read_tag()?;
                    if inner_type == WireType::EndGroup {
                        if inner_number == number {
                            break;
                        }
                        return Err(Error::UnterminatedGroup {
                            offset: self.pos,
                            field_number: inner_number,
                        });
                    }
                    self.skip_value(inner_type, inner_number)?;
                }
                self.leave_child();
            }
            WireType::EndGroup => {
                return Err(Error::UnterminatedGroup {
                    offset: self.pos,
                    field_number: number,
                });
            }
        }
        Ok(())
    }
}

pub(crate) fn map_key_from_cell<'a>(ty: Type, cell: &Cell<'a>) -> MapKey<'a> {
    match cell {
        Cell::Word(word) => match ty {
            Type::Bool => MapKey::Bool(*word != 0),
            Type::Int32 | Type::Sint32 | Type::Sfixed32 => MapKey::I32(*word as u32 as i32),
            Type::Int64 | Type::Sint64 | Type::Sfixed64 => MapKey::I64(*word as i64),
            Type::Uint32 | Type::Fixed32 => MapKey::U32(*word as u32),
            _ => MapKey::U64(*word),
        },
        Cell::Chunk(chunk) => MapKey::Str(std::str::from_utf8(chunk).unwrap_or("")),
        _ => match ty {
            Type::Bool => MapKey::Bool(false),
            Type::String => MapKey::Str(""),
            Type::Int32 | Type::Sint32 | Type::Sfixed32 => MapKey::I32(0),
            Type::Int64 | Type::Sint64 | Type::Sfixed64 => MapKey::I64(0),
            Type::Uint32 | Type::Fixed32 => MapKey::U32(0),
            _ => MapKey::U64(0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Value;
    use crate::schema::field_descriptor_proto::{Label, Type as T};
    use crate::schema::{self, DescriptorProto, FieldDescriptorProto};

    fn field(name: &str, number: i32, ty: T) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(Label::Optional as i32),
            r#type: Some(ty as i32),
            ..Default::default()
        }
    }

    fn pool() -> DescriptorPool {
        let mut pool = DescriptorPool::new();
        let file = schema::FileDescriptorProto {
            name: Some("decode_test.proto".to_string()),
            package: Some("dt".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("M".to_string()),
                field: vec![
                    field("x", 1, T::Int64),
                    {
                        let mut f = field("v", 2, T::Int32);
                        f.label = Some(Label::Repeated as i32);
                        f
                    },
                    field("name", 3, T::String),
                    {
                        let mut f = field("child", 4, T::Message);
                        f.type_name = Some(".dt.M".to_string());
                        f
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        pool.add_file_proto(file).unwrap();
        pool
    }

    #[test]
    fn test_varint_field_negative_one() {
        // int64 x = 1 set to -1: tag 0x08 followed by a ten-byte varint.
        let bytes = [
            0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01,
        ];
        let pool = pool();
        let desc = pool.find_message_by_name("dt.M").unwrap();
        let arena = Arena::new();
        let msg = decode(&desc, &arena, &bytes).unwrap();
        let x = desc.field_by_name("x").unwrap();
        assert_eq!(msg.get(&x).unwrap(), Value::I64(-1));
    }

    #[test]
    fn test_packed_and_expanded_both_accepted() {
        let pool = pool();
        let desc = pool.find_message_by_name("dt.M").unwrap();
        let v = desc.field_by_name("v").unwrap();
        let arena = Arena::new();

        // Packed: tag 0x12, length 7, varints 1, 300, 100000.
        let packed = [0x12, 0x06, 0x01, 0xAC, 0x02, 0xA0, 0x8D, 0x06];
        let msg = decode(&desc, &arena, &packed).unwrap();
        let values: Vec<_> = msg.repeated_values(&v).collect();
        assert_eq!(
            values,
            vec![Value::I32(1), Value::I32(300), Value::I32(100_000)]
        );

        // Expanded: one varint record per element, tag 0x10.
        let expanded = [0x10, 0x01, 0x10, 0xAC, 0x02];
        let msg = decode(&desc, &arena, &expanded).unwrap();
        let values: Vec<_> = msg.repeated_values(&v).collect();
        assert_eq!(values, vec![Value::I32(1), Value::I32(300)]);
    }

    #[test]
    fn test_string_field_and_utf8() {
        let pool = pool();
        let desc = pool.find_message_by_name("dt.M").unwrap();
        let name = desc.field_by_name("name").unwrap();
        let arena = Arena::new();

        let bytes = [0x1A, 0x02, b'h', b'i'];
        let msg = decode(&desc, &arena, &bytes).unwrap();
        assert_eq!(msg.get(&name).unwrap(), Value::String("hi"));

        // proto3 strings verify UTF-8; 0xFF is invalid.
        let bad = [0x1A, 0x01, 0xFF];
        assert!(matches!(
            decode(&desc, &arena, &bad),
            Err(Error::Utf8Invalid { .. })
        ));
    }

    #[test]
    fn test_nested_message_and_depth_limit() {
        let pool = pool();
        let desc = pool.find_message_by_name("dt.M").unwrap();
        let arena = Arena::new();

        // Chain of nested `child` messages: innermost carries x = 5.
        fn nest(depth: usize) -> Vec<u8> {
            if depth == 0 {
                return vec![0x08, 0x05];
            }
            let inner = nest(depth - 1);
            let mut out = vec![0x22, inner.len() as u8];
            out.extend(inner);
            out
        }

        let shallow = nest(3);
        let msg = decode(&desc, &arena, &shallow).unwrap();
        let child = desc.field_by_name("child").unwrap();
        assert!(msg.get_message(&child).is_some());

        let options = DecodeOptions {
            recursion_limit: 10,
            alloc_budget: None,
        };
        let at_limit = nest(10);
        assert!(decode_with_options(&desc, &arena, &at_limit, &options).is_ok());
        let beyond = nest(11);
        assert!(matches!(
            decode_with_options(&desc, &arena, &beyond, &options),
            Err(Error::DepthExceeded { .. })
        ));
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let pool = pool();
        let desc = pool.find_message_by_name("dt.M").unwrap();
        let arena = Arena::new();

        // Field 107 (varint) is not in the schema.
        let bytes = [0x08, 0x01, 0xD8, 0x06, 0x2A];
        let msg = decode(&desc, &arena, &bytes).unwrap();
        assert_eq!(msg.unknown_fields().as_bytes(), &[0xD8, 0x06, 0x2A]);
    }

    #[test]
    fn test_truncated_input() {
        let pool = pool();
        let desc = pool.find_message_by_name("dt.M").unwrap();
        let arena = Arena::new();
        // String field announces 5 bytes but only 2 follow.
        let bytes = [0x1A, 0x05, b'h', b'i'];
        assert!(matches!(
            decode(&desc, &arena, &bytes),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_alloc_budget() {
        let pool = pool();
        let desc = pool.find_message_by_name("dt.M").unwrap();
        let arena = Arena::new();
        let mut bytes = vec![0x1A, 64];
        bytes.extend(std::iter::repeat(b'a').take(64));
        let options = DecodeOptions {
            recursion_limit: 100,
            alloc_budget: Some(16),
        };
        assert!(matches!(
            decode_with_options(&desc, &arena, &bytes, &options),
            Err(Error::OutOfMemory { budget: 16 })
        ));
    }

    #[test]
    fn test_aliased_decode_borrows_input() {
        let pool = pool();
        let desc = pool.find_message_by_name("dt.M").unwrap();
        let arena = Arena::new();
        let bytes = vec![0x1A, 0x02, b'o', b'k'];
        let msg = decode_aliased(&desc, &arena, &bytes).unwrap();
        let name = desc.field_by_name("name").unwrap();
        let Value::String(s) = msg.get(&name).unwrap() else {
            panic!("expected a string value");
        };
        // The chunk aliases the input buffer rather than the arena.
        let input_range = bytes.as_ptr() as usize..bytes.as_ptr() as usize + bytes.len();
        assert!(input_range.contains(&(s.as_ptr() as usize)));
    }
}
