//! Arena-backed dynamic messages.
//!
//! A [`DynamicMessage`] is a message buffer shaped by its type's
//! [`MiniTable`](crate::table::MiniTable): hasbit words, one case word per
//! oneof, and one value cell per field, with string and bytes payloads
//! borrowed from the arena the message was constructed on. Reflection-style
//! accessors read and write fields through [`FieldDescriptor`]s; the wire
//! codecs in [`crate::wire`] fill and walk the same shape.

mod merge;
mod unknown;

pub use unknown::{UnknownFieldIter, UnknownFields};

use std::collections::BTreeMap;

use crate::arena::{Arena, ArenaVec};
use crate::error::{Error, Result};
use crate::pool::{DefaultValue, ExtensionDescriptor, FieldDescriptor, MessageDescriptor, OneofDescriptor};
use crate::schema::field_descriptor_proto::Type;
use crate::table::{FieldEntry, MiniTable, RepMode};

/// A typed map key. Keys inside one map are homogeneous; the ordering is
/// numeric for integral keys and lexicographic for strings, which is exactly
/// the order the deterministic serializer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey<'a> {
    /// bool key
    Bool(bool),
    /// int32/sint32/sfixed32 key
    I32(i32),
    /// int64/sint64/sfixed64 key
    I64(i64),
    /// uint32/fixed32 key
    U32(u32),
    /// uint64/fixed64 key
    U64(u64),
    /// string key
    Str(&'a str),
}

/// A scalar field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// bool value
    Bool(bool),
    /// int32/sint32/sfixed32 value
    I32(i32),
    /// int64/sint64/sfixed64 value
    I64(i64),
    /// uint32/fixed32 value
    U32(u32),
    /// uint64/fixed64 value
    U64(u64),
    /// float value
    F32(f32),
    /// double value
    F64(f64),
    /// enum value, by number
    EnumNumber(i32),
    /// string value
    String(&'a str),
    /// bytes value
    Bytes(&'a [u8]),
}

/// One value slot of a message buffer.
#[derive(Debug)]
pub(crate) enum Cell<'a> {
    /// Nothing stored
    Empty,
    /// Any fixed-width scalar, bit-packed into a word
    Word(u64),
    /// String or bytes payload
    Chunk(&'a [u8]),
    /// Singular sub-message
    Message(Box<DynamicMessage<'a>>),
    /// Repeated scalar storage
    WordList(ArenaVec<'a, u64>),
    /// Repeated string/bytes storage
    ChunkList(ArenaVec<'a, &'a [u8]>),
    /// Repeated sub-messages
    MessageList(Vec<DynamicMessage<'a>>),
    /// Map storage, ordered by key
    Map(BTreeMap<MapKey<'a>, Cell<'a>>),
}

impl PartialEq for Cell<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Empty, Cell::Empty) => true,
            (Cell::Word(a), Cell::Word(b)) => a == b,
            (Cell::Chunk(a), Cell::Chunk(b)) => a == b,
            (Cell::Message(a), Cell::Message(b)) => a == b,
            (Cell::WordList(a), Cell::WordList(b)) => a[..] == b[..],
            (Cell::ChunkList(a), Cell::ChunkList(b)) => a[..] == b[..],
            (Cell::MessageList(a), Cell::MessageList(b)) => a == b,
            (Cell::Map(a), Cell::Map(b)) => a == b,
            _ => false,
        }
    }
}

/// Packs a scalar into its word representation. 32-bit values occupy the low
/// bits; floats are stored as their bit patterns.
pub(crate) fn word_from_value(value: &Value<'_>) -> u64 {
    match value {
        Value::Bool(v) => *v as u64,
        Value::I32(v) => *v as u32 as u64,
        Value::I64(v) => *v as u64,
        Value::U32(v) => *v as u64,
        Value::U64(v) => *v,
        Value::F32(v) => v.to_bits() as u64,
        Value::F64(v) => v.to_bits(),
        Value::EnumNumber(v) => *v as u32 as u64,
        Value::String(_) | Value::Bytes(_) => 0,
    }
}

/// Unpacks a word back into a typed scalar.
pub(crate) fn value_from_word(ty: Type, word: u64) -> Value<'static> {
    match ty {
        Type::Bool => Value::Bool(word != 0),
        Type::Int32 | Type::Sint32 | Type::Sfixed32 => Value::I32(word as u32 as i32),
        Type::Int64 | Type::Sint64 | Type::Sfixed64 => Value::I64(word as i64),
        Type::Uint32 | Type::Fixed32 => Value::U32(word as u32),
        Type::Uint64 | Type::Fixed64 => Value::U64(word),
        Type::Float => Value::F32(f32::from_bits(word as u32)),
        Type::Double => Value::F64(f64::from_bits(word)),
        Type::Enum => Value::EnumNumber(word as u32 as i32),
        Type::String | Type::Bytes | Type::Message | Type::Group => Value::Bool(false),
    }
}

fn default_word(ty: Type, default: &DefaultValue) -> u64 {
    match default {
        DefaultValue::Unset => 0,
        DefaultValue::Bool(v) => *v as u64,
        DefaultValue::I32(v) => *v as u32 as u64,
        DefaultValue::I64(v) => *v as u64,
        DefaultValue::U32(v) => *v as u64,
        DefaultValue::U64(v) => *v,
        DefaultValue::F32(v) => v.to_bits() as u64,
        DefaultValue::F64(v) => v.to_bits(),
        DefaultValue::Enum(v) => *v as u32 as u64,
        DefaultValue::String(_) | DefaultValue::Bytes(_) => {
            let _ = ty;
            0
        }
    }
}

/// A set extension value attached to a message.
#[derive(Debug, PartialEq)]
pub(crate) struct ExtensionEntry<'a> {
    pub number: u32,
    /// `(file, extension index)` in the pool
    pub ids: (u32, u32),
    pub cell: Cell<'a>,
}

/// An arena-allocated message of a dynamically loaded type.
#[derive(Debug)]
pub struct DynamicMessage<'a> {
    desc: MessageDescriptor,
    arena: &'a Arena,
    pub(crate) hasbits: Vec<u64>,
    pub(crate) oneof_cases: Vec<u32>,
    pub(crate) cells: Vec<Cell<'a>>,
    pub(crate) unknown: UnknownFields<'a>,
    pub(crate) extensions: Vec<ExtensionEntry<'a>>,
}

impl<'a> DynamicMessage<'a> {
    /// Constructs an empty message of the given type on `arena`.
    pub fn new(desc: MessageDescriptor, arena: &'a Arena) -> Self {
        let table = desc.mini_table();
        let size = table.size as usize;
        let hasbit_words = table.hasbit_words as usize;
        let oneof_count = table.oneof_count as usize;
        DynamicMessage {
            desc,
            arena,
            hasbits: vec![0; hasbit_words],
            oneof_cases: vec![0; oneof_count],
            cells: (0..size).map(|_| Cell::Empty).collect(),
            unknown: UnknownFields::new(arena),
            extensions: Vec::new(),
        }
    }

    /// Returns the message's descriptor.
    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.desc
    }

    /// Returns the arena the message allocates from.
    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    pub(crate) fn table(&self) -> &MiniTable {
        self.desc.mini_table()
    }

    /// The MiniTable entry of a field; entries and descriptor fields share
    /// the sorted-by-number order.
    fn entry_of(&self, field: &FieldDescriptor) -> Result<FieldEntry> {
        if field.containing_message() != &self.desc {
            return Err(Error::type_mismatch(format!(
                "field '{}' does not belong to '{}'",
                field.full_name(),
                self.desc.full_name()
            )));
        }
        Ok(self.table().fields[field.index() as usize])
    }

    pub(crate) fn hasbit(&self, bit: u32) -> bool {
        self.hasbits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
    }

    pub(crate) fn set_hasbit(&mut self, bit: u32) {
        self.hasbits[(bit / 64) as usize] |= 1 << (bit % 64);
    }

    pub(crate) fn clear_hasbit(&mut self, bit: u32) {
        self.hasbits[(bit / 64) as usize] &= !(1 << (bit % 64));
    }

    /// Marks a field present, clearing a previously set member of the same
    /// oneof, sub-message ownership included.
    pub(crate) fn mark_present(&mut self, entry: &FieldEntry) {
        match entry.rep {
            RepMode::Optional => {
                if let Some(bit) = entry.hasbit {
                    self.set_hasbit(bit);
                }
            }
            RepMode::Oneof => {
                if let Some(oneof) = entry.oneof {
                    let case = self.oneof_cases[oneof as usize];
                    if case != 0 && case != entry.number {
                        if let Some(previous) = self.table().find_field(case) {
                            let slot = previous.slot as usize;
                            self.cells[slot] = Cell::Empty;
                        }
                    }
                    self.oneof_cases[oneof as usize] = entry.number;
                }
            }
            _ => {}
        }
    }

    pub(crate) fn entry_present(&self, entry: &FieldEntry) -> bool {
        match entry.rep {
            RepMode::Optional => entry.hasbit.map(|bit| self.hasbit(bit)).unwrap_or(false),
            RepMode::Oneof => entry
                .oneof
                .map(|oneof| self.oneof_cases[oneof as usize] == entry.number)
                .unwrap_or(false),
            RepMode::Scalar => match &self.cells[entry.slot as usize] {
                Cell::Empty => false,
                Cell::Word(word) => *word != 0,
                Cell::Chunk(chunk) => !chunk.is_empty(),
                _ => true,
            },
            RepMode::Repeated | RepMode::Packed => match &self.cells[entry.slot as usize] {
                Cell::Empty => false,
                Cell::WordList(list) => !list.is_empty(),
                Cell::ChunkList(list) => !list.is_empty(),
                Cell::MessageList(list) => !list.is_empty(),
                _ => false,
            },
            RepMode::Map => match &self.cells[entry.slot as usize] {
                Cell::Map(map) => !map.is_empty(),
                _ => false,
            },
        }
    }

    /// Returns true if the field is present: tracked presence for explicit
    /// fields, non-default value for implicit ones, non-empty for repeated
    /// fields and maps.
    pub fn has_field(&self, field: &FieldDescriptor) -> bool {
        self.entry_of(field)
            .map(|entry| self.entry_present(&entry))
            .unwrap_or(false)
    }

    /// Reads a singular scalar, string, bytes, or enum field, falling back
    /// to the field's default when absent.
    pub fn get<'s>(&'s self, field: &'s FieldDescriptor) -> Result<Value<'s>> {
        let entry = self.entry_of(field)?;
        if matches!(entry.ty, Type::Message | Type::Group) {
            return Err(Error::type_mismatch(format!(
                "'{}' is a message field; use get_message",
                field.full_name()
            )));
        }
        if matches!(entry.rep, RepMode::Repeated | RepMode::Packed | RepMode::Map) {
            return Err(Error::type_mismatch(format!(
                "'{}' is repeated; use the repeated accessors",
                field.full_name()
            )));
        }

        if self.entry_present(&entry) {
            return Ok(match &self.cells[entry.slot as usize] {
                Cell::Word(word) => value_from_word(entry.ty, *word),
                Cell::Chunk(chunk) => chunk_value(entry.ty, chunk),
                // Presence without storage only happens for implicit-zero
                // scalars, which report absent above.
                _ => self.default_of(field, &entry),
            });
        }
        Ok(self.default_of(field, &entry))
    }

    fn default_of<'s>(&'s self, field: &'s FieldDescriptor, entry: &FieldEntry) -> Value<'s> {
        match field.default_value() {
            DefaultValue::String(s) => Value::String(s),
            DefaultValue::Bytes(b) => Value::Bytes(b),
            DefaultValue::Unset => match entry.ty {
                Type::String => Value::String(""),
                Type::Bytes => Value::Bytes(b""),
                Type::Enum => Value::EnumNumber(
                    field.enum_type().map(|e| e.default_number()).unwrap_or(0),
                ),
                ty => value_from_word(ty, 0),
            },
            other => value_from_word(entry.ty, default_word(entry.ty, other)),
        }
    }

    /// Writes a singular scalar, string, bytes, or enum field. String and
    /// bytes payloads are copied into the message's arena.
    pub fn set(&mut self, field: &FieldDescriptor, value: Value<'_>) -> Result<()> {
        let entry = self.entry_of(field)?;
        if matches!(entry.rep, RepMode::Repeated | RepMode::Packed | RepMode::Map) {
            return Err(Error::type_mismatch(format!(
                "'{}' is repeated; use push or map_insert",
                field.full_name()
            )));
        }
        let cell = match (entry.ty, &value) {
            (Type::String, Value::String(s)) => Cell::Chunk(self.arena.alloc_bytes(s.as_bytes())),
            (Type::Bytes, Value::Bytes(b)) => Cell::Chunk(self.arena.alloc_bytes(b)),
            (Type::Message | Type::Group, _) => {
                return Err(Error::type_mismatch(format!(
                    "'{}' is a message field; use mutable_message",
                    field.full_name()
                )))
            }
            (ty, value) if scalar_matches(ty, value) => Cell::Word(word_from_value(value)),
            (ty, value) => {
                return Err(Error::type_mismatch(format!(
                    "cannot store {value:?} in {ty:?} field '{}'",
                    field.full_name()
                )))
            }
        };
        self.mark_present(&entry);
        self.cells[entry.slot as usize] = cell;
        Ok(())
    }

    /// Returns the sub-message of a singular message field, if present.
    pub fn get_message(&self, field: &FieldDescriptor) -> Option<&DynamicMessage<'a>> {
        let entry = self.entry_of(field).ok()?;
        if !self.entry_present(&entry) {
            return None;
        }
        match &self.cells[entry.slot as usize] {
            Cell::Message(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the sub-message of a singular message field, creating it
    /// empty if absent.
    pub fn mutable_message(&mut self, field: &FieldDescriptor) -> Result<&mut DynamicMessage<'a>> {
        let entry = self.entry_of(field)?;
        if !matches!(entry.ty, Type::Message | Type::Group)
            || matches!(entry.rep, RepMode::Repeated | RepMode::Packed | RepMode::Map)
        {
            return Err(Error::type_mismatch(format!(
                "'{}' is not a singular message field",
                field.full_name()
            )));
        }
        let child_desc = field.message_type().ok_or_else(|| {
            Error::internal(format!(
                "message type of '{}' failed to load",
                field.full_name()
            ))
        })?;
        self.mark_present(&entry);
        let slot = entry.slot as usize;
        if !matches!(self.cells[slot], Cell::Message(_)) {
            self.cells[slot] = Cell::Message(Box::new(DynamicMessage::new(child_desc, self.arena)));
        }
        match &mut self.cells[slot] {
            Cell::Message(msg) => Ok(msg),
            _ => unreachable!("slot was just set to a message cell"),
        }
    }

    /// Clears a field: presence, value, and oneof case.
    pub fn clear_field(&mut self, field: &FieldDescriptor) -> Result<()> {
        let entry = self.entry_of(field)?;
        if let Some(bit) = entry.hasbit {
            self.clear_hasbit(bit);
        }
        if let Some(oneof) = entry.oneof {
            if self.oneof_cases[oneof as usize] == entry.number {
                self.oneof_cases[oneof as usize] = 0;
            }
        }
        self.cells[entry.slot as usize] = Cell::Empty;
        Ok(())
    }

    /// Number of elements in a repeated field or map.
    pub fn repeated_len(&self, field: &FieldDescriptor) -> usize {
        let Ok(entry) = self.entry_of(field) else {
            return 0;
        };
        match &self.cells[entry.slot as usize] {
            Cell::WordList(list) => list.len(),
            Cell::ChunkList(list) => list.len(),
            Cell::MessageList(list) => list.len(),
            Cell::Map(map) => map.len(),
            _ => 0,
        }
    }

    /// Iterates over the scalar values of a repeated field, in wire order.
    pub fn repeated_values<'s>(
        &'s self,
        field: &'s FieldDescriptor,
    ) -> impl Iterator<Item = Value<'s>> + 's {
        let entry = self.entry_of(field).ok();
        let cell = entry.as_ref().map(|e| &self.cells[e.slot as usize]);
        let ty = entry.as_ref().map(|e| e.ty).unwrap_or(Type::Int32);
        RepeatedIter {
            cell,
            ty,
            index: 0,
        }
    }

    /// Iterates over the messages of a repeated message field.
    pub fn repeated_messages<'s>(
        &'s self,
        field: &'s FieldDescriptor,
    ) -> impl Iterator<Item = &'s DynamicMessage<'a>> + 's {
        let list = match self.entry_of(field).ok().map(|e| &self.cells[e.slot as usize]) {
            Some(Cell::MessageList(list)) => list.as_slice(),
            _ => &[],
        };
        list.iter()
    }

    /// Appends a scalar, string, bytes, or enum value to a repeated field.
    pub fn push(&mut self, field: &FieldDescriptor, value: Value<'_>) -> Result<()> {
        let entry = self.entry_of(field)?;
        if !matches!(entry.rep, RepMode::Repeated | RepMode::Packed) {
            return Err(Error::type_mismatch(format!(
                "'{}' is not repeated",
                field.full_name()
            )));
        }
        let slot = entry.slot as usize;
        match (entry.ty, &value) {
            (Type::String, Value::String(s)) => {
                let chunk = self.arena.alloc_bytes(s.as_bytes());
                self.chunk_list(slot).push(chunk);
            }
            (Type::Bytes, Value::Bytes(b)) => {
                let chunk = self.arena.alloc_bytes(b);
                self.chunk_list(slot).push(chunk);
            }
            (ty, value) if scalar_matches(ty, value) => {
                let word = word_from_value(value);
                self.word_list(slot).push(word);
            }
            (ty, value) => {
                return Err(Error::type_mismatch(format!(
                    "cannot push {value:?} onto {ty:?} field '{}'",
                    field.full_name()
                )))
            }
        }
        Ok(())
    }

    /// Appends an empty message to a repeated message field and returns it.
    pub fn add_message(&mut self, field: &FieldDescriptor) -> Result<&mut DynamicMessage<'a>> {
        let entry = self.entry_of(field)?;
        if !matches!(entry.rep, RepMode::Repeated | RepMode::Packed)
            || !matches!(entry.ty, Type::Message | Type::Group)
        {
            return Err(Error::type_mismatch(format!(
                "'{}' is not a repeated message field",
                field.full_name()
            )));
        }
        let child_desc = field.message_type().ok_or_else(|| {
            Error::internal(format!(
                "message type of '{}' failed to load",
                field.full_name()
            ))
        })?;
        let child = DynamicMessage::new(child_desc, self.arena);
        let slot = entry.slot as usize;
        let list = self.message_list(slot);
        list.push(child);
        Ok(list.last_mut().unwrap_or_else(|| unreachable!("just pushed")))
    }

    /// Inserts a scalar-valued map entry, copying string payloads into the
    /// arena. Existing entries with the same key are replaced.
    pub fn map_insert(
        &mut self,
        field: &FieldDescriptor,
        key: MapKey<'_>,
        value: Value<'_>,
    ) -> Result<()> {
        let entry = self.entry_of(field)?;
        if entry.rep != RepMode::Map {
            return Err(Error::type_mismatch(format!(
                "'{}' is not a map field",
                field.full_name()
            )));
        }
        let key = self.intern_key(key);
        let cell = match value {
            Value::String(s) => Cell::Chunk(self.arena.alloc_bytes(s.as_bytes())),
            Value::Bytes(b) => Cell::Chunk(self.arena.alloc_bytes(b)),
            scalar => Cell::Word(word_from_value(&scalar)),
        };
        self.map_cell(entry.slot as usize).insert(key, cell);
        Ok(())
    }

    /// Looks up a map entry's scalar value.
    pub fn map_get<'s>(
        &'s self,
        field: &'s FieldDescriptor,
        key: &MapKey<'_>,
    ) -> Option<Value<'s>> {
        let entry = self.entry_of(field).ok()?;
        let Cell::Map(map) = &self.cells[entry.slot as usize] else {
            return None;
        };
        let value_ty = self.map_value_type(field)?;
        let (_, cell) = map.iter().find(|(stored, _)| key_eq(stored, key))?;
        match cell {
            Cell::Word(word) => Some(value_from_word(value_ty, *word)),
            Cell::Chunk(chunk) => Some(chunk_value(value_ty, chunk)),
            _ => None,
        }
    }

    /// Iterates over a map field's entries in key order. Message values are
    /// skipped; use the reflection codec's entry messages for those.
    pub fn map_iter<'s>(
        &'s self,
        field: &'s FieldDescriptor,
    ) -> impl Iterator<Item = (MapKey<'s>, Value<'s>)> + 's {
        let map = match self.entry_of(field).ok().map(|e| &self.cells[e.slot as usize]) {
            Some(Cell::Map(map)) => Some(map),
            _ => None,
        };
        let value_ty = self.map_value_type(field).unwrap_or(Type::Int32);
        map.into_iter().flatten().filter_map(move |(key, cell)| {
            let value = match cell {
                Cell::Word(word) => value_from_word(value_ty, *word),
                Cell::Chunk(chunk) => chunk_value(value_ty, chunk),
                _ => return None,
            };
            Some((*key, value))
        })
    }

    fn map_value_type(&self, field: &FieldDescriptor) -> Option<Type> {
        let entry_desc = field.message_type()?;
        Some(entry_desc.mini_table().fields.get(1)?.ty)
    }

    /// Returns the currently set member of a oneof, if any.
    pub fn oneof_case(&self, oneof: &OneofDescriptor) -> Option<FieldDescriptor> {
        if oneof.is_synthetic() {
            return oneof.fields().next().filter(|f| self.has_field(f));
        }
        // Case words are indexed by real-oneof order.
        let real_index = oneof
            .containing_message()
            .oneofs()
            .filter(|o| !o.is_synthetic())
            .position(|o| &o == oneof)?;
        let case = *self.oneof_cases.get(real_index)?;
        if case == 0 {
            return None;
        }
        self.desc.field(case)
    }

    /// Clears every field, the unknown-field store, and all extensions.
    pub fn clear(&mut self) {
        for word in &mut self.hasbits {
            *word = 0;
        }
        for case in &mut self.oneof_cases {
            *case = 0;
        }
        for cell in &mut self.cells {
            *cell = Cell::Empty;
        }
        self.unknown.clear();
        self.extensions.clear();
    }

    /// Returns true if every required field is set, recursively through
    /// present sub-messages.
    pub fn is_initialized(&self) -> bool {
        let table = self.table();
        for &index in &table.required {
            if !self.entry_present(&table.fields[index as usize]) {
                return false;
            }
        }
        for entry in &table.fields {
            if entry.sub_message.is_none() {
                continue;
            }
            match &self.cells[entry.slot as usize] {
                Cell::Message(msg) => {
                    if self.entry_present(entry) && !msg.is_initialized() {
                        return false;
                    }
                }
                Cell::MessageList(list) => {
                    if list.iter().any(|msg| !msg.is_initialized()) {
                        return false;
                    }
                }
                Cell::Map(map) => {
                    for value in map.values() {
                        if let Cell::Message(msg) = value {
                            if !msg.is_initialized() {
                                return false;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        true
    }

    /// Returns the set fields, in field-number order.
    pub fn list_fields(&self) -> Vec<FieldDescriptor> {
        self.desc
            .fields()
            .filter(|field| self.has_field(field))
            .collect()
    }

    /// Returns the unknown-field store.
    pub fn unknown_fields(&self) -> &UnknownFields<'a> {
        &self.unknown
    }

    /// Serializes the message to bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        crate::wire::encode_to_vec(self)
    }

    /// Serializes the message with deterministic ordering: ascending field
    /// numbers with extensions interleaved, map entries by key.
    pub fn serialize_deterministic(&self) -> Result<Vec<u8>> {
        crate::wire::encode_to_vec_with_options(
            self,
            &crate::wire::EncodeOptions {
                deterministic: true,
            },
        )
    }

    /// Returns the value of a set scalar extension.
    pub fn extension_value<'s>(&'s self, ext: &ExtensionDescriptor) -> Option<Value<'s>> {
        let ids = ext.ids();
        let entry = self.extensions.iter().find(|e| e.ids == ids)?;
        match &entry.cell {
            Cell::Word(word) => Some(value_from_word(ext.kind(), *word)),
            Cell::Chunk(chunk) => Some(chunk_value(ext.kind(), chunk)),
            _ => None,
        }
    }

    /// Sets a scalar extension value.
    pub fn set_extension(&mut self, ext: &ExtensionDescriptor, value: Value<'_>) -> Result<()> {
        let cell = match value {
            Value::String(s) => Cell::Chunk(self.arena.alloc_bytes(s.as_bytes())),
            Value::Bytes(b) => Cell::Chunk(self.arena.alloc_bytes(b)),
            scalar => Cell::Word(word_from_value(&scalar)),
        };
        self.set_extension_cell(ext.number(), ext.ids(), cell);
        Ok(())
    }

    pub(crate) fn set_extension_cell(&mut self, number: u32, ids: (u32, u32), cell: Cell<'a>) {
        if let Some(existing) = self.extensions.iter_mut().find(|e| e.ids == ids) {
            existing.cell = cell;
        } else {
            self.extensions.push(ExtensionEntry { number, ids, cell });
        }
    }

    fn intern_key<'k>(&self, key: MapKey<'k>) -> MapKey<'a> {
        match key {
            MapKey::Str(s) => {
                MapKey::Str(self.arena.alloc_str(s))
            }
            MapKey::Bool(v) => MapKey::Bool(v),
            MapKey::I32(v) => MapKey::I32(v),
            MapKey::I64(v) => MapKey::I64(v),
            MapKey::U32(v) => MapKey::U32(v),
            MapKey::U64(v) => MapKey::U64(v),
        }
    }

    pub(crate) fn word_list(&mut self, slot: usize) -> &mut ArenaVec<'a, u64> {
        if !matches!(self.cells[slot], Cell::WordList(_)) {
            self.cells[slot] = Cell::WordList(self.arena.vec());
        }
        match &mut self.cells[slot] {
            Cell::WordList(list) => list,
            _ => unreachable!("slot was just set to a word list"),
        }
    }

    pub(crate) fn chunk_list(&mut self, slot: usize) -> &mut ArenaVec<'a, &'a [u8]> {
        if !matches!(self.cells[slot], Cell::ChunkList(_)) {
            self.cells[slot] = Cell::ChunkList(self.arena.vec());
        }
        match &mut self.cells[slot] {
            Cell::ChunkList(list) => list,
            _ => unreachable!("slot was just set to a chunk list"),
        }
    }

    pub(crate) fn message_list(&mut self, slot: usize) -> &mut Vec<DynamicMessage<'a>> {
        if !matches!(self.cells[slot], Cell::MessageList(_)) {
            self.cells[slot] = Cell::MessageList(Vec::new());
        }
        match &mut self.cells[slot] {
            Cell::MessageList(list) => list,
            _ => unreachable!("slot was just set to a message list"),
        }
    }

    pub(crate) fn map_cell(&mut self, slot: usize) -> &mut BTreeMap<MapKey<'a>, Cell<'a>> {
        if !matches!(self.cells[slot], Cell::Map(_)) {
            self.cells[slot] = Cell::Map(BTreeMap::new());
        }
        match &mut self.cells[slot] {
            Cell::Map(map) => map,
            _ => unreachable!("slot was just set to a map"),
        }
    }
}

fn chunk_value<'v>(ty: Type, chunk: &'v [u8]) -> Value<'v> {
    match ty {
        Type::String => Value::String(std::str::from_utf8(chunk).unwrap_or("")),
        _ => Value::Bytes(chunk),
    }
}

fn scalar_matches(ty: Type, value: &Value<'_>) -> bool {
    matches!(
        (ty, value),
        (Type::Bool, Value::Bool(_))
            | (Type::Int32 | Type::Sint32 | Type::Sfixed32, Value::I32(_))
            | (Type::Int64 | Type::Sint64 | Type::Sfixed64, Value::I64(_))
            | (Type::Uint32 | Type::Fixed32, Value::U32(_))
            | (Type::Uint64 | Type::Fixed64, Value::U64(_))
            | (Type::Float, Value::F32(_))
            | (Type::Double, Value::F64(_))
            | (Type::Enum, Value::EnumNumber(_))
    )
}

/// Compares a stored (arena-interned) key against a caller-provided one;
/// the lifetimes differ, so the derived `PartialEq` does not apply.
fn key_eq(stored: &MapKey<'_>, key: &MapKey<'_>) -> bool {
    match (stored, key) {
        (MapKey::Bool(a), MapKey::Bool(b)) => a == b,
        (MapKey::I32(a), MapKey::I32(b)) => a == b,
        (MapKey::I64(a), MapKey::I64(b)) => a == b,
        (MapKey::U32(a), MapKey::U32(b)) => a == b,
        (MapKey::U64(a), MapKey::U64(b)) => a == b,
        (MapKey::Str(a), MapKey::Str(b)) => a == b,
        _ => false,
    }
}

struct RepeatedIter<'s, 'a> {
    cell: Option<&'s Cell<'a>>,
    ty: Type,
    index: usize,
}

impl<'s, 'a: 's> Iterator for RepeatedIter<'s, 'a> {
    type Item = Value<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = match self.cell? {
            Cell::WordList(list) => value_from_word(self.ty, *list.get(self.index)?),
            Cell::ChunkList(list) => chunk_value(self.ty, list.get(self.index)?),
            _ => return None,
        };
        self.index += 1;
        Some(value)
    }
}

impl<'a> PartialEq for DynamicMessage<'a> {
    /// Logical equality: same type, same fields set to the same values.
    /// Unknown fields compare by their preserved bytes.
    fn eq(&self, other: &Self) -> bool {
        if self.desc != other.desc {
            return false;
        }
        let table = self.table();
        for entry in &table.fields {
            let this_present = self.entry_present(entry);
            if this_present != other.entry_present(entry) {
                return false;
            }
            if this_present && self.cells[entry.slot as usize] != other.cells[entry.slot as usize]
            {
                return false;
            }
        }
        self.unknown == other.unknown && self.extensions == other.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DescriptorPool;
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

    fn test_pool() -> DescriptorPool {
        let mut pool = DescriptorPool::new();
        let file = schema::FileDescriptorProto {
            name: Some("msg_test.proto".to_string()),
            package: Some("t".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("M".to_string()),
                field: vec![
                    field("num", 1, T::Int64),
                    field("text", 2, T::String),
                    {
                        let mut f = field("child", 3, T::Message);
                        f.type_name = Some(".t.M".to_string());
                        f
                    },
                    {
                        let mut f = field("values", 4, T::Int32);
                        f.label = Some(Label::Repeated as i32);
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
    fn test_scalar_set_get() {
        let pool = test_pool();
        let desc = pool.find_message_by_name("t.M").unwrap();
        let arena = Arena::new();
        let mut msg = DynamicMessage::new(desc.clone(), &arena);

        let num = desc.field_by_name("num").unwrap();
        assert!(!msg.has_field(&num));
        assert_eq!(msg.get(&num).unwrap(), Value::I64(0));

        msg.set(&num, Value::I64(-1)).unwrap();
        assert!(msg.has_field(&num));
        assert_eq!(msg.get(&num).unwrap(), Value::I64(-1));

        msg.clear_field(&num).unwrap();
        assert!(!msg.has_field(&num));
    }

    #[test]
    fn test_string_copied_into_arena() {
        let pool = test_pool();
        let desc = pool.find_message_by_name("t.M").unwrap();
        let arena = Arena::new();
        let mut msg = DynamicMessage::new(desc.clone(), &arena);
        let text = desc.field_by_name("text").unwrap();

        {
            let transient = String::from("short lived");
            msg.set(&text, Value::String(&transient)).unwrap();
        }
        assert_eq!(msg.get(&text).unwrap(), Value::String("short lived"));
    }

    #[test]
    fn test_recursive_message_field() {
        let pool = test_pool();
        let desc = pool.find_message_by_name("t.M").unwrap();
        let arena = Arena::new();
        let mut msg = DynamicMessage::new(desc.clone(), &arena);
        let child_field = desc.field_by_name("child").unwrap();
        let num = desc.field_by_name("num").unwrap();

        assert!(msg.get_message(&child_field).is_none());
        let child = msg.mutable_message(&child_field).unwrap();
        child.set(&num, Value::I64(7)).unwrap();

        let child = msg.get_message(&child_field).unwrap();
        assert_eq!(child.get(&num).unwrap(), Value::I64(7));
        assert!(msg.has_field(&child_field));
    }

    #[test]
    fn test_repeated_push_and_iterate() {
        let pool = test_pool();
        let desc = pool.find_message_by_name("t.M").unwrap();
        let arena = Arena::new();
        let mut msg = DynamicMessage::new(desc.clone(), &arena);
        let values = desc.field_by_name("values").unwrap();

        for v in [1, 300, -5] {
            msg.push(&values, Value::I32(v)).unwrap();
        }
        assert_eq!(msg.repeated_len(&values), 3);
        let collected: Vec<_> = msg.repeated_values(&values).collect();
        assert_eq!(
            collected,
            vec![Value::I32(1), Value::I32(300), Value::I32(-5)]
        );
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let pool = test_pool();
        let desc = pool.find_message_by_name("t.M").unwrap();
        let arena = Arena::new();
        let mut msg = DynamicMessage::new(desc.clone(), &arena);
        let num = desc.field_by_name("num").unwrap();
        assert!(msg.set(&num, Value::Bool(true)).is_err());
    }

    #[test]
    fn test_list_fields_in_number_order() {
        let pool = test_pool();
        let desc = pool.find_message_by_name("t.M").unwrap();
        let arena = Arena::new();
        let mut msg = DynamicMessage::new(desc.clone(), &arena);
        msg.set(&desc.field_by_name("text").unwrap(), Value::String("x"))
            .unwrap();
        msg.set(&desc.field_by_name("num").unwrap(), Value::I64(2))
            .unwrap();
        let set: Vec<u32> = msg.list_fields().iter().map(|f| f.number()).collect();
        assert_eq!(set, vec![1, 2]);
    }
}
