//! Copy, merge, and swap between messages of the same type.

use tracing::trace;

use super::{Cell, DynamicMessage, ExtensionEntry};
use crate::arena::Arena;
use crate::error::{Error, Result};

/// Deep-copies a cell onto another arena; string and bytes chunks are
/// re-allocated there.
fn deep_cell<'b>(cell: &Cell<'_>, arena: &'b Arena) -> Cell<'b> {
    match cell {
        Cell::Empty => Cell::Empty,
        Cell::Word(word) => Cell::Word(*word),
        Cell::Chunk(chunk) => Cell::Chunk(arena.alloc_bytes(chunk)),
        Cell::Message(msg) => Cell::Message(Box::new(msg.clone_onto(arena))),
        Cell::WordList(list) => {
            let mut out = arena.vec_with_capacity(list.len());
            out.extend(list.iter().copied());
            Cell::WordList(out)
        }
        Cell::ChunkList(list) => {
            let mut out = arena.vec_with_capacity(list.len());
            out.extend(list.iter().map(|chunk| arena.alloc_bytes(chunk)));
            Cell::ChunkList(out)
        }
        Cell::MessageList(list) => {
            Cell::MessageList(list.iter().map(|msg| msg.clone_onto(arena)).collect())
        }
        Cell::Map(map) => Cell::Map(
            map.iter()
                .map(|(key, value)| (super::MapKey::deep_clone(key, arena), deep_cell(value, arena)))
                .collect(),
        ),
    }
}

/// Copies a cell onto another arena while sharing chunk storage with the
/// source; requires the source to outlive the target borrow.
fn shared_cell<'a: 'b, 'b>(cell: &Cell<'a>, arena: &'b Arena) -> Cell<'b> {
    match cell {
        Cell::Empty => Cell::Empty,
        Cell::Word(word) => Cell::Word(*word),
        Cell::Chunk(chunk) => Cell::Chunk(chunk),
        Cell::Message(msg) => Cell::Message(Box::new(msg.clone_onto_shared(arena))),
        Cell::WordList(list) => {
            let mut out = arena.vec_with_capacity(list.len());
            out.extend(list.iter().copied());
            Cell::WordList(out)
        }
        Cell::ChunkList(list) => {
            let mut out = arena.vec_with_capacity(list.len());
            out.extend(list.iter().copied());
            Cell::ChunkList(out)
        }
        Cell::MessageList(list) => Cell::MessageList(
            list.iter()
                .map(|msg| msg.clone_onto_shared(arena))
                .collect(),
        ),
        Cell::Map(map) => Cell::Map(
            map.iter()
                .map(|(key, value)| (*key, shared_cell(value, arena)))
                .collect(),
        ),
    }
}

impl<'a> super::MapKey<'a> {
    fn deep_clone<'b>(key: &super::MapKey<'_>, arena: &'b Arena) -> super::MapKey<'b> {
        match key {
            super::MapKey::Str(s) => super::MapKey::Str(arena.alloc_str(s)),
            super::MapKey::Bool(v) => super::MapKey::Bool(*v),
            super::MapKey::I32(v) => super::MapKey::I32(*v),
            super::MapKey::I64(v) => super::MapKey::I64(*v),
            super::MapKey::U32(v) => super::MapKey::U32(*v),
            super::MapKey::U64(v) => super::MapKey::U64(*v),
        }
    }
}

impl<'a> DynamicMessage<'a> {
    fn check_same_type(&self, other: &DynamicMessage<'a>) -> Result<()> {
        if self.desc != other.desc {
            return Err(Error::type_mismatch(format!(
                "cannot combine '{}' with '{}'",
                self.desc.full_name(),
                other.desc.full_name()
            )));
        }
        Ok(())
    }

    /// Merges another message of the same type into this one.
    ///
    /// Singular scalars and chunks overwrite; singular sub-messages merge
    /// recursively; repeated fields append; map entries overwrite per key;
    /// unknown fields concatenate.
    pub fn merge_from(&mut self, other: &DynamicMessage<'a>) -> Result<()> {
        self.check_same_type(other)?;
        let table = self.desc.mini_table().clone();

        for entry in &table.fields {
            if !other.entry_present(entry) {
                continue;
            }
            let slot = entry.slot as usize;
            match &other.cells[slot] {
                Cell::Empty => {}
                Cell::Word(word) => {
                    self.mark_present(entry);
                    self.cells[slot] = Cell::Word(*word);
                }
                Cell::Chunk(chunk) => {
                    self.mark_present(entry);
                    self.cells[slot] = Cell::Chunk(chunk);
                }
                Cell::Message(src) => {
                    self.mark_present(entry);
                    if !matches!(self.cells[slot], Cell::Message(_)) {
                        self.cells[slot] = Cell::Message(Box::new(DynamicMessage::new(
                            src.descriptor().clone(),
                            self.arena,
                        )));
                    }
                    let Cell::Message(dst) = &mut self.cells[slot] else {
                        unreachable!("slot was just set to a message cell");
                    };
                    dst.merge_from(src)?;
                }
                Cell::WordList(list) => {
                    self.word_list(slot).extend(list.iter().copied());
                }
                Cell::ChunkList(list) => {
                    self.chunk_list(slot).extend(list.iter().copied());
                }
                Cell::MessageList(list) => {
                    let arena = self.arena;
                    let dst = self.message_list(slot);
                    for msg in list {
                        dst.push(msg.clone_onto_shared(arena));
                    }
                }
                Cell::Map(map) => {
                    let arena = self.arena;
                    let dst = self.map_cell(slot);
                    for (key, value) in map {
                        dst.insert(*key, shared_cell(value, arena));
                    }
                }
            }
        }

        if !other.unknown.is_empty() {
            self.unknown.push_record(other.unknown.as_bytes());
        }
        for ext in &other.extensions {
            self.set_extension_cell(ext.number, ext.ids, shared_cell(&ext.cell, self.arena));
        }
        Ok(())
    }

    /// Deep-copies this message onto another arena. All chunk storage is
    /// re-allocated there; the result is independent of this message's
    /// arena.
    pub fn clone_onto<'b>(&self, arena: &'b Arena) -> DynamicMessage<'b> {
        let mut out = DynamicMessage::new(self.desc.clone(), arena);
        out.hasbits.copy_from_slice(&self.hasbits);
        out.oneof_cases.copy_from_slice(&self.oneof_cases);
        for (dst, src) in out.cells.iter_mut().zip(&self.cells) {
            *dst = deep_cell(src, arena);
        }
        out.unknown.push_record(self.unknown.as_bytes());
        out.extensions = self
            .extensions
            .iter()
            .map(|ext| ExtensionEntry {
                number: ext.number,
                ids: ext.ids,
                cell: deep_cell(&ext.cell, arena),
            })
            .collect();
        out
    }

    /// Copies this message onto another arena without copying chunk
    /// payloads: strings and bytes keep pointing into this message's arena.
    /// The two arenas are fused so the shared storage lives as long as
    /// either group.
    pub fn clone_onto_shared<'b>(&self, arena: &'b Arena) -> DynamicMessage<'b>
    where
        'a: 'b,
    {
        self.arena.fuse(arena);
        trace!(message = %self.desc.full_name(), "zero-copy clone across arenas");
        let mut out = DynamicMessage::new(self.desc.clone(), arena);
        out.hasbits.copy_from_slice(&self.hasbits);
        out.oneof_cases.copy_from_slice(&self.oneof_cases);
        for (dst, src) in out.cells.iter_mut().zip(&self.cells) {
            *dst = shared_cell(src, arena);
        }
        out.unknown.push_record(self.unknown.as_bytes());
        out.extensions = self
            .extensions
            .iter()
            .map(|ext| ExtensionEntry {
                number: ext.number,
                ids: ext.ids,
                cell: shared_cell(&ext.cell, arena),
            })
            .collect();
        out
    }

    /// Exchanges the contents of two messages of the same type. Their
    /// arenas keep their identities; only field storage moves.
    pub fn swap(&mut self, other: &mut DynamicMessage<'a>) -> Result<()> {
        self.check_same_type(other)?;
        std::mem::swap(&mut self.hasbits, &mut other.hasbits);
        std::mem::swap(&mut self.oneof_cases, &mut other.oneof_cases);
        std::mem::swap(&mut self.cells, &mut other.cells);
        std::mem::swap(&mut self.unknown, &mut other.unknown);
        std::mem::swap(&mut self.extensions, &mut other.extensions);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DynamicMessage, Value};
    use crate::arena::Arena;
    use crate::pool::DescriptorPool;
    use crate::schema::field_descriptor_proto::{Label, Type as T};
    use crate::schema::{self, DescriptorProto, FieldDescriptorProto};

    fn pool() -> DescriptorPool {
        let mut pool = DescriptorPool::new();
        let file = schema::FileDescriptorProto {
            name: Some("merge_test.proto".to_string()),
            package: Some("mt".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("M".to_string()),
                field: vec![
                    FieldDescriptorProto {
                        name: Some("a".to_string()),
                        number: Some(1),
                        label: Some(Label::Optional as i32),
                        r#type: Some(T::Int32 as i32),
                        ..Default::default()
                    },
                    FieldDescriptorProto {
                        name: Some("s".to_string()),
                        number: Some(2),
                        label: Some(Label::Optional as i32),
                        r#type: Some(T::String as i32),
                        ..Default::default()
                    },
                    FieldDescriptorProto {
                        name: Some("rep".to_string()),
                        number: Some(3),
                        label: Some(Label::Repeated as i32),
                        r#type: Some(T::Int32 as i32),
                        ..Default::default()
                    },
                    FieldDescriptorProto {
                        name: Some("child".to_string()),
                        number: Some(4),
                        label: Some(Label::Optional as i32),
                        r#type: Some(T::Message as i32),
                        type_name: Some(".mt.M".to_string()),
                        ..Default::default()
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
    fn test_merge_scalars_overwrite_repeated_append() {
        let pool = pool();
        let desc = pool.find_message_by_name("mt.M").unwrap();
        let arena = Arena::new();
        let a = desc.field_by_name("a").unwrap();
        let rep = desc.field_by_name("rep").unwrap();

        let mut dst = DynamicMessage::new(desc.clone(), &arena);
        dst.set(&a, Value::I32(1)).unwrap();
        dst.push(&rep, Value::I32(10)).unwrap();

        let mut src = DynamicMessage::new(desc.clone(), &arena);
        src.set(&a, Value::I32(2)).unwrap();
        src.push(&rep, Value::I32(20)).unwrap();

        dst.merge_from(&src).unwrap();
        assert_eq!(dst.get(&a).unwrap(), Value::I32(2));
        let values: Vec<_> = dst.repeated_values(&rep).collect();
        assert_eq!(values, vec![Value::I32(10), Value::I32(20)]);
    }

    #[test]
    fn test_merge_idempotent_for_scalars_and_messages() {
        let pool = pool();
        let desc = pool.find_message_by_name("mt.M").unwrap();
        let arena = Arena::new();
        let a = desc.field_by_name("a").unwrap();
        let child = desc.field_by_name("child").unwrap();

        let mut src = DynamicMessage::new(desc.clone(), &arena);
        src.set(&a, Value::I32(9)).unwrap();
        src.mutable_message(&child)
            .unwrap()
            .set(&a, Value::I32(3))
            .unwrap();

        let mut once = DynamicMessage::new(desc.clone(), &arena);
        once.merge_from(&src).unwrap();
        let mut twice = DynamicMessage::new(desc.clone(), &arena);
        twice.merge_from(&src).unwrap();
        twice.merge_from(&src).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_clone_onto_other_arena() {
        let pool = pool();
        let desc = pool.find_message_by_name("mt.M").unwrap();
        let s = desc.field_by_name("s").unwrap();

        let target = Arena::new();
        let cloned = {
            let source = Arena::new();
            let mut msg = DynamicMessage::new(desc.clone(), &source);
            msg.set(&s, Value::String("carried over")).unwrap();
            msg.clone_onto(&target)
            // The source arena drops here; the clone must not care.
        };
        assert_eq!(cloned.get(&s).unwrap(), Value::String("carried over"));
    }

    #[test]
    fn test_swap() {
        let pool = pool();
        let desc = pool.find_message_by_name("mt.M").unwrap();
        let arena = Arena::new();
        let a = desc.field_by_name("a").unwrap();

        let mut x = DynamicMessage::new(desc.clone(), &arena);
        x.set(&a, Value::I32(1)).unwrap();
        let mut y = DynamicMessage::new(desc.clone(), &arena);
        y.set(&a, Value::I32(2)).unwrap();

        x.swap(&mut y).unwrap();
        assert_eq!(x.get(&a).unwrap(), Value::I32(2));
        assert_eq!(y.get(&a).unwrap(), Value::I32(1));
    }
}
