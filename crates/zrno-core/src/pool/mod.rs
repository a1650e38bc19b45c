//! The descriptor pool: validated, cross-linked schema graphs.
//!
//! A [`DescriptorPool`] accepts serialized `FileDescriptorProto`s and vends
//! read-only descriptor handles. Every file moves through the build pipeline
//! (registration, cross-linking, visibility checks, feature resolution,
//! option interpretation, validation, MiniTable compilation) before any of
//! its symbols become visible; a file that fails any step publishes nothing.
//!
//! Handles ([`MessageDescriptor`], [`FieldDescriptor`], ...) are cheap to
//! clone: an `Arc` to the pool plus indices. Cross-references between
//! descriptors are index links, so recursive message types need no reference
//! cycles.
//!
//! With [`DescriptorPool::set_lazy_dependencies`] enabled, files added
//! through a descriptor set are only registered up front; the rest of the
//! pipeline runs when one of their symbols is first requested, guarded by a
//! per-file once-lock so concurrent first readers race safely.

mod build;
mod features;
mod names;
mod options;
mod validate;

pub use features::ResolvedFeatures;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use prost::Message as _;
use tracing::{debug, warn};

use crate::error::{Error, Result, SourceSpan};
use crate::schema::field_descriptor_proto::{Label, Type};
use crate::schema::{self, Edition, SymbolVisibility};
use crate::table::{EnumId, EnumTable, MiniTable, TableId};

/// Lifecycle state of a file within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Symbols registered; the rest of the pipeline has not run
    Registered,
    /// The full pipeline completed and MiniTables are compiled
    MiniTableBuilt,
    /// A pipeline step failed; the file is invisible to queries
    Errored,
}

/// A typed default value, parsed from the descriptor's textual form.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// No explicit default; the type's zero value applies
    Unset,
    /// Boolean default
    Bool(bool),
    /// 32-bit signed default
    I32(i32),
    /// 64-bit signed default
    I64(i64),
    /// 32-bit unsigned default
    U32(u32),
    /// 64-bit unsigned default
    U64(u64),
    /// 32-bit float default
    F32(f32),
    /// 64-bit float default
    F64(f64),
    /// String default
    String(String),
    /// Bytes default (C-escaped in the descriptor)
    Bytes(Vec<u8>),
    /// Enum default, by number
    Enum(i32),
}

/// Where a registered symbol points.
#[derive(Debug, Clone)]
pub(crate) enum Symbol {
    /// A package name component
    Package,
    /// A message type
    Message {
        file: u32,
        index: u32,
        /// Effective visibility computed at registration
        local: bool,
        /// Whether the message is a synthetic map entry
        map_entry: bool,
    },
    /// An enum type
    Enum { file: u32, index: u32, local: bool },
    /// An enum value, registered in the enum's enclosing scope
    EnumValue { file: u32, enum_index: u32, value_index: u32 },
    /// A field or extension
    Field { file: u32 },
    /// A service
    Service { file: u32, index: u32 },
    /// A method
    Method,
}

/// Built data for one field or extension.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldData {
    pub name: String,
    pub full_name: String,
    pub json_name: String,
    pub number: u32,
    pub ty: Type,
    pub label: Label,
    pub proto3_optional: bool,
    /// Declared oneof index, including synthetic oneofs
    pub oneof: Option<u16>,
    /// Oneof index excluding synthetic oneofs
    pub real_oneof: Option<u16>,
    /// Resolved message target, for message/group/map fields
    pub message_ref: Option<(u32, u32)>,
    /// Resolved enum target, for enum fields
    pub enum_ref: Option<(u32, u32)>,
    /// Resolved extendee, for extensions
    pub extendee: Option<(u32, u32)>,
    pub default_value: DefaultValue,
    /// Effective packed preference
    pub packed: bool,
    pub explicit_presence: bool,
    pub required: bool,
    pub is_map: bool,
    pub validate_utf8: bool,
    pub features: ResolvedFeatures,
}

/// Built data for one oneof.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OneofData {
    pub name: String,
    pub full_name: String,
    /// Indices into the containing message's field list
    pub fields: Vec<u32>,
    pub synthetic: bool,
    pub features: ResolvedFeatures,
}

/// Built data for one message.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MessageData {
    pub name: String,
    pub full_name: String,
    pub parent: Option<u32>,
    /// Fields sorted by number
    pub fields: Vec<FieldData>,
    pub oneofs: Vec<OneofData>,
    pub nested_messages: Vec<u32>,
    pub nested_enums: Vec<u32>,
    pub extension_ranges: Vec<(u32, u32)>,
    pub map_entry: bool,
    pub visibility: SymbolVisibility,
    pub features: ResolvedFeatures,
}

/// Built data for one enum value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EnumValueData {
    pub name: String,
    pub full_name: String,
    pub number: i32,
}

/// Built data for one enum.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EnumData {
    pub name: String,
    pub full_name: String,
    pub values: Vec<EnumValueData>,
    pub closed: bool,
    pub visibility: SymbolVisibility,
    pub features: ResolvedFeatures,
}

/// Built data for one method.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MethodData {
    pub name: String,
    pub full_name: String,
    pub input: (u32, u32),
    pub output: (u32, u32),
    pub client_streaming: bool,
    pub server_streaming: bool,
}

/// Built data for one service.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ServiceData {
    pub name: String,
    pub full_name: String,
    pub methods: Vec<MethodData>,
    pub features: ResolvedFeatures,
}

/// Everything the build pipeline produces for one file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FileTables {
    pub features: ResolvedFeatures,
    pub messages: Vec<MessageData>,
    pub enums: Vec<EnumData>,
    pub services: Vec<ServiceData>,
    /// Extensions, top-level and nested, in registration order
    pub extensions: Vec<FieldData>,
    /// MiniTables, parallel to `messages`
    pub tables: Vec<MiniTable>,
    /// Enum runtime tables, parallel to `enums`
    pub enum_tables: Vec<EnumTable>,
}

/// One file held by the pool.
#[derive(Debug, Clone)]
pub(crate) struct FileEntry {
    pub proto: Arc<schema::FileDescriptorProto>,
    pub name: String,
    pub package: String,
    pub edition: Edition,
    /// File-level features, resolved at registration
    pub features: ResolvedFeatures,
    /// Built tables; `None` inside means the build failed
    pub built: OnceLock<Option<Arc<FileTables>>>,
    /// Diagnostic reason for a failed build
    pub error: OnceLock<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PoolInner {
    pub files: Vec<FileEntry>,
    pub files_by_name: HashMap<String, u32>,
    pub symbols: HashMap<String, Symbol>,
    /// `(extendee full name, field number)` to `(file, extension index)`
    pub extensions_by_number: HashMap<(String, u32), (u32, u32)>,
    pub lazy_dependencies: bool,
}

impl PoolInner {
    /// Returns the built tables for a file, running the deferred pipeline on
    /// first touch. `None` if the build failed; failed files stay invisible.
    pub(crate) fn file_tables(&self, file: u32) -> Option<&Arc<FileTables>> {
        let entry = &self.files[file as usize];
        entry
            .built
            .get_or_init(|| match build::build_file(self, file) {
                Ok(tables) => Some(Arc::new(tables)),
                Err(err) => {
                    warn!(file = %entry.name, %err, "deferred file build failed");
                    let _ = entry.error.set(err.to_string());
                    None
                }
            })
            .as_ref()
    }

    pub(crate) fn enum_table(&self, id: EnumId) -> Option<&EnumTable> {
        self.file_tables(id.file)
            .map(|tables| &tables.enum_tables[id.index as usize])
    }

    pub(crate) fn mini_table(&self, id: TableId) -> Option<&MiniTable> {
        self.file_tables(id.file)
            .map(|tables| &tables.tables[id.index as usize])
    }
}

/// The in-memory, cross-linked representation of a set of `.proto` schemas.
///
/// Cloning is cheap and yields a handle to the same snapshot; mutation
/// (`add_file` and friends) requires exclusive access.
#[derive(Debug, Clone)]
pub struct DescriptorPool {
    inner: Arc<PoolInner>,
}

impl Default for DescriptorPool {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorPool {
    /// Creates a pool with `google/protobuf/descriptor.proto` registered, so
    /// option extendees always resolve.
    pub fn new() -> Self {
        let mut pool = DescriptorPool {
            inner: Arc::new(PoolInner::default()),
        };
        let embedded = schema::embedded::descriptor_proto_file();
        // The embedded descriptor is maintained in-crate; registration
        // cannot fail short of an internal bug.
        if let Err(err) = pool.add_file_proto(embedded) {
            unreachable!("embedded descriptor.proto failed to register: {err}");
        }
        pool
    }

    /// When enabled, files added through a descriptor set are only
    /// registered; the rest of the pipeline runs when one of their symbols
    /// is first requested. Circular imports are rejected regardless.
    pub fn set_lazy_dependencies(&mut self, lazy: bool) {
        Arc::make_mut(&mut self.inner).lazy_dependencies = lazy;
    }

    /// Returns whether lazy dependency loading is enabled.
    pub fn lazy_dependencies(&self) -> bool {
        self.inner.lazy_dependencies
    }

    /// Adds a serialized `FileDescriptorProto` and runs the full build
    /// pipeline on it.
    pub fn add_file(&mut self, bytes: &[u8]) -> Result<FileDescriptor> {
        let proto = schema::FileDescriptorProto::decode(bytes)?;
        self.add_file_proto(proto)
    }

    /// Adds an already-decoded `FileDescriptorProto` and runs the full build
    /// pipeline on it.
    pub fn add_file_proto(&mut self, proto: schema::FileDescriptorProto) -> Result<FileDescriptor> {
        let index = self.register(proto)?;
        self.build_eager(index)?;
        self.file(index)
            .ok_or_else(|| Error::internal("freshly built file missing from pool"))
    }

    /// Adds every file of a serialized `FileDescriptorSet`, in dependency
    /// order. With lazy dependencies enabled, files are registered but only
    /// built when first used.
    pub fn add_file_descriptor_set(&mut self, bytes: &[u8]) -> Result<Vec<FileDescriptor>> {
        let set = schema::FileDescriptorSet::decode(bytes)?;
        self.add_file_descriptor_set_protos(set.file)
    }

    /// Adds every file of a decoded descriptor set; see
    /// [`DescriptorPool::add_file_descriptor_set`].
    pub fn add_file_descriptor_set_protos(
        &mut self,
        mut protos: Vec<schema::FileDescriptorProto>,
    ) -> Result<Vec<FileDescriptor>> {
        // Topological registration: repeatedly admit files whose imports are
        // all present. A stall means a missing or circular import.
        let mut indices = Vec::with_capacity(protos.len());
        while !protos.is_empty() {
            let ready = protos.iter().position(|proto| {
                proto
                    .dependency
                    .iter()
                    .all(|dep| self.inner.files_by_name.contains_key(dep))
            });
            let Some(position) = ready else {
                let proto = &protos[0];
                let missing = proto
                    .dependency
                    .iter()
                    .find(|dep| !self.inner.files_by_name.contains_key(*dep))
                    .cloned()
                    .unwrap_or_default();
                return Err(Error::MissingDependency {
                    file: proto.name().to_string(),
                    dependency: missing,
                });
            };
            indices.push(self.register(protos.remove(position))?);
        }

        if !self.inner.lazy_dependencies {
            for &index in &indices {
                self.build_eager(index)?;
            }
        }

        Ok(indices.iter().filter_map(|&i| self.file(i)).collect())
    }

    /// Reads a serialized descriptor set from disk and adds its files.
    pub fn add_file_descriptor_set_from_path(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<FileDescriptor>> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        self.add_file_descriptor_set(&bytes)
    }

    fn register(&mut self, proto: schema::FileDescriptorProto) -> Result<u32> {
        let inner = Arc::make_mut(&mut self.inner);
        build::register_file(inner, proto)
    }

    /// Runs the deferred pipeline now and surfaces its error, unlike the
    /// query paths which hide failed files.
    fn build_eager(&mut self, index: u32) -> Result<()> {
        let inner = Arc::make_mut(&mut self.inner);
        if inner.files[index as usize].built.get().is_some() {
            return Ok(());
        }
        match build::build_file(inner, index) {
            Ok(tables) => {
                let _ = inner.files[index as usize].built.set(Some(Arc::new(tables)));
                debug!(file = %inner.files[index as usize].name, "file built");
                Ok(())
            }
            Err(err) => {
                let entry = &inner.files[index as usize];
                let _ = entry.error.set(err.to_string());
                let _ = entry.built.set(None);
                Err(err)
            }
        }
    }

    fn file(&self, index: u32) -> Option<FileDescriptor> {
        let tables = self.inner.file_tables(index)?.clone();
        Some(FileDescriptor {
            pool: self.clone(),
            index,
            tables,
        })
    }

    /// Returns the lifecycle state of a file, by name.
    pub fn file_state(&self, name: &str) -> Option<FileState> {
        let &index = self.inner.files_by_name.get(name)?;
        let entry = &self.inner.files[index as usize];
        Some(match entry.built.get() {
            Some(Some(_)) => FileState::MiniTableBuilt,
            Some(None) => FileState::Errored,
            None => FileState::Registered,
        })
    }

    /// Finds a file by its registered name.
    pub fn find_file_by_name(&self, name: &str) -> Option<FileDescriptor> {
        let &index = self.inner.files_by_name.get(name)?;
        self.file(index)
    }

    /// Finds a message by fully-qualified name. A leading dot is accepted.
    pub fn find_message_by_name(&self, name: &str) -> Option<MessageDescriptor> {
        let name = name.strip_prefix('.').unwrap_or(name);
        match self.inner.symbols.get(name)? {
            &Symbol::Message { file, index, .. } => {
                let file = self.file(file)?;
                Some(MessageDescriptor { file, index })
            }
            _ => None,
        }
    }

    /// Finds an enum by fully-qualified name. A leading dot is accepted.
    pub fn find_enum_by_name(&self, name: &str) -> Option<EnumDescriptor> {
        let name = name.strip_prefix('.').unwrap_or(name);
        match self.inner.symbols.get(name)? {
            &Symbol::Enum { file, index, .. } => {
                let file = self.file(file)?;
                Some(EnumDescriptor { file, index })
            }
            _ => None,
        }
    }

    /// Finds an enum value by fully-qualified name. Enum values scope to
    /// their enum's enclosing message or package, so the name does not
    /// include the enum itself.
    pub fn find_enum_value_by_name(&self, name: &str) -> Option<EnumValueDescriptor> {
        let name = name.strip_prefix('.').unwrap_or(name);
        match self.inner.symbols.get(name)? {
            &Symbol::EnumValue {
                file,
                enum_index,
                value_index,
            } => {
                let file = self.file(file)?;
                Some(EnumValueDescriptor {
                    parent: EnumDescriptor {
                        file,
                        index: enum_index,
                    },
                    index: value_index,
                })
            }
            _ => None,
        }
    }

    /// Finds an extension by its fully-qualified name.
    pub fn find_extension_by_name(&self, name: &str) -> Option<ExtensionDescriptor> {
        let name = name.strip_prefix('.').unwrap_or(name);
        let &Symbol::Field { file } = self.inner.symbols.get(name)? else {
            return None;
        };
        let file = self.file(file)?;
        let index = file
            .tables
            .extensions
            .iter()
            .position(|ext| ext.full_name == name)?;
        Some(ExtensionDescriptor {
            file,
            index: index as u32,
        })
    }

    /// Finds an extension of `extendee` (fully-qualified message name) by
    /// field number.
    pub fn find_extension_by_number(
        &self,
        extendee: &str,
        number: u32,
    ) -> Option<ExtensionDescriptor> {
        let extendee = extendee.strip_prefix('.').unwrap_or(extendee);
        let &(file, index) = self
            .inner
            .extensions_by_number
            .get(&(extendee.to_string(), number))?;
        let file = self.file(file)?;
        Some(ExtensionDescriptor { file, index })
    }

    /// Finds a service by fully-qualified name.
    pub fn find_service_by_name(&self, name: &str) -> Option<ServiceDescriptor> {
        let name = name.strip_prefix('.').unwrap_or(name);
        match self.inner.symbols.get(name)? {
            &Symbol::Service { file, index } => {
                let file = self.file(file)?;
                Some(ServiceDescriptor { file, index })
            }
            _ => None,
        }
    }

    /// Iterates over the files of the pool, building lazily-registered files
    /// on the way and skipping failed ones.
    pub fn files(&self) -> impl Iterator<Item = FileDescriptor> + '_ {
        (0..self.inner.files.len() as u32).filter_map(move |index| self.file(index))
    }

    pub(crate) fn inner(&self) -> &PoolInner {
        &self.inner
    }

    fn ptr_eq(&self, other: &DescriptorPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A validated `.proto` file in a pool.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pool: DescriptorPool,
    index: u32,
    tables: Arc<FileTables>,
}

impl PartialEq for FileDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.pool.ptr_eq(&other.pool) && self.index == other.index
    }
}

impl Eq for FileDescriptor {}

impl FileDescriptor {
    fn entry(&self) -> &FileEntry {
        &self.pool.inner.files[self.index as usize]
    }

    /// Returns the pool this file belongs to.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Returns the file name.
    pub fn name(&self) -> &str {
        &self.entry().name
    }

    /// Returns the package name.
    pub fn package(&self) -> &str {
        &self.entry().package
    }

    /// Returns the file's edition.
    pub fn edition(&self) -> Edition {
        self.entry().edition
    }

    /// Returns the file's resolved features.
    pub fn features(&self) -> ResolvedFeatures {
        self.tables.features
    }

    /// Returns the names of the file's imports.
    pub fn dependencies(&self) -> &[String] {
        &self.entry().proto.dependency
    }

    /// Iterates over the file's top-level messages.
    pub fn messages(&self) -> impl Iterator<Item = MessageDescriptor> + '_ {
        let this = self.clone();
        self.tables
            .messages
            .iter()
            .enumerate()
            .filter(|(_, data)| data.parent.is_none())
            .map(move |(index, _)| MessageDescriptor {
                file: this.clone(),
                index: index as u32,
            })
    }

    /// Iterates over every message in the file, nested ones included.
    pub fn all_messages(&self) -> impl Iterator<Item = MessageDescriptor> + '_ {
        let this = self.clone();
        (0..self.tables.messages.len() as u32).map(move |index| MessageDescriptor {
            file: this.clone(),
            index,
        })
    }

    /// Iterates over the file's top-level enums and enums nested in
    /// messages.
    pub fn enums(&self) -> impl Iterator<Item = EnumDescriptor> + '_ {
        let this = self.clone();
        (0..self.tables.enums.len() as u32).map(move |index| EnumDescriptor {
            file: this.clone(),
            index,
        })
    }

    /// Iterates over the file's services.
    pub fn services(&self) -> impl Iterator<Item = ServiceDescriptor> + '_ {
        let this = self.clone();
        (0..self.tables.services.len() as u32).map(move |index| ServiceDescriptor {
            file: this.clone(),
            index,
        })
    }

    /// Iterates over the file's extensions, top-level and nested.
    pub fn extensions(&self) -> impl Iterator<Item = ExtensionDescriptor> + '_ {
        let this = self.clone();
        (0..self.tables.extensions.len() as u32).map(move |index| ExtensionDescriptor {
            file: this.clone(),
            index,
        })
    }
}

/// A message type in a pool.
#[derive(Debug, Clone)]
pub struct MessageDescriptor {
    file: FileDescriptor,
    index: u32,
}

impl PartialEq for MessageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file && self.index == other.index
    }
}

impl Eq for MessageDescriptor {}

impl MessageDescriptor {
    pub(crate) fn data(&self) -> &MessageData {
        &self.file.tables.messages[self.index as usize]
    }

    /// Returns the containing file.
    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    /// Returns the pool this message belongs to.
    pub fn pool(&self) -> &DescriptorPool {
        self.file.pool()
    }

    /// Returns the simple name.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Returns the fully-qualified name.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Returns the enclosing message, for nested messages.
    pub fn parent_message(&self) -> Option<MessageDescriptor> {
        self.data().parent.map(|index| MessageDescriptor {
            file: self.file.clone(),
            index,
        })
    }

    /// Returns the message's resolved features.
    pub fn features(&self) -> ResolvedFeatures {
        self.data().features
    }

    /// Returns the explicit visibility keyword, if any.
    pub fn visibility(&self) -> SymbolVisibility {
        self.data().visibility
    }

    /// Returns true if this is a synthetic map entry message.
    pub fn is_map_entry(&self) -> bool {
        self.data().map_entry
    }

    /// Iterates over the message's fields, in field-number order.
    pub fn fields(&self) -> impl Iterator<Item = FieldDescriptor> + '_ {
        let this = self.clone();
        (0..self.data().fields.len() as u32).map(move |index| FieldDescriptor {
            message: this.clone(),
            index,
        })
    }

    /// Finds a field by number.
    pub fn field(&self, number: u32) -> Option<FieldDescriptor> {
        let index = self
            .data()
            .fields
            .binary_search_by_key(&number, |f| f.number)
            .ok()?;
        Some(FieldDescriptor {
            message: self.clone(),
            index: index as u32,
        })
    }

    /// Finds a field by name.
    pub fn field_by_name(&self, name: &str) -> Option<FieldDescriptor> {
        let index = self.data().fields.iter().position(|f| f.name == name)?;
        Some(FieldDescriptor {
            message: self.clone(),
            index: index as u32,
        })
    }

    /// Iterates over the message's oneofs, synthetic ones included.
    pub fn oneofs(&self) -> impl Iterator<Item = OneofDescriptor> + '_ {
        let this = self.clone();
        (0..self.data().oneofs.len() as u16).map(move |index| OneofDescriptor {
            message: this.clone(),
            index,
        })
    }

    /// Iterates over messages nested directly in this one.
    pub fn nested_messages(&self) -> impl Iterator<Item = MessageDescriptor> + '_ {
        let file = self.file.clone();
        self.data()
            .nested_messages
            .iter()
            .map(move |&index| MessageDescriptor {
                file: file.clone(),
                index,
            })
    }

    /// Iterates over enums nested directly in this message.
    pub fn nested_enums(&self) -> impl Iterator<Item = EnumDescriptor> + '_ {
        let file = self.file.clone();
        self.data()
            .nested_enums
            .iter()
            .map(move |&index| EnumDescriptor {
                file: file.clone(),
                index,
            })
    }

    /// Returns the message's extension number ranges, `[start, end)`.
    pub fn extension_ranges(&self) -> &[(u32, u32)] {
        &self.data().extension_ranges
    }

    /// Returns the compiled MiniTable for this message.
    pub fn mini_table(&self) -> &MiniTable {
        &self.file.tables.tables[self.index as usize]
    }

    pub(crate) fn from_ids(pool: &DescriptorPool, file: u32, index: u32) -> Option<Self> {
        let file = pool.file(file)?;
        Some(MessageDescriptor { file, index })
    }
}

/// A field of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    message: MessageDescriptor,
    index: u32,
}

impl FieldDescriptor {
    pub(crate) fn data(&self) -> &FieldData {
        &self.message.data().fields[self.index as usize]
    }

    /// Returns the containing message.
    pub fn containing_message(&self) -> &MessageDescriptor {
        &self.message
    }

    /// Returns the simple name.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Returns the fully-qualified name.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Returns the JSON name: the explicit one if given, otherwise the
    /// camel-cased field name.
    pub fn json_name(&self) -> &str {
        &self.data().json_name
    }

    /// Returns the field name lower-cased, as some generators emit it.
    pub fn lowercase_name(&self) -> String {
        self.data().name.to_lowercase()
    }

    /// Returns the field name camel-cased.
    pub fn camelcase_name(&self) -> String {
        names::to_json_name(&self.data().name)
    }

    /// Returns the field number.
    pub fn number(&self) -> u32 {
        self.data().number
    }

    /// Returns the declared type.
    pub fn kind(&self) -> Type {
        self.data().ty
    }

    /// Returns the cardinality label.
    pub fn cardinality(&self) -> Label {
        self.data().label
    }

    /// Returns true for repeated fields, maps included.
    pub fn is_repeated(&self) -> bool {
        self.data().label == Label::Repeated
    }

    /// Returns true for map fields.
    pub fn is_map(&self) -> bool {
        self.data().is_map
    }

    /// Returns true if the effective encoding of this repeated field is
    /// packed.
    pub fn is_packed(&self) -> bool {
        self.data().packed
    }

    /// Returns true for required fields.
    pub fn is_required(&self) -> bool {
        self.data().required
    }

    /// Returns true if the field tracks presence explicitly.
    pub fn has_presence(&self) -> bool {
        let data = self.data();
        data.label != Label::Repeated && (data.explicit_presence || data.real_oneof.is_some())
    }

    /// Returns the field's resolved features.
    pub fn features(&self) -> ResolvedFeatures {
        self.data().features
    }

    /// Returns the typed default value.
    pub fn default_value(&self) -> &DefaultValue {
        &self.data().default_value
    }

    /// Returns the containing oneof, excluding synthetic oneofs.
    pub fn containing_oneof(&self) -> Option<OneofDescriptor> {
        self.data().real_oneof.map(|index| OneofDescriptor {
            message: self.message.clone(),
            index,
        })
    }

    /// Returns the message type of a message, group, or map field. Builds
    /// the defining file if it was lazily registered.
    pub fn message_type(&self) -> Option<MessageDescriptor> {
        let (file, index) = self.data().message_ref?;
        MessageDescriptor::from_ids(self.message.pool(), file, index)
    }

    /// Returns the enum type of an enum field. Builds the defining file if
    /// it was lazily registered.
    pub fn enum_type(&self) -> Option<EnumDescriptor> {
        let (file, index) = self.data().enum_ref?;
        let file = self.message.pool().file(file)?;
        Some(EnumDescriptor { file, index })
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }
}

/// A oneof declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneofDescriptor {
    message: MessageDescriptor,
    index: u16,
}

impl OneofDescriptor {
    fn data(&self) -> &OneofData {
        &self.message.data().oneofs[self.index as usize]
    }

    /// Returns the containing message.
    pub fn containing_message(&self) -> &MessageDescriptor {
        &self.message
    }

    /// Returns the simple name.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Returns the fully-qualified name.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Returns true for the synthetic oneof wrapping a proto3 optional
    /// field.
    pub fn is_synthetic(&self) -> bool {
        self.data().synthetic
    }

    /// Returns the oneof's resolved features.
    pub fn features(&self) -> ResolvedFeatures {
        self.data().features
    }

    /// Iterates over the oneof's member fields.
    pub fn fields(&self) -> impl Iterator<Item = FieldDescriptor> + '_ {
        let message = self.message.clone();
        self.data().fields.iter().map(move |&index| FieldDescriptor {
            message: message.clone(),
            index,
        })
    }
}

/// An enum type in a pool.
#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    file: FileDescriptor,
    index: u32,
}

impl PartialEq for EnumDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file && self.index == other.index
    }
}

impl Eq for EnumDescriptor {}

impl EnumDescriptor {
    pub(crate) fn data(&self) -> &EnumData {
        &self.file.tables.enums[self.index as usize]
    }

    /// Returns the containing file.
    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    /// Returns the simple name.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Returns the fully-qualified name.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Returns true for closed enums: values outside the defined set go to
    /// the unknown-field store.
    pub fn is_closed(&self) -> bool {
        self.data().closed
    }

    /// Returns the enum's resolved features.
    pub fn features(&self) -> ResolvedFeatures {
        self.data().features
    }

    /// Iterates over the enum's values.
    pub fn values(&self) -> impl Iterator<Item = EnumValueDescriptor> + '_ {
        let this = self.clone();
        (0..self.data().values.len() as u32).map(move |index| EnumValueDescriptor {
            parent: this.clone(),
            index,
        })
    }

    /// Returns the default value: the first declared value.
    pub fn default_number(&self) -> i32 {
        self.data().values.first().map(|v| v.number).unwrap_or(0)
    }
}

/// A value of an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValueDescriptor {
    parent: EnumDescriptor,
    index: u32,
}

impl EnumValueDescriptor {
    fn data(&self) -> &EnumValueData {
        &self.parent.data().values[self.index as usize]
    }

    /// Returns the containing enum.
    pub fn containing_enum(&self) -> &EnumDescriptor {
        &self.parent
    }

    /// Returns the value name.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Returns the fully-qualified name. Enum values scope to the enum's
    /// parent, matching protobuf's C++-style scoping.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Returns the numeric value.
    pub fn number(&self) -> i32 {
        self.data().number
    }
}

/// An extension field, declared outside its containing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDescriptor {
    file: FileDescriptor,
    index: u32,
}

impl ExtensionDescriptor {
    pub(crate) fn data(&self) -> &FieldData {
        &self.file.tables.extensions[self.index as usize]
    }

    /// Returns the file that declares the extension.
    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    /// Returns the simple name.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Returns the fully-qualified name.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Returns the field number.
    pub fn number(&self) -> u32 {
        self.data().number
    }

    /// Returns the declared type.
    pub fn kind(&self) -> Type {
        self.data().ty
    }

    /// Returns the extended message.
    pub fn extendee(&self) -> Option<MessageDescriptor> {
        let (file, index) = self.data().extendee?;
        MessageDescriptor::from_ids(self.file.pool(), file, index)
    }

    /// Returns the message type of a message-typed extension.
    pub fn message_type(&self) -> Option<MessageDescriptor> {
        let (file, index) = self.data().message_ref?;
        MessageDescriptor::from_ids(self.file.pool(), file, index)
    }

    pub(crate) fn ids(&self) -> (u32, u32) {
        (self.file.index, self.index)
    }

    pub(crate) fn from_ids(pool: &DescriptorPool, file: u32, index: u32) -> Option<Self> {
        let file = pool.file(file)?;
        Some(ExtensionDescriptor { file, index })
    }
}

/// A service definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    file: FileDescriptor,
    index: u32,
}

impl ServiceDescriptor {
    fn data(&self) -> &ServiceData {
        &self.file.tables.services[self.index as usize]
    }

    /// Returns the containing file.
    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    /// Returns the simple name.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Returns the fully-qualified name.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Iterates over the service's methods.
    pub fn methods(&self) -> impl Iterator<Item = MethodDescriptor> + '_ {
        let this = self.clone();
        (0..self.data().methods.len() as u32).map(move |index| MethodDescriptor {
            service: this.clone(),
            index,
        })
    }
}

/// A method of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    service: ServiceDescriptor,
    index: u32,
}

impl MethodDescriptor {
    fn data(&self) -> &MethodData {
        &self.service.data().methods[self.index as usize]
    }

    /// Returns the containing service.
    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    /// Returns the simple name.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Returns the fully-qualified name.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Returns the request message type.
    pub fn input(&self) -> Option<MessageDescriptor> {
        let (file, index) = self.data().input;
        MessageDescriptor::from_ids(self.service.file.pool(), file, index)
    }

    /// Returns the response message type.
    pub fn output(&self) -> Option<MessageDescriptor> {
        let (file, index) = self.data().output;
        MessageDescriptor::from_ids(self.service.file.pool(), file, index)
    }

    /// Returns true if the client streams multiple requests.
    pub fn client_streaming(&self) -> bool {
        self.data().client_streaming
    }

    /// Returns true if the server streams multiple responses.
    pub fn server_streaming(&self) -> bool {
        self.data().server_streaming
    }
}

/// Builds a path-to-span index over a file's `SourceCodeInfo`, used to
/// attach line/column information to build errors.
pub(crate) struct Locations {
    spans: HashMap<Vec<i32>, SourceSpan>,
}

impl Locations {
    pub(crate) fn new(info: Option<&schema::SourceCodeInfo>) -> Self {
        let mut spans = HashMap::new();
        if let Some(info) = info {
            for location in &info.location {
                if location.span.len() >= 2 {
                    spans.insert(
                        location.path.clone(),
                        SourceSpan {
                            line: location.span[0] as u32 + 1,
                            column: location.span[1] as u32 + 1,
                        },
                    );
                }
            }
        }
        Locations { spans }
    }

    pub(crate) fn span(&self, path: &[i32]) -> Option<SourceSpan> {
        self.spans.get(path).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field_descriptor_proto::{Label as L, Type as T};

    fn simple_field(name: &str, number: i32, ty: T) -> schema::FieldDescriptorProto {
        schema::FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(L::Optional as i32),
            r#type: Some(ty as i32),
            ..Default::default()
        }
    }

    fn simple_file(name: &str, package: &str) -> schema::FileDescriptorProto {
        schema::FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some(package.to_string()),
            syntax: Some("proto3".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_pool_starts_with_descriptor_proto() {
        let pool = DescriptorPool::new();
        assert!(pool
            .find_file_by_name("google/protobuf/descriptor.proto")
            .is_some());
        assert!(pool
            .find_message_by_name("google.protobuf.FileDescriptorProto")
            .is_some());
        assert!(pool.find_enum_by_name("google.protobuf.Edition").is_some());

        // Enum values register in the enum's enclosing scope.
        let proto3 = pool
            .find_enum_value_by_name("google.protobuf.EDITION_PROTO3")
            .unwrap();
        assert_eq!(proto3.number(), 999);
        assert_eq!(proto3.containing_enum().name(), "Edition");
    }

    #[test]
    fn test_add_simple_file_and_query() {
        let mut pool = DescriptorPool::new();
        let mut file = simple_file("test.proto", "test");
        file.message_type = vec![schema::DescriptorProto {
            name: Some("Thing".to_string()),
            field: vec![simple_field("id", 1, T::Int64)],
            ..Default::default()
        }];
        let built = pool.add_file_proto(file).unwrap();
        assert_eq!(built.name(), "test.proto");

        let msg = pool.find_message_by_name("test.Thing").unwrap();
        assert_eq!(msg.full_name(), "test.Thing");
        assert_eq!(msg.name(), "Thing");

        let field = msg.field_by_name("id").unwrap();
        assert_eq!(field.number(), 1);
        assert_eq!(field.kind(), T::Int64);
        assert_eq!(field.json_name(), "id");
        assert_eq!(field.full_name(), "test.Thing.id");
    }

    #[test]
    fn test_descriptor_consistency() {
        // For every field, looking its containing type up by name must yield
        // the same descriptor.
        let mut pool = DescriptorPool::new();
        let mut file = simple_file("c.proto", "c");
        file.message_type = vec![schema::DescriptorProto {
            name: Some("Outer".to_string()),
            field: vec![simple_field("a", 1, T::Int32), simple_field("b", 2, T::String)],
            nested_type: vec![schema::DescriptorProto {
                name: Some("Inner".to_string()),
                field: vec![simple_field("x", 1, T::Bool)],
                ..Default::default()
            }],
            ..Default::default()
        }];
        pool.add_file_proto(file).unwrap();

        for file in pool.files() {
            for msg in file.all_messages() {
                for field in msg.fields() {
                    let by_name = pool.find_message_by_name(msg.full_name()).unwrap();
                    assert_eq!(&by_name, field.containing_message());
                }
            }
        }
    }

    #[test]
    fn test_duplicate_file_rejected() {
        let mut pool = DescriptorPool::new();
        pool.add_file_proto(simple_file("dup.proto", "a")).unwrap();
        let err = pool
            .add_file_proto(simple_file("dup.proto", "b"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSymbol { .. }));
    }

    #[test]
    fn test_missing_dependency() {
        let mut pool = DescriptorPool::new();
        let mut file = simple_file("needs_dep.proto", "x");
        file.dependency = vec!["nowhere.proto".to_string()];
        let err = pool.add_file_proto(file).unwrap_err();
        assert!(matches!(err, Error::MissingDependency { .. }));
    }

    #[test]
    fn test_file_state_machine() {
        let mut pool = DescriptorPool::new();
        pool.add_file_proto(simple_file("s.proto", "s")).unwrap();
        assert_eq!(
            pool.file_state("s.proto"),
            Some(FileState::MiniTableBuilt)
        );
        assert_eq!(pool.file_state("missing.proto"), None);
    }
}
