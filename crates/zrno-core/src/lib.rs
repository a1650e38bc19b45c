//! # zrno-core
//!
//! The runtime core of a Protocol Buffers toolchain: a validated descriptor
//! pool, an arena allocator with lifetime-group fusion, compact per-message
//! runtime tables, and the binary wire format codec.
//!
//! ## Architecture
//!
//! The crate is layered leaves-first:
//!
//! - [`arena`]: region memory with fusion and deferred cleanup
//! - [`schema`]: the descriptor protos themselves (prost-derived)
//! - [`pool`]: the descriptor pool, symbol table, feature resolver, and
//!   validation pipeline
//! - [`table`]: MiniTables, the compact runtime tables the hot paths consume
//! - [`message`]: arena-backed dynamic messages with reflection accessors
//! - [`wire`]: the tag-dispatched parser, the two-pass serializer, and the
//!   reflection-driven codec
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use zrno_core::schema::field_descriptor_proto::{Label, Type};
//! use zrno_core::schema::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};
//! use zrno_core::{wire, Arena, DescriptorPool, DynamicMessage, Value};
//!
//! // Load a schema into the pool.
//! let mut pool = DescriptorPool::new();
//! pool.add_file_proto(FileDescriptorProto {
//!     name: Some("demo.proto".to_string()),
//!     package: Some("demo".to_string()),
//!     syntax: Some("proto3".to_string()),
//!     message_type: vec![DescriptorProto {
//!         name: Some("Point".to_string()),
//!         field: vec![FieldDescriptorProto {
//!             name: Some("x".to_string()),
//!             number: Some(1),
//!             label: Some(Label::Optional as i32),
//!             r#type: Some(Type::Int64 as i32),
//!             ..Default::default()
//!         }],
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! })?;
//!
//! // Build a message on an arena, then round-trip it through the wire.
//! let desc = pool.find_message_by_name("demo.Point").unwrap();
//! let x = desc.field_by_name("x").unwrap();
//! let arena = Arena::new();
//! let mut point = DynamicMessage::new(desc.clone(), &arena);
//! point.set(&x, Value::I64(-1))?;
//!
//! let bytes = wire::encode_to_vec(&point)?;
//! let parsed = wire::decode(&desc, &arena, &bytes)?;
//! assert_eq!(parsed, point);
//! # Ok::<(), zrno_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod arena;
pub mod error;
pub mod message;
pub mod pool;
pub mod schema;
pub mod table;
pub mod wire;

// Re-export primary types for convenience
pub use arena::{Arena, LifetimeGroup};
pub use error::{Error, Result, SourceSpan};
pub use message::{DynamicMessage, MapKey, UnknownFields, Value};
pub use pool::{
    DescriptorPool, EnumDescriptor, EnumValueDescriptor, ExtensionDescriptor, FieldDescriptor,
    FileDescriptor, FileState, MessageDescriptor, MethodDescriptor, OneofDescriptor,
    ResolvedFeatures, ServiceDescriptor,
};
pub use table::{EnumTable, FieldEntry, MiniTable};
pub use wire::{DecodeOptions, EncodeOptions};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = wire::MAX_FIELD_NUMBER;
