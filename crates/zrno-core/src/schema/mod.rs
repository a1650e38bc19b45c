//! Serialized descriptor schema.
//!
//! This module mirrors `google/protobuf/descriptor.proto` as prost-derived
//! types, including the editions surface (feature sets, feature defaults,
//! symbol visibility) that the pool validates against. The structs follow
//! prost codegen conventions so that a descriptor set produced by any
//! conforming compiler decodes directly into them.
//!
//! The embedded descriptor for `google/protobuf/descriptor.proto` itself,
//! which the pool registers at construction so option extendees always
//! resolve, lives in [`embedded`].

pub mod embedded;

/// A collection of file descriptors, as produced by `protoc -o`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileDescriptorSet {
    /// The files in dependency order
    #[prost(message, repeated, tag = "1")]
    pub file: Vec<FileDescriptorProto>,
}

/// Describes a complete `.proto` file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileDescriptorProto {
    /// File name, relative to the root of the source tree
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Package name, e.g. "foo.bar"
    #[prost(string, optional, tag = "2")]
    pub package: Option<String>,
    /// Names of files imported by this file
    #[prost(string, repeated, tag = "3")]
    pub dependency: Vec<String>,
    /// Indexes of the public imported files in the dependency list
    #[prost(int32, repeated, packed = "false", tag = "10")]
    pub public_dependency: Vec<i32>,
    /// Indexes of the weak imported files in the dependency list
    #[prost(int32, repeated, packed = "false", tag = "11")]
    pub weak_dependency: Vec<i32>,
    /// Names of files imported for option resolution only; weaker than a
    /// full dependency
    #[prost(string, repeated, tag = "15")]
    pub option_dependency: Vec<String>,
    /// Top-level message definitions
    #[prost(message, repeated, tag = "4")]
    pub message_type: Vec<DescriptorProto>,
    /// Top-level enum definitions
    #[prost(message, repeated, tag = "5")]
    pub enum_type: Vec<EnumDescriptorProto>,
    /// Service definitions
    #[prost(message, repeated, tag = "6")]
    pub service: Vec<ServiceDescriptorProto>,
    /// Top-level extension definitions
    #[prost(message, repeated, tag = "7")]
    pub extension: Vec<FieldDescriptorProto>,
    /// File-level options
    #[prost(message, optional, tag = "8")]
    pub options: Option<FileOptions>,
    /// Source location information for error reporting and tooling
    #[prost(message, optional, tag = "9")]
    pub source_code_info: Option<SourceCodeInfo>,
    /// The syntax of the proto file: "proto2", "proto3", or "editions"
    #[prost(string, optional, tag = "12")]
    pub syntax: Option<String>,
    /// The edition of the proto file, when syntax is "editions"
    #[prost(enumeration = "Edition", optional, tag = "14")]
    pub edition: Option<i32>,
}

/// Describes a message type.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DescriptorProto {
    /// Simple (unqualified) name
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Fields, in declaration order
    #[prost(message, repeated, tag = "2")]
    pub field: Vec<FieldDescriptorProto>,
    /// Extensions declared inside this message
    #[prost(message, repeated, tag = "6")]
    pub extension: Vec<FieldDescriptorProto>,
    /// Nested message definitions
    #[prost(message, repeated, tag = "3")]
    pub nested_type: Vec<DescriptorProto>,
    /// Nested enum definitions
    #[prost(message, repeated, tag = "4")]
    pub enum_type: Vec<EnumDescriptorProto>,
    /// Ranges of field numbers open for extension
    #[prost(message, repeated, tag = "5")]
    pub extension_range: Vec<descriptor_proto::ExtensionRange>,
    /// Oneof declarations
    #[prost(message, repeated, tag = "8")]
    pub oneof_decl: Vec<OneofDescriptorProto>,
    /// Message-level options
    #[prost(message, optional, tag = "7")]
    pub options: Option<MessageOptions>,
    /// Reserved field number ranges
    #[prost(message, repeated, tag = "9")]
    pub reserved_range: Vec<descriptor_proto::ReservedRange>,
    /// Reserved field names
    #[prost(string, repeated, tag = "10")]
    pub reserved_name: Vec<String>,
    /// Explicit symbol visibility keyword
    #[prost(enumeration = "SymbolVisibility", optional, tag = "11")]
    pub visibility: Option<i32>,
}

/// Nested types for [`DescriptorProto`].
pub mod descriptor_proto {
    /// A range of field numbers open for extension. Inclusive start,
    /// exclusive end.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ExtensionRange {
        /// Inclusive start
        #[prost(int32, optional, tag = "1")]
        pub start: Option<i32>,
        /// Exclusive end
        #[prost(int32, optional, tag = "2")]
        pub end: Option<i32>,
        /// Options attached to the range
        #[prost(message, optional, tag = "3")]
        pub options: Option<super::ExtensionRangeOptions>,
    }

    /// A reserved range of field numbers. Inclusive start, exclusive end.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ReservedRange {
        /// Inclusive start
        #[prost(int32, optional, tag = "1")]
        pub start: Option<i32>,
        /// Exclusive end
        #[prost(int32, optional, tag = "2")]
        pub end: Option<i32>,
    }
}

/// Options attached to an extension range.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtensionRangeOptions {
    /// Options the parser could not interpret
    #[prost(message, repeated, tag = "999")]
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

/// Describes a field within a message, or an extension.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldDescriptorProto {
    /// Simple name
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Field number
    #[prost(int32, optional, tag = "3")]
    pub number: Option<i32>,
    /// Cardinality label
    #[prost(enumeration = "field_descriptor_proto::Label", optional, tag = "4")]
    pub label: Option<i32>,
    /// Declared type
    #[prost(enumeration = "field_descriptor_proto::Type", optional, tag = "5")]
    pub r#type: Option<i32>,
    /// For message, enum, and group types, the referenced type name. May be
    /// relative; a leading dot means fully qualified.
    #[prost(string, optional, tag = "6")]
    pub type_name: Option<String>,
    /// For extensions, the name of the extended message
    #[prost(string, optional, tag = "2")]
    pub extendee: Option<String>,
    /// Default value, in text form
    #[prost(string, optional, tag = "7")]
    pub default_value: Option<String>,
    /// Index into the containing message's oneof declarations
    #[prost(int32, optional, tag = "9")]
    pub oneof_index: Option<i32>,
    /// JSON name, if it differs from the camel-cased field name
    #[prost(string, optional, tag = "10")]
    pub json_name: Option<String>,
    /// Field-level options
    #[prost(message, optional, tag = "8")]
    pub options: Option<FieldOptions>,
    /// Marks a proto3 field declared `optional`; such fields live in a
    /// synthetic single-member oneof
    #[prost(bool, optional, tag = "17")]
    pub proto3_optional: Option<bool>,
}

/// Nested enums for [`FieldDescriptorProto`].
pub mod field_descriptor_proto {
    /// The declared field type. Values match the wire-level type numbering
    /// of descriptor.proto.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Type {
        /// double, wire type I64
        Double = 1,
        /// float, wire type I32
        Float = 2,
        /// int64, varint
        Int64 = 3,
        /// uint64, varint
        Uint64 = 4,
        /// int32, varint
        Int32 = 5,
        /// fixed64, wire type I64
        Fixed64 = 6,
        /// fixed32, wire type I32
        Fixed32 = 7,
        /// bool, varint
        Bool = 8,
        /// string, length-delimited
        String = 9,
        /// group, delimited by start/end tags (deprecated)
        Group = 10,
        /// embedded message, length-delimited
        Message = 11,
        /// bytes, length-delimited
        Bytes = 12,
        /// uint32, varint
        Uint32 = 13,
        /// enum, varint
        Enum = 14,
        /// sfixed32, wire type I32
        Sfixed32 = 15,
        /// sfixed64, wire type I64
        Sfixed64 = 16,
        /// sint32, ZigZag varint
        Sint32 = 17,
        /// sint64, ZigZag varint
        Sint64 = 18,
    }

    /// Field cardinality.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Label {
        /// Appears zero or one time
        Optional = 1,
        /// Must appear exactly once (proto2 only)
        Required = 2,
        /// Appears zero or more times
        Repeated = 3,
    }
}

/// Describes a oneof declaration.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OneofDescriptorProto {
    /// Simple name
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Oneof-level options
    #[prost(message, optional, tag = "2")]
    pub options: Option<OneofOptions>,
}

/// Describes an enum type.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnumDescriptorProto {
    /// Simple name
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// The values of this enum
    #[prost(message, repeated, tag = "2")]
    pub value: Vec<EnumValueDescriptorProto>,
    /// Enum-level options
    #[prost(message, optional, tag = "3")]
    pub options: Option<EnumOptions>,
    /// Reserved numeric ranges
    #[prost(message, repeated, tag = "4")]
    pub reserved_range: Vec<enum_descriptor_proto::EnumReservedRange>,
    /// Reserved value names
    #[prost(string, repeated, tag = "5")]
    pub reserved_name: Vec<String>,
    /// Explicit symbol visibility keyword
    #[prost(enumeration = "SymbolVisibility", optional, tag = "6")]
    pub visibility: Option<i32>,
}

/// Nested types for [`EnumDescriptorProto`].
pub mod enum_descriptor_proto {
    /// A reserved range of enum values. Unlike message reserved ranges, the
    /// end is inclusive.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct EnumReservedRange {
        /// Inclusive start
        #[prost(int32, optional, tag = "1")]
        pub start: Option<i32>,
        /// Inclusive end
        #[prost(int32, optional, tag = "2")]
        pub end: Option<i32>,
    }
}

/// Describes a value within an enum.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnumValueDescriptorProto {
    /// Value name
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Numeric value
    #[prost(int32, optional, tag = "2")]
    pub number: Option<i32>,
    /// Value-level options
    #[prost(message, optional, tag = "3")]
    pub options: Option<EnumValueOptions>,
}

/// Describes a service.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceDescriptorProto {
    /// Simple name
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Methods, in declaration order
    #[prost(message, repeated, tag = "2")]
    pub method: Vec<MethodDescriptorProto>,
    /// Service-level options
    #[prost(message, optional, tag = "3")]
    pub options: Option<ServiceOptions>,
}

/// Describes a method of a service.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MethodDescriptorProto {
    /// Simple name
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Input message type name
    #[prost(string, optional, tag = "2")]
    pub input_type: Option<String>,
    /// Output message type name
    #[prost(string, optional, tag = "3")]
    pub output_type: Option<String>,
    /// Method-level options
    #[prost(message, optional, tag = "4")]
    pub options: Option<MethodOptions>,
    /// True if the client streams multiple requests
    #[prost(bool, optional, tag = "5")]
    pub client_streaming: Option<bool>,
    /// True if the server streams multiple responses
    #[prost(bool, optional, tag = "6")]
    pub server_streaming: Option<bool>,
}

/// File-level options.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileOptions {
    /// Java package override
    #[prost(string, optional, tag = "1")]
    pub java_package: Option<String>,
    /// Go package override
    #[prost(string, optional, tag = "11")]
    pub go_package: Option<String>,
    /// Marks the whole file deprecated
    #[prost(bool, optional, tag = "23")]
    pub deprecated: Option<bool>,
    /// Historical C++ arena switch; always on in current runtimes
    #[prost(bool, optional, tag = "31")]
    pub cc_enable_arenas: Option<bool>,
    /// Explicit feature overrides
    #[prost(message, optional, tag = "50")]
    pub features: Option<FeatureSet>,
    /// Options the parser could not interpret
    #[prost(message, repeated, tag = "999")]
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

/// Message-level options.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageOptions {
    /// Legacy MessageSet wire format; not supported by this runtime
    #[prost(bool, optional, tag = "1")]
    pub message_set_wire_format: Option<bool>,
    /// Marks the message deprecated
    #[prost(bool, optional, tag = "3")]
    pub deprecated: Option<bool>,
    /// Marks a synthetic map entry message
    #[prost(bool, optional, tag = "7")]
    pub map_entry: Option<bool>,
    /// Waives JSON name conflict checks for legacy schemas
    #[prost(bool, optional, tag = "11")]
    pub deprecated_legacy_json_field_conflicts: Option<bool>,
    /// Explicit feature overrides
    #[prost(message, optional, tag = "12")]
    pub features: Option<FeatureSet>,
    /// Options the parser could not interpret
    #[prost(message, repeated, tag = "999")]
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

/// Field-level options.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldOptions {
    /// Packed encoding override for repeated scalar fields (pre-editions)
    #[prost(bool, optional, tag = "2")]
    pub packed: Option<bool>,
    /// Marks the field deprecated
    #[prost(bool, optional, tag = "3")]
    pub deprecated: Option<bool>,
    /// Hint that the sub-message may be parsed lazily; must not change
    /// observable semantics
    #[prost(bool, optional, tag = "5")]
    pub lazy: Option<bool>,
    /// Like `lazy`, but without eager verification of the payload
    #[prost(bool, optional, tag = "15")]
    pub unverified_lazy: Option<bool>,
    /// Redact this field from debug output
    #[prost(bool, optional, tag = "16")]
    pub debug_redact: Option<bool>,
    /// Explicit feature overrides
    #[prost(message, optional, tag = "21")]
    pub features: Option<FeatureSet>,
    /// Options the parser could not interpret
    #[prost(message, repeated, tag = "999")]
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

/// Oneof-level options.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OneofOptions {
    /// Explicit feature overrides
    #[prost(message, optional, tag = "1")]
    pub features: Option<FeatureSet>,
    /// Options the parser could not interpret
    #[prost(message, repeated, tag = "999")]
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

/// Enum-level options.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnumOptions {
    /// Permits multiple names to map to the same numeric value
    #[prost(bool, optional, tag = "2")]
    pub allow_alias: Option<bool>,
    /// Marks the enum deprecated
    #[prost(bool, optional, tag = "3")]
    pub deprecated: Option<bool>,
    /// Waives JSON name conflict checks for legacy schemas
    #[prost(bool, optional, tag = "6")]
    pub deprecated_legacy_json_field_conflicts: Option<bool>,
    /// Explicit feature overrides
    #[prost(message, optional, tag = "7")]
    pub features: Option<FeatureSet>,
    /// Options the parser could not interpret
    #[prost(message, repeated, tag = "999")]
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

/// Enum-value-level options.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnumValueOptions {
    /// Marks the value deprecated
    #[prost(bool, optional, tag = "1")]
    pub deprecated: Option<bool>,
    /// Explicit feature overrides
    #[prost(message, optional, tag = "2")]
    pub features: Option<FeatureSet>,
    /// Redact this value from debug output
    #[prost(bool, optional, tag = "3")]
    pub debug_redact: Option<bool>,
    /// Options the parser could not interpret
    #[prost(message, repeated, tag = "999")]
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

/// Service-level options.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceOptions {
    /// Marks the service deprecated
    #[prost(bool, optional, tag = "33")]
    pub deprecated: Option<bool>,
    /// Explicit feature overrides
    #[prost(message, optional, tag = "34")]
    pub features: Option<FeatureSet>,
    /// Options the parser could not interpret
    #[prost(message, repeated, tag = "999")]
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

/// Method-level options.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MethodOptions {
    /// Marks the method deprecated
    #[prost(bool, optional, tag = "33")]
    pub deprecated: Option<bool>,
    /// Explicit feature overrides
    #[prost(message, optional, tag = "35")]
    pub features: Option<FeatureSet>,
    /// Options the parser could not interpret
    #[prost(message, repeated, tag = "999")]
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

/// A bundle of feature values, either explicit overrides on an entity or a
/// fully resolved set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FeatureSet {
    /// Presence discipline for singular fields
    #[prost(enumeration = "feature_set::FieldPresence", optional, tag = "1")]
    pub field_presence: Option<i32>,
    /// Open or closed enum semantics
    #[prost(enumeration = "feature_set::EnumType", optional, tag = "2")]
    pub enum_type: Option<i32>,
    /// Packed or expanded encoding for repeated scalar fields
    #[prost(
        enumeration = "feature_set::RepeatedFieldEncoding",
        optional,
        tag = "3"
    )]
    pub repeated_field_encoding: Option<i32>,
    /// Whether string fields are validated as UTF-8
    #[prost(enumeration = "feature_set::Utf8Validation", optional, tag = "4")]
    pub utf8_validation: Option<i32>,
    /// Length-prefixed or group-delimited sub-message encoding
    #[prost(enumeration = "feature_set::MessageEncoding", optional, tag = "5")]
    pub message_encoding: Option<i32>,
    /// JSON mapping strictness
    #[prost(enumeration = "feature_set::JsonFormat", optional, tag = "6")]
    pub json_format: Option<i32>,
    /// How aggressively name style is enforced
    #[prost(enumeration = "feature_set::EnforceNamingStyle", optional, tag = "7")]
    pub enforce_naming_style: Option<i32>,
    /// Default visibility of symbols without an explicit keyword
    #[prost(
        enumeration = "feature_set::DefaultSymbolVisibility",
        optional,
        tag = "8"
    )]
    pub default_symbol_visibility: Option<i32>,
}

/// Nested enums for [`FeatureSet`].
pub mod feature_set {
    /// Presence discipline for singular fields.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum FieldPresence {
        /// Unset; resolved from the parent or edition default
        Unknown = 0,
        /// Presence is tracked explicitly (hazzers)
        Explicit = 1,
        /// Presence is inferred from the default value
        Implicit = 2,
        /// proto2 `required`
        LegacyRequired = 3,
    }

    /// Open or closed enum semantics.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum EnumType {
        /// Unset; resolved from the parent or edition default
        Unknown = 0,
        /// Unknown values are stored in the field as int32
        Open = 1,
        /// Unknown values go to the unknown-field set
        Closed = 2,
    }

    /// Packed or expanded encoding for repeated scalar fields.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum RepeatedFieldEncoding {
        /// Unset; resolved from the parent or edition default
        Unknown = 0,
        /// Single length-delimited run of scalar values
        Packed = 1,
        /// One tagged record per element
        Expanded = 2,
    }

    /// Whether string fields are validated as UTF-8.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Utf8Validation {
        /// Unset; resolved from the parent or edition default
        Unknown = 0,
        /// Validate on parse, reject invalid sequences
        Verify = 2,
        /// No validation
        None = 3,
    }

    /// Sub-message encoding scheme.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum MessageEncoding {
        /// Unset; resolved from the parent or edition default
        Unknown = 0,
        /// Length-prefixed (LEN wire type)
        LengthPrefixed = 1,
        /// Group-delimited (SGROUP/EGROUP tags)
        Delimited = 2,
    }

    /// JSON mapping strictness.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum JsonFormat {
        /// Unset; resolved from the parent or edition default
        Unknown = 0,
        /// JSON mapping must be well-defined (name conflicts rejected)
        Allow = 1,
        /// Best-effort mapping for legacy proto2 schemas
        LegacyBestEffort = 2,
    }

    /// How aggressively name style is enforced.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum EnforceNamingStyle {
        /// Unset; resolved from the parent or edition default
        Unknown = 0,
        /// Names must follow the style guide
        Style2024 = 1,
        /// Legacy names accepted
        StyleLegacy = 2,
    }

    /// Default visibility of symbols that carry no explicit keyword.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum DefaultSymbolVisibility {
        /// Unset; resolved from the parent or edition default
        Unknown = 0,
        /// Every symbol defaults to export
        ExportAll = 1,
        /// Top-level symbols export, nested symbols are local
        ExportTopLevel = 2,
        /// Every symbol defaults to local
        LocalAll = 3,
        /// Like ExportTopLevel, reserved for stricter future checks
        Strict = 4,
    }
}

/// The feature defaults of a range of editions, as shipped by the schema
/// compiler.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FeatureSetDefaults {
    /// Per-edition default bundles, ordered by edition
    #[prost(message, repeated, tag = "1")]
    pub defaults: Vec<feature_set_defaults::FeatureSetEditionDefault>,
    /// Earliest edition covered
    #[prost(enumeration = "Edition", optional, tag = "4")]
    pub minimum_edition: Option<i32>,
    /// Latest edition covered
    #[prost(enumeration = "Edition", optional, tag = "5")]
    pub maximum_edition: Option<i32>,
}

/// Nested types for [`FeatureSetDefaults`].
pub mod feature_set_defaults {
    /// The defaults introduced by a single edition.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FeatureSetEditionDefault {
        /// The edition these defaults take effect in
        #[prost(enumeration = "super::Edition", optional, tag = "3")]
        pub edition: Option<i32>,
        /// Defaults the schema may override
        #[prost(message, optional, tag = "4")]
        pub overridable_features: Option<super::FeatureSet>,
        /// Defaults fixed by the edition
        #[prost(message, optional, tag = "5")]
        pub fixed_features: Option<super::FeatureSet>,
    }
}

/// A single option the schema parser left uninterpreted, to be resolved
/// against the descriptor's own schema by the pool.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UninterpretedOption {
    /// The option name, split into parts
    #[prost(message, repeated, tag = "2")]
    pub name: Vec<uninterpreted_option::NamePart>,
    /// Value as an identifier
    #[prost(string, optional, tag = "3")]
    pub identifier_value: Option<String>,
    /// Value as a positive integer
    #[prost(uint64, optional, tag = "4")]
    pub positive_int_value: Option<u64>,
    /// Value as a negative integer
    #[prost(int64, optional, tag = "5")]
    pub negative_int_value: Option<i64>,
    /// Value as a double
    #[prost(double, optional, tag = "6")]
    pub double_value: Option<f64>,
    /// Value as a string
    #[prost(bytes = "vec", optional, tag = "7")]
    pub string_value: Option<Vec<u8>>,
    /// Value as an aggregate (text-format message)
    #[prost(string, optional, tag = "8")]
    pub aggregate_value: Option<String>,
}

/// Nested types for [`UninterpretedOption`].
pub mod uninterpreted_option {
    /// One dot-separated segment of an option name. Extension segments are
    /// written in parentheses in source and flagged here.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NamePart {
        /// The segment text
        #[prost(string, required, tag = "1")]
        pub name_part: String,
        /// True if the segment names an extension
        #[prost(bool, required, tag = "2")]
        pub is_extension: bool,
    }
}

/// Source location information for a file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SourceCodeInfo {
    /// One location record per interesting path in the file
    #[prost(message, repeated, tag = "1")]
    pub location: Vec<source_code_info::Location>,
}

/// Nested types for [`SourceCodeInfo`].
pub mod source_code_info {
    /// The span of one schema element.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Location {
        /// Path of field numbers and indices identifying the element
        #[prost(int32, repeated, tag = "1")]
        pub path: Vec<i32>,
        /// start_line, start_column, end_line\[, end_column\], all 0-based
        #[prost(int32, repeated, tag = "2")]
        pub span: Vec<i32>,
        /// Comments directly attached before the element
        #[prost(string, optional, tag = "3")]
        pub leading_comments: Option<String>,
        /// Comments directly attached after the element
        #[prost(string, optional, tag = "4")]
        pub trailing_comments: Option<String>,
        /// Detached comment blocks preceding the element
        #[prost(string, repeated, tag = "6")]
        pub leading_detached_comments: Vec<String>,
    }
}

/// A versioned schema dialect selecting default features.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Edition {
    /// Unset or unrecognized
    Unknown = 0,
    /// Internal placeholder for pre-editions files
    Legacy = 900,
    /// proto2, expressed as an edition
    Proto2 = 998,
    /// proto3, expressed as an edition
    Proto3 = 999,
    /// Edition 2023, the first named edition
    Edition2023 = 1000,
    /// Edition 2024
    Edition2024 = 1001,
}

/// Explicit `export`/`local` keyword on a message or enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SymbolVisibility {
    /// No keyword; visibility derives from the file's default
    Unset = 0,
    /// Only referencable from the defining file
    Local = 1,
    /// Referencable from any importing file
    Export = 2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_file_descriptor_proto_round_trip() {
        let proto = FileDescriptorProto {
            name: Some("test.proto".to_string()),
            package: Some("test".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Msg".to_string()),
                field: vec![FieldDescriptorProto {
                    name: Some("x".to_string()),
                    number: Some(1),
                    label: Some(field_descriptor_proto::Label::Optional as i32),
                    r#type: Some(field_descriptor_proto::Type::Int64 as i32),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let bytes = proto.encode_to_vec();
        let decoded = FileDescriptorProto::decode(bytes.as_slice()).unwrap();
        assert_eq!(proto, decoded);
        assert_eq!(decoded.name(), "test.proto");
        assert_eq!(decoded.message_type[0].field[0].number(), 1);
    }

    #[test]
    fn test_accessor_defaults() {
        let field = FieldDescriptorProto::default();
        assert_eq!(field.name(), "");
        assert_eq!(field.number(), 0);
        assert_eq!(field.label(), field_descriptor_proto::Label::Optional);
        assert!(!field.proto3_optional());
    }

    #[test]
    fn test_edition_accessor() {
        let mut file = FileDescriptorProto::default();
        assert_eq!(file.edition(), Edition::Unknown);
        file.edition = Some(Edition::Edition2023 as i32);
        assert_eq!(file.edition(), Edition::Edition2023);
        // Unrecognized editions come back as Unknown rather than panicking.
        file.edition = Some(12345);
        assert_eq!(file.edition(), Edition::Unknown);
    }

    #[test]
    fn test_visibility_keyword() {
        let mut msg = DescriptorProto::default();
        assert_eq!(msg.visibility(), SymbolVisibility::Unset);
        msg.visibility = Some(SymbolVisibility::Local as i32);
        assert_eq!(msg.visibility(), SymbolVisibility::Local);
    }
}
