//! Embedded descriptor for `google/protobuf/descriptor.proto`.
//!
//! Option interpretation resolves custom options against extensions of the
//! options messages, so the pool must always be able to look those messages
//! up. Rather than shipping a serialized descriptor set, the file descriptor
//! is constructed here directly; the pool registers it eagerly at
//! construction (lazy loading never applies to it).
//!
//! The reproduction is faithful for the option-interpretation surface: all
//! options messages with their extension ranges, the feature set, and the
//! descriptor messages themselves with their principal fields.

use super::field_descriptor_proto::{Label, Type};
use super::*;

fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn repeated(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..scalar(name, number, ty)
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..scalar(name, number, Type::Message)
    }
}

fn repeated_message(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..message_field(name, number, type_name)
    }
}

fn enum_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..scalar(name, number, Type::Enum)
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

/// An options message: fields plus the customary 1000-to-max extension range.
fn options_message(name: &str, mut fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    fields.push(repeated_message(
        "uninterpreted_option",
        999,
        ".google.protobuf.UninterpretedOption",
    ));
    DescriptorProto {
        extension_range: vec![descriptor_proto::ExtensionRange {
            start: Some(1000),
            end: Some((crate::wire::MAX_FIELD_NUMBER + 1) as i32),
            options: None,
        }],
        ..message(name, fields)
    }
}

fn enum_type(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(name.to_string()),
        value: values
            .iter()
            .map(|(value_name, number)| EnumValueDescriptorProto {
                name: Some(value_name.to_string()),
                number: Some(*number),
                options: None,
            })
            .collect(),
        ..Default::default()
    }
}

fn feature_set_message() -> DescriptorProto {
    let mut msg = message(
        "FeatureSet",
        vec![
            enum_field(
                "field_presence",
                1,
                ".google.protobuf.FeatureSet.FieldPresence",
            ),
            enum_field("enum_type", 2, ".google.protobuf.FeatureSet.EnumType"),
            enum_field(
                "repeated_field_encoding",
                3,
                ".google.protobuf.FeatureSet.RepeatedFieldEncoding",
            ),
            enum_field(
                "utf8_validation",
                4,
                ".google.protobuf.FeatureSet.Utf8Validation",
            ),
            enum_field(
                "message_encoding",
                5,
                ".google.protobuf.FeatureSet.MessageEncoding",
            ),
            enum_field("json_format", 6, ".google.protobuf.FeatureSet.JsonFormat"),
            enum_field(
                "enforce_naming_style",
                7,
                ".google.protobuf.FeatureSet.EnforceNamingStyle",
            ),
            enum_field(
                "default_symbol_visibility",
                8,
                ".google.protobuf.FeatureSet.DefaultSymbolVisibility",
            ),
        ],
    );
    msg.enum_type = vec![
        enum_type(
            "FieldPresence",
            &[
                ("FIELD_PRESENCE_UNKNOWN", 0),
                ("EXPLICIT", 1),
                ("IMPLICIT", 2),
                ("LEGACY_REQUIRED", 3),
            ],
        ),
        enum_type(
            "EnumType",
            &[("ENUM_TYPE_UNKNOWN", 0), ("OPEN", 1), ("CLOSED", 2)],
        ),
        enum_type(
            "RepeatedFieldEncoding",
            &[
                ("REPEATED_FIELD_ENCODING_UNKNOWN", 0),
                ("PACKED", 1),
                ("EXPANDED", 2),
            ],
        ),
        enum_type(
            "Utf8Validation",
            &[("UTF8_VALIDATION_UNKNOWN", 0), ("VERIFY", 2), ("NONE", 3)],
        ),
        enum_type(
            "MessageEncoding",
            &[
                ("MESSAGE_ENCODING_UNKNOWN", 0),
                ("LENGTH_PREFIXED", 1),
                ("DELIMITED", 2),
            ],
        ),
        enum_type(
            "JsonFormat",
            &[
                ("JSON_FORMAT_UNKNOWN", 0),
                ("ALLOW", 1),
                ("LEGACY_BEST_EFFORT", 2),
            ],
        ),
        enum_type(
            "EnforceNamingStyle",
            &[
                ("ENFORCE_NAMING_STYLE_UNKNOWN", 0),
                ("STYLE2024", 1),
                ("STYLE_LEGACY", 2),
            ],
        ),
        enum_type(
            "DefaultSymbolVisibility",
            &[
                ("DEFAULT_SYMBOL_VISIBILITY_UNKNOWN", 0),
                ("EXPORT_ALL", 1),
                ("EXPORT_TOP_LEVEL", 2),
                ("LOCAL_ALL", 3),
                ("STRICT", 4),
            ],
        ),
    ];
    // The feature set itself accepts language-scoped feature extensions.
    msg.extension_range = vec![descriptor_proto::ExtensionRange {
        start: Some(1000),
        end: Some(10_000),
        options: None,
    }];
    msg
}

/// Builds the `FileDescriptorProto` for `google/protobuf/descriptor.proto`.
pub fn descriptor_proto_file() -> FileDescriptorProto {
    let file_descriptor_proto = message(
        "FileDescriptorProto",
        vec![
            scalar("name", 1, Type::String),
            scalar("package", 2, Type::String),
            repeated("dependency", 3, Type::String),
            repeated("public_dependency", 10, Type::Int32),
            repeated("weak_dependency", 11, Type::Int32),
            repeated("option_dependency", 15, Type::String),
            repeated_message("message_type", 4, ".google.protobuf.DescriptorProto"),
            repeated_message("enum_type", 5, ".google.protobuf.EnumDescriptorProto"),
            repeated_message("service", 6, ".google.protobuf.ServiceDescriptorProto"),
            repeated_message("extension", 7, ".google.protobuf.FieldDescriptorProto"),
            message_field("options", 8, ".google.protobuf.FileOptions"),
            message_field("source_code_info", 9, ".google.protobuf.SourceCodeInfo"),
            scalar("syntax", 12, Type::String),
            enum_field("edition", 14, ".google.protobuf.Edition"),
        ],
    );

    let mut descriptor_proto = message(
        "DescriptorProto",
        vec![
            scalar("name", 1, Type::String),
            repeated_message("field", 2, ".google.protobuf.FieldDescriptorProto"),
            repeated_message("extension", 6, ".google.protobuf.FieldDescriptorProto"),
            repeated_message("nested_type", 3, ".google.protobuf.DescriptorProto"),
            repeated_message("enum_type", 4, ".google.protobuf.EnumDescriptorProto"),
            repeated_message(
                "extension_range",
                5,
                ".google.protobuf.DescriptorProto.ExtensionRange",
            ),
            repeated_message("oneof_decl", 8, ".google.protobuf.OneofDescriptorProto"),
            message_field("options", 7, ".google.protobuf.MessageOptions"),
            repeated_message(
                "reserved_range",
                9,
                ".google.protobuf.DescriptorProto.ReservedRange",
            ),
            repeated("reserved_name", 10, Type::String),
            enum_field("visibility", 11, ".google.protobuf.SymbolVisibility"),
        ],
    );
    descriptor_proto.nested_type = vec![
        message(
            "ExtensionRange",
            vec![
                scalar("start", 1, Type::Int32),
                scalar("end", 2, Type::Int32),
                message_field("options", 3, ".google.protobuf.ExtensionRangeOptions"),
            ],
        ),
        message(
            "ReservedRange",
            vec![scalar("start", 1, Type::Int32), scalar("end", 2, Type::Int32)],
        ),
    ];

    let field_descriptor_proto = {
        let mut msg = message(
            "FieldDescriptorProto",
            vec![
                scalar("name", 1, Type::String),
                scalar("extendee", 2, Type::String),
                scalar("number", 3, Type::Int32),
                enum_field("label", 4, ".google.protobuf.FieldDescriptorProto.Label"),
                enum_field("type", 5, ".google.protobuf.FieldDescriptorProto.Type"),
                scalar("type_name", 6, Type::String),
                scalar("default_value", 7, Type::String),
                message_field("options", 8, ".google.protobuf.FieldOptions"),
                scalar("oneof_index", 9, Type::Int32),
                scalar("json_name", 10, Type::String),
                scalar("proto3_optional", 17, Type::Bool),
            ],
        );
        msg.enum_type = vec![
            enum_type(
                "Type",
                &[
                    ("TYPE_DOUBLE", 1),
                    ("TYPE_FLOAT", 2),
                    ("TYPE_INT64", 3),
                    ("TYPE_UINT64", 4),
                    ("TYPE_INT32", 5),
                    ("TYPE_FIXED64", 6),
                    ("TYPE_FIXED32", 7),
                    ("TYPE_BOOL", 8),
                    ("TYPE_STRING", 9),
                    ("TYPE_GROUP", 10),
                    ("TYPE_MESSAGE", 11),
                    ("TYPE_BYTES", 12),
                    ("TYPE_UINT32", 13),
                    ("TYPE_ENUM", 14),
                    ("TYPE_SFIXED32", 15),
                    ("TYPE_SFIXED64", 16),
                    ("TYPE_SINT32", 17),
                    ("TYPE_SINT64", 18),
                ],
            ),
            enum_type(
                "Label",
                &[
                    ("LABEL_OPTIONAL", 1),
                    ("LABEL_REQUIRED", 2),
                    ("LABEL_REPEATED", 3),
                ],
            ),
        ];
        msg
    };

    FileDescriptorProto {
        name: Some("google/protobuf/descriptor.proto".to_string()),
        package: Some("google.protobuf".to_string()),
        syntax: Some("proto2".to_string()),
        message_type: vec![
            message(
                "FileDescriptorSet",
                vec![repeated_message(
                    "file",
                    1,
                    ".google.protobuf.FileDescriptorProto",
                )],
            ),
            file_descriptor_proto,
            descriptor_proto,
            options_message("ExtensionRangeOptions", vec![]),
            field_descriptor_proto,
            message(
                "OneofDescriptorProto",
                vec![
                    scalar("name", 1, Type::String),
                    message_field("options", 2, ".google.protobuf.OneofOptions"),
                ],
            ),
            {
                let mut msg = message(
                    "EnumDescriptorProto",
                    vec![
                        scalar("name", 1, Type::String),
                        repeated_message("value", 2, ".google.protobuf.EnumValueDescriptorProto"),
                        message_field("options", 3, ".google.protobuf.EnumOptions"),
                        repeated_message(
                            "reserved_range",
                            4,
                            ".google.protobuf.EnumDescriptorProto.EnumReservedRange",
                        ),
                        repeated("reserved_name", 5, Type::String),
                        enum_field("visibility", 6, ".google.protobuf.SymbolVisibility"),
                    ],
                );
                msg.nested_type = vec![message(
                    "EnumReservedRange",
                    vec![scalar("start", 1, Type::Int32), scalar("end", 2, Type::Int32)],
                )];
                msg
            },
            message(
                "EnumValueDescriptorProto",
                vec![
                    scalar("name", 1, Type::String),
                    scalar("number", 2, Type::Int32),
                    message_field("options", 3, ".google.protobuf.EnumValueOptions"),
                ],
            ),
            message(
                "ServiceDescriptorProto",
                vec![
                    scalar("name", 1, Type::String),
                    repeated_message("method", 2, ".google.protobuf.MethodDescriptorProto"),
                    message_field("options", 3, ".google.protobuf.ServiceOptions"),
                ],
            ),
            message(
                "MethodDescriptorProto",
                vec![
                    scalar("name", 1, Type::String),
                    scalar("input_type", 2, Type::String),
                    scalar("output_type", 3, Type::String),
                    message_field("options", 4, ".google.protobuf.MethodOptions"),
                    scalar("client_streaming", 5, Type::Bool),
                    scalar("server_streaming", 6, Type::Bool),
                ],
            ),
            options_message(
                "FileOptions",
                vec![
                    scalar("java_package", 1, Type::String),
                    scalar("go_package", 11, Type::String),
                    scalar("deprecated", 23, Type::Bool),
                    scalar("cc_enable_arenas", 31, Type::Bool),
                    message_field("features", 50, ".google.protobuf.FeatureSet"),
                ],
            ),
            options_message(
                "MessageOptions",
                vec![
                    scalar("message_set_wire_format", 1, Type::Bool),
                    scalar("deprecated", 3, Type::Bool),
                    scalar("map_entry", 7, Type::Bool),
                    scalar("deprecated_legacy_json_field_conflicts", 11, Type::Bool),
                    message_field("features", 12, ".google.protobuf.FeatureSet"),
                ],
            ),
            options_message(
                "FieldOptions",
                vec![
                    scalar("packed", 2, Type::Bool),
                    scalar("deprecated", 3, Type::Bool),
                    scalar("lazy", 5, Type::Bool),
                    scalar("unverified_lazy", 15, Type::Bool),
                    scalar("debug_redact", 16, Type::Bool),
                    message_field("features", 21, ".google.protobuf.FeatureSet"),
                ],
            ),
            options_message(
                "OneofOptions",
                vec![message_field("features", 1, ".google.protobuf.FeatureSet")],
            ),
            options_message(
                "EnumOptions",
                vec![
                    scalar("allow_alias", 2, Type::Bool),
                    scalar("deprecated", 3, Type::Bool),
                    scalar("deprecated_legacy_json_field_conflicts", 6, Type::Bool),
                    message_field("features", 7, ".google.protobuf.FeatureSet"),
                ],
            ),
            options_message(
                "EnumValueOptions",
                vec![
                    scalar("deprecated", 1, Type::Bool),
                    message_field("features", 2, ".google.protobuf.FeatureSet"),
                    scalar("debug_redact", 3, Type::Bool),
                ],
            ),
            options_message(
                "ServiceOptions",
                vec![
                    scalar("deprecated", 33, Type::Bool),
                    message_field("features", 34, ".google.protobuf.FeatureSet"),
                ],
            ),
            options_message(
                "MethodOptions",
                vec![
                    scalar("deprecated", 33, Type::Bool),
                    message_field("features", 35, ".google.protobuf.FeatureSet"),
                ],
            ),
            {
                let mut msg = message(
                    "UninterpretedOption",
                    vec![
                        repeated_message(
                            "name",
                            2,
                            ".google.protobuf.UninterpretedOption.NamePart",
                        ),
                        scalar("identifier_value", 3, Type::String),
                        scalar("positive_int_value", 4, Type::Uint64),
                        scalar("negative_int_value", 5, Type::Int64),
                        scalar("double_value", 6, Type::Double),
                        scalar("string_value", 7, Type::Bytes),
                        scalar("aggregate_value", 8, Type::String),
                    ],
                );
                msg.nested_type = vec![message(
                    "NamePart",
                    vec![
                        FieldDescriptorProto {
                            label: Some(Label::Required as i32),
                            ..scalar("name_part", 1, Type::String)
                        },
                        FieldDescriptorProto {
                            label: Some(Label::Required as i32),
                            ..scalar("is_extension", 2, Type::Bool)
                        },
                    ],
                )];
                msg
            },
            feature_set_message(),
            {
                let mut msg = message(
                    "SourceCodeInfo",
                    vec![repeated_message(
                        "location",
                        1,
                        ".google.protobuf.SourceCodeInfo.Location",
                    )],
                );
                msg.nested_type = vec![message(
                    "Location",
                    vec![
                        repeated("path", 1, Type::Int32),
                        repeated("span", 2, Type::Int32),
                        scalar("leading_comments", 3, Type::String),
                        scalar("trailing_comments", 4, Type::String),
                        repeated("leading_detached_comments", 6, Type::String),
                    ],
                )];
                msg
            },
        ],
        enum_type: vec![
            enum_type(
                "Edition",
                &[
                    ("EDITION_UNKNOWN", 0),
                    ("EDITION_LEGACY", 900),
                    ("EDITION_PROTO2", 998),
                    ("EDITION_PROTO3", 999),
                    ("EDITION_2023", 1000),
                    ("EDITION_2024", 1001),
                ],
            ),
            enum_type(
                "SymbolVisibility",
                &[
                    ("VISIBILITY_UNSET", 0),
                    ("VISIBILITY_LOCAL", 1),
                    ("VISIBILITY_EXPORT", 2),
                ],
            ),
        ],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_file_shape() {
        let file = descriptor_proto_file();
        assert_eq!(file.name(), "google/protobuf/descriptor.proto");
        assert_eq!(file.package(), "google.protobuf");
        assert!(file
            .message_type
            .iter()
            .any(|m| m.name() == "FileDescriptorProto"));
        assert!(file.message_type.iter().any(|m| m.name() == "FeatureSet"));
    }

    #[test]
    fn test_options_messages_are_extendable() {
        let file = descriptor_proto_file();
        let field_options = file
            .message_type
            .iter()
            .find(|m| m.name() == "FieldOptions")
            .unwrap();
        assert_eq!(field_options.extension_range.len(), 1);
        assert_eq!(field_options.extension_range[0].start(), 1000);
    }

    #[test]
    fn test_feature_set_enums_present() {
        let file = descriptor_proto_file();
        let features = file
            .message_type
            .iter()
            .find(|m| m.name() == "FeatureSet")
            .unwrap();
        assert_eq!(features.enum_type.len(), 8);
        assert_eq!(features.field.len(), 8);
    }
}
