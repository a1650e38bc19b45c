//! Descriptor pool scenarios: the validation matrix, visibility
//! enforcement, editions behavior, and lazy dependency loading.

use prost::Message as _;

use zrno_core::schema::field_descriptor_proto::{Label, Type};
use zrno_core::schema::{
    self, DescriptorProto, EnumDescriptorProto, EnumOptions, EnumValueDescriptorProto,
    FieldDescriptorProto, FileDescriptorProto, MessageOptions, ServiceDescriptorProto,
    MethodDescriptorProto,
};
use zrno_core::{wire, Arena, DescriptorPool, DynamicMessage, Error, FileState, Value};

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn proto3_file(name: &str, package: &str, messages: Vec<DescriptorProto>) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some(package.to_string()),
        syntax: Some("proto3".to_string()),
        message_type: messages,
        ..Default::default()
    }
}

#[test]
fn local_symbols_cannot_cross_files() {
    let mut pool = DescriptorPool::new();

    // other.proto is an edition-2024 file with an explicitly local message.
    let other = FileDescriptorProto {
        name: Some("other.proto".to_string()),
        package: Some("other".to_string()),
        syntax: Some("editions".to_string()),
        edition: Some(schema::Edition::Edition2024 as i32),
        message_type: vec![DescriptorProto {
            visibility: Some(schema::SymbolVisibility::Local as i32),
            ..message("Msg", vec![field("x", 1, Type::Int32)])
        }],
        ..Default::default()
    };
    pool.add_file_proto(other).unwrap();

    // A field of type other.Msg in a different file must be rejected.
    let mut user = proto3_file(
        "user.proto",
        "user",
        vec![message(
            "Uses",
            vec![FieldDescriptorProto {
                type_name: Some(".other.Msg".to_string()),
                ..field("m", 1, Type::Message)
            }],
        )],
    );
    user.dependency = vec!["other.proto".to_string()];

    let err = pool.add_file_proto(user).unwrap_err();
    assert!(matches!(err, Error::VisibilityViolation { .. }));

    // Within its own file the local message is usable; it is also still
    // findable through the pool, which is same-pool access, not an import.
    assert!(pool.find_message_by_name("other.Msg").is_some());
}

#[test]
fn edition_2024_defaults_nested_types_to_local() {
    let mut pool = DescriptorPool::new();
    let lib = FileDescriptorProto {
        name: Some("lib.proto".to_string()),
        package: Some("lib".to_string()),
        syntax: Some("editions".to_string()),
        edition: Some(schema::Edition::Edition2024 as i32),
        message_type: vec![DescriptorProto {
            nested_type: vec![message("Inner", vec![field("x", 1, Type::Int32)])],
            ..message("Outer", vec![])
        }],
        ..Default::default()
    };
    pool.add_file_proto(lib).unwrap();

    // Top-level type: fine across files.
    let mut ok_user = proto3_file(
        "ok_user.proto",
        "u1",
        vec![message(
            "A",
            vec![FieldDescriptorProto {
                type_name: Some(".lib.Outer".to_string()),
                ..field("m", 1, Type::Message)
            }],
        )],
    );
    ok_user.dependency = vec!["lib.proto".to_string()];
    pool.add_file_proto(ok_user).unwrap();

    // Nested type: local by EXPORT_TOP_LEVEL default.
    let mut bad_user = proto3_file(
        "bad_user.proto",
        "u2",
        vec![message(
            "B",
            vec![FieldDescriptorProto {
                type_name: Some(".lib.Outer.Inner".to_string()),
                ..field("m", 1, Type::Message)
            }],
        )],
    );
    bad_user.dependency = vec!["lib.proto".to_string()];
    assert!(matches!(
        pool.add_file_proto(bad_user),
        Err(Error::VisibilityViolation { .. })
    ));
}

#[test]
fn reserved_and_implementation_field_numbers_rejected() {
    let mut pool = DescriptorPool::new();

    // 19000 belongs to the implementation-reserved block.
    let err = pool
        .add_file_proto(proto3_file(
            "r1.proto",
            "r1",
            vec![message("M", vec![field("f", 19_000, Type::Int32)])],
        ))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidFieldNumber { .. }));

    // A schema-reserved range.
    let mut reserved = message("M", vec![field("f", 5, Type::Int32)]);
    reserved.reserved_range = vec![schema::descriptor_proto::ReservedRange {
        start: Some(5),
        end: Some(10),
    }];
    let err = pool
        .add_file_proto(proto3_file("r2.proto", "r2", vec![reserved]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidFieldNumber { .. }));

    // A reserved name.
    let mut named = message("M", vec![field("gone", 1, Type::Int32)]);
    named.reserved_name = vec!["gone".to_string()];
    let err = pool
        .add_file_proto(proto3_file("r3.proto", "r3", vec![named]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDescriptor { .. }));
}

#[test]
fn duplicate_symbols_across_files_rejected() {
    let mut pool = DescriptorPool::new();
    pool.add_file_proto(proto3_file(
        "a.proto",
        "pkg",
        vec![message("Thing", vec![])],
    ))
    .unwrap();

    let err = pool
        .add_file_proto(proto3_file(
            "b.proto",
            "pkg",
            vec![message("Thing", vec![])],
        ))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateSymbol { .. }));

    // The failed file publishes nothing.
    assert_eq!(pool.file_state("b.proto"), None);
}

#[test]
fn enum_aliases_require_allow_alias() {
    let mut pool = DescriptorPool::new();

    let aliased = EnumDescriptorProto {
        name: Some("E".to_string()),
        value: vec![
            EnumValueDescriptorProto {
                name: Some("E_ZERO".to_string()),
                number: Some(0),
                options: None,
            },
            EnumValueDescriptorProto {
                name: Some("E_NULL".to_string()),
                number: Some(0),
                options: None,
            },
        ],
        ..Default::default()
    };

    let mut without = FileDescriptorProto {
        name: Some("e1.proto".to_string()),
        package: Some("e1".to_string()),
        syntax: Some("proto3".to_string()),
        enum_type: vec![aliased.clone()],
        ..Default::default()
    };
    assert!(matches!(
        pool.add_file_proto(without.clone()),
        Err(Error::InvalidDescriptor { .. })
    ));

    without.name = Some("e2.proto".to_string());
    without.package = Some("e2".to_string());
    without.enum_type[0].options = Some(EnumOptions {
        allow_alias: Some(true),
        ..Default::default()
    });
    pool.add_file_proto(without).unwrap();
    assert!(pool.find_enum_by_name("e2.E").is_some());
}

#[test]
fn map_entry_shape_is_validated() {
    let mut pool = DescriptorPool::new();

    // A float key is never legal.
    let bad_entry = DescriptorProto {
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..message(
            "BadEntry",
            vec![field("key", 1, Type::Float), field("value", 2, Type::Int32)],
        )
    };
    let holder = DescriptorProto {
        nested_type: vec![bad_entry],
        ..message(
            "Holder",
            vec![FieldDescriptorProto {
                label: Some(Label::Repeated as i32),
                type_name: Some(".mv.Holder.BadEntry".to_string()),
                ..field("m", 1, Type::Message)
            }],
        )
    };
    let err = pool
        .add_file_proto(proto3_file("mv.proto", "mv", vec![holder]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDescriptor { .. }));
}

#[test]
fn json_name_conflicts_rejected_in_proto3() {
    let mut pool = DescriptorPool::new();
    // foo_bar and fooBar share a JSON name.
    let err = pool
        .add_file_proto(proto3_file(
            "j.proto",
            "j",
            vec![message(
                "M",
                vec![field("foo_bar", 1, Type::Int32), field("fooBar", 2, Type::Int32)],
            )],
        ))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDescriptor { .. }));

    // proto2's legacy JSON handling waives the check.
    let mut legacy = FileDescriptorProto {
        name: Some("j2.proto".to_string()),
        package: Some("j2".to_string()),
        syntax: Some("proto2".to_string()),
        message_type: vec![message(
            "M",
            vec![field("foo_bar", 1, Type::Int32), field("fooBar", 2, Type::Int32)],
        )],
        ..Default::default()
    };
    legacy.message_type[0].field[0].label = Some(Label::Optional as i32);
    pool.add_file_proto(legacy).unwrap();
}

#[test]
fn proto2_enums_are_closed_proto3_enums_are_open() {
    let mut pool = DescriptorPool::new();

    let enum_proto = |zero_first: bool| EnumDescriptorProto {
        name: Some("Kind".to_string()),
        value: vec![EnumValueDescriptorProto {
            name: Some("KIND_A".to_string()),
            number: Some(if zero_first { 0 } else { 1 }),
            options: None,
        }],
        ..Default::default()
    };

    let mut p2 = FileDescriptorProto {
        name: Some("closed.proto".to_string()),
        package: Some("closed".to_string()),
        syntax: Some("proto2".to_string()),
        enum_type: vec![enum_proto(false)],
        message_type: vec![message(
            "M",
            vec![FieldDescriptorProto {
                type_name: Some(".closed.Kind".to_string()),
                ..field("kind", 1, Type::Enum)
            }],
        )],
        ..Default::default()
    };
    p2.message_type[0].field[0].r#type = Some(Type::Enum as i32);
    pool.add_file_proto(p2).unwrap();

    let closed = pool.find_enum_by_name("closed.Kind").unwrap();
    assert!(closed.is_closed());

    // Parsing an unlisted value routes it to unknown fields.
    let desc = pool.find_message_by_name("closed.M").unwrap();
    let arena = Arena::new();
    let bytes = [0x08, 0x05]; // kind = 5, not a defined value
    let parsed = wire::decode(&desc, &arena, &bytes).unwrap();
    let kind = desc.field_by_name("kind").unwrap();
    assert!(!parsed.has_field(&kind));
    assert_eq!(parsed.unknown_fields().as_bytes(), &bytes);

    let p3 = FileDescriptorProto {
        name: Some("open.proto".to_string()),
        package: Some("open".to_string()),
        syntax: Some("proto3".to_string()),
        enum_type: vec![enum_proto(true)],
        ..Default::default()
    };
    pool.add_file_proto(p3).unwrap();
    assert!(!pool.find_enum_by_name("open.Kind").unwrap().is_closed());
}

#[test]
fn lazy_dependencies_build_on_first_touch() {
    let mut pool = DescriptorPool::new();
    pool.set_lazy_dependencies(true);

    let dep = proto3_file(
        "dep.proto",
        "dep",
        vec![message("Leaf", vec![field("x", 1, Type::Int32)])],
    );
    let mut root = proto3_file(
        "root.proto",
        "root",
        vec![message(
            "Node",
            vec![FieldDescriptorProto {
                type_name: Some(".dep.Leaf".to_string()),
                ..field("leaf", 1, Type::Message)
            }],
        )],
    );
    root.dependency = vec!["dep.proto".to_string()];

    let set = schema::FileDescriptorSet {
        file: vec![dep, root],
    };
    pool.add_file_descriptor_set(&set.encode_to_vec()).unwrap();

    // Nothing has been built yet.
    assert_eq!(pool.file_state("dep.proto"), Some(FileState::Registered));
    assert_eq!(pool.file_state("root.proto"), Some(FileState::Registered));

    // Touching a symbol of the root builds it; the dependency stays
    // registered because cross-linking works off the symbol table alone.
    let node = pool.find_message_by_name("root.Node").unwrap();
    assert_eq!(
        pool.file_state("root.proto"),
        Some(FileState::MiniTableBuilt)
    );
    assert_eq!(pool.file_state("dep.proto"), Some(FileState::Registered));

    // Navigating into the dependency forces its build.
    let leaf_field = node.field_by_name("leaf").unwrap();
    let leaf = leaf_field.message_type().unwrap();
    assert_eq!(leaf.full_name(), "dep.Leaf");
    assert_eq!(
        pool.file_state("dep.proto"),
        Some(FileState::MiniTableBuilt)
    );
}

#[test]
fn descriptor_set_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("set.binpb");

    let set = schema::FileDescriptorSet {
        file: vec![proto3_file(
            "ondisk.proto",
            "ondisk",
            vec![message("M", vec![field("x", 1, Type::Int64)])],
        )],
    };
    std::fs::write(&path, set.encode_to_vec()).unwrap();

    let mut pool = DescriptorPool::new();
    let files = pool.add_file_descriptor_set_from_path(&path).unwrap();
    assert_eq!(files.len(), 1);
    assert!(pool.find_message_by_name("ondisk.M").is_some());

    let missing = pool.add_file_descriptor_set_from_path(dir.path().join("absent.binpb"));
    assert!(matches!(missing, Err(Error::FileRead { .. })));
}

#[test]
fn services_resolve_their_message_types() {
    let mut pool = DescriptorPool::new();
    let mut file = proto3_file(
        "svc.proto",
        "svc",
        vec![
            message("Req", vec![field("q", 1, Type::String)]),
            message("Resp", vec![field("r", 1, Type::String)]),
        ],
    );
    file.service = vec![ServiceDescriptorProto {
        name: Some("Search".to_string()),
        method: vec![MethodDescriptorProto {
            name: Some("Run".to_string()),
            input_type: Some(".svc.Req".to_string()),
            output_type: Some(".svc.Resp".to_string()),
            ..Default::default()
        }],
        options: None,
    }];
    pool.add_file_proto(file).unwrap();

    let service = pool.find_service_by_name("svc.Search").unwrap();
    let method = service.methods().next().unwrap();
    assert_eq!(method.input().unwrap().full_name(), "svc.Req");
    assert_eq!(method.output().unwrap().full_name(), "svc.Resp");
}

#[test]
fn serialized_file_descriptor_input() {
    // The pool's primary contract takes serialized FileDescriptorProtos.
    let proto = proto3_file(
        "raw.proto",
        "raw",
        vec![message("M", vec![field("x", 1, Type::Int64)])],
    );
    let bytes = proto.encode_to_vec();

    let mut pool = DescriptorPool::new();
    let file = pool.add_file(&bytes).unwrap();
    assert_eq!(file.name(), "raw.proto");

    let desc = pool.find_message_by_name("raw.M").unwrap();
    let arena = Arena::new();
    let mut msg = DynamicMessage::new(desc.clone(), &arena);
    msg.set(&desc.field_by_name("x").unwrap(), Value::I64(3))
        .unwrap();
    let round = wire::decode(&desc, &arena, &wire::encode_to_vec(&msg).unwrap()).unwrap();
    assert_eq!(round, msg);
}

#[test]
fn custom_options_resolve_through_pool_extensions() {
    let mut pool = DescriptorPool::new();

    // val.proto declares an extension of FieldOptions.
    let mut val = FileDescriptorProto {
        name: Some("val.proto".to_string()),
        package: Some("val".to_string()),
        syntax: Some("proto2".to_string()),
        dependency: vec!["google/protobuf/descriptor.proto".to_string()],
        ..Default::default()
    };
    val.extension = vec![FieldDescriptorProto {
        extendee: Some(".google.protobuf.FieldOptions".to_string()),
        ..field("validated", 50_001, Type::Bool)
    }];
    pool.add_file_proto(val).unwrap();

    // user.proto applies it as an uninterpreted option, the way a compiler
    // without option resolution would emit it.
    let mut user = proto3_file(
        "user_opts.proto",
        "uo",
        vec![message("M", vec![field("x", 1, Type::Int64)])],
    );
    user.dependency = vec!["val.proto".to_string()];
    user.message_type[0].field[0].options = Some(schema::FieldOptions {
        uninterpreted_option: vec![schema::UninterpretedOption {
            name: vec![schema::uninterpreted_option::NamePart {
                name_part: "val.validated".to_string(),
                is_extension: true,
            }],
            identifier_value: Some("true".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    });
    pool.add_file_proto(user).unwrap();

    // An option naming a non-existent extension fails resolution.
    let mut broken = proto3_file(
        "broken_opts.proto",
        "bo",
        vec![message("M", vec![field("x", 1, Type::Int64)])],
    );
    broken.message_type[0].field[0].options = Some(schema::FieldOptions {
        uninterpreted_option: vec![schema::UninterpretedOption {
            name: vec![schema::uninterpreted_option::NamePart {
                name_part: "no.such.option".to_string(),
                is_extension: true,
            }],
            identifier_value: Some("true".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    });
    assert!(matches!(
        pool.add_file_proto(broken),
        Err(Error::TypeResolution { .. })
    ));
}

#[test]
fn feature_overrides_change_wire_behavior() {
    let mut pool = DescriptorPool::new();

    // An editions file flipping repeated encoding to expanded.
    let mut file = FileDescriptorProto {
        name: Some("feat.proto".to_string()),
        package: Some("feat".to_string()),
        syntax: Some("editions".to_string()),
        edition: Some(schema::Edition::Edition2023 as i32),
        message_type: vec![message(
            "M",
            vec![FieldDescriptorProto {
                label: Some(Label::Repeated as i32),
                options: Some(schema::FieldOptions {
                    features: Some(schema::FeatureSet {
                        repeated_field_encoding: Some(
                            schema::feature_set::RepeatedFieldEncoding::Expanded as i32,
                        ),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..field("v", 1, Type::Int32)
            }],
        )],
        ..Default::default()
    };
    file.message_type[0].field[0].label = Some(Label::Repeated as i32);
    pool.add_file_proto(file).unwrap();

    let desc = pool.find_message_by_name("feat.M").unwrap();
    let v = desc.field_by_name("v").unwrap();
    assert!(!v.is_packed());

    let arena = Arena::new();
    let mut msg = DynamicMessage::new(desc.clone(), &arena);
    msg.push(&v, Value::I32(1)).unwrap();
    msg.push(&v, Value::I32(2)).unwrap();

    // Expanded: one tagged record per element.
    let bytes = wire::encode_to_vec(&msg).unwrap();
    assert_eq!(bytes, vec![0x08, 0x01, 0x08, 0x02]);
}

#[test]
fn required_fields_drive_is_initialized() {
    let mut pool = DescriptorPool::new();
    let mut file = FileDescriptorProto {
        name: Some("req.proto".to_string()),
        package: Some("req".to_string()),
        syntax: Some("proto2".to_string()),
        message_type: vec![message(
            "M",
            vec![FieldDescriptorProto {
                label: Some(Label::Required as i32),
                ..field("id", 1, Type::Int64)
            }],
        )],
        ..Default::default()
    };
    file.message_type[0].field.push(field("opt", 2, Type::Int32));
    pool.add_file_proto(file).unwrap();

    let desc = pool.find_message_by_name("req.M").unwrap();
    let arena = Arena::new();
    let mut msg = DynamicMessage::new(desc.clone(), &arena);
    assert!(!msg.is_initialized());

    msg.set(&desc.field_by_name("id").unwrap(), Value::I64(1))
        .unwrap();
    assert!(msg.is_initialized());
}
