//! End-to-end wire format scenarios: bit-exact encodings, round-trips,
//! oneof semantics, deterministic output, and unknown-field preservation.

use pretty_assertions::assert_eq;

use zrno_core::schema::field_descriptor_proto::{Label, Type};
use zrno_core::schema::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, MessageOptions,
    OneofDescriptorProto,
};
use zrno_core::{wire, Arena, DescriptorPool, DynamicMessage, MapKey, Value};

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
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
        ..field(name, number, ty)
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, Type::Message)
    }
}

/// A proto3 test schema with scalars, a map, a oneof, and a recursive
/// message field.
fn test_pool() -> DescriptorPool {
    let mut pool = DescriptorPool::new();

    let counts_entry = DescriptorProto {
        name: Some("CountsEntry".to_string()),
        field: vec![field("key", 1, Type::String), field("value", 2, Type::Int32)],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    let top = DescriptorProto {
        name: Some("Top".to_string()),
        field: vec![
            field("x", 1, Type::Int64),
            repeated("v", 2, Type::Int32),
            field("name", 3, Type::String),
            message_field("child", 4, ".ws.Top"),
            FieldDescriptorProto {
                label: Some(Label::Repeated as i32),
                ..message_field("counts", 5, ".ws.Top.CountsEntry")
            },
            FieldDescriptorProto {
                oneof_index: Some(0),
                ..field("pick_num", 6, Type::Int32)
            },
            FieldDescriptorProto {
                oneof_index: Some(0),
                ..message_field("pick_msg", 7, ".ws.Top")
            },
            field("data", 8, Type::Bytes),
        ],
        nested_type: vec![counts_entry],
        oneof_decl: vec![OneofDescriptorProto {
            name: Some("pick".to_string()),
            options: None,
        }],
        ..Default::default()
    };

    pool.add_file_proto(FileDescriptorProto {
        name: Some("ws.proto".to_string()),
        package: Some("ws".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![top],
        ..Default::default()
    })
    .unwrap();
    pool
}

#[test]
fn int64_negative_one_is_a_ten_byte_varint() {
    let pool = test_pool();
    let desc = pool.find_message_by_name("ws.Top").unwrap();
    let x = desc.field_by_name("x").unwrap();
    let arena = Arena::new();

    let mut msg = DynamicMessage::new(desc.clone(), &arena);
    msg.set(&x, Value::I64(-1)).unwrap();
    let bytes = wire::encode_to_vec(&msg).unwrap();
    assert_eq!(
        bytes,
        vec![0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
    );

    let parsed = wire::decode(&desc, &arena, &bytes).unwrap();
    assert_eq!(parsed.get(&x).unwrap(), Value::I64(-1));
}

#[test]
fn packed_repeated_int32_encoding() {
    let pool = test_pool();
    let desc = pool.find_message_by_name("ws.Top").unwrap();
    let v = desc.field_by_name("v").unwrap();
    let arena = Arena::new();

    let mut msg = DynamicMessage::new(desc.clone(), &arena);
    for value in [1, 300, 100_000] {
        msg.push(&v, Value::I32(value)).unwrap();
    }
    let bytes = wire::encode_to_vec(&msg).unwrap();
    assert_eq!(bytes, vec![0x12, 0x06, 0x01, 0xAC, 0x02, 0xA0, 0x8D, 0x06]);

    let parsed = wire::decode(&desc, &arena, &bytes).unwrap();
    let values: Vec<_> = parsed.repeated_values(&v).collect();
    assert_eq!(
        values,
        vec![Value::I32(1), Value::I32(300), Value::I32(100_000)]
    );
}

#[test]
fn oneof_replacement_clears_previous_member() {
    let pool = test_pool();
    let desc = pool.find_message_by_name("ws.Top").unwrap();
    let pick_num = desc.field_by_name("pick_num").unwrap();
    let pick_msg = desc.field_by_name("pick_msg").unwrap();
    let x = desc.field_by_name("x").unwrap();
    let arena = Arena::new();

    let mut msg = DynamicMessage::new(desc.clone(), &arena);

    // Set the message member first so replacement releases an owned child.
    msg.mutable_message(&pick_msg)
        .unwrap()
        .set(&x, Value::I64(42))
        .unwrap();
    assert!(msg.has_field(&pick_msg));

    msg.set(&pick_num, Value::I32(7)).unwrap();
    assert!(msg.has_field(&pick_num));
    assert!(!msg.has_field(&pick_msg));
    assert!(msg.get_message(&pick_msg).is_none());

    let oneof = desc.oneofs().next().unwrap();
    assert_eq!(msg.oneof_case(&oneof).unwrap().number(), 6);

    // The same holds when the replacement arrives over the wire.
    let mut on_wire = DynamicMessage::new(desc.clone(), &arena);
    on_wire
        .mutable_message(&pick_msg)
        .unwrap()
        .set(&x, Value::I64(1))
        .unwrap();
    let mut bytes = wire::encode_to_vec(&on_wire).unwrap();
    bytes.extend([0x30, 0x07]); // pick_num = 7 appended after pick_msg
    let parsed = wire::decode(&desc, &arena, &bytes).unwrap();
    assert!(parsed.has_field(&pick_num));
    assert!(!parsed.has_field(&pick_msg));
}

#[test]
fn deterministic_map_orders_by_key() {
    let pool = test_pool();
    let desc = pool.find_message_by_name("ws.Top").unwrap();
    let counts = desc.field_by_name("counts").unwrap();
    let arena = Arena::new();

    let mut forward = DynamicMessage::new(desc.clone(), &arena);
    forward.map_insert(&counts, MapKey::Str("b"), Value::I32(2)).unwrap();
    forward.map_insert(&counts, MapKey::Str("a"), Value::I32(1)).unwrap();

    let mut reverse = DynamicMessage::new(desc.clone(), &arena);
    reverse.map_insert(&counts, MapKey::Str("a"), Value::I32(1)).unwrap();
    reverse.map_insert(&counts, MapKey::Str("b"), Value::I32(2)).unwrap();

    let options = wire::EncodeOptions {
        deterministic: true,
    };
    let forward_bytes = wire::encode_to_vec_with_options(&forward, &options).unwrap();
    let reverse_bytes = wire::encode_to_vec_with_options(&reverse, &options).unwrap();

    // Equal logical content yields byte-identical deterministic output.
    assert_eq!(forward_bytes, reverse_bytes);

    // The "a" entry precedes the "b" entry.
    let a_at = forward_bytes.iter().position(|&b| b == b'a').unwrap();
    let b_at = forward_bytes.iter().position(|&b| b == b'b').unwrap();
    assert!(a_at < b_at);

    let parsed = wire::decode(&desc, &arena, &forward_bytes).unwrap();
    assert_eq!(
        parsed.map_get(&counts, &MapKey::Str("a")),
        Some(Value::I32(1))
    );
    assert_eq!(
        parsed.map_get(&counts, &MapKey::Str("b")),
        Some(Value::I32(2))
    );
}

#[test]
fn general_round_trip_preserves_all_fields() {
    let pool = test_pool();
    let desc = pool.find_message_by_name("ws.Top").unwrap();
    let arena = Arena::new();

    let mut msg = DynamicMessage::new(desc.clone(), &arena);
    msg.set(&desc.field_by_name("x").unwrap(), Value::I64(i64::MIN))
        .unwrap();
    msg.set(&desc.field_by_name("name").unwrap(), Value::String("zrno"))
        .unwrap();
    msg.set(&desc.field_by_name("data").unwrap(), Value::Bytes(&[0, 1, 255]))
        .unwrap();
    let v = desc.field_by_name("v").unwrap();
    for value in [-1, 0, i32::MAX] {
        msg.push(&v, Value::I32(value)).unwrap();
    }
    let counts = desc.field_by_name("counts").unwrap();
    msg.map_insert(&counts, MapKey::Str("k"), Value::I32(9)).unwrap();
    let child = desc.field_by_name("child").unwrap();
    msg.mutable_message(&child)
        .unwrap()
        .set(&desc.field_by_name("x").unwrap(), Value::I64(5))
        .unwrap();

    let bytes = wire::encode_to_vec(&msg).unwrap();
    let parsed = wire::decode(&desc, &arena, &bytes).unwrap();
    assert_eq!(parsed, msg);

    // And a second round trip is stable.
    let bytes_again = wire::encode_to_vec(&parsed).unwrap();
    assert_eq!(bytes, bytes_again);
}

#[test]
fn unknown_fields_survive_a_round_trip_byte_for_byte() {
    let pool = test_pool();
    let desc = pool.find_message_by_name("ws.Top").unwrap();
    let arena = Arena::new();

    // x = 1, then field 1000 (varint 99), then field 1001 (LEN "zz").
    let unknown_section = [
        0xC0, 0x3E, 0x63, // field 1000, varint 99
        0xCA, 0x3E, 0x02, b'z', b'z', // field 1001, LEN "zz"
    ];
    let mut bytes = vec![0x08, 0x01];
    bytes.extend(unknown_section);

    let parsed = wire::decode(&desc, &arena, &bytes).unwrap();
    assert_eq!(parsed.unknown_fields().as_bytes(), &unknown_section);

    // Unknown fields re-emit last, in preserved order.
    let reencoded = wire::encode_to_vec(&parsed).unwrap();
    assert!(reencoded.ends_with(&unknown_section));

    let reparsed = wire::decode(&desc, &arena, &reencoded).unwrap();
    assert_eq!(reparsed, parsed);
}

#[test]
fn reflection_codec_matches_table_codec() {
    let pool = test_pool();
    let desc = pool.find_message_by_name("ws.Top").unwrap();
    let arena = Arena::new();

    let mut msg = DynamicMessage::new(desc.clone(), &arena);
    msg.set(&desc.field_by_name("x").unwrap(), Value::I64(123_456))
        .unwrap();
    msg.set(&desc.field_by_name("name").unwrap(), Value::String("same"))
        .unwrap();
    let v = desc.field_by_name("v").unwrap();
    for value in [7, 8, 9] {
        msg.push(&v, Value::I32(value)).unwrap();
    }

    let table_bytes = wire::encode_to_vec(&msg).unwrap();
    let mut reflect_bytes = Vec::new();
    wire::reflect::encode_with_descriptor(&msg, &mut reflect_bytes).unwrap();
    assert_eq!(table_bytes, reflect_bytes);

    let via_table = wire::decode(&desc, &arena, &table_bytes).unwrap();
    let via_reflection =
        wire::reflect::decode_with_descriptor(&desc, &arena, &table_bytes).unwrap();
    assert_eq!(via_table, via_reflection);
}

#[test]
fn extensions_round_trip_and_interleave_deterministically() {
    let mut pool = DescriptorPool::new();

    let mut base = message_holder();
    base.extension_range = vec![zrno_core::schema::descriptor_proto::ExtensionRange {
        start: Some(100),
        end: Some(200),
        options: None,
    }];

    let mut file = FileDescriptorProto {
        name: Some("ext.proto".to_string()),
        package: Some("ext".to_string()),
        syntax: Some("proto2".to_string()),
        message_type: vec![base],
        ..Default::default()
    };
    file.extension = vec![FieldDescriptorProto {
        extendee: Some(".ext.Base".to_string()),
        ..field("tag_note", 150, Type::String)
    }];
    pool.add_file_proto(file).unwrap();

    let desc = pool.find_message_by_name("ext.Base").unwrap();
    let note = pool.find_extension_by_number("ext.Base", 150).unwrap();
    assert_eq!(note.full_name(), "ext.tag_note");
    assert_eq!(
        pool.find_extension_by_name("ext.tag_note").unwrap(),
        note
    );

    let arena = Arena::new();
    let mut msg = DynamicMessage::new(desc.clone(), &arena);
    msg.set(&desc.field_by_name("a").unwrap(), Value::I32(1)).unwrap();
    msg.set(&desc.field_by_name("z").unwrap(), Value::I32(2)).unwrap();
    msg.set_extension(&note, Value::String("hello")).unwrap();

    let bytes = msg.serialize_deterministic().unwrap();
    // Deterministic order: field 1, extension 150, field 300.
    // tag(1, varint)=0x08; tag(150, LEN)=0xB2 0x09; tag(300, varint)=0xE0 0x12.
    assert_eq!(
        bytes,
        vec![
            0x08, 0x01, // a = 1
            0xB2, 0x09, 0x05, b'h', b'e', b'l', b'l', b'o', // tag_note
            0xE0, 0x12, 0x02, // z = 2
        ]
    );

    let parsed = wire::decode(&desc, &arena, &bytes).unwrap();
    assert_eq!(parsed.extension_value(&note), Some(Value::String("hello")));
    assert_eq!(parsed, msg);
}

/// proto2 message with a low and a high field number, leaving room for an
/// extension range between them.
fn message_holder() -> DescriptorProto {
    DescriptorProto {
        name: Some("Base".to_string()),
        field: vec![field("a", 1, Type::Int32), field("z", 300, Type::Int32)],
        ..Default::default()
    }
}

#[test]
fn merge_after_parse_equals_concatenated_parse() {
    // Wire concatenation is defined to behave like merge.
    let pool = test_pool();
    let desc = pool.find_message_by_name("ws.Top").unwrap();
    let arena = Arena::new();

    let mut first = DynamicMessage::new(desc.clone(), &arena);
    first
        .set(&desc.field_by_name("x").unwrap(), Value::I64(1))
        .unwrap();
    first
        .push(&desc.field_by_name("v").unwrap(), Value::I32(10))
        .unwrap();

    let mut second = DynamicMessage::new(desc.clone(), &arena);
    second
        .set(&desc.field_by_name("x").unwrap(), Value::I64(2))
        .unwrap();
    second
        .push(&desc.field_by_name("v").unwrap(), Value::I32(20))
        .unwrap();

    let mut concatenated = wire::encode_to_vec(&first).unwrap();
    concatenated.extend(wire::encode_to_vec(&second).unwrap());
    let parsed = wire::decode(&desc, &arena, &concatenated).unwrap();

    let mut merged = DynamicMessage::new(desc.clone(), &arena);
    merged.merge_from(&first).unwrap();
    merged.merge_from(&second).unwrap();

    assert_eq!(parsed, merged);
}
