//! The validation sweep: structural invariants checked after cross-linking
//! and feature resolution, before MiniTable compilation.
//!
//! Nothing here mutates; a failed check aborts the file's build and the
//! pool publishes none of it.

use std::collections::HashMap;

use super::build::Outline;
use super::{names, EnumData, Locations, MessageData, PoolInner};
use crate::error::{Error, Result};
use crate::schema::feature_set::JsonFormat;
use crate::schema::field_descriptor_proto::{Label, Type};
use crate::wire::{FIRST_RESERVED_NUMBER, LAST_RESERVED_NUMBER, MAX_FIELD_NUMBER};

/// Maximum number of required fields per message; the hasbit plan reserves
/// the first word for them.
const MAX_REQUIRED_FIELDS: usize = 63;

fn map_key_type_ok(ty: Type) -> bool {
    matches!(
        ty,
        Type::Int32
            | Type::Int64
            | Type::Uint32
            | Type::Uint64
            | Type::Sint32
            | Type::Sint64
            | Type::Fixed32
            | Type::Fixed64
            | Type::Sfixed32
            | Type::Sfixed64
            | Type::Bool
            | Type::String
    )
}

pub(crate) fn validate_file(
    inner: &PoolInner,
    file_name: &str,
    locations: &Locations,
    out: &Outline<'_>,
    messages: &[MessageData],
    enums: &[EnumData],
) -> Result<()> {
    for (om, message) in out.messages.iter().zip(messages) {
        validate_message_fields(file_name, locations, om, message)?;
        validate_oneofs(file_name, locations, om, message)?;
        validate_name_conflicts(file_name, om, message)?;
        validate_map_entry(inner, file_name, message)?;
        validate_extension_ranges(file_name, message)?;

        let required = message.fields.iter().filter(|f| f.required).count();
        if required > MAX_REQUIRED_FIELDS {
            return Err(Error::InvalidDescriptor {
                entity: message.full_name.clone(),
                file: file_name.to_string(),
                span: locations.span(&om.path),
                details: format!(
                    "{required} required fields exceed the limit of {MAX_REQUIRED_FIELDS}"
                ),
            });
        }
    }

    for (oe, data) in out.enums.iter().zip(enums) {
        validate_enum(file_name, locations, oe, data)?;
    }

    Ok(())
}

fn validate_message_fields(
    file_name: &str,
    locations: &Locations,
    om: &super::build::OutlineMessage<'_>,
    message: &MessageData,
) -> Result<()> {
    for (decl_index, field) in om.proto.field.iter().enumerate() {
        let number = field.number();
        let full_name = names::join(&message.full_name, field.name());
        let mut path = om.path.clone();
        path.extend([2, decl_index as i32]);
        let span = locations.span(&path);

        if number < 1 || number > MAX_FIELD_NUMBER as i32 {
            return Err(Error::InvalidFieldNumber {
                number,
                field: full_name,
                file: file_name.to_string(),
                details: format!("must be between 1 and {MAX_FIELD_NUMBER}"),
            });
        }
        if (FIRST_RESERVED_NUMBER..=LAST_RESERVED_NUMBER).contains(&(number as u32)) {
            return Err(Error::InvalidFieldNumber {
                number,
                field: full_name,
                file: file_name.to_string(),
                details: format!(
                    "numbers {FIRST_RESERVED_NUMBER} through {LAST_RESERVED_NUMBER} are reserved \
                     for the protobuf implementation"
                ),
            });
        }

        for range in &om.proto.reserved_range {
            if number >= range.start() && number < range.end() {
                return Err(Error::InvalidFieldNumber {
                    number,
                    field: full_name,
                    file: file_name.to_string(),
                    details: "number is reserved".to_string(),
                });
            }
        }
        if om.proto.reserved_name.iter().any(|n| n == field.name()) {
            return Err(Error::InvalidDescriptor {
                entity: full_name,
                file: file_name.to_string(),
                span,
                details: "field name is reserved".to_string(),
            });
        }

        if let Some(oneof_index) = field.oneof_index {
            if oneof_index < 0 || oneof_index as usize >= om.proto.oneof_decl.len() {
                return Err(Error::InvalidDescriptor {
                    entity: full_name,
                    file: file_name.to_string(),
                    span,
                    details: format!("oneof index {oneof_index} out of range"),
                });
            }
        }
    }

    // Fields are sorted by number by this point, so duplicates are adjacent.
    for pair in message.fields.windows(2) {
        if pair[0].number == pair[1].number {
            return Err(Error::InvalidFieldNumber {
                number: pair[1].number as i32,
                field: pair[1].full_name.clone(),
                file: file_name.to_string(),
                details: format!("also used by '{}'", pair[0].name),
            });
        }
    }

    Ok(())
}

fn validate_oneofs(
    file_name: &str,
    locations: &Locations,
    om: &super::build::OutlineMessage<'_>,
    message: &MessageData,
) -> Result<()> {
    for oneof in &message.oneofs {
        if oneof.fields.is_empty() {
            return Err(Error::InvalidDescriptor {
                entity: oneof.full_name.clone(),
                file: file_name.to_string(),
                span: locations.span(&om.path),
                details: "oneof has no fields".to_string(),
            });
        }
        for &member in &oneof.fields {
            let field = &message.fields[member as usize];
            if field.label != Label::Optional {
                return Err(Error::InvalidDescriptor {
                    entity: field.full_name.clone(),
                    file: file_name.to_string(),
                    span: locations.span(&om.path),
                    details: "oneof fields must be singular".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Field names, JSON names, lower-cased names, and camel-cased names must
/// not collide within a message, unless the legacy JSON conflict waiver
/// applies.
fn validate_name_conflicts(
    file_name: &str,
    om: &super::build::OutlineMessage<'_>,
    message: &MessageData,
) -> Result<()> {
    let legacy_waiver = message.features.json_format == JsonFormat::LegacyBestEffort
        || om
            .proto
            .options
            .as_ref()
            .and_then(|o| o.deprecated_legacy_json_field_conflicts)
            .unwrap_or(false);
    if legacy_waiver {
        return Ok(());
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    for (index, field) in message.fields.iter().enumerate() {
        let mut keys = vec![
            field.name.clone(),
            field.name.to_lowercase(),
            field.json_name.clone(),
            names::to_json_name(&field.name),
        ];
        keys.sort();
        keys.dedup();
        for key in keys {
            if let Some(&owner) = seen.get(&key) {
                if owner != index {
                    return Err(Error::InvalidDescriptor {
                        entity: field.full_name.clone(),
                        file: file_name.to_string(),
                        span: None,
                        details: format!(
                            "name '{key}' conflicts with field '{}'",
                            message.fields[owner].name
                        ),
                    });
                }
            } else {
                seen.insert(key, index);
            }
        }
    }
    Ok(())
}

fn validate_map_entry(
    inner: &PoolInner,
    file_name: &str,
    message: &MessageData,
) -> Result<()> {
    if !message.map_entry {
        return Ok(());
    }
    let err = |details: String| Error::InvalidDescriptor {
        entity: message.full_name.clone(),
        file: file_name.to_string(),
        span: None,
        details,
    };

    if message.fields.len() != 2 {
        return Err(err("map entry must have exactly two fields".to_string()));
    }
    let key = &message.fields[0];
    let value = &message.fields[1];
    if key.number != 1 || value.number != 2 {
        return Err(err("map entry fields must be numbered 1 and 2".to_string()));
    }
    if !map_key_type_ok(key.ty) {
        return Err(err(format!("map key cannot be {:?}", key.ty)));
    }
    if let Some((file, index)) = value.message_ref {
        // The value may be any message except another synthetic map entry.
        let target = super::build::message_proto(inner, file, index);
        let nested_map = target
            .options
            .as_ref()
            .and_then(|o| o.map_entry)
            .unwrap_or(false);
        if nested_map {
            return Err(err("map value cannot be another map".to_string()));
        }
    }
    Ok(())
}

fn validate_extension_ranges(file_name: &str, message: &MessageData) -> Result<()> {
    for &(start, end) in &message.extension_ranges {
        if start < 1 || end <= start || end > MAX_FIELD_NUMBER + 1 {
            return Err(Error::InvalidDescriptor {
                entity: message.full_name.clone(),
                file: file_name.to_string(),
                span: None,
                details: format!("bad extension range [{start}, {end})"),
            });
        }
        for field in &message.fields {
            if field.number >= start && field.number < end {
                return Err(Error::InvalidFieldNumber {
                    number: field.number as i32,
                    field: field.full_name.clone(),
                    file: file_name.to_string(),
                    details: "field number falls inside an extension range".to_string(),
                });
            }
        }
    }
    Ok(())
}

fn validate_enum(
    file_name: &str,
    locations: &Locations,
    oe: &super::build::OutlineEnum<'_>,
    data: &EnumData,
) -> Result<()> {
    let err = |details: String| Error::InvalidDescriptor {
        entity: data.full_name.clone(),
        file: file_name.to_string(),
        span: locations.span(&oe.path),
        details,
    };

    if data.values.is_empty() {
        return Err(err("enum has no values".to_string()));
    }
    if !data.closed && data.values[0].number != 0 {
        return Err(err("open enums must have zero as their first value".to_string()));
    }

    let allow_alias = oe
        .proto
        .options
        .as_ref()
        .and_then(|o| o.allow_alias)
        .unwrap_or(false);
    if !allow_alias {
        let mut numbers: Vec<i32> = data.values.iter().map(|v| v.number).collect();
        numbers.sort_unstable();
        if numbers.windows(2).any(|w| w[0] == w[1]) {
            return Err(err(
                "duplicate value numbers require allow_alias = true".to_string(),
            ));
        }
    }

    for value in &data.values {
        for range in &oe.proto.reserved_range {
            // Enum reserved ranges are inclusive on both ends.
            if value.number >= range.start() && value.number <= range.end() {
                return Err(err(format!(
                    "value '{}' uses reserved number {}",
                    value.name, value.number
                )));
            }
        }
        if oe.proto.reserved_name.iter().any(|n| n == &value.name) {
            return Err(err(format!("value name '{}' is reserved", value.name)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_key_types() {
        assert!(map_key_type_ok(Type::Int32));
        assert!(map_key_type_ok(Type::String));
        assert!(map_key_type_ok(Type::Bool));
        assert!(!map_key_type_ok(Type::Float));
        assert!(!map_key_type_ok(Type::Double));
        assert!(!map_key_type_ok(Type::Bytes));
        assert!(!map_key_type_ok(Type::Message));
        assert!(!map_key_type_ok(Type::Enum));
    }
}
