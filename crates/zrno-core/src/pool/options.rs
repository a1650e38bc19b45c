//! Interpretation of `uninterpreted_option` entries.
//!
//! A schema compiler that does not resolve options leaves them as name/value
//! pairs; the pool interprets them against the descriptor's own schema.
//! Built-in option names are checked against the embedded
//! `descriptor.proto`; custom options resolve through the pool's extension
//! registry, which forces eager loading of the option-defining file because
//! options affect the current file's own validity. `features.*` entries are
//! folded into the entity's explicit feature set before feature resolution.

use tracing::trace;

use super::{build, names, PoolInner, Symbol};
use crate::error::{Error, Result};
use crate::schema::feature_set::{
    DefaultSymbolVisibility, EnforceNamingStyle, EnumType, FieldPresence, JsonFormat,
    MessageEncoding, RepeatedFieldEncoding, Utf8Validation,
};
use crate::schema::{FeatureSet, UninterpretedOption};

/// The value carried by one uninterpreted option.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OptionValue {
    /// Bare identifier, e.g. `true` or an enum value name
    Ident(String),
    /// Positive integer literal
    Uint(u64),
    /// Negative integer literal
    Int(i64),
    /// Floating-point literal
    Double(f64),
    /// Quoted string literal
    Bytes(Vec<u8>),
    /// Aggregate (text-format) literal
    Aggregate(String),
}

/// A resolved custom option: the extension it attaches through, any trailing
/// field path, and the value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CustomOption {
    /// `(file, extension index)` of the extension in the pool
    pub extension: (u32, u32),
    /// Field path after the extension segment, for message-typed options
    pub path: Vec<String>,
    pub value: OptionValue,
}

/// The outcome of interpreting one entity's uninterpreted options.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct InterpretedOptions {
    /// Feature overrides from `features.*` entries
    pub feature_overrides: Option<FeatureSet>,
    /// Built-in options by name
    pub builtins: Vec<(String, OptionValue)>,
    /// Custom options, in declaration order
    pub customs: Vec<CustomOption>,
}

impl InterpretedOptions {
    /// Returns a built-in boolean option, if present.
    pub(crate) fn bool(&self, name: &str) -> Option<bool> {
        self.builtins
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, value)| match value {
                OptionValue::Ident(ident) => match ident.as_str() {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => None,
                },
                OptionValue::Uint(v) => Some(*v != 0),
                _ => None,
            })
    }
}

fn option_value(option: &UninterpretedOption) -> Option<OptionValue> {
    if let Some(ident) = &option.identifier_value {
        Some(OptionValue::Ident(ident.clone()))
    } else if let Some(v) = option.positive_int_value {
        Some(OptionValue::Uint(v))
    } else if let Some(v) = option.negative_int_value {
        Some(OptionValue::Int(v))
    } else if let Some(v) = option.double_value {
        Some(OptionValue::Double(v))
    } else if let Some(v) = &option.string_value {
        Some(OptionValue::Bytes(v.clone()))
    } else {
        option
            .aggregate_value
            .as_ref()
            .map(|v| OptionValue::Aggregate(v.clone()))
    }
}

/// Applies one `features.<field> = <ident>` override.
fn apply_feature_override(set: &mut FeatureSet, field: &str, ident: &str) -> bool {
    match field {
        "field_presence" => {
            let value = match ident {
                "EXPLICIT" => FieldPresence::Explicit,
                "IMPLICIT" => FieldPresence::Implicit,
                "LEGACY_REQUIRED" => FieldPresence::LegacyRequired,
                _ => return false,
            };
            set.field_presence = Some(value as i32);
        }
        "enum_type" => {
            let value = match ident {
                "OPEN" => EnumType::Open,
                "CLOSED" => EnumType::Closed,
                _ => return false,
            };
            set.enum_type = Some(value as i32);
        }
        "repeated_field_encoding" => {
            let value = match ident {
                "PACKED" => RepeatedFieldEncoding::Packed,
                "EXPANDED" => RepeatedFieldEncoding::Expanded,
                _ => return false,
            };
            set.repeated_field_encoding = Some(value as i32);
        }
        "utf8_validation" => {
            let value = match ident {
                "VERIFY" => Utf8Validation::Verify,
                "NONE" => Utf8Validation::None,
                _ => return false,
            };
            set.utf8_validation = Some(value as i32);
        }
        "message_encoding" => {
            let value = match ident {
                "LENGTH_PREFIXED" => MessageEncoding::LengthPrefixed,
                "DELIMITED" => MessageEncoding::Delimited,
                _ => return false,
            };
            set.message_encoding = Some(value as i32);
        }
        "json_format" => {
            let value = match ident {
                "ALLOW" => JsonFormat::Allow,
                "LEGACY_BEST_EFFORT" => JsonFormat::LegacyBestEffort,
                _ => return false,
            };
            set.json_format = Some(value as i32);
        }
        "enforce_naming_style" => {
            let value = match ident {
                "STYLE2024" => EnforceNamingStyle::Style2024,
                "STYLE_LEGACY" => EnforceNamingStyle::StyleLegacy,
                _ => return false,
            };
            set.enforce_naming_style = Some(value as i32);
        }
        "default_symbol_visibility" => {
            let value = match ident {
                "EXPORT_ALL" => DefaultSymbolVisibility::ExportAll,
                "EXPORT_TOP_LEVEL" => DefaultSymbolVisibility::ExportTopLevel,
                "LOCAL_ALL" => DefaultSymbolVisibility::LocalAll,
                "STRICT" => DefaultSymbolVisibility::Strict,
                _ => return false,
            };
            set.default_symbol_visibility = Some(value as i32);
        }
        _ => return false,
    }
    true
}

/// Interprets one entity's uninterpreted options.
///
/// `options_message` names the schema of the entity's options (e.g.
/// `google.protobuf.FieldOptions`); built-in names are validated against it,
/// custom options must extend it.
pub(crate) fn interpret(
    inner: &PoolInner,
    file: &str,
    entity: &str,
    scope: &str,
    options_message: &str,
    uninterpreted: Option<&[UninterpretedOption]>,
) -> Result<InterpretedOptions> {
    let mut result = InterpretedOptions::default();
    let Some(uninterpreted) = uninterpreted else {
        return Ok(result);
    };

    let resolution_error = |name: &str| Error::TypeResolution {
        name: name.to_string(),
        referrer: entity.to_string(),
        file: file.to_string(),
        span: None,
    };

    for option in uninterpreted {
        let Some(first) = option.name.first() else {
            continue;
        };
        let Some(value) = option_value(option) else {
            return Err(Error::InvalidDescriptor {
                entity: entity.to_string(),
                file: file.to_string(),
                span: None,
                details: "uninterpreted option carries no value".to_string(),
            });
        };

        if !first.is_extension {
            if first.name_part == "features" {
                let [_, feature] = option.name.as_slice() else {
                    return Err(resolution_error("features"));
                };
                let OptionValue::Ident(ident) = &value else {
                    return Err(Error::FeatureResolution {
                        entity: entity.to_string(),
                        file: file.to_string(),
                        details: format!(
                            "feature '{}' takes an identifier value",
                            feature.name_part
                        ),
                    });
                };
                let set = result.feature_overrides.get_or_insert_with(FeatureSet::default);
                if !apply_feature_override(set, &feature.name_part, ident) {
                    return Err(Error::FeatureResolution {
                        entity: entity.to_string(),
                        file: file.to_string(),
                        details: format!(
                            "unknown feature '{}' or value '{ident}'",
                            feature.name_part
                        ),
                    });
                }
                continue;
            }

            // Built-in option: the name must be a field of the options
            // message in the embedded descriptor schema.
            if option.name.len() != 1 {
                return Err(resolution_error(&first.name_part));
            }
            let Some(&Symbol::Message { file: opt_file, index, .. }) =
                inner.symbols.get(options_message)
            else {
                return Err(resolution_error(options_message));
            };
            let schema_msg = build::message_proto(inner, opt_file, index);
            if !schema_msg
                .field
                .iter()
                .any(|f| f.name() == first.name_part)
            {
                return Err(resolution_error(&first.name_part));
            }
            trace!(option = %first.name_part, %entity, "built-in option interpreted");
            result.builtins.push((first.name_part.clone(), value));
            continue;
        }

        // Custom option: the first segment names an extension of the options
        // message.
        let Some(fqn) = names::resolve(&inner.symbols, scope, &first.name_part) else {
            return Err(resolution_error(&first.name_part));
        };
        let Some(&Symbol::Field { file: ext_file }) = inner.symbols.get(&fqn) else {
            return Err(resolution_error(&first.name_part));
        };

        let defining = &inner.files[ext_file as usize];
        let out = build::outline(&defining.proto);
        let Some(ext_index) = out
            .extensions
            .iter()
            .position(|ext| names::join(&ext.scope, ext.proto.name()) == fqn)
        else {
            return Err(resolution_error(&first.name_part));
        };
        let ext = &out.extensions[ext_index];

        // The extension must extend this entity's options message.
        let extendee = names::resolve(&inner.symbols, &ext.scope, ext.proto.extendee());
        if extendee.as_deref() != Some(options_message) {
            return Err(resolution_error(&first.name_part));
        }

        // Options affect the current file's validity, so the defining file
        // is built eagerly even under lazy dependency loading.
        if defining.name != file {
            inner.file_tables(ext_file);
        }

        result.customs.push(CustomOption {
            extension: (ext_file, ext_index as u32),
            path: option.name[1..]
                .iter()
                .map(|part| part.name_part.clone())
                .collect(),
            value,
        });
    }

    Ok(result)
}

/// Combines an entity's typed feature set with overrides recovered from
/// uninterpreted options.
pub(crate) fn merged_features(
    typed: Option<&FeatureSet>,
    opts: &InterpretedOptions,
) -> Option<FeatureSet> {
    match (typed, &opts.feature_overrides) {
        (None, None) => None,
        (Some(typed), None) => Some(typed.clone()),
        (None, Some(overrides)) => Some(overrides.clone()),
        (Some(typed), Some(overrides)) => {
            let mut merged = typed.clone();
            merged.field_presence = overrides.field_presence.or(merged.field_presence);
            merged.enum_type = overrides.enum_type.or(merged.enum_type);
            merged.repeated_field_encoding = overrides
                .repeated_field_encoding
                .or(merged.repeated_field_encoding);
            merged.utf8_validation = overrides.utf8_validation.or(merged.utf8_validation);
            merged.message_encoding = overrides.message_encoding.or(merged.message_encoding);
            merged.json_format = overrides.json_format.or(merged.json_format);
            merged.enforce_naming_style = overrides
                .enforce_naming_style
                .or(merged.enforce_naming_style);
            merged.default_symbol_visibility = overrides
                .default_symbol_visibility
                .or(merged.default_symbol_visibility);
            Some(merged)
        }
    }
}
