//! Editions feature resolution.
//!
//! Every entity's feature set is `merge(parent_features, explicit_features)`
//! with defaults coming from the edition's baseline. The edition-to-defaults
//! table below is embedded; it mirrors the authoritative
//! `FeatureSetDefaults` shipped with the schema compiler, which
//! implementations must agree on to interoperate.

use crate::error::{Error, Result};
use crate::schema::feature_set::{
    DefaultSymbolVisibility, EnforceNamingStyle, EnumType, FieldPresence, JsonFormat,
    MessageEncoding, RepeatedFieldEncoding, Utf8Validation,
};
use crate::schema::{Edition, FeatureSet, FileDescriptorProto};

/// A fully resolved feature bundle. Unlike [`FeatureSet`], every value is
/// known; `Unknown` never appears after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFeatures {
    /// Presence discipline for singular fields
    pub field_presence: FieldPresence,
    /// Open or closed enum semantics
    pub enum_type: EnumType,
    /// Packed or expanded encoding for repeated scalar fields
    pub repeated_field_encoding: RepeatedFieldEncoding,
    /// Whether string fields are validated as UTF-8
    pub utf8_validation: Utf8Validation,
    /// Sub-message encoding scheme
    pub message_encoding: MessageEncoding,
    /// JSON mapping strictness
    pub json_format: JsonFormat,
    /// Name style enforcement
    pub enforce_naming_style: EnforceNamingStyle,
    /// Default visibility of symbols without an explicit keyword
    pub default_symbol_visibility: DefaultSymbolVisibility,
}

/// Determines the edition of a file from its syntax declaration.
pub(crate) fn file_edition(proto: &FileDescriptorProto) -> Result<Edition> {
    match proto.syntax() {
        "" | "proto2" => Ok(Edition::Proto2),
        "proto3" => Ok(Edition::Proto3),
        "editions" => match proto.edition() {
            edition @ (Edition::Edition2023 | Edition::Edition2024) => Ok(edition),
            other => Err(Error::EditionUnsupported {
                file: proto.name().to_string(),
                edition: format!("{other:?}"),
            }),
        },
        other => Err(Error::EditionUnsupported {
            file: proto.name().to_string(),
            edition: other.to_string(),
        }),
    }
}

/// Returns the baseline feature set of an edition.
pub(crate) fn edition_defaults(edition: Edition) -> Result<ResolvedFeatures> {
    let defaults = match edition {
        Edition::Proto2 | Edition::Legacy => ResolvedFeatures {
            field_presence: FieldPresence::Explicit,
            enum_type: EnumType::Closed,
            repeated_field_encoding: RepeatedFieldEncoding::Expanded,
            utf8_validation: Utf8Validation::None,
            message_encoding: MessageEncoding::LengthPrefixed,
            json_format: JsonFormat::LegacyBestEffort,
            enforce_naming_style: EnforceNamingStyle::StyleLegacy,
            default_symbol_visibility: DefaultSymbolVisibility::ExportAll,
        },
        Edition::Proto3 => ResolvedFeatures {
            field_presence: FieldPresence::Implicit,
            enum_type: EnumType::Open,
            repeated_field_encoding: RepeatedFieldEncoding::Packed,
            utf8_validation: Utf8Validation::Verify,
            message_encoding: MessageEncoding::LengthPrefixed,
            json_format: JsonFormat::Allow,
            enforce_naming_style: EnforceNamingStyle::StyleLegacy,
            default_symbol_visibility: DefaultSymbolVisibility::ExportAll,
        },
        Edition::Edition2023 => ResolvedFeatures {
            field_presence: FieldPresence::Explicit,
            enum_type: EnumType::Open,
            repeated_field_encoding: RepeatedFieldEncoding::Packed,
            utf8_validation: Utf8Validation::Verify,
            message_encoding: MessageEncoding::LengthPrefixed,
            json_format: JsonFormat::Allow,
            enforce_naming_style: EnforceNamingStyle::StyleLegacy,
            default_symbol_visibility: DefaultSymbolVisibility::ExportAll,
        },
        Edition::Edition2024 => ResolvedFeatures {
            field_presence: FieldPresence::Explicit,
            enum_type: EnumType::Open,
            repeated_field_encoding: RepeatedFieldEncoding::Packed,
            utf8_validation: Utf8Validation::Verify,
            message_encoding: MessageEncoding::LengthPrefixed,
            json_format: JsonFormat::Allow,
            enforce_naming_style: EnforceNamingStyle::Style2024,
            default_symbol_visibility: DefaultSymbolVisibility::ExportTopLevel,
        },
        Edition::Unknown => {
            return Err(Error::EditionUnsupported {
                file: String::new(),
                edition: "EDITION_UNKNOWN".to_string(),
            })
        }
    };
    Ok(defaults)
}

/// Merges explicit feature overrides into a parent feature set.
///
/// Explicit features are only legal on editions files; pre-editions files
/// take their entire bundle from the syntax baseline. Unknown enum values in
/// the overrides fail resolution (strict edition support).
pub(crate) fn merge(
    parent: ResolvedFeatures,
    explicit: Option<&FeatureSet>,
    edition: Edition,
    entity: &str,
    file: &str,
) -> Result<ResolvedFeatures> {
    let Some(explicit) = explicit else {
        return Ok(parent);
    };
    if !matches!(edition, Edition::Edition2023 | Edition::Edition2024) {
        return Err(Error::FeatureResolution {
            entity: entity.to_string(),
            file: file.to_string(),
            details: "explicit features require an editions file".to_string(),
        });
    }

    let unknown = |feature: &str, raw: i32| Error::FeatureResolution {
        entity: entity.to_string(),
        file: file.to_string(),
        details: format!("unknown value {raw} for feature '{feature}'"),
    };

    let mut resolved = parent;
    if let Some(raw) = explicit.field_presence {
        resolved.field_presence = FieldPresence::try_from(raw)
            .ok()
            .filter(|v| *v != FieldPresence::Unknown)
            .ok_or_else(|| unknown("field_presence", raw))?;
    }
    if let Some(raw) = explicit.enum_type {
        resolved.enum_type = EnumType::try_from(raw)
            .ok()
            .filter(|v| *v != EnumType::Unknown)
            .ok_or_else(|| unknown("enum_type", raw))?;
    }
    if let Some(raw) = explicit.repeated_field_encoding {
        resolved.repeated_field_encoding = RepeatedFieldEncoding::try_from(raw)
            .ok()
            .filter(|v| *v != RepeatedFieldEncoding::Unknown)
            .ok_or_else(|| unknown("repeated_field_encoding", raw))?;
    }
    if let Some(raw) = explicit.utf8_validation {
        resolved.utf8_validation = Utf8Validation::try_from(raw)
            .ok()
            .filter(|v| *v != Utf8Validation::Unknown)
            .ok_or_else(|| unknown("utf8_validation", raw))?;
    }
    if let Some(raw) = explicit.message_encoding {
        resolved.message_encoding = MessageEncoding::try_from(raw)
            .ok()
            .filter(|v| *v != MessageEncoding::Unknown)
            .ok_or_else(|| unknown("message_encoding", raw))?;
    }
    if let Some(raw) = explicit.json_format {
        resolved.json_format = JsonFormat::try_from(raw)
            .ok()
            .filter(|v| *v != JsonFormat::Unknown)
            .ok_or_else(|| unknown("json_format", raw))?;
    }
    if let Some(raw) = explicit.enforce_naming_style {
        resolved.enforce_naming_style = EnforceNamingStyle::try_from(raw)
            .ok()
            .filter(|v| *v != EnforceNamingStyle::Unknown)
            .ok_or_else(|| unknown("enforce_naming_style", raw))?;
    }
    if let Some(raw) = explicit.default_symbol_visibility {
        // Only meaningful at file scope, and only from edition 2024 on.
        if edition < Edition::Edition2024 {
            return Err(Error::FeatureResolution {
                entity: entity.to_string(),
                file: file.to_string(),
                details: "default_symbol_visibility requires edition 2024".to_string(),
            });
        }
        resolved.default_symbol_visibility = DefaultSymbolVisibility::try_from(raw)
            .ok()
            .filter(|v| *v != DefaultSymbolVisibility::Unknown)
            .ok_or_else(|| unknown("default_symbol_visibility", raw))?;
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn file(syntax: &str) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("f.proto".to_string()),
            syntax: Some(syntax.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_edition_detection() {
        assert_eq!(file_edition(&file("proto2")).unwrap(), Edition::Proto2);
        assert_eq!(file_edition(&file("proto3")).unwrap(), Edition::Proto3);
        assert_eq!(
            file_edition(&FileDescriptorProto::default()).unwrap(),
            Edition::Proto2
        );

        let mut editions = file("editions");
        editions.edition = Some(Edition::Edition2023 as i32);
        assert_eq!(file_edition(&editions).unwrap(), Edition::Edition2023);

        editions.edition = Some(Edition::Legacy as i32);
        assert!(matches!(
            file_edition(&editions),
            Err(Error::EditionUnsupported { .. })
        ));

        assert!(matches!(
            file_edition(&file("proto4")),
            Err(Error::EditionUnsupported { .. })
        ));
    }

    #[test]
    fn test_proto2_and_proto3_baselines_differ() {
        let proto2 = edition_defaults(Edition::Proto2).unwrap();
        let proto3 = edition_defaults(Edition::Proto3).unwrap();
        assert_eq!(proto2.field_presence, FieldPresence::Explicit);
        assert_eq!(proto2.enum_type, EnumType::Closed);
        assert_eq!(proto2.repeated_field_encoding, RepeatedFieldEncoding::Expanded);
        assert_eq!(proto3.field_presence, FieldPresence::Implicit);
        assert_eq!(proto3.enum_type, EnumType::Open);
        assert_eq!(proto3.repeated_field_encoding, RepeatedFieldEncoding::Packed);
    }

    #[test]
    fn test_2024_defaults_top_level_visibility() {
        let defaults = edition_defaults(Edition::Edition2024).unwrap();
        assert_eq!(
            defaults.default_symbol_visibility,
            DefaultSymbolVisibility::ExportTopLevel
        );
    }

    #[test]
    fn test_merge_overrides_parent() {
        let parent = edition_defaults(Edition::Edition2023).unwrap();
        let explicit = schema::FeatureSet {
            enum_type: Some(EnumType::Closed as i32),
            ..Default::default()
        };
        let merged = merge(
            parent,
            Some(&explicit),
            Edition::Edition2023,
            "pkg.E",
            "f.proto",
        )
        .unwrap();
        assert_eq!(merged.enum_type, EnumType::Closed);
        // Everything else inherits.
        assert_eq!(merged.field_presence, parent.field_presence);
    }

    #[test]
    fn test_merge_rejects_features_outside_editions() {
        let parent = edition_defaults(Edition::Proto3).unwrap();
        let explicit = schema::FeatureSet {
            enum_type: Some(EnumType::Closed as i32),
            ..Default::default()
        };
        let err = merge(parent, Some(&explicit), Edition::Proto3, "pkg.E", "f.proto").unwrap_err();
        assert!(matches!(err, Error::FeatureResolution { .. }));
    }

    #[test]
    fn test_merge_rejects_unknown_value() {
        let parent = edition_defaults(Edition::Edition2023).unwrap();
        let explicit = schema::FeatureSet {
            field_presence: Some(77),
            ..Default::default()
        };
        let err = merge(
            parent,
            Some(&explicit),
            Edition::Edition2023,
            "pkg.M.f",
            "f.proto",
        )
        .unwrap_err();
        assert!(matches!(err, Error::FeatureResolution { .. }));
    }
}
