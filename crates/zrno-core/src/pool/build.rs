//! The per-file build pipeline.
//!
//! Registration stakes out every fully-qualified name and assigns entity
//! indices; it is always eager, so duplicate symbols and missing imports
//! fail at `add` time. The remaining steps (cross-linking, option
//! interpretation, feature resolution, validation, MiniTable compilation)
//! run eagerly for directly-added files and on first touch for lazily
//! registered dependency files.
//!
//! Option interpretation runs before feature resolution: feature overrides
//! may themselves arrive as uninterpreted options, so the features an entity
//! resolves with are only known once its options are interpreted.

use std::sync::{Arc, OnceLock};

use tracing::{debug, trace};

use super::features::{self, ResolvedFeatures};
use super::options;
use super::validate;
use super::{
    names, DefaultValue, EnumData, EnumValueData, FieldData, FileEntry, FileTables, Locations,
    MessageData, MethodData, OneofData, PoolInner, ServiceData, Symbol,
};
use crate::error::{Error, Result};
use crate::schema::feature_set::{
    DefaultSymbolVisibility, FieldPresence, RepeatedFieldEncoding, Utf8Validation,
};
use crate::schema::field_descriptor_proto::{Label, Type};
use crate::schema::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    SymbolVisibility,
};
use crate::table::{self, EnumId, EnumTable, FieldPlan, TableId};
use crate::wire::{FIRST_RESERVED_NUMBER, LAST_RESERVED_NUMBER, MAX_FIELD_NUMBER};

/// Flat, index-assigning view of a file's entities. Registration and the
/// deferred build both traverse through this so their indices always agree.
pub(crate) struct Outline<'p> {
    pub messages: Vec<OutlineMessage<'p>>,
    pub enums: Vec<OutlineEnum<'p>>,
    pub extensions: Vec<OutlineExtension<'p>>,
}

pub(crate) struct OutlineMessage<'p> {
    pub proto: &'p DescriptorProto,
    pub full_name: String,
    pub parent: Option<u32>,
    pub top_level: bool,
    /// SourceCodeInfo path of the declaration
    pub path: Vec<i32>,
    pub nested: Vec<u32>,
    pub enums: Vec<u32>,
}

pub(crate) struct OutlineEnum<'p> {
    pub proto: &'p EnumDescriptorProto,
    pub full_name: String,
    pub scope: String,
    pub top_level: bool,
    pub path: Vec<i32>,
}

pub(crate) struct OutlineExtension<'p> {
    pub proto: &'p FieldDescriptorProto,
    pub scope: String,
    pub path: Vec<i32>,
}

pub(crate) fn outline(proto: &FileDescriptorProto) -> Outline<'_> {
    let mut out = Outline {
        messages: Vec::new(),
        enums: Vec::new(),
        extensions: Vec::new(),
    };
    let package = proto.package();

    fn visit<'p>(
        out: &mut Outline<'p>,
        msg: &'p DescriptorProto,
        scope: &str,
        parent: Option<u32>,
        path: Vec<i32>,
    ) -> u32 {
        let index = out.messages.len() as u32;
        let full_name = names::join(scope, msg.name());
        out.messages.push(OutlineMessage {
            proto: msg,
            full_name: full_name.clone(),
            parent,
            top_level: parent.is_none(),
            path: path.clone(),
            nested: Vec::new(),
            enums: Vec::new(),
        });

        for (i, nested) in msg.nested_type.iter().enumerate() {
            let mut nested_path = path.clone();
            nested_path.extend([3, i as i32]);
            let child = visit(out, nested, &full_name, Some(index), nested_path);
            out.messages[index as usize].nested.push(child);
        }
        for (i, nested_enum) in msg.enum_type.iter().enumerate() {
            let mut enum_path = path.clone();
            enum_path.extend([4, i as i32]);
            let enum_index = out.enums.len() as u32;
            out.enums.push(OutlineEnum {
                proto: nested_enum,
                full_name: names::join(&full_name, nested_enum.name()),
                scope: full_name.clone(),
                top_level: false,
                path: enum_path,
            });
            out.messages[index as usize].enums.push(enum_index);
        }
        for (i, ext) in msg.extension.iter().enumerate() {
            let mut ext_path = path.clone();
            ext_path.extend([6, i as i32]);
            out.extensions.push(OutlineExtension {
                proto: ext,
                scope: full_name.clone(),
                path: ext_path,
            });
        }
        index
    }

    for (i, msg) in proto.message_type.iter().enumerate() {
        visit(&mut out, msg, package, None, vec![4, i as i32]);
    }
    for (i, top_enum) in proto.enum_type.iter().enumerate() {
        out.enums.push(OutlineEnum {
            proto: top_enum,
            full_name: names::join(package, top_enum.name()),
            scope: package.to_string(),
            top_level: true,
            path: vec![5, i as i32],
        });
    }
    for (i, ext) in proto.extension.iter().enumerate() {
        out.extensions.push(OutlineExtension {
            proto: ext,
            scope: package.to_string(),
            path: vec![7, i as i32],
        });
    }
    out
}

/// Computes whether a symbol is local under the file's visibility defaults.
pub(crate) fn effective_local(
    default_visibility: DefaultSymbolVisibility,
    top_level: bool,
    explicit: SymbolVisibility,
) -> bool {
    match explicit {
        SymbolVisibility::Local => true,
        SymbolVisibility::Export => false,
        SymbolVisibility::Unset => match default_visibility {
            DefaultSymbolVisibility::ExportAll | DefaultSymbolVisibility::Unknown => false,
            DefaultSymbolVisibility::LocalAll => true,
            DefaultSymbolVisibility::ExportTopLevel | DefaultSymbolVisibility::Strict => {
                !top_level
            }
        },
    }
}

/// Registration: stake out names, assign indices, record nothing that a
/// later failure would have to unwind.
pub(crate) fn register_file(
    inner: &mut PoolInner,
    proto: FileDescriptorProto,
) -> Result<u32> {
    let file_name = proto.name().to_string();
    if file_name.is_empty() {
        return Err(Error::InvalidDescriptor {
            entity: "(file)".to_string(),
            file: file_name,
            span: None,
            details: "file has no name".to_string(),
        });
    }
    if inner.files_by_name.contains_key(&file_name) {
        return Err(Error::DuplicateSymbol {
            symbol: file_name.clone(),
            file: file_name,
            span: None,
        });
    }
    for dep in proto.dependency.iter().chain(&proto.option_dependency) {
        if !inner.files_by_name.contains_key(dep) {
            return Err(Error::MissingDependency {
                file: file_name,
                dependency: dep.clone(),
            });
        }
    }

    let edition = features::file_edition(&proto)?;
    let file_features = features::merge(
        features::edition_defaults(edition)?,
        proto.options.as_ref().and_then(|o| o.features.as_ref()),
        edition,
        &file_name,
        &file_name,
    )?;

    let index = inner.files.len() as u32;
    let locations = Locations::new(proto.source_code_info.as_ref());
    let out = outline(&proto);

    // Stage all symbols, then commit; a duplicate leaves the pool untouched.
    let mut staged: Vec<(String, Symbol)> = Vec::new();
    let mut staged_names: std::collections::HashSet<String> = std::collections::HashSet::new();
    {
        let mut stage = |name: String, symbol: Symbol, path: Option<&[i32]>| -> Result<()> {
            let package_pair = matches!(symbol, Symbol::Package)
                && matches!(inner.symbols.get(&name), Some(Symbol::Package));
            if !package_pair
                && (inner.symbols.contains_key(&name) || staged_names.contains(&name))
            {
                return Err(Error::DuplicateSymbol {
                    symbol: name,
                    file: file_name.clone(),
                    span: path.and_then(|p| locations.span(p)),
                });
            }
            staged_names.insert(name.clone());
            staged.push((name, symbol));
            Ok(())
        };

        // Package components.
        let package = proto.package().to_string();
        if !package.is_empty() {
            let mut prefix = String::new();
            for component in package.split('.') {
                prefix = names::join(&prefix, component);
                stage(prefix.clone(), Symbol::Package, None)?;
            }
        }

        for (i, msg) in out.messages.iter().enumerate() {
            if msg.proto.visibility() != SymbolVisibility::Unset
                && edition < crate::schema::Edition::Edition2024
            {
                return Err(Error::InvalidDescriptor {
                    entity: msg.full_name.clone(),
                    file: file_name.clone(),
                    span: locations.span(&msg.path),
                    details: "visibility keywords require edition 2024".to_string(),
                });
            }
            let local = effective_local(
                file_features.default_symbol_visibility,
                msg.top_level,
                msg.proto.visibility(),
            );
            let map_entry = msg
                .proto
                .options
                .as_ref()
                .and_then(|o| o.map_entry)
                .unwrap_or(false);
            stage(
                msg.full_name.clone(),
                Symbol::Message {
                    file: index,
                    index: i as u32,
                    local,
                    map_entry,
                },
                Some(&msg.path),
            )?;
            for (f, field) in msg.proto.field.iter().enumerate() {
                let mut field_path = msg.path.clone();
                field_path.extend([2, f as i32]);
                stage(
                    names::join(&msg.full_name, field.name()),
                    Symbol::Field { file: index },
                    Some(&field_path),
                )?;
            }
            for oneof in &msg.proto.oneof_decl {
                stage(
                    names::join(&msg.full_name, oneof.name()),
                    Symbol::Field { file: index },
                    Some(&msg.path),
                )?;
            }
        }

        for (i, en) in out.enums.iter().enumerate() {
            if en.proto.visibility() != SymbolVisibility::Unset
                && edition < crate::schema::Edition::Edition2024
            {
                return Err(Error::InvalidDescriptor {
                    entity: en.full_name.clone(),
                    file: file_name.clone(),
                    span: locations.span(&en.path),
                    details: "visibility keywords require edition 2024".to_string(),
                });
            }
            let local = effective_local(
                file_features.default_symbol_visibility,
                en.top_level,
                en.proto.visibility(),
            );
            stage(
                en.full_name.clone(),
                Symbol::Enum {
                    file: index,
                    index: i as u32,
                    local,
                },
                Some(&en.path),
            )?;
            // Enum values scope to the enum's parent, C++ style.
            for (v, value) in en.proto.value.iter().enumerate() {
                stage(
                    names::join(&en.scope, value.name()),
                    Symbol::EnumValue {
                        file: index,
                        enum_index: i as u32,
                        value_index: v as u32,
                    },
                    Some(&en.path),
                )?;
            }
        }

        for ext in &out.extensions {
            stage(
                names::join(&ext.scope, ext.proto.name()),
                Symbol::Field { file: index },
                Some(&ext.path),
            )?;
        }

        for (i, service) in proto.service.iter().enumerate() {
            let full_name = names::join(proto.package(), service.name());
            stage(
                full_name.clone(),
                Symbol::Service {
                    file: index,
                    index: i as u32,
                },
                Some(&[6, i as i32]),
            )?;
            for method in &service.method {
                stage(names::join(&full_name, method.name()), Symbol::Method, None)?;
            }
        }
    }

    let symbol_count = staged.len();
    for (name, symbol) in staged {
        inner.symbols.insert(name, symbol);
    }

    // Best-effort extension registry; unresolved extendees are diagnosed by
    // the deferred build when the extension is actually used.
    for (i, ext) in out.extensions.iter().enumerate() {
        if let Some(extendee) =
            names::resolve(&inner.symbols, &ext.scope, ext.proto.extendee())
        {
            inner
                .extensions_by_number
                .insert((extendee, ext.proto.number() as u32), (index, i as u32));
        }
    }

    debug!(
        file = %file_name,
        symbols = symbol_count,
        messages = out.messages.len(),
        "file registered"
    );

    inner.files_by_name.insert(file_name.clone(), index);
    inner.files.push(FileEntry {
        name: file_name,
        package: proto.package().to_string(),
        edition,
        features: file_features,
        proto: Arc::new(proto),
        built: OnceLock::new(),
        error: OnceLock::new(),
    });
    Ok(index)
}

/// Looks up the registration-time `DescriptorProto` of a message anywhere in
/// the pool, by outline index.
pub(crate) fn message_proto(inner: &PoolInner, file: u32, index: u32) -> &DescriptorProto {
    let entry = &inner.files[file as usize];
    let out = outline(&entry.proto);
    out.messages[index as usize].proto
}

/// Resolves a type name and enforces the cross-file visibility rule.
fn resolve_checked<'i>(
    inner: &'i PoolInner,
    this_file: u32,
    file_name: &str,
    referrer: &str,
    scope: &str,
    name: &str,
    span: Option<crate::error::SourceSpan>,
) -> Result<(&'i Symbol, String)> {
    let Some(fqn) = names::resolve(&inner.symbols, scope, name) else {
        return Err(Error::TypeResolution {
            name: name.to_string(),
            referrer: referrer.to_string(),
            file: file_name.to_string(),
            span,
        });
    };
    let symbol = &inner.symbols[&fqn];
    let (sym_file, local) = match symbol {
        Symbol::Message { file, local, .. } => (*file, *local),
        Symbol::Enum { file, local, .. } => (*file, *local),
        _ => {
            return Err(Error::TypeResolution {
                name: name.to_string(),
                referrer: referrer.to_string(),
                file: file_name.to_string(),
                span,
            })
        }
    };
    if local && sym_file != this_file {
        return Err(Error::VisibilityViolation {
            symbol: fqn,
            defining_file: inner.files[sym_file as usize].name.clone(),
            file: file_name.to_string(),
        });
    }
    Ok((symbol, fqn))
}

fn is_packable(ty: Type) -> bool {
    !matches!(ty, Type::String | Type::Bytes | Type::Message | Type::Group)
}

/// Parses the textual default value of a field into a typed value.
fn parse_default(
    ty: Type,
    text: &str,
    enum_target: Option<(&PoolInner, u32, u32)>,
    field: &str,
    file: &str,
) -> Result<DefaultValue> {
    let bad = |details: String| Error::InvalidDescriptor {
        entity: field.to_string(),
        file: file.to_string(),
        span: None,
        details,
    };
    let value = match ty {
        Type::Bool => match text {
            "true" => DefaultValue::Bool(true),
            "false" => DefaultValue::Bool(false),
            _ => return Err(bad(format!("bad bool default '{text}'"))),
        },
        Type::Int32 | Type::Sint32 | Type::Sfixed32 => DefaultValue::I32(
            text.parse()
                .map_err(|_| bad(format!("bad int32 default '{text}'")))?,
        ),
        Type::Int64 | Type::Sint64 | Type::Sfixed64 => DefaultValue::I64(
            text.parse()
                .map_err(|_| bad(format!("bad int64 default '{text}'")))?,
        ),
        Type::Uint32 | Type::Fixed32 => DefaultValue::U32(
            text.parse()
                .map_err(|_| bad(format!("bad uint32 default '{text}'")))?,
        ),
        Type::Uint64 | Type::Fixed64 => DefaultValue::U64(
            text.parse()
                .map_err(|_| bad(format!("bad uint64 default '{text}'")))?,
        ),
        Type::Float => DefaultValue::F32(parse_float(text) as f32),
        Type::Double => DefaultValue::F64(parse_float(text)),
        Type::String => DefaultValue::String(text.to_string()),
        Type::Bytes => DefaultValue::Bytes(unescape_bytes(text)),
        Type::Enum => {
            let Some((inner, file_idx, enum_idx)) = enum_target else {
                return Err(bad("enum default on a non-enum field".to_string()));
            };
            let entry = &inner.files[file_idx as usize];
            let out = outline(&entry.proto);
            let number = out.enums[enum_idx as usize]
                .proto
                .value
                .iter()
                .find(|v| v.name() == text)
                .map(|v| v.number())
                .ok_or_else(|| bad(format!("unknown enum default '{text}'")))?;
            DefaultValue::Enum(number)
        }
        Type::Message | Type::Group => {
            return Err(bad("message fields cannot have defaults".to_string()))
        }
    };
    Ok(value)
}

fn parse_float(text: &str) -> f64 {
    match text {
        "inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        "nan" => f64::NAN,
        _ => text.parse().unwrap_or(0.0),
    }
}

/// Undoes the C-style escaping the schema compiler applies to bytes
/// defaults.
fn unescape_bytes(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.bytes().peekable();
    while let Some(b) = chars.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match chars.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(b'\\') => out.push(b'\\'),
            Some(b'\'') => out.push(b'\''),
            Some(b'"') => out.push(b'"'),
            Some(d @ b'0'..=b'7') => {
                let mut value = (d - b'0') as u32;
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            chars.next();
                        }
                        _ => break,
                    }
                }
                out.push(value as u8);
            }
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

struct FieldContext<'a> {
    inner: &'a PoolInner,
    file_index: u32,
    file_name: &'a str,
    locations: &'a Locations,
}

/// Cross-links and resolves one field or extension into [`FieldData`].
#[allow(clippy::too_many_arguments)]
fn build_field(
    ctx: &FieldContext<'_>,
    field: &FieldDescriptorProto,
    scope: &str,
    path: &[i32],
    parent_features: ResolvedFeatures,
    oneof: Option<u16>,
    real_oneof: Option<u16>,
    is_extension: bool,
) -> Result<FieldData> {
    let entry = &ctx.inner.files[ctx.file_index as usize];
    let full_name = names::join(scope, field.name());
    let span = ctx.locations.span(path);

    let opts = options::interpret(
        ctx.inner,
        ctx.file_name,
        &full_name,
        scope,
        "google.protobuf.FieldOptions",
        field.options.as_ref().map(|o| o.uninterpreted_option.as_slice()),
    )?;
    for custom in &opts.customs {
        trace!(
            defining_file = custom.extension.0,
            path_parts = custom.path.len(),
            value = ?custom.value,
            field = %full_name,
            "custom option recorded"
        );
    }
    let explicit_features =
        options::merged_features(field.options.as_ref().and_then(|o| o.features.as_ref()), &opts);
    let field_features = features::merge(
        parent_features,
        explicit_features.as_ref(),
        entry.edition,
        &full_name,
        ctx.file_name,
    )?;

    // Cross-link the type reference, if any.
    let mut ty = field.r#type.map(|_| field.r#type()).unwrap_or(Type::Message);
    let mut message_ref = None;
    let mut enum_ref = None;
    let mut target_map_entry = false;
    if !field.type_name().is_empty() {
        let (symbol, _fqn) = resolve_checked(
            ctx.inner,
            ctx.file_index,
            ctx.file_name,
            &full_name,
            scope,
            field.type_name(),
            span,
        )?;
        match symbol {
            &Symbol::Message {
                file,
                index,
                map_entry,
                ..
            } => {
                if field.r#type.is_none() {
                    ty = Type::Message;
                } else if !matches!(ty, Type::Message | Type::Group) {
                    return Err(Error::TypeResolution {
                        name: field.type_name().to_string(),
                        referrer: full_name,
                        file: ctx.file_name.to_string(),
                        span,
                    });
                }
                message_ref = Some((file, index));
                target_map_entry = map_entry;
            }
            &Symbol::Enum { file, index, .. } => {
                if field.r#type.is_none() {
                    ty = Type::Enum;
                } else if ty != Type::Enum {
                    return Err(Error::TypeResolution {
                        name: field.type_name().to_string(),
                        referrer: full_name,
                        file: ctx.file_name.to_string(),
                        span,
                    });
                }
                enum_ref = Some((file, index));
            }
            _ => unreachable!("resolve_checked returns only message and enum symbols"),
        }
    } else if field.r#type.is_some() {
        ty = field.r#type();
        if matches!(ty, Type::Message | Type::Group | Type::Enum) {
            return Err(Error::TypeResolution {
                name: String::new(),
                referrer: full_name,
                file: ctx.file_name.to_string(),
                span,
            });
        }
    }

    // Extensions: resolve the extendee and check its ranges.
    let mut extendee = None;
    if is_extension {
        let (symbol, fqn) = resolve_checked(
            ctx.inner,
            ctx.file_index,
            ctx.file_name,
            &full_name,
            scope,
            field.extendee(),
            span,
        )?;
        let &Symbol::Message { file, index, .. } = symbol else {
            return Err(Error::TypeResolution {
                name: field.extendee().to_string(),
                referrer: full_name,
                file: ctx.file_name.to_string(),
                span,
            });
        };
        let target = message_proto(ctx.inner, file, index);
        let number = field.number();
        let in_range = target
            .extension_range
            .iter()
            .any(|r| number >= r.start() && number < r.end());
        if !in_range {
            return Err(Error::InvalidFieldNumber {
                number,
                field: full_name,
                file: ctx.file_name.to_string(),
                details: format!("not in an extension range of '{fqn}'"),
            });
        }
        extendee = Some((file, index));
    }

    let label = field.label();
    let repeated = label == Label::Repeated;

    let is_map = repeated && ty == Type::Message && target_map_entry;

    let packed = if repeated && is_packable(ty) {
        opts.bool("packed")
            .or(field.options.as_ref().and_then(|o| o.packed))
            .unwrap_or(
                field_features.repeated_field_encoding == RepeatedFieldEncoding::Packed,
            )
    } else {
        false
    };

    let required =
        label == Label::Required || field_features.field_presence == FieldPresence::LegacyRequired;

    let explicit_presence = !repeated
        && real_oneof.is_none()
        && (required
            || field.proto3_optional()
            || matches!(ty, Type::Message | Type::Group)
            || is_extension
            || field_features.field_presence != FieldPresence::Implicit);

    let default_value = if field.default_value().is_empty() {
        DefaultValue::Unset
    } else {
        parse_default(
            ty,
            field.default_value(),
            enum_ref.map(|(f, e)| (ctx.inner, f, e)),
            &full_name,
            ctx.file_name,
        )?
    };

    let json_name = if field.json_name().is_empty() {
        names::to_json_name(field.name())
    } else {
        field.json_name().to_string()
    };

    Ok(FieldData {
        name: field.name().to_string(),
        full_name,
        json_name,
        number: field.number() as u32,
        ty,
        label,
        proto3_optional: field.proto3_optional(),
        oneof,
        real_oneof,
        message_ref,
        enum_ref,
        extendee,
        default_value,
        packed,
        explicit_presence,
        required,
        is_map,
        validate_utf8: ty == Type::String
            && field_features.utf8_validation == Utf8Validation::Verify,
        features: field_features,
    })
}

/// Runs cross-linking, option interpretation, feature resolution, the
/// validation sweep, and MiniTable compilation for one registered file.
pub(crate) fn build_file(inner: &PoolInner, file_index: u32) -> Result<FileTables> {
    let entry = &inner.files[file_index as usize];
    let proto = Arc::clone(&entry.proto);
    let file_name = entry.name.clone();
    let locations = Locations::new(proto.source_code_info.as_ref());
    let out = outline(&proto);
    let ctx = FieldContext {
        inner,
        file_index,
        file_name: &file_name,
        locations: &locations,
    };

    trace!(file = %file_name, "cross-linking");

    // Messages, in outline (DFS preorder) order so parents come first.
    let mut messages: Vec<MessageData> = Vec::with_capacity(out.messages.len());
    for om in &out.messages {
        let parent_features = match om.parent {
            Some(parent) => messages[parent as usize].features,
            None => entry.features,
        };
        let msg_opts = options::interpret(
            inner,
            &file_name,
            &om.full_name,
            &om.full_name,
            "google.protobuf.MessageOptions",
            om.proto
                .options
                .as_ref()
                .map(|o| o.uninterpreted_option.as_slice()),
        )?;
        let explicit = options::merged_features(
            om.proto.options.as_ref().and_then(|o| o.features.as_ref()),
            &msg_opts,
        );
        let msg_features = features::merge(
            parent_features,
            explicit.as_ref(),
            entry.edition,
            &om.full_name,
            &file_name,
        )?;

        // Which declared oneofs are real (non-synthetic)?
        let mut synthetic = vec![true; om.proto.oneof_decl.len()];
        for field in &om.proto.field {
            if let Some(i) = field.oneof_index {
                if (i as usize) < synthetic.len() && !field.proto3_optional() {
                    synthetic[i as usize] = false;
                }
            }
        }
        let mut real_index = vec![None; om.proto.oneof_decl.len()];
        let mut next_real = 0u16;
        for (i, is_synthetic) in synthetic.iter().enumerate() {
            if !is_synthetic {
                real_index[i] = Some(next_real);
                next_real += 1;
            }
        }

        let mut fields = Vec::with_capacity(om.proto.field.len());
        for (f, field) in om.proto.field.iter().enumerate() {
            let mut field_path = om.path.clone();
            field_path.extend([2, f as i32]);
            let oneof = field
                .oneof_index
                .and_then(|i| (i >= 0).then_some(i as u16));
            let real_oneof = field
                .oneof_index
                .and_then(|i| real_index.get(i as usize).copied().flatten());
            fields.push(build_field(
                &ctx,
                field,
                &om.full_name,
                &field_path,
                msg_features,
                oneof,
                real_oneof,
                false,
            )?);
        }
        fields.sort_by_key(|f| f.number);

        let mut oneofs = Vec::with_capacity(om.proto.oneof_decl.len());
        for (i, oneof) in om.proto.oneof_decl.iter().enumerate() {
            let oneof_opts = options::interpret(
                inner,
                &file_name,
                &names::join(&om.full_name, oneof.name()),
                &om.full_name,
                "google.protobuf.OneofOptions",
                oneof
                    .options
                    .as_ref()
                    .map(|o| o.uninterpreted_option.as_slice()),
            )?;
            let explicit = options::merged_features(
                oneof.options.as_ref().and_then(|o| o.features.as_ref()),
                &oneof_opts,
            );
            let oneof_features = features::merge(
                msg_features,
                explicit.as_ref(),
                entry.edition,
                oneof.name(),
                &file_name,
            )?;
            let members: Vec<u32> = fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.oneof == Some(i as u16))
                .map(|(index, _)| index as u32)
                .collect();
            oneofs.push(OneofData {
                name: oneof.name().to_string(),
                full_name: names::join(&om.full_name, oneof.name()),
                fields: members,
                synthetic: synthetic[i],
                features: oneof_features,
            });
        }

        let extension_ranges: Vec<(u32, u32)> = om
            .proto
            .extension_range
            .iter()
            .map(|r| (r.start().max(0) as u32, r.end().max(0) as u32))
            .collect();

        messages.push(MessageData {
            name: om.proto.name().to_string(),
            full_name: om.full_name.clone(),
            parent: om.parent,
            fields,
            oneofs,
            nested_messages: om.nested.clone(),
            nested_enums: om.enums.clone(),
            extension_ranges,
            map_entry: om
                .proto
                .options
                .as_ref()
                .and_then(|o| o.map_entry)
                .unwrap_or(false),
            visibility: om.proto.visibility(),
            features: msg_features,
        });
    }

    // Enums.
    let mut enums: Vec<EnumData> = Vec::with_capacity(out.enums.len());
    for oe in &out.enums {
        let parent_features = match oe.top_level {
            true => entry.features,
            false => {
                // The owning message precedes the enum in outline order.
                messages
                    .iter()
                    .find(|m| m.full_name == oe.scope)
                    .map(|m| m.features)
                    .unwrap_or(entry.features)
            }
        };
        let enum_opts = options::interpret(
            inner,
            &file_name,
            &oe.full_name,
            &oe.scope,
            "google.protobuf.EnumOptions",
            oe.proto
                .options
                .as_ref()
                .map(|o| o.uninterpreted_option.as_slice()),
        )?;
        let explicit = options::merged_features(
            oe.proto.options.as_ref().and_then(|o| o.features.as_ref()),
            &enum_opts,
        );
        let enum_features = features::merge(
            parent_features,
            explicit.as_ref(),
            entry.edition,
            &oe.full_name,
            &file_name,
        )?;
        enums.push(EnumData {
            name: oe.proto.name().to_string(),
            full_name: oe.full_name.clone(),
            values: oe
                .proto
                .value
                .iter()
                .map(|v| EnumValueData {
                    name: v.name().to_string(),
                    full_name: names::join(&oe.scope, v.name()),
                    number: v.number(),
                })
                .collect(),
            closed: enum_features.enum_type == crate::schema::feature_set::EnumType::Closed,
            visibility: oe.proto.visibility(),
            features: enum_features,
        });
    }

    // Extensions.
    let mut extensions = Vec::with_capacity(out.extensions.len());
    for oext in &out.extensions {
        extensions.push(build_field(
            &ctx,
            oext.proto,
            &oext.scope,
            &oext.path,
            entry.features,
            None,
            None,
            true,
        )?);
    }

    // Services.
    let mut services = Vec::with_capacity(proto.service.len());
    for (s, service) in proto.service.iter().enumerate() {
        let full_name = names::join(proto.package(), service.name());
        let service_path = [6, s as i32];
        let mut methods = Vec::with_capacity(service.method.len());
        for (m, method) in service.method.iter().enumerate() {
            let method_full = names::join(&full_name, method.name());
            let mut method_path = service_path.to_vec();
            method_path.extend([2, m as i32]);
            let span = locations.span(&method_path);
            let resolve_message = |name: &str| -> Result<(u32, u32)> {
                let (symbol, _) = resolve_checked(
                    inner,
                    file_index,
                    &file_name,
                    &method_full,
                    &full_name,
                    name,
                    span,
                )?;
                match symbol {
                    &Symbol::Message { file, index, .. } => Ok((file, index)),
                    _ => Err(Error::TypeResolution {
                        name: name.to_string(),
                        referrer: method_full.clone(),
                        file: file_name.clone(),
                        span,
                    }),
                }
            };
            methods.push(MethodData {
                name: method.name().to_string(),
                full_name: method_full.clone(),
                input: resolve_message(method.input_type())?,
                output: resolve_message(method.output_type())?,
                client_streaming: method.client_streaming.unwrap_or(false),
                server_streaming: method.server_streaming.unwrap_or(false),
            });
        }
        services.push(ServiceData {
            name: service.name().to_string(),
            full_name,
            methods,
            features: entry.features,
        });
    }

    trace!(file = %file_name, "validating");
    validate::validate_file(inner, &file_name, &locations, &out, &messages, &enums)?;

    // MiniTable compilation.
    let mut tables = Vec::with_capacity(messages.len());
    for (index, message) in messages.iter().enumerate() {
        let plans: Vec<FieldPlan> = message
            .fields
            .iter()
            .map(|f| FieldPlan {
                number: f.number,
                ty: f.ty,
                repeated: f.label == Label::Repeated,
                packed: f.packed,
                explicit_presence: f.explicit_presence,
                required: f.required,
                oneof: f.real_oneof,
                is_map: f.is_map,
                sub_message: f.message_ref.map(|(file, index)| TableId { file, index }),
                sub_enum: f.enum_ref.map(|(file, index)| EnumId { file, index }),
                validate_utf8: f.validate_utf8,
            })
            .collect();
        let real_oneofs = message.oneofs.iter().filter(|o| !o.synthetic).count() as u32;
        tables.push(table::compile(
            &plans,
            real_oneofs,
            message.extension_ranges.clone(),
            message.map_entry,
        ));
        trace!(
            message = %message.full_name,
            slots = tables[index].size,
            "mini table compiled"
        );
    }

    let enum_tables: Vec<EnumTable> = enums
        .iter()
        .map(|e| {
            let mut values: Vec<i32> = e.values.iter().map(|v| v.number).collect();
            values.sort_unstable();
            values.dedup();
            EnumTable {
                closed: e.closed,
                values,
            }
        })
        .collect();

    debug!(
        file = %file_name,
        messages = messages.len(),
        enums = enums.len(),
        "file build complete"
    );

    Ok(FileTables {
        features: entry.features,
        messages,
        enums,
        services,
        extensions,
        tables,
        enum_tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_bytes() {
        assert_eq!(unescape_bytes("abc"), b"abc");
        assert_eq!(unescape_bytes("a\\nb"), b"a\nb");
        assert_eq!(unescape_bytes("\\001\\377"), vec![1, 0xFF]);
        assert_eq!(unescape_bytes("q\\\\"), b"q\\");
    }

    #[test]
    fn test_effective_local_matrix() {
        use DefaultSymbolVisibility as D;
        use SymbolVisibility as V;

        assert!(!effective_local(D::ExportAll, true, V::Unset));
        assert!(!effective_local(D::ExportAll, false, V::Unset));
        assert!(effective_local(D::LocalAll, true, V::Unset));
        assert!(!effective_local(D::ExportTopLevel, true, V::Unset));
        assert!(effective_local(D::ExportTopLevel, false, V::Unset));
        assert!(effective_local(D::Strict, false, V::Unset));

        // Explicit keywords override the default.
        assert!(effective_local(D::ExportAll, true, V::Local));
        assert!(!effective_local(D::LocalAll, false, V::Export));
    }

    #[test]
    fn test_parse_float_specials() {
        assert_eq!(parse_float("inf"), f64::INFINITY);
        assert_eq!(parse_float("-inf"), f64::NEG_INFINITY);
        assert!(parse_float("nan").is_nan());
        assert_eq!(parse_float("2.5"), 2.5);
    }
}
