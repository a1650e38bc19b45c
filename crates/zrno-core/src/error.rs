//! Error types for the zrno-core library.
//!
//! This module provides comprehensive error handling using the `thiserror` crate,
//! with separate variants for descriptor-pool build failures (which carry the
//! offending file and, when source info is available, a line/column) and wire
//! format failures (which carry a byte offset into the input).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for zrno operations
pub type Result<T> = std::result::Result<T, Error>;

/// A source location inside a `.proto` file, recovered from `SourceCodeInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub column: u32,
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

fn fmt_span(span: &Option<SourceSpan>) -> String {
    match span {
        Some(s) => format!(" at {}", s),
        None => String::new(),
    }
}

/// Comprehensive error type for all zrno operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A fully-qualified name was registered twice in the pool
    #[error("duplicate symbol '{symbol}' in '{file}'{}", fmt_span(.span))]
    DuplicateSymbol {
        /// The colliding fully-qualified name
        symbol: String,
        /// File that attempted the second registration
        file: String,
        /// Location of the second declaration, if known
        span: Option<SourceSpan>,
    },

    /// A file imports a dependency that is not present in the pool
    #[error("file '{file}' imports '{dependency}', which is not in the pool")]
    MissingDependency {
        /// The importing file
        file: String,
        /// The missing import path
        dependency: String,
    },

    /// A type name used by a field, method, or extension did not resolve
    #[error("could not resolve '{name}' referenced from '{referrer}' in '{file}'{}", fmt_span(.span))]
    TypeResolution {
        /// The type name as written in the schema
        name: String,
        /// Fully-qualified name of the referring entity
        referrer: String,
        /// File containing the reference
        file: String,
        /// Location of the reference, if known
        span: Option<SourceSpan>,
    },

    /// A cross-file reference to a symbol whose effective visibility is local
    #[error("symbol '{symbol}' is local to '{defining_file}' and cannot be referenced from '{file}'")]
    VisibilityViolation {
        /// The referenced local symbol
        symbol: String,
        /// File that defines the symbol
        defining_file: String,
        /// File attempting the reference
        file: String,
    },

    /// Feature resolution failed for an entity
    #[error("feature resolution failed for '{entity}' in '{file}': {details}")]
    FeatureResolution {
        /// Fully-qualified name of the entity
        entity: String,
        /// File containing the entity
        file: String,
        /// Detailed description of the failure
        details: String,
    },

    /// The file declares an edition the pool does not support
    #[error("file '{file}' uses unsupported edition '{edition}'")]
    EditionUnsupported {
        /// The offending file
        file: String,
        /// The declared edition or syntax string
        edition: String,
    },

    /// A field number is out of range or falls into a reserved region
    #[error("invalid field number {number} on '{field}' in '{file}': {details}")]
    InvalidFieldNumber {
        /// The invalid number
        number: i32,
        /// Fully-qualified field name
        field: String,
        /// File containing the field
        file: String,
        /// Why the number was rejected
        details: String,
    },

    /// A descriptor failed the structural validation sweep
    #[error("invalid descriptor '{entity}' in '{file}'{}: {details}", fmt_span(.span))]
    InvalidDescriptor {
        /// Fully-qualified name of the invalid entity
        entity: String,
        /// File containing the entity
        file: String,
        /// Location of the declaration, if known
        span: Option<SourceSpan>,
        /// What the sweep rejected
        details: String,
    },

    /// The wire input ended before the announced field data
    #[error("truncated input at offset {offset}: {details}")]
    Truncated {
        /// Byte offset where the input ran out
        offset: usize,
        /// What was being read
        details: String,
    },

    /// A varint ran past ten bytes or past the end of the buffer
    #[error("malformed varint at offset {offset}")]
    MalformedVarint {
        /// Byte offset of the first varint byte
        offset: usize,
    },

    /// A tag decoded to field number zero or an undefined wire type
    #[error("invalid tag at offset {offset}: field {field_number}, wire type {wire_type}")]
    TagOutOfRange {
        /// Byte offset of the tag
        offset: usize,
        /// The decoded field number
        field_number: u32,
        /// The decoded wire type bits
        wire_type: u8,
    },

    /// A start-group tag was never closed by a matching end-group tag
    #[error("unterminated group (field {field_number}) starting at offset {offset}")]
    UnterminatedGroup {
        /// Byte offset of the start-group tag
        offset: usize,
        /// The group's field number
        field_number: u32,
    },

    /// Sub-message nesting exceeded the recursion budget
    #[error("message nesting exceeded the depth limit of {limit}")]
    DepthExceeded {
        /// The configured recursion limit
        limit: usize,
    },

    /// A string field failed UTF-8 validation
    #[error("invalid UTF-8 in string field at offset {offset}")]
    Utf8Invalid {
        /// Byte offset of the string payload
        offset: usize,
    },

    /// Decoding would exceed the configured allocation budget
    #[error("allocation budget of {budget} bytes exceeded")]
    OutOfMemory {
        /// The configured budget in bytes
        budget: usize,
    },

    /// Failed to decode a serialized FileDescriptorProto
    #[error("failed to parse FileDescriptorProto: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Failed to read an input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A runtime operation was applied to a mismatched message or field type
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new truncated-input error
    pub fn truncated(offset: usize, details: impl Into<String>) -> Self {
        Self::Truncated {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new malformed-varint error
    pub fn malformed_varint(offset: usize) -> Self {
        Self::MalformedVarint { offset }
    }

    /// Creates a new type-mismatch error
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error came out of the descriptor pool rather
    /// than the wire paths
    pub fn is_pool_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateSymbol { .. }
                | Self::MissingDependency { .. }
                | Self::TypeResolution { .. }
                | Self::VisibilityViolation { .. }
                | Self::FeatureResolution { .. }
                | Self::EditionUnsupported { .. }
                | Self::InvalidFieldNumber { .. }
                | Self::InvalidDescriptor { .. }
        )
    }

    /// Returns true if the input that produced this error was malformed,
    /// as opposed to a usage or environment problem
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::MalformedVarint { .. }
                | Self::TagOutOfRange { .. }
                | Self::UnterminatedGroup { .. }
                | Self::DepthExceeded { .. }
                | Self::Utf8Invalid { .. }
                | Self::DescriptorParse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_with_span() {
        let err = Error::DuplicateSymbol {
            symbol: "pkg.Foo".to_string(),
            file: "pkg.proto".to_string(),
            span: Some(SourceSpan { line: 12, column: 3 }),
        };
        let text = err.to_string();
        assert!(text.contains("pkg.Foo"));
        assert!(text.contains("12:3"));
    }

    #[test]
    fn test_error_display_without_span() {
        let err = Error::DuplicateSymbol {
            symbol: "pkg.Foo".to_string(),
            file: "pkg.proto".to_string(),
            span: None,
        };
        assert!(!err.to_string().contains(" at "));
    }

    #[test]
    fn test_classification() {
        let pool = Error::MissingDependency {
            file: "a.proto".to_string(),
            dependency: "b.proto".to_string(),
        };
        assert!(pool.is_pool_error());
        assert!(!pool.is_data_error());

        let wire = Error::malformed_varint(7);
        assert!(wire.is_data_error());
        assert!(!wire.is_pool_error());
    }
}
