//! Error types for the conversion pipeline
//!
//! Every stage reports one typed error: dispatch failures surface as
//! [`ConvertError::UnsupportedScheme`] / [`ConvertError::UnsupportedFormat`],
//! parser failures as [`ParseError`] and exporter failures as [`RenderError`].

use thiserror::Error;

/// Top-level error returned by [`crate::convert::Converter::convert`]
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No parser is registered for the link scheme
    #[error("unsupported uri scheme: '{0}'")]
    UnsupportedScheme(String),

    /// No exporter is registered for the requested format
    #[error("unsupported format: '{0}'")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ConvertError {
    /// Whether the error was caused by the caller's input (scheme, format or link)
    /// rather than by the exporter's environment.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ConvertError::Render(RenderError::TemplateRead { .. }))
    }
}

/// A link could not be turned into a profile
#[derive(Debug, Error)]
#[error("failed to parse {scheme} link: {cause}")]
pub struct ParseError {
    /// Scheme of the offending link (empty when the scheme itself is missing)
    pub scheme: String,
    #[source]
    pub cause: ParseCause,
}

impl ParseError {
    pub fn new(scheme: impl Into<String>, cause: impl Into<ParseCause>) -> Self {
        Self {
            scheme: scheme.into(),
            cause: cause.into(),
        }
    }
}

/// Underlying reason for a [`ParseError`]
#[derive(Debug, Error)]
pub enum ParseCause {
    #[error("missing scheme separator '://'")]
    MissingScheme,

    #[error("invalid uri: {0}")]
    Url(#[from] url::ParseError),

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded content is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Malformed(String),
}

/// A profile could not be rendered into the requested document
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read {format} template from {origin}: {source}")]
    TemplateRead {
        format: &'static str,
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} template: {reason}")]
    TemplateParse {
        format: &'static str,
        reason: String,
    },

    /// The template parsed but does not have the expected list structures
    #[error("template '{key}' is not a list")]
    TemplateShape { key: &'static str },

    #[error("{format} requires a port in 1..=65535, got {port}")]
    InvalidPort { format: &'static str, port: u16 },

    #[error("{format} cannot represent {proto} profiles")]
    UnsupportedProtocol {
        format: &'static str,
        proto: &'static str,
    },

    #[error("{format} requires {field}, which the link did not provide")]
    MissingField {
        format: &'static str,
        field: &'static str,
    },

    #[error("failed to serialize {format} document: {reason}")]
    Serialize {
        format: &'static str,
        reason: String,
    },
}
