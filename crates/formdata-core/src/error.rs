//! Error type shared by the encoder and the decoder.

use std::fmt;

/// Errors produced while encoding or decoding `multipart/form-data`.
///
/// Every variant ends the current encode or parse session. Nothing is
/// retried internally and no partial result is handed back.
#[derive(Debug)]
pub enum MultipartError {
    /// Missing boundary in Content-Type header.
    MissingBoundary,
    /// Invalid boundary format.
    InvalidBoundary,
    /// The body ended without a terminal boundary, or is otherwise not multipart.
    MalformedBody { detail: &'static str },
    /// A part's header block is missing or invalid.
    MalformedPart { detail: String },
    /// A field path runs into a value already stored at that location.
    ConflictingPath { path: String },
    /// A part body was accessed out of order.
    SequenceViolation { active: usize, requested: usize },
    /// The underlying transport failed while a body was being read.
    StreamRead { detail: String },
    /// A streamed entry failed while the form was being serialized.
    Encoding { field: String, detail: String },
    /// I/O error while spooling or reading back file data.
    Io { detail: String },
    /// Too many fields.
    TooManyFields { count: usize, max: usize },
    /// File size exceeds limit.
    FileTooLarge { size: usize, max: usize },
    /// Total upload size exceeds limit.
    TotalTooLarge { size: usize, max: usize },
}

impl MultipartError {
    pub(crate) fn malformed_part(detail: impl Into<String>) -> Self {
        Self::MalformedPart {
            detail: detail.into(),
        }
    }

    pub(crate) fn stream_read(err: &std::io::Error) -> Self {
        Self::StreamRead {
            detail: err.to_string(),
        }
    }

    pub(crate) fn io(err: &std::io::Error) -> Self {
        Self::Io {
            detail: err.to_string(),
        }
    }

    /// HTTP status a server should answer with when surfacing this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingBoundary
            | Self::InvalidBoundary
            | Self::MalformedBody { .. }
            | Self::MalformedPart { .. }
            | Self::ConflictingPath { .. } => 400,
            Self::TooManyFields { .. } | Self::FileTooLarge { .. } | Self::TotalTooLarge { .. } => {
                413
            }
            Self::SequenceViolation { .. }
            | Self::StreamRead { .. }
            | Self::Encoding { .. }
            | Self::Io { .. } => 500,
        }
    }
}

impl fmt::Display for MultipartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBoundary => write!(f, "missing boundary in multipart Content-Type"),
            Self::InvalidBoundary => write!(f, "invalid multipart boundary"),
            Self::MalformedBody { detail } => write!(f, "malformed multipart body: {detail}"),
            Self::MalformedPart { detail } => write!(f, "malformed multipart part: {detail}"),
            Self::ConflictingPath { path } => {
                write!(f, "field path `{path}` conflicts with an existing value")
            }
            Self::SequenceViolation { active, requested } => write!(
                f,
                "part {requested} accessed while part {active} is still being read"
            ),
            Self::StreamRead { detail } => write!(f, "failed to read multipart stream: {detail}"),
            Self::Encoding { field, detail } => {
                write!(f, "failed to encode field `{field}`: {detail}")
            }
            Self::Io { detail } => write!(f, "multipart I/O error: {detail}"),
            Self::TooManyFields { count, max } => {
                write!(f, "too many fields: {count} exceeds limit of {max}")
            }
            Self::FileTooLarge { size, max } => {
                write!(f, "file too large: {size} bytes exceeds limit of {max}")
            }
            Self::TotalTooLarge { size, max } => {
                write!(
                    f,
                    "total upload too large: {size} bytes exceeds limit of {max}"
                )
            }
        }
    }
}

impl std::error::Error for MultipartError {}
