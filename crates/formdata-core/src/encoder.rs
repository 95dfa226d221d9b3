//! Streaming `multipart/form-data` serializer.
//!
//! The encoder is pull-based: nothing is produced until the consumer polls,
//! and streamed entries are forwarded one chunk per poll, so memory use stays
//! bounded by the largest single chunk no matter how big an entry is.

use crate::boundary::Boundary;
use crate::error::MultipartError;
use crate::form::{FieldEntry, FieldValue, FormData, StreamValue};
use crate::headers::starts_escape;
use crate::stream::{ByteStream, next_item};
use asupersync::stream::Stream;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, trace};

const CRLF: &[u8] = b"\r\n";

/// Lazy stream of body chunks for one [`FormData`].
///
/// Yields `Err(MultipartError::Encoding)` at most once, when a streamed entry
/// fails; the stream ends right after, without a closing boundary.
pub struct Encoder {
    boundary: Boundary,
    entries: VecDeque<FieldEntry>,
    state: EncodeState,
}

enum EncodeState {
    Entries,
    Streaming {
        field: String,
        stream: ByteStream,
        declared: Option<u64>,
        sent: u64,
    },
    Done,
}

impl Encoder {
    /// Take ownership of `form` and prepare to serialize it.
    #[must_use]
    pub fn new(form: FormData) -> Self {
        let (boundary, entries) = form.into_parts();
        debug!(entries = entries.len(), %boundary, "multipart encoder created");
        Self {
            boundary,
            entries: entries.into(),
            state: EncodeState::Entries,
        }
    }

    /// Serialize `form` without consuming it.
    ///
    /// Text and binary entries are copied. Stream entries are moved into the
    /// encoder, so a second serialization of the same form fails on them.
    #[must_use]
    pub fn from_form(form: &mut FormData) -> Self {
        let mut copy = FormData::with_boundary(form.boundary().clone());
        for entry in form.entries_mut() {
            copy.append_entry(entry.take_for_encoding());
        }
        Self::new(copy)
    }

    #[must_use]
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Drain the whole body into memory.
    pub async fn into_bytes(mut self) -> Result<Vec<u8>, MultipartError> {
        let mut body = Vec::new();
        while let Some(chunk) = next_item(&mut self).await {
            body.extend_from_slice(&chunk?);
        }
        Ok(body)
    }
}

impl Stream for Encoder {
    type Item = Result<Vec<u8>, MultipartError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                EncodeState::Done => return Poll::Ready(None),
                EncodeState::Entries => {
                    let Some(entry) = this.entries.pop_front() else {
                        this.state = EncodeState::Done;
                        return Poll::Ready(Some(Ok(closing_line(&this.boundary))));
                    };

                    let mut chunk = part_head(&this.boundary, &entry);
                    let (field, value) = entry.into_parts();
                    match value {
                        FieldValue::Text(text) => {
                            chunk.extend_from_slice(text.as_bytes());
                            chunk.extend_from_slice(CRLF);
                            return Poll::Ready(Some(Ok(chunk)));
                        }
                        FieldValue::Binary(data) => {
                            chunk.extend_from_slice(&data);
                            chunk.extend_from_slice(CRLF);
                            return Poll::Ready(Some(Ok(chunk)));
                        }
                        FieldValue::Stream(mut value) => {
                            let declared = value.length();
                            let Some(stream) = value.take() else {
                                this.state = EncodeState::Done;
                                return Poll::Ready(Some(Err(MultipartError::Encoding {
                                    field,
                                    detail: "stream value was already consumed".to_string(),
                                })));
                            };
                            trace!(field = %field, "forwarding streamed entry");
                            this.state = EncodeState::Streaming {
                                field,
                                stream,
                                declared,
                                sent: 0,
                            };
                            return Poll::Ready(Some(Ok(chunk)));
                        }
                    }
                }
                EncodeState::Streaming {
                    field,
                    stream,
                    declared,
                    sent,
                } => {
                    let polled = stream.as_mut().poll_next(cx);
                    match polled {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Some(Ok(chunk))) => {
                            if chunk.is_empty() {
                                continue;
                            }
                            *sent = sent.saturating_add(chunk.len() as u64);
                            if declared.is_some_and(|max| *sent > max) {
                                let detail = format!(
                                    "stream yielded more than its declared {} bytes",
                                    declared.unwrap_or_default()
                                );
                                let field = std::mem::take(field);
                                this.state = EncodeState::Done;
                                return Poll::Ready(Some(Err(MultipartError::Encoding {
                                    field,
                                    detail,
                                })));
                            }
                            return Poll::Ready(Some(Ok(chunk)));
                        }
                        Poll::Ready(Some(Err(err))) => {
                            let field = std::mem::take(field);
                            debug!(field = %field, error = %err, "streamed entry failed");
                            this.state = EncodeState::Done;
                            return Poll::Ready(Some(Err(MultipartError::Encoding {
                                field,
                                detail: err.to_string(),
                            })));
                        }
                        Poll::Ready(None) => {
                            if let Some(expected) = *declared {
                                if *sent != expected {
                                    let detail = format!(
                                        "stream ended after {sent} of its declared {expected} bytes"
                                    );
                                    let field = std::mem::take(field);
                                    this.state = EncodeState::Done;
                                    return Poll::Ready(Some(Err(MultipartError::Encoding {
                                        field,
                                        detail,
                                    })));
                                }
                            }
                            this.state = EncodeState::Entries;
                            return Poll::Ready(Some(Ok(CRLF.to_vec())));
                        }
                    }
                }
            }
        }
    }
}

impl FormData {
    /// Serialize the form, leaving text and binary entries in place.
    ///
    /// See [`Encoder::from_form`].
    #[must_use]
    pub fn stream(&mut self) -> Encoder {
        Encoder::from_form(self)
    }
}

impl FieldEntry {
    pub(crate) fn take_for_encoding(&mut self) -> FieldEntry {
        let value = match self.value_mut() {
            FieldValue::Text(text) => FieldValue::Text(text.clone()),
            FieldValue::Binary(data) => FieldValue::Binary(data.clone()),
            FieldValue::Stream(stream) => FieldValue::Stream(stream.take_value()),
        };
        self.with_value(value)
    }
}

impl StreamValue {
    fn take_value(&mut self) -> StreamValue {
        let length = self.length();
        match self.take() {
            Some(stream) => StreamValue::from_boxed(stream, length),
            None => StreamValue::consumed(length),
        }
    }
}

/// Boundary line plus header block for one entry, up to and including the
/// blank line that precedes the value.
pub(crate) fn part_head(boundary: &Boundary, entry: &FieldEntry) -> Vec<u8> {
    let mut head = String::with_capacity(96 + entry.name().len());
    head.push_str("--");
    head.push_str(boundary.as_str());
    head.push_str("\r\nContent-Disposition: form-data; name=\"");
    head.push_str(&escape_param(entry.name()));
    head.push('"');
    if let Some(filename) = entry.filename() {
        head.push_str("; filename=\"");
        head.push_str(&escape_param(filename));
        head.push('"');
    }
    head.push_str("\r\n");
    if let Some(content_type) = entry.content_type() {
        head.push_str("Content-Type: ");
        head.extend(content_type.chars().filter(|c| !c.is_control()));
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    head.into_bytes()
}

fn closing_line(boundary: &Boundary) -> Vec<u8> {
    format!("--{boundary}--\r\n").into_bytes()
}

pub(crate) fn closing_len(boundary: &Boundary) -> u64 {
    boundary.as_str().len() as u64 + 6
}

/// Escape a field name or filename for use inside a quoted header parameter.
///
/// `"`, CR and LF become `%22`, `%0D` and `%0A` as browsers send them; other
/// control characters are percent-encoded the same way and `\` is written as
/// a quoted-pair. A literal `%` that would otherwise read back as one of those
/// escapes (or as `%25`) is itself written as `%25`.
#[must_use]
pub fn escape_param(value: &str) -> Cow<'_, str> {
    if !value
        .chars()
        .any(|c| c == '"' || c == '\\' || c == '%' || c.is_ascii_control())
    {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len() + 8);
    for (i, c) in value.char_indices() {
        match c {
            '"' => out.push_str("%22"),
            '\\' => out.push_str("\\\\"),
            '%' if starts_escape(&value.as_bytes()[i..]) => out.push_str("%25"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "%{:02X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Guess a content type from a filename's extension.
#[must_use]
pub fn guess_content_type(filename: Option<&str>) -> &'static str {
    let Some(ext) = filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
    else {
        return "application/octet-stream";
    };

    match ext.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}
