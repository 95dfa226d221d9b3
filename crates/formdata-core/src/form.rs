//! Encode-side field store.
//!
//! [`FormData`] is an ordered multi-map from field name to entries. Names may
//! repeat; insertion order is what goes on the wire.
//!
//! # Example
//!
//! ```ignore
//! use formdata_core::{FormData, StreamValue};
//!
//! let mut form = FormData::new();
//! form.append("title", "holiday");
//! form.append("count", 3);
//! form.append_file("photo", jpeg_bytes, "beach.jpg");
//! assert!(form.computed_length().is_some());
//!
//! form.append_file("log", StreamValue::new(log_stream), "app.log");
//! assert_eq!(form.computed_length(), None);
//! ```

use crate::boundary::Boundary;
use crate::encoder::{self, Encoder};
use crate::stream::{ByteStream, boxed};
use asupersync::stream::Stream;
use std::fmt;
use std::io;

/// Single-consumption stream value.
///
/// The stream is handed to the encoder the first time the form is
/// serialized; afterwards the value reports itself as consumed.
pub struct StreamValue {
    stream: Option<ByteStream>,
    length: Option<u64>,
}

impl StreamValue {
    /// Wrap a stream whose length is not known in advance.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
    {
        Self {
            stream: Some(boxed(stream)),
            length: None,
        }
    }

    /// Wrap a stream that is known to yield exactly `length` bytes.
    pub fn with_length<S>(stream: S, length: u64) -> Self
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
    {
        Self {
            stream: Some(boxed(stream)),
            length: Some(length),
        }
    }

    /// Declared byte length, if any.
    #[must_use]
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Returns true once the stream has been handed to an encoder.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.stream.is_none()
    }

    pub(crate) fn take(&mut self) -> Option<ByteStream> {
        self.stream.take()
    }

    pub(crate) fn from_boxed(stream: ByteStream, length: Option<u64>) -> Self {
        Self {
            stream: Some(stream),
            length,
        }
    }

    pub(crate) fn consumed(length: Option<u64>) -> Self {
        Self {
            stream: None,
            length,
        }
    }
}

impl fmt::Debug for StreamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamValue")
            .field("length", &self.length)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// Value stored for one form entry.
///
/// Anything that is not text, bytes or a stream is turned into text through
/// one of the `From` conversions below. Composite values are stringified,
/// never expanded into several fields.
#[derive(Debug)]
pub enum FieldValue {
    Text(String),
    Binary(Vec<u8>),
    Stream(StreamValue),
}

impl FieldValue {
    /// Byte length of the serialized value, when it can be known up front.
    ///
    /// A consumed stream has no length: it can no longer be serialized.
    #[must_use]
    pub fn known_length(&self) -> Option<u64> {
        match self {
            Self::Text(text) => u64::try_from(text.len()).ok(),
            Self::Binary(data) => u64::try_from(data.len()).ok(),
            Self::Stream(stream) if stream.is_consumed() => None,
            Self::Stream(stream) => stream.length(),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(text) => Some(text.as_bytes()),
            Self::Binary(data) => Some(data),
            Self::Stream(_) => None,
        }
    }

    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<char> for FieldValue {
    fn from(value: char) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Text(value.to_string())
    }
}

macro_rules! text_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::Text(value.to_string())
                }
            }
        )*
    };
}

text_from_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Text(number_to_string(value))
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Text(number_to_string(f64::from(value)))
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(value: &[u8]) -> Self {
        Self::Binary(value.to_vec())
    }
}

impl From<StreamValue> for FieldValue {
    fn from(value: StreamValue) -> Self {
        Self::Stream(value)
    }
}

/// `None` is JavaScript's `undefined`, which `String()` renders as
/// `"undefined"`.
impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(|| Self::Text(UNDEFINED.to_string()), Into::into)
    }
}

impl From<()> for FieldValue {
    fn from((): ()) -> Self {
        Self::Text(UNDEFINED.to_string())
    }
}

const UNDEFINED: &str = "undefined";

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Text(json_to_string(&value))
    }
}

impl From<&serde_json::Value> for FieldValue {
    fn from(value: &serde_json::Value) -> Self {
        Self::Text(json_to_string(value))
    }
}

/// Textual form of a JSON value, following JavaScript's `String(value)`.
///
/// Arrays join their elements with `,` (null elements become empty) and
/// every object renders as `[object Object]`.
#[must_use]
pub fn json_to_string(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_f64() {
                n.as_f64().map_or_else(|| n.to_string(), number_to_string)
            } else {
                n.to_string()
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => json_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        String::from(if value > 0.0 { "Infinity" } else { "-Infinity" })
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        // Integral floats print without a fractional part.
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

/// Value accepted by the filename-bearing operations.
///
/// Only bytes and streams can carry a filename.
#[derive(Debug)]
pub enum FileBody {
    Binary(Vec<u8>),
    Stream(StreamValue),
}

impl From<Vec<u8>> for FileBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<&[u8]> for FileBody {
    fn from(value: &[u8]) -> Self {
        Self::Binary(value.to_vec())
    }
}

impl From<StreamValue> for FileBody {
    fn from(value: StreamValue) -> Self {
        Self::Stream(value)
    }
}

impl From<FileBody> for FieldValue {
    fn from(value: FileBody) -> Self {
        match value {
            FileBody::Binary(data) => Self::Binary(data),
            FileBody::Stream(stream) => Self::Stream(stream),
        }
    }
}

/// One named entry of a [`FormData`].
#[derive(Debug)]
pub struct FieldEntry {
    name: String,
    value: FieldValue,
    filename: Option<String>,
    content_type: Option<String>,
}

impl FieldEntry {
    /// A plain entry without filename.
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            filename: None,
            content_type: None,
        }
    }

    /// A file entry.
    pub fn file(
        name: impl Into<String>,
        value: impl Into<FileBody>,
        filename: impl Into<String>,
    ) -> Self {
        let body: FileBody = value.into();
        Self {
            name: name.into(),
            value: FieldValue::from(body),
            filename: Some(filename.into()),
            content_type: None,
        }
    }

    /// Override the `Content-Type` sent for binary or stream values.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Content type written to the part header, if the entry gets one.
    ///
    /// Text entries never carry a `Content-Type` line. Binary and stream
    /// entries use the explicit type, else a guess from the filename.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        match self.value {
            FieldValue::Text(_) => None,
            FieldValue::Binary(_) | FieldValue::Stream(_) => Some(
                self.content_type
                    .as_deref()
                    .unwrap_or_else(|| encoder::guess_content_type(self.filename.as_deref())),
            ),
        }
    }

    pub(crate) fn value_mut(&mut self) -> &mut FieldValue {
        &mut self.value
    }

    /// Same name, filename and content type, different value.
    pub(crate) fn with_value(&self, value: FieldValue) -> FieldEntry {
        FieldEntry {
            name: self.name.clone(),
            value,
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
        }
    }

    pub(crate) fn into_parts(self) -> (String, FieldValue) {
        (self.name, self.value)
    }
}

/// Ordered, multi-valued field store that serializes to `multipart/form-data`.
#[derive(Debug)]
pub struct FormData {
    boundary: Boundary,
    entries: Vec<FieldEntry>,
}

impl Default for FormData {
    fn default() -> Self {
        Self::new()
    }
}

impl FormData {
    /// Create an empty form with a freshly generated boundary.
    #[must_use]
    pub fn new() -> Self {
        Self::with_boundary(Boundary::generate())
    }

    /// Create an empty form that will serialize with `boundary`.
    #[must_use]
    pub fn with_boundary(boundary: Boundary) -> Self {
        Self {
            boundary,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// `multipart/form-data; boundary=<boundary>`.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Headers to send with the serialized body.
    ///
    /// `Content-Length` is included only when [`computed_length`](Self::computed_length)
    /// knows the size.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), self.content_type())];
        if let Some(length) = self.computed_length() {
            headers.push(("Content-Length".to_string(), length.to_string()));
        }
        headers
    }

    /// Add an entry without touching existing entries of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.entries.push(FieldEntry::new(name, value));
    }

    /// Add a file entry.
    pub fn append_file(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FileBody>,
        filename: impl Into<String>,
    ) {
        self.entries.push(FieldEntry::file(name, value, filename));
    }

    /// Add a prepared entry.
    pub fn append_entry(&mut self, entry: FieldEntry) {
        self.entries.push(entry);
    }

    /// Replace every entry named `name` with a single new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.set_entry(FieldEntry::new(name, value));
    }

    /// Replace every entry named `name` with a single file entry.
    pub fn set_file(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FileBody>,
        filename: impl Into<String>,
    ) {
        self.set_entry(FieldEntry::file(name, value, filename));
    }

    /// Replace every entry sharing `entry`'s name with `entry`.
    pub fn set_entry(&mut self, entry: FieldEntry) {
        self.delete(&entry.name);
        self.entries.push(entry);
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// First value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(FieldEntry::value)
    }

    /// Every value stored under `name`, in insertion order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&FieldValue> {
        self.entries
            .iter()
            .filter(|e| e.name == name)
            .map(FieldEntry::value)
            .collect()
    }

    /// Remove every entry named `name`.
    pub fn delete(&mut self, name: &str) {
        self.entries.retain(|e| e.name != name);
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &FieldEntry> {
        self.entries.iter()
    }

    /// `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.entries.iter().map(|e| &e.value)
    }

    /// Call `f(value, name)` for every entry in insertion order.
    pub fn for_each(&self, mut f: impl FnMut(&FieldValue, &str)) {
        for entry in &self.entries {
            f(&entry.value, &entry.name);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact size of the serialized body, or `None` when any entry's size is
    /// unknown (a stream without a declared length).
    ///
    /// Callers must not send `Content-Length` when this is `None`.
    #[must_use]
    pub fn computed_length(&self) -> Option<u64> {
        let mut total = encoder::closing_len(&self.boundary);
        for entry in &self.entries {
            let value = entry.value.known_length()?;
            let head = u64::try_from(encoder::part_head(&self.boundary, entry).len()).ok()?;
            total = total.checked_add(head)?.checked_add(value)?.checked_add(2)?;
        }
        Some(total)
    }

    /// Serialize the form into a lazy stream of body chunks.
    #[must_use]
    pub fn into_stream(self) -> Encoder {
        Encoder::new(self)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut FieldEntry> {
        self.entries.iter_mut()
    }

    pub(crate) fn into_parts(self) -> (Boundary, Vec<FieldEntry>) {
        (self.boundary, self.entries)
    }
}

impl fmt::Display for FormData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormData({} entries, boundary={})", self.len(), self.boundary)
    }
}
