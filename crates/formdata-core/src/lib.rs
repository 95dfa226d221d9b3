//! Core `multipart/form-data` codec for formdata_rust.
//!
//! This crate provides both directions of the format:
//! - [`FormData`], an ordered field store, and the [`Encoder`] that
//!   serializes it into a pull-based byte stream
//! - [`Multipart`], a streaming decoder yielding [`Part`]s with lazily read
//!   bodies, and [`Multipart::into_tree`] which rebuilds nested values from
//!   bracket-style field names
//!
//! # Design Principles
//!
//! - Bytes are pulled from the source only when the consumer asks for them
//! - Memory use is bounded by one input chunk plus a boundary-sized tail
//! - No transport I/O: callers hand in an [`asupersync::stream::Stream`] of
//!   byte chunks and get one back
//! - All types support `Send`
//!
//! # Example
//!
//! ```
//! use formdata_core::{FormData, Multipart, ParsedNode};
//! use futures_executor::block_on;
//!
//! let mut form = FormData::new();
//! form.append("user[name]", "Kari");
//! form.append("user[age]", 41);
//! form.append_file("avatar", b"\x89PNG".to_vec(), "me.png");
//!
//! let boundary = form.boundary().clone();
//! let body = block_on(form.into_stream().into_bytes()).unwrap();
//!
//! let source = formdata_core::ChunkedBytes::new(body, 8);
//! let tree = block_on(Multipart::new(source, boundary).into_tree()).unwrap();
//! assert_eq!(tree.lookup("user[age]").and_then(ParsedNode::as_text), Some("41"));
//! ```

#![forbid(unsafe_code)]

pub mod boundary;
mod config;
mod decoder;
mod encoder;
pub mod error;
mod file;
mod form;
mod headers;
pub mod scanner;
pub mod stream;
pub mod tree;

pub use boundary::{Boundary, parse_boundary};
pub use config::{
    DEFAULT_MAX_FIELDS, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_TOTAL_SIZE,
    DEFAULT_SPOOL_THRESHOLD, MultipartConfig,
};
pub use decoder::{Multipart, Part, PartBody};
pub use encoder::{Encoder, escape_param, guess_content_type};
pub use error::MultipartError;
pub use file::FileHandle;
pub use form::{FieldEntry, FieldValue, FileBody, FormData, StreamValue, json_to_string};
pub use headers::{
    DEFAULT_FILE_CONTENT_TYPE, DEFAULT_TEXT_CONTENT_TYPE, PartHeaders, parse_part_headers,
};
pub use scanner::{PartScanner, ScanEvent};
pub use stream::{ByteStream, ChunkedBytes, DEFAULT_CHUNK_SIZE, boxed, next_item};
pub use tree::{Branch, MAX_PATH_DEPTH, ParsedNode, Segment, TreeBuilder, parse_field_path};
