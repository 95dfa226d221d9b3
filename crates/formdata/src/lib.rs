//! Streaming `multipart/form-data` for Rust.
//!
//! formdata_rust encodes and decodes multipart bodies without buffering
//! them:
//!
//! - **Ordered field store** — [`FormData`] keeps every entry in insertion
//!   order and coerces scalars the way browsers do
//! - **Pull-based encoder** — bytes are produced only when the transport asks
//! - **Streaming decoder** — parts are handed out one at a time and file
//!   bodies stay unread until requested
//! - **Nested values** — `user[addresses][0][city]` style names become a tree
//!   of branches and sequences
//!
//! # Quick Start
//!
//! ```
//! use formdata::prelude::*;
//! use futures_executor::block_on;
//!
//! let mut form = FormData::new();
//! form.append("user[name]", "Ada");
//! form.append("user[langs][]", "en");
//! form.append("user[langs][]", "fr");
//! form.append_file("avatar", b"GIF89a".to_vec(), "ada.gif");
//!
//! let boundary = form.boundary().clone();
//! let body = block_on(form.into_stream().into_bytes()).unwrap();
//!
//! let multipart = Multipart::new(ChunkedBytes::new(body, 64), boundary);
//! let tree = block_on(multipart.into_tree()).unwrap();
//! assert_eq!(tree.lookup("user[langs][1]").and_then(ParsedNode::as_text), Some("fr"));
//! ```
//!
//! # Crate Structure
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `formdata-core` | Field store, encoder, scanner, decoder, tree builder |
//! | `formdata-http` | Request head writer and `Content-Type` handling |

#![forbid(unsafe_code)]

pub use formdata_core::{
    Boundary, Branch, ByteStream, ChunkedBytes, Encoder, FieldEntry, FieldValue, FileBody,
    FileHandle, FormData, Multipart, MultipartConfig, MultipartError, ParsedNode, Part, PartBody,
    PartHeaders, Segment, StreamValue, TreeBuilder, parse_boundary, parse_field_path,
};

/// Low-level building blocks.
pub mod codec {
    pub use formdata_core::{
        DEFAULT_CHUNK_SIZE, DEFAULT_FILE_CONTENT_TYPE, DEFAULT_MAX_FIELDS, DEFAULT_MAX_FILE_SIZE,
        DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_TOTAL_SIZE, DEFAULT_SPOOL_THRESHOLD,
        DEFAULT_TEXT_CONTENT_TYPE, PartScanner, ScanEvent, boxed, escape_param,
        guess_content_type, json_to_string, next_item, parse_part_headers,
    };
}

/// HTTP framing helpers.
#[cfg(feature = "http")]
pub mod http {
    pub use formdata_http::{
        ChunkedEncoder, RequestWrite, RequestWriter, WireStream, multipart_from_request, read_form,
    };
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Boundary, ChunkedBytes, FieldEntry, FieldValue, FileHandle, FormData, Multipart,
        MultipartConfig, MultipartError, ParsedNode, Part, StreamValue,
    };
    #[cfg(feature = "http")]
    pub use formdata_http::{RequestWrite, RequestWriter, read_form};
}
