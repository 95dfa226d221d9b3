//! HTTP framing for the formdata_rust multipart codec.
//!
//! This crate sits between the codec in `formdata-core` and whatever moves
//! bytes over the network:
//!
//! - [`RequestWriter`] serializes a request head for a [`FormData`] and picks
//!   `content-length` framing when the body size is known, chunked transfer
//!   encoding otherwise
//! - [`read_form`] and [`multipart_from_request`] take a `Content-Type`
//!   header plus a body stream and hand back decoded data
//!
//! Socket handling stays with the caller.
//!
//! # Example
//!
//! ```
//! use formdata_http::{FormData, RequestWrite, RequestWriter};
//!
//! let mut form = FormData::new();
//! form.append("name", "value");
//!
//! let mut writer = RequestWriter::new();
//! match writer.write("POST", "/upload", "example.com", form) {
//!     RequestWrite::Sized { length, .. } => assert!(length > 0),
//!     RequestWrite::Chunked(_) => unreachable!("text-only forms have a known length"),
//! }
//! ```

#![forbid(unsafe_code)]

mod decode;
mod request;

pub use decode::{multipart_from_request, read_form};
pub use request::{ChunkedEncoder, RequestWrite, RequestWriter, WireStream};

pub use formdata_core::{
    Boundary, FormData, Multipart, MultipartConfig, MultipartError, ParsedNode, parse_boundary,
};
