//! Request body decoding.

use asupersync::stream::Stream;
use formdata_core::{Multipart, MultipartConfig, MultipartError, ParsedNode, parse_boundary};
use std::io;
use tracing::debug;

/// Start a streaming decoder for a request with the given `Content-Type`.
///
/// # Errors
///
/// [`MultipartError::MissingBoundary`] or [`MultipartError::InvalidBoundary`]
/// when the header does not describe a usable `multipart/form-data` body.
pub fn multipart_from_request<S>(
    content_type: &str,
    body: S,
    config: MultipartConfig,
) -> Result<Multipart, MultipartError>
where
    S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
{
    let boundary = parse_boundary(content_type)?;
    debug!(%boundary, "decoding multipart request body");
    Ok(Multipart::with_config(body, boundary, config))
}

/// Decode a whole request body into a field tree.
///
/// File parts are buffered according to `config`'s spool threshold.
pub async fn read_form<S>(
    content_type: &str,
    body: S,
    config: MultipartConfig,
) -> Result<ParsedNode, MultipartError>
where
    S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
{
    multipart_from_request(content_type, body, config)?
        .into_tree()
        .await
}
