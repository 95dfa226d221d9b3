//! HTTP request writer for multipart uploads.

use asupersync::stream::Stream;
use formdata_core::{Encoder, FormData, MultipartError};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// Serialized request output.
pub enum RequestWrite {
    /// Length known up front: the head carries `content-length` and the body
    /// is sent as produced.
    Sized {
        head: Vec<u8>,
        body: Encoder,
        length: u64,
    },
    /// Length unknown: head plus `transfer-encoding: chunked` body.
    Chunked(ChunkedEncoder),
}

impl std::fmt::Debug for RequestWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sized { head, length, .. } => f
                .debug_struct("Sized")
                .field("head_len", &head.len())
                .field("length", length)
                .finish_non_exhaustive(),
            Self::Chunked(_) => f.debug_tuple("Chunked").finish(),
        }
    }
}

impl RequestWrite {
    /// Whole request (head and body) as one stream of wire bytes.
    #[must_use]
    pub fn into_stream(self) -> WireStream {
        match self {
            Self::Sized { head, body, .. } => WireStream::Sized {
                head: Some(head),
                body,
            },
            Self::Chunked(encoder) => WireStream::Chunked(encoder),
        }
    }
}

/// Wire bytes of a [`RequestWrite`], head first.
pub enum WireStream {
    Sized { head: Option<Vec<u8>>, body: Encoder },
    Chunked(ChunkedEncoder),
}

impl Stream for WireStream {
    type Item = Result<Vec<u8>, MultipartError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut() {
            Self::Sized { head, body } => {
                if let Some(head) = head.take() {
                    return Poll::Ready(Some(Ok(head)));
                }
                Pin::new(body).poll_next(cx)
            }
            Self::Chunked(encoder) => Pin::new(encoder).poll_next(cx),
        }
    }
}

/// Streaming chunked request encoder.
pub struct ChunkedEncoder {
    head: Option<Vec<u8>>,
    body: Encoder,
    finished: bool,
}

impl ChunkedEncoder {
    fn new(head: Vec<u8>, body: Encoder) -> Self {
        Self {
            head: Some(head),
            body,
            finished: false,
        }
    }

    fn encode_chunk(chunk: &[u8]) -> Vec<u8> {
        let size = format!("{:x}", chunk.len());
        let mut out = Vec::with_capacity(size.len() + 2 + chunk.len() + 2);
        out.extend_from_slice(size.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
        out
    }
}

impl Stream for ChunkedEncoder {
    type Item = Result<Vec<u8>, MultipartError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(head) = self.head.take() {
            return Poll::Ready(Some(Ok(head)));
        }

        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut self.body).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(Ok(Self::encode_chunk(&chunk))));
                }
                Poll::Ready(Some(Err(err))) => {
                    // No terminating chunk: the peer must see a truncated body.
                    self.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    return Poll::Ready(Some(Ok(b"0\r\n\r\n".to_vec())));
                }
            }
        }
    }
}

/// Writes multipart HTTP/1.1 requests.
pub struct RequestWriter {
    buffer: Vec<u8>,
    headers: Vec<(String, String)>,
}

impl RequestWriter {
    /// Create a new request writer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(512),
            headers: Vec::new(),
        }
    }

    /// Extra header sent with every request written by this writer.
    ///
    /// `content-type`, `content-length` and `transfer-encoding` are derived
    /// from the form and ignored here.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize the request head for `form` and pair it with the body.
    #[must_use]
    pub fn write(&mut self, method: &str, target: &str, host: &str, form: FormData) -> RequestWrite {
        let content_type = form.content_type();
        match form.computed_length() {
            Some(length) => {
                debug!(length, "multipart request with known length");
                let head = self.write_head(method, target, host, &content_type, Some(length));
                RequestWrite::Sized {
                    head,
                    body: form.into_stream(),
                    length,
                }
            }
            None => {
                debug!("multipart request with chunked body");
                let head = self.write_head(method, target, host, &content_type, None);
                RequestWrite::Chunked(ChunkedEncoder::new(head, form.into_stream()))
            }
        }
    }

    fn write_head(
        &mut self,
        method: &str,
        target: &str,
        host: &str,
        content_type: &str,
        length: Option<u64>,
    ) -> Vec<u8> {
        self.buffer.clear();

        // Request line
        self.buffer.extend_from_slice(method.as_bytes());
        self.buffer.extend_from_slice(b" ");
        self.buffer.extend_from_slice(target.as_bytes());
        self.buffer.extend_from_slice(b" HTTP/1.1\r\n");

        self.push_header("host", host);
        for (name, value) in std::mem::take(&mut self.headers) {
            if !is_framing_header(&name) {
                self.push_header(&name, &value);
            }
            self.headers.push((name, value));
        }
        self.push_header("content-type", content_type);

        match length {
            Some(length) => self.push_header("content-length", &length.to_string()),
            None => self.push_header("transfer-encoding", "chunked"),
        }

        // End of headers
        self.buffer.extend_from_slice(b"\r\n");

        self.take_buffer()
    }

    fn push_header(&mut self, name: &str, value: &str) {
        self.buffer.extend_from_slice(name.as_bytes());
        self.buffer.extend_from_slice(b": ");
        self.buffer.extend_from_slice(value.as_bytes());
        self.buffer.extend_from_slice(b"\r\n");
    }

    fn take_buffer(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        std::mem::swap(&mut out, &mut self.buffer);
        self.buffer = Vec::with_capacity(out.capacity());
        out
    }
}

fn is_framing_header(name: &str) -> bool {
    ["host", "content-type", "content-length", "transfer-encoding"]
        .iter()
        .any(|framing| name.eq_ignore_ascii_case(framing))
}

impl Default for RequestWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formdata_core::{Boundary, ChunkedBytes, StreamValue, next_item};
    use futures_executor::block_on;

    fn collect<S>(mut stream: S) -> Vec<u8>
    where
        S: Stream<Item = Result<Vec<u8>, MultipartError>> + Unpin,
    {
        block_on(async {
            let mut out = Vec::new();
            while let Some(chunk) = next_item(&mut stream).await {
                out.extend_from_slice(&chunk.expect("chunk"));
            }
            out
        })
    }

    fn text_form() -> FormData {
        let mut form = FormData::with_boundary(Boundary::new("XyZ").unwrap());
        form.append("a", "1");
        form
    }

    #[test]
    fn known_length_writes_content_length() {
        let form = text_form();
        let expected = form.computed_length().unwrap();
        let mut writer = RequestWriter::new().header("user-agent", "formdata-test");

        let RequestWrite::Sized { head, body, length } =
            writer.write("POST", "/upload", "example.com", form)
        else {
            panic!("expected sized request");
        };
        assert_eq!(length, expected);

        let head = String::from_utf8(head).unwrap();
        assert!(head.starts_with("POST /upload HTTP/1.1\r\nhost: example.com\r\n"));
        assert!(head.contains("user-agent: formdata-test\r\n"));
        assert!(head.contains("content-type: multipart/form-data; boundary=XyZ\r\n"));
        assert!(head.contains(&format!("content-length: {expected}\r\n")));
        assert!(!head.contains("transfer-encoding"));
        assert!(head.ends_with("\r\n\r\n"));

        assert_eq!(collect(body).len() as u64, expected);
    }

    #[test]
    fn unknown_length_writes_chunked_body() {
        let mut form = text_form();
        form.append_file("f", StreamValue::new(ChunkedBytes::new(b"abc".to_vec(), 2)), "f.bin");

        let mut writer = RequestWriter::new();
        let RequestWrite::Chunked(encoder) = writer.write("PUT", "/", "h", form) else {
            panic!("expected chunked request");
        };

        let wire = String::from_utf8(collect(encoder)).unwrap();
        let (head, body) = wire.split_once("\r\n\r\n").unwrap();
        assert!(head.contains("transfer-encoding: chunked"));
        assert!(!head.contains("content-length"));
        assert!(body.ends_with("0\r\n\r\n"));
        assert!(body.contains("\r\nab\r\n"));
    }

    #[test]
    fn framing_headers_from_callers_are_ignored() {
        let mut writer = RequestWriter::new()
            .header("Content-Length", "1")
            .header("x-trace", "t");
        let head = match writer.write("POST", "/", "h", text_form()) {
            RequestWrite::Sized { head, .. } => String::from_utf8(head).unwrap(),
            RequestWrite::Chunked(_) => panic!("expected sized request"),
        };
        assert!(!head.contains("Content-Length: 1"));
        assert!(head.contains("x-trace: t\r\n"));

        // The writer keeps its headers for the next request.
        let again = match writer.write("POST", "/", "h", text_form()) {
            RequestWrite::Sized { head, .. } => String::from_utf8(head).unwrap(),
            RequestWrite::Chunked(_) => panic!("expected sized request"),
        };
        assert!(again.contains("x-trace: t\r\n"));
    }

    #[test]
    fn wire_stream_starts_with_head() {
        let mut writer = RequestWriter::new();
        let wire = collect(writer.write("POST", "/", "h", text_form()).into_stream());
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("POST / HTTP/1.1\r\n"));
        assert!(text.ends_with("--XyZ--\r\n"));
    }
}
