//! Streaming multipart decoder.
//!
//! [`Multipart`] pulls bytes from a [`ByteStream`] only when the caller asks
//! for the next part or the next body chunk. Parts are strictly sequential:
//! the body of part *n* must be finished, skipped or dropped before part
//! *n + 1* is requested. A part whose [`PartBody`] is dropped unread counts
//! as skipped and its remaining bytes are discarded on the next request.
//!
//! ```
//! use formdata_core::{Boundary, ChunkedBytes, Multipart};
//! use futures_executor::block_on;
//!
//! let body = "--XyZ\r\n\
//!     Content-Disposition: form-data; name=\"title\"\r\n\r\n\
//!     hello\r\n\
//!     --XyZ--\r\n";
//! let source = ChunkedBytes::new(body.as_bytes().to_vec(), 7);
//! let mut multipart = Multipart::new(source, Boundary::new("XyZ").unwrap());
//!
//! block_on(async {
//!     let mut part = multipart.next_part().await.unwrap().unwrap();
//!     assert_eq!(part.name(), "title");
//!     assert_eq!(part.text().await.unwrap(), "hello");
//!     assert!(multipart.next_part().await.unwrap().is_none());
//! });
//! ```

use crate::boundary::Boundary;
use crate::config::MultipartConfig;
use crate::error::MultipartError;
use crate::file::{FileHandle, SpoolWriter};
use crate::headers::{PartHeaders, parse_part_headers};
use crate::scanner::{PartScanner, ScanEvent};
use crate::stream::{ByteStream, boxed, next_item};
use crate::tree::{ParsedNode, TreeBuilder};
use asupersync::stream::Stream;
use parking_lot::Mutex;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    /// A [`PartBody`] is alive and has not reached the end of the part.
    Live,
    /// The body was dropped or skipped; its bytes are discarded on demand.
    Skipped,
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct ActivePart {
    index: usize,
    is_file: bool,
    size: usize,
    state: BodyState,
}

/// Parser state shared between [`Multipart`] and the [`PartBody`] it hands out.
struct Shared {
    source: ByteStream,
    scanner: PartScanner,
    config: MultipartConfig,
    active: Option<ActivePart>,
    part_count: usize,
    total_size: usize,
    finished: bool,
    terminated: bool,
}

impl Shared {
    /// Record `err` as the end of the session.
    fn fail(&mut self, err: MultipartError) -> MultipartError {
        self.terminated = true;
        debug!(error = %err, "multipart parse aborted");
        err
    }

    /// Pull one chunk from the source into the scanner.
    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), MultipartError>> {
        if self.scanner.is_eof() {
            return Poll::Ready(Err(MultipartError::MalformedBody {
                detail: "input ended unexpectedly",
            }));
        }
        match self.source.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                trace!(len = chunk.len(), "multipart chunk received");
                self.scanner.feed(&chunk);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Some(Err(err))) => Poll::Ready(Err(MultipartError::stream_read(&err))),
            Poll::Ready(None) => {
                self.scanner.finish();
                Poll::Ready(Ok(()))
            }
        }
    }

    fn account(&mut self, len: usize, check_file: bool) -> Result<(), MultipartError> {
        if let Some(active) = self.active.as_mut() {
            active.size += len;
            let max = self.config.get_max_file_size();
            if check_file && active.is_file && active.size > max {
                return Err(MultipartError::FileTooLarge {
                    size: active.size,
                    max,
                });
            }
        }
        self.total_size += len;
        let max = self.config.get_max_total_size();
        if self.total_size > max {
            return Err(MultipartError::TotalTooLarge {
                size: self.total_size,
                max,
            });
        }
        Ok(())
    }

    /// Next chunk of the active part's body, `None` once the part is complete.
    fn poll_body(
        &mut self,
        cx: &mut Context<'_>,
        check_file: bool,
    ) -> Poll<Option<Result<Vec<u8>, MultipartError>>> {
        loop {
            let event = match self.scanner.next_event() {
                Ok(event) => event,
                Err(err) => return Poll::Ready(Some(Err(self.fail(err)))),
            };
            match event {
                ScanEvent::Body(chunk) => {
                    if let Err(err) = self.account(chunk.len(), check_file) {
                        return Poll::Ready(Some(Err(self.fail(err))));
                    }
                    return Poll::Ready(Some(Ok(chunk)));
                }
                ScanEvent::PartEnd => {
                    if let Some(active) = self.active.as_mut() {
                        active.state = BodyState::Finished;
                        trace!(index = active.index, size = active.size, "multipart part finished");
                    }
                    return Poll::Ready(None);
                }
                ScanEvent::NeedMore => match self.poll_fill(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(())) => {}
                    Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(self.fail(err)))),
                },
                ScanEvent::Headers(_) | ScanEvent::End => {
                    let err = MultipartError::MalformedBody {
                        detail: "part body ended without a delimiter",
                    };
                    return Poll::Ready(Some(Err(self.fail(err))));
                }
            }
        }
    }

    fn poll_next_part(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<(usize, PartHeaders), MultipartError>>> {
        if self.terminated || self.finished {
            return Poll::Ready(None);
        }

        if let Some(active) = self.active {
            match active.state {
                BodyState::Live => {
                    let err = MultipartError::SequenceViolation {
                        active: active.index,
                        requested: active.index + 1,
                    };
                    return Poll::Ready(Some(Err(self.fail(err))));
                }
                BodyState::Skipped => loop {
                    match self.poll_body(cx, false) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Some(Ok(_))) => {}
                        Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                        Poll::Ready(None) => break,
                    }
                },
                BodyState::Finished => {}
            }
            self.active = None;
        }

        loop {
            let event = match self.scanner.next_event() {
                Ok(event) => event,
                Err(err) => return Poll::Ready(Some(Err(self.fail(err)))),
            };
            match event {
                ScanEvent::Headers(block) => {
                    let headers = match parse_part_headers(&block) {
                        Ok(headers) => headers,
                        Err(err) => return Poll::Ready(Some(Err(self.fail(err)))),
                    };
                    let index = self.part_count;
                    self.part_count += 1;
                    let max = self.config.get_max_fields();
                    if self.part_count > max {
                        let err = MultipartError::TooManyFields {
                            count: self.part_count,
                            max,
                        };
                        return Poll::Ready(Some(Err(self.fail(err))));
                    }
                    debug!(
                        index,
                        name = %headers.name,
                        filename = ?headers.filename,
                        "multipart part started"
                    );
                    self.active = Some(ActivePart {
                        index,
                        is_file: headers.filename.is_some(),
                        size: 0,
                        state: BodyState::Live,
                    });
                    return Poll::Ready(Some(Ok((index, headers))));
                }
                ScanEvent::End => {
                    self.finished = true;
                    debug!(parts = self.part_count, bytes = self.total_size, "multipart body complete");
                    return Poll::Ready(None);
                }
                ScanEvent::NeedMore => match self.poll_fill(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(())) => {}
                    Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(self.fail(err)))),
                },
                ScanEvent::Body(_) | ScanEvent::PartEnd => {
                    let err = MultipartError::MalformedBody {
                        detail: "body data outside of a part",
                    };
                    return Poll::Ready(Some(Err(self.fail(err))));
                }
            }
        }
    }
}

/// Streaming decoder over one multipart body.
///
/// Also usable as a [`Stream`] of [`Part`]s. After the first error the
/// session is over and every later request yields nothing.
pub struct Multipart {
    shared: Arc<Mutex<Shared>>,
}

impl std::fmt::Debug for Multipart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("Multipart")
            .field("scanner", &shared.scanner)
            .field("part_count", &shared.part_count)
            .field("total_size", &shared.total_size)
            .field("finished", &shared.finished)
            .field("terminated", &shared.terminated)
            .finish_non_exhaustive()
    }
}

impl Multipart {
    /// Decoder with the default [`MultipartConfig`].
    pub fn new<S>(source: S, boundary: Boundary) -> Self
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
    {
        Self::with_config(source, boundary, MultipartConfig::default())
    }

    pub fn with_config<S>(source: S, boundary: Boundary, config: MultipartConfig) -> Self
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
    {
        let scanner = PartScanner::new(&boundary, config.get_max_header_size());
        Self {
            shared: Arc::new(Mutex::new(Shared {
                source: boxed(source),
                scanner,
                config,
                active: None,
                part_count: 0,
                total_size: 0,
                finished: false,
                terminated: false,
            })),
        }
    }

    /// Number of parts started so far.
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.shared.lock().part_count
    }

    /// Returns true once the closing delimiter was reached or an error ended
    /// the session.
    #[must_use]
    pub fn is_done(&self) -> bool {
        let shared = self.shared.lock();
        shared.finished || shared.terminated
    }

    /// Poll for the next part.
    pub fn poll_next_part(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Part>, MultipartError>> {
        let polled = self.shared.lock().poll_next_part(cx);
        match polled {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(Ok(None)),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Err(err)),
            Poll::Ready(Some(Ok((index, headers)))) => Poll::Ready(Ok(Some(Part {
                index,
                headers,
                body: PartBody {
                    shared: Arc::clone(&self.shared),
                    index,
                    done: false,
                },
            }))),
        }
    }

    /// Advance to the next part.
    ///
    /// Returns `Ok(None)` after the closing delimiter.
    ///
    /// # Errors
    ///
    /// [`MultipartError::SequenceViolation`] if the previous part's body is
    /// still alive and unfinished; otherwise any transport, framing, header
    /// or limit error.
    pub async fn next_part(&mut self) -> Result<Option<Part>, MultipartError> {
        poll_fn(|cx| self.poll_next_part(cx)).await
    }

    /// Decode the whole body into a tree keyed by field path.
    ///
    /// Text parts become [`ParsedNode::Text`]. File parts are buffered
    /// (spooled to disk beyond the configured threshold) and become
    /// [`ParsedNode::File`].
    pub async fn into_tree(mut self) -> Result<ParsedNode, MultipartError> {
        let spool_threshold = self.shared.lock().config.get_spool_threshold();
        let mut tree = TreeBuilder::new();

        while let Some(mut part) = self.next_part().await? {
            let name = part.name().to_string();
            let node = if part.is_file() {
                let mut writer = SpoolWriter::new(spool_threshold);
                while let Some(chunk) = next_item(part.body_mut()).await {
                    writer.append(&chunk?)?;
                }
                let headers = part.headers().clone();
                ParsedNode::File(writer.finish(
                    headers.name,
                    headers.filename,
                    headers.content_type,
                )?)
            } else {
                ParsedNode::Text(part.text().await?)
            };
            tree.insert(&name, node)?;
        }

        Ok(tree.finish())
    }
}

impl Stream for Multipart {
    type Item = Result<Part, MultipartError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_next_part(cx).map(Result::transpose)
    }
}

/// One decoded part: its headers plus a lazily read body.
#[derive(Debug)]
pub struct Part {
    index: usize,
    headers: PartHeaders,
    body: PartBody,
}

impl Part {
    /// Position of the part in the body, starting at zero.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.headers.name
    }

    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.headers.filename.as_deref()
    }

    /// Declared content type, or the default for the part's kind.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.headers.content_type
    }

    #[must_use]
    pub fn headers(&self) -> &PartHeaders {
        &self.headers
    }

    /// Returns true if the part carries a filename.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.headers.filename.is_some()
    }

    /// Raw body stream.
    pub fn body_mut(&mut self) -> &mut PartBody {
        &mut self.body
    }

    #[must_use]
    pub fn into_body(self) -> PartBody {
        self.body
    }

    /// Read the whole body into memory.
    pub async fn bytes(&mut self) -> Result<Vec<u8>, MultipartError> {
        let mut data = Vec::new();
        while let Some(chunk) = next_item(&mut self.body).await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }

    /// Read the whole body as text. Invalid UTF-8 is replaced, not rejected.
    pub async fn text(&mut self) -> Result<String, MultipartError> {
        let data = self.bytes().await?;
        Ok(match String::from_utf8(data) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }

    /// Give up on this part; its bytes are discarded on the next request.
    pub fn skip(self) {
        trace!(index = self.index, name = %self.headers.name, "multipart part skipped");
    }

    /// Hand the body over to a [`FileHandle`] that loads it on first read.
    #[must_use]
    pub fn into_file_handle(self) -> FileHandle {
        let PartHeaders {
            name,
            filename,
            content_type,
            ..
        } = self.headers;
        FileHandle::pending(name, filename, content_type, self.body)
    }
}

/// Body of one part as a stream of chunks.
///
/// Ends with `None` at the part's closing delimiter. Polling a body after a
/// later part has been requested fails with
/// [`MultipartError::SequenceViolation`].
pub struct PartBody {
    shared: Arc<Mutex<Shared>>,
    index: usize,
    done: bool,
}

impl std::fmt::Debug for PartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartBody")
            .field("index", &self.index)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl PartBody {
    /// Await the next body chunk.
    pub async fn chunk(&mut self) -> Option<Result<Vec<u8>, MultipartError>> {
        next_item(self).await
    }
}

impl Stream for PartBody {
    type Item = Result<Vec<u8>, MultipartError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        let index = self.index;
        let polled = {
            let mut shared = self.shared.lock();
            let active = shared.active;
            match active {
                Some(active) if active.index == index && active.state == BodyState::Finished => {
                    Poll::Ready(None)
                }
                // A body cut short by a failed session must not look complete.
                _ if shared.terminated => Poll::Ready(Some(Err(MultipartError::StreamRead {
                    detail: format!("multipart session ended before part {index} was complete"),
                }))),
                Some(active) if active.index == index && active.state == BodyState::Live => {
                    shared.poll_body(cx, true)
                }
                _ => {
                    let err = MultipartError::SequenceViolation {
                        active: active.map_or(shared.part_count, |a| a.index),
                        requested: index,
                    };
                    Poll::Ready(Some(Err(shared.fail(err))))
                }
            }
        };

        if matches!(polled, Poll::Ready(None | Some(Err(_)))) {
            self.done = true;
        }
        polled
    }
}

impl Drop for PartBody {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut shared = self.shared.lock();
        if let Some(active) = shared.active.as_mut() {
            if active.index == self.index && active.state == BodyState::Live {
                active.state = BodyState::Skipped;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChunkedBytes;
    use futures_executor::block_on;

    const BODY: &str = "preamble\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"title\"\r\n\r\n\
        hello\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\
        Content-Type: text/markdown\r\n\r\n\
        # notes\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"last\"\r\n\r\n\
        bye\r\n\
        --XyZ--\r\n";

    fn multipart(body: &str, chunk: usize) -> Multipart {
        Multipart::new(
            ChunkedBytes::new(body.as_bytes().to_vec(), chunk),
            Boundary::new("XyZ").unwrap(),
        )
    }

    #[test]
    fn reads_parts_in_order() {
        for chunk in [1, 3, 16, 1024] {
            let mut mp = multipart(BODY, chunk);
            block_on(async {
                let mut title = mp.next_part().await.unwrap().unwrap();
                assert_eq!((title.index(), title.name()), (0, "title"));
                assert_eq!(title.content_type(), "text/plain");
                assert_eq!(title.text().await.unwrap(), "hello");

                let mut doc = mp.next_part().await.unwrap().unwrap();
                assert_eq!(doc.filename(), Some("a.txt"));
                assert_eq!(doc.content_type(), "text/markdown");
                assert!(doc.is_file());
                assert_eq!(doc.bytes().await.unwrap(), b"# notes");

                let mut last = mp.next_part().await.unwrap().unwrap();
                assert_eq!(last.text().await.unwrap(), "bye");

                assert!(mp.next_part().await.unwrap().is_none());
                assert!(mp.is_done());
                assert_eq!(mp.part_count(), 3);
            });
        }
    }

    #[test]
    fn dropped_bodies_are_skipped() {
        let mut mp = multipart(BODY, 5);
        block_on(async {
            let title = mp.next_part().await.unwrap().unwrap();
            drop(title);
            let doc = mp.next_part().await.unwrap().unwrap();
            assert_eq!(doc.name(), "doc");
            doc.skip();
            let mut last = mp.next_part().await.unwrap().unwrap();
            assert_eq!(last.text().await.unwrap(), "bye");
        });
    }

    #[test]
    fn partially_read_body_is_skipped_on_drop() {
        let mut mp = multipart(BODY, 2);
        block_on(async {
            let mut title = mp.next_part().await.unwrap().unwrap();
            let first = title.body_mut().chunk().await.unwrap().unwrap();
            assert!(!first.is_empty());
            drop(title);
            assert_eq!(mp.next_part().await.unwrap().unwrap().name(), "doc");
        });
    }

    #[test]
    fn live_body_blocks_next_part() {
        let mut mp = multipart(BODY, 4);
        block_on(async {
            let mut title = mp.next_part().await.unwrap().unwrap();
            let err = mp.next_part().await.unwrap_err();
            assert!(matches!(
                err,
                MultipartError::SequenceViolation {
                    active: 0,
                    requested: 1
                }
            ));
            // The session is over and the unfinished body reports it once.
            let err = title.body_mut().chunk().await.unwrap().unwrap_err();
            assert!(matches!(err, MultipartError::StreamRead { .. }));
            assert!(title.body_mut().chunk().await.is_none());
            assert!(mp.next_part().await.unwrap().is_none());
        });
    }

    #[test]
    fn polling_a_body_of_an_earlier_part_fails() {
        let mut mp = multipart(BODY, 64);
        block_on(async {
            let mut first = mp.next_part().await.unwrap().unwrap();
            assert_eq!(first.bytes().await.unwrap(), b"hello");
            assert!(first.body_mut().chunk().await.is_none());
            let _second = mp.next_part().await.unwrap().unwrap();

            let mut stale = PartBody {
                shared: Arc::clone(&mp.shared),
                index: 0,
                done: false,
            };
            let err = stale.chunk().await.unwrap().unwrap_err();
            assert!(matches!(
                err,
                MultipartError::SequenceViolation {
                    active: 1,
                    requested: 0
                }
            ));
        });
    }

    #[test]
    fn zero_parts() {
        let mut mp = multipart("--XyZ--\r\n", 3);
        assert!(block_on(mp.next_part()).unwrap().is_none());
    }

    #[test]
    fn missing_closing_boundary_is_malformed() {
        let body = "--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue";
        let mut mp = multipart(body, 4);
        block_on(async {
            let mut part = mp.next_part().await.unwrap().unwrap();
            let err = part.bytes().await.unwrap_err();
            assert!(matches!(err, MultipartError::MalformedBody { .. }));
            assert!(mp.next_part().await.unwrap().is_none());
        });
    }

    #[test]
    fn missing_disposition_is_malformed_part() {
        let body = "--XyZ\r\nContent-Type: text/plain\r\n\r\nvalue\r\n--XyZ--\r\n";
        let err = block_on(multipart(body, 8).next_part()).unwrap_err();
        assert!(matches!(err, MultipartError::MalformedPart { .. }));
    }

    #[test]
    fn source_errors_surface_as_stream_read() {
        let chunks: Vec<io::Result<Vec<u8>>> = vec![
            Ok(b"--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nab".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut mp = Multipart::new(
            asupersync::stream::iter(chunks),
            Boundary::new("XyZ").unwrap(),
        );
        block_on(async {
            let mut part = mp.next_part().await.unwrap().unwrap();
            let err = part.bytes().await.unwrap_err();
            assert!(matches!(err, MultipartError::StreamRead { .. }));
        });
    }

    #[test]
    fn field_limit() {
        let config = MultipartConfig::new().max_fields(2);
        let mut mp = Multipart::with_config(
            ChunkedBytes::new(BODY.as_bytes().to_vec(), 64),
            Boundary::new("XyZ").unwrap(),
            config,
        );
        block_on(async {
            mp.next_part().await.unwrap().unwrap().skip();
            mp.next_part().await.unwrap().unwrap().skip();
            let err = mp.next_part().await.unwrap_err();
            assert!(matches!(err, MultipartError::TooManyFields { count: 3, max: 2 }));
        });
    }

    #[test]
    fn file_size_limit() {
        let config = MultipartConfig::new().max_file_size(4);
        let mut mp = Multipart::with_config(
            ChunkedBytes::new(BODY.as_bytes().to_vec(), 64),
            Boundary::new("XyZ").unwrap(),
            config,
        );
        block_on(async {
            let mut title = mp.next_part().await.unwrap().unwrap();
            // Text fields are not subject to the file limit.
            assert_eq!(title.text().await.unwrap(), "hello");
            let mut doc = mp.next_part().await.unwrap().unwrap();
            let err = doc.bytes().await.unwrap_err();
            assert!(matches!(err, MultipartError::FileTooLarge { max: 4, .. }));
        });
    }

    #[test]
    fn total_size_limit() {
        let config = MultipartConfig::new().max_total_size(8);
        let mut mp = Multipart::with_config(
            ChunkedBytes::new(BODY.as_bytes().to_vec(), 64),
            Boundary::new("XyZ").unwrap(),
            config,
        );
        let err = block_on(async {
            mp.next_part().await?.unwrap().bytes().await?;
            mp.next_part().await?.unwrap().bytes().await
        })
        .unwrap_err();
        assert!(matches!(err, MultipartError::TotalTooLarge { max: 8, .. }));
    }

    #[test]
    fn stream_of_parts() {
        let mut mp = multipart(BODY, 9);
        let names = block_on(async {
            let mut names = Vec::new();
            while let Some(part) = next_item(&mut mp).await {
                names.push(part.unwrap().name().to_string());
            }
            names
        });
        assert_eq!(names, vec!["title", "doc", "last"]);
    }

    #[test]
    fn file_handle_reads_lazily() {
        let mut mp = multipart(BODY, 3);
        block_on(async {
            mp.next_part().await.unwrap().unwrap().skip();
            let doc = mp.next_part().await.unwrap().unwrap();
            let mut handle = doc.into_file_handle();
            assert_eq!(handle.size(), None);
            assert_eq!(handle.read().await.unwrap(), b"# notes");
            assert_eq!(handle.read().await.unwrap(), b"# notes");
            assert_eq!(handle.size(), Some(7));
            assert_eq!(handle.content_type(), "text/markdown");
        });
    }

    #[test]
    fn file_handle_of_an_abandoned_session_fails() {
        let mut mp = multipart(BODY, 3);
        block_on(async {
            mp.next_part().await.unwrap().unwrap().skip();
            let mut handle = mp.next_part().await.unwrap().unwrap().into_file_handle();
            let err = mp.next_part().await.unwrap_err();
            assert!(matches!(err, MultipartError::SequenceViolation { .. }));

            let err = handle.read().await.unwrap_err();
            assert!(matches!(err, MultipartError::StreamRead { .. }));
            assert!(!handle.is_loaded());
            let err = handle.read().await.unwrap_err();
            assert!(matches!(err, MultipartError::StreamRead { .. }));
        });
    }

    #[test]
    fn into_tree_builds_nested_values() {
        let body = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"user[name]\"\r\n\r\n\
            Kari\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"user[tags][]\"\r\n\r\n\
            a\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"user[tags][]\"\r\n\r\n\
            b\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"user[avatar]\"; filename=\"me.png\"\r\n\
            Content-Type: image/png\r\n\r\n\
            PNGDATA\r\n\
            --XyZ--\r\n";
        let mut tree = block_on(multipart(body, 5).into_tree()).unwrap();

        assert_eq!(tree.lookup("user[name]").and_then(ParsedNode::as_text), Some("Kari"));
        let tags: Vec<_> = tree
            .lookup("user[tags]")
            .and_then(ParsedNode::as_sequence)
            .unwrap()
            .iter()
            .filter_map(ParsedNode::as_text)
            .collect();
        assert_eq!(tags, vec!["a", "b"]);

        let avatar = tree
            .lookup_mut("user[avatar]")
            .and_then(ParsedNode::as_file_mut)
            .unwrap();
        assert_eq!(avatar.filename(), Some("me.png"));
        assert_eq!(avatar.content_type(), "image/png");
        assert_eq!(block_on(avatar.read()).unwrap(), b"PNGDATA");
    }

    #[test]
    fn into_tree_spools_large_files() {
        let body = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"f\"; filename=\"big.bin\"\r\n\r\n\
            0123456789abcdef\r\n\
            --XyZ--\r\n";
        let mp = Multipart::with_config(
            ChunkedBytes::new(body.as_bytes().to_vec(), 4),
            Boundary::new("XyZ").unwrap(),
            MultipartConfig::new().spool_threshold(8),
        );
        let mut tree = block_on(mp.into_tree()).unwrap();
        let file = tree.get_mut("f").and_then(ParsedNode::as_file_mut).unwrap();
        assert!(file.is_spooled());
        assert_eq!(file.size(), Some(16));
        assert_eq!(block_on(file.read()).unwrap(), b"0123456789abcdef");
    }

    #[test]
    fn into_tree_reports_conflicts() {
        let body = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"a\"\r\n\r\n\
            1\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"a[b]\"\r\n\r\n\
            2\r\n\
            --XyZ--\r\n";
        let err = block_on(multipart(body, 7).into_tree()).unwrap_err();
        assert!(matches!(err, MultipartError::ConflictingPath { path } if path == "a[b]"));
    }
}
