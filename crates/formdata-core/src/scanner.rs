//! Incremental part scanner.
//!
//! [`PartScanner`] splits a multipart body into header blocks and body
//! chunks without ever holding more than one input chunk plus a
//! delimiter-sized tail in memory. It is a plain state machine: callers feed
//! bytes with [`PartScanner::feed`], signal end of input with
//! [`PartScanner::finish`], and pull [`ScanEvent`]s until `NeedMore`.
//!
//! The delimiter searched for is `CRLF--boundary`. The buffer starts with a
//! virtual CRLF so that a boundary at the very first byte matches the same
//! way as every later one. A candidate delimiter only counts when it is
//! followed by `CRLF` (another part follows) or `--` (closing delimiter).

use crate::boundary::Boundary;
use crate::error::MultipartError;
use memchr::memmem;

/// One step of scanner output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Raw header block of the next part, without the terminating blank line.
    Headers(Vec<u8>),
    /// Body bytes of the current part.
    Body(Vec<u8>),
    /// The current part's body is complete.
    PartEnd,
    /// The closing delimiter was reached; no further parts follow.
    End,
    /// More input is needed before anything else can be produced.
    NeedMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Preamble,
    Headers,
    Body,
    Done,
}

enum Search {
    /// Delimiter at `at`; `last` when it is the closing delimiter.
    Found { at: usize, last: bool },
    /// Nothing decidable yet; bytes before `safe` are not part of a delimiter.
    Pending { safe: usize },
}

/// Incremental multipart splitter.
pub struct PartScanner {
    finder: memmem::Finder<'static>,
    delimiter_len: usize,
    buffer: Vec<u8>,
    stage: Stage,
    eof: bool,
    max_header_size: usize,
}

impl std::fmt::Debug for PartScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartScanner")
            .field("stage", &self.stage)
            .field("buffered", &self.buffer.len())
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl PartScanner {
    /// Create a scanner for `boundary`, rejecting header blocks larger than
    /// `max_header_size` bytes.
    #[must_use]
    pub fn new(boundary: &Boundary, max_header_size: usize) -> Self {
        let mut delimiter = b"\r\n".to_vec();
        delimiter.extend_from_slice(&boundary.dash_boundary());
        Self {
            delimiter_len: delimiter.len(),
            finder: memmem::Finder::new(&delimiter).into_owned(),
            buffer: b"\r\n".to_vec(),
            stage: Stage::Preamble,
            eof: false,
            max_header_size,
        }
    }

    /// Append input bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.stage != Stage::Done {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Mark the input as exhausted.
    pub fn finish(&mut self) {
        self.eof = true;
    }

    /// Returns true once the closing delimiter has been consumed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Returns true once [`finish`](Self::finish) has been called.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Bytes currently held back.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true while the current part's body is being scanned.
    #[must_use]
    pub fn in_body(&self) -> bool {
        self.stage == Stage::Body
    }

    /// Produce the next event.
    ///
    /// Errors are terminal: a malformed body cannot be resynchronized.
    pub fn next_event(&mut self) -> Result<ScanEvent, MultipartError> {
        loop {
            match self.stage {
                Stage::Done => return Ok(ScanEvent::End),
                Stage::Preamble => match self.find_delimiter() {
                    Search::Found { at, last } => {
                        self.consume_delimiter(at, last);
                        if last {
                            return Ok(ScanEvent::End);
                        }
                    }
                    Search::Pending { safe } => {
                        self.buffer.drain(..safe);
                        if self.eof {
                            return Err(MultipartError::MalformedBody {
                                detail: "no boundary found before end of input",
                            });
                        }
                        return Ok(ScanEvent::NeedMore);
                    }
                },
                Stage::Headers => return self.scan_headers(),
                Stage::Body => return self.scan_body(),
            }
        }
    }

    fn scan_headers(&mut self) -> Result<ScanEvent, MultipartError> {
        if self.buffer.starts_with(b"\r\n") {
            self.buffer.drain(..2);
            self.stage = Stage::Body;
            return Ok(ScanEvent::Headers(Vec::new()));
        }

        match memmem::find(&self.buffer, b"\r\n\r\n") {
            Some(end) if end > self.max_header_size => Err(self.header_too_large()),
            Some(end) => {
                let block = self.buffer[..end].to_vec();
                self.buffer.drain(..end + 4);
                self.stage = Stage::Body;
                Ok(ScanEvent::Headers(block))
            }
            None if self.buffer.len() > self.max_header_size + 4 => Err(self.header_too_large()),
            None if self.eof => Err(MultipartError::MalformedBody {
                detail: "input ended inside part headers",
            }),
            None => Ok(ScanEvent::NeedMore),
        }
    }

    fn scan_body(&mut self) -> Result<ScanEvent, MultipartError> {
        match self.find_delimiter() {
            Search::Found { at: 0, last } => {
                self.consume_delimiter(0, last);
                Ok(ScanEvent::PartEnd)
            }
            Search::Found { at, .. } => Ok(ScanEvent::Body(self.buffer.drain(..at).collect())),
            Search::Pending { safe } if safe > 0 => {
                Ok(ScanEvent::Body(self.buffer.drain(..safe).collect()))
            }
            Search::Pending { .. } if self.eof => Err(MultipartError::MalformedBody {
                detail: "input ended before the closing boundary",
            }),
            Search::Pending { .. } => Ok(ScanEvent::NeedMore),
        }
    }

    fn header_too_large(&self) -> MultipartError {
        MultipartError::malformed_part(format!(
            "header block exceeds {} bytes",
            self.max_header_size
        ))
    }

    /// Drop the delimiter at `at` together with its two-byte suffix.
    fn consume_delimiter(&mut self, at: usize, last: bool) {
        self.buffer.drain(..at + self.delimiter_len + 2);
        if last {
            // Anything after the closing delimiter is epilogue.
            self.buffer = Vec::new();
            self.stage = Stage::Done;
        } else {
            self.stage = Stage::Headers;
        }
    }

    fn find_delimiter(&self) -> Search {
        let len = self.buffer.len();
        let mut from = 0;

        while let Some(offset) = self.finder.find(&self.buffer[from..]) {
            let at = from + offset;
            let end = at + self.delimiter_len;
            if end + 2 > len {
                return Search::Pending { safe: at };
            }
            match &self.buffer[end..end + 2] {
                b"\r\n" => return Search::Found { at, last: false },
                b"--" => return Search::Found { at, last: true },
                // Boundary-like text inside content, e.g. `--boundaryX`.
                _ => from = at + 1,
            }
        }

        Search::Pending {
            safe: len.saturating_sub(self.delimiter_len - 1),
        }
    }
}
