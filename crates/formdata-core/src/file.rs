//! Lazy handles for file parts.
//!
//! A [`FileHandle`] is either still attached to the request stream (created
//! with [`Part::into_file_handle`](crate::Part::into_file_handle)) or already
//! buffered by [`Multipart::into_tree`](crate::Multipart::into_tree): in
//! memory up to the spool threshold, in a temporary file beyond it.
//!
//! [`FileHandle::read`] loads the content once and caches it. A failed read
//! poisons the handle: later calls report the same failure.

use crate::decoder::PartBody;
use crate::error::MultipartError;
use crate::stream::next_item;
use std::fs::{File, OpenOptions};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Handle to the content of one file part.
#[derive(Debug)]
pub struct FileHandle {
    field_name: String,
    filename: Option<String>,
    content_type: String,
    source: FileSource,
}

#[derive(Debug)]
enum FileSource {
    Pending(PartBody),
    Loaded(Vec<u8>),
    Spooled(SpooledFile),
    Failed(String),
}

impl FileHandle {
    pub(crate) fn pending(
        field_name: String,
        filename: Option<String>,
        content_type: String,
        body: PartBody,
    ) -> Self {
        Self {
            field_name,
            filename,
            content_type,
            source: FileSource::Pending(body),
        }
    }

    /// Field name of the part.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Filename supplied by the client, if any.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Content type of the part.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Size in bytes, once the content has been buffered.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        match &self.source {
            FileSource::Loaded(data) => Some(data.len() as u64),
            FileSource::Spooled(file) => Some(file.len),
            FileSource::Pending(_) | FileSource::Failed(_) => None,
        }
    }

    /// Returns true when the content is held in memory.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.source, FileSource::Loaded(_))
    }

    /// Returns true when the content is backed by a temporary file.
    #[must_use]
    pub fn is_spooled(&self) -> bool {
        matches!(self.source, FileSource::Spooled(_))
    }

    /// Path to the temporary file, if the content was spooled to disk.
    #[must_use]
    pub fn spooled_path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Spooled(file) => Some(&file.path),
            _ => None,
        }
    }

    /// Load the full content.
    ///
    /// The first call drains the part body (or reads back the temporary
    /// file); later calls return the cached bytes without touching the source.
    ///
    /// # Errors
    ///
    /// Returns the transport or size-limit error hit while draining, or
    /// [`MultipartError::Io`] if the temporary file cannot be read. Every
    /// later call fails with [`MultipartError::StreamRead`].
    pub async fn read(&mut self) -> Result<&[u8], MultipartError> {
        if let FileSource::Pending(body) = &mut self.source {
            let mut data = Vec::new();
            let mut failure = None;
            while let Some(chunk) = next_item(body).await {
                match chunk {
                    Ok(chunk) => data.extend_from_slice(&chunk),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            if let Some(err) = failure {
                self.source = FileSource::Failed(err.to_string());
                return Err(err);
            }
            trace!(field = %self.field_name, size = data.len(), "file part loaded");
            self.source = FileSource::Loaded(data);
        }

        if let FileSource::Spooled(file) = &self.source {
            match std::fs::read(&file.path) {
                Ok(data) => self.source = FileSource::Loaded(data),
                Err(err) => {
                    self.source = FileSource::Failed(err.to_string());
                    return Err(MultipartError::io(&err));
                }
            }
        }

        match &self.source {
            FileSource::Loaded(data) => Ok(data),
            FileSource::Failed(detail) => Err(MultipartError::StreamRead {
                detail: detail.clone(),
            }),
            FileSource::Pending(_) | FileSource::Spooled(_) => Err(MultipartError::StreamRead {
                detail: "file content unavailable".to_string(),
            }),
        }
    }

    /// Load the content and decode it as UTF-8, replacing invalid sequences.
    pub async fn read_to_string(&mut self) -> Result<String, MultipartError> {
        let bytes = self.read().await?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// A temporary file removed when dropped.
#[derive(Debug)]
struct SpooledFile {
    path: PathBuf,
    len: u64,
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Buffers a part body in memory until it outgrows `threshold`, then moves
/// it to a temporary file.
#[derive(Debug)]
pub(crate) struct SpoolWriter {
    threshold: usize,
    memory: Vec<u8>,
    spooled: Option<(SpooledFile, File)>,
    len: u64,
}

impl SpoolWriter {
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            threshold,
            memory: Vec::new(),
            spooled: None,
            len: 0,
        }
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) -> Result<(), MultipartError> {
        if let Some((_, file)) = &mut self.spooled {
            file.write_all(chunk).map_err(|e| MultipartError::io(&e))?;
        } else if self.memory.len() + chunk.len() > self.threshold {
            let (path, mut file) = create_spool_tempfile().map_err(|e| MultipartError::io(&e))?;
            let spooled = SpooledFile { path, len: 0 };
            debug!(path = %spooled.path.display(), "spooling file part to disk");
            file.write_all(&self.memory)
                .and_then(|()| file.write_all(chunk))
                .map_err(|e| MultipartError::io(&e))?;
            self.memory = Vec::new();
            self.spooled = Some((spooled, file));
        } else {
            self.memory.extend_from_slice(chunk);
        }
        self.len += chunk.len() as u64;
        Ok(())
    }

    pub(crate) fn finish(
        self,
        field_name: String,
        filename: Option<String>,
        content_type: String,
    ) -> Result<FileHandle, MultipartError> {
        let source = match self.spooled {
            Some((mut spooled, mut file)) => {
                file.flush().map_err(|e| MultipartError::io(&e))?;
                spooled.len = self.len;
                FileSource::Spooled(spooled)
            }
            None => FileSource::Loaded(self.memory),
        };
        Ok(FileHandle {
            field_name,
            filename,
            content_type,
            source,
        })
    }
}

/// Open a fresh `formdata-<random>.part` file in the system temp directory.
///
/// `create_new` guarantees the file did not exist; a name collision draws a
/// new suffix.
fn create_spool_tempfile() -> io::Result<(PathBuf, File)> {
    let dir = std::env::temp_dir();
    let mut rng = rand::thread_rng();
    let mut last_err = None;

    for _ in 0..SPOOL_NAME_ATTEMPTS {
        let suffix: String = (&mut rng)
            .sample_iter(Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let path = dir.join(format!("formdata-{suffix}.part"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => last_err = Some(err),
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::other("no spool file name available")))
}

const SPOOL_NAME_ATTEMPTS: usize = 8;
