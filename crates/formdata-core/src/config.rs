//! Decoder limits.
//!
//! Every limit is checked while the body streams in, so a violation is
//! reported as soon as the offending byte or part header arrives.

pub const DEFAULT_MAX_FIELDS: usize = 100;
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 << 20;
pub const DEFAULT_MAX_TOTAL_SIZE: usize = 50 << 20;
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 << 10;
pub const DEFAULT_SPOOL_THRESHOLD: usize = 1 << 20;

/// Limits applied by [`Multipart`](crate::Multipart).
///
/// | Limit | Default | Error |
/// |---|---|---|
/// | `max_fields` | 100 | `TooManyFields` |
/// | `max_file_size` | 10 MiB | `FileTooLarge` (parts with a filename only) |
/// | `max_total_size` | 50 MiB | `TotalTooLarge` (every body byte, skipped ones too) |
/// | `max_header_size` | 8 KiB | `MalformedPart` |
/// | `spool_threshold` | 1 MiB | none; larger files go to a temporary file in `into_tree` |
///
/// ```
/// use formdata_core::MultipartConfig;
///
/// let config = MultipartConfig::new().max_fields(10).spool_threshold(64 * 1024);
/// assert_eq!(config.get_max_fields(), 10);
/// assert_eq!(config.get_max_header_size(), formdata_core::DEFAULT_MAX_HEADER_SIZE);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartConfig {
    fields: usize,
    file_size: usize,
    total_size: usize,
    header_size: usize,
    spool_threshold: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            fields: DEFAULT_MAX_FIELDS,
            file_size: DEFAULT_MAX_FILE_SIZE,
            total_size: DEFAULT_MAX_TOTAL_SIZE,
            header_size: DEFAULT_MAX_HEADER_SIZE,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
        }
    }
}

impl MultipartConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_fields(self, count: usize) -> Self {
        Self {
            fields: count,
            ..self
        }
    }

    #[must_use]
    pub fn max_file_size(self, bytes: usize) -> Self {
        Self {
            file_size: bytes,
            ..self
        }
    }

    #[must_use]
    pub fn max_total_size(self, bytes: usize) -> Self {
        Self {
            total_size: bytes,
            ..self
        }
    }

    /// Largest header block one part may carry, blank line excluded.
    #[must_use]
    pub fn max_header_size(self, bytes: usize) -> Self {
        Self {
            header_size: bytes,
            ..self
        }
    }

    /// Size at which `into_tree` moves a file part out of memory.
    #[must_use]
    pub fn spool_threshold(self, bytes: usize) -> Self {
        Self {
            spool_threshold: bytes,
            ..self
        }
    }

    #[must_use]
    pub fn get_max_fields(&self) -> usize {
        self.fields
    }

    #[must_use]
    pub fn get_max_file_size(&self) -> usize {
        self.file_size
    }

    #[must_use]
    pub fn get_max_total_size(&self) -> usize {
        self.total_size
    }

    #[must_use]
    pub fn get_max_header_size(&self) -> usize {
        self.header_size
    }

    #[must_use]
    pub fn get_spool_threshold(&self) -> usize {
        self.spool_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MultipartConfig::default();
        assert_eq!(config.get_max_fields(), 100);
        assert_eq!(config.get_max_file_size(), 10 * 1024 * 1024);
        assert_eq!(config.get_max_total_size(), 50 * 1024 * 1024);
        assert_eq!(config.get_max_header_size(), 8 * 1024);
        assert_eq!(config.get_spool_threshold(), 1024 * 1024);
    }

    #[test]
    fn setters_touch_one_limit() {
        let config = MultipartConfig::new().max_header_size(512);
        assert_eq!(config.get_max_header_size(), 512);
        assert_eq!(
            MultipartConfig { header_size: DEFAULT_MAX_HEADER_SIZE, ..config },
            MultipartConfig::default()
        );
    }
}
