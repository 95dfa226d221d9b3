//! Boundary generation, validation and extraction from `Content-Type`.

use crate::error::MultipartError;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// RFC 2046 recommends multipart boundary length <= 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

const GENERATED_PREFIX: &str = "----FormDataBoundary";
const GENERATED_TOKEN_LEN: usize = 24;

/// Delimiter separating the parts of a multipart body.
///
/// A boundary is immutable once created. Generated boundaries carry 24
/// random alphanumerics (about 142 bits), so plain content is not expected
/// to ever contain one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Boundary(String);

impl Boundary {
    /// Generate a fresh random boundary.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_rng(&mut rand::thread_rng())
    }

    /// Generate a boundary deterministically from `seed`.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self::from_rng(&mut StdRng::seed_from_u64(seed))
    }

    fn from_rng<R: Rng>(rng: &mut R) -> Self {
        let mut token = String::with_capacity(GENERATED_PREFIX.len() + GENERATED_TOKEN_LEN);
        token.push_str(GENERATED_PREFIX);
        token.extend((0..GENERATED_TOKEN_LEN).map(|_| char::from(rng.sample(Alphanumeric))));
        Self(token)
    }

    /// Validate a caller-supplied boundary.
    ///
    /// Accepts 1 to 70 characters from the RFC 2046 `bchars` set; a space
    /// may appear anywhere except at the end.
    pub fn new(value: impl Into<String>) -> Result<Self, MultipartError> {
        let value = value.into();
        if value.is_empty() || value.len() > MAX_BOUNDARY_LEN || value.ends_with(' ') {
            return Err(MultipartError::InvalidBoundary);
        }
        if !value.bytes().all(is_bchar) {
            return Err(MultipartError::InvalidBoundary);
        }
        Ok(Self(value))
    }

    /// The boundary token without the leading dashes.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `--boundary`, the dash-boundary that opens every part.
    #[must_use]
    pub fn dash_boundary(&self) -> Vec<u8> {
        format!("--{}", self.0).into_bytes()
    }
}

fn is_bchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?' | b' '
        )
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Boundary {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Boundary {
    type Err = MultipartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Parse boundary from Content-Type header.
///
/// Content-Type format: `multipart/form-data; boundary=----WebKitFormBoundary...`
pub fn parse_boundary(content_type: &str) -> Result<Boundary, MultipartError> {
    let content_type = content_type.trim();
    let main = content_type.split(';').next().unwrap_or("").trim();
    if !main.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::InvalidBoundary);
    }

    for part in content_type.split(';').skip(1) {
        let part = part.trim();
        let Some((k, v)) = part.split_once('=') else {
            continue;
        };
        if k.trim().eq_ignore_ascii_case("boundary") {
            let boundary = v.trim();
            let boundary = boundary.trim_matches('"').trim_matches('\'');
            return Boundary::new(boundary);
        }
    }

    Err(MultipartError::MissingBoundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_boundaries_are_valid_and_distinct() {
        let a = Boundary::generate();
        let b = Boundary::generate();
        assert_ne!(a, b);
        assert!(Boundary::new(a.as_str()).is_ok());
        assert!(a.as_str().starts_with(GENERATED_PREFIX));
        assert_eq!(a.as_str().len(), GENERATED_PREFIX.len() + GENERATED_TOKEN_LEN);
    }

    #[test]
    fn seeded_boundaries_are_deterministic() {
        assert_eq!(Boundary::from_seed(7), Boundary::from_seed(7));
        assert_ne!(Boundary::from_seed(7), Boundary::from_seed(8));
    }

    #[test]
    fn rejects_invalid_boundaries() {
        assert!(Boundary::new("").is_err());
        assert!(Boundary::new("a".repeat(MAX_BOUNDARY_LEN + 1)).is_err());
        assert!(Boundary::new("ends-with-space ").is_err());
        assert!(Boundary::new("quote\"inside").is_err());
        assert!(Boundary::new("has space inside").is_ok());
    }

    #[test]
    fn dash_boundary_prefixes_two_dashes() {
        let boundary = Boundary::new("abc").unwrap();
        assert_eq!(boundary.dash_boundary(), b"--abc".to_vec());
    }

    #[test]
    fn test_parse_boundary() {
        let ct = "multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxkTrZu0gW";
        let boundary = parse_boundary(ct).unwrap();
        assert_eq!(boundary.as_str(), "----WebKitFormBoundary7MA4YWxkTrZu0gW");
    }

    #[test]
    fn test_parse_boundary_quoted() {
        let ct = r#"multipart/form-data; Boundary="simple-boundary""#;
        let boundary = parse_boundary(ct).unwrap();
        assert_eq!(boundary.as_str(), "simple-boundary");
    }

    #[test]
    fn test_parse_boundary_missing() {
        let result = parse_boundary("multipart/form-data");
        assert!(matches!(result, Err(MultipartError::MissingBoundary)));
    }

    #[test]
    fn test_parse_boundary_wrong_content_type() {
        let result = parse_boundary("application/json");
        assert!(matches!(result, Err(MultipartError::InvalidBoundary)));
    }
}
