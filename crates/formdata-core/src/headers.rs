//! Part header parsing.

use crate::error::MultipartError;

/// Content type assumed for parts without a filename.
pub const DEFAULT_TEXT_CONTENT_TYPE: &str = "text/plain";

/// Content type assumed for file parts that do not declare one.
pub const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// Parsed header block of one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeaders {
    /// Field name from Content-Disposition.
    pub name: String,
    /// Filename from Content-Disposition (if present).
    pub filename: Option<String>,
    /// Declared Content-Type, or the default for the part's kind.
    pub content_type: String,
    /// Every header line, names lowercased, in order of appearance.
    pub raw: Vec<(String, String)>,
}

impl PartHeaders {
    /// Value of the first header named `name` (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a raw header block (lines separated by CRLF, blank line excluded).
pub fn parse_part_headers(block: &[u8]) -> Result<PartHeaders, MultipartError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| MultipartError::malformed_part("invalid UTF-8 in header"))?;

    let mut raw = Vec::new();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            raw.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let disposition = raw
        .iter()
        .find(|(k, _)| k == "content-disposition")
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| MultipartError::malformed_part("missing Content-Disposition header"))?;
    let (name, filename) = parse_content_disposition(disposition)?;

    let content_type = raw
        .iter()
        .find(|(k, _)| k == "content-type")
        .map(|(_, v)| v.clone())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
            if filename.is_some() {
                DEFAULT_FILE_CONTENT_TYPE.to_string()
            } else {
                DEFAULT_TEXT_CONTENT_TYPE.to_string()
            }
        });

    Ok(PartHeaders {
        name,
        filename,
        content_type,
        raw,
    })
}

/// Parse Content-Disposition header value.
///
/// Format: `form-data; name="field"; filename="file.txt"`. An RFC 5987
/// `filename*` parameter wins over a plain `filename`.
fn parse_content_disposition(value: &str) -> Result<(String, Option<String>), MultipartError> {
    let mut name = None;
    let mut filename = None;
    let mut extended_filename = None;

    for (key, value) in disposition_params(value) {
        if key.eq_ignore_ascii_case("name") {
            name.get_or_insert(value);
        } else if key.eq_ignore_ascii_case("filename") {
            filename.get_or_insert(value);
        } else if key.eq_ignore_ascii_case("filename*") {
            extended_filename = decode_ext_value(&value).or(extended_filename);
        }
    }

    let name = name.ok_or_else(|| MultipartError::malformed_part("missing name parameter"))?;
    Ok((name, extended_filename.or(filename)))
}

/// Split `type; key=value; key="quoted; value"` into unescaped parameters.
///
/// The disposition type itself is skipped.
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut rest = match value.split_once(';') {
        Some((_, rest)) => rest,
        None => return params,
    };

    loop {
        rest = rest.trim_start_matches([' ', '\t', ';']);
        if rest.is_empty() {
            return params;
        }

        let Some(eq) = rest.find('=') else {
            return params;
        };
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].trim_start();

        if let Some(quoted) = rest.strip_prefix('"') {
            let (value, consumed) = read_quoted(quoted);
            params.push((key, value));
            rest = &quoted[consumed..];
        } else {
            let end = rest.find(';').unwrap_or(rest.len());
            params.push((key, rest[..end].trim().to_string()));
            rest = &rest[end..];
        }
    }
}

/// Read a quoted-string body (opening quote already stripped).
///
/// Returns the unescaped value and the number of bytes consumed including
/// the closing quote. An unterminated string runs to the end of input.
fn read_quoted(input: &str) -> (String, usize) {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return (percent_decode_escapes(&out), i + 1),
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => out.push('\\'),
            },
            c => out.push(c),
        }
    }
    (percent_decode_escapes(&out), input.len())
}

/// Undo the percent escapes browsers apply to quoted names: `%22`, `%0D`,
/// `%0A` and other control characters, plus `%25` for a `%` the encoder had
/// to protect. Anything else stays literal.
fn percent_decode_escapes(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }

    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if starts_escape(&bytes[i..]) {
            if let Some(decoded) = hex_pair(bytes[i + 1], bytes[i + 2]) {
                out.push(decoded);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Whether `bytes` begins with a `%XX` escape that names decode back:
/// `"`, `%` or a control byte.
pub(crate) fn starts_escape(bytes: &[u8]) -> bool {
    match bytes {
        [b'%', hi, lo, ..] => {
            hex_pair(*hi, *lo).is_some_and(|b| b == b'"' || b == b'%' || b.is_ascii_control())
        }
        _ => false,
    }
}

/// Decode an RFC 5987 `ext-value`: `charset'language'percent-encoded`.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;

    let bytes = percent_decode_all(encoded)?;
    if charset.eq_ignore_ascii_case("utf-8") {
        String::from_utf8(bytes).ok()
    } else if charset.eq_ignore_ascii_case("iso-8859-1") {
        Some(bytes.into_iter().map(char::from).collect())
    } else {
        None
    }
}

fn percent_decode_all(value: &str) -> Option<Vec<u8>> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = *bytes.get(i + 1)?;
            let lo = *bytes.get(i + 2)?;
            out.push(hex_pair(hi, lo)?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}

pub(crate) fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    fn hex(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }
    Some((hex(hi)? << 4) | hex(lo)?)
}
