//! Reversible mapping between source-relative paths and cache filenames.
//!
//! Keys are the percent-encoded form of the relative path: every byte outside
//! `A-Z a-z 0-9 - _ . ~` becomes `%XX`, so `/`, `%`, spaces, control bytes and
//! multi-byte UTF-8 all collapse into a single filesystem-safe name. Only the
//! canonical encoding is accepted when parsing, which keeps the mapping a
//! bijection between valid relative paths and key strings.

use std::borrow::Cow;
use std::fmt;

use crate::error::{PreviewError, Result};

/// Extension appended to every cache entry filename.
pub const CACHE_ENTRY_EXTENSION: &str = "jpg";

/// Filesystem-safe identity of one cached preview.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Encode a normalized relative path. Total over any UTF-8 input.
    pub fn encode(relative: &str) -> Self {
        Self(urlencoding::encode(relative).into_owned())
    }

    /// Accept a raw key string, rejecting anything `encode` could not have produced.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || !has_valid_alphabet(raw) {
            return Err(PreviewError::MalformedKey(raw.to_string()));
        }

        let key = Self(raw.to_string());
        // Non-canonical escapes (e.g. `%41` for `A`) would alias another key.
        let decoded = key.decode()?;
        if urlencoding::encode(&decoded) != raw {
            return Err(PreviewError::MalformedKey(raw.to_string()));
        }
        Ok(key)
    }

    /// Recover the key from a cache directory entry named `<key>.jpg`.
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let stem = file_name
            .strip_suffix(CACHE_ENTRY_EXTENSION)
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or_else(|| PreviewError::MalformedKey(file_name.to_string()))?;
        Self::parse(stem)
    }

    /// Decode back to the relative path this key was produced from.
    pub fn decode(&self) -> Result<String> {
        urlencoding::decode(&self.0)
            .map(Cow::into_owned)
            .map_err(|_| PreviewError::MalformedKey(self.0.clone()))
    }

    /// Cache entry filename for this key.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, CACHE_ENTRY_EXTENSION)
    }

    /// The encoded key, without the `.jpg` suffix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn has_valid_alphabet(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                idx += 1;
            }
            b'%' => {
                let escape = bytes.get(idx + 1..idx + 3);
                match escape {
                    Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                        idx += 3;
                    }
                    _ => return false,
                }
            }
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_awkward_paths() {
        let paths = [
            "a.jpg",
            "GOES16/Full Disk/ch13/2024-01-01 00:00.png",
            "unicode/北京/ünïcødé.webp",
            "percent/100%25 literally %zz.jpg",
            "tab\tand\nnewline.gif",
            ".hidden/.thumb.jpeg",
        ];

        for path in paths {
            let key = CacheKey::encode(path);
            assert!(!key.as_str().contains('/'), "separator leaked: {key}");
            assert_eq!(key.decode().unwrap(), path);

            let reparsed = CacheKey::from_file_name(&key.file_name()).unwrap();
            assert_eq!(reparsed, key);
        }
    }

    #[test]
    fn distinct_paths_never_share_a_key() {
        let a = CacheKey::encode("a/b.jpg");
        let b = CacheKey::encode("a%2Fb.jpg");
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_characters_outside_the_alphabet() {
        for raw in ["a/b", "space here", "bad%", "bad%4", "bad%zz", ""] {
            assert!(
                matches!(CacheKey::parse(raw), Err(PreviewError::MalformedKey(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_non_canonical_escapes() {
        // `%41` decodes to `A`, which `encode` never escapes.
        assert!(CacheKey::parse("%41.png").is_err());
        // Lowercase hex is not what the encoder emits either.
        assert!(CacheKey::parse("a%2fb").is_err());
    }

    #[test]
    fn file_name_requires_jpg_suffix() {
        assert!(CacheKey::from_file_name("a.png").is_err());
        assert!(CacheKey::from_file_name("a.tmp.0123abcd").is_err());
        assert!(CacheKey::from_file_name(".jpg").is_err());
        assert_eq!(
            CacheKey::from_file_name("a.png.jpg").unwrap().decode().unwrap(),
            "a.png"
        );
    }
}
