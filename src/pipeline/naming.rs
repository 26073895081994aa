//! Storage key naming.
//!
//! Output keys are derived from the source key alone, so re-running an
//! invocation overwrites the same objects:
//!
//! ```text
//! docs/report.pdf ─▶ docs/0.webp          (raster of page index 0)
//!                    docs/report-1.pdf    (page 1)
//!                    docs/report-2.pdf    (page 2)
//! ```
//!
//! Raster keys use the zero-based page index; extract keys use the one-based
//! page number.

use crate::config::RasterFormat;
use crate::error::PageSplitError;
use serde::Serialize;
use std::fmt;

/// A fully composed object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// `{dir}/{page_index}.{ext}`
    pub fn raster(dir: &str, page_index: usize, format: RasterFormat) -> Self {
        Self(join(dir, &format!("{page_index}.{}", format.extension())))
    }

    /// `{dir}/{base}-{page_index + 1}.pdf`
    pub fn extract(dir: &str, base: &str, page_index: usize) -> Self {
        Self(join(dir, &format!("{base}-{}.pdf", page_index + 1)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// The parts of a decoded source key that output keys are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    /// Decoded key, as used to fetch the source object.
    pub key: String,
    /// Everything before the last `/`; empty for top-level keys.
    pub dir: String,
    /// File name without its `.pdf` (or last) extension.
    pub base: String,
}

impl SourceKey {
    /// Decode a raw event key and split it into directory and base name.
    pub fn parse(raw: &str) -> Result<Self, PageSplitError> {
        let key = decode_source_key(raw)?;
        let (dir, base) = split_source_key(&key)?;
        Ok(Self { key, dir, base })
    }

    /// Build from a key that is already decoded (CLI paths, tests).
    pub fn from_decoded(key: impl Into<String>) -> Result<Self, PageSplitError> {
        let key = key.into();
        let (dir, base) = split_source_key(&key)?;
        Ok(Self { key, dir, base })
    }

    pub fn raster_key(&self, page_index: usize, format: RasterFormat) -> StorageKey {
        StorageKey::raster(&self.dir, page_index, format)
    }

    pub fn extract_key(&self, page_index: usize) -> StorageKey {
        StorageKey::extract(&self.dir, &self.base, page_index)
    }
}

/// Decode an event key: `+` means space, then percent-decoding applies.
///
/// The order matters: a literal plus arrives as `%2B` and must survive.
pub fn decode_source_key(raw: &str) -> Result<String, PageSplitError> {
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced).map_err(|e| PageSplitError::InvalidSourceKey {
        key: raw.to_string(),
        detail: e.to_string(),
    })?;
    if decoded.is_empty() {
        return Err(PageSplitError::InvalidSourceKey {
            key: raw.to_string(),
            detail: "key is empty".into(),
        });
    }
    Ok(decoded.into_owned())
}

/// Split a decoded key into `(directory, base name)`.
pub fn split_source_key(key: &str) -> Result<(String, String), PageSplitError> {
    let (dir, file) = match key.rfind('/') {
        Some(pos) => (&key[..pos], &key[pos + 1..]),
        None => ("", key),
    };
    if file.is_empty() {
        return Err(PageSplitError::InvalidSourceKey {
            key: key.to_string(),
            detail: "key has no file name".into(),
        });
    }
    Ok((dir.to_string(), strip_extension(file).to_string()))
}

fn strip_extension(file: &str) -> &str {
    let bytes = file.as_bytes();
    if bytes.len() >= 4 && bytes[bytes.len() - 4..].eq_ignore_ascii_case(b".pdf") {
        return &file[..file.len() - 4];
    }
    match file.rfind('.') {
        // Leading dot is a hidden file, not an extension.
        Some(pos) if pos > 0 => &file[..pos],
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_means_space_and_percent_escapes_decode() {
        assert_eq!(decode_source_key("docs/my+report.pdf").unwrap(), "docs/my report.pdf");
        assert_eq!(decode_source_key("docs/a%2Bb.pdf").unwrap(), "docs/a+b.pdf");
        assert_eq!(
            decode_source_key("docs/caf%C3%A9+menu.pdf").unwrap(),
            "docs/café menu.pdf"
        );
    }

    #[test]
    fn invalid_utf8_escape_is_rejected() {
        let err = decode_source_key("docs/%FF.pdf").unwrap_err();
        assert!(matches!(err, PageSplitError::InvalidSourceKey { .. }), "{err:?}");
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(decode_source_key("").is_err());
        assert!(split_source_key("docs/").is_err());
    }

    #[test]
    fn splits_directory_and_base() {
        assert_eq!(
            split_source_key("docs/2024/report.pdf").unwrap(),
            ("docs/2024".to_string(), "report".to_string())
        );
        assert_eq!(
            split_source_key("report.PDF").unwrap(),
            (String::new(), "report".to_string())
        );
        assert_eq!(
            split_source_key("scans/archive.tar.gz").unwrap(),
            ("scans".to_string(), "archive.tar".to_string())
        );
        assert_eq!(
            split_source_key("docs/README").unwrap(),
            ("docs".to_string(), "README".to_string())
        );
        assert_eq!(
            split_source_key("docs/.hidden").unwrap(),
            ("docs".to_string(), ".hidden".to_string())
        );
    }

    #[test]
    fn output_keys_follow_the_naming_scheme() {
        let src = SourceKey::parse("docs/report.pdf").unwrap();
        assert_eq!(src.raster_key(0, RasterFormat::Webp).as_str(), "docs/0.webp");
        assert_eq!(src.raster_key(2, RasterFormat::Jpeg).as_str(), "docs/2.jpeg");
        assert_eq!(src.extract_key(0).as_str(), "docs/report-1.pdf");
        assert_eq!(src.extract_key(2).as_str(), "docs/report-3.pdf");
    }

    #[test]
    fn top_level_keys_have_no_leading_slash() {
        let src = SourceKey::parse("report.pdf").unwrap();
        assert_eq!(src.raster_key(0, RasterFormat::Png).as_str(), "0.png");
        assert_eq!(src.extract_key(0).as_str(), "report-1.pdf");
    }

    #[test]
    fn decoded_spaces_carry_into_output_keys() {
        let src = SourceKey::parse("in+box/q3+results.pdf").unwrap();
        assert_eq!(src.key, "in box/q3 results.pdf");
        assert_eq!(src.extract_key(1).as_str(), "in box/q3 results-2.pdf");
    }

    #[test]
    fn keys_of_one_invocation_are_distinct() {
        let src = SourceKey::parse("docs/report.pdf").unwrap();
        let mut keys: Vec<StorageKey> = (0..50).map(|i| src.extract_key(i)).collect();
        keys.push(src.raster_key(0, RasterFormat::Webp));
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }
}
