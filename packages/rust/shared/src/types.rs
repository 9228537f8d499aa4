//! Core domain types shared by the codeupdater crates.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Comment marker used for metadata headers unless configured otherwise.
pub const DEFAULT_COMMENT_MARKER: &str = "//";

// ---------------------------------------------------------------------------
// EntityTag
// ---------------------------------------------------------------------------

/// An HTTP entity tag (`"abc"` or `W/"abc"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityTag {
    weak: bool,
    opaque: String,
}

/// Returned when a string is not a valid entity-tag literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entity tag: {0:?}")]
pub struct ParseEntityTagError(pub String);

impl EntityTag {
    /// Create a strong tag. Returns `None` if `opaque` contains forbidden characters.
    pub fn strong(opaque: impl Into<String>) -> Option<Self> {
        Self::new(false, opaque.into())
    }

    /// Create a weak tag. Returns `None` if `opaque` contains forbidden characters.
    pub fn weak(opaque: impl Into<String>) -> Option<Self> {
        Self::new(true, opaque.into())
    }

    fn new(weak: bool, opaque: String) -> Option<Self> {
        opaque
            .chars()
            .all(is_etagc)
            .then_some(Self { weak, opaque })
    }

    /// Whether the tag carries the `W/` weakness indicator.
    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// The opaque value between the quotes.
    pub fn opaque(&self) -> &str {
        &self.opaque
    }

    /// Weak comparison: opaque values match, weakness is ignored.
    pub fn weak_eq(&self, other: &Self) -> bool {
        self.opaque == other.opaque
    }

    /// Strong comparison: both tags are strong and their opaque values match.
    pub fn strong_eq(&self, other: &Self) -> bool {
        !self.weak && !other.weak && self.opaque == other.opaque
    }
}

/// `etagc = %x21 / %x23-7E / obs-text`
fn is_etagc(c: char) -> bool {
    c == '!' || ('#'..='~').contains(&c) || u32::from(c) >= 0x80
}

impl FromStr for EntityTag {
    type Err = ParseEntityTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseEntityTagError(s.to_string());
        let trimmed = s.trim();
        let (weak, quoted) = match trimmed.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let opaque = quoted
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .ok_or_else(invalid)?;
        Self::new(weak, opaque.to_string()).ok_or_else(invalid)
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            write!(f, "W/\"{}\"", self.opaque)
        } else {
            write!(f, "\"{}\"", self.opaque)
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parse an ISO-8601 timestamp as written in metadata headers.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a timestamp for a metadata header (`2001-01-01T00:00:00Z`).
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an HTTP-date header value.
///
/// Accepts IMF-fixdate as well as the obsolete RFC 850 and asctime forms.
pub fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Derive a target identifier from its destination path (the file stem).
pub fn identifier_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
