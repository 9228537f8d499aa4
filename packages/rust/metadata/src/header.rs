//! Metadata header parser and renderer.
//!
//! A generated file starts with a block of single-line comments:
//!
//! ```text
//! //# sub-comment, ignored
//! // URL: https://example.com/some_data.txt
//! // LAST-MODIFIED: 2001-01-01T00:00:00Z
//! // URL: https://example.com/another_data.txt
//! // ETAG: "AnotherDataTxt"
//!
//! ...generated code...
//! ```
//!
//! The block ends at the first blank line. Keys are case-insensitive.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use codeupdater_shared::{
    CodeUpdaterError, EntityTag, FormatError, Result, format_timestamp, parse_timestamp,
};
use tracing::debug;
use url::Url;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Validators recorded for one source when its target was generated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreshnessRecord {
    /// Source's Last-Modified date at generation time.
    pub last_modified: Option<DateTime<Utc>>,
    /// Source's entity tag at generation time.
    pub etag: Option<EntityTag>,
}

/// Per-source freshness records of one generated file, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetMetadata {
    entries: Vec<(Url, FreshnessRecord)>,
}

impl TargetMetadata {
    /// Create an empty metadata set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `url`, keeping its original position.
    pub fn insert(&mut self, url: Url, record: FreshnessRecord) {
        match self.entries.iter_mut().find(|(u, _)| *u == url) {
            Some((_, existing)) => *existing = record,
            None => self.entries.push((url, record)),
        }
    }

    /// Whether the header declares `url`.
    pub fn contains_info(&self, url: &Url) -> bool {
        self.record(url).is_some()
    }

    /// Recorded Last-Modified date of `url`.
    pub fn last_modified_date(&self, url: &Url) -> Option<DateTime<Utc>> {
        self.record(url).and_then(|r| r.last_modified)
    }

    /// Recorded entity tag of `url`.
    pub fn etag(&self, url: &Url) -> Option<&EntityTag> {
        self.record(url).and_then(|r| r.etag.as_ref())
    }

    /// Full record of `url`.
    pub fn record(&self, url: &Url) -> Option<&FreshnessRecord> {
        self.entries.iter().find(|(u, _)| u == url).map(|(_, r)| r)
    }

    /// Declared URLs in order.
    pub fn urls(&self) -> impl Iterator<Item = &Url> {
        self.entries.iter().map(|(u, _)| u)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    /// Parse the header at the top of `content`.
    pub fn parse_str(content: &str, marker: &str) -> std::result::Result<Self, FormatError> {
        let mut parser = HeaderParser::new(marker);
        for (index, line) in content.lines().enumerate() {
            if parser.feed(index + 1, Some(line))?.is_done() {
                break;
            }
        }
        parser.finish()
    }

    /// Parse the header from a reader, stopping at the end of the block.
    ///
    /// Lines that are not valid UTF-8 are reported as unexpected lines.
    pub fn parse_reader<R: BufRead>(mut reader: R, marker: &str) -> Result<Self> {
        let mut parser = HeaderParser::new(marker);
        let mut buf = Vec::new();
        let mut line_number = 0;
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| CodeUpdaterError::io("<metadata>", e))?;
            if read == 0 {
                break;
            }
            line_number += 1;
            let line = std::str::from_utf8(&buf).ok();
            if parser.feed(line_number, line)?.is_done() {
                break;
            }
        }
        Ok(parser.finish()?)
    }

    /// Read the header of the file at `path`.
    pub fn from_path(path: &Path, marker: &str) -> Result<Self> {
        let file = File::open(path).map_err(|e| CodeUpdaterError::io(path, e))?;
        let metadata = Self::parse_reader(BufReader::new(file), marker).map_err(|e| match e {
            CodeUpdaterError::Io { source, .. } => CodeUpdaterError::io(path, source),
            other => other,
        })?;
        debug!(path = %path.display(), entries = metadata.len(), "read target metadata");
        Ok(metadata)
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Render the header block, including the terminating blank line.
    pub fn render(&self, marker: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{marker}# This file was generated by codeupdater from the sources below.\n"
        ));
        out.push_str(&format!(
            "{marker}# Edit the generator instead of this file; local changes will be overwritten.\n"
        ));
        for (url, record) in &self.entries {
            out.push_str(&format!("{marker} URL: {url}\n"));
            if let Some(date) = &record.last_modified {
                out.push_str(&format!(
                    "{marker} LAST-MODIFIED: {}\n",
                    format_timestamp(date)
                ));
            }
            if let Some(etag) = &record.etag {
                out.push_str(&format!("{marker} ETAG: {etag}\n"));
            }
        }
        out.push('\n');
        out
    }
}

/// Split a generated file into its header block and body.
///
/// The header includes the terminating blank line. A file that does not
/// start with a comment line has no header.
pub fn split_header<'a>(content: &'a str, marker: &str) -> (&'a str, &'a str) {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        let end = offset + line.len();
        if trimmed.is_empty() {
            return content.split_at(end);
        }
        if !trimmed.starts_with(marker) {
            return content.split_at(offset);
        }
        offset = end;
    }
    (content, "")
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

enum Step {
    Continue,
    Done,
}

impl Step {
    fn is_done(&self) -> bool {
        matches!(self, Step::Done)
    }
}

struct HeaderParser<'m> {
    marker: &'m str,
    metadata: TargetMetadata,
    current: Option<Url>,
}

impl<'m> HeaderParser<'m> {
    fn new(marker: &'m str) -> Self {
        Self {
            marker,
            metadata: TargetMetadata::new(),
            current: None,
        }
    }

    fn feed(&mut self, line: usize, text: Option<&str>) -> std::result::Result<Step, FormatError> {
        let text = text.ok_or(FormatError::UnexpectedLine { line })?.trim();
        if text.is_empty() {
            return Ok(Step::Done);
        }

        let body = text
            .strip_prefix(self.marker)
            .ok_or(FormatError::NotCommentLine { line })?
            .trim();
        if body.is_empty() || body.starts_with('#') {
            return Ok(Step::Continue);
        }

        let (key, value) = body
            .split_once(':')
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .ok_or(FormatError::NotKeyValuePair { line })?;

        match key.to_ascii_uppercase().as_str() {
            "URL" => {
                let url = Url::parse(value).map_err(|_| FormatError::InvalidUrl { line })?;
                self.metadata.insert(url.clone(), FreshnessRecord::default());
                self.current = Some(url);
            }
            "LAST-MODIFIED" => {
                let date = parse_timestamp(value).ok_or(FormatError::InvalidDate { line })?;
                let record = self.current_record(line)?;
                if record.last_modified.is_some() {
                    return Err(FormatError::DuplicatedInfo { line });
                }
                record.last_modified = Some(date);
            }
            "ETAG" => {
                let etag: EntityTag = value
                    .parse()
                    .map_err(|_| FormatError::InvalidEtag { line })?;
                let record = self.current_record(line)?;
                if record.etag.is_some() {
                    return Err(FormatError::DuplicatedInfo { line });
                }
                record.etag = Some(etag);
            }
            _ => return Err(FormatError::UnexpectedLine { line }),
        }
        Ok(Step::Continue)
    }

    fn current_record(
        &mut self,
        line: usize,
    ) -> std::result::Result<&mut FreshnessRecord, FormatError> {
        let url = self
            .current
            .as_ref()
            .ok_or(FormatError::InfoBeforeUrl { line })?;
        self.metadata
            .entries
            .iter_mut()
            .find(|(u, _)| u == url)
            .map(|(_, r)| r)
            .ok_or(FormatError::InfoBeforeUrl { line })
    }

    fn finish(self) -> std::result::Result<TargetMetadata, FormatError> {
        if self.metadata.is_empty() {
            return Err(FormatError::NoData);
        }
        Ok(self.metadata)
    }
}
