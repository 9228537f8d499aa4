//! Unicode Character Database style data files.
//!
//! Each meaningful line has the shape
//! `0041..005A ; column ; column # comment`. The first column is a single
//! code point or an inclusive `start..end` range in hexadecimal. Ranges are
//! `u32` and may cover surrogates.

use std::ops::RangeInclusive;

use codeupdater_shared::{CodeUpdaterError, Result};
use url::Url;

use crate::FromSource;

/// One line of a data file that carries data, a comment, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeDataRow {
    /// Code point range and the remaining columns.
    pub data: Option<(RangeInclusive<u32>, Vec<String>)>,
    /// Text after `#`, trimmed.
    pub comment: Option<String>,
}

impl UnicodeDataRow {
    /// Parse one line. Returns `Ok(None)` for blank lines and for data lines
    /// with fewer than two columns.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let (data_part, comment) = match line.split_once('#') {
            Some((data, comment)) => (data.trim(), Some(comment.trim().to_string())),
            None => (line.trim(), None),
        };

        let data = if data_part.is_empty() {
            None
        } else {
            let columns: Vec<&str> = data_part.split(';').map(str::trim).collect();
            if columns.len() < 2 {
                return Ok(None);
            }
            let range = parse_range(columns[0])?;
            let rest = columns[1..].iter().map(|c| c.to_string()).collect();
            Some((range, rest))
        };

        if data.is_none() && comment.is_none() {
            return Ok(None);
        }
        Ok(Some(Self { data, comment }))
    }

    /// First column value after the range, if any.
    pub fn first_column(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|(_, columns)| columns.first())
            .map(String::as_str)
    }
}

/// Largest code point in the Unicode codespace.
const MAX_CODE_POINT: u32 = 0x10FFFF;

fn parse_range(text: &str) -> std::result::Result<RangeInclusive<u32>, String> {
    let code_point = |hex: &str| -> std::result::Result<u32, String> {
        u32::from_str_radix(hex.trim(), 16)
            .ok()
            .filter(|&value| value <= MAX_CODE_POINT)
            .ok_or_else(|| format!("invalid code point `{hex}`"))
    };

    match text.split_once("..") {
        Some((start, end)) => {
            let (start, end) = (code_point(start)?, code_point(end)?);
            if start > end {
                return Err(format!("descending range `{text}`"));
            }
            Ok(start..=end)
        }
        None => {
            let point = code_point(text)?;
            Ok(point..=point)
        }
    }
}

/// All rows of a data file, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnicodeData {
    pub rows: Vec<UnicodeDataRow>,
}

impl UnicodeData {
    /// Parse a whole file. An unparsable code point column is an error
    /// naming the 1-based line.
    pub fn parse_str(text: &str) -> std::result::Result<Self, String> {
        let mut rows = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let row = UnicodeDataRow::parse(line).map_err(|e| format!("line {}: {e}", index + 1))?;
            rows.extend(row);
        }
        Ok(Self { rows })
    }

    /// Rows that carry data, with their range and columns.
    pub fn data_rows(&self) -> impl Iterator<Item = (&RangeInclusive<u32>, &[String])> {
        self.rows
            .iter()
            .filter_map(|row| row.data.as_ref().map(|(r, c)| (r, c.as_slice())))
    }
}

impl FromSource for UnicodeData {
    /// Fails on non-UTF-8 content and on files without any rows.
    fn from_source(url: &Url, content: Vec<u8>) -> Result<Self> {
        let text = String::from_utf8(content).map_err(|_| CodeUpdaterError::CannotConvertToString {
            url: url.to_string(),
        })?;
        let data = Self::parse_str(&text).map_err(|e| CodeUpdaterError::unreadable_source(url, e))?;
        if data.rows.is_empty() {
            return Err(CodeUpdaterError::unreadable_source(url, "no data"));
        }
        tracing::debug!(%url, rows = data.rows.len(), "parsed Unicode data source");
        Ok(data)
    }
}
