//! CSV sources.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use codeupdater_shared::{CodeUpdaterError, Result};
use url::Url;

use crate::FromSource;

/// Reader settings for CSV sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    /// Treat the first row as column names.
    pub has_header: bool,
    /// Field delimiter.
    pub delimiter: u8,
    /// Trim surrounding whitespace from fields.
    pub trim: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_header: false,
            delimiter: b',',
            trim: true,
        }
    }
}

impl CsvOptions {
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// One data row. Fields are addressable by position, or by column name when
/// the table was read with a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    fields: Vec<String>,
    names: Option<Arc<HashMap<String, usize>>>,
}

impl CsvRow {
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Field in the column named `name`.
    pub fn by_name(&self, name: &str) -> Option<&str> {
        let index = *self.names.as_ref()?.get(name)?;
        self.get(index)
    }
}

impl fmt::Display for CsvRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fields.join(","))
    }
}

/// A parsed CSV source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub header: Option<Vec<String>>,
    pub rows: Vec<CsvRow>,
}

impl CsvTable {
    /// Parse `content` fetched from `url` with explicit options.
    pub fn parse(url: &Url, content: &[u8], options: &CsvOptions) -> Result<Self> {
        let invalid = |e: csv::Error| CodeUpdaterError::unreadable_source(url, e.to_string());

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(options.has_header)
            .delimiter(options.delimiter)
            .trim(if options.trim {
                csv::Trim::All
            } else {
                csv::Trim::None
            })
            .flexible(true)
            .from_reader(content);

        let header = if options.has_header {
            let record = reader.headers().map_err(invalid)?;
            Some(record.iter().map(str::to_string).collect::<Vec<_>>())
        } else {
            None
        };

        let names = header.as_ref().map(|columns| {
            let mut table = HashMap::with_capacity(columns.len());
            for (index, name) in columns.iter().enumerate() {
                table.entry(name.clone()).or_insert(index);
            }
            Arc::new(table)
        });

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(invalid)?;
            rows.push(CsvRow {
                fields: record.iter().map(str::to_string).collect(),
                names: names.clone(),
            });
        }

        tracing::debug!(%url, rows = rows.len(), "parsed CSV source");
        Ok(Self { header, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromSource for CsvTable {
    /// Headerless, comma-delimited, trimmed.
    fn from_source(url: &Url, content: Vec<u8>) -> Result<Self> {
        Self::parse(url, &content, &CsvOptions::default())
    }
}
