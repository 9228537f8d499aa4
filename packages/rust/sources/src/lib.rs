//! Source representation adapters.
//!
//! A target declares how each fetched source is read before conversion:
//! - `Vec<u8>`: the raw bytes
//! - `String`: UTF-8 text
//! - [`CsvTable`]: CSV rows, with optional header name lookup
//! - [`UnicodeData`]: UCD-style `range ; column ; ... # comment` rows

pub mod csv_table;
pub mod unicode_data;

pub use csv_table::{CsvOptions, CsvRow, CsvTable};
pub use unicode_data::{UnicodeData, UnicodeDataRow};

use codeupdater_shared::{CodeUpdaterError, Result};
use url::Url;

/// Builds a representation from the fetched content of one source.
pub trait FromSource: Sized {
    fn from_source(url: &Url, content: Vec<u8>) -> Result<Self>;
}

impl FromSource for Vec<u8> {
    fn from_source(_url: &Url, content: Vec<u8>) -> Result<Self> {
        Ok(content)
    }
}

impl FromSource for String {
    fn from_source(url: &Url, content: Vec<u8>) -> Result<Self> {
        String::from_utf8(content).map_err(|_| CodeUpdaterError::CannotConvertToString {
            url: url.to_string(),
        })
    }
}
