//! Data file encoders for table storage.
//!
//! - NDJSON (always available)
//! - Parquet (when the `parquet` feature is enabled)

mod ndjson;

pub use ndjson::NdjsonWriter;

#[cfg(feature = "parquet")]
mod parquet_writer;

#[cfg(feature = "parquet")]
pub use parquet_writer::{ParquetCompression, ParquetWriter};

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::table::Table;
use crate::{Error, Result};

/// Encodes a table into a single data file.
pub trait OutputWriter: Send + Sync {
    /// File extension used for data files, without the dot.
    fn file_extension(&self) -> &'static str;

    /// Encode every row of `table` to `output`.
    fn write(&self, table: &Table, output: &mut dyn Write) -> Result<()>;
}

/// Data file format of a lakehouse table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    /// Newline-delimited JSON.
    #[default]
    Ndjson,

    /// Apache Parquet (requires `parquet` feature).
    #[cfg(feature = "parquet")]
    Parquet,
}

impl TableFormat {
    /// Parse a format name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not recognized or the format is not
    /// compiled in.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            #[cfg(feature = "parquet")]
            "parquet" => Ok(Self::Parquet),
            _ => Err(Error::Output(format!("Unknown format: {}", s))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ndjson => "ndjson",
            #[cfg(feature = "parquet")]
            Self::Parquet => "parquet",
        }
    }

    /// The encoder for this format, with default settings.
    pub fn writer(&self) -> Box<dyn OutputWriter> {
        match self {
            Self::Ndjson => Box::new(NdjsonWriter::new()),
            #[cfg(feature = "parquet")]
            Self::Parquet => Box::new(ParquetWriter::new()),
        }
    }
}

impl std::fmt::Display for TableFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for TableFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(TableFormat::parse("ndjson").unwrap(), TableFormat::Ndjson);
        assert_eq!(TableFormat::parse("JSONL").unwrap(), TableFormat::Ndjson);
        assert!(TableFormat::parse("delta").is_err());
        assert_eq!(TableFormat::default().to_string(), "ndjson");
    }

    #[cfg(feature = "parquet")]
    #[test]
    fn test_parse_parquet() {
        let format: TableFormat = "parquet".parse().unwrap();
        assert_eq!(format.writer().file_extension(), "parquet");
    }
}
