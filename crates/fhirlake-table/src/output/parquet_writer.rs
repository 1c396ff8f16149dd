//! Parquet data files.
//!
//! This module is only available when the `parquet` feature is enabled.

use std::io::Write;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Int32Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::OutputWriter;
use crate::flatten::{parse_date, parse_timestamp};
use crate::schema::DataType;
use crate::table::Table;
use crate::{Error, Result};

/// Parquet compression codecs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    None,
    #[default]
    Snappy,
    Gzip,
    Lz4,
    Zstd,
}

impl From<ParquetCompression> for Compression {
    fn from(compression: ParquetCompression) -> Self {
        match compression {
            ParquetCompression::None => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(Default::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
            ParquetCompression::Zstd => Compression::ZSTD(Default::default()),
        }
    }
}

/// Writes a table as a single Parquet row group.
///
/// Primitive columns get native Parquet types (dates as `DATE`, timestamps
/// as UTC microseconds). Struct and array columns are stored as JSON text.
#[derive(Debug, Clone, Default)]
pub struct ParquetWriter {
    pub compression: ParquetCompression,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    fn column_array(data_type: &DataType, values: &[Option<&Value>]) -> ArrayRef {
        match data_type {
            DataType::Integer => {
                let arr: Int32Array = values
                    .iter()
                    .map(|v| v.and_then(|v| v.as_i64()).and_then(|n| i32::try_from(n).ok()))
                    .collect();
                Arc::new(arr)
            }
            DataType::Boolean => {
                let arr: BooleanArray =
                    values.iter().map(|v| v.and_then(|v| v.as_bool())).collect();
                Arc::new(arr)
            }
            DataType::Date => {
                let epoch = OffsetDateTime::UNIX_EPOCH.date().to_julian_day();
                let arr: Date32Array = values
                    .iter()
                    .map(|v| {
                        v.and_then(|v| v.as_str())
                            .and_then(parse_date)
                            .map(|d| d.to_julian_day() - epoch)
                    })
                    .collect();
                Arc::new(arr)
            }
            DataType::Timestamp => {
                let arr: TimestampMicrosecondArray = values
                    .iter()
                    .map(|v| {
                        v.and_then(|v| v.as_str())
                            .and_then(parse_timestamp)
                            .and_then(|ts| i64::try_from(ts.unix_timestamp_nanos() / 1_000).ok())
                    })
                    .collect();
                Arc::new(arr.with_timezone("UTC"))
            }
            DataType::String | DataType::Struct(_) | DataType::Array(_) => {
                let arr: StringArray = values
                    .iter()
                    .map(|v| {
                        v.map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                    })
                    .collect();
                Arc::new(arr)
            }
        }
    }

    fn build_batch(table: &Table) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(table.schema().len());
        let mut arrays = Vec::with_capacity(table.schema().len());

        for (i, field) in table.schema().fields.iter().enumerate() {
            let values: Vec<Option<&Value>> = table
                .rows()
                .iter()
                .map(|row| row.get(i).filter(|v| !v.is_null()))
                .collect();
            let array = Self::column_array(&field.data_type, &values);
            // Nullability is relaxed: coercion can null out any column.
            fields.push(Field::new(&field.name, array.data_type().clone(), true));
            arrays.push(array);
        }

        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map_err(|e| Error::Output(format!("Failed to create record batch: {}", e)))
    }

    fn write_to_buffer(&self, table: &Table) -> Result<Vec<u8>> {
        let batch = Self::build_batch(table)?;

        let mut buffer = Vec::new();
        {
            let props = WriterProperties::builder()
                .set_compression(self.compression.into())
                .build();

            let mut arrow_writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
                .map_err(|e| Error::Output(format!("Failed to create Parquet writer: {}", e)))?;

            arrow_writer
                .write(&batch)
                .map_err(|e| Error::Output(format!("Failed to write record batch: {}", e)))?;

            arrow_writer
                .close()
                .map_err(|e| Error::Output(format!("Failed to close Parquet writer: {}", e)))?;
        }

        Ok(buffer)
    }
}

impl OutputWriter for ParquetWriter {
    fn file_extension(&self) -> &'static str {
        "parquet"
    }

    fn write(&self, table: &Table, output: &mut dyn Write) -> Result<()> {
        let buffer = self.write_to_buffer(table)?;
        output
            .write_all(&buffer)
            .map_err(|e| Error::Output(e.to_string()))?;
        output.flush().map_err(|e| Error::Output(e.to_string()))?;
        Ok(())
    }
}
