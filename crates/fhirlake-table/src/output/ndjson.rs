//! NDJSON data files.

use std::io::Write;

use serde_json::Value;

use super::OutputWriter;
use crate::schema::StructType;
use crate::table::Table;
use crate::{Error, Result};

/// Writes each row as one JSON object per line.
///
/// Top-level null columns are omitted from the object, matching how JSON
/// data sources write sparse rows.
#[derive(Debug, Clone, Default)]
pub struct NdjsonWriter;

impl NdjsonWriter {
    pub fn new() -> Self {
        Self
    }

    fn row_to_object(schema: &StructType, row: &[Value]) -> Value {
        let mut obj = serde_json::Map::new();
        for (field, value) in schema.fields.iter().zip(row.iter()) {
            if !value.is_null() {
                obj.insert(field.name.clone(), value.clone());
            }
        }
        Value::Object(obj)
    }
}

impl OutputWriter for NdjsonWriter {
    fn file_extension(&self) -> &'static str {
        "ndjson"
    }

    fn write(&self, table: &Table, output: &mut dyn Write) -> Result<()> {
        for row in table.rows() {
            let obj = Self::row_to_object(table.schema(), row);
            let line = serde_json::to_string(&obj).map_err(|e| Error::Output(e.to_string()))?;
            writeln!(output, "{}", line).map_err(|e| Error::Output(e.to_string()))?;
        }
        output.flush().map_err(|e| Error::Output(e.to_string()))?;
        Ok(())
    }
}
