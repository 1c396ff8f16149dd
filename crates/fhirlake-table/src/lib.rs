//! Tabular storage for FHIR resources.
//!
//! Resources pulled from a FHIR server are projected onto a declarative,
//! Spark-compatible schema and written to a directory-backed lakehouse table.
//!
//! # Components
//!
//! - [`TableSchema`] - schema document with merge and tree rendering
//! - [`flatten_entries`] - Bundle entries to a [`Table`]
//! - [`LakehouseTable`] - [`TableSink`] writing NDJSON or Parquet data files
//!
//! # Example
//!
//! ```no_run
//! use fhirlake_table::{LakehouseTable, TableSchema, TableSink, flatten_entries};
//! use serde_json::json;
//!
//! let schema = TableSchema::patient()?;
//! let entries = vec![json!({"resource": {"resourceType": "Patient", "id": "p1"}})];
//! let table = flatten_entries(&entries, &schema);
//!
//! let report = LakehouseTable::new("lake/patients").save(&table)?;
//! println!("wrote {} rows to {}", report.rows, report.data_file.display());
//! # Ok::<(), fhirlake_table::Error>(())
//! ```

mod flatten;
pub mod lakehouse;
pub mod output;
mod schema;
mod table;

pub use flatten::{coerce, flatten_entries, flatten_resource};
pub use lakehouse::{LakehouseTable, SaveMode, SaveReport, TableSink};
pub use output::{OutputWriter, TableFormat};
pub use schema::{ArrayType, DataType, StructField, StructType};
pub use table::Table;

use std::path::PathBuf;

use thiserror::Error;

/// A whole-table schema.
pub type TableSchema = StructType;

/// Errors raised while building or persisting tables.
#[derive(Debug, Error)]
pub enum Error {
    /// The schema document is invalid.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// An error occurred while encoding a data file.
    #[error("Output error: {0}")]
    Output(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The save mode forbids writing into a table that already has data.
    #[error("Table already exists: {0}")]
    TableExists(PathBuf),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
