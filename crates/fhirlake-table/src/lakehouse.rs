//! Directory-backed lakehouse tables.
//!
//! A table is a directory holding numbered data files plus the table schema:
//!
//! ```text
//! patients/
//!   _schema.json
//!   part-00000.ndjson
//!   part-00001.ndjson
//! ```
//!
//! Data files are written under a temporary name and renamed into place, so
//! readers never see a partially written part.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[cfg(feature = "parquet")]
use crate::output::{ParquetCompression, ParquetWriter};
use crate::output::{OutputWriter, TableFormat};
use crate::schema::StructType;
use crate::table::Table;
use crate::{Error, Result};

/// Name of the schema document inside a table directory.
pub const SCHEMA_FILE: &str = "_schema.json";

const PART_PREFIX: &str = "part-";

/// What to do when the table already holds data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Replace existing data files.
    #[default]
    Overwrite,
    /// Add a data file next to the existing ones.
    Append,
    /// Fail if any data file exists.
    ErrorIfExists,
}

impl SaveMode {
    /// Parse a save mode name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not recognized.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "append" => Ok(Self::Append),
            "error_if_exists" | "errorifexists" | "error" => Ok(Self::ErrorIfExists),
            _ => Err(Error::Output(format!("Unknown save mode: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Append => "append",
            Self::ErrorIfExists => "error_if_exists",
        }
    }
}

impl std::fmt::Display for SaveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SaveMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Summary of a completed save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// The data file written by this save.
    pub data_file: PathBuf,
    pub rows: usize,
    /// Number of top-level columns in the stored schema after the save.
    pub columns: usize,
    pub mode: SaveMode,
    /// Whether the stored schema changed.
    pub schema_changed: bool,
    /// Data files removed by an overwrite.
    pub replaced_files: usize,
}

/// Somewhere a flattened table can be persisted.
pub trait TableSink: Send + Sync {
    /// Persist `table`.
    fn save(&self, table: &Table) -> Result<SaveReport>;
}

/// A table stored as a directory of data files.
#[derive(Debug, Clone)]
pub struct LakehouseTable {
    root: PathBuf,
    format: TableFormat,
    mode: SaveMode,
    merge_schema: bool,
    #[cfg(feature = "parquet")]
    compression: ParquetCompression,
}

impl LakehouseTable {
    /// A table at `root` with NDJSON data files, overwrite mode and schema
    /// merging enabled.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            format: TableFormat::default(),
            mode: SaveMode::default(),
            merge_schema: true,
            #[cfg(feature = "parquet")]
            compression: ParquetCompression::default(),
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: TableFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SaveMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_merge_schema(mut self, merge_schema: bool) -> Self {
        self.merge_schema = merge_schema;
        self
    }

    /// Codec used when the format is Parquet.
    #[cfg(feature = "parquet")]
    #[must_use]
    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> TableFormat {
        self.format
    }

    pub fn mode(&self) -> SaveMode {
        self.mode
    }

    /// The stored schema, if the table has been written before.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema file exists but cannot be read or
    /// parsed.
    pub fn stored_schema(&self) -> Result<Option<StructType>> {
        let path = self.root.join(SCHEMA_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => StructType::from_json(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::Io { path, source }),
        }
    }

    /// Data files currently in the table, ordered by part number.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn data_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self.parts()?.into_iter().map(|(_, path)| path).collect())
    }

    fn parts(&self) -> Result<Vec<(u32, PathBuf)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(Error::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut parts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::Io {
                path: self.root.clone(),
                source,
            })?;
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(part_index) {
                parts.push((index, entry.path()));
            }
        }
        parts.sort();
        Ok(parts)
    }

    fn resolve_schema(&self, incoming: &StructType) -> Result<(StructType, bool)> {
        let Some(stored) = self.stored_schema()? else {
            return Ok((incoming.clone(), true));
        };

        let target = if self.merge_schema {
            stored.merge(incoming)
        } else if self.mode == SaveMode::Append && &stored != incoming {
            return Err(Error::SchemaMismatch(format!(
                "incoming schema differs from the stored schema of {} and schema merging is disabled",
                self.root.display()
            )));
        } else {
            incoming.clone()
        };

        let changed = target != stored;
        Ok((target, changed))
    }

    fn writer(&self) -> Box<dyn OutputWriter> {
        match self.format {
            #[cfg(feature = "parquet")]
            TableFormat::Parquet => {
                Box::new(ParquetWriter::new().with_compression(self.compression))
            }
            _ => self.format.writer(),
        }
    }

    fn write_data_file(
        &self,
        writer: &dyn OutputWriter,
        table: &Table,
        path: &Path,
    ) -> Result<()> {
        let tmp = tmp_path(path);

        let file = fs::File::create(&tmp).map_err(|source| Error::Io {
            path: tmp.clone(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        writer.write(table, &mut out)?;
        out.flush().map_err(|source| Error::Io {
            path: tmp.clone(),
            source,
        })?;
        drop(out);

        fs::rename(&tmp, path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_schema(&self, schema: &StructType) -> Result<()> {
        let path = self.root.join(SCHEMA_FILE);
        let tmp = tmp_path(&path);
        fs::write(&tmp, schema.to_json()?).map_err(|source| Error::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| Error::Io { path, source })
    }
}

impl TableSink for LakehouseTable {
    fn save(&self, table: &Table) -> Result<SaveReport> {
        fs::create_dir_all(&self.root).map_err(|source| Error::Io {
            path: self.root.clone(),
            source,
        })?;

        let existing = self.parts()?;
        if self.mode == SaveMode::ErrorIfExists && !existing.is_empty() {
            return Err(Error::TableExists(self.root.clone()));
        }

        let (schema, schema_changed) = self.resolve_schema(table.schema())?;
        let table = table.conform_to(&schema);

        let next = match existing.last() {
            Some((i, last)) => i.checked_add(1).ok_or_else(|| {
                Error::Output(format!("no part number left after {}", last.display()))
            })?,
            None => 0,
        };
        let writer = self.writer();
        let data_file = self.root.join(format!(
            "{PART_PREFIX}{next:05}.{}",
            writer.file_extension()
        ));
        self.write_data_file(writer.as_ref(), &table, &data_file)?;

        let mut replaced_files = 0;
        if self.mode == SaveMode::Overwrite {
            for (_, old) in &existing {
                fs::remove_file(old).map_err(|source| Error::Io {
                    path: old.clone(),
                    source,
                })?;
                replaced_files += 1;
            }
        }

        if schema_changed {
            self.write_schema(&schema)?;
        }

        tracing::info!(
            table = %self.root.display(),
            file = %data_file.display(),
            rows = table.row_count(),
            mode = %self.mode,
            format = %self.format,
            schema_changed,
            "table saved"
        );

        Ok(SaveReport {
            data_file,
            rows: table.row_count(),
            columns: schema.len(),
            mode: self.mode,
            schema_changed,
            replaced_files,
        })
    }
}

/// Part number of a data file name like `part-00012.ndjson`.
fn part_index(name: &str) -> Option<u32> {
    let rest = name.strip_prefix(PART_PREFIX)?;
    let (digits, ext) = rest.split_once('.')?;
    if ext.is_empty() || ext.ends_with(".tmp") {
        return None;
    }
    digits.parse().ok()
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_index() {
        assert_eq!(part_index("part-00000.ndjson"), Some(0));
        assert_eq!(part_index("part-00042.parquet"), Some(42));
        assert_eq!(part_index("_schema.json"), None);
        assert_eq!(part_index("part-abc.ndjson"), None);
        assert_eq!(part_index(".part-00001.ndjson.tmp"), None);
        assert_eq!(part_index("part-00001"), None);
    }

    #[test]
    fn test_tmp_path_is_hidden_sibling() {
        assert_eq!(
            tmp_path(Path::new("/data/patients/part-00003.ndjson")),
            PathBuf::from("/data/patients/.part-00003.ndjson.tmp")
        );
    }

    #[test]
    fn test_save_mode_parse() {
        assert_eq!(SaveMode::parse("Overwrite").unwrap(), SaveMode::Overwrite);
        assert_eq!(SaveMode::parse("append").unwrap(), SaveMode::Append);
        assert_eq!(SaveMode::parse("errorifexists").unwrap(), SaveMode::ErrorIfExists);
        assert!(SaveMode::parse("ignore").is_err());
        assert_eq!(SaveMode::ErrorIfExists.to_string(), "error_if_exists");
    }
}
