use anyhow::{Context, Result};
use fhirlake_table::TableSchema;

use crate::cli::SchemaArgs;

/// The bundled Patient schema, as a tree or as its JSON document.
pub fn render(args: &SchemaArgs) -> Result<String> {
    let schema = TableSchema::patient().context("bundled Patient schema is invalid")?;
    if args.json {
        Ok(schema.to_json()?)
    } else {
        Ok(schema.tree_string())
    }
}
