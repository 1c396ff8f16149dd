//! Save modes and schema evolution of directory-backed tables.

use std::fs;
use std::path::Path;

use fhirlake_table::lakehouse::SCHEMA_FILE;
use fhirlake_table::{
    DataType, Error, LakehouseTable, SaveMode, StructField, StructType, Table, TableSink,
};
use serde_json::{Value, json};
use tempfile::TempDir;

fn schema(fields: &[(&str, DataType)]) -> StructType {
    StructType::new(
        fields
            .iter()
            .map(|(name, ty)| StructField::new(*name, ty.clone()))
            .collect(),
    )
}

fn id_gender_table(rows: &[(&str, &str)]) -> Table {
    Table::new(
        schema(&[("id", DataType::String), ("gender", DataType::String)]),
        rows.iter()
            .map(|(id, gender)| vec![json!(id), json!(gender)])
            .collect(),
    )
}

fn read_ndjson(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn all_rows(table: &LakehouseTable) -> Vec<Value> {
    table
        .data_files()
        .unwrap()
        .iter()
        .flat_map(|p| read_ndjson(p))
        .collect()
}

#[test]
fn test_first_save_creates_table() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("patients");
    let lake = LakehouseTable::new(&root);

    let report = lake.save(&id_gender_table(&[("a", "male"), ("b", "female")])).unwrap();

    assert_eq!(report.rows, 2);
    assert_eq!(report.columns, 2);
    assert_eq!(report.mode, SaveMode::Overwrite);
    assert!(report.schema_changed);
    assert_eq!(report.replaced_files, 0);
    assert_eq!(report.data_file, root.join("part-00000.ndjson"));

    assert!(root.join(SCHEMA_FILE).exists());
    assert_eq!(
        lake.stored_schema().unwrap().unwrap().field_names(),
        vec!["id", "gender"]
    );
    assert_eq!(
        read_ndjson(&report.data_file),
        vec![
            json!({"id": "a", "gender": "male"}),
            json!({"id": "b", "gender": "female"})
        ]
    );
}

#[test]
fn test_overwrite_replaces_data() {
    let dir = TempDir::new().unwrap();
    let lake = LakehouseTable::new(dir.path());

    lake.save(&id_gender_table(&[("a", "male"), ("b", "female")])).unwrap();
    let report = lake.save(&id_gender_table(&[("c", "other")])).unwrap();

    assert_eq!(report.replaced_files, 1);
    assert!(!report.schema_changed);
    assert_eq!(lake.data_files().unwrap(), vec![report.data_file.clone()]);
    assert_eq!(all_rows(&lake), vec![json!({"id": "c", "gender": "other"})]);
}

#[test]
fn test_append_adds_part() {
    let dir = TempDir::new().unwrap();
    let lake = LakehouseTable::new(dir.path()).with_mode(SaveMode::Append);

    lake.save(&id_gender_table(&[("a", "male")])).unwrap();
    let report = lake.save(&id_gender_table(&[("b", "female")])).unwrap();

    assert_eq!(report.data_file, dir.path().join("part-00001.ndjson"));
    assert_eq!(lake.data_files().unwrap().len(), 2);
    assert_eq!(
        all_rows(&lake),
        vec![
            json!({"id": "a", "gender": "male"}),
            json!({"id": "b", "gender": "female"})
        ]
    );
}

#[test]
fn test_error_if_exists() {
    let dir = TempDir::new().unwrap();
    let lake = LakehouseTable::new(dir.path()).with_mode(SaveMode::ErrorIfExists);

    lake.save(&id_gender_table(&[("a", "male")])).unwrap();
    let err = lake.save(&id_gender_table(&[("b", "female")])).unwrap_err();

    assert!(matches!(err, Error::TableExists(_)));
    assert_eq!(lake.data_files().unwrap().len(), 1);
}

#[test]
fn test_merge_schema_appends_new_columns() {
    let dir = TempDir::new().unwrap();
    let lake = LakehouseTable::new(dir.path()).with_mode(SaveMode::Append);

    lake.save(&id_gender_table(&[("a", "male")])).unwrap();

    let wider = Table::new(
        schema(&[
            ("id", DataType::String),
            ("birthDate", DataType::Date),
        ]),
        vec![vec![json!("b"), json!("1990-04-01")]],
    );
    let report = lake.save(&wider).unwrap();

    assert!(report.schema_changed);
    assert_eq!(report.columns, 3);
    assert_eq!(
        lake.stored_schema().unwrap().unwrap().field_names(),
        vec!["id", "gender", "birthDate"]
    );
    // columns absent from the incoming table are written as missing
    assert_eq!(
        read_ndjson(&report.data_file),
        vec![json!({"id": "b", "birthDate": "1990-04-01"})]
    );
}

#[test]
fn test_append_without_merge_rejects_different_schema() {
    let dir = TempDir::new().unwrap();
    let lake = LakehouseTable::new(dir.path())
        .with_mode(SaveMode::Append)
        .with_merge_schema(false);

    lake.save(&id_gender_table(&[("a", "male")])).unwrap();

    let other = Table::new(
        schema(&[("id", DataType::String)]),
        vec![vec![json!("b")]],
    );
    let err = lake.save(&other).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(_)));

    // same schema is fine
    lake.save(&id_gender_table(&[("c", "female")])).unwrap();
    assert_eq!(lake.data_files().unwrap().len(), 2);
}

#[test]
fn test_overwrite_without_merge_replaces_schema() {
    let dir = TempDir::new().unwrap();
    let lake = LakehouseTable::new(dir.path()).with_merge_schema(false);

    lake.save(&id_gender_table(&[("a", "male")])).unwrap();
    let narrow = Table::new(schema(&[("id", DataType::String)]), vec![vec![json!("b")]]);
    lake.save(&narrow).unwrap();

    assert_eq!(
        lake.stored_schema().unwrap().unwrap().field_names(),
        vec!["id"]
    );
}

#[test]
fn test_empty_table_still_writes_schema() {
    let dir = TempDir::new().unwrap();
    let lake = LakehouseTable::new(dir.path());

    let report = lake.save(&id_gender_table(&[])).unwrap();

    assert_eq!(report.rows, 0);
    assert!(dir.path().join(SCHEMA_FILE).exists());
    assert!(read_ndjson(&report.data_file).is_empty());
}

#[test]
fn test_stray_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("README.txt"), "notes").unwrap();
    fs::write(dir.path().join(".part-00007.ndjson.tmp"), "garbage").unwrap();

    let lake = LakehouseTable::new(dir.path());
    let report = lake.save(&id_gender_table(&[("a", "male")])).unwrap();

    assert_eq!(report.data_file, dir.path().join("part-00000.ndjson"));
    assert_eq!(report.replaced_files, 0);
    assert!(dir.path().join("README.txt").exists());
}

#[test]
fn test_exhausted_part_numbers_fail_without_data_loss() {
    let dir = TempDir::new().unwrap();
    let last = dir.path().join("part-4294967295.ndjson");
    fs::write(&last, "{\"id\":\"old\"}\n").unwrap();

    let lake = LakehouseTable::new(dir.path());
    let err = lake.save(&id_gender_table(&[("a", "male")])).unwrap_err();

    assert!(matches!(err, Error::Output(_)));
    assert_eq!(lake.data_files().unwrap(), vec![last.clone()]);
    assert_eq!(read_ndjson(&last), vec![json!({"id": "old"})]);
}

#[cfg(feature = "parquet")]
#[test]
fn test_parquet_table() {
    use fhirlake_table::TableFormat;

    let dir = TempDir::new().unwrap();
    let lake = LakehouseTable::new(dir.path()).with_format(TableFormat::Parquet);

    let report = lake.save(&id_gender_table(&[("a", "male")])).unwrap();
    assert_eq!(report.data_file, dir.path().join("part-00000.parquet"));
    assert_eq!(&fs::read(&report.data_file).unwrap()[..4], b"PAR1");
}

#[cfg(feature = "parquet")]
#[test]
fn test_parquet_compression_is_applied() {
    use fhirlake_table::TableFormat;
    use fhirlake_table::output::ParquetCompression;
    use parquet::basic::Compression;
    use parquet::file::reader::{FileReader, SerializedFileReader};

    let dir = TempDir::new().unwrap();
    let lake = LakehouseTable::new(dir.path())
        .with_format(TableFormat::Parquet)
        .with_compression(ParquetCompression::Zstd);

    let report = lake.save(&id_gender_table(&[("a", "male")])).unwrap();
    let reader = SerializedFileReader::new(fs::File::open(&report.data_file).unwrap()).unwrap();
    let column = reader.metadata().row_group(0).column(0);
    assert!(matches!(column.compression(), Compression::ZSTD(_)));
}
