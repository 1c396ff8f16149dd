use serde_json::{Map, Value};

use crate::schema::StructType;

/// Rows projected onto a schema.
///
/// Every row holds exactly one value per top-level schema field, in schema
/// order. Nested values are JSON objects and arrays shaped by the field type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    schema: StructType,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table. Short rows are padded with nulls and long rows truncated
    /// so every row matches the schema width.
    pub fn new(schema: StructType, mut rows: Vec<Vec<Value>>) -> Self {
        let width = schema.len();
        for row in &mut rows {
            row.resize(width, Value::Null);
        }
        Self { schema, rows }
    }

    pub fn schema(&self) -> &StructType {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one top-level column.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let index = self.schema.index_of(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    /// Re-shape the table onto `target`, which must be a superset or
    /// reordering of the current top-level fields. Columns missing from the
    /// current schema are filled with nulls.
    #[must_use]
    pub fn conform_to(&self, target: &StructType) -> Table {
        let positions: Vec<Option<usize>> = target
            .fields
            .iter()
            .map(|f| self.schema.index_of(&f.name))
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|p| p.map(|i| row[i].clone()).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Table {
            schema: target.clone(),
            rows,
        }
    }

    /// Each row as a JSON object keyed by field name.
    pub fn to_json_rows(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .schema
                    .fields
                    .iter()
                    .zip(row)
                    .map(|(f, v)| (f.name.clone(), v.clone()))
                    .collect();
                Value::Object(object)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, StructField};
    use serde_json::json;

    fn schema(names: &[&str]) -> StructType {
        StructType::new(
            names
                .iter()
                .map(|n| StructField::new(*n, DataType::String))
                .collect(),
        )
    }

    #[test]
    fn test_rows_match_schema_width() {
        let table = Table::new(
            schema(&["id", "gender"]),
            vec![vec![json!("a")], vec![json!("b"), json!("male"), json!("extra")]],
        );
        assert_eq!(table.rows()[0], vec![json!("a"), Value::Null]);
        assert_eq!(table.rows()[1], vec![json!("b"), json!("male")]);
    }

    #[test]
    fn test_column() {
        let table = Table::new(
            schema(&["id", "gender"]),
            vec![vec![json!("a"), json!("female")], vec![json!("b"), Value::Null]],
        );
        let genders: Vec<&Value> = table.column("gender").unwrap().collect();
        assert_eq!(genders, vec![&json!("female"), &Value::Null]);
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_conform_to() {
        let table = Table::new(schema(&["id", "gender"]), vec![vec![json!("a"), json!("male")]]);
        let target = schema(&["legacy", "id", "gender", "birthDate"]);

        let conformed = table.conform_to(&target);
        assert_eq!(conformed.schema(), &target);
        assert_eq!(
            conformed.rows()[0],
            vec![Value::Null, json!("a"), json!("male"), Value::Null]
        );
    }

    #[test]
    fn test_to_json_rows() {
        let table = Table::new(schema(&["id", "gender"]), vec![vec![json!("a"), Value::Null]]);
        assert_eq!(table.to_json_rows(), vec![json!({"id": "a", "gender": null})]);
    }
}
