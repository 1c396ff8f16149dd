//! Declarative table schemas.
//!
//! Schemas use the same JSON layout as Spark's `StructType.json()`, so a
//! schema can be exported from an existing lakehouse table and dropped in
//! unchanged:
//!
//! ```json
//! {"type": "struct", "fields": [
//!   {"name": "id", "type": "string", "nullable": true},
//!   {"name": "given", "nullable": true,
//!    "type": {"type": "array", "elementType": "string", "containsNull": true}}
//! ]}
//! ```

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const PATIENT_SCHEMA: &str = include_str!("../schemas/patient.json");

/// The type of a column or nested field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDataType", into = "RawDataType")]
pub enum DataType {
    String,
    /// 32-bit signed integer.
    Integer,
    Boolean,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// Instant in time, stored normalized to UTC.
    Timestamp,
    Struct(StructType),
    Array(Box<ArrayType>),
}

impl DataType {
    /// The name used in serialized schemas and in [`StructType::tree_string`].
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Struct(_) => "struct",
            Self::Array(_) => "array",
        }
    }

    /// Whether values of this type are nested (struct or array).
    pub fn is_nested(&self) -> bool {
        matches!(self, Self::Struct(_) | Self::Array(_))
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "timestamp" => Some(Self::Timestamp),
            _ => None,
        }
    }
}

/// Element type of an array column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayType {
    pub element_type: DataType,
    pub contains_null: bool,
}

/// A named field inside a struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

impl StructField {
    /// A nullable field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

/// An ordered list of fields; also the schema of a whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructType {
    pub fields: Vec<StructField>,
}

impl StructType {
    pub fn new(fields: Vec<StructField>) -> Self {
        Self { fields }
    }

    /// The bundled FHIR R4 `Patient` schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the bundled document does not
    /// parse, which indicates a broken build.
    pub fn patient() -> Result<Self> {
        Self::from_json(PATIENT_SCHEMA)
    }

    /// Parse a schema document whose root is a struct.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the text is not a valid schema or
    /// its root is not a struct.
    pub fn from_json(text: &str) -> Result<Self> {
        let root: DataType =
            serde_json::from_str(text).map_err(|e| Error::InvalidSchema(e.to_string()))?;
        match root {
            DataType::Struct(s) => Ok(s),
            other => Err(Error::InvalidSchema(format!(
                "schema root must be a struct, found {}",
                other.type_name()
            ))),
        }
    }

    /// Serialize as a pretty-printed schema document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&DataType::Struct(self.clone()))?)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a field by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Top-level field names, in order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Merge `incoming` into this schema.
    ///
    /// Existing fields keep their position. Fields only in `incoming` are
    /// appended. When both sides define a field, two structs are merged
    /// recursively; otherwise the incoming definition replaces the old one.
    #[must_use]
    pub fn merge(&self, incoming: &StructType) -> StructType {
        let mut fields = self.fields.clone();
        for new in &incoming.fields {
            match fields.iter_mut().find(|f| f.name == new.name) {
                Some(existing) => {
                    let data_type = match (&existing.data_type, &new.data_type) {
                        (DataType::Struct(old), DataType::Struct(inc)) => {
                            DataType::Struct(old.merge(inc))
                        }
                        (_, inc) => inc.clone(),
                    };
                    existing.data_type = data_type;
                    existing.nullable = existing.nullable || new.nullable;
                }
                None => fields.push(new.clone()),
            }
        }
        StructType { fields }
    }

    /// Render the schema as an indented tree, in the same layout as Spark's
    /// `printSchema()`.
    pub fn tree_string(&self) -> String {
        let mut out = String::from("root\n");
        write_fields(&mut out, &self.fields, 1);
        out
    }
}

fn write_fields(out: &mut String, fields: &[StructField], depth: usize) {
    for field in fields {
        write_node(
            out,
            &field.name,
            &field.data_type,
            "nullable",
            field.nullable,
            depth,
        );
    }
}

fn write_node(
    out: &mut String,
    name: &str,
    data_type: &DataType,
    flag: &str,
    value: bool,
    depth: usize,
) {
    let indent = " |   ".repeat(depth - 1);
    let _ = writeln!(
        out,
        "{indent} |-- {name}: {} ({flag} = {value})",
        data_type.type_name()
    );
    match data_type {
        DataType::Struct(s) => write_fields(out, &s.fields, depth + 1),
        DataType::Array(a) => write_node(
            out,
            "element",
            &a.element_type,
            "containsNull",
            a.contains_null,
            depth + 1,
        ),
        _ => {}
    }
}

fn default_true() -> bool {
    true
}

// Wire form. Primitive types are bare strings, complex types are objects
// tagged by "type".
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawDataType {
    Name(String),
    Complex(ComplexType),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ComplexType {
    Struct {
        fields: Vec<StructField>,
    },
    Array {
        #[serde(rename = "elementType")]
        element_type: DataType,
        #[serde(rename = "containsNull", default = "default_true")]
        contains_null: bool,
    },
}

impl TryFrom<RawDataType> for DataType {
    type Error = String;

    fn try_from(raw: RawDataType) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawDataType::Name(name) => {
                DataType::from_name(&name).ok_or_else(|| format!("unsupported type '{name}'"))
            }
            RawDataType::Complex(ComplexType::Struct { fields }) => {
                Ok(DataType::Struct(StructType { fields }))
            }
            RawDataType::Complex(ComplexType::Array {
                element_type,
                contains_null,
            }) => Ok(DataType::Array(Box::new(ArrayType {
                element_type,
                contains_null,
            }))),
        }
    }
}

impl From<DataType> for RawDataType {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Struct(s) => RawDataType::Complex(ComplexType::Struct { fields: s.fields }),
            DataType::Array(a) => RawDataType::Complex(ComplexType::Array {
                element_type: a.element_type,
                contains_null: a.contains_null,
            }),
            primitive => RawDataType::Name(primitive.type_name().to_string()),
        }
    }
}
