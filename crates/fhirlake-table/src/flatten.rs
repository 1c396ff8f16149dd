//! Projection of FHIR resources onto a declarative schema.
//!
//! Values are coerced the way a schema-driven JSON reader does it: anything
//! that does not fit the declared type becomes `null` rather than failing
//! the whole row.

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::schema::{DataType, StructType};
use crate::table::Table;

/// Flatten Bundle entries into a table.
///
/// Each entry contributes its `resource` member as one row. Entries without
/// a `resource` object are skipped.
pub fn flatten_entries<'a, I>(entries: I, schema: &StructType) -> Table
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (index, entry) in entries.into_iter().enumerate() {
        match entry.get("resource") {
            Some(resource @ Value::Object(_)) => rows.push(flatten_resource(resource, schema)),
            _ => {
                skipped += 1;
                tracing::warn!(index, "bundle entry has no resource object, skipping");
            }
        }
    }

    tracing::debug!(rows = rows.len(), skipped, "flattened bundle entries");
    Table::new(schema.clone(), rows)
}

/// Project one resource onto the top-level fields of `schema`.
///
/// The returned row has exactly one value per schema field, in schema order.
pub fn flatten_resource(resource: &Value, schema: &StructType) -> Vec<Value> {
    let object = resource.as_object();
    schema
        .fields
        .iter()
        .map(|field| {
            object
                .and_then(|o| o.get(&field.name))
                .map(|v| coerce(v, &field.data_type))
                .unwrap_or(Value::Null)
        })
        .collect()
}

/// Coerce a JSON value to `data_type`, or `null` if it does not fit.
pub fn coerce(value: &Value, data_type: &DataType) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match data_type {
        DataType::String => match value {
            Value::String(_) => value.clone(),
            other => Value::String(other.to_string()),
        },
        DataType::Integer => value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::from)
            .unwrap_or(Value::Null),
        DataType::Boolean => value.as_bool().map(Value::Bool).unwrap_or(Value::Null),
        DataType::Date => value
            .as_str()
            .and_then(parse_date)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        DataType::Timestamp => value
            .as_str()
            .and_then(parse_timestamp)
            .and_then(|ts| ts.format(&Rfc3339).ok())
            .map(Value::String)
            .unwrap_or(Value::Null),
        DataType::Struct(fields) => match value {
            Value::Object(object) => Value::Object(project_object(object, fields)),
            _ => Value::Null,
        },
        DataType::Array(array) => match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| coerce(item, &array.element_type))
                    .collect(),
            ),
            _ => Value::Null,
        },
    }
}

fn project_object(object: &Map<String, Value>, schema: &StructType) -> Map<String, Value> {
    schema
        .fields
        .iter()
        .map(|field| {
            let value = object
                .get(&field.name)
                .map(|v| coerce(v, &field.data_type))
                .unwrap_or(Value::Null);
            (field.name.clone(), value)
        })
        .collect()
}

/// `YYYY-MM-DD`, or the date part of an RFC 3339 date-time as written.
pub(crate) fn parse_date(text: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text, &format)
        .ok()
        .or_else(|| OffsetDateTime::parse(text, &Rfc3339).ok().map(|ts| ts.date()))
}

/// An RFC 3339 date-time, or a bare date as midnight, normalized to UTC.
pub(crate) fn parse_timestamp(text: &str) -> Option<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(ts.to_offset(UtcOffset::UTC));
    }
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text, &format)
        .ok()
        .map(|d| d.midnight().assume_utc())
}
