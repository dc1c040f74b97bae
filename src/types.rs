//! Canonical column types and the schema-carrying records handed to callers.
//!
//! Engine batches are Arrow-typed; callers only ever see the four canonical
//! types below, plus tagged [`Value`]s that are checked against them when a
//! [`ResultBatch`] is built.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use duckdb::arrow::datatypes::DataType;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::error::DataSourceError;
use crate::sql::translate::StructuredQuery;

/// Normalised column type exposed regardless of the engine-native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    Number,
    Boolean,
    Datetime,
    String,
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            CanonicalType::Number => "number",
            CanonicalType::Boolean => "boolean",
            CanonicalType::Datetime => "datetime",
            CanonicalType::String => "string",
        };
        f.write_str(tag)
    }
}

/// Map an Arrow column type onto its canonical tag.
pub fn canonicalize(data_type: &DataType) -> CanonicalType {
    match data_type {
        dt if dt.is_integer() || dt.is_floating() => CanonicalType::Number,
        DataType::Decimal128(..) | DataType::Decimal256(..) => CanonicalType::Number,
        DataType::Boolean => CanonicalType::Boolean,
        DataType::Date32
        | DataType::Date64
        | DataType::Time32(_)
        | DataType::Time64(_)
        | DataType::Timestamp(..) => CanonicalType::Datetime,
        DataType::Dictionary(_, value_type) => canonicalize(value_type),
        _ => CanonicalType::String,
    }
}

/// Canonical tag for a DuckDB type name as reported by `INFORMATION_SCHEMA`.
///
/// Parameterised names (`DECIMAL(18,3)`, `VARCHAR(10)`) are classified by their
/// base name. Nested, enum and user types fall back to `string`.
pub fn canonicalize_type_name(duckdb_type: &str) -> CanonicalType {
    let upper = duckdb_type.trim().to_uppercase();
    if upper.ends_with(']') {
        return CanonicalType::String;
    }
    let base = upper.split('(').next().unwrap_or_default().trim();
    match base {
        "TINYINT" | "SMALLINT" | "INTEGER" | "BIGINT" | "HUGEINT" | "UTINYINT"
        | "USMALLINT" | "UINTEGER" | "UBIGINT" | "UHUGEINT" | "INT" | "INT1" | "INT2"
        | "INT4" | "INT8" | "SHORT" | "LONG" | "SIGNED" | "FLOAT" | "FLOAT4" | "FLOAT8"
        | "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "DECIMAL" | "NUMERIC" => {
            CanonicalType::Number
        }
        "BOOLEAN" | "BOOL" | "LOGICAL" => CanonicalType::Boolean,
        "DATE" | "TIME" | "TIMETZ" | "TIME WITH TIME ZONE" | "TIMESTAMP" | "DATETIME"
        | "TIMESTAMP_S" | "TIMESTAMP_MS" | "TIMESTAMP_NS" | "TIMESTAMPTZ"
        | "TIMESTAMP WITH TIME ZONE" => CanonicalType::Datetime,
        _ => CanonicalType::String,
    }
}

/// Column descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: CanonicalType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i64>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, data_type: CanonicalType) -> Self {
        Self {
            name: name.into(),
            data_type,
            default: None,
            max_size: None,
        }
    }
}

/// A single cell, tagged with the shape it was decoded into.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    String(String),
}

impl Value {
    /// Canonical type of the value; `None` for SQL NULL.
    pub fn canonical_type(&self) -> Option<CanonicalType> {
        match self {
            Value::Null => None,
            Value::Int(_) | Value::UInt(_) | Value::Float(_) => Some(CanonicalType::Number),
            Value::Boolean(_) => Some(CanonicalType::Boolean),
            Value::Date(_) | Value::DateTime(_) | Value::Time(_) => Some(CanonicalType::Datetime),
            Value::String(_) => Some(CanonicalType::String),
        }
    }

    /// NULL conforms to every column type.
    pub fn conforms_to(&self, expected: CanonicalType) -> bool {
        self.canonical_type().is_none_or(|actual| actual == expected)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::UInt(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::Date(v) => serializer.collect_str(&v.format("%Y-%m-%d")),
            Value::DateTime(v) => serializer.collect_str(&v.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Time(v) => serializer.collect_str(&v.format("%H:%M:%S%.f")),
            Value::String(v) => serializer.serialize_str(v),
        }
    }
}

/// One output row. `index` is the row's position within the batch it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub index: usize,
    pub values: Vec<Value>,
}

/// One chunk of query output together with its column descriptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultBatch {
    pub columns: Vec<FieldInfo>,
    pub values: Vec<Record>,
}

impl ResultBatch {
    /// Build a batch, checking every record against the column list.
    pub fn try_new(columns: Vec<FieldInfo>, values: Vec<Record>) -> Result<Self, DataSourceError> {
        for record in &values {
            if record.values.len() != columns.len() {
                return Err(DataSourceError::Internal(format!(
                    "record {} has {} values but batch has {} columns",
                    record.index,
                    record.values.len(),
                    columns.len()
                )));
            }
            for (value, column) in record.values.iter().zip(&columns) {
                if !value.conforms_to(column.data_type) {
                    return Err(DataSourceError::Internal(format!(
                        "value {:?} in column {} does not conform to {}",
                        value, column.name, column.data_type
                    )));
                }
            }
        }
        Ok(Self { columns, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Value of `column` in the row at `row`, if both exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.values.get(row)?.values.get(idx)
    }

    /// JSON rendering: `{"columns": [...], "values": [{"_index": 0, ...}]}`.
    pub fn to_json(&self) -> Result<serde_json::Value, DataSourceError> {
        serde_json::to_value(self)
            .map_err(|err| DataSourceError::Internal(format!("failed to render batch: {err}")))
    }
}

struct RecordView<'a> {
    columns: &'a [FieldInfo],
    record: &'a Record,
}

impl Serialize for RecordView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + 1))?;
        map.serialize_entry("_index", &self.record.index)?;
        for (column, value) in self.columns.iter().zip(&self.record.values) {
            map.serialize_entry(&column.name, value)?;
        }
        map.end()
    }
}

impl Serialize for ResultBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<RecordView<'_>> = self
            .values
            .iter()
            .map(|record| RecordView {
                columns: &self.columns,
                record,
            })
            .collect();
        let mut state = serializer.serialize_struct("ResultBatch", 2)?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("values", &rows)?;
        state.end()
    }
}

/// "Select everything from this table" descriptor synthesised from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub namespace: Vec<String>,
    pub schema: Vec<FieldInfo>,
    pub query: StructuredQuery,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use duckdb::arrow::datatypes::{IntervalUnit, TimeUnit};

    #[test]
    fn canonicalize_partitions_native_categories() {
        assert_eq!(canonicalize(&DataType::Int32), CanonicalType::Number);
        assert_eq!(canonicalize(&DataType::UInt64), CanonicalType::Number);
        assert_eq!(canonicalize(&DataType::Float64), CanonicalType::Number);
        assert_eq!(
            canonicalize(&DataType::Decimal128(18, 3)),
            CanonicalType::Number
        );
        assert_eq!(canonicalize(&DataType::Boolean), CanonicalType::Boolean);
        assert_eq!(canonicalize(&DataType::Date32), CanonicalType::Datetime);
        assert_eq!(
            canonicalize(&DataType::Timestamp(TimeUnit::Microsecond, None)),
            CanonicalType::Datetime
        );
        assert_eq!(canonicalize(&DataType::Utf8), CanonicalType::String);
        assert_eq!(canonicalize(&DataType::Binary), CanonicalType::String);
        assert_eq!(
            canonicalize(&DataType::Interval(IntervalUnit::MonthDayNano)),
            CanonicalType::String
        );
    }

    #[test]
    fn dictionary_columns_use_their_value_type() {
        let dict = DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8));
        assert_eq!(canonicalize(&dict), CanonicalType::String);
    }

    #[test]
    fn duckdb_type_names_canonicalize() {
        assert_eq!(canonicalize_type_name("INTEGER"), CanonicalType::Number);
        assert_eq!(canonicalize_type_name("DECIMAL(18,3)"), CanonicalType::Number);
        assert_eq!(canonicalize_type_name("boolean"), CanonicalType::Boolean);
        assert_eq!(canonicalize_type_name("DATE"), CanonicalType::Datetime);
        assert_eq!(
            canonicalize_type_name("TIMESTAMP WITH TIME ZONE"),
            CanonicalType::Datetime
        );
        assert_eq!(canonicalize_type_name("VARCHAR"), CanonicalType::String);
        assert_eq!(canonicalize_type_name("NUMERIC(60,5)"), CanonicalType::Number);
        assert_eq!(canonicalize_type_name("HUGEINT"), CanonicalType::Number);
        assert_eq!(canonicalize_type_name("time"), CanonicalType::Datetime);
        assert_eq!(canonicalize_type_name("INTERVAL"), CanonicalType::String);
        assert_eq!(canonicalize_type_name("INTEGER[]"), CanonicalType::String);
        assert_eq!(
            canonicalize_type_name("STRUCT(a INTEGER)"),
            CanonicalType::String
        );
    }

    #[test]
    fn try_new_rejects_misaligned_and_mistyped_records() {
        let columns = vec![FieldInfo::new("n", CanonicalType::Number)];
        let short = ResultBatch::try_new(
            columns.clone(),
            vec![Record {
                index: 0,
                values: vec![],
            }],
        );
        assert!(short.is_err());

        let mistyped = ResultBatch::try_new(
            columns.clone(),
            vec![Record {
                index: 0,
                values: vec![Value::from("nope")],
            }],
        );
        assert!(mistyped.is_err());

        let nulls = ResultBatch::try_new(
            columns,
            vec![Record {
                index: 0,
                values: vec![Value::Null],
            }],
        );
        assert!(nulls.is_ok());
    }

    #[test]
    fn batch_json_carries_synthetic_index() -> Result<()> {
        let batch = ResultBatch::try_new(
            vec![
                FieldInfo::new("id", CanonicalType::Number),
                FieldInfo::new("day", CanonicalType::Datetime),
            ],
            vec![Record {
                index: 3,
                values: vec![
                    Value::Int(7),
                    Value::Date(
                        NaiveDate::from_ymd_opt(2024, 2, 29)
                            .ok_or_else(|| anyhow::anyhow!("bad date"))?,
                    ),
                ],
            }],
        )?;
        let json = batch.to_json()?;
        assert_eq!(json["columns"][0]["type"], "number");
        assert_eq!(json["columns"][1]["type"], "datetime");
        assert_eq!(json["values"][0]["_index"], 3);
        assert_eq!(json["values"][0]["id"], 7);
        assert_eq!(json["values"][0]["day"], "2024-02-29");
        Ok(())
    }
}
