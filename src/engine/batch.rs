//! Conversion of native Arrow batches into canonical [`ResultBatch`]es.
//!
//! Columns are first cast to one physical type per canonical type (Int64,
//! UInt64, Float64, Date32, Timestamp(us), Time64(us)) and then decoded cell by
//! cell; everything that is not number/boolean/datetime goes through Arrow's
//! display formatter.

use std::any::type_name;

use duckdb::arrow::array::{Array, ArrayRef, AsArray};
use duckdb::arrow::compute::cast;
use duckdb::arrow::datatypes::{
    DataType, Date32Type, Float64Type, Int64Type, Schema, Time64MicrosecondType, TimeUnit,
    TimestampMicrosecondType, UInt64Type,
};
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::arrow::util::display::{ArrayFormatter, FormatOptions};

use crate::error::DataSourceError;
use crate::types::{canonicalize, CanonicalType, FieldInfo, Record, ResultBatch, Value};

/// Column descriptors for an Arrow schema.
pub fn columns_for_schema(schema: &Schema) -> Vec<FieldInfo> {
    schema
        .fields()
        .iter()
        .map(|field| FieldInfo::new(field.name().clone(), canonicalize(field.data_type())))
        .collect()
}

/// Transform one engine batch. Record `index` is the row position inside `batch`.
pub fn transform_batch(batch: &RecordBatch) -> Result<ResultBatch, DataSourceError> {
    let columns = columns_for_schema(batch.schema().as_ref());
    let decoded = batch
        .columns()
        .iter()
        .map(column_values)
        .collect::<Result<Vec<_>, _>>()?;

    let mut column_iters: Vec<_> = decoded.into_iter().map(Vec::into_iter).collect();
    let mut records = Vec::with_capacity(batch.num_rows());
    for index in 0..batch.num_rows() {
        let values = column_iters
            .iter_mut()
            .map(|iter| iter.next().unwrap_or(Value::Null))
            .collect();
        records.push(Record { index, values });
    }

    ResultBatch::try_new(columns, records)
}

fn downcast_error<T>(array: &ArrayRef) -> DataSourceError {
    DataSourceError::Internal(format!(
        "expected {} but found {}",
        type_name::<T>(),
        array.data_type()
    ))
}

macro_rules! decode_primitive {
    ($array:expr, $arrow_type:ty, |$arr:ident, $idx:ident| $make:expr) => {{
        let $arr = $array
            .as_primitive_opt::<$arrow_type>()
            .ok_or_else(|| downcast_error::<$arrow_type>($array))?;
        (0..$arr.len())
            .map(|$idx| {
                if $arr.is_null($idx) {
                    Value::Null
                } else {
                    $make
                }
            })
            .collect::<Vec<_>>()
    }};
}

/// Decode a column into values matching its canonical type.
pub fn column_values(array: &ArrayRef) -> Result<Vec<Value>, DataSourceError> {
    if let DataType::Dictionary(_, value_type) = array.data_type() {
        let decoded = cast(array.as_ref(), value_type)?;
        return column_values(&decoded);
    }

    match canonicalize(array.data_type()) {
        CanonicalType::Number => number_values(array),
        CanonicalType::Boolean => {
            let arr = array
                .as_boolean_opt()
                .ok_or_else(|| downcast_error::<bool>(array))?;
            Ok((0..arr.len())
                .map(|idx| {
                    if arr.is_null(idx) {
                        Value::Null
                    } else {
                        Value::Boolean(arr.value(idx))
                    }
                })
                .collect())
        }
        CanonicalType::Datetime => temporal_values(array),
        CanonicalType::String => string_values(array),
    }
}

fn number_values(array: &ArrayRef) -> Result<Vec<Value>, DataSourceError> {
    let values = match array.data_type() {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let widened = cast(array.as_ref(), &DataType::Int64)?;
            decode_primitive!(&widened, Int64Type, |arr, idx| Value::Int(arr.value(idx)))
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let widened = cast(array.as_ref(), &DataType::UInt64)?;
            decode_primitive!(&widened, UInt64Type, |arr, idx| Value::UInt(arr.value(idx)))
        }
        _ => {
            let floats = cast(array.as_ref(), &DataType::Float64)?;
            decode_primitive!(&floats, Float64Type, |arr, idx| Value::Float(arr.value(idx)))
        }
    };
    Ok(values)
}

fn temporal_values(array: &ArrayRef) -> Result<Vec<Value>, DataSourceError> {
    let values = match array.data_type() {
        DataType::Date32 | DataType::Date64 => {
            let dates = cast(array.as_ref(), &DataType::Date32)?;
            decode_primitive!(&dates, Date32Type, |arr, idx| arr
                .value_as_date(idx)
                .map(Value::Date)
                .unwrap_or(Value::Null))
        }
        DataType::Time32(_) | DataType::Time64(_) => {
            let times = cast(array.as_ref(), &DataType::Time64(TimeUnit::Microsecond))?;
            decode_primitive!(&times, Time64MicrosecondType, |arr, idx| arr
                .value_as_time(idx)
                .map(Value::Time)
                .unwrap_or(Value::Null))
        }
        DataType::Timestamp(_, tz) => {
            let stamps = cast(
                array.as_ref(),
                &DataType::Timestamp(TimeUnit::Microsecond, tz.clone()),
            )?;
            decode_primitive!(&stamps, TimestampMicrosecondType, |arr, idx| arr
                .value_as_datetime(idx)
                .map(Value::DateTime)
                .unwrap_or(Value::Null))
        }
        other => {
            return Err(DataSourceError::Internal(format!(
                "{other} is not a temporal type"
            )))
        }
    };
    Ok(values)
}

fn string_values(array: &ArrayRef) -> Result<Vec<Value>, DataSourceError> {
    let options = FormatOptions::default();
    let formatter = ArrayFormatter::try_new(array.as_ref(), &options)?;
    Ok((0..array.len())
        .map(|idx| {
            if array.is_null(idx) {
                Value::Null
            } else {
                Value::String(formatter.value(idx).to_string())
            }
        })
        .collect())
}
