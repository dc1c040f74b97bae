//! Catalog introspection: one `TableInfo` per user table.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::DataSourceError;
use crate::query::BatchStreamExecutor;
use crate::sql::StructuredQuery;
use crate::types::{canonicalize_type_name, FieldInfo, ResultBatch, TableInfo, Value};

pub(crate) const CATALOG_SQL: &str = r#"SELECT TABLE_SCHEMA as "schema",
TABLE_NAME as "table",
COLUMN_NAME as "column",
COLUMN_DEFAULT as "default",
DATA_TYPE as "type",
CHARACTER_MAXIMUM_LENGTH as max_len
from INFORMATION_SCHEMA.COLUMNS
where TABLE_SCHEMA not in ('pg_catalog', 'temp');"#;

pub struct SchemaIntrospector {
    executor: Arc<BatchStreamExecutor>,
}

impl SchemaIntrospector {
    pub fn new(executor: Arc<BatchStreamExecutor>) -> Self {
        Self { executor }
    }

    #[instrument(skip(self))]
    pub async fn list_tables(&self) -> Result<Vec<TableInfo>, DataSourceError> {
        let rows = self.executor.query_native(CATALOG_SQL, None).await?;
        let tables = fold_catalog_rows(&rows)?;
        debug!(tables = tables.len(), columns = rows.len(), "catalog listed");
        Ok(tables)
    }
}

fn text(rows: &ResultBatch, row: usize, column: &str) -> Option<String> {
    rows.value(row, column)?.as_str().map(str::to_string)
}

fn required(rows: &ResultBatch, row: usize, column: &str) -> Result<String, DataSourceError> {
    text(rows, row, column).ok_or_else(|| {
        DataSourceError::Internal(format!("catalog row {row} has no {column:?} value"))
    })
}

/// Group catalog rows by `(schema, table)` in first-seen order, keeping the
/// column order of the rows.
pub fn fold_catalog_rows(rows: &ResultBatch) -> Result<Vec<TableInfo>, DataSourceError> {
    let mut tables: Vec<TableInfo> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for row in 0..rows.len() {
        let schema = required(rows, row, "schema")?;
        let table = required(rows, row, "table")?;
        let column = required(rows, row, "column")?;
        let type_name = required(rows, row, "type")?;

        let position = *positions
            .entry((schema.clone(), table.clone()))
            .or_insert_with(|| {
                tables.push(TableInfo {
                    name: table.clone(),
                    namespace: vec![schema.clone()],
                    schema: Vec::new(),
                    query: StructuredQuery::select_all(table.clone(), Some(schema.clone())),
                });
                tables.len() - 1
            });

        tables[position].schema.push(FieldInfo {
            name: column,
            data_type: canonicalize_type_name(&type_name),
            default: text(rows, row, "default"),
            max_size: rows.value(row, "max_len").and_then(Value::as_i64),
        });
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;

    use crate::types::{CanonicalType, Record};

    fn catalog(rows: &[(&str, &str, &str, &str)]) -> Result<ResultBatch> {
        let columns = ["schema", "table", "column", "default", "type", "max_len"]
            .into_iter()
            .map(|name| {
                let ty = if name == "max_len" {
                    CanonicalType::Number
                } else {
                    CanonicalType::String
                };
                FieldInfo::new(name, ty)
            })
            .collect();
        let records = rows
            .iter()
            .enumerate()
            .map(|(index, (schema, table, column, ty))| Record {
                index,
                values: vec![
                    Value::from(*schema),
                    Value::from(*table),
                    Value::from(*column),
                    Value::Null,
                    Value::from(*ty),
                    Value::Null,
                ],
            })
            .collect();
        Ok(ResultBatch::try_new(columns, records)?)
    }

    #[test]
    fn rows_group_into_tables_in_first_seen_order() -> Result<()> {
        let rows = catalog(&[
            ("main", "t1", "a", "INTEGER"),
            ("main", "t1", "b", "VARCHAR"),
            ("main", "t2", "c", "DATE"),
        ])?;
        let tables = fold_catalog_rows(&rows)?;

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "t1");
        assert_eq!(tables[1].name, "t2");
        let t1: Vec<_> = tables[0].schema.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(t1, vec!["a", "b"]);
        assert_eq!(tables[0].schema[0].data_type, CanonicalType::Number);
        assert_eq!(tables[0].schema[1].data_type, CanonicalType::String);
        assert_eq!(tables[1].schema.len(), 1);
        assert_eq!(tables[1].schema[0].data_type, CanonicalType::Datetime);
        assert_eq!(tables[1].namespace, vec!["main".to_string()]);
        assert_eq!(
            tables[1].query,
            StructuredQuery::select_all("t2", Some("main".to_string()))
        );
        Ok(())
    }

    #[test]
    fn same_table_name_in_two_schemas_stays_separate() -> Result<()> {
        let rows = catalog(&[
            ("main", "t", "a", "INTEGER"),
            ("staging", "t", "a", "INTEGER"),
            ("main", "t", "b", "BOOLEAN"),
        ])?;
        let tables = fold_catalog_rows(&rows)?;
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].namespace, vec!["main".to_string()]);
        assert_eq!(tables[0].schema.len(), 2);
        assert_eq!(tables[1].namespace, vec!["staging".to_string()]);
        Ok(())
    }

    #[test]
    fn defaults_and_max_len_are_carried() -> Result<()> {
        let rows = ResultBatch::try_new(
            vec![
                FieldInfo::new("schema", CanonicalType::String),
                FieldInfo::new("table", CanonicalType::String),
                FieldInfo::new("column", CanonicalType::String),
                FieldInfo::new("default", CanonicalType::String),
                FieldInfo::new("type", CanonicalType::String),
                FieldInfo::new("max_len", CanonicalType::Number),
            ],
            vec![Record {
                index: 0,
                values: vec![
                    Value::from("main"),
                    Value::from("t"),
                    Value::from("code"),
                    Value::from("'x'"),
                    Value::from("VARCHAR"),
                    Value::Int(8),
                ],
            }],
        )?;
        let tables = fold_catalog_rows(&rows)?;
        assert_eq!(tables[0].schema[0].default.as_deref(), Some("'x'"));
        assert_eq!(tables[0].schema[0].max_size, Some(8));
        Ok(())
    }

    #[test]
    fn empty_catalog_yields_no_tables() -> Result<()> {
        assert!(fold_catalog_rows(&ResultBatch::default())?.is_empty());
        Ok(())
    }
}
