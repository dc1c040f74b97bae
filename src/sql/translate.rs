//! Structured queries and their translation to SQL text.
//!
//! Hosts usually bring their own translator; [`SqlTranslator`] covers the
//! projections, filters and ordering the catalog descriptors produce.

use serde::{Deserialize, Serialize};

use crate::error::DataSourceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatedColumn {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl CalculatedColumn {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            alias: None,
        }
    }

    pub fn wildcard() -> Self {
        Self::new("*")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub expression: String,
    #[serde(default)]
    pub descending: bool,
}

/// Engine-agnostic description of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub fields: Vec<CalculatedColumn>,
    pub from: TableRef,
    /// Predicates combined with `AND`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
}

impl StructuredQuery {
    /// `SELECT *` over a single table.
    pub fn select_all(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            fields: vec![CalculatedColumn::wildcard()],
            from: TableRef {
                name: name.into(),
                namespace,
            },
            filters: Vec::new(),
            order_by: Vec::new(),
        }
    }
}

/// Renders structured queries as SQL, optionally paginated.
pub trait QueryTranslator: Send + Sync {
    fn translate(
        &self,
        query: &StructuredQuery,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<String, DataSourceError>;
}

/// Default translator emitting DuckDB-compatible SQL.
#[derive(Debug, Clone, Default)]
pub struct SqlTranslator;

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl QueryTranslator for SqlTranslator {
    fn translate(
        &self,
        query: &StructuredQuery,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<String, DataSourceError> {
        if query.from.name.trim().is_empty() {
            return Err(DataSourceError::Query(
                "structured query has no source table".to_string(),
            ));
        }

        let projection = if query.fields.is_empty() {
            "*".to_string()
        } else {
            query
                .fields
                .iter()
                .map(|field| match &field.alias {
                    Some(alias) => format!("{} AS {}", field.expression, quote_ident(alias)),
                    None => field.expression.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };

        let source = match &query.from.namespace {
            Some(ns) if !ns.is_empty() => {
                format!("{}.{}", quote_ident(ns), quote_ident(&query.from.name))
            }
            _ => quote_ident(&query.from.name),
        };

        let mut sql = format!("SELECT {projection} FROM {source}");
        if !query.filters.is_empty() {
            let predicates = query
                .filters
                .iter()
                .map(|filter| format!("({filter})"))
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(" WHERE ");
            sql.push_str(&predicates);
        }
        if !query.order_by.is_empty() {
            let ordering = query
                .order_by
                .iter()
                .map(|order| {
                    let direction = if order.descending { "DESC" } else { "ASC" };
                    format!("{} {direction}", order.expression)
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&ordering);
        }
        if let Some(limit) = limit.filter(|l| *l >= 0) {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = offset.filter(|o| *o > 0) {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        Ok(sql)
    }
}
