//! SQL text helpers: pagination/view wrappers and structured-query translation.

pub mod rewrite;
pub mod translate;

pub use rewrite::{add_limit, create_view_sql};
pub use translate::{
    CalculatedColumn, OrderBy, QueryTranslator, SqlTranslator, StructuredQuery, TableRef,
};
