//! Embedded DuckDB as a tabular data source.
//!
//! A [`DataSource`] owns one in-process engine and a single logical connection,
//! bridges host files into the engine's virtual filesystem, runs raw or
//! structured queries as lazily pulled batches and lists the catalog as
//! table descriptors.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod files;
pub mod query;
pub mod session;
pub mod source;
pub mod sql;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod testing;

pub use catalog::SchemaIntrospector;
pub use config::SourceConfig;
pub use engine::{DuckDbEngineProvider, Engine, EngineConnection, EngineProvider};
pub use error::DataSourceError;
pub use files::{
    FileContent, FileHandle, FileReference, InMemoryFile, LocalFile, RegistrationReport,
    UnsupportedFileSkipped,
};
pub use query::{QueryParams, ResultBatchStream};
pub use session::ConnectionState;
pub use source::DataSource;
pub use sql::{add_limit, QueryTranslator, SqlTranslator, StructuredQuery};
pub use telemetry::init_tracing;
pub use types::{CanonicalType, FieldInfo, Record, ResultBatch, TableInfo, Value};
