//! Query execution over the managed connection.

mod executor;
mod stream;

pub use executor::{BatchStreamExecutor, QueryParams};
pub use stream::ResultBatchStream;
