//! In-process fake engine used by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duckdb::arrow::array::{ArrayRef, Int64Array, StringArray};
use duckdb::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use duckdb::arrow::record_batch::RecordBatch;
use futures::StreamExt;

use crate::engine::vfs::glob_match;
use crate::engine::{Engine, EngineConnection, EngineProvider, NativeBatchStream, VirtualFile};
use crate::error::DataSourceError;

/// Shared state observed by tests: what was executed, registered and pulled.
#[derive(Default)]
pub(crate) struct FakeState {
    pub connects: AtomicUsize,
    pub pulls: Arc<AtomicUsize>,
    executed: Mutex<Vec<String>>,
    registrations: Mutex<Vec<VirtualFile>>,
    files: Mutex<BTreeMap<String, VirtualFile>>,
    results: Mutex<HashMap<String, (SchemaRef, Vec<RecordBatch>)>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeState {
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn registrations(&self) -> Vec<VirtualFile> {
        self.registrations.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Answer `sql` with `batches`; unknown statements yield an empty result.
    pub fn script(&self, sql: &str, schema: SchemaRef, batches: Vec<RecordBatch>) {
        if let Ok(mut results) = self.results.lock() {
            results.insert(sql.to_string(), (schema, batches));
        }
    }

    pub fn fail_on(&self, sql: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(sql.to_string());
        }
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeProvider {
    state: Arc<FakeState>,
    fail_boot: bool,
    pub boots: AtomicUsize,
}

impl FakeProvider {
    pub fn new(state: Arc<FakeState>) -> Self {
        Self {
            state,
            fail_boot: false,
            boots: AtomicUsize::new(0),
        }
    }

    pub fn failing(state: Arc<FakeState>) -> Self {
        Self {
            fail_boot: true,
            ..Self::new(state)
        }
    }
}

#[async_trait]
impl EngineProvider for FakeProvider {
    async fn boot(&self) -> Result<Arc<dyn Engine>, DataSourceError> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        if self.fail_boot {
            return Err(DataSourceError::Internal("boot refused".to_string()));
        }
        Ok(Arc::new(FakeEngine(Arc::clone(&self.state))))
    }
}

pub(crate) struct FakeEngine(Arc<FakeState>);

#[async_trait]
impl Engine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn connect(&self) -> Result<Arc<dyn EngineConnection>, DataSourceError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection(Arc::clone(&self.0))))
    }

    async fn register_file(&self, file: VirtualFile) -> Result<(), DataSourceError> {
        if let Ok(mut registrations) = self.0.registrations.lock() {
            registrations.push(file.clone());
        }
        if let Ok(mut files) = self.0.files.lock() {
            files.insert(file.path.clone(), file);
        }
        Ok(())
    }

    async fn drop_file(&self, path: &str) -> Result<(), DataSourceError> {
        if let Ok(mut files) = self.0.files.lock() {
            files.remove(path);
        }
        Ok(())
    }

    async fn drop_files(&self) -> Result<(), DataSourceError> {
        if let Ok(mut files) = self.0.files.lock() {
            files.clear();
        }
        Ok(())
    }

    async fn glob_files(&self, pattern: &str) -> Result<Vec<String>, DataSourceError> {
        Ok(self
            .0
            .file_paths()
            .into_iter()
            .filter(|path| glob_match(pattern, path))
            .collect())
    }
}

struct FakeConnection(Arc<FakeState>);

#[async_trait]
impl EngineConnection for FakeConnection {
    async fn query(&self, sql: &str) -> Result<NativeBatchStream, DataSourceError> {
        if let Ok(mut executed) = self.0.executed.lock() {
            executed.push(sql.to_string());
        }
        let fails = self
            .0
            .failing
            .lock()
            .map(|failing| failing.contains(sql))
            .unwrap_or(false);
        if fails {
            return Err(DataSourceError::Query(format!("scripted failure: {sql}")));
        }

        let scripted = self
            .0
            .results
            .lock()
            .ok()
            .and_then(|results| results.get(sql).cloned());
        let (schema, batches) =
            scripted.unwrap_or_else(|| (Arc::new(Schema::empty()), Vec::new()));
        let pulls = Arc::clone(&self.0.pulls);
        let counted = NativeBatchStream::from_batches(schema.clone(), batches).inspect(move |_| {
            pulls.fetch_add(1, Ordering::SeqCst);
        });
        Ok(NativeBatchStream::new(schema, counted.boxed()))
    }
}

/// Schema `(id BIGINT, name VARCHAR)`.
pub(crate) fn people_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]))
}

/// One batch of [`people_schema`] rows with ids `ids`.
pub(crate) fn people_batch(ids: std::ops::Range<i64>) -> RecordBatch {
    let names: Vec<String> = ids.clone().map(|id| format!("person-{id}")).collect();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(ids.collect::<Vec<_>>())),
        Arc::new(StringArray::from(names)),
    ];
    match RecordBatch::try_new(people_schema(), columns) {
        Ok(batch) => batch,
        Err(err) => panic!("invalid fixture batch: {err}"),
    }
}
