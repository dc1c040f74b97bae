use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::SourceConfig;
use crate::engine::{Engine, VirtualFile};
use crate::error::DataSourceError;
use crate::files::reference::{FileContent, FileReference};
use crate::session::ConnectionManager;

/// A leaf left out of an import because its suffix is not supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsupportedFileSkipped {
    pub name: String,
    pub path: String,
}

/// Outcome of one import: virtual paths registered and leaves skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    pub registered: Vec<String>,
    pub skipped: Vec<UnsupportedFileSkipped>,
}

/// Registers host files with the booted engine's virtual filesystem.
pub struct VirtualFileRegistry {
    manager: Arc<ConnectionManager>,
    config: Arc<SourceConfig>,
}

impl VirtualFileRegistry {
    pub fn new(manager: Arc<ConnectionManager>, config: Arc<SourceConfig>) -> Self {
        Self { manager, config }
    }

    async fn engine(&self) -> Result<Arc<dyn Engine>, DataSourceError> {
        self.manager.engine().await.ok_or_else(|| {
            DataSourceError::Initialization("connect before managing files".to_string())
        })
    }

    /// Import a file or a whole folder tree, depth-first in child order.
    #[instrument(skip(self, file), fields(path = %file.path()))]
    pub async fn register(&self, file: &FileReference) -> Result<RegistrationReport, DataSourceError> {
        let engine = self.engine().await?;
        let mut report = RegistrationReport::default();
        let mut pending = vec![file];

        while let Some(node) = pending.pop() {
            match node {
                FileReference::Folder { children, .. } => pending.extend(children.iter().rev()),
                FileReference::File { handle: None, .. } => continue,
                FileReference::File {
                    name,
                    path,
                    handle: Some(handle),
                } => {
                    if !self.config.is_supported_file(name) {
                        warn!(path = %path, "skipping unsupported file");
                        report.skipped.push(UnsupportedFileSkipped {
                            name: name.clone(),
                            path: path.clone(),
                        });
                        continue;
                    }
                    let virtual_file = match handle.content().await? {
                        FileContent::Path(host) => VirtualFile::local(path.clone(), host),
                        FileContent::Bytes(bytes) => VirtualFile::buffer(path.clone(), bytes),
                    };
                    engine.register_file(virtual_file).await?;
                    debug!(path = %path, "file registered");
                    report.registered.push(path.clone());
                }
            }
        }

        info!(
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "import finished"
        );
        Ok(report)
    }

    #[instrument(skip(self, file), fields(path = %file.path()))]
    pub async fn unregister(&self, file: &FileReference) -> Result<(), DataSourceError> {
        self.engine().await?.drop_file(file.path()).await
    }

    /// Drop every registered file. Nothing to do before the engine is booted.
    pub async fn reset(&self) -> Result<(), DataSourceError> {
        match self.manager.engine().await {
            Some(engine) => engine.drop_files().await,
            None => Ok(()),
        }
    }

    pub async fn list_all(&self) -> Result<Vec<String>, DataSourceError> {
        self.engine().await?.glob_files("*").await
    }

    /// Make `url` readable by the engine under the URL itself.
    #[instrument(skip(self))]
    pub async fn import_remote(&self, url: &str) -> Result<(), DataSourceError> {
        self.engine().await?.register_file(VirtualFile::remote(url)).await
    }
}
