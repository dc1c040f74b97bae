//! Host-side references to files and folders offered for import.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::DataSourceError;

/// Bytes of a file as the engine should receive them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// A file the engine can read from the host filesystem.
    Path(PathBuf),
    /// Content already held in memory.
    Bytes(Vec<u8>),
}

/// Access to a leaf file's content.
#[async_trait]
pub trait FileHandle: Send + Sync + fmt::Debug {
    async fn content(&self) -> Result<FileContent, DataSourceError>;
}

/// A file on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile(pub PathBuf);

#[async_trait]
impl FileHandle for LocalFile {
    async fn content(&self) -> Result<FileContent, DataSourceError> {
        Ok(FileContent::Path(self.0.clone()))
    }
}

/// A file whose content lives in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryFile(Arc<[u8]>);

impl InMemoryFile {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }
}

#[async_trait]
impl FileHandle for InMemoryFile {
    async fn content(&self) -> Result<FileContent, DataSourceError> {
        Ok(FileContent::Bytes(self.0.to_vec()))
    }
}

/// A node of a file tree. `path` is the virtual path the engine sees.
#[derive(Debug, Clone)]
pub enum FileReference {
    Folder {
        name: String,
        path: String,
        children: Vec<FileReference>,
    },
    File {
        name: String,
        path: String,
        handle: Option<Arc<dyn FileHandle>>,
    },
}

impl FileReference {
    pub fn file(
        name: impl Into<String>,
        path: impl Into<String>,
        handle: impl FileHandle + 'static,
    ) -> Self {
        FileReference::File {
            name: name.into(),
            path: path.into(),
            handle: Some(Arc::new(handle)),
        }
    }

    /// A leaf with no readable content. Importing it does nothing.
    pub fn placeholder(name: impl Into<String>, path: impl Into<String>) -> Self {
        FileReference::File {
            name: name.into(),
            path: path.into(),
            handle: None,
        }
    }

    pub fn folder(
        name: impl Into<String>,
        path: impl Into<String>,
        children: Vec<FileReference>,
    ) -> Self {
        FileReference::Folder {
            name: name.into(),
            path: path.into(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FileReference::Folder { name, .. } | FileReference::File { name, .. } => name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FileReference::Folder { path, .. } | FileReference::File { path, .. } => path,
        }
    }

    /// Build a tree from a local directory (or a single file).
    ///
    /// Virtual paths start at the root's own name; children are sorted by name.
    /// Symlinks below the root are followed only when they point at files.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self, DataSourceError> {
        let root = root.as_ref();
        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| DataSourceError::file_bridge(root.display().to_string(), "no file name"))?;
        let metadata = fs::metadata(root).map_err(|err| DataSourceError::file_bridge(&name, err))?;
        if metadata.is_dir() {
            scan_dir(root, name.clone(), name)
        } else {
            Ok(FileReference::file(name.clone(), name, LocalFile(root.to_path_buf())))
        }
    }
}

fn scan_dir(host: &Path, name: String, path: String) -> Result<FileReference, DataSourceError> {
    let mut entries = fs::read_dir(host)
        .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
        .map_err(|err| DataSourceError::file_bridge(&path, err))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut children = Vec::with_capacity(entries.len());
    for entry in entries {
        let child = entry.file_name().to_string_lossy().into_owned();
        let child_path = format!("{path}/{child}");
        let host_child = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|err| DataSourceError::file_bridge(&child_path, err))?;

        if file_type.is_dir() {
            children.push(scan_dir(&host_child, child, child_path)?);
        } else if file_type.is_symlink() {
            match fs::metadata(&host_child) {
                Ok(target) if target.is_file() => {
                    children.push(FileReference::file(child, child_path, LocalFile(host_child)));
                }
                Ok(_) => debug!(path = %child_path, "skipping symlinked directory"),
                Err(err) => warn!(path = %child_path, %err, "skipping dangling symlink"),
            }
        } else {
            children.push(FileReference::file(child, child_path, LocalFile(host_child)));
        }
    }
    Ok(FileReference::Folder {
        name,
        path,
        children,
    })
}
