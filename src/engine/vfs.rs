//! Virtual filesystem backing registered files.
//!
//! DuckDB resolves relative file names against `file_search_path`, so each
//! registered file is materialised under a scratch root at its virtual path:
//! in-memory buffers are written out, host files are linked (copied where
//! symlinks are unavailable). Remote files are only recorded; the engine reads
//! them over HTTP itself.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::DataSourceError;

/// How the engine reaches a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileProtocol {
    /// A file on the host filesystem.
    HostFile,
    /// Content handed over as an in-memory buffer.
    BufferReader,
    /// A remote URL read over HTTP(S).
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Local(PathBuf),
    Buffer(Vec<u8>),
    Remote(String),
}

/// A named entry in the engine's virtual filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub path: String,
    pub source: FileSource,
    pub protocol: FileProtocol,
    pub mutable: bool,
}

impl VirtualFile {
    pub fn local(path: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: FileSource::Local(file.into()),
            protocol: FileProtocol::HostFile,
            mutable: true,
        }
    }

    pub fn buffer(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            source: FileSource::Buffer(bytes),
            protocol: FileProtocol::BufferReader,
            mutable: true,
        }
    }

    /// Remote files are keyed by their URL and never written to.
    pub fn remote(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            path: url.clone(),
            source: FileSource::Remote(url),
            protocol: FileProtocol::Http,
            mutable: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    protocol: FileProtocol,
    mutable: bool,
    location: Option<PathBuf>,
}

/// Scratch-directory implementation of the virtual filesystem.
#[derive(Debug)]
pub struct ScratchFileSystem {
    root: PathBuf,
    owned: bool,
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl ScratchFileSystem {
    /// Use `root` (created if missing). When `owned`, the whole directory is
    /// removed on drop; otherwise only registered files are.
    pub fn new(root: PathBuf, owned: bool) -> Result<Self, DataSourceError> {
        fs::create_dir_all(&root).map_err(|err| {
            DataSourceError::Initialization(format!(
                "failed to create scratch directory {}: {err}",
                root.display()
            ))
        })?;
        Ok(Self {
            root,
            owned,
            entries: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Entry>) -> Result<T, DataSourceError>,
    ) -> Result<T, DataSourceError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| DataSourceError::Internal("virtual file table poisoned".to_string()))?;
        f(&mut guard)
    }

    /// Map a virtual path onto the scratch root, refusing escapes.
    fn resolve(&self, virtual_path: &str) -> Result<PathBuf, DataSourceError> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for part in virtual_path.split(['/', '\\']) {
            match part {
                "" | "." => continue,
                ".." => {
                    return Err(DataSourceError::file_bridge(
                        virtual_path,
                        "parent directory components are not allowed",
                    ))
                }
                other => {
                    resolved.push(other);
                    depth += 1;
                }
            }
        }
        if depth == 0 {
            return Err(DataSourceError::file_bridge(virtual_path, "empty path"));
        }
        Ok(resolved)
    }

    pub fn register(&self, file: VirtualFile) -> Result<(), DataSourceError> {
        let VirtualFile {
            path,
            source,
            protocol,
            mutable,
        } = file;
        self.with_entries(|entries| match entries.get(&path) {
            Some(existing) if !existing.mutable && mutable => Err(DataSourceError::file_bridge(
                &path,
                format!("read-only {:?} entry cannot be replaced", existing.protocol),
            )),
            _ => Ok(()),
        })?;
        let location = match source {
            FileSource::Remote(_) => None,
            FileSource::Buffer(bytes) => {
                let dest = self.prepare_destination(&path)?;
                fs::write(&dest, bytes).map_err(|err| DataSourceError::file_bridge(&path, err))?;
                Some(dest)
            }
            FileSource::Local(src) => {
                let src = fs::canonicalize(&src).map_err(|err| {
                    DataSourceError::file_bridge(&path, format!("{}: {err}", src.display()))
                })?;
                let dest = self.prepare_destination(&path)?;
                link_or_copy(&src, &dest).map_err(|err| DataSourceError::file_bridge(&path, err))?;
                Some(dest)
            }
        };
        debug!(path = %path, ?protocol, mutable, "registered virtual file");
        self.with_entries(|entries| {
            entries.insert(
                path,
                Entry {
                    protocol,
                    mutable,
                    location,
                },
            );
            Ok(())
        })
    }

    fn prepare_destination(&self, path: &str) -> Result<PathBuf, DataSourceError> {
        let dest = self.resolve(path)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|err| DataSourceError::file_bridge(path, err))?;
        }
        remove_if_exists(&dest).map_err(|err| DataSourceError::file_bridge(path, err))?;
        Ok(dest)
    }

    /// Dropping an unknown path is a no-op.
    pub fn drop_file(&self, path: &str) -> Result<(), DataSourceError> {
        let Some(entry) = self.with_entries(|entries| Ok(entries.remove(path)))? else {
            return Ok(());
        };
        if let Some(location) = &entry.location {
            remove_if_exists(location).map_err(|err| DataSourceError::file_bridge(path, err))?;
        }
        debug!(path = %path, protocol = ?entry.protocol, "dropped virtual file");
        Ok(())
    }

    pub fn drop_files(&self) -> Result<(), DataSourceError> {
        let drained = self.with_entries(|entries| Ok(std::mem::take(entries)))?;
        for (path, entry) in drained {
            if let Some(location) = entry.location {
                if let Err(err) = remove_if_exists(&location) {
                    warn!(path = %path, %err, "failed to remove materialised file");
                }
            }
        }
        Ok(())
    }

    pub fn glob(&self, pattern: &str) -> Result<Vec<String>, DataSourceError> {
        self.with_entries(|entries| {
            Ok(entries
                .keys()
                .filter(|path| glob_match(pattern, path))
                .cloned()
                .collect())
        })
    }
}

impl Drop for ScratchFileSystem {
    fn drop(&mut self) {
        if self.owned {
            if let Err(err) = fs::remove_dir_all(&self.root) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(root = %self.root.display(), %err, "failed to remove scratch directory");
                }
            }
        } else if let Err(err) = self.drop_files() {
            warn!(%err, "failed to clear virtual files");
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(unix)]
fn link_or_copy(src: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dest)
}

#[cfg(not(unix))]
fn link_or_copy(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest).map(|_| ())
}

/// Match `text` against a glob supporting `*` (any run) and `?` (one char).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
