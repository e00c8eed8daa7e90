//! File-backed durable log store.
//!
//! Every operation is scoped to one base directory and addresses files by a
//! store-relative name with `/` separators. The store is the only state shared
//! between roles; coordination between processes is done purely with
//! [`LogStore::move_file`].

pub mod layout;
pub mod writer;

use globset::GlobBuilder;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use walkdir::WalkDir;

pub use layout::QueueState;
pub use writer::{AsyncWriter, WriterReport};

/// Errors raised by the log store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The workspace directory could not be created.
    #[error("cannot create workspace directory {path:?}: {source}")]
    Workspace { path: PathBuf, source: io::Error },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// A read or write failed. Not retried.
    #[error("I/O error on {name}: {source}")]
    Io { name: String, source: io::Error },
    #[error("invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },
}

impl StoreError {
    fn io(name: &str, source: io::Error) -> Self {
        StoreError::Io {
            name: name.to_string(),
            source,
        }
    }
}

/// Flat-file store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    base: PathBuf,
}

impl LogStore {
    /// Open the store, creating the base directory if needed.
    pub fn open(base: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base = base.into();
        create_dir(&base)?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Absolute path of a store-relative name.
    pub fn path_of(&self, name: &str) -> PathBuf {
        name.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.base.clone(), |path, part| path.join(part))
    }

    /// Create a directory under the base. Idempotent.
    pub fn ensure_directory(&self, name: &str) -> Result<PathBuf, StoreError> {
        let path = self.path_of(name);
        create_dir(&path)?;
        Ok(path)
    }

    /// Append `content` to `name`, creating the file and its parents.
    pub fn append(&self, name: &str, content: &str) -> Result<(), StoreError> {
        let path = self.path_of(name);
        self.ensure_parent(&path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(name, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| StoreError::io(name, e))?;
        Ok(())
    }

    /// Replace the content of `name`.
    ///
    /// The new content is written to a temporary sibling and renamed into
    /// place, so readers see either the old or the new file.
    pub fn overwrite(&self, name: &str, content: &str) -> Result<(), StoreError> {
        let path = self.path_of(name);
        self.ensure_parent(&path)?;
        let tmp = temp_sibling(&path);
        fs::write(&tmp, content).map_err(|e| StoreError::io(name, e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::io(name, e)
        })
    }

    /// Read a whole file, or an empty string if it is absent or unreadable.
    ///
    /// A missing file is the normal state on first run, so failures are only
    /// logged.
    pub fn read_all(&self, name: &str) -> String {
        match self.try_read(name) {
            Ok(Some(content)) => content,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(error = %e, "read failed; treating as empty");
                String::new()
            }
        }
    }

    /// Read a whole file, distinguishing absence from failure.
    pub fn try_read(&self, name: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_of(name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(name, e)),
        }
    }

    /// Names of files matching a glob such as `pending/keyboard-*.jsonl`.
    ///
    /// `*` does not cross `/`. Results are sorted.
    pub fn list(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| StoreError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?
            .compile_matcher();

        let mut names: Vec<String> = WalkDir::new(&self.base)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.base).ok()?;
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                Some(name)
            })
            .filter(|name| matcher.is_match(name))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Rename `old` to `new`.
    ///
    /// Fails with `NotFound` if `old` is absent and `AlreadyExists` if `new`
    /// is present. The destination is never replaced, even when it appears
    /// after the checks, so when two processes race on the same `old`,
    /// exactly one of them wins.
    pub fn move_file(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let from = self.path_of(old);
        let to = self.path_of(new);

        if fs::symlink_metadata(&from).is_err() {
            return Err(StoreError::NotFound(old.to_string()));
        }
        if fs::symlink_metadata(&to).is_ok() {
            return Err(StoreError::AlreadyExists(new.to_string()));
        }
        self.ensure_parent(&to)?;

        move_no_replace(&from, &to).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(old.to_string()),
            io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(new.to_string()),
            _ => StoreError::io(old, e),
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).exists()
    }

    /// Remove a file. The caller checks existence first.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        fs::remove_file(self.path_of(name)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
            _ => StoreError::io(name, e),
        })
    }

    /// Last modification time of a file.
    pub fn modified(&self, name: &str) -> Result<SystemTime, StoreError> {
        fs::metadata(self.path_of(name))
            .and_then(|meta| meta.modified())
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
                _ => StoreError::io(name, e),
            })
    }

    /// Set a file's modification time to now.
    pub fn touch(&self, name: &str) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.path_of(name))
            .map_err(|e| StoreError::io(name, e))?;
        file.set_modified(SystemTime::now())
            .map_err(|e| StoreError::io(name, e))
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), StoreError> {
        match path.parent() {
            Some(parent) => create_dir(parent),
            None => Ok(()),
        }
    }
}

fn create_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|source| StoreError::Workspace {
        path: path.to_path_buf(),
        source,
    })
}

/// Link `to` to the file at `from`, then unlink `from`.
///
/// Linking refuses an existing destination, unlike `rename` which would
/// silently replace it. Filesystems without hard links fall back to a plain
/// rename after one more existence check.
fn move_no_replace(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {}
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::AlreadyExists) => {
            return Err(e)
        }
        Err(e) => {
            tracing::debug!(error = %e, "hard link unavailable; renaming");
            if fs::symlink_metadata(to).is_ok() {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            return fs::rename(from, to);
        }
    }
    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}
