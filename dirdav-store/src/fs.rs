use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use rand::prelude::*;
use tokio::io::AsyncWriteExt;

use crate::error::{DavError, Result};
use crate::path::DavPath;

/// In-flight uploads live next to their target under this prefix,
/// they are never listed nor reachable through a request path.
pub const UPLOAD_PREFIX: &str = ".dirdav-upload-";

const EXDEV: i32 = 18;
const ENOTDIR: i32 = 20;

/// A path going through a regular file does not exist
fn is_missing(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::NotFound || e.raw_os_error() == Some(ENOTDIR)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub path: DavPath,
    pub is_collection: bool,
    /// The resource is reached through a symlink, it is unlinked and never descended into
    pub is_symlink: bool,
    pub len: u64,
    pub modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub etag: String,
}

impl Metadata {
    fn from_std(path: DavPath, meta: &std::fs::Metadata) -> Self {
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        let created = meta.created().unwrap_or(modified);
        let mtime_nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        Self {
            path,
            is_collection: meta.is_dir(),
            is_symlink: false,
            len: meta.len(),
            modified: DateTime::<Utc>::from(modified),
            created: DateTime::<Utc>::from(created),
            etag: format!("\"{:x}-{:x}-{:x}\"", inode(meta), meta.len(), mtime_nanos),
        }
    }

    pub fn href(&self) -> String {
        self.path.href(self.is_collection)
    }
}

#[cfg(unix)]
fn inode(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &std::fs::Metadata) -> u64 {
    0
}

/// Resources backed by a local directory.
///
/// Every access is confined to the root: a request path can't climb above it
/// and a symlink can't lead outside of it.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = std::fs::canonicalize(root)?;
        if !root.is_dir() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of a resource, once checked against the root
    async fn resolve(&self, path: &DavPath) -> Result<PathBuf> {
        if path.segments().any(|s| s.starts_with(UPLOAD_PREFIX)) {
            return Err(DavError::Forbidden(format!("{} is reserved", path)));
        }

        let target = path.to_fs(&self.root);
        let mut existing = target.clone();
        loop {
            match tokio::fs::canonicalize(&existing).await {
                Ok(real) if real.starts_with(&self.root) => return Ok(target),
                Ok(real) => {
                    tracing::warn!(path=%path, real=%real.display(), "access outside of the root refused");
                    return Err(DavError::Forbidden(format!("{} leaves the root", path)));
                }
                Err(e) if is_missing(&e) => {
                    if !existing.pop() || !existing.starts_with(&self.root) {
                        return Err(DavError::NotFound(path.clone()));
                    }
                }
                Err(e) => return Err(DavError::from_io(path, e)),
            }
        }
    }

    pub async fn stat(&self, path: &DavPath) -> Result<Metadata> {
        let local = self.resolve(path).await?;
        let meta = tokio::fs::metadata(&local).await.map_err(|e| match is_missing(&e) {
            true => DavError::NotFound(path.clone()),
            false => DavError::from_io(path, e),
        })?;
        let is_symlink = tokio::fs::symlink_metadata(&local)
            .await
            .map(|m| m.file_type().is_symlink())
            .map_err(|e| DavError::from_io(path, e))?;
        Ok(Metadata {
            is_symlink,
            ..Metadata::from_std(path.clone(), &meta)
        })
    }

    /// Like `stat`, a missing resource is not an error
    pub async fn try_stat(&self, path: &DavPath) -> Result<Option<Metadata>> {
        match self.stat(path).await {
            Ok(meta) => Ok(Some(meta)),
            Err(DavError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn open(&self, path: &DavPath) -> Result<tokio::fs::File> {
        let local = self.resolve(path).await?;
        tokio::fs::File::open(&local)
            .await
            .map_err(|e| DavError::from_io(path, e))
    }

    /// Start writing a new content for `path`, the current one stays
    /// visible until the upload is committed.
    pub async fn create(&self, path: &DavPath) -> Result<Upload> {
        if path.is_root() {
            return Err(DavError::MethodNotAllowed(path.clone()));
        }
        let target = self.resolve(path).await?;
        let parent = target
            .parent()
            .ok_or_else(|| DavError::MethodNotAllowed(path.clone()))?;

        let mut nonce = [0u8; 8];
        thread_rng().fill_bytes(&mut nonce);
        let tmp = parent.join(format!("{}{}", UPLOAD_PREFIX, hex::encode(nonce)));

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .await
            .map_err(|e| match e.kind() {
                // the parent collection does not exist
                ErrorKind::NotFound => DavError::Conflict(path.clone()),
                _ => DavError::from_io(path, e),
            })?;

        Ok(Upload {
            path: path.clone(),
            file: Some(file),
            tmp,
            target,
            written: 0,
        })
    }

    /// Remove a regular resource or an empty collection
    pub async fn remove(&self, path: &DavPath) -> Result<()> {
        if path.is_root() {
            return Err(DavError::Forbidden("the root can't be removed".into()));
        }
        let local = self.resolve(path).await?;
        let meta = tokio::fs::symlink_metadata(&local)
            .await
            .map_err(|e| DavError::from_io(path, e))?;
        let res = match meta.is_dir() {
            true => tokio::fs::remove_dir(&local).await,
            false => tokio::fs::remove_file(&local).await,
        };
        res.map_err(|e| DavError::from_io(path, e))
    }

    pub async fn mkdir(&self, path: &DavPath) -> Result<()> {
        let local = self.resolve(path).await?;
        tokio::fs::create_dir(&local).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => DavError::Conflict(path.clone()),
            _ => DavError::from_io(path, e),
        })
    }

    /// Members of a collection, ordered by name
    pub async fn read_dir(&self, path: &DavPath) -> Result<Vec<Metadata>> {
        let local = self.resolve(path).await?;
        let mut entries = tokio::fs::read_dir(&local)
            .await
            .map_err(|e| DavError::from_io(path, e))?;

        let mut acc = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(DavError::from_io(path, e)),
            };
            let name = match entry.file_name().into_string() {
                Ok(name) if !name.starts_with(UPLOAD_PREFIX) => name,
                Ok(_) => continue,
                Err(raw) => {
                    tracing::debug!(name=?raw, "skipping a non UTF-8 file name");
                    continue;
                }
            };

            let child = path.join(&name);
            match self.stat(&child).await {
                Ok(meta) => acc.push(meta),
                // dangling or escaping symlinks are not part of the tree
                Err(DavError::NotFound(_)) | Err(DavError::Forbidden(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        acc.sort_by(|a, b| a.path.name().cmp(b.path.name()));
        Ok(acc)
    }

    /// Atomic rename. `Ok(false)` when the backing store can't rename
    /// between these two places, the caller has to copy.
    pub async fn rename(&self, from: &DavPath, to: &DavPath) -> Result<bool> {
        let src = self.resolve(from).await?;
        let dst = self.resolve(to).await?;
        match tokio::fs::rename(&src, &dst).await {
            Ok(()) => Ok(true),
            Err(e) if e.raw_os_error() == Some(EXDEV) => Ok(false),
            Err(e) => Err(DavError::from_io(from, e)),
        }
    }

    /// Copy the content of a regular resource, replacing the destination
    pub async fn copy_file(&self, from: &DavPath, to: &DavPath) -> Result<()> {
        let mut src = self.open(from).await?;
        let mut upload = self.create(to).await?;
        upload.copy_from(&mut src).await?;
        upload.commit().await
    }
}

/// A content being written to a hidden sibling of its target.
///
/// `commit` renames it over the target. Dropping an upload that was not
/// committed removes the temporary file and leaves the target untouched.
pub struct Upload {
    path: DavPath,
    file: Option<tokio::fs::File>,
    tmp: PathBuf,
    target: PathBuf,
    written: u64,
}

impl Upload {
    pub fn written(&self) -> u64 {
        self.written
    }

    fn file(&mut self) -> Result<&mut tokio::fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| DavError::Conflict(self.path.clone()))
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let path = self.path.clone();
        self.file()?
            .write_all(buf)
            .await
            .map_err(|e| DavError::from_io(&path, e))?;
        self.written += buf.len() as u64;
        Ok(())
    }

    async fn copy_from(&mut self, src: &mut tokio::fs::File) -> Result<()> {
        let path = self.path.clone();
        let count = tokio::io::copy(src, self.file()?)
            .await
            .map_err(|e| DavError::from_io(&path, e))?;
        self.written += count;
        Ok(())
    }

    pub async fn commit(mut self) -> Result<()> {
        let path = self.path.clone();
        let mut file = self.file.take().ok_or(DavError::Conflict(path.clone()))?;
        file.flush().await.map_err(|e| DavError::from_io(&path, e))?;
        file.sync_all()
            .await
            .map_err(|e| DavError::from_io(&path, e))?;
        drop(file);

        match tokio::fs::rename(&self.tmp, &self.target).await {
            Ok(()) => {
                // nothing left to clean up
                self.tmp = PathBuf::new();
                Ok(())
            }
            Err(e) => Err(DavError::from_io(&path, e)),
        }
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        if self.tmp.as_os_str().is_empty() {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.tmp) {
            tracing::warn!(err=?e, path=%self.path, "failed to remove an aborted upload");
        } else {
            tracing::debug!(path=%self.path, "aborted upload rolled back");
        }
    }
}
