use thiserror::Error;

use crate::path::DavPath;

/// Everything that can go wrong while serving a WebDAV request.
/// The protocol layer maps each variant to exactly one HTTP status.
#[derive(Error, Debug)]
pub enum DavError {
    #[error("{0} not found")]
    NotFound(DavPath),

    #[error("conflict on {0}")]
    Conflict(DavPath),

    /// Carries the resource that is locked, not necessarily the request target
    #[error("{0} is locked")]
    LockConflict(DavPath),

    #[error("no such lock")]
    NoSuchLock,

    #[error("precondition failed")]
    PreconditionFailed,

    #[error("precondition evaluated against a missing resource")]
    ConditionFailedOnMissingResource,

    /// Conditional GET or HEAD, the client copy is still fresh
    #[error("not modified")]
    NotModified,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unsupported media type")]
    UnsupportedMediaType,

    #[error("property {0} is protected")]
    ProtectedProperty(String),

    #[error("storage failure on {path}: {source}")]
    InternalStorageError {
        path: DavPath,
        #[source]
        source: std::io::Error,
    },

    #[error("no space left to store {0}")]
    InsufficientStorage(DavPath),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("method not allowed on {0}")]
    MethodNotAllowed(DavPath),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(u64),

    #[error("destination is on another server")]
    BadGateway,

    #[error("range not satisfiable")]
    RangeNotSatisfiable(u64),
}

pub type Result<T> = std::result::Result<T, DavError>;

// errno values shared by Linux and the BSDs
const ENOTDIR: i32 = 20;
const ENOSPC: i32 = 28;

impl DavError {
    /// Translate a filesystem failure on `path` into the taxonomy
    pub fn from_io(path: &DavPath, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(path.clone()),
            ErrorKind::AlreadyExists => Self::Conflict(path.clone()),
            _ if err.raw_os_error() == Some(ENOTDIR) => Self::Conflict(path.clone()),
            _ if err.raw_os_error() == Some(ENOSPC) => Self::InsufficientStorage(path.clone()),
            _ => Self::InternalStorageError {
                path: path.clone(),
                source: err,
            },
        }
    }
}
