use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("source not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("source is not readable: {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("invalid destination: {path}: {reason}")]
    DestinationInvalid { path: PathBuf, reason: String },

    #[error("access control or other error opening '{path}': {source}")]
    AccessDenied { path: PathBuf, source: io::Error },

    #[error("invalid stream state: {0}")]
    InvalidCursorState(CursorFault),

    #[error("unknown archive format: '{name}'")]
    UnknownFormat { name: String },

    #[error("failed to {operation} {}: {source}", describe(.path.as_deref()))]
    Codec {
        operation: &'static str,
        path: Option<PathBuf>,
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why an entry-scoped call on a stream was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorFault {
    Closed,
    NoCurrentEntry,
    StaleEntry,
}

impl fmt::Display for CursorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "stream has already been closed",
            Self::NoCurrentEntry => "stream is not positioned on an entry",
            Self::StaleEntry => "entry is not the stream's current entry",
        })
    }
}

/// Flat classification of [`Error`] for callers that branch on the failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    SourceNotFound,
    SourceUnreadable,
    DestinationInvalid,
    AccessDenied,
    InvalidCursorState,
    UnknownFormat,
    CodecFailure,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            Self::SourceUnreadable { .. } => ErrorKind::SourceUnreadable,
            Self::DestinationInvalid { .. } => ErrorKind::DestinationInvalid,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::InvalidCursorState(_) => ErrorKind::InvalidCursorState,
            Self::UnknownFormat { .. } => ErrorKind::UnknownFormat,
            Self::Codec { .. } => ErrorKind::CodecFailure,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn codec(operation: &'static str, path: Option<&Path>, source: io::Error) -> Self {
        Self::Codec {
            operation,
            path: path.map(Path::to_path_buf),
            source,
        }
    }

    pub(crate) fn unknown_format(name: impl Into<String>) -> Self {
        Self::UnknownFormat { name: name.into() }
    }
}

fn describe(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!("'{}'", path.display()),
        None => "archive stream".to_string(),
    }
}

impl From<cask_fs::Error> for Error {
    fn from(e: cask_fs::Error) -> Self {
        use cask_fs::Error as Fs;

        match e {
            Fs::NotFound { path } => Self::SourceNotFound { path },
            Fs::PermissionDenied { path } => Self::SourceUnreadable {
                path,
                reason: "permission denied".to_string(),
            },
            Fs::IsADirectory { path } => Self::SourceUnreadable {
                path,
                reason: "is a directory".to_string(),
            },
            Fs::Read { path, source } => Self::SourceUnreadable {
                path,
                reason: source.to_string(),
            },
            Fs::NotADirectory { path } => Self::DestinationInvalid {
                path,
                reason: "is not a directory".to_string(),
            },
            Fs::NotWritable { path } => Self::DestinationInvalid {
                path,
                reason: "is not writable".to_string(),
            },
            Fs::Write { path, source } => Self::DestinationInvalid {
                path,
                reason: source.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
