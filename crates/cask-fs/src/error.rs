use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("path not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("is a directory: {path}")]
    IsADirectory { path: PathBuf },

    #[error("directory is not writable: {path}")]
    NotWritable { path: PathBuf },

    #[error("failed to read '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },
}

impl Error {
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound { path }
            | Self::PermissionDenied { path }
            | Self::NotADirectory { path }
            | Self::IsADirectory { path }
            | Self::NotWritable { path }
            | Self::Read { path, .. }
            | Self::Write { path, .. } => path,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Classify an io error raised while inspecting or reading `path`.
pub fn from_io(path: &Path, err: io::Error) -> Error {
    let path = path.to_path_buf();
    match err.kind() {
        io::ErrorKind::NotFound => Error::NotFound { path },
        io::ErrorKind::PermissionDenied => Error::PermissionDenied { path },
        _ => Error::Read { path, source: err },
    }
}
