use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

use crate::{Error, Result, from_io};

/// Ensure `path` is a writable directory, creating it and its parents when
/// missing.
pub fn require_directory(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(Error::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|source| Error::Write {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "created destination directory");
        }
        Err(e) => return Err(from_io(path, e)),
    }

    let metadata = fs::metadata(path).map_err(|e| from_io(path, e))?;
    if metadata.permissions().readonly() {
        return Err(Error::NotWritable {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Ensure `path` exists and can be opened for reading.
///
/// Directories are checked by listing them, files by opening them.
pub fn require_readable(path: &Path) -> Result<Metadata> {
    let metadata = fs::metadata(path).map_err(|e| from_io(path, e))?;
    if metadata.is_dir() {
        fs::read_dir(path).map_err(|e| from_io(path, e))?;
    } else {
        fs::File::open(path).map_err(|e| from_io(path, e))?;
    }
    Ok(metadata)
}

/// Like [`require_readable`], but rejects directories.
pub fn require_file(path: &Path) -> Result<Metadata> {
    let metadata = require_readable(path)?;
    if metadata.is_dir() {
        return Err(Error::IsADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(metadata)
}
