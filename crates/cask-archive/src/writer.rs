use std::fs::{self, File, Metadata};
use std::io::{self, Seek, Write};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::codec::{self, CodecWriter, NewEntry};
use crate::error::{Error, Result};
use crate::format::ArchiveKind;

/// Exclusive handle on an archive being written.
///
/// Entries are appended whole, so a header is always followed by exactly its
/// payload and closed before the next one starts.
pub struct WriteTarget<'a> {
    writer:  Box<dyn CodecWriter + 'a>,
    path:    Option<PathBuf>,
    entries: usize,
}

impl<'a> WriteTarget<'a> {
    pub fn new<W: Write + Seek + 'a>(kind: ArchiveKind, sink: W) -> Self {
        Self {
            writer:  codec::writer(kind, sink),
            path:    None,
            entries: 0,
        }
    }

    pub(crate) fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn entries(&self) -> usize { self.entries }

    /// Append a directory entry. A trailing `/` is added to `name` if missing.
    pub fn append_dir(&mut self, name: &str, metadata: &Metadata) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        let entry = NewEntry {
            name:         &name,
            size:         0,
            mode:         cask_fs::mode_of(metadata),
            modified:     metadata.modified().ok(),
            is_directory: true,
        };
        self.writer
            .append(&entry, &mut io::empty())
            .map_err(|e| self.codec_error("write directory entry", e))?;
        self.entries += 1;
        tracing::debug!(entry = %name, "archived directory");
        Ok(())
    }

    /// Append the file at `source` under `name`.
    ///
    /// The file is opened before the header is written, so a vanished or
    /// unreadable source leaves the archive untouched.
    pub fn append_file(&mut self, name: &str, source: &Path) -> Result<()> {
        let mut file = File::open(source).map_err(|e| cask_fs::from_io(source, e))?;
        let metadata = file.metadata().map_err(|e| cask_fs::from_io(source, e))?;
        let entry = NewEntry {
            name,
            size: metadata.len(),
            mode: cask_fs::mode_of(&metadata),
            modified: metadata.modified().ok(),
            is_directory: false,
        };
        self.writer
            .append(&entry, &mut file)
            .map_err(|e| self.codec_error("write file entry", e))?;
        self.entries += 1;
        tracing::debug!(entry = name, bytes = metadata.len(), "archived file");
        Ok(())
    }

    /// Write trailers and flush. The archive is only complete after this.
    pub fn finish(self) -> Result<()> {
        let path = self.path;
        self.writer
            .finish()
            .map_err(|e| Error::codec("finish archive", path.as_deref(), e))
    }

    fn codec_error(&self, operation: &'static str, e: std::io::Error) -> Error {
        Error::codec(operation, self.path.as_deref(), e)
    }
}

/// Check every source before anything is written.
pub fn validate_sources(sources: &[PathBuf]) -> Result<()> {
    for source in sources {
        cask_fs::require_readable(source)?;
    }
    Ok(())
}

/// Write each source into `target`.
///
/// A file becomes one entry named by its file name. A directory is walked
/// parent-before-children in file-name order, each entry named relative to the
/// directory's parent so the directory itself is the top-level entry.
pub fn write_sources(sources: &[PathBuf], target: &mut WriteTarget<'_>) -> Result<()> {
    for source in sources {
        let metadata = cask_fs::require_readable(source)?;
        if metadata.is_dir() {
            write_directory(source, target)?;
        } else {
            let name = file_name(source)?;
            target.append_file(&name, source)?;
        }
    }
    Ok(())
}

fn write_directory(source: &Path, target: &mut WriteTarget<'_>) -> Result<()> {
    let root = match source.file_name() {
        Some(_) => source.to_path_buf(),
        None => fs::canonicalize(source).map_err(|e| cask_fs::from_io(source, e))?,
    };
    let base = root.parent().unwrap_or(&root).to_path_buf();

    for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&root).to_path_buf();
            Error::SourceUnreadable {
                path,
                reason: e.to_string(),
            }
        })?;
        let name = entry_name(&base, entry.path())?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            let metadata = entry.metadata().map_err(|e| Error::SourceUnreadable {
                path:   entry.path().to_path_buf(),
                reason: e.to_string(),
            })?;
            target.append_dir(&name, &metadata)?;
        } else if file_type.is_file() {
            target.append_file(&name, entry.path())?;
        } else {
            tracing::warn!(path = %entry.path().display(), "skipping special file");
        }
    }
    Ok(())
}

/// `/`-joined path of `path` relative to `base`.
fn entry_name(base: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_str().ok_or_else(|| non_utf8(path))?);
        }
    }
    Ok(parts.join("/"))
}

fn file_name(path: &Path) -> Result<String> {
    let absolute;
    let path = if path.file_name().is_none() {
        absolute = fs::canonicalize(path).map_err(|e| cask_fs::from_io(path, e))?;
        absolute.as_path()
    } else {
        path
    };
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| non_utf8(path))
}

fn non_utf8(path: &Path) -> Error {
    Error::SourceUnreadable {
        path:   path.to_path_buf(),
        reason: "file name is not valid UTF-8".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn names_of(bytes: Vec<u8>) -> Vec<(String, bool)> {
        let mut archive = tar::Archive::new(Cursor::new(bytes));
        let names = archive
            .entries()
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
                (name, entry.header().entry_type().is_dir())
            })
            .collect();
        names
    }

    #[test]
    fn directory_is_walked_parent_first() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("project");
        fs::create_dir_all(root.join("src/deep")).unwrap();
        fs::write(root.join("README"), b"readme").unwrap();
        fs::write(root.join("src/main.rs"), b"fn main() {}").unwrap();
        fs::write(root.join("src/deep/mod.rs"), b"").unwrap();

        let mut bytes = Vec::new();
        let mut target = WriteTarget::new(ArchiveKind::Tar, Cursor::new(&mut bytes));
        write_sources(&[root], &mut target).unwrap();
        assert_eq!(target.entries(), 6);
        target.finish().unwrap();

        let names = names_of(bytes);
        let position = |name: &str| names.iter().position(|(n, _)| n.trim_end_matches('/') == name).unwrap();
        assert_eq!(position("project"), 0);
        assert!(position("project/src") < position("project/src/main.rs"));
        assert!(position("project/src") < position("project/src/deep"));
        assert!(position("project/src/deep") < position("project/src/deep/mod.rs"));
        assert!(names[position("project/src")].1);
        assert!(!names[position("project/README")].1);
    }

    #[test]
    fn file_source_uses_its_base_name() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("nested").join("notes.txt");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"n").unwrap();

        let mut bytes = Vec::new();
        let mut target = WriteTarget::new(ArchiveKind::Tar, Cursor::new(&mut bytes));
        write_sources(&[file], &mut target).unwrap();
        target.finish().unwrap();

        assert_eq!(names_of(bytes), vec![("notes.txt".to_string(), false)]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_keeps_its_own_name() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        fs::write(real.join("inner.txt"), b"i").unwrap();
        let link = dir.path().join("alias");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let mut bytes = Vec::new();
        let mut target = WriteTarget::new(ArchiveKind::Tar, Cursor::new(&mut bytes));
        write_sources(&[link], &mut target).unwrap();
        target.finish().unwrap();

        let names: Vec<String> = names_of(bytes)
            .into_iter()
            .map(|(name, _)| name.trim_end_matches('/').to_string())
            .collect();
        assert_eq!(names, vec!["alias", "alias/inner.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn special_files_are_skipped() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("plain.txt"), b"p").unwrap();
        let _socket = std::os::unix::net::UnixListener::bind(root.join("daemon.sock")).unwrap();

        let mut bytes = Vec::new();
        let mut target = WriteTarget::new(ArchiveKind::Tar, Cursor::new(&mut bytes));
        write_sources(&[root], &mut target).unwrap();
        assert_eq!(target.entries(), 2);
        target.finish().unwrap();

        assert!(names_of(bytes).iter().all(|(name, _)| !name.contains("daemon.sock")));
    }

    #[test]
    fn missing_source_fails_validation() {
        let dir = tempdir().unwrap();
        let err = validate_sources(&[dir.path().join("ghost")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    }

    #[test]
    fn entry_names_use_forward_slashes() {
        let base = Path::new("base");
        let name = entry_name(base, &base.join("a").join("b.txt")).unwrap();
        assert_eq!(name, "a/b.txt");
    }
}
