use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::format::ArchiveKind;
use crate::mode;
use crate::sanitize::Destination;
use crate::stream::ArchiveStream;
use crate::writer::{self, WriteTarget};

/// Create, extract and stream archives of one format.
pub trait Archiver {
    /// Write `sources` into a new archive named `name` inside `destination`.
    ///
    /// The format suffix is appended to `name` unless already present.
    /// Returns the path of the created archive.
    fn create(&self, name: &str, destination: &Path, sources: &[PathBuf]) -> Result<PathBuf>;

    /// Archive the children of `directory` rather than the directory itself.
    fn create_from_contents(
        &self,
        name: &str,
        destination: &Path,
        directory: &Path,
    ) -> Result<PathBuf> {
        let metadata = cask_fs::require_readable(directory)?;
        if !metadata.is_dir() {
            return self.create(name, destination, &[directory.to_path_buf()]);
        }
        let mut children = fs::read_dir(directory)
            .and_then(|entries| entries.map(|e| e.map(|e| e.path())).collect::<io::Result<Vec<_>>>())
            .map_err(|e| cask_fs::from_io(directory, e))?;
        children.sort();
        self.create(name, destination, &children)
    }

    /// Unpack every entry of `archive` below `destination`.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()>;

    /// Unpack an archive read from `source` below `destination`.
    fn extract_from_reader(&self, source: &mut dyn Read, destination: &Path) -> Result<()>;

    /// Open `archive` for entry-by-entry processing.
    fn stream(&self, archive: &Path) -> Result<ArchiveStream<'static>>;

    /// Full file suffix, such as `.tar` or `.tar.gz`.
    fn extension(&self) -> &str;

    fn archive_kind(&self) -> ArchiveKind;
}

/// [`Archiver`] for an uncompressed archive format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveEngine {
    kind: ArchiveKind,
}

impl ArchiveEngine {
    pub fn new(kind: ArchiveKind) -> Self { Self { kind } }

    /// Name of the archive file `create` produces for `name`.
    pub fn archive_file_name(&self, name: &str) -> String {
        if name.ends_with(self.kind.suffix()) {
            name.to_string()
        } else {
            format!("{name}{}", self.kind.suffix())
        }
    }

    /// Write `sources` as an archive into `sink`.
    pub fn write_archive<W: Write + Seek>(
        &self,
        sink: W,
        sources: &[PathBuf],
        label: &Path,
    ) -> Result<usize> {
        let mut target = WriteTarget::new(self.kind, sink).with_path(label);
        writer::write_sources(sources, &mut target)?;
        let entries = target.entries();
        target.finish()?;
        Ok(entries)
    }
}

impl Archiver for ArchiveEngine {
    fn create(&self, name: &str, destination: &Path, sources: &[PathBuf]) -> Result<PathBuf> {
        cask_fs::require_directory(destination)?;
        writer::validate_sources(sources)?;

        let archive = destination.join(self.archive_file_name(name));
        let file = File::create(&archive).map_err(|e| Error::DestinationInvalid {
            path:   archive.clone(),
            reason: e.to_string(),
        })?;
        let entries = self.write_archive(BufWriter::new(file), sources, &archive)?;

        tracing::debug!(archive = %archive.display(), entries, "created archive");
        Ok(archive)
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let stream = self.stream(archive)?;
        extract_all(stream, destination)?;
        tracing::debug!(archive = %archive.display(), destination = %destination.display(), "extracted archive");
        Ok(())
    }

    fn extract_from_reader(&self, source: &mut dyn Read, destination: &Path) -> Result<()> {
        cask_fs::require_directory(destination)?;
        ArchiveStream::scoped(self.kind, source, |stream| extract_all(stream, destination))
    }

    fn stream(&self, archive: &Path) -> Result<ArchiveStream<'static>> {
        cask_fs::require_file(archive)?;
        let file = File::open(archive).map_err(|e| cask_fs::from_io(archive, e))?;
        let stream = ArchiveStream::open_seekable(self.kind, file).map_err(|e| match e {
            Error::Codec { operation, source, .. } => Error::codec(operation, Some(archive), source),
            other => other,
        })?;
        Ok(stream.with_origin(archive))
    }

    fn extension(&self) -> &str { self.kind.suffix() }

    fn archive_kind(&self) -> ArchiveKind { self.kind }
}

/// Drain `stream` into `destination`, then close it.
///
/// Directory permissions are applied last, deepest first, so a read-only
/// directory does not block its own children.
pub(crate) fn extract_all(mut stream: ArchiveStream<'_>, destination: &Path) -> Result<()> {
    cask_fs::require_directory(destination)?;
    let destination = Destination::new(destination);
    let mut directories = Vec::new();
    let mut count = 0usize;

    while let Some(entry) = stream.advance()? {
        let Some(path) = stream.unpack_current(entry.meta(), &destination)? else {
            continue;
        };
        if entry.is_directory() {
            directories.push((path, entry));
        } else {
            mode::apply(entry.meta(), &path)?;
        }
        count += 1;
    }
    stream.close();

    directories.sort_by(|(a, _), (b, _)| b.components().count().cmp(&a.components().count()));
    for (path, entry) in &directories {
        mode::apply(entry.meta(), path)?;
    }

    tracing::debug!(destination = %destination.root().display(), entries = count, "unpacked entries");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn tree(root: &Path) {
        fs::create_dir_all(root.join("folder")).unwrap();
        fs::write(root.join("file.txt"), b"top level").unwrap();
        fs::write(root.join("folder/nested.txt"), b"nested").unwrap();
    }

    #[test]
    fn create_appends_suffix_once() {
        let engine = ArchiveEngine::new(ArchiveKind::Tar);
        assert_eq!(engine.archive_file_name("backup"), "backup.tar");
        assert_eq!(engine.archive_file_name("backup.tar"), "backup.tar");
    }

    #[test]
    fn round_trip_for_each_kind() {
        for kind in [ArchiveKind::Tar, ArchiveKind::Zip, ArchiveKind::Jar] {
            let dir = tempdir().unwrap();
            let source = dir.path().join("source");
            tree(&source);

            let engine = ArchiveEngine::new(kind);
            let archive = engine
                .create_from_contents("bundle", &dir.path().join("out"), &source)
                .unwrap();
            assert_eq!(archive, dir.path().join("out").join(format!("bundle{}", kind.suffix())));

            let target = dir.path().join("extracted");
            engine.extract(&archive, &target).unwrap();
            assert_eq!(fs::read(target.join("file.txt")).unwrap(), b"top level", "{kind}");
            assert_eq!(fs::read(target.join("folder/nested.txt")).unwrap(), b"nested", "{kind}");
        }
    }

    #[test]
    fn extract_from_reader_matches_extract() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        tree(&source);
        let engine = ArchiveEngine::new(ArchiveKind::Zip);
        let archive = engine.create("bundle", dir.path(), &[source]).unwrap();

        let mut file = File::open(&archive).unwrap();
        let target = dir.path().join("from-reader");
        engine.extract_from_reader(&mut file, &target).unwrap();
        assert_eq!(fs::read(target.join("source/folder/nested.txt")).unwrap(), b"nested");
    }

    #[test]
    fn destination_that_is_a_file_is_invalid() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, b"a").unwrap();

        let engine = ArchiveEngine::new(ArchiveKind::Tar);
        let err = engine.create("x", &blocker, &[source]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationInvalid);
    }

    #[test]
    fn missing_source_writes_nothing() {
        let dir = tempdir().unwrap();
        let engine = ArchiveEngine::new(ArchiveKind::Tar);
        let err = engine
            .create("x", dir.path(), &[dir.path().join("ghost")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
        assert!(!dir.path().join("x.tar").exists());
    }

    #[test]
    fn missing_archive_is_source_not_found() {
        let dir = tempdir().unwrap();
        let engine = ArchiveEngine::new(ArchiveKind::Zip);
        let err = engine.stream(&dir.path().join("none.zip")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    }

    #[test]
    fn garbage_zip_is_codec_failure_with_path() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("bogus.zip");
        fs::write(&bogus, b"this is not a zip").unwrap();
        let err = ArchiveEngine::new(ArchiveKind::Zip).stream(&bogus).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::CodecFailure);
        assert!(err.to_string().contains("bogus.zip"));
    }

    fn raw_tar(entries: &[(&str, tar::EntryType, u32, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, kind, mode, data) in entries {
            let mut header = tar::Header::new_old();
            header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
            header.set_entry_type(*kind);
            header.set_mode(*mode);
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn entries_naming_the_root_leave_its_mode_alone() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let archive = dir.path().join("root.tar");
        fs::write(
            &archive,
            raw_tar(&[
                ("..", tar::EntryType::Regular, 0o600, b"clobber"),
                ("../", tar::EntryType::Directory, 0o777, b""),
                ("kept.txt", tar::EntryType::Regular, 0o644, b"kept"),
            ]),
        )
        .unwrap();
        let target = dir.path().join("out");
        fs::create_dir(&target).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755)).unwrap();

        ArchiveEngine::new(ArchiveKind::Tar).extract(&archive, &target).unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(target.is_dir());
        assert_eq!(fs::read(target.join("kept.txt")).unwrap(), b"kept");
        assert_eq!(fs::read_dir(&target).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_directory_entries_do_not_block_children() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let source = dir.path().join("locked");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("inside.txt"), b"inside").unwrap();
        fs::set_permissions(&source, fs::Permissions::from_mode(0o555)).unwrap();

        let engine = ArchiveEngine::new(ArchiveKind::Tar);
        let archive = engine.create("locked", dir.path(), &[source.clone()]).unwrap();
        fs::set_permissions(&source, fs::Permissions::from_mode(0o755)).unwrap();

        let target = dir.path().join("out");
        engine.extract(&archive, &target).unwrap();
        let extracted = target.join("locked");
        assert_eq!(fs::read(extracted.join("inside.txt")).unwrap(), b"inside");
        let mode = fs::metadata(&extracted).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o555);
        fs::set_permissions(&extracted, fs::Permissions::from_mode(0o755)).unwrap();
    }
}
