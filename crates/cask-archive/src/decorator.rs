use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::compress::{Compressor, Decoder};
use crate::engine::{self, ArchiveEngine, Archiver};
use crate::error::{Error, Result};
use crate::format::ArchiveKind;
use crate::stream::ArchiveStream;
use crate::writer;

/// An [`Archiver`] whose archives are wrapped in a compression stream, such
/// as `.tar.gz`.
///
/// Creating goes through a temporary plain archive in the destination
/// directory, which is removed on every exit path. Extracting and streaming
/// decompress on the fly.
#[derive(Clone, Debug)]
pub struct CompressedArchiver {
    engine:     ArchiveEngine,
    compressor: Compressor,
    extension:  String,
}

impl CompressedArchiver {
    pub fn new(engine: ArchiveEngine, compressor: Compressor) -> Self {
        let extension = format!("{}{}", engine.extension(), compressor.extension());
        Self {
            engine,
            compressor,
            extension,
        }
    }

    pub fn engine(&self) -> &ArchiveEngine { &self.engine }

    pub fn compressor(&self) -> &Compressor { &self.compressor }

    /// Name of the file `create` produces for `name`.
    ///
    /// `a.tar.gz` stays as is, `a.tar` becomes `a.tar.gz`, anything else gets
    /// the full suffix.
    pub fn archive_file_name(&self, name: &str) -> String {
        if name.ends_with(&self.extension) {
            name.to_string()
        } else if name.ends_with(self.engine.extension()) {
            format!("{name}{}", self.compressor.extension())
        } else {
            format!("{name}{}", self.extension)
        }
    }

    /// Compress `plain` into a new file at `archive`, removing it again if
    /// anything fails part way.
    fn write_compressed(&self, plain: &mut dyn Read, archive: &Path) -> Result<()> {
        let output = File::create(archive).map_err(|e| Error::DestinationInvalid {
            path:   archive.to_path_buf(),
            reason: e.to_string(),
        })?;
        let written = self
            .compressor
            .compressing_writer(BufWriter::new(output))
            .and_then(|mut encoder| {
                io::copy(plain, &mut encoder)
                    .and_then(|_| encoder.finish())
                    .and_then(|mut sink| sink.flush())
                    .map_err(|e| Error::codec("compress archive", Some(archive), e))
            });
        if written.is_err() {
            if let Err(e) = fs::remove_file(archive) {
                tracing::warn!(archive = %archive.display(), error = %e, "failed to remove incomplete archive");
            }
        }
        written
    }

    fn open_compressed(&self, archive: &Path) -> Result<Decoder<BufReader<File>>> {
        if !archive.exists() {
            return Err(Error::SourceNotFound {
                path: archive.to_path_buf(),
            });
        }
        cask_fs::require_file(archive)?;
        let file = File::open(archive).map_err(|e| reclassify_open_error(archive, e))?;
        self.compressor.decompressing_reader(BufReader::new(file))
    }
}

/// The archive was just seen to exist, so failing to open it means access was
/// refused rather than the file being absent.
fn reclassify_open_error(path: &Path, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => Error::AccessDenied {
            path:   path.to_path_buf(),
            source: e,
        },
        _ => Error::SourceUnreadable {
            path:   path.to_path_buf(),
            reason: e.to_string(),
        },
    }
}

impl Archiver for CompressedArchiver {
    fn create(&self, name: &str, destination: &Path, sources: &[PathBuf]) -> Result<PathBuf> {
        cask_fs::require_directory(destination)?;
        writer::validate_sources(sources)?;

        let archive = destination.join(self.archive_file_name(name));
        let mut temp = tempfile::Builder::new()
            .prefix(".cask-")
            .suffix(self.engine.extension())
            .tempfile_in(destination)
            .map_err(|e| Error::DestinationInvalid {
                path:   destination.to_path_buf(),
                reason: e.to_string(),
            })?;
        let temp_path = temp.path().to_path_buf();
        tracing::debug!(temp = %temp_path.display(), "writing plain archive");

        self.engine
            .write_archive(BufWriter::new(temp.as_file_mut()), sources, &temp_path)?;
        temp.as_file_mut()
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::codec("rewind archive", Some(&temp_path), e))?;

        self.write_compressed(&mut BufReader::new(temp.as_file_mut()), &archive)?;

        if let Err(e) = temp.close() {
            tracing::warn!(temp = %temp_path.display(), error = %e, "failed to remove temporary archive");
        }
        tracing::debug!(archive = %archive.display(), "created compressed archive");
        Ok(archive)
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let decoder = self.open_compressed(archive)?;
        let stream = ArchiveStream::open(self.engine.archive_kind(), decoder)
            .map_err(|e| with_archive_path(e, archive))?
            .with_origin(archive);
        engine::extract_all(stream, destination)?;
        tracing::debug!(archive = %archive.display(), destination = %destination.display(), "extracted compressed archive");
        Ok(())
    }

    fn extract_from_reader(&self, source: &mut dyn Read, destination: &Path) -> Result<()> {
        let mut decoder = self.compressor.decompressing_reader(source)?;
        self.engine.extract_from_reader(&mut decoder, destination)
    }

    fn stream(&self, archive: &Path) -> Result<ArchiveStream<'static>> {
        let decoder = self.open_compressed(archive)?;
        let stream = ArchiveStream::open(self.engine.archive_kind(), decoder)
            .map_err(|e| with_archive_path(e, archive))?;
        Ok(stream.with_origin(archive))
    }

    fn extension(&self) -> &str { &self.extension }

    fn archive_kind(&self) -> ArchiveKind { self.engine.archive_kind() }
}

fn with_archive_path(e: Error, archive: &Path) -> Error {
    match e {
        Error::Codec {
            operation, source, ..
        } => Error::codec(operation, Some(archive), source),
        other => other,
    }
}
