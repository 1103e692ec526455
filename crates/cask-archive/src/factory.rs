use std::path::Path;

use crate::compress::Compressor;
use crate::decorator::CompressedArchiver;
use crate::engine::{ArchiveEngine, Archiver};
use crate::error::{Error, Result};
use crate::format::{ArchiveKind, CompressionKind, FormatDescriptor, FormatRegistry};

/// Builds archivers and compressors from file names, suffixes or format names.
#[derive(Clone, Copy, Debug)]
pub struct ArchiverFactory<'r> {
    registry: &'r FormatRegistry,
}

impl Default for ArchiverFactory<'static> {
    fn default() -> Self { Self::new() }
}

impl ArchiverFactory<'static> {
    pub fn new() -> Self {
        Self {
            registry: FormatRegistry::standard(),
        }
    }
}

impl<'r> ArchiverFactory<'r> {
    pub fn with_registry(registry: &'r FormatRegistry) -> Self { Self { registry } }

    pub fn registry(&self) -> &'r FormatRegistry { self.registry }

    /// Archiver for an archive file, chosen by its name.
    pub fn for_path(&self, archive: &Path) -> Result<Box<dyn Archiver>> {
        let name = archive
            .file_name()
            .map(|name| name.to_string_lossy())
            .ok_or_else(|| Error::unknown_format(archive.display().to_string()))?;
        self.for_suffix(&name)
    }

    /// Archiver for a suffix such as `.tar.gz`, or any file name ending in one.
    pub fn for_suffix(&self, name: &str) -> Result<Box<dyn Archiver>> {
        let descriptor = self
            .registry
            .lookup(name)
            .ok_or_else(|| Error::unknown_format(name))?;
        Self::for_descriptor(descriptor)
    }

    pub fn for_descriptor(descriptor: &FormatDescriptor) -> Result<Box<dyn Archiver>> {
        match (descriptor.archive_kind(), descriptor.compression_kind()) {
            (Some(archive), Some(compression)) => Ok(Self::compressed(archive, compression)),
            (Some(archive), None) => Ok(Self::archiver(archive)),
            (None, _) => Err(Error::unknown_format(descriptor.suffix())),
        }
    }

    /// Archiver by format name, e.g. `("tar", Some("gz"))`.
    pub fn by_name(archive: &str, compression: Option<&str>) -> Result<Box<dyn Archiver>> {
        let archive: ArchiveKind = archive.parse()?;
        Ok(match compression {
            Some(compression) => Self::compressed(archive, compression.parse()?),
            None => Self::archiver(archive),
        })
    }

    pub fn archiver(kind: ArchiveKind) -> Box<dyn Archiver> { Box::new(ArchiveEngine::new(kind)) }

    pub fn compressed(archive: ArchiveKind, compression: CompressionKind) -> Box<dyn Archiver> {
        Box::new(CompressedArchiver::new(
            ArchiveEngine::new(archive),
            Compressor::new(compression),
        ))
    }

    /// Compressor for a single compressed file, chosen by its name.
    ///
    /// Compressed archives such as `.tar.gz` also resolve, to their outer
    /// compression layer.
    pub fn compressor_for_path(&self, path: &Path) -> Result<Compressor> {
        let name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
        self.registry
            .lookup(&name)
            .and_then(FormatDescriptor::compression_kind)
            .map(Compressor::new)
            .ok_or_else(|| Error::unknown_format(name.into_owned()))
    }
}
