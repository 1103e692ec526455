use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::{Error, Result};

/// Container formats the engine can read and write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Tar,
    Zip,
    Jar,
}

impl ArchiveKind {
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Tar => ".tar",
            Self::Zip => ".zip",
            Self::Jar => ".jar",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
            Self::Jar => "jar",
        }
    }
}

impl FromStr for ArchiveKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tar" => Ok(Self::Tar),
            "zip" => Ok(Self::Zip),
            "jar" => Ok(Self::Jar),
            _ => Err(Error::unknown_format(s)),
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Single-stream compression wrappers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompressionKind {
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl CompressionKind {
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
            Self::Xz => ".xz",
            Self::Zstd => ".zst",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
            Self::Zstd => "zst",
        }
    }
}

impl FromStr for CompressionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gz" | "gzip" => Ok(Self::Gzip),
            "bz2" | "bzip2" => Ok(Self::Bzip2),
            "xz" => Ok(Self::Xz),
            "zst" | "zstd" => Ok(Self::Zstd),
            _ => Err(Error::unknown_format(s)),
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Maps a file-name suffix to an archive format, a compression format, or
/// both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatDescriptor {
    suffix:      String,
    archive:     Option<ArchiveKind>,
    compression: Option<CompressionKind>,
}

impl FormatDescriptor {
    pub fn archive(suffix: impl Into<String>, kind: ArchiveKind) -> Self {
        Self {
            suffix:      suffix.into(),
            archive:     Some(kind),
            compression: None,
        }
    }

    pub fn compression(suffix: impl Into<String>, kind: CompressionKind) -> Self {
        Self {
            suffix:      suffix.into(),
            archive:     None,
            compression: Some(kind),
        }
    }

    pub fn compressed_archive(
        suffix: impl Into<String>,
        archive: ArchiveKind,
        compression: CompressionKind,
    ) -> Self {
        Self {
            suffix:      suffix.into(),
            archive:     Some(archive),
            compression: Some(compression),
        }
    }

    pub fn suffix(&self) -> &str { &self.suffix }

    pub fn archive_kind(&self) -> Option<ArchiveKind> { self.archive }

    pub fn compression_kind(&self) -> Option<CompressionKind> { self.compression }

    pub fn is_archive(&self) -> bool { self.archive.is_some() }

    pub fn is_compressed(&self) -> bool { self.compression.is_some() }

    fn matches(&self, file_name: &str) -> bool {
        let (name, suffix) = (file_name.as_bytes(), self.suffix.as_bytes());
        name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    }
}

static STANDARD: Lazy<FormatRegistry> = Lazy::new(FormatRegistry::builtin);

/// Suffix lookup table, ordered so that longer suffixes win (`.tar.gz` is
/// matched before `.gz`).
#[derive(Clone, Debug)]
pub struct FormatRegistry {
    descriptors: Vec<FormatDescriptor>,
}

impl FormatRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = FormatDescriptor>) -> Self {
        let mut descriptors: Vec<_> = descriptors.into_iter().collect();
        descriptors.sort_by(|a, b| b.suffix.len().cmp(&a.suffix.len()));
        Self { descriptors }
    }

    /// The process-wide registry of built-in formats.
    pub fn standard() -> &'static FormatRegistry { &STANDARD }

    fn builtin() -> Self {
        use ArchiveKind::*;
        use CompressionKind::*;

        Self::new([
            FormatDescriptor::compressed_archive(".tar.gz", Tar, Gzip),
            FormatDescriptor::compressed_archive(".tgz", Tar, Gzip),
            FormatDescriptor::compressed_archive(".tar.bz2", Tar, Bzip2),
            FormatDescriptor::compressed_archive(".tbz2", Tar, Bzip2),
            FormatDescriptor::compressed_archive(".tar.xz", Tar, Xz),
            FormatDescriptor::compressed_archive(".txz", Tar, Xz),
            FormatDescriptor::compressed_archive(".tar.zst", Tar, Zstd),
            FormatDescriptor::compressed_archive(".tzst", Tar, Zstd),
            FormatDescriptor::archive(".tar", Tar),
            FormatDescriptor::archive(".zip", Zip),
            FormatDescriptor::archive(".zipx", Zip),
            FormatDescriptor::archive(".jar", Jar),
            FormatDescriptor::compression(".gz", Gzip),
            FormatDescriptor::compression(".gzip", Gzip),
            FormatDescriptor::compression(".bz2", Bzip2),
            FormatDescriptor::compression(".xz", Xz),
            FormatDescriptor::compression(".zst", Zstd),
            FormatDescriptor::compression(".zstd", Zstd),
        ])
    }

    /// Find the descriptor whose suffix ends `file_name`, ignoring ASCII case.
    pub fn lookup(&self, file_name: &str) -> Option<&FormatDescriptor> {
        self.descriptors.iter().find(|d| d.matches(file_name))
    }

    pub fn descriptors(&self) -> &[FormatDescriptor] { &self.descriptors }
}
