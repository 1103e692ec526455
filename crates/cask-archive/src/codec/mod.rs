//! Adapters between the entry-at-a-time protocol and the tar/zip crates.

use std::io::{self, Read, Seek, Write};
use std::time::SystemTime;

use crate::entry::EntryMeta;
use crate::format::ArchiveKind;

pub(crate) mod tar;
pub(crate) mod zip;

/// Forward-only entry reader.
pub(crate) trait CodecReader {
    /// Skip whatever is left of the current entry and decode the next header.
    fn next_entry(&mut self) -> io::Result<Option<EntryMeta>>;

    /// Read data of the current entry; `Ok(0)` at the end of that entry.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Entry writer. Each entry is appended whole, header and payload together.
pub(crate) trait CodecWriter {
    /// Append `entry`, taking exactly `entry.size` bytes from `data` for files.
    fn append(&mut self, entry: &NewEntry<'_>, data: &mut dyn Read) -> io::Result<()>;

    /// Write trailers and flush the underlying sink.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct NewEntry<'a> {
    pub name:         &'a str,
    pub size:         u64,
    pub mode:         u32,
    pub modified:     Option<SystemTime>,
    pub is_directory: bool,
}

/// Reader that owns `source`. Zip needs random access, so the source is
/// spooled first.
pub(crate) fn reader<R: Read + 'static>(
    kind: ArchiveKind,
    source: R,
) -> io::Result<Box<dyn CodecReader>> {
    Ok(match kind {
        ArchiveKind::Tar => Box::new(tar::OwnedTarReader::open(Box::new(source))?),
        ArchiveKind::Zip | ArchiveKind::Jar => Box::new(zip::ZipReader::from_stream(source)?),
    })
}

pub(crate) fn seekable_reader<R: Read + Seek + 'static>(
    kind: ArchiveKind,
    source: R,
) -> io::Result<Box<dyn CodecReader>> {
    Ok(match kind {
        ArchiveKind::Tar => Box::new(tar::OwnedTarReader::open(Box::new(source))?),
        ArchiveKind::Zip | ArchiveKind::Jar => Box::new(zip::ZipReader::new(source)?),
    })
}

/// Hand `f` a reader borrowing `source`; the tar archive lives on this frame.
pub(crate) fn scoped_reader<T>(
    kind: ArchiveKind,
    source: &mut dyn Read,
    f: impl FnOnce(Box<dyn CodecReader + '_>) -> T,
) -> io::Result<T> {
    match kind {
        ArchiveKind::Tar => {
            let mut archive = ::tar::Archive::new(source);
            let reader = tar::TarReader::new(&mut archive)?;
            Ok(f(Box::new(reader)))
        }
        ArchiveKind::Zip | ArchiveKind::Jar => Ok(f(Box::new(zip::ZipReader::from_stream(source)?))),
    }
}

pub(crate) fn writer<'a, W: Write + Seek + 'a>(
    kind: ArchiveKind,
    sink: W,
) -> Box<dyn CodecWriter + 'a> {
    match kind {
        ArchiveKind::Tar => Box::new(tar::TarWriter::new(sink)),
        ArchiveKind::Zip | ArchiveKind::Jar => Box::new(zip::ZipWriter::new(sink)),
    }
}
