use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::{self, CodecReader};
use crate::entry::{ArchiveEntry, EntryMeta, EntryToken};
use crate::error::{CursorFault, Error, Result};
use crate::format::ArchiveKind;
use crate::mode;
use crate::sanitize::Destination;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Single-pass cursor over the entries of an archive.
///
/// [`advance`](Self::advance) moves to the next entry and hands out an
/// [`ArchiveEntry`]. Reading and extracting only accept the handle of the
/// entry the stream is currently positioned on; older handles, handles from
/// other streams and any use after [`close`](Self::close) fail with
/// [`Error::InvalidCursorState`].
pub struct ArchiveStream<'a> {
    id:        u64,
    kind:      ArchiveKind,
    origin:    Option<PathBuf>,
    reader:    Option<Box<dyn CodecReader + 'a>>,
    current:   Option<ArchiveEntry>,
    position:  u64,
    exhausted: bool,
}

impl ArchiveStream<'static> {
    /// Stream that owns a forward-only byte source.
    pub fn open<R: Read + 'static>(kind: ArchiveKind, source: R) -> Result<Self> {
        let reader = codec::reader(kind, source).map_err(|e| Error::codec("open archive", None, e))?;
        Ok(Self::with_reader(kind, reader, None))
    }

    /// Stream over a seekable source, letting zip read its directory in place.
    pub fn open_seekable<R: Read + Seek + 'static>(kind: ArchiveKind, source: R) -> Result<Self> {
        let reader =
            codec::seekable_reader(kind, source).map_err(|e| Error::codec("open archive", None, e))?;
        Ok(Self::with_reader(kind, reader, None))
    }
}

impl<'a> ArchiveStream<'a> {
    /// Run `f` over a stream that borrows `source` for the duration of the call.
    pub fn scoped<T>(
        kind: ArchiveKind,
        source: &mut dyn Read,
        f: impl FnOnce(ArchiveStream<'_>) -> Result<T>,
    ) -> Result<T> {
        codec::scoped_reader(kind, source, |reader| f(ArchiveStream::with_reader(kind, reader, None)))
            .map_err(|e| Error::codec("open archive", None, e))?
    }

    pub(crate) fn with_reader(
        kind: ArchiveKind,
        reader: Box<dyn CodecReader + 'a>,
        origin: Option<PathBuf>,
    ) -> Self {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(stream = id, %kind, "opened archive stream");
        Self {
            id,
            kind,
            origin,
            reader: Some(reader),
            current: None,
            position: 0,
            exhausted: false,
        }
    }

    pub(crate) fn with_origin(mut self, origin: &Path) -> Self {
        self.origin = Some(origin.to_path_buf());
        self
    }

    pub fn kind(&self) -> ArchiveKind { self.kind }

    pub fn is_closed(&self) -> bool { self.reader.is_none() }

    pub fn current_entry(&self) -> Option<&ArchiveEntry> { self.current.as_ref() }

    /// Move to the next entry, skipping unread data of the current one.
    ///
    /// Returns `Ok(None)` once the archive is exhausted, and keeps doing so.
    pub fn advance(&mut self) -> Result<Option<ArchiveEntry>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or(Error::InvalidCursorState(CursorFault::Closed))?;
        self.current = None;
        if self.exhausted {
            return Ok(None);
        }

        let next = reader
            .next_entry()
            .map_err(|e| Error::codec("read entry header", self.origin.as_deref(), e))?;
        let Some(meta) = next else {
            self.exhausted = true;
            tracing::trace!(stream = self.id, "archive exhausted");
            return Ok(None);
        };

        self.position += 1;
        let entry = ArchiveEntry::new(meta, EntryToken {
            stream:   self.id,
            position: self.position,
        });
        tracing::trace!(stream = self.id, entry = entry.name(), "advanced");
        self.current = Some(entry.clone());
        Ok(Some(entry))
    }

    /// Read data of `entry`, which must be the current entry.
    ///
    /// `Ok(0)` marks the end of this entry's data, not of the archive.
    pub fn read_bytes(&mut self, entry: &ArchiveEntry, buf: &mut [u8]) -> Result<usize> {
        self.check(entry)?;
        self.read_current(buf)
    }

    /// Write `entry` below `destination` and return the path it landed on.
    ///
    /// Directories are created, files receive whatever data has not been
    /// read yet, and the recorded permissions are applied. `None` means the
    /// entry resolved to the destination root itself and was skipped.
    pub fn extract(&mut self, entry: &ArchiveEntry, destination: &Path) -> Result<Option<PathBuf>> {
        self.check(entry)?;
        cask_fs::require_directory(destination)?;
        let destination = Destination::new(destination);
        let path = self.unpack_current(entry.meta(), &destination)?;
        if let Some(path) = &path {
            mode::apply(entry.meta(), path)?;
        }
        Ok(path)
    }

    /// Release the underlying source. Calling it again has no effect.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::trace!(stream = self.id, "closed archive stream");
        }
        self.current = None;
    }

    fn check(&self, entry: &ArchiveEntry) -> Result<()> {
        if self.reader.is_none() {
            return Err(Error::InvalidCursorState(CursorFault::Closed));
        }
        match &self.current {
            None => Err(Error::InvalidCursorState(CursorFault::NoCurrentEntry)),
            Some(current) if current.token != entry.token => {
                Err(Error::InvalidCursorState(CursorFault::StaleEntry))
            }
            Some(_) => Ok(()),
        }
    }

    fn read_current(&mut self, buf: &mut [u8]) -> Result<usize> {
        let reader = self
            .reader
            .as_mut()
            .ok_or(Error::InvalidCursorState(CursorFault::Closed))?;
        if self.current.is_none() {
            return Err(Error::InvalidCursorState(CursorFault::NoCurrentEntry));
        }
        reader
            .read(buf)
            .map_err(|e| Error::codec("read entry data", self.origin.as_deref(), e))
    }

    /// Write the current entry without touching permissions. The caller has
    /// already validated the handle and the destination.
    ///
    /// An entry that resolves to the destination root is not materialized and
    /// yields `None`, so the root keeps its own permissions.
    pub(crate) fn unpack_current(
        &mut self,
        meta: &EntryMeta,
        destination: &Destination,
    ) -> Result<Option<PathBuf>> {
        let path = destination.resolve(&meta.name);
        if path == destination.root() {
            tracing::warn!(entry = %meta.name, "entry resolves to the destination root, skipping");
            self.copy_current(&mut io::sink())?;
            return Ok(None);
        }

        if meta.is_directory {
            fs::create_dir_all(&path).map_err(|source| cask_fs::Error::Write {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(entry = %meta.name, path = %path.display(), "extracted directory");
            return Ok(Some(path));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| cask_fs::Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut file = File::create(&path).map_err(|source| cask_fs::Error::Write {
            path: path.clone(),
            source,
        })?;
        let written = self.copy_current(&mut file)?;
        tracing::debug!(entry = %meta.name, path = %path.display(), bytes = written, "extracted file");
        Ok(Some(path))
    }

    fn copy_current(&mut self, sink: &mut impl Write) -> Result<u64> {
        let mut buf = [0u8; 8192];
        let mut total = 0;
        loop {
            let n = self.read_current(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            sink.write_all(&buf[..n])?;
            total += n as u64;
        }
    }
}

impl Read for ArchiveStream<'_> {
    /// Read data of the current entry.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_current(buf).map_err(|e| match e {
            Error::Codec { source, .. } | Error::Io(source) => source,
            other => io::Error::other(other),
        })
    }
}

impl Drop for ArchiveStream<'_> {
    fn drop(&mut self) { self.close(); }
}
