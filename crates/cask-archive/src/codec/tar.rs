use std::io::{self, Read, Write};
use std::time::{Duration, UNIX_EPOCH};

use ouroboros::self_referencing;
use tar::{Archive, Builder, Entries, Entry, EntryType, Header};

use super::{CodecReader, CodecWriter, NewEntry};
use crate::entry::{EntryAttributes, EntryMeta};

/// Entry cursor over a [`tar::Archive`] held by the caller.
///
/// Long names and PAX records are merged by [`tar::Entries`]; links and
/// special files are skipped.
pub(crate) struct TarReader<'a, R: Read + 'a> {
    entries: Entries<'a, R>,
    current: Option<Entry<'a, R>>,
}

impl<'a, R: Read + 'a> TarReader<'a, R> {
    pub(crate) fn new(archive: &'a mut Archive<R>) -> io::Result<Self> {
        Ok(Self {
            entries: archive.entries()?,
            current: None,
        })
    }
}

fn describe<R: Read>(entry: &Entry<'_, R>) -> io::Result<EntryMeta> {
    let header = entry.header();
    let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
    let is_directory = header.entry_type().is_dir() || name.ends_with('/');

    let meta = EntryMeta::new(name)
        .with_size(entry.size())
        .with_last_modified(UNIX_EPOCH + Duration::from_secs(header.mtime()?))
        .with_attributes(EntryAttributes::Tar {
            mode: header.mode()?,
        });
    Ok(if is_directory { meta.directory() } else { meta })
}

impl<'a, R: Read + 'a> CodecReader for TarReader<'a, R> {
    fn next_entry(&mut self) -> io::Result<Option<EntryMeta>> {
        self.current = None;
        for entry in self.entries.by_ref() {
            let entry = entry?;
            let kind = entry.header().entry_type();
            if !(kind.is_file() || kind.is_dir() || kind == EntryType::Continuous) {
                tracing::debug!(
                    entry = %String::from_utf8_lossy(&entry.path_bytes()),
                    kind = ?kind,
                    "skipping non-regular tar entry"
                );
                continue;
            }
            let meta = describe(&entry)?;
            self.current = Some(entry);
            return Ok(Some(meta));
        }
        Ok(None)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.current {
            Some(entry) => entry.read(buf),
            None => Ok(0),
        }
    }
}

/// [`TarReader`] that owns its archive, for streams outliving the caller.
#[self_referencing]
pub(crate) struct OwnedTarReader {
    archive: Archive<Box<dyn Read>>,
    #[borrows(mut archive)]
    #[not_covariant]
    cursor: TarReader<'this, Box<dyn Read>>,
}

impl OwnedTarReader {
    pub(crate) fn open(source: Box<dyn Read>) -> io::Result<Self> {
        OwnedTarReader::try_new(Archive::new(source), |archive| TarReader::new(archive))
    }
}

impl CodecReader for OwnedTarReader {
    fn next_entry(&mut self) -> io::Result<Option<EntryMeta>> {
        self.with_cursor_mut(|cursor| cursor.next_entry())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_cursor_mut(|cursor| cursor.read(buf))
    }
}

pub(crate) struct TarWriter<W: Write> {
    builder: Builder<W>,
}

impl<W: Write> TarWriter<W> {
    pub(crate) fn new(sink: W) -> Self {
        Self {
            builder: Builder::new(sink),
        }
    }
}

impl<W: Write> CodecWriter for TarWriter<W> {
    fn append(&mut self, entry: &NewEntry<'_>, data: &mut dyn Read) -> io::Result<()> {
        let mut header = Header::new_gnu();
        header.set_mode(entry.mode);
        header.set_mtime(
            entry
                .modified
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs()),
        );

        if entry.is_directory {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            return self.builder.append_data(&mut header, entry.name, io::empty());
        }

        header.set_entry_type(EntryType::Regular);
        header.set_size(entry.size);
        let mut data = data.take(entry.size);
        self.builder.append_data(&mut header, entry.name, &mut data)?;
        if data.limit() > 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "entry shrank while it was being archived",
            ));
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut sink = self.builder.into_inner()?;
        sink.flush()
    }
}
