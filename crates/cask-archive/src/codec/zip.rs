use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::SystemTime;

use chrono::{Datelike, NaiveDate, Timelike, Utc};
use tempfile::SpooledTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive};

use super::{CodecReader, CodecWriter, NewEntry};
use crate::entry::{EntryAttributes, EntryMeta};

/// In-memory limit before spooled data moves to a temporary file.
pub(crate) const SPOOL_THRESHOLD: usize = 8 * 1024 * 1024;

fn zip_error(e: ZipError) -> io::Error {
    match e {
        ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

fn to_system_time(time: DateTime) -> Option<SystemTime> {
    let date = NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?;
    let moment = date.and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )?;
    Some(SystemTime::from(moment.and_utc()))
}

fn to_zip_time(time: SystemTime) -> Option<DateTime> {
    let utc = chrono::DateTime::<Utc>::from(time);
    DateTime::from_date_and_time(
        u16::try_from(utc.year()).ok()?,
        utc.month() as u8,
        utc.day() as u8,
        utc.hour() as u8,
        utc.minute() as u8,
        utc.second() as u8,
    )
    .ok()
}

enum Current {
    Pending(usize),
    Spooled(SpooledTempFile),
}

/// Iterates a zip central directory in order.
///
/// A `ZipFile` borrows its archive, so the current entry's data is
/// decompressed into a spool on first read.
pub(crate) struct ZipReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    next:    usize,
    current: Option<Current>,
}

impl<R: Read + Seek> ZipReader<R> {
    pub(crate) fn new(source: R) -> io::Result<Self> {
        Ok(Self {
            archive: ZipArchive::new(source).map_err(zip_error)?,
            next:    0,
            current: None,
        })
    }

    fn spool(&mut self, index: usize) -> io::Result<SpooledTempFile> {
        let mut file = self.archive.by_index(index).map_err(zip_error)?;
        let mut spool = SpooledTempFile::new(SPOOL_THRESHOLD);
        io::copy(&mut file, &mut spool)?;
        spool.seek(SeekFrom::Start(0))?;
        Ok(spool)
    }
}

impl ZipReader<SpooledTempFile> {
    /// Buffer a forward-only source so the central directory can be reached.
    pub(crate) fn from_stream(mut source: impl Read) -> io::Result<Self> {
        let mut spool = SpooledTempFile::new(SPOOL_THRESHOLD);
        io::copy(&mut source, &mut spool)?;
        spool.seek(SeekFrom::Start(0))?;
        Self::new(spool)
    }
}

impl<R: Read + Seek> CodecReader for ZipReader<R> {
    fn next_entry(&mut self) -> io::Result<Option<EntryMeta>> {
        self.current = None;
        if self.next >= self.archive.len() {
            return Ok(None);
        }

        let index = self.next;
        self.next += 1;
        let file = self.archive.by_index(index).map_err(zip_error)?;
        let meta = EntryMeta {
            name:          file.name().to_string(),
            size:          Some(file.size()),
            last_modified: file.last_modified().and_then(to_system_time),
            is_directory:  file.is_dir(),
            attributes:    EntryAttributes::Zip {
                unix_mode: file.unix_mode(),
            },
        };
        drop(file);

        self.current = Some(Current::Pending(index));
        Ok(Some(meta))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(Current::Pending(index)) = self.current {
            let spool = self.spool(index)?;
            self.current = Some(Current::Spooled(spool));
        }
        match &mut self.current {
            Some(Current::Spooled(spool)) => spool.read(buf),
            _ => Ok(0),
        }
    }
}

pub(crate) struct ZipWriter<W: Write + Seek> {
    zip: zip::ZipWriter<W>,
}

impl<W: Write + Seek> ZipWriter<W> {
    pub(crate) fn new(sink: W) -> Self {
        Self {
            zip: zip::ZipWriter::new(sink),
        }
    }
}

impl<W: Write + Seek> CodecWriter for ZipWriter<W> {
    fn append(&mut self, entry: &NewEntry<'_>, data: &mut dyn Read) -> io::Result<()> {
        let mut options = SimpleFileOptions::default()
            .compression_method(if entry.is_directory {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            })
            .unix_permissions(entry.mode)
            .large_file(entry.size > u64::from(u32::MAX));
        if let Some(time) = entry.modified.and_then(to_zip_time) {
            options = options.last_modified_time(time);
        }

        if entry.is_directory {
            return self.zip.add_directory(entry.name, options).map_err(zip_error);
        }

        self.zip.start_file(entry.name, options).map_err(zip_error)?;
        let copied = io::copy(&mut data.take(entry.size), &mut self.zip)?;
        if copied != entry.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "entry shrank while it was being archived",
            ));
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut sink = self.zip.finish().map_err(zip_error)?;
        sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_sample() -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        let mut writer = Box::new(ZipWriter::new(&mut bytes));
        let folder = NewEntry {
            name:         "folder/",
            size:         0,
            mode:         0o755,
            modified:     None,
            is_directory: true,
        };
        writer.append(&folder, &mut io::empty()).unwrap();
        let nested = NewEntry {
            name:         "folder/nested.txt",
            size:         6,
            mode:         0o640,
            modified:     Some(SystemTime::now()),
            is_directory: false,
        };
        writer.append(&nested, &mut b"nested".as_slice()).unwrap();
        writer.finish().unwrap();
        bytes.into_inner()
    }

    #[test]
    fn short_source_is_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let entry = NewEntry {
            name:         "short.txt",
            size:         10,
            mode:         0o644,
            modified:     None,
            is_directory: false,
        };
        let err = writer.append(&entry, &mut b"abc".as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn written_entries_read_back() {
        let mut reader = ZipReader::new(Cursor::new(write_sample())).unwrap();

        let dir = reader.next_entry().unwrap().unwrap();
        assert!(dir.is_directory);
        assert_eq!(dir.name, "folder/");

        let file = reader.next_entry().unwrap().unwrap();
        assert_eq!(file.name, "folder/nested.txt");
        assert_eq!(file.size, Some(6));
        assert!(file.last_modified.is_some());
        match file.attributes {
            EntryAttributes::Zip { unix_mode: Some(mode) } => assert_eq!(mode & 0o777, 0o640),
            other => panic!("unexpected attributes {other:?}"),
        }

        let mut data = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }
        assert_eq!(data, b"nested");
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn unread_entries_are_skipped() {
        let mut reader = ZipReader::from_stream(Cursor::new(write_sample())).unwrap();
        reader.next_entry().unwrap().unwrap();
        reader.next_entry().unwrap().unwrap();
        assert!(reader.next_entry().unwrap().is_none());
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn raw_names_are_not_sanitized() {
        let mut bytes = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(&mut bytes);
        zip.start_file("../../evil.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"owned").unwrap();
        zip.finish().unwrap();

        let mut reader = ZipReader::new(Cursor::new(bytes.into_inner())).unwrap();
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, "../../evil.txt");
    }

    #[test]
    fn garbage_is_rejected() {
        let err = ZipReader::new(Cursor::new(b"not a zip at all".to_vec())).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn zip_time_round_trips_to_two_seconds() {
        let time = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
        let back = to_system_time(to_zip_time(time).unwrap()).unwrap();
        assert_eq!(back, time);
    }
}
