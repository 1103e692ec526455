use std::time::SystemTime;

/// Format-specific attributes an entry carries alongside its name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EntryAttributes {
    /// Tar headers always store a mode.
    Tar { mode: u32 },
    /// Zip entries only have a mode when written by a unix host.
    Zip { unix_mode: Option<u32> },
    #[default]
    Opaque,
}

/// Metadata of one archive entry, as reported by the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryMeta {
    /// Raw name from the archive, `/`-separated. Not sanitized.
    pub name:          String,
    /// Uncompressed size, `None` when the format does not know it up front.
    pub size:          Option<u64>,
    pub last_modified: Option<SystemTime>,
    pub is_directory:  bool,
    pub attributes:    EntryAttributes,
}

impl EntryMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:          name.into(),
            size:          None,
            last_modified: None,
            is_directory:  false,
            attributes:    EntryAttributes::Opaque,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_last_modified(mut self, time: SystemTime) -> Self {
        self.last_modified = Some(time);
        self
    }

    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    pub fn with_attributes(mut self, attributes: EntryAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Handle to the entry a stream is positioned on.
///
/// Handles stay valid only until the stream advances or closes; using an old
/// handle is rejected by the stream.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    meta:             EntryMeta,
    pub(crate) token: EntryToken,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EntryToken {
    pub(crate) stream:   u64,
    pub(crate) position: u64,
}

impl ArchiveEntry {
    pub(crate) fn new(meta: EntryMeta, token: EntryToken) -> Self { Self { meta, token } }

    pub fn name(&self) -> &str { &self.meta.name }

    pub fn size(&self) -> Option<u64> { self.meta.size }

    pub fn last_modified(&self) -> Option<SystemTime> { self.meta.last_modified }

    pub fn is_directory(&self) -> bool { self.meta.is_directory }

    pub fn meta(&self) -> &EntryMeta { &self.meta }

    /// Permission bits recorded for this entry, `0` when there are none.
    pub fn mode(&self) -> u32 { crate::mode::extract_mode(&self.meta) }
}
