use std::path::Path;

use crate::entry::{EntryAttributes, EntryMeta};
use crate::error::Result;

/// Mode bits recorded for an entry.
///
/// Returns `0` when the format stored none, which callers treat as "leave the
/// extracted node's permissions alone".
pub fn extract_mode(meta: &EntryMeta) -> u32 {
    match meta.attributes {
        EntryAttributes::Tar { mode } => mode,
        EntryAttributes::Zip { unix_mode } => unix_mode.unwrap_or(0),
        EntryAttributes::Opaque => 0,
    }
}

/// Copy the entry's permissions onto an extracted node.
pub fn apply(meta: &EntryMeta, path: &Path) -> Result<()> {
    cask_fs::apply_mode(path, extract_mode(meta))?;
    Ok(())
}
