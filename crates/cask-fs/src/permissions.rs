use std::fs::Metadata;
use std::path::Path;

use crate::{Error, Result};

/// Bits of a unix mode that carry owner/group/others permissions.
pub const PERMISSION_MASK: u32 = 0o777;

/// Whether this platform applies POSIX permission bits at all.
///
/// Decided at build time; on other platforms [`apply_mode`] never touches the
/// filesystem.
pub const POSIX_PERMISSIONS: bool = cfg!(unix);

/// One of the nine POSIX permission flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    OwnerRead,
    OwnerWrite,
    OwnerExecute,
    GroupRead,
    GroupWrite,
    GroupExecute,
    OthersRead,
    OthersWrite,
    OthersExecute,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Self::OwnerRead,
        Self::OwnerWrite,
        Self::OwnerExecute,
        Self::GroupRead,
        Self::GroupWrite,
        Self::GroupExecute,
        Self::OthersRead,
        Self::OthersWrite,
        Self::OthersExecute,
    ];

    /// The octal mode bit this flag occupies.
    pub const fn bit(self) -> u32 {
        match self {
            Self::OwnerRead => 0o400,
            Self::OwnerWrite => 0o200,
            Self::OwnerExecute => 0o100,
            Self::GroupRead => 0o040,
            Self::GroupWrite => 0o020,
            Self::GroupExecute => 0o010,
            Self::OthersRead => 0o004,
            Self::OthersWrite => 0o002,
            Self::OthersExecute => 0o001,
        }
    }
}

/// A platform-neutral set of [`Permission`] flags.
///
/// Converting to and from a mode is a bijection on `0..=0o777`; bits outside
/// [`PERMISSION_MASK`] (setuid, sticky, file type) are dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PermissionSet(u16);

impl PermissionSet {
    pub const fn empty() -> Self { Self(0) }

    pub fn from_mode(mode: u32) -> Self {
        Permission::ALL
            .into_iter()
            .filter(|permission| mode & permission.bit() != 0)
            .collect()
    }

    pub fn to_mode(self) -> u32 {
        self.iter().fold(0, |mode, permission| mode | permission.bit())
    }

    pub fn insert(&mut self, permission: Permission) { self.0 |= permission.bit() as u16; }

    pub fn remove(&mut self, permission: Permission) { self.0 &= !(permission.bit() as u16); }

    pub fn contains(self, permission: Permission) -> bool {
        self.0 & permission.bit() as u16 != 0
    }

    pub fn is_empty(self) -> bool { self.0 == 0 }

    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL
            .into_iter()
            .filter(move |permission| self.contains(*permission))
    }

    pub fn is_executable(self) -> bool {
        self.contains(Permission::OwnerExecute)
            || self.contains(Permission::GroupExecute)
            || self.contains(Permission::OthersExecute)
    }

    /// Read the permission set of an existing node.
    ///
    /// Without POSIX permissions only the read-only flag is known, so files
    /// map to `0o644`/`0o444` and directories to `0o755`.
    pub fn of(metadata: &Metadata) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            Self::from_mode(metadata.permissions().mode())
        }

        #[cfg(not(unix))]
        {
            if metadata.is_dir() {
                Self::from_mode(0o755)
            } else if metadata.permissions().readonly() {
                Self::from_mode(0o444)
            } else {
                Self::from_mode(0o644)
            }
        }
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = Self::empty();
        for permission in iter {
            set.insert(permission);
        }
        set
    }
}

/// Mode bits to record for a node when archiving it.
pub fn mode_of(metadata: &Metadata) -> u32 { PermissionSet::of(metadata).to_mode() }

/// Apply the permission bits of `mode` to `path`.
///
/// The mode is masked to `0o777`. A zero result means the archive carried no
/// permission information and nothing is changed. Returns whether the
/// permissions were written.
pub fn apply_mode(path: &Path, mode: u32) -> Result<bool> {
    let mode = mode & PERMISSION_MASK;
    if mode == 0 || !POSIX_PERMISSIONS {
        return Ok(false);
    }

    set_permissions(path, PermissionSet::from_mode(mode))?;
    tracing::trace!(path = %path.display(), mode = format_args!("{mode:o}"), "applied mode");
    Ok(true)
}

#[cfg(unix)]
fn set_permissions(path: &Path, set: PermissionSet) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let perms = std::fs::Permissions::from_mode(set.to_mode());
    std::fs::set_permissions(path, perms).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _set: PermissionSet) -> Result<()> { Ok(()) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_set() {
        for mode in 0..=PERMISSION_MASK {
            assert_eq!(PermissionSet::from_mode(mode).to_mode(), mode, "mode {mode:o}");
        }
    }

    #[test]
    fn set_round_trips_through_mode() {
        let set: PermissionSet = [Permission::OwnerRead, Permission::GroupWrite, Permission::OthersExecute]
            .into_iter()
            .collect();
        assert_eq!(set.to_mode(), 0o421);
        assert_eq!(PermissionSet::from_mode(set.to_mode()), set);
    }

    #[test]
    fn from_mode_drops_high_bits() {
        assert_eq!(PermissionSet::from_mode(0o100755).to_mode(), 0o755);
        assert_eq!(PermissionSet::from_mode(0o4711).to_mode(), 0o711);
    }

    #[test]
    fn bit_table_is_distinct() {
        let combined = Permission::ALL.iter().fold(0, |acc, p| {
            assert_eq!(acc & p.bit(), 0, "{p:?} overlaps");
            acc | p.bit()
        });
        assert_eq!(combined, PERMISSION_MASK);
    }

    #[test]
    fn executable_detection() {
        assert!(PermissionSet::from_mode(0o755).is_executable());
        assert!(PermissionSet::from_mode(0o001).is_executable());
        assert!(!PermissionSet::from_mode(0o644).is_executable());
    }

    #[test]
    fn insert_and_remove() {
        let mut set = PermissionSet::empty();
        assert!(set.is_empty());
        set.insert(Permission::OwnerWrite);
        assert!(set.contains(Permission::OwnerWrite));
        set.remove(Permission::OwnerWrite);
        assert!(set.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn apply_mode_sets_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tool");
        std::fs::write(&path, b"#!/bin/sh\n").expect("write");

        assert!(apply_mode(&path, 0o100755)?);
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & PERMISSION_MASK, 0o755);

        assert!(apply_mode(&path, 0o600)?);
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & PERMISSION_MASK, 0o600);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn zero_mode_leaves_file_untouched() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plain");
        std::fs::write(&path, b"data").expect("write");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).expect("chmod");

        assert!(!apply_mode(&path, 0)?);
        assert!(!apply_mode(&path, 0o7000)?);
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & PERMISSION_MASK, 0o640);
        Ok(())
    }

    #[test]
    fn apply_mode_on_missing_path_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = apply_mode(&dir.path().join("missing"), 0o644);
        if POSIX_PERMISSIONS {
            assert!(matches!(result, Err(Error::Write { .. })));
        } else {
            assert!(matches!(result, Ok(false)));
        }
    }
}
