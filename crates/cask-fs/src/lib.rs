//! Filesystem primitives for the archive layer.
//!
//! - `permissions` - portable permission sets and POSIX mode application
//! - `dir` - destination and source validation

mod dir;
mod error;
pub mod permissions;

pub use dir::{require_directory, require_file, require_readable};
pub use error::{Error, Result, from_io};
pub use permissions::{Permission, PermissionSet, apply_mode, mode_of};
