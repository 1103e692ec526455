//! Archive creation, extraction and streaming over tar and zip, with
//! gzip/xz/zstd wrappers.
//!
//! # Architecture
//!
//! - `format.rs` - Suffix registry and format kinds
//! - `engine.rs` - `Archiver` trait and the plain-format engine
//! - `decorator.rs` - Compression layered over an engine
//! - `stream.rs` - Single-pass entry cursor
//! - `writer.rs` - Source walking and entry writing
//! - `sanitize.rs` - Path containment (zip-slip prevention)
//! - `mode.rs` - Permission translation per format
//! - `codec/` - Adapters over the tar and zip crates
//!
//! ```no_run
//! use std::path::Path;
//! use cask_archive::{Archiver, ArchiverFactory};
//!
//! let archiver = ArchiverFactory::new().for_suffix(".tar.gz")?;
//! let archive = archiver.create("backup", Path::new("/tmp"), &["./data".into()])?;
//! archiver.extract(&archive, Path::new("/tmp/restored"))?;
//! # Ok::<(), cask_archive::Error>(())
//! ```

mod codec;
pub mod compress;
mod decorator;
mod engine;
pub mod entry;
mod error;
mod factory;
pub mod format;
pub mod mode;
pub mod sanitize;
mod stream;
mod writer;

pub use compress::Compressor;
pub use decorator::CompressedArchiver;
pub use engine::{ArchiveEngine, Archiver};
pub use entry::{ArchiveEntry, EntryAttributes, EntryMeta};
pub use error::{CursorFault, Error, ErrorKind, Result};
pub use factory::ArchiverFactory;
pub use format::{ArchiveKind, CompressionKind, FormatDescriptor, FormatRegistry};
pub use stream::ArchiveStream;
pub use writer::{WriteTarget, validate_sources, write_sources};
