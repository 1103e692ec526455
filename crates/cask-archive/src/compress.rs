use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::format::CompressionKind;

/// Streaming decompressor for one [`CompressionKind`].
pub enum Decoder<R: Read> {
    Gzip(flate2::read::MultiGzDecoder<R>),
    #[cfg(feature = "bzip2")]
    Bzip2(bzip2::read::MultiBzDecoder<R>),
    #[cfg(feature = "xz")]
    Xz(xz2::read::XzDecoder<R>),
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::read::Decoder<'static, BufReader<R>>),
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(d) => d.read(buf),
            #[cfg(feature = "bzip2")]
            Self::Bzip2(d) => d.read(buf),
            #[cfg(feature = "xz")]
            Self::Xz(d) => d.read(buf),
            #[cfg(feature = "zstd")]
            Self::Zstd(d) => d.read(buf),
        }
    }
}

/// Streaming compressor. Call [`Encoder::finish`] to write the trailer;
/// dropping an encoder may leave a truncated stream.
pub enum Encoder<W: Write> {
    Gzip(flate2::write::GzEncoder<W>),
    #[cfg(feature = "bzip2")]
    Bzip2(bzip2::write::BzEncoder<W>),
    #[cfg(feature = "xz")]
    Xz(xz2::write::XzEncoder<W>),
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Gzip(e) => e.finish(),
            #[cfg(feature = "bzip2")]
            Self::Bzip2(e) => e.finish(),
            #[cfg(feature = "xz")]
            Self::Xz(e) => e.finish(),
            #[cfg(feature = "zstd")]
            Self::Zstd(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(e) => e.write(buf),
            #[cfg(feature = "bzip2")]
            Self::Bzip2(e) => e.write(buf),
            #[cfg(feature = "xz")]
            Self::Xz(e) => e.write(buf),
            #[cfg(feature = "zstd")]
            Self::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Gzip(e) => e.flush(),
            #[cfg(feature = "bzip2")]
            Self::Bzip2(e) => e.flush(),
            #[cfg(feature = "xz")]
            Self::Xz(e) => e.flush(),
            #[cfg(feature = "zstd")]
            Self::Zstd(e) => e.flush(),
        }
    }
}

/// Single-stream compressor for files and byte streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Compressor {
    kind:  CompressionKind,
    level: Option<u32>,
}

impl Compressor {
    pub fn new(kind: CompressionKind) -> Self { Self { kind, level: None } }

    /// Codec-specific compression level; the codec default when unset.
    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn kind(&self) -> CompressionKind { self.kind }

    pub fn extension(&self) -> &'static str { self.kind.suffix() }

    pub fn compressing_writer<W: Write>(&self, sink: W) -> Result<Encoder<W>> {
        match self.kind {
            CompressionKind::Gzip => {
                let level = self
                    .level
                    .map_or_else(flate2::Compression::default, |l| flate2::Compression::new(l.min(9)));
                Ok(Encoder::Gzip(flate2::write::GzEncoder::new(sink, level)))
            }
            #[cfg(feature = "bzip2")]
            CompressionKind::Bzip2 => {
                let level = bzip2::Compression::new(self.level.unwrap_or(6).clamp(1, 9));
                Ok(Encoder::Bzip2(bzip2::write::BzEncoder::new(sink, level)))
            }
            #[cfg(feature = "xz")]
            CompressionKind::Xz => Ok(Encoder::Xz(xz2::write::XzEncoder::new(
                sink,
                self.level.unwrap_or(6).min(9),
            ))),
            #[cfg(feature = "zstd")]
            CompressionKind::Zstd => {
                let level = self.level.map_or(0, |l| l.min(22) as i32);
                let encoder = zstd::stream::write::Encoder::new(sink, level)
                    .map_err(|e| Error::codec("start zstd stream", None, e))?;
                Ok(Encoder::Zstd(encoder))
            }
            #[allow(unreachable_patterns)]
            other => Err(Error::unknown_format(other.name())),
        }
    }

    pub fn decompressing_reader<R: Read>(&self, source: R) -> Result<Decoder<R>> {
        match self.kind {
            CompressionKind::Gzip => Ok(Decoder::Gzip(flate2::read::MultiGzDecoder::new(source))),
            #[cfg(feature = "bzip2")]
            CompressionKind::Bzip2 => Ok(Decoder::Bzip2(bzip2::read::MultiBzDecoder::new(source))),
            #[cfg(feature = "xz")]
            CompressionKind::Xz => Ok(Decoder::Xz(xz2::read::XzDecoder::new(source))),
            #[cfg(feature = "zstd")]
            CompressionKind::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(source)
                    .map_err(|e| Error::codec("open zstd stream", None, e))?;
                Ok(Decoder::Zstd(decoder))
            }
            #[allow(unreachable_patterns)]
            other => Err(Error::unknown_format(other.name())),
        }
    }

    /// Compress the file `source` into the file `destination`.
    pub fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        let input = open_source(source)?;
        let output = create_destination(destination)?;

        let mut encoder = self.compressing_writer(BufWriter::new(output))?;
        io::copy(&mut BufReader::new(input), &mut encoder)
            .map_err(|e| Error::codec("compress", Some(destination), e))?;
        encoder
            .finish()
            .and_then(|mut sink| sink.flush())
            .map_err(|e| Error::codec("compress", Some(destination), e))?;

        tracing::debug!(source = %source.display(), destination = %destination.display(), codec = %self.kind, "compressed file");
        Ok(())
    }

    /// Decompress the file `source` into the file `destination`.
    pub fn decompress(&self, source: &Path, destination: &Path) -> Result<()> {
        let input = open_source(source)?;
        let output = create_destination(destination)?;

        let mut decoder = self.decompressing_reader(BufReader::new(input))?;
        let mut sink = BufWriter::new(output);
        io::copy(&mut decoder, &mut sink)
            .and_then(|_| sink.flush())
            .map_err(|e| Error::codec("decompress", Some(source), e))?;

        tracing::debug!(source = %source.display(), destination = %destination.display(), codec = %self.kind, "decompressed file");
        Ok(())
    }
}

fn open_source(path: &Path) -> Result<File> {
    cask_fs::require_file(path)?;
    File::open(path).map_err(|e| cask_fs::from_io(path, e).into())
}

fn create_destination(path: &Path) -> Result<File> {
    if path.is_dir() {
        return Err(Error::DestinationInvalid {
            path:   path.to_path_buf(),
            reason: "is a directory".to_string(),
        });
    }
    File::create(path).map_err(|e| Error::DestinationInvalid {
        path:   path.to_path_buf(),
        reason: e.to_string(),
    })
}
