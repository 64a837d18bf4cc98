//! Pluggable compression support for record archives.
//!
//! Archives are identified by their file extension (`.zst`, `.xz`, `.bz2`),
//! falling back to magic bytes when a file is read under an unexpected name.
//! Files with no recognised extension or signature are treated as plain
//! newline-delimited JSON.
//!
//! ## Built-in Codecs
//!
//! - **Zstd** (`.zst`) - via `zstd` crate (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` crate (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` crate (feature: `compression-xz`)
//!
//! ## Finishing Writers
//!
//! Encoders buffer a trailer that is only emitted when the stream is finished.
//! Writers are therefore handed out as [`FinishWrite`] objects which must be
//! [finalized](FinishWrite::finalize); a writer that is dropped instead leaves
//! its [`StagedFile`] uncommitted and the partial output is discarded.

use crate::error::{ExtractError, Result};
use crate::staged::StagedFile;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Compression algorithms understood by the codec layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum Algorithm {
    /// Zstandard.
    #[value(name = "zst")]
    Zst,
    /// LZMA2 in the xz container.
    #[value(name = "xz")]
    Xz,
    /// Bzip2.
    #[value(name = "bz2")]
    Bz2,
}

impl Algorithm {
    /// Every supported algorithm.
    pub const ALL: [Algorithm; 3] = [Algorithm::Zst, Algorithm::Xz, Algorithm::Bz2];

    /// File extension without the leading dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zst => "zst",
            Self::Xz => "xz",
            Self::Bz2 => "bz2",
        }
    }

    /// Detect the algorithm from a path's final extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|a| a.extension().eq_ignore_ascii_case(ext))
    }

    /// Inclusive range of accepted compression levels.
    #[must_use]
    pub fn level_range(self) -> (i32, i32) {
        match self {
            Self::Zst => (1, 22),
            Self::Xz => (0, 9),
            Self::Bz2 => (1, 9),
        }
    }

    /// Level used when none is configured.
    #[must_use]
    pub fn default_level(self) -> i32 {
        match self {
            Self::Zst => 3,
            Self::Xz => 6,
            Self::Bz2 => 9,
        }
    }

    /// Resolve the codec implementation, failing if it was compiled out.
    ///
    /// # Errors
    /// Returns [`ExtractError::Config`] when the matching cargo feature is disabled.
    pub fn codec(self) -> Result<&'static dyn CompressionCodec> {
        builtin_codecs()
            .iter()
            .copied()
            .find(|c| c.algorithm() == self)
            .ok_or_else(|| {
                ExtractError::Config(format!(
                    "{} support is not compiled in (enable the matching compression feature)",
                    self.extension()
                ))
            })
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Algorithm plus optional level for a writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    pub algorithm: Algorithm,
    pub level: Option<i32>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Zst,
            level: None,
        }
    }
}

impl CodecConfig {
    #[must_use]
    pub fn new(algorithm: Algorithm, level: Option<i32>) -> Self {
        Self { algorithm, level }
    }

    /// Level that will actually be passed to the encoder.
    #[must_use]
    pub fn effective_level(&self) -> i32 {
        self.level.unwrap_or_else(|| self.algorithm.default_level())
    }

    /// Check the level range and that the codec is available.
    ///
    /// # Errors
    /// Returns [`ExtractError::Config`] for an out-of-range level or a
    /// compiled-out codec.
    pub fn validate(&self) -> Result<()> {
        validate_level(Some(self.algorithm), self.level)?;
        self.algorithm.codec().map(|_| ())
    }
}

/// Check `level` against the range of `algorithm` (plain output takes no level).
///
/// # Errors
/// Returns [`ExtractError::Config`] when the level cannot be applied.
pub fn validate_level(algorithm: Option<Algorithm>, level: Option<i32>) -> Result<()> {
    let Some(level) = level else {
        return Ok(());
    };
    let Some(algorithm) = algorithm else {
        return Err(ExtractError::Config(format!(
            "compression level {level} given for uncompressed output"
        )));
    };
    let (lo, hi) = algorithm.level_range();
    if !(lo..=hi).contains(&level) {
        return Err(ExtractError::Config(format!(
            "compression level {level} is outside {lo}..={hi} for {algorithm}"
        )));
    }
    Ok(())
}

/// A writer that must be explicitly finished to produce a complete archive.
pub trait FinishWrite: Write {
    /// Emit any trailer, flush buffers and hand back the underlying staged file.
    ///
    /// # Errors
    /// Returns the encoder's error if the trailer cannot be written.
    fn finalize(self: Box<Self>) -> io::Result<StagedFile>;
}

/// Buffered staging file every encoder writes into.
pub type Sink = BufWriter<StagedFile>;

impl FinishWrite for Sink {
    fn finalize(self: Box<Self>) -> io::Result<StagedFile> {
        (*self).into_inner().map_err(io::IntoInnerError::into_error)
    }
}

/// Pluggable compression codec.
///
/// Codecs are looked up by [`Algorithm`] for writing and by extension or
/// magic bytes for reading.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "zstd").
    fn name(&self) -> &str;

    /// The algorithm this codec implements.
    fn algorithm(&self) -> Algorithm;

    /// Magic byte signature at the start of every stream.
    fn magic_bytes(&self) -> &[u8];

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>>;

    /// Wrap a staged sink with compression at `level`.
    fn wrap_writer_dyn(&self, writer: Sink, level: i32) -> io::Result<Box<dyn FinishWrite>>;
}

static BUILTIN_CODECS: &[&dyn CompressionCodec] = &[
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
    #[cfg(feature = "compression-xz")]
    &XzCodec,
    #[cfg(feature = "compression-bzip2")]
    &Bzip2Codec,
];

fn builtin_codecs() -> &'static [&'static dyn CompressionCodec] {
    BUILTIN_CODECS
}

/// Detect compression codec from magic bytes at the start of a stream.
///
/// Peeks at the buffered reader; the reader is not advanced.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<&'static dyn CompressionCodec> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    builtin_codecs()
        .iter()
        .copied()
        .find(|c| buf.starts_with(c.magic_bytes()))
}

/// Open `path` for reading, transparently decompressing it.
///
/// Detection strategy:
/// 1. File extension (`.zst`, `.xz`, `.bz2`)
/// 2. Magic bytes, if the extension is not recognised
/// 3. Plain text otherwise
///
/// # Errors
/// Returns [`ExtractError::Decode`] if the file cannot be opened or the
/// decoder cannot be set up, and [`ExtractError::Config`] if the extension
/// names a compiled-out codec.
pub fn open_reader(path: impl AsRef<Path>) -> Result<Box<dyn Read>> {
    let path = path.as_ref();
    let decode_err = |source| ExtractError::Decode {
        path: path.to_path_buf(),
        line: None,
        source,
    };
    let file = File::open(path).map_err(decode_err)?;

    if let Some(algorithm) = Algorithm::from_path(path) {
        return algorithm
            .codec()?
            .wrap_reader_dyn(Box::new(file))
            .map_err(decode_err);
    }

    let mut buffered = BufReader::new(file);
    if let Some(codec) = detect_from_magic(&mut buffered) {
        return codec
            .wrap_reader_dyn(Box::new(buffered))
            .map_err(decode_err);
    }
    Ok(Box::new(buffered))
}

/// Create a staged writer for `path`, compressing according to its extension.
///
/// Paths without a recognised extension are written as plain text, in which
/// case `level` must be `None`.
///
/// # Errors
/// Returns [`ExtractError::Config`] for an unusable level and
/// [`ExtractError::Encode`] if the staging file cannot be created.
pub fn open_writer(path: impl AsRef<Path>, level: Option<i32>) -> Result<Box<dyn FinishWrite>> {
    let path = path.as_ref();
    let algorithm = Algorithm::from_path(path);
    validate_level(algorithm, level)?;
    let encode_err = |source| ExtractError::Encode {
        path: path.to_path_buf(),
        source,
    };
    let sink = BufWriter::new(StagedFile::create(path).map_err(encode_err)?);
    match algorithm {
        Some(algorithm) => {
            let level = level.unwrap_or_else(|| algorithm.default_level());
            algorithm
                .codec()?
                .wrap_writer_dyn(sink, level)
                .map_err(encode_err)
        }
        None => Ok(Box::new(sink)),
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

// Reddit dumps are compressed with --long=31.
#[cfg(feature = "compression-zstd")]
const ZSTD_WINDOW_LOG_MAX: u32 = 31;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Zst
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0x28, 0xb5, 0x2f, 0xfd]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        let mut decoder = zstd::stream::read::Decoder::new(reader)?;
        decoder.window_log_max(ZSTD_WINDOW_LOG_MAX)?;
        Ok(Box::new(decoder))
    }

    fn wrap_writer_dyn(&self, writer: Sink, level: i32) -> io::Result<Box<dyn FinishWrite>> {
        zstd::stream::write::Encoder::new(writer, level)
            .map(|e| Box::new(e) as Box<dyn FinishWrite>)
    }
}

#[cfg(feature = "compression-zstd")]
impl FinishWrite for zstd::stream::write::Encoder<'static, Sink> {
    fn finalize(self: Box<Self>) -> io::Result<StagedFile> {
        let sink = (*self).finish()?;
        Box::new(sink).finalize()
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Bz2
    }

    fn magic_bytes(&self) -> &[u8] {
        b"BZh"
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        use bzip2::read::MultiBzDecoder;
        Ok(Box::new(MultiBzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Sink, level: i32) -> io::Result<Box<dyn FinishWrite>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        let level = u32::try_from(level)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative bzip2 level"))?;
        Ok(Box::new(BzEncoder::new(writer, Compression::new(level))))
    }
}

#[cfg(feature = "compression-bzip2")]
impl FinishWrite for bzip2::write::BzEncoder<Sink> {
    fn finalize(self: Box<Self>) -> io::Result<StagedFile> {
        let sink = (*self).finish()?;
        Box::new(sink).finalize()
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Xz
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Sink, level: i32) -> io::Result<Box<dyn FinishWrite>> {
        use xz2::write::XzEncoder;
        let level = u32::try_from(level)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative xz level"))?;
        Ok(Box::new(XzEncoder::new(writer, level)))
    }
}

#[cfg(feature = "compression-xz")]
impl FinishWrite for xz2::write::XzEncoder<Sink> {
    fn finalize(self: Box<Self>) -> io::Result<StagedFile> {
        let sink = (*self).finish()?;
        Box::new(sink).finalize()
    }
}
