//! Compressing entry filter
//!
//! Pulls raw entry bytes through a [`CrcReader`] *before* compression, so the CRC32
//! and size describe the original data, and counts what comes out *after*
//! compression. The three values become final once the raw source is exhausted.

use crate::checksum::CrcReader;
use flate2::read::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Read};

/// Default DEFLATE level, same as zlib's
pub const DEFAULT_LEVEL: u32 = 6;

/// CRC32 and sizes of an entry, known once its data has been fully compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryStats {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

enum Inner<R> {
    Deflate(DeflateEncoder<CrcReader<R>>),
    Stored(CrcReader<R>),
    Closed { crc32: u32, uncompressed_size: u64 },
}

/// Reader producing either DEFLATE output or a pass-through of the raw source
pub struct CompressingReader<R> {
    inner: Inner<R>,
    compressed_size: u64,
    finished: bool,
}

impl<R: Read> CompressingReader<R> {
    /// Wrap `source`; `compress = false` stores the bytes untouched
    pub fn new(source: R, compress: bool) -> Self {
        Self::with_level(source, compress, DEFAULT_LEVEL)
    }

    pub fn with_level(source: R, compress: bool, level: u32) -> Self {
        let checked = CrcReader::new(source);
        let inner = if compress {
            // raw DEFLATE stream, no zlib header, as ZIP method 8 requires
            Inner::Deflate(DeflateEncoder::new(checked, Compression::new(level)))
        } else {
            Inner::Stored(checked)
        };
        Self {
            inner,
            compressed_size: 0,
            finished: false,
        }
    }

    /// CRC32 of the uncompressed bytes drawn so far
    pub fn crc(&self) -> u32 {
        match &self.inner {
            Inner::Deflate(encoder) => encoder.get_ref().checksum().value(),
            Inner::Stored(checked) => checked.checksum().value(),
            Inner::Closed { crc32, .. } => *crc32,
        }
    }

    /// Uncompressed bytes drawn from the raw source so far
    pub fn size(&self) -> u64 {
        match &self.inner {
            Inner::Deflate(encoder) => encoder.get_ref().checksum().count(),
            Inner::Stored(checked) => checked.checksum().count(),
            Inner::Closed {
                uncompressed_size, ..
            } => *uncompressed_size,
        }
    }

    /// Output bytes emitted so far
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Whether the raw source has been read to its end
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> EntryStats {
        EntryStats {
            crc32: self.crc(),
            compressed_size: self.compressed_size,
            uncompressed_size: self.size(),
        }
    }

    /// Final CRC32 and sizes, `None` until the source is exhausted
    pub fn finished_stats(&self) -> Option<EntryStats> {
        self.finished.then(|| self.stats())
    }

    /// Release the raw source
    ///
    /// Values read after an early close are partial; `is_finished()` stays false.
    pub fn close(&mut self) {
        if !matches!(self.inner, Inner::Closed { .. }) {
            self.inner = Inner::Closed {
                crc32: self.crc(),
                uncompressed_size: self.size(),
            };
        }
    }
}

impl<R: Read> Read for CompressingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = match &mut self.inner {
            Inner::Deflate(encoder) => encoder.read(buf)?,
            Inner::Stored(checked) => checked.read(buf)?,
            Inner::Closed { .. } => return Ok(0),
        };
        self.compressed_size += n as u64;
        if n == 0 {
            self.finished = true;
            self.close();
        }
        Ok(n)
    }
}
