//! CRC32 accumulation with a running byte counter
//!
//! Every byte fed into the checksum is also counted, so once a source is exhausted
//! the counter holds the uncompressed size recorded in the data descriptor.

use crc32fast::Hasher as Crc32;
use std::io::{self, Read};

/// CRC32 accumulator that also counts the bytes it consumed
#[derive(Clone)]
pub struct ByteCountingCrc32 {
    crc: Crc32,
    count: u64,
}

impl Default for ByteCountingCrc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ByteCountingCrc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteCountingCrc32")
            .field("value", &format_args!("0x{:08x}", self.value()))
            .field("count", &self.count)
            .finish()
    }
}

impl ByteCountingCrc32 {
    pub fn new() -> Self {
        Self {
            crc: Crc32::new(),
            count: 0,
        }
    }

    /// Feed a single byte
    pub fn update_byte(&mut self, byte: u8) {
        self.crc.update(&[byte]);
        self.count += 1;
    }

    /// Feed a whole slice
    pub fn update(&mut self, bytes: &[u8]) {
        self.crc.update(bytes);
        self.count += bytes.len() as u64;
    }

    /// Feed `length` bytes of `bytes` starting at `offset`
    ///
    /// A negative offset, an offset at or past the end of the buffer, or a length
    /// that is not positive consumes nothing. A length reaching past the end of the
    /// buffer only consumes the bytes that are actually there.
    pub fn update_range(&mut self, bytes: &[u8], offset: isize, length: isize) {
        if offset < 0 || length <= 0 {
            return;
        }
        let offset = offset as usize;
        if offset >= bytes.len() {
            return;
        }
        let available = bytes.len() - offset;
        let length = (length as usize).min(available);
        self.update(&bytes[offset..offset + length]);
    }

    /// Current CRC32 of everything consumed since the last reset
    pub fn value(&self) -> u32 {
        self.crc.clone().finalize()
    }

    /// Number of bytes consumed since the last reset
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn reset(&mut self) {
        self.crc.reset();
        self.count = 0;
    }
}

/// Reader adapter that checksums and counts every byte drawn from the inner reader
pub struct CrcReader<R> {
    inner: R,
    checksum: ByteCountingCrc32,
}

impl<R: Read> CrcReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            checksum: ByteCountingCrc32::new(),
        }
    }

    pub fn checksum(&self) -> &ByteCountingCrc32 {
        &self.checksum
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.checksum.update(&buf[..n]);
        Ok(n)
    }
}
