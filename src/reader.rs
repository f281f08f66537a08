//! ZIP archive reader
//!
//! A small reader for the archives this crate produces (and any other plain,
//! single-disk ZIP without ZIP64 records). It parses the central directory up front
//! and extracts entries on demand, checking every fully read entry against the
//! CRC32 recorded in the directory.

use crate::checksum::ByteCountingCrc32;
use crate::error::{Result, ZipError};
use crate::metadata::CompressionMethod;
use crate::packet::{
    DosDateTime, CENTRAL_DIRECTORY_SIGNATURE, END_OF_CENTRAL_DIRECTORY_LEN,
    END_OF_CENTRAL_DIRECTORY_SIGNATURE, LOCAL_FILE_HEADER_SIGNATURE,
};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// EOCD plus the longest possible archive comment
const EOCD_SEARCH_WINDOW: u64 = END_OF_CENTRAL_DIRECTORY_LEN as u64 + u16::MAX as u64;

/// Entry in the ZIP central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub flags: u16,
    pub compression_method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub external_attributes: u32,
    pub offset: u64,
}

impl ZipEntry {
    pub fn method(&self) -> Result<CompressionMethod> {
        CompressionMethod::from_zip_method(self.compression_method)
    }

    pub fn modified(&self) -> DosDateTime {
        DosDateTime {
            time: self.dos_time,
            date: self.dos_date,
        }
    }
}

/// Location of the central directory as recorded in the end record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRecord {
    pub offset: u64,
    pub total_entries: u16,
    pub directory_size: u32,
    pub directory_offset: u32,
}

/// Random-access ZIP archive reader
pub struct ZipArchiveReader<R> {
    inner: R,
    end: EndRecord,
    entries: Vec<ZipEntry>,
}

impl ZipArchiveReader<BufReader<File>> {
    /// Open a ZIP file and read its central directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> ZipArchiveReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let end = find_end_record(&mut inner)?;
        let entries = read_central_directory(&mut inner, &end)?;
        Ok(Self {
            inner,
            end,
            entries,
        })
    }

    /// Get list of all entries in the ZIP
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn end_record(&self) -> EndRecord {
        self.end
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read an entry's decompressed data, verifying its CRC32
    pub fn read_entry(&mut self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.uncompressed_size as usize);
        self.read_entry_streaming(entry)?.read_to_end(&mut data)?;

        let mut crc = ByteCountingCrc32::new();
        crc.update(&data);
        if crc.value() != entry.crc32 {
            return Err(ZipError::ChecksumMismatch {
                name: entry.name.clone(),
                expected: entry.crc32,
                actual: crc.value(),
            });
        }
        if crc.count() != entry.uncompressed_size {
            return Err(ZipError::InvalidFormat(format!(
                "{}: expected {} bytes, got {}",
                entry.name,
                entry.uncompressed_size,
                crc.count()
            )));
        }
        Ok(data)
    }

    /// Read an entry by name
    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))?
            .clone();

        self.read_entry(&entry)
    }

    /// Get a streaming reader for an entry
    ///
    /// Decompresses on the fly; the CRC32 is not checked on this path.
    pub fn read_entry_streaming(&mut self, entry: &ZipEntry) -> Result<Box<dyn Read + '_>> {
        let method = entry.method()?;
        self.skip_local_header(entry)?;

        let limited_reader = (&mut self.inner).take(entry.compressed_size);
        match method {
            CompressionMethod::Deflate => Ok(Box::new(DeflateDecoder::new(limited_reader))),
            CompressionMethod::Stored => Ok(Box::new(limited_reader)),
        }
    }

    /// Position the inner reader on the first payload byte of `entry`
    fn skip_local_header(&mut self, entry: &ZipEntry) -> Result<()> {
        self.inner.seek(SeekFrom::Start(entry.offset))?;

        let signature = read_u32_le(&mut self.inner)?;
        if signature != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(ZipError::InvalidFormat(format!(
                "Invalid local file header signature for {}: 0x{:08x}",
                entry.name, signature
            )));
        }

        // version, flags, method, time, date, CRC-32, both sizes
        self.inner.seek(SeekFrom::Current(22))?;

        let filename_len = read_u16_le(&mut self.inner)? as i64;
        let extra_len = read_u16_le(&mut self.inner)? as i64;
        self.inner.seek(SeekFrom::Current(filename_len + extra_len))?;
        Ok(())
    }
}

/// Find the end of central directory record by scanning from the end of the input
fn find_end_record<R: Read + Seek>(inner: &mut R) -> Result<EndRecord> {
    let size = inner.seek(SeekFrom::End(0))?;
    let search_start = size.saturating_sub(EOCD_SEARCH_WINDOW);
    inner.seek(SeekFrom::Start(search_start))?;

    let mut buffer = Vec::new();
    inner.read_to_end(&mut buffer)?;

    let signature = END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes();
    let position = buffer
        .windows(4)
        .rposition(|window| window == signature)
        .ok_or_else(|| ZipError::InvalidFormat("End of central directory not found".to_string()))?;

    let record = &buffer[position..];
    if record.len() < END_OF_CENTRAL_DIRECTORY_LEN {
        return Err(ZipError::InvalidFormat(
            "Truncated end of central directory".to_string(),
        ));
    }
    let disk = u16_at(record, 4);
    let directory_disk = u16_at(record, 6);
    if disk != 0 || directory_disk != 0 {
        return Err(ZipError::InvalidFormat(
            "Multi-disk archives are not supported".to_string(),
        ));
    }

    Ok(EndRecord {
        offset: search_start + position as u64,
        total_entries: u16_at(record, 10),
        directory_size: u32_at(record, 12),
        directory_offset: u32_at(record, 16),
    })
}

fn read_central_directory<R: Read + Seek>(inner: &mut R, end: &EndRecord) -> Result<Vec<ZipEntry>> {
    inner.seek(SeekFrom::Start(u64::from(end.directory_offset)))?;

    let mut entries = Vec::with_capacity(end.total_entries as usize);
    for _ in 0..end.total_entries {
        let signature = read_u32_le(inner)?;
        if signature != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(ZipError::InvalidFormat(format!(
                "Invalid central directory signature: 0x{:08x}",
                signature
            )));
        }

        let mut fixed = [0u8; 42];
        inner.read_exact(&mut fixed)?;
        // offsets below are relative to the end of the signature
        let filename_len = u16_at(&fixed, 24) as usize;
        let extra_len = u16_at(&fixed, 26) as i64;
        let comment_len = u16_at(&fixed, 28) as i64;

        let mut filename_buf = vec![0u8; filename_len];
        inner.read_exact(&mut filename_buf)?;
        inner.seek(SeekFrom::Current(extra_len + comment_len))?;

        entries.push(ZipEntry {
            name: String::from_utf8_lossy(&filename_buf).into_owned(),
            flags: u16_at(&fixed, 4),
            compression_method: u16_at(&fixed, 6),
            dos_time: u16_at(&fixed, 8),
            dos_date: u16_at(&fixed, 10),
            crc32: u32_at(&fixed, 12),
            compressed_size: u64::from(u32_at(&fixed, 16)),
            uncompressed_size: u64::from(u32_at(&fixed, 20)),
            external_attributes: u32_at(&fixed, 34),
            offset: u64::from(u32_at(&fixed, 38)),
        });
    }

    Ok(entries)
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_u16_le<R: Read>(inner: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    inner.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(inner: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    inner.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Zipper;
    use crate::metadata::EntryOptions;
    use std::io::Cursor;

    fn archive(entries: &[(&'static str, &'static str, CompressionMethod)]) -> Vec<u8> {
        let mut zipper = Zipper::new();
        for (name, data, method) in entries {
            zipper
                .add_entry_with(*name, *data, EntryOptions::new().method(*method))
                .unwrap();
        }
        zipper.finish().unwrap();
        let mut out = Vec::new();
        zipper.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn lists_and_reads_entries() {
        let bytes = archive(&[
            ("file1", "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", CompressionMethod::Deflate),
            ("folder1/file2", "other bytes", CompressionMethod::Stored),
        ]);
        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();

        let names: Vec<_> = reader.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["file1", "folder1/file2"]);
        assert_eq!(reader.entries()[0].compression_method, 8);
        assert_eq!(reader.entries()[1].compression_method, 0);
        assert_eq!(reader.entries()[1].flags, 0x0808);
        assert_eq!(reader.entries()[1].external_attributes, 0o100644 << 16);

        assert_eq!(reader.read_entry_by_name("file1").unwrap(), vec![b'a'; 36]);
        assert_eq!(
            reader.read_entry_by_name("folder1/file2").unwrap(),
            b"other bytes"
        );
        assert!(matches!(
            reader.read_entry_by_name("file3"),
            Err(ZipError::EntryNotFound(_))
        ));
    }

    #[test]
    fn corrupted_payload_fails_the_checksum() {
        let mut bytes = archive(&[("plain", "hello world", CompressionMethod::Stored)]);
        // first payload byte sits right after the 30 byte header and the name
        bytes[30 + 5] ^= 0xff;
        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.read_entry_by_name("plain"),
            Err(ZipError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = ZipArchiveReader::new(Cursor::new(vec![0u8; 100]))
            .err()
            .unwrap();
        assert!(matches!(err, ZipError::InvalidFormat(_)));
    }
}
