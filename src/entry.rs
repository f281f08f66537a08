//! A single archive entry on its way through the output stream
//!
//! [`ProcessedEntry`] pairs [`EntryMetadata`] with the entry's data source and
//! hands out, in order, the three pieces the entry contributes to the archive body:
//! local file header, compressed payload and data descriptor. It also produces the
//! entry's central directory record once its offset and checksums are final.

use crate::error::{Result, ZipError};
use crate::filter::CompressingReader;
use crate::io::LazyReader;
use crate::metadata::{CompressionMethod, EntryMetadata};
use crate::packet;
use crate::source::{EntrySource, OpenFn};
use log::debug;
use std::io::{self, Read};

type Payload = CompressingReader<LazyReader<OpenFn, Box<dyn Read>>>;

pub struct ProcessedEntry {
    meta: EntryMetadata,
    source: Option<EntrySource>,
    payload: Option<Payload>,
    offset: Option<u64>,
    // encoded once, then served from here
    local_header: Option<Vec<u8>>,
    descriptor: Option<Vec<u8>>,
    directory_header: Option<Vec<u8>>,
}

impl ProcessedEntry {
    /// Entry without data; a source must be attached before it is streamed
    pub fn new(meta: EntryMetadata) -> Self {
        Self {
            meta,
            source: None,
            payload: None,
            offset: None,
            local_header: None,
            descriptor: None,
            directory_header: None,
        }
    }

    pub fn with_source(meta: EntryMetadata, source: EntrySource) -> Self {
        let mut entry = Self::new(meta);
        entry.source = Some(source);
        entry
    }

    pub fn metadata(&self) -> &EntryMetadata {
        &self.meta
    }

    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Attach the data source; an entry accepts exactly one
    pub fn attach_source(&mut self, source: EntrySource) -> Result<()> {
        if self.has_source() {
            return Err(ZipError::SourceAlreadyAttached(self.name().to_string()));
        }
        self.source = Some(source);
        Ok(())
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some() || self.payload.is_some() || self.is_drained()
    }

    /// Whether the payload has been read to its end and the checksums are final
    pub fn is_drained(&self) -> bool {
        self.meta.stats().is_some()
    }

    pub fn local_header_offset(&self) -> Result<u64> {
        self.offset
            .ok_or_else(|| ZipError::OffsetNotAssigned(self.name().to_string()))
    }

    /// Record where the local header starts; may only happen once
    pub fn set_local_header_offset(&mut self, offset: u64) -> Result<()> {
        if self.offset.is_some() {
            return Err(ZipError::OffsetAlreadyAssigned(self.name().to_string()));
        }
        self.offset = Some(offset);
        Ok(())
    }

    pub fn local_file_header(&mut self) -> &[u8] {
        self.local_header
            .get_or_insert_with(|| packet::local_file_header(&self.meta))
            .as_slice()
    }

    /// Pull the next chunk of compressed payload
    ///
    /// The source is opened on the first call. `Ok(0)` marks the end of the
    /// payload, at which point the CRC32 and both sizes are stored in the metadata
    /// and the source has already been released.
    pub fn read_payload(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.is_drained() {
            return Ok(0);
        }
        if self.payload.is_none() {
            let payload = self.open_payload()?;
            self.payload = Some(payload);
        }
        let Some(payload) = self.payload.as_mut() else {
            return Ok(0);
        };

        let n = payload.read(buf)?;
        if n == 0 && !buf.is_empty() {
            if let Some(stats) = payload.finished_stats() {
                debug!(
                    "{}: crc32={:08x} compressed={} uncompressed={}",
                    self.meta.name(),
                    stats.crc32,
                    stats.compressed_size,
                    stats.uncompressed_size
                );
                self.meta.record(stats);
            }
            self.payload = None;
        }
        Ok(n)
    }

    fn open_payload(&mut self) -> Result<Payload> {
        let source = self
            .source
            .take()
            .ok_or_else(|| ZipError::MissingSource(self.name().to_string()))?;
        let name = self.name().to_string();
        let open: OpenFn = Box::new(move || {
            debug!("opening source of {}", name);
            source.open().map_err(io::Error::from)
        });
        let compress = self.meta.method() == CompressionMethod::Deflate;
        Ok(CompressingReader::with_level(
            LazyReader::new(open),
            compress,
            self.meta.level(),
        ))
    }

    /// Data descriptor bytes, available once the payload has been drained
    pub fn data_descriptor(&mut self) -> Result<&[u8]> {
        let stats = self
            .meta
            .stats()
            .ok_or_else(|| ZipError::DescriptorNotReady(self.meta.name().to_string()))?;
        let bytes = self
            .descriptor
            .get_or_insert_with(|| packet::data_descriptor(&stats));
        Ok(bytes.as_slice())
    }

    /// Central directory record; needs both the offset and the final checksums
    pub fn directory_header(&mut self) -> Result<&[u8]> {
        let offset = self.local_header_offset()?;
        let stats = self
            .meta
            .stats()
            .ok_or_else(|| ZipError::DescriptorNotReady(self.meta.name().to_string()))?;
        let bytes = self
            .directory_header
            .get_or_insert_with(|| packet::central_directory_header(&self.meta, &stats, offset));
        Ok(bytes.as_slice())
    }

    /// Release the source early, whether or not it was ever opened
    pub fn close(&mut self) {
        if let Some(mut payload) = self.payload.take() {
            debug!("closing {} before its payload was drained", self.meta.name());
            payload.close();
        }
        self.source = None;
    }
}

impl std::fmt::Debug for ProcessedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedEntry")
            .field("meta", &self.meta)
            .field("source", &self.source)
            .field("streaming", &self.payload.is_some())
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ArchiveOptions, EntryOptions};
    use flate2::read::DeflateDecoder;
    use std::cell::Cell;
    use std::rc::Rc;

    fn entry(name: &str, method: CompressionMethod) -> ProcessedEntry {
        let meta = EntryMetadata::new(
            name,
            EntryOptions::new().method(method),
            &ArchiveOptions::default(),
        );
        ProcessedEntry::new(meta)
    }

    fn drain(entry: &mut ProcessedEntry) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = entry.read_payload(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn second_source_is_rejected() {
        let mut e = entry("file1", CompressionMethod::Deflate);
        e.attach_source("a".into()).unwrap();
        assert!(matches!(
            e.attach_source("b".into()),
            Err(ZipError::SourceAlreadyAttached(name)) if name == "file1"
        ));
    }

    #[test]
    fn offset_is_assigned_once() {
        let mut e = entry("file1", CompressionMethod::Stored);
        assert!(matches!(
            e.local_header_offset(),
            Err(ZipError::OffsetNotAssigned(_))
        ));
        e.set_local_header_offset(42).unwrap();
        assert_eq!(e.local_header_offset().unwrap(), 42);
        assert!(matches!(
            e.set_local_header_offset(7),
            Err(ZipError::OffsetAlreadyAssigned(_))
        ));
        assert_eq!(e.local_header_offset().unwrap(), 42);
    }

    #[test]
    fn descriptor_waits_for_the_payload() {
        let mut e = entry("folder1/file2", CompressionMethod::Stored);
        e.attach_source("other bytes".into()).unwrap();
        assert!(matches!(
            e.data_descriptor(),
            Err(ZipError::DescriptorNotReady(_))
        ));

        assert_eq!(drain(&mut e), b"other bytes");
        let descriptor = e.data_descriptor().unwrap().to_vec();
        assert_eq!(descriptor.len(), 16);
        assert_eq!(&descriptor[4..8], &crc32fast::hash(b"other bytes").to_le_bytes());
        assert_eq!(&descriptor[8..12], &11u32.to_le_bytes());
        assert_eq!(&descriptor[12..16], &11u32.to_le_bytes());
    }

    #[test]
    fn deflated_payload_and_stats() {
        let data = vec![b'a'; 36];
        let mut e = entry("file1", CompressionMethod::Deflate);
        e.attach_source(data.clone().into()).unwrap();
        let out = drain(&mut e);

        let mut restored = Vec::new();
        DeflateDecoder::new(&out[..]).read_to_end(&mut restored).unwrap();
        assert_eq!(restored, data);
        assert_eq!(e.metadata().uncompressed_size(), Some(36));
        assert_eq!(e.metadata().compressed_size(), Some(out.len() as u64));
        assert_eq!(e.metadata().crc32(), Some(crc32fast::hash(&data)));
        assert!(e.has_source());
        assert_eq!(e.read_payload(&mut [0u8; 4]).unwrap(), 0);
    }

    #[test]
    fn source_is_opened_on_first_read_only() {
        let opened = Rc::new(Cell::new(false));
        let flag = Rc::clone(&opened);
        let mut e = entry("lazy", CompressionMethod::Stored);
        e.attach_source(EntrySource::factory(move || {
            flag.set(true);
            Ok(Box::new(&b"x"[..]) as Box<dyn Read>)
        }))
        .unwrap();

        e.local_file_header();
        assert!(!opened.get());
        drain(&mut e);
        assert!(opened.get());
    }

    #[test]
    fn draining_without_source_fails() {
        let mut e = entry("empty", CompressionMethod::Deflate);
        assert!(matches!(
            e.read_payload(&mut [0u8; 8]),
            Err(ZipError::MissingSource(_))
        ));
    }

    #[test]
    fn directory_header_needs_offset_and_stats() {
        let mut e = entry("file1", CompressionMethod::Stored);
        e.attach_source("abc".into()).unwrap();
        drain(&mut e);
        assert!(matches!(
            e.directory_header(),
            Err(ZipError::OffsetNotAssigned(_))
        ));
        e.set_local_header_offset(100).unwrap();
        let record = e.directory_header().unwrap();
        assert_eq!(record.len(), 46 + 5);
        assert_eq!(&record[42..46], &100u32.to_le_bytes());
    }

    #[test]
    fn open_error_surfaces_as_file_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut e = entry("missing", CompressionMethod::Deflate);
        e.attach_source(EntrySource::file(dir.path().join("missing.bin")))
            .unwrap();
        assert!(matches!(
            e.read_payload(&mut [0u8; 8]),
            Err(ZipError::FileOpen { .. })
        ));
    }
}
