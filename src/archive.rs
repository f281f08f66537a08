//! Archive sequencer and entry registration
//!
//! [`Zipper`] collects entries and exposes the archive as a pull stream. Each
//! `read()` advances a small state machine over the output segments:
//!
//! ```text
//! ( Header(i) -> Payload(i) -> Descriptor(i) )*  ->  DirectoryEntry -> End -> Done
//! ```
//!
//! Entries are taken from the registration queue only when the stream needs
//! them, so sources are opened one at a time and a lazy enumerator is pulled no
//! faster than the consumer reads.

use crate::entry::ProcessedEntry;
use crate::error::{Result, ZipError};
use crate::metadata::{ArchiveOptions, EntryMetadata, EntryOptions};
use crate::packet;
use crate::source::EntrySource;
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Identifies an entry registered with a [`Zipper`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle(u64);

/// One item of a lazy entry enumerator
pub struct ZipEntryData {
    pub name: String,
    pub source: EntrySource,
    pub options: EntryOptions,
}

impl ZipEntryData {
    pub fn new(name: impl Into<String>, source: impl Into<EntrySource>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            options: EntryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EntryOptions) -> Self {
        self.options = options;
        self
    }
}

impl<N, S> From<(N, S)> for ZipEntryData
where
    N: Into<String>,
    S: Into<EntrySource>,
{
    fn from((name, source): (N, S)) -> Self {
        ZipEntryData::new(name, source)
    }
}

impl fmt::Debug for ZipEntryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipEntryData")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// Registration phase of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Entries may still be added
    Accepting,
    /// `finish()` was called; queued entries are being streamed
    Draining,
    /// The central directory has been emitted
    Sealed,
}

/// Part of the archive currently being emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header(usize),
    Payload(usize),
    Descriptor(usize),
    DirectoryEntry,
    End,
    Done,
}

struct Registered {
    handle: EntryHandle,
    entry: ProcessedEntry,
}

/// Entries in archive order, append-only until sealed
struct ArchiveState {
    entries: Vec<Registered>,
    sealed: bool,
}

impl ArchiveState {
    fn append(&mut self, handle: EntryHandle, entry: ProcessedEntry) -> Result<usize> {
        if self.sealed {
            return Err(ZipError::ArchiveSealed);
        }
        self.entries.push(Registered { handle, entry });
        Ok(self.entries.len() - 1)
    }
}

enum Pending {
    Entry(EntryHandle, ProcessedEntry),
    Lazy(Box<dyn Iterator<Item = ZipEntryData>>),
}

/// Entry receiving data through `write_data()`
struct OpenEntry {
    handle: EntryHandle,
    entry: ProcessedEntry,
    spill: Option<NamedTempFile>,
}

/// Streaming ZIP archive builder
///
/// Register entries, call [`finish`](Zipper::finish), then read the archive
/// through [`Read`] or copy it with [`write_to`](Zipper::write_to).
pub struct Zipper {
    options: ArchiveOptions,
    phase: Phase,
    state: ArchiveState,
    queue: VecDeque<Pending>,
    open: Option<OpenEntry>,
    // None while between two entries
    segment: Option<Segment>,
    buffered: Option<Cursor<Vec<u8>>>,
    emitted: u64,
    directory_offset: u64,
    directory_size: u64,
    next_handle: u64,
    terminated: bool,
}

impl Default for Zipper {
    fn default() -> Self {
        Self::new()
    }
}

impl Zipper {
    pub fn new() -> Self {
        Self::with_options(ArchiveOptions::default())
    }

    pub fn with_options(options: ArchiveOptions) -> Self {
        Self {
            options,
            phase: Phase::Accepting,
            state: ArchiveState {
                entries: Vec::new(),
                sealed: false,
            },
            queue: VecDeque::new(),
            open: None,
            segment: None,
            buffered: None,
            emitted: 0,
            directory_offset: 0,
            directory_size: 0,
            next_handle: 0,
            terminated: false,
        }
    }

    /// Archive that streams every entry of `entries`, already finished
    ///
    /// Nothing is pulled from the iterator until the archive is read.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        I::Item: Into<ZipEntryData> + 'static,
    {
        Self::from_entries_with(ArchiveOptions::default(), entries)
    }

    pub fn from_entries_with<I>(options: ArchiveOptions, entries: I) -> Self
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        I::Item: Into<ZipEntryData> + 'static,
    {
        let mut zipper = Self::with_options(options);
        zipper.push_enumerator(entries);
        zipper.phase = Phase::Draining;
        zipper
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    fn check_accepting(&self) -> Result<()> {
        if self.terminated {
            return Err(ZipError::Terminated);
        }
        match self.phase {
            Phase::Accepting => Ok(()),
            Phase::Draining => Err(ZipError::ArchiveFinished),
            Phase::Sealed => Err(ZipError::ArchiveSealed),
        }
    }

    fn allocate_handle(&mut self) -> EntryHandle {
        let handle = EntryHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Queue an entry using the archive's default method and level
    pub fn add_entry(
        &mut self,
        name: impl Into<String>,
        source: impl Into<EntrySource>,
    ) -> Result<EntryHandle> {
        self.add_entry_with(name, source, EntryOptions::default())
    }

    pub fn add_entry_with(
        &mut self,
        name: impl Into<String>,
        source: impl Into<EntrySource>,
        options: EntryOptions,
    ) -> Result<EntryHandle> {
        self.check_accepting()?;
        self.close_entry()?;
        let meta = EntryMetadata::new(name, options, &self.options);
        let handle = self.allocate_handle();
        debug!("queued entry {}", meta.name());
        let entry = ProcessedEntry::with_source(meta, source.into());
        self.queue.push_back(Pending::Entry(handle, entry));
        Ok(handle)
    }

    /// Queue a file from disk; it is opened only when its payload is streamed
    pub fn add_file(&mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Result<EntryHandle> {
        self.add_entry(name, EntrySource::file(path))
    }

    /// Queue a file that is deleted once the archive has read it
    pub fn add_temporary_file(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<EntryHandle> {
        self.add_entry(name, EntrySource::temporary_file(path))
    }

    /// Queue a lazy enumerator of entries
    ///
    /// Items are pulled one at a time when the output stream reaches them, in
    /// order with the entries registered around this call.
    pub fn add_entries<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        I::Item: Into<ZipEntryData> + 'static,
    {
        self.check_accepting()?;
        self.close_entry()?;
        self.push_enumerator(entries);
        Ok(())
    }

    fn push_enumerator<I>(&mut self, entries: I)
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        I::Item: Into<ZipEntryData> + 'static,
    {
        let items = entries.into_iter().map(|item| item.into());
        self.queue.push_back(Pending::Lazy(Box::new(items)));
    }

    /// Open an entry whose data follows through `write_data()` or `attach_source()`
    ///
    /// Any entry still open is closed first.
    pub fn start_entry(&mut self, name: impl Into<String>) -> Result<EntryHandle> {
        self.start_entry_with(name, EntryOptions::default())
    }

    pub fn start_entry_with(
        &mut self,
        name: impl Into<String>,
        options: EntryOptions,
    ) -> Result<EntryHandle> {
        self.check_accepting()?;
        self.close_entry()?;
        let meta = EntryMetadata::new(name, options, &self.options);
        let handle = self.allocate_handle();
        debug!("started entry {}", meta.name());
        self.open = Some(OpenEntry {
            handle,
            entry: ProcessedEntry::new(meta),
            spill: None,
        });
        Ok(handle)
    }

    /// Hand the open entry a ready-made source
    pub fn attach_source(&mut self, source: impl Into<EntrySource>) -> Result<()> {
        let open = self.open.as_mut().ok_or(ZipError::NoEntryOpen)?;
        if open.spill.is_some() {
            return Err(ZipError::SourceAlreadyAttached(open.entry.name().to_string()));
        }
        open.entry.attach_source(source.into())
    }

    /// Append bytes to the open entry
    ///
    /// The bytes go to a temporary spill file that becomes the entry's source
    /// when the entry is closed; the file is removed once it has been streamed.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let open = self.open.as_mut().ok_or(ZipError::NoEntryOpen)?;
        if data.is_empty() {
            return Ok(());
        }
        if open.spill.is_none() {
            if open.entry.has_source() {
                return Err(ZipError::SourceAlreadyAttached(open.entry.name().to_string()));
            }
            let file = tempfile::Builder::new()
                .prefix("lazy-zip-")
                .suffix(".bin")
                .tempfile()
                .map_err(ZipError::TempFile)?;
            trace!("spilling {} into {}", open.entry.name(), file.path().display());
            open.spill = Some(file);
        }
        if let Some(spill) = open.spill.as_mut() {
            spill.write_all(data)?;
        }
        Ok(())
    }

    /// Close the open entry and queue it; does nothing when no entry is open
    pub fn close_entry(&mut self) -> Result<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        let OpenEntry {
            handle,
            mut entry,
            spill,
        } = open;
        if let Some(mut file) = spill {
            file.flush()?;
            entry.attach_source(EntrySource::Spilled(file.into_temp_path()))?;
        }
        debug!("queued entry {}", entry.name());
        self.queue.push_back(Pending::Entry(handle, entry));
        Ok(())
    }

    /// Stop accepting entries; the stream ends after the queue is drained
    ///
    /// Calling it again is harmless.
    pub fn finish(&mut self) -> Result<()> {
        if self.terminated {
            return Err(ZipError::Terminated);
        }
        self.close_entry()?;
        if self.phase == Phase::Accepting {
            debug!("archive finished with {} queued items", self.queue.len());
            self.phase = Phase::Draining;
        }
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase != Phase::Accepting
    }

    pub fn is_sealed(&self) -> bool {
        self.state.sealed
    }

    /// Segment currently being emitted, `None` between two entries
    pub fn segment(&self) -> Option<Segment> {
        self.segment
    }

    pub fn bytes_emitted(&self) -> u64 {
        self.emitted
    }

    /// Number of registered entries, streamed or still waiting
    ///
    /// Items of an enumerator count once they have been pulled from it.
    pub fn entry_count(&self) -> usize {
        self.entries().count()
    }

    /// Metadata of every registered entry in archive order
    ///
    /// Checksums and sizes are only known for entries already streamed.
    pub fn entries(&self) -> impl Iterator<Item = &EntryMetadata> {
        let streamed = self.state.entries.iter().map(|slot| slot.entry.metadata());
        let queued = self.queue.iter().filter_map(|pending| match pending {
            Pending::Entry(_, entry) => Some(entry.metadata()),
            Pending::Lazy(_) => None,
        });
        let open = self.open.iter().map(|open| open.entry.metadata());
        streamed.chain(queued).chain(open)
    }

    /// Metadata of a registered entry, wherever it currently sits
    pub fn entry(&self, handle: EntryHandle) -> Option<&EntryMetadata> {
        if let Some(slot) = self.state.entries.iter().find(|slot| slot.handle == handle) {
            return Some(slot.entry.metadata());
        }
        if let Some(open) = self.open.as_ref().filter(|open| open.handle == handle) {
            return Some(open.entry.metadata());
        }
        self.queue.iter().find_map(|pending| match pending {
            Pending::Entry(h, entry) if *h == handle => Some(entry.metadata()),
            _ => None,
        })
    }

    /// Copy the rest of the archive into `out`, returning the number of bytes written
    pub fn write_to<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = match self.read_archive(&mut buf) {
                Err(ZipError::Io(err)) if err.kind() == io::ErrorKind::Interrupted => continue,
                other => other?,
            };
            if n == 0 {
                return Ok(total);
            }
            if let Err(err) = out.write_all(&buf[..n]) {
                self.terminate();
                return Err(err.into());
            }
            total += n as u64;
        }
    }

    /// Cancel the archive, releasing the active entry's source
    ///
    /// A completed archive is left as is.
    pub fn close(&mut self) {
        if self.terminated || self.segment == Some(Segment::Done) {
            return;
        }
        if let Some(Segment::Payload(index)) = self.segment {
            warn!(
                "archive closed while {} was streaming",
                self.state.entries[index].entry.name()
            );
        }
        self.terminate();
    }

    fn terminate(&mut self) {
        for slot in &mut self.state.entries {
            slot.entry.close();
        }
        self.queue.clear();
        self.open = None;
        self.buffered = None;
        self.terminated = true;
    }

    fn read_archive(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.terminated {
            return Err(ZipError::Terminated);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        match self.advance(buf) {
            Err(ZipError::NotFinished) => Err(ZipError::NotFinished),
            // nothing was consumed, the caller may retry
            Err(ZipError::Io(err)) if err.kind() == io::ErrorKind::Interrupted => {
                Err(ZipError::Io(err))
            }
            Err(err) => {
                warn!("archive stream failed: {}", err);
                self.terminate();
                Err(err)
            }
            ok => ok,
        }
    }

    fn advance(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if let Some(pending) = self.buffered.as_mut() {
                let n = pending.read(buf)?;
                if n > 0 {
                    self.emitted += n as u64;
                    return Ok(n);
                }
                self.buffered = None;
                self.segment = self.following();
                trace!("segment {:?} at {}", self.segment, self.emitted);
                continue;
            }

            match self.segment {
                None => self.start_next_entry()?,
                Some(Segment::Header(index)) => {
                    let offset = self.emitted;
                    let entry = &mut self.state.entries[index].entry;
                    if !entry.has_source() {
                        return Err(ZipError::MissingSource(entry.name().to_string()));
                    }
                    entry.set_local_header_offset(offset)?;
                    debug!("{} starts at offset {}", entry.name(), offset);
                    self.buffered = Some(Cursor::new(entry.local_file_header().to_vec()));
                }
                Some(Segment::Payload(index)) => {
                    let n = self.state.entries[index].entry.read_payload(buf)?;
                    if n > 0 {
                        self.emitted += n as u64;
                        return Ok(n);
                    }
                    self.segment = Some(Segment::Descriptor(index));
                    trace!("segment {:?} at {}", self.segment, self.emitted);
                }
                Some(Segment::Descriptor(index)) => {
                    let descriptor = self.state.entries[index].entry.data_descriptor()?;
                    self.buffered = Some(Cursor::new(descriptor.to_vec()));
                }
                Some(Segment::DirectoryEntry) => {
                    let directory = self.central_directory()?;
                    self.buffered = Some(Cursor::new(directory));
                }
                Some(Segment::End) => {
                    let end = packet::end_of_central_directory(
                        self.state.entries.len() as u64,
                        self.directory_size,
                        self.directory_offset,
                    );
                    self.buffered = Some(Cursor::new(end));
                }
                Some(Segment::Done) => return Ok(0),
            }
        }
    }

    /// Segment that follows a fully emitted buffered one
    fn following(&self) -> Option<Segment> {
        match self.segment {
            Some(Segment::Header(index)) => Some(Segment::Payload(index)),
            Some(Segment::Payload(index)) => Some(Segment::Descriptor(index)),
            Some(Segment::Descriptor(_)) | None => None,
            Some(Segment::DirectoryEntry) => Some(Segment::End),
            Some(Segment::End) | Some(Segment::Done) => Some(Segment::Done),
        }
    }

    fn start_next_entry(&mut self) -> Result<()> {
        match self.pull_next() {
            Some((handle, entry)) => {
                let index = self.state.append(handle, entry)?;
                self.segment = Some(Segment::Header(index));
                Ok(())
            }
            None if self.phase == Phase::Accepting => Err(ZipError::NotFinished),
            None => {
                self.segment = Some(Segment::DirectoryEntry);
                Ok(())
            }
        }
    }

    fn pull_next(&mut self) -> Option<(EntryHandle, ProcessedEntry)> {
        loop {
            match self.queue.pop_front()? {
                Pending::Entry(handle, entry) => return Some((handle, entry)),
                Pending::Lazy(mut items) => {
                    let Some(data) = items.next() else {
                        continue;
                    };
                    self.queue.push_front(Pending::Lazy(items));
                    let meta = EntryMetadata::new(data.name, data.options, &self.options);
                    debug!("pulled entry {}", meta.name());
                    let handle = self.allocate_handle();
                    return Some((handle, ProcessedEntry::with_source(meta, data.source)));
                }
            }
        }
    }

    fn central_directory(&mut self) -> Result<Vec<u8>> {
        self.directory_offset = self.emitted;
        let mut directory = Vec::new();
        for slot in &mut self.state.entries {
            directory.extend_from_slice(slot.entry.directory_header()?);
        }
        self.directory_size = directory.len() as u64;
        self.state.sealed = true;
        self.phase = Phase::Sealed;
        debug!(
            "sealed archive: {} entries, central directory of {} bytes at {}",
            self.state.entries.len(),
            self.directory_size,
            self.directory_offset
        );
        Ok(directory)
    }
}

impl Read for Zipper {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_archive(buf)?)
    }
}

impl Write for Zipper {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(spill) = self.open.as_mut().and_then(|open| open.spill.as_mut()) {
            spill.flush()?;
        }
        Ok(())
    }
}

impl Drop for Zipper {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Zipper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zipper")
            .field("phase", &self.phase)
            .field("segment", &self.segment)
            .field("entries", &self.state.entries.len())
            .field("queued", &self.queue.len())
            .field("emitted", &self.emitted)
            .finish()
    }
}
