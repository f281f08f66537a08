//! Where an entry's bytes come from
//!
//! A source is only a description until [`EntrySource::open`] runs, so an archive
//! can queue thousands of entries without holding a single file handle.

use crate::error::{Result, ZipError};
use crate::io::NotifyingReader;
use log::{debug, trace};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Closure producing a reader on demand
pub type OpenFn = Box<dyn FnOnce() -> io::Result<Box<dyn Read>>>;

/// Data source of a single entry
pub enum EntrySource {
    /// Caller supplied reader, read as-is
    Reader(Box<dyn Read>),
    /// File on disk, opened on first read
    File { path: PathBuf, delete_on_read: bool },
    /// Spill file holding data written through the archive's `Write` impl
    Spilled(TempPath),
    /// Reader produced by a closure on first read
    Factory(OpenFn),
}

impl EntrySource {
    pub fn reader<R: Read + 'static>(reader: R) -> Self {
        EntrySource::Reader(Box::new(reader))
    }

    /// In-memory bytes
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        EntrySource::Reader(Box::new(Cursor::new(data.into())))
    }

    pub fn empty() -> Self {
        EntrySource::Reader(Box::new(io::empty()))
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        EntrySource::File {
            path: path.as_ref().to_path_buf(),
            delete_on_read: false,
        }
    }

    /// File that is removed once the archive has finished reading it
    pub fn temporary_file(path: impl AsRef<Path>) -> Self {
        EntrySource::File {
            path: path.as_ref().to_path_buf(),
            delete_on_read: true,
        }
    }

    pub fn factory<F>(open: F) -> Self
    where
        F: FnOnce() -> io::Result<Box<dyn Read>> + 'static,
    {
        EntrySource::Factory(Box::new(open))
    }

    /// Acquire the underlying reader
    ///
    /// File backed sources come back wrapped so that any cleanup happens when the
    /// returned reader hits end of stream or is dropped, whichever comes first.
    pub fn open(self) -> Result<Box<dyn Read>> {
        match self {
            EntrySource::Reader(reader) => Ok(reader),
            EntrySource::File {
                path,
                delete_on_read,
            } => {
                let file = open_file(&path)?;
                debug!("opened {}", path.display());
                let reader = NotifyingReader::new(BufReader::new(file));
                if !delete_on_read {
                    return Ok(Box::new(reader));
                }
                Ok(Box::new(reader.on_release(move || {
                    trace!("deleting {}", path.display());
                    fs::remove_file(&path)
                })))
            }
            EntrySource::Spilled(temp) => {
                let file = open_file(&temp)?;
                debug!("opened spill file {}", temp.display());
                let reader = NotifyingReader::new(BufReader::new(file));
                Ok(Box::new(reader.on_release(move || temp.close())))
            }
            EntrySource::Factory(open) => Ok(open()?),
        }
    }
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| ZipError::FileOpen {
        path: path.to_path_buf(),
        source,
    })
}

impl fmt::Debug for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntrySource::Reader(_) => f.write_str("Reader"),
            EntrySource::File {
                path,
                delete_on_read,
            } => f
                .debug_struct("File")
                .field("path", path)
                .field("delete_on_read", delete_on_read)
                .finish(),
            EntrySource::Spilled(temp) => f.debug_tuple("Spilled").field(&temp.display()).finish(),
            EntrySource::Factory(_) => f.write_str("Factory"),
        }
    }
}

impl From<Vec<u8>> for EntrySource {
    fn from(data: Vec<u8>) -> Self {
        EntrySource::bytes(data)
    }
}

impl From<&'static [u8]> for EntrySource {
    fn from(data: &'static [u8]) -> Self {
        EntrySource::reader(data)
    }
}

impl From<&'static str> for EntrySource {
    fn from(data: &'static str) -> Self {
        EntrySource::reader(data.as_bytes())
    }
}

impl From<PathBuf> for EntrySource {
    fn from(path: PathBuf) -> Self {
        EntrySource::file(path)
    }
}
