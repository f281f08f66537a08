//! Error types for lazy-zip

use std::io;
use std::path::PathBuf;

/// Result type for lazy-zip operations
pub type Result<T> = std::result::Result<T, ZipError>;

/// Error types that can occur while assembling or inspecting a ZIP archive
#[derive(Debug)]
pub enum ZipError {
    /// I/O error from a raw source or the consumer's sink
    Io(io::Error),
    /// An entry source could not be opened
    FileOpen { path: PathBuf, source: io::Error },
    /// A temporary spill file could not be created or written
    TempFile(io::Error),
    /// The entry already carries a data source
    SourceAlreadyAttached(String),
    /// The entry has no data source to stream from
    MissingSource(String),
    /// The local header offset was requested before being assigned
    OffsetNotAssigned(String),
    /// The local header offset can only be assigned once
    OffsetAlreadyAssigned(String),
    /// The data descriptor was requested before the entry was drained
    DescriptorNotReady(String),
    /// `finish()` was already called, no more entries are accepted
    ArchiveFinished,
    /// The central directory has been emitted
    ArchiveSealed,
    /// Data was written without an open entry
    NoEntryOpen,
    /// The output ran out of queued entries before `finish()` was called
    NotFinished,
    /// The output stream failed earlier and cannot continue
    Terminated,
    /// Unsupported compression method
    UnsupportedCompression(u16),
    /// Invalid ZIP format or structure
    InvalidFormat(String),
    /// Entry not found in ZIP archive
    EntryNotFound(String),
    /// Decompressed data does not match the recorded CRC32
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
}

impl ZipError {
    /// Whether this error is a programmer mistake rather than a runtime failure
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ZipError::SourceAlreadyAttached(_)
                | ZipError::MissingSource(_)
                | ZipError::OffsetNotAssigned(_)
                | ZipError::OffsetAlreadyAssigned(_)
                | ZipError::DescriptorNotReady(_)
                | ZipError::ArchiveFinished
                | ZipError::ArchiveSealed
                | ZipError::NoEntryOpen
                | ZipError::NotFinished
                | ZipError::UnsupportedCompression(_)
        )
    }
}

impl std::fmt::Display for ZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipError::Io(e) => write!(f, "I/O error: {}", e),
            ZipError::FileOpen { path, source } => {
                write!(f, "failed to open file {}: {}", path.display(), source)
            }
            ZipError::TempFile(e) => write!(f, "failed to create temporary entry file: {}", e),
            ZipError::SourceAlreadyAttached(name) => {
                write!(f, "Entry already has a data source attached: {}", name)
            }
            ZipError::MissingSource(name) => write!(f, "Entry has no data source: {}", name),
            ZipError::OffsetNotAssigned(name) => {
                write!(f, "Local header offset not assigned yet: {}", name)
            }
            ZipError::OffsetAlreadyAssigned(name) => {
                write!(f, "Local header offset already assigned: {}", name)
            }
            ZipError::DescriptorNotReady(name) => {
                write!(f, "Entry data not fully compressed yet: {}", name)
            }
            ZipError::ArchiveFinished => write!(f, "Archive is finished, no more entries accepted"),
            ZipError::ArchiveSealed => write!(f, "Central directory already written"),
            ZipError::NoEntryOpen => write!(f, "No entry started"),
            ZipError::NotFinished => {
                write!(f, "No queued entries left and the archive is not finished")
            }
            ZipError::Terminated => write!(f, "Archive stream terminated by an earlier error"),
            ZipError::UnsupportedCompression(method) => {
                write!(f, "Unsupported compression method: {}", method)
            }
            ZipError::InvalidFormat(msg) => write!(f, "Invalid ZIP format: {}", msg),
            ZipError::EntryNotFound(name) => write!(f, "Entry not found: {}", name),
            ZipError::ChecksumMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "CRC32 mismatch for {}: expected 0x{:08x}, got 0x{:08x}",
                name, expected, actual
            ),
        }
    }
}

impl std::error::Error for ZipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ZipError::Io(e) | ZipError::TempFile(e) => Some(e),
            ZipError::FileOpen { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        // errors that crossed a `Read` boundary come back as themselves
        let wraps_zip_error = err.get_ref().is_some_and(|inner| inner.is::<ZipError>());
        if !wraps_zip_error {
            return ZipError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<ZipError>()) {
            Some(Ok(zip)) => *zip,
            Some(Err(other)) => ZipError::Io(io::Error::other(other)),
            None => ZipError::Terminated,
        }
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => e,
            e if e.is_usage_error() => io::Error::new(io::ErrorKind::InvalidInput, e),
            e => io::Error::other(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_pass_through_unchanged() {
        let original = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let converted: io::Error = ZipError::from(original).into();
        assert_eq!(converted.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(converted.to_string(), "short read");
    }

    #[test]
    fn usage_errors_become_invalid_input() {
        let converted: io::Error = ZipError::ArchiveSealed.into();
        assert_eq!(converted.kind(), io::ErrorKind::InvalidInput);
        let inner = converted.into_inner().unwrap();
        assert!(matches!(
            inner.downcast_ref::<ZipError>(),
            Some(ZipError::ArchiveSealed)
        ));
    }

    #[test]
    fn crate_errors_survive_the_read_boundary() {
        let err = ZipError::MissingSource("file1".to_string());
        let across: io::Error = err.into();
        match ZipError::from(across) {
            ZipError::MissingSource(name) => assert_eq!(name, "file1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resource_errors_are_not_usage_errors() {
        let err = ZipError::FileOpen {
            path: PathBuf::from("missing.bin"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(!err.is_usage_error());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("missing.bin"));
    }
}
