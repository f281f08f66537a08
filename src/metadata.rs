//! Entry metadata and compression configuration

use crate::error::{Result, ZipError};
use crate::filter::{EntryStats, DEFAULT_LEVEL};
use std::time::SystemTime;

/// Fastest DEFLATE level accepted
pub const MIN_LEVEL: u32 = 1;
/// Strongest DEFLATE level accepted
pub const MAX_LEVEL: u32 = 9;

/// Compression method to use for ZIP entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// No compression (stored)
    Stored,
    /// DEFLATE compression (most common)
    #[default]
    Deflate,
}

impl CompressionMethod {
    pub fn to_zip_method(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
        }
    }

    /// Map a raw ZIP method code, rejecting everything but store and deflate
    pub fn from_zip_method(code: u16) -> Result<Self> {
        match code {
            0 => Ok(CompressionMethod::Stored),
            8 => Ok(CompressionMethod::Deflate),
            other => Err(ZipError::UnsupportedCompression(other)),
        }
    }
}

/// Clamp a caller supplied level into `MIN_LEVEL..=MAX_LEVEL`
pub fn clamp_level(level: u32) -> u32 {
    level.clamp(MIN_LEVEL, MAX_LEVEL)
}

/// Per-archive defaults applied to every entry that does not override them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    method: CompressionMethod,
    level: u32,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Deflate,
            level: DEFAULT_LEVEL,
        }
    }
}

impl ArchiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the default method from a raw ZIP method code
    pub fn method_code(self, code: u16) -> Result<Self> {
        Ok(self.method(CompressionMethod::from_zip_method(code)?))
    }

    /// Set the default level, clamped into the valid range
    pub fn level(mut self, level: u32) -> Self {
        self.level = clamp_level(level);
        self
    }

    pub fn default_method(&self) -> CompressionMethod {
        self.method
    }

    pub fn default_level(&self) -> u32 {
        self.level
    }
}

/// Per-entry overrides; unset fields fall back to [`ArchiveOptions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryOptions {
    method: Option<CompressionMethod>,
    level: Option<u32>,
    modified: Option<SystemTime>,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn method_code(self, code: u16) -> Result<Self> {
        Ok(self.method(CompressionMethod::from_zip_method(code)?))
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(clamp_level(level));
        self
    }

    pub fn modified(mut self, time: SystemTime) -> Self {
        self.modified = Some(time);
        self
    }
}

/// Everything the packet encoders need to know about one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    name: String,
    method: CompressionMethod,
    level: u32,
    modified: SystemTime,
    stats: Option<EntryStats>,
}

impl EntryMetadata {
    pub fn new(name: impl Into<String>, options: EntryOptions, defaults: &ArchiveOptions) -> Self {
        Self {
            name: name.into(),
            method: options.method.unwrap_or(defaults.method),
            level: options.level.unwrap_or(defaults.level),
            modified: options.modified.unwrap_or_else(SystemTime::now),
            stats: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// CRC32 and sizes, present once the entry has been fully compressed
    pub fn stats(&self) -> Option<EntryStats> {
        self.stats
    }

    pub fn crc32(&self) -> Option<u32> {
        self.stats.map(|s| s.crc32)
    }

    pub fn compressed_size(&self) -> Option<u64> {
        self.stats.map(|s| s.compressed_size)
    }

    pub fn uncompressed_size(&self) -> Option<u64> {
        self.stats.map(|s| s.uncompressed_size)
    }

    pub(crate) fn record(&mut self, stats: EntryStats) {
        self.stats = Some(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn level_is_clamped_on_both_sides() {
        assert_eq!(clamp_level(0), MIN_LEVEL);
        assert_eq!(clamp_level(5), 5);
        assert_eq!(clamp_level(42), MAX_LEVEL);
        assert_eq!(ArchiveOptions::new().level(100).default_level(), 9);
        assert_eq!(ArchiveOptions::new().level(0).default_level(), 1);
    }

    #[test]
    fn raw_method_codes() {
        assert_eq!(
            CompressionMethod::from_zip_method(0).unwrap(),
            CompressionMethod::Stored
        );
        assert_eq!(
            CompressionMethod::from_zip_method(8).unwrap(),
            CompressionMethod::Deflate
        );
        assert!(matches!(
            CompressionMethod::from_zip_method(93),
            Err(ZipError::UnsupportedCompression(93))
        ));
        assert!(EntryOptions::new().method_code(12).is_err());
    }

    #[test]
    fn entry_options_override_defaults() {
        let defaults = ArchiveOptions::new()
            .method(CompressionMethod::Stored)
            .level(3);
        let when = UNIX_EPOCH + Duration::from_secs(1_600_000_000);

        let inherited = EntryMetadata::new("a.txt", EntryOptions::new(), &defaults);
        assert_eq!(inherited.method(), CompressionMethod::Stored);
        assert_eq!(inherited.level(), 3);
        assert!(inherited.stats().is_none());

        let custom = EntryMetadata::new(
            "b.txt",
            EntryOptions::new()
                .method(CompressionMethod::Deflate)
                .level(9)
                .modified(when),
            &defaults,
        );
        assert_eq!(custom.method(), CompressionMethod::Deflate);
        assert_eq!(custom.level(), 9);
        assert_eq!(custom.modified(), when);
    }
}
