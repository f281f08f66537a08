//! # lazy-zip: Pull-Based Streaming ZIP Builder
//!
//! `lazy-zip` assembles a ZIP archive and hands it out as a single [`std::io::Read`]
//! stream. Entry data is compressed while the consumer reads, so an archive of any
//! size is produced without buffering it in memory or on disk.
//!
//! ## Features
//!
//! - **Pull Streaming**: The archive is produced as the consumer reads it
//! - **Lazy Sources**: Files are opened only when their payload is reached, one at a time
//! - **Lazy Enumerators**: Entries can come from an iterator pulled on demand
//! - **Single Pass**: Sizes and CRC32 travel in data descriptors, no seeking back
//! - **Store or Deflate**: Per-entry method and level
//!
//! ## Quick Start
//!
//! ### Building an archive from explicit entries
//!
//! ```no_run
//! use lazy_zip::{EntrySource, Zipper};
//! use std::fs::File;
//!
//! let mut zipper = Zipper::new();
//! zipper.add_entry("hello.txt", "Hello, World!")?;
//! zipper.add_file("report.csv", "/tmp/report.csv")?;
//! zipper.add_entry("big.log", EntrySource::temporary_file("/tmp/big.log"))?;
//! zipper.finish()?;
//!
//! let mut out = File::create("output.zip")?;
//! zipper.write_to(&mut out)?;
//! # Ok::<(), lazy_zip::ZipError>(())
//! ```
//!
//! ### Writing entry data in pieces
//!
//! ```no_run
//! use lazy_zip::Zipper;
//! use std::io::Read;
//!
//! let mut zipper = Zipper::new();
//! zipper.start_entry("data.txt")?;
//! zipper.write_data(b"first chunk, ")?;
//! zipper.write_data(b"second chunk")?;
//! zipper.finish()?;
//!
//! let mut zip_bytes = Vec::new();
//! zipper.read_to_end(&mut zip_bytes)?;
//! println!("Created ZIP with {} bytes", zip_bytes.len());
//! # Ok::<(), lazy_zip::ZipError>(())
//! ```
//!
//! ### Streaming a lazy enumerator
//!
//! ```no_run
//! use lazy_zip::{EntrySource, Zipper};
//! use std::io::{self, Read};
//!
//! let entries = (0..10_000).map(|i| (format!("part-{i:05}.txt"), EntrySource::bytes(vec![b'x'; i])));
//! let mut archive = Zipper::from_entries(entries);
//! io::copy(&mut archive, &mut io::sink())?;
//! # Ok::<(), io::Error>(())
//! ```

pub mod archive;
pub mod checksum;
pub mod entry;
pub mod error;
pub mod filter;
pub mod io;
pub mod metadata;
pub mod packet;
pub mod reader;
pub mod source;

pub use archive::{EntryHandle, Phase, Segment, ZipEntryData, Zipper};
pub use checksum::ByteCountingCrc32;
pub use entry::ProcessedEntry;
pub use error::{Result, ZipError};
pub use filter::{CompressingReader, EntryStats};
pub use metadata::{ArchiveOptions, CompressionMethod, EntryMetadata, EntryOptions};
pub use reader::{ZipArchiveReader, ZipEntry};
pub use source::EntrySource;
