//! Byte layouts of the four ZIP packets this crate emits
//!
//! All encoders are pure functions of their input. Integers are little-endian and
//! silently truncated to their 16/32-bit field width; there is no ZIP64 fallback.

use crate::filter::EntryStats;
use crate::metadata::EntryMetadata;
use std::time::{SystemTime, UNIX_EPOCH};

/// ZIP local file header signature
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP data descriptor signature
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// ZIP central directory signature
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// Version made by / needed to extract (2.0, deflate)
pub const VERSION: u16 = 20;

/// Bit 3: CRC and sizes follow the data in a data descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Bit 11: name is UTF-8
pub const FLAG_UTF8_NAME: u16 = 1 << 11;

pub const FLAGS: u16 = FLAG_DATA_DESCRIPTOR | FLAG_UTF8_NAME;

/// Unix regular file, mode 0644, in the high 16 bits
pub const EXTERNAL_ATTRIBUTES: u32 = 0o100644 << 16;

/// Fixed part of a local file header, name excluded
pub const LOCAL_FILE_HEADER_LEN: usize = 30;
pub const DATA_DESCRIPTOR_LEN: usize = 16;
/// Fixed part of a central directory header, name excluded
pub const CENTRAL_DIRECTORY_HEADER_LEN: usize = 46;
pub const END_OF_CENTRAL_DIRECTORY_LEN: usize = 22;

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Local file header with zeroed CRC/size placeholders
pub fn local_file_header(meta: &EntryMetadata) -> Vec<u8> {
    let name = meta.name().as_bytes();
    let dos = DosDateTime::from_system_time(meta.modified());
    let mut buf = Vec::with_capacity(LOCAL_FILE_HEADER_LEN + name.len());

    put_u32(&mut buf, LOCAL_FILE_HEADER_SIGNATURE);
    put_u16(&mut buf, VERSION); // version needed
    put_u16(&mut buf, FLAGS);
    put_u16(&mut buf, meta.method().to_zip_method());
    put_u16(&mut buf, dos.time);
    put_u16(&mut buf, dos.date);
    put_u32(&mut buf, 0); // crc32 placeholder
    put_u32(&mut buf, 0); // compressed size placeholder
    put_u32(&mut buf, 0); // uncompressed size placeholder
    put_u16(&mut buf, name.len() as u16);
    put_u16(&mut buf, 0); // extra len
    buf.extend_from_slice(name);
    buf
}

/// Data descriptor carrying the values the local header left blank
pub fn data_descriptor(stats: &EntryStats) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DATA_DESCRIPTOR_LEN);
    put_u32(&mut buf, DATA_DESCRIPTOR_SIGNATURE);
    put_u32(&mut buf, stats.crc32);
    put_u32(&mut buf, stats.compressed_size as u32);
    put_u32(&mut buf, stats.uncompressed_size as u32);
    buf
}

/// Central directory file header pointing back at the local header at `offset`
pub fn central_directory_header(meta: &EntryMetadata, stats: &EntryStats, offset: u64) -> Vec<u8> {
    let name = meta.name().as_bytes();
    let dos = DosDateTime::from_system_time(meta.modified());
    let mut buf = Vec::with_capacity(CENTRAL_DIRECTORY_HEADER_LEN + name.len());

    put_u32(&mut buf, CENTRAL_DIRECTORY_SIGNATURE);
    put_u16(&mut buf, VERSION); // version made by
    put_u16(&mut buf, VERSION); // version needed
    put_u16(&mut buf, FLAGS);
    put_u16(&mut buf, meta.method().to_zip_method());
    put_u16(&mut buf, dos.time);
    put_u16(&mut buf, dos.date);
    put_u32(&mut buf, stats.crc32);
    put_u32(&mut buf, stats.compressed_size as u32);
    put_u32(&mut buf, stats.uncompressed_size as u32);
    put_u16(&mut buf, name.len() as u16);
    put_u16(&mut buf, 0); // extra len
    put_u16(&mut buf, 0); // file comment len
    put_u16(&mut buf, 0); // disk number start
    put_u16(&mut buf, 0); // internal attrs
    put_u32(&mut buf, EXTERNAL_ATTRIBUTES);
    put_u32(&mut buf, offset as u32);
    buf.extend_from_slice(name);
    buf
}

/// End of central directory record for a single-disk archive without comment
pub fn end_of_central_directory(entries: u64, directory_size: u64, directory_offset: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(END_OF_CENTRAL_DIRECTORY_LEN);
    put_u32(&mut buf, END_OF_CENTRAL_DIRECTORY_SIGNATURE);
    put_u16(&mut buf, 0); // disk number
    put_u16(&mut buf, 0); // disk with central dir
    put_u16(&mut buf, entries as u16); // entries on this disk
    put_u16(&mut buf, entries as u16); // total entries
    put_u32(&mut buf, directory_size as u32);
    put_u32(&mut buf, directory_offset as u32);
    put_u16(&mut buf, 0); // comment len
    buf
}

/// Packed MS-DOS time and date as stored in ZIP headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// Convert a UTC timestamp; the year saturates to the DOS range 1980-2107
    pub fn from_system_time(time: SystemTime) -> Self {
        let seconds = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        Self::from_unix(seconds)
    }

    pub fn from_unix(seconds: i64) -> Self {
        let days = seconds.div_euclid(86_400);
        let secs_of_day = seconds.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);

        if year < 1980 {
            // 1980-01-01 00:00:00
            return Self {
                time: 0,
                date: (1 << 5) | 1,
            };
        }
        if year > 2107 {
            // 2107-12-31 23:59:58
            return Self {
                time: (23 << 11) | (59 << 5) | 29,
                date: (127 << 9) | (12 << 5) | 31,
            };
        }

        let hour = (secs_of_day / 3600) as u16;
        let minute = ((secs_of_day % 3600) / 60) as u16;
        let second = (secs_of_day % 60) as u16;
        Self {
            time: (hour << 11) | (minute << 5) | (second / 2),
            date: (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16,
        }
    }

    pub fn year(&self) -> u16 {
        ((self.date >> 9) & 0x7f) + 1980
    }

    pub fn month(&self) -> u8 {
        ((self.date >> 5) & 0x0f) as u8
    }

    pub fn day(&self) -> u8 {
        (self.date & 0x1f) as u8
    }

    pub fn hour(&self) -> u8 {
        (self.time >> 11) as u8
    }

    pub fn minute(&self) -> u8 {
        ((self.time >> 5) & 0x3f) as u8
    }

    pub fn second(&self) -> u8 {
        ((self.time & 0x1f) * 2) as u8
    }
}

/// Days since 1970-01-01 to (year, month, day)
///
/// Howard Hinnant's `civil_from_days`:
/// <https://howardhinnant.github.io/date_algorithms.html#civil_from_days>
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
