//! Decoding of raw `USN_RECORD_V2` bytes into strongly-typed values.
//!
//! The journal hands back records as a variable-length binary stream: a 60-byte
//! little-endian fixed header followed by a UTF-16LE file name at a declared offset.
//! Everything here decodes from byte slices with explicit bounds checks, so a corrupt
//! record can never cause an out-of-bounds read.

use crate::errors::JournalError;
use crate::{Usn, time};
use std::time::SystemTime;

// USN reason bit flags, as documented for USN_RECORD_V2.
pub const USN_REASON_DATA_OVERWRITE: u32 = 0x0000_0001;
pub const USN_REASON_DATA_EXTEND: u32 = 0x0000_0002;
pub const USN_REASON_DATA_TRUNCATION: u32 = 0x0000_0004;
pub const USN_REASON_NAMED_DATA_OVERWRITE: u32 = 0x0000_0010;
pub const USN_REASON_NAMED_DATA_EXTEND: u32 = 0x0000_0020;
pub const USN_REASON_NAMED_DATA_TRUNCATION: u32 = 0x0000_0040;
pub const USN_REASON_FILE_CREATE: u32 = 0x0000_0100;
pub const USN_REASON_FILE_DELETE: u32 = 0x0000_0200;
pub const USN_REASON_EA_CHANGE: u32 = 0x0000_0400;
pub const USN_REASON_SECURITY_CHANGE: u32 = 0x0000_0800;
pub const USN_REASON_RENAME_OLD_NAME: u32 = 0x0000_1000;
pub const USN_REASON_RENAME_NEW_NAME: u32 = 0x0000_2000;
pub const USN_REASON_INDEXABLE_CHANGE: u32 = 0x0000_4000;
pub const USN_REASON_BASIC_INFO_CHANGE: u32 = 0x0000_8000;
pub const USN_REASON_HARD_LINK_CHANGE: u32 = 0x0001_0000;
pub const USN_REASON_COMPRESSION_CHANGE: u32 = 0x0002_0000;
pub const USN_REASON_ENCRYPTION_CHANGE: u32 = 0x0004_0000;
pub const USN_REASON_OBJECT_ID_CHANGE: u32 = 0x0008_0000;
pub const USN_REASON_REPARSE_POINT_CHANGE: u32 = 0x0010_0000;
pub const USN_REASON_STREAM_CHANGE: u32 = 0x0020_0000;
pub const USN_REASON_TRANSACTED_CHANGE: u32 = 0x0040_0000;
pub const USN_REASON_INTEGRITY_CHANGE: u32 = 0x0080_0000;
pub const USN_REASON_CLOSE: u32 = 0x8000_0000;

const FILE_ATTRIBUTE_HIDDEN: u32 = 0x0000_0002;
const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;

/// Size of the fixed part of a `USN_RECORD_V2`; the file name follows it.
pub const RECORD_HEADER_LEN: usize = 60;

/// Represents one decoded entry of the USN journal.
///
/// Fields mirror the on-disk `USN_RECORD_V2` layout; `file_name` is decoded from
/// UTF-16LE with lossy substitution, and `time` is the converted `timestamp`, or
/// `None` when the raw ticks are out of range.
#[derive(Debug, Clone, PartialEq)]
pub struct UsnRecord {
    pub record_length: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub frn: u64,
    pub parent_frn: u64,
    pub usn: Usn,
    /// Raw FILETIME ticks, 100ns since 1601-01-01 UTC.
    pub timestamp: i64,
    pub time: Option<SystemTime>,
    pub reason: u32,
    pub source_info: u32,
    pub security_id: u32,
    pub file_attributes: u32,
    pub file_name_length: u16,
    pub file_name_offset: u16,
    pub file_name: String,
}

impl UsnRecord {
    /// Decode one raw record slice.
    ///
    /// Fails with [`JournalError::MalformedRecord`] when the slice cannot hold the
    /// fixed header, when the declared `record_length` exceeds the slice, or when the
    /// declared file-name region would read past the slice. Decoding is pure: the same
    /// bytes always yield the same record.
    pub fn decode(data: &[u8]) -> Result<UsnRecord, JournalError> {
        if data.len() < RECORD_HEADER_LEN {
            return Err(JournalError::MalformedRecord(format!(
                "slice of {} bytes is shorter than the {} byte fixed header",
                data.len(),
                RECORD_HEADER_LEN
            )));
        }

        let record_length = u32_le(data, 0);
        if record_length as usize > data.len() {
            return Err(JournalError::MalformedRecord(format!(
                "declared record length {} exceeds the {} byte slice",
                record_length,
                data.len()
            )));
        }
        if (record_length as usize) < RECORD_HEADER_LEN {
            return Err(JournalError::MalformedRecord(format!(
                "declared record length {} cannot hold the fixed header",
                record_length
            )));
        }

        let file_name_length = u16_le(data, 56);
        let file_name_offset = u16_le(data, 58);
        let name_start = file_name_offset as usize;
        let name_end = name_start + file_name_length as usize;
        if name_end > data.len() {
            return Err(JournalError::MalformedRecord(format!(
                "file name region {}..{} reads past the {} byte slice",
                name_start,
                name_end,
                data.len()
            )));
        }

        // The name is UTF-16LE code units; decode with substitution so an invalid
        // sequence degrades instead of failing the record.
        let name_units: Vec<u16> = data[name_start..name_end]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let file_name = String::from_utf16_lossy(&name_units);

        let timestamp = i64_le(data, 32);

        Ok(UsnRecord {
            record_length,
            major_version: u16_le(data, 4),
            minor_version: u16_le(data, 6),
            frn: u64_le(data, 8),
            parent_frn: u64_le(data, 16),
            usn: i64_le(data, 24),
            timestamp,
            time: time::filetime_to_systemtime(timestamp),
            reason: u32_le(data, 40),
            source_info: u32_le(data, 44),
            security_id: u32_le(data, 48),
            file_attributes: u32_le(data, 52),
            file_name_length,
            file_name_offset,
            file_name,
        })
    }

    /// Returns true if this entry represents a directory.
    pub fn is_dir(&self) -> bool {
        self.file_attributes & FILE_ATTRIBUTE_DIRECTORY != 0
    }

    /// Returns true if this entry represents a hidden file or directory.
    pub fn is_hidden(&self) -> bool {
        self.file_attributes & FILE_ATTRIBUTE_HIDDEN != 0
    }

    /// Converts the USN reason bitfield to a human-readable string.
    ///
    /// Unrecognized bits stay present in [`UsnRecord::reason`]; they render here as
    /// `UNKNOWN` only when no documented flag is set at all.
    pub fn reason_string(&self) -> String {
        let reason = self.reason;
        let mut reasons = Vec::new();
        if reason & USN_REASON_DATA_OVERWRITE != 0 {
            reasons.push("DATA_OVERWRITE");
        }
        if reason & USN_REASON_DATA_EXTEND != 0 {
            reasons.push("DATA_EXTEND");
        }
        if reason & USN_REASON_DATA_TRUNCATION != 0 {
            reasons.push("DATA_TRUNCATION");
        }
        if reason & USN_REASON_NAMED_DATA_OVERWRITE != 0 {
            reasons.push("NAMED_DATA_OVERWRITE");
        }
        if reason & USN_REASON_NAMED_DATA_EXTEND != 0 {
            reasons.push("NAMED_DATA_EXTEND");
        }
        if reason & USN_REASON_NAMED_DATA_TRUNCATION != 0 {
            reasons.push("NAMED_DATA_TRUNCATION");
        }
        if reason & USN_REASON_FILE_CREATE != 0 {
            reasons.push("FILE_CREATE");
        }
        if reason & USN_REASON_FILE_DELETE != 0 {
            reasons.push("FILE_DELETE");
        }
        if reason & USN_REASON_EA_CHANGE != 0 {
            reasons.push("EA_CHANGE");
        }
        if reason & USN_REASON_SECURITY_CHANGE != 0 {
            reasons.push("SECURITY_CHANGE");
        }
        if reason & USN_REASON_RENAME_OLD_NAME != 0 {
            reasons.push("RENAME_OLD_NAME");
        }
        if reason & USN_REASON_RENAME_NEW_NAME != 0 {
            reasons.push("RENAME_NEW_NAME");
        }
        if reason & USN_REASON_INDEXABLE_CHANGE != 0 {
            reasons.push("INDEXABLE_CHANGE");
        }
        if reason & USN_REASON_BASIC_INFO_CHANGE != 0 {
            reasons.push("BASIC_INFO_CHANGE");
        }
        if reason & USN_REASON_HARD_LINK_CHANGE != 0 {
            reasons.push("HARD_LINK_CHANGE");
        }
        if reason & USN_REASON_COMPRESSION_CHANGE != 0 {
            reasons.push("COMPRESSION_CHANGE");
        }
        if reason & USN_REASON_ENCRYPTION_CHANGE != 0 {
            reasons.push("ENCRYPTION_CHANGE");
        }
        if reason & USN_REASON_OBJECT_ID_CHANGE != 0 {
            reasons.push("OBJECT_ID_CHANGE");
        }
        if reason & USN_REASON_REPARSE_POINT_CHANGE != 0 {
            reasons.push("REPARSE_POINT_CHANGE");
        }
        if reason & USN_REASON_STREAM_CHANGE != 0 {
            reasons.push("STREAM_CHANGE");
        }
        if reason & USN_REASON_TRANSACTED_CHANGE != 0 {
            reasons.push("TRANSACTED_CHANGE");
        }
        if reason & USN_REASON_INTEGRITY_CHANGE != 0 {
            reasons.push("INTEGRITY_CHANGE");
        }
        if reason & USN_REASON_CLOSE != 0 {
            reasons.push("CLOSE");
        }
        if reasons.is_empty() {
            reasons.push("UNKNOWN");
        }
        reasons.join(" | ")
    }
}

pub(crate) fn u16_le(data: &[u8], offset: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&data[offset..offset + 2]);
    u16::from_le_bytes(bytes)
}

pub(crate) fn u32_le(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn u64_le(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn i64_le(data: &[u8], offset: usize) -> i64 {
    u64_le(data, offset) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::RecordBuilder;

    #[test]
    fn round_trip_decodes_name_at_offset_60() -> Result<(), JournalError> {
        let bytes = RecordBuilder::new(5, USN_REASON_RENAME_NEW_NAME, "report.txt")
            .usn(1024)
            .parent_frn(99)
            .build();
        let record = UsnRecord::decode(&bytes)?;

        assert_eq!(record.frn, 5);
        assert_eq!(record.parent_frn, 99);
        assert_eq!(record.usn, 1024);
        assert_eq!(record.reason, USN_REASON_RENAME_NEW_NAME);
        assert_eq!(record.file_name, "report.txt");
        assert_eq!(record.file_name_offset, 60);
        assert_eq!(record.file_name_length, 2 * "report.txt".len() as u16);
        assert!(record.time.is_some());

        Ok(())
    }

    #[test]
    fn decode_is_idempotent() -> Result<(), JournalError> {
        let bytes = RecordBuilder::new(7, USN_REASON_FILE_CREATE, "a.bin").build();
        let first = UsnRecord::decode(&bytes)?;
        let second = UsnRecord::decode(&bytes)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn name_region_past_slice_is_malformed() {
        let bytes = RecordBuilder::new(3, USN_REASON_FILE_DELETE, "x")
            .name_length(512)
            .build();
        let result = UsnRecord::decode(&bytes);
        assert!(matches!(result, Err(JournalError::MalformedRecord(_))));
    }

    #[test]
    fn name_offset_past_slice_is_malformed() {
        let bytes = RecordBuilder::new(3, USN_REASON_FILE_DELETE, "x")
            .name_offset(200)
            .build();
        let result = UsnRecord::decode(&bytes);
        assert!(matches!(result, Err(JournalError::MalformedRecord(_))));
    }

    #[test]
    fn declared_length_past_slice_is_malformed() {
        let bytes = RecordBuilder::new(3, USN_REASON_FILE_DELETE, "notes.txt").build();
        let result = UsnRecord::decode(&bytes[..RECORD_HEADER_LEN]);
        assert!(matches!(result, Err(JournalError::MalformedRecord(_))));
    }

    #[test]
    fn short_header_is_malformed() {
        let bytes = RecordBuilder::new(3, USN_REASON_FILE_DELETE, "x").build();
        let result = UsnRecord::decode(&bytes[..RECORD_HEADER_LEN - 1]);
        assert!(matches!(result, Err(JournalError::MalformedRecord(_))));
    }

    #[test]
    fn declared_length_below_header_is_malformed() {
        let bytes = RecordBuilder::new(3, USN_REASON_FILE_DELETE, "x")
            .record_length(40)
            .build();
        let result = UsnRecord::decode(&bytes);
        assert!(matches!(result, Err(JournalError::MalformedRecord(_))));
    }

    #[test]
    fn invalid_utf16_decodes_lossily() -> Result<(), JournalError> {
        // An unpaired high surrogate is not valid UTF-16; it must substitute, not fail.
        let bytes = RecordBuilder::new(9, USN_REASON_FILE_CREATE, "")
            .raw_name_units(vec![0x0061, 0xD800, 0x0062])
            .build();
        let record = UsnRecord::decode(&bytes)?;
        assert_eq!(record.file_name, "a\u{FFFD}b");
        Ok(())
    }

    #[test]
    fn out_of_range_timestamp_is_unavailable() -> Result<(), JournalError> {
        let bytes = RecordBuilder::new(11, USN_REASON_CLOSE, "late.log")
            .timestamp(-42)
            .build();
        let record = UsnRecord::decode(&bytes)?;
        assert_eq!(record.timestamp, -42);
        assert_eq!(record.time, None);
        Ok(())
    }

    #[test]
    fn reason_string_renders_known_flags() -> Result<(), JournalError> {
        let bytes = RecordBuilder::new(2, USN_REASON_RENAME_OLD_NAME | USN_REASON_CLOSE, "old").build();
        let record = UsnRecord::decode(&bytes)?;
        let rendered = record.reason_string();
        assert!(rendered.contains("RENAME_OLD_NAME"));
        assert!(rendered.contains("CLOSE"));
        Ok(())
    }

    #[test]
    fn unrecognized_reason_bits_pass_through() -> Result<(), JournalError> {
        let unknown = 0x0100_0000;
        let bytes = RecordBuilder::new(2, unknown, "odd").build();
        let record = UsnRecord::decode(&bytes)?;
        assert_eq!(record.reason, unknown);
        assert_eq!(record.reason_string(), "UNKNOWN");
        Ok(())
    }

    #[test]
    fn directory_attribute_is_detected() -> Result<(), JournalError> {
        let bytes = RecordBuilder::new(4, USN_REASON_FILE_CREATE, "dir")
            .file_attributes(0x10)
            .build();
        let record = UsnRecord::decode(&bytes)?;
        assert!(record.is_dir());
        assert!(!record.is_hidden());
        Ok(())
    }
}
