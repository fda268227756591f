#![allow(dead_code)]
//! Builders for synthetic journal bytes used across the unit tests.

use crate::Usn;
use crate::record::RECORD_HEADER_LEN;

/// FILETIME ticks for 2020-01-01 00:00:00 UTC, a convenient valid default.
pub const FILETIME_2020: i64 = 132_223_104_000_000_000;

/// Encodes one `USN_RECORD_V2` as raw little-endian bytes.
///
/// Defaults produce a well-formed record with the file name at offset 60 and the
/// declared length padded to the 8-byte alignment real records use; the override
/// setters deliberately break individual fields for malformed-input tests.
pub struct RecordBuilder {
    frn: u64,
    parent_frn: u64,
    usn: Usn,
    timestamp: i64,
    reason: u32,
    source_info: u32,
    security_id: u32,
    file_attributes: u32,
    name: String,
    raw_name_units: Option<Vec<u16>>,
    record_length: Option<u32>,
    name_offset: Option<u16>,
    name_length: Option<u16>,
}

impl RecordBuilder {
    pub fn new(frn: u64, reason: u32, name: &str) -> Self {
        RecordBuilder {
            frn,
            parent_frn: frn ^ 0xFF00,
            usn: 0,
            timestamp: FILETIME_2020,
            reason,
            source_info: 0,
            security_id: 0,
            file_attributes: 0x20,
            name: name.to_string(),
            raw_name_units: None,
            record_length: None,
            name_offset: None,
            name_length: None,
        }
    }

    pub fn parent_frn(mut self, parent_frn: u64) -> Self {
        self.parent_frn = parent_frn;
        self
    }

    pub fn usn(mut self, usn: Usn) -> Self {
        self.usn = usn;
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn file_attributes(mut self, file_attributes: u32) -> Self {
        self.file_attributes = file_attributes;
        self
    }

    /// Use raw UTF-16 code units instead of an encoded `&str`, e.g. to plant an
    /// unpaired surrogate.
    pub fn raw_name_units(mut self, units: Vec<u16>) -> Self {
        self.raw_name_units = Some(units);
        self
    }

    /// Override the declared record length.
    pub fn record_length(mut self, record_length: u32) -> Self {
        self.record_length = Some(record_length);
        self
    }

    /// Override the declared file name offset.
    pub fn name_offset(mut self, name_offset: u16) -> Self {
        self.name_offset = Some(name_offset);
        self
    }

    /// Override the declared file name length in bytes.
    pub fn name_length(mut self, name_length: u16) -> Self {
        self.name_length = Some(name_length);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let name_units: Vec<u16> = match &self.raw_name_units {
            Some(units) => units.clone(),
            None => self.name.encode_utf16().collect(),
        };
        let name_bytes = name_units.len() * 2;

        let name_offset = self.name_offset.unwrap_or(RECORD_HEADER_LEN as u16);
        let name_length = self.name_length.unwrap_or(name_bytes as u16);
        let natural_len = (RECORD_HEADER_LEN + name_bytes + 7) & !7;
        let record_length = self.record_length.unwrap_or(natural_len as u32);

        let mut buf = vec![0u8; natural_len];
        buf[0..4].copy_from_slice(&record_length.to_le_bytes());
        buf[4..6].copy_from_slice(&2u16.to_le_bytes()); // MajorVersion
        buf[6..8].copy_from_slice(&0u16.to_le_bytes()); // MinorVersion
        buf[8..16].copy_from_slice(&self.frn.to_le_bytes());
        buf[16..24].copy_from_slice(&self.parent_frn.to_le_bytes());
        buf[24..32].copy_from_slice(&self.usn.to_le_bytes());
        buf[32..40].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[40..44].copy_from_slice(&self.reason.to_le_bytes());
        buf[44..48].copy_from_slice(&self.source_info.to_le_bytes());
        buf[48..52].copy_from_slice(&self.security_id.to_le_bytes());
        buf[52..56].copy_from_slice(&self.file_attributes.to_le_bytes());
        buf[56..58].copy_from_slice(&name_length.to_le_bytes());
        buf[58..60].copy_from_slice(&name_offset.to_le_bytes());

        let base = name_offset as usize;
        for (i, unit) in name_units.iter().enumerate() {
            let at = base + i * 2;
            if at + 2 <= buf.len() {
                buf[at..at + 2].copy_from_slice(&unit.to_le_bytes());
            }
        }

        buf
    }
}

/// Assembles a read-response buffer: the 8-byte resumption cursor followed by the
/// given records back to back.
pub fn encode_batch(next_usn: Usn, records: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = next_usn.to_le_bytes().to_vec();
    for record in records {
        buf.extend_from_slice(record);
    }
    buf
}
