//! Provides access to the Windows NTFS/ReFS USN change journal.
//!
//! This module queries the journal's identity, issues bounded, non-blocking reads of
//! its raw record stream, and walks each returned buffer record by record. The caller
//! drives a poll loop: query once, then read repeatedly with the advancing cursor,
//! backing off when a batch comes back empty.

use crate::errors::JournalError;
use crate::record::{UsnRecord, u32_le};
use crate::volume::Volume;
use crate::{DEFAULT_BUFFER_SIZE, USN_REASON_MASK_ALL, Usn};
use log::warn;

#[cfg(windows)]
use log::debug;
#[cfg(windows)]
use std::{ffi::c_void, mem::size_of};
#[cfg(windows)]
use windows::Win32::{
    Foundation::{
        ERROR_HANDLE_EOF, ERROR_INVALID_FUNCTION, ERROR_JOURNAL_DELETE_IN_PROGRESS,
        ERROR_JOURNAL_ENTRY_DELETED, ERROR_JOURNAL_NOT_ACTIVE, ERROR_NOT_SUPPORTED,
    },
    System::{
        IO::DeviceIoControl,
        Ioctl::{
            FSCTL_QUERY_USN_JOURNAL, FSCTL_READ_USN_JOURNAL, READ_USN_JOURNAL_DATA_V0,
            USN_JOURNAL_DATA_V0,
        },
    },
};

/// The first 8 bytes of every read response hold the resumption cursor.
const CURSOR_SIZE: usize = 8;

/// Smallest amount the batch walk will advance by, so a corrupt declared length can
/// never stall it.
const MIN_RECORD_ADVANCE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Identity and cursor bounds of a volume's change journal, queried once per session.
pub struct JournalIdentity {
    pub journal_id: u64,
    pub first_usn: Usn,
    pub next_usn: Usn,
    /// Floor below which journal history has been truncated and is no longer
    /// retrievable.
    pub lowest_valid_usn: Usn,
    pub max_usn: Usn,
    pub maximum_size: u64,
    pub allocation_delta: u64,
}

impl JournalIdentity {
    /// Check that a read cursor still falls inside retrievable journal history.
    pub fn validate_cursor(&self, start_usn: Usn) -> Result<(), JournalError> {
        if start_usn < self.lowest_valid_usn {
            return Err(JournalError::JournalTruncated);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Options for reading the USN journal.
///
/// The defaults request a non-blocking read of every record kind: the call returns
/// promptly even when no new records exist.
pub struct ReadOptions {
    /// Reason bitmask, applied by the OS-side filter.
    pub reason_mask: u32,
    pub only_on_close: bool,
    pub timeout: u64,
    pub bytes_to_wait_for: u64,
    pub buffer_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            reason_mask: USN_REASON_MASK_ALL,
            only_on_close: false,
            timeout: 0,
            bytes_to_wait_for: 0,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// One session over a volume's change journal.
///
/// Captures the journal identity and the read cursor as explicit state, so independent
/// sessions over the same volume never share a cursor. A failed read leaves the cursor
/// untouched; reads are all-or-nothing.
#[derive(Debug)]
pub struct UsnJournal<'a> {
    volume: &'a Volume,
    identity: JournalIdentity,
    pub next_usn: Usn,
}

impl<'a> UsnJournal<'a> {
    /// Open a session: query the journal identity once and position the cursor at its
    /// current end, ready to observe new changes.
    pub fn new(volume: &'a Volume) -> Result<Self, JournalError> {
        let identity = query(volume)?;
        Ok(UsnJournal {
            volume,
            next_usn: identity.next_usn,
            identity,
        })
    }

    pub fn volume(&self) -> &Volume {
        self.volume
    }

    /// The identity snapshot taken when this session (last) queried the journal.
    pub fn identity(&self) -> &JournalIdentity {
        &self.identity
    }

    /// Position the read cursor, e.g. at `identity().lowest_valid_usn` to scan all
    /// retrievable history.
    pub fn seek(&mut self, usn: Usn) {
        self.next_usn = usn;
    }

    /// Read one bounded batch of raw journal records at the session cursor.
    ///
    /// On success the cursor advances to the batch's resumption USN; an empty batch
    /// with an unchanged cursor means "caught up", not an error. Fails with
    /// [`JournalError::JournalTruncated`] when the cursor fell below the journal's
    /// retention floor and with [`JournalError::JournalIdMismatch`] when the journal
    /// was deleted or recreated since [`UsnJournal::new`]; both are recoverable via
    /// [`UsnJournal::resync`].
    pub fn read_batch(&mut self, options: &ReadOptions) -> Result<RawBatch, JournalError> {
        self.identity.validate_cursor(self.next_usn)?;
        let batch = self.read_raw(self.next_usn, options)?;
        self.next_usn = batch.next_usn();
        Ok(batch)
    }

    /// Recover from a continuity error: re-query the journal identity and restart the
    /// cursor at the new retention floor, accepting the gap. Returns the new cursor.
    pub fn resync(&mut self) -> Result<Usn, JournalError> {
        self.identity = query(self.volume)?;
        self.next_usn = self.identity.lowest_valid_usn;
        Ok(self.next_usn)
    }

    #[cfg(windows)]
    fn read_raw(&self, start_usn: Usn, options: &ReadOptions) -> Result<RawBatch, JournalError> {
        let read_data = READ_USN_JOURNAL_DATA_V0 {
            StartUsn: start_usn,
            ReasonMask: options.reason_mask,
            ReturnOnlyOnClose: options.only_on_close as u32,
            Timeout: options.timeout,
            BytesToWaitFor: options.bytes_to_wait_for,
            UsnJournalID: self.identity.journal_id,
        };

        let mut buffer = vec![0u8; options.buffer_size.max(CURSOR_SIZE)];
        let mut bytes_read = 0u32;

        if let Err(err) = unsafe {
            DeviceIoControl(
                self.volume.handle,
                FSCTL_READ_USN_JOURNAL,
                Some(&read_data as *const _ as *mut _),
                size_of::<READ_USN_JOURNAL_DATA_V0>() as u32,
                Some(buffer.as_mut_ptr() as *mut c_void),
                buffer.len() as u32,
                Some(&mut bytes_read),
                None,
            )
        } {
            if err.code() == ERROR_HANDLE_EOF.into() {
                return Ok(RawBatch::empty(start_usn));
            }
            if err.code() == ERROR_JOURNAL_ENTRY_DELETED.into() {
                warn!("journal history truncated below usn {}", start_usn);
                return Err(JournalError::JournalTruncated);
            }
            if err.code() == ERROR_JOURNAL_DELETE_IN_PROGRESS.into() {
                warn!("journal id {:#x} no longer current", self.identity.journal_id);
                return Err(JournalError::JournalIdMismatch);
            }
            if err.code() == ERROR_JOURNAL_NOT_ACTIVE.into() {
                return Err(JournalError::JournalNotActive);
            }

            warn!("Error reading USN data: {}", err);
            return Err(err.into());
        }

        buffer.truncate(bytes_read as usize);
        if buffer.len() < CURSOR_SIZE {
            return Ok(RawBatch::empty(start_usn));
        }
        RawBatch::from_response(buffer)
    }

    #[cfg(not(windows))]
    fn read_raw(&self, _start_usn: Usn, _options: &ReadOptions) -> Result<RawBatch, JournalError> {
        Err(JournalError::Unsupported)
    }
}

/// Query the journal identity for a volume.
///
/// Pure and repeatable; performs no mutation and never creates a journal. Fails with
/// [`JournalError::JournalNotActive`] when no journal is configured and
/// [`JournalError::Unsupported`] when the volume's filesystem has none.
#[cfg(windows)]
pub fn query(volume: &Volume) -> Result<JournalIdentity, JournalError> {
    let journal_data = USN_JOURNAL_DATA_V0::default();
    let bytes_return = 0u32;

    if let Err(err) = unsafe {
        // https://learn.microsoft.com/en-us/windows/win32/fileio/using-the-change-journal-identifier
        // To obtain the identifier of the current change journal on a specified volume,
        // use the FSCTL_QUERY_USN_JOURNAL control code.
        //
        // To perform this and all other change journal operations,
        // you must have system administrator privileges.
        // That is, you must be a member of the Administrators group.
        DeviceIoControl(
            volume.handle,
            FSCTL_QUERY_USN_JOURNAL,
            None,
            0,
            Some(&journal_data as *const _ as *mut _),
            size_of::<USN_JOURNAL_DATA_V0>() as u32,
            Some(&bytes_return as *const _ as *mut _),
            None,
        )
    } {
        if err.code() == ERROR_JOURNAL_NOT_ACTIVE.into() {
            return Err(JournalError::JournalNotActive);
        }
        if err.code() == ERROR_INVALID_FUNCTION.into() || err.code() == ERROR_NOT_SUPPORTED.into() {
            return Err(JournalError::Unsupported);
        }

        warn!("Error querying USN journal: {}", err);
        return Err(err.into());
    }

    let identity = JournalIdentity {
        journal_id: journal_data.UsnJournalID,
        first_usn: journal_data.FirstUsn,
        next_usn: journal_data.NextUsn,
        lowest_valid_usn: journal_data.LowestValidUsn,
        max_usn: journal_data.MaxUsn,
        maximum_size: journal_data.MaximumSize,
        allocation_delta: journal_data.AllocationDelta,
    };
    debug!("USN journal identity: {:#?}", identity);

    Ok(identity)
}

#[cfg(not(windows))]
pub fn query(_volume: &Volume) -> Result<JournalIdentity, JournalError> {
    Err(JournalError::Unsupported)
}

/// The raw bytes of one journal read: an 8-byte resumption cursor followed by zero or
/// more complete, back-to-back, self-length-prefixed records.
#[derive(Debug, Clone)]
pub struct RawBatch {
    buffer: Vec<u8>,
    next_usn: Usn,
}

impl RawBatch {
    /// Wrap a raw `FSCTL_READ_USN_JOURNAL` response buffer.
    ///
    /// Also usable on captured response bytes, e.g. when replaying a journal dump.
    pub fn from_response(buffer: Vec<u8>) -> Result<Self, JournalError> {
        if buffer.len() < CURSOR_SIZE {
            return Err(JournalError::MalformedRecord(format!(
                "read response of {} bytes cannot hold its {} byte cursor",
                buffer.len(),
                CURSOR_SIZE
            )));
        }

        // https://learn.microsoft.com/en-us/windows/win32/fileio/walking-a-buffer-of-change-journal-records
        // The USN returned as the first item in the output buffer is the USN of the next record number to be retrieved.
        // Use this value to continue reading records from the end boundary forward.
        let mut cursor = [0u8; CURSOR_SIZE];
        cursor.copy_from_slice(&buffer[..CURSOR_SIZE]);
        let next_usn = Usn::from_le_bytes(cursor);

        Ok(RawBatch { buffer, next_usn })
    }

    pub(crate) fn empty(cursor: Usn) -> Self {
        RawBatch {
            buffer: Vec::new(),
            next_usn: cursor,
        }
    }

    /// The cursor to resume the next read from.
    pub fn next_usn(&self) -> Usn {
        self.next_usn
    }

    /// True when this batch carries no records: the session is caught up.
    pub fn is_empty(&self) -> bool {
        self.buffer.len() <= CURSOR_SIZE
    }

    /// Iterate over the raw record slices in this batch, advancing by each record's
    /// declared length.
    pub fn records(&self) -> RawRecords<'_> {
        RawRecords {
            data: &self.buffer,
            offset: CURSOR_SIZE.min(self.buffer.len()),
        }
    }

    /// Decode every record in the batch, skipping malformed ones.
    ///
    /// A malformed record is logged and counted; it never aborts the batch.
    pub fn decode_records(&self) -> DecodedBatch {
        let mut records = Vec::new();
        let mut malformed = 0usize;
        for raw in self.records() {
            match UsnRecord::decode(raw) {
                Ok(record) => records.push(record),
                Err(err) => {
                    malformed += 1;
                    warn!("skipping USN record: {}", err);
                }
            }
        }
        DecodedBatch { records, malformed }
    }
}

/// Iterator over the raw record slices of a [`RawBatch`].
///
/// Record length varies per record because the file name is stored inline, so the walk
/// advances by the declared `record_length` of each record. A declared length of zero
/// ends the walk; a length reaching past the buffer yields the clamped remainder, which
/// the decoder then rejects.
pub struct RawRecords<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for RawRecords<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() || self.data.len() - self.offset < 4 {
            return None;
        }

        let declared = u32_le(self.data, self.offset) as usize;
        if declared == 0 {
            warn!("zero-length USN record at offset {}, ending batch walk", self.offset);
            self.offset = self.data.len();
            return None;
        }

        let end = self.data.len().min(self.offset + declared);
        let slice = &self.data[self.offset..end];
        self.offset += declared.max(MIN_RECORD_ADVANCE);
        Some(slice)
    }
}

/// Result of decoding one batch: the records that decoded cleanly, plus how many were
/// skipped as malformed.
#[derive(Debug, Clone)]
pub struct DecodedBatch {
    pub records: Vec<UsnRecord>,
    pub malformed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{USN_REASON_FILE_CREATE, USN_REASON_RENAME_NEW_NAME};
    use crate::tests::{RecordBuilder, encode_batch};

    #[test]
    fn cursor_below_retention_floor_is_truncated() {
        let identity = JournalIdentity {
            lowest_valid_usn: 100,
            ..Default::default()
        };

        assert!(matches!(
            identity.validate_cursor(99),
            Err(JournalError::JournalTruncated)
        ));
        assert!(identity.validate_cursor(100).is_ok());
        assert!(identity.validate_cursor(5000).is_ok());
    }

    #[test]
    fn empty_batch_preserves_cursor() -> Result<(), JournalError> {
        let batch = RawBatch::from_response(42i64.to_le_bytes().to_vec())?;
        assert_eq!(batch.next_usn(), 42);
        assert!(batch.is_empty());
        assert_eq!(batch.records().count(), 0);

        let decoded = batch.decode_records();
        assert!(decoded.records.is_empty());
        assert_eq!(decoded.malformed, 0);
        Ok(())
    }

    #[test]
    fn response_without_cursor_is_rejected() {
        let result = RawBatch::from_response(vec![0u8; CURSOR_SIZE - 1]);
        assert!(matches!(result, Err(JournalError::MalformedRecord(_))));
    }

    #[test]
    fn walk_yields_every_record_in_order() -> Result<(), JournalError> {
        let first = RecordBuilder::new(1, USN_REASON_FILE_CREATE, "a.txt").usn(10).build();
        let second = RecordBuilder::new(2, USN_REASON_RENAME_NEW_NAME, "b.txt").usn(11).build();
        let batch = RawBatch::from_response(encode_batch(500, &[first, second]))?;

        assert_eq!(batch.next_usn(), 500);
        assert!(!batch.is_empty());

        let decoded = batch.decode_records();
        assert_eq!(decoded.malformed, 0);
        let names: Vec<&str> = decoded.records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
        let usns: Vec<Usn> = decoded.records.iter().map(|r| r.usn).collect();
        assert_eq!(usns, [10, 11]);
        Ok(())
    }

    #[test]
    fn malformed_record_is_skipped_not_fatal() -> Result<(), JournalError> {
        let good = RecordBuilder::new(1, USN_REASON_FILE_CREATE, "ok.txt").build();
        let bad = RecordBuilder::new(2, USN_REASON_FILE_CREATE, "bad")
            .name_length(512)
            .build();
        let batch = RawBatch::from_response(encode_batch(7, &[good, bad]))?;

        let decoded = batch.decode_records();
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.records[0].file_name, "ok.txt");
        assert_eq!(decoded.malformed, 1);
        Ok(())
    }

    #[test]
    fn zero_declared_length_ends_walk() -> Result<(), JournalError> {
        let good = RecordBuilder::new(1, USN_REASON_FILE_CREATE, "ok.txt").build();
        let mut buffer = encode_batch(3, &[good]);
        buffer.extend_from_slice(&[0u8; 64]);
        let batch = RawBatch::from_response(buffer)?;

        let decoded = batch.decode_records();
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.malformed, 0);
        Ok(())
    }

    #[test]
    fn truncated_tail_counts_as_malformed() -> Result<(), JournalError> {
        let good = RecordBuilder::new(1, USN_REASON_FILE_CREATE, "ok.txt").build();
        let tail = RecordBuilder::new(2, USN_REASON_FILE_CREATE, "cut.txt").build();
        let mut buffer = encode_batch(9, &[good]);
        buffer.extend_from_slice(&tail[..30]);
        let batch = RawBatch::from_response(buffer)?;

        let decoded = batch.decode_records();
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.malformed, 1);
        Ok(())
    }
}
