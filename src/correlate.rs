//! Pairing of `RENAME_OLD_NAME` / `RENAME_NEW_NAME` journal records into rename events.
//!
//! A rename transaction writes two journal records for the same file reference number:
//! first the old name, then the new one. [`RenameCorrelator`] keeps the unmatched
//! old-name legs in a pending table and emits a [`RenameEvent`] the moment the matching
//! new-name leg arrives. Legs that never find their counterpart are surfaced as
//! diagnostics, not errors.

use crate::Usn;
use crate::record::{USN_REASON_RENAME_NEW_NAME, USN_REASON_RENAME_OLD_NAME, UsnRecord};
use log::debug;
use std::collections::HashMap;
use std::time::SystemTime;

/// Default bound on the pending old-name table.
///
/// A sustained run of old-name legs whose new-name halves fall outside the processed
/// range would otherwise grow the table without limit; past the bound the oldest leg
/// (smallest USN) is dropped and counted.
pub const DEFAULT_MAX_PENDING: usize = 64 * 1024;

/// A reconstructed rename: one old-name leg paired with its new-name counterpart.
///
/// `timestamp`/`time` come from the new-name record, which closes the transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameEvent {
    pub old_name: String,
    pub new_name: String,
    pub frn: u64,
    pub old_parent_frn: u64,
    pub new_parent_frn: u64,
    pub usn: Usn,
    pub timestamp: i64,
    pub time: Option<SystemTime>,
}

/// An old-name leg waiting for (or never matched by) its new-name counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOldName {
    pub frn: u64,
    pub file_name: String,
    pub parent_frn: u64,
    pub usn: Usn,
    pub timestamp: i64,
    pub time: Option<SystemTime>,
}

/// A new-name record whose old-name leg was never seen in the processed range.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmatchedNewName {
    pub frn: u64,
    pub file_name: String,
    pub usn: Usn,
    pub timestamp: i64,
}

/// End-of-session summary: everything the correlator observed besides the events it
/// already emitted through [`RenameCorrelator::push`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatorReport {
    pub events_emitted: u64,
    pub superseded_old_names: u64,
    pub evicted_old_names: u64,
    pub unmatched_new_names: Vec<UnmatchedNewName>,
    /// Leftover pending legs, ordered by USN.
    pub unmatched_old_names: Vec<PendingOldName>,
}

/// Stateful pairing engine, one per journal session.
///
/// Feed it decoded records in scan order; identical ordered input always yields
/// identical events and diagnostics.
#[derive(Debug)]
pub struct RenameCorrelator {
    pending: HashMap<u64, PendingOldName>,
    max_pending: usize,
    unmatched_new_names: Vec<UnmatchedNewName>,
    superseded_old_names: u64,
    evicted_old_names: u64,
    events_emitted: u64,
}

impl RenameCorrelator {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    /// Create a correlator with a custom bound on the pending old-name table.
    pub fn with_max_pending(max_pending: usize) -> Self {
        RenameCorrelator {
            pending: HashMap::new(),
            max_pending: max_pending.max(1),
            unmatched_new_names: Vec::new(),
            superseded_old_names: 0,
            evicted_old_names: 0,
            events_emitted: 0,
        }
    }

    /// Process one record, emitting a rename event when it completes a pair.
    ///
    /// A record carrying `RENAME_OLD_NAME` becomes the pending leg for its FRN,
    /// silently superseding an older unmatched leg for the same FRN. A record carrying
    /// `RENAME_NEW_NAME` pops the pending leg and emits the paired event, or is
    /// recorded as an unmatched-new-name diagnostic when no leg is pending. Records
    /// carrying both flags (close-summary mode) are treated as old-name legs.
    pub fn push(&mut self, record: &UsnRecord) -> Option<RenameEvent> {
        if record.reason & USN_REASON_RENAME_OLD_NAME != 0 {
            self.note_old_name(record);
            None
        } else if record.reason & USN_REASON_RENAME_NEW_NAME != 0 {
            self.match_new_name(record)
        } else {
            None
        }
    }

    /// Number of old-name legs currently awaiting their counterpart.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// New-name records seen so far without a pending old-name leg.
    pub fn unmatched_new_names(&self) -> &[UnmatchedNewName] {
        &self.unmatched_new_names
    }

    /// Close the session and collect diagnostics.
    ///
    /// Any leg still pending means its new-name half never appeared within the
    /// processed range.
    pub fn finish(self) -> CorrelatorReport {
        let mut unmatched_old_names: Vec<PendingOldName> = self.pending.into_values().collect();
        unmatched_old_names.sort_by_key(|leg| (leg.usn, leg.frn));

        CorrelatorReport {
            events_emitted: self.events_emitted,
            superseded_old_names: self.superseded_old_names,
            evicted_old_names: self.evicted_old_names,
            unmatched_new_names: self.unmatched_new_names,
            unmatched_old_names,
        }
    }

    fn note_old_name(&mut self, record: &UsnRecord) {
        if self.pending.contains_key(&record.frn) {
            // Only the most recent unmatched leg is retained per FRN.
            self.superseded_old_names += 1;
        } else if self.pending.len() >= self.max_pending {
            self.evict_oldest();
        }

        self.pending.insert(
            record.frn,
            PendingOldName {
                frn: record.frn,
                file_name: record.file_name.clone(),
                parent_frn: record.parent_frn,
                usn: record.usn,
                timestamp: record.timestamp,
                time: record.time,
            },
        );
    }

    fn match_new_name(&mut self, record: &UsnRecord) -> Option<RenameEvent> {
        match self.pending.remove(&record.frn) {
            Some(old) => {
                self.events_emitted += 1;
                Some(RenameEvent {
                    old_name: old.file_name,
                    new_name: record.file_name.clone(),
                    frn: record.frn,
                    old_parent_frn: old.parent_frn,
                    new_parent_frn: record.parent_frn,
                    usn: record.usn,
                    timestamp: record.timestamp,
                    time: record.time,
                })
            }
            None => {
                debug!(
                    "unmatched RENAME_NEW_NAME for frn={:#x}, name={:?}",
                    record.frn, record.file_name
                );
                self.unmatched_new_names.push(UnmatchedNewName {
                    frn: record.frn,
                    file_name: record.file_name.clone(),
                    usn: record.usn,
                    timestamp: record.timestamp,
                });
                None
            }
        }
    }

    fn evict_oldest(&mut self) {
        let oldest_frn = self
            .pending
            .iter()
            .min_by_key(|(frn, leg)| (leg.usn, **frn))
            .map(|(frn, _)| *frn);
        if let Some(frn) = oldest_frn {
            self.pending.remove(&frn);
            self.evicted_old_names += 1;
            debug!("pending old-name table full, evicted frn={:#x}", frn);
        }
    }
}

impl Default for RenameCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
