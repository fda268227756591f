//! # rename-journal-rs
//!
//! A Rust library for reading the NTFS USN change journal and reconstructing file rename
//! events from its record stream.
//!
//! This crate provides safe, ergonomic abstractions for the change-journal core of a
//! file-tampering analyzer: it opens a volume, issues bounded reads of the raw journal,
//! decodes variable-length USN records, and pairs `RENAME_OLD_NAME` / `RENAME_NEW_NAME`
//! record halves into [`correlate::RenameEvent`] values. A separate resolver maps file
//! reference numbers back to current full paths.
//!
//! ## Features
//! - Poll-based, non-blocking reads of the USN journal with an explicit session cursor
//! - Bounds-checked decoding of raw `USN_RECORD_V2` bytes, no pointer casts
//! - Stateful correlation of old-name/new-name record pairs into rename events
//! - Resolve file reference numbers to full paths, with an optional LRU cache
//!
//! ## Example: Correlate rename events
//! ```rust,no_run
//! use rename_journal_rs::correlate::RenameCorrelator;
//! use rename_journal_rs::journal::{ReadOptions, UsnJournal};
//! use rename_journal_rs::volume::Volume;
//!
//! let volume = Volume::from_drive_letter('C').unwrap();
//! let mut journal = UsnJournal::new(&volume).unwrap();
//! let mut correlator = RenameCorrelator::new();
//!
//! let batch = journal.read_batch(&ReadOptions::default()).unwrap();
//! for record in batch.decode_records().records {
//!     if let Some(event) = correlator.push(&record) {
//!         println!("renamed {} -> {}", event.old_name, event.new_name);
//!     }
//! }
//! ```
//!
//! ## Platform
//! - Windows NTFS/ReFS volumes; requires administrator privileges
//! - On other platforms every device-facing call returns [`JournalError::Unsupported`];
//!   record decoding and rename correlation are pure and work everywhere
//!
//! ## License
//! MIT License.

pub mod correlate;
pub mod errors;
pub mod journal;
pub mod path;
#[cfg(windows)]
mod privilege;
pub mod record;
mod time;
pub mod volume;

// Re-export commonly used types
pub use errors::JournalError;

/// A convenient type alias for Results with JournalError.
pub type JournalResult<T> = std::result::Result<T, JournalError>;

// Utility functions for cargo tests
#[cfg(test)]
mod tests;

/// Update sequence number. Signed, matching the on-disk and ioctl representation.
pub type Usn = i64;

pub(crate) const DEFAULT_BUFFER_SIZE: usize = 64 * 1024; // 64KB

pub const USN_REASON_MASK_ALL: u32 = 0xFFFFFFFF;
