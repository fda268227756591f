use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Volume not found")]
    VolumeNotFound,

    #[error("Access denied: Administrator privileges required. Please run the application as Administrator to access the USN journal.")]
    AccessDenied,

    #[error("No change journal is active on this volume")]
    JournalNotActive,

    #[error("The change journal is not supported on this volume or platform")]
    Unsupported,

    #[error("Journal history no longer covers the requested USN; re-query the journal and restart from the lowest valid USN")]
    JournalTruncated,

    #[error("The change journal was deleted or recreated since this session began")]
    JournalIdMismatch,

    #[error("Malformed USN record: {0}")]
    MalformedRecord(String),

    #[error("File reference number does not resolve to a live object")]
    NotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(windows)]
    #[error("Windows error: {0}")]
    WinApiError(#[from] windows::core::Error),

    #[error("Other error: {0}")]
    OtherError(String),
}
