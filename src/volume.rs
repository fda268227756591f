//! Volume handle management for NTFS/ReFS
//!
//! A [`Volume`] owns an exclusive handle to one volume device for the lifetime of a
//! session; the handle is released on drop, on every exit path. On platforms without
//! a change-journal facility, opening fails with [`JournalError::Unsupported`].

use crate::errors::JournalError;
use std::path::Path;

#[cfg(windows)]
use crate::privilege;
#[cfg(windows)]
use log::{debug, warn};
#[cfg(windows)]
use windows::{
    Win32::{
        Foundation::{
            CloseHandle, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_INVALID_NAME,
            ERROR_PATH_NOT_FOUND, HANDLE,
        },
        Storage::FileSystem::{
            CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_GENERIC_READ, FILE_SHARE_READ,
            FILE_SHARE_WRITE, GetVolumeNameForVolumeMountPointW, OPEN_EXISTING,
        },
    },
    core::HSTRING,
};

#[derive(Debug)]
/// Represents a volume handle and its associated drive letter or mount point.
pub struct Volume {
    #[cfg(windows)]
    pub(crate) handle: HANDLE,
    pub drive_letter: Option<char>,
    pub mount_point: Option<String>,
}

impl Volume {
    /// Creates a new `Volume` instance with the given drive letter.
    #[cfg(windows)]
    pub fn from_drive_letter(drive_letter: char) -> Result<Self, JournalError> {
        let handle = get_volume_handle_from_drive_letter(drive_letter)?;
        Ok(Volume {
            handle,
            drive_letter: Some(drive_letter),
            mount_point: None,
        })
    }

    /// Creates a new `Volume` instance with the given mount point.
    #[cfg(windows)]
    pub fn from_mount_point(mount_point: &Path) -> Result<Self, JournalError> {
        let handle = get_volume_handle_from_mount_point(mount_point)?;
        Ok(Volume {
            handle,
            drive_letter: None,
            mount_point: Some(mount_point.to_string_lossy().to_string()),
        })
    }

    #[cfg(not(windows))]
    pub fn from_drive_letter(_drive_letter: char) -> Result<Self, JournalError> {
        Err(JournalError::Unsupported)
    }

    #[cfg(not(windows))]
    pub fn from_mount_point(_mount_point: &Path) -> Result<Self, JournalError> {
        Err(JournalError::Unsupported)
    }
}

#[cfg(windows)]
impl Drop for Volume {
    fn drop(&mut self) {
        if let Err(err) = unsafe { CloseHandle(self.handle) } {
            warn!("failed to close volume handle: {}", err);
        }
    }
}

/// Opens a handle to an NTFS/ReFS volume using a drive letter.
#[cfg(windows)]
fn get_volume_handle_from_drive_letter(drive_letter: char) -> Result<HANDLE, JournalError> {
    if !privilege::is_elevated()? {
        return Err(JournalError::AccessDenied);
    }

    // https://learn.microsoft.com/en-us/windows/win32/fileio/obtaining-a-volume-handle-for-change-journal-operations
    // To obtain a handle to a volume for use with update sequence number (USN) change journal operations,
    // call the CreateFile function with the lpFileName parameter set to a string of the following form: \\.\X:
    // Note that X is the letter that identifies the drive on which the NTFS volume appears.
    let volume_root = format!(r"\\.\{}:", drive_letter);

    match unsafe {
        CreateFileW(
            &HSTRING::from(&volume_root),
            FILE_GENERIC_READ.0,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES::default(),
            None,
        )
    } {
        Ok(handle) => Ok(handle),
        Err(err) => Err(map_open_error(err)),
    }
}

/// Opens a handle to an NTFS/ReFS volume using a mount point path.
#[cfg(windows)]
fn get_volume_handle_from_mount_point(mount_point: &Path) -> Result<HANDLE, JournalError> {
    if !privilege::is_elevated()? {
        return Err(JournalError::AccessDenied);
    }

    // GetVolumeNameForVolumeMountPointW requires trailing backslash
    let mount_path = format!("{}\\", mount_point.to_string_lossy());

    let mut volume_name = [0u16; 64]; // Enough space for volume GUID path
    if let Err(err) =
        unsafe { GetVolumeNameForVolumeMountPointW(&HSTRING::from(&mount_path), &mut volume_name) }
    {
        warn!(
            "GetVolumeNameForVolumeMountPointW failed, mount_point={}, error={:?}",
            mount_path, err
        );
        return Err(map_open_error(err));
    }

    // Convert the null-terminated wide string to a Rust string
    let end = volume_name
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(volume_name.len());
    let name_data = volume_name.get(..end).ok_or(JournalError::OtherError(
        "Failed to get volume name data".to_string(),
    ))?;
    let volume_guid = String::from_utf16_lossy(name_data);

    debug!("Volume GUID: {}", volume_guid);

    // IMPORTANT: Remove the trailing backslash for CreateFileW
    let volume_path = volume_guid.trim_end_matches('\\').to_string();
    debug!("Using volume path: {}", volume_path);

    match unsafe {
        CreateFileW(
            &HSTRING::from(&volume_path),
            FILE_GENERIC_READ.0,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES::default(),
            None,
        )
    } {
        Ok(handle) => Ok(handle),
        Err(err) => Err(map_open_error(err)),
    }
}

#[cfg(windows)]
fn map_open_error(err: windows::core::Error) -> JournalError {
    if err.code() == ERROR_ACCESS_DENIED.into() {
        JournalError::AccessDenied
    } else if err.code() == ERROR_FILE_NOT_FOUND.into()
        || err.code() == ERROR_PATH_NOT_FOUND.into()
        || err.code() == ERROR_INVALID_NAME.into()
    {
        JournalError::VolumeNotFound
    } else {
        JournalError::WinApiError(err)
    }
}
