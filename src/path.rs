//! Path resolution for file reference numbers.
//!
//! Opens a live filesystem object directly by its FRN and queries its current canonical
//! path, with no name-based walk. Resolution is best-effort by nature: it reflects
//! where the object is *now*, and a FRN whose object was deleted (or reused) fails
//! with [`JournalError::NotFound`] rather than recovering history.

use crate::errors::JournalError;
use crate::volume::Volume;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

#[cfg(windows)]
use log::warn;
#[cfg(windows)]
use std::{
    ffi::{OsString, c_void},
    mem::size_of,
    os::windows::ffi::OsStringExt,
};
#[cfg(windows)]
use windows::{
    Win32::{
        Foundation::{self},
        Storage::FileSystem::{self, FILE_FLAGS_AND_ATTRIBUTES, FILE_ID_DESCRIPTOR},
    },
    core::HSTRING,
};

const LRU_CACHE_CAPACITY: usize = 4 * 1024; // 4K

/// Resolves file reference numbers to full paths on a volume.
///
/// The cached variant remembers resolved paths keyed by FRN. A cached entry can go
/// stale when the object moves between lookups; use an uncached resolver where
/// freshness matters more than speed.
#[derive(Debug)]
pub struct FrnPathResolver<'a> {
    volume: &'a Volume,
    frn_path_cache: Option<LruCache<u64, PathBuf>>,
}

impl<'a> FrnPathResolver<'a> {
    /// Create a new `FrnPathResolver` without caching.
    pub fn new(volume: &'a Volume) -> Self {
        FrnPathResolver {
            volume,
            frn_path_cache: None,
        }
    }

    /// Create a new `FrnPathResolver` with an LRU cache of resolved paths.
    pub fn new_with_cache(volume: &'a Volume) -> Self {
        let capacity = NonZeroUsize::new(LRU_CACHE_CAPACITY).unwrap();
        FrnPathResolver {
            volume,
            frn_path_cache: Some(LruCache::new(capacity)),
        }
    }

    /// Resolve the current full path of the live object with the given FRN.
    pub fn resolve(&mut self, frn: u64) -> Result<PathBuf, JournalError> {
        if let Some(cache) = &mut self.frn_path_cache {
            if let Some(path) = cache.get(&frn) {
                return Ok(path.clone());
            }
        }

        let path = file_id_to_path(self.volume, frn)?;

        if let Some(cache) = &mut self.frn_path_cache {
            cache.put(frn, path.clone());
        }
        Ok(path)
    }
}

/// Look up the file reference number of a path.
///
/// The inverse of [`FrnPathResolver::resolve`]; lets a caller key journal records to
/// files it already knows by name. Opens with backup semantics so directories resolve
/// too.
#[cfg(windows)]
pub fn file_frn(path: &Path) -> Result<u64, JournalError> {
    let wide_path = path.to_string_lossy().to_string();
    let handle = match unsafe {
        FileSystem::CreateFileW(
            &HSTRING::from(&wide_path),
            0,
            FileSystem::FILE_SHARE_READ
                | FileSystem::FILE_SHARE_WRITE
                | FileSystem::FILE_SHARE_DELETE,
            None,
            FileSystem::OPEN_EXISTING,
            FileSystem::FILE_FLAG_BACKUP_SEMANTICS,
            None,
        )
    } {
        Ok(handle) => handle,
        Err(err) => return Err(map_resolve_error(err)),
    };

    let mut info = FileSystem::FILE_ID_INFO::default();
    let query_result = unsafe {
        FileSystem::GetFileInformationByHandleEx(
            handle,
            FileSystem::FileIdInfo,
            &mut info as *mut _ as *mut c_void,
            size_of::<FileSystem::FILE_ID_INFO>() as u32,
        )
    };

    if let Err(err) = unsafe { Foundation::CloseHandle(handle) } {
        warn!("failed to close handle for {:?}: {}", path, err);
    }
    query_result.map_err(map_resolve_error)?;

    // The 64-bit FRN is the low half of the 128-bit file ID.
    let mut frn_bytes = [0u8; 8];
    frn_bytes.copy_from_slice(&info.FileId.Identifier[..8]);
    Ok(u64::from_le_bytes(frn_bytes))
}

#[cfg(not(windows))]
pub fn file_frn(_path: &Path) -> Result<u64, JournalError> {
    Err(JournalError::Unsupported)
}

/// Resolves a file reference number to its full path on the given volume.
#[cfg(windows)]
fn file_id_to_path(volume: &Volume, frn: u64) -> Result<PathBuf, JournalError> {
    let file_id_desc = FILE_ID_DESCRIPTOR {
        Type: FileSystem::FileIdType,
        dwSize: size_of::<FILE_ID_DESCRIPTOR>() as u32,
        Anonymous: FileSystem::FILE_ID_DESCRIPTOR_0 { FileId: frn as i64 },
    };

    let file_handle = match unsafe {
        FileSystem::OpenFileById(
            volume.handle,
            &file_id_desc,
            FileSystem::FILE_GENERIC_READ.0,
            FileSystem::FILE_SHARE_READ
                | FileSystem::FILE_SHARE_WRITE
                | FileSystem::FILE_SHARE_DELETE,
            None,
            FILE_FLAGS_AND_ATTRIBUTES::default(),
        )
    } {
        Ok(handle) => handle,
        Err(err) => return Err(map_resolve_error(err)),
    };

    let name_result = read_volume_relative_name(file_handle);

    if let Err(err) = unsafe { Foundation::CloseHandle(file_handle) } {
        warn!("failed to close file handle for frn {:#x}: {}", frn, err);
    }

    let sub_path = name_result?;

    // Create the full path directly with a single allocation
    let mut full_path = PathBuf::new();

    if let Some(drive_letter) = volume.drive_letter {
        full_path.push(format!("{}:\\", drive_letter.to_ascii_uppercase()));
    } else if let Some(mount_point) = &volume.mount_point {
        full_path.push(mount_point);
    }

    full_path.push(sub_path);
    Ok(full_path)
}

#[cfg(not(windows))]
fn file_id_to_path(_volume: &Volume, _frn: u64) -> Result<PathBuf, JournalError> {
    Err(JournalError::Unsupported)
}

/// Query the volume-relative canonical name of an open file handle.
#[cfg(windows)]
fn read_volume_relative_name(file_handle: Foundation::HANDLE) -> Result<OsString, JournalError> {
    let init_len = size_of::<u32>() + (Foundation::MAX_PATH as usize) * size_of::<u16>();
    let mut info_buffer = vec![0u8; init_len];

    loop {
        if let Err(err) = unsafe {
            FileSystem::GetFileInformationByHandleEx(
                file_handle,
                FileSystem::FileNameInfo,
                &mut *info_buffer as *mut _ as *mut c_void,
                info_buffer.len() as u32,
            )
        } {
            if err.code() == Foundation::ERROR_MORE_DATA.into() {
                // Long paths, needs to extend buffer size to hold it.
                let name_info = unsafe {
                    std::ptr::read(info_buffer.as_ptr() as *const FileSystem::FILE_NAME_INFO)
                };

                let needed_len = name_info.FileNameLength + size_of::<u32>() as u32;
                info_buffer.resize(needed_len as usize, 0);
                continue;
            }

            return Err(map_resolve_error(err));
        }

        break;
    }

    // SAFETY: The buffer is guaranteed to be large enough for FILE_NAME_INFO
    // and the pointer is valid for the lifetime of the buffer.
    let info: &FileSystem::FILE_NAME_INFO =
        unsafe { &*(info_buffer.as_ptr() as *const FileSystem::FILE_NAME_INFO) };

    let name_len = info.FileNameLength as usize / size_of::<u16>();
    let name_u16 = unsafe { std::slice::from_raw_parts(info.FileName.as_ptr(), name_len) };
    Ok(OsString::from_wide(name_u16))
}

#[cfg(windows)]
fn map_resolve_error(err: windows::core::Error) -> JournalError {
    if err.code() == Foundation::ERROR_ACCESS_DENIED.into() {
        JournalError::AccessDenied
    } else if err.code() == Foundation::ERROR_FILE_NOT_FOUND.into()
        || err.code() == Foundation::ERROR_PATH_NOT_FOUND.into()
        || err.code() == Foundation::ERROR_INVALID_PARAMETER.into()
    {
        // A stale or reused FRN no longer names a live object.
        JournalError::NotFound
    } else {
        JournalError::WinApiError(err)
    }
}
