//! Process elevation check.
//!
//! Change journal ioctls require administrator rights; the volume open path checks
//! elevation first so callers get a clear access-denied error up front.

use std::mem::size_of;

use windows::Win32::{
    Foundation::{CloseHandle, HANDLE},
    Security::{GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation},
    System::Threading::{GetCurrentProcess, OpenProcessToken},
};

/// Returns true when the current process token is elevated.
pub(crate) fn is_elevated() -> windows::core::Result<bool> {
    let mut token: HANDLE = HANDLE::default();
    unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token)? };

    let mut elevation = TOKEN_ELEVATION::default();
    let mut returned_length = 0u32;

    let query_result = unsafe {
        GetTokenInformation(
            token,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut _),
            size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned_length,
        )
    };

    unsafe { CloseHandle(token) }?;
    query_result?;

    Ok(elevation.TokenIsElevated != 0)
}
