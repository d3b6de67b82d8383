//! Conversions across the C boundary.

use libc::{c_char, c_int, size_t};
use std::ffi::{CStr, CString};

use crate::abi::StorageAbi;
use crate::error::{code, domain, ErrorDetail, Result, StorageError};

/// Read the thread's last error right after a failed call and clear it.
pub(crate) fn last_error<A: StorageAbi>(abi: &A, call: &'static str) -> StorageError {
    let detail = abi.last_error().unwrap_or_else(ErrorDetail::unreported);
    abi.reset_last_error();
    StorageError::call_failed(call, detail)
}

/// Map a status-code sentinel to a `Result`.
pub(crate) fn check<A: StorageAbi>(abi: &A, call: &'static str, ret: c_int) -> Result<c_int> {
    if ret < 0 {
        Err(last_error(abi, call))
    } else {
        Ok(ret)
    }
}

/// Largest transfer a stream call can report through its `c_int` result.
pub(crate) fn transfer_len(len: usize) -> size_t {
    len.min(c_int::MAX as usize)
}

/// Map a `None` handle to the thread's last error.
pub(crate) fn check_handle<A: StorageAbi, T>(
    abi: &A,
    call: &'static str,
    handle: Option<T>,
) -> Result<T> {
    handle.ok_or_else(|| last_error(abi, call))
}

/// Copy a string owned by a native object.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of this call.
pub(crate) unsafe fn borrowed_string<A: StorageAbi>(
    abi: &A,
    call: &'static str,
    ptr: *const c_char,
) -> Result<String> {
    if ptr.is_null() {
        return Err(last_error(abi, call));
    }
    Ok(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Copy a string the library handed over, then release the native buffer.
///
/// # Safety
/// `ptr` must be null or a string allocated by `abi` that nothing else
/// will release.
pub(crate) unsafe fn owned_string<A: StorageAbi>(
    abi: &A,
    call: &'static str,
    ptr: *mut c_char,
) -> Result<String> {
    if ptr.is_null() {
        return Err(last_error(abi, call));
    }
    let value = CStr::from_ptr(ptr).to_string_lossy().into_owned();
    abi.free_string(ptr);
    Ok(value)
}

/// Convert an argument into a C string.
pub(crate) fn to_cstring(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| StorageError::InvalidString(value.to_string()))
}

/// The error libvirt reports when handed a NULL volume pointer.
pub(crate) fn released_volume(call: &'static str) -> StorageError {
    StorageError::call_failed(
        call,
        ErrorDetail::new(
            domain::STORAGE,
            code::INVALID_STORAGE_VOL,
            format!("invalid storage volume pointer in {}", call),
        ),
    )
}

/// The error libvirt reports when handed a NULL pool pointer.
pub(crate) fn released_pool(call: &'static str) -> StorageError {
    StorageError::call_failed(
        call,
        ErrorDetail::new(
            domain::STORAGE,
            code::INVALID_STORAGE_POOL,
            format!("invalid storage pool pointer in {}", call),
        ),
    )
}

/// The error libvirt reports when handed a NULL stream pointer.
pub(crate) fn released_stream(call: &'static str) -> StorageError {
    StorageError::call_failed(
        call,
        ErrorDetail::new(
            domain::STREAMS,
            code::INVALID_STREAM,
            format!("invalid stream pointer in {}", call),
        ),
    )
}
