//! The native storage ABI consumed by the safe wrappers.
//!
//! Each method maps one-to-one onto a libvirt entry point and keeps its C
//! contract: `c_int` results use `-1` (any negative value) as the failure
//! sentinel, string results are raw pointers where null means failure, and
//! handle results are `None` where libvirt would return `NULL`. After a
//! failure the detail sits in the calling thread's last-error slot until
//! the next entry point resets it.
//!
//! Strings returned as `*mut c_char` belong to the caller and must be
//! released with [`StorageAbi::free_string`]. Strings returned as
//! `*const c_char` are owned by the object they were read from.

use libc::{c_char, c_int, c_uint, c_ulonglong, size_t};
use std::fmt::Debug;

use crate::error::ErrorDetail;
use crate::types::RawVolumeInfo;

/// Native entry points for storage volumes and their collaborators.
///
/// # Safety
///
/// All handle arguments must have been produced by the same implementation
/// and not yet released. Pointer arguments must be valid for the access
/// the corresponding C function performs.
pub trait StorageAbi {
    /// Raw `virStorageVolPtr`.
    type Vol: Copy + Debug;
    /// Raw `virStoragePoolPtr`.
    type Pool: Copy + Debug;
    /// Raw `virStreamPtr`.
    type Stream: Copy + Debug;

    // =========================================================================
    // Storage volumes
    // =========================================================================

    /// `virStorageVolFree`
    unsafe fn vol_free(&self, vol: Self::Vol) -> c_int;

    /// `virStorageVolDelete`
    unsafe fn vol_delete(&self, vol: Self::Vol, flags: c_uint) -> c_int;

    /// `virStorageVolGetInfo`
    unsafe fn vol_get_info(&self, vol: Self::Vol, info: *mut RawVolumeInfo) -> c_int;

    /// `virStorageVolGetInfoFlags`
    unsafe fn vol_get_info_flags(
        &self,
        vol: Self::Vol,
        info: *mut RawVolumeInfo,
        flags: c_uint,
    ) -> c_int;

    /// `virStorageVolGetKey`; the string is owned by the volume object.
    unsafe fn vol_get_key(&self, vol: Self::Vol) -> *const c_char;

    /// `virStorageVolGetName`; the string is owned by the volume object.
    unsafe fn vol_get_name(&self, vol: Self::Vol) -> *const c_char;

    /// `virStorageVolGetPath`; the caller frees the string.
    unsafe fn vol_get_path(&self, vol: Self::Vol) -> *mut c_char;

    /// `virStorageVolGetXMLDesc`; the caller frees the string.
    unsafe fn vol_get_xml_desc(&self, vol: Self::Vol, flags: c_uint) -> *mut c_char;

    /// `virStorageVolResize`
    unsafe fn vol_resize(&self, vol: Self::Vol, capacity: c_ulonglong, flags: c_uint) -> c_int;

    /// `virStorageVolWipe`
    unsafe fn vol_wipe(&self, vol: Self::Vol, flags: c_uint) -> c_int;

    /// `virStorageVolWipePattern`
    unsafe fn vol_wipe_pattern(&self, vol: Self::Vol, algorithm: c_uint, flags: c_uint) -> c_int;

    /// `virStorageVolUpload`
    unsafe fn vol_upload(
        &self,
        vol: Self::Vol,
        stream: Self::Stream,
        offset: c_ulonglong,
        length: c_ulonglong,
        flags: c_uint,
    ) -> c_int;

    /// `virStorageVolDownload`
    unsafe fn vol_download(
        &self,
        vol: Self::Vol,
        stream: Self::Stream,
        offset: c_ulonglong,
        length: c_ulonglong,
        flags: c_uint,
    ) -> c_int;

    /// `virStorageVolCreateXML`
    unsafe fn vol_create_xml(
        &self,
        pool: Self::Pool,
        xml: *const c_char,
        flags: c_uint,
    ) -> Option<Self::Vol>;

    /// `virStorageVolLookupByName`
    unsafe fn vol_lookup_by_name(&self, pool: Self::Pool, name: *const c_char) -> Option<Self::Vol>;

    // =========================================================================
    // Storage pools
    // =========================================================================

    /// `virStoragePoolLookupByName`
    unsafe fn pool_lookup_by_name(&self, name: *const c_char) -> Option<Self::Pool>;

    /// `virStoragePoolLookupByVolume`
    unsafe fn pool_lookup_by_volume(&self, vol: Self::Vol) -> Option<Self::Pool>;

    /// `virStoragePoolGetName`; the string is owned by the pool object.
    unsafe fn pool_get_name(&self, pool: Self::Pool) -> *const c_char;

    /// `virStoragePoolFree`
    unsafe fn pool_free(&self, pool: Self::Pool) -> c_int;

    // =========================================================================
    // Streams
    // =========================================================================

    /// `virStreamNew`
    unsafe fn stream_new(&self, flags: c_uint) -> Option<Self::Stream>;

    /// `virStreamSend`; returns the number of bytes written.
    unsafe fn stream_send(&self, stream: Self::Stream, data: *const c_char, nbytes: size_t) -> c_int;

    /// `virStreamRecv`; returns the number of bytes read, 0 at end of stream.
    unsafe fn stream_recv(&self, stream: Self::Stream, data: *mut c_char, nbytes: size_t) -> c_int;

    /// `virStreamFinish`
    unsafe fn stream_finish(&self, stream: Self::Stream) -> c_int;

    /// `virStreamAbort`
    unsafe fn stream_abort(&self, stream: Self::Stream) -> c_int;

    /// `virStreamFree`
    unsafe fn stream_free(&self, stream: Self::Stream) -> c_int;

    // =========================================================================
    // Memory and errors
    // =========================================================================

    /// Release a string the library handed over to the caller.
    unsafe fn free_string(&self, s: *mut c_char);

    /// `virGetLastError` for the calling thread, copied out.
    fn last_error(&self) -> Option<ErrorDetail>;

    /// `virResetLastError` for the calling thread.
    fn reset_last_error(&self);
}
