//! Libvirt backend implementation.

use libc::{c_char, c_int, c_uint, c_ulonglong, c_void, size_t};
use std::ffi::CStr;
use std::ptr::NonNull;
use tracing::info;
use virt::connect::Connect;
use virt::sys;

use crate::abi::StorageAbi;
use crate::error::ErrorDetail;
use crate::types::RawVolumeInfo;

/// Raw `virStorageVolPtr`, never null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibvirtVol(NonNull<sys::virStorageVol>);

/// Raw `virStoragePoolPtr`, never null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibvirtPool(NonNull<sys::virStoragePool>);

/// Raw `virStreamPtr`, never null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibvirtStream(NonNull<sys::virStream>);

// libvirt objects are reference counted and may be handed between
// threads; concurrent use of one handle is still ruled out by the wrappers.
unsafe impl Send for LibvirtVol {}
unsafe impl Send for LibvirtPool {}
unsafe impl Send for LibvirtStream {}

/// Storage volume entry points of a live libvirt connection.
pub struct LibvirtStorage {
    connection: Connect,
}

impl LibvirtStorage {
    /// Connect to libvirt at the specified URI.
    ///
    /// Common URIs:
    /// - `qemu:///system` - System-wide QEMU/KVM
    /// - `qemu:///session` - User session QEMU
    /// - `test:///default` - libvirt's built-in test driver
    pub fn open(uri: &str) -> Result<Self, virt::error::Error> {
        info!(uri = %uri, "Connecting to libvirt");

        let connection = Connect::open(Some(uri))?;

        if let Ok(version) = connection.get_lib_version() {
            info!(
                version = %format!("{}.{}.{}", version / 1_000_000, (version / 1000) % 1000, version % 1000),
                "Connected to libvirt"
            );
        }

        Ok(Self { connection })
    }

    fn conn(&self) -> sys::virConnectPtr {
        self.connection.as_ptr()
    }
}

impl StorageAbi for LibvirtStorage {
    type Vol = LibvirtVol;
    type Pool = LibvirtPool;
    type Stream = LibvirtStream;

    unsafe fn vol_free(&self, vol: LibvirtVol) -> c_int {
        sys::virStorageVolFree(vol.0.as_ptr())
    }

    unsafe fn vol_delete(&self, vol: LibvirtVol, flags: c_uint) -> c_int {
        sys::virStorageVolDelete(vol.0.as_ptr(), flags)
    }

    unsafe fn vol_get_info(&self, vol: LibvirtVol, info: *mut RawVolumeInfo) -> c_int {
        sys::virStorageVolGetInfo(vol.0.as_ptr(), info as sys::virStorageVolInfoPtr)
    }

    unsafe fn vol_get_info_flags(
        &self,
        vol: LibvirtVol,
        info: *mut RawVolumeInfo,
        flags: c_uint,
    ) -> c_int {
        sys::virStorageVolGetInfoFlags(vol.0.as_ptr(), info as sys::virStorageVolInfoPtr, flags)
    }

    unsafe fn vol_get_key(&self, vol: LibvirtVol) -> *const c_char {
        sys::virStorageVolGetKey(vol.0.as_ptr())
    }

    unsafe fn vol_get_name(&self, vol: LibvirtVol) -> *const c_char {
        sys::virStorageVolGetName(vol.0.as_ptr())
    }

    unsafe fn vol_get_path(&self, vol: LibvirtVol) -> *mut c_char {
        sys::virStorageVolGetPath(vol.0.as_ptr())
    }

    unsafe fn vol_get_xml_desc(&self, vol: LibvirtVol, flags: c_uint) -> *mut c_char {
        sys::virStorageVolGetXMLDesc(vol.0.as_ptr(), flags)
    }

    unsafe fn vol_resize(&self, vol: LibvirtVol, capacity: c_ulonglong, flags: c_uint) -> c_int {
        sys::virStorageVolResize(vol.0.as_ptr(), capacity, flags)
    }

    unsafe fn vol_wipe(&self, vol: LibvirtVol, flags: c_uint) -> c_int {
        sys::virStorageVolWipe(vol.0.as_ptr(), flags)
    }

    unsafe fn vol_wipe_pattern(&self, vol: LibvirtVol, algorithm: c_uint, flags: c_uint) -> c_int {
        sys::virStorageVolWipePattern(vol.0.as_ptr(), algorithm, flags)
    }

    unsafe fn vol_upload(
        &self,
        vol: LibvirtVol,
        stream: LibvirtStream,
        offset: c_ulonglong,
        length: c_ulonglong,
        flags: c_uint,
    ) -> c_int {
        sys::virStorageVolUpload(vol.0.as_ptr(), stream.0.as_ptr(), offset, length, flags)
    }

    unsafe fn vol_download(
        &self,
        vol: LibvirtVol,
        stream: LibvirtStream,
        offset: c_ulonglong,
        length: c_ulonglong,
        flags: c_uint,
    ) -> c_int {
        sys::virStorageVolDownload(vol.0.as_ptr(), stream.0.as_ptr(), offset, length, flags)
    }

    unsafe fn vol_create_xml(
        &self,
        pool: LibvirtPool,
        xml: *const c_char,
        flags: c_uint,
    ) -> Option<LibvirtVol> {
        NonNull::new(sys::virStorageVolCreateXML(pool.0.as_ptr(), xml, flags)).map(LibvirtVol)
    }

    unsafe fn vol_lookup_by_name(&self, pool: LibvirtPool, name: *const c_char) -> Option<LibvirtVol> {
        NonNull::new(sys::virStorageVolLookupByName(pool.0.as_ptr(), name)).map(LibvirtVol)
    }

    unsafe fn pool_lookup_by_name(&self, name: *const c_char) -> Option<LibvirtPool> {
        NonNull::new(sys::virStoragePoolLookupByName(self.conn(), name)).map(LibvirtPool)
    }

    unsafe fn pool_lookup_by_volume(&self, vol: LibvirtVol) -> Option<LibvirtPool> {
        NonNull::new(sys::virStoragePoolLookupByVolume(vol.0.as_ptr())).map(LibvirtPool)
    }

    unsafe fn pool_get_name(&self, pool: LibvirtPool) -> *const c_char {
        sys::virStoragePoolGetName(pool.0.as_ptr())
    }

    unsafe fn pool_free(&self, pool: LibvirtPool) -> c_int {
        sys::virStoragePoolFree(pool.0.as_ptr())
    }

    unsafe fn stream_new(&self, flags: c_uint) -> Option<LibvirtStream> {
        NonNull::new(sys::virStreamNew(self.conn(), flags)).map(LibvirtStream)
    }

    unsafe fn stream_send(&self, stream: LibvirtStream, data: *const c_char, nbytes: size_t) -> c_int {
        sys::virStreamSend(stream.0.as_ptr(), data, nbytes)
    }

    unsafe fn stream_recv(&self, stream: LibvirtStream, data: *mut c_char, nbytes: size_t) -> c_int {
        sys::virStreamRecv(stream.0.as_ptr(), data, nbytes)
    }

    unsafe fn stream_finish(&self, stream: LibvirtStream) -> c_int {
        sys::virStreamFinish(stream.0.as_ptr())
    }

    unsafe fn stream_abort(&self, stream: LibvirtStream) -> c_int {
        sys::virStreamAbort(stream.0.as_ptr())
    }

    unsafe fn stream_free(&self, stream: LibvirtStream) -> c_int {
        sys::virStreamFree(stream.0.as_ptr())
    }

    unsafe fn free_string(&self, s: *mut c_char) {
        libc::free(s as *mut c_void);
    }

    fn last_error(&self) -> Option<ErrorDetail> {
        unsafe {
            let err = sys::virGetLastError();
            if err.is_null() {
                return None;
            }

            let err = &*err;
            let message = if err.message.is_null() {
                String::new()
            } else {
                CStr::from_ptr(err.message).to_string_lossy().into_owned()
            };
            Some(ErrorDetail::new(err.domain, err.code, message))
        }
    }

    fn reset_last_error(&self) {
        unsafe { sys::virResetLastError() }
    }
}
