//! Storage volume handle.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info, instrument, warn};

use crate::abi::StorageAbi;
use crate::error::Result;
use crate::flags::{
    DeleteFlags, DownloadFlags, InfoFlags, ResizeFlags, UploadFlags, WipeAlgorithm, XmlFlags,
};
use crate::marshal::{
    borrowed_string, check, check_handle, owned_string, released_stream, released_volume,
};
use crate::pool::StoragePool;
use crate::stream::Stream;
use crate::types::{RawVolumeInfo, VolumeInfo};

/// Owned reference to one libvirt storage volume.
///
/// The handle borrows the session it came from, so it can never outlive
/// the connection. The native reference is released by [`free`] or, at the
/// latest, when the handle is dropped.
///
/// A handle has exactly one owner: it may be moved to another thread when
/// the backend allows it, but it is never `Sync`.
///
/// [`free`]: StorageVol::free
pub struct StorageVol<'c, A: StorageAbi> {
    abi: &'c A,
    ptr: Option<A::Vol>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'c, A: StorageAbi> StorageVol<'c, A> {
    /// Take ownership of a raw volume reference.
    ///
    /// # Safety
    /// `raw` must be a live reference produced by `abi` that is not owned
    /// by anything else.
    pub unsafe fn from_raw(abi: &'c A, raw: A::Vol) -> Self {
        Self {
            abi,
            ptr: Some(raw),
            _not_sync: PhantomData,
        }
    }

    /// The raw reference, or `None` once released.
    pub fn as_raw(&self) -> Option<A::Vol> {
        self.ptr
    }

    /// Give up ownership of the raw reference without releasing it.
    pub fn into_raw(mut self) -> Option<A::Vol> {
        self.ptr.take()
    }

    /// Whether the native reference has been released.
    pub fn is_freed(&self) -> bool {
        self.ptr.is_none()
    }

    fn raw(&self, call: &'static str) -> Result<A::Vol> {
        self.ptr.ok_or_else(|| released_volume(call))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Remove the underlying storage object.
    ///
    /// An empty flag set removes metadata only. The handle itself stays
    /// allocated and must still be freed.
    #[instrument(skip(self))]
    pub fn delete(&self, flags: DeleteFlags) -> Result<()> {
        const CALL: &str = "virStorageVolDelete";
        let vol = self.raw(CALL)?;

        info!("Deleting storage volume");
        let ret = unsafe { self.abi.vol_delete(vol, flags.bits()) };
        check(self.abi, CALL, ret)?;

        info!("Storage volume deleted");
        Ok(())
    }

    /// Release this handle's reference to the native volume.
    ///
    /// Calling it again after a successful release does nothing.
    pub fn free(&mut self) -> Result<()> {
        let Some(vol) = self.ptr else {
            return Ok(());
        };

        let ret = unsafe { self.abi.vol_free(vol) };
        check(self.abi, "virStorageVolFree", ret)?;

        debug!(vol = ?vol, "Released storage volume handle");
        self.ptr = None;
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current type, capacity and allocation.
    pub fn get_info(&self) -> Result<VolumeInfo> {
        const CALL: &str = "virStorageVolGetInfo";
        let vol = self.raw(CALL)?;

        let mut raw = RawVolumeInfo::default();
        let ret = unsafe { self.abi.vol_get_info(vol, &mut raw) };
        check(self.abi, CALL, ret)?;

        VolumeInfo::try_from(raw)
    }

    /// Like [`get_info`](Self::get_info), choosing how allocation is measured.
    pub fn get_info_flags(&self, flags: InfoFlags) -> Result<VolumeInfo> {
        const CALL: &str = "virStorageVolGetInfoFlags";
        let vol = self.raw(CALL)?;

        let mut raw = RawVolumeInfo::default();
        let ret = unsafe { self.abi.vol_get_info_flags(vol, &mut raw, flags.bits()) };
        check(self.abi, CALL, ret)?;

        VolumeInfo::try_from(raw)
    }

    /// Globally unique key of the volume.
    pub fn get_key(&self) -> Result<String> {
        const CALL: &str = "virStorageVolGetKey";
        let vol = self.raw(CALL)?;
        unsafe { borrowed_string(self.abi, CALL, self.abi.vol_get_key(vol)) }
    }

    /// Name of the volume, unique within its pool.
    pub fn get_name(&self) -> Result<String> {
        const CALL: &str = "virStorageVolGetName";
        let vol = self.raw(CALL)?;
        unsafe { borrowed_string(self.abi, CALL, self.abi.vol_get_name(vol)) }
    }

    /// Host path of the volume.
    pub fn get_path(&self) -> Result<String> {
        const CALL: &str = "virStorageVolGetPath";
        let vol = self.raw(CALL)?;
        unsafe { owned_string(self.abi, CALL, self.abi.vol_get_path(vol)) }
    }

    /// XML description of the volume.
    pub fn get_xml_desc(&self, flags: XmlFlags) -> Result<String> {
        const CALL: &str = "virStorageVolGetXMLDesc";
        let vol = self.raw(CALL)?;
        unsafe { owned_string(self.abi, CALL, self.abi.vol_get_xml_desc(vol, flags.bits())) }
    }

    /// Pool that contains this volume, as a new handle.
    pub fn lookup_pool(&self) -> Result<StoragePool<'c, A>> {
        const CALL: &str = "virStoragePoolLookupByVolume";
        let vol = self.raw(CALL)?;

        let pool = unsafe { self.abi.pool_lookup_by_volume(vol) };
        let pool = check_handle(self.abi, CALL, pool)?;

        Ok(unsafe { StoragePool::from_raw(self.abi, pool) })
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Change the logical size of the volume.
    ///
    /// Without [`ResizeFlag::Shrink`](crate::ResizeFlag::Shrink) libvirt
    /// refuses to reduce capacity.
    #[instrument(skip(self))]
    pub fn resize(&self, capacity: u64, flags: ResizeFlags) -> Result<()> {
        const CALL: &str = "virStorageVolResize";
        let vol = self.raw(CALL)?;

        info!("Resizing storage volume");
        let ret = unsafe { self.abi.vol_resize(vol, capacity, flags.bits()) };
        check(self.abi, CALL, ret)?;

        info!("Storage volume resized");
        Ok(())
    }

    /// Overwrite the volume contents with zeroes.
    ///
    /// `flags` is reserved by libvirt and must currently be 0. This blocks
    /// until every byte has been written.
    #[instrument(skip(self))]
    pub fn wipe(&self, flags: u32) -> Result<()> {
        const CALL: &str = "virStorageVolWipe";
        let vol = self.raw(CALL)?;

        info!("Wiping storage volume");
        let ret = unsafe { self.abi.vol_wipe(vol, flags) };
        check(self.abi, CALL, ret)?;

        info!("Storage volume wiped");
        Ok(())
    }

    /// Erase the volume contents with the given algorithm.
    ///
    /// `flags` is reserved by libvirt and must currently be 0.
    #[instrument(skip(self), fields(passes = algorithm.passes()))]
    pub fn wipe_pattern(&self, algorithm: WipeAlgorithm, flags: u32) -> Result<()> {
        const CALL: &str = "virStorageVolWipePattern";
        let vol = self.raw(CALL)?;

        info!("Wiping storage volume");
        let ret = unsafe { self.abi.vol_wipe_pattern(vol, algorithm as u32, flags) };
        check(self.abi, CALL, ret)?;

        info!("Storage volume wiped");
        Ok(())
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    /// Bind `stream` for writing `length` bytes into the volume at `offset`.
    ///
    /// A `length` of 0 means up to the end of the volume. Data is then
    /// pushed with [`Stream::send`] and completed with [`Stream::finish`].
    #[instrument(skip(self, stream))]
    pub fn upload(
        &self,
        stream: &Stream<'c, A>,
        offset: u64,
        length: u64,
        flags: UploadFlags,
    ) -> Result<()> {
        const CALL: &str = "virStorageVolUpload";
        let vol = self.raw(CALL)?;
        let st = stream.as_raw().ok_or_else(|| released_stream(CALL))?;

        debug!("Binding upload stream");
        let ret = unsafe { self.abi.vol_upload(vol, st, offset, length, flags.bits()) };
        check(self.abi, CALL, ret)?;
        Ok(())
    }

    /// Bind `stream` for reading `length` bytes of the volume from `offset`.
    ///
    /// A `length` of 0 means up to the end of the volume. Data is then
    /// pulled with [`Stream::recv`] until it returns 0.
    #[instrument(skip(self, stream))]
    pub fn download(
        &self,
        stream: &Stream<'c, A>,
        offset: u64,
        length: u64,
        flags: DownloadFlags,
    ) -> Result<()> {
        const CALL: &str = "virStorageVolDownload";
        let vol = self.raw(CALL)?;
        let st = stream.as_raw().ok_or_else(|| released_stream(CALL))?;

        debug!("Binding download stream");
        let ret = unsafe { self.abi.vol_download(vol, st, offset, length, flags.bits()) };
        check(self.abi, CALL, ret)?;
        Ok(())
    }
}

impl<A: StorageAbi> fmt::Debug for StorageVol<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageVol").field("ptr", &self.ptr).finish()
    }
}

impl<A: StorageAbi> Drop for StorageVol<'_, A> {
    fn drop(&mut self) {
        if let Err(e) = self.free() {
            warn!(error = %e, "Failed to release storage volume handle");
        }
    }
}
