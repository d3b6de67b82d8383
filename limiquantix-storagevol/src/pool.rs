//! Storage pool handle.
//!
//! Only the pool operations the volume API needs: finding a pool, naming
//! it, and producing volumes from it.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info, instrument, warn};

use crate::abi::StorageAbi;
use crate::error::Result;
use crate::flags::CreateFlags;
use crate::marshal::{borrowed_string, check, check_handle, released_pool, to_cstring};
use crate::volume::StorageVol;

/// Owned reference to one libvirt storage pool.
pub struct StoragePool<'c, A: StorageAbi> {
    abi: &'c A,
    ptr: Option<A::Pool>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'c, A: StorageAbi> StoragePool<'c, A> {
    /// Look up a pool by name on the given session.
    #[instrument(skip(abi))]
    pub fn lookup_by_name(abi: &'c A, name: &str) -> Result<Self> {
        let cname = to_cstring(name)?;
        let pool = unsafe { abi.pool_lookup_by_name(cname.as_ptr()) };
        let pool = check_handle(abi, "virStoragePoolLookupByName", pool)?;

        debug!("Found storage pool");
        Ok(unsafe { Self::from_raw(abi, pool) })
    }

    /// Take ownership of a raw pool reference.
    ///
    /// # Safety
    /// `raw` must be a live reference produced by `abi` that is not owned
    /// by anything else.
    pub unsafe fn from_raw(abi: &'c A, raw: A::Pool) -> Self {
        Self {
            abi,
            ptr: Some(raw),
            _not_sync: PhantomData,
        }
    }

    /// The raw reference, or `None` once released.
    pub fn as_raw(&self) -> Option<A::Pool> {
        self.ptr
    }

    fn raw(&self, call: &'static str) -> Result<A::Pool> {
        self.ptr.ok_or_else(|| released_pool(call))
    }

    /// Name of the pool.
    pub fn get_name(&self) -> Result<String> {
        const CALL: &str = "virStoragePoolGetName";
        let pool = self.raw(CALL)?;
        unsafe { borrowed_string(self.abi, CALL, self.abi.pool_get_name(pool)) }
    }

    /// Create a volume in this pool from its XML definition.
    #[instrument(skip(self, xml))]
    pub fn create_volume_xml(&self, xml: &str, flags: CreateFlags) -> Result<StorageVol<'c, A>> {
        const CALL: &str = "virStorageVolCreateXML";
        let pool = self.raw(CALL)?;
        let cxml = to_cstring(xml)?;

        info!("Creating storage volume");
        let vol = unsafe { self.abi.vol_create_xml(pool, cxml.as_ptr(), flags.bits()) };
        let vol = check_handle(self.abi, CALL, vol)?;

        info!("Storage volume created");
        Ok(unsafe { StorageVol::from_raw(self.abi, vol) })
    }

    /// Look up a volume of this pool by name.
    #[instrument(skip(self))]
    pub fn lookup_volume_by_name(&self, name: &str) -> Result<StorageVol<'c, A>> {
        const CALL: &str = "virStorageVolLookupByName";
        let pool = self.raw(CALL)?;
        let cname = to_cstring(name)?;

        let vol = unsafe { self.abi.vol_lookup_by_name(pool, cname.as_ptr()) };
        let vol = check_handle(self.abi, CALL, vol)?;

        Ok(unsafe { StorageVol::from_raw(self.abi, vol) })
    }

    /// Release this handle's reference to the native pool.
    ///
    /// Calling it again after a successful release does nothing.
    pub fn free(&mut self) -> Result<()> {
        let Some(pool) = self.ptr else {
            return Ok(());
        };

        let ret = unsafe { self.abi.pool_free(pool) };
        check(self.abi, "virStoragePoolFree", ret)?;

        self.ptr = None;
        Ok(())
    }
}

impl<A: StorageAbi> fmt::Debug for StoragePool<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoragePool").field("ptr", &self.ptr).finish()
    }
}

impl<A: StorageAbi> Drop for StoragePool<'_, A> {
    fn drop(&mut self) {
        if let Err(e) = self.free() {
            warn!(error = %e, "Failed to release storage pool handle");
        }
    }
}
