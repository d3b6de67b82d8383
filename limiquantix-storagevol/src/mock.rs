//! In-memory storage backend for testing and development.
//!
//! `MockStorage` implements [`StorageAbi`] without libvirt. It keeps pools,
//! volumes, handles and streams in memory and answers every entry point
//! the way libvirt's storage driver does, down to the error domain and
//! code. Like libvirt it resets the calling thread's last error on entry
//! and leaves the detail of a failure behind for the caller to fetch.
//!
//! It also counts outstanding handles and caller-owned strings, which lets
//! tests prove the wrappers release everything they acquire.

use libc::{c_char, c_int, c_uint, c_ulonglong, size_t};
use rand::RngCore;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{CStr, CString};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::abi::StorageAbi;
use crate::error::{code, domain, ErrorDetail};
use crate::flags::{VolumeType, WipeAlgorithm};
use crate::marshal::transfer_len;
use crate::types::RawVolumeInfo;
use crate::xml::{VolumeXml, VolumeXmlBuilder};

thread_local! {
    static LAST_ERROR: RefCell<Option<ErrorDetail>> = RefCell::new(None);
}

type Outcome<T> = std::result::Result<T, ErrorDetail>;

/// Raw mock volume reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockVol(u64);

/// Raw mock pool reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockPool(u64);

/// Raw mock stream reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockStream(u64);

/// Capabilities of a mock pool's backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolFeatures {
    /// Volumes may shrink when `ResizeFlag::Shrink` is given.
    pub shrink: bool,
    /// Upload and download are supported.
    pub transfer: bool,
    /// The `trim` wipe algorithm is supported.
    pub trim: bool,
}

impl Default for PoolFeatures {
    fn default() -> Self {
        Self {
            shrink: true,
            transfer: true,
            trim: false,
        }
    }
}

/// In-memory storage backend for testing.
pub struct MockStorage {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    pools: BTreeMap<String, PoolState>,
    vols: HashMap<u64, VolHandle>,
    pool_handles: HashMap<u64, PoolHandle>,
    streams: HashMap<u64, Transfer>,
    next_id: u64,
    live_strings: usize,
}

struct PoolState {
    target: String,
    capacity: u64,
    features: PoolFeatures,
    volumes: BTreeMap<String, VolumeState>,
}

struct VolumeState {
    key: String,
    path: String,
    kind: VolumeType,
    capacity: u64,
    allocation: u64,
    format: String,
    /// Written extent; bytes past the end read as zeroes.
    data: Vec<u8>,
}

struct VolHandle {
    pool: String,
    name: String,
    c_name: CString,
    c_key: CString,
}

struct PoolHandle {
    c_name: CString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transfer {
    Idle,
    Upload { pool: String, name: String, pos: u64, end: u64 },
    Download { pool: String, name: String, pos: u64, end: u64 },
    Finished,
    Aborted,
}

// =============================================================================
// Error details, worded like libvirt's
// =============================================================================

fn invalid_vol(call: &str) -> ErrorDetail {
    ErrorDetail::new(
        domain::STORAGE,
        code::INVALID_STORAGE_VOL,
        format!("invalid storage volume pointer in {}", call),
    )
}

fn invalid_pool(call: &str) -> ErrorDetail {
    ErrorDetail::new(
        domain::STORAGE,
        code::INVALID_STORAGE_POOL,
        format!("invalid storage pool pointer in {}", call),
    )
}

fn invalid_stream(call: &str) -> ErrorDetail {
    ErrorDetail::new(
        domain::STREAMS,
        code::INVALID_STREAM,
        format!("invalid stream pointer in {}", call),
    )
}

fn no_vol(name: &str) -> ErrorDetail {
    ErrorDetail::new(
        domain::STORAGE,
        code::NO_STORAGE_VOL,
        format!("Storage volume not found: no storage vol with matching name '{}'", name),
    )
}

fn no_pool(name: &str) -> ErrorDetail {
    ErrorDetail::new(
        domain::STORAGE,
        code::NO_STORAGE_POOL,
        format!("Storage pool not found: no storage pool with matching name '{}'", name),
    )
}

fn invalid_arg(message: impl Into<String>) -> ErrorDetail {
    ErrorDetail::new(domain::STORAGE, code::INVALID_ARG, message)
}

fn no_support(message: impl Into<String>) -> ErrorDetail {
    ErrorDetail::new(domain::STORAGE, code::NO_SUPPORT, message)
}

fn stream_invalid(message: impl Into<String>) -> ErrorDetail {
    ErrorDetail::new(domain::STREAMS, code::OPERATION_INVALID, message)
}

fn check_flags(call: &str, flags: c_uint, known: c_uint) -> Outcome<()> {
    if flags & !known != 0 {
        return Err(invalid_arg(format!(
            "unsupported flags (0x{:x}) in function {}",
            flags & !known,
            call
        )));
    }
    Ok(())
}

fn cstring(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

// =============================================================================
// State access
// =============================================================================

impl MockState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn vol_handle(&self, vol: MockVol, call: &str) -> Outcome<&VolHandle> {
        self.vols.get(&vol.0).ok_or_else(|| invalid_vol(call))
    }

    fn locate(&self, vol: MockVol, call: &str) -> Outcome<(String, String)> {
        let handle = self.vol_handle(vol, call)?;
        Ok((handle.pool.clone(), handle.name.clone()))
    }

    fn volume_mut(&mut self, pool: &str, name: &str) -> Outcome<&mut VolumeState> {
        self.pools
            .get_mut(pool)
            .and_then(|p| p.volumes.get_mut(name))
            .ok_or_else(|| no_vol(name))
    }

    fn volume_of(&mut self, vol: MockVol, call: &str) -> Outcome<&mut VolumeState> {
        let (pool, name) = self.locate(vol, call)?;
        self.volume_mut(&pool, &name)
    }

    fn pool_name(&self, pool: MockPool, call: &str) -> Outcome<String> {
        self.pool_handles
            .get(&pool.0)
            .map(|h| h.c_name.to_string_lossy().into_owned())
            .ok_or_else(|| invalid_pool(call))
    }

    fn open_vol(&mut self, pool: &str, name: &str) -> MockVol {
        let key = self.pools[pool].volumes[name].key.clone();
        let id = self.alloc_id();
        self.vols.insert(
            id,
            VolHandle {
                pool: pool.to_string(),
                name: name.to_string(),
                c_name: cstring(name),
                c_key: cstring(&key),
            },
        );
        MockVol(id)
    }

    fn open_pool(&mut self, name: &str) -> MockPool {
        let id = self.alloc_id();
        self.pool_handles.insert(id, PoolHandle { c_name: cstring(name) });
        MockPool(id)
    }

    fn hand_over(&mut self, s: &str) -> *mut c_char {
        self.live_strings += 1;
        cstring(s).into_raw()
    }
}

impl MockStorage {
    /// Create an empty mock backend.
    pub fn new() -> Self {
        info!("Creating mock storage backend");
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Add a pool whose volumes live under `target`.
    pub fn add_pool(&self, name: &str, target: &str, capacity: u64) {
        self.add_pool_with(name, target, capacity, PoolFeatures::default());
    }

    /// Add a pool with explicit backend capabilities.
    pub fn add_pool_with(&self, name: &str, target: &str, capacity: u64, features: PoolFeatures) {
        let mut state = self.lock_state();
        state.pools.insert(
            name.to_string(),
            PoolState {
                target: target.trim_end_matches('/').to_string(),
                capacity,
                features,
                volumes: BTreeMap::new(),
            },
        );
        debug!(pool = %name, capacity, "Added mock storage pool");
    }

    /// Number of volume, pool and stream references not yet freed.
    pub fn open_handles(&self) -> usize {
        let state = self.lock_state();
        state.vols.len() + state.pool_handles.len() + state.streams.len()
    }

    /// Number of caller-owned strings not yet released.
    pub fn outstanding_strings(&self) -> usize {
        self.lock_state().live_strings
    }

    /// Names of the volumes in `pool`.
    pub fn volume_names(&self, pool: &str) -> Vec<String> {
        self.lock_state()
            .pools
            .get(pool)
            .map(|p| p.volumes.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Written contents of a volume, if it exists.
    pub fn volume_data(&self, pool: &str, name: &str) -> Option<Vec<u8>> {
        self.lock_state()
            .pools
            .get(pool)
            .and_then(|p| p.volumes.get(name))
            .map(|v| v.data.clone())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_error(detail: ErrorDetail) {
        debug!(code = detail.code, message = %detail.message, "Mock storage call failed");
        LAST_ERROR.with(|e| *e.borrow_mut() = Some(detail));
    }

    /// Run one entry point: reset the error slot, then record any failure.
    fn enter<R>(&self, f: impl FnOnce(&mut MockState) -> Outcome<R>) -> Option<R> {
        self.reset_last_error();
        let mut state = self.lock_state();
        match f(&mut state) {
            Ok(value) => Some(value),
            Err(detail) => {
                Self::set_error(detail);
                None
            }
        }
    }

    fn status(&self, f: impl FnOnce(&mut MockState) -> Outcome<()>) -> c_int {
        self.enter(f).map(|_| 0).unwrap_or(-1)
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Native entry points
// =============================================================================

impl StorageAbi for MockStorage {
    type Vol = MockVol;
    type Pool = MockPool;
    type Stream = MockStream;

    unsafe fn vol_free(&self, vol: MockVol) -> c_int {
        self.status(|s| {
            s.vols
                .remove(&vol.0)
                .map(|_| ())
                .ok_or_else(|| invalid_vol("virStorageVolFree"))
        })
    }

    unsafe fn vol_delete(&self, vol: MockVol, flags: c_uint) -> c_int {
        const CALL: &str = "storageVolDelete";
        self.status(|s| {
            check_flags(CALL, flags, 0b11)?;
            let (pool, name) = s.locate(vol, "virStorageVolDelete")?;
            s.volume_mut(&pool, &name)?;

            if let Some(p) = s.pools.get_mut(&pool) {
                p.volumes.remove(&name);
            }
            debug!(pool = %pool, volume = %name, zeroed = flags & 1 != 0, "Deleted mock volume");
            Ok(())
        })
    }

    unsafe fn vol_get_info(&self, vol: MockVol, info: *mut RawVolumeInfo) -> c_int {
        self.vol_get_info_flags(vol, info, 0)
    }

    unsafe fn vol_get_info_flags(
        &self,
        vol: MockVol,
        info: *mut RawVolumeInfo,
        flags: c_uint,
    ) -> c_int {
        let found = self.enter(|s| {
            check_flags("storageVolGetInfoFlags", flags, 0b1)?;
            let v = s.volume_of(vol, "virStorageVolGetInfo")?;
            let allocation = if flags & 1 != 0 { v.capacity } else { v.allocation };
            Ok(RawVolumeInfo {
                type_: v.kind as c_int,
                capacity: v.capacity,
                allocation,
            })
        });

        match found {
            Some(raw) => {
                *info = raw;
                0
            }
            None => -1,
        }
    }

    unsafe fn vol_get_key(&self, vol: MockVol) -> *const c_char {
        self.enter(|s| Ok(s.vol_handle(vol, "virStorageVolGetKey")?.c_key.as_ptr()))
            .unwrap_or(std::ptr::null())
    }

    unsafe fn vol_get_name(&self, vol: MockVol) -> *const c_char {
        self.enter(|s| Ok(s.vol_handle(vol, "virStorageVolGetName")?.c_name.as_ptr()))
            .unwrap_or(std::ptr::null())
    }

    unsafe fn vol_get_path(&self, vol: MockVol) -> *mut c_char {
        self.enter(|s| {
            let path = s.volume_of(vol, "virStorageVolGetPath")?.path.clone();
            Ok(s.hand_over(&path))
        })
        .unwrap_or(std::ptr::null_mut())
    }

    unsafe fn vol_get_xml_desc(&self, vol: MockVol, flags: c_uint) -> *mut c_char {
        self.enter(|s| {
            check_flags("storageVolGetXMLDesc", flags, 0b1)?;
            let (_, name) = s.locate(vol, "virStorageVolGetXMLDesc")?;
            let v = s.volume_of(vol, "virStorageVolGetXMLDesc")?;

            let mut builder = VolumeXmlBuilder::new(name, v.capacity)
                .kind(v.kind)
                .key(v.key.clone())
                .path(v.path.clone())
                .format(v.format.clone());
            // Allocation is live usage, not part of the inactive definition.
            if flags & 1 == 0 {
                builder = builder.allocation(v.allocation);
            }
            let xml = builder.build();
            Ok(s.hand_over(&xml))
        })
        .unwrap_or(std::ptr::null_mut())
    }

    unsafe fn vol_resize(&self, vol: MockVol, capacity: c_ulonglong, flags: c_uint) -> c_int {
        self.status(|s| {
            check_flags("storageVolResize", flags, 0b111)?;
            let (pool_name, name) = s.locate(vol, "virStorageVolResize")?;
            let pool = s.pools.get_mut(&pool_name).ok_or_else(|| no_vol(&name))?;
            let used: u64 = pool.volumes.values().map(|v| v.allocation).sum();
            let available = pool.capacity.saturating_sub(used);
            let features = pool.features;
            let v = pool.volumes.get_mut(&name).ok_or_else(|| no_vol(&name))?;

            let allocate = flags & 0b001 != 0;
            let delta = flags & 0b010 != 0;
            let shrink = flags & 0b100 != 0;

            let new_capacity = if delta {
                if shrink {
                    v.capacity - capacity.min(v.capacity)
                } else {
                    v.capacity
                        .checked_add(capacity)
                        .ok_or_else(|| invalid_arg("capacity overflow"))?
                }
            } else {
                capacity
            };

            if new_capacity < v.allocation {
                return Err(invalid_arg("can't shrink capacity below existing allocation"));
            }
            if new_capacity < v.capacity && !shrink {
                return Err(invalid_arg(
                    "Can't shrink capacity below current capacity unless shrink flag explicitly specified",
                ));
            }
            if new_capacity < v.capacity && !features.shrink {
                return Err(no_support("storage pool does not support shrinking volumes"));
            }
            if allocate && new_capacity - v.allocation > available {
                return Err(invalid_arg("Not enough space left in storage pool"));
            }

            v.capacity = new_capacity;
            if allocate {
                v.allocation = new_capacity;
            }
            v.data.truncate(new_capacity as usize);
            Ok(())
        })
    }

    unsafe fn vol_wipe(&self, vol: MockVol, flags: c_uint) -> c_int {
        self.vol_wipe_pattern(vol, WipeAlgorithm::Zero as c_uint, flags)
    }

    unsafe fn vol_wipe_pattern(&self, vol: MockVol, algorithm: c_uint, flags: c_uint) -> c_int {
        self.status(|s| {
            check_flags("storageVolWipePattern", flags, 0)?;
            let algorithm = WipeAlgorithm::try_from(algorithm).map_err(|_| {
                invalid_arg(format!("wiping algorithm {} not supported", algorithm))
            })?;

            let (pool_name, _) = s.locate(vol, "virStorageVolWipePattern")?;
            let trim = s.pools.get(&pool_name).map(|p| p.features.trim).unwrap_or(false);
            let v = s.volume_of(vol, "virStorageVolWipePattern")?;

            match algorithm {
                WipeAlgorithm::Zero => v.data.clear(),
                WipeAlgorithm::Trim if !trim => {
                    return Err(no_support("'trim' algorithm not supported"));
                }
                WipeAlgorithm::Trim => v.data.clear(),
                _ => rand::thread_rng().fill_bytes(&mut v.data),
            }
            Ok(())
        })
    }

    unsafe fn vol_upload(
        &self,
        vol: MockVol,
        stream: MockStream,
        offset: c_ulonglong,
        length: c_ulonglong,
        flags: c_uint,
    ) -> c_int {
        self.status(|s| {
            check_flags("storageVolUpload", flags, 0b1)?;
            let (pool, name, end) = bind_range(s, vol, stream, offset, length, "virStorageVolUpload")?;
            s.streams.insert(stream.0, Transfer::Upload { pool, name, pos: offset, end });
            Ok(())
        })
    }

    unsafe fn vol_download(
        &self,
        vol: MockVol,
        stream: MockStream,
        offset: c_ulonglong,
        length: c_ulonglong,
        flags: c_uint,
    ) -> c_int {
        self.status(|s| {
            check_flags("storageVolDownload", flags, 0b1)?;
            let (pool, name, end) =
                bind_range(s, vol, stream, offset, length, "virStorageVolDownload")?;
            s.streams.insert(stream.0, Transfer::Download { pool, name, pos: offset, end });
            Ok(())
        })
    }

    unsafe fn vol_create_xml(
        &self,
        pool: MockPool,
        xml: *const c_char,
        flags: c_uint,
    ) -> Option<MockVol> {
        let xml = CStr::from_ptr(xml).to_string_lossy().into_owned();
        self.enter(|s| {
            check_flags("storageVolCreateXML", flags, 0b11)?;
            let pool_name = s.pool_name(pool, "virStorageVolCreateXML")?;
            let def = VolumeXml::parse(&xml)
                .map_err(|e| ErrorDetail::new(domain::STORAGE, code::XML_ERROR, e))?;

            let p = s.pools.get_mut(&pool_name).ok_or_else(|| no_pool(&pool_name))?;
            if p.volumes.contains_key(&def.name) {
                return Err(ErrorDetail::new(
                    domain::STORAGE,
                    code::STORAGE_VOL_EXIST,
                    format!("storage volume already exists: '{}'", def.name),
                ));
            }

            let allocation = def.allocation.unwrap_or(def.capacity).min(def.capacity);
            let used: u64 = p.volumes.values().map(|v| v.allocation).sum();
            if allocation > p.capacity.saturating_sub(used) {
                return Err(invalid_arg("Not enough space left in storage pool"));
            }

            let path = format!("{}/{}", p.target, def.name);
            p.volumes.insert(
                def.name.clone(),
                VolumeState {
                    key: path.clone(),
                    path,
                    kind: def.kind.unwrap_or(VolumeType::File),
                    capacity: def.capacity,
                    allocation,
                    format: def.format.clone().unwrap_or_else(|| "raw".to_string()),
                    data: Vec::new(),
                },
            );
            debug!(pool = %pool_name, volume = %def.name, "Created mock volume");

            Ok(s.open_vol(&pool_name, &def.name))
        })
    }

    unsafe fn vol_lookup_by_name(&self, pool: MockPool, name: *const c_char) -> Option<MockVol> {
        let name = CStr::from_ptr(name).to_string_lossy().into_owned();
        self.enter(|s| {
            let pool_name = s.pool_name(pool, "virStorageVolLookupByName")?;
            s.volume_mut(&pool_name, &name)?;
            Ok(s.open_vol(&pool_name, &name))
        })
    }

    unsafe fn pool_lookup_by_name(&self, name: *const c_char) -> Option<MockPool> {
        let name = CStr::from_ptr(name).to_string_lossy().into_owned();
        self.enter(|s| {
            if !s.pools.contains_key(&name) {
                return Err(no_pool(&name));
            }
            Ok(s.open_pool(&name))
        })
    }

    unsafe fn pool_lookup_by_volume(&self, vol: MockVol) -> Option<MockPool> {
        self.enter(|s| {
            let (pool, _) = s.locate(vol, "virStoragePoolLookupByVolume")?;
            if !s.pools.contains_key(&pool) {
                return Err(no_pool(&pool));
            }
            Ok(s.open_pool(&pool))
        })
    }

    unsafe fn pool_get_name(&self, pool: MockPool) -> *const c_char {
        self.enter(|s| {
            s.pool_handles
                .get(&pool.0)
                .map(|h| h.c_name.as_ptr())
                .ok_or_else(|| invalid_pool("virStoragePoolGetName"))
        })
        .unwrap_or(std::ptr::null())
    }

    unsafe fn pool_free(&self, pool: MockPool) -> c_int {
        self.status(|s| {
            s.pool_handles
                .remove(&pool.0)
                .map(|_| ())
                .ok_or_else(|| invalid_pool("virStoragePoolFree"))
        })
    }

    unsafe fn stream_new(&self, flags: c_uint) -> Option<MockStream> {
        self.enter(|s| {
            check_flags("virStreamNew", flags, 0b1)?;
            let id = s.alloc_id();
            s.streams.insert(id, Transfer::Idle);
            Ok(MockStream(id))
        })
    }

    unsafe fn stream_send(&self, stream: MockStream, data: *const c_char, nbytes: size_t) -> c_int {
        let bytes: &[u8] = if nbytes == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(data as *const u8, transfer_len(nbytes))
        };
        self.enter(|s| {
            let transfer = s
                .streams
                .get(&stream.0)
                .cloned()
                .ok_or_else(|| invalid_stream("virStreamSend"))?;

            let Transfer::Upload { pool, name, pos, end } = transfer else {
                return Err(stream_invalid("stream is not open for upload"));
            };

            let n = bytes.len() as u64;
            if pos + n > end {
                return Err(ErrorDetail::new(
                    domain::STORAGE,
                    code::OPERATION_FAILED,
                    "stream write beyond requested length",
                ));
            }

            let v = s.volume_mut(&pool, &name)?;
            let start = pos as usize;
            let stop = (pos + n) as usize;
            if v.data.len() < stop {
                v.data.resize(stop, 0);
            }
            v.data[start..stop].copy_from_slice(bytes);
            v.allocation = v.allocation.max(pos + n);

            s.streams.insert(stream.0, Transfer::Upload { pool, name, pos: pos + n, end });
            Ok(n as c_int)
        })
        .unwrap_or(-1)
    }

    unsafe fn stream_recv(&self, stream: MockStream, data: *mut c_char, nbytes: size_t) -> c_int {
        let buf: &mut [u8] = if nbytes == 0 {
            &mut []
        } else {
            std::slice::from_raw_parts_mut(data as *mut u8, transfer_len(nbytes))
        };
        self.enter(|s| {
            let transfer = s
                .streams
                .get(&stream.0)
                .cloned()
                .ok_or_else(|| invalid_stream("virStreamRecv"))?;

            let Transfer::Download { pool, name, pos, end } = transfer else {
                return Err(stream_invalid("stream is not open for download"));
            };

            let n = (end - pos).min(buf.len() as u64);
            let v = s.volume_mut(&pool, &name)?;
            for (i, byte) in buf[..n as usize].iter_mut().enumerate() {
                *byte = v.data.get(pos as usize + i).copied().unwrap_or(0);
            }

            s.streams.insert(stream.0, Transfer::Download { pool, name, pos: pos + n, end });
            Ok(n as c_int)
        })
        .unwrap_or(-1)
    }

    unsafe fn stream_finish(&self, stream: MockStream) -> c_int {
        self.status(|s| {
            let transfer = s
                .streams
                .get_mut(&stream.0)
                .ok_or_else(|| invalid_stream("virStreamFinish"))?;
            if *transfer == Transfer::Aborted {
                return Err(stream_invalid("stream has been aborted"));
            }
            *transfer = Transfer::Finished;
            Ok(())
        })
    }

    unsafe fn stream_abort(&self, stream: MockStream) -> c_int {
        self.status(|s| {
            let transfer = s
                .streams
                .get_mut(&stream.0)
                .ok_or_else(|| invalid_stream("virStreamAbort"))?;
            *transfer = Transfer::Aborted;
            Ok(())
        })
    }

    unsafe fn stream_free(&self, stream: MockStream) -> c_int {
        self.status(|s| {
            s.streams
                .remove(&stream.0)
                .map(|_| ())
                .ok_or_else(|| invalid_stream("virStreamFree"))
        })
    }

    unsafe fn free_string(&self, s: *mut c_char) {
        if s.is_null() {
            return;
        }
        drop(CString::from_raw(s));
        let mut state = self.lock_state();
        state.live_strings = state.live_strings.saturating_sub(1);
    }

    fn last_error(&self) -> Option<ErrorDetail> {
        LAST_ERROR.with(|e| e.borrow().clone())
    }

    fn reset_last_error(&self) {
        LAST_ERROR.with(|e| *e.borrow_mut() = None);
    }
}

/// Validate a transfer range and the stream it binds to.
fn bind_range(
    s: &mut MockState,
    vol: MockVol,
    stream: MockStream,
    offset: u64,
    length: u64,
    call: &str,
) -> Outcome<(String, String, u64)> {
    let (pool, name) = s.locate(vol, call)?;
    let transfer_supported = s.pools.get(&pool).map(|p| p.features.transfer).unwrap_or(false);
    let capacity = s.volume_mut(&pool, &name)?.capacity;

    match s.streams.get(&stream.0) {
        None => return Err(invalid_stream(call)),
        Some(Transfer::Idle) => {}
        Some(_) => return Err(stream_invalid("stream is already in use")),
    }
    if !transfer_supported {
        return Err(no_support(format!("storage pool does not support {}", call)));
    }
    if offset > capacity {
        return Err(invalid_arg(format!(
            "offset {} exceeds volume capacity {}",
            offset, capacity
        )));
    }

    let end = if length == 0 {
        capacity
    } else {
        offset
            .checked_add(length)
            .filter(|end| *end <= capacity)
            .ok_or_else(|| {
                invalid_arg(format!(
                    "range {}+{} exceeds volume capacity {}",
                    offset, length, capacity
                ))
            })?
    };

    Ok((pool, name, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn mock_with_volume() -> (MockStorage, MockPool, MockVol) {
        let mock = MockStorage::new();
        mock.add_pool("default", "/var/lib/libvirt/images", 1 << 30);

        let name = CString::new("default").unwrap();
        let pool = unsafe { mock.pool_lookup_by_name(name.as_ptr()) }.unwrap();
        let xml = CString::new(VolumeXmlBuilder::new("disk0.img", 4096).allocation(0).build()).unwrap();
        let vol = unsafe { mock.vol_create_xml(pool, xml.as_ptr(), 0) }.unwrap();
        (mock, pool, vol)
    }

    #[test]
    fn test_failure_leaves_last_error() {
        let mock = MockStorage::new();
        let name = CString::new("missing").unwrap();

        assert!(unsafe { mock.pool_lookup_by_name(name.as_ptr()) }.is_none());
        let err = mock.last_error().unwrap();
        assert_eq!(err.domain, domain::STORAGE);
        assert_eq!(err.code, code::NO_STORAGE_POOL);
    }

    #[test]
    fn test_entry_point_resets_last_error() {
        let (mock, _pool, vol) = mock_with_volume();

        assert_eq!(unsafe { mock.vol_wipe(vol, 0x10) }, -1);
        assert!(mock.last_error().is_some());

        let mut info = RawVolumeInfo::default();
        assert_eq!(unsafe { mock.vol_get_info(vol, &mut info) }, 0);
        assert!(mock.last_error().is_none());
    }

    #[test]
    fn test_strings_are_counted() {
        let (mock, _pool, vol) = mock_with_volume();

        let path = unsafe { mock.vol_get_path(vol) };
        assert!(!path.is_null());
        assert_eq!(mock.outstanding_strings(), 1);

        unsafe { mock.free_string(path) };
        assert_eq!(mock.outstanding_strings(), 0);
    }

    #[test]
    fn test_free_unknown_handle_fails() {
        let (mock, pool, vol) = mock_with_volume();

        assert_eq!(unsafe { mock.vol_free(vol) }, 0);
        assert_eq!(unsafe { mock.vol_free(vol) }, -1);
        assert_eq!(mock.last_error().unwrap().code, code::INVALID_STORAGE_VOL);

        assert_eq!(unsafe { mock.pool_free(pool) }, 0);
        assert_eq!(mock.open_handles(), 0);
    }

    #[test]
    fn test_send_outside_upload_is_rejected() {
        let (mock, _pool, _vol) = mock_with_volume();
        let st = unsafe { mock.stream_new(0) }.unwrap();

        let data = [1u8; 4];
        let ret = unsafe { mock.stream_send(st, data.as_ptr() as *const c_char, data.len()) };
        assert_eq!(ret, -1);
        assert_eq!(mock.last_error().unwrap().code, code::OPERATION_INVALID);

        assert_eq!(unsafe { mock.stream_recv(MockStream(999), ptr::null_mut(), 0) }, -1);
        assert_eq!(mock.last_error().unwrap().code, code::INVALID_STREAM);
    }
}
