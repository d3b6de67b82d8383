//! Value types returned by volume queries.

use libc::{c_int, c_ulonglong};
use serde::Serialize;

use crate::error::Result;
use crate::flags::VolumeType;

/// Point-in-time snapshot of a volume's size accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    /// Volume type
    #[serde(rename = "type")]
    pub kind: VolumeType,
    /// Logical size in bytes
    pub capacity: u64,
    /// Current allocation in bytes
    pub allocation: u64,
}

/// C layout of `virStorageVolInfo`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RawVolumeInfo {
    pub type_: c_int,
    pub capacity: c_ulonglong,
    pub allocation: c_ulonglong,
}

impl TryFrom<RawVolumeInfo> for VolumeInfo {
    type Error = crate::error::StorageError;

    fn try_from(raw: RawVolumeInfo) -> Result<Self> {
        Ok(Self {
            kind: VolumeType::try_from(raw.type_)?,
            capacity: raw.capacity as u64,
            allocation: raw.allocation as u64,
        })
    }
}
