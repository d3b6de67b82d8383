//! Flag sets and enumerations of the libvirt storage volume ABI.
//!
//! Every discriminant below is the integer libvirt defines in
//! `libvirt-storage.h`. They cross the C boundary untouched, so they must
//! never drift from the headers.
//!
//! Bit sets use [`enumflags2::BitFlags`]. A set with no bits selects the
//! library's default behaviour (e.g. `VIR_STORAGE_VOL_DELETE_NORMAL`).
//! Raw values coming from outside the type system go through `from_raw` /
//! `TryFrom`, which reject anything the ABI does not define.

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StorageError};

macro_rules! raw_flags {
    ($flag:ident, $set:ident, $kind:literal) => {
        #[doc = concat!("Set of [`", stringify!($flag), "`] values.")]
        pub type $set = BitFlags<$flag>;

        impl $flag {
            /// Build a flag set from a raw native value, rejecting unknown bits.
            pub fn from_raw(raw: u32) -> Result<$set> {
                BitFlags::<$flag>::from_bits(raw)
                    .map_err(|_| StorageError::InvalidValue { kind: $kind, value: raw })
            }
        }
    };
}

// =============================================================================
// Bit sets
// =============================================================================

/// `virStorageVolCreateFlags`
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFlag {
    /// Preallocate only metadata (qcow2).
    PreallocMetadata = 1 << 0,
    /// Perform a btrfs lightweight copy.
    Reflink = 1 << 1,
}
raw_flags!(CreateFlag, CreateFlags, "create flags");

/// `virStorageVolDeleteFlags`
///
/// The empty set is `VIR_STORAGE_VOL_DELETE_NORMAL`: delete metadata only.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteFlag {
    /// Clear all data to zeros before removal (slow).
    Zeroed = 1 << 0,
    /// Force removal of the volume even if snapshots are in use.
    WithSnapshots = 1 << 1,
}
raw_flags!(DeleteFlag, DeleteFlags, "delete flags");

/// `virStorageVolResizeFlags`
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFlag {
    /// Force allocation of the new size.
    Allocate = 1 << 0,
    /// Size is relative to the current capacity.
    Delta = 1 << 1,
    /// Allow a decrease in capacity.
    Shrink = 1 << 2,
}
raw_flags!(ResizeFlag, ResizeFlags, "resize flags");

/// `virStorageXMLFlags`
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlFlag {
    /// Dump the inactive definition, without transient state.
    Inactive = 1 << 0,
}
raw_flags!(XmlFlag, XmlFlags, "xml flags");

/// `virStorageVolInfoFlags`
///
/// The empty set is `VIR_STORAGE_VOL_USE_ALLOCATION`.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoFlag {
    /// Report the physical host size instead of the allocation.
    GetPhysical = 1 << 0,
}
raw_flags!(InfoFlag, InfoFlags, "info flags");

/// `virStorageVolUploadFlags`
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFlag {
    /// Use sparse stream transfer.
    SparseStream = 1 << 0,
}
raw_flags!(UploadFlag, UploadFlags, "upload flags");

/// `virStorageVolDownloadFlags`
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFlag {
    /// Use sparse stream transfer.
    SparseStream = 1 << 0,
}
raw_flags!(DownloadFlag, DownloadFlags, "download flags");

// =============================================================================
// Closed enumerations
// =============================================================================

/// `virStorageVolType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum VolumeType {
    /// Regular file based volume.
    File = 0,
    /// Block based volume.
    Block = 1,
    /// Directory-passthrough based volume.
    Dir = 2,
    /// Network volume like RBD.
    Network = 3,
    /// Network accessible directory that can contain other network volumes.
    NetDir = 4,
    /// Ploop directory based volume.
    Ploop = 5,
}

impl VolumeType {
    pub const ALL: [VolumeType; 6] = [
        Self::File,
        Self::Block,
        Self::Dir,
        Self::Network,
        Self::NetDir,
        Self::Ploop,
    ];

    /// Name used in the `type` attribute of volume XML.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Block => "block",
            Self::Dir => "dir",
            Self::Network => "network",
            Self::NetDir => "netdir",
            Self::Ploop => "ploop",
        }
    }
}

impl TryFrom<i32> for VolumeType {
    type Error = StorageError;

    fn try_from(raw: i32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| *t as i32 == raw)
            .ok_or(StorageError::InvalidValue { kind: "volume type", value: raw as u32 })
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolumeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown volume type '{}'", s))
    }
}

/// `virStorageVolWipeAlgorithm`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum WipeAlgorithm {
    /// 1-pass, all zeroes.
    Zero = 0,
    /// 4-pass NNSA Policy Letter NAP-14.1-C (XVI-8).
    Nnsa = 1,
    /// 4-pass DoD 5220.22-M section 8-306 procedure.
    Dod = 2,
    /// 9-pass method recommended by the German Center of Security in
    /// Information Technologies.
    Bsi = 3,
    /// The canonical 35-pass sequence.
    Gutmann = 4,
    /// 7-pass method described by Bruce Schneier in "Applied Cryptography".
    Schneier = 5,
    /// 7-pass random.
    Pfitzner7 = 6,
    /// 33-pass random.
    Pfitzner33 = 7,
    /// 1-pass random.
    Random = 8,
    /// Trim the underlying storage.
    Trim = 9,
}

impl WipeAlgorithm {
    pub const ALL: [WipeAlgorithm; 10] = [
        Self::Zero,
        Self::Nnsa,
        Self::Dod,
        Self::Bsi,
        Self::Gutmann,
        Self::Schneier,
        Self::Pfitzner7,
        Self::Pfitzner33,
        Self::Random,
        Self::Trim,
    ];

    /// Name as accepted by `virsh vol-wipe --algorithm`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::Nnsa => "nnsa",
            Self::Dod => "dod",
            Self::Bsi => "bsi",
            Self::Gutmann => "gutmann",
            Self::Schneier => "schneier",
            Self::Pfitzner7 => "pfitzner7",
            Self::Pfitzner33 => "pfitzner33",
            Self::Random => "random",
            Self::Trim => "trim",
        }
    }

    /// Number of overwrite passes; trim issues no writes.
    pub fn passes(self) -> u32 {
        match self {
            Self::Zero | Self::Random => 1,
            Self::Nnsa | Self::Dod => 4,
            Self::Bsi => 9,
            Self::Gutmann => 35,
            Self::Schneier | Self::Pfitzner7 => 7,
            Self::Pfitzner33 => 33,
            Self::Trim => 0,
        }
    }
}

impl TryFrom<u32> for WipeAlgorithm {
    type Error = StorageError;

    fn try_from(raw: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| *a as u32 == raw)
            .ok_or(StorageError::InvalidValue { kind: "wipe algorithm", value: raw })
    }
}

impl fmt::Display for WipeAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WipeAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown wipe algorithm '{}'", s))
    }
}
