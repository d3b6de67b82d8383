//! # limiquantix Storage Volumes
//!
//! Safe bindings over the libvirt storage volume API.
//!
//! Every operation is a thin, typed wrapper around one `virStorageVol*`
//! entry point. Flags keep their native values, failures surface as a
//! single [`StorageError`] carrying libvirt's error domain and code, and
//! every native reference is released exactly once.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   StorageVol / StoragePool / Stream     │
//! │  (ownership, flags, error marshaling)   │
//! └─────────────────────┬───────────────────┘
//!                       │  StorageAbi
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │  LibvirtStorage   │     │    MockStorage    │
//! │   (libvirt.so)    │     │    (in-memory)    │
//! └───────────────────┘     └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use limiquantix_storagevol::{MockStorage, ResizeFlag, StoragePool, VolumeXmlBuilder};
//!
//! let session = MockStorage::new();
//! session.add_pool("default", "/var/lib/libvirt/images", 100 << 30);
//!
//! let pool = StoragePool::lookup_by_name(&session, "default")?;
//! let xml = VolumeXmlBuilder::new("disk0.img", 10 << 30).build();
//! let vol = pool.create_volume_xml(&xml, Default::default())?;
//!
//! vol.resize(20 << 30, ResizeFlag::Allocate.into())?;
//! println!("{:?}", vol.get_info()?);
//! ```

pub mod abi;
pub mod error;
pub mod flags;
pub mod libvirt;
pub mod mock;
pub mod pool;
pub mod stream;
pub mod types;
pub mod volume;
pub mod xml;
mod marshal;

pub use abi::StorageAbi;
pub use error::{ErrorDetail, Result, StorageError};
pub use flags::*;
pub use mock::{MockStorage, PoolFeatures};
pub use pool::StoragePool;
pub use stream::Stream;
pub use types::{RawVolumeInfo, VolumeInfo};
pub use volume::StorageVol;
pub use xml::{VolumeXml, VolumeXmlBuilder};

#[cfg(feature = "libvirt")]
pub use libvirt::LibvirtStorage;
