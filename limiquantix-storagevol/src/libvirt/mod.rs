//! Libvirt storage backend.
//!
//! This module binds the real libvirt library. It requires the `libvirt`
//! feature to be enabled and the system to have libvirt installed.

#[cfg(feature = "libvirt")]
mod backend;

#[cfg(feature = "libvirt")]
pub use backend::{LibvirtPool, LibvirtStorage, LibvirtStream, LibvirtVol};
