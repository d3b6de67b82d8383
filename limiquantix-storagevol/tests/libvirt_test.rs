//! Tests against libvirt's built-in test driver.
//!
//! Run with `--features libvirt`; `test:///default` needs no daemon.

#![cfg(feature = "libvirt")]

use limiquantix_storagevol::error::code;
use limiquantix_storagevol::{DeleteFlags, LibvirtStorage, StoragePool, VolumeXmlBuilder};

const URI: &str = "test:///default";
const POOL: &str = "default-pool";

#[test]
fn test_create_info_delete() {
    let session = LibvirtStorage::open(URI).expect("Failed to open test driver");
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();

    let xml = VolumeXmlBuilder::new("storagevol-test.img", 1 << 20)
        .allocation(0)
        .build();
    let mut vol = pool.create_volume_xml(&xml, Default::default()).unwrap();

    assert_eq!(vol.get_name().unwrap(), "storagevol-test.img");
    let info = vol.get_info().unwrap();
    assert_eq!(info.capacity, 1 << 20);
    assert!(info.capacity >= info.allocation);

    assert_eq!(vol.lookup_pool().unwrap().get_name().unwrap(), POOL);

    vol.delete(DeleteFlags::empty()).unwrap();
    vol.free().unwrap();
    vol.free().unwrap();
}

#[test]
fn test_missing_pool_reports_native_code() {
    let session = LibvirtStorage::open(URI).expect("Failed to open test driver");

    let err = StoragePool::lookup_by_name(&session, "no-such-pool").unwrap_err();
    assert_eq!(err.code(), Some(code::NO_STORAGE_POOL));
}
