//! Integration tests for the storage volume bindings.
//!
//! These tests drive the safe wrappers against the in-memory backend.

use std::io::{Read, Write};

use limiquantix_storagevol::error::{code, domain};
use limiquantix_storagevol::{
    DeleteFlag, DeleteFlags, DownloadFlags, InfoFlag, InfoFlags, MockStorage, PoolFeatures, ResizeFlag,
    ResizeFlags, StorageError, StoragePool, Stream, UploadFlags, VolumeType, VolumeXml,
    VolumeXmlBuilder, WipeAlgorithm, XmlFlag, XmlFlags,
};

const POOL: &str = "default";

fn session() -> MockStorage {
    let session = MockStorage::new();
    session.add_pool(POOL, "/var/lib/libvirt/images", 1 << 30);
    session
}

fn empty_volume(name: &str, capacity: u64) -> String {
    VolumeXmlBuilder::new(name, capacity).allocation(0).build()
}

fn assert_code(err: StorageError, expected: i32) {
    assert_eq!(err.code(), Some(expected), "unexpected error: {}", err);
}

/// Test that a fresh volume reports the type and sizes it was created with.
#[test]
fn test_fresh_volume_info() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();

    let xml = VolumeXmlBuilder::new("lv0", 1 << 20)
        .kind(VolumeType::Block)
        .allocation(4096)
        .build();
    let vol = pool.create_volume_xml(&xml, Default::default()).unwrap();

    let info = vol.get_info().unwrap();
    assert_eq!(info.kind, VolumeType::Block);
    assert_eq!(info.capacity, 1 << 20);
    assert_eq!(info.allocation, 4096);
    assert!(info.capacity >= info.allocation);

    let physical = vol.get_info_flags(InfoFlag::GetPhysical.into()).unwrap();
    assert_eq!(physical.capacity, info.capacity);
}

/// Test that default allocation follows capacity.
#[test]
fn test_default_allocation() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();

    let xml = VolumeXmlBuilder::new("full.img", 8192).build();
    let vol = pool.create_volume_xml(&xml, Default::default()).unwrap();

    let info = vol.get_info().unwrap();
    assert_eq!(info.kind, VolumeType::File);
    assert_eq!(info.allocation, info.capacity);
}

/// Test identity accessors.
#[test]
fn test_name_key_path() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 4096), Default::default())
        .unwrap();

    assert_eq!(vol.get_name().unwrap(), "disk0.img");
    assert_eq!(vol.get_path().unwrap(), "/var/lib/libvirt/images/disk0.img");
    assert_eq!(vol.get_key().unwrap(), vol.get_path().unwrap());

    let again = pool.lookup_volume_by_name("disk0.img").unwrap();
    assert_eq!(again.get_key().unwrap(), vol.get_key().unwrap());
}

/// Test that the owning pool can be found from a volume.
#[test]
fn test_lookup_pool_by_volume() {
    let session = session();
    session.add_pool("backup", "/srv/backup", 1 << 30);

    let pool = StoragePool::lookup_by_name(&session, "backup").unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("dump.raw", 512), Default::default())
        .unwrap();
    drop(pool);

    let owner = vol.lookup_pool().unwrap();
    assert_eq!(owner.get_name().unwrap(), "backup");
}

/// Test that every operation after delete fails with a native error.
#[test]
fn test_operations_after_delete_fail() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("gone.img", 4096), Default::default())
        .unwrap();

    vol.delete(DeleteFlags::empty()).unwrap();
    assert!(session.volume_names(POOL).is_empty());

    assert_code(vol.get_info().unwrap_err(), code::NO_STORAGE_VOL);
    assert_code(vol.get_path().unwrap_err(), code::NO_STORAGE_VOL);
    assert_code(vol.get_xml_desc(XmlFlags::empty()).unwrap_err(), code::NO_STORAGE_VOL);
    assert_code(
        vol.resize(8192, ResizeFlags::empty()).unwrap_err(),
        code::NO_STORAGE_VOL,
    );
    assert_code(vol.wipe(0).unwrap_err(), code::NO_STORAGE_VOL);
    assert_code(
        vol.wipe_pattern(WipeAlgorithm::Zero, 0).unwrap_err(),
        code::NO_STORAGE_VOL,
    );
    assert_code(
        vol.get_info_flags(InfoFlags::empty()).unwrap_err(),
        code::NO_STORAGE_VOL,
    );
    assert_code(vol.delete(DeleteFlags::empty()).unwrap_err(), code::NO_STORAGE_VOL);

    let upload = Stream::new(&session).unwrap();
    assert_code(
        vol.upload(&upload, 0, 0, UploadFlags::empty()).unwrap_err(),
        code::NO_STORAGE_VOL,
    );
    let download = Stream::new(&session).unwrap();
    assert_code(
        vol.download(&download, 0, 0, DownloadFlags::empty()).unwrap_err(),
        code::NO_STORAGE_VOL,
    );

    let err = vol.get_info().unwrap_err();
    assert_eq!(err.domain(), Some(domain::STORAGE));

    // The handle itself still names the volume.
    assert_eq!(vol.get_name().unwrap(), "gone.img");
}

/// Test that delete honours its flags.
#[test]
fn test_delete_with_flags() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("zeroed.img", 4096), Default::default())
        .unwrap();

    vol.delete(DeleteFlag::Zeroed | DeleteFlag::WithSnapshots).unwrap();
    assert!(session.volume_names(POOL).is_empty());
}

/// Test that free is idempotent and a freed handle reports a native error.
#[test]
fn test_double_free_is_noop() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let mut vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 4096), Default::default())
        .unwrap();
    assert_eq!(session.open_handles(), 2);

    vol.free().unwrap();
    vol.free().unwrap();
    assert!(vol.is_freed());
    assert_eq!(session.open_handles(), 1);

    let err = vol.get_info().unwrap_err();
    assert_code(err.clone(), code::INVALID_STORAGE_VOL);
    assert_eq!(err.domain(), Some(domain::STORAGE));

    // Releasing a handle never touches the volume itself.
    assert_eq!(session.volume_names(POOL), vec!["disk0.img".to_string()]);
}

/// Test that handles and strings are all released on scope exit.
#[test]
fn test_scoped_release() {
    let session = session();
    {
        let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
        let vol = pool
            .create_volume_xml(&empty_volume("disk0.img", 4096), Default::default())
            .unwrap();
        let _owner = vol.lookup_pool().unwrap();
        let _stream = Stream::new(&session).unwrap();

        for _ in 0..3 {
            vol.get_path().unwrap();
            vol.get_xml_desc(XmlFlags::empty()).unwrap();
        }
        assert_eq!(session.outstanding_strings(), 0);
        assert_eq!(session.open_handles(), 4);
    }
    assert_eq!(session.open_handles(), 0);
}

/// Test that into_raw hands ownership back to the caller.
#[test]
fn test_into_raw() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 4096), Default::default())
        .unwrap();

    let raw = vol.into_raw().unwrap();
    assert_eq!(session.open_handles(), 2);

    let mut vol = unsafe { limiquantix_storagevol::StorageVol::from_raw(&session, raw) };
    vol.free().unwrap();
    assert_eq!(session.open_handles(), 1);
}

/// Test resize with and without the shrink flag.
#[test]
fn test_resize_shrink() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 4096), Default::default())
        .unwrap();

    assert_code(
        vol.resize(2048, ResizeFlags::empty()).unwrap_err(),
        code::INVALID_ARG,
    );
    assert_eq!(vol.get_info().unwrap().capacity, 4096);

    vol.resize(2048, ResizeFlag::Shrink.into()).unwrap();
    assert_eq!(vol.get_info().unwrap().capacity, 2048);
}

/// Test that a new volume must fit in the space left in its pool.
#[test]
fn test_create_exceeding_pool_space() {
    let session = MockStorage::new();
    session.add_pool("small", "/srv/small", 1 << 20);
    let pool = StoragePool::lookup_by_name(&session, "small").unwrap();

    // Allocation defaults to the full capacity.
    let xml = VolumeXmlBuilder::new("big.img", 10 << 20).build();
    let err = pool.create_volume_xml(&xml, Default::default()).unwrap_err();
    assert_eq!(err.domain(), Some(domain::STORAGE));
    assert_code(err, code::INVALID_ARG);
    assert!(session.volume_names("small").is_empty());

    pool.create_volume_xml(&empty_volume("sparse.img", 10 << 20), Default::default())
        .unwrap();

    let half = VolumeXmlBuilder::new("half.img", 1 << 19).build();
    pool.create_volume_xml(&half, Default::default()).unwrap();
    let rest = VolumeXmlBuilder::new("rest.img", (1 << 19) + 1).build();
    assert_code(
        pool.create_volume_xml(&rest, Default::default()).unwrap_err(),
        code::INVALID_ARG,
    );
    assert_eq!(
        session.volume_names("small"),
        vec!["half.img".to_string(), "sparse.img".to_string()]
    );
}

/// Test that a pool without shrink support refuses to shrink.
#[test]
fn test_resize_shrink_unsupported() {
    let session = MockStorage::new();
    session.add_pool_with(
        "lvm",
        "/dev/vg0",
        1 << 30,
        PoolFeatures {
            shrink: false,
            ..PoolFeatures::default()
        },
    );
    let pool = StoragePool::lookup_by_name(&session, "lvm").unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("lv0", 4096), Default::default())
        .unwrap();

    assert_code(
        vol.resize(2048, ResizeFlag::Shrink.into()).unwrap_err(),
        code::NO_SUPPORT,
    );
}

/// Test delta and allocate resizes.
#[test]
fn test_resize_delta_and_allocate() {
    let session = MockStorage::new();
    session.add_pool("small", "/srv/small", 1 << 20);
    let pool = StoragePool::lookup_by_name(&session, "small").unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 4096), Default::default())
        .unwrap();

    vol.resize(1024, ResizeFlag::Delta.into()).unwrap();
    assert_eq!(vol.get_info().unwrap().capacity, 5120);

    vol.resize(1024, ResizeFlag::Delta | ResizeFlag::Shrink).unwrap();
    assert_eq!(vol.get_info().unwrap().capacity, 4096);

    vol.resize(8192, ResizeFlag::Allocate.into()).unwrap();
    let info = vol.get_info().unwrap();
    assert_eq!(info.capacity, 8192);
    assert_eq!(info.allocation, 8192);

    assert_code(
        vol.resize(2 << 20, ResizeFlag::Allocate.into()).unwrap_err(),
        code::INVALID_ARG,
    );
}

/// Test that XML from one volume recreates an equivalent one.
#[test]
fn test_xml_round_trip() {
    let session = session();
    session.add_pool("backup", "/srv/backup", 1 << 30);

    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let xml = VolumeXmlBuilder::new("disk0.qcow2", 10 << 20)
        .kind(VolumeType::Network)
        .allocation(0)
        .format("qcow2")
        .build();
    let vol = pool.create_volume_xml(&xml, Default::default()).unwrap();
    let desc = vol.get_xml_desc(XmlFlags::empty()).unwrap();

    // Same definition in another pool.
    let backup = StoragePool::lookup_by_name(&session, "backup").unwrap();
    let copy = backup.create_volume_xml(&desc, Default::default()).unwrap();

    // Renamed definition in the same pool.
    let mut def = VolumeXml::parse(&desc).unwrap();
    def.name = "disk1.qcow2".to_string();
    def.key = None;
    def.path = None;
    let renamed = pool
        .create_volume_xml(&def.to_builder().build(), Default::default())
        .unwrap();

    let original = vol.get_info().unwrap();
    for recreated in [copy.get_info().unwrap(), renamed.get_info().unwrap()] {
        assert_eq!(recreated.kind, original.kind);
        assert_eq!(recreated.capacity, original.capacity);
    }

    let parsed = VolumeXml::parse(&renamed.get_xml_desc(XmlFlags::empty()).unwrap()).unwrap();
    assert_eq!(parsed.format.as_deref(), Some("qcow2"));
    assert_eq!(parsed.path.as_deref(), Some("/var/lib/libvirt/images/disk1.qcow2"));
}

/// Test that the inactive description leaves out live allocation.
#[test]
fn test_inactive_xml() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 4096), Default::default())
        .unwrap();

    let active = VolumeXml::parse(&vol.get_xml_desc(XmlFlags::empty()).unwrap()).unwrap();
    let inactive = VolumeXml::parse(&vol.get_xml_desc(XmlFlag::Inactive.into()).unwrap()).unwrap();

    assert_eq!(active.allocation, Some(0));
    assert_eq!(inactive.allocation, None);
    assert_eq!(inactive.capacity, active.capacity);
}

/// Test that uploaded bytes come back unchanged.
#[test]
fn test_upload_then_download() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 64), Default::default())
        .unwrap();

    let data: Vec<u8> = (1..=16).collect();

    let mut upload = Stream::new(&session).unwrap();
    vol.upload(&upload, 8, 16, UploadFlags::empty()).unwrap();
    upload.write_all(&data).unwrap();
    upload.finish().unwrap();
    upload.free().unwrap();

    let mut download = Stream::new(&session).unwrap();
    vol.download(&download, 8, 16, DownloadFlags::empty()).unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 32];
    loop {
        let n = download.recv(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }
    download.finish().unwrap();

    assert_eq!(received, data);
}

/// Test that a zero length download reads to the end of the volume.
#[test]
fn test_download_to_end() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 64), Default::default())
        .unwrap();

    let mut upload = Stream::new(&session).unwrap();
    vol.upload(&upload, 0, 4, UploadFlags::empty()).unwrap();
    upload.write_all(&[9, 8, 7, 6]).unwrap();
    upload.finish().unwrap();

    let mut download = Stream::new(&session).unwrap();
    vol.download(&download, 0, 0, DownloadFlags::empty()).unwrap();

    let mut received = Vec::new();
    download.read_to_end(&mut received).unwrap();
    download.finish().unwrap();

    assert_eq!(received.len(), 64);
    assert_eq!(&received[..4], &[9, 8, 7, 6]);
    assert!(received[4..].iter().all(|&b| b == 0));
}

/// Test that an upload past the bound range is refused.
#[test]
fn test_upload_beyond_range() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 64), Default::default())
        .unwrap();

    let mut stream = Stream::new(&session).unwrap();
    vol.upload(&stream, 0, 4, UploadFlags::empty()).unwrap();
    assert_code(stream.send(&[0xaa; 8]).unwrap_err(), code::OPERATION_FAILED);
    stream.abort().unwrap();

    let other = Stream::new(&session).unwrap();
    assert_code(
        vol.upload(&other, 60, 8, UploadFlags::empty()).unwrap_err(),
        code::INVALID_ARG,
    );
}

/// Test transfers on a pool that does not support them.
#[test]
fn test_transfer_unsupported() {
    let session = MockStorage::new();
    session.add_pool_with(
        "rbd",
        "rbd",
        1 << 30,
        PoolFeatures {
            transfer: false,
            ..PoolFeatures::default()
        },
    );
    let pool = StoragePool::lookup_by_name(&session, "rbd").unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("image", 64), Default::default())
        .unwrap();

    let stream = Stream::new(&session).unwrap();
    assert_code(
        vol.download(&stream, 0, 0, DownloadFlags::empty()).unwrap_err(),
        code::NO_SUPPORT,
    );
}

/// Test that a freed stream reports the stream error domain.
#[test]
fn test_freed_stream() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 64), Default::default())
        .unwrap();

    let mut stream = Stream::new(&session).unwrap();
    stream.free().unwrap();
    stream.free().unwrap();

    let err = stream.send(&[1, 2, 3]).unwrap_err();
    assert_eq!(err.domain(), Some(domain::STREAMS));
    assert_code(err, code::INVALID_STREAM);

    assert_code(
        vol.upload(&stream, 0, 0, UploadFlags::empty()).unwrap_err(),
        code::INVALID_STREAM,
    );
}

/// Test wipe flags and algorithms.
#[test]
fn test_wipe() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 64), Default::default())
        .unwrap();

    let mut stream = Stream::new(&session).unwrap();
    vol.upload(&stream, 0, 0, UploadFlags::empty()).unwrap();
    stream.write_all(&[0xff; 32]).unwrap();
    stream.finish().unwrap();
    drop(stream);

    vol.wipe_pattern(WipeAlgorithm::Nnsa, 0).unwrap();
    assert_eq!(session.volume_data(POOL, "disk0.img").unwrap().len(), 32);

    vol.wipe(0).unwrap();
    assert!(session.volume_data(POOL, "disk0.img").unwrap().is_empty());

    assert_code(vol.wipe(1).unwrap_err(), code::INVALID_ARG);
    assert_code(
        vol.wipe_pattern(WipeAlgorithm::Trim, 0).unwrap_err(),
        code::NO_SUPPORT,
    );
}

/// Test native lookup and creation failures.
#[test]
fn test_native_errors() {
    let session = session();

    let err = StoragePool::lookup_by_name(&session, "nope").unwrap_err();
    assert_code(err, code::NO_STORAGE_POOL);

    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let err = pool.lookup_volume_by_name("missing.img").unwrap_err();
    assert_code(err.clone(), code::NO_STORAGE_VOL);
    assert!(err.to_string().contains("missing.img"));

    let _vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 64), Default::default())
        .unwrap();
    assert_code(
        pool.create_volume_xml(&empty_volume("disk0.img", 64), Default::default())
            .unwrap_err(),
        code::STORAGE_VOL_EXIST,
    );
    assert_code(
        pool.create_volume_xml("<volume/>", Default::default()).unwrap_err(),
        code::XML_ERROR,
    );

    let err = pool.lookup_volume_by_name("bad\0name").unwrap_err();
    assert_eq!(err, StorageError::InvalidString("bad\0name".to_string()));
    assert_eq!(err.code(), None);
}

/// Test that unknown raw flag values are rejected before any native call.
#[test]
fn test_raw_values_are_validated() {
    let flags = ResizeFlag::from_raw(0b101).unwrap();
    assert!(flags.contains(ResizeFlag::Allocate | ResizeFlag::Shrink));
    assert!(ResizeFlag::from_raw(0b1000).is_err());
    assert!(DeleteFlag::from_raw(4).is_err());

    assert_eq!(WipeAlgorithm::try_from(9).unwrap(), WipeAlgorithm::Trim);
    assert!(WipeAlgorithm::try_from(10).is_err());
    assert!(VolumeType::try_from(-1).is_err());
}

/// Test that a volume handle can be moved to another thread.
#[test]
fn test_volume_moves_between_threads() {
    let session = session();
    let pool = StoragePool::lookup_by_name(&session, POOL).unwrap();
    let vol = pool
        .create_volume_xml(&empty_volume("disk0.img", 4096), Default::default())
        .unwrap();

    let capacity = std::thread::scope(|s| {
        s.spawn(move || {
            let mut vol = vol;
            let capacity = vol.get_info().unwrap().capacity;
            vol.free().unwrap();
            capacity
        })
        .join()
        .unwrap()
    });

    assert_eq!(capacity, 4096);
    assert_eq!(session.open_handles(), 1);
}
