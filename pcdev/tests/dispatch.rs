#[cfg(test)]
#[macro_use]
extern crate hamcrest;
use hamcrest::prelude::*;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use pcdev::{
    Access, DeviceTable, IoError, MemBinder, OpenMode, Permission, Registry, UnitDescriptor,
    Whence,
};
use pcdev_mocked::TrackedBinder;

fn single_unit_table(capacity: usize, permission: Permission) -> DeviceTable {
    DeviceTable::new(
        "pcd",
        vec![UnitDescriptor::new(
            "pcd",
            NonZeroUsize::new(capacity).unwrap(),
            permission,
        )],
    )
}

#[test]
fn capacity_512_scenario_through_sessions() {
    let registry =
        Registry::bring_up(&single_unit_table(512, Permission::ReadWrite), MemBinder::new()).unwrap();
    let session = registry.open("pcd", OpenMode::ReadWrite).unwrap();

    assert_that!(registry.write(session, b"hello").unwrap(), is(equal_to(5)));
    assert_that!(registry.position(session).unwrap(), is(equal_to(5)));
    assert_that!(registry.seek(session, 5, Whence::FromStart).unwrap(), is(equal_to(5)));
    assert_that!(registry.seek(session, 0, Whence::FromStart).unwrap(), is(equal_to(0)));
    assert_that!(registry.read(session, 5).unwrap(), is(equal_to(b"hello".to_vec())));

    registry.seek(session, 510, Whence::FromStart).unwrap();
    assert_that!(registry.write(session, b"abcd").unwrap(), is(equal_to(2)));
    assert_that!(registry.position(session).unwrap(), is(equal_to(512)));

    let err = registry.write(session, b"x").unwrap_err();
    assert!(matches!(err, IoError::OutOfSpace { position: 512, .. }));
    assert_that!(err.errno(), is(equal_to(-12)));
}

#[test]
fn failed_seek_leaves_session_position() {
    let registry =
        Registry::bring_up(&single_unit_table(512, Permission::ReadOnly), MemBinder::new()).unwrap();
    let session = registry.open("pcd", OpenMode::Read).unwrap();
    registry.seek(session, 100, Whence::FromStart).unwrap();

    for (offset, whence) in [(1, Whence::FromEnd), (-101, Whence::FromCurrent), (513, Whence::FromStart)] {
        let err = registry.seek(session, offset, whence).unwrap_err();
        assert!(matches!(err, IoError::InvalidSeek { .. }));
        assert_that!(registry.position(session).unwrap(), is(equal_to(100)));
    }
}

#[test]
fn read_at_end_is_empty_success() {
    let registry =
        Registry::bring_up(&single_unit_table(8, Permission::ReadWrite), MemBinder::new()).unwrap();
    let session = registry.open("pcd", OpenMode::Read).unwrap();

    assert_that!(registry.read(session, 100).unwrap().len(), is(equal_to(8)));
    assert!(registry.read(session, 100).unwrap().is_empty());

    let mut buf = [0u8; 4];
    assert_that!(registry.read_into(session, &mut buf).unwrap(), is(equal_to(0)));
}

#[test]
fn dispatch_checks_permission_before_touching_the_unit() {
    let registry = Registry::bring_up(&DeviceTable::default(), MemBinder::new()).unwrap();

    let err = registry.open("pcdev-1", OpenMode::ReadWrite).unwrap_err();
    assert!(matches!(err, IoError::PermissionDenied { access: Access::Write, .. }));
    assert_that!(err.errno(), is(equal_to(-1)));

    let reader = registry.open("pcdev-3", OpenMode::Read).unwrap();
    let err = registry.write(reader, b"nope").unwrap_err();
    assert!(matches!(err, IoError::PermissionDenied { access: Access::Write, .. }));
    assert_that!(registry.position(reader).unwrap(), is(equal_to(0)));
    assert!(registry.read(reader, 4).unwrap().iter().all(|&b| b == 0));
}

#[test]
fn published_node_resolves_to_the_same_storage() {
    let binder = TrackedBinder::shared();
    let registry = Registry::bring_up(&DeviceTable::default(), Arc::clone(&binder)).unwrap();

    let session = registry.open("pcdev-4", OpenMode::Write).unwrap();
    registry.write(session, b"shared").unwrap();

    let unit = binder.lookup("/dev/pcdev-4").unwrap();
    assert_that!(unit.read(0, 6).unwrap().0, is(equal_to(b"shared".to_vec())));
}

#[test]
fn concurrent_sessions_on_separate_units() {
    let registry = Registry::bring_up(&DeviceTable::default(), MemBinder::new()).unwrap();

    thread::scope(|scope| {
        for label in ["pcdev-3", "pcdev-4"] {
            let registry = &registry;
            scope.spawn(move || {
                let session = registry.open(label, OpenMode::Write).unwrap();
                for _ in 0..64 {
                    registry.write(session, label.as_bytes()).unwrap();
                }
                registry.close(session).unwrap();
            });
        }
    });

    for label in ["pcdev-3", "pcdev-4"] {
        let session = registry.open(label, OpenMode::Read).unwrap();
        let head = registry.read(session, label.len()).unwrap();
        assert_that!(head, is(equal_to(label.as_bytes().to_vec())));
    }
    assert_that!(registry.open_sessions(), is(equal_to(2)));
}
