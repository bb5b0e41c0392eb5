//! Fixed-capacity storage unit with internal locking
//!
//! A unit owns exactly `capacity` bytes, zeroed at construction. Callers keep
//! their own cursor and pass it in; the unit never tracks positions.

use std::num::NonZeroUsize;

use parking_lot::Mutex;
use tracing::trace;

use super::types::{Access, IoError, Permission, Whence};
use crate::config::UnitDescriptor;

/// Fixed-capacity byte buffer with a permission tag and a label
///
/// # Thread Safety
///
/// The bytes sit behind a `parking_lot::Mutex`, so concurrent reads and writes
/// on one unit are serialized. Label, capacity and permission are immutable.
///
/// # Example
///
/// ```
/// use std::num::NonZeroUsize;
/// use pcdev::io::{Permission, StorageUnit, Whence};
///
/// let unit = StorageUnit::new("pcdev-1", NonZeroUsize::new(512).unwrap(), Permission::ReadWrite);
/// assert_eq!(unit.write(0, b"hello").unwrap(), (5, 5));
///
/// let pos = unit.seek(5, 0, Whence::FromStart).unwrap();
/// assert_eq!(unit.read(pos, 5).unwrap(), (b"hello".to_vec(), 5));
/// ```
#[derive(Debug)]
pub struct StorageUnit {
    label: String,
    capacity: usize,
    permission: Permission,
    bytes: Mutex<Box<[u8]>>,
}

impl StorageUnit {
    #[must_use]
    pub fn new(label: impl Into<String>, capacity: NonZeroUsize, permission: Permission) -> Self {
        let capacity = capacity.get();
        Self {
            label: label.into(),
            capacity,
            permission,
            bytes: Mutex::new(vec![0; capacity].into_boxed_slice()),
        }
    }

    #[must_use]
    pub fn from_descriptor(descriptor: &UnitDescriptor) -> Self {
        Self::new(
            descriptor.label.clone(),
            descriptor.capacity,
            descriptor.permission,
        )
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn permission(&self) -> Permission {
        self.permission
    }

    /// Copy bytes starting at `position` into `out`
    ///
    /// Returns the number of bytes copied; the caller's new position is
    /// `position + count`. At or past the end the count is zero.
    ///
    /// # Errors
    /// `PermissionDenied` if the unit is write-only.
    pub fn read_into(&self, position: usize, out: &mut [u8]) -> Result<usize, IoError> {
        if !self.permission.allows_read() {
            return Err(self.denied(Access::Read));
        }
        let count = out.len().min(self.remaining(position));
        if count > 0 {
            let bytes = self.bytes.lock();
            out[..count].copy_from_slice(&bytes[position..position + count]);
        }
        trace!(unit = %self.label, position, requested = out.len(), count, "read");
        Ok(count)
    }

    /// Read up to `len` bytes starting at `position`
    ///
    /// Returns the bytes and the new position. A short result is a success.
    ///
    /// # Errors
    /// `PermissionDenied` if the unit is write-only.
    pub fn read(&self, position: usize, len: usize) -> Result<(Vec<u8>, usize), IoError> {
        let mut out = vec![0; len.min(self.remaining(position))];
        let count = self.read_into(position, &mut out)?;
        out.truncate(count);
        Ok((out, position + count))
    }

    /// Write `input` starting at `position`, clamped to the capacity
    ///
    /// Returns the number of bytes written and the new position.
    ///
    /// # Errors
    /// - `PermissionDenied` if the unit is read-only
    /// - `OutOfSpace` if `position` is already at or past the capacity
    pub fn write(&self, position: usize, input: &[u8]) -> Result<(usize, usize), IoError> {
        if !self.permission.allows_write() {
            return Err(self.denied(Access::Write));
        }
        if position >= self.capacity {
            return Err(IoError::OutOfSpace {
                label: self.label.clone(),
                position,
            });
        }
        let count = input.len().min(self.remaining(position));
        {
            let mut bytes = self.bytes.lock();
            bytes[position..position + count].copy_from_slice(&input[..count]);
        }
        trace!(unit = %self.label, position, requested = input.len(), count, "write");
        Ok((count, position + count))
    }

    /// Compute the position a seek would move a cursor to
    ///
    /// The target must land in `[0, capacity]`; sitting exactly at the
    /// capacity is allowed.
    ///
    /// # Errors
    /// `InvalidSeek` if the target is out of range. The caller keeps its
    /// current position in that case.
    pub fn seek(&self, current: usize, offset: i64, whence: Whence) -> Result<usize, IoError> {
        let base = match whence {
            Whence::FromStart => 0,
            Whence::FromCurrent => current as i128,
            Whence::FromEnd => self.capacity as i128,
        };
        let target = base + i128::from(offset);
        match usize::try_from(target) {
            Ok(position) if position <= self.capacity => Ok(position),
            _ => Err(IoError::InvalidSeek {
                label: self.label.clone(),
                target,
                capacity: self.capacity,
            }),
        }
    }

    fn remaining(&self, position: usize) -> usize {
        self.capacity.saturating_sub(position)
    }

    fn denied(&self, access: Access) -> IoError {
        IoError::PermissionDenied {
            label: self.label.clone(),
            access,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(capacity: usize, permission: Permission) -> StorageUnit {
        StorageUnit::new("test", NonZeroUsize::new(capacity).unwrap(), permission)
    }

    #[test]
    fn test_new_unit_is_zeroed() {
        let unit = unit(16, Permission::ReadOnly);
        let (bytes, pos) = unit.read(0, 16).unwrap();
        assert_eq!(bytes, vec![0; 16]);
        assert_eq!(pos, 16);
    }

    #[test]
    fn test_read_at_end_returns_nothing() {
        let unit = unit(8, Permission::ReadWrite);
        assert_eq!(unit.read(8, 4).unwrap(), (Vec::new(), 8));
        assert_eq!(unit.read(100, 4).unwrap(), (Vec::new(), 100));
    }

    #[test]
    fn test_short_write_then_out_of_space() {
        let unit = unit(512, Permission::ReadWrite);
        assert_eq!(unit.write(510, b"abcd").unwrap(), (2, 512));
        assert!(matches!(
            unit.write(512, b"x"),
            Err(IoError::OutOfSpace { position: 512, .. })
        ));
    }

    #[test]
    fn test_empty_write_inside_capacity_is_a_no_op() {
        let unit = unit(4, Permission::WriteOnly);
        assert_eq!(unit.write(2, b"").unwrap(), (0, 2));
    }

    #[test]
    fn test_permission_checks() {
        let ro = unit(4, Permission::ReadOnly);
        let wo = unit(4, Permission::WriteOnly);
        assert!(matches!(
            ro.write(0, b"x"),
            Err(IoError::PermissionDenied { access: Access::Write, .. })
        ));
        assert!(matches!(
            wo.read(0, 1),
            Err(IoError::PermissionDenied { access: Access::Read, .. })
        ));
    }

    #[test]
    fn test_seek_bounds() {
        let unit = unit(512, Permission::ReadWrite);
        assert_eq!(unit.seek(0, 512, Whence::FromStart).unwrap(), 512);
        assert_eq!(unit.seek(100, -100, Whence::FromCurrent).unwrap(), 0);
        assert_eq!(unit.seek(0, -510, Whence::FromEnd).unwrap(), 2);
        assert!(unit.seek(0, 1, Whence::FromEnd).is_err());
        assert!(unit.seek(0, -1, Whence::FromStart).is_err());
        assert!(unit.seek(5, i64::MIN, Whence::FromCurrent).is_err());
        assert!(unit.seek(usize::MAX, i64::MAX, Whence::FromCurrent).is_err());
    }
}
