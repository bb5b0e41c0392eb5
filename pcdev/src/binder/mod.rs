//! Resource binding layer
//!
//! The registry never makes a unit visible by itself. It asks a [`Binder`]
//! for resources and gives them back in reverse order:
//!
//! ```text
//! claim_range ──► claim_identity ──► bind ──► publish      (per unit)
//! release_range ◄─ release_identity ◄─ unbind ◄─ unpublish
//! ```
//!
//! The range is claimed once for the whole table; the other three steps run
//! once per unit. [`MemBinder`] keeps everything in memory.

pub mod mem;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::io::StorageUnit;

pub use mem::{MemBinder, Outstanding};

/// Device number: a major shared by the whole table and a per-unit minor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevNum {
    major: u32,
    minor: u32,
}

impl DevNum {
    #[must_use]
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    #[must_use]
    pub fn major(&self) -> u32 {
        self.major
    }

    #[must_use]
    pub fn minor(&self) -> u32 {
        self.minor
    }
}

impl fmt::Display for DevNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Contiguous block of device numbers claimed for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevRange {
    pub name: String,
    pub base: DevNum,
    pub count: u32,
}

impl DevRange {
    /// Device number of the unit at `index`, if it lies inside the range
    #[must_use]
    pub fn nth(&self, index: u32) -> Option<DevNum> {
        if index < self.count {
            Some(DevNum::new(self.base.major, self.base.minor + index))
        } else {
            None
        }
    }

    #[must_use]
    pub fn contains(&self, dev: DevNum) -> bool {
        dev.major == self.base.major
            && dev.minor >= self.base.minor
            && dev.minor - self.base.minor < self.count
    }
}

/// A published, discoverable node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub dev: DevNum,
    pub path: String,
}

/// Errors that can occur in binder operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("no free major number for {0:?}")]
    RangeExhausted(String),

    #[error("{0:?} is already registered")]
    NameTaken(String),

    #[error("range {0:?} is not registered")]
    UnknownRange(String),

    #[error("index {index} is outside range {name:?} of {count} minors")]
    OutOfRange { name: String, index: u32, count: u32 },

    #[error("device {0} is busy")]
    Busy(DevNum),

    #[error("device {0} is not claimed")]
    NotClaimed(DevNum),

    #[error("device {0} is not bound")]
    NotBound(DevNum),

    #[error("node {0:?} is not published")]
    NotPublished(String),

    #[error("binder refused: {0}")]
    Rejected(String),
}

/// External collaborator that turns units into addressable devices
///
/// Claim operations hand out resources; the inverse operations give them
/// back. Inverses must tolerate being called on a resource whose later steps
/// never happened. They report errors, but callers on a teardown path log and
/// carry on.
pub trait Binder: Send + Sync {
    /// Claim `count` consecutive device numbers and the class named `name`.
    fn claim_range(&self, name: &str, count: u32) -> Result<DevRange, BindError>;

    /// Give back a range claimed by [`Binder::claim_range`].
    fn release_range(&self, range: &DevRange) -> Result<(), BindError>;

    /// Claim the device number at `index` of `range` for one unit.
    fn claim_identity(&self, range: &DevRange, index: u32) -> Result<DevNum, BindError>;

    /// Give back a device number claimed by [`Binder::claim_identity`].
    fn release_identity(&self, dev: DevNum) -> Result<(), BindError>;

    /// Attach the unit's operations to a claimed device number.
    fn bind(&self, dev: DevNum, unit: Arc<StorageUnit>) -> Result<(), BindError>;

    /// Detach the operations attached by [`Binder::bind`].
    fn unbind(&self, dev: DevNum) -> Result<(), BindError>;

    /// Make a bound device discoverable under `name`.
    fn publish(&self, dev: DevNum, name: &str) -> Result<NodeRef, BindError>;

    /// Remove a node created by [`Binder::publish`].
    fn unpublish(&self, node: &NodeRef) -> Result<(), BindError>;
}

impl<B: Binder + ?Sized> Binder for Arc<B> {
    fn claim_range(&self, name: &str, count: u32) -> Result<DevRange, BindError> {
        (**self).claim_range(name, count)
    }

    fn release_range(&self, range: &DevRange) -> Result<(), BindError> {
        (**self).release_range(range)
    }

    fn claim_identity(&self, range: &DevRange, index: u32) -> Result<DevNum, BindError> {
        (**self).claim_identity(range, index)
    }

    fn release_identity(&self, dev: DevNum) -> Result<(), BindError> {
        (**self).release_identity(dev)
    }

    fn bind(&self, dev: DevNum, unit: Arc<StorageUnit>) -> Result<(), BindError> {
        (**self).bind(dev, unit)
    }

    fn unbind(&self, dev: DevNum) -> Result<(), BindError> {
        (**self).unbind(dev)
    }

    fn publish(&self, dev: DevNum, name: &str) -> Result<NodeRef, BindError> {
        (**self).publish(dev, name)
    }

    fn unpublish(&self, node: &NodeRef) -> Result<(), BindError> {
        (**self).unpublish(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_nth_and_contains() {
        let range = DevRange {
            name: "pcd".into(),
            base: DevNum::new(511, 0),
            count: 4,
        };
        assert_eq!(range.nth(3), Some(DevNum::new(511, 3)));
        assert_eq!(range.nth(4), None);
        assert!(range.contains(DevNum::new(511, 0)));
        assert!(!range.contains(DevNum::new(511, 4)));
        assert!(!range.contains(DevNum::new(510, 1)));
    }

    #[test]
    fn test_devnum_display() {
        assert_eq!(DevNum::new(511, 2).to_string(), "511:2");
    }
}
