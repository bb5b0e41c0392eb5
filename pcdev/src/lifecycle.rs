//! Device registry: bring-up, rollback and teardown
//!
//! The registry owns every unit of a device table in an indexed arena and
//! registers them with a [`Binder`] in table order. Each unit goes through
//! the same three steps:
//!
//! ```text
//! Unregistered ──claim──► HandleClaimed ──bind──► Bound ──publish──► Published
//! ```
//!
//! Every completed step pushes the resource it acquired onto the unit's
//! stack. Rollback and teardown pop those stacks, unit by unit, in reverse
//! registration order, so a resource is never released before something that
//! depends on it.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::binder::{BindError, Binder, DevNum, DevRange, NodeRef};
use crate::config::{ConfigError, DeviceTable};
use crate::dispatch::SessionTable;
use crate::io::StorageUnit;

/// Registration sub-step of a single unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Claim,
    Bind,
    Publish,
}

impl Step {
    /// Steps in the order they are applied
    pub const ORDER: [Step; 3] = [Step::Claim, Step::Bind, Step::Publish];

    fn apply<B: Binder>(
        self,
        binder: &B,
        range: &DevRange,
        index: u32,
        slot: &UnitSlot,
    ) -> Result<Acquired, BindError> {
        match self {
            Step::Claim => binder.claim_identity(range, index).map(Acquired::Identity),
            Step::Bind => {
                let dev = slot.require_dev()?;
                binder
                    .bind(dev, Arc::clone(&slot.unit))
                    .map(|()| Acquired::Binding(dev))
            }
            Step::Publish => {
                let dev = slot.require_dev()?;
                binder.publish(dev, slot.unit.label()).map(Acquired::Node)
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Claim => "claim",
            Step::Bind => "bind",
            Step::Publish => "publish",
        })
    }
}

/// How far a unit got through registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnitState {
    Unregistered,
    HandleClaimed,
    Bound,
    Published,
}

/// A resource acquired by one step, given back by its inverse
#[derive(Debug, Clone, PartialEq, Eq)]
enum Acquired {
    Identity(DevNum),
    Binding(DevNum),
    Node(NodeRef),
}

impl Acquired {
    fn release<B: Binder>(&self, binder: &B) -> Result<(), BindError> {
        match self {
            Acquired::Identity(dev) => binder.release_identity(*dev),
            Acquired::Binding(dev) => binder.unbind(*dev),
            Acquired::Node(node) => binder.unpublish(node),
        }
    }
}

/// Arena slot: a unit and the stack of resources it holds
#[derive(Debug)]
pub(crate) struct UnitSlot {
    pub(crate) unit: Arc<StorageUnit>,
    acquired: Vec<Acquired>,
}

impl UnitSlot {
    fn new(unit: StorageUnit) -> Self {
        Self {
            unit: Arc::new(unit),
            acquired: Vec::with_capacity(Step::ORDER.len()),
        }
    }

    pub(crate) fn state(&self) -> UnitState {
        match self.acquired.len() {
            0 => UnitState::Unregistered,
            1 => UnitState::HandleClaimed,
            2 => UnitState::Bound,
            _ => UnitState::Published,
        }
    }

    fn dev(&self) -> Option<DevNum> {
        match self.acquired.first() {
            Some(Acquired::Identity(dev)) => Some(*dev),
            _ => None,
        }
    }

    fn require_dev(&self) -> Result<DevNum, BindError> {
        self.dev().ok_or_else(|| {
            BindError::Rejected(format!("{} has no device number", self.unit.label()))
        })
    }

    fn node(&self) -> Option<&NodeRef> {
        self.acquired.iter().find_map(|acquired| match acquired {
            Acquired::Node(node) => Some(node),
            _ => None,
        })
    }

    /// Drive the unit through every step; stops at the first failure
    fn register<B: Binder>(
        &mut self,
        binder: &B,
        range: &DevRange,
        index: u32,
    ) -> Result<(), (Step, BindError)> {
        for step in Step::ORDER {
            let acquired = step
                .apply(binder, range, index, self)
                .map_err(|err| (step, err))?;
            debug!(unit = %self.unit.label(), %step, "step done");
            self.acquired.push(acquired);
        }
        Ok(())
    }

    /// Release everything the unit holds, newest first
    ///
    /// Release errors are logged and counted; unwinding always runs to the
    /// bottom of the stack.
    fn unwind<B: Binder>(&mut self, binder: &B) -> usize {
        let mut failures = 0;
        while let Some(acquired) = self.acquired.pop() {
            if let Err(err) = acquired.release(binder) {
                warn!(unit = %self.unit.label(), ?acquired, error = %err, "release failed");
                failures += 1;
            }
        }
        failures
    }
}

/// Errors that abort bring-up
///
/// When one of these is returned, every resource claimed during the attempt
/// has already been given back.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid device table: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to claim device range for {name:?}: {source}")]
    Range {
        name: String,
        #[source]
        source: BindError,
    },

    #[error("registration of unit {index} ({label:?}) failed at {step}: {source}")]
    Registration {
        index: usize,
        label: String,
        step: Step,
        #[source]
        source: BindError,
    },
}

/// Summary of a completed shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Teardown {
    pub units: usize,
    pub sessions_closed: usize,
    pub release_failures: usize,
}

/// Owner of all units of one device table
///
/// Built only by [`Registry::bring_up`], which either registers every unit
/// or none. [`Registry::shutdown`] (or dropping the registry) unregisters all
/// of them.
pub struct Registry<B: Binder> {
    binder: B,
    name: String,
    range: Option<DevRange>,
    pub(crate) slots: Vec<UnitSlot>,
    pub(crate) sessions: SessionTable,
}

impl<B: Binder> Registry<B> {
    /// Register every unit of `table` with `binder`
    ///
    /// # Errors
    /// - `Config` if the table is invalid (nothing was claimed)
    /// - `Range` if the shared device range could not be claimed
    /// - `Registration` if some unit failed a step; units registered before
    ///   it, the failing unit's own partial steps and the range have all been
    ///   released by the time this returns
    pub fn bring_up(table: &DeviceTable, binder: B) -> Result<Self, RegistryError> {
        table.validate()?;

        let range = binder
            .claim_range(&table.name, table.unit_count())
            .map_err(|source| RegistryError::Range {
                name: table.name.clone(),
                source,
            })?;
        info!(name = %table.name, base = %range.base, count = range.count, "device range allocated");

        let mut slots: Vec<UnitSlot> = Vec::with_capacity(table.units.len());
        for (index, descriptor) in table.units.iter().enumerate() {
            let mut slot = UnitSlot::new(StorageUnit::from_descriptor(descriptor));
            let minor_index = u32::try_from(index).unwrap_or(u32::MAX);

            if let Err((step, source)) = slot.register(&binder, &range, minor_index) {
                warn!(unit = %descriptor.label, index, %step, error = %source, "registration failed, rolling back");
                slot.unwind(&binder);
                for done in slots.iter_mut().rev() {
                    done.unwind(&binder);
                }
                release_range(&binder, &range);
                return Err(RegistryError::Registration {
                    index,
                    label: descriptor.label.clone(),
                    step,
                    source,
                });
            }

            if let (Some(dev), Some(node)) = (slot.dev(), slot.node()) {
                info!(unit = %descriptor.label, %dev, path = %node.path, "unit published");
            }
            slots.push(slot);
        }

        Ok(Self {
            binder,
            name: table.name.clone(),
            range: Some(range),
            slots,
            sessions: SessionTable::new(),
        })
    }

    /// Unregister every unit in reverse registration order
    ///
    /// Closes all sessions first. Returns `None` if the registry was already
    /// shut down, in which case nothing is released again.
    pub fn shutdown(&mut self) -> Option<Teardown> {
        let Some(range) = self.range.take() else {
            debug!(name = %self.name, "shutdown requested twice, ignoring");
            return None;
        };

        let sessions_closed = self.sessions.close_all();
        let mut release_failures = 0;
        for slot in self.slots.iter_mut().rev() {
            release_failures += slot.unwind(&self.binder);
        }
        if !release_range(&self.binder, &range) {
            release_failures += 1;
        }

        let teardown = Teardown {
            units: self.slots.len(),
            sessions_closed,
            release_failures,
        };
        info!(name = %self.name, ?teardown, "registry shut down");
        Some(teardown)
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.range.is_some()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn binder(&self) -> &B {
        &self.binder
    }

    /// The shared device range, while the registry is live
    #[must_use]
    pub fn range(&self) -> Option<&DevRange> {
        self.range.as_ref()
    }

    /// Units in registration order
    pub fn units(&self) -> impl Iterator<Item = &StorageUnit> + '_ {
        self.slots.iter().map(|slot| slot.unit.as_ref())
    }

    #[must_use]
    pub fn unit(&self, index: usize) -> Option<&StorageUnit> {
        self.slots.get(index).map(|slot| slot.unit.as_ref())
    }

    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.unit.label() == label)
    }

    #[must_use]
    pub fn unit_state(&self, index: usize) -> Option<UnitState> {
        self.slots.get(index).map(UnitSlot::state)
    }

    #[must_use]
    pub fn device_number(&self, label: &str) -> Option<DevNum> {
        self.slots.get(self.index_of(label)?)?.dev()
    }

    #[must_use]
    pub fn node(&self, label: &str) -> Option<&NodeRef> {
        self.slots.get(self.index_of(label)?)?.node()
    }
}

impl<B: Binder> Drop for Registry<B> {
    fn drop(&mut self) {
        if self.is_live() {
            self.shutdown();
        }
    }
}

/// Release the shared range; returns false if the binder refused
fn release_range<B: Binder>(binder: &B, range: &DevRange) -> bool {
    match binder.release_range(range) {
        Ok(()) => true,
        Err(err) => {
            warn!(name = %range.name, error = %err, "range release failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::MemBinder;
    use crate::config::{UnitDescriptor, DEFAULT_CAPACITY};
    use crate::io::Permission;

    #[test]
    fn test_bring_up_publishes_every_unit() {
        let binder = Arc::new(MemBinder::new());
        let registry = Registry::bring_up(&DeviceTable::default(), Arc::clone(&binder)).unwrap();

        for index in 0..4 {
            assert_eq!(registry.unit_state(index), Some(UnitState::Published));
        }
        assert_eq!(registry.device_number("pcdev-3"), Some(DevNum::new(511, 2)));
        assert_eq!(registry.node("pcdev-1").unwrap().path, "/dev/pcdev-1");
        assert_eq!(
            binder.nodes(),
            vec!["/dev/pcdev-1", "/dev/pcdev-2", "/dev/pcdev-3", "/dev/pcdev-4"]
        );
    }

    #[test]
    fn test_shutdown_releases_everything_once() {
        let binder = Arc::new(MemBinder::new());
        let mut registry =
            Registry::bring_up(&DeviceTable::default(), Arc::clone(&binder)).unwrap();

        assert_eq!(registry.name(), "pcd");
        let range = registry.range().unwrap();
        assert_eq!(range.count, 4);
        assert_eq!(range.base, DevNum::new(511, 0));
        assert_eq!(registry.binder().outstanding().ranges, 1);

        let teardown = registry.shutdown().unwrap();
        assert_eq!(teardown.units, 4);
        assert_eq!(teardown.release_failures, 0);
        assert!(binder.outstanding().is_empty());
        assert!(!registry.is_live());
        assert_eq!(registry.range(), None);
        assert_eq!(registry.unit_state(0), Some(UnitState::Unregistered));

        assert_eq!(registry.shutdown(), None);
    }

    #[test]
    fn test_drop_shuts_down() {
        let binder = Arc::new(MemBinder::new());
        {
            let _registry =
                Registry::bring_up(&DeviceTable::default(), Arc::clone(&binder)).unwrap();
            assert_eq!(binder.outstanding().nodes, 4);
        }
        assert!(binder.outstanding().is_empty());
    }

    #[test]
    fn test_publish_collision_rolls_back() {
        let binder = Arc::new(MemBinder::new());
        let range = binder.claim_range("other", 1).unwrap();
        let dev = binder.claim_identity(&range, 0).unwrap();
        let squatter = Arc::new(StorageUnit::new("b", DEFAULT_CAPACITY, Permission::ReadOnly));
        binder.bind(dev, squatter).unwrap();
        binder.publish(dev, "b").unwrap();
        let before = binder.outstanding();

        let table = DeviceTable::new(
            "pcd",
            vec![
                UnitDescriptor::new("a", DEFAULT_CAPACITY, Permission::ReadWrite),
                UnitDescriptor::new("b", DEFAULT_CAPACITY, Permission::ReadWrite),
            ],
        );
        let err = Registry::bring_up(&table, Arc::clone(&binder)).err().unwrap();
        assert!(matches!(
            err,
            RegistryError::Registration { index: 1, step: Step::Publish, .. }
        ));
        assert_eq!(binder.outstanding(), before);
    }
}
