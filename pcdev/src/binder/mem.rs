//! In-memory implementation of Binder

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{BindError, Binder, DevNum, DevRange, NodeRef};
use crate::io::StorageUnit;

/// Dynamic majors are handed out from the top of this window downwards
const DYNAMIC_MAJORS: std::ops::RangeInclusive<u32> = 234..=511;

/// Directory nodes are published under
const DEV_DIR: &str = "/dev";

/// Counts of resources a binder still holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outstanding {
    pub ranges: usize,
    pub identities: usize,
    pub bindings: usize,
    pub nodes: usize,
}

impl Outstanding {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Default)]
struct State {
    ranges: BTreeMap<u32, DevRange>,
    identities: BTreeSet<DevNum>,
    bindings: HashMap<DevNum, Arc<StorageUnit>>,
    nodes: BTreeMap<String, DevNum>,
}

/// In-memory implementation of Binder
///
/// Simple map based bookkeeping, useful for tests and single-process hosts.
/// [`MemBinder::lookup`] resolves a published path to the bound unit, which is
/// all a host shim needs to route file operations.
#[derive(Default)]
pub struct MemBinder {
    state: Mutex<State>,
}

impl MemBinder {
    /// Create a new empty MemBinder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a published node path to its unit
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Arc<StorageUnit>> {
        let state = self.state.lock();
        let dev = state.nodes.get(path)?;
        state.bindings.get(dev).cloned()
    }

    /// Published node paths, sorted
    #[must_use]
    pub fn nodes(&self) -> Vec<String> {
        self.state.lock().nodes.keys().cloned().collect()
    }

    #[must_use]
    pub fn outstanding(&self) -> Outstanding {
        let state = self.state.lock();
        Outstanding {
            ranges: state.ranges.len(),
            identities: state.identities.len(),
            bindings: state.bindings.len(),
            nodes: state.nodes.len(),
        }
    }
}

impl Binder for MemBinder {
    fn claim_range(&self, name: &str, count: u32) -> Result<DevRange, BindError> {
        if count == 0 {
            return Err(BindError::Rejected(format!("empty range for {name:?}")));
        }
        let mut state = self.state.lock();
        if state.ranges.values().any(|r| r.name == name) {
            return Err(BindError::NameTaken(name.to_string()));
        }
        let major = DYNAMIC_MAJORS
            .rev()
            .find(|major| !state.ranges.contains_key(major))
            .ok_or_else(|| BindError::RangeExhausted(name.to_string()))?;
        let range = DevRange {
            name: name.to_string(),
            base: DevNum::new(major, 0),
            count,
        };
        state.ranges.insert(major, range.clone());
        debug!(name, major, count, "range claimed");
        Ok(range)
    }

    fn release_range(&self, range: &DevRange) -> Result<(), BindError> {
        let mut state = self.state.lock();
        match state.ranges.get(&range.base.major()) {
            Some(r) if r.name == range.name => {}
            _ => return Err(BindError::UnknownRange(range.name.clone())),
        }
        // Drop whatever per-unit steps left behind inside the range
        let before = state.identities.len();
        state.identities.retain(|dev| !range.contains(*dev));
        let leftover = before - state.identities.len();
        state.bindings.retain(|dev, _| !range.contains(*dev));
        state.nodes.retain(|_, dev| !range.contains(*dev));
        if leftover > 0 {
            warn!(name = %range.name, leftover, "range released with identities still claimed");
        }
        state.ranges.remove(&range.base.major());
        debug!(name = %range.name, "range released");
        Ok(())
    }

    fn claim_identity(&self, range: &DevRange, index: u32) -> Result<DevNum, BindError> {
        let mut state = self.state.lock();
        if !state.ranges.contains_key(&range.base.major()) {
            return Err(BindError::UnknownRange(range.name.clone()));
        }
        let dev = range.nth(index).ok_or_else(|| BindError::OutOfRange {
            name: range.name.clone(),
            index,
            count: range.count,
        })?;
        if !state.identities.insert(dev) {
            return Err(BindError::Busy(dev));
        }
        Ok(dev)
    }

    fn release_identity(&self, dev: DevNum) -> Result<(), BindError> {
        let mut state = self.state.lock();
        // Drop whatever later steps left behind for this number
        if state.bindings.remove(&dev).is_some() {
            warn!(%dev, "identity released while still bound");
        }
        state.nodes.retain(|_, node_dev| *node_dev != dev);
        if state.identities.remove(&dev) {
            Ok(())
        } else {
            Err(BindError::NotClaimed(dev))
        }
    }

    fn bind(&self, dev: DevNum, unit: Arc<StorageUnit>) -> Result<(), BindError> {
        let mut state = self.state.lock();
        if !state.identities.contains(&dev) {
            return Err(BindError::NotClaimed(dev));
        }
        if state.bindings.contains_key(&dev) {
            return Err(BindError::Busy(dev));
        }
        state.bindings.insert(dev, unit);
        Ok(())
    }

    fn unbind(&self, dev: DevNum) -> Result<(), BindError> {
        let mut state = self.state.lock();
        state.nodes.retain(|_, node_dev| *node_dev != dev);
        state
            .bindings
            .remove(&dev)
            .map(|_| ())
            .ok_or(BindError::NotBound(dev))
    }

    fn publish(&self, dev: DevNum, name: &str) -> Result<NodeRef, BindError> {
        let mut state = self.state.lock();
        if !state.bindings.contains_key(&dev) {
            return Err(BindError::NotBound(dev));
        }
        let path = format!("{DEV_DIR}/{name}");
        if state.nodes.contains_key(&path) {
            return Err(BindError::NameTaken(path));
        }
        state.nodes.insert(path.clone(), dev);
        Ok(NodeRef { dev, path })
    }

    fn unpublish(&self, node: &NodeRef) -> Result<(), BindError> {
        let mut state = self.state.lock();
        match state.nodes.get(&node.path) {
            Some(dev) if *dev == node.dev => {
                state.nodes.remove(&node.path);
                Ok(())
            }
            _ => Err(BindError::NotPublished(node.path.clone())),
        }
    }
}
