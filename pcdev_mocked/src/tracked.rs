//! Binder that records every call and fails on request.
//!
//! - `calls` returns the calls made so far, in order.
//! - `fail_at` makes the n-th call (0-based) of one operation fail without
//!   touching any state.
//! - `fail_releases` makes every inverse operation do its work and then
//!   report an error anyway.
//! - `outstanding` reports what is still held, as `MemBinder` does.
//!
//! Real bookkeeping is delegated to a `MemBinder`, so steps still need their
//! predecessors and leaks stay visible.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pcdev::{BindError, Binder, DevNum, DevRange, MemBinder, NodeRef, Outstanding, StorageUnit};

/// Binder operation, for choosing where to inject a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ClaimRange,
    ReleaseRange,
    ClaimIdentity,
    ReleaseIdentity,
    Bind,
    Unbind,
    Publish,
    Unpublish,
}

/// One recorded binder call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ClaimRange(String),
    ReleaseRange(String),
    ClaimIdentity(u32),
    ReleaseIdentity(DevNum),
    Bind(DevNum),
    Unbind(DevNum),
    Publish(String),
    Unpublish(String),
}

impl Call {
    #[must_use]
    pub fn op(&self) -> Op {
        match self {
            Call::ClaimRange(_) => Op::ClaimRange,
            Call::ReleaseRange(_) => Op::ReleaseRange,
            Call::ClaimIdentity(_) => Op::ClaimIdentity,
            Call::ReleaseIdentity(_) => Op::ReleaseIdentity,
            Call::Bind(_) => Op::Bind,
            Call::Unbind(_) => Op::Unbind,
            Call::Publish(_) => Op::Publish,
            Call::Unpublish(_) => Op::Unpublish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FailPoint {
    op: Op,
    nth: usize,
}

#[derive(Default)]
pub struct TrackedBinder {
    inner: MemBinder,
    calls: Mutex<Vec<Call>>,
    counts: Mutex<HashMap<Op, usize>>,
    fail_point: Mutex<Option<FailPoint>>,
    failing_releases: AtomicBool,
}

impl TrackedBinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared instance, so a test can keep a handle after giving one away
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Fail the `nth` call (0-based) of `op`
    pub fn fail_at(&self, op: Op, nth: usize) {
        *self.fail_point.lock() = Some(FailPoint { op, nth });
    }

    pub fn fail_releases(&self, fail: bool) {
        self.failing_releases.store(fail, Ordering::Relaxed);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Recorded calls of one operation
    #[must_use]
    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.op() == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    #[must_use]
    pub fn outstanding(&self) -> Outstanding {
        self.inner.outstanding()
    }

    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Arc<StorageUnit>> {
        self.inner.lookup(path)
    }

    fn record(&self, call: Call) -> Result<(), BindError> {
        let op = call.op();
        self.calls.lock().push(call);

        let nth = {
            let mut counts = self.counts.lock();
            let count = counts.entry(op).or_insert(0);
            let nth = *count;
            *count += 1;
            nth
        };
        if *self.fail_point.lock() == Some(FailPoint { op, nth }) {
            return Err(BindError::Rejected(format!("injected failure at {op:?} #{nth}")));
        }
        Ok(())
    }

    fn released(&self, op: Op, result: Result<(), BindError>) -> Result<(), BindError> {
        if result.is_ok() && self.failing_releases.load(Ordering::Relaxed) {
            return Err(BindError::Rejected(format!("{op:?} reported failure")));
        }
        result
    }
}

impl Binder for TrackedBinder {
    fn claim_range(&self, name: &str, count: u32) -> Result<DevRange, BindError> {
        self.record(Call::ClaimRange(name.to_string()))?;
        self.inner.claim_range(name, count)
    }

    fn release_range(&self, range: &DevRange) -> Result<(), BindError> {
        self.record(Call::ReleaseRange(range.name.clone()))?;
        self.released(Op::ReleaseRange, self.inner.release_range(range))
    }

    fn claim_identity(&self, range: &DevRange, index: u32) -> Result<DevNum, BindError> {
        self.record(Call::ClaimIdentity(index))?;
        self.inner.claim_identity(range, index)
    }

    fn release_identity(&self, dev: DevNum) -> Result<(), BindError> {
        self.record(Call::ReleaseIdentity(dev))?;
        self.released(Op::ReleaseIdentity, self.inner.release_identity(dev))
    }

    fn bind(&self, dev: DevNum, unit: Arc<StorageUnit>) -> Result<(), BindError> {
        self.record(Call::Bind(dev))?;
        self.inner.bind(dev, unit)
    }

    fn unbind(&self, dev: DevNum) -> Result<(), BindError> {
        self.record(Call::Unbind(dev))?;
        self.released(Op::Unbind, self.inner.unbind(dev))
    }

    fn publish(&self, dev: DevNum, name: &str) -> Result<NodeRef, BindError> {
        self.record(Call::Publish(name.to_string()))?;
        self.inner.publish(dev, name)
    }

    fn unpublish(&self, node: &NodeRef) -> Result<(), BindError> {
        self.record(Call::Unpublish(node.path.clone()))?;
        self.released(Op::Unpublish, self.inner.unpublish(node))
    }
}
