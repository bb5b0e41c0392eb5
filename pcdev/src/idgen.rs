use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle for an open session on a storage unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    id: u64,
}

impl Handle {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

/// Session handles, as handed out by the dispatch layer
pub type SessionId = Handle;

/// Thread-safe ID generator
///
/// Ids start at 1 and are never reused, so a closed session's handle stays
/// invalid for the lifetime of the generator.
#[derive(Debug)]
pub struct IdGen {
    next_id: AtomicU64,
}

impl IdGen {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the next unique handle
    pub fn next_handle(&self) -> Handle {
        Handle::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_increasing() {
        let idgen = IdGen::new();
        let first = idgen.next_handle();
        let second = idgen.next_handle();
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert!(first < second);
    }

    #[test]
    fn test_display() {
        assert_eq!(Handle::new(7).to_string(), "#7");
    }
}
