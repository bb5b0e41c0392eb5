//! Pseudo character devices backed by in-memory storage units
//!
//! A [`DeviceTable`] declares units (label, capacity, permission).
//! [`Registry::bring_up`] registers them with a [`Binder`] and either
//! succeeds for all of them or releases everything it claimed. Once up, the
//! registry serves `open`/`read`/`write`/`seek`/`close` on its units.

pub mod binder;
pub mod config;
mod dispatch;
pub mod idgen;
pub mod io;
pub mod lifecycle;

// Re-export binder types for convenience
pub use binder::{BindError, Binder, DevNum, DevRange, MemBinder, NodeRef, Outstanding};

// Re-export configuration types for convenience
pub use config::{ConfigError, DeviceTable, UnitDescriptor, DEFAULT_CAPACITY};

// Re-export idgen types for convenience
pub use idgen::{Handle, IdGen, SessionId};

// Re-export I/O types for convenience
pub use io::{Access, IoError, OpenMode, Permission, StorageUnit, UnitFile, Whence};

// Re-export lifecycle types for convenience
pub use lifecycle::{Registry, RegistryError, Step, Teardown, UnitState};
