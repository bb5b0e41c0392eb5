//! I/O module for pcdev
//!
//! Contains the storage unit and its file-like view.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Registry dispatch (sessions)       │
//! │  - session id -> unit index, cursor │
//! │  - open mode checks                 │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ delegates to
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  StorageUnit (shared storage)       │
//! │  - Mutex<Box<[u8]>>, fixed capacity │
//! │  - read/write/seek with clamping    │
//! │  - permission tag                   │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ borrowed by
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  UnitFile (embedded_io view)        │
//! └─────────────────────────────────────┘
//! ```

pub mod file;
pub mod types;
pub mod unit;

pub use file::UnitFile;
pub use types::{Access, IoError, OpenMode, Permission, Whence};
pub use unit::StorageUnit;
