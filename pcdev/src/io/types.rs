//! Storage unit types: permissions, open modes, seek origins and I/O errors

use std::fmt;
use std::os::raw::c_int;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::idgen::SessionId;

/// Access permission of a storage unit, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[serde(alias = "ro")]
    ReadOnly,
    #[serde(alias = "wo")]
    WriteOnly,
    #[serde(alias = "rw")]
    ReadWrite,
}

impl Permission {
    #[must_use]
    pub fn allows_read(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    #[must_use]
    pub fn allows_write(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }

    /// Whether a session may be opened on a unit with this permission
    #[must_use]
    pub fn admits(self, mode: OpenMode) -> bool {
        (!mode.reads() || self.allows_read()) && (!mode.writes() || self.allows_write())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "ro",
            Self::WriteOnly => "wo",
            Self::ReadWrite => "rw",
        })
    }
}

/// Mode for opening a session on a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenMode {
    #[must_use]
    pub fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[must_use]
    pub fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Origin of a seek offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    FromStart,
    FromCurrent,
    FromEnd,
}

/// Kind of access that was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

pub const EPERM: c_int = 1;
pub const ENOENT: c_int = 2;
pub const EBADF: c_int = 9;
pub const ENOMEM: c_int = 12;
pub const EINVAL: c_int = 22;

/// Errors of unit operations and of the dispatch surface
///
/// Short reads and writes are not errors: they succeed with fewer bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    #[error("{label}: {access} not permitted")]
    PermissionDenied { label: String, access: Access },

    #[error("{label}: seek target {target} outside [0, {capacity}]")]
    InvalidSeek {
        label: String,
        target: i128,
        capacity: usize,
    },

    #[error("{label}: no space left at position {position}")]
    OutOfSpace { label: String, position: usize },

    #[error("no unit labelled {0:?}")]
    NotFound(String),

    #[error("session {0} is not open")]
    BadSession(SessionId),
}

impl IoError {
    /// Negative errno a host file-operations shim would return for this error
    #[must_use]
    pub fn errno(&self) -> c_int {
        let code = match self {
            Self::PermissionDenied { .. } => EPERM,
            Self::InvalidSeek { .. } => EINVAL,
            Self::OutOfSpace { .. } => ENOMEM,
            Self::NotFound(_) => ENOENT,
            Self::BadSession(_) => EBADF,
        };
        -code
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::PermissionDenied { .. } => embedded_io::ErrorKind::PermissionDenied,
            Self::InvalidSeek { .. } | Self::BadSession(_) => embedded_io::ErrorKind::InvalidInput,
            // ENOSPC and ENOMEM share a kind
            Self::OutOfSpace { .. } => embedded_io::ErrorKind::OutOfMemory,
            Self::NotFound(_) => embedded_io::ErrorKind::NotFound,
        }
    }
}
