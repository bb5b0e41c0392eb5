//! Static device table
//!
//! The table is fixed at startup: one descriptor per unit, in registration
//! order. It can be built in code or read from JSON:
//!
//! ```json
//! {
//!   "name": "pcd",
//!   "units": [
//!     { "label": "pcdev-1", "capacity": 1024, "permission": "ro" },
//!     { "label": "pcdev-3", "capacity": 1024, "permission": "read_write" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::Permission;

/// Buffer size of the single-device driver
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(512) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Largest number of units one table may declare (the width of a minor range)
pub const MAX_UNITS: usize = 256;

const DEFAULT_NAME: &str = "pcd";

/// One unit of the device table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub label: String,
    pub capacity: NonZeroUsize,
    pub permission: Permission,
}

impl UnitDescriptor {
    #[must_use]
    pub fn new(label: impl Into<String>, capacity: NonZeroUsize, permission: Permission) -> Self {
        Self {
            label: label.into(),
            capacity,
            permission,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read device table: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse device table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("device table declares no units")]
    Empty,

    #[error("device table declares {0} units, at most {max} are supported", max = MAX_UNITS)]
    TooManyUnits(usize),

    #[error("unit label must not be empty")]
    EmptyLabel,

    #[error("duplicate unit label {0:?}")]
    DuplicateLabel(String),
}

/// Declarative table of units brought up together under one name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTable {
    #[serde(default = "default_name")]
    pub name: String,
    pub units: Vec<UnitDescriptor>,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

impl DeviceTable {
    #[must_use]
    pub fn new(name: impl Into<String>, units: Vec<UnitDescriptor>) -> Self {
        Self {
            name: name.into(),
            units,
        }
    }

    /// Parse and validate a table from JSON text
    ///
    /// # Errors
    /// Parse errors, or any error of [`DeviceTable::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Read, parse and validate a table from a JSON file
    ///
    /// # Errors
    /// I/O and parse errors, or any error of [`DeviceTable::validate`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the table can be registered as a whole
    ///
    /// # Errors
    /// - `Empty` if there are no units
    /// - `TooManyUnits` if the units do not fit one minor range
    /// - `EmptyLabel` or `DuplicateLabel` for bad labels
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.units.is_empty() {
            return Err(ConfigError::Empty);
        }
        if self.units.len() > MAX_UNITS {
            return Err(ConfigError::TooManyUnits(self.units.len()));
        }
        let mut seen = HashSet::new();
        for unit in &self.units {
            if unit.label.is_empty() {
                return Err(ConfigError::EmptyLabel);
            }
            if !seen.insert(unit.label.as_str()) {
                return Err(ConfigError::DuplicateLabel(unit.label.clone()));
            }
        }
        Ok(())
    }

    /// Number of units, as a minor count
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        u32::try_from(self.units.len()).unwrap_or(u32::MAX)
    }
}

impl Default for DeviceTable {
    /// Four units with every permission, two sizes
    fn default() -> Self {
        let kib = NonZeroUsize::new(1024).unwrap_or(DEFAULT_CAPACITY);
        Self::new(
            DEFAULT_NAME,
            vec![
                UnitDescriptor::new("pcdev-1", kib, Permission::ReadOnly),
                UnitDescriptor::new("pcdev-2", DEFAULT_CAPACITY, Permission::WriteOnly),
                UnitDescriptor::new("pcdev-3", kib, Permission::ReadWrite),
                UnitDescriptor::new("pcdev-4", DEFAULT_CAPACITY, Permission::ReadWrite),
            ],
        )
    }
}
