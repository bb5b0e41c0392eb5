//! Cursor-bearing file view over a borrowed storage unit
//!
//! `UnitFile` is an open session without a registry: it borrows the unit,
//! keeps a position and speaks `embedded_io`.

use embedded_io::{ErrorType, Read, Seek, SeekFrom, Write};

use super::types::{Access, IoError, OpenMode, Whence};
use super::unit::StorageUnit;

/// Open file on a storage unit
#[derive(Debug)]
pub struct UnitFile<'a> {
    unit: &'a StorageUnit,
    mode: OpenMode,
    position: usize,
}

impl<'a> UnitFile<'a> {
    /// Open `unit` with `mode`
    ///
    /// # Errors
    /// `PermissionDenied` if the unit's permission does not admit `mode`.
    pub fn open(unit: &'a StorageUnit, mode: OpenMode) -> Result<Self, IoError> {
        check_mode(unit, mode)?;
        Ok(Self {
            unit,
            mode,
            position: 0,
        })
    }

    #[must_use]
    pub fn unit(&self) -> &StorageUnit {
        self.unit
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor; on error the position is left as it was
    ///
    /// # Errors
    /// `InvalidSeek` if the target falls outside `[0, capacity]`.
    pub fn seek_to(&mut self, offset: i64, whence: Whence) -> Result<usize, IoError> {
        self.position = self.unit.seek(self.position, offset, whence)?;
        Ok(self.position)
    }
}

/// Refuse a mode the unit's permission does not admit
pub(crate) fn check_mode(unit: &StorageUnit, mode: OpenMode) -> Result<(), IoError> {
    if unit.permission().admits(mode) {
        return Ok(());
    }
    let access = if mode.reads() && !unit.permission().allows_read() {
        Access::Read
    } else {
        Access::Write
    };
    Err(IoError::PermissionDenied {
        label: unit.label().to_string(),
        access,
    })
}

/// Refuse an access the session was not opened for
pub(crate) fn check_access(unit: &StorageUnit, mode: OpenMode, access: Access) -> Result<(), IoError> {
    let allowed = match access {
        Access::Read => mode.reads(),
        Access::Write => mode.writes(),
    };
    if allowed {
        Ok(())
    } else {
        Err(IoError::PermissionDenied {
            label: unit.label().to_string(),
            access,
        })
    }
}

impl ErrorType for UnitFile<'_> {
    type Error = IoError;
}

impl Read for UnitFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        check_access(self.unit, self.mode, Access::Read)?;
        let count = self.unit.read_into(self.position, buf)?;
        self.position += count;
        Ok(count)
    }
}

impl Write for UnitFile<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        check_access(self.unit, self.mode, Access::Write)?;
        let (count, position) = self.unit.write(self.position, buf)?;
        self.position = position;
        Ok(count)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Seek for UnitFile<'_> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let (offset, whence) = match pos {
            SeekFrom::Start(offset) => (
                i64::try_from(offset).unwrap_or(i64::MAX),
                Whence::FromStart,
            ),
            SeekFrom::Current(offset) => (offset, Whence::FromCurrent),
            SeekFrom::End(offset) => (offset, Whence::FromEnd),
        };
        let position = self.seek_to(offset, whence)?;
        Ok(position as u64)
    }
}
