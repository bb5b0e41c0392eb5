//! Session table and the file-like entry points of a registry
//!
//! A session names a unit by its arena index and carries a cursor and the
//! mode it was opened with. Every call resolves the session, checks the mode
//! and then hands the request to the unit unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::binder::Binder;
use crate::idgen::{IdGen, SessionId};
use crate::io::file::{check_access, check_mode};
use crate::io::{Access, IoError, OpenMode, StorageUnit, Whence};
use crate::lifecycle::{Registry, UnitState};

#[derive(Debug)]
struct Session {
    unit: usize,
    mode: OpenMode,
    position: usize,
}

/// Open sessions of one registry
///
/// The table lock is held only to look a session up; the session's own lock
/// serializes calls on that session.
pub(crate) struct SessionTable {
    idgen: IdGen,
    open: Mutex<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionTable {
    pub(crate) fn new() -> Self {
        Self {
            idgen: IdGen::new(),
            open: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, unit: usize, mode: OpenMode) -> SessionId {
        let id = self.idgen.next_handle();
        let session = Session {
            unit,
            mode,
            position: 0,
        };
        self.open.lock().insert(id, Arc::new(Mutex::new(session)));
        id
    }

    fn get(&self, id: SessionId) -> Result<Arc<Mutex<Session>>, IoError> {
        self.open
            .lock()
            .get(&id)
            .cloned()
            .ok_or(IoError::BadSession(id))
    }

    fn remove(&self, id: SessionId) -> Result<(), IoError> {
        self.open
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(IoError::BadSession(id))
    }

    fn len(&self) -> usize {
        self.open.lock().len()
    }

    /// Drop every session; returns how many were open
    pub(crate) fn close_all(&self) -> usize {
        let mut open = self.open.lock();
        let count = open.len();
        open.clear();
        count
    }
}

impl<B: Binder> Registry<B> {
    /// Open a session on the published unit labelled `label`
    ///
    /// # Errors
    /// - `NotFound` if no published unit has that label
    /// - `PermissionDenied` if the unit's permission does not admit `mode`
    pub fn open(&self, label: &str, mode: OpenMode) -> Result<SessionId, IoError> {
        let index = self
            .index_of(label)
            .filter(|&index| self.unit_state(index) == Some(UnitState::Published))
            .ok_or_else(|| IoError::NotFound(label.to_string()))?;
        check_mode(&self.slots[index].unit, mode)?;

        let id = self.sessions.insert(index, mode);
        debug!(unit = %label, session = %id, ?mode, "session opened");
        Ok(id)
    }

    /// Read up to `max_len` bytes at the session's position
    ///
    /// # Errors
    /// `BadSession`, or `PermissionDenied` if the session or unit cannot read.
    pub fn read(&self, session: SessionId, max_len: usize) -> Result<Vec<u8>, IoError> {
        self.with_session(session, Access::Read, |unit, position| {
            let (bytes, new_position) = unit.read(*position, max_len)?;
            *position = new_position;
            Ok(bytes)
        })
    }

    /// Read into a caller buffer at the session's position
    ///
    /// # Errors
    /// Same as [`Registry::read`].
    pub fn read_into(&self, session: SessionId, out: &mut [u8]) -> Result<usize, IoError> {
        self.with_session(session, Access::Read, |unit, position| {
            let count = unit.read_into(*position, out)?;
            *position += count;
            Ok(count)
        })
    }

    /// Write at the session's position; a short count is a success
    ///
    /// # Errors
    /// `BadSession`, `PermissionDenied`, or `OutOfSpace` if the position is
    /// already at the end of the unit.
    pub fn write(&self, session: SessionId, bytes: &[u8]) -> Result<usize, IoError> {
        self.with_session(session, Access::Write, |unit, position| {
            let (count, new_position) = unit.write(*position, bytes)?;
            *position = new_position;
            Ok(count)
        })
    }

    /// Move the session's cursor
    ///
    /// # Errors
    /// `BadSession`, or `InvalidSeek` with the position left unchanged.
    pub fn seek(&self, session: SessionId, offset: i64, whence: Whence) -> Result<usize, IoError> {
        let (unit, session) = self.resolve(session)?;
        let mut session = session.lock();
        session.position = unit.seek(session.position, offset, whence)?;
        Ok(session.position)
    }

    /// Current position of a session
    ///
    /// # Errors
    /// `BadSession` if the session is not open.
    pub fn position(&self, session: SessionId) -> Result<usize, IoError> {
        let (_, session) = self.resolve(session)?;
        let position = session.lock().position;
        Ok(position)
    }

    /// Close a session
    ///
    /// # Errors
    /// `BadSession` if the session is not open (closing twice included).
    pub fn close(&self, session: SessionId) -> Result<(), IoError> {
        self.sessions.remove(session)?;
        debug!(session = %session, "session closed");
        Ok(())
    }

    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn resolve(&self, id: SessionId) -> Result<(&StorageUnit, Arc<Mutex<Session>>), IoError> {
        let session = self.sessions.get(id)?;
        let index = session.lock().unit;
        let unit = self.unit(index).ok_or(IoError::BadSession(id))?;
        Ok((unit, session))
    }

    fn with_session<R>(
        &self,
        id: SessionId,
        access: Access,
        op: impl FnOnce(&StorageUnit, &mut usize) -> Result<R, IoError>,
    ) -> Result<R, IoError> {
        let (unit, session) = self.resolve(id)?;
        let mut session = session.lock();
        check_access(unit, session.mode, access)?;
        op(unit, &mut session.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::MemBinder;
    use crate::config::DeviceTable;

    fn registry() -> Registry<MemBinder> {
        Registry::bring_up(&DeviceTable::default(), MemBinder::new()).unwrap()
    }

    #[test]
    fn test_open_unknown_label() {
        let registry = registry();
        assert_eq!(
            registry.open("pcdev-9", OpenMode::Read).unwrap_err(),
            IoError::NotFound("pcdev-9".into())
        );
    }

    #[test]
    fn test_open_respects_permission() {
        let registry = registry();
        assert!(matches!(
            registry.open("pcdev-1", OpenMode::Write),
            Err(IoError::PermissionDenied { access: Access::Write, .. })
        ));
        assert!(matches!(
            registry.open("pcdev-2", OpenMode::ReadWrite),
            Err(IoError::PermissionDenied { access: Access::Read, .. })
        ));
        assert_eq!(registry.open_sessions(), 0);
    }

    #[test]
    fn test_sessions_keep_separate_cursors() {
        let registry = registry();
        let writer = registry.open("pcdev-3", OpenMode::Write).unwrap();
        let reader = registry.open("pcdev-3", OpenMode::Read).unwrap();

        assert_eq!(registry.write(writer, b"abc").unwrap(), 3);
        assert_eq!(registry.position(writer).unwrap(), 3);
        assert_eq!(registry.position(reader).unwrap(), 0);
        assert_eq!(registry.read(reader, 3).unwrap(), b"abc");
    }

    #[test]
    fn test_write_only_session_cannot_read() {
        let registry = registry();
        let session = registry.open("pcdev-4", OpenMode::Write).unwrap();
        assert!(matches!(
            registry.read(session, 1),
            Err(IoError::PermissionDenied { access: Access::Read, .. })
        ));
    }

    #[test]
    fn test_closed_session_is_rejected() {
        let registry = registry();
        let session = registry.open("pcdev-3", OpenMode::ReadWrite).unwrap();
        registry.close(session).unwrap();

        assert_eq!(registry.close(session).unwrap_err(), IoError::BadSession(session));
        assert_eq!(registry.read(session, 1).unwrap_err(), IoError::BadSession(session));
    }

    #[test]
    fn test_shutdown_closes_sessions() {
        let mut registry = registry();
        let session = registry.open("pcdev-3", OpenMode::ReadWrite).unwrap();

        let teardown = registry.shutdown().unwrap();
        assert_eq!(teardown.sessions_closed, 1);
        assert_eq!(registry.write(session, b"x").unwrap_err(), IoError::BadSession(session));
        assert_eq!(
            registry.open("pcdev-3", OpenMode::Read).unwrap_err(),
            IoError::NotFound("pcdev-3".into())
        );
    }
}
