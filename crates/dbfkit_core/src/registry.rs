//! The session registry.
//!
//! A fixed number of slots, each free, parked, or resident. Exactly one
//! session at most is resident; every other active session lives in its slot
//! as a [`SessionCheckpoint`]. Switching is a checkpoint of the resident
//! session followed by a restore of the target.

use crate::config::SessionConfig;
use crate::error::{CoreError, CoreResult};
use crate::error_channel::LastError;
use crate::session::{ActiveSession, SessionCheckpoint, SessionSnapshot, SessionState};
use crate::types::SessionId;
use dbfkit_engine::{Engine, EngineResult, EngineSettings, FileEngine};
use std::fmt;
use tracing::{debug, info, warn};

/// Creates one physical engine handle.
pub type EngineFactory =
    Box<dyn Fn(&EngineSettings) -> EngineResult<Box<dyn Engine>> + Send>;

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Free,
    Parked(SessionCheckpoint),
    Resident,
}

/// Multiplexes logical sessions onto engine handles.
///
/// # Example
///
/// ```rust,no_run
/// use dbfkit_core::{SessionConfig, SessionRegistry};
///
/// let mut registry = SessionRegistry::new(SessionConfig::default());
/// let first = registry.init(false)?;
/// let second = registry.init(false)?;
/// registry.switch(first)?;
/// registry.close(Some(second))?;
/// # Ok::<(), dbfkit_core::CoreError>(())
/// ```
pub struct SessionRegistry {
    config: SessionConfig,
    factory: EngineFactory,
    slots: Vec<Slot>,
    resident: Option<ActiveSession>,
    errors: LastError,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.config)
            .field("slots", &self.slots)
            .field("resident", &self.resident)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates a registry whose sessions use [`FileEngine`] handles.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_factory(
            config,
            Box::new(|settings: &EngineSettings| {
                Ok(Box::new(FileEngine::new(settings.clone())) as Box<dyn Engine>)
            }),
        )
    }

    /// Creates a registry with a custom engine factory.
    #[must_use]
    pub fn with_factory(config: SessionConfig, factory: EngineFactory) -> Self {
        let slots = (0..config.max_sessions).map(|_| Slot::Free).collect();
        Self {
            config,
            factory,
            slots,
            resident: None,
            errors: LastError::default(),
        }
    }

    /// The registry configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn tracked<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> CoreResult<T>,
    ) -> CoreResult<T> {
        self.errors.clear();
        if let Some(resident) = self.resident.as_mut() {
            resident.errors_mut().clear();
        }
        let result = f(self);
        match &result {
            Ok(_) => {
                if let Some(resident) = self.resident.as_mut() {
                    resident.errors_mut().clear();
                }
            }
            Err(e) => {
                debug!(op, code = e.code(), error = %e, "registry operation failed");
                match self.resident.as_mut() {
                    Some(resident) => resident.errors_mut().record(e),
                    None => self.errors.record(e),
                }
            }
        }
        result
    }

    /// Starts a session in the first free slot and makes it resident.
    ///
    /// The resident session, if any, is parked first.
    pub fn init(&mut self, large_tables: bool) -> CoreResult<SessionId> {
        self.tracked("init", |r| {
            let slot = r
                .slots
                .iter()
                .position(|s| matches!(s, Slot::Free))
                .ok_or(CoreError::NoAvailableSlots {
                    capacity: usize::from(r.config.max_sessions),
                })?;
            let settings = r.config.engine.clone().large_files(large_tables);
            let engine = (r.factory)(&settings)?;
            let id = SessionId(slot as u16);
            r.park_resident();
            let state = SessionState::new(&r.config, large_tables);
            r.resident = Some(ActiveSession::new(id, engine, state));
            r.slots[slot] = Slot::Resident;
            info!(session = %id, large_tables, "session initialized");
            Ok(id)
        })
    }

    fn park_resident(&mut self) {
        if let Some(resident) = self.resident.take() {
            let slot = usize::from(resident.id().0);
            self.slots[slot] = Slot::Parked(resident.checkpoint());
        }
    }

    fn slot_index(&self, id: SessionId) -> CoreResult<usize> {
        let index = usize::from(id.0);
        if index >= self.slots.len() {
            return Err(CoreError::InvalidSession { id });
        }
        Ok(index)
    }

    /// Makes a parked session resident. A no-op for the resident session.
    pub fn switch(&mut self, id: SessionId) -> CoreResult<SessionId> {
        self.tracked("switch", |r| {
            let index = r.slot_index(id)?;
            match r.slots[index] {
                Slot::Resident => return Ok(id),
                Slot::Free => return Err(CoreError::InvalidSession { id }),
                Slot::Parked(_) => {}
            }
            let Slot::Parked(checkpoint) = std::mem::take(&mut r.slots[index]) else {
                return Err(CoreError::InvalidSession { id });
            };
            r.park_resident();
            r.resident = Some(ActiveSession::restore(id, checkpoint));
            r.slots[index] = Slot::Resident;
            debug!(session = %id, "switched");
            Ok(id)
        })
    }

    /// Closes a session, or the resident one for `None`.
    ///
    /// Teardown is best-effort; the slot is freed even when it fails.
    pub fn close(&mut self, id: Option<SessionId>) -> CoreResult<SessionId> {
        self.tracked("close", |r| r.close_inner(id))
    }

    fn close_inner(&mut self, id: Option<SessionId>) -> CoreResult<SessionId> {
        let id = match id {
            Some(id) => id,
            None => self
                .resident
                .as_ref()
                .map(ActiveSession::id)
                .ok_or(CoreError::NoResidentSession)?,
        };
        let index = self.slot_index(id)?;
        let mut session = match std::mem::take(&mut self.slots[index]) {
            Slot::Free => return Err(CoreError::SessionNotActive { id }),
            Slot::Resident => match self.resident.take() {
                Some(session) => session,
                None => return Err(CoreError::SessionNotActive { id }),
            },
            Slot::Parked(checkpoint) => ActiveSession::restore(id, checkpoint),
        };
        let result = session.teardown();
        drop(session);
        match result {
            Ok(()) => {
                info!(session = %id, "session closed");
                Ok(id)
            }
            Err(e) => {
                warn!(session = %id, error = %e, "session teardown failed");
                Err(CoreError::Teardown {
                    session: id,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Closes every active session. Returns the first teardown failure.
    pub fn close_all_sessions(&mut self) -> CoreResult<()> {
        self.tracked("close_all_sessions", |r| {
            let mut first_error = None;
            for id in r.active_sessions() {
                if let Err(e) = r.close_inner(Some(id)) {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }

    /// The resident session.
    #[must_use]
    pub fn resident(&self) -> Option<&ActiveSession> {
        self.resident.as_ref()
    }

    /// The resident session, mutably.
    pub fn resident_mut(&mut self) -> CoreResult<&mut ActiveSession> {
        match self.resident.as_mut() {
            Some(resident) => Ok(resident),
            None => {
                self.errors.record(&CoreError::NoResidentSession);
                Err(CoreError::NoResidentSession)
            }
        }
    }

    /// Id of the resident session.
    #[must_use]
    pub fn resident_id(&self) -> Option<SessionId> {
        self.resident.as_ref().map(ActiveSession::id)
    }

    /// Ids of every active session, resident or parked.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !matches!(slot, Slot::Free))
            .map(|(i, _)| SessionId(i as u16))
            .collect()
    }

    /// Whether a slot holds an active session.
    #[must_use]
    pub fn is_active(&self, id: SessionId) -> bool {
        self.slots
            .get(usize::from(id.0))
            .is_some_and(|slot| !matches!(slot, Slot::Free))
    }

    /// Last error: the resident session's, or the registry's own when no
    /// session is resident.
    #[must_use]
    pub fn last_error(&self) -> &LastError {
        match &self.resident {
            Some(resident) => resident.last_error(),
            None => &self.errors,
        }
    }

    /// Describes an active session without switching to it.
    pub fn snapshot(&self, id: SessionId) -> CoreResult<SessionSnapshot> {
        let index = self.slot_index(id)?;
        match &self.slots[index] {
            Slot::Free => Err(CoreError::SessionNotActive { id }),
            Slot::Parked(checkpoint) => Ok(checkpoint.snapshot(id)),
            Slot::Resident => self
                .resident
                .as_ref()
                .map(ActiveSession::snapshot)
                .ok_or(CoreError::SessionNotActive { id }),
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if let Err(e) = self.close_all_sessions() {
            warn!(error = %e, "session cleanup on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GotoTarget, OpenOptions};
    use dbfkit_engine::{create_table, EngineError, FieldDef, NewRecord, Value};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn table(dir: &Path, name: &str) -> PathBuf {
        let rows = (1..=3)
            .map(|i| NewRecord::live(vec![Value::Number(f64::from(i))]))
            .collect::<Vec<_>>();
        create_table(&dir.join(name), &[FieldDef::numeric("N", 4, 0)], &rows).unwrap()
    }

    #[test]
    fn init_uses_first_free_slot_until_full() {
        let mut registry = SessionRegistry::new(SessionConfig::default().max_sessions(2));
        assert_eq!(registry.init(false).unwrap(), SessionId(0));
        assert_eq!(registry.init(true).unwrap(), SessionId(1));
        assert!(registry.resident().unwrap().large_tables());
        assert!(matches!(
            registry.init(false),
            Err(CoreError::NoAvailableSlots { capacity: 2 })
        ));
        assert_eq!(registry.last_error().code(), 200);
        registry.close(Some(SessionId(0))).unwrap();
        assert!(registry.last_error().is_empty());
        assert_eq!(registry.init(false).unwrap(), SessionId(0));
    }

    #[test]
    fn switch_round_trips_session_state() {
        let dir = tempdir().unwrap();
        let path = table(dir.path(), "a.dbf");
        let mut registry = SessionRegistry::new(SessionConfig::default());
        let a = registry.init(false).unwrap();
        {
            let s = registry.resident_mut().unwrap();
            s.open_table(&path, None, OpenOptions::new().exclusive(true))
                .unwrap();
            s.goto(GotoTarget::Record(2)).unwrap();
            s.set_skip_deleted(true);
            s.set_date_format("BRITISH").unwrap();
        }
        let departed = registry.snapshot(a).unwrap();
        let b = registry.init(false).unwrap();
        assert_eq!(registry.snapshot(a).unwrap(), departed);
        registry.switch(a).unwrap();
        registry.switch(b).unwrap();
        registry.switch(a).unwrap();
        assert_eq!(registry.resident().unwrap().snapshot(), departed);
        assert_eq!(registry.resident().unwrap().record_number().unwrap(), 2);
    }

    #[test]
    fn switch_rejects_unknown_sessions() {
        let mut registry = SessionRegistry::new(SessionConfig::default().max_sessions(2));
        registry.init(false).unwrap();
        assert!(matches!(
            registry.switch(SessionId(1)),
            Err(CoreError::InvalidSession { .. })
        ));
        assert!(matches!(
            registry.switch(SessionId(9)),
            Err(CoreError::InvalidSession { .. })
        ));
        assert_eq!(registry.switch(SessionId(0)).unwrap(), SessionId(0));
    }

    #[test]
    fn closing_resident_leaves_none() {
        let mut registry = SessionRegistry::new(SessionConfig::default());
        let id = registry.init(false).unwrap();
        assert_eq!(registry.close(None).unwrap(), id);
        assert_eq!(registry.resident_id(), None);
        assert!(registry.active_sessions().is_empty());
        assert!(matches!(registry.close(None), Err(CoreError::NoResidentSession)));
        assert_eq!(registry.last_error().code(), 102);
        assert!(matches!(
            registry.close(Some(id)),
            Err(CoreError::SessionNotActive { .. })
        ));
    }

    #[test]
    fn closing_parked_session_releases_its_locks() {
        let dir = tempdir().unwrap();
        let path = table(dir.path(), "shared.dbf");
        let mut registry = SessionRegistry::new(SessionConfig::default());
        let first = registry.init(false).unwrap();
        registry
            .resident_mut()
            .unwrap()
            .open_table(&path, Some("A"), OpenOptions::new().exclusive(true))
            .unwrap();
        let second = registry.init(false).unwrap();
        registry.close(Some(first)).unwrap();
        assert_eq!(registry.resident_id(), Some(second));
        registry
            .resident_mut()
            .unwrap()
            .open_table(&path, Some("B"), OpenOptions::new().exclusive(true))
            .unwrap();
    }

    #[test]
    fn factory_failures_leave_resident_in_place() {
        let config = SessionConfig::default();
        let fail = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fail);
        let mut registry = SessionRegistry::with_factory(
            config,
            Box::new(move |settings: &EngineSettings| {
                if flag.load(Ordering::SeqCst) {
                    return Err(EngineError::Open {
                        path: PathBuf::from("engine"),
                        reason: "no handle".into(),
                    });
                }
                Ok(Box::new(FileEngine::new(settings.clone())) as Box<dyn Engine>)
            }),
        );
        let id = registry.init(false).unwrap();
        fail.store(true, Ordering::SeqCst);
        assert!(registry.init(false).is_err());
        assert_eq!(registry.resident_id(), Some(id));
        assert_eq!(registry.active_sessions(), vec![id]);
        assert!(!registry.last_error().is_empty());
    }
}
