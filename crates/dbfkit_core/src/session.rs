//! Session state, the resident session, and checkpoints.
//!
//! A session is one engine handle plus the bookkeeping layered on it. While
//! resident it is an [`ActiveSession`]; while parked it is a
//! [`SessionCheckpoint`]. Converting between the two moves every piece of
//! state, so nothing lives outside these structures.

use crate::config::SessionConfig;
use crate::date_format::DateFormat;
use crate::error::{CoreError, CoreResult};
use crate::error_channel::LastError;
use crate::exclusive::ExclusiveRegistry;
use crate::temp_index::TempIndexPool;
use crate::types::{SessionId, TableId, TempIndexId};
use dbfkit_engine::{Engine, ExprHandle, TableHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Delimiter used by import/export collaborators unless changed.
pub const DEFAULT_DELIMITER: &str = ",";

/// A compiled LOCATE condition bound to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueryCursor {
    pub(crate) table: TableHandle,
    pub(crate) expr: ExprHandle,
}

/// A compiled filter bound to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilterExpression {
    pub(crate) table: TableHandle,
    pub(crate) expr: ExprHandle,
    pub(crate) source: String,
}

/// Everything a session keeps besides its engine handle.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) current: Option<TableHandle>,
    pub(crate) filter: Option<FilterExpression>,
    pub(crate) locate: Option<QueryCursor>,
    pub(crate) large_tables: bool,
    pub(crate) skip_deleted: bool,
    pub(crate) date_format: DateFormat,
    pub(crate) seek_cache: Option<String>,
    pub(crate) delimiter: String,
    pub(crate) errors: LastError,
    pub(crate) exclusive: ExclusiveRegistry,
    pub(crate) temp_indexes: TempIndexPool,
    pub(crate) alias_max_len: usize,
}

impl SessionState {
    /// Fresh per-session defaults.
    #[must_use]
    pub fn new(config: &SessionConfig, large_tables: bool) -> Self {
        Self {
            current: None,
            filter: None,
            locate: None,
            large_tables,
            skip_deleted: false,
            date_format: DateFormat::default(),
            seek_cache: None,
            delimiter: DEFAULT_DELIMITER.to_string(),
            errors: LastError::default(),
            exclusive: ExclusiveRegistry::new(
                config.exclusive_initial_limit,
                config.exclusive_capacity,
            ),
            temp_indexes: TempIndexPool::new(config.temp_index_capacity),
            alias_max_len: config.alias_max_len,
        }
    }

    /// Describes the observable state against the session's engine.
    #[must_use]
    pub fn snapshot(&self, id: SessionId, engine: &dyn Engine) -> SessionSnapshot {
        let current = self.current.and_then(|h| engine.table_info(h).ok().map(|i| (h, i)));
        let selected_tag = self
            .current
            .and_then(|h| engine.selected_tag(h).ok().flatten())
            .and_then(|tag| engine.tag_info(tag).ok())
            .map(|info| info.spec.name);
        let recno = self
            .current
            .and_then(|h| engine.position(h).ok())
            .map_or(0, |p| p.recno);
        let tables = engine
            .tables()
            .into_iter()
            .filter_map(|h| engine.table_info(h).ok().map(|i| i.alias))
            .collect();
        SessionSnapshot {
            id,
            current_alias: current.as_ref().map(|(_, info)| info.alias.clone()),
            current_table: current.map(|(handle, _)| handle),
            selected_tag,
            recno,
            tables,
            large_tables: self.large_tables,
            skip_deleted: self.skip_deleted,
            date_format: self.date_format.to_string(),
            delimiter: self.delimiter.clone(),
            seek_cache: self.seek_cache.clone(),
            locate_active: self.locate.is_some(),
            filter: self.filter.as_ref().map(|f| f.source.clone()),
            exclusive: self.exclusive.aliases().to_vec(),
            temp_indexes: self.temp_indexes.open_ids(id),
        }
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session id.
    pub id: SessionId,
    /// Alias of the current table.
    pub current_alias: Option<String>,
    /// Engine handle of the current table.
    pub current_table: Option<TableHandle>,
    /// Tag ordering the current table.
    pub selected_tag: Option<String>,
    /// Current record of the current table, 0 at a boundary.
    pub recno: u32,
    /// Aliases of every open table.
    pub tables: Vec<String>,
    /// Large-table mode.
    pub large_tables: bool,
    /// Navigation skips soft-deleted records.
    pub skip_deleted: bool,
    /// Date format code.
    pub date_format: String,
    /// Field delimiter for import/export.
    pub delimiter: String,
    /// Last seek string.
    pub seek_cache: Option<String>,
    /// A LOCATE cursor is held.
    pub locate_active: bool,
    /// Source of the active filter.
    pub filter: Option<String>,
    /// Aliases opened exclusively.
    pub exclusive: Vec<String>,
    /// Open temporary indexes.
    pub temp_indexes: Vec<TempIndexId>,
}

/// A parked session.
#[derive(Debug)]
pub struct SessionCheckpoint {
    pub(crate) engine: Box<dyn Engine>,
    pub(crate) state: SessionState,
}

impl SessionCheckpoint {
    /// Describes the parked session.
    #[must_use]
    pub fn snapshot(&self, id: SessionId) -> SessionSnapshot {
        self.state.snapshot(id, self.engine.as_ref())
    }
}

/// The resident session. All table, navigation, and index calls go here.
#[derive(Debug)]
pub struct ActiveSession {
    pub(crate) id: SessionId,
    pub(crate) engine: Box<dyn Engine>,
    pub(crate) state: SessionState,
}

impl ActiveSession {
    /// Makes a session from a freshly initialized engine handle.
    #[must_use]
    pub fn new(id: SessionId, engine: Box<dyn Engine>, state: SessionState) -> Self {
        Self { id, engine, state }
    }

    /// Parks the session.
    #[must_use]
    pub fn checkpoint(self) -> SessionCheckpoint {
        debug!(session = %self.id, "session checkpointed");
        SessionCheckpoint {
            engine: self.engine,
            state: self.state,
        }
    }

    /// Makes a parked session resident.
    #[must_use]
    pub fn restore(id: SessionId, checkpoint: SessionCheckpoint) -> Self {
        debug!(session = %id, "session restored");
        Self {
            id,
            engine: checkpoint.engine,
            state: checkpoint.state,
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The engine handle, for collaborators that read and write fields.
    #[must_use]
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// The engine handle, mutably.
    pub fn engine_mut(&mut self) -> &mut dyn Engine {
        self.engine.as_mut()
    }

    /// Last error of this session.
    #[must_use]
    pub fn last_error(&self) -> &LastError {
        &self.state.errors
    }

    pub(crate) fn errors_mut(&mut self) -> &mut LastError {
        &mut self.state.errors
    }

    /// Describes the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot(self.id, self.engine.as_ref())
    }

    /// Runs an operation with the error channel cleared on entry and set on failure.
    pub(crate) fn tracked<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> CoreResult<T>,
    ) -> CoreResult<T> {
        self.state.errors.clear();
        let result = f(self);
        if let Err(e) = &result {
            debug!(session = %self.id, op, code = e.code(), error = %e, "operation failed");
            self.state.errors.record(e);
        }
        result
    }

    /// Tags a table handle with this session.
    pub(crate) fn table_id(&self, handle: TableHandle) -> TableId {
        TableId {
            session: self.id,
            handle,
        }
    }

    /// Checks that a table id belongs to this session and is still open.
    pub(crate) fn resolve(&self, id: TableId) -> CoreResult<TableHandle> {
        if id.session != self.id {
            return Err(CoreError::ForeignHandle {
                owner: id.session,
                current: self.id,
            });
        }
        if !self.engine.tables().contains(&id.handle) {
            return Err(CoreError::StaleTable {
                handle: id.handle.0,
            });
        }
        Ok(id.handle)
    }

    /// The current table handle.
    pub(crate) fn current_handle(&self) -> CoreResult<TableHandle> {
        self.state.current.ok_or(CoreError::NoCurrentTable)
    }

    /// Closes everything the session holds. Best-effort: every step runs and
    /// the first failure is returned.
    pub fn teardown(&mut self) -> CoreResult<()> {
        let mut first_error: Option<CoreError> = None;
        if let Err(e) = self.state.temp_indexes.close_all(self.engine.as_mut()) {
            warn!(session = %self.id, error = %e, "temp index cleanup failed");
            first_error.get_or_insert(e);
        }
        self.release_locate();
        self.release_filter();
        if let Err(e) = self.close_all_tables_inner() {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.engine.close_all() {
            warn!(session = %self.id, error = %e, "engine close failed");
            first_error.get_or_insert(e.into());
        }
        self.state.exclusive.clear();
        self.state.current = None;
        debug!(session = %self.id, "session torn down");
        first_error.map_or(Ok(()), Err)
    }

    /// Sets whether navigation and queries skip soft-deleted records.
    pub fn set_skip_deleted(&mut self, value: bool) {
        self.state.errors.clear();
        self.state.skip_deleted = value;
    }

    /// Returns whether soft-deleted records are skipped.
    #[must_use]
    pub fn skip_deleted(&self) -> bool {
        self.state.skip_deleted
    }

    /// Sets the date format used to read date seek strings.
    pub fn set_date_format(&mut self, code: &str) -> CoreResult<()> {
        self.tracked("set_date_format", |s| {
            s.state.date_format = code.parse()?;
            Ok(())
        })
    }

    /// Current date format.
    #[must_use]
    pub fn date_format(&self) -> &DateFormat {
        &self.state.date_format
    }

    /// Sets the import/export field delimiter.
    pub fn set_delimiter(&mut self, delimiter: &str) -> CoreResult<()> {
        self.tracked("set_delimiter", |s| {
            if delimiter.is_empty() {
                return Err(CoreError::invalid_argument("delimiter cannot be empty"));
            }
            s.state.delimiter = delimiter.to_string();
            Ok(())
        })
    }

    /// Import/export field delimiter.
    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.state.delimiter
    }

    /// Whether the session was initialized in large-table mode.
    #[must_use]
    pub fn large_tables(&self) -> bool {
        self.state.large_tables
    }

    /// The last seek string.
    #[must_use]
    pub fn seek_cache(&self) -> Option<&str> {
        self.state.seek_cache.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpenOptions;
    use dbfkit_engine::{create_table, FieldDef, FileEngine, NewRecord, Value};
    use tempfile::tempdir;

    fn session() -> ActiveSession {
        let config = SessionConfig::default();
        ActiveSession::new(
            SessionId(3),
            Box::new(FileEngine::new(config.engine.clone())),
            SessionState::new(&config, true),
        )
    }

    #[test]
    fn fresh_session_snapshot() {
        let s = session();
        let snapshot = s.snapshot();
        assert_eq!(snapshot.id, SessionId(3));
        assert_eq!(snapshot.current_alias, None);
        assert_eq!(snapshot.recno, 0);
        assert!(snapshot.large_tables);
        assert_eq!(snapshot.date_format, "MM/DD/YY");
        assert_eq!(snapshot.delimiter, DEFAULT_DELIMITER);
        assert!(snapshot.tables.is_empty());
    }

    #[test]
    fn snapshot_serializes() {
        let dir = tempdir().unwrap();
        let path = create_table(
            &dir.path().join("cust.dbf"),
            &[FieldDef::character("NAME", 8)],
            &[NewRecord::live(vec![Value::Char("ADA".into())])],
        )
        .unwrap();
        let mut s = session();
        s.open_table(&path, None, OpenOptions::new()).unwrap();
        s.set_delimiter("|").unwrap();

        let snapshot = s.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.current_alias.as_deref(), Some("CUST"));
        assert_eq!(back.recno, 1);
        assert_eq!(back.delimiter, "|");
    }

    #[test]
    fn settings_are_validated() {
        let mut s = session();
        assert!(s.set_delimiter("").is_err());
        assert_eq!(s.delimiter(), DEFAULT_DELIMITER);
        assert!(!s.last_error().is_empty());
        s.set_date_format("british").unwrap();
        assert!(s.last_error().is_empty());
        assert_eq!(s.date_format().to_string(), "BRITISH");
        assert!(s.set_date_format("QQ").is_err());
        assert_eq!(s.date_format().to_string(), "BRITISH");
    }
}
