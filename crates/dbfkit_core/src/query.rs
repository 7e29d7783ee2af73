//! LOCATE/CONTINUE cursor and the cached filter expression.

use crate::error::{CoreError, CoreResult};
use crate::session::{ActiveSession, FilterExpression, QueryCursor};
use tracing::{debug, warn};

impl ActiveSession {
    /// Positions the current table on the first record satisfying `expr`.
    ///
    /// Any previous cursor is discarded. Returns false, without error, when
    /// no record matches.
    pub fn locate(&mut self, expr: &str) -> CoreResult<bool> {
        self.tracked("locate", |s| {
            s.release_locate();
            let table = s.current_handle()?;
            let expr = s.engine.compile(table, expr)?;
            let cursor = QueryCursor { table, expr };
            s.state.locate = Some(cursor);
            s.engine.top(table)?;
            s.scan(cursor)
        })
    }

    /// Advances the cursor to the next satisfying record.
    pub fn continue_locate(&mut self) -> CoreResult<bool> {
        self.tracked("continue", |s| {
            let cursor = s.state.locate.ok_or(CoreError::NoActiveLocate)?;
            s.engine.skip(cursor.table, 1)?;
            s.scan(cursor)
        })
    }

    /// Releases the cursor. Safe when none is held.
    pub fn clear_locate(&mut self) {
        self.state.errors.clear();
        self.release_locate();
    }

    /// Whether a LOCATE cursor is held.
    #[must_use]
    pub fn locate_active(&self) -> bool {
        self.state.locate.is_some()
    }

    fn scan(&mut self, cursor: QueryCursor) -> CoreResult<bool> {
        loop {
            let position = self.engine.position(cursor.table)?;
            if position.at_boundary() {
                return Ok(false);
            }
            let visible = !(self.state.skip_deleted && self.engine.is_deleted(cursor.table)?);
            if visible && self.engine.eval_bool(cursor.expr)? {
                return Ok(true);
            }
            self.engine.skip(cursor.table, 1)?;
        }
    }

    pub(crate) fn release_locate(&mut self) {
        if let Some(cursor) = self.state.locate.take() {
            if let Err(e) = self.engine.release_expr(cursor.expr) {
                warn!(session = %self.id, error = %e, "locate release failed");
            }
        }
    }

    /// Compiles a filter against the current table, replacing any other.
    pub fn set_filter(&mut self, expr: &str) -> CoreResult<()> {
        self.tracked("set_filter", |s| {
            let table = s.current_handle()?;
            let compiled = s.engine.compile(table, expr)?;
            s.release_filter();
            s.state.filter = Some(FilterExpression {
                table,
                expr: compiled,
                source: expr.trim().to_string(),
            });
            debug!(session = %s.id, filter = expr, "filter set");
            Ok(())
        })
    }

    /// Evaluates the filter on its table's current record.
    pub fn filter_matches(&mut self) -> CoreResult<bool> {
        self.tracked("filter_matches", |s| {
            let filter = s.state.filter.as_ref().ok_or(CoreError::NoActiveFilter)?;
            let (table, expr) = (filter.table, filter.expr);
            if s.engine.position(table)?.at_boundary() {
                return Ok(false);
            }
            Ok(s.engine.eval_bool(expr)?)
        })
    }

    /// Releases the filter. Safe when none is set.
    pub fn clear_filter(&mut self) {
        self.state.errors.clear();
        self.release_filter();
    }

    /// Source text of the active filter.
    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.state.filter.as_ref().map(|f| f.source.as_str())
    }

    pub(crate) fn release_filter(&mut self) {
        if let Some(filter) = self.state.filter.take() {
            if let Err(e) = self.engine.release_expr(filter.expr) {
                warn!(session = %self.id, error = %e, "filter release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionConfig;
    use crate::error::CoreError;
    use crate::session::{ActiveSession, SessionState};
    use crate::types::{OpenOptions, SessionId};
    use dbfkit_engine::{create_table, FieldDef, FileEngine, NewRecord, Value};
    use tempfile::{tempdir, TempDir};

    fn cust(dir: &TempDir) -> ActiveSession {
        let fields = [FieldDef::character("NAME", 10), FieldDef::numeric("BALANCE", 8, 2)];
        let rows = vec![
            NewRecord::live(vec![Value::Char("ADA".into()), Value::Number(10.0)]),
            NewRecord::deleted(vec![Value::Char("BOB".into()), Value::Number(5.0)]),
            NewRecord::live(vec![Value::Char("CY".into()), Value::Number(7.5)]),
        ];
        let path = create_table(&dir.path().join("cust.dbf"), &fields, &rows).unwrap();
        let config = SessionConfig::default();
        let engine = FileEngine::new(config.engine.clone());
        let mut s = ActiveSession::new(
            SessionId(0),
            Box::new(engine),
            SessionState::new(&config, false),
        );
        s.open_table(&path, None, OpenOptions::new()).unwrap();
        s
    }

    #[test]
    fn locate_continue_honors_deleted_visibility() {
        let dir = tempdir().unwrap();
        let mut s = cust(&dir);
        s.set_skip_deleted(true);
        assert!(s.locate("BALANCE > 0").unwrap());
        assert_eq!(s.record_number().unwrap(), 1);
        assert!(s.continue_locate().unwrap());
        assert_eq!(s.record_number().unwrap(), 3);
        assert!(!s.continue_locate().unwrap());
        assert!(s.last_error().is_empty());
        assert!(!s.continue_locate().unwrap());
    }

    #[test]
    fn locate_sees_deleted_records_when_visible() {
        let dir = tempdir().unwrap();
        let mut s = cust(&dir);
        assert!(s.locate("BALANCE > 0").unwrap());
        assert!(s.continue_locate().unwrap());
        assert_eq!(s.record_number().unwrap(), 2);
    }

    #[test]
    fn continue_without_locate_fails() {
        let dir = tempdir().unwrap();
        let mut s = cust(&dir);
        assert!(matches!(s.continue_locate(), Err(CoreError::NoActiveLocate)));
        assert_eq!(s.last_error().code(), 150);
        s.clear_locate();
        assert!(s.last_error().is_empty());
        s.clear_locate();
    }

    #[test]
    fn parse_errors_leave_no_cursor() {
        let dir = tempdir().unwrap();
        let mut s = cust(&dir);
        assert!(s.locate("BALANCE >").is_err());
        assert!(!s.locate_active());
        assert!(!s.last_error().is_empty());
        assert!(!s.locate("NAME = 'ZED'").unwrap());
        assert!(s.locate_active());
    }

    #[test]
    fn filter_is_evaluated_on_demand() {
        let dir = tempdir().unwrap();
        let mut s = cust(&dir);
        assert!(matches!(s.filter_matches(), Err(CoreError::NoActiveFilter)));
        s.set_filter("BALANCE >= 7.5").unwrap();
        assert_eq!(s.filter(), Some("BALANCE >= 7.5"));
        assert!(s.filter_matches().unwrap());
        s.goto(crate::types::GotoTarget::Record(2)).unwrap();
        assert!(!s.filter_matches().unwrap());
        s.clear_filter();
        s.clear_filter();
        assert_eq!(s.filter(), None);
    }

    #[test]
    fn closing_the_table_releases_its_cursor_and_filter() {
        let dir = tempdir().unwrap();
        let mut s = cust(&dir);
        s.locate("BALANCE > 0").unwrap();
        s.set_filter("BALANCE > 0").unwrap();
        s.close_table(None).unwrap();
        assert!(!s.locate_active());
        assert_eq!(s.filter(), None);
    }
}
