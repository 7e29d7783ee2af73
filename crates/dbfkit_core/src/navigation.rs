//! GOTO-style positioning and index seek.

use crate::error::{CoreError, CoreResult};
use crate::session::ActiveSession;
use crate::types::GotoTarget;
use dbfkit_engine::{KeyKind, Position, SeekKey, SeekOutcome, TableHandle, TagHandle};

impl ActiveSession {
    /// Moves the current table and returns the landing record, 0 at a boundary.
    ///
    /// With deleted records hidden, the cursor keeps stepping in the move's
    /// direction past deleted records. [`GotoTarget::Record`] lands on the
    /// exact record, deleted or not.
    pub fn goto(&mut self, target: GotoTarget) -> CoreResult<u32> {
        self.tracked("goto", |s| {
            let table = s.current_handle()?;
            let (position, step) = match target {
                GotoTarget::Top => (s.engine.top(table)?, 1),
                GotoTarget::Bottom => (s.engine.bottom(table)?, -1),
                GotoTarget::Next => (s.engine.skip(table, 1)?, 1),
                GotoTarget::Previous => (s.engine.skip(table, -1)?, -1),
                GotoTarget::Skip(n) => {
                    let n = if n == 0 { 1 } else { n };
                    (s.engine.skip(table, n)?, n.signum())
                }
                GotoTarget::Record(recno) => {
                    let count = s.engine.record_count(table)?;
                    if recno == 0 || recno > count {
                        return Err(CoreError::RecordOutOfRange { recno, count });
                    }
                    return Ok(s.engine.go(table, recno)?.recno);
                }
            };
            let position = s.skip_hidden(table, position, step)?;
            Ok(if position.at_boundary() { 0 } else { position.recno })
        })
    }

    fn skip_hidden(
        &mut self,
        table: TableHandle,
        mut position: Position,
        step: i64,
    ) -> CoreResult<Position> {
        if !self.state.skip_deleted {
            return Ok(position);
        }
        while !position.at_boundary() && self.engine.is_deleted(table)? {
            position = self.engine.skip(table, step)?;
        }
        Ok(position)
    }

    /// Looks `value` up in a tag of a table.
    ///
    /// The table defaults to the current one and the tag to the table's
    /// selected order. The table's order is restored afterwards and the
    /// current table never changes. With deleted records hidden, deleted
    /// matches are passed over.
    pub fn seek(&mut self, value: &str, alias: Option<&str>, tag: Option<&str>) -> CoreResult<bool> {
        self.tracked("seek", |s| {
            let table = match alias.map(str::trim).filter(|a| !a.is_empty()) {
                Some(alias) => s
                    .engine
                    .find_table(alias)
                    .ok_or_else(|| CoreError::alias_not_found(alias))?,
                None => s.current_handle()?,
            };
            let previous = s.engine.selected_tag(table)?;
            let seek_tag = match tag.map(str::trim).filter(|t| !t.is_empty()) {
                Some(name) => s
                    .engine
                    .find_tag(table, name)?
                    .ok_or_else(|| CoreError::TagNotFound {
                        name: name.to_string(),
                    })?,
                None => previous.ok_or_else(|| CoreError::NoIndex {
                    alias: s
                        .engine
                        .table_info(table)
                        .map(|i| i.alias)
                        .unwrap_or_default(),
                })?,
            };
            s.state.seek_cache = Some(value.to_string());
            s.engine.select_tag(table, Some(seek_tag))?;
            let result = s.seek_with(table, seek_tag, value);
            let restored = s.engine.select_tag(table, previous);
            let found = result?;
            restored?;
            Ok(found)
        })
    }

    fn seek_with(&mut self, table: TableHandle, tag: TagHandle, value: &str) -> CoreResult<bool> {
        let kind = self.engine.tag_info(tag)?.key_kind;
        let key = self.seek_key(kind, value)?;
        let mut outcome = self.engine.seek(table, &key)?;
        if self.state.skip_deleted {
            while outcome.is_found() && self.engine.is_deleted(table)? {
                outcome = self.engine.seek_next(table, &key)?;
            }
        }
        Ok(matches!(outcome, SeekOutcome::Found(_)))
    }

    fn seek_key(&self, kind: KeyKind, value: &str) -> CoreResult<SeekKey> {
        Ok(match kind {
            KeyKind::Character => SeekKey::Char(value.to_string()),
            KeyKind::Numeric => {
                let number = value.trim().parse::<f64>().map_err(|_| {
                    CoreError::invalid_argument(format!("'{value}' is not a number"))
                })?;
                SeekKey::Number(number)
            }
            KeyKind::Date => SeekKey::Date(self.state.date_format.to_dtos(value)?),
            KeyKind::Logical => {
                let text = value.trim().trim_matches('.').to_ascii_uppercase();
                SeekKey::Logical(matches!(text.as_str(), "T" | "Y" | "TRUE" | "YES"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::session::SessionState;
    use crate::types::{OpenOptions, SessionId};
    use dbfkit_engine::{create_table, FieldDef, FileEngine, NewRecord, TagSpec, Value};
    use tempfile::{tempdir, TempDir};

    fn open(dir: &TempDir, rows: Vec<NewRecord>) -> ActiveSession {
        let fields = [FieldDef::character("NAME", 10), FieldDef::numeric("BALANCE", 8, 2)];
        let path = create_table(&dir.path().join("cust.dbf"), &fields, &rows).unwrap();
        let config = SessionConfig::default();
        let engine = FileEngine::new(config.engine.clone());
        let mut s = ActiveSession::new(
            SessionId(1),
            Box::new(engine),
            SessionState::new(&config, false),
        );
        s.open_table(&path, None, OpenOptions::new().exclusive(true)).unwrap();
        s
    }

    fn row(name: &str, balance: f64, deleted: bool) -> NewRecord {
        let values = vec![Value::Char(name.into()), Value::Number(balance)];
        if deleted {
            NewRecord::deleted(values)
        } else {
            NewRecord::live(values)
        }
    }

    #[test]
    fn skip_zero_moves_one_and_boundaries_return_zero() {
        let dir = tempdir().unwrap();
        let mut s = open(&dir, vec![row("A", 1.0, false), row("B", 2.0, false)]);
        assert_eq!(s.goto(GotoTarget::Skip(0)).unwrap(), 2);
        assert_eq!(s.goto(GotoTarget::Next).unwrap(), 0);
        assert_eq!(s.goto(GotoTarget::Bottom).unwrap(), 2);
        assert_eq!(s.goto(GotoTarget::Skip(-5)).unwrap(), 0);
    }

    #[test]
    fn hidden_deleted_records_are_stepped_over_in_direction() {
        let dir = tempdir().unwrap();
        let mut s = open(
            &dir,
            vec![row("A", 1.0, true), row("B", 2.0, false), row("C", 3.0, true)],
        );
        s.set_skip_deleted(true);
        assert_eq!(s.goto(GotoTarget::Top).unwrap(), 2);
        assert_eq!(s.goto(GotoTarget::Next).unwrap(), 0);
        assert_eq!(s.goto(GotoTarget::Bottom).unwrap(), 2);
        assert_eq!(s.goto(GotoTarget::Previous).unwrap(), 0);
        assert_eq!(s.goto(GotoTarget::Record(3)).unwrap(), 3);
        assert!(s.is_deleted().unwrap());
    }

    #[test]
    fn record_targets_are_validated() {
        let dir = tempdir().unwrap();
        let mut s = open(&dir, vec![row("A", 1.0, false)]);
        assert!(matches!(
            s.goto(GotoTarget::Record(2)),
            Err(CoreError::RecordOutOfRange { recno: 2, count: 1 })
        ));
        assert!(matches!(
            s.goto(GotoTarget::Record(0)),
            Err(CoreError::RecordOutOfRange { .. })
        ));
        assert_eq!(s.last_error().code(), 120);
    }

    #[test]
    fn empty_table_is_at_both_boundaries() {
        let dir = tempdir().unwrap();
        let mut s = open(&dir, Vec::new());
        assert_eq!(s.goto(GotoTarget::Top).unwrap(), 0);
        assert_eq!(s.goto(GotoTarget::Bottom).unwrap(), 0);
        assert_eq!(s.record_number().unwrap(), 0);
    }

    #[test]
    fn seek_restores_previous_order() {
        let dir = tempdir().unwrap();
        let mut s = open(
            &dir,
            vec![row("CY", 3.0, false), row("ADA", 1.0, true), row("ADA", 2.0, false)],
        );
        s.add_tag(&TagSpec::new("NAME", "NAME")).unwrap();
        s.add_tag(&TagSpec::new("BAL", "BALANCE")).unwrap();
        s.set_order(Some("BAL")).unwrap();

        assert!(s.seek("ada", None, Some("name")).unwrap());
        assert_eq!(s.record_number().unwrap(), 2);
        assert_eq!(s.snapshot().selected_tag.as_deref(), Some("BAL"));
        assert_eq!(s.seek_cache(), Some("ada"));

        s.set_skip_deleted(true);
        assert!(s.seek("ADA", None, Some("NAME")).unwrap());
        assert_eq!(s.record_number().unwrap(), 3);
        assert!(s.seek("3", None, None).unwrap());
        assert_eq!(s.record_number().unwrap(), 1);
        assert!(!s.seek("ZED", None, Some("NAME")).unwrap());
        assert!(s.last_error().is_empty());
    }

    #[test]
    fn seek_failures() {
        let dir = tempdir().unwrap();
        let mut s = open(&dir, vec![row("A", 1.0, false)]);
        assert!(matches!(s.seek("A", None, None), Err(CoreError::NoIndex { .. })));
        assert!(matches!(
            s.seek("A", Some("NOPE"), None),
            Err(CoreError::AliasNotFound { .. })
        ));
        s.add_tag(&TagSpec::new("BAL", "BALANCE")).unwrap();
        assert!(matches!(
            s.seek("A", None, Some("NAME")),
            Err(CoreError::TagNotFound { .. })
        ));
        assert!(matches!(
            s.seek("abc", None, Some("BAL")),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert_eq!(s.snapshot().selected_tag, None);
    }
}
