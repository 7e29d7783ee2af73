//! Temporary index pool.
//!
//! Each session owns a bounded arena of single-tag indexes built on demand.
//! Every entry owns a randomly named file beside its table and is listed
//! under that table in an explicit dependents map, so closing a table can
//! close its temp indexes first.
//!
//! ```text
//! slots:      [ Open{gen 3} | Free{gen 1} | Open{gen 0} ]
//! dependents: CUST -> {0, 2}
//! ```

use crate::alias::random_name;
use crate::error::{CoreError, CoreResult};
use crate::types::{SessionId, TempIndexId};
use dbfkit_engine::{Engine, IndexHandle, TableHandle, TagSpec, INDEX_EXTENSION, TAG_NAME_LEN};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FILE_NAME_LEN: usize = 8;

#[derive(Debug)]
struct TempIndex {
    table: TableHandle,
    index: IndexHandle,
    tag: String,
    path: PathBuf,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<TempIndex>,
}

/// Parameters of a temporary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempIndexRequest<'a> {
    /// Key expression.
    pub expression: &'a str,
    /// Optional filter expression.
    pub filter: Option<&'a str>,
    /// Descending order.
    pub descending: bool,
}

/// A session's temporary indexes.
#[derive(Debug)]
pub struct TempIndexPool {
    slots: Vec<Slot>,
    capacity: usize,
    dependents: BTreeMap<TableHandle, BTreeSet<u16>>,
}

impl TempIndexPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity: capacity.min(usize::from(u16::MAX)),
            dependents: BTreeMap::new(),
        }
    }

    /// Number of open temp indexes.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    /// Ids of the open temp indexes, in slot order.
    #[must_use]
    pub fn open_ids(&self, session: SessionId) -> Vec<TempIndexId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entry.is_some())
            .map(|(slot, s)| TempIndexId {
                session,
                slot: slot as u16,
                generation: s.generation,
            })
            .collect()
    }

    /// Slots of the temp indexes built over a table.
    #[must_use]
    pub fn dependents_of(&self, table: TableHandle) -> Vec<u16> {
        self.dependents
            .get(&table)
            .map(|slots| slots.iter().copied().collect())
            .unwrap_or_default()
    }

    /// File of an open temp index.
    #[must_use]
    pub fn path_of(&self, id: TempIndexId) -> Option<PathBuf> {
        self.open_entry(id).ok().map(|e| e.path.clone())
    }

    fn free_slot(&mut self) -> CoreResult<usize> {
        if let Some(pos) = self.slots.iter().position(|s| s.entry.is_none()) {
            return Ok(pos);
        }
        if self.slots.len() < self.capacity {
            self.slots.push(Slot::default());
            return Ok(self.slots.len() - 1);
        }
        Err(CoreError::TempIndexPoolFull {
            capacity: self.capacity,
        })
    }

    fn open_entry(&self, id: TempIndexId) -> CoreResult<&TempIndex> {
        let slot = self
            .slots
            .get(usize::from(id.slot))
            .ok_or(CoreError::TempIndexOutOfRange { slot: id.slot })?;
        match &slot.entry {
            Some(entry) if slot.generation == id.generation => Ok(entry),
            _ => Err(CoreError::TempIndexClosed { slot: id.slot }),
        }
    }

    /// Builds a one-tag index over `table` and makes it the table's order.
    pub fn create(
        &mut self,
        engine: &mut dyn Engine,
        session: SessionId,
        table: TableHandle,
        request: &TempIndexRequest<'_>,
    ) -> CoreResult<TempIndexId> {
        let slot = self.free_slot()?;
        let info = engine.table_info(table)?;
        let dir = info
            .path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let path = dir.join(format!("{}.{INDEX_EXTENSION}", random_name(FILE_NAME_LEN)));
        let tag = random_name(TAG_NAME_LEN);
        let spec = TagSpec::new(&tag, request.expression)
            .filter(request.filter)
            .descending(request.descending);

        let index = engine.create_index(table, &path, &[spec])?;
        let handle = match engine.index_tag(index, &tag) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                return Err(rollback(
                    engine,
                    index,
                    &path,
                    CoreError::PostCreateTagMissing { tag: tag.clone() },
                ))
            }
            Err(e) => return Err(rollback(engine, index, &path, e.into())),
        };
        if let Err(e) = engine.select_tag(table, Some(handle)) {
            return Err(rollback(engine, index, &path, e.into()));
        }

        let entry = &mut self.slots[slot];
        entry.entry = Some(TempIndex {
            table,
            index,
            tag,
            path,
        });
        self.dependents
            .entry(table)
            .or_default()
            .insert(slot as u16);
        let id = TempIndexId {
            session,
            slot: slot as u16,
            generation: entry.generation,
        };
        debug!(slot, table = %table, alias = %info.alias, "temp index created");
        Ok(id)
    }

    /// Makes an open temp index its table's order again.
    pub fn select(&self, engine: &mut dyn Engine, id: TempIndexId) -> CoreResult<()> {
        let entry = self.open_entry(id)?;
        let tag = engine
            .index_tag(entry.index, &entry.tag)?
            .ok_or_else(|| CoreError::TempIndexTagMissing {
                slot: id.slot,
                tag: entry.tag.clone(),
            })?;
        engine.select_tag(entry.table, Some(tag))?;
        Ok(())
    }

    /// Closes a temp index and deletes its file. Closing a closed index is a no-op.
    pub fn close(&mut self, engine: &mut dyn Engine, id: TempIndexId) -> CoreResult<()> {
        match self.open_entry(id) {
            Ok(_) => self.close_slot(engine, id.slot),
            Err(CoreError::TempIndexClosed { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Closes every temp index built over `table`.
    pub fn close_all_for_table(
        &mut self,
        engine: &mut dyn Engine,
        table: TableHandle,
    ) -> CoreResult<()> {
        let mut first_error = None;
        for slot in self.dependents_of(table) {
            if let Err(e) = self.close_slot(engine, slot) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Closes every temp index in the pool.
    pub fn close_all(&mut self, engine: &mut dyn Engine) -> CoreResult<()> {
        let mut first_error = None;
        for slot in 0..self.slots.len() {
            if self.slots[slot].entry.is_some() {
                if let Err(e) = self.close_slot(engine, slot as u16) {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Best-effort close: the slot is freed and the file removed even when
    /// the engine reports an error.
    fn close_slot(&mut self, engine: &mut dyn Engine, slot: u16) -> CoreResult<()> {
        let Some(cell) = self.slots.get_mut(usize::from(slot)) else {
            return Ok(());
        };
        let Some(entry) = cell.entry.take() else {
            return Ok(());
        };
        cell.generation = cell.generation.wrapping_add(1);
        if let Some(slots) = self.dependents.get_mut(&entry.table) {
            slots.remove(&slot);
            if slots.is_empty() {
                self.dependents.remove(&entry.table);
            }
        }

        let mut first_error: Option<CoreError> = None;
        let selected = engine.selected_tag(entry.table);
        if let Ok(Some(tag)) = selected {
            if tag.index == entry.index {
                if let Err(e) = engine.select_tag(entry.table, None) {
                    first_error.get_or_insert(e.into());
                }
            }
        }
        if let Err(e) = engine.close_index(entry.index) {
            warn!(slot, error = %e, "temp index close failed");
            first_error.get_or_insert(e.into());
        }
        remove_file(&entry.path);
        debug!(slot, path = %entry.path.display(), "temp index closed");
        first_error.map_or(Ok(()), Err)
    }
}

/// Undoes a create whose tag could not be used.
fn rollback(engine: &mut dyn Engine, index: IndexHandle, path: &Path, err: CoreError) -> CoreError {
    if let Err(e) = engine.close_index(index) {
        warn!(error = %e, "temp index rollback: close failed");
    }
    remove_file(path);
    err
}

fn remove_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "temp index file not removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfkit_engine::{
        create_table, EngineResult, EngineSettings, ExprHandle, FieldDef, FileEngine, NewRecord,
        OpenRequest, Position, SeekKey, SeekOutcome, TableInfo, TagHandle, TagInfo, Value,
    };
    use tempfile::{tempdir, TempDir};

    /// File engine whose index tags can be made to vanish after a build.
    #[derive(Debug)]
    struct TagHidingEngine {
        inner: FileEngine,
        hide_tags: bool,
    }

    impl Engine for TagHidingEngine {
        fn settings(&self) -> &EngineSettings {
            self.inner.settings()
        }
        fn open_table(&mut self, request: &OpenRequest) -> EngineResult<TableHandle> {
            self.inner.open_table(request)
        }
        fn close_table(&mut self, table: TableHandle) -> EngineResult<()> {
            self.inner.close_table(table)
        }
        fn close_all(&mut self) -> EngineResult<()> {
            self.inner.close_all()
        }
        fn find_table(&self, alias: &str) -> Option<TableHandle> {
            self.inner.find_table(alias)
        }
        fn tables(&self) -> Vec<TableHandle> {
            self.inner.tables()
        }
        fn table_info(&self, table: TableHandle) -> EngineResult<TableInfo> {
            self.inner.table_info(table)
        }
        fn top(&mut self, table: TableHandle) -> EngineResult<Position> {
            self.inner.top(table)
        }
        fn bottom(&mut self, table: TableHandle) -> EngineResult<Position> {
            self.inner.bottom(table)
        }
        fn skip(&mut self, table: TableHandle, n: i64) -> EngineResult<Position> {
            self.inner.skip(table, n)
        }
        fn go(&mut self, table: TableHandle, recno: u32) -> EngineResult<Position> {
            self.inner.go(table, recno)
        }
        fn position(&self, table: TableHandle) -> EngineResult<Position> {
            self.inner.position(table)
        }
        fn record_count(&self, table: TableHandle) -> EngineResult<u32> {
            self.inner.record_count(table)
        }
        fn is_deleted(&mut self, table: TableHandle) -> EngineResult<bool> {
            self.inner.is_deleted(table)
        }
        fn field_value(&mut self, table: TableHandle, field: &str) -> EngineResult<Value> {
            self.inner.field_value(table, field)
        }
        fn set_field(&mut self, table: TableHandle, field: &str, value: Value) -> EngineResult<()> {
            self.inner.set_field(table, field, value)
        }
        fn set_deleted(&mut self, table: TableHandle, deleted: bool) -> EngineResult<()> {
            self.inner.set_deleted(table, deleted)
        }
        fn append(&mut self, table: TableHandle) -> EngineResult<u32> {
            self.inner.append(table)
        }
        fn flush(&mut self, table: TableHandle) -> EngineResult<()> {
            self.inner.flush(table)
        }
        fn tags(&self, table: TableHandle) -> EngineResult<Vec<TagHandle>> {
            self.inner.tags(table)
        }
        fn find_tag(&self, table: TableHandle, name: &str) -> EngineResult<Option<TagHandle>> {
            self.inner.find_tag(table, name)
        }
        fn tag_info(&self, tag: TagHandle) -> EngineResult<TagInfo> {
            self.inner.tag_info(tag)
        }
        fn selected_tag(&self, table: TableHandle) -> EngineResult<Option<TagHandle>> {
            self.inner.selected_tag(table)
        }
        fn select_tag(&mut self, table: TableHandle, tag: Option<TagHandle>) -> EngineResult<()> {
            self.inner.select_tag(table, tag)
        }
        fn create_index(
            &mut self,
            table: TableHandle,
            path: &Path,
            tags: &[TagSpec],
        ) -> EngineResult<IndexHandle> {
            self.inner.create_index(table, path, tags)
        }
        fn close_index(&mut self, index: IndexHandle) -> EngineResult<()> {
            self.inner.close_index(index)
        }
        fn index_tag(&self, index: IndexHandle, name: &str) -> EngineResult<Option<TagHandle>> {
            if self.hide_tags {
                return Ok(None);
            }
            self.inner.index_tag(index, name)
        }
        fn add_tag(&mut self, table: TableHandle, spec: &TagSpec) -> EngineResult<()> {
            self.inner.add_tag(table, spec)
        }
        fn remove_tag(&mut self, table: TableHandle, name: &str) -> EngineResult<()> {
            self.inner.remove_tag(table, name)
        }
        fn seek(&mut self, table: TableHandle, key: &SeekKey) -> EngineResult<SeekOutcome> {
            self.inner.seek(table, key)
        }
        fn seek_next(&mut self, table: TableHandle, key: &SeekKey) -> EngineResult<SeekOutcome> {
            self.inner.seek_next(table, key)
        }
        fn compile(&mut self, table: TableHandle, source: &str) -> EngineResult<ExprHandle> {
            self.inner.compile(table, source)
        }
        fn eval(&mut self, expr: ExprHandle) -> EngineResult<Value> {
            self.inner.eval(expr)
        }
        fn eval_bool(&mut self, expr: ExprHandle) -> EngineResult<bool> {
            self.inner.eval_bool(expr)
        }
        fn release_expr(&mut self, expr: ExprHandle) -> EngineResult<()> {
            self.inner.release_expr(expr)
        }
    }

    fn index_files(dir: &TempDir) -> usize {
        fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == INDEX_EXTENSION))
            .count()
    }

    fn setup() -> (TempDir, FileEngine, TableHandle) {
        let dir = tempdir().unwrap();
        let path = create_table(
            &dir.path().join("cust"),
            &[FieldDef::character("NAME", 8)],
            &[
                NewRecord::live(vec![Value::Char("B".into())]),
                NewRecord::live(vec![Value::Char("A".into())]),
            ],
        )
        .unwrap();
        let mut engine = FileEngine::new(EngineSettings::default());
        let table = engine.open_table(&OpenRequest::new(path, "CUST")).unwrap();
        (dir, engine, table)
    }

    fn by_name() -> TempIndexRequest<'static> {
        TempIndexRequest {
            expression: "NAME",
            filter: None,
            descending: false,
        }
    }

    #[test]
    fn create_selects_and_close_removes_file() {
        let (_dir, mut engine, table) = setup();
        let mut pool = TempIndexPool::new(2);
        let id = pool.create(&mut engine, SessionId(0), table, &by_name()).unwrap();
        let path = pool.path_of(id).unwrap();
        assert!(path.exists());
        assert!(engine.selected_tag(table).unwrap().is_some());
        engine.top(table).unwrap();
        assert_eq!(engine.position(table).unwrap().recno, 2);

        pool.close(&mut engine, id).unwrap();
        assert!(!path.exists());
        assert!(engine.selected_tag(table).unwrap().is_none());
        assert_eq!(pool.open_count(), 0);
        // Idempotent.
        pool.close(&mut engine, id).unwrap();
    }

    #[test]
    fn pool_is_bounded_and_slots_are_reused() {
        let (_dir, mut engine, table) = setup();
        let mut pool = TempIndexPool::new(1);
        let first = pool.create(&mut engine, SessionId(0), table, &by_name()).unwrap();
        assert!(matches!(
            pool.create(&mut engine, SessionId(0), table, &by_name()),
            Err(CoreError::TempIndexPoolFull { capacity: 1 })
        ));
        pool.close(&mut engine, first).unwrap();
        let second = pool.create(&mut engine, SessionId(0), table, &by_name()).unwrap();
        assert_eq!(second.slot, first.slot);
        assert_ne!(second.generation, first.generation);
        assert!(matches!(
            pool.select(&mut engine, first),
            Err(CoreError::TempIndexClosed { .. })
        ));
        pool.select(&mut engine, second).unwrap();
    }

    #[test]
    fn select_out_of_range() {
        let (_dir, mut engine, _table) = setup();
        let pool = TempIndexPool::new(4);
        let id = TempIndexId {
            session: SessionId(0),
            slot: 3,
            generation: 0,
        };
        assert!(matches!(
            pool.select(&mut engine, id),
            Err(CoreError::TempIndexOutOfRange { slot: 3 })
        ));
    }

    #[test]
    fn close_all_for_table_clears_dependents() {
        let (_dir, mut engine, table) = setup();
        let mut pool = TempIndexPool::new(4);
        pool.create(&mut engine, SessionId(0), table, &by_name()).unwrap();
        pool.create(
            &mut engine,
            SessionId(0),
            table,
            &TempIndexRequest {
                expression: "NAME",
                filter: Some("NAME = 'A'"),
                descending: true,
            },
        )
        .unwrap();
        assert_eq!(pool.dependents_of(table).len(), 2);
        pool.close_all_for_table(&mut engine, table).unwrap();
        assert!(pool.dependents_of(table).is_empty());
        assert_eq!(pool.open_count(), 0);
    }

    #[test]
    fn engine_create_errors_leave_slot_free() {
        let (_dir, mut engine, table) = setup();
        let mut pool = TempIndexPool::new(1);
        let err = pool
            .create(
                &mut engine,
                SessionId(0),
                table,
                &TempIndexRequest {
                    expression: "MISSING",
                    filter: None,
                    descending: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
        assert_eq!(pool.open_count(), 0);
        pool.create(&mut engine, SessionId(0), table, &by_name()).unwrap();
    }

    #[test]
    fn missing_tag_after_build_rolls_the_create_back() {
        let (dir, inner, table) = setup();
        let mut engine = TagHidingEngine {
            inner,
            hide_tags: true,
        };
        let mut pool = TempIndexPool::new(1);
        let err = pool
            .create(&mut engine, SessionId(0), table, &by_name())
            .unwrap_err();
        assert!(matches!(err, CoreError::PostCreateTagMissing { .. }));
        assert_eq!(err.code(), 900);
        assert_eq!(pool.open_count(), 0);
        assert!(pool.dependents_of(table).is_empty());
        assert_eq!(index_files(&dir), 0);
        assert!(engine.selected_tag(table).unwrap().is_none());

        engine.hide_tags = false;
        let id = pool.create(&mut engine, SessionId(0), table, &by_name()).unwrap();
        assert_eq!(id.slot, 0);
        assert_eq!(index_files(&dir), 1);
    }

    #[test]
    fn select_reports_a_vanished_tag() {
        let (_dir, inner, table) = setup();
        let mut engine = TagHidingEngine {
            inner,
            hide_tags: false,
        };
        let mut pool = TempIndexPool::new(1);
        let id = pool.create(&mut engine, SessionId(0), table, &by_name()).unwrap();
        engine.hide_tags = true;
        let err = pool.select(&mut engine, id).unwrap_err();
        assert!(matches!(err, CoreError::TempIndexTagMissing { slot: 0, .. }));
        assert_eq!(err.code(), 901);

        engine.hide_tags = false;
        pool.close(&mut engine, id).unwrap();
        assert_eq!(pool.open_count(), 0);
    }
}
