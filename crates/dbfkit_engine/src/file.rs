//! File-backed engine.
//!
//! `FileEngine` keeps each open table as a [`DbfFile`] plus a buffered
//! current record, attaches `.dbi` index files to tables, and keeps every
//! attached tag in step with record writes.

use crate::dbf::{resolve_table_path, DbfFile, DbfOptions};
use crate::engine::{
    Engine, EngineSettings, ExprHandle, IndexHandle, OpenRequest, Position, SeekOutcome,
    TableHandle, TableInfo, TagHandle, TagInfo,
};
use crate::error::{EngineError, EngineResult};
use crate::expr::{Expr, RecordContext};
use crate::index::{IndexDocument, Key, SeekKey, TagData, TagSpec, INDEX_EXTENSION};
use crate::lock::{lock_key, FileLock, LockPolicy};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// An [`Engine`] over DBF files on the local file system.
#[derive(Debug)]
pub struct FileEngine {
    settings: EngineSettings,
    tables: BTreeMap<u32, Table>,
    indexes: HashMap<u32, OpenIndex>,
    exprs: HashMap<u32, BoundExpr>,
    next_id: u32,
}

#[derive(Debug)]
struct Table {
    alias: String,
    path: PathBuf,
    exclusive: bool,
    dbf: DbfFile,
    _lock: FileLock,
    recno: u32,
    bof: bool,
    eof: bool,
    record: Option<Vec<u8>>,
    dirty: bool,
    indexes: Vec<IndexHandle>,
    order: Option<TagHandle>,
}

#[derive(Debug)]
struct OpenIndex {
    table: TableHandle,
    path: PathBuf,
    doc: IndexDocument,
    compiled: Vec<CompiledTag>,
    modified: bool,
    /// The file was restructured underneath this handle.
    stale: bool,
}

#[derive(Debug)]
struct CompiledTag {
    key: Expr,
    filter: Option<Expr>,
}

#[derive(Debug)]
struct BoundExpr {
    table: TableHandle,
    expr: Expr,
}

/// A record as seen by the expression evaluator. No record means blank.
struct RecordView<'a> {
    dbf: &'a DbfFile,
    record: Option<&'a [u8]>,
    recno: u32,
}

impl RecordContext for RecordView<'_> {
    fn value(&self, field: usize) -> Value {
        match self.record {
            Some(record) => self.dbf.value(record, field),
            None => self.dbf.fields()[field].blank(),
        }
    }

    fn is_deleted(&self) -> bool {
        self.record.is_some_and(DbfFile::is_deleted)
    }

    fn recno(&self) -> u32 {
        self.recno
    }
}

impl Table {
    fn view(&self) -> RecordView<'_> {
        RecordView {
            dbf: &self.dbf,
            record: self.record.as_deref(),
            recno: self.recno,
        }
    }

    fn position(&self) -> Position {
        Position {
            recno: self.recno,
            bof: self.bof,
            eof: self.eof,
        }
    }

    fn load(&mut self, recno: u32) -> EngineResult<Position> {
        self.record = Some(self.dbf.read_record(recno)?);
        self.recno = recno;
        self.bof = false;
        self.eof = false;
        self.dirty = false;
        Ok(self.position())
    }

    fn park(&mut self, bof: bool, eof: bool) -> Position {
        self.record = None;
        self.recno = 0;
        self.bof = bof;
        self.eof = eof;
        self.dirty = false;
        self.position()
    }

    fn current(&self) -> EngineResult<u32> {
        if self.record.is_none() {
            return Err(EngineError::entry(format!(
                "{} is not positioned on a record",
                self.alias
            )));
        }
        Ok(self.recno)
    }
}

/// Returns the production index path of a table.
#[must_use]
pub fn production_index_path(table_path: &Path) -> PathBuf {
    table_path.with_extension(INDEX_EXTENSION)
}

fn invalid(kind: &'static str, id: u32) -> EngineError {
    EngineError::InvalidHandle { kind, id }
}

fn compile_tag(spec: &TagSpec, dbf: &DbfFile) -> EngineResult<CompiledTag> {
    Ok(CompiledTag {
        key: Expr::compile(&spec.expression, dbf.fields())?,
        filter: spec
            .filter
            .as_deref()
            .map(|f| Expr::compile(f, dbf.fields()))
            .transpose()?,
    })
}

/// Builds a tag over every record of a table.
fn build_tag(
    dbf: &mut DbfFile,
    spec: TagSpec,
    ci: bool,
) -> EngineResult<(TagData, CompiledTag)> {
    spec.validate()?;
    let compiled = compile_tag(&spec, dbf)?;
    let blank = RecordView {
        dbf: &*dbf,
        record: None,
        recno: 0,
    };
    let key_kind = Key::from(compiled.key.eval(&blank, ci)?).kind();

    let mut rows = Vec::new();
    for recno in 1..=dbf.record_count() {
        let record = dbf.read_record(recno)?;
        let view = RecordView {
            dbf: &*dbf,
            record: Some(&record),
            recno,
        };
        if let Some(filter) = &compiled.filter {
            if !filter.eval_bool(&view, ci)? {
                continue;
            }
        }
        let key = Key::from(compiled.key.eval(&view, ci)?);
        if key.kind() != key_kind {
            return Err(EngineError::index(format!(
                "tag {} yields mixed key types",
                spec.name
            )));
        }
        rows.push((key, recno));
    }
    Ok((TagData::build(spec, key_kind, rows, ci), compiled))
}

type KeyUpdate = (IndexHandle, usize, Option<Key>);

/// Computes the tag entries a record write implies, failing on unique violations.
fn key_updates(
    table: &Table,
    indexes: &HashMap<u32, OpenIndex>,
    view: &RecordView<'_>,
    ci: bool,
) -> EngineResult<Vec<KeyUpdate>> {
    let mut updates = Vec::new();
    for &handle in &table.indexes {
        let index = indexes.get(&handle.0).ok_or(invalid("index", handle.0))?;
        if index.stale {
            return Err(EngineError::index(format!(
                "{} was restructured; reopen {}",
                index.path.display(),
                table.alias
            )));
        }
        for (pos, (data, compiled)) in index.doc.tags.iter().zip(&index.compiled).enumerate() {
            let include = match &compiled.filter {
                Some(filter) => filter.eval_bool(view, ci)?,
                None => true,
            };
            let key = if include {
                let key = Key::from(compiled.key.eval(view, ci)?);
                if key.kind() != data.key_kind {
                    return Err(EngineError::index(format!(
                        "tag {} expects {:?} keys",
                        data.spec.name, data.key_kind
                    )));
                }
                data.check_unique(&key, view.recno, ci)?;
                Some(key)
            } else {
                None
            };
            updates.push((handle, pos, key));
        }
    }
    Ok(updates)
}

impl Default for FileEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl FileEngine {
    /// Creates an engine handle with no open tables.
    #[must_use]
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            tables: BTreeMap::new(),
            indexes: HashMap::new(),
            exprs: HashMap::new(),
            next_id: 1,
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn report<T>(&self, op: &'static str, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(e) = &result {
            if !self.settings.errors_as_codes {
                error!(op, code = e.code(), error = %e, "engine operation failed");
            }
        }
        result
    }

    fn table(&self, handle: TableHandle) -> EngineResult<&Table> {
        self.tables.get(&handle.0).ok_or(invalid("table", handle.0))
    }

    fn table_mut(&mut self, handle: TableHandle) -> EngineResult<&mut Table> {
        self.tables
            .get_mut(&handle.0)
            .ok_or(invalid("table", handle.0))
    }

    fn index(&self, handle: IndexHandle) -> EngineResult<&OpenIndex> {
        self.indexes
            .get(&handle.0)
            .ok_or(invalid("index", handle.0))
    }

    fn tag_data(&self, tag: TagHandle) -> EngineResult<&TagData> {
        self.index(tag.index)?
            .doc
            .tags
            .get(tag.tag as usize)
            .ok_or_else(|| invalid("tag", tag.tag))
    }

    fn ordering(&self, table: &Table) -> EngineResult<Option<&TagData>> {
        table.order.map(|tag| self.tag_data(tag)).transpose()
    }

    fn do_open(&mut self, request: &OpenRequest) -> EngineResult<TableHandle> {
        let path = resolve_table_path(&request.path);
        if self.find_table(&request.alias).is_some() {
            return Err(EngineError::Open {
                path,
                reason: format!("alias {} is already in use", request.alias),
            });
        }
        let key = lock_key(&path);
        let policy = LockPolicy {
            attempts: self.settings.lock_attempts,
            delay: self.settings.lock_delay,
        };
        if self
            .tables
            .values()
            .any(|t| lock_key(&t.path) == key && (t.exclusive || request.exclusive))
        {
            return Err(EngineError::Locked {
                path,
                attempts: policy.attempts.max(1),
            });
        }

        let lock = FileLock::acquire(&path, request.exclusive, policy)?;
        let dbf = DbfFile::open(
            &path,
            DbfOptions {
                read_only: request.read_only && !request.exclusive,
                sync_writes: request.no_buffering,
                cache_reads: self.settings.optimize,
                large_files: self.settings.large_files,
                compatibility: self.settings.compatibility,
            },
        )?;

        let handle = TableHandle(self.allocate());
        let mut table = Table {
            alias: request.alias.clone(),
            path,
            exclusive: request.exclusive,
            dbf,
            _lock: lock,
            recno: 0,
            bof: false,
            eof: false,
            record: None,
            dirty: false,
            indexes: Vec::new(),
            order: None,
        };

        if table.dbf.record_count() > 0 {
            table.load(1)?;
        } else {
            table.park(true, true);
        }

        let production = production_index_path(&table.path);
        if self.settings.auto_open && production.exists() {
            let doc = IndexDocument::load(&production)?;
            let compiled = doc
                .tags
                .iter()
                .map(|t| compile_tag(&t.spec, &table.dbf))
                .collect::<EngineResult<Vec<_>>>()?;
            let index = IndexHandle(self.allocate());
            self.indexes.insert(
                index.0,
                OpenIndex {
                    table: handle,
                    path: production,
                    doc,
                    compiled,
                    modified: false,
                    stale: false,
                },
            );
            table.indexes.push(index);
        }

        debug!(alias = %table.alias, path = %table.path.display(), exclusive = table.exclusive, "table opened");
        self.tables.insert(handle.0, table);
        Ok(handle)
    }

    fn do_flush(&mut self, handle: TableHandle) -> EngineResult<()> {
        let ci = self.settings.case_insensitive;
        let table = self
            .tables
            .get_mut(&handle.0)
            .ok_or(invalid("table", handle.0))?;
        if !table.dirty {
            return Ok(());
        }
        let recno = table.recno;
        let updates = key_updates(table, &self.indexes, &table.view(), ci);
        let written = match updates {
            Ok(updates) => match &table.record {
                Some(record) => table.dbf.write_record(recno, record).map(|()| updates),
                None => Ok(Vec::new()),
            },
            Err(e) => Err(e),
        };
        match written {
            Ok(updates) => {
                table.dirty = false;
                for (index, pos, key) in updates {
                    if let Some(open) = self.indexes.get_mut(&index.0) {
                        if let Some(tag) = open.doc.tags.get_mut(pos) {
                            tag.update(recno, key, ci);
                        }
                        open.modified = true;
                    }
                }
                Ok(())
            }
            Err(e) => {
                // Discard the pending changes so the cursor stays usable.
                debug!(alias = %table.alias, recno, error = %e, "pending record discarded");
                table.load(recno)?;
                Err(e)
            }
        }
    }

    fn save_index(&mut self, handle: IndexHandle) -> EngineResult<()> {
        let index = self
            .indexes
            .get_mut(&handle.0)
            .ok_or(invalid("index", handle.0))?;
        if index.modified && !index.stale {
            index.doc.save(&index.path)?;
            index.modified = false;
        }
        Ok(())
    }

    fn detach_index(&mut self, handle: IndexHandle) -> EngineResult<()> {
        let saved = self.save_index(handle);
        if let Some(index) = self.indexes.remove(&handle.0) {
            if let Some(table) = self.tables.get_mut(&index.table.0) {
                table.indexes.retain(|&h| h != handle);
                if table.order.is_some_and(|t| t.index == handle) {
                    table.order = None;
                }
            }
        }
        saved
    }

    fn do_close(&mut self, handle: TableHandle) -> EngineResult<()> {
        let flushed = self.do_flush(handle);
        let attached = self.table(handle)?.indexes.clone();
        let mut first_error = flushed.err();
        for index in attached {
            if let Err(e) = self.detach_index(index) {
                warn!(index = index.0, error = %e, "index close failed");
                first_error.get_or_insert(e);
            }
        }
        self.exprs.retain(|_, bound| bound.table != handle);
        if let Some(table) = self.tables.remove(&handle.0) {
            debug!(alias = %table.alias, "table closed");
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Resolves the ordinal position of the cursor in the current order.
    fn ordinal(&self, table: &Table) -> EngineResult<(i64, usize)> {
        let tag = self.ordering(table)?;
        let len = tag.map_or(table.dbf.record_count() as usize, TagData::len);
        let ordinal = if table.eof {
            len as i64
        } else if table.bof || table.recno == 0 {
            -1
        } else {
            match tag {
                Some(tag) => tag.position_of(table.recno).map_or(-1, |p| p as i64),
                None => i64::from(table.recno) - 1,
            }
        };
        Ok((ordinal, len))
    }

    fn land(&mut self, handle: TableHandle, target: i64, len: usize) -> EngineResult<Position> {
        let recno = if len == 0 || target < 0 || target >= len as i64 {
            None
        } else {
            let table = self.table(handle)?;
            match self.ordering(table)? {
                Some(tag) => tag.recno_at(target as usize),
                None => Some(target as u32 + 1),
            }
        };
        let table = self.table_mut(handle)?;
        match recno {
            Some(recno) => table.load(recno),
            None if len == 0 => Ok(table.park(true, true)),
            None if target < 0 => Ok(table.park(true, false)),
            None => Ok(table.park(false, true)),
        }
    }

    fn do_skip(&mut self, handle: TableHandle, n: i64) -> EngineResult<Position> {
        self.do_flush(handle)?;
        let (ordinal, len) = self.ordinal(self.table(handle)?)?;
        self.land(handle, ordinal.saturating_add(n), len)
    }

    fn do_end(&mut self, handle: TableHandle, top: bool) -> EngineResult<Position> {
        self.do_flush(handle)?;
        let (_, len) = self.ordinal(self.table(handle)?)?;
        let target = if top { 0 } else { len as i64 - 1 };
        self.land(handle, target, len)
    }

    fn controlling_tag(&self, handle: TableHandle) -> EngineResult<TagHandle> {
        let table = self.table(handle)?;
        table.order.ok_or_else(|| {
            EngineError::index(format!("{} has no controlling tag", table.alias))
        })
    }

    fn do_seek(&mut self, handle: TableHandle, key: &SeekKey, next: bool) -> EngineResult<SeekOutcome> {
        self.do_flush(handle)?;
        let ci = self.settings.case_insensitive;
        let tag = self.controlling_tag(handle)?;
        let data = self.tag_data(tag)?;
        let (pos, found) = if next {
            let table = self.table(handle)?;
            match (table.record.is_some(), data.position_of(table.recno)) {
                (true, Some(current)) => {
                    let pos = current + 1;
                    (pos, data.matches_at(pos, key, ci)?)
                }
                _ => (data.len(), false),
            }
        } else {
            data.seek(key, ci)?
        };
        let recno = data.recno_at(pos);
        let table = self.table_mut(handle)?;
        match recno {
            Some(recno) => {
                table.load(recno)?;
                Ok(if found {
                    SeekOutcome::Found(recno)
                } else {
                    SeekOutcome::After(recno)
                })
            }
            None => {
                table.park(false, true);
                Ok(SeekOutcome::Eof)
            }
        }
    }

    fn do_create_index(
        &mut self,
        handle: TableHandle,
        path: &Path,
        specs: &[TagSpec],
    ) -> EngineResult<IndexHandle> {
        if specs.is_empty() {
            return Err(EngineError::index("an index needs at least one tag"));
        }
        self.do_flush(handle)?;
        let ci = self.settings.case_insensitive;
        let table = self.table_mut(handle)?;
        let mut tags = Vec::with_capacity(specs.len());
        let mut compiled = Vec::with_capacity(specs.len());
        for spec in specs {
            if tags.iter().any(|t: &TagData| t.spec.name == spec.name) {
                return Err(EngineError::index(format!("duplicate tag {}", spec.name)));
            }
            let (data, tag) = build_tag(&mut table.dbf, spec.clone(), ci)?;
            tags.push(data);
            compiled.push(tag);
        }
        let doc = IndexDocument::new(tags);
        doc.save(path).map_err(|e| match e {
            EngineError::Io(io) => EngineError::Create {
                path: path.to_path_buf(),
                reason: io.to_string(),
            },
            other => other,
        })?;

        let index = IndexHandle(self.allocate());
        self.table_mut(handle)?.indexes.push(index);
        self.indexes.insert(
            index.0,
            OpenIndex {
                table: handle,
                path: path.to_path_buf(),
                doc,
                compiled,
                modified: false,
                stale: false,
            },
        );
        debug!(path = %path.display(), tags = specs.len(), "index created");
        Ok(index)
    }

    /// Loads the production index document from disk, saving the attached
    /// copy first so pending key changes are not lost.
    fn production_document(&mut self, handle: TableHandle) -> EngineResult<(PathBuf, IndexDocument)> {
        self.do_flush(handle)?;
        let table = self.table(handle)?;
        if table.dbf.is_read_only() {
            return Err(EngineError::ReadOnly {
                alias: table.alias.clone(),
            });
        }
        let path = production_index_path(&table.path);
        let attached = table
            .indexes
            .iter()
            .copied()
            .find(|h| self.indexes.get(&h.0).is_some_and(|i| i.path == path));
        if let Some(index) = attached {
            self.save_index(index)?;
            if let Some(open) = self.indexes.get_mut(&index.0) {
                open.stale = true;
            }
        }
        let doc = if path.exists() {
            IndexDocument::load(&path)?
        } else {
            IndexDocument::default()
        };
        Ok((path, doc))
    }

    fn do_add_tag(&mut self, handle: TableHandle, spec: &TagSpec) -> EngineResult<()> {
        spec.validate()?;
        let (path, mut doc) = self.production_document(handle)?;
        if doc.tag_position(&spec.name).is_some() {
            return Err(EngineError::index(format!("tag {} already exists", spec.name)));
        }
        let ci = self.settings.case_insensitive;
        let table = self.table_mut(handle)?;
        let (data, _) = build_tag(&mut table.dbf, spec.clone(), ci)?;
        doc.tags.push(data);
        doc.save(&path)?;
        debug!(tag = %spec.name, path = %path.display(), "tag added");
        Ok(())
    }

    fn do_remove_tag(&mut self, handle: TableHandle, name: &str) -> EngineResult<()> {
        let (path, mut doc) = self.production_document(handle)?;
        let pos = doc
            .tag_position(name)
            .ok_or_else(|| EngineError::TagNotFound {
                name: name.to_string(),
            })?;
        doc.tags.remove(pos);
        if doc.tags.is_empty() {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        } else {
            doc.save(&path)?;
        }
        debug!(tag = name, path = %path.display(), "tag removed");
        Ok(())
    }

    fn do_close_all(&mut self) -> EngineResult<()> {
        let handles: Vec<TableHandle> = self.tables.keys().map(|&id| TableHandle(id)).collect();
        let mut first_error = None;
        for handle in handles {
            if let Err(e) = self.do_close(handle) {
                first_error.get_or_insert(e);
            }
        }
        self.exprs.clear();
        first_error.map_or(Ok(()), Err)
    }

    fn bound_expr(&self, expr: ExprHandle) -> EngineResult<(&Table, &Expr)> {
        let bound = self.exprs.get(&expr.0).ok_or(invalid("expression", expr.0))?;
        Ok((self.table(bound.table)?, &bound.expr))
    }
}

impl Drop for FileEngine {
    fn drop(&mut self) {
        if !self.tables.is_empty() {
            if let Err(e) = self.do_close_all() {
                warn!(error = %e, "engine dropped with unclosable tables");
            }
        }
    }
}

impl Engine for FileEngine {
    fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn open_table(&mut self, request: &OpenRequest) -> EngineResult<TableHandle> {
        let result = self.do_open(request);
        self.report("open_table", result)
    }

    fn close_table(&mut self, table: TableHandle) -> EngineResult<()> {
        let result = self.do_close(table);
        self.report("close_table", result)
    }

    fn close_all(&mut self) -> EngineResult<()> {
        let result = self.do_close_all();
        self.report("close_all", result)
    }

    fn find_table(&self, alias: &str) -> Option<TableHandle> {
        let alias = alias.trim();
        self.tables
            .iter()
            .find(|(_, t)| t.alias.eq_ignore_ascii_case(alias))
            .map(|(&id, _)| TableHandle(id))
    }

    fn tables(&self) -> Vec<TableHandle> {
        self.tables.keys().map(|&id| TableHandle(id)).collect()
    }

    fn table_info(&self, table: TableHandle) -> EngineResult<TableInfo> {
        let t = self.table(table)?;
        Ok(TableInfo {
            alias: t.alias.clone(),
            path: t.path.clone(),
            exclusive: t.exclusive,
            read_only: t.dbf.is_read_only(),
            no_buffering: t.dbf.syncs_writes(),
            record_count: t.dbf.record_count(),
            fields: t.dbf.fields().to_vec(),
        })
    }

    fn top(&mut self, table: TableHandle) -> EngineResult<Position> {
        let result = self.do_end(table, true);
        self.report("top", result)
    }

    fn bottom(&mut self, table: TableHandle) -> EngineResult<Position> {
        let result = self.do_end(table, false);
        self.report("bottom", result)
    }

    fn skip(&mut self, table: TableHandle, n: i64) -> EngineResult<Position> {
        let result = self.do_skip(table, n);
        self.report("skip", result)
    }

    fn go(&mut self, table: TableHandle, recno: u32) -> EngineResult<Position> {
        let result = self.do_flush(table).and_then(|()| {
            let t = self.table_mut(table)?;
            if recno == 0 || recno > t.dbf.record_count() {
                return Err(EngineError::entry(format!(
                    "record {recno} is outside 1..={}",
                    t.dbf.record_count()
                )));
            }
            t.load(recno)
        });
        self.report("go", result)
    }

    fn position(&self, table: TableHandle) -> EngineResult<Position> {
        Ok(self.table(table)?.position())
    }

    fn record_count(&self, table: TableHandle) -> EngineResult<u32> {
        Ok(self.table(table)?.dbf.record_count())
    }

    fn is_deleted(&mut self, table: TableHandle) -> EngineResult<bool> {
        Ok(self
            .table(table)?
            .record
            .as_deref()
            .is_some_and(DbfFile::is_deleted))
    }

    fn field_value(&mut self, table: TableHandle, field: &str) -> EngineResult<Value> {
        let t = self.table(table)?;
        let idx = t
            .dbf
            .field_index(field)
            .ok_or_else(|| EngineError::entry(format!("{} has no field {field}", t.alias)))?;
        Ok(t.view().value(idx))
    }

    fn set_field(&mut self, table: TableHandle, field: &str, value: Value) -> EngineResult<()> {
        let result = (|| {
            let t = self.table_mut(table)?;
            t.current()?;
            if t.dbf.is_read_only() {
                return Err(EngineError::ReadOnly {
                    alias: t.alias.clone(),
                });
            }
            let idx = t
                .dbf
                .field_index(field)
                .ok_or_else(|| EngineError::entry(format!("{} has no field {field}", t.alias)))?;
            let Table { dbf, record, .. } = &mut *t;
            if let Some(record) = record.as_mut() {
                dbf.set_value(record, idx, &value)?;
            }
            t.dirty = true;
            Ok(())
        })();
        self.report("set_field", result)
    }

    fn set_deleted(&mut self, table: TableHandle, deleted: bool) -> EngineResult<()> {
        let result = (|| {
            let t = self.table_mut(table)?;
            t.current()?;
            if t.dbf.is_read_only() {
                return Err(EngineError::ReadOnly {
                    alias: t.alias.clone(),
                });
            }
            if let Some(record) = t.record.as_mut() {
                DbfFile::set_deleted(record, deleted);
            }
            t.dirty = true;
            Ok(())
        })();
        self.report("set_deleted", result)
    }

    fn append(&mut self, table: TableHandle) -> EngineResult<u32> {
        let result = self.do_flush(table).and_then(|()| {
            let ci = self.settings.case_insensitive;
            let t = self
                .tables
                .get_mut(&table.0)
                .ok_or(invalid("table", table.0))?;
            let blank = t.dbf.blank_record();
            let recno = t.dbf.record_count() + 1;
            let view = RecordView {
                dbf: &t.dbf,
                record: Some(&blank),
                recno,
            };
            let updates = key_updates(t, &self.indexes, &view, ci)?;
            let recno = t.dbf.append_record(&blank)?;
            t.load(recno)?;
            for (index, pos, key) in updates {
                if let Some(open) = self.indexes.get_mut(&index.0) {
                    if let Some(tag) = open.doc.tags.get_mut(pos) {
                        tag.update(recno, key, ci);
                    }
                    open.modified = true;
                }
            }
            Ok(recno)
        });
        self.report("append", result)
    }

    fn flush(&mut self, table: TableHandle) -> EngineResult<()> {
        let result = self.do_flush(table);
        self.report("flush", result)
    }

    fn tags(&self, table: TableHandle) -> EngineResult<Vec<TagHandle>> {
        let t = self.table(table)?;
        let mut tags = Vec::new();
        for &index in &t.indexes {
            let count = self.index(index)?.doc.tags.len();
            tags.extend((0..count as u32).map(|tag| TagHandle { index, tag }));
        }
        Ok(tags)
    }

    fn find_tag(&self, table: TableHandle, name: &str) -> EngineResult<Option<TagHandle>> {
        for &index in &self.table(table)?.indexes {
            if let Some(tag) = self.index_tag(index, name)? {
                return Ok(Some(tag));
            }
        }
        Ok(None)
    }

    fn tag_info(&self, tag: TagHandle) -> EngineResult<TagInfo> {
        let data = self.tag_data(tag)?;
        Ok(TagInfo {
            spec: data.spec.clone(),
            key_kind: data.key_kind,
            index_path: self.index(tag.index)?.path.clone(),
        })
    }

    fn selected_tag(&self, table: TableHandle) -> EngineResult<Option<TagHandle>> {
        Ok(self.table(table)?.order)
    }

    fn select_tag(&mut self, table: TableHandle, tag: Option<TagHandle>) -> EngineResult<()> {
        if let Some(tag) = tag {
            self.tag_data(tag)?;
            if self.index(tag.index)?.table != table {
                return self.report(
                    "select_tag",
                    Err(EngineError::index(format!(
                        "tag {} belongs to another table",
                        tag.tag
                    ))),
                );
            }
        }
        self.table_mut(table)?.order = tag;
        Ok(())
    }

    fn create_index(
        &mut self,
        table: TableHandle,
        path: &Path,
        tags: &[TagSpec],
    ) -> EngineResult<IndexHandle> {
        let result = self.do_create_index(table, path, tags);
        self.report("create_index", result)
    }

    fn close_index(&mut self, index: IndexHandle) -> EngineResult<()> {
        self.index(index)?;
        let result = self.detach_index(index);
        self.report("close_index", result)
    }

    fn index_tag(&self, index: IndexHandle, name: &str) -> EngineResult<Option<TagHandle>> {
        Ok(self
            .index(index)?
            .doc
            .tag_position(name)
            .map(|pos| TagHandle {
                index,
                tag: pos as u32,
            }))
    }

    fn add_tag(&mut self, table: TableHandle, spec: &TagSpec) -> EngineResult<()> {
        let result = self.do_add_tag(table, spec);
        self.report("add_tag", result)
    }

    fn remove_tag(&mut self, table: TableHandle, name: &str) -> EngineResult<()> {
        let result = self.do_remove_tag(table, name);
        self.report("remove_tag", result)
    }

    fn seek(&mut self, table: TableHandle, key: &SeekKey) -> EngineResult<SeekOutcome> {
        let result = self.do_seek(table, key, false);
        self.report("seek", result)
    }

    fn seek_next(&mut self, table: TableHandle, key: &SeekKey) -> EngineResult<SeekOutcome> {
        let result = self.do_seek(table, key, true);
        self.report("seek_next", result)
    }

    fn compile(&mut self, table: TableHandle, source: &str) -> EngineResult<ExprHandle> {
        let result = self
            .table(table)
            .and_then(|t| Expr::compile(source, t.dbf.fields()));
        let expr = self.report("compile", result)?;
        let handle = ExprHandle(self.allocate());
        self.exprs.insert(handle.0, BoundExpr { table, expr });
        Ok(handle)
    }

    fn eval(&mut self, expr: ExprHandle) -> EngineResult<Value> {
        let ci = self.settings.case_insensitive;
        let result = self
            .bound_expr(expr)
            .and_then(|(table, expr)| expr.eval(&table.view(), ci));
        self.report("eval", result)
    }

    fn eval_bool(&mut self, expr: ExprHandle) -> EngineResult<bool> {
        let ci = self.settings.case_insensitive;
        let result = self
            .bound_expr(expr)
            .and_then(|(table, expr)| expr.eval_bool(&table.view(), ci));
        self.report("eval_bool", result)
    }

    fn release_expr(&mut self, expr: ExprHandle) -> EngineResult<()> {
        self.exprs
            .remove(&expr.0)
            .map(|_| ())
            .ok_or(invalid("expression", expr.0))
    }
}
