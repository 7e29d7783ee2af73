//! Table and alias resolution for the resident session.

use crate::alias::{default_alias, is_legal_alias, random_name};
use crate::error::{CoreError, CoreResult};
use crate::session::ActiveSession;
use crate::temp_index::TempIndexRequest;
use crate::types::{OpenOptions, TableId, TempIndexId};
use dbfkit_engine::{resolve_table_path, OpenRequest, TableHandle, TableInfo, TagSpec, Value};
use std::path::Path;
use tracing::{debug, warn};

const RANDOM_ALIAS_LEN: usize = 10;

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl ActiveSession {
    /// Opens a table and makes it current.
    ///
    /// An explicit alias that is already bound replaces the bound table. A
    /// derived alias bound to the same file reopens it; bound to a different
    /// file, a random alias is used instead.
    pub fn open_table(
        &mut self,
        path: &Path,
        alias: Option<&str>,
        options: OpenOptions,
    ) -> CoreResult<TableId> {
        self.tracked("open_table", |s| s.open_table_inner(path, alias, options))
    }

    fn open_table_inner(
        &mut self,
        path: &Path,
        alias: Option<&str>,
        options: OpenOptions,
    ) -> CoreResult<TableId> {
        let path = resolve_table_path(path);
        let max = self.state.alias_max_len;
        let alias = match alias.map(str::trim).filter(|a| !a.is_empty()) {
            Some(alias) => {
                if alias.len() > max {
                    return Err(CoreError::AliasTooLong {
                        alias: alias.to_string(),
                        max,
                    });
                }
                if !is_legal_alias(alias, max) {
                    return Err(CoreError::IllegalAlias {
                        alias: alias.to_string(),
                    });
                }
                if let Some(bound) = self.engine.find_table(alias) {
                    self.close_handle(bound)?;
                }
                alias.to_string()
            }
            None => {
                let derived = default_alias(&path, max);
                match self.engine.find_table(&derived) {
                    None => derived,
                    Some(bound) => {
                        let info = self.engine.table_info(bound)?;
                        if same_file(&info.path, &path) {
                            self.close_handle(bound)?;
                            derived
                        } else {
                            self.unbound_random_alias()
                        }
                    }
                }
            }
        };
        self.open_resolved(&path, &alias, options)
    }

    fn unbound_random_alias(&self) -> String {
        let len = RANDOM_ALIAS_LEN.min(self.state.alias_max_len).max(1);
        loop {
            let alias = random_name(len);
            if self.engine.find_table(&alias).is_none() {
                return alias;
            }
        }
    }

    fn open_resolved(
        &mut self,
        path: &Path,
        alias: &str,
        options: OpenOptions,
    ) -> CoreResult<TableId> {
        let request = OpenRequest::new(path, alias)
            .exclusive(options.exclusive)
            .read_only(options.read_only && !options.exclusive)
            .no_buffering(options.no_buffering);
        let handle = self.engine.open_table(&request)?;
        if options.exclusive {
            if let Err(e) = self.state.exclusive.insert(alias) {
                if let Err(close) = self.engine.close_table(handle) {
                    warn!(alias, error = %close, "close after registry overflow failed");
                }
                return Err(e);
            }
        }
        self.state.current = Some(handle);
        debug!(session = %self.id, alias, exclusive = options.exclusive, "table opened");
        Ok(self.table_id(handle))
    }

    /// Makes an open table current.
    pub fn select(&mut self, alias: &str) -> CoreResult<TableId> {
        self.tracked("select", |s| {
            let handle = s
                .engine
                .find_table(alias)
                .ok_or_else(|| CoreError::alias_not_found(alias))?;
            s.state.current = Some(handle);
            Ok(s.table_id(handle))
        })
    }

    /// Makes a table current by id.
    pub fn select_table(&mut self, id: TableId) -> CoreResult<TableId> {
        self.tracked("select_table", |s| {
            let handle = s.resolve(id)?;
            s.state.current = Some(handle);
            Ok(id)
        })
    }

    /// Looks up an open table by alias.
    pub fn find_table(&self, alias: &str) -> CoreResult<TableId> {
        self.engine
            .find_table(alias)
            .map(|h| self.table_id(h))
            .ok_or_else(|| CoreError::alias_not_found(alias))
    }

    /// The current table.
    #[must_use]
    pub fn current_table(&self) -> Option<TableId> {
        self.state.current.map(|h| self.table_id(h))
    }

    /// Describes a table of this session.
    pub fn table_info(&self, id: TableId) -> CoreResult<TableInfo> {
        let handle = self.resolve(id)?;
        Ok(self.engine.table_info(handle)?)
    }

    /// Closes the named table, or the current one.
    pub fn close_table(&mut self, alias: Option<&str>) -> CoreResult<()> {
        self.tracked("close_table", |s| {
            let handle = match alias {
                Some(alias) => s
                    .engine
                    .find_table(alias)
                    .ok_or_else(|| CoreError::alias_not_found(alias))?,
                None => s.current_handle()?,
            };
            s.close_handle(handle)
        })
    }

    /// Closes every table of the session.
    pub fn close_all_tables(&mut self) -> CoreResult<()> {
        self.tracked("close_all_tables", Self::close_all_tables_inner)
    }

    pub(crate) fn close_all_tables_inner(&mut self) -> CoreResult<()> {
        let mut first_error = None;
        for handle in self.engine.tables() {
            if let Err(e) = self.close_handle(handle) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Closes a table after its dependents: temp indexes, exclusive entry,
    /// and any locate cursor or filter bound to it. Every step runs; the
    /// first failure is returned.
    pub(crate) fn close_handle(&mut self, handle: TableHandle) -> CoreResult<()> {
        let mut first_error: Option<CoreError> = None;
        if let Err(e) = self
            .state
            .temp_indexes
            .close_all_for_table(self.engine.as_mut(), handle)
        {
            warn!(table = %handle, error = %e, "dependent temp index close failed");
            first_error.get_or_insert(e);
        }
        match self.engine.table_info(handle) {
            Ok(info) => {
                self.state.exclusive.remove(&info.alias);
            }
            Err(e) => {
                first_error.get_or_insert(e.into());
            }
        }
        if self.state.locate.is_some_and(|c| c.table == handle) {
            self.release_locate();
        }
        if self.state.filter.as_ref().is_some_and(|f| f.table == handle) {
            self.release_filter();
        }
        if let Err(e) = self.engine.close_table(handle) {
            first_error.get_or_insert(e.into());
        }
        if self.state.current == Some(handle) {
            self.state.current = None;
        }
        debug!(session = %self.id, table = %handle, "table closed");
        first_error.map_or(Ok(()), Err)
    }

    /// Closes and reopens the current table under its alias and access mode.
    pub fn reopen_in_place(&mut self) -> CoreResult<TableId> {
        self.tracked("reopen_in_place", Self::reopen_inner)
    }

    fn reopen_inner(&mut self) -> CoreResult<TableId> {
        let handle = self.current_handle()?;
        let info = self.engine.table_info(handle)?;
        let exclusive = self.state.exclusive.contains(&info.alias) || info.exclusive;
        let options = OpenOptions::new()
            .exclusive(exclusive)
            .read_only(info.read_only)
            .no_buffering(info.no_buffering);
        self.close_handle(handle)?;
        self.open_resolved(&info.path, &info.alias, options)
    }

    fn require_exclusive(&self) -> CoreResult<TableHandle> {
        let handle = self.current_handle()?;
        let info = self.engine.table_info(handle)?;
        if !self.state.exclusive.contains(&info.alias) {
            return Err(CoreError::ExclusiveRequired { alias: info.alias });
        }
        Ok(handle)
    }

    /// Adds a tag to the current table's production index and reopens it.
    pub fn add_tag(&mut self, spec: &TagSpec) -> CoreResult<TableId> {
        self.tracked("add_tag", |s| {
            let handle = s.require_exclusive()?;
            s.engine.add_tag(handle, spec)?;
            s.reopen_inner()
        })
    }

    /// Removes a tag from the current table's production index and reopens it.
    pub fn remove_tag(&mut self, name: &str) -> CoreResult<TableId> {
        self.tracked("remove_tag", |s| {
            let handle = s.require_exclusive()?;
            s.engine.remove_tag(handle, name).map_err(|e| match e {
                dbfkit_engine::EngineError::TagNotFound { name } => CoreError::TagNotFound { name },
                other => other.into(),
            })?;
            s.reopen_inner()
        })
    }

    /// Orders the current table by a tag, or natural order for `None`.
    pub fn set_order(&mut self, tag: Option<&str>) -> CoreResult<()> {
        self.tracked("set_order", |s| {
            let handle = s.current_handle()?;
            let tag = match tag.map(str::trim).filter(|t| !t.is_empty()) {
                Some(name) => Some(s.engine.find_tag(handle, name)?.ok_or_else(|| {
                    CoreError::TagNotFound {
                        name: name.to_string(),
                    }
                })?),
                None => None,
            };
            s.engine.select_tag(handle, tag)?;
            Ok(())
        })
    }

    /// Builds a temporary index over a table (default: current) and makes it
    /// the table's order.
    pub fn create_temp_index(
        &mut self,
        table: Option<TableId>,
        request: &TempIndexRequest<'_>,
    ) -> CoreResult<TempIndexId> {
        self.tracked("create_temp_index", |s| {
            let handle = match table {
                Some(id) => s.resolve(id)?,
                None => s.current_handle()?,
            };
            let id = s.id;
            s.state
                .temp_indexes
                .create(s.engine.as_mut(), id, handle, request)
        })
    }

    /// Makes a temporary index its table's order again.
    pub fn select_temp_index(&mut self, id: TempIndexId) -> CoreResult<()> {
        self.tracked("select_temp_index", |s| {
            s.check_temp_owner(id)?;
            s.state.temp_indexes.select(s.engine.as_mut(), id)
        })
    }

    /// Closes a temporary index. Closing a closed index is a no-op.
    pub fn close_temp_index(&mut self, id: TempIndexId) -> CoreResult<()> {
        self.tracked("close_temp_index", |s| {
            s.check_temp_owner(id)?;
            s.state.temp_indexes.close(s.engine.as_mut(), id)
        })
    }

    /// Number of open temporary indexes.
    #[must_use]
    pub fn temp_index_count(&self) -> usize {
        self.state.temp_indexes.open_count()
    }

    /// File of an open temporary index.
    #[must_use]
    pub fn temp_index_path(&self, id: TempIndexId) -> Option<std::path::PathBuf> {
        self.state.temp_indexes.path_of(id)
    }

    /// Slots of the temporary indexes built over a table.
    pub fn temp_index_dependents(&self, id: TableId) -> CoreResult<Vec<u16>> {
        let handle = self.resolve(id)?;
        Ok(self.state.temp_indexes.dependents_of(handle))
    }

    fn check_temp_owner(&self, id: TempIndexId) -> CoreResult<()> {
        if id.session != self.id {
            return Err(CoreError::ForeignHandle {
                owner: id.session,
                current: self.id,
            });
        }
        Ok(())
    }

    /// Aliases opened exclusively in this session.
    #[must_use]
    pub fn exclusive_aliases(&self) -> &[String] {
        self.state.exclusive.aliases()
    }

    /// Record number of the current table, 0 at a boundary.
    pub fn record_number(&self) -> CoreResult<u32> {
        let handle = self.current_handle()?;
        let position = self.engine.position(handle)?;
        Ok(if position.at_boundary() { 0 } else { position.recno })
    }

    /// Records in the current table, including deleted ones.
    pub fn record_count(&self) -> CoreResult<u32> {
        let handle = self.current_handle()?;
        Ok(self.engine.record_count(handle)?)
    }

    /// Whether the current record is soft-deleted.
    pub fn is_deleted(&mut self) -> CoreResult<bool> {
        let handle = self.current_handle()?;
        Ok(self.engine.is_deleted(handle)?)
    }

    /// A field of the current record.
    pub fn field_value(&mut self, field: &str) -> CoreResult<Value> {
        self.tracked("field_value", |s| {
            let handle = s.current_handle()?;
            Ok(s.engine.field_value(handle, field)?)
        })
    }
}
