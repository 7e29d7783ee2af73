//! The single-handle engine seam.
//!
//! An [`Engine`] is one physical engine handle: it owns every table, index,
//! and compiled expression opened through it, and knows nothing about
//! sessions. Objects are addressed by small opaque handles.

use crate::error::EngineResult;
use crate::index::{KeyKind, SeekKey, TagSpec};
use crate::value::{FieldDef, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle!(
    /// An open table.
    TableHandle
);
handle!(
    /// An open index file.
    IndexHandle
);
handle!(
    /// A compiled expression.
    ExprHandle
);

/// A tag within an open index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagHandle {
    /// Index file holding the tag.
    pub index: IndexHandle,
    /// Position of the tag within the file.
    pub tag: u32,
}

/// Header dialect accepted and written by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compatibility {
    /// Plain dBASE III files only.
    DBase3,
    /// dBASE III plus Visual FoxPro headers.
    #[default]
    FoxPro,
}

impl Compatibility {
    /// Returns whether a DBF version byte is readable at this level.
    #[must_use]
    pub fn accepts(self, version: u8) -> bool {
        match self {
            Self::DBase3 => version == 0x03,
            Self::FoxPro => matches!(version, 0x03 | 0x30 | 0x31 | 0xF5),
        }
    }
}

/// Configuration applied when an engine handle is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Report failures only as codes; when off, failures are also logged.
    pub errors_as_codes: bool,
    /// Header dialect.
    pub compatibility: Compatibility,
    /// Cache record reads.
    pub optimize: bool,
    /// Lock attempts before a conflict is reported.
    pub lock_attempts: u32,
    /// Pause between lock attempts.
    pub lock_delay: Duration,
    /// Case-insensitive string comparison and key order.
    pub case_insensitive: bool,
    /// Open a table's production index with the table.
    pub auto_open: bool,
    /// Permit files beyond 4 GiB.
    pub large_files: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            errors_as_codes: true,
            compatibility: Compatibility::FoxPro,
            optimize: true,
            lock_attempts: 3,
            lock_delay: Duration::from_millis(100),
            case_insensitive: true,
            auto_open: true,
            large_files: false,
        }
    }
}

impl EngineSettings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether failures are reported only as codes.
    #[must_use]
    pub const fn errors_as_codes(mut self, value: bool) -> Self {
        self.errors_as_codes = value;
        self
    }

    /// Sets the header dialect.
    #[must_use]
    pub const fn compatibility(mut self, value: Compatibility) -> Self {
        self.compatibility = value;
        self
    }

    /// Sets whether record reads are cached.
    #[must_use]
    pub const fn optimize(mut self, value: bool) -> Self {
        self.optimize = value;
        self
    }

    /// Sets the lock retry budget.
    #[must_use]
    pub const fn lock_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.lock_attempts = attempts;
        self.lock_delay = delay;
        self
    }

    /// Sets case-insensitive comparison.
    #[must_use]
    pub const fn case_insensitive(mut self, value: bool) -> Self {
        self.case_insensitive = value;
        self
    }

    /// Sets whether production indexes open automatically.
    #[must_use]
    pub const fn auto_open(mut self, value: bool) -> Self {
        self.auto_open = value;
        self
    }

    /// Sets large-table mode.
    #[must_use]
    pub const fn large_files(mut self, value: bool) -> Self {
        self.large_files = value;
        self
    }
}

/// Parameters for opening a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Table file; `.dbf` is assumed when the extension is missing.
    pub path: PathBuf,
    /// Alias to register the table under.
    pub alias: String,
    /// Deny other openers.
    pub exclusive: bool,
    /// Open without write access.
    pub read_only: bool,
    /// Sync every write to disk.
    pub no_buffering: bool,
}

impl OpenRequest {
    /// A shared read-write open.
    pub fn new(path: impl Into<PathBuf>, alias: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: alias.into(),
            exclusive: false,
            read_only: false,
            no_buffering: false,
        }
    }

    /// Sets exclusive mode.
    #[must_use]
    pub fn exclusive(mut self, value: bool) -> Self {
        self.exclusive = value;
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets unbuffered writes.
    #[must_use]
    pub fn no_buffering(mut self, value: bool) -> Self {
        self.no_buffering = value;
        self
    }
}

/// Description of an open table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Registered alias.
    pub alias: String,
    /// Resolved file path.
    pub path: PathBuf,
    /// Opened exclusively.
    pub exclusive: bool,
    /// Opened without write access.
    pub read_only: bool,
    /// Writes bypass buffering.
    pub no_buffering: bool,
    /// Records including deleted ones.
    pub record_count: u32,
    /// Field list.
    pub fields: Vec<FieldDef>,
}

/// Description of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    /// Definition.
    pub spec: TagSpec,
    /// Key type.
    pub key_kind: KeyKind,
    /// Index file holding the tag.
    pub index_path: PathBuf,
}

/// Cursor position of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Current record, 0 at a boundary.
    pub recno: u32,
    /// Moved before the first record.
    pub bof: bool,
    /// Moved past the last record.
    pub eof: bool,
}

impl Position {
    /// Returns true when positioned on no record.
    #[must_use]
    pub fn at_boundary(&self) -> bool {
        self.bof || self.eof || self.recno == 0
    }
}

/// Result of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Positioned on a matching record.
    Found(u32),
    /// No match; positioned on the next record in tag order.
    After(u32),
    /// No match and nothing follows; positioned at end of file.
    Eof,
}

impl SeekOutcome {
    /// Returns whether the seek found a match.
    #[must_use]
    pub fn is_found(self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// One physical engine handle.
///
/// All calls block. Moves flush a pending record first and fail without
/// moving if the flush fails.
pub trait Engine: Send + fmt::Debug {
    /// Returns the settings the handle was initialized with.
    fn settings(&self) -> &EngineSettings;

    // ---- Tables ----

    /// Opens a table and positions it at the first physical record.
    fn open_table(&mut self, request: &OpenRequest) -> EngineResult<TableHandle>;
    /// Closes a table and any index files attached to it.
    fn close_table(&mut self, table: TableHandle) -> EngineResult<()>;
    /// Closes every table and releases every expression.
    fn close_all(&mut self) -> EngineResult<()>;
    /// Looks a table up by case-insensitive alias.
    fn find_table(&self, alias: &str) -> Option<TableHandle>;
    /// Lists open tables in open order.
    fn tables(&self) -> Vec<TableHandle>;
    /// Describes an open table.
    fn table_info(&self, table: TableHandle) -> EngineResult<TableInfo>;

    // ---- Positioning ----

    /// Moves to the first record in the current order.
    fn top(&mut self, table: TableHandle) -> EngineResult<Position>;
    /// Moves to the last record in the current order.
    fn bottom(&mut self, table: TableHandle) -> EngineResult<Position>;
    /// Moves `n` records in the current order; negative moves backwards.
    fn skip(&mut self, table: TableHandle, n: i64) -> EngineResult<Position>;
    /// Moves to a physical record number.
    fn go(&mut self, table: TableHandle, recno: u32) -> EngineResult<Position>;
    /// Returns the current position.
    fn position(&self, table: TableHandle) -> EngineResult<Position>;
    /// Returns the number of records including deleted ones.
    fn record_count(&self, table: TableHandle) -> EngineResult<u32>;
    /// Returns whether the current record is soft-deleted.
    fn is_deleted(&mut self, table: TableHandle) -> EngineResult<bool>;

    // ---- Records ----

    /// Reads a field of the current record by name.
    fn field_value(&mut self, table: TableHandle, field: &str) -> EngineResult<Value>;
    /// Changes a field of the current record; written on the next move or flush.
    fn set_field(&mut self, table: TableHandle, field: &str, value: Value) -> EngineResult<()>;
    /// Sets or clears the deletion flag of the current record.
    fn set_deleted(&mut self, table: TableHandle, deleted: bool) -> EngineResult<()>;
    /// Appends a blank record and positions on it.
    fn append(&mut self, table: TableHandle) -> EngineResult<u32>;
    /// Writes the pending record, if any.
    fn flush(&mut self, table: TableHandle) -> EngineResult<()>;

    // ---- Tags and indexes ----

    /// Lists the tags of every index attached to the table.
    fn tags(&self, table: TableHandle) -> EngineResult<Vec<TagHandle>>;
    /// Finds a tag by name across the table's indexes.
    fn find_tag(&self, table: TableHandle, name: &str) -> EngineResult<Option<TagHandle>>;
    /// Describes a tag.
    fn tag_info(&self, tag: TagHandle) -> EngineResult<TagInfo>;
    /// Returns the tag that orders the table, if any.
    fn selected_tag(&self, table: TableHandle) -> EngineResult<Option<TagHandle>>;
    /// Sets the controlling tag; `None` restores natural order.
    fn select_tag(&mut self, table: TableHandle, tag: Option<TagHandle>) -> EngineResult<()>;
    /// Builds a new index file holding `tags` and attaches it to the table.
    fn create_index(
        &mut self,
        table: TableHandle,
        path: &Path,
        tags: &[TagSpec],
    ) -> EngineResult<IndexHandle>;
    /// Detaches and closes an index file. The file stays on disk.
    fn close_index(&mut self, index: IndexHandle) -> EngineResult<()>;
    /// Finds a tag by name within one index file.
    fn index_tag(&self, index: IndexHandle, name: &str) -> EngineResult<Option<TagHandle>>;
    /// Adds a tag to the table's production index. Visible after reopening.
    fn add_tag(&mut self, table: TableHandle, spec: &TagSpec) -> EngineResult<()>;
    /// Removes a tag from the production index. Visible after reopening.
    fn remove_tag(&mut self, table: TableHandle, name: &str) -> EngineResult<()>;

    // ---- Seek ----

    /// Positions on the first entry of the selected tag matching `key`.
    fn seek(&mut self, table: TableHandle, key: &SeekKey) -> EngineResult<SeekOutcome>;
    /// Advances to the next entry in tag order if it also matches `key`.
    fn seek_next(&mut self, table: TableHandle, key: &SeekKey) -> EngineResult<SeekOutcome>;

    // ---- Expressions ----

    /// Compiles an expression against a table's fields.
    fn compile(&mut self, table: TableHandle, source: &str) -> EngineResult<ExprHandle>;
    /// Evaluates an expression for the current record of its table.
    fn eval(&mut self, expr: ExprHandle) -> EngineResult<Value>;
    /// Evaluates a logical expression for the current record of its table.
    fn eval_bool(&mut self, expr: ExprHandle) -> EngineResult<bool>;
    /// Releases a compiled expression.
    fn release_expr(&mut self, expr: ExprHandle) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_levels() {
        assert!(Compatibility::DBase3.accepts(0x03));
        assert!(!Compatibility::DBase3.accepts(0x30));
        assert!(Compatibility::FoxPro.accepts(0x30));
        assert!(!Compatibility::FoxPro.accepts(0x8B));
    }

    #[test]
    fn settings_builder() {
        let settings = EngineSettings::new()
            .case_insensitive(false)
            .lock_retry(5, Duration::from_millis(10))
            .large_files(true);
        assert!(!settings.case_insensitive);
        assert_eq!(settings.lock_attempts, 5);
        assert!(settings.large_files);
        assert!(settings.auto_open);
    }

    #[test]
    fn boundary_positions() {
        assert!(Position::default().at_boundary());
        assert!(!Position {
            recno: 3,
            bof: false,
            eof: false
        }
        .at_boundary());
    }
}
