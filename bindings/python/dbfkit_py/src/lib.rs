//! Python bindings for dbfkit.
//!
//! This crate provides Python bindings using PyO3. Failures raise a
//! `DbfError` subclass chosen by error kind; the exception arguments are
//! `(message, code)` as the session's last-error channel reports them.

use dbfkit_core::dbfkit_engine::{TagSpec, Value};
use dbfkit_core::{
    CoreError, ErrorKind, GotoTarget, OpenOptions, SessionConfig, SessionId, SessionRegistry,
    TempIndexId, TempIndexRequest,
};
use pyo3::create_exception;
use pyo3::exceptions::PyException;
use pyo3::prelude::*;
use std::path::Path;

/// Library version.
const VERSION: &str = env!("CARGO_PKG_VERSION");

create_exception!(dbfkit, DbfError, PyException, "Base class of dbfkit errors.");
create_exception!(dbfkit, UsageError, DbfError, "Bad arguments or missing selection.");
create_exception!(dbfkit, CapacityError, DbfError, "A bounded pool is full.");
create_exception!(dbfkit, LockError, DbfError, "A table lock could not be obtained.");
create_exception!(dbfkit, EngineError, DbfError, "The table engine reported a failure.");
create_exception!(dbfkit, InvariantError, DbfError, "The engine contradicted itself.");

fn to_py_err(err: &CoreError) -> PyErr {
    let args = (err.to_string(), err.code());
    match err.kind() {
        ErrorKind::Usage => UsageError::new_err(args),
        ErrorKind::Capacity => CapacityError::new_err(args),
        ErrorKind::Lock => LockError::new_err(args),
        ErrorKind::Engine => EngineError::new_err(args),
        ErrorKind::Invariant => InvariantError::new_err(args),
    }
}

/// A field value as Python sees it.
#[derive(IntoPyObject)]
enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Char(s) => Self::Text(s.trim_end().to_string()),
            Value::Number(n) => Self::Number(n),
            Value::Logical(b) => Self::Flag(b),
            Value::Date(d) => Self::Text(d),
        }
    }
}

/// A temporary index handle.
#[pyclass(frozen)]
#[derive(Clone, Copy)]
pub struct TempIndex {
    inner: TempIndexId,
}

#[pymethods]
impl TempIndex {
    /// Owning session.
    #[getter]
    fn session(&self) -> u16 {
        self.inner.session.0
    }

    /// Pool slot.
    #[getter]
    fn slot(&self) -> u16 {
        self.inner.slot
    }

    fn __repr__(&self) -> String {
        format!(
            "TempIndex(session={}, slot={}, generation={})",
            self.inner.session, self.inner.slot, self.inner.generation
        )
    }
}

/// A fixed set of sessions, one resident at a time.
///
/// Table, navigation and query methods act on the resident session.
///
/// Example:
/// ```python
/// with dbfkit.Registry() as reg:
///     reg.init()
///     reg.use("cust.dbf")
///     if reg.locate("BALANCE > 0"):
///         print(reg.recno, reg.field("NAME"))
/// ```
#[pyclass(unsendable)]
pub struct Registry {
    inner: SessionRegistry,
}

impl Registry {
    fn with_resident<T>(
        &mut self,
        f: impl FnOnce(&mut dbfkit_core::ActiveSession) -> Result<T, CoreError>,
    ) -> PyResult<T> {
        let session = self.inner.resident_mut().map_err(|e| to_py_err(&e))?;
        f(session).map_err(|e| to_py_err(&e))
    }
}

#[pymethods]
impl Registry {
    /// Creates a registry.
    #[new]
    #[pyo3(signature = (max_sessions=None, temp_index_capacity=None))]
    fn new(max_sessions: Option<u16>, temp_index_capacity: Option<usize>) -> Self {
        let mut config = SessionConfig::default();
        if let Some(value) = max_sessions {
            config = config.max_sessions(value);
        }
        if let Some(value) = temp_index_capacity {
            config = config.temp_index_capacity(value);
        }
        Self {
            inner: SessionRegistry::new(config),
        }
    }

    /// Starts a session and makes it resident. Returns its id.
    #[pyo3(signature = (large_tables=false))]
    fn init(&mut self, large_tables: bool) -> PyResult<u16> {
        self.inner
            .init(large_tables)
            .map(|id| id.0)
            .map_err(|e| to_py_err(&e))
    }

    /// Makes a session resident.
    fn switch(&mut self, id: u16) -> PyResult<u16> {
        self.inner
            .switch(SessionId(id))
            .map(|id| id.0)
            .map_err(|e| to_py_err(&e))
    }

    /// Closes a session, or the resident one.
    #[pyo3(signature = (id=None))]
    fn close(&mut self, id: Option<u16>) -> PyResult<u16> {
        self.inner
            .close(id.map(SessionId))
            .map(|id| id.0)
            .map_err(|e| to_py_err(&e))
    }

    /// Closes every session.
    fn close_all(&mut self) -> PyResult<()> {
        self.inner.close_all_sessions().map_err(|e| to_py_err(&e))
    }

    /// The resident session id, if any.
    #[getter]
    fn resident(&self) -> Option<u16> {
        self.inner.resident_id().map(|id| id.0)
    }

    /// Ids of every active session.
    #[getter]
    fn active_sessions(&self) -> Vec<u16> {
        self.inner.active_sessions().into_iter().map(|id| id.0).collect()
    }

    /// The session's observable state as a JSON string.
    fn snapshot(&self, id: u16) -> PyResult<String> {
        let snapshot = self
            .inner
            .snapshot(SessionId(id))
            .map_err(|e| to_py_err(&e))?;
        serde_json::to_string(&snapshot).map_err(|e| DbfError::new_err((e.to_string(), -1)))
    }

    /// `(code, message)` of the last failure, `(0, "")` when none.
    #[getter]
    fn last_error(&self) -> (i32, String) {
        let channel = self
            .inner
            .resident()
            .map_or_else(|| self.inner.last_error(), |s| s.last_error());
        (channel.code(), channel.message().to_string())
    }

    /// Opens a table in the resident session and makes it current.
    #[pyo3(signature = (path, alias=None, exclusive=false, read_only=false, no_buffering=false))]
    fn r#use(
        &mut self,
        path: &str,
        alias: Option<&str>,
        exclusive: bool,
        read_only: bool,
        no_buffering: bool,
    ) -> PyResult<String> {
        let options = OpenOptions::new()
            .exclusive(exclusive)
            .read_only(read_only)
            .no_buffering(no_buffering);
        self.with_resident(|s| {
            let id = s.open_table(Path::new(path), alias, options)?;
            Ok(s.table_info(id)?.alias)
        })
    }

    /// Makes the table open under `alias` current.
    fn select(&mut self, alias: &str) -> PyResult<()> {
        self.with_resident(|s| s.select(alias).map(|_| ()))
    }

    /// Closes a table, or the current one.
    #[pyo3(signature = (alias=None))]
    fn close_table(&mut self, alias: Option<&str>) -> PyResult<()> {
        self.with_resident(|s| s.close_table(alias))
    }

    /// Closes every table in the resident session.
    fn close_all_tables(&mut self) -> PyResult<()> {
        self.with_resident(dbfkit_core::ActiveSession::close_all_tables)
    }

    /// Moves the cursor. `verb` is top, bottom, next, previous, skip or record.
    /// Returns the record number, 0 at a boundary.
    #[pyo3(signature = (verb, count=0))]
    fn goto(&mut self, verb: &str, count: i64) -> PyResult<u32> {
        self.with_resident(|s| {
            let target = GotoTarget::from_verb(verb, count)?;
            s.goto(target)
        })
    }

    /// Seeks `value` in a tag. Returns whether a match was found.
    #[pyo3(signature = (value, alias=None, tag=None))]
    fn seek(&mut self, value: &str, alias: Option<&str>, tag: Option<&str>) -> PyResult<bool> {
        self.with_resident(|s| s.seek(value, alias, tag))
    }

    /// Finds the first record matching `expr`.
    fn locate(&mut self, expr: &str) -> PyResult<bool> {
        self.with_resident(|s| s.locate(expr))
    }

    /// Finds the next record matching the active locate.
    fn continue_locate(&mut self) -> PyResult<bool> {
        self.with_resident(dbfkit_core::ActiveSession::continue_locate)
    }

    /// Drops the active locate.
    fn clear_locate(&mut self) -> PyResult<()> {
        self.with_resident(|s| {
            s.clear_locate();
            Ok(())
        })
    }

    /// Sets the filter expression for the current table.
    fn set_filter(&mut self, expr: &str) -> PyResult<()> {
        self.with_resident(|s| s.set_filter(expr))
    }

    /// Whether the current record satisfies the filter.
    fn filter_match(&mut self) -> PyResult<bool> {
        self.with_resident(dbfkit_core::ActiveSession::filter_matches)
    }

    /// Drops the filter.
    fn clear_filter(&mut self) -> PyResult<()> {
        self.with_resident(|s| {
            s.clear_filter();
            Ok(())
        })
    }

    /// Orders the current table by a tag, or natural order.
    #[pyo3(signature = (tag=None))]
    fn set_order(&mut self, tag: Option<&str>) -> PyResult<()> {
        self.with_resident(|s| s.set_order(tag))
    }

    /// Adds a tag to the current table's production index.
    #[pyo3(signature = (name, expression, filter=None, descending=false, unique=false))]
    fn add_tag(
        &mut self,
        name: &str,
        expression: &str,
        filter: Option<&str>,
        descending: bool,
        unique: bool,
    ) -> PyResult<()> {
        let spec = TagSpec::new(name, expression)
            .filter(filter)
            .descending(descending)
            .unique(unique);
        self.with_resident(|s| s.add_tag(&spec).map(|_| ()))
    }

    /// Removes a tag from the current table's production index.
    fn remove_tag(&mut self, name: &str) -> PyResult<()> {
        self.with_resident(|s| s.remove_tag(name).map(|_| ()))
    }

    /// Builds a temporary index over the current table and selects it.
    #[pyo3(signature = (expression, filter=None, descending=false))]
    fn temp_index(
        &mut self,
        expression: &str,
        filter: Option<&str>,
        descending: bool,
    ) -> PyResult<TempIndex> {
        let request = TempIndexRequest {
            expression,
            filter,
            descending,
        };
        self.with_resident(|s| s.create_temp_index(None, &request))
            .map(|inner| TempIndex { inner })
    }

    /// Selects an open temporary index again.
    fn temp_index_select(&mut self, index: &TempIndex) -> PyResult<()> {
        self.with_resident(|s| s.select_temp_index(index.inner))
    }

    /// Closes a temporary index and deletes its file.
    fn temp_index_close(&mut self, index: &TempIndex) -> PyResult<()> {
        self.with_resident(|s| s.close_temp_index(index.inner))
    }

    /// Hides or shows soft-deleted records.
    fn set_deleted(&mut self, skip: bool) -> PyResult<()> {
        self.with_resident(|s| {
            s.set_skip_deleted(skip);
            Ok(())
        })
    }

    /// Sets the date format used for date seeks.
    fn set_date_format(&mut self, code: &str) -> PyResult<()> {
        self.with_resident(|s| s.set_date_format(code))
    }

    /// Sets the field delimiter.
    fn set_delimiter(&mut self, delimiter: &str) -> PyResult<()> {
        self.with_resident(|s| s.set_delimiter(delimiter))
    }

    /// Current record number, 0 at a boundary.
    #[getter]
    fn recno(&mut self) -> PyResult<u32> {
        self.with_resident(|s| s.record_number())
    }

    /// Records in the current table, deleted ones included.
    #[getter]
    fn reccount(&mut self) -> PyResult<u32> {
        self.with_resident(|s| s.record_count())
    }

    /// Whether the current record is soft-deleted.
    #[getter]
    fn deleted(&mut self) -> PyResult<bool> {
        self.with_resident(dbfkit_core::ActiveSession::is_deleted)
    }

    /// Reads a field of the current record.
    fn field(&mut self, name: &str) -> PyResult<FieldValue> {
        self.with_resident(|s| s.field_value(name)).map(FieldValue::from)
    }

    fn __repr__(&self) -> String {
        format!(
            "Registry(resident={:?}, active={:?})",
            self.inner.resident_id().map(|id| id.0),
            self.active_sessions()
        )
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    #[pyo3(signature = (_exc_type=None, _exc_val=None, _exc_tb=None))]
    fn __exit__(
        &mut self,
        _exc_type: Option<PyObject>,
        _exc_val: Option<PyObject>,
        _exc_tb: Option<PyObject>,
    ) -> PyResult<bool> {
        self.close_all()?;
        Ok(false)
    }
}

/// Python module initialization.
#[pymodule]
fn dbfkit(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();
    m.add_class::<Registry>()?;
    m.add_class::<TempIndex>()?;
    m.add("DbfError", py.get_type::<DbfError>())?;
    m.add("UsageError", py.get_type::<UsageError>())?;
    m.add("CapacityError", py.get_type::<CapacityError>())?;
    m.add("LockError", py.get_type::<LockError>())?;
    m.add("EngineError", py.get_type::<EngineError>())?;
    m.add("InvariantError", py.get_type::<InvariantError>())?;
    m.add_function(wrap_pyfunction!(version, m)?)?;
    Ok(())
}

/// Returns the dbfkit library version.
#[pyfunction]
fn version() -> &'static str {
    VERSION
}
