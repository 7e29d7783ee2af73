//! # dbfkit FFI
//!
//! Flat C ABI over the dbfkit session engine.
//!
//! This crate provides:
//! - One process-wide session registry; calls act on the resident session
//! - One function per operation, taking scalars and C strings
//! - Sentinel results: `-1` on failure, booleans as `1`/`0`
//! - `dbfkit_last_error` / `dbfkit_last_error_code`, cleared by every call
//!
//! Strings returned to C are owned by this library and stay valid until the
//! next call on the same thread.

#![warn(missing_docs)]

mod error;
mod navigation;
mod session;
mod state;
mod table;
mod temp_index;

use std::ffi::c_char;

pub use error::{dbfkit_last_error, dbfkit_last_error_code, ARGUMENT_CODE, FAILURE};
pub use navigation::{
    dbfkit_clear_filter, dbfkit_clear_locate, dbfkit_continue, dbfkit_filter_match, dbfkit_goto,
    dbfkit_locate, dbfkit_seek, dbfkit_set_date_format, dbfkit_set_deleted,
    dbfkit_set_delimiter, dbfkit_set_filter,
};
pub use session::{dbfkit_close_all_sessions, dbfkit_close_session, dbfkit_init, dbfkit_switch};
pub use table::{
    dbfkit_close_all_tables, dbfkit_close_table, dbfkit_deleted, dbfkit_reccount, dbfkit_recno,
    dbfkit_select, dbfkit_set_order, dbfkit_use, dbfkit_use_exclusive,
};
pub use temp_index::{dbfkit_tempindex, dbfkit_tempindex_close, dbfkit_tempindex_select};

/// Library version as a static C string.
#[no_mangle]
pub extern "C" fn dbfkit_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr().cast()
}
