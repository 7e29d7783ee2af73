//! Table open, select, and close functions.

use crate::error::FAILURE;
use crate::state::{
    bool_result, int_result, optional_str, required_str, unit_result, with_session,
};
use dbfkit_core::{OpenOptions, TableId};
use std::ffi::c_char;
use std::path::Path;

fn handle(id: TableId) -> i32 {
    id.handle.0 as i32
}

/// Opens a table in shared mode and makes it current.
///
/// An alias that is already bound replaces the bound table. A null or empty
/// alias derives one from the file name.
///
/// # Returns
///
/// The table handle, or -1.
///
/// # Safety
///
/// `path` and `alias` must be null or valid null-terminated UTF-8 strings.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_use(
    path: *const c_char,
    alias: *const c_char,
    read_only: i32,
    no_buffering: i32,
) -> i32 {
    let (Ok(path), Ok(alias)) = (required_str(path, "path"), optional_str(alias)) else {
        return FAILURE;
    };
    let options = OpenOptions::new()
        .read_only(read_only != 0)
        .no_buffering(no_buffering != 0);
    int_result(with_session(|s| s.open_table(Path::new(path), alias, options)).map(handle))
}

/// Opens a table exclusively and makes it current.
///
/// # Returns
///
/// The table handle, or -1.
///
/// # Safety
///
/// `path` and `alias` must be null or valid null-terminated UTF-8 strings.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_use_exclusive(path: *const c_char, alias: *const c_char) -> i32 {
    let (Ok(path), Ok(alias)) = (required_str(path, "path"), optional_str(alias)) else {
        return FAILURE;
    };
    let options = OpenOptions::new().exclusive(true);
    int_result(with_session(|s| s.open_table(Path::new(path), alias, options)).map(handle))
}

/// Makes an open table current.
///
/// # Returns
///
/// The table handle, or -1.
///
/// # Safety
///
/// `alias` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_select(alias: *const c_char) -> i32 {
    let Ok(alias) = required_str(alias, "alias") else {
        return FAILURE;
    };
    int_result(with_session(|s| s.select(alias)).map(handle))
}

/// Closes a table; null closes the current one.
///
/// # Safety
///
/// `alias` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_close_table(alias: *const c_char) -> i32 {
    let Ok(alias) = optional_str(alias) else {
        return FAILURE;
    };
    unit_result(with_session(|s| s.close_table(alias)))
}

/// Closes every table of the resident session.
#[no_mangle]
pub extern "C" fn dbfkit_close_all_tables() -> i32 {
    unit_result(with_session(|s| s.close_all_tables()))
}

/// Orders the current table by a tag; null selects natural order.
///
/// # Safety
///
/// `tag` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_set_order(tag: *const c_char) -> i32 {
    let Ok(tag) = optional_str(tag) else {
        return FAILURE;
    };
    unit_result(with_session(|s| s.set_order(tag)))
}

/// Current record number, 0 at a boundary.
#[no_mangle]
pub extern "C" fn dbfkit_recno() -> i64 {
    with_session(|s| s.record_number()).map_or(i64::from(FAILURE), i64::from)
}

/// Records in the current table, deleted ones included.
#[no_mangle]
pub extern "C" fn dbfkit_reccount() -> i64 {
    with_session(|s| s.record_count()).map_or(i64::from(FAILURE), i64::from)
}

/// Whether the current record is soft-deleted.
#[no_mangle]
pub extern "C" fn dbfkit_deleted() -> i32 {
    bool_result(with_session(|s| s.is_deleted()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::dbfkit_last_error_code;
    use crate::state::test_support::exclusive;
    use crate::{dbfkit_close_all_sessions, dbfkit_init};
    use dbfkit_testkit::fixtures::cust_table;
    use std::ffi::CString;
    use tempfile::tempdir;

    #[test]
    fn use_select_close() {
        let _guard = exclusive();
        let dir = tempdir().unwrap();
        let path = CString::new(cust_table(dir.path()).to_str().unwrap()).unwrap();
        let alias = CString::new("C1").unwrap();
        dbfkit_init(0);
        unsafe {
            assert!(dbfkit_use(path.as_ptr(), alias.as_ptr(), 0, 0) > 0);
            assert_eq!(dbfkit_recno(), 1);
            assert_eq!(dbfkit_reccount(), 3);
            assert_eq!(dbfkit_deleted(), 0);
            assert!(dbfkit_select(alias.as_ptr()) > 0);
            let missing = CString::new("NOPE").unwrap();
            assert_eq!(dbfkit_select(missing.as_ptr()), -1);
            assert_eq!(dbfkit_last_error_code(), 110);
            assert_eq!(dbfkit_close_table(std::ptr::null()), 0);
            assert_eq!(dbfkit_recno(), -1);
            assert_eq!(dbfkit_last_error_code(), 111);
            assert_eq!(dbfkit_use(std::ptr::null(), std::ptr::null(), 0, 0), -1);
            assert_eq!(dbfkit_last_error_code(), 199);
        }
        dbfkit_close_all_sessions();
    }

    #[test]
    fn calls_without_a_session_fail() {
        let _guard = exclusive();
        assert_eq!(dbfkit_close_all_tables(), -1);
        assert_eq!(dbfkit_last_error_code(), 102);
    }
}
