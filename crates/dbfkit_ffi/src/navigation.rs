//! Navigation, query, and per-session setting functions.

use crate::error::FAILURE;
use crate::state::{bool_result, optional_str, required_str, unit_result, with_session};
use dbfkit_core::GotoTarget;
use std::ffi::c_char;

/// Moves the current table.
///
/// `verb` is read by its first letter, in any case: `T`op, `B`ottom,
/// `N`ext, `P`revious, `S`kip `count` records, or `R`ecord number `count`.
///
/// # Returns
///
/// The landing record number, 0 at a boundary, or -1.
///
/// # Safety
///
/// `verb` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_goto(verb: *const c_char, count: i64) -> i64 {
    let Ok(verb) = required_str(verb, "verb") else {
        return i64::from(FAILURE);
    };
    with_session(|s| {
        let target = GotoTarget::from_verb(verb, count)?;
        s.goto(target)
    })
    .map_or(i64::from(FAILURE), i64::from)
}

/// Seeks `value` in a tag. Null `alias` means the current table, null `tag`
/// its selected order.
///
/// # Returns
///
/// 1 if found, 0 if not, -1 on failure.
///
/// # Safety
///
/// Every argument must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_seek(
    value: *const c_char,
    alias: *const c_char,
    tag: *const c_char,
) -> i32 {
    let (Ok(value), Ok(alias), Ok(tag)) = (optional_str(value), optional_str(alias), optional_str(tag))
    else {
        return FAILURE;
    };
    bool_result(with_session(|s| s.seek(value.unwrap_or(""), alias, tag)))
}

/// Starts a LOCATE over the current table.
///
/// # Returns
///
/// 1 if a record matched, 0 if not, -1 on failure.
///
/// # Safety
///
/// `expr` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_locate(expr: *const c_char) -> i32 {
    let Ok(expr) = required_str(expr, "expression") else {
        return FAILURE;
    };
    bool_result(with_session(|s| s.locate(expr)))
}

/// Continues the active LOCATE.
#[no_mangle]
pub extern "C" fn dbfkit_continue() -> i32 {
    bool_result(with_session(|s| s.continue_locate()))
}

/// Releases the LOCATE cursor. Succeeds when none is held.
#[no_mangle]
pub extern "C" fn dbfkit_clear_locate() -> i32 {
    unit_result(with_session(|s| {
        s.clear_locate();
        Ok(())
    }))
}

/// Compiles a filter against the current table.
///
/// # Safety
///
/// `expr` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_set_filter(expr: *const c_char) -> i32 {
    let Ok(expr) = required_str(expr, "expression") else {
        return FAILURE;
    };
    unit_result(with_session(|s| s.set_filter(expr)))
}

/// Evaluates the filter on the current record.
#[no_mangle]
pub extern "C" fn dbfkit_filter_match() -> i32 {
    bool_result(with_session(|s| s.filter_matches()))
}

/// Releases the filter. Succeeds when none is set.
#[no_mangle]
pub extern "C" fn dbfkit_clear_filter() -> i32 {
    unit_result(with_session(|s| {
        s.clear_filter();
        Ok(())
    }))
}

/// Hides (non-zero) or shows soft-deleted records during navigation.
#[no_mangle]
pub extern "C" fn dbfkit_set_deleted(hide: i32) -> i32 {
    unit_result(with_session(|s| {
        s.set_skip_deleted(hide != 0);
        Ok(())
    }))
}

/// Sets the date format used to read date seek values.
///
/// # Safety
///
/// `code` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_set_date_format(code: *const c_char) -> i32 {
    let Ok(code) = required_str(code, "date format") else {
        return FAILURE;
    };
    unit_result(with_session(|s| s.set_date_format(code)))
}

/// Sets the import/export field delimiter.
///
/// # Safety
///
/// `delimiter` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_set_delimiter(delimiter: *const c_char) -> i32 {
    let Ok(delimiter) = required_str(delimiter, "delimiter") else {
        return FAILURE;
    };
    unit_result(with_session(|s| s.set_delimiter(delimiter)))
}
