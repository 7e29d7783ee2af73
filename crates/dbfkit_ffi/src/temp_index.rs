//! Temporary index functions.
//!
//! A temp index id crosses the C boundary as one non-negative `i64`: the
//! session in bits 48..63, the slot generation in bits 16..47, the slot in
//! bits 0..15.

use crate::error::FAILURE;
use crate::state::{optional_str, required_str, unit_result, with_session};
use dbfkit_core::{CoreError, SessionId, TempIndexId, TempIndexRequest};
use std::ffi::c_char;

const GENERATION_MASK: i64 = 0xFFFF_FFFF;

fn encode(id: TempIndexId) -> i64 {
    (i64::from(id.session.0 & 0x7FFF) << 48)
        | (i64::from(id.generation) << 16)
        | i64::from(id.slot)
}

fn decode(raw: i64) -> Result<TempIndexId, CoreError> {
    if raw < 0 {
        return Err(CoreError::invalid_argument(format!(
            "{raw} is not a temporary index id"
        )));
    }
    Ok(TempIndexId {
        session: SessionId((raw >> 48) as u16),
        generation: ((raw >> 16) & GENERATION_MASK) as u32,
        slot: (raw & 0xFFFF) as u16,
    })
}

/// Builds a temporary index over the current table and makes it the
/// table's order.
///
/// # Returns
///
/// The temp index id, or -1.
///
/// # Safety
///
/// `expr` and `filter` must be null or valid null-terminated UTF-8 strings.
#[no_mangle]
pub unsafe extern "C" fn dbfkit_tempindex(
    expr: *const c_char,
    filter: *const c_char,
    descending: i32,
) -> i64 {
    let (Ok(expression), Ok(filter)) = (required_str(expr, "expression"), optional_str(filter))
    else {
        return i64::from(FAILURE);
    };
    let request = TempIndexRequest {
        expression,
        filter,
        descending: descending != 0,
    };
    with_session(|s| s.create_temp_index(None, &request)).map_or(i64::from(FAILURE), encode)
}

/// Makes a temporary index its table's order again.
#[no_mangle]
pub extern "C" fn dbfkit_tempindex_select(id: i64) -> i32 {
    unit_result(with_session(|s| s.select_temp_index(decode(id)?)))
}

/// Closes a temporary index and deletes its file. Closing twice succeeds.
#[no_mangle]
pub extern "C" fn dbfkit_tempindex_close(id: i64) -> i32 {
    unit_result(with_session(|s| s.close_temp_index(decode(id)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::dbfkit_last_error_code;
    use crate::state::test_support::exclusive;
    use crate::{
        dbfkit_close_all_sessions, dbfkit_close_table, dbfkit_goto, dbfkit_init, dbfkit_recno,
        dbfkit_switch, dbfkit_use,
    };
    use dbfkit_testkit::fixtures::cust_table;
    use std::ffi::CString;
    use tempfile::tempdir;

    #[test]
    fn ids_survive_the_boundary() {
        let id = TempIndexId {
            session: SessionId(9),
            slot: 31,
            generation: 70_000,
        };
        let raw = encode(id);
        assert!(raw >= 0);
        assert_eq!(decode(raw).unwrap(), id);
        assert!(decode(-1).is_err());
    }

    #[test]
    fn create_select_close() {
        let _guard = exclusive();
        let dir = tempdir().unwrap();
        let path = CString::new(cust_table(dir.path()).to_str().unwrap()).unwrap();
        let expr = CString::new("-BALANCE").unwrap();
        let top = CString::new("TOP").unwrap();
        dbfkit_init(0);
        unsafe {
            dbfkit_use(path.as_ptr(), std::ptr::null(), 0, 0);
            let id = dbfkit_tempindex(expr.as_ptr(), std::ptr::null(), 0);
            assert!(id >= 0);
            assert_eq!(dbfkit_goto(top.as_ptr(), 0), 1);
            assert_eq!(dbfkit_tempindex_select(id), 0);
            assert_eq!(dbfkit_tempindex_close(id), 0);
            assert_eq!(dbfkit_tempindex_close(id), 0);
            assert_eq!(dbfkit_tempindex_select(id), -1);
            assert_eq!(dbfkit_last_error_code(), 141);
            assert_eq!(dbfkit_close_table(std::ptr::null()), 0);
            assert_eq!(dbfkit_recno(), -1);
        }
        dbfkit_close_all_sessions();
    }

    #[test]
    fn foreign_ids_are_rejected() {
        let _guard = exclusive();
        let dir = tempdir().unwrap();
        let path = CString::new(cust_table(dir.path()).to_str().unwrap()).unwrap();
        let expr = CString::new("NAME").unwrap();
        let first = dbfkit_init(0);
        let id = unsafe {
            dbfkit_use(path.as_ptr(), std::ptr::null(), 0, 0);
            dbfkit_tempindex(expr.as_ptr(), std::ptr::null(), 1)
        };
        dbfkit_init(0);
        assert_eq!(dbfkit_tempindex_close(id), -1);
        assert_eq!(dbfkit_last_error_code(), 113);
        assert_eq!(dbfkit_switch(first), first);
        assert_eq!(dbfkit_tempindex_close(id), 0);
        dbfkit_close_all_sessions();
    }
}
