//! Session lifecycle functions.

use crate::state::{int_result, unit_result, with_registry};
use dbfkit_core::{CoreError, SessionId};

fn session_id(id: i32) -> Result<SessionId, CoreError> {
    u16::try_from(id)
        .map(SessionId)
        .map_err(|_| CoreError::InvalidSession {
            id: SessionId(u16::MAX),
        })
}

/// Starts a session and makes it resident.
///
/// # Returns
///
/// The session id, or -1 when every slot is taken.
#[no_mangle]
pub extern "C" fn dbfkit_init(large_tables: i32) -> i32 {
    int_result(with_registry(|r| r.init(large_tables != 0)).map(|id| i32::from(id.0)))
}

/// Makes a session resident.
///
/// # Returns
///
/// The session id, or -1 if it is not active.
#[no_mangle]
pub extern "C" fn dbfkit_switch(id: i32) -> i32 {
    int_result(with_registry(|r| r.switch(session_id(id)?)).map(|id| i32::from(id.0)))
}

/// Closes a session; a negative id closes the resident one.
///
/// The slot is freed even when teardown fails.
///
/// # Returns
///
/// The closed session id, or -1.
#[no_mangle]
pub extern "C" fn dbfkit_close_session(id: i32) -> i32 {
    let closed = with_registry(|r| {
        let target = if id < 0 { None } else { Some(session_id(id)?) };
        r.close(target)
    });
    int_result(closed.map(|id| i32::from(id.0)))
}

/// Closes every session.
///
/// # Returns
///
/// 0, or -1 if any teardown failed.
#[no_mangle]
pub extern "C" fn dbfkit_close_all_sessions() -> i32 {
    unit_result(with_registry(|r| r.close_all_sessions()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::dbfkit_last_error_code;
    use crate::state::test_support::exclusive;

    #[test]
    fn init_close_round_trip() {
        let _guard = exclusive();
        let id = dbfkit_init(0);
        assert!(id >= 0);
        assert_eq!(dbfkit_close_session(-1), id);
        assert_eq!(dbfkit_close_session(-1), -1);
        assert_eq!(dbfkit_last_error_code(), 102);
    }

    #[test]
    fn switch_validates_ids() {
        let _guard = exclusive();
        let a = dbfkit_init(0);
        let b = dbfkit_init(1);
        assert_eq!(dbfkit_switch(a), a);
        assert_eq!(dbfkit_last_error_code(), 0);
        assert_eq!(dbfkit_switch(-3), -1);
        assert_eq!(dbfkit_last_error_code(), 100);
        assert_eq!(dbfkit_close_session(b), b);
        assert_eq!(dbfkit_switch(b), -1);
        assert_eq!(dbfkit_close_all_sessions(), 0);
    }
}
