//! The process-wide session registry and argument helpers.

use crate::error::{clear_last_error, record, set_last_error, ARGUMENT_CODE, FAILURE};
use dbfkit_core::{ActiveSession, CoreResult, SessionConfig, SessionRegistry};
use parking_lot::Mutex;
use std::ffi::{c_char, CStr};
use std::sync::LazyLock;
use tracing::debug;

/// Residency is global to the process, so there is one registry.
static REGISTRY: LazyLock<Mutex<SessionRegistry>> =
    LazyLock::new(|| Mutex::new(SessionRegistry::new(SessionConfig::default())));

/// Runs `f` against the registry, clearing the last error first and
/// recording any failure.
pub(crate) fn with_registry<T>(f: impl FnOnce(&mut SessionRegistry) -> CoreResult<T>) -> Option<T> {
    clear_last_error();
    let mut registry = REGISTRY.lock();
    match f(&mut registry) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(code = e.code(), error = %e, "call failed");
            record(&e);
            None
        }
    }
}

/// Runs `f` against the resident session.
pub(crate) fn with_session<T>(f: impl FnOnce(&mut ActiveSession) -> CoreResult<T>) -> Option<T> {
    with_registry(|registry| f(registry.resident_mut()?))
}

/// Borrows an optional C string; null and empty both read as `None`.
///
/// # Safety
///
/// `ptr` must be null or a valid null-terminated string.
pub(crate) unsafe fn optional_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, ()> {
    if ptr.is_null() {
        return Ok(None);
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok("") => Ok(None),
        Ok(s) => Ok(Some(s)),
        Err(_) => {
            clear_last_error();
            set_last_error("invalid UTF-8 in string argument", ARGUMENT_CODE);
            Err(())
        }
    }
}

/// Borrows a required C string.
///
/// # Safety
///
/// `ptr` must be null or a valid null-terminated string.
pub(crate) unsafe fn required_str<'a>(ptr: *const c_char, name: &str) -> Result<&'a str, ()> {
    match optional_str(ptr)? {
        Some(s) => Ok(s),
        None => {
            clear_last_error();
            set_last_error(format!("{name} is required"), ARGUMENT_CODE);
            Err(())
        }
    }
}

/// Maps a success value to the integer protocol.
pub(crate) fn int_result(value: Option<i32>) -> i32 {
    value.unwrap_or(FAILURE)
}

/// Maps a boolean to `1`/`0`, or `-1` on failure.
pub(crate) fn bool_result(value: Option<bool>) -> i32 {
    value.map_or(FAILURE, i32::from)
}

/// Maps a unit result to `0`, or `-1` on failure.
pub(crate) fn unit_result(value: Option<()>) -> i32 {
    value.map_or(FAILURE, |()| 0)
}

#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::{Mutex, MutexGuard};

    static SERIAL: Mutex<()> = Mutex::new(());

    /// Serializes tests that share the process-wide registry and leaves it
    /// empty for the next test.
    pub(crate) fn exclusive() -> MutexGuard<'static, ()> {
        let guard = SERIAL.lock();
        crate::dbfkit_close_all_sessions();
        guard
    }
}
