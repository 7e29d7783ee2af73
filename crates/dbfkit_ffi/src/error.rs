//! Last-error side channel for C callers.

use dbfkit_core::CoreError;
use std::cell::RefCell;
use std::ffi::{c_char, CString};

/// Returned by integer functions on failure.
pub const FAILURE: i32 = -1;

/// Code reported for malformed arguments that never reach a session.
pub const ARGUMENT_CODE: i32 = 199;

struct Recorded {
    message: CString,
    code: i32,
}

// Thread-local storage for last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<Recorded>> = const { RefCell::new(None) };
}

/// Sets the last error message and code.
pub fn set_last_error(message: impl Into<String>, code: i32) {
    let mut message = message.into();
    message.retain(|c| c != '\0');
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(message)
            .ok()
            .map(|message| Recorded { message, code });
    });
}

/// Records a core error.
pub fn record(err: &CoreError) {
    set_last_error(err.to_string(), err.code());
}

/// Clears the last error.
pub fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Gets the last error message as a C string.
///
/// Returns an empty string if the last call succeeded.
///
/// # Safety
///
/// The returned pointer is valid until the next FFI call on this thread.
#[no_mangle]
pub extern "C" fn dbfkit_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(recorded) => recorded.message.as_ptr(),
        None => c"".as_ptr(),
    })
}

/// Gets the last error code, 0 if the last call succeeded.
#[no_mangle]
pub extern "C" fn dbfkit_last_error_code() -> i32 {
    LAST_ERROR.with(|e| e.borrow().as_ref().map_or(0, |recorded| recorded.code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn last_error() {
        clear_last_error();
        assert_eq!(dbfkit_last_error_code(), 0);
        // Safety: the pointer is valid until the next call on this thread
        let empty = unsafe { CStr::from_ptr(dbfkit_last_error()) };
        assert!(empty.to_bytes().is_empty());

        record(&CoreError::NoActiveLocate);
        assert_eq!(dbfkit_last_error_code(), 150);
        let msg = unsafe { CStr::from_ptr(dbfkit_last_error()) };
        assert!(!msg.to_bytes().is_empty());

        set_last_error("embedded\0nul", ARGUMENT_CODE);
        let msg = unsafe { CStr::from_ptr(dbfkit_last_error()) };
        assert_eq!(msg.to_str().unwrap(), "embeddednul");

        clear_last_error();
        assert_eq!(dbfkit_last_error_code(), 0);
    }
}
