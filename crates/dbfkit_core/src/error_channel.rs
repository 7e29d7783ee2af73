//! Last-error side channel.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Longest message kept, in bytes.
pub const MAX_MESSAGE_LEN: usize = 255;

/// The message and code of the most recent failure, empty after a success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    message: String,
    code: i32,
}

impl LastError {
    /// Resets to the empty state.
    pub fn clear(&mut self) {
        self.message.clear();
        self.code = 0;
    }

    /// Records a failure.
    pub fn record(&mut self, err: &CoreError) {
        self.set(err.to_string(), err.code());
    }

    /// Records a raw message and code.
    pub fn set(&mut self, message: impl Into<String>, code: i32) {
        let mut message = message.into();
        if message.len() > MAX_MESSAGE_LEN {
            let mut end = MAX_MESSAGE_LEN;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        self.message = message;
        self.code = code;
    }

    /// Message of the last failure; empty if the last operation succeeded.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Code of the last failure; zero if the last operation succeeded.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Returns true if no failure is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code == 0 && self.message.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_clear() {
        let mut channel = LastError::default();
        assert!(channel.is_empty());
        channel.record(&CoreError::NoActiveLocate);
        assert_eq!(channel.code(), 150);
        assert_eq!(channel.message(), "no active locate");
        channel.clear();
        assert!(channel.is_empty());
    }

    #[test]
    fn messages_are_bounded_on_char_boundaries() {
        let mut channel = LastError::default();
        channel.set("é".repeat(200), 1);
        assert!(channel.message().len() <= MAX_MESSAGE_LEN);
        assert!(channel.message().chars().all(|c| c == 'é'));
    }
}
