//! Identifiers and small value types.

use crate::error::{CoreError, CoreResult};
use dbfkit_engine::TableHandle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u16);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open table, tagged with the session that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    /// Owning session.
    pub session: SessionId,
    /// Engine handle within that session.
    pub handle: TableHandle,
}

/// A temporary index, tagged with the session that created it.
///
/// The generation distinguishes successive occupants of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempIndexId {
    /// Owning session.
    pub session: SessionId,
    /// Pool slot.
    pub slot: u16,
    /// Slot generation at creation.
    pub generation: u32,
}

/// Where [`goto`](crate::ActiveSession::goto) moves the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoTarget {
    /// First record in the current order.
    Top,
    /// Last record in the current order.
    Bottom,
    /// One record forward.
    Next,
    /// One record back.
    Previous,
    /// `n` records; zero means one.
    Skip(i64),
    /// A physical record number, deleted or not.
    Record(u32),
}

impl GotoTarget {
    /// Parses a navigation verb. Only the first letter counts, in any case.
    pub fn from_verb(verb: &str, count: i64) -> CoreResult<Self> {
        let first = verb
            .trim()
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase());
        match first {
            Some('T') => Ok(Self::Top),
            Some('B') => Ok(Self::Bottom),
            Some('N') => Ok(Self::Next),
            Some('P') => Ok(Self::Previous),
            Some('S') => Ok(Self::Skip(count)),
            Some('R') => {
                let recno = u32::try_from(count).map_err(|_| {
                    CoreError::invalid_argument(format!("record number {count} is out of range"))
                })?;
                Ok(Self::Record(recno))
            }
            _ => Err(CoreError::InvalidVerb {
                verb: verb.to_string(),
            }),
        }
    }
}

/// Access mode for opening a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOptions {
    /// Deny all other openers. Implies read-write.
    pub exclusive: bool,
    /// Open without write access.
    pub read_only: bool,
    /// Sync every write.
    pub no_buffering: bool,
}

impl OpenOptions {
    /// Shared read-write access.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            exclusive: false,
            read_only: false,
            no_buffering: false,
        }
    }

    /// Sets exclusive access.
    #[must_use]
    pub const fn exclusive(mut self, value: bool) -> Self {
        self.exclusive = value;
        self
    }

    /// Sets read-only access.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets unbuffered writes.
    #[must_use]
    pub const fn no_buffering(mut self, value: bool) -> Self {
        self.no_buffering = value;
        self
    }
}
