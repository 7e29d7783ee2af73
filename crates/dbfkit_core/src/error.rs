//! Error types for session operations.

use crate::types::SessionId;
use dbfkit_engine::EngineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for session operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Broad classes of failure, as reported to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad parameters, out-of-range ids, or missing selection.
    Usage,
    /// A bounded pool or registry is full.
    Capacity,
    /// The engine reported a failure.
    Engine,
    /// A lock could not be obtained after the engine's retries.
    Lock,
    /// The engine reported success but a dependent lookup failed.
    Invariant,
}

/// Errors that can occur in session operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Session id out of range, or not active where activity is required.
    #[error("invalid session {id}")]
    InvalidSession {
        /// The id supplied.
        id: SessionId,
    },

    /// The session slot exists but holds no session.
    #[error("session {id} is not active")]
    SessionNotActive {
        /// The id supplied.
        id: SessionId,
    },

    /// No session is resident.
    #[error("no session is resident")]
    NoResidentSession,

    /// No open table has the alias.
    #[error("alias not found: {alias}")]
    AliasNotFound {
        /// Alias looked up.
        alias: String,
    },

    /// The operation needs a current table and there is none.
    #[error("no table is selected")]
    NoCurrentTable,

    /// Alias exceeds the configured length.
    #[error("alias '{alias}' is longer than {max} characters")]
    AliasTooLong {
        /// Alias supplied.
        alias: String,
        /// Configured maximum.
        max: usize,
    },

    /// Alias is not a name: it must start with a letter or `_` and hold only
    /// letters, digits, and `_`.
    #[error("'{alias}' is not a legal alias")]
    IllegalAlias {
        /// Alias supplied.
        alias: String,
    },

    /// A handle issued by one session was used in another.
    #[error("handle belongs to session {owner}, not {current}")]
    ForeignHandle {
        /// Session that issued the handle.
        owner: SessionId,
        /// Session it was used in.
        current: SessionId,
    },

    /// A table handle no longer refers to an open table.
    #[error("table handle {handle} is no longer open")]
    StaleTable {
        /// Raw handle.
        handle: u32,
    },

    /// Direct record access outside the live record range.
    #[error("record {recno} is outside 1..={count}")]
    RecordOutOfRange {
        /// Requested record.
        recno: u32,
        /// Records in the table.
        count: u32,
    },

    /// Navigation verb not recognized.
    #[error("unknown navigation verb '{verb}'")]
    InvalidVerb {
        /// Verb supplied.
        verb: String,
    },

    /// Seek without a tag on a table with no selected tag.
    #[error("{alias} has no index order to seek on")]
    NoIndex {
        /// Alias of the table.
        alias: String,
    },

    /// No tag has the name.
    #[error("tag not found: {name}")]
    TagNotFound {
        /// Tag name looked up.
        name: String,
    },

    /// Temp index slot outside the pool.
    #[error("temporary index slot {slot} is out of range")]
    TempIndexOutOfRange {
        /// Slot supplied.
        slot: u16,
    },

    /// Temp index already closed.
    #[error("temporary index {slot} is closed")]
    TempIndexClosed {
        /// Slot supplied.
        slot: u16,
    },

    /// `continue` without a prior `locate`.
    #[error("no active locate")]
    NoActiveLocate,

    /// Filter evaluation without a filter.
    #[error("no active filter")]
    NoActiveFilter,

    /// The operation restructures a table and needs it open exclusively.
    #[error("{alias} must be opened exclusively")]
    ExclusiveRequired {
        /// Alias of the table.
        alias: String,
    },

    /// A parameter was rejected.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// Every session slot is in use.
    #[error("no available session slots (capacity {capacity})")]
    NoAvailableSlots {
        /// Slot capacity.
        capacity: usize,
    },

    /// Every temp index slot is in use.
    #[error("temporary index pool is full (capacity {capacity})")]
    TempIndexPoolFull {
        /// Pool capacity.
        capacity: usize,
    },

    /// The exclusive-open registry is at capacity.
    #[error("exclusive-open registry is full (capacity {capacity})")]
    ExclusiveRegistryFull {
        /// Registry capacity.
        capacity: usize,
    },

    /// A lock could not be acquired.
    #[error("{0}")]
    LockConflict(#[source] EngineError),

    /// A write would duplicate a unique key.
    #[error("{0}")]
    UniqueKey(#[source] EngineError),

    /// A record position or value was rejected.
    #[error("{0}")]
    RecordEntry(#[source] EngineError),

    /// An expression failed to compile or evaluate.
    #[error("{0}")]
    Parse(#[source] EngineError),

    /// Any other engine failure.
    #[error("{0}")]
    Engine(#[source] EngineError),

    /// A temp index was created but its tag could not be found.
    #[error("temporary index created but tag {tag} is missing; rolled back")]
    PostCreateTagMissing {
        /// Tag name that was created.
        tag: String,
    },

    /// An open temp index lost its tag.
    #[error("temporary index {slot} has no tag {tag}")]
    TempIndexTagMissing {
        /// Pool slot.
        slot: u16,
        /// Tag name.
        tag: String,
    },

    /// Session teardown failed; the slot was reclaimed anyway.
    #[error("teardown of session {session} failed: {source}")]
    Teardown {
        /// Session torn down.
        session: SessionId,
        /// First failure during teardown.
        source: Box<CoreError>,
    },
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Locked { .. } => Self::LockConflict(err),
            EngineError::Unique { .. } => Self::UniqueKey(err),
            EngineError::Entry { .. } => Self::RecordEntry(err),
            EngineError::Expression { .. } => Self::Parse(err),
            other => Self::Engine(other),
        }
    }
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an alias-not-found error.
    pub fn alias_not_found(alias: &str) -> Self {
        Self::AliasNotFound {
            alias: alias.to_string(),
        }
    }

    /// Returns the class of the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoAvailableSlots { .. }
            | Self::TempIndexPoolFull { .. }
            | Self::ExclusiveRegistryFull { .. } => ErrorKind::Capacity,
            Self::LockConflict(_) => ErrorKind::Lock,
            Self::UniqueKey(_) | Self::RecordEntry(_) | Self::Parse(_) | Self::Engine(_) => {
                ErrorKind::Engine
            }
            Self::PostCreateTagMissing { .. } | Self::TempIndexTagMissing { .. } => {
                ErrorKind::Invariant
            }
            Self::Teardown { source, .. } => source.kind(),
            _ => ErrorKind::Usage,
        }
    }

    /// Returns the numeric code reported through the last-error channel.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidSession { .. } => 100,
            Self::SessionNotActive { .. } => 101,
            Self::NoResidentSession => 102,
            Self::AliasNotFound { .. } => 110,
            Self::NoCurrentTable => 111,
            Self::AliasTooLong { .. } => 112,
            Self::ForeignHandle { .. } => 113,
            Self::StaleTable { .. } => 114,
            Self::IllegalAlias { .. } => 115,
            Self::RecordOutOfRange { .. } => 120,
            Self::InvalidVerb { .. } => 121,
            Self::NoIndex { .. } => 130,
            Self::TagNotFound { .. } => 131,
            Self::TempIndexOutOfRange { .. } => 140,
            Self::TempIndexClosed { .. } => 141,
            Self::NoActiveLocate => 150,
            Self::NoActiveFilter => 151,
            Self::ExclusiveRequired { .. } => 160,
            Self::InvalidArgument { .. } => 199,
            Self::NoAvailableSlots { .. } => 200,
            Self::TempIndexPoolFull { .. } => 201,
            Self::ExclusiveRegistryFull { .. } => 202,
            Self::LockConflict(e)
            | Self::UniqueKey(e)
            | Self::RecordEntry(e)
            | Self::Parse(e)
            | Self::Engine(e) => e.code(),
            Self::PostCreateTagMissing { .. } => 900,
            Self::TempIndexTagMissing { .. } => 901,
            Self::Teardown { source, .. } => source.code(),
        }
    }
}
