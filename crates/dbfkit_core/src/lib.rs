//! # dbfkit Core
//!
//! Session engine for dbfkit.
//!
//! An engine handle serves one workspace. This crate multiplexes a fixed
//! number of logical sessions over such handles, each with its own current
//! table, navigation cursor, LOCATE cursor, filter, exclusive-open registry,
//! and pool of temporary indexes.
//!
//! ## Design Principles
//!
//! - One session is resident at a time; the rest are parked as checkpoints
//! - Every handle given out is tagged with its session
//! - Failures return `Err` and also land in the session's last-error channel
//! - Teardown is best-effort: the first error is reported, cleanup continues
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbfkit_core::{GotoTarget, OpenOptions, SessionConfig, SessionRegistry};
//! use std::path::Path;
//!
//! let mut registry = SessionRegistry::new(SessionConfig::default());
//! registry.init(false)?;
//! let session = registry.resident_mut()?;
//! session.open_table(Path::new("cust.dbf"), None, OpenOptions::new())?;
//! session.set_skip_deleted(true);
//! if session.locate("BALANCE > 0")? {
//!     println!("first match at {}", session.record_number()?);
//! }
//! session.goto(GotoTarget::Bottom)?;
//! # Ok::<(), dbfkit_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod alias;
mod config;
mod date_format;
mod error;
mod error_channel;
mod exclusive;
mod navigation;
mod query;
mod registry;
mod session;
mod table;
mod temp_index;
mod types;

pub use alias::{default_alias, is_legal_alias, random_name};
pub use config::SessionConfig;
pub use date_format::DateFormat;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use error_channel::{LastError, MAX_MESSAGE_LEN};
pub use exclusive::ExclusiveRegistry;
pub use registry::{EngineFactory, SessionRegistry};
pub use session::{ActiveSession, SessionCheckpoint, SessionSnapshot, SessionState, DEFAULT_DELIMITER};
pub use temp_index::{TempIndexPool, TempIndexRequest};
pub use types::{GotoTarget, OpenOptions, SessionId, TableId, TempIndexId};

pub use dbfkit_engine;
