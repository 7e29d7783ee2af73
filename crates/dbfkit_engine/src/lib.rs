//! # dbfkit Engine
//!
//! The single-handle table engine that dbfkit sessions are built on.
//!
//! An engine handle owns open tables, their index files, and compiled
//! expressions. It has no notion of sessions: one handle is one workspace.
//!
//! ## Design Principles
//!
//! - [`Engine`] is the seam; sessions only ever talk to `Box<dyn Engine>`
//! - Handles are small opaque integers, valid only on the engine that issued them
//! - Every call blocks; nothing is shared between handles except file locks
//!
//! ## Available Engines
//!
//! - [`FileEngine`] - dBASE III / FoxPro tables with `.dbi` index files
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbfkit_engine::{Engine, EngineSettings, FileEngine, OpenRequest};
//!
//! let mut engine = FileEngine::new(EngineSettings::default());
//! let cust = engine.open_table(&OpenRequest::new("cust.dbf", "CUST"))?;
//! while !engine.position(cust)?.eof {
//!     println!("{}", engine.field_value(cust, "NAME")?);
//!     engine.skip(cust, 1)?;
//! }
//! # Ok::<(), dbfkit_engine::EngineError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dbf;
mod engine;
mod error;
mod expr;
mod file;
mod index;
mod lock;
mod value;

pub use dbf::{create_table, resolve_table_path, NewRecord};
pub use engine::{
    Compatibility, Engine, EngineSettings, ExprHandle, IndexHandle, OpenRequest, Position,
    SeekOutcome, TableHandle, TableInfo, TagHandle, TagInfo,
};
pub use error::{EngineError, EngineResult, LOCKED_CODE};
pub use expr::{Expr, RecordContext};
pub use file::{production_index_path, FileEngine};
pub use index::{Key, KeyKind, SeekKey, TagSpec, INDEX_EXTENSION, TAG_NAME_LEN};
pub use value::{FieldDef, FieldType, Value, FIELD_NAME_LEN};
