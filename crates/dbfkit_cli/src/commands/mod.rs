//! CLI command implementations.

pub mod inspect;
pub mod list;
pub mod locate;
pub mod seek;
pub mod sort;
pub mod status;
pub mod tag;

use dbfkit_core::{OpenOptions, SessionConfig, SessionRegistry, TableId};
use std::path::Path;
use tracing::debug;

/// Result type shared by the commands.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Flags common to every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Hide deleted records.
    pub skip_deleted: bool,
    /// Open tables exclusively.
    pub exclusive: bool,
}

/// Starts a one-session registry and opens `table` in it.
pub fn open(options: &Options, table: &Path) -> Result<(SessionRegistry, TableId), Box<dyn std::error::Error>> {
    let mut registry = SessionRegistry::new(SessionConfig::default());
    registry.init(false)?;
    let session = registry.resident_mut()?;
    session.set_skip_deleted(options.skip_deleted);
    let id = session.open_table(
        table,
        None,
        OpenOptions::new().exclusive(options.exclusive).read_only(!options.exclusive),
    )?;
    debug!("Opened {:?} as {:?}", table, id);
    Ok((registry, id))
}

/// Writes the current record as `recno` followed by each field, trimmed and
/// joined by the session delimiter.
pub fn write_record(
    out: &mut impl std::io::Write,
    session: &mut dbfkit_core::ActiveSession,
    fields: &[String],
) -> CommandResult {
    let mut line = session.record_number()?.to_string();
    let delimiter = session.delimiter().to_string();
    for field in fields {
        line.push_str(&delimiter);
        line.push_str(&session.field_value(field)?.to_string());
    }
    if session.is_deleted()? {
        line.push_str(&delimiter);
        line.push('*');
    }
    writeln!(out, "{line}")?;
    Ok(())
}
