//! Sort command implementation.

use super::{open, write_record, CommandResult, Options};
use dbfkit_core::{GotoTarget, TempIndexRequest};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Runs the sort command: builds a temporary index, walks it, then drops it.
pub fn run(
    out: &mut impl Write,
    options: &Options,
    table: &Path,
    expression: &str,
    filter: Option<&str>,
    descending: bool,
) -> CommandResult {
    info!("Sorting {:?} by {:?}", table, expression);
    let (mut registry, id) = open(options, table)?;
    let session = registry.resident_mut()?;
    let fields: Vec<String> = session
        .table_info(id)?
        .fields
        .into_iter()
        .map(|f| f.name)
        .collect();

    let index = session.create_temp_index(
        Some(id),
        &TempIndexRequest {
            expression,
            filter,
            descending,
        },
    )?;
    let mut recno = session.goto(GotoTarget::Top)?;
    while recno != 0 {
        write_record(out, session, &fields)?;
        recno = session.goto(GotoTarget::Next)?;
    }
    session.close_temp_index(index)?;
    Ok(())
}
