//! Status command implementation.

use super::{CommandResult, Options};
use dbfkit_core::{OpenOptions, SessionConfig, SessionRegistry, SessionSnapshot};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Runs the status command: opens every table in one session and prints its
/// snapshot.
pub fn run(out: &mut impl Write, options: &Options, tables: &[PathBuf], format: &str) -> CommandResult {
    let mut registry = SessionRegistry::new(SessionConfig::default());
    let id = registry.init(false)?;
    let session = registry.resident_mut()?;
    session.set_skip_deleted(options.skip_deleted);
    for table in tables {
        info!("Opening {:?}", table);
        session.open_table(
            table,
            None,
            OpenOptions::new().exclusive(options.exclusive).read_only(!options.exclusive),
        )?;
    }
    let snapshot = registry.snapshot(id)?;

    match format {
        "json" => writeln!(out, "{}", serde_json::to_string_pretty(&snapshot)?)?,
        _ => print_text_output(out, &snapshot)?,
    }
    Ok(())
}

fn print_text_output(out: &mut impl Write, snapshot: &SessionSnapshot) -> std::io::Result<()> {
    writeln!(out, "Session: {}", snapshot.id)?;
    writeln!(out, "Tables: {}", snapshot.tables.join(", "))?;
    writeln!(
        out,
        "Current: {} (record {})",
        snapshot.current_alias.as_deref().unwrap_or("-"),
        snapshot.recno
    )?;
    writeln!(out, "Skip deleted: {}", snapshot.skip_deleted)?;
    writeln!(out, "Exclusive: {}", snapshot.exclusive.join(", "))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfkit_testkit::fixtures::{cust_table, numbered_table};
    use tempfile::tempdir;

    #[test]
    fn json_snapshot_names_every_table() {
        let dir = tempdir().unwrap();
        let tables = vec![
            numbered_table(dir.path(), "nums", &[false]),
            cust_table(dir.path()),
        ];
        let options = Options {
            exclusive: true,
            ..Options::default()
        };
        let mut out = Vec::new();
        run(&mut out, &options, &tables, "json").unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["current_alias"], "CUST");
        assert_eq!(value["recno"], 1);
        assert_eq!(value["tables"].as_array().unwrap().len(), 2);
        assert_eq!(value["exclusive"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn missing_table_fails() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        let tables = vec![dir.path().join("absent.dbf")];
        assert!(run(&mut out, &Options::default(), &tables, "text").is_err());
    }
}
