//! Locate command implementation.

use super::{open, CommandResult, Options};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Runs the locate command: LOCATE, then CONTINUE until no match remains.
pub fn run(out: &mut impl Write, options: &Options, table: &Path, expression: &str) -> CommandResult {
    info!("Locating {:?} in {:?}", expression, table);
    let (mut registry, _) = open(options, table)?;
    let session = registry.resident_mut()?;

    let mut matches = 0usize;
    let mut found = session.locate(expression)?;
    while found {
        writeln!(out, "{}", session.record_number()?)?;
        matches += 1;
        found = session.continue_locate()?;
    }
    session.clear_locate();
    info!("{} matching records", matches);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfkit_testkit::fixtures::cust_table;
    use tempfile::tempdir;

    fn locate(options: &Options, expression: &str) -> String {
        let dir = tempdir().unwrap();
        let path = cust_table(dir.path());
        let mut out = Vec::new();
        run(&mut out, options, &path, expression).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_each_match() {
        assert_eq!(locate(&Options::default(), "BALANCE > 0"), "1\n2\n3\n");
        let hidden = Options {
            skip_deleted: true,
            ..Options::default()
        };
        assert_eq!(locate(&hidden, "BALANCE > 0"), "1\n3\n");
        assert_eq!(locate(&hidden, "NAME = 'ZED'"), "");
    }

    #[test]
    fn bad_expression_is_an_error() {
        let dir = tempdir().unwrap();
        let path = cust_table(dir.path());
        let mut out = Vec::new();
        assert!(run(&mut out, &Options::default(), &path, "BALANCE >").is_err());
    }
}
