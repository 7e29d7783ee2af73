//! Seek command implementation.

use super::{open, write_record, CommandResult, Options};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Runs the seek command.
pub fn run(
    out: &mut impl Write,
    options: &Options,
    table: &Path,
    key: &str,
    tag: Option<&str>,
    date_format: Option<&str>,
) -> CommandResult {
    info!("Seeking {:?} in {:?}", key, table);
    let (mut registry, id) = open(options, table)?;
    let session = registry.resident_mut()?;
    if let Some(code) = date_format {
        session.set_date_format(code)?;
    }

    if session.seek(key, None, tag)? {
        let fields: Vec<String> = session
            .table_info(id)?
            .fields
            .into_iter()
            .map(|f| f.name)
            .collect();
        write_record(out, session, &fields)?;
    } else {
        writeln!(out, "not found")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfkit_core::OpenOptions;
    use dbfkit_engine::TagSpec;
    use dbfkit_testkit::fixtures::{cust_table, TestRegistry};
    use std::path::PathBuf;

    fn indexed_cust(harness: &mut TestRegistry) -> PathBuf {
        let path = cust_table(harness.dir());
        let session = harness.session();
        session
            .open_table(&path, None, OpenOptions::new().exclusive(true))
            .unwrap();
        session.add_tag(&TagSpec::new("NAME", "NAME")).unwrap();
        session.add_tag(&TagSpec::new("BAL", "BALANCE")).unwrap();
        session.close_all_tables().unwrap();
        path
    }

    fn seek(options: &Options, key: &str, tag: Option<&str>) -> String {
        let mut harness = TestRegistry::new();
        let path = indexed_cust(&mut harness);
        let mut out = Vec::new();
        run(&mut out, options, &path, key, tag, None).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn character_prefix_and_numeric_keys() {
        assert_eq!(seek(&Options::default(), "ad", Some("NAME")), "1,ADA,10\n");
        assert_eq!(seek(&Options::default(), "7.5", Some("BAL")), "3,CY,7.5\n");
        assert_eq!(seek(&Options::default(), "ZED", Some("NAME")), "not found\n");
    }

    #[test]
    fn deleted_match_is_hidden() {
        let hidden = Options {
            skip_deleted: true,
            ..Options::default()
        };
        assert_eq!(seek(&Options::default(), "BOB", Some("NAME")), "2,BOB,5,*\n");
        assert_eq!(seek(&hidden, "BOB", Some("NAME")), "not found\n");
    }

    #[test]
    fn missing_tag_is_an_error() {
        let mut harness = TestRegistry::new();
        let path = indexed_cust(&mut harness);
        let mut out = Vec::new();
        assert!(run(&mut out, &Options::default(), &path, "A", Some("NOPE"), None).is_err());
        assert!(run(&mut out, &Options::default(), &path, "A", None, None).is_err());
    }
}
