//! Tag command implementation.

use super::{open, CommandResult, Options};
use dbfkit_engine::TagSpec;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// What to do to the production index.
#[derive(Debug)]
pub enum TagAction<'a> {
    /// Add a tag.
    Add(TagSpec),
    /// Remove a tag by name.
    Remove(&'a str),
}

/// Runs the tag command. The table is always opened exclusively.
pub fn run(out: &mut impl Write, options: &Options, table: &Path, action: &TagAction<'_>) -> CommandResult {
    let options = Options {
        exclusive: true,
        ..*options
    };
    let (mut registry, _) = open(&options, table)?;
    let session = registry.resident_mut()?;
    match action {
        TagAction::Add(spec) => {
            info!("Adding tag {} to {:?}", spec.name, table);
            session.add_tag(spec)?;
            writeln!(out, "Added tag {}", spec.name)?;
        }
        TagAction::Remove(name) => {
            info!("Removing tag {} from {:?}", name, table);
            session.remove_tag(name)?;
            writeln!(out, "Removed tag {}", name.to_ascii_uppercase())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfkit_testkit::fixtures::{cust_table, index_files};
    use tempfile::tempdir;

    #[test]
    fn add_then_remove() {
        let dir = tempdir().unwrap();
        let path = cust_table(dir.path());
        let mut out = Vec::new();

        let spec = TagSpec::new("name", "UPPER(NAME)").descending(true);
        run(&mut out, &Options::default(), &path, &TagAction::Add(spec)).unwrap();
        assert_eq!(index_files(dir.path()).len(), 1);

        run(&mut out, &Options::default(), &path, &TagAction::Remove("name")).unwrap();
        assert!(index_files(dir.path()).is_empty());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Added tag NAME\nRemoved tag NAME\n"
        );
    }

    #[test]
    fn removing_an_unknown_tag_fails() {
        let dir = tempdir().unwrap();
        let path = cust_table(dir.path());
        let mut out = Vec::new();
        assert!(run(&mut out, &Options::default(), &path, &TagAction::Remove("NOPE")).is_err());
    }
}
