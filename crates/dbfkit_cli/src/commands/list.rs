//! List command implementation.

use super::{open, write_record, CommandResult, Options};
use dbfkit_core::GotoTarget;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Arguments of the list command.
#[derive(Debug, Default)]
pub struct ListArgs<'a> {
    /// Tag to order by.
    pub order: Option<&'a str>,
    /// Row filter expression.
    pub filter: Option<&'a str>,
    /// Maximum rows printed.
    pub limit: Option<usize>,
    /// Field delimiter.
    pub delimiter: &'a str,
}

/// Runs the list command.
pub fn run(out: &mut impl Write, options: &Options, table: &Path, args: &ListArgs<'_>) -> CommandResult {
    info!("Listing {:?}", table);
    let (mut registry, id) = open(options, table)?;
    let session = registry.resident_mut()?;
    session.set_delimiter(args.delimiter)?;
    if args.order.is_some() {
        session.set_order(args.order)?;
    }
    if let Some(filter) = args.filter {
        session.set_filter(filter)?;
    }

    let fields: Vec<String> = session
        .table_info(id)?
        .fields
        .into_iter()
        .map(|f| f.name)
        .collect();
    writeln!(out, "RECNO{}{}", args.delimiter, fields.join(args.delimiter))?;

    let limit = args.limit.unwrap_or(usize::MAX);
    let mut printed = 0;
    let mut recno = session.goto(GotoTarget::Top)?;
    while recno != 0 && printed < limit {
        if session.filter().is_none() || session.filter_matches()? {
            write_record(out, session, &fields)?;
            printed += 1;
        }
        recno = session.goto(GotoTarget::Next)?;
    }
    debug!(printed, "list finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfkit_testkit::fixtures::cust_table;
    use tempfile::tempdir;

    fn list(options: &Options, args: &ListArgs<'_>) -> Vec<String> {
        let dir = tempdir().unwrap();
        let path = cust_table(dir.path());
        let mut out = Vec::new();
        run(&mut out, options, &path, args).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn lists_every_record_with_deleted_marker() {
        let lines = list(
            &Options::default(),
            &ListArgs {
                delimiter: ",",
                ..ListArgs::default()
            },
        );
        assert_eq!(lines, vec!["RECNO,NAME,BALANCE", "1,ADA,10", "2,BOB,5,*", "3,CY,7.5"]);
    }

    #[test]
    fn skip_deleted_filter_and_limit() {
        let options = Options {
            skip_deleted: true,
            ..Options::default()
        };
        let lines = list(
            &options,
            &ListArgs {
                filter: Some("BALANCE < 9"),
                delimiter: "|",
                ..ListArgs::default()
            },
        );
        assert_eq!(lines, vec!["RECNO|NAME|BALANCE", "3|CY|7.5"]);

        let lines = list(
            &options,
            &ListArgs {
                limit: Some(1),
                delimiter: ",",
                ..ListArgs::default()
            },
        );
        assert_eq!(lines.len(), 2);
    }
}
