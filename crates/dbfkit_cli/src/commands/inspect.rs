//! Inspect command implementation.

use super::{open, CommandResult, Options};
use dbfkit_core::GotoTarget;
use dbfkit_engine::{FieldType, KeyKind};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Table inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Resolved table path.
    pub path: String,
    /// Alias the table was opened under.
    pub alias: String,
    /// Records including deleted ones.
    pub record_count: u32,
    /// Soft-deleted records.
    pub deleted_count: u32,
    /// Columns.
    pub fields: Vec<FieldRow>,
    /// Tags of the production index.
    pub tags: Vec<TagRow>,
}

/// One column.
#[derive(Debug, Serialize)]
pub struct FieldRow {
    /// Field name.
    pub name: String,
    /// Storage type.
    pub field_type: FieldType,
    /// Width in bytes.
    pub length: u8,
    /// Decimal places.
    pub decimals: u8,
}

/// One index tag.
#[derive(Debug, Serialize)]
pub struct TagRow {
    /// Tag name.
    pub name: String,
    /// Key expression.
    pub expression: String,
    /// Filter expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Key type.
    pub key_kind: KeyKind,
    /// Descending order.
    pub descending: bool,
    /// Unique keys.
    pub unique: bool,
}

/// Runs the inspect command.
pub fn run(out: &mut impl Write, options: &Options, table: &Path, format: &str) -> CommandResult {
    info!("Inspecting {:?}", table);
    let (mut registry, id) = open(options, table)?;
    let session = registry.resident_mut()?;
    let table_info = session.table_info(id)?;

    let mut deleted_count = 0;
    for recno in 1..=table_info.record_count {
        session.goto(GotoTarget::Record(recno))?;
        if session.is_deleted()? {
            deleted_count += 1;
        }
    }

    let engine = session.engine();
    let mut tags = Vec::new();
    for tag in engine.tags(id.handle)? {
        let tag_info = engine.tag_info(tag)?;
        tags.push(TagRow {
            name: tag_info.spec.name,
            expression: tag_info.spec.expression,
            filter: tag_info.spec.filter,
            key_kind: tag_info.key_kind,
            descending: tag_info.spec.descending,
            unique: tag_info.spec.unique,
        });
    }

    let result = InspectResult {
        path: table_info.path.display().to_string(),
        alias: table_info.alias,
        record_count: table_info.record_count,
        deleted_count,
        fields: table_info
            .fields
            .into_iter()
            .map(|f| FieldRow {
                name: f.name,
                field_type: f.field_type,
                length: f.length,
                decimals: f.decimals,
            })
            .collect(),
        tags,
    };

    match format {
        "json" => writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?,
        _ => print_text_output(out, &result)?,
    }
    Ok(())
}

fn print_text_output(out: &mut impl Write, result: &InspectResult) -> std::io::Result<()> {
    writeln!(out, "Table: {}", result.path)?;
    writeln!(out, "Alias: {}", result.alias)?;
    writeln!(
        out,
        "Records: {} ({} deleted)",
        result.record_count, result.deleted_count
    )?;
    writeln!(out)?;
    writeln!(out, "Fields:")?;
    for field in &result.fields {
        writeln!(
            out,
            "  {:<10} {} {:>3},{}",
            field.name,
            char::from(field.field_type.code()),
            field.length,
            field.decimals
        )?;
    }
    if !result.tags.is_empty() {
        writeln!(out)?;
        writeln!(out, "Tags:")?;
        for tag in &result.tags {
            write!(out, "  {:<10} {}", tag.name, tag.expression)?;
            if let Some(filter) = &tag.filter {
                write!(out, " FOR {filter}")?;
            }
            if tag.descending {
                write!(out, " DESCENDING")?;
            }
            if tag.unique {
                write!(out, " UNIQUE")?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfkit_testkit::fixtures::cust_table;
    use tempfile::tempdir;

    #[test]
    fn text_output_lists_fields() {
        let dir = tempdir().unwrap();
        let path = cust_table(dir.path());
        let mut out = Vec::new();
        run(&mut out, &Options::default(), &path, "text").unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Alias: CUST"));
        assert!(text.contains("Records: 3 (1 deleted)"));
        assert!(text.contains("NAME"));
        assert!(text.contains("BALANCE"));
    }

    #[test]
    fn json_output_parses() {
        let dir = tempdir().unwrap();
        let path = cust_table(dir.path());
        let mut out = Vec::new();
        run(&mut out, &Options::default(), &path, "json").unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["record_count"], 3);
        assert_eq!(value["fields"][1]["name"], "BALANCE");
        assert_eq!(value["tags"].as_array().unwrap().len(), 0);
    }
}
