//! Table fixtures and registry helpers.
//!
//! Fixtures panic on failure; they only run inside tests.

use dbfkit_core::{ActiveSession, SessionConfig, SessionRegistry};
use dbfkit_engine::{create_table, FieldDef, NewRecord, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes `cust.dbf`: NAME C(10), BALANCE N(8,2), three records with the
/// second soft-deleted. Every balance is positive.
///
/// | recno | NAME | BALANCE | deleted |
/// |-------|------|---------|---------|
/// | 1     | ADA  | 10.00   | no      |
/// | 2     | BOB  | 5.00    | yes     |
/// | 3     | CY   | 7.50    | no      |
pub fn cust_table(dir: &Path) -> PathBuf {
    let fields = [
        FieldDef::character("NAME", 10),
        FieldDef::numeric("BALANCE", 8, 2),
    ];
    let row = |name: &str, balance: f64| vec![Value::Char(name.to_string()), Value::Number(balance)];
    let rows = vec![
        NewRecord::live(row("ADA", 10.0)),
        NewRecord::deleted(row("BOB", 5.0)),
        NewRecord::live(row("CY", 7.5)),
    ];
    create_table(&dir.join("cust.dbf"), &fields, &rows).expect("Failed to create cust.dbf")
}

/// Writes `<name>.dbf` with one numeric field `N` holding the record number.
/// `deleted[i]` soft-deletes record `i + 1`.
pub fn numbered_table(dir: &Path, name: &str, deleted: &[bool]) -> PathBuf {
    let rows = deleted
        .iter()
        .enumerate()
        .map(|(i, &gone)| {
            let values = vec![Value::Number((i + 1) as f64)];
            if gone {
                NewRecord::deleted(values)
            } else {
                NewRecord::live(values)
            }
        })
        .collect::<Vec<_>>();
    create_table(
        &dir.join(format!("{name}.dbf")),
        &[FieldDef::numeric("N", 6, 0)],
        &rows,
    )
    .expect("Failed to create numbered table")
}

/// Lists the `.dbi` files in a directory.
pub fn index_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(dbfkit_engine::INDEX_EXTENSION))
        })
        .collect();
    files.sort();
    files
}

/// A session registry with a scratch directory that lives as long as it does.
pub struct TestRegistry {
    /// The registry.
    pub registry: SessionRegistry,
    dir: TempDir,
}

impl TestRegistry {
    /// Creates a registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Creates a registry with a custom configuration.
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            registry: SessionRegistry::new(config),
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// The scratch directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// The resident session, initializing one if none is resident.
    pub fn session(&mut self) -> &mut ActiveSession {
        if self.registry.resident().is_none() {
            self.registry.init(false).expect("Failed to init session");
        }
        self.registry.resident_mut().expect("No resident session")
    }

    /// Serializes a session snapshot to JSON for readable assertion diffs.
    pub fn snapshot_json(&self, id: dbfkit_core::SessionId) -> serde_json::Value {
        let snapshot = self.registry.snapshot(id).expect("Failed to snapshot");
        serde_json::to_value(snapshot).expect("Failed to serialize snapshot")
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}
