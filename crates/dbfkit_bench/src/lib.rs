//! Benchmark utilities.

#![warn(missing_docs)]

use dbfkit_engine::{create_table, FieldDef, NewRecord, Value};
use rand::Rng;
use std::path::{Path, PathBuf};

/// Writes `<name>.dbf` with `count` random records: NAME C(12), BALANCE N(10,2).
/// Roughly `deleted_ratio` of them are soft-deleted.
pub fn random_table(dir: &Path, name: &str, count: usize, deleted_ratio: f64) -> PathBuf {
    let mut rng = rand::thread_rng();
    let rows: Vec<NewRecord> = (0..count)
        .map(|_| {
            let key: String = (0..8)
                .map(|_| char::from(b'A' + rng.gen_range(0..26u8)))
                .collect();
            let values = vec![
                Value::Char(key),
                Value::Number(f64::from(rng.gen_range(-10_000..10_000)) / 100.0),
            ];
            if rng.gen_bool(deleted_ratio) {
                NewRecord::deleted(values)
            } else {
                NewRecord::live(values)
            }
        })
        .collect();
    let fields = [
        FieldDef::character("NAME", 12),
        FieldDef::numeric("BALANCE", 10, 2),
    ];
    create_table(&dir.join(format!("{name}.dbf")), &fields, &rows).expect("Failed to create table")
}
