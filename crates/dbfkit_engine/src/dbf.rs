//! DBF record file access.
//!
//! ```text
//! offset 0    header (32 bytes)
//!             ├─ version byte
//!             ├─ last update (YY MM DD)
//!             ├─ record count (u32 LE)
//!             ├─ header length (u16 LE)
//!             └─ record length (u16 LE)
//! offset 32   field descriptors (32 bytes each), terminated by 0x0D
//! header_len  records: deletion flag (' ' or '*') + fixed-width fields
//! end         0x1A
//! ```

use crate::engine::Compatibility;
use crate::error::{EngineError, EngineResult};
use crate::value::{FieldDef, FieldType, Value};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const HEADER_LEN: usize = 32;
const DESCRIPTOR_LEN: usize = 32;
const HEADER_TERMINATOR: u8 = 0x0D;
const EOF_MARKER: u8 = 0x1A;
const LIVE_FLAG: u8 = b' ';
const DELETED_FLAG: u8 = b'*';
const DBASE3_VERSION: u8 = 0x03;
/// Largest file size addressable without large-table mode.
const SMALL_FILE_LIMIT: u64 = u32::MAX as u64;
/// Records kept in the read cache before it is dropped wholesale.
const CACHE_LIMIT: usize = 4096;

/// Resolves a table path, supplying the `.dbf` extension when absent.
#[must_use]
pub fn resolve_table_path(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension("dbf")
    }
}

/// A record to be written by [`create_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    /// Whether the record is soft-deleted.
    pub deleted: bool,
    /// Field values in field order.
    pub values: Vec<Value>,
}

impl NewRecord {
    /// A live record.
    pub fn live(values: Vec<Value>) -> Self {
        Self {
            deleted: false,
            values,
        }
    }

    /// A soft-deleted record.
    pub fn deleted(values: Vec<Value>) -> Self {
        Self {
            deleted: true,
            values,
        }
    }
}

/// Creates a new table file, overwriting any existing file.
///
/// Returns the resolved path of the created file.
pub fn create_table(path: &Path, fields: &[FieldDef], rows: &[NewRecord]) -> EngineResult<PathBuf> {
    let path = resolve_table_path(path);
    if fields.is_empty() {
        return Err(EngineError::Create {
            path,
            reason: "a table needs at least one field".into(),
        });
    }
    for field in fields {
        field.validate()?;
    }
    let record_len = 1 + fields.iter().map(|f| usize::from(f.length)).sum::<usize>();
    let header_len = HEADER_LEN + fields.len() * DESCRIPTOR_LEN + 1;
    if record_len > usize::from(u16::MAX) || header_len > usize::from(u16::MAX) {
        return Err(EngineError::Create {
            path,
            reason: "record layout too wide".into(),
        });
    }

    let mut buf = Vec::with_capacity(header_len + rows.len() * record_len + 1);
    buf.extend_from_slice(&header_bytes(
        DBASE3_VERSION,
        rows.len() as u32,
        header_len as u16,
        record_len as u16,
    ));
    for field in fields {
        let mut descriptor = [0u8; DESCRIPTOR_LEN];
        descriptor[..field.name.len()].copy_from_slice(field.name.as_bytes());
        descriptor[11] = field.field_type.code();
        descriptor[16] = field.length;
        descriptor[17] = field.decimals;
        buf.extend_from_slice(&descriptor);
    }
    buf.push(HEADER_TERMINATOR);

    for (recno, row) in rows.iter().enumerate() {
        if row.values.len() != fields.len() {
            return Err(EngineError::entry(format!(
                "record {} has {} values for {} fields",
                recno + 1,
                row.values.len(),
                fields.len()
            )));
        }
        buf.push(if row.deleted { DELETED_FLAG } else { LIVE_FLAG });
        for (field, value) in fields.iter().zip(&row.values) {
            buf.extend_from_slice(&field.encode(value)?);
        }
    }
    buf.push(EOF_MARKER);

    let mut file = File::create(&path).map_err(|e| EngineError::Create {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    file.write_all(&buf)?;
    file.sync_all()?;
    Ok(path)
}

/// Options for opening a record file.
#[derive(Debug, Clone, Copy)]
pub struct DbfOptions {
    /// Open without write access.
    pub read_only: bool,
    /// Sync data to disk after every write.
    pub sync_writes: bool,
    /// Keep recently read records in memory.
    pub cache_reads: bool,
    /// Permit files beyond 4 GiB.
    pub large_files: bool,
    /// Header versions to accept.
    pub compatibility: Compatibility,
}

/// An open record file.
#[derive(Debug)]
pub struct DbfFile {
    path: PathBuf,
    file: File,
    options: DbfOptions,
    header_len: u64,
    record_len: usize,
    record_count: u32,
    fields: Vec<FieldDef>,
    offsets: Vec<usize>,
    cache: HashMap<u32, Vec<u8>>,
}

impl DbfFile {
    /// Opens an existing record file.
    pub fn open(path: &Path, options: DbfOptions) -> EngineResult<Self> {
        let open_err = |reason: String| EngineError::Open {
            path: path.to_path_buf(),
            reason,
        };
        let mut file = OpenOptions::new()
            .read(true)
            .write(!options.read_only)
            .open(path)
            .map_err(|e| open_err(e.to_string()))?;

        let size = file.metadata()?.len();
        if size > SMALL_FILE_LIMIT && !options.large_files {
            return Err(open_err(
                "file exceeds 4 GiB; large-table mode is required".into(),
            ));
        }

        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header)
            .map_err(|_| EngineError::format("truncated DBF header"))?;
        if !options.compatibility.accepts(header[0]) {
            return Err(EngineError::format(format!(
                "unsupported DBF version byte 0x{:02x}",
                header[0]
            )));
        }
        let header_count = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let header_len = u64::from(u16::from_le_bytes([header[8], header[9]]));
        let record_len = usize::from(u16::from_le_bytes([header[10], header[11]]));
        if header_len < (HEADER_LEN + 1) as u64 || record_len == 0 {
            return Err(EngineError::format("invalid header or record length"));
        }

        let mut rest = vec![0u8; header_len as usize - HEADER_LEN];
        file.read_exact(&mut rest)
            .map_err(|_| EngineError::format("truncated field descriptors"))?;
        let mut fields = Vec::new();
        let mut offsets = Vec::new();
        let mut offset = 1;
        for descriptor in rest.chunks_exact(DESCRIPTOR_LEN) {
            if descriptor[0] == HEADER_TERMINATOR {
                break;
            }
            let name_end = descriptor[..11].iter().position(|&b| b == 0).unwrap_or(11);
            let name = String::from_utf8_lossy(&descriptor[..name_end]).to_ascii_uppercase();
            let field_type = FieldType::from_code(descriptor[11]).ok_or_else(|| {
                EngineError::format(format!(
                    "field {name} has unsupported type '{}'",
                    descriptor[11] as char
                ))
            })?;
            let field = FieldDef {
                name,
                field_type,
                length: descriptor[16],
                decimals: descriptor[17],
            };
            offsets.push(offset);
            offset += usize::from(field.length);
            fields.push(field);
        }
        if fields.is_empty() || offset != record_len {
            return Err(EngineError::format(
                "field descriptors do not match the record length",
            ));
        }

        // Trust the header count only as far as the file actually extends.
        let stored = size.saturating_sub(header_len) / record_len as u64;
        let record_count = header_count.min(u32::try_from(stored).unwrap_or(u32::MAX));

        Ok(Self {
            path: path.to_path_buf(),
            file,
            options,
            header_len,
            record_len,
            record_count,
            fields,
            offsets,
            cache: HashMap::new(),
        })
    }

    /// Returns the path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the field definitions.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the number of records, including deleted ones.
    #[must_use]
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Returns whether the file was opened without write access.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    /// Returns whether every write is synced to disk.
    #[must_use]
    pub fn syncs_writes(&self) -> bool {
        self.options.sync_writes
    }

    /// Returns the index of a field by case-insensitive name.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Returns a blank record buffer.
    #[must_use]
    pub fn blank_record(&self) -> Vec<u8> {
        vec![b' '; self.record_len]
    }

    /// Decodes one field of a record buffer.
    #[must_use]
    pub fn value(&self, record: &[u8], field: usize) -> Value {
        let def = &self.fields[field];
        let start = self.offsets[field];
        def.decode(&record[start..start + usize::from(def.length)])
    }

    /// Encodes a value into one field of a record buffer.
    pub fn set_value(&self, record: &mut [u8], field: usize, value: &Value) -> EngineResult<()> {
        let def = &self.fields[field];
        let start = self.offsets[field];
        let bytes = def.encode(value)?;
        record[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    /// Reads a record (1-based).
    pub fn read_record(&mut self, recno: u32) -> EngineResult<Vec<u8>> {
        if recno == 0 || recno > self.record_count {
            return Err(EngineError::entry(format!(
                "record {recno} is outside 1..={}",
                self.record_count
            )));
        }
        if let Some(record) = self.cache.get(&recno) {
            return Ok(record.clone());
        }
        let mut record = vec![0u8; self.record_len];
        self.file.seek(SeekFrom::Start(self.record_offset(recno)))?;
        self.file.read_exact(&mut record)?;
        if self.options.cache_reads {
            if self.cache.len() >= CACHE_LIMIT {
                self.cache.clear();
            }
            self.cache.insert(recno, record.clone());
        }
        Ok(record)
    }

    /// Overwrites an existing record (1-based).
    pub fn write_record(&mut self, recno: u32, record: &[u8]) -> EngineResult<()> {
        if recno == 0 || recno > self.record_count {
            return Err(EngineError::entry(format!(
                "record {recno} is outside 1..={}",
                self.record_count
            )));
        }
        self.check_record_len(record)?;
        self.file.seek(SeekFrom::Start(self.record_offset(recno)))?;
        self.file.write_all(record)?;
        self.cache.remove(&recno);
        self.after_write()
    }

    /// Appends a record and returns its record number.
    pub fn append_record(&mut self, record: &[u8]) -> EngineResult<u32> {
        self.check_record_len(record)?;
        let recno = self.record_count + 1;
        let end = self.record_offset(recno) + self.record_len as u64 + 1;
        if end > SMALL_FILE_LIMIT && !self.options.large_files {
            return Err(EngineError::entry(
                "append would exceed 4 GiB without large-table mode",
            ));
        }
        self.file.seek(SeekFrom::Start(self.record_offset(recno)))?;
        self.file.write_all(record)?;
        self.file.write_all(&[EOF_MARKER])?;
        self.record_count = recno;
        let mut header = [0u8; 8];
        header[..4].copy_from_slice(&today());
        header[4..].copy_from_slice(&recno.to_le_bytes());
        // Keep the version byte, rewrite date and count.
        self.file.seek(SeekFrom::Start(1))?;
        self.file.write_all(&header[1..])?;
        self.after_write()?;
        Ok(recno)
    }

    /// Returns whether a record buffer is flagged deleted.
    #[must_use]
    pub fn is_deleted(record: &[u8]) -> bool {
        record.first() == Some(&DELETED_FLAG)
    }

    /// Sets or clears the deletion flag of a record buffer.
    pub fn set_deleted(record: &mut [u8], deleted: bool) {
        if let Some(flag) = record.first_mut() {
            *flag = if deleted { DELETED_FLAG } else { LIVE_FLAG };
        }
    }

    fn record_offset(&self, recno: u32) -> u64 {
        self.header_len + u64::from(recno - 1) * self.record_len as u64
    }

    fn check_record_len(&self, record: &[u8]) -> EngineResult<()> {
        if self.options.read_only {
            return Err(EngineError::ReadOnly {
                alias: self.path.display().to_string(),
            });
        }
        if record.len() != self.record_len {
            return Err(EngineError::entry(format!(
                "record buffer is {} bytes, expected {}",
                record.len(),
                self.record_len
            )));
        }
        Ok(())
    }

    fn after_write(&mut self) -> EngineResult<()> {
        if self.options.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

fn header_bytes(version: u8, count: u32, header_len: u16, record_len: u16) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&today());
    header[0] = version;
    header[4..8].copy_from_slice(&count.to_le_bytes());
    header[8..10].copy_from_slice(&header_len.to_le_bytes());
    header[10..12].copy_from_slice(&record_len.to_le_bytes());
    header
}

/// Returns `[0, YY, MM, DD]` for the current UTC date, YY counted from 1900.
fn today() -> [u8; 4] {
    let days = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / 86_400)
        .unwrap_or(0) as i64;
    let (year, month, day) = civil_from_days(days);
    [0, (year - 1900).clamp(0, 255) as u8, month as u8, day as u8]
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options() -> DbfOptions {
        DbfOptions {
            read_only: false,
            sync_writes: false,
            cache_reads: true,
            large_files: false,
            compatibility: Compatibility::FoxPro,
        }
    }

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::character("NAME", 10), FieldDef::numeric("BALANCE", 8, 2)]
    }

    #[test]
    fn create_then_read() {
        let dir = tempdir().unwrap();
        let path = create_table(
            &dir.path().join("cust"),
            &fields(),
            &[
                NewRecord::live(vec![Value::Char("ALICE".into()), Value::Number(10.0)]),
                NewRecord::deleted(vec![Value::Char("BOB".into()), Value::Number(5.5)]),
            ],
        )
        .unwrap();
        assert_eq!(path.extension().unwrap(), "dbf");

        let mut dbf = DbfFile::open(&path, options()).unwrap();
        assert_eq!(dbf.record_count(), 2);
        assert_eq!(dbf.fields(), fields().as_slice());

        let second = dbf.read_record(2).unwrap();
        assert!(DbfFile::is_deleted(&second));
        assert_eq!(dbf.value(&second, 1), Value::Number(5.5));
        assert!(dbf.read_record(3).is_err());
    }

    #[test]
    fn append_updates_header_count() {
        let dir = tempdir().unwrap();
        let path = create_table(&dir.path().join("t.dbf"), &fields(), &[]).unwrap();
        {
            let mut dbf = DbfFile::open(&path, options()).unwrap();
            let mut record = dbf.blank_record();
            dbf.set_value(&mut record, 0, &Value::Char("CAROL".into()))
                .unwrap();
            assert_eq!(dbf.append_record(&record).unwrap(), 1);
        }
        let mut dbf = DbfFile::open(&path, options()).unwrap();
        assert_eq!(dbf.record_count(), 1);
        let record = dbf.read_record(1).unwrap();
        assert_eq!(dbf.value(&record, 0), Value::Char("CAROL     ".into()));
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = create_table(&dir.path().join("t.dbf"), &fields(), &[]).unwrap();
        let mut opts = options();
        opts.read_only = true;
        let mut dbf = DbfFile::open(&path, opts).unwrap();
        let record = dbf.blank_record();
        assert!(matches!(
            dbf.append_record(&record),
            Err(EngineError::ReadOnly { .. })
        ));
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.dbf");
        std::fs::write(&path, b"not a table").unwrap();
        assert!(matches!(
            DbfFile::open(&path, options()),
            Err(EngineError::Format { .. })
        ));
    }

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }
}
