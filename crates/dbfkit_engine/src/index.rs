//! Index files and tags.
//!
//! An index file holds one or more tags. Each tag is a named sort order over
//! a table: a key expression, an optional filter, a direction, and a
//! uniqueness flag, plus the ordered `(key, recno)` entries.
//!
//! ## Format
//!
//! Index files are CBOR documents:
//! ```text
//! IndexDocument {
//!     magic: "DBFKIT-IDX"
//!     version: u8
//!     tags: [TagData { spec, key_kind, entries: [(key, recno)] }]
//! }
//! ```
//!
//! Writes go to a temporary sibling first and are renamed into place.

use crate::error::{EngineError, EngineResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const INDEX_MAGIC: &str = "DBFKIT-IDX";
const INDEX_VERSION: u8 = 1;

/// Extension used for index files.
pub const INDEX_EXTENSION: &str = "dbi";

/// Maximum length of a tag name.
pub const TAG_NAME_LEN: usize = 10;

/// Definition of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSpec {
    /// Tag name, upper-cased.
    pub name: String,
    /// Key expression.
    pub expression: String,
    /// Optional filter; only records satisfying it appear in the tag.
    pub filter: Option<String>,
    /// Descending order.
    pub descending: bool,
    /// Keep only the first record of each key; reject later duplicates.
    pub unique: bool,
}

impl TagSpec {
    /// Creates an ascending, non-unique, unfiltered tag.
    pub fn new(name: &str, expression: &str) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            expression: expression.to_string(),
            filter: None,
            descending: false,
            unique: false,
        }
    }

    /// Sets the filter expression.
    #[must_use]
    pub fn filter(mut self, filter: Option<&str>) -> Self {
        self.filter = filter.map(str::to_string);
        self
    }

    /// Sets descending order.
    #[must_use]
    pub fn descending(mut self, value: bool) -> Self {
        self.descending = value;
        self
    }

    /// Sets uniqueness.
    #[must_use]
    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Checks the tag name.
    pub fn validate(&self) -> EngineResult<()> {
        let legal = !self.name.is_empty()
            && self.name.len() <= TAG_NAME_LEN
            && self.name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
            && self.name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if !legal {
            return Err(EngineError::index(format!("illegal tag name '{}'", self.name)));
        }
        if self.expression.trim().is_empty() {
            return Err(EngineError::index(format!("tag {} has no key expression", self.name)));
        }
        Ok(())
    }
}

/// The type of a tag's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    /// Character keys.
    Character,
    /// Numeric keys.
    Numeric,
    /// Date keys.
    Date,
    /// Logical keys.
    Logical,
}

/// A key stored in a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Key {
    /// Character key.
    Char(String),
    /// Numeric key.
    Number(f64),
    /// `CCYYMMDD` date key.
    Date(String),
    /// Logical key.
    Logical(bool),
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        match value {
            Value::Char(s) => Self::Char(s),
            Value::Number(n) => Self::Number(n),
            Value::Date(d) => Self::Date(d),
            Value::Logical(b) => Self::Logical(b),
        }
    }
}

impl Key {
    /// Returns the kind of this key.
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        match self {
            Self::Char(_) => KeyKind::Character,
            Self::Number(_) => KeyKind::Numeric,
            Self::Date(_) => KeyKind::Date,
            Self::Logical(_) => KeyKind::Logical,
        }
    }

    fn compare(&self, other: &Self, ci: bool) -> Ordering {
        match (self, other) {
            (Self::Char(a), Self::Char(b)) => compare_text(a, b, ci),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Logical(a), Self::Logical(b)) => a.cmp(b),
            (a, b) => (a.kind() as u8).cmp(&(b.kind() as u8)),
        }
    }

    /// Compares a stored key with a seek key. Character keys compare only
    /// as many characters as the seek key has.
    fn compare_seek(&self, seek: &SeekKey, ci: bool) -> EngineResult<Ordering> {
        match (self, seek) {
            (Self::Char(stored), SeekKey::Char(wanted)) => {
                let prefix: String = stored
                    .chars()
                    .chain(std::iter::repeat(' '))
                    .take(wanted.chars().count())
                    .collect();
                Ok(compare_text(&prefix, wanted, ci))
            }
            (Self::Number(a), SeekKey::Number(b)) => Ok(a.total_cmp(b)),
            (Self::Date(a), SeekKey::Date(b)) => Ok(a.as_str().cmp(b.as_str())),
            (Self::Logical(a), SeekKey::Logical(b)) => Ok(a.cmp(b)),
            (stored, _) => Err(EngineError::entry(format!(
                "seek key does not match {:?} tag keys",
                stored.kind()
            ))),
        }
    }
}

fn compare_text(a: &str, b: &str, ci: bool) -> Ordering {
    if ci {
        a.chars()
            .map(|c| c.to_ascii_uppercase())
            .cmp(b.chars().map(|c| c.to_ascii_uppercase()))
    } else {
        a.cmp(b)
    }
}

/// A value to seek for, typed to match a tag's keys.
#[derive(Debug, Clone, PartialEq)]
pub enum SeekKey {
    /// Character prefix.
    Char(String),
    /// Exact number.
    Number(f64),
    /// Exact `CCYYMMDD` date.
    Date(String),
    /// Exact logical.
    Logical(bool),
}

/// One entry of a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    /// Key value.
    pub key: Key,
    /// Record number.
    pub recno: u32,
}

/// A tag's definition and its ordered entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagData {
    /// Definition.
    pub spec: TagSpec,
    /// Type of the keys.
    pub key_kind: KeyKind,
    entries: Vec<TagEntry>,
}

impl TagData {
    /// Builds a tag from `(key, recno)` pairs given in record order.
    pub fn build(
        spec: TagSpec,
        key_kind: KeyKind,
        rows: impl IntoIterator<Item = (Key, u32)>,
        ci: bool,
    ) -> Self {
        let mut entries: Vec<TagEntry> = rows
            .into_iter()
            .map(|(key, recno)| TagEntry { key, recno })
            .collect();
        let descending = spec.descending;
        entries.sort_by(|a, b| order(a, b, descending, ci));
        if spec.unique {
            // Stable sort keeps record order within equal keys; keep the first.
            entries.dedup_by(|later, first| later.key.compare(&first.key, ci) == Ordering::Equal);
        }
        Self {
            spec,
            key_kind,
            entries,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tag has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record number at a position in tag order.
    #[must_use]
    pub fn recno_at(&self, pos: usize) -> Option<u32> {
        self.entries.get(pos).map(|e| e.recno)
    }

    /// Position of a record in tag order.
    #[must_use]
    pub fn position_of(&self, recno: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.recno == recno)
    }

    /// Iterates entries in tag order.
    pub fn entries(&self) -> impl Iterator<Item = &TagEntry> {
        self.entries.iter()
    }

    /// Fails if adding `key` for `recno` would duplicate a unique key.
    pub fn check_unique(&self, key: &Key, recno: u32, ci: bool) -> EngineResult<()> {
        if self.spec.unique
            && self
                .entries
                .iter()
                .any(|e| e.recno != recno && e.key.compare(key, ci) == Ordering::Equal)
        {
            return Err(EngineError::Unique {
                tag: self.spec.name.clone(),
            });
        }
        Ok(())
    }

    /// Replaces the entry for `recno`; `None` removes it.
    pub fn update(&mut self, recno: u32, key: Option<Key>, ci: bool) {
        self.entries.retain(|e| e.recno != recno);
        if let Some(key) = key {
            let entry = TagEntry { key, recno };
            let descending = self.spec.descending;
            let pos = self
                .entries
                .partition_point(|e| order(e, &entry, descending, ci) == Ordering::Less);
            self.entries.insert(pos, entry);
        }
    }

    /// Finds the first position whose key is not before `seek`.
    ///
    /// Returns the position and whether the key there matches.
    pub fn seek(&self, seek: &SeekKey, ci: bool) -> EngineResult<(usize, bool)> {
        let mut failure = None;
        let descending = self.spec.descending;
        let pos = self.entries.partition_point(|e| match e.key.compare_seek(seek, ci) {
            Ok(ord) => directed(ord, descending) == Ordering::Less,
            Err(err) => {
                failure.get_or_insert(err);
                false
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
        let found = self.matches_at(pos, seek, ci)?;
        Ok((pos, found))
    }

    /// Returns whether the entry at `pos` matches `seek`.
    pub fn matches_at(&self, pos: usize, seek: &SeekKey, ci: bool) -> EngineResult<bool> {
        match self.entries.get(pos) {
            Some(entry) => Ok(entry.key.compare_seek(seek, ci)? == Ordering::Equal),
            None => Ok(false),
        }
    }
}

fn directed(ord: Ordering, descending: bool) -> Ordering {
    if descending {
        ord.reverse()
    } else {
        ord
    }
}

fn order(a: &TagEntry, b: &TagEntry, descending: bool, ci: bool) -> Ordering {
    directed(a.key.compare(&b.key, ci), descending).then(a.recno.cmp(&b.recno))
}

/// The contents of an index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    magic: String,
    version: u8,
    /// Tags in creation order.
    pub tags: Vec<TagData>,
}

impl Default for IndexDocument {
    fn default() -> Self {
        Self {
            magic: INDEX_MAGIC.to_string(),
            version: INDEX_VERSION,
            tags: Vec::new(),
        }
    }
}

impl IndexDocument {
    /// Creates a document holding the given tags.
    pub fn new(tags: Vec<TagData>) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    /// Loads a document from disk.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let file = File::open(path).map_err(|e| EngineError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let doc: Self = ciborium::from_reader(BufReader::new(file))
            .map_err(|e| EngineError::index(format!("{}: {e}", path.display())))?;
        if doc.magic != INDEX_MAGIC || doc.version != INDEX_VERSION {
            return Err(EngineError::index(format!(
                "{} is not a version {INDEX_VERSION} index file",
                path.display()
            )));
        }
        Ok(doc)
    }

    /// Saves the document, replacing the file atomically.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let temp = path.with_extension("dbi.tmp");
        {
            let file = File::create(&temp).map_err(|e| EngineError::Create {
                path: temp.clone(),
                reason: e.to_string(),
            })?;
            let mut writer = BufWriter::new(file);
            ciborium::into_writer(self, &mut writer)
                .map_err(|e| EngineError::index(format!("{}: {e}", path.display())))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp, path)?;
        Ok(())
    }

    /// Position of a tag by case-insensitive name.
    #[must_use]
    pub fn tag_position(&self, name: &str) -> Option<usize> {
        self.tags
            .iter()
            .position(|t| t.spec.name.eq_ignore_ascii_case(name.trim()))
    }
}
