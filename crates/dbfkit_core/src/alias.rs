//! Alias derivation and random names.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;

/// Derives a legal alias from a table's file name.
///
/// Uses the file stem, folds accented Latin letters to ASCII, replaces
/// anything else that is not alphanumeric with `_`, prefixes `_` when the
/// result would start with a digit, and caps the length.
#[must_use]
pub fn default_alias(path: &Path, max_len: usize) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut alias: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                fold_latin(c).unwrap_or('_')
            }
        })
        .collect();
    if alias.is_empty() || alias.starts_with(|c: char| c.is_ascii_digit()) {
        alias.insert(0, '_');
    }
    alias.truncate(max_len.max(1));
    alias.to_ascii_uppercase()
}

/// Returns whether `alias` is usable as given.
#[must_use]
pub fn is_legal_alias(alias: &str, max_len: usize) -> bool {
    !alias.is_empty()
        && alias.len() <= max_len
        && alias.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && alias.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// A random upper-case name of `len` characters starting with a letter.
#[must_use]
pub fn random_name(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let first = char::from(b'A' + rng.gen_range(0..26u8));
    let rest = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len.saturating_sub(1))
        .map(|b| char::from(b).to_ascii_uppercase());
    std::iter::once(first).chain(rest).collect()
}

fn fold_latin(c: char) -> Option<char> {
    let folded = match c {
        'À'..='Å' => 'A',
        'à'..='å' => 'a',
        'Ç' => 'C',
        'ç' => 'c',
        'È'..='Ë' => 'E',
        'è'..='ë' => 'e',
        'Ì'..='Ï' => 'I',
        'ì'..='ï' => 'i',
        'Ð' => 'D',
        'ð' => 'd',
        'Ñ' => 'N',
        'ñ' => 'n',
        'Ò'..='Ö' | 'Ø' => 'O',
        'ò'..='ö' | 'ø' => 'o',
        'Ù'..='Ü' => 'U',
        'ù'..='ü' => 'u',
        'Ý' => 'Y',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn aliases_from_file_names() {
        assert_eq!(default_alias(Path::new("/data/cust.dbf"), 32), "CUST");
        assert_eq!(default_alias(Path::new("order lines.dbf"), 32), "ORDER_LINES");
        assert_eq!(default_alias(Path::new("2024-sales.dbf"), 32), "_2024_SALES");
        assert_eq!(default_alias(Path::new("Café.dbf"), 32), "CAFE");
        assert_eq!(default_alias(Path::new("données.dbf"), 32), "DONNEES");
        assert_eq!(default_alias(Path::new("verylongname.dbf"), 4), "VERY");
    }

    #[test]
    fn derived_aliases_are_legal() {
        for name in ["a.dbf", "1.dbf", "ü-ß.dbf", "x y z"] {
            let alias = default_alias(Path::new(name), 10);
            assert!(is_legal_alias(&alias, 10), "{alias}");
        }
        assert!(!is_legal_alias("9LIVES", 10));
        assert!(!is_legal_alias("A-B", 10));
    }

    #[test]
    fn random_names_start_with_a_letter() {
        for _ in 0..50 {
            let name = random_name(8);
            assert_eq!(name.len(), 8);
            assert!(name.starts_with(|c: char| c.is_ascii_uppercase()));
            assert!(name.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    proptest! {
        #[test]
        fn any_file_name_yields_a_legal_alias(stem in "\\PC{0,20}", max_len in 1usize..40) {
            let alias = default_alias(Path::new(&format!("{stem}.dbf")), max_len);
            prop_assert!(is_legal_alias(&alias, max_len), "{:?} -> {:?}", stem, alias);
        }
    }
}
