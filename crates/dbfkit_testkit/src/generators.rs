//! Property-based test generators using proptest.

use dbfkit_core::GotoTarget;
use proptest::prelude::*;

/// Deleted flags for a table of up to `max_records` records.
pub fn deleted_flags_strategy(max_records: usize) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(prop::bool::weighted(0.3), 0..=max_records)
}

/// A navigation move. Record numbers and skip counts range a little past
/// `max_records` so boundaries and rejections are exercised.
pub fn goto_target_strategy(max_records: usize) -> impl Strategy<Value = GotoTarget> {
    let reach = max_records as i64 + 2;
    prop_oneof![
        Just(GotoTarget::Top),
        Just(GotoTarget::Bottom),
        Just(GotoTarget::Next),
        Just(GotoTarget::Previous),
        (-reach..=reach).prop_map(GotoTarget::Skip),
        (0..=reach as u32).prop_map(GotoTarget::Record),
    ]
}

/// A sequence of moves.
pub fn goto_script_strategy(
    max_records: usize,
    max_moves: usize,
) -> impl Strategy<Value = Vec<GotoTarget>> {
    prop::collection::vec(goto_target_strategy(max_records), 1..=max_moves)
}

/// A legal alias of up to `max_len` characters.
pub fn alias_strategy(max_len: usize) -> impl Strategy<Value = String> {
    let rest = max_len.saturating_sub(1);
    prop::string::string_regex(&format!("[A-Z_][A-Z0-9_]{{0,{rest}}}")).expect("Invalid regex")
}

/// A file stem, including characters that are not legal in an alias.
pub fn file_stem_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 _\\-éüÅ]{1,40}").expect("Invalid regex")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfkit_core::is_legal_alias;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_aliases_are_legal() {
        let mut runner = TestRunner::default();
        runner
            .run(&alias_strategy(12), |alias| {
                prop_assert!(is_legal_alias(&alias, 12));
                Ok(())
            })
            .unwrap();
    }
}
