//! Navigation against the reference model, over generated tables and moves.

use dbfkit_core::{default_alias, is_legal_alias, CoreError};
use dbfkit_testkit::prelude::*;
use proptest::prelude::*;
use std::path::Path;

const MAX_RECORDS: usize = 8;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn goto_matches_model(
        deleted in deleted_flags_strategy(MAX_RECORDS),
        skip_deleted in any::<bool>(),
        script in goto_script_strategy(MAX_RECORDS, 12),
    ) {
        let mut harness = TestRegistry::new();
        let path = numbered_table(harness.dir(), "nav", &deleted);
        let session = harness.session();
        session.open_table(&path, None, OpenOptions::new()).unwrap();
        session.set_skip_deleted(skip_deleted);

        let mut model = NavigationModel::new(deleted.clone());
        model.set_skip_deleted(skip_deleted);

        for target in script {
            let expected = model.goto(target);
            match session.goto(target) {
                Ok(recno) => prop_assert_eq!(Some(recno), expected, "{:?}", target),
                Err(CoreError::RecordOutOfRange { .. }) => prop_assert_eq!(expected, None),
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
            prop_assert_eq!(session.record_number().unwrap(), model.recno());
        }
    }

    #[test]
    fn traversal_never_lands_on_hidden_records(deleted in deleted_flags_strategy(MAX_RECORDS)) {
        let mut harness = TestRegistry::new();
        let path = numbered_table(harness.dir(), "nav", &deleted);
        let session = harness.session();
        session.open_table(&path, None, OpenOptions::new()).unwrap();
        session.set_skip_deleted(true);

        let mut recno = session.goto(GotoTarget::Top).unwrap();
        let mut visited = Vec::new();
        while recno != 0 {
            prop_assert!(!deleted[recno as usize - 1]);
            visited.push(recno);
            recno = session.goto(GotoTarget::Skip(1)).unwrap();
        }
        let live: Vec<u32> = deleted
            .iter()
            .enumerate()
            .filter(|(_, &gone)| !gone)
            .map(|(i, _)| i as u32 + 1)
            .collect();
        prop_assert_eq!(visited, live);
    }

    #[test]
    fn derived_aliases_are_legal(stem in file_stem_strategy(), max_len in 1usize..=32) {
        let alias = default_alias(Path::new(&format!("{stem}.dbf")), max_len);
        prop_assert!(is_legal_alias(&alias, max_len), "{alias:?}");
    }
}
