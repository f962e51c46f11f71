use charsnap_common::{BlobHash, GamePath};
use charsnap_store::{FileMap, FileMapChain, SnapshotState};
use proptest::prelude::*;

fn path(i: u8) -> GamePath {
    GamePath::new(&format!("chara/slot_{i}.tex")).unwrap()
}

fn hash(i: u8) -> BlobHash {
    BlobHash::new(&format!("{i:02x}")).unwrap()
}

fn mapping_strategy() -> impl Strategy<Value = FileMap> {
    prop::collection::btree_map(0u8..12, 0u8..6, 0..8)
        .prop_map(|m| m.into_iter().map(|(p, h)| (path(p), hash(h))).collect())
}

/// (parent choice, changes) pairs; the parent choice indexes existing nodes.
fn appends_strategy() -> impl Strategy<Value = Vec<(Option<usize>, FileMap)>> {
    prop::collection::vec((prop::option::of(0usize..64), mapping_strategy()), 1..16)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn resolve_is_left_fold_of_lineage(appends in appends_strategy()) {
        let mut chain = FileMapChain::new();
        let mut ids: Vec<String> = Vec::new();
        let mut parents: Vec<Option<usize>> = Vec::new();
        let mut changes: Vec<FileMap> = Vec::new();

        for (choice, delta) in appends {
            let parent = if ids.is_empty() { None } else { choice.map(|c| c % ids.len()) };
            let id = chain
                .append(parent.map(|p| ids[p].as_str()), delta.clone(), None)
                .unwrap()
                .id
                .clone();
            ids.push(id);
            parents.push(parent);
            changes.push(delta);
        }

        for target in 0..ids.len() {
            let mut lineage = vec![target];
            while let Some(p) = parents[*lineage.last().unwrap()] {
                lineage.push(p);
            }
            let mut expected = FileMap::new();
            for &i in lineage.iter().rev() {
                expected.extend(changes[i].clone());
            }
            let resolved = chain.resolve(&ids[target]).unwrap();
            prop_assert_eq!(&resolved, &expected);
            // Deterministic.
            prop_assert_eq!(chain.resolve(&ids[target]).unwrap(), resolved);
        }
    }

    #[test]
    fn capture_round_trips_every_mapping(
        mappings in prop::collection::vec(mapping_strategy(), 1..10),
        manipulations in prop::collection::vec("[a-c]{0,2}", 10),
    ) {
        let mut state = SnapshotState::new("Actor", None);
        for (i, m) in mappings.iter().enumerate() {
            state.capture_update(m.clone(), &manipulations[i]).unwrap();
            let current = state.current_file_map_id().unwrap().to_string();
            prop_assert_eq!(&state.effective_mapping(&current).unwrap(), m);
            prop_assert_eq!(state.file_replacements(), m);
            prop_assert_eq!(state.manipulation_at(&current).unwrap(), manipulations[i].clone());

            // Re-submitting the same mapping is valid and keeps the view.
            state.capture_update(m.clone(), &manipulations[i]).unwrap();
            prop_assert_eq!(state.file_replacements(), m);
        }
    }
}

#[test]
fn empty_mapping_round_trips() {
    let mut state = SnapshotState::new("Actor", None);
    state.capture_update(FileMap::new(), "").unwrap();
    let current = state.current_file_map_id().unwrap().to_string();
    assert!(state.effective_mapping(&current).unwrap().is_empty());
    assert!(state.file_replacements().is_empty());
}
