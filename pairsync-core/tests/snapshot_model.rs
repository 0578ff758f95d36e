use std::collections::BTreeMap;

use pairsync_core::{
    AssetReference, CategoryState, ChangeKind, ChangeSet, ObjectKind, StateSnapshot,
};
use rstest::rstest;

fn snapshot_with(kind: ObjectKind, state: CategoryState) -> StateSnapshot {
    let mut categories = BTreeMap::new();
    categories.insert(kind, state);
    StateSnapshot::new(categories)
}

#[test]
fn json_roundtrip_preserves_content_and_hash() {
    let state = CategoryState {
        assets: vec![
            AssetReference::hashed("abc123", &["chara/equipment/e0001.mdl"]),
            AssetReference::swapped("chara/alt/e0002.tex", &["chara/equipment/e0002.tex"]),
        ],
        appearance: Some("glam:v1".to_string()),
        manipulation: Some("manip:v1".to_string()),
        ..CategoryState::default()
    };
    let snapshot = snapshot_with(ObjectKind::Player, state);

    let json = serde_json::to_string_pretty(&snapshot).expect("serialize");
    let decoded: StateSnapshot = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(decoded, snapshot);
    assert_eq!(decoded.aggregate_hash(), snapshot.aggregate_hash());
    assert_eq!(decoded.manipulation(), Some("manip:v1"));
}

#[test]
fn snapshot_without_categories_parses() {
    let decoded: StateSnapshot = serde_json::from_str("{}").expect("deserialize");
    assert_eq!(decoded, StateSnapshot::empty());
}

#[test]
fn category_order_does_not_affect_hash() {
    let a = CategoryState {
        body_scale: Some("scale".to_string()),
        ..CategoryState::default()
    };
    let b = CategoryState {
        title: Some("title".to_string()),
        ..CategoryState::default()
    };

    let mut first = BTreeMap::new();
    first.insert(ObjectKind::Pet, a.clone());
    first.insert(ObjectKind::Player, b.clone());
    let mut second = BTreeMap::new();
    second.insert(ObjectKind::Player, b);
    second.insert(ObjectKind::Pet, a);

    assert_eq!(
        StateSnapshot::new(first).aggregate_hash(),
        StateSnapshot::new(second).aggregate_hash()
    );
}

#[rstest]
#[case(&[ChangeKind::ModFiles], true)]
#[case(&[ChangeKind::ModManipulation], true)]
#[case(&[ChangeKind::ModFiles, ChangeKind::AppearanceDescription], false)]
#[case(&[ChangeKind::AppearanceDescription], false)]
#[case(&[ChangeKind::Palette, ChangeKind::TitleText], false)]
fn redraw_requirement(#[case] kinds: &[ChangeKind], #[case] expected: bool) {
    let mut changes = ChangeSet::default();
    for kind in kinds {
        changes.insert(ObjectKind::Player, *kind);
    }
    assert_eq!(changes.needs_redraw(ObjectKind::Player), expected);
}

#[rstest]
#[case(ChangeKind::Palette, Some("p"))]
#[case(ChangeKind::BodyScale, Some("b"))]
#[case(ChangeKind::HeelsOffset, Some("h"))]
#[case(ChangeKind::TitleText, Some("t"))]
#[case(ChangeKind::AppearanceDescription, Some("a"))]
#[case(ChangeKind::ModManipulation, Some("m"))]
#[case(ChangeKind::ModFiles, None)]
fn payload_lookup_by_change_kind(#[case] kind: ChangeKind, #[case] expected: Option<&str>) {
    let state = CategoryState {
        assets: vec![],
        appearance: Some("a".to_string()),
        body_scale: Some("b".to_string()),
        palette: Some("p".to_string()),
        heels_offset: Some("h".to_string()),
        title: Some("t".to_string()),
        manipulation: Some("m".to_string()),
    };
    assert_eq!(state.payload(kind), expected);
}
