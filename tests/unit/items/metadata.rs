use super::*;

fn write_metadata(layout: &BatchLayout, key: BatchKey, json: &str) {
    let path = layout.metadata_path(key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, json).unwrap();
}

#[test]
fn attributes_resolve_against_layers_dir() {
    let entry: MetadataEntry = serde_json::from_str(
        r#"{
            "edition": 4,
            "attributes": [
                { "trait_type": "Background", "value": "Blue" },
                { "layer": "Eyes", "value": "Closed", "file": "Eyes/closed@2x.png" },
                { "layer": "Hat", "value": "Cap", "file": "/abs/cap.png" }
            ]
        }"#,
    )
    .unwrap();
    let item = entry.to_item(Path::new("/layers"));
    assert_eq!(item.index, 4);
    assert_eq!(
        item.source_for("Background"),
        Some(&PathBuf::from("/layers/Background/Blue.png"))
    );
    assert_eq!(
        item.source_for("Eyes"),
        Some(&PathBuf::from("/layers/Eyes/closed@2x.png"))
    );
    assert_eq!(item.source_for("Hat"), Some(&PathBuf::from("/abs/cap.png")));
}

#[test]
fn missing_metadata_skips_only_that_batch() {
    let dir = tempfile::tempdir().unwrap();
    let layout = BatchLayout::new(dir.path(), 2);
    let first = BatchKey { start: 1, end: 2 };
    let second = BatchKey { start: 3, end: 4 };
    write_metadata(
        &layout,
        first,
        r#"[{"index":1,"attributes":[]},{"index":2,"attributes":[]},{"index":9,"attributes":[]}]"#,
    );
    std::fs::create_dir_all(layout.batch_dir(second)).unwrap();

    assert!(matches!(
        load_batch_items(&layout, second, Path::new("layers")),
        Err(ForgeError::MetadataMissing(_))
    ));

    let plan = load_item_plan(&layout, Path::new("layers")).unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.max_index(), Some(2));
    assert_eq!(plan.skipped_batches(), &[second]);
}

#[test]
fn corrupt_metadata_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let layout = BatchLayout::new(dir.path(), 2);
    let key = BatchKey { start: 1, end: 2 };
    write_metadata(&layout, key, "{ not json");

    let plan = load_item_plan(&layout, Path::new("layers")).unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.skipped_batches(), &[key]);
}
