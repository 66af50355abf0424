use super::*;

fn item(index: u64, layers: &[(&str, &str)]) -> Item {
    Item {
        index,
        layers: layers
            .iter()
            .map(|(l, s)| LayerChoice {
                layer: l.to_string(),
                source: PathBuf::from(s),
            })
            .collect(),
    }
}

#[test]
fn ordered_sources_follow_layer_order() {
    let it = item(
        1,
        &[("Eyes", "e.png"), ("Background", "bg.png"), ("Hat", "h.png")],
    );
    let order = vec![
        "Background".to_string(),
        "Body".to_string(),
        "Eyes".to_string(),
    ];
    let names: Vec<&str> = it.ordered_sources(&order).iter().map(|(n, _)| *n).collect();
    assert_eq!(names, vec!["Background", "Eyes"]);

    let own: Vec<&str> = it.ordered_sources(&[]).iter().map(|(n, _)| *n).collect();
    assert_eq!(own, vec!["Eyes", "Background", "Hat"]);
}

#[test]
fn plan_rejects_duplicate_and_zero_indices() {
    let mut plan = ItemPlan::new();
    plan.insert(item(3, &[])).unwrap();
    assert!(plan.insert(item(3, &[])).is_err());
    assert!(plan.insert(item(0, &[])).is_err());
    assert_eq!(plan.len(), 1);
}

#[test]
fn plan_counts_and_bounds() {
    let plan = ItemPlan::from_items([item(5, &[]), item(1, &[]), item(12, &[])]).unwrap();
    assert_eq!(plan.max_index(), Some(12));
    assert_eq!(plan.count_in(1..=10), 2);
    assert_eq!(plan.count_in(6..=11), 0);
    let order: Vec<u64> = plan.iter().map(|i| i.index).collect();
    assert_eq!(order, vec![1, 5, 12]);
}
