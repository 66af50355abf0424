use super::*;

#[derive(Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
struct Counter {
    n: u32,
}

impl Checkpoint for Counter {
    const KIND: &'static str = "counter";

    fn merge(&mut self, newer: Self) {
        self.n = self.n.max(newer.n);
    }
}

#[test]
fn missing_file_is_no_prior_progress() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(Counter::load(&dir.path().join("c.json")).unwrap(), None);
}

#[test]
fn persist_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/c.json");
    Counter { n: 7 }.persist(&path).unwrap();
    assert_eq!(Counter::load(&path).unwrap(), Some(Counter { n: 7 }));
    assert!(!dir.path().join("nested/c.json.tmp").exists());
}

#[test]
fn corrupt_file_is_checkpoint_io_and_lenient_load_ignores_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.json");
    std::fs::write(&path, b"{ not json").unwrap();

    assert!(matches!(Counter::load(&path), Err(ForgeError::CheckpointIo(_))));
    assert_eq!(Counter::load_lenient(&path), None);
}

#[test]
fn stale_temp_file_does_not_shadow_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.json");
    Counter { n: 1 }.persist(&path).unwrap();
    std::fs::write(dir.path().join("c.json.tmp"), b"half writ").unwrap();

    assert_eq!(Counter::load(&path).unwrap(), Some(Counter { n: 1 }));
    Counter { n: 2 }.persist(&path).unwrap();
    assert_eq!(Counter::load(&path).unwrap(), Some(Counter { n: 2 }));
}
