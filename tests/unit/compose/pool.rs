use std::path::Path;

use super::*;
use crate::{
    foundation::config::ImageFormat,
    items::item::{Item, LayerChoice},
};

fn write_png(path: &Path, rgba: [u8; 4]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba(rgba));
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

struct Fixture {
    _dir: tempfile::TempDir,
    layout: BatchLayout,
    plan: ItemPlan,
}

fn fixture(indices: impl IntoIterator<Item = u64>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layers = dir.path().join("layers");
    write_png(&layers.join("Bg/blue.png"), [0, 0, 255, 255]);
    write_png(&layers.join("Fg/half.png"), [255, 0, 0, 128]);
    std::fs::write(layers.join("Fg/broken.png"), b"not a png").unwrap();

    let items = indices.into_iter().map(|index| Item {
        index,
        layers: vec![
            LayerChoice {
                layer: "Bg".to_string(),
                source: layers.join("Bg/blue.png"),
            },
            LayerChoice {
                layer: "Fg".to_string(),
                source: if index % 7 == 0 {
                    layers.join("Fg/broken.png")
                } else {
                    layers.join("Fg/half.png")
                },
            },
        ],
    });
    let plan = ItemPlan::from_items(items).unwrap();
    let layout = BatchLayout::new(dir.path().join("out"), 10);
    Fixture {
        _dir: dir,
        layout,
        plan,
    }
}

fn run(fx: &Fixture, workers: usize, start: u64, end: u64) -> (PoolStats, Vec<WorkerEvent>) {
    let settings = EncodeSettings::default();
    let pool = CompositionWorkerPool::new(
        &fx.plan,
        &[],
        &fx.layout,
        &settings,
        PoolOpts {
            workers,
            channel_capacity: 2,
        },
    );
    let mut events = Vec::new();
    let stats = pool.run(start, end, |ev| events.push(ev.clone())).unwrap();
    (stats, events)
}

#[test]
fn four_workers_each_report_completion() {
    let fx = fixture(1..=20);
    let (stats, events) = run(&fx, 4, 1, 20);

    assert_eq!(stats.workers, 4);
    let mut finished: Vec<(usize, u64)> = events
        .iter()
        .filter_map(|ev| match ev {
            WorkerEvent::Finished { worker, processed } => Some((*worker, *processed)),
            _ => None,
        })
        .collect();
    finished.sort();
    assert_eq!(finished, vec![(0, 5), (1, 5), (2, 5), (3, 5)]);
    assert!(matches!(events.last(), Some(WorkerEvent::Finished { .. })));
}

#[test]
fn failures_are_reported_and_the_rest_still_render() {
    let fx = fixture(1..=20);
    let (stats, events) = run(&fx, 3, 1, 20);

    assert_eq!(stats.rendered, 18);
    assert_eq!(stats.failed, 2);
    let mut failed: Vec<u64> = events
        .iter()
        .filter_map(|ev| match ev {
            WorkerEvent::Failed { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    failed.sort();
    assert_eq!(failed, vec![7, 14]);

    for i in (1..=20).filter(|i| i % 7 != 0) {
        assert!(fx.layout.image_path(i, ImageFormat::Png).is_file(), "{i}");
    }
    assert!(!fx.layout.image_path(7, ImageFormat::Png).exists());
}

#[test]
fn single_worker_matches_parallel_output() {
    let serial = fixture(1..=12);
    let parallel = fixture(1..=12);
    let (a, _) = run(&serial, 1, 1, 12);
    let (b, _) = run(&parallel, 4, 1, 12);
    assert_eq!((a.rendered, a.failed), (b.rendered, b.failed));
    assert_eq!(a.workers, 1);

    for i in (1..=12).filter(|i| i % 7 != 0) {
        let x = std::fs::read(serial.layout.image_path(i, ImageFormat::Png)).unwrap();
        let y = std::fs::read(parallel.layout.image_path(i, ImageFormat::Png)).unwrap();
        assert_eq!(x, y, "{i}");
    }
}

#[test]
fn unplanned_indices_are_skipped_silently() {
    let fx = fixture([1, 2, 3, 11, 12]);
    let (stats, events) = run(&fx, 2, 1, 12);

    assert_eq!(stats.rendered, 5);
    let processed: u64 = events
        .iter()
        .filter_map(|ev| match ev {
            WorkerEvent::Finished { processed, .. } => Some(*processed),
            _ => None,
        })
        .sum();
    assert_eq!(processed, 5);
    assert!(events.iter().all(|ev| match ev {
        WorkerEvent::Rendered { index, .. } | WorkerEvent::Failed { index, .. } =>
            fx.plan.get(*index).is_some(),
        WorkerEvent::Finished { .. } => true,
    }));
}

#[test]
fn empty_range_runs_no_workers() {
    let fx = fixture(1..=3);
    let (stats, events) = run(&fx, 4, 5, 4);
    assert_eq!(stats, PoolStats::default());
    assert!(events.is_empty());
}

#[test]
fn zero_workers_resolves_to_at_least_one() {
    assert!(resolve_worker_count(0) >= 1);
    assert_eq!(resolve_worker_count(6), 6);
}

