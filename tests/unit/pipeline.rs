use std::path::{Path, PathBuf};

use super::*;
use crate::{
    foundation::config::ImageFormat,
    items::item::{Item, LayerChoice},
};

struct Fixture {
    _dir: tempfile::TempDir,
    cfg: PipelineConfig,
    plan: ItemPlan,
}

fn write_png(path: &Path, rgba: [u8; 4]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbaImage::from_pixel(3, 3, image::Rgba(rgba))
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

fn fixture(n: u64) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let bg = dir.path().join("layers/Bg/a.png");
    write_png(&bg, [10, 20, 30, 255]);
    let plan = ItemPlan::from_items((1..=n).map(|index| Item {
        index,
        layers: vec![LayerChoice {
            layer: "Bg".to_string(),
            source: bg.clone(),
        }],
    }))
    .unwrap();
    let cfg = PipelineConfig {
        output_root: dir.path().join("out"),
        layers_dir: dir.path().join("layers"),
        num_workers: 2,
        batch_size: 10,
        checkpoint_interval: 4,
        ..PipelineConfig::default()
    };
    Fixture {
        _dir: dir,
        cfg,
        plan,
    }
}

fn image_path(fx: &Fixture, index: u64) -> PathBuf {
    BatchLayout::new(&fx.cfg.output_root, 10).image_path(index, ImageFormat::Png)
}

fn checkpoint_path(fx: &Fixture) -> PathBuf {
    BatchLayout::new(&fx.cfg.output_root, 10).generation_checkpoint()
}

#[test]
fn fresh_run_renders_everything_and_completes() {
    let fx = fixture(25);
    let summary = generate_items(&fx.cfg, &fx.plan).unwrap();

    assert_eq!(summary.resume, ResumePoint::Fresh);
    assert_eq!((summary.start_index, summary.end_index), (1, 25));
    assert_eq!(summary.rendered, 25);
    assert_eq!(summary.generated_total, 25);
    assert!(image_path(&fx, 23).ends_with("21-30/img/23.png"));
    assert!(image_path(&fx, 23).is_file());

    let cp = GenerationProgress::load(&checkpoint_path(&fx)).unwrap().unwrap();
    assert!(cp.completed);
    assert_eq!(cp.current_index, 25);
    assert_eq!(cp.total_to_generate, 25);
}

#[test]
fn interrupted_run_resumes_after_the_high_water_mark() {
    let fx = fixture(20);
    let mut prior = GenerationProgress::fresh(1, 20, 20, ImageFormat::Png, 10);
    prior.current_index = 12;
    prior.generated = 12;
    prior.persist(&checkpoint_path(&fx)).unwrap();

    let summary = generate_items(&fx.cfg, &fx.plan).unwrap();
    assert_eq!(summary.resume, ResumePoint::Resume { next_index: 13 });
    assert_eq!(summary.rendered, 8);
    assert_eq!(summary.generated_total, 20);
    for i in 1..=12 {
        assert!(!image_path(&fx, i).exists(), "{i} should be untouched");
    }
    for i in 13..=20 {
        assert!(image_path(&fx, i).is_file(), "{i}");
    }
}

#[test]
fn completed_checkpoint_restarts_and_force_ignores_progress() {
    let fx = fixture(5);
    generate_items(&fx.cfg, &fx.plan).unwrap();
    let again = generate_items(&fx.cfg, &fx.plan).unwrap();
    assert_eq!(again.resume, ResumePoint::RestartAfterCompletion);
    assert_eq!(again.rendered, 5);

    let mut prior = GenerationProgress::fresh(1, 5, 5, ImageFormat::Png, 10);
    prior.current_index = 3;
    prior.persist(&checkpoint_path(&fx)).unwrap();
    let forced = PipelineConfig {
        force_regenerate: true,
        ..fx.cfg.clone()
    };
    let summary = generate_items(&forced, &fx.plan).unwrap();
    assert_eq!(summary.resume, ResumePoint::Forced);
    assert_eq!(summary.start_index, 1);
}

#[test]
fn corrupt_checkpoint_counts_as_no_progress() {
    let fx = fixture(3);
    std::fs::create_dir_all(&fx.cfg.output_root).unwrap();
    std::fs::write(checkpoint_path(&fx), b"{{{{").unwrap();

    let summary = generate_items(&fx.cfg, &fx.plan).unwrap();
    assert_eq!(summary.resume, ResumePoint::Fresh);
    assert_eq!(summary.rendered, 3);
}

#[test]
fn status_reads_both_checkpoints_without_writing() {
    let fx = fixture(4);
    let empty = status(&fx.cfg).unwrap();
    assert_eq!(empty, StatusReport::default());
    assert!(!fx.cfg.output_root.exists());

    generate_items(&fx.cfg, &fx.plan).unwrap();
    let report = status(&fx.cfg).unwrap();
    assert_eq!(report.batches.len(), 1);
    assert!(report.generation.as_ref().unwrap().completed);
    assert!(report.upload.is_none());
    assert!(report.to_string().contains("4/4 generated"));
}
