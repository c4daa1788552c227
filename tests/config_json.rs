use std::path::PathBuf;

use parconv::{Kernel, MagnitudeMode, ParconvError, PipelineConfig, Strategy};

fn write_config(name: &str, json: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("config_json");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, json).unwrap();
    path
}

#[test]
fn full_config_file_builds_the_described_pipeline() {
    let path = write_config(
        "full.json",
        r#"{
            "workers": 3,
            "strategy": "rayon-rows",
            "magnitude": "euclidean",
            "luma": { "r": 0.2126, "g": 0.7152, "b": 0.0722 },
            "kernels": { "blur": [[0, 0, 0], [0, 1, 0], [0, 0, 0]] }
        }"#,
    );
    let cfg = PipelineConfig::load(&path).unwrap();
    assert_eq!(cfg.workers, Some(3));
    assert_eq!(cfg.strategy, Strategy::RayonRows);
    assert_eq!(cfg.magnitude, MagnitudeMode::Euclidean);

    let pipeline = cfg.build_pipeline(16).unwrap();
    assert_eq!(pipeline.stage().workers(), 3);
    assert_eq!(pipeline.stage().strategy(), Strategy::RayonRows);
    assert_eq!(pipeline.magnitude(), MagnitudeMode::Euclidean);
    assert_eq!(pipeline.kernels().blur, Kernel::identity(3).unwrap());
}

#[test]
fn sequential_config_ignores_worker_count() {
    let cfg = PipelineConfig::from_json_str(r#"{ "workers": 8, "strategy": "sequential" }"#)
        .unwrap();
    assert_eq!(cfg.build_pipeline(4).unwrap().stage().workers(), 1);
}

#[test]
fn missing_file_is_a_config_error() {
    let err = PipelineConfig::load(&PathBuf::from("target/config_json/absent.json")).unwrap_err();
    assert!(matches!(err, ParconvError::Config(_)), "{err}");
}

#[test]
fn ragged_kernel_is_rejected() {
    let path = write_config(
        "ragged.json",
        r#"{ "kernels": { "horizontal": [[1, 0, -1], [2, 0], [1, 0, -1]] } }"#,
    );
    let err = PipelineConfig::load(&path).unwrap_err();
    assert!(
        matches!(&err, ParconvError::InvalidKernel(msg) if msg.contains("kernels.horizontal")),
        "{err}"
    );
}
