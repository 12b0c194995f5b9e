use std::sync::Arc;

use tempfile::tempdir;

use canvas_scaler::config::{ConfigError, LoggingConfig, PipelineConfig, DEFAULT_MIN_BATCH_LEN};
use canvas_scaler::logging::init_logging;
use canvas_scaler::scaling::{ManualViewport, RescalePipeline, ScalingError};

#[test]
fn empty_document_gives_defaults() {
    let config = PipelineConfig::from_toml_str("").unwrap();
    assert_eq!(config, PipelineConfig::default());
    assert_eq!(config.worker_threads, 0);
    assert_eq!(config.min_batch_len, DEFAULT_MIN_BATCH_LEN);
    assert_eq!(config.logging, LoggingConfig { filter: None, ansi: true });
}

#[test]
fn full_document_is_parsed() {
    let config = PipelineConfig::from_toml_str(
        r#"
        worker_threads = 3
        min_batch_len = 128

        [logging]
        filter = "canvas_scaler=debug"
        ansi = false
        "#,
    )
    .unwrap();

    assert_eq!(config.worker_threads, 3);
    assert_eq!(config.min_batch_len, 128);
    assert_eq!(config.logging.filter.as_deref(), Some("canvas_scaler=debug"));
    assert!(!config.logging.ansi);
}

#[test]
fn bad_documents_are_rejected() {
    assert!(matches!(PipelineConfig::from_toml_str("min_batch_len = 0"), Err(ConfigError::Invalid { field: "min_batch_len", .. })));
    assert!(matches!(PipelineConfig::from_toml_str("[logging]\nfilter = \"  \""), Err(ConfigError::Invalid { .. })));
    assert!(matches!(PipelineConfig::from_toml_str("worker_threads = -1"), Err(ConfigError::Parse(_))));
    assert!(matches!(PipelineConfig::from_toml_str("unknown_key = 1"), Err(ConfigError::Parse(_))));
}

#[test]
fn load_reads_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pipeline.toml");
    std::fs::write(&path, "worker_threads = 2\n[logging]\nansi = false\n").unwrap();

    let config = PipelineConfig::load(&path).unwrap();
    assert_eq!(config.worker_threads, 2);
    assert!(!config.logging.ansi);

    let missing = PipelineConfig::load(dir.path().join("missing.toml"));
    assert!(matches!(missing, Err(ConfigError::Io { .. })));
}

#[test]
fn pipeline_rejects_invalid_config() {
    let config = PipelineConfig { min_batch_len: 0, ..PipelineConfig::default() };
    let result = RescalePipeline::new(Arc::new(ManualViewport::new(800, 600)), &config);
    assert!(matches!(result, Err(ScalingError::Config(ConfigError::Invalid { .. }))));
}

#[test]
fn logging_initializes_once() {
    let config = LoggingConfig { filter: Some("canvas_scaler=trace".into()), ansi: false };
    init_logging(&config);
    init_logging(&LoggingConfig::default());
    tracing::info!("still alive");
}
