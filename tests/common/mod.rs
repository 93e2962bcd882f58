/*!
 * Common test utilities for the lingocap test suite
 */

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tempfile::TempDir;

use lingocap::app_config::Config;
use lingocap::audio_extractor::StubExtractor;
use lingocap::engines::mock::MockEngineFactory;
use lingocap::model_manager::ModelManager;
use lingocap::pipeline::PipelineService;
use lingocap::progress::ProgressEvent;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &PathBuf, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Creates a sample subtitle file for testing
pub fn create_test_subtitle(dir: &PathBuf, filename: &str) -> Result<PathBuf> {
    let content = r#"1
00:00:01,000 --> 00:00:04,000
This is a test subtitle.

2
00:00:05,000 --> 00:00:09,000
It contains multiple entries.

3
00:00:10,000 --> 00:00:14,000
For testing purposes.
"#;
    create_test_file(dir, filename, content)
}

/// Creates a placeholder video file; only its existence matters because
/// tests run on the stub audio extractor
pub fn create_test_video(dir: &PathBuf, filename: &str) -> Result<PathBuf> {
    create_test_file(dir, filename, "not a real container")
}

/// Wires a pipeline service over mock engines and the stub extractor
pub fn build_test_service(
    factory: MockEngineFactory,
) -> (
    Arc<PipelineService>,
    Arc<ModelManager>,
    Arc<RwLock<Config>>,
) {
    let config = Arc::new(RwLock::new(Config::default()));
    let manager = Arc::new(ModelManager::new(
        Arc::new(factory),
        Arc::clone(&config),
        None,
    ));
    let pipeline = Arc::new(PipelineService::new(
        Arc::clone(&manager),
        Arc::new(StubExtractor),
        Arc::clone(&config),
    ));
    (pipeline, manager, config)
}

/// Collects a job's full event log, waiting until it reaches a terminal event
pub async fn collect_events(job: &Arc<lingocap::pipeline::Job>) -> Vec<ProgressEvent> {
    use futures::StreamExt;
    job.log.subscribe().collect().await
}
