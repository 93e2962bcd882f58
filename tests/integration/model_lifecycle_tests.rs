/*!
 * Tests for model switching while jobs are in flight
 */

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use lingocap::app_config::{Config, ModelRole};
use lingocap::engines::mock::MockEngineFactory;
use lingocap::model_manager::{LoadState, ModelManager};
use lingocap::pipeline::TranslateRequest;
use lingocap::progress::status;

use crate::common;

#[tokio::test]
async fn test_switch_duringTranslateJob_shouldCutInBetweenSegments() {
    let factory = MockEngineFactory::slow(150);
    let (pipeline, manager, _) = common::build_test_service(factory.clone());
    let temp_dir = common::create_temp_dir().unwrap();
    let srt = common::create_test_subtitle(&temp_dir.path().to_path_buf(), "show.srt").unwrap();

    let job = pipeline
        .submit_translate(TranslateRequest {
            subtitle_path: srt,
            source_language: None,
            target_language: Some("ja".to_string()),
        })
        .unwrap();

    // Let the first segment start, then swap the translator model
    tokio::time::sleep(Duration::from_millis(50)).await;
    let status_after = manager
        .switch_model(ModelRole::Translator, "qwen3-4b")
        .await
        .unwrap();
    assert_eq!(status_after.state, LoadState::Loaded);

    let events = common::collect_events(&job).await;
    assert_eq!(
        events.last().unwrap().status.as_deref(),
        Some(status::DONE)
    );

    // The old engine was released before the new one was loaded, and the
    // job finished on the new model without reloading the old one
    let journal = factory.journal();
    assert_eq!(
        journal,
        vec![
            "load translator qwen3-1.7b",
            "unload translator qwen3-1.7b",
            "load translator qwen3-4b",
        ]
    );
}

#[tokio::test]
async fn test_switch_shouldPersistSelectionToConfigFile() {
    let temp_dir = common::create_temp_dir().unwrap();
    let config_path = temp_dir.path().join("conf.json");
    let config = Arc::new(RwLock::new(Config::default()));
    let manager = ModelManager::new(
        Arc::new(MockEngineFactory::working()),
        Arc::clone(&config),
        Some(config_path.clone()),
    );

    manager
        .switch_model(ModelRole::Translator, "qwen3-4b")
        .await
        .unwrap();

    let reloaded = Config::load_or_create(&config_path).unwrap();
    assert_eq!(reloaded.models.get(ModelRole::Translator), "qwen3-4b");
    // Other roles keep their defaults
    assert_eq!(reloaded.models.get(ModelRole::Asr), "qwen3-asr-1.7b");
}

#[tokio::test]
async fn test_failedSwitch_shouldKeepServingOnNextAcquire() {
    // A rejected switch leaves the resident model and selection untouched
    let factory = MockEngineFactory::working();
    let (_, manager, _) = common::build_test_service(factory.clone());

    drop(manager.acquire_translator().await.unwrap());
    let err = manager
        .switch_model(ModelRole::Translator, "unknown-model")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidModel");

    let lease = manager.acquire_translator().await.unwrap();
    assert_eq!(lease.model_id(), "qwen3-1.7b");
}
