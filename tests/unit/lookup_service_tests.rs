/*!
 * Tests for the dictionary lookup service and its cache
 */

use std::sync::Arc;

use lingocap::app_config::ModelRole;
use lingocap::engines::mock::MockEngineFactory;
use lingocap::lookup::LookupService;

use crate::common;

#[tokio::test]
async fn test_lookup_shouldReturnStructuredResult() {
    let (_, manager, _) = common::build_test_service(MockEngineFactory::working());
    let service = LookupService::new(manager, 16);

    let result = service.lookup("harbor", None, "ja").await.unwrap();
    assert_eq!(result.word, "harbor");
    assert!(!result.part_of_speech.is_empty());
    assert!(!result.meanings.is_empty());
}

#[tokio::test]
async fn test_lookup_withEmptyWord_shouldReturnInvalidInput() {
    let (_, manager, _) = common::build_test_service(MockEngineFactory::working());
    let service = LookupService::new(manager, 16);

    let err = service.lookup("   ", None, "ja").await.unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
}

#[tokio::test]
async fn test_lookup_withInvalidTargetLanguage_shouldReturnInvalidInput() {
    let (_, manager, _) = common::build_test_service(MockEngineFactory::working());
    let service = LookupService::new(manager, 16);

    let err = service.lookup("harbor", None, "zz").await.unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
}

#[tokio::test]
async fn test_lookup_repeatedQuery_shouldHitCache() {
    let (_, manager, _) = common::build_test_service(MockEngineFactory::working());
    let service = LookupService::new(manager, 16);

    let first = service.lookup("harbor", None, "ja").await.unwrap();
    let second = service.lookup("harbor", None, "ja").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(service.cache_len(), 1);
}

#[tokio::test]
async fn test_lookup_withDifferentContext_shouldBeCachedSeparately() {
    let (_, manager, _) = common::build_test_service(MockEngineFactory::working());
    let service = LookupService::new(manager, 16);

    service.lookup("bank", None, "ja").await.unwrap();
    service
        .lookup("bank", Some("the river bank"), "ja")
        .await
        .unwrap();
    assert_eq!(service.cache_len(), 2);
}

#[tokio::test]
async fn test_lookup_afterModelSwitch_shouldMissCache() {
    let factory = MockEngineFactory::working();
    let (_, manager, _) = common::build_test_service(factory.clone());
    let service = LookupService::new(Arc::clone(&manager), 16);

    service.lookup("harbor", None, "ja").await.unwrap();
    manager
        .switch_model(ModelRole::Lookup, "qwen3-4b")
        .await
        .unwrap();
    service.lookup("harbor", None, "ja").await.unwrap();

    // Two cache entries keyed by model id
    assert_eq!(service.cache_len(), 2);

    // The switch reloaded the lookup role
    let loads = factory
        .journal()
        .iter()
        .filter(|e| e.starts_with("load lookup"))
        .count();
    assert_eq!(loads, 2);
}

#[tokio::test]
async fn test_lookup_withFailingInference_shouldReturnInferenceFailure() {
    let (_, manager, _) = common::build_test_service(MockEngineFactory::failing_inference());
    let service = LookupService::new(manager, 16);

    let err = service.lookup("harbor", None, "ja").await.unwrap_err();
    assert_eq!(err.kind(), "InferenceFailure");
    assert_eq!(service.cache_len(), 0);
}
