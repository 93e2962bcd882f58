/*!
 * Tests for configuration loading, validation and persistence
 */

use lingocap::app_config::{Config, ModelRole};

use crate::common;

#[test]
fn test_default_config_shouldValidate() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.target_language, "ja");
    assert_eq!(config.models.get(ModelRole::Asr), "qwen3-asr-1.7b");
    assert_eq!(config.models.get(ModelRole::Translator), "qwen3-1.7b");
}

#[test]
fn test_validate_withEmptyModelSelection_shouldFail() {
    let mut config = Config::default();
    config.models.set(ModelRole::Translator, String::new());
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withZeroPort_shouldFail() {
    let mut config = Config::default();
    config.server.port = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() {
    let temp_dir = common::create_temp_dir().unwrap();
    let path = temp_dir.path().join("conf.json");

    let config = Config::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.target_language, "ja");

    // A second load reads the file it just wrote
    let reloaded = Config::load_or_create(&path).unwrap();
    assert_eq!(reloaded.server.port, config.server.port);
}

#[test]
fn test_save_thenLoad_shouldPreserveModelSelection() {
    let temp_dir = common::create_temp_dir().unwrap();
    let path = temp_dir.path().join("conf.json");

    let mut config = Config::default();
    config.models.set(ModelRole::Translator, "qwen3-4b".to_string());
    config.save(&path).unwrap();

    let reloaded = Config::load_or_create(&path).unwrap();
    assert_eq!(reloaded.models.get(ModelRole::Translator), "qwen3-4b");
}

#[test]
fn test_load_or_create_withPartialFile_shouldFillDefaults() {
    let temp_dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(
        &temp_dir.path().to_path_buf(),
        "conf.json",
        r#"{ "target_language": "ko" }"#,
    )
    .unwrap();

    let config = Config::load_or_create(&path).unwrap();
    assert_eq!(config.target_language, "ko");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.models.get(ModelRole::Lookup), "qwen3-1.7b");
}

#[test]
fn test_load_or_create_withInvalidJson_shouldFail() {
    let temp_dir = common::create_temp_dir().unwrap();
    let path =
        common::create_test_file(&temp_dir.path().to_path_buf(), "conf.json", "{ not json").unwrap();
    assert!(Config::load_or_create(&path).is_err());
}

#[test]
fn test_model_role_parse_shouldRoundTrip() {
    for role in ModelRole::ALL {
        let parsed: ModelRole = role.as_str().parse().unwrap();
        assert_eq!(parsed, role);
    }
    assert!("conductor".parse::<ModelRole>().is_err());
}
