//! Integration tests for layered configuration loading
//!
//! Precedence, lowest first: built-in defaults, the user file under
//! XDG_CONFIG_HOME, an explicit file, then TABMIND__ environment variables.

use std::fs;
use tabmind::config::{global_config_path, ConfigLoader};
use tabmind::model::TemperaturePolicy;
use tempfile::TempDir;

use crate::integration::with_xdg_env;

fn write_user_config(test_dir: &TempDir, contents: &str) {
    let dir = test_dir.path().join("tabmind");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_defaults_without_any_file() {
    let test_dir = TempDir::new().unwrap();
    let config = with_xdg_env(&test_dir, || ConfigLoader::load().unwrap());

    assert_eq!(config.cache.capacity, 50);
    assert_eq!(config.agent.max_content_chars, 2_000);
    assert_eq!(config.agent.probe_timeout_ms, 3_000);
    assert_eq!(config.provider.base_url, "http://localhost:11434");
    assert_eq!(config.sampling.prompt, TemperaturePolicy::ProviderDefault);
}

#[test]
fn test_user_file_under_xdg_config_home() {
    let test_dir = TempDir::new().unwrap();
    write_user_config(&test_dir, "[cache]\ncapacity = 9\n");

    let (path, config) = with_xdg_env(&test_dir, || {
        (global_config_path(), ConfigLoader::load().unwrap())
    });

    assert_eq!(
        path,
        Some(test_dir.path().join("tabmind").join("config.toml"))
    );
    assert_eq!(config.cache.capacity, 9);
}

#[test]
fn test_explicit_file_overrides_user_file() {
    let test_dir = TempDir::new().unwrap();
    write_user_config(
        &test_dir,
        "[cache]\ncapacity = 9\n\n[provider]\nmodel = \"user-model\"\n",
    );
    let explicit = test_dir.path().join("explicit.toml");
    fs::write(&explicit, "[provider]\nmodel = \"explicit-model\"\n").unwrap();

    let config = with_xdg_env(&test_dir, || ConfigLoader::load_from_file(&explicit).unwrap());

    assert_eq!(config.provider.model, "explicit-model");
    assert_eq!(config.cache.capacity, 9, "unset keys keep the user file value");
}

#[test]
fn test_environment_overrides_files() {
    let test_dir = TempDir::new().unwrap();
    write_user_config(&test_dir, "[cache]\ncapacity = 9\n");

    let config = with_xdg_env(&test_dir, || {
        std::env::set_var("TABMIND__CACHE__CAPACITY", "12");
        let config = ConfigLoader::load();
        std::env::remove_var("TABMIND__CACHE__CAPACITY");
        config.unwrap()
    });

    assert_eq!(config.cache.capacity, 12);
}

#[test]
fn test_invalid_layer_is_rejected() {
    let test_dir = TempDir::new().unwrap();
    write_user_config(&test_dir, "[agent]\nmax_content_chars = 0\n");

    let err = with_xdg_env(&test_dir, || ConfigLoader::load().unwrap_err());
    assert!(err.to_string().contains("max_content_chars"));
}

#[test]
fn test_sampling_policy_from_file() {
    let test_dir = TempDir::new().unwrap();
    write_user_config(
        &test_dir,
        "[sampling.prompt]\nmode = \"fixed\"\nvalue = 0.2\n\n[sampling.suggestions]\nmode = \"scaled\"\nfactor = 1.5\n",
    );

    let config = with_xdg_env(&test_dir, || ConfigLoader::load().unwrap());

    assert_eq!(config.sampling.prompt, TemperaturePolicy::Fixed { value: 0.2 });
    assert_eq!(
        config.sampling.suggestions,
        TemperaturePolicy::Scaled { factor: 1.5 }
    );
}
