//! Integration tests for configuration loading and config-driven stacks

use ctxstack::config::{ConfigLoader, EngineKind, StackConfig};
use ctxstack::error::StackError;
use ctxstack::save::commit;
use ctxstack::stack::ContextStack;
use std::fs;
use tempfile::TempDir;

use crate::integration::{with_xdg_env, write_model_bundle};

fn memory_config(bundle_dir: &std::path::Path) -> StackConfig {
    let mut config = StackConfig::default();
    config.schema.bundle_dir = bundle_dir.to_path_buf();
    config.store.engine = EngineKind::Memory;
    config
}

#[test]
fn test_memory_stack_from_config() {
    let temp_dir = TempDir::new().unwrap();
    write_model_bundle(&temp_dir.path().join("schemas"));
    let config = memory_config(&temp_dir.path().join("schemas"));

    let stack = ContextStack::from_config(&config).unwrap();
    assert!(stack.store_path().is_none());

    let interactive = stack.interactive();
    interactive.insert("TestEntity").unwrap();
    commit(interactive).unwrap();
    assert_eq!(interactive.count("TestEntity", None).unwrap(), 1);
}

#[test]
fn test_sled_stack_from_config_uses_configured_directory() {
    let temp_dir = TempDir::new().unwrap();
    write_model_bundle(&temp_dir.path().join("schemas"));
    let mut config = StackConfig::default();
    config.schema.bundle_dir = temp_dir.path().join("schemas");
    config.store.directory = Some(temp_dir.path().join("data"));
    config.store.file_name = "configured.db".to_string();

    let stack = ContextStack::from_config(&config).unwrap();
    assert_eq!(
        stack.store_path().unwrap(),
        temp_dir.path().join("data").join("configured.db")
    );
    stack.close().unwrap();
}

#[test]
fn test_invalid_config_is_rejected_before_opening() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = memory_config(&temp_dir.path().join("schemas"));
    config.store.file_name = String::new();
    config.logging.level = "loud".to_string();

    let err = ContextStack::from_config(&config).unwrap_err();
    match err {
        StackError::ConfigError(message) => {
            assert!(message.contains("file_name") || message.contains("file name"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_workspace_file_and_env_layering() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    fs::create_dir_all(workspace.join("config")).unwrap();
    fs::write(
        workspace.join("config").join("config.toml"),
        r#"
[schema]
name = "Inventory"

[store]
engine = "memory"
file_name = "from-workspace.db"
"#,
    )
    .unwrap();

    let config = with_xdg_env(&temp_dir, || {
        std::env::set_var("CTXSTACK__STORE__FILE_NAME", "from-env.db");
        let loaded = ConfigLoader::load(&workspace);
        std::env::remove_var("CTXSTACK__STORE__FILE_NAME");
        loaded
    })
    .unwrap();

    assert_eq!(config.schema.name, "Inventory");
    assert_eq!(config.store.engine, EngineKind::Memory);
    assert_eq!(config.store.file_name, "from-env.db");
}

#[test]
fn test_global_file_is_overridden_by_workspace() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    fs::create_dir_all(workspace.join("config")).unwrap();
    fs::write(
        workspace.join("config").join("config.toml"),
        "[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();

    let config = with_xdg_env(&temp_dir, || {
        let global = ConfigLoader::global_config_path().unwrap();
        fs::create_dir_all(global.parent().unwrap()).unwrap();
        fs::write(
            &global,
            "[logging]\nlevel = \"warn\"\n\n[schema]\nname = \"Global\"\n",
        )
        .unwrap();
        ConfigLoader::load(&workspace)
    })
    .unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.schema.name, "Global");
}
