//! Unit tests for configuration loading and validation

use dump_manager::config::{load_config, validate_selection, ConfigError};
use test_utils::{ConfigBuilder, ResultAssertions, ServiceKind, StoreKind, TestContext};

#[test]
fn test_config_loading_valid() {
    let ctx = TestContext::from_builder(ConfigBuilder::tarball().with_schedule("0 3 * * *"));
    let path = ctx.config_path().unwrap();

    let loaded = load_config(path).assert_ok();
    assert_eq!(loaded.global.schedule.as_deref(), Some("0 3 * * *"));
    assert!(loaded.tarball.compress);
    assert_eq!(loaded.tarball.name, "data");
}

#[test]
fn test_config_loading_invalid_toml() {
    let ctx = TestContext::new();
    let path = ctx.create_file("config.toml", "invalid { toml content");

    let result = load_config(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_config_rejects_bad_schedule() {
    let ctx = TestContext::new();
    let path = ctx.create_file("config.toml", "[global]\nschedule = \"61 * * * *\"\n");

    load_config(&path).assert_err_contains("schedule");
}

#[test]
fn test_sections_are_optional() {
    let ctx = TestContext::new();
    let path = ctx.create_file("config.toml", "[consul]\nbinary = \"/usr/local/bin/consul\"\n");

    let loaded = load_config(&path).assert_ok();
    assert_eq!(loaded.consul.binary.to_str(), Some("/usr/local/bin/consul"));
    assert_eq!(loaded.global.max_backups, 5);
    assert_eq!(loaded.postgres.host, "localhost");
}

#[test]
fn test_password_file_overrides_inline_password() {
    let ctx = TestContext::new();
    let password = ctx.create_password_file("from-file\n");
    let path = ctx.create_file(
        "config.toml",
        &format!(
            "[mysql]\npassword = \"inline\"\npassword_file = \"{}\"\n",
            password.display()
        ),
    );

    let loaded = load_config(&path).assert_ok();
    assert_eq!(loaded.mysql.resolved_password().as_deref(), Some("from-file"));
}

#[test]
fn test_selection_checks_required_sections() {
    let config = ConfigBuilder::new().build();

    validate_selection(&config, ServiceKind::Tarball, StoreKind::Filesystem).assert_err_contains("tarball.path");
    validate_selection(&config, ServiceKind::Consul, StoreKind::S3).assert_err_contains("s3.bucket");

    let config = ConfigBuilder::tarball().with_s3_bucket("backups").build();
    validate_selection(&config, ServiceKind::Tarball, StoreKind::S3).assert_ok();
}
