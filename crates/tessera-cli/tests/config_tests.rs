use std::io::Write;
use tessera_cli::CliConfig;

#[tokio::test]
async fn load_writes_default_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("tessera.toml");

    let config = CliConfig::load(&path).await.unwrap();

    assert_eq!(config, CliConfig::default());
    assert!(path.exists());
    let reloaded = CliConfig::load(&path).await.unwrap();
    assert_eq!(reloaded, config);
}

#[tokio::test]
async fn partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.toml");
    std::fs::write(
        &path,
        r#"
[server]
tensor_parallel_size = 4
use_pmx = true
quant_method = "online_i8i8"

[rendezvous]
timeout_ms = 30000
"#,
    )
    .unwrap();

    let config = CliConfig::load(&path).await.unwrap();

    assert_eq!(config.server.tensor_parallel_size, 4);
    assert!(config.server.use_alternate_model_format);
    assert_eq!(config.server.quant_method, "online_i8i8");
    assert!((config.server.max_tokens_scale - 0.8).abs() < f32::EPSILON);
    assert_eq!(config.rendezvous.timeout_ms, Some(30000));
    assert_eq!(config.model.num_layers, 32);
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn malformed_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.toml");
    std::fs::write(&path, "[server\ntensor_parallel_size = ").unwrap();

    let err = CliConfig::load(&path).await.unwrap_err();
    assert!(err.is_config_error());
}

#[tokio::test]
async fn save_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.toml");
    let mut config = CliConfig::default();
    config.model.cache_quant_bit = 8;
    config.model.cache_quant_group = 64;
    config.simulation.devices = 8;

    config.save(&path).await.unwrap();
    let loaded = CliConfig::load(&path).await.unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn model_config_path_overrides_inline_model() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"num_layers": 40, "num_heads": 40, "num_kv_heads": 8, "hidden_dim": 5120}}"#
    )
    .unwrap();

    let config = CliConfig {
        model_config_path: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    let model = config.resolve_model().unwrap();
    assert_eq!(model.num_layers, 40);
    assert_eq!(model.cache_quant_bit, 0);
}

#[test]
fn validate_rejects_bad_quant_bit() {
    let mut config = CliConfig::default();
    config.model.cache_quant_bit = 3;
    assert!(config.validate().unwrap_err().is_config_error());
}
