use compseg::config::{NetConfig, Variant};
use compseg::models::{CompSegNet3, CompSegNetGrader};
use std::fs;

#[test]
fn toml_fills_missing_fields_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("net.toml");
    fs::write(
        &path,
        "variant = \"comp_seg3\"\nn_channels = 1\nn_classes = 2\nbilinear = true\nbase_width = 4\n",
    )
    .unwrap();
    let cfg = NetConfig::from_path(path.to_str().unwrap()).unwrap();
    assert_eq!(cfg.variant, Variant::CompSeg3);
    assert!(cfg.bilinear);
    assert_eq!(cfg.alpha, 0.1);
    assert_eq!(cfg.beta, 0.8);
    assert_eq!(cfg.seed, None);
    let net = CompSegNet3::from_config(&cfg).unwrap();
    assert_eq!(net.plan().encoder, [4, 8, 16, 32, 32]);
}

#[test]
fn json_is_chosen_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("net.json");
    fs::write(
        &path,
        r#"{"variant": "grader", "n_channels": 3, "n_classes": 4, "softmax": false, "base_width": 2, "seed": 8}"#,
    )
    .unwrap();
    let cfg = NetConfig::from_path(path.to_str().unwrap()).unwrap();
    assert_eq!(cfg.variant, Variant::Grader);
    assert_eq!(cfg.seed, Some(8));
    let net = CompSegNetGrader::from_config(&cfg).unwrap();
    assert!(!net.softmax());
    assert_eq!(net.n_classes(), 4);
}

#[test]
fn serialised_config_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("net.toml");
    let cfg = NetConfig {
        variant: Variant::CompSeg,
        dropout: 0.25,
        checkpointing: true,
        ..NetConfig::new(3, 1)
    };
    fs::write(&path, toml::to_string(&cfg).unwrap()).unwrap();
    assert_eq!(NetConfig::from_path(path.to_str().unwrap()), Some(cfg));
}

#[test]
fn unreadable_or_malformed_files_give_none() {
    assert!(NetConfig::from_path("/nonexistent/net.toml").is_none());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(NetConfig::from_path(path.to_str().unwrap()).is_none());
}

#[test]
fn validation_rejects_bad_values() {
    for cfg in [
        NetConfig::new(0, 1),
        NetConfig::new(1, 0),
        NetConfig {
            base_width: 0,
            ..NetConfig::new(1, 1)
        },
        NetConfig {
            dropout: -0.5,
            ..NetConfig::new(1, 1)
        },
        NetConfig {
            bn_eps: 0.0,
            ..NetConfig::new(1, 1)
        },
    ] {
        assert!(cfg.validate().is_err(), "{:?}", cfg);
    }
}
