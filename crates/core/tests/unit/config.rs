//! Configuration tests.

use cohsim_core::config::{
    CacheParams, Config, DelayConfig, IndexerKind, PolicyVariant, ReplacePolicy,
};
use pretty_assertions::assert_eq;

/// The default hierarchy is one core over two MSI levels.
#[test]
fn default_config_shape() {
    let config = Config::default();
    assert_eq!(config.cores, 1);
    assert_eq!(config.levels.len(), 2);
    assert_eq!(config.llc_slices, 1);
    assert_eq!(config.levels[0].policy, PolicyVariant::Msi);
    assert!(config.levels[0].data);
    assert!(config.levels[0].mshr_depth >= 2);
}

/// Levels deserialize from JSON with defaults for omitted fields.
#[test]
fn config_parses_from_json() {
    let json = r#"{
        "cores": 2,
        "levels": [
            { "index_width": 3, "ways": 4 },
            { "index_width": 4, "ways": 8, "policy": "mesi", "replacement": "srrip" }
        ]
    }"#;
    let config: Config = serde_json::from_str(json).expect("valid config");
    assert_eq!(config.cores, 2);
    assert_eq!(config.levels[1].policy, PolicyVariant::Mesi);
    assert_eq!(config.levels[1].replacement, ReplacePolicy::Srrip);
    assert_eq!(config.levels[0].indexer, IndexerKind::Norm);
    assert_eq!(config.levels[0].sets(), 8);
}

/// Delay models are tagged enums.
#[test]
fn delay_config_parses() {
    let json = r#"{ "kind": "l1", "hit": 1, "replay": 5, "tran": 3 }"#;
    let delay: DelayConfig = serde_json::from_str(json).expect("valid delay");
    assert_eq!(
        delay,
        DelayConfig::L1 {
            hit: 1,
            replay: 5,
            tran: 3
        }
    );
}

/// The policy selectors know their structural requirements.
#[test]
fn policy_variant_predicates() {
    assert!(PolicyVariant::ExclusiveMsi.is_exclusive());
    assert!(PolicyVariant::ExclusiveMesi.is_exclusive());
    assert!(!PolicyVariant::Msi.is_exclusive());
    assert!(PolicyVariant::Mesi.is_directory());
    assert!(PolicyVariant::ExclusiveMesi.is_directory());
    assert!(!PolicyVariant::Mi.is_directory());
}

/// Structural misconfiguration surfaces at build time, naming the node.
#[test]
fn builder_rejects_bad_geometry() {
    let mut config = Config::default();
    config.levels[0] = CacheParams {
        ways: 0,
        ..CacheParams::default()
    };
    let err = cohsim_core::hierarchy::build(&config).expect_err("zero ways rejected");
    assert!(err.to_string().contains("l1-0"));
}

/// An undersized MSHR is rejected at build time.
#[test]
fn builder_rejects_small_mshr() {
    let mut config = Config::default();
    config.levels[1].mshr_depth = 1;
    let err = cohsim_core::hierarchy::build(&config).expect_err("mshr 1 rejected");
    assert!(err.to_string().contains("minimum of 2"));
}

/// Directory-exclusive levels need extended ways.
#[test]
fn builder_rejects_directoryless_exclusive() {
    let mut config = Config::default();
    config.levels[1].policy = PolicyVariant::ExclusiveMesi;
    config.levels[1].ext_ways = 0;
    let err = cohsim_core::hierarchy::build(&config).expect_err("needs directory ways");
    assert!(err.to_string().contains("directory"));
}
