//! Configuration tests
//!
//! YAML loading, `${ENV}` substitution and the sanitised `/api/config` view.
//! Environment-dependent checks live in one test to avoid races between
//! parallel test threads.

use virtuals_sentinel::config::{substitute_env, AppConfig};
use virtuals_sentinel::handlers::ConfigView;

const SAMPLE: &str = r#"
chain:
  id: 8453
  name: "base"
  rpc:
    http:
      - "https://mainnet.base.org"
      - "https://base.llamarpc.com/${SENTINEL_TEST_RPC_KEY}"
    wss:
      - "wss://base-rpc.publicnode.com"
virtuals:
  apiBase: "https://api.virtuals.io"
  pollIntervalMs: 5000
  maxProjectAgeMinutes: 240
  preferredTicker: "AIXBT"
addresses:
  buybackAddr: "0x0000000000000000000000000000000000000b0b"
  virtualToken: "0x0b3e328455c4059eeb9e3f84b5543f74e24e7e1b"
thresholds:
  bigTradeVirtual: "1000"
  taxWindowMinutes: 100
  buybackRateWindowMinutes: 20
  stallAlertMinutes: 5
logging:
  level: debug
"#;

#[test]
fn test_load_substitute_and_sanitise() {
    std::env::set_var("SENTINEL_TEST_RPC_KEY", "k-123");

    let dir = std::env::temp_dir().join(format!("sentinel-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.yaml");
    std::fs::write(&path, SAMPLE).unwrap();
    std::env::set_var("CONFIG_PATH", &path);

    let config = AppConfig::load().unwrap();
    assert_eq!(config.chain.id, 8453);
    assert_eq!(config.chain.name, "base");
    assert_eq!(config.chain.rpc.http.len(), 2);
    assert_eq!(
        config.chain.rpc.http[1],
        "https://base.llamarpc.com/k-123",
        "env placeholder substituted"
    );
    assert_eq!(config.virtuals.api_base, "https://api.virtuals.io");
    assert_eq!(config.virtuals.poll_interval_ms, 5000);
    assert_eq!(config.virtuals.preferred_ticker.as_deref(), Some("AIXBT"));
    assert_eq!(config.thresholds.tax_window_minutes, 100);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.health_port, 3000);
    assert_eq!(config.api_port, 4000);

    // Threshold parses to 18-decimal base units.
    let threshold = config.thresholds.big_trade_base_units().unwrap();
    assert_eq!(threshold.to_string(), "1000000000000000000000");

    // Sanitised view round-trips the non-secret sections and drops the URLs.
    let view = ConfigView::from_config(&config);
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["virtuals"]["apiBase"], "https://api.virtuals.io");
    assert_eq!(json["virtuals"]["pollIntervalMs"], 5000);
    assert_eq!(json["virtuals"]["maxProjectAgeMinutes"], 240);
    assert_eq!(json["thresholds"]["bigTradeVirtual"], "1000");
    assert_eq!(json["thresholds"]["taxWindowMinutes"], 100);
    assert_eq!(json["chain"]["id"], 8453);
    assert_eq!(json["chain"]["name"], "base");
    assert_eq!(json["chain"]["httpEndpoints"], 2);
    assert!(!json.to_string().contains("k-123"), "secrets must not leak");

    std::env::remove_var("CONFIG_PATH");
}

#[test]
fn test_substitution_of_missing_env_is_fatal() {
    let err = substitute_env("url: ${SENTINEL_NO_SUCH_VAR_FOR_SURE}").unwrap_err();
    assert!(!err.is_recoverable());
}

#[test]
fn test_substitution_leaves_plain_text_alone() {
    let raw = "addresses:\n  buybackAddr: \"0xabc\"\n";
    assert_eq!(substitute_env(raw).unwrap(), raw);
}
