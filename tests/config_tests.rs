//! Tests for configuration layering.

use std::io::Write;
use std::sync::{Mutex, OnceLock};

use roci_turn::config::TurnConfig;
use roci_turn::error::TurnError;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 5] = [
    "ROCI_TURN_RESERVE_TOKENS",
    "ROCI_TURN_CALIBRATION_MIN_RATIO",
    "ROCI_TURN_CALIBRATION_MAX_RATIO",
    "ROCI_TURN_THINK_OPEN_TAG",
    "ROCI_TURN_THINK_CLOSE_TAG",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_env() {
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
}

#[test]
fn env_overrides_apply_on_top_of_base() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_env();
    std::env::set_var("ROCI_TURN_RESERVE_TOKENS", "16");
    std::env::set_var("ROCI_TURN_THINK_OPEN_TAG", "<reasoning>");
    std::env::set_var("ROCI_TURN_THINK_CLOSE_TAG", "</reasoning>");

    let config = TurnConfig::default().with_env_overrides().unwrap();
    assert_eq!(config.reply_reserve_tokens, 16);
    assert_eq!(config.think_open_tag, "<reasoning>");
    assert_eq!(config.think_close_tag, "</reasoning>");
    assert_eq!(config.calibration_max_ratio, 2.5);
}

#[test]
fn invalid_env_value_is_a_configuration_error() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_env();
    std::env::set_var("ROCI_TURN_CALIBRATION_MIN_RATIO", "lots");

    let err = TurnConfig::default().with_env_overrides().unwrap_err();
    assert!(matches!(err, TurnError::Configuration(ref msg) if msg.contains("ROCI_TURN_CALIBRATION_MIN_RATIO")));
}

#[test]
fn blank_env_values_are_ignored() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_env();
    std::env::set_var("ROCI_TURN_RESERVE_TOKENS", "  ");

    let config = TurnConfig::default().with_env_overrides().unwrap();
    assert_eq!(config, TurnConfig::default());
}

#[test]
fn loads_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "reply_reserve_tokens = 10\ncalibration_min_ratio = 0.5\nthink_open_tag = \"<t>\"\nthink_close_tag = \"</t>\""
    )
    .unwrap();

    let config = TurnConfig::load(file.path()).unwrap();
    assert_eq!(config.reply_reserve_tokens, 10);
    assert_eq!(config.calibration_min_ratio, 0.5);
    assert_eq!(config.think_open_tag, "<t>");
    assert_eq!(config.step_key_separator, "__");
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = TurnConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, TurnError::Io(_)));
}

#[test]
fn malformed_toml_is_reported() {
    let err = TurnConfig::from_toml_str("reply_reserve_tokens = \"many\"").unwrap_err();
    assert!(matches!(err, TurnError::Toml(_)));
}

#[test]
fn builder_round_trips_through_toml() {
    let config = TurnConfig::builder()
        .reply_reserve_tokens(8)
        .step_key_separator("::")
        .build();
    let source = toml::to_string(&config).unwrap();
    assert_eq!(TurnConfig::from_toml_str(&source).unwrap(), config);
}
