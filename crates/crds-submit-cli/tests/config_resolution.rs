//! Precedence of flags, environment and defaults.

use std::collections::HashMap;

use crds_submit_cli::config::{
    resolve_session_config_with, ConfigError, ConnectionArgs, PASSWORD_ENV, SERVER_URL_ENV,
    USERNAME_ENV,
};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_environment_fills_missing_flags() {
    let lookup = env(&[
        (SERVER_URL_ENV, "https://hst-crds-test.example"),
        (USERNAME_ENV, "alice"),
        (PASSWORD_ENV, "s3cret"),
    ]);
    let config = resolve_session_config_with(&ConnectionArgs::default(), lookup).unwrap();
    assert_eq!(config.base_url, "https://hst-crds-test.example");
    assert_eq!(config.username, "alice");
    assert_eq!(config.password, "s3cret");
    assert_eq!(config.locked_instrument, "none");
}

#[test]
fn test_flags_win_over_environment() {
    let lookup = env(&[
        (SERVER_URL_ENV, "https://from-env.example"),
        (USERNAME_ENV, "env-user"),
        (PASSWORD_ENV, "env-pass"),
        ("CRDS_INSTRUMENT", "nircam"),
    ]);
    let args = ConnectionArgs {
        server_url: Some("https://from-flag.example".to_string()),
        username: Some("flag-user".to_string()),
        password: None,
        instrument: Some("miri".to_string()),
    };
    let config = resolve_session_config_with(&args, lookup).unwrap();
    assert_eq!(config.base_url, "https://from-flag.example");
    assert_eq!(config.username, "flag-user");
    assert_eq!(config.password, "env-pass");
    assert_eq!(config.locked_instrument, "miri");
}

#[test]
fn test_missing_required_setting_names_flag_and_env() {
    let lookup = env(&[(SERVER_URL_ENV, "https://crds.example"), (USERNAME_ENV, "  ")]);
    let err = resolve_session_config_with(&ConnectionArgs::default(), lookup).unwrap_err();
    assert_eq!(
        err,
        ConfigError::Missing {
            setting: "username",
            flag: "--username",
            env: USERNAME_ENV,
        }
    );
    assert!(err.to_string().contains("CRDS_USERNAME"));
}
