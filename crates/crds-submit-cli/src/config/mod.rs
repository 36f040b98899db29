//! Connection settings resolution: explicit flag, then environment, then default.

use crds_submit::SessionConfig;

pub const SERVER_URL_ENV: &str = "CRDS_SERVER_URL";
pub const USERNAME_ENV: &str = "CRDS_USERNAME";
pub const PASSWORD_ENV: &str = "CRDS_PASSWORD";
pub const INSTRUMENT_ENV: &str = "CRDS_INSTRUMENT";

/// Instrument locked at login when none is given.
pub const DEFAULT_INSTRUMENT: &str = "none";

/// Settings given on the command line, all optional.
#[derive(Debug, Clone, Default)]
pub struct ConnectionArgs {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub instrument: Option<String>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{setting} is required: pass {flag} or set {env}")]
    Missing {
        setting: &'static str,
        flag: &'static str,
        env: &'static str,
    },
}

/// Resolve against the process environment.
pub fn resolve_session_config(args: &ConnectionArgs) -> Result<SessionConfig, ConfigError> {
    resolve_session_config_with(args, |key| std::env::var(key).ok())
}

/// Resolve with an explicit environment lookup.
pub fn resolve_session_config_with<F>(args: &ConnectionArgs, env: F) -> Result<SessionConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let server_url = resolve_setting(args.server_url.as_deref(), SERVER_URL_ENV, &env).ok_or(
        ConfigError::Missing {
            setting: "server URL",
            flag: "--server-url",
            env: SERVER_URL_ENV,
        },
    )?;
    let username = resolve_setting(args.username.as_deref(), USERNAME_ENV, &env).ok_or(
        ConfigError::Missing {
            setting: "username",
            flag: "--username",
            env: USERNAME_ENV,
        },
    )?;
    let password = resolve_setting(args.password.as_deref(), PASSWORD_ENV, &env).ok_or(
        ConfigError::Missing {
            setting: "password",
            flag: "--password",
            env: PASSWORD_ENV,
        },
    )?;
    let instrument = resolve_setting(args.instrument.as_deref(), INSTRUMENT_ENV, &env)
        .unwrap_or_else(|| DEFAULT_INSTRUMENT.to_string());

    Ok(SessionConfig::new(server_url)
        .with_credentials(username, password)
        .with_instrument(instrument))
}

fn resolve_setting<F>(explicit: Option<&str>, key: &str, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = explicit {
        return Some(value.to_string());
    }
    env(key).filter(|v| !v.trim().is_empty())
}
