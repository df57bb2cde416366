//! Runtime settings, read from the environment after `.env` is loaded.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3000";
pub const DEFAULT_DATA_FILE: &str = "public/database.json";
pub const DEFAULT_UPLOAD_DIR: &str = "public/assets";
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_address: String,
    pub data_file: PathBuf,
    pub upload_dir: PathBuf,
    /// Empty means any origin is accepted.
    pub cors_origins: Vec<String>,
    /// Requests each client address may make per window. Zero disables
    /// rate limiting.
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Settings {
            bind_address: non_empty("BIND_ADDRESS")
                .or_else(|| non_empty("PORT").map(|port| format!("127.0.0.1:{}", port.trim())))
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_owned()),
            data_file: non_empty("DATA_FILE")
                .unwrap_or_else(|| DEFAULT_DATA_FILE.to_owned())
                .into(),
            upload_dir: non_empty("UPLOAD_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_owned())
                .into(),
            cors_origins: non_empty("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            rate_limit_requests: parse_or(
                non_empty("RATE_LIMIT_REQUESTS"),
                "RATE_LIMIT_REQUESTS",
                DEFAULT_RATE_LIMIT_REQUESTS,
            ),
            rate_limit_window: Duration::from_secs(parse_or(
                non_empty("RATE_LIMIT_WINDOW_SECS"),
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )),
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", key, value);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = settings_from(&[]);
        assert_eq!(settings.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(settings.data_file, PathBuf::from(DEFAULT_DATA_FILE));
        assert_eq!(settings.upload_dir, PathBuf::from(DEFAULT_UPLOAD_DIR));
        assert!(settings.cors_origins.is_empty());
        assert_eq!(settings.rate_limit_requests, 100);
        assert_eq!(settings.rate_limit_window, Duration::from_secs(900));
    }

    #[test]
    fn rate_limit_is_configurable() {
        let settings = settings_from(&[
            ("RATE_LIMIT_REQUESTS", "0"),
            ("RATE_LIMIT_WINDOW_SECS", " 60 "),
        ]);
        assert_eq!(settings.rate_limit_requests, 0);
        assert_eq!(settings.rate_limit_window, Duration::from_secs(60));

        let settings = settings_from(&[("RATE_LIMIT_REQUESTS", "lots")]);
        assert_eq!(settings.rate_limit_requests, DEFAULT_RATE_LIMIT_REQUESTS);
    }

    #[test]
    fn port_is_used_when_bind_address_is_missing() {
        let settings = settings_from(&[("PORT", "8088")]);
        assert_eq!(settings.bind_address, "127.0.0.1:8088");

        let settings = settings_from(&[("PORT", "8088"), ("BIND_ADDRESS", "0.0.0.0:80")]);
        assert_eq!(settings.bind_address, "0.0.0.0:80");
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let settings = settings_from(&[(
            "CORS_ORIGINS",
            "http://localhost:2333, https://notes.example.org,,",
        )]);
        assert_eq!(
            settings.cors_origins,
            vec!["http://localhost:2333", "https://notes.example.org"]
        );
    }
}
