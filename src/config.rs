// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, their defaults, and [`ServerConfig`], which
//! collects them once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `polls.redb` | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `REQUEST_TIMEOUT_SECS` | Per-request time budget | `30` |
//! | `SESSION_TTL_SECS` | Idle session lifetime | `86400` |
//! | `SEED_ADMIN_NAME` | Administrator created when no users exist | unset |
//! | `SEED_ADMIN_PASSWORD` | Password for the seeded administrator | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{env, path::PathBuf, time::Duration};

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const REQUEST_TIMEOUT_SECS_ENV: &str = "REQUEST_TIMEOUT_SECS";
pub const SESSION_TTL_SECS_ENV: &str = "SESSION_TTL_SECS";
pub const SEED_ADMIN_NAME_ENV: &str = "SEED_ADMIN_NAME";
pub const SEED_ADMIN_PASSWORD_ENV: &str = "SEED_ADMIN_PASSWORD";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Database file name inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "polls.redb";

/// Administrator account to create on an empty database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAdmin {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub session_ttl: Duration,
    pub seed_admin: Option<SeedAdmin>,
    pub json_logs: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparseable numbers fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |name: &str, default: u64| {
            lookup(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let seed_admin = match (lookup(SEED_ADMIN_NAME_ENV), lookup(SEED_ADMIN_PASSWORD_ENV)) {
            (Some(name), Some(password)) if !name.trim().is_empty() && !password.is_empty() => {
                Some(SeedAdmin { name, password })
            }
            _ => None,
        };

        Self {
            data_dir: PathBuf::from(
                lookup(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            host: lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: lookup(PORT_ENV)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_PORT),
            request_timeout: Duration::from_secs(number(
                REQUEST_TIMEOUT_SECS_ENV,
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            session_ttl: Duration::from_secs(number(
                SESSION_TTL_SECS_ENV,
                DEFAULT_SESSION_TTL_SECS,
            )),
            seed_admin,
            json_logs: lookup(LOG_FORMAT_ENV).is_some_and(|v| v.eq_ignore_ascii_case("json")),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]);
        assert_eq!(config.database_path(), PathBuf::from("./data/polls.redb"));
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
        assert!(config.seed_admin.is_none());
        assert!(!config.json_logs);
    }

    #[test]
    fn values_are_read_and_bad_numbers_ignored() {
        let config = config(&[
            ("DATA_DIR", "/var/lib/polls"),
            ("PORT", "9000"),
            ("REQUEST_TIMEOUT_SECS", "soon"),
            ("LOG_FORMAT", "JSON"),
            ("SEED_ADMIN_NAME", "root"),
            ("SEED_ADMIN_PASSWORD", "hunter2"),
        ]);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/polls/polls.redb"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.json_logs);
        assert_eq!(
            config.seed_admin,
            Some(SeedAdmin {
                name: "root".into(),
                password: "hunter2".into()
            })
        );
    }

    #[test]
    fn seed_admin_needs_both_values() {
        assert!(config(&[("SEED_ADMIN_NAME", "root")]).seed_admin.is_none());
    }
}
