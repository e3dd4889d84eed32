//! Suite configuration read from the process environment.
//!
//! | variable                          | required  | default            |
//! |-----------------------------------|-----------|--------------------|
//! | `QUBELL_TENANT`                   | yes       |                    |
//! | `QUBELL_USER`                     | yes       |                    |
//! | `QUBELL_PASSWORD`                 | yes       |                    |
//! | `QUBELL_ORGANIZATION`             | yes       |                    |
//! | `PETCLINIC_APPLICATION_ID`        | see below |                    |
//! | `PETCLINIC_MANIFEST`              | see below |                    |
//! | `PETCLINIC_APPLICATION_NAME`      | no        | `starter-java-web` |
//! | `PETCLINIC_ENV_MATRIX`            | no        | built-in           |
//! | `PETCLINIC_VERIFY_TLS`            | no        | `false`            |
//! | `PETCLINIC_REQUEST_TIMEOUT_SECS`  | no        | `30`               |
//! | `PETCLINIC_LAUNCH_TIMEOUT_MINS`   | no        | `120`              |
//! | `PETCLINIC_READY_TIMEOUT_MINS`    | no        | `30`               |
//! | `PETCLINIC_DESTROY_INTERVAL_MS`   | no        | `14400000`         |
//!
//! At least one of `PETCLINIC_APPLICATION_ID` and `PETCLINIC_MANIFEST` must be set. With a
//! manifest the suite uploads it before the matrix runs: to the given application id if there is
//! one, otherwise to the application named `PETCLINIC_APPLICATION_NAME` (created when missing).

use std::path::PathBuf;
use std::time::Duration;

use crate::environment::{self, EnvironmentError, EnvironmentSpec};

pub const TENANT: &str = "QUBELL_TENANT";
pub const USER: &str = "QUBELL_USER";
pub const PASSWORD: &str = "QUBELL_PASSWORD";
pub const ORGANIZATION: &str = "QUBELL_ORGANIZATION";
pub const APPLICATION_ID: &str = "PETCLINIC_APPLICATION_ID";
pub const MANIFEST: &str = "PETCLINIC_MANIFEST";
pub const APPLICATION_NAME: &str = "PETCLINIC_APPLICATION_NAME";
pub const ENV_MATRIX: &str = "PETCLINIC_ENV_MATRIX";
pub const VERIFY_TLS: &str = "PETCLINIC_VERIFY_TLS";
pub const REQUEST_TIMEOUT_SECS: &str = "PETCLINIC_REQUEST_TIMEOUT_SECS";
pub const LAUNCH_TIMEOUT_MINS: &str = "PETCLINIC_LAUNCH_TIMEOUT_MINS";
pub const READY_TIMEOUT_MINS: &str = "PETCLINIC_READY_TIMEOUT_MINS";
pub const DESTROY_INTERVAL_MS: &str = "PETCLINIC_DESTROY_INTERVAL_MS";

pub const DEFAULT_APPLICATION_NAME: &str = "starter-java-web";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LAUNCH_TIMEOUT_MINS: u64 = 120;
const DEFAULT_READY_TIMEOUT_MINS: u64 = 30;
const DEFAULT_DESTROY_INTERVAL_MS: u64 = 14_400_000;

/// Errors produced while reading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid { var: &'static str, value: String, reason: String },
    #[error("cannot read environment matrix {path:?}: {source}")]
    MatrixFile { path: PathBuf, source: std::io::Error },
    #[error("cannot read application manifest {path:?}: {source}")]
    ManifestFile { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Matrix(#[from] EnvironmentError),
}

/// Everything the suite needs to reach the platform and pace its waits.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Tenant base URL, without trailing slash.
    pub tenant: String,
    pub user: String,
    pub password: String,
    pub organization: String,
    /// Existing application to launch (and to upload the manifest to, if one is given).
    pub application_id: Option<String>,
    /// Application looked up or created when only a manifest is given.
    pub application_name: String,
    /// Manifest text uploaded before the matrix runs.
    pub manifest: Option<String>,
    pub environments: Vec<EnvironmentSpec>,
    /// Verify TLS certificates of the platform and of the deployed site.
    pub verify_tls: bool,
    pub request_timeout: Duration,
    /// How long a freshly launched instance may take to become ready.
    pub launch_timeout: Duration,
    /// How long a reconfigured instance may take to become ready again.
    pub ready_timeout: Duration,
    /// Platform-side auto-destroy interval for launched instances.
    pub destroy_interval: Duration,
}

impl SuiteConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let tenant = required(TENANT)?;
        if !(tenant.starts_with("http://") || tenant.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: TENANT,
                value: tenant,
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let environments = match get(ENV_MATRIX) {
            Some(path) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::MatrixFile { path: path.clone(), source })?;
                environment::matrix_from_json(&text)?
            }
            None => environment::matrix(),
        };

        let manifest = match get(MANIFEST) {
            Some(path) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::ManifestFile { path: path.clone(), source })?;
                Some(text)
            }
            None => None,
        };
        let application_id = get(APPLICATION_ID);
        if application_id.is_none() && manifest.is_none() {
            return Err(ConfigError::Missing(APPLICATION_ID));
        }

        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(key) {
                None => Ok(default),
                Some(value) => value.parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::Invalid { var: key, value, reason: e.to_string() }
                }),
            }
        };

        let verify_tls = match get(VERIFY_TLS).as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("0" | "false" | "no") => false,
            Some("1" | "true" | "yes") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: VERIFY_TLS,
                    value: other.to_string(),
                    reason: "expected true or false".to_string(),
                })
            }
        };

        Ok(Self {
            tenant: tenant.trim_end_matches('/').to_string(),
            user: required(USER)?,
            password: required(PASSWORD)?,
            organization: required(ORGANIZATION)?,
            application_id,
            application_name: get(APPLICATION_NAME)
                .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string()),
            manifest,
            environments,
            verify_tls,
            request_timeout: Duration::from_secs(number(
                REQUEST_TIMEOUT_SECS,
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            launch_timeout: minutes(number(LAUNCH_TIMEOUT_MINS, DEFAULT_LAUNCH_TIMEOUT_MINS)?),
            ready_timeout: minutes(number(READY_TIMEOUT_MINS, DEFAULT_READY_TIMEOUT_MINS)?),
            destroy_interval: Duration::from_millis(number(
                DESTROY_INTERVAL_MS,
                DEFAULT_DESTROY_INTERVAL_MS,
            )?),
        })
    }
}

fn minutes(mins: u64) -> Duration {
    Duration::from_secs(mins.saturating_mul(60))
}
