//! Probes against a running PetClinic instance.
//!
//! Every check returns an [`Outcome`] so it can be fed straight into a [`RetryPolicy`]. Missing
//! return values are `NotFound`, values that exist but are wrong are `AssertionFailed`; a caller
//! decides which of those it is willing to wait out.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::failure::{Failure, Outcome};
use crate::platform::{Instance, PlatformError};
use crate::{presets, PollError, RetryPolicy, Sleeper};

pub const ENTRY_URL: &str = "petclinic.entry-url";
pub const APP_HOSTS: &str = "petclinic.app-hosts";
pub const DBMS: &str = "petclinic.dbms";
pub const DB_HOST: &str = "db-host";
pub const DB_PORT: &str = "db-port";

/// Why a check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    /// A request or connection did not answer in time
    Timeout,
    /// A value was present but not what the check expected
    AssertionFailed,
    /// A return value or parameter is not published (yet)
    NotFound,
    /// The instance is still converging
    NotReady,
    /// The instance reached a state it will not recover from
    InstanceFailed,
    /// Connection refused, DNS failure, unexpected platform answer
    Transport,
}

impl From<PlatformError> for Failure<CheckKind> {
    fn from(err: PlatformError) -> Self {
        let kind = if err.is_timeout() {
            CheckKind::Timeout
        } else if err.status() == Some(404) {
            CheckKind::NotFound
        } else {
            CheckKind::Transport
        };
        Failure::new(kind, err.to_string())
    }
}

fn assertion(detail: impl Into<String>) -> Failure<CheckKind> {
    Failure::new(CheckKind::AssertionFailed, detail)
}

fn return_value(instance: &dyn Instance, key: &str) -> Outcome<Value, CheckKind> {
    let mut values = instance.return_values()?;
    values
        .remove(key)
        .ok_or_else(|| Failure::new(CheckKind::NotFound, format!("return value {key} not published")))
}

/// Public URL of the application.
pub fn entry_url(instance: &dyn Instance) -> Outcome<String, CheckKind> {
    match return_value(instance, ENTRY_URL)? {
        Value::String(url) if !url.trim().is_empty() => Ok(url),
        other => Err(assertion(format!("{ENTRY_URL} is not a usable URL: {other}"))),
    }
}

/// Number of application hosts behind the entry URL.
pub fn app_host_count(instance: &dyn Instance) -> Outcome<usize, CheckKind> {
    match return_value(instance, APP_HOSTS)? {
        Value::Array(hosts) => Ok(hosts.len()),
        other => Err(assertion(format!("{APP_HOSTS} is not a list: {other}"))),
    }
}

/// Host and port of the database.
pub fn db_endpoint(instance: &dyn Instance) -> Outcome<(String, u16), CheckKind> {
    let dbms = return_value(instance, DBMS)?;
    let field = |name: &str| {
        dbms.get(name)
            .ok_or_else(|| Failure::new(CheckKind::NotFound, format!("{DBMS} has no {name}")))
    };
    let host = match field(DB_HOST)? {
        Value::String(host) if !host.is_empty() => host.clone(),
        other => return Err(assertion(format!("{DB_HOST} is not a host name: {other}"))),
    };
    let port = match field(DB_PORT)? {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| assertion(format!("{DB_PORT} is not a TCP port")))?;
    Ok((host, port))
}

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn expect_status(&self, expected: u16) -> Outcome<(), CheckKind> {
        if self.status == expected {
            Ok(())
        } else {
            Err(assertion(format!("{} answered {}, expected {}", self.url, self.status, expected)))
        }
    }

    pub fn expect_contains(&self, needle: &str) -> Outcome<(), CheckKind> {
        if self.body.contains(needle) {
            Ok(())
        } else {
            Err(assertion(format!("{} does not contain {:?}", self.url, needle)))
        }
    }
}

/// HTTP client for the deployed site.
#[derive(Debug, Clone)]
pub struct SiteProbe {
    http: Client,
}

impl SiteProbe {
    /// `verify_tls = false` accepts self-signed certificates, as freshly provisioned VMs use.
    pub fn new(verify_tls: bool, timeout: Duration) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;
        Ok(Self { http })
    }

    pub fn fetch(&self, url: &str) -> Outcome<Page, CheckKind> {
        let request_failed = |e: reqwest::Error| {
            let kind = if e.is_timeout() { CheckKind::Timeout } else { CheckKind::Transport };
            Failure::new(kind, format!("GET {url}: {e}"))
        };
        let response = self.http.get(url).send().map_err(request_failed)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(request_failed)?;
        Ok(Page { url: url.to_string(), status, body })
    }
}

/// Open (and immediately close) a TCP connection to `host:port`.
pub fn tcp_reachable(host: &str, port: u16, timeout: Duration) -> Outcome<(), CheckKind> {
    let addrs = (host, port).to_socket_addrs().map_err(|e| {
        Failure::new(CheckKind::Transport, format!("cannot resolve {host}:{port}: {e}"))
    })?;
    let mut last = Failure::new(CheckKind::Transport, format!("{host}:{port} has no addresses"));
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(()),
            Err(e) => {
                last = Failure::new(connect_failure_kind(&e), format!("connect {addr}: {e}"));
            }
        }
    }
    Err(last)
}

fn connect_failure_kind(err: &std::io::Error) -> CheckKind {
    if err.kind() == std::io::ErrorKind::TimedOut {
        CheckKind::Timeout
    } else {
        CheckKind::Transport
    }
}

/// One readiness probe: `Running` passes, dead states are fatal, everything else is `NotReady`.
pub fn ready(instance: &dyn Instance) -> Outcome<(), CheckKind> {
    let status = instance.status()?;
    if status.is_ready() {
        Ok(())
    } else if status.is_dead() {
        Err(Failure::new(
            CheckKind::InstanceFailed,
            format!("instance {} is {}", instance.id(), status),
        ))
    } else {
        Err(Failure::new(CheckKind::NotReady, format!("instance {} is {}", instance.id(), status)))
    }
}

/// Poll [`ready`] every `interval` for up to `timeout`.
pub fn wait_ready(
    instance: &dyn Instance,
    timeout: Duration,
    interval: Duration,
    sleeper: Arc<dyn Sleeper>,
) -> Result<(), PollError<CheckKind>> {
    let policy: RetryPolicy<CheckKind> = presets::every(
        interval,
        timeout,
        [CheckKind::NotReady, CheckKind::Timeout, CheckKind::Transport],
        sleeper,
    );
    tracing::info!(instance = instance.id(), ?timeout, "waiting for instance to become ready");
    policy.execute(|| ready(instance))
}
