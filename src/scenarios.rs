//! The PetClinic scenarios.
//!
//! Scenarios share one instance per environment and run in [`Scenario::ALL`] order; `Scaling` and
//! `ChangeBranch` reconfigure the instance, so later scenarios see the reconfigured application.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::checks::{self, CheckKind, SiteProbe};
use crate::failure::Failure;
use crate::platform::{Instance, PlatformError};
use crate::{presets, PollError, RetryPolicy, Sleeper, ThreadSleeper};

pub const CLUSTER_SIZE: &str = "configuration.clusterSize";
pub const SCM_BRANCH: &str = "configuration.scm-branch";
pub const WELCOME_MARKER: &str = "PetClinic :: a Spring Framework demonstration";
pub const UPDATED_MARKER: &str = "Updated PetClinic :: a Spring Framework demonstration";
pub const UPDATED_BRANCH: &str = "red";

const DEFAULT_READY_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_READY_INTERVAL_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Why a scenario (or provisioning step) failed.
#[derive(thiserror::Error, Debug)]
pub enum SuiteError {
    #[error("{0}")]
    Check(#[from] Failure<CheckKind>),
    #[error("{0}")]
    Poll(#[from] PollError<CheckKind>),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl SuiteError {
    /// Kind of the underlying check failure, if there is one.
    pub fn kind(&self) -> Option<CheckKind> {
        match self {
            SuiteError::Check(failure) => Some(*failure.kind()),
            SuiteError::Poll(err) => Some(*err.kind()),
            SuiteError::Platform(_) => None,
        }
    }
}

/// Shared knobs and clients for running scenarios.
#[derive(Debug, Clone)]
pub struct SuiteContext {
    site: SiteProbe,
    sleeper: Arc<dyn Sleeper>,
    ready_timeout: Duration,
    ready_interval: Duration,
    connect_timeout: Duration,
}

impl SuiteContext {
    pub fn new(site: SiteProbe) -> Self {
        Self {
            site,
            sleeper: Arc::new(ThreadSleeper),
            ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
            ready_interval: Duration::from_secs(DEFAULT_READY_INTERVAL_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// How long a reconfigured instance may take to settle.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_ready_interval(mut self, interval: Duration) -> Self {
        self.ready_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn site(&self) -> &SiteProbe {
        &self.site
    }

    /// Policy for waiting out the platform's convergence.
    pub fn eventually(&self) -> RetryPolicy<CheckKind> {
        presets::eventually_with_sleeper(
            [CheckKind::AssertionFailed, CheckKind::NotFound],
            self.sleeper.clone(),
        )
    }

    pub fn wait_ready(
        &self,
        instance: &dyn Instance,
        timeout: Duration,
    ) -> Result<(), PollError<CheckKind>> {
        checks::wait_ready(instance, timeout, self.ready_interval, self.sleeper.clone())
    }
}

/// Wait for the entry URL, then require the welcome page. Returns the entry URL.
pub fn check_site(instance: &dyn Instance, ctx: &SuiteContext) -> Result<String, SuiteError> {
    let url = ctx.eventually().execute(|| checks::entry_url(instance))?;
    let page = ctx.site.fetch(&url)?;
    page.expect_status(200)?;
    page.expect_contains(WELCOME_MARKER)?;
    Ok(url)
}

/// The individual test cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Entry URL answers 200
    Host,
    /// Database port accepts TCP connections
    DbPort,
    /// Welcome page is served
    PetclinicUp,
    /// Cluster grows from one to two application hosts
    Scaling,
    /// Switching the source branch deploys the updated page
    ChangeBranch,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::Host,
        Scenario::DbPort,
        Scenario::PetclinicUp,
        Scenario::Scaling,
        Scenario::ChangeBranch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Host => "host",
            Scenario::DbPort => "db_port",
            Scenario::PetclinicUp => "petclinic_up",
            Scenario::Scaling => "scaling",
            Scenario::ChangeBranch => "change_branch",
        }
    }

    pub fn run(self, instance: &dyn Instance, ctx: &SuiteContext) -> Result<(), SuiteError> {
        match self {
            Scenario::Host => host(instance, ctx),
            Scenario::DbPort => db_port(instance, ctx),
            Scenario::PetclinicUp => check_site(instance, ctx).map(drop),
            Scenario::Scaling => scaling(instance, ctx),
            Scenario::ChangeBranch => change_branch(instance, ctx),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn host(instance: &dyn Instance, ctx: &SuiteContext) -> Result<(), SuiteError> {
    let url = checks::entry_url(instance)?;
    ctx.site.fetch(&url)?.expect_status(200)?;
    Ok(())
}

fn db_port(instance: &dyn Instance, ctx: &SuiteContext) -> Result<(), SuiteError> {
    let (host, port) = checks::db_endpoint(instance)?;
    checks::tcp_reachable(&host, port, ctx.connect_timeout)?;
    Ok(())
}

fn scaling(instance: &dyn Instance, ctx: &SuiteContext) -> Result<(), SuiteError> {
    let hosts = checks::app_host_count(instance)?;
    if hosts != 1 {
        return Err(Failure::new(
            CheckKind::AssertionFailed,
            format!("expected 1 app host before scaling, found {hosts}"),
        )
        .into());
    }

    let branch = instance.parameters()?.remove(SCM_BRANCH).ok_or_else(|| {
        Failure::new(CheckKind::NotFound, format!("parameter {SCM_BRANCH} not set"))
    })?;
    let mut parameters = Map::new();
    parameters.insert(CLUSTER_SIZE.to_string(), Value::from("2"));
    parameters.insert(SCM_BRANCH.to_string(), branch);
    instance.reconfigure(parameters)?;
    ctx.wait_ready(instance, ctx.ready_timeout)?;

    check_site(instance, ctx)?;
    ctx.eventually().execute(|| match checks::app_host_count(instance)? {
        2 => Ok(()),
        n => Err(Failure::new(CheckKind::AssertionFailed, format!("{n} app hosts, want 2"))),
    })?;
    Ok(())
}

fn change_branch(instance: &dyn Instance, ctx: &SuiteContext) -> Result<(), SuiteError> {
    let mut parameters = Map::new();
    parameters.insert(SCM_BRANCH.to_string(), Value::from(UPDATED_BRANCH));
    instance.reconfigure(parameters)?;
    ctx.wait_ready(instance, ctx.ready_timeout)?;

    let url = check_site(instance, ctx)?;
    ctx.eventually().execute(|| ctx.site.fetch(&url)?.expect_contains(UPDATED_MARKER))?;
    Ok(())
}
