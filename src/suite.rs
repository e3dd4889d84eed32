//! Run every scenario against every environment.
//!
//! When a manifest is configured it is uploaded once, before the matrix. Per environment: create
//! the environment, launch the application, wait until it is ready, run
//! the scenarios in order, then destroy the instance and the environment. Teardown is best
//! effort; its failures are logged and never change the verdict.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Map;
use tracing::{info, info_span, warn};

use crate::checks::{CheckKind, SiteProbe};
use crate::config::SuiteConfig;
use crate::environment::EnvironmentSpec;
use crate::failure::Failure;
use crate::platform::{Instance, PlatformClient, PlatformInstance};
use crate::scenarios::{Scenario, SuiteContext, SuiteError};

/// Result of one scenario in one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Results for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub outcomes: Vec<ScenarioOutcome>,
}

impl EnvironmentReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    fn provisioning_failed(
        env: &EnvironmentSpec,
        instance_id: Option<String>,
        scenarios: &[Scenario],
        err: &SuiteError,
    ) -> Self {
        warn!(environment = %env, error = %err, "provisioning failed");
        Self::all_failed(env, instance_id, scenarios, format!("provisioning failed: {err}"))
    }

    fn all_failed(
        env: &EnvironmentSpec,
        instance_id: Option<String>,
        scenarios: &[Scenario],
        error: String,
    ) -> Self {
        Self {
            environment: env.name().to_string(),
            instance_id,
            outcomes: scenarios
                .iter()
                .map(|s| ScenarioOutcome {
                    scenario: s.name(),
                    passed: false,
                    error: Some(error.clone()),
                    duration_ms: 0,
                })
                .collect(),
        }
    }
}

/// Results for the whole matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    pub environments: Vec<EnvironmentReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.environments.iter().all(EnvironmentReport::passed)
    }

    /// `(environment, scenario, error)` for every failed scenario.
    pub fn failures(&self) -> Vec<(&str, &str, &str)> {
        self.environments
            .iter()
            .flat_map(|env| {
                env.outcomes.iter().filter(|o| !o.passed).map(move |o| {
                    (env.environment.as_str(), o.scenario, o.error.as_deref().unwrap_or(""))
                })
            })
            .collect()
    }
}

/// Run the given scenarios against an already-running instance.
pub fn run_scenarios(
    instance: &dyn Instance,
    scenarios: &[Scenario],
    ctx: &SuiteContext,
) -> Vec<ScenarioOutcome> {
    scenarios
        .iter()
        .map(|&scenario| {
            let _span = info_span!("scenario", scenario = scenario.name()).entered();
            let started = Instant::now();
            let result = scenario.run(instance, ctx);
            let duration_ms = millis(started.elapsed());
            match result {
                Ok(()) => {
                    info!(duration_ms, "scenario passed");
                    ScenarioOutcome { scenario: scenario.name(), passed: true, error: None, duration_ms }
                }
                Err(err) => {
                    warn!(duration_ms, error = %err, "scenario failed");
                    ScenarioOutcome {
                        scenario: scenario.name(),
                        passed: false,
                        error: Some(err.to_string()),
                        duration_ms,
                    }
                }
            }
        })
        .collect()
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// The matrix runner.
#[derive(Debug)]
pub struct Suite {
    client: PlatformClient,
    config: SuiteConfig,
    context: SuiteContext,
    scenarios: Vec<Scenario>,
}

impl Suite {
    pub fn new(config: SuiteConfig) -> Result<Self, SuiteError> {
        let client = PlatformClient::new(&config)?;
        let site = SiteProbe::new(config.verify_tls, config.request_timeout)?;
        let context = SuiteContext::new(site).with_ready_timeout(config.ready_timeout);
        Ok(Self { client, config, context, scenarios: Scenario::ALL.to_vec() })
    }

    /// Replace the scenario context (sleeper, intervals, site client).
    pub fn with_context(mut self, context: SuiteContext) -> Self {
        self.context = context;
        self
    }

    /// Run only `scenarios`, in the given order.
    pub fn with_scenarios(mut self, scenarios: &[Scenario]) -> Self {
        self.scenarios = scenarios.to_vec();
        self
    }

    pub fn run(&self) -> SuiteReport {
        let environments = match self.prepare_application() {
            Ok(application) => self
                .config
                .environments
                .iter()
                .map(|env| self.run_environment(&application, env))
                .collect(),
            Err(err) => {
                warn!(error = %err, "application setup failed");
                let error = format!("application setup failed: {err}");
                self.config
                    .environments
                    .iter()
                    .map(|env| {
                        EnvironmentReport::all_failed(env, None, &self.scenarios, error.clone())
                    })
                    .collect()
            }
        };
        let report = SuiteReport { environments };
        info!(passed = report.passed(), failures = report.failures().len(), "suite finished");
        report
    }

    /// Upload the configured manifest, if any; returns the application id to launch.
    pub fn prepare_application(&self) -> Result<String, SuiteError> {
        let config = &self.config;
        let id = match (&config.manifest, &config.application_id) {
            (None, Some(id)) => id.clone(),
            (Some(manifest), Some(id)) => {
                self.client.update_manifest(id, manifest)?;
                id.clone()
            }
            (Some(manifest), None) => self.client.upload_application(
                &config.organization,
                &config.application_name,
                manifest,
            )?,
            (None, None) => {
                return Err(Failure::new(
                    CheckKind::NotFound,
                    "neither an application id nor a manifest is configured",
                )
                .into())
            }
        };
        info!(application = %id, "application ready");
        Ok(id)
    }

    pub fn run_environment(&self, application: &str, env: &EnvironmentSpec) -> EnvironmentReport {
        let _span = info_span!("environment", environment = %env).entered();

        let env_id = match self.client.create_environment(&self.config.organization, env) {
            Ok(id) => id,
            Err(err) => {
                return EnvironmentReport::provisioning_failed(env, None, &self.scenarios, &err.into())
            }
        };

        let report = match self.client.launch(
            application,
            &env_id,
            &Map::new(),
            self.config.destroy_interval,
        ) {
            Err(err) => {
                EnvironmentReport::provisioning_failed(env, None, &self.scenarios, &err.into())
            }
            Ok(instance) => {
                let report = self.exercise(env, &instance);
                self.destroy_instance(&instance);
                report
            }
        };

        if let Err(err) = self.client.destroy_environment(&env_id) {
            warn!(environment_id = %env_id, error = %err, "environment teardown failed");
        }
        report
    }

    fn exercise(&self, env: &EnvironmentSpec, instance: &PlatformInstance) -> EnvironmentReport {
        let instance_id = Some(instance.id().to_string());
        if let Err(err) = self.context.wait_ready(instance, self.config.launch_timeout) {
            return EnvironmentReport::provisioning_failed(
                env,
                instance_id,
                &self.scenarios,
                &err.into(),
            );
        }
        EnvironmentReport {
            environment: env.name().to_string(),
            instance_id,
            outcomes: run_scenarios(instance, &self.scenarios, &self.context),
        }
    }

    fn destroy_instance(&self, instance: &PlatformInstance) {
        if let Err(err) = instance.destroy() {
            warn!(instance = instance.id(), error = %err, "instance teardown failed");
        }
    }
}
