#![allow(dead_code)]

pub mod fake_platform;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use petclinic_suite::{
    config, Instance, InstanceStatus, InstantSleeper, PlatformError, SiteProbe, SuiteConfig,
    SuiteContext,
};
use serde_json::{Map, Value};

pub const USER: &str = "tester";
pub const PASSWORD: &str = "s3cret";
/// `Basic base64("tester:s3cret")`
pub const BASIC_AUTH: &str = "Basic dGVzdGVyOnMzY3JldA==";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Scenario context that never really sleeps.
pub fn fast_context() -> SuiteContext {
    let site = SiteProbe::new(false, Duration::from_secs(5)).unwrap();
    SuiteContext::new(site)
        .with_sleeper(InstantSleeper)
        .with_ready_timeout(Duration::from_secs(60))
        .with_ready_interval(Duration::from_secs(1))
        .with_connect_timeout(Duration::from_secs(2))
}

/// Configuration pointing at `tenant`, with the matrix overridden by `extra`.
pub fn suite_config(tenant: &str, extra: &[(&'static str, &str)]) -> SuiteConfig {
    let mut vars: HashMap<&'static str, String> = HashMap::new();
    vars.insert(config::TENANT, tenant.to_string());
    vars.insert(config::USER, USER.to_string());
    vars.insert(config::PASSWORD, PASSWORD.to_string());
    vars.insert(config::ORGANIZATION, "org-1".to_string());
    vars.insert(config::APPLICATION_ID, "app-petclinic".to_string());
    vars.insert(config::REQUEST_TIMEOUT_SECS, "5".to_string());
    for (key, value) in extra {
        vars.insert(*key, value.to_string());
    }
    SuiteConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

/// In-memory instance that replays a status script.
#[derive(Debug, Default)]
pub struct ScriptedInstance {
    statuses: Mutex<VecDeque<InstanceStatus>>,
    last: Mutex<Option<InstanceStatus>>,
    return_values: Mutex<Map<String, Value>>,
    parameters: Mutex<Map<String, Value>>,
    reconfigured: Mutex<Vec<Map<String, Value>>>,
    status_calls: Mutex<usize>,
}

impl ScriptedInstance {
    pub fn new<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = InstanceStatus>,
    {
        Self { statuses: Mutex::new(statuses.into_iter().collect()), ..Default::default() }
    }

    pub fn with_return_value(self, key: &str, value: Value) -> Self {
        self.return_values.lock().unwrap().insert(key.to_string(), value);
        self
    }

    pub fn with_parameter(self, key: &str, value: Value) -> Self {
        self.parameters.lock().unwrap().insert(key.to_string(), value);
        self
    }

    pub fn status_calls(&self) -> usize {
        *self.status_calls.lock().unwrap()
    }

    pub fn reconfigured(&self) -> Vec<Map<String, Value>> {
        self.reconfigured.lock().unwrap().clone()
    }
}

impl Instance for ScriptedInstance {
    fn id(&self) -> &str {
        "scripted"
    }

    /// Pops the next scripted status; the last one repeats once the script runs out.
    fn status(&self) -> Result<InstanceStatus, PlatformError> {
        *self.status_calls.lock().unwrap() += 1;
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.statuses.lock().unwrap().pop_front() {
            *last = Some(next);
        }
        Ok(last.clone().unwrap_or(InstanceStatus::Requested))
    }

    fn return_values(&self) -> Result<Map<String, Value>, PlatformError> {
        Ok(self.return_values.lock().unwrap().clone())
    }

    fn parameters(&self) -> Result<Map<String, Value>, PlatformError> {
        Ok(self.parameters.lock().unwrap().clone())
    }

    fn reconfigure(&self, parameters: Map<String, Value>) -> Result<(), PlatformError> {
        self.parameters.lock().unwrap().extend(parameters.clone());
        self.reconfigured.lock().unwrap().push(parameters);
        Ok(())
    }
}
