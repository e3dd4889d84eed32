//! Thin blocking client for the orchestration platform.
//!
//! Only the calls the suite needs are covered. Every read of an [`Instance`] goes back to the
//! platform, so pollers always observe fresh state.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::SuiteConfig;
use crate::environment::EnvironmentSpec;

const MANIFEST_CONTENT_TYPE: &str = "application/x-yaml";

/// Errors returned by platform calls.
#[derive(thiserror::Error, Debug)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("platform answered {status}: {body}")]
    Status { status: u16, body: String },
}

impl PlatformError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PlatformError::Http(e) if e.is_timeout())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::Status { status, .. } => Some(*status),
            PlatformError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Lifecycle status reported for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum InstanceStatus {
    Requested,
    Launching,
    Executing,
    Running,
    Failed,
    Destroying,
    Destroyed,
    Unknown(String),
}

impl InstanceStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, InstanceStatus::Running)
    }

    /// The instance will not become ready without outside intervention.
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Failed | InstanceStatus::Destroying | InstanceStatus::Destroyed
        )
    }
}

impl From<String> for InstanceStatus {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "requested" => InstanceStatus::Requested,
            "launching" => InstanceStatus::Launching,
            "executing" => InstanceStatus::Executing,
            "running" | "active" => InstanceStatus::Running,
            "failed" | "error" => InstanceStatus::Failed,
            "destroying" => InstanceStatus::Destroying,
            "destroyed" => InstanceStatus::Destroyed,
            _ => InstanceStatus::Unknown(raw),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Unknown(raw) => write!(f, "Unknown({})", raw),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// Snapshot of an instance as returned by the platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub id: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub return_values: Map<String, Value>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

/// An application as listed for an organization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationSummary {
    pub id: String,
    pub name: String,
}

/// A launched application instance that scenarios can inspect and reconfigure.
pub trait Instance {
    fn id(&self) -> &str;
    fn status(&self) -> Result<InstanceStatus, PlatformError>;
    fn return_values(&self) -> Result<Map<String, Value>, PlatformError>;
    fn parameters(&self) -> Result<Map<String, Value>, PlatformError>;
    /// Submit new parameter values; the instance re-converges asynchronously.
    fn reconfigure(&self, parameters: Map<String, Value>) -> Result<(), PlatformError>;
}

/// HTTP client bound to one tenant and one set of credentials.
#[derive(Clone)]
pub struct PlatformClient {
    http: Client,
    base: String,
    user: String,
    password: String,
}

impl fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformClient")
            .field("base", &self.base)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl PlatformClient {
    pub fn new(config: &SuiteConfig) -> Result<Self, PlatformError> {
        Self::connect(
            &config.tenant,
            &config.user,
            &config.password,
            config.request_timeout,
            config.verify_tls,
        )
    }

    pub fn connect(
        tenant: &str,
        user: &str,
        password: &str,
        timeout: Duration,
        verify_tls: bool,
    ) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;
        Ok(Self {
            http,
            base: tenant.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/1/{}", self.base, path)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let response = request.basic_auth(&self.user, Some(&self.password)).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(PlatformError::Status { status: status.as_u16(), body })
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PlatformError> {
        Ok(self.send(request)?.json()?)
    }

    /// Create `spec` inside `organization`; returns the new environment id.
    pub fn create_environment(
        &self,
        organization: &str,
        spec: &EnvironmentSpec,
    ) -> Result<String, PlatformError> {
        let request = self
            .http
            .post(self.url(&format!("organizations/{}/environments", organization)))
            .json(&json!({ "name": spec.name(), "policies": spec.policies() }));
        let created: Created = self.send_json(request)?;
        tracing::info!(environment = %spec, id = %created.id, "environment created");
        Ok(created.id)
    }

    pub fn destroy_environment(&self, environment_id: &str) -> Result<(), PlatformError> {
        self.send(self.http.delete(self.url(&format!("environments/{}", environment_id))))?;
        Ok(())
    }

    pub fn applications(&self, organization: &str) -> Result<Vec<ApplicationSummary>, PlatformError> {
        self.send_json(
            self.http.get(self.url(&format!("organizations/{}/applications", organization))),
        )
    }

    /// Create application `name` from `manifest`; returns the new application id.
    pub fn create_application(
        &self,
        organization: &str,
        name: &str,
        manifest: &str,
    ) -> Result<String, PlatformError> {
        let request = self
            .http
            .post(self.url(&format!("organizations/{}/applications", organization)))
            .json(&json!({ "name": name, "manifest": manifest }));
        let created: Created = self.send_json(request)?;
        tracing::info!(application = name, id = %created.id, "application created");
        Ok(created.id)
    }

    /// Replace the manifest of an existing application.
    pub fn update_manifest(&self, application_id: &str, manifest: &str) -> Result<(), PlatformError> {
        let request = self
            .http
            .put(self.url(&format!("applications/{}/manifest", application_id)))
            .header(CONTENT_TYPE, MANIFEST_CONTENT_TYPE)
            .body(manifest.to_string());
        self.send(request)?;
        tracing::info!(application = application_id, bytes = manifest.len(), "manifest uploaded");
        Ok(())
    }

    /// Upload `manifest` to the application called `name`, creating it when the organization has
    /// none by that name. Returns the application id.
    pub fn upload_application(
        &self,
        organization: &str,
        name: &str,
        manifest: &str,
    ) -> Result<String, PlatformError> {
        match self.applications(organization)?.into_iter().find(|app| app.name == name) {
            Some(app) => {
                self.update_manifest(&app.id, manifest)?;
                Ok(app.id)
            }
            None => self.create_application(organization, name, manifest),
        }
    }

    /// Launch `application` in `environment_id`; the platform destroys it after `destroy_interval`.
    pub fn launch(
        &self,
        application: &str,
        environment_id: &str,
        parameters: &Map<String, Value>,
        destroy_interval: Duration,
    ) -> Result<PlatformInstance, PlatformError> {
        let destroy_ms = u64::try_from(destroy_interval.as_millis()).unwrap_or(u64::MAX);
        let request = self
            .http
            .post(self.url(&format!("applications/{}/launch", application)))
            .json(&json!({
                "environmentId": environment_id,
                "parameters": parameters,
                "destroyInterval": destroy_ms,
            }));
        let created: Created = self.send_json(request)?;
        tracing::info!(application, instance = %created.id, "instance launched");
        Ok(PlatformInstance { client: self.clone(), id: created.id })
    }

    pub fn instance(&self, instance_id: &str) -> Result<InstanceInfo, PlatformError> {
        self.send_json(self.http.get(self.url(&format!("instances/{}", instance_id))))
    }

    pub fn reconfigure(
        &self,
        instance_id: &str,
        parameters: &Map<String, Value>,
    ) -> Result<(), PlatformError> {
        let request = self
            .http
            .put(self.url(&format!("instances/{}/reconfigure", instance_id)))
            .json(&json!({ "parameters": parameters }));
        self.send(request)?;
        tracing::info!(instance = instance_id, ?parameters, "instance reconfigured");
        Ok(())
    }

    pub fn destroy(&self, instance_id: &str) -> Result<(), PlatformError> {
        self.send(self.http.delete(self.url(&format!("instances/{}", instance_id))))?;
        Ok(())
    }
}

/// [`Instance`] backed by live platform calls.
#[derive(Debug, Clone)]
pub struct PlatformInstance {
    client: PlatformClient,
    id: String,
}

impl PlatformInstance {
    pub fn attach(client: PlatformClient, id: impl Into<String>) -> Self {
        Self { client, id: id.into() }
    }

    pub fn destroy(&self) -> Result<(), PlatformError> {
        self.client.destroy(&self.id)
    }
}

impl Instance for PlatformInstance {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Result<InstanceStatus, PlatformError> {
        Ok(self.client.instance(&self.id)?.status)
    }

    fn return_values(&self) -> Result<Map<String, Value>, PlatformError> {
        Ok(self.client.instance(&self.id)?.return_values)
    }

    fn parameters(&self) -> Result<Map<String, Value>, PlatformError> {
        Ok(self.client.instance(&self.id)?.parameters)
    }

    fn reconfigure(&self, parameters: Map<String, Value>) -> Result<(), PlatformError> {
        self.client.reconfigure(&self.id, &parameters)
    }
}
