//! Environments under test.
//!
//! Each environment is a named set of provisioning policies handed to the platform when the
//! environment is created. The built-in matrix covers the plain default environment plus four EC2
//! images; an override matrix can be loaded from JSON in the platform's own shape:
//!
//! ```json
//! { "AmazonEC2_CentOS_63": { "policies": [
//!     { "action": "provisionVms", "parameter": "imageId", "value": "us-east-1/ami-eb6b0182" },
//!     { "action": "provisionVms", "parameter": "vmIdentity", "value": "root" } ] } }
//! ```
//!
//! Records are validated when they are constructed and immutable afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the environment without extra policies.
pub const DEFAULT_ENVIRONMENT: &str = "default";

const PROVISION_VMS: &str = "provisionVms";
const IMAGE_ID: &str = "imageId";
const VM_IDENTITY: &str = "vmIdentity";

/// Errors produced while building environment records.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("environment name must not be empty")]
    EmptyName,
    #[error("environment {environment}: imageId {value:?} is not of the form <region>/ami-<hex>")]
    InvalidImageId { environment: String, value: String },
    #[error("environment {environment}: vmIdentity must not be empty")]
    EmptyVmIdentity { environment: String },
    #[error("environment {environment}: policy {index} has an empty {field}")]
    IncompletePolicy { environment: String, index: usize, field: &'static str },
    #[error("invalid environment matrix: {0}")]
    Malformed(String),
}

/// One provisioning policy: which parameter of which platform action to override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    action: String,
    parameter: String,
    value: String,
}

impl Policy {
    pub fn new(
        action: impl Into<String>,
        parameter: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self { action: action.into(), parameter: parameter.into(), value: value.into() }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Built-in cloud images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudImage {
    CentOs63,
    CentOs53,
    Ubuntu1204,
    Ubuntu1004,
}

impl CloudImage {
    pub const ALL: [CloudImage; 4] =
        [CloudImage::CentOs63, CloudImage::CentOs53, CloudImage::Ubuntu1204, CloudImage::Ubuntu1004];

    pub fn environment_name(self) -> &'static str {
        match self {
            CloudImage::CentOs63 => "AmazonEC2_CentOS_63",
            CloudImage::CentOs53 => "AmazonEC2_CentOS_53",
            CloudImage::Ubuntu1204 => "AmazonEC2_Ubuntu_1204",
            CloudImage::Ubuntu1004 => "AmazonEC2_Ubuntu_1004",
        }
    }

    pub fn image_id(self) -> &'static str {
        match self {
            CloudImage::CentOs63 => "us-east-1/ami-eb6b0182",
            CloudImage::CentOs53 => "us-east-1/ami-beda31d7",
            CloudImage::Ubuntu1204 => "us-east-1/ami-d0f89fb9",
            CloudImage::Ubuntu1004 => "us-east-1/ami-0fac7566",
        }
    }

    /// Login user baked into the image.
    pub fn vm_identity(self) -> &'static str {
        match self {
            CloudImage::CentOs63 | CloudImage::CentOs53 => "root",
            CloudImage::Ubuntu1204 | CloudImage::Ubuntu1004 => "ubuntu",
        }
    }
}

/// A named environment and its provisioning policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentSpec {
    name: String,
    policies: Vec<Policy>,
}

impl EnvironmentSpec {
    /// Validate and build an environment record.
    pub fn new(name: impl Into<String>, policies: Vec<Policy>) -> Result<Self, EnvironmentError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EnvironmentError::EmptyName);
        }
        for (index, policy) in policies.iter().enumerate() {
            validate_policy(&name, index, policy)?;
        }
        Ok(Self { name, policies })
    }

    /// The platform's default environment, no overrides.
    pub fn default_env() -> Self {
        Self { name: DEFAULT_ENVIRONMENT.to_string(), policies: Vec::new() }
    }

    pub fn for_image(image: CloudImage) -> Self {
        Self {
            name: image.environment_name().to_string(),
            policies: vec![
                Policy::new(PROVISION_VMS, IMAGE_ID, image.image_id()),
                Policy::new(PROVISION_VMS, VM_IDENTITY, image.vm_identity()),
            ],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Value of the `provisionVms` policy for `parameter`, if set.
    pub fn provision_value(&self, parameter: &str) -> Option<&str> {
        self.policies
            .iter()
            .find(|p| p.action == PROVISION_VMS && p.parameter == parameter)
            .map(Policy::value)
    }
}

impl fmt::Display for EnvironmentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn validate_policy(environment: &str, index: usize, policy: &Policy) -> Result<(), EnvironmentError> {
    let incomplete = |field| EnvironmentError::IncompletePolicy {
        environment: environment.to_string(),
        index,
        field,
    };
    if policy.action.trim().is_empty() {
        return Err(incomplete("action"));
    }
    if policy.parameter.trim().is_empty() {
        return Err(incomplete("parameter"));
    }
    if policy.action != PROVISION_VMS {
        return Ok(());
    }
    match policy.parameter.as_str() {
        IMAGE_ID if !is_image_id(&policy.value) => Err(EnvironmentError::InvalidImageId {
            environment: environment.to_string(),
            value: policy.value.clone(),
        }),
        VM_IDENTITY if policy.value.trim().is_empty() => {
            Err(EnvironmentError::EmptyVmIdentity { environment: environment.to_string() })
        }
        _ => Ok(()),
    }
}

fn is_image_id(value: &str) -> bool {
    let Some((region, image)) = value.split_once('/') else {
        return false;
    };
    let Some(hex) = image.strip_prefix("ami-") else {
        return false;
    };
    !region.is_empty()
        && !region.contains(char::is_whitespace)
        && !hex.is_empty()
        && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// The built-in matrix: `default` followed by every [`CloudImage`].
pub fn matrix() -> Vec<EnvironmentSpec> {
    std::iter::once(EnvironmentSpec::default_env())
        .chain(CloudImage::ALL.into_iter().map(EnvironmentSpec::for_image))
        .collect()
}

#[derive(Deserialize)]
struct EnvironmentBody {
    #[serde(default)]
    policies: Vec<Policy>,
}

/// Parse and validate an override matrix. `default` comes first, the rest ordered by name.
pub fn matrix_from_json(text: &str) -> Result<Vec<EnvironmentSpec>, EnvironmentError> {
    let raw: BTreeMap<String, EnvironmentBody> =
        serde_json::from_str(text).map_err(|e| EnvironmentError::Malformed(e.to_string()))?;
    if raw.is_empty() {
        return Err(EnvironmentError::Malformed("no environments defined".to_string()));
    }
    let mut specs = raw
        .into_iter()
        .map(|(name, body)| EnvironmentSpec::new(name, body.policies))
        .collect::<Result<Vec<_>, _>>()?;
    specs.sort_by_key(|spec| spec.name != DEFAULT_ENVIRONMENT);
    Ok(specs)
}
