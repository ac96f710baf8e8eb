//! Core types for productionapp-control.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Longest stack name the engine accepts.
pub const MAX_NAME_LEN: usize = 100;

/// Name of the project every deployment stack belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectName(String);

impl ProjectName {
    /// Create a new project name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of a deployment, unique within its project.
///
/// Doubles as the engine stack name and as a path component of the stack's
/// working directory, so only `[A-Za-z0-9._-]` is allowed and a leading dot
/// is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeploymentName(String);

impl DeploymentName {
    /// Parse and validate a deployment name.
    pub fn parse(name: impl Into<String>) -> ControlResult<Self> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(ControlError::validation("name must not be empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ControlError::validation(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        if name.starts_with('.') {
            return Err(ControlError::validation("name must not start with '.'"));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(ControlError::validation(format!(
                "name contains invalid character {c:?}"
            )));
        }

        Ok(Self(name))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DeploymentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for DeploymentName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

/// A validated `(name, image, port)` deployment descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentSpec {
    name: DeploymentName,
    image: String,
    port: u16,
}

impl DeploymentSpec {
    /// Validate and build a descriptor.
    ///
    /// The port is taken as a wide integer so that negative or oversized
    /// values are reported as validation errors.
    pub fn new(name: impl Into<String>, image: impl Into<String>, port: i64) -> ControlResult<Self> {
        let name = DeploymentName::parse(name)?;

        let image = image.into();
        if image.trim().is_empty() {
            return Err(ControlError::validation("image must not be empty"));
        }

        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                ControlError::validation(format!("port must be between 1 and 65535, got {port}"))
            })?;

        Ok(Self { name, image, port })
    }

    /// Deployment name.
    #[must_use]
    pub const fn name(&self) -> &DeploymentName {
        &self.name
    }

    /// Container image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Port the application listens on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

/// A deployment instance as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInstance {
    /// Deployment name.
    pub name: String,
    /// When the stack was last updated, as reported by the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    /// Number of resources the stack manages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_count: Option<u64>,
    /// Whether an update is running right now.
    #[serde(default)]
    pub update_in_progress: bool,
    /// Console URL for the stack, if the backend has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Lifecycle state of a live stack.
///
/// `NonExistent` is represented by the absence of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Stack created, resources being provisioned.
    Provisioning,
    /// Resources are up.
    Active,
    /// Resources being torn down.
    Destroying,
}

impl InstanceState {
    /// Get the state name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Destroying => "destroying",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn valid_spec() {
        let spec = DeploymentSpec::new("demo", "gcr.io/kuar-demo/kuard-amd64:blue", 80).unwrap();
        assert_eq!(spec.name().as_str(), "demo");
        assert_eq!(spec.image(), "gcr.io/kuar-demo/kuard-amd64:blue");
        assert_eq!(spec.port(), 80);
    }

    #[test]
    fn port_bounds() {
        assert!(DeploymentSpec::new("a", "img", 1).is_ok());
        assert!(DeploymentSpec::new("a", "img", 65535).is_ok());

        for port in [0, -1, 65536, i64::MAX] {
            let err = DeploymentSpec::new("a", "img", port).unwrap_err();
            assert!(matches!(err, ControlError::Validation(_)), "port {port}");
        }
    }

    #[test]
    fn empty_fields_rejected() {
        assert!(matches!(
            DeploymentSpec::new("", "img", 80),
            Err(ControlError::Validation(_))
        ));
        assert!(matches!(
            DeploymentSpec::new("demo", "  ", 80),
            Err(ControlError::Validation(_))
        ));
    }

    #[test]
    fn name_character_set() {
        assert!(DeploymentName::parse("my-app_v1.2").is_ok());
        assert!(DeploymentName::parse("../etc").is_err());
        assert!(DeploymentName::parse(".hidden").is_err());
        assert!(DeploymentName::parse("a/b").is_err());
        assert!(DeploymentName::parse("with space").is_err());
        assert!(DeploymentName::parse("x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn name_deserialize_validates() {
        let name: DeploymentName = serde_json::from_str("\"demo\"").unwrap();
        assert_eq!(name.as_str(), "demo");
        assert!(serde_json::from_str::<DeploymentName>("\"\"").is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(InstanceState::Destroying.to_string(), "destroying");
        assert_eq!(InstanceState::Active.to_string(), "active");
    }
}
