//! Health report for the credential subsystem
//!
//! Surfaces problems that otherwise only show up as `None` tokens: missing
//! OS encryption, an unwritable storage directory, or a provider whose
//! refreshes keep failing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate health of the credential subsystem
///
/// # Example
/// ```
/// use tabula_lib::utils::health::{ComponentHealth, HealthStatus};
///
/// let status = HealthStatus::new()
///     .add_component(ComponentHealth::healthy("encryption"))
///     .add_component(ComponentHealth::degraded("refresh:openai-codex", "2 consecutive failures"))
///     .finish();
///
/// assert!(status.is_healthy);
/// assert_eq!(status.degraded().count(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// False when any component is unavailable.
    pub is_healthy: bool,
    /// Names of unavailable components, if any.
    pub message: Option<String>,
    pub components: Vec<ComponentHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    /// Empty, healthy report stamped now.
    pub fn new() -> Self {
        Self { is_healthy: true, message: None, components: Vec::new(), checked_at: Utc::now() }
    }

    /// Append a component result.
    pub fn add_component(mut self, component: ComponentHealth) -> Self {
        self.components.push(component);
        self
    }

    /// Derive the overall verdict from the components added so far.
    #[must_use]
    pub fn finish(mut self) -> Self {
        let unavailable: Vec<&str> = self
            .components
            .iter()
            .filter(|c| c.state == ComponentState::Unavailable)
            .map(|c| c.name.as_str())
            .collect();

        self.is_healthy = unavailable.is_empty();
        self.message = (!unavailable.is_empty())
            .then(|| format!("unavailable: {}", unavailable.join(", ")));
        self
    }

    /// Components that work but need attention.
    pub fn degraded(&self) -> impl Iterator<Item = &ComponentHealth> {
        self.components.iter().filter(|c| c.state == ComponentState::Degraded)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Component condition, worst last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    /// Fully working.
    Healthy,
    /// Working, but a background process keeps failing.
    Degraded,
    /// Operations depending on this component fail.
    Unavailable,
}

/// Health of one component (e.g. `"encryption"`, `"refresh:openai"`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name.
    pub name: String,
    /// Current condition.
    pub state: ComponentState,
    /// Why the component is not healthy.
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: ComponentState::Healthy, message: None }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), state: ComponentState::Degraded, message: Some(message.into()) }
    }

    pub fn unavailable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), state: ComponentState::Unavailable, message: Some(message.into()) }
    }
}
