//! Backend Service Status
//!
//! The backend reports which of its collaborators (Ollama, Whisper, Stable
//! Diffusion, ...) are reachable. [`StatusPoller`] samples that report on an
//! interval and publishes it as a [`ServiceStatusMap`].

pub mod poller;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use poller::{PollOutcome, PollerHandle, StatusPoller};

/// Service name → availability
///
/// Replaced wholesale on every successful poll, never merged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceStatusMap(BTreeMap<String, bool>);

impl ServiceStatusMap {
    /// Empty map (nothing known yet)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Availability of one service, `None` if it was not reported
    #[must_use]
    pub fn get(&self, service: &str) -> Option<bool> {
        self.0.get(service).copied()
    }

    /// Whether a service was reported as available
    #[must_use]
    pub fn is_online(&self, service: &str) -> bool {
        self.get(service).unwrap_or(false)
    }

    /// Services in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(name, up)| (name.as_str(), *up))
    }

    /// Number of reported services
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of services reported available
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.0.values().filter(|up| **up).count()
    }
}

impl FromIterator<(String, bool)> for ServiceStatusMap {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Body of `GET /api/services/status`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServicesResponse {
    /// Reported services
    #[serde(default)]
    pub services: ServiceStatusMap,
}
