//! Policy Decision Point port.
//!
//! The gate only ever talks to a `dyn PolicyDecisionPoint`. Adapters:
//! - [`HttpPdpClient`]: remote PDP speaking the Cerbos `/api/check/resources` JSON API
//! - [`InMemoryPdp`]: rule table evaluated in-process

pub mod http;
pub mod memory;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PdpError;

pub use http::HttpPdpClient;
pub use memory::{InMemoryPdp, Rule};

/// Per-action verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: String,
    pub scope: String,
    pub id: String,
}

/// One resource together with the actions requested on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCheck {
    pub resource: Resource,
    pub actions: BTreeSet<String>,
}

pub type ResourceBatch = Vec<ResourceCheck>;

/// Effects the PDP returned for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceEffects {
    pub actions: BTreeMap<String, Effect>,
}

impl ResourceEffects {
    pub fn effect(&self, action: &str) -> Option<Effect> {
        self.actions.get(action).copied()
    }
}

impl<S: Into<String>> FromIterator<(S, Effect)> for ResourceEffects {
    fn from_iter<T: IntoIterator<Item = (S, Effect)>>(iter: T) -> Self {
        Self {
            actions: iter.into_iter().map(|(a, e)| (a.into(), e)).collect(),
        }
    }
}

/// PDP answer keyed by resource id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResourcesResult {
    pub results: HashMap<String, ResourceEffects>,
}

impl CheckResourcesResult {
    pub fn get(&self, resource_id: &str) -> Option<&ResourceEffects> {
        self.results.get(resource_id)
    }
}

/// The decision service as consumed by the gate.
///
/// Implementations are shared across concurrent calls and must be
/// `Send + Sync`. Retries, if any, live inside the implementation.
#[async_trait]
pub trait PolicyDecisionPoint: Send + Sync {
    async fn check_resources(
        &self,
        principal: &Principal,
        batch: &ResourceBatch,
    ) -> Result<CheckResourcesResult, PdpError>;
}
