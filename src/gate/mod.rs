//! Server-side enforcement.
//!
//! Every call walks `Received → Extracted → Queried → Decided → {Admitted | Denied}`.
//! The handler runs only after the decision is known, and only when every
//! requested action came back `ALLOW`. PDP failures deny (fail-closed).

mod layer;

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

use crate::config::{GateConfig, DEFAULT_PLACEHOLDER_RESOURCE_ID};
use crate::error::{GateError, PdpError};
use crate::pdp::{
    Effect, PolicyDecisionPoint, Principal, Resource, ResourceBatch, ResourceCheck,
    ResourceEffects,
};
use crate::wire;

pub use layer::{EnforcementLayer, EnforcementService};

/// Per-call progress, reported on the gate's tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Received,
    Extracted,
    Queried,
    Decided,
    Admitted,
    Denied,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Received => "received",
            CallState::Extracted => "extracted",
            CallState::Queried => "queried",
            CallState::Decided => "decided",
            CallState::Admitted => "admitted",
            CallState::Denied => "denied",
        };
        f.write_str(s)
    }
}

/// Combined outcome over all requested actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { denied: Vec<String> },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Conjunction over `requested`: ALLOW only if every action is explicitly
/// ALLOW. Actions the PDP did not answer for count as DENY, as does a
/// missing result or an empty request.
pub fn combine(requested: &BTreeSet<String>, effects: Option<&ResourceEffects>) -> Decision {
    let denied: Vec<String> = requested
        .iter()
        .filter(|action| effects.and_then(|e| e.effect(action)) != Some(Effect::Allow))
        .cloned()
        .collect();

    if requested.is_empty() {
        return Decision::Deny { denied };
    }
    if denied.is_empty() {
        Decision::Allow
    } else {
        Decision::Deny { denied }
    }
}

/// What the gate admitted; inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub principal: Principal,
    pub resource: Resource,
    pub actions: BTreeSet<String>,
}

/// Decision gate in front of request handlers.
///
/// Holds only immutable state; one instance (behind an `Arc`) serves all
/// concurrent calls.
#[derive(Clone)]
pub struct EnforcementGate {
    pdp: Arc<dyn PolicyDecisionPoint>,
    placeholder_resource_id: String,
    pdp_timeout: Option<Duration>,
}

impl fmt::Debug for EnforcementGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnforcementGate")
            .field("placeholder_resource_id", &self.placeholder_resource_id)
            .field("pdp_timeout", &self.pdp_timeout)
            .finish_non_exhaustive()
    }
}

impl EnforcementGate {
    pub fn wrap(pdp: Arc<dyn PolicyDecisionPoint>) -> Self {
        Self {
            pdp,
            placeholder_resource_id: DEFAULT_PLACEHOLDER_RESOURCE_ID.to_string(),
            pdp_timeout: None,
        }
    }

    pub fn with_config(pdp: Arc<dyn PolicyDecisionPoint>, config: &GateConfig) -> Self {
        Self::wrap(pdp)
            .with_placeholder_resource_id(config.placeholder_resource_id.clone())
            .with_pdp_timeout(config.pdp.timeout())
    }

    pub fn with_placeholder_resource_id(mut self, id: impl Into<String>) -> Self {
        self.placeholder_resource_id = id.into();
        self
    }

    /// Bound the wait on the PDP; elapsing counts as unavailable.
    pub fn with_pdp_timeout(mut self, timeout: Duration) -> Self {
        self.pdp_timeout = Some(timeout);
        self
    }

    pub fn layer(&self) -> EnforcementLayer {
        EnforcementLayer::new(self.clone())
    }

    /// Run extraction, query and combination for one call's metadata.
    pub async fn authorize(&self, metadata: &MetadataMap) -> Result<Admission, GateError> {
        tracing::trace!(state = %CallState::Received, "Policy gate received call");

        let extracted = wire::extract(metadata).map_err(|err| {
            tracing::warn!(error = %err, state = %CallState::Denied, "Rejecting call");
            err
        })?;

        let span = tracing::info_span!(
            "policy_gate",
            principal = %extracted.principal.id,
            kind = %extracted.kind,
            scope = %extracted.scope,
        );

        async move {
            tracing::debug!(state = %CallState::Extracted, actions = ?extracted.actions);

            let resource = Resource {
                kind: extracted.kind,
                scope: extracted.scope,
                id: extracted
                    .resource_id
                    .unwrap_or_else(|| self.placeholder_resource_id.clone()),
            };
            let batch: ResourceBatch = vec![ResourceCheck {
                resource: resource.clone(),
                actions: extracted.actions.clone(),
            }];

            let result = self
                .query(&extracted.principal, &batch)
                .await
                .map_err(|err| {
                    tracing::warn!(
                        error = %err,
                        state = %CallState::Denied,
                        "Policy decision point failed; denying"
                    );
                    GateError::PolicyServiceUnavailable(err.to_string())
                })?;
            tracing::debug!(state = %CallState::Queried, resource_id = %resource.id);

            let decision = combine(&extracted.actions, result.get(&resource.id));
            tracing::debug!(state = %CallState::Decided, allowed = decision.is_allowed());

            match decision {
                Decision::Allow => {
                    tracing::info!(state = %CallState::Admitted, "Access granted");
                    Ok(Admission {
                        principal: extracted.principal,
                        resource,
                        actions: extracted.actions,
                    })
                }
                Decision::Deny { denied } => {
                    tracing::info!(state = %CallState::Denied, denied = ?denied, "Access denied");
                    Err(GateError::AccessDenied { denied })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn query(
        &self,
        principal: &Principal,
        batch: &ResourceBatch,
    ) -> Result<crate::pdp::CheckResourcesResult, PdpError> {
        let call = self.pdp.check_resources(principal, batch);
        match self.pdp_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| PdpError::Timeout(limit.as_millis() as u64))?,
            None => call.await,
        }
    }

    /// Gate a unary handler. The handler runs at most once, after admission,
    /// and its result is returned unchanged. The admitted [`Principal`] is
    /// available in the request extensions.
    pub async fn enforce<T, R, F, Fut>(
        &self,
        mut request: Request<T>,
        handler: F,
    ) -> Result<Response<R>, Status>
    where
        F: FnOnce(Request<T>) -> Fut,
        Fut: Future<Output = Result<Response<R>, Status>>,
    {
        let admission = self.authorize(request.metadata()).await?;
        request.extensions_mut().insert(admission.principal);
        handler(request).await
    }
}
