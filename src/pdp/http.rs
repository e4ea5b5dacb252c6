//! Remote PDP client for the Cerbos-compatible `/api/check/resources` API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    CheckResourcesResult, Effect, PolicyDecisionPoint, Principal, ResourceBatch, ResourceEffects,
};
use crate::config::PdpConfig;
use crate::error::{ConfigError, PdpError};

const CHECK_RESOURCES_PATH: &str = "api/check/resources";

/// Shared, cloneable client. `reqwest::Client` pools connections internally,
/// so one instance serves all concurrent calls.
#[derive(Debug, Clone)]
pub struct HttpPdpClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpPdpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let endpoint = endpoint_for(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot build http client: {e}")))?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &PdpConfig) -> Result<Self, ConfigError> {
        Self::new(&config.base_url, config.timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn endpoint_for(base_url: &str) -> Result<Url, ConfigError> {
    let mut base = Url::parse(base_url)
        .map_err(|e| ConfigError::Invalid(format!("pdp base_url '{base_url}': {e}")))?;
    // Url::join drops the last segment unless the base ends with '/'.
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(CHECK_RESOURCES_PATH)
        .map_err(|e| ConfigError::Invalid(format!("pdp base_url '{base_url}': {e}")))
}

// ── Wire types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResourcesRequest<'a> {
    request_id: String,
    principal: WirePrincipal<'a>,
    resources: Vec<WireResourceEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct WirePrincipal<'a> {
    id: &'a str,
    roles: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireResourceEntry<'a> {
    actions: Vec<&'a str>,
    resource: WireResource<'a>,
}

#[derive(Debug, Serialize)]
struct WireResource<'a> {
    kind: &'a str,
    id: &'a str,
    scope: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckResourcesResponse {
    #[serde(default)]
    results: Vec<WireResult>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    resource: WireResultResource,
    #[serde(default)]
    actions: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WireResultResource {
    id: String,
}

fn decode_effect(raw: &str) -> Effect {
    match raw {
        "EFFECT_ALLOW" => Effect::Allow,
        _ => Effect::Deny,
    }
}

impl From<CheckResourcesResponse> for CheckResourcesResult {
    fn from(response: CheckResourcesResponse) -> Self {
        let results = response
            .results
            .into_iter()
            .map(|r| {
                let effects: ResourceEffects = r
                    .actions
                    .iter()
                    .map(|(action, effect)| (action.clone(), decode_effect(effect)))
                    .collect();
                (r.resource.id, effects)
            })
            .collect();
        Self { results }
    }
}

#[async_trait]
impl PolicyDecisionPoint for HttpPdpClient {
    async fn check_resources(
        &self,
        principal: &Principal,
        batch: &ResourceBatch,
    ) -> Result<CheckResourcesResult, PdpError> {
        let body = CheckResourcesRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            principal: WirePrincipal {
                id: &principal.id,
                roles: &principal.roles,
                scope: batch.first().map(|c| c.resource.scope.as_str()),
            },
            resources: batch
                .iter()
                .map(|check| WireResourceEntry {
                    actions: check.actions.iter().map(String::as_str).collect(),
                    resource: WireResource {
                        kind: &check.resource.kind,
                        id: &check.resource.id,
                        scope: &check.resource.scope,
                    },
                })
                .collect(),
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            request_id = %body.request_id,
            principal = %principal.id,
            resources = batch.len(),
            "Querying policy decision point"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PdpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: CheckResourcesResponse = response.json().await?;
        Ok(decoded.into())
    }
}
