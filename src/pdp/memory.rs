//! In-process PDP backed by a static rule table.
//!
//! Evaluation per action: an explicit DENY from any matching rule wins, then
//! any matching ALLOW, otherwise DENY.

use async_trait::async_trait;

use super::{
    CheckResourcesResult, Effect, PolicyDecisionPoint, Principal, Resource, ResourceBatch,
    ResourceEffects,
};
use crate::error::PdpError;

/// Matches any action, kind or scope.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub role: String,
    pub kind: String,
    /// `None` matches every scope.
    pub scope: Option<String>,
    pub actions: Vec<String>,
    pub effect: Effect,
}

impl Rule {
    fn matches(&self, principal: &Principal, resource: &Resource, action: &str) -> bool {
        principal.has_role(&self.role)
            && (self.kind == WILDCARD || self.kind == resource.kind)
            && self
                .scope
                .as_deref()
                .map_or(true, |s| s == WILDCARD || s == resource.scope)
            && self.actions.iter().any(|a| a == WILDCARD || a == action)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPdp {
    rules: Vec<Rule>,
}

impl InMemoryPdp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn allow<I, S>(self, role: &str, kind: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_rule(Rule {
            role: role.to_string(),
            kind: kind.to_string(),
            scope: None,
            actions: actions.into_iter().map(Into::into).collect(),
            effect: Effect::Allow,
        })
    }

    pub fn deny<I, S>(self, role: &str, kind: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_rule(Rule {
            role: role.to_string(),
            kind: kind.to_string(),
            scope: None,
            actions: actions.into_iter().map(Into::into).collect(),
            effect: Effect::Deny,
        })
    }

    pub fn evaluate(&self, principal: &Principal, resource: &Resource, action: &str) -> Effect {
        let mut allowed = false;
        for rule in self.rules.iter().filter(|r| r.matches(principal, resource, action)) {
            match rule.effect {
                Effect::Deny => return Effect::Deny,
                Effect::Allow => allowed = true,
            }
        }
        if allowed {
            Effect::Allow
        } else {
            Effect::Deny
        }
    }
}

#[async_trait]
impl PolicyDecisionPoint for InMemoryPdp {
    async fn check_resources(
        &self,
        principal: &Principal,
        batch: &ResourceBatch,
    ) -> Result<CheckResourcesResult, PdpError> {
        let mut result = CheckResourcesResult::default();
        for check in batch {
            let effects: ResourceEffects = check
                .actions
                .iter()
                .map(|action| {
                    (
                        action.clone(),
                        self.evaluate(principal, &check.resource, action),
                    )
                })
                .collect();
            result.results.insert(check.resource.id.clone(), effects);
        }
        Ok(result)
    }
}
