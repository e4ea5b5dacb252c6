//! Authorization context carried by an outgoing call.
//!
//! A [`PolicyContextBuilder`] collects attributes in any order and
//! [`PolicyContextBuilder::build`] is the only way to obtain a
//! [`ValidatedPolicyContext`]. The validated type has no mutators, so the
//! context that is propagated is exactly the context that was checked.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::ValidationError;

/// Attributes a context must carry, in the order `build()` checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Roles,
    ResourceKind,
    Scope,
    Actions,
    Principal,
}

impl Field {
    pub const CHECK_ORDER: [Field; 5] = [
        Field::Roles,
        Field::ResourceKind,
        Field::Scope,
        Field::Actions,
        Field::Principal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Roles => "roles",
            Field::ResourceKind => "resource_kind",
            Field::Scope => "scope",
            Field::Actions => "actions",
            Field::Principal => "principal",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw, possibly incomplete attribute bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyContext {
    pub principal_id: String,
    pub roles: Vec<String>,
    pub resource_kind: String,
    /// May be empty; the receiving side substitutes a placeholder.
    pub resource_id: String,
    pub scope: String,
    pub actions: BTreeSet<String>,
}

impl PolicyContext {
    /// First missing required attribute, following [`Field::CHECK_ORDER`].
    pub fn first_missing(&self) -> Option<Field> {
        Field::CHECK_ORDER.into_iter().find(|field| match field {
            Field::Roles => self.roles.is_empty(),
            Field::ResourceKind => self.resource_kind.is_empty(),
            Field::Scope => self.scope.is_empty(),
            Field::Actions => self.actions.is_empty(),
            Field::Principal => self.principal_id.is_empty(),
        })
    }
}

/// A [`PolicyContext`] that passed validation. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPolicyContext {
    inner: PolicyContext,
}

impl ValidatedPolicyContext {
    pub fn principal_id(&self) -> &str {
        &self.inner.principal_id
    }

    pub fn roles(&self) -> &[String] {
        &self.inner.roles
    }

    pub fn resource_kind(&self) -> &str {
        &self.inner.resource_kind
    }

    pub fn resource_id(&self) -> &str {
        &self.inner.resource_id
    }

    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    pub fn actions(&self) -> &BTreeSet<String> {
        &self.inner.actions
    }

    pub fn as_context(&self) -> &PolicyContext {
        &self.inner
    }
}

/// Incremental constructor for [`ValidatedPolicyContext`].
///
/// Scalar fields and `with_roles` are last-write-wins; actions accumulate as
/// a set. Blank role and action names are dropped on insertion.
#[derive(Debug, Clone, Default)]
pub struct PolicyContextBuilder {
    ctx: PolicyContext,
}

impl PolicyContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, principal_id: impl Into<String>) -> Self {
        self.ctx.principal_id = principal_id.into();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ctx.roles.clear();
        for role in roles {
            push_role(&mut self.ctx.roles, role.into());
        }
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        push_role(&mut self.ctx.roles, role.into());
        self
    }

    pub fn with_resource_kind(mut self, kind: impl Into<String>) -> Self {
        self.ctx.resource_kind = kind.into();
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.ctx.resource_id = id.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.ctx.scope = scope.into();
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ctx.actions.extend(
            actions
                .into_iter()
                .map(Into::into)
                .filter(|a: &String| !a.is_empty()),
        );
        self
    }

    pub fn with_action(self, action: impl Into<String>) -> Self {
        self.with_actions([action.into()])
    }

    pub fn build(self) -> Result<ValidatedPolicyContext, ValidationError> {
        match self.ctx.first_missing() {
            Some(field) => Err(ValidationError::MissingField(field)),
            None => Ok(ValidatedPolicyContext { inner: self.ctx }),
        }
    }
}

// Roles are an ordered sequence; keep first occurrence only.
fn push_role(roles: &mut Vec<String>, role: String) {
    if !role.is_empty() && !roles.contains(&role) {
        roles.push(role);
    }
}
