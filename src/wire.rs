//! Call-metadata encoding of a policy context.
//!
//! | key           | cardinality |
//! |---------------|-------------|
//! | `principal`   | 1           |
//! | `role`        | 1..N        |
//! | `scope`       | 1           |
//! | `kind`        | 1           |
//! | `action`      | 1..N        |
//! | `resource-id` | 0..1        |
//!
//! Keys are case-sensitive and shared by [`crate::ContextPropagator`] and
//! [`crate::EnforcementGate`].

use std::collections::BTreeSet;

use tonic::metadata::{Ascii, MetadataMap, MetadataValue};

use crate::context::ValidatedPolicyContext;
use crate::error::GateError;
use crate::pdp::Principal;

pub const PRINCIPAL_KEY: &str = "principal";
pub const ROLE_KEY: &str = "role";
pub const SCOPE_KEY: &str = "scope";
pub const KIND_KEY: &str = "kind";
pub const ACTION_KEY: &str = "action";
pub const RESOURCE_ID_KEY: &str = "resource-id";

/// Every key the propagator may write.
pub const POLICY_KEYS: [&str; 6] = [
    PRINCIPAL_KEY,
    ROLE_KEY,
    SCOPE_KEY,
    KIND_KEY,
    ACTION_KEY,
    RESOURCE_ID_KEY,
];

/// A context value that cannot be carried as an ASCII metadata value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("value for metadata key '{key}' is not valid ASCII metadata")]
pub struct EncodeError {
    pub key: &'static str,
}

/// Fully encoded context, ready to be applied to a call.
#[derive(Debug, Clone)]
pub struct EncodedContext {
    entries: Vec<(&'static str, MetadataValue<Ascii>)>,
}

impl EncodedContext {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace any existing policy keys in `metadata` with this context.
    pub fn apply(&self, metadata: &mut MetadataMap) {
        for key in POLICY_KEYS {
            metadata.remove(key);
        }
        for (key, value) in &self.entries {
            metadata.append(*key, value.clone());
        }
    }
}

// http accepts obs-text bytes (>= 0x80) in header values; the receiving side
// can only read visible ASCII back. HTTP/2 also forbids leading or trailing
// whitespace in field values.
fn value(key: &'static str, raw: &str) -> Result<MetadataValue<Ascii>, EncodeError> {
    if raw != raw.trim() || !raw.bytes().all(|b| b == b' ' || b.is_ascii_graphic()) {
        return Err(EncodeError { key });
    }
    MetadataValue::try_from(raw).map_err(|_| EncodeError { key })
}

/// Encode every attribute up front so a bad value fails the whole context.
pub fn encode(ctx: &ValidatedPolicyContext) -> Result<EncodedContext, EncodeError> {
    let mut entries = Vec::with_capacity(4 + ctx.roles().len() + ctx.actions().len());

    entries.push((PRINCIPAL_KEY, value(PRINCIPAL_KEY, ctx.principal_id())?));
    for role in ctx.roles() {
        entries.push((ROLE_KEY, value(ROLE_KEY, role)?));
    }
    entries.push((SCOPE_KEY, value(SCOPE_KEY, ctx.scope())?));
    entries.push((KIND_KEY, value(KIND_KEY, ctx.resource_kind())?));
    for action in ctx.actions() {
        entries.push((ACTION_KEY, value(ACTION_KEY, action)?));
    }
    if !ctx.resource_id().is_empty() {
        entries.push((RESOURCE_ID_KEY, value(RESOURCE_ID_KEY, ctx.resource_id())?));
    }

    Ok(EncodedContext { entries })
}

/// Context as reconstructed on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContext {
    pub principal: Principal,
    pub scope: String,
    pub kind: String,
    pub resource_id: Option<String>,
    pub actions: BTreeSet<String>,
}

fn values<'a>(metadata: &'a MetadataMap, key: &'static str) -> Result<Vec<&'a str>, GateError> {
    let mut out = Vec::new();
    for v in metadata.get_all(key).iter() {
        let s = v.to_str().map_err(|_| GateError::MissingMetadata(key))?;
        if !s.is_empty() {
            out.push(s);
        }
    }
    Ok(out)
}

/// At most one distinct value; conflicting repeats are malformed.
fn single(metadata: &MetadataMap, key: &'static str) -> Result<Option<String>, GateError> {
    let found = values(metadata, key)?;
    match found.first() {
        Some(first) if found.iter().any(|v| v != first) => Err(GateError::MissingMetadata(key)),
        first => Ok(first.map(|s| s.to_string())),
    }
}

fn required_one(metadata: &MetadataMap, key: &'static str) -> Result<String, GateError> {
    single(metadata, key)?.ok_or(GateError::MissingMetadata(key))
}

fn required_many(metadata: &MetadataMap, key: &'static str) -> Result<Vec<String>, GateError> {
    let found = values(metadata, key)?;
    if found.is_empty() {
        return Err(GateError::MissingMetadata(key));
    }
    Ok(found.into_iter().map(str::to_string).collect())
}

/// Decode the policy keys. Fails on the first missing key in the order
/// principal, role, scope, kind, action. A value that is not visible ASCII,
/// or conflicting repeats of a single-valued key, count as missing. A
/// present but undecodable `resource-id` is rejected, never replaced by the
/// placeholder.
pub fn extract(metadata: &MetadataMap) -> Result<ExtractedContext, GateError> {
    let id = required_one(metadata, PRINCIPAL_KEY)?;

    let mut roles: Vec<String> = Vec::new();
    for role in required_many(metadata, ROLE_KEY)? {
        if !roles.contains(&role) {
            roles.push(role);
        }
    }

    let scope = required_one(metadata, SCOPE_KEY)?;
    let kind = required_one(metadata, KIND_KEY)?;
    let actions: BTreeSet<String> = required_many(metadata, ACTION_KEY)?.into_iter().collect();

    let resource_id = single(metadata, RESOURCE_ID_KEY)?;

    Ok(ExtractedContext {
        principal: Principal { id, roles },
        scope,
        kind,
        resource_id,
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PolicyContextBuilder;

    fn ctx() -> ValidatedPolicyContext {
        PolicyContextBuilder::new()
            .with_principal("u1")
            .with_roles(["admin", "auditor"])
            .with_resource_kind("invoice")
            .with_scope("tenant-a")
            .with_actions(["view", "edit"])
            .build()
            .unwrap()
    }

    fn encoded(ctx: &ValidatedPolicyContext) -> MetadataMap {
        let mut md = MetadataMap::new();
        encode(ctx).unwrap().apply(&mut md);
        md
    }

    #[test]
    fn encode_writes_repeated_keys() {
        let md = encoded(&ctx());
        assert_eq!(md.get_all(ROLE_KEY).iter().count(), 2);
        assert_eq!(md.get_all(ACTION_KEY).iter().count(), 2);
        assert_eq!(md.get(PRINCIPAL_KEY).unwrap(), "u1");
        assert!(md.get(RESOURCE_ID_KEY).is_none());
    }

    #[test]
    fn encode_includes_resource_id_when_set() {
        let ctx = PolicyContextBuilder::new()
            .with_principal("u1")
            .with_roles(["admin"])
            .with_resource_kind("invoice")
            .with_resource_id("inv-9")
            .with_scope("tenant-a")
            .with_action("view")
            .build()
            .unwrap();
        let md = encoded(&ctx);
        assert_eq!(md.get(RESOURCE_ID_KEY).unwrap(), "inv-9");
        assert_eq!(extract(&md).unwrap().resource_id.as_deref(), Some("inv-9"));
    }

    #[test]
    fn encode_rejects_non_ascii_value() {
        let ctx = PolicyContextBuilder::new()
            .with_principal("u1")
            .with_roles(["admin"])
            .with_resource_kind("invoice")
            .with_scope("tenant-a")
            .with_action("view\n")
            .build()
            .unwrap();
        assert_eq!(encode(&ctx).unwrap_err(), EncodeError { key: ACTION_KEY });
    }

    #[test]
    fn apply_replaces_stale_policy_keys() {
        let mut md = MetadataMap::new();
        md.insert(ROLE_KEY, MetadataValue::from_static("root"));
        md.insert("x-trace", MetadataValue::from_static("abc"));
        encode(&ctx()).unwrap().apply(&mut md);

        let roles: Vec<_> = md
            .get_all(ROLE_KEY)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(roles, vec!["admin", "auditor"]);
        assert_eq!(md.get("x-trace").unwrap(), "abc");
    }

    #[test]
    fn extract_round_trips() {
        let original = ctx();
        let extracted = extract(&encoded(&original)).unwrap();
        assert_eq!(extracted.principal.id, "u1");
        assert_eq!(extracted.principal.roles, original.roles());
        assert_eq!(extracted.scope, "tenant-a");
        assert_eq!(extracted.kind, "invoice");
        assert_eq!(&extracted.actions, original.actions());
        assert_eq!(extracted.resource_id, None);
    }

    #[test]
    fn extract_reports_each_missing_key() {
        for key in [PRINCIPAL_KEY, ROLE_KEY, SCOPE_KEY, KIND_KEY, ACTION_KEY] {
            let mut md = encoded(&ctx());
            md.remove(key);
            assert_eq!(extract(&md).unwrap_err(), GateError::MissingMetadata(key));
        }
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut md = encoded(&ctx());
        md.insert(SCOPE_KEY, MetadataValue::from_static(""));
        assert_eq!(
            extract(&md).unwrap_err(),
            GateError::MissingMetadata(SCOPE_KEY)
        );
    }

    fn with_opaque(md: MetadataMap, key: &'static str, raw: &'static [u8]) -> MetadataMap {
        let mut headers = md.into_headers();
        headers.insert(key, http::HeaderValue::from_bytes(raw).unwrap());
        MetadataMap::from_headers(headers)
    }

    #[test]
    fn undecodable_required_value_counts_as_missing() {
        let md = with_opaque(encoded(&ctx()), SCOPE_KEY, b"\xff");
        assert_eq!(
            extract(&md).unwrap_err(),
            GateError::MissingMetadata(SCOPE_KEY)
        );

        let mut headers = encoded(&ctx()).into_headers();
        headers.append(ROLE_KEY, http::HeaderValue::from_bytes(b"\xff").unwrap());
        assert_eq!(
            extract(&MetadataMap::from_headers(headers)).unwrap_err(),
            GateError::MissingMetadata(ROLE_KEY)
        );
    }

    #[test]
    fn undecodable_resource_id_is_rejected() {
        let ctx = PolicyContextBuilder::new()
            .with_principal("u1")
            .with_roles(["admin"])
            .with_resource_kind("invoice")
            .with_resource_id("inv-1")
            .with_scope("tenant-a")
            .with_action("view")
            .build()
            .unwrap();
        let md = with_opaque(encoded(&ctx), RESOURCE_ID_KEY, b"inv-\xff");
        assert_eq!(
            extract(&md).unwrap_err(),
            GateError::MissingMetadata(RESOURCE_ID_KEY)
        );
    }

    #[test]
    fn conflicting_single_valued_keys_are_rejected() {
        let mut md = encoded(&ctx());
        md.append(SCOPE_KEY, MetadataValue::from_static("tenant-b"));
        assert_eq!(
            extract(&md).unwrap_err(),
            GateError::MissingMetadata(SCOPE_KEY)
        );

        let mut md = encoded(&ctx());
        md.append(KIND_KEY, MetadataValue::from_static("payroll"));
        assert_eq!(
            extract(&md).unwrap_err(),
            GateError::MissingMetadata(KIND_KEY)
        );

        let mut md = encoded(&ctx());
        md.append(PRINCIPAL_KEY, MetadataValue::from_static("u1"));
        assert_eq!(extract(&md).unwrap().principal.id, "u1");
    }

    #[test]
    fn encode_rejects_surrounding_whitespace() {
        let ctx = PolicyContextBuilder::new()
            .with_principal("u1")
            .with_roles(["admin"])
            .with_resource_kind("invoice")
            .with_scope(" tenant-a")
            .with_action("view")
            .build()
            .unwrap();
        assert_eq!(encode(&ctx).unwrap_err(), EncodeError { key: SCOPE_KEY });

        let ctx = PolicyContextBuilder::new()
            .with_principal("u1")
            .with_roles(["admin"])
            .with_resource_kind("invoice")
            .with_scope("tenant a")
            .with_action("view")
            .build()
            .unwrap();
        assert!(encode(&ctx).is_ok());
    }

    #[test]
    fn duplicate_actions_collapse() {
        let mut md = encoded(&ctx());
        md.append(ACTION_KEY, MetadataValue::from_static("view"));
        assert_eq!(extract(&md).unwrap().actions.len(), 2);
    }

    #[test]
    fn empty_map_reports_principal_first() {
        assert_eq!(
            extract(&MetadataMap::new()).unwrap_err(),
            GateError::MissingMetadata(PRINCIPAL_KEY)
        );
    }
}
