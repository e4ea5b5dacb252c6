//! Property: what the propagator sends is what the gate reconstructs.

mod common;

use policy_gate::wire::extract;
use policy_gate::{Field, PolicyContextBuilder, ValidationError};
use proptest::prelude::*;
use tonic::metadata::MetadataMap;

use common::propagated_headers;

// -- Strategy helpers --

fn arb_token() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9:_.-]{0,15}"
}

fn arb_builder() -> impl Strategy<Value = PolicyContextBuilder> {
    (
        arb_token(),
        prop::collection::vec(arb_token(), 1..4),
        arb_token(),
        prop::option::of(arb_token()),
        arb_token(),
        prop::collection::vec(arb_token(), 1..6),
    )
        .prop_map(|(principal, roles, kind, id, scope, actions)| {
            let builder = PolicyContextBuilder::new()
                .with_principal(principal)
                .with_roles(roles)
                .with_resource_kind(kind)
                .with_scope(scope)
                .with_actions(actions);
            match id {
                Some(id) => builder.with_resource_id(id),
                None => builder,
            }
        })
}

proptest! {
    #[test]
    fn propagated_context_round_trips(builder in arb_builder()) {
        let ctx = builder.clone().build().unwrap();
        let metadata = MetadataMap::from_headers(propagated_headers(builder));
        let extracted = extract(&metadata).unwrap();

        prop_assert_eq!(extracted.principal.id.as_str(), ctx.principal_id());
        prop_assert_eq!(extracted.principal.roles.as_slice(), ctx.roles());
        prop_assert_eq!(extracted.kind.as_str(), ctx.resource_kind());
        prop_assert_eq!(extracted.scope.as_str(), ctx.scope());
        prop_assert_eq!(&extracted.actions, ctx.actions());
        let expected_id = (!ctx.resource_id().is_empty()).then(|| ctx.resource_id().to_string());
        prop_assert_eq!(extracted.resource_id, expected_id);
    }

    /// Blanking any subset of required attributes reports the first one
    /// missing in check order.
    #[test]
    fn first_missing_field_is_reported(
        principal in arb_token(),
        roles in prop::collection::vec(arb_token(), 1..4),
        kind in arb_token(),
        scope in arb_token(),
        actions in prop::collection::vec(arb_token(), 1..6),
        drop_mask in 1u8..32,
    ) {
        let dropped = |field: Field| {
            let bit = Field::CHECK_ORDER.iter().position(|f| *f == field).unwrap();
            drop_mask & (1 << bit) != 0
        };

        let mut builder = PolicyContextBuilder::new();
        if !dropped(Field::Roles) {
            builder = builder.with_roles(roles);
        }
        if !dropped(Field::ResourceKind) {
            builder = builder.with_resource_kind(kind);
        }
        if !dropped(Field::Scope) {
            builder = builder.with_scope(scope);
        }
        if !dropped(Field::Actions) {
            builder = builder.with_actions(actions);
        }
        if !dropped(Field::Principal) {
            builder = builder.with_principal(principal);
        }

        let expected = Field::CHECK_ORDER
            .into_iter()
            .find(|f| dropped(*f))
            .unwrap();
        prop_assert_eq!(builder.build().unwrap_err(), ValidationError::MissingField(expected));
    }
}
