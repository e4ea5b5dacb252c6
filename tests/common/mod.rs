//! Shared helpers for integration tests
#![allow(dead_code)]

use policy_gate::{ContextPropagator, PolicyContextBuilder};
use tonic::service::Interceptor;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "policy_gate=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// The `u1 / admin / invoice / tenant-a / [view, edit]` context.
pub fn invoice_context() -> PolicyContextBuilder {
    PolicyContextBuilder::new()
        .with_principal("u1")
        .with_roles(["admin"])
        .with_resource_kind("invoice")
        .with_scope("tenant-a")
        .with_actions(["view", "edit"])
}

/// Run the client interceptor and return the headers it would send.
pub fn propagated_headers(builder: PolicyContextBuilder) -> http::HeaderMap {
    let ctx = builder.build().expect("complete context");
    let mut interceptor = ContextPropagator::wrap(ctx);
    let request = interceptor
        .call(tonic::Request::new(()))
        .expect("propagation succeeds");
    request.metadata().clone().into_headers()
}
