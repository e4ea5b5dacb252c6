//! Policy Gate - ABAC enforcement for gRPC calls
//!
//! A caller builds a [`ValidatedPolicyContext`] (who, on what, in which
//! scope, doing what) and attaches it to outgoing calls with
//! [`ContextPropagator`]. On the receiving side [`EnforcementGate`] decodes
//! the context, asks a Policy Decision Point, and only invokes the handler
//! when every requested action is allowed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Caller: PolicyContextBuilder ─► ValidatedPolicyContext         │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │               ContextPropagator (tonic Interceptor)             │
//! │        principal, role*, scope, kind, action*, resource-id      │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │  gRPC metadata
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            EnforcementGate (enforce / tower Layer)              │
//! │              extract ─► query ─► combine (AND)                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                │                                   │ ALLOW only
//!                ▼                                   ▼
//! ┌───────────────────────────────┐   ┌─────────────────────────────┐
//! │ PolicyDecisionPoint (Arc<dyn>)│   │          handler            │
//! │ HttpPdpClient | InMemoryPdp   │   └─────────────────────────────┘
//! └───────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use policy_gate::{ContextPropagator, EnforcementGate, GateConfig, HttpPdpClient, PolicyContextBuilder};
//!
//! // Client
//! let ctx = PolicyContextBuilder::new()
//!     .with_principal("u1")
//!     .with_roles(["admin"])
//!     .with_resource_kind("invoice")
//!     .with_scope("tenant-a")
//!     .with_actions(["view", "edit"])
//!     .build()?;
//! let client = InvoiceClient::with_interceptor(channel, ContextPropagator::wrap(ctx));
//!
//! // Server
//! let config = GateConfig::from_env()?;
//! let pdp = Arc::new(HttpPdpClient::from_config(&config.pdp)?);
//! let gate = EnforcementGate::with_config(pdp, &config);
//! Server::builder().layer(gate.layer()).add_service(svc).serve(addr).await?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod pdp;
pub mod propagator;
pub mod wire;

// Re-export main types
pub use config::{GateConfig, PdpConfig};
pub use context::{Field, PolicyContext, PolicyContextBuilder, ValidatedPolicyContext};
pub use error::{ConfigError, GateError, PdpError, ValidationError};
pub use gate::{combine, Admission, CallState, Decision, EnforcementGate, EnforcementLayer};
pub use pdp::{
    CheckResourcesResult, Effect, HttpPdpClient, InMemoryPdp, PolicyDecisionPoint, Principal,
    Resource, ResourceBatch, ResourceCheck, ResourceEffects,
};
pub use propagator::{ContextPropagator, PropagatingInterceptor};
