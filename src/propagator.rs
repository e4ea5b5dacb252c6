//! Client-side propagation of a validated policy context.
//!
//! ```ignore
//! let ctx = PolicyContextBuilder::new()
//!     .with_principal("u1")
//!     .with_roles(["admin"])
//!     .with_resource_kind("invoice")
//!     .with_scope("tenant-a")
//!     .with_actions(["view"])
//!     .build()?;
//!
//! let channel = Channel::from_static("http://[::1]:50051").connect().await?;
//! let client = InvoiceClient::with_interceptor(channel, ContextPropagator::wrap(ctx));
//! ```

use std::sync::Arc;

use tonic::service::Interceptor;
use tonic::{Request, Status};

use crate::context::ValidatedPolicyContext;
use crate::wire::{self, EncodeError, EncodedContext};

pub struct ContextPropagator;

impl ContextPropagator {
    /// Build the interceptor that stamps `ctx` on every outgoing call.
    pub fn wrap(ctx: ValidatedPolicyContext) -> PropagatingInterceptor {
        let encoded = wire::encode(&ctx);
        PropagatingInterceptor {
            inner: Arc::new(Inner { ctx, encoded }),
        }
    }
}

struct Inner {
    ctx: ValidatedPolicyContext,
    encoded: Result<EncodedContext, EncodeError>,
}

/// Pure encoding: no caching of decisions, no retries.
#[derive(Clone)]
pub struct PropagatingInterceptor {
    inner: Arc<Inner>,
}

impl PropagatingInterceptor {
    pub fn context(&self) -> &ValidatedPolicyContext {
        &self.inner.ctx
    }
}

impl Interceptor for PropagatingInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let encoded = match &self.inner.encoded {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(
                    principal = %self.inner.ctx.principal_id(),
                    key = err.key,
                    "Aborting call: policy context cannot be propagated"
                );
                return Err(Status::invalid_argument(err.to_string()));
            }
        };

        encoded.apply(request.metadata_mut());

        let ctx = &self.inner.ctx;
        tracing::debug!(
            principal = %ctx.principal_id(),
            roles = ?ctx.roles(),
            kind = %ctx.resource_kind(),
            scope = %ctx.scope(),
            actions = ?ctx.actions(),
            "Attached policy context to outgoing call"
        );
        Ok(request)
    }
}
