//! `tower` wiring of [`EnforcementGate`] for `tonic::transport::Server`.
//!
//! ```ignore
//! let gate = EnforcementGate::with_config(Arc::new(HttpPdpClient::from_config(&cfg.pdp)?), &cfg);
//! Server::builder()
//!     .layer(gate.layer())
//!     .add_service(InvoiceServer::new(svc))
//!     .serve(addr)
//!     .await?;
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tonic::body::BoxBody;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tower::{Layer, Service};

use super::EnforcementGate;

#[derive(Debug, Clone)]
pub struct EnforcementLayer {
    gate: Arc<EnforcementGate>,
}

impl EnforcementLayer {
    pub fn new(gate: EnforcementGate) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }
}

impl<S> Layer<S> for EnforcementLayer {
    type Service = EnforcementService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EnforcementService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

/// Service wrapper for [`EnforcementLayer`].
///
/// Rejected calls are answered with a gRPC status response; the inner
/// service is never called for them.
#[derive(Debug, Clone)]
pub struct EnforcementService<S> {
    inner: S,
    gate: Arc<EnforcementGate>,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for EnforcementService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = self.gate.clone();

        Box::pin(async move {
            let metadata = MetadataMap::from_headers(req.headers().clone());
            match gate.authorize(&metadata).await {
                Ok(admission) => {
                    req.extensions_mut().insert(admission.principal);
                    inner.call(req).await
                }
                Err(err) => {
                    tracing::debug!(path = %req.uri().path(), error = %err, "Short-circuiting call");
                    Ok(Status::from(err).into_http())
                }
            }
        })
    }
}
