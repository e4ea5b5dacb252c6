use thiserror::Error;
use tonic::{Code, Status};

use crate::context::Field;

/// Raised by [`crate::PolicyContextBuilder::build`] before any network interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("policy context is missing required field: {0}")]
    MissingField(Field),
}

/// Terminal outcomes of a gated call other than admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("missing policy metadata: {0}")]
    MissingMetadata(&'static str),

    #[error("policy service unavailable: {0}")]
    PolicyServiceUnavailable(String),

    #[error("access denied")]
    AccessDenied { denied: Vec<String> },
}

impl GateError {
    pub fn grpc_code(&self) -> Code {
        match self {
            Self::MissingMetadata(_) => Code::Unauthenticated,
            Self::PolicyServiceUnavailable(_) => Code::Unavailable,
            Self::AccessDenied { .. } => Code::PermissionDenied,
        }
    }
}

impl From<GateError> for Status {
    fn from(err: GateError) -> Self {
        // Denied actions stay in the logs; the caller only learns it was denied.
        Status::new(err.grpc_code(), err.to_string())
    }
}

/// Failures of a [`crate::PolicyDecisionPoint`] adapter.
#[derive(Debug, Error)]
pub enum PdpError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("policy service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode policy response: {0}")]
    Decode(String),

    #[error("policy service did not answer within {0} ms")]
    Timeout(u64),
}

impl From<reqwest::Error> for PdpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
