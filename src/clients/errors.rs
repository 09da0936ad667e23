//! # Client Errors
//!
//! Error type shared by every resource client. Kubernetes API errors are
//! classified here so callers can branch on not-found and conflict without
//! inspecting status codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("cluster {0} is not registered")]
    ClusterNotRegistered(String),

    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        kind: &'static str,
        name: String,
        message: String,
    },

    #[error("{kind} {name} is temporarily unavailable: {message}")]
    Unavailable {
        kind: &'static str,
        name: String,
        message: String,
    },

    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Classify a `kube::Error` for the object identified by `kind`/`name`
    pub fn from_kube(error: kube::Error, kind: &'static str, name: impl Into<String>) -> Self {
        match error {
            kube::Error::Api(ref response) if response.code == 404 => Self::NotFound {
                kind,
                name: name.into(),
            },
            kube::Error::Api(ref response) if response.code == 409 => Self::Conflict {
                kind,
                name: name.into(),
                message: response.message.clone(),
            },
            other => Self::Kube(other),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
