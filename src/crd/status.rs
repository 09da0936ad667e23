//! # FailoverScheme Status
//!
//! Per-reporter status records. Each controller instance owns exactly one slot,
//! keyed by the namespace it runs in, so replicas never overwrite each other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of the FailoverScheme resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailoverSchemeStatus {
    /// Reporter namespace -> status record
    #[serde(default)]
    pub namespaced_statuses: BTreeMap<String, NamespacedStatus>,
}

/// Status record written by a single reporter
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedStatus {
    #[serde(default)]
    pub state: FailoverSchemeState,
    /// Human-readable detail, usually the validation or client error
    #[serde(default)]
    pub message: String,
    /// Scheme generation this record reflects
    #[serde(default)]
    pub observed_generation: i64,
    /// RFC3339 time the record was produced
    #[serde(default)]
    pub processing_time: Option<String>,
}

impl NamespacedStatus {
    /// PENDING means "re-process": dependency triggers write it at the current
    /// generation, so it has to bypass the generation check.
    pub fn is_dirty(&self) -> bool {
        self.state == FailoverSchemeState::Pending
    }

    /// Terminal states are only trusted together with a matching generation
    pub fn is_settled_at(&self, generation: i64) -> bool {
        self.observed_generation == generation
            && matches!(
                self.state,
                FailoverSchemeState::Accepted | FailoverSchemeState::Invalid
            )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailoverSchemeState {
    #[default]
    Unset,
    Pending,
    Accepted,
    Invalid,
    Failed,
}

impl FailoverSchemeState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverSchemeState::Unset => "UNSET",
            FailoverSchemeState::Pending => "PENDING",
            FailoverSchemeState::Accepted => "ACCEPTED",
            FailoverSchemeState::Invalid => "INVALID",
            FailoverSchemeState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for FailoverSchemeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
