//! # FailoverScheme Status
//!
//! `StatusBuilder` is a fluent, pure state machine over one reporter's status
//! record; `StatusManager` reads that record and persists built schemes.

use crate::clients::{ClientError, FailoverSchemeClient};
use crate::crd::{FailoverScheme, FailoverSchemeState, NamespacedStatus, ObjectRef};
use std::fmt::Display;
use std::sync::Arc;

#[derive(Debug, Clone)]
#[must_use]
pub struct StatusBuilder {
    scheme: FailoverScheme,
    reporter: String,
    record: NamespacedStatus,
}

impl StatusBuilder {
    pub fn new(scheme: &FailoverScheme, reporter: impl Into<String>) -> Self {
        Self {
            scheme: scheme.clone(),
            reporter: reporter.into(),
            record: NamespacedStatus::default(),
        }
    }

    fn with_state(mut self, state: FailoverSchemeState, message: String) -> Self {
        self.record = NamespacedStatus {
            state,
            message,
            observed_generation: self.scheme.generation(),
            processing_time: Some(chrono::Utc::now().to_rfc3339()),
        };
        self
    }

    /// Dirty bit: forces re-processing without a generation change
    pub fn pending(self, message: impl Into<String>) -> Self {
        self.with_state(FailoverSchemeState::Pending, message.into())
    }

    pub fn accept(self) -> Self {
        self.with_state(FailoverSchemeState::Accepted, String::new())
    }

    pub fn fail(self, err: impl Display) -> Self {
        self.with_state(FailoverSchemeState::Failed, err.to_string())
    }

    pub fn invalidate(self, err: impl Display) -> Self {
        self.with_state(FailoverSchemeState::Invalid, err.to_string())
    }

    /// Use `record` verbatim
    pub fn set(mut self, record: NamespacedStatus) -> Self {
        self.record = record;
        self
    }

    #[must_use]
    pub fn state(&self) -> FailoverSchemeState {
        self.record.state
    }

    #[must_use]
    pub fn record(&self) -> &NamespacedStatus {
        &self.record
    }

    #[must_use]
    pub fn reporter(&self) -> &str {
        &self.reporter
    }

    /// The scheme with this reporter's slot replaced, ready for a status update
    #[must_use]
    pub fn build(self) -> FailoverScheme {
        let Self {
            mut scheme,
            reporter,
            record,
        } = self;
        scheme
            .status
            .get_or_insert_with(Default::default)
            .namespaced_statuses
            .insert(reporter, record);
        scheme
    }
}

pub struct StatusManager {
    schemes: Arc<dyn FailoverSchemeClient>,
    reporter: String,
}

impl std::fmt::Debug for StatusManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusManager")
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl StatusManager {
    pub fn new(schemes: Arc<dyn FailoverSchemeClient>, reporter: impl Into<String>) -> Self {
        Self {
            schemes,
            reporter: reporter.into(),
        }
    }

    /// Namespace this controller reports status under
    pub fn reporter(&self) -> &str {
        &self.reporter
    }

    pub fn new_status_builder(&self, scheme: &FailoverScheme) -> StatusBuilder {
        StatusBuilder::new(scheme, self.reporter.clone())
    }

    /// This reporter's record; `None` means the scheme was never reconciled here
    pub fn get_status<'a>(&self, scheme: &'a FailoverScheme) -> Option<&'a NamespacedStatus> {
        scheme
            .status
            .as_ref()
            .and_then(|status| status.namespaced_statuses.get(&self.reporter))
    }

    /// Latest stored copy of `scheme`
    pub async fn refresh(&self, scheme: &FailoverScheme) -> Result<FailoverScheme, ClientError> {
        self.schemes.get(&ObjectRef::from_resource(scheme)).await
    }

    pub async fn update_status(&self, builder: StatusBuilder) -> Result<FailoverScheme, ClientError> {
        let scheme = builder.build();
        self.schemes.update_status(&scheme, &self.reporter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::FailoverSchemeSpec;

    fn scheme(generation: i64) -> FailoverScheme {
        let mut scheme = FailoverScheme::new("scheme", FailoverSchemeSpec::default());
        scheme.metadata.namespace = Some("fed".to_string());
        scheme.metadata.generation = Some(generation);
        scheme
    }

    #[test]
    fn test_transitions_stamp_generation_and_time() {
        let record = StatusBuilder::new(&scheme(4), "gloo-system")
            .invalidate("Primary target cannot be nil")
            .record()
            .clone();
        assert_eq!(record.state, FailoverSchemeState::Invalid);
        assert_eq!(record.observed_generation, 4);
        assert_eq!(record.message, "Primary target cannot be nil");
        let stamped = record.processing_time.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamped).is_ok());
    }

    #[test]
    fn test_last_transition_wins() {
        let builder = StatusBuilder::new(&scheme(1), "r").fail("boom").accept();
        assert_eq!(builder.state(), FailoverSchemeState::Accepted);
        assert!(builder.record().message.is_empty());
    }

    #[test]
    fn test_set_keeps_record_verbatim() {
        let record = NamespacedStatus {
            state: FailoverSchemeState::Accepted,
            message: "seeded".to_string(),
            observed_generation: 9,
            processing_time: None,
        };
        let built = StatusBuilder::new(&scheme(2), "r").set(record.clone()).build();
        assert_eq!(built.status.unwrap().namespaced_statuses["r"], record);
    }

    #[test]
    fn test_build_preserves_other_reporters() {
        let other = StatusBuilder::new(&scheme(1), "other").accept().build();
        let built = StatusBuilder::new(&other, "mine").pending("dirty").build();
        let statuses = built.status.unwrap().namespaced_statuses;
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses["other"].state, FailoverSchemeState::Accepted);
        assert_eq!(statuses["mine"].state, FailoverSchemeState::Pending);
    }

    #[test]
    fn test_get_status_reads_own_slot_only() {
        use crate::clients::memory::InMemoryFailoverSchemeClient;

        let manager = StatusManager::new(Arc::new(InMemoryFailoverSchemeClient::new()), "mine");
        let foreign = StatusBuilder::new(&scheme(1), "other").accept().build();
        assert!(manager.get_status(&foreign).is_none());

        let own = manager.new_status_builder(&foreign).accept().build();
        assert_eq!(
            manager.get_status(&own).map(|s| s.state),
            Some(FailoverSchemeState::Accepted)
        );
    }
}
