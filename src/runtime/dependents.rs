//! # Dependency Watches
//!
//! Watches GlooInstances on the local cluster and Upstreams on every
//! registered cluster, and hands changes to the dependent reconciler so the
//! affected FailoverSchemes are marked PENDING.
//!
//! Objects from the first list are only recorded; FailoverSchemes are
//! reconciled on startup anyway. Every later list (the watcher re-lists after
//! a 410 or a reconnect) is compared against what was recorded: new objects
//! and moved generations trigger, and objects missing from the re-list
//! trigger as deleted. An `Apply` only counts when the object's generation
//! moved, so status-only updates are ignored.

use crate::controller::failover::{DependencyTrigger, FailoverDependentReconciler};
use crate::crd::{ClusterObjectRef, GlooInstance, ObjectRef, Upstream};
use futures::{pin_mut, StreamExt};
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use kube_runtime::watcher::{self, watcher};
use kube_runtime::WatchStreamExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Last seen generation per object, used to drop status-only updates
#[derive(Debug, Default)]
pub struct GenerationTracker {
    seen: HashMap<String, (Option<i64>, DependencyTrigger)>,
    /// Keys returned by the list in progress
    listed: Option<HashSet<String>>,
    synced: bool,
}

impl GenerationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A (re-)list starts
    pub fn begin_list(&mut self) {
        self.listed = Some(HashSet::new());
    }

    /// Record an object returned by a list; `true` when it should trigger.
    ///
    /// Nothing triggers during the first list.
    pub fn observe_listed(
        &mut self,
        key: String,
        generation: Option<i64>,
        trigger: DependencyTrigger,
    ) -> bool {
        self.listed
            .get_or_insert_with(HashSet::new)
            .insert(key.clone());
        if !self.synced {
            self.seen.insert(key, (generation, trigger));
            return false;
        }
        self.observe_apply(key, generation, trigger)
    }

    /// The list is complete; returns triggers for tracked objects it did not return
    pub fn finish_list(&mut self) -> Vec<DependencyTrigger> {
        let listed = self.listed.take().unwrap_or_default();
        self.synced = true;
        let mut gone = Vec::new();
        self.seen.retain(|key, (_, trigger)| {
            let kept = listed.contains(key);
            if !kept {
                gone.push(trigger.clone());
            }
            kept
        });
        gone
    }

    /// Record an applied object; `true` when it is new or its generation changed.
    ///
    /// Objects without a generation always count as changed.
    pub fn observe_apply(
        &mut self,
        key: String,
        generation: Option<i64>,
        trigger: DependencyTrigger,
    ) -> bool {
        let previous = self.seen.insert(key, (generation, trigger)).map(|(g, _)| g);
        generation.is_none() || previous != Some(generation)
    }

    pub fn forget(&mut self, key: &str) {
        self.seen.remove(key);
    }
}

fn object_key<K: Resource>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default()
    )
}

/// Which trigger a watched object produces
trait TriggerSource: Resource + Clone + std::fmt::Debug + Send + Sync + 'static {
    fn trigger(&self, cluster: &str) -> DependencyTrigger;
}

impl TriggerSource for GlooInstance {
    fn trigger(&self, _cluster: &str) -> DependencyTrigger {
        DependencyTrigger::GlooInstance(ObjectRef::from_resource(self))
    }
}

impl TriggerSource for Upstream {
    fn trigger(&self, cluster: &str) -> DependencyTrigger {
        DependencyTrigger::Upstream(ClusterObjectRef::new(
            cluster,
            self.namespace().unwrap_or_default(),
            self.name_any(),
        ))
    }
}

/// Spawn the GlooInstance watch on `local` and one Upstream watch per cluster
pub fn spawn_dependency_watches(
    local: Client,
    clusters: &BTreeMap<String, Client>,
    reconciler: Arc<FailoverDependentReconciler>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(clusters.len() + 1);
    handles.push(tokio::spawn(watch_dependency::<GlooInstance>(
        Api::all(local),
        String::new(),
        Arc::clone(&reconciler),
    )));
    for (cluster, client) in clusters {
        handles.push(spawn_upstream_watch(
            cluster,
            client.clone(),
            Arc::clone(&reconciler),
        ));
    }
    handles
}

/// Watch the Upstreams of one member cluster
pub fn spawn_upstream_watch(
    cluster: &str,
    client: Client,
    reconciler: Arc<FailoverDependentReconciler>,
) -> JoinHandle<()> {
    info!(cluster, "Watching Upstreams");
    tokio::spawn(watch_dependency::<Upstream>(
        Api::all(client),
        cluster.to_string(),
        reconciler,
    ))
}

async fn watch_dependency<K>(
    api: Api<K>,
    cluster: String,
    reconciler: Arc<FailoverDependentReconciler>,
) where
    K: TriggerSource + serde::de::DeserializeOwned,
    K::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let mut tracker = GenerationTracker::new();
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    pin_mut!(stream);

    while let Some(event) = stream.next().await {
        let triggers = match event {
            Ok(watcher::Event::Init) => {
                tracker.begin_list();
                continue;
            }
            Ok(watcher::Event::InitApply(obj)) => {
                let trigger = obj.trigger(&cluster);
                if !tracker.observe_listed(object_key(&obj), obj.meta().generation, trigger.clone())
                {
                    continue;
                }
                vec![trigger]
            }
            Ok(watcher::Event::InitDone) => {
                let gone = tracker.finish_list();
                if !gone.is_empty() {
                    info!(
                        kind = kind.as_str(),
                        cluster = cluster.as_str(),
                        count = gone.len(),
                        "Objects removed while the watch was re-listing"
                    );
                }
                gone
            }
            Ok(watcher::Event::Apply(obj)) => {
                let trigger = obj.trigger(&cluster);
                if !tracker.observe_apply(object_key(&obj), obj.meta().generation, trigger.clone()) {
                    continue;
                }
                vec![trigger]
            }
            Ok(watcher::Event::Delete(obj)) => {
                tracker.forget(&object_key(&obj));
                vec![obj.trigger(&cluster)]
            }
            Err(e) => {
                warn!(kind = kind.as_str(), cluster = cluster.as_str(), "Dependency watch error: {}", e);
                continue;
            }
        };

        for trigger in &triggers {
            match reconciler.reconcile(trigger).await {
                Ok(report) => debug!(
                    trigger = %trigger,
                    marked = report.marked.len(),
                    failed = report.failed.len(),
                    "Processed dependency change"
                ),
                Err(e) => error!(trigger = %trigger, "Failed to compute dependent FailoverSchemes: {}", e),
            }
        }
    }

    warn!(kind = kind.as_str(), cluster = cluster.as_str(), "Dependency watch stream ended");
}
