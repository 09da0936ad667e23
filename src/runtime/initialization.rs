//! # Initialization
//!
//! Process bootstrap: rustls, tracing, metrics, the HTTP server, Kubernetes
//! clients for every member cluster and the failover engine wired on top of
//! them.

use crate::clients::kubernetes::{
    KubeFailoverSchemeClient, KubeGlooInstanceClient, KubeUpstreamClient,
};
use crate::clients::{
    ClusterRegistry, FailoverSchemeClient, GlooInstanceClient, MulticlusterUpstreamClientset,
};
use crate::config::{create_shared_config, ControllerConfig, SharedControllerConfig, SharedServerConfig};
use crate::controller::backoff::RequeueBackoffs;
use crate::controller::failover::{
    FailoverDependencyCalculator, FailoverDependentReconciler, FailoverProcessor,
    FailoverSchemeReconciler, StatusManager,
};
use crate::controller::server::{start_server, ServerState};
use crate::crd::FailoverScheme;
use crate::observability;
use crate::runtime::watch_loop::{ControllerContext, RequeuePolicy};
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the watch loop and dependency watches need
pub struct InitializationResult {
    /// Client for the cluster the controller runs in
    pub client: Client,
    pub schemes: Api<FailoverScheme>,
    pub context: Arc<ControllerContext>,
    pub dependents: Arc<FailoverDependentReconciler>,
    /// Member clusters by name; each gets an Upstream watch
    pub clusters: BTreeMap<String, Client>,
    pub registry: Arc<ClusterRegistry>,
    pub server_state: Arc<ServerState>,
    pub controller_config: SharedControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("clusters", &self.clusters.keys().collect::<Vec<_>>())
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let (controller_config, server_config) = create_shared_config();
    init_tracing(&controller_config.read().await.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting FailoverScheme controller"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());
    let server_port = server_config.read().await.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let config = controller_config.read().await.clone();
    let clusters = connect_clusters(&client, &config).await?;
    let registry = Arc::new(ClusterRegistry::new());
    for (name, cluster_client) in &clusters {
        registry.register(
            name.clone(),
            Arc::new(KubeUpstreamClient::new(cluster_client.clone(), name.clone())),
        );
    }
    info!(clusters = ?registry.cluster_names(), "Registered member clusters");

    let scheme_client: Arc<dyn FailoverSchemeClient> =
        Arc::new(KubeFailoverSchemeClient::new(client.clone()));
    let gloo_instances: Arc<dyn GlooInstanceClient> =
        Arc::new(KubeGlooInstanceClient::new(client.clone()));
    let upstreams: Arc<dyn MulticlusterUpstreamClientset> =
        Arc::clone(&registry) as Arc<dyn MulticlusterUpstreamClientset>;

    let status_manager = Arc::new(StatusManager::new(
        Arc::clone(&scheme_client),
        config.controller_namespace.clone(),
    ));
    let processor = Arc::new(FailoverProcessor::new(
        Arc::clone(&upstreams),
        Arc::clone(&gloo_instances),
        Arc::clone(&scheme_client),
        Arc::clone(&status_manager),
    ));
    let reconciler = Arc::new(FailoverSchemeReconciler::new(
        processor,
        Arc::clone(&status_manager),
        upstreams,
    ));
    let dependents = Arc::new(FailoverDependentReconciler::new(
        FailoverDependencyCalculator::new(Arc::clone(&scheme_client), gloo_instances),
        Arc::clone(&status_manager),
    ));

    let context = Arc::new(ControllerContext {
        client: client.clone(),
        reconciler,
        requeue: RequeuePolicy::new(
            status_manager,
            RequeueBackoffs::new(
                config.failed_requeue_min_minutes,
                config.failed_requeue_max_minutes,
            ),
        ),
    });

    let schemes: Api<FailoverScheme> = Api::all(client.clone());
    log_existing_schemes(&schemes).await?;

    info!(
        reporter = config.controller_namespace.as_str(),
        "Controller initialized, starting watch loop..."
    );

    Ok(InitializationResult {
        client,
        schemes,
        context,
        dependents,
        clusters,
        registry,
        server_state,
        controller_config,
    })
}

fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "failover_controller=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if log_format.eq_ignore_ascii_case("text") {
        builder.try_init()
    } else {
        builder.json().try_init()
    };
    if let Err(e) = result {
        warn!("Tracing subscriber already initialized: {}", e);
    }
}

/// Clients for every member cluster.
///
/// With `REMOTE_KUBECONFIG` and `REMOTE_CLUSTER_CONTEXTS` set, each context
/// becomes a cluster of the same name; otherwise the local cluster is the
/// only member, registered under `LOCAL_CLUSTER_NAME`.
async fn connect_clusters(
    local: &Client,
    config: &ControllerConfig,
) -> Result<BTreeMap<String, Client>> {
    let mut clusters = BTreeMap::new();
    let Some(path) = config
        .remote_kubeconfig
        .as_deref()
        .filter(|_| config.has_remote_clusters())
    else {
        clusters.insert(config.local_cluster_name.clone(), local.clone());
        return Ok(clusters);
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Failed to read remote kubeconfig {path}"))?;
    for context in &config.remote_cluster_contexts {
        let options = KubeConfigOptions {
            context: Some(context.clone()),
            ..Default::default()
        };
        let cluster_config = kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &options)
            .await
            .with_context(|| format!("Failed to load kubeconfig context {context}"))?;
        let client = Client::try_from(cluster_config)
            .with_context(|| format!("Failed to create client for cluster {context}"))?;
        clusters.insert(context.clone(), client);
    }
    Ok(clusters)
}

async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &SharedServerConfig,
) -> Result<()> {
    let (startup_timeout, poll_interval) = {
        let config = server_config.read().await;
        (
            std::time::Duration::from_secs(config.startup_timeout_secs),
            std::time::Duration::from_millis(config.poll_interval_ms),
        )
    };
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Check the CRD is served and log what the controller starts with
async fn log_existing_schemes(schemes: &Api<FailoverScheme>) -> Result<()> {
    let list = schemes
        .list(&ListParams::default())
        .await
        .context("FailoverScheme CRD is not queryable, is it installed?")?;

    let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for scheme in &list.items {
        by_namespace
            .entry(scheme.metadata.namespace.clone().unwrap_or_default())
            .or_default()
            .push(scheme.metadata.name.clone().unwrap_or_default());
    }
    info!(total = list.items.len(), "Found existing FailoverSchemes");
    for (namespace, names) in &by_namespace {
        info!(namespace = namespace.as_str(), schemes = ?names, "Existing FailoverSchemes");
    }
    Ok(())
}
