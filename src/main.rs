//! # FailoverScheme Controller
//!
//! Watches FailoverSchemes across all namespaces and writes the compiled
//! failover configuration onto each scheme's primary Upstream. Changes to
//! Upstreams and GlooInstances mark the schemes depending on them PENDING so
//! they are compiled again.
//!
//! Endpoints on `METRICS_PORT`: `/metrics`, `/healthz`, `/readyz`.

use anyhow::Result;
use failover_controller::runtime::clusters::spawn_cluster_secret_watch;
use failover_controller::runtime::dependents::spawn_dependency_watches;
use failover_controller::runtime::initialization::initialize;
use failover_controller::runtime::watch_loop::run_watch_loop;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    let mut watches = spawn_dependency_watches(
        init.client.clone(),
        &init.clusters,
        Arc::clone(&init.dependents),
    );
    let config = init.controller_config.read().await.clone();
    if config.watch_cluster_secrets {
        watches.push(spawn_cluster_secret_watch(
            init.client.clone(),
            &config.controller_namespace,
            Arc::clone(&init.registry),
            Arc::clone(&init.dependents),
        ));
    }

    let result = run_watch_loop(
        init.schemes,
        init.context,
        init.server_state,
        init.controller_config,
    )
    .await;

    for watch in watches {
        watch.abort();
    }
    result
}
