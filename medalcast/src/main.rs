// ABOUTME: Unified binary that runs either the registry or a replica, chosen by MEDALCAST_ROLE
// ABOUTME: Loads .env, sets up tracing and the runtime, and shuts down gracefully on SIGINT/SIGTERM

use axum::Router;
use dotenv::dotenv;
use medalcast_core::client::{http_client, HttpBackend, HttpDiscovery, HttpPeerConnector, HttpPushSink};
use medalcast_core::instance::{InstanceDescriptor, BACKEND_SERVICE, REPLICA_SERVICE};
use medalcast_core::traits::{Backend, Discovery};
use medalcast_core::{RegistryConfig, ReplicaConfig};
use medalcast_registry::{LoadBalancer, ServiceRegistry};
use medalcast_replica::{spawn_heartbeat, Collaborators, ReplicaNode};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

enum Role {
    Registry,
    Replica,
}

impl Role {
    fn from_env() -> Result<Self, String> {
        match env::var("MEDALCAST_ROLE").as_deref() {
            Ok("registry") => Ok(Self::Registry),
            Ok("replica") => Ok(Self::Replica),
            Ok(other) => Err(format!(
                "MEDALCAST_ROLE must be registry or replica, got {other:?}"
            )),
            Err(_) => Err("MEDALCAST_ROLE must be set (registry or replica)".to_string()),
        }
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

fn init_tracing() {
    // JSON in production for log aggregation
    let is_production = env::var("NODE_ENV").unwrap_or_default() == "production";
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if is_production {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn main() -> Result<(), BoxError> {
    dotenv().ok();

    let worker_threads = env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| num_cpus::get().max(2));

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?
        .block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> Result<(), BoxError> {
    init_tracing();

    let role = match Role::from_env() {
        Ok(role) => role,
        Err(e) => {
            eprintln!("\nConfiguration error:\n{e}\n");
            std::process::exit(1);
        }
    };

    match role {
        Role::Registry => run_registry(RegistryConfig::from_env()?, worker_threads).await,
        Role::Replica => run_replica(ReplicaConfig::from_env()?, worker_threads).await,
    }
}

/// Binds `addr` and serves `app` until `cancel` fires.
async fn serve(
    addr: SocketAddr,
    app: Router,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<std::io::Result<()>>, BoxError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    Ok(tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
    }))
}

async fn drain_server(server: tokio::task::JoinHandle<std::io::Result<()>>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => tracing::info!("HTTP server stopped"),
        Ok(Ok(Err(e))) => tracing::warn!("HTTP server error: {}", e),
        Ok(Err(e)) => tracing::warn!("HTTP server task error: {:?}", e),
        Err(_) => tracing::warn!(
            "HTTP server shutdown timed out after {}s",
            SHUTDOWN_GRACE.as_secs()
        ),
    }
}

async fn run_registry(config: RegistryConfig, worker_threads: usize) -> Result<(), BoxError> {
    tracing::info!(
        bind = %config.bind_addr,
        balance_interval_ms = config.balance_interval.as_millis() as u64,
        hold_time_ms = config.hold_time.as_millis() as u64,
        worker_threads,
        "Starting medalcast registry"
    );

    let connector = Arc::new(HttpPeerConnector::new(http_client()?));
    let registry = Arc::new(ServiceRegistry::new(connector));
    let cancel = CancellationToken::new();

    let balancer = LoadBalancer::new(registry.clone(), config.balance_interval, config.hold_time)
        .spawn(cancel.clone());
    let server = serve(
        config.bind_addr,
        medalcast_registry::routes(registry.clone()),
        cancel.clone(),
    )
    .await?;

    wait_for_shutdown_signal().await;
    cancel.cancel();

    if let Err(e) = balancer.await {
        tracing::warn!("Load balancer task error: {:?}", e);
    }
    drain_server(server).await;
    registry.wait_for_refreshes().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

async fn run_replica(config: ReplicaConfig, worker_threads: usize) -> Result<(), BoxError> {
    let identity = InstanceDescriptor::new(
        REPLICA_SERVICE,
        std::process::id(),
        config.advertise_addr.clone(),
        config.bind_addr.port(),
    );
    tracing::info!(
        instance = %identity,
        mode = %config.mode,
        registry = %config.registry_url,
        worker_threads,
        "Starting medalcast replica"
    );

    let http = http_client()?;
    let discovery: Arc<dyn Discovery> =
        Arc::new(HttpDiscovery::new(http.clone(), config.registry_url.clone()));

    let backend: Arc<dyn Backend> = match &config.backend_url {
        Some(url) => Arc::new(HttpBackend::new(http.clone(), url.clone())),
        None => {
            let registry = discovery.as_ref();
            let instance = config
                .retry
                .run("resolve backend", move || registry.resolve(BACKEND_SERVICE))
                .await?;
            tracing::info!(backend = %instance, "Resolved backend through registry");
            Arc::new(HttpBackend::for_instance(http.clone(), &instance))
        }
    };

    let node = Arc::new(
        ReplicaNode::new(
            identity,
            config.mode,
            Collaborators {
                discovery: discovery.clone(),
                backend,
                connector: Arc::new(HttpPeerConnector::new(http.clone())),
                push_sink: Arc::new(HttpPushSink::new(http, config.client_push_port)),
            },
        )
        .with_retry(config.retry),
    );

    let cancel = CancellationToken::new();
    let server = serve(
        config.bind_addr,
        medalcast_replica::routes(node.clone()),
        cancel.clone(),
    )
    .await?;

    node.register().await?;
    let heartbeat = spawn_heartbeat(
        discovery,
        node.name(),
        config.heartbeat_interval,
        cancel.clone(),
    );

    wait_for_shutdown_signal().await;
    cancel.cancel();

    if let Err(e) = heartbeat.await {
        tracing::warn!("Heartbeat task error: {:?}", e);
    }
    drain_server(server).await;
    if tokio::time::timeout(SHUTDOWN_GRACE, node.drain_pushes())
        .await
        .is_err()
    {
        tracing::warn!("Pending pushes did not finish before shutdown");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}
