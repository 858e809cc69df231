// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::{routing::get, Router};
use clap::Parser;
use extdns::{
    config::{ClientConnection, ControllerManagerConfiguration},
    constants::{
        EXIT_CODE_CRD_CHANGED, EXIT_CODE_STARTUP_FAILURE, HEALTH_SERVER_PATH, KIND_DNS_ANNOTATION,
        KIND_DNS_ENTRY, KIND_DNS_PROVIDER, METRICS_SERVER_PATH, TOKIO_WORKER_THREADS,
    },
    context::{AnnotationOverlay, Context, CoreContext, Stores},
    crd::{DNSAnnotation, DNSEntry, DNSProvider},
    events::EventPublisher,
    lookup::LookupProcessor,
    metrics,
    provider::HandlerRegistry,
    reconcilers::{
        entry::AnnotationTrigger, reconcile_annotation, reconcile_entry, reconcile_provider,
    },
    resolver::SystemResolver,
};
use futures::{FutureExt, StreamExt};
use kube::{
    api::ListParams,
    runtime::{controller::Action, reflector, watcher, watcher::Config as WatcherConfig, Controller},
    Api, Client, ResourceExt,
};
use kube_lease_manager::LeaseManagerBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// External DNS controller for Kubernetes.
#[derive(Parser, Debug)]
#[command(name = "extdns", version, about)]
struct Cli {
    /// Path to the controller-manager configuration document
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the kubeconfig of the primary cluster
    #[arg(long)]
    kubeconfig: Option<String>,

    /// Override the controller class
    #[arg(long)]
    class: Option<String>,
}

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("extdns-controller")
        .enable_all()
        .build()?;

    if let Err(e) = runtime.block_on(async_main()) {
        error!("unrecoverable startup error: {e:#}");
        std::process::exit(EXIT_CODE_STARTUP_FAILURE);
    }
    Ok(())
}

/// Initialize logging with custom format
///
/// Respects `RUST_LOG` environment variable if set, otherwise defaults to INFO level.
/// Respects `RUST_LOG_FORMAT` environment variable for output format (json or text).
fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting external DNS controller");
}

/// Build a client from one client-connection configuration.
async fn build_client(connection: &ClientConnection) -> Result<Client> {
    let config = match connection.kubeconfig.as_deref() {
        Some(extdns::config::IN_CLUSTER) => kube::Config::incluster()?,
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)
                .with_context(|| format!("reading kubeconfig {path}"))?;
            kube::Config::from_custom_kubeconfig(
                kubeconfig,
                &kube::config::KubeConfigOptions::default(),
            )
            .await?
        }
        None => kube::Config::infer().await?,
    };
    Ok(Client::try_from(config)?)
}

/// Start the reflectors for the three CRD types and build the stores.
fn start_reflectors(client: &Client, control_plane: &Client) -> Stores {
    let providers_api = Api::<DNSProvider>::all(control_plane.clone());
    let entries_api = Api::<DNSEntry>::all(client.clone());
    let annotations_api = Api::<DNSAnnotation>::all(control_plane.clone());

    let (providers_store, providers_writer) = reflector::store();
    let (entries_store, entries_writer) = reflector::store();
    let (annotations_store, annotations_writer) = reflector::store();

    tokio::spawn(async move {
        let stream = watcher(providers_api, WatcherConfig::default());
        reflector(providers_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("DNSProvider reflector stream ended");
    });
    tokio::spawn(async move {
        let stream = watcher(entries_api, WatcherConfig::default());
        reflector(entries_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("DNSEntry reflector stream ended");
    });
    tokio::spawn(async move {
        let stream = watcher(annotations_api, WatcherConfig::default());
        reflector(annotations_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("DNSAnnotation reflector stream ended");
    });

    Stores {
        providers: providers_store,
        entries: entries_store,
        annotations: annotations_store,
    }
}

/// Start the Prometheus metrics HTTP server.
fn start_metrics_server(bind_address: String, port: u16) -> tokio::task::JoinHandle<()> {
    info!(
        bind_address = %bind_address,
        port = port,
        path = METRICS_SERVER_PATH,
        "Starting Prometheus metrics HTTP server"
    );

    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to gather metrics: {e}");
                    String::from("# Error gathering metrics\n")
                }
            }
        }

        let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
        let bind_addr = format!("{bind_address}:{port}");
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics server to {bind_addr}: {e}");
                return;
            }
        };
        info!("Metrics server listening on http://{bind_addr}{METRICS_SERVER_PATH}");
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {e}");
        }
    })
}

/// Start the health-probe HTTP server.
fn start_health_server(bind_address: String, port: u16) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = Router::new().route(HEALTH_SERVER_PATH, get(|| async { "ok" }));
        let bind_addr = format!("{bind_address}:{port}");
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind health server to {bind_addr}: {e}");
                return;
            }
        };
        info!("Health server listening on http://{bind_addr}{HEALTH_SERVER_PATH}");
        if let Err(e) = axum::serve(listener, app).await {
            error!("Health server error: {e}");
        }
    })
}

/// Watch CRD availability; a change after startup requests a restart.
///
/// A restart clears all informer caches, which is the simplest correct
/// reaction to CRDs appearing or disappearing at runtime.
fn start_crd_watch(client: Client) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let initially_available = crds_available(&client).await;
        info!(available = initially_available, "CRD availability checked");
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let available = crds_available(&client).await;
            if available != initially_available {
                warn!(
                    was = initially_available,
                    now = available,
                    "CRD availability changed, restarting to reinitialize informers"
                );
                std::process::exit(EXIT_CODE_CRD_CHANGED);
            }
        }
    })
}

async fn crds_available(client: &Client) -> bool {
    let api = Api::<DNSEntry>::all(client.clone());
    match api.list(&ListParams::default().limit(1)).await {
        Ok(_) => true,
        Err(kube::Error::Api(e)) if e.code == 404 => false,
        Err(e) => {
            debug!(error = %e, "CRD availability probe failed, assuming unchanged");
            true
        }
    }
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ControllerManagerConfiguration::load(path).await?,
        None => ControllerManagerConfiguration::default(),
    };
    if let Some(kubeconfig) = cli.kubeconfig {
        config.client_connection.kubeconfig = Some(kubeconfig);
    }
    if let Some(class) = cli.class {
        config.class = Some(class);
    }
    let config = Arc::new(config);

    initialize_logging();

    let client = build_client(&config.client_connection).await?;
    let control_plane_client = match &config.control_plane_client_connection {
        Some(connection) => build_client(connection).await?,
        None => client.clone(),
    };

    let stores = start_reflectors(&client, &control_plane_client);

    let resolver = Arc::new(SystemResolver::from_system_conf().map_err(|e| anyhow::anyhow!(e))?);
    let authoritative = Arc::new(
        extdns::account::authoritative::NameserverResolver::from_system_conf()
            .map_err(|e| anyhow::anyhow!(e))?,
    );
    let accounts = Arc::new(extdns::account::AccountMap::new(
        HandlerRegistry::builtin(),
        authoritative,
    ));
    let lookups = Arc::new(LookupProcessor::new(
        resolver.clone(),
        Arc::new(AnnotationTrigger {
            client: client.clone(),
        }),
        config.controllers.dns_entry.max_concurrent_lookups,
    ));
    tokio::spawn(lookups.clone().run());

    let core = CoreContext::new(
        accounts,
        HandlerRegistry::builtin(),
        resolver,
        lookups,
        config.clone(),
    );
    let context = Arc::new(Context {
        client: client.clone(),
        control_plane_client: control_plane_client.clone(),
        stores,
        core,
        events: EventPublisher::new(client.clone(), "extdns-controller-manager"),
        overlay: AnnotationOverlay::new(),
    });

    let _metrics_handle = start_metrics_server(
        config.server.metrics.bind_address.clone(),
        config.server.metrics.port,
    );
    let _health_handle = start_health_server(
        config.server.health_probes.bind_address.clone(),
        config.server.health_probes.port,
    );
    let _crd_handle = start_crd_watch(client.clone());

    if config.leader_election.leader_elect {
        info!(
            lease_name = %config.leader_election.resource_name,
            lease_namespace = %config.leader_election.resource_namespace,
            lease_duration_secs = config.leader_election.lease_duration,
            "Leader election enabled"
        );
        let identity = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("extdns-{}", rand::random::<u32>()));

        let lease_manager = LeaseManagerBuilder::new(
            control_plane_client.clone(),
            &config.leader_election.resource_name,
        )
        .with_namespace(&config.leader_election.resource_namespace)
        .with_identity(&identity)
        .with_duration(config.leader_election.lease_duration)
        .with_grace(config.leader_election.retry_period)
        .build()
        .await?;

        let (leader_rx, _lease_handle) = lease_manager.watch().await;

        let mut rx = leader_rx.clone();
        while !*rx.borrow_and_update() {
            rx.changed().await?;
        }
        info!("Leadership acquired, starting controllers");

        run_controllers(context, Some(leader_rx)).await
    } else {
        warn!("Leader election DISABLED - running without high availability");
        run_controllers(context, None).await
    }
}

/// Returns when leadership is lost or the watch fails.
async fn monitor_leadership(
    mut leader_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<(), anyhow::Error> {
    loop {
        leader_rx.changed().await?;
        if !*leader_rx.borrow() {
            return Ok(());
        }
    }
}

/// Run all controllers with signal handling and optional leadership
/// monitoring.
async fn run_controllers(
    context: Arc<Context>,
    leader_rx: Option<tokio::sync::watch::Receiver<bool>>,
) -> Result<()> {
    let shutdown_result: Result<()> = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            result.map_err(anyhow::Error::from)
        }

        result = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                sigterm.recv().await;
                Ok::<(), anyhow::Error>(())
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            }
        } => {
            info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            result
        }

        result = async {
            match leader_rx {
                Some(rx) => monitor_leadership(rx).await,
                None => std::future::pending().await,
            }
        } => {
            match result {
                Ok(()) => {
                    warn!("Leadership lost! Stopping all controllers...");
                    anyhow::bail!("leadership lost - stepping down")
                }
                Err(e) => anyhow::bail!("leadership monitoring failed: {e}"),
            }
        }

        result = run_all_operators(context) => {
            result
        }
    };

    shutdown_result?;
    info!("Graceful shutdown completed successfully");
    Ok(())
}

/// Run the provider, entry, and annotation controllers; none of them is
/// expected to exit.
async fn run_all_operators(context: Arc<Context>) -> Result<()> {
    tokio::select! {
        result = run_provider_operator(context.clone()) => {
            error!("CRITICAL: DNSProvider operator exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("DNSProvider operator exited unexpectedly without error")
        }
        result = run_entry_operator(context.clone()) => {
            error!("CRITICAL: DNSEntry operator exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("DNSEntry operator exited unexpectedly without error")
        }
        result = run_annotation_operator(context.clone()) => {
            error!("CRITICAL: DNSAnnotation operator exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("DNSAnnotation operator exited unexpectedly without error")
        }
    }
}

/// Error policy: requeue after a fixed delay.
#[allow(clippy::needless_pass_by_value)] // Signature required by kube::runtime::Controller
fn error_policy<T, C>(resource: Arc<T>, err: &ReconcileError, _ctx: Arc<C>) -> Action
where
    T: std::fmt::Debug,
{
    error!(
        error = %err,
        resource = ?resource,
        "Reconciliation error - will retry in {}s",
        extdns::constants::ERROR_REQUEUE_DURATION_SECS
    );
    Action::requeue(Duration::from_secs(
        extdns::constants::ERROR_REQUEUE_DURATION_SECS,
    ))
}

/// Run one reconcile under a concurrency permit with panic recovery.
async fn guarded<F>(
    semaphore: Arc<Semaphore>,
    kind: &'static str,
    fut: F,
) -> Result<Action, ReconcileError>
where
    F: std::future::Future<Output = Result<Action>>,
{
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|e| ReconcileError(anyhow::anyhow!("semaphore closed: {e}")))?;
    let start = std::time::Instant::now();

    let result = std::panic::AssertUnwindSafe(fut).catch_unwind().await;
    let duration = start.elapsed();

    match result {
        Ok(Ok(action)) => {
            metrics::record_reconciliation_success(kind, duration);
            Ok(action)
        }
        Ok(Err(e)) => {
            metrics::record_reconciliation_error(kind, duration);
            Err(e.into())
        }
        Err(panic) => {
            metrics::record_reconciliation_error(kind, duration);
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(kind = kind, panic = %message, "reconcile panicked");
            Err(ReconcileError(anyhow::anyhow!(
                "reconcile panicked: {message}"
            )))
        }
    }
}

/// Run the DNSProvider operator.
async fn run_provider_operator(context: Arc<Context>) -> Result<()> {
    info!("Starting DNSProvider operator");
    let config = &context.core.config.controllers.dns_provider;
    let semaphore = Arc::new(Semaphore::new(config.concurrent_syncs.max(1)));
    let timeout = Duration::from_secs(config.reconciliation_timeout);

    let api = match &config.namespace {
        Some(namespace) => {
            Api::<DNSProvider>::namespaced(context.control_plane_client.clone(), namespace)
        }
        None => Api::<DNSProvider>::all(context.control_plane_client.clone()),
    };

    Controller::new(api, WatcherConfig::default())
        .run(
            move |provider: Arc<DNSProvider>, ctx: Arc<Context>| {
                let semaphore = semaphore.clone();
                async move {
                    guarded(semaphore, KIND_DNS_PROVIDER, async {
                        match tokio::time::timeout(
                            timeout,
                            reconcile_provider(ctx.clone(), (*provider).clone()),
                        )
                        .await
                        {
                            Ok(result) => result,
                            Err(_) => anyhow::bail!("provider reconciliation timed out"),
                        }
                    })
                    .await
                }
            },
            error_policy,
            context.clone(),
        )
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the DNSEntry operator.
///
/// Besides entry changes, the controller watches DNSProviders: a provider
/// reconcile can change the selection for any entry, so provider events
/// map to all known entries.
async fn run_entry_operator(context: Arc<Context>) -> Result<()> {
    info!("Starting DNSEntry operator");
    let config = &context.core.config.controllers.dns_entry;
    let semaphore = Arc::new(Semaphore::new(config.concurrent_syncs.max(1)));

    let api = Api::<DNSEntry>::all(context.client.clone());
    let provider_api = Api::<DNSProvider>::all(context.control_plane_client.clone());
    let stores_for_watch = context.stores.clone();

    Controller::new(api, WatcherConfig::default())
        .watches(provider_api, WatcherConfig::default(), move |_provider| {
            // Any provider change may reassign any entry.
            stores_for_watch
                .entries
                .state()
                .iter()
                .filter_map(|entry| {
                    let namespace = entry.namespace()?;
                    Some(
                        kube::runtime::reflector::ObjectRef::new(&entry.name_any())
                            .within(&namespace),
                    )
                })
                .collect::<Vec<_>>()
        })
        .run(
            move |entry: Arc<DNSEntry>, ctx: Arc<Context>| {
                let semaphore = semaphore.clone();
                async move {
                    guarded(semaphore, KIND_DNS_ENTRY, async {
                        reconcile_entry(ctx.clone(), (*entry).clone()).await
                    })
                    .await
                }
            },
            error_policy,
            context.clone(),
        )
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the DNSAnnotation operator.
async fn run_annotation_operator(context: Arc<Context>) -> Result<()> {
    info!("Starting DNSAnnotation operator");
    let semaphore = Arc::new(Semaphore::new(
        context
            .core
            .config
            .controllers
            .source
            .concurrent_syncs
            .max(1),
    ));

    let api = Api::<DNSAnnotation>::all(context.control_plane_client.clone());

    Controller::new(api, WatcherConfig::default())
        .run(
            move |annotation: Arc<DNSAnnotation>, ctx: Arc<Context>| {
                let semaphore = semaphore.clone();
                async move {
                    guarded(semaphore, KIND_DNS_ANNOTATION, async {
                        reconcile_annotation(ctx.clone(), (*annotation).clone()).await
                    })
                    .await
                }
            },
            error_policy,
            context.clone(),
        )
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}
