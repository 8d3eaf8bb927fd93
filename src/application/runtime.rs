//! Gateway bootstrap, supervision and shutdown.
//!
//! Startup order: telemetry, descriptor limit, bus connection, gateway core,
//! listeners, then the long-running tasks. Any of those failing aborts
//! startup. Once running, the process ends on Ctrl-C (clean) or when a task
//! it cannot live without stops (error).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::adapters::auth::BackendVerifier;
use crate::adapters::bus::{QueuedPublisher, RedisBus, DEFAULT_PUBLISH_QUEUE};
use crate::adapters::http::{ops_router, OpsAppState};
use crate::adapters::websocket::{Acceptor, AcceptorConfig};
use crate::config::{AppConfig, ConfigError};
use crate::domain::CLOSE_NOTICE;
use crate::gateway::{Dispatcher, Gateway, ReadLoop};
use crate::ports::{BusError, BusPublisher, VerifierError};
use crate::telemetry::{init_logging, init_metrics, TelemetryError};

use super::{AuthResolver, BusConsumer};

/// Errors that stop the gateway.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Failed to raise the open file limit: {0}")]
    FdLimit(io::Error),

    #[error("Failed to create the readiness multiplexer: {0}")]
    Multiplexer(io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Verifier(#[from] VerifierError),

    #[error("Read loop stopped: {0}")]
    ReadLoop(io::Error),

    #[error("Ops server stopped: {0}")]
    OpsServer(io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Raises the `RLIMIT_NOFILE` soft limit to the hard limit.
///
/// Returns the limit now in effect.
pub fn raise_fd_limit() -> io::Result<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };

    // SAFETY: `limit` is a valid, writable rlimit for the duration of the call.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        return Err(io::Error::last_os_error());
    }

    if limit.rlim_cur < limit.rlim_max {
        limit.rlim_cur = limit.rlim_max;
        // SAFETY: `limit` is a valid rlimit read back from the kernel above.
        if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(limit.rlim_cur as u64)
}

/// Runs the gateway until Ctrl-C or a fatal error.
pub async fn run(config: AppConfig) -> Result<(), StartupError> {
    init_logging(&config.server.log_level, config.server.json_logs)?;
    let metrics = init_metrics()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Gateway starting");

    if config.server.raise_fd_limit {
        let limit = raise_fd_limit().map_err(StartupError::FdLimit)?;
        tracing::info!(limit, "Open file limit raised");
    }

    let bus = RedisBus::connect(
        &config.bus.url,
        &config.bus.channel,
        config.bus.connect_retry(),
    )
    .await?;

    let (publisher, outbound) = QueuedPublisher::channel(DEFAULT_PUBLISH_QUEUE);
    let publisher: Arc<dyn BusPublisher> = Arc::new(publisher);

    let gateway = Gateway::create(publisher.clone(), config.server.event_capacity)
        .map_err(StartupError::Multiplexer)?;
    let gateway = Arc::new(gateway);

    let acceptor = Acceptor::bind(
        config.server.listen_addr,
        gateway.clone(),
        AcceptorConfig {
            path: config.server.path.clone(),
            handshake_timeout: config.server.handshake_timeout(),
            max_write_buffer_bytes: config.server.max_write_buffer_bytes,
        },
    )
    .await
    .map_err(|source| StartupError::Bind {
        addr: config.server.listen_addr,
        source,
    })?;

    let ops_listener = TcpListener::bind(config.server.metrics_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.server.metrics_addr,
            source,
        })?;

    let mut consumer = BusConsumer::new(Dispatcher::new(gateway.clone()), bus.channel());
    if let Some(backend_url) = &config.auth.backend_url {
        let verifier = BackendVerifier::new(backend_url, config.auth.request_timeout())?;
        tracing::info!(endpoint = verifier.endpoint(), "Resolving auth requests in-process");
        consumer = consumer.with_resolver(Arc::new(AuthResolver::new(
            Arc::new(verifier),
            publisher.clone(),
        )));
    }

    let subscription = bus.subscribe().await?;

    let (read_loop_tx, read_loop_rx) = oneshot::channel();
    ReadLoop::new(gateway.clone())
        .spawn(move |e| {
            let _ = read_loop_tx.send(e);
        })
        .map_err(StartupError::ReadLoop)?;

    let publisher_bus = bus.clone();
    let publisher_task = tokio::spawn(async move { publisher_bus.run_publisher(outbound).await });

    tokio::spawn(acceptor.run());

    let ops_app = ops_router().with_state(OpsAppState::new(gateway.clone(), metrics));
    let ops_server = tokio::spawn(async move { axum::serve(ops_listener, ops_app).await });

    tracing::info!(
        listen = %config.server.listen_addr,
        path = %config.server.path,
        metrics = %config.server.metrics_addr,
        channel = %bus.channel(),
        "Gateway ready"
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!("Failed to listen for shutdown signal: {}", e);
            }
            shutdown(&gateway, &config).await;
            Ok(())
        }
        result = consumer.run(subscription) => result.map_err(StartupError::from),
        failed = read_loop_rx => match failed {
            Ok(e) => Err(StartupError::ReadLoop(e)),
            Err(_) => Err(StartupError::ReadLoop(io::Error::new(
                io::ErrorKind::Other,
                "read loop thread exited",
            ))),
        },
        joined = publisher_task => match joined {
            Ok(Ok(())) => Err(StartupError::Bus(BusError::PublisherClosed)),
            Ok(Err(e)) => Err(StartupError::Bus(e)),
            Err(e) => Err(StartupError::Task(e)),
        },
        served = ops_server => match served {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StartupError::OpsServer(e)),
            Err(e) => Err(StartupError::Task(e)),
        },
    }
}

/// Tells every client the gateway is going away, then waits out the grace
/// period so the notices can flush.
async fn shutdown(gateway: &Gateway, config: &AppConfig) {
    tracing::info!("Shutdown requested, notifying clients");
    let report = gateway.begin_drain(CLOSE_NOTICE);
    tracing::info!(
        delivered = report.delivered,
        dead = report.dead,
        grace_secs = config.server.shutdown_grace_secs,
        "Close notice sent"
    );
    tokio::time::sleep(config.server.shutdown_grace()).await;
}
