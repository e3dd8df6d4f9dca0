//! # rp-board
//!
//! Assembles the engine from configuration: store, services, the monthly
//! activity job and the HTTP server.

#[cfg(not(all(feature = "web-axum", feature = "auth-jwt")))]
compile_error!("rp-board needs the `web-axum` and `auth-jwt` features");

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use api_adapters::{AppState, Metrics};
use auth_adapters::JwtIdentity;
use configs::{DatabaseSettings, LogSettings, Settings};
use domains::{Clock, DomainEvent, OocForumId, SystemClock};
use services::{ActivityJob, EngineSettings, Repositories, Services};
use storage_adapters::{BroadcastPublisher, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing(&settings.log)?;

    let repos = open_store(&settings.database).await?;
    let checks = repos.checks.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events = BroadcastPublisher::default();
    let engine = EngineSettings {
        cutoff_window_days: settings.activity.cutoff_window_days,
        archive_forum: OocForumId(settings.threads.archive_forum_id),
        finished_post_threshold: settings.threads.finished_post_threshold,
    };
    let services = Services::new(repos, clock, Arc::new(events.clone()), engine);

    let identity = Arc::new(
        JwtIdentity::new(&settings.auth.jwt_secret, settings.auth.token_ttl_secs)
            .context("building the token verifier")?,
    );
    let metrics = Arc::new(Metrics::new());

    tokio::spawn(relay_events(events.subscribe()));
    tokio::spawn(run_activity_job(
        ActivityJob::new(services.activity.clone(), checks),
        Duration::from_secs(settings.activity.job_interval_secs),
        metrics.clone(),
    ));

    let app = api_adapters::router(AppState::new(services, identity, metrics));
    let addr = settings.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "rp-board listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    info!("rp-board stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) -> anyhow::Result<()> {
    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.filter))
        .context("parsing log filter")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn open_store(database: &DatabaseSettings) -> anyhow::Result<Repositories> {
    if let Some(repos) = open_postgres(database).await? {
        return Ok(repos);
    }
    warn!("using the in-memory store; data is lost on restart");
    Ok(Repositories::from_store(Arc::new(MemoryStore::new())))
}

#[cfg(feature = "db-postgres")]
async fn open_postgres(database: &DatabaseSettings) -> anyhow::Result<Option<Repositories>> {
    use secrecy::ExposeSecret;
    use storage_adapters::PgStore;

    let Some(url) = &database.url else {
        return Ok(None);
    };
    let store = PgStore::connect(url.expose_secret(), database.max_connections)
        .await
        .context("connecting to postgres")?;
    store.migrate().await.context("running migrations")?;
    info!(max_connections = database.max_connections, "using postgres store");
    Ok(Some(Repositories::from_store(Arc::new(store))))
}

#[cfg(not(feature = "db-postgres"))]
async fn open_postgres(database: &DatabaseSettings) -> anyhow::Result<Option<Repositories>> {
    if database.url.is_some() {
        warn!("database.url is set but this build has no postgres support");
    }
    Ok(None)
}

/// Logs every domain event; the channel is the notification boundary.
async fn relay_events(mut rx: broadcast::Receiver<DomainEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => info!(event = event.name(), payload = ?event, "domain event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event relay lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn run_activity_job(job: ActivityJob, every: Duration, metrics: Arc<Metrics>) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match job.tick().await {
            Ok(Some(report)) => {
                metrics.record("scheduled_activity_check", "ok");
                metrics.record_deactivations(report.deactivated.len() as u64);
                info!(
                    cutoff_date = %report.cutoff_date,
                    deactivated = report.deactivated.len(),
                    failed = report.failed.len(),
                    "scheduled activity check finished"
                );
            }
            Ok(None) => {}
            Err(e) => {
                metrics.record("scheduled_activity_check", "error");
                error!(error = %e, "scheduled activity check failed; retrying next tick");
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
