mod args;
mod config;
mod logging;

use std::io;
use std::net::SocketAddr;

use app_api::AppContext;
use http_api::{HttpState, generate_auth_token};
use telemetry_app::{AppState, BackgroundTasks, TelemetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = args::parse_args().map_err(|err| {
        eprintln!("{err}");
        args::print_help();
        io::Error::new(io::ErrorKind::InvalidInput, "invalid arguments")
    })?;
    logging::init(args.verbose);

    let lookup = |name: &str| std::env::var(name).ok();
    let config_dir = config::config_dir(lookup).map_err(io::Error::other)?;
    let loaded = config::load_or_create(&config_dir).map_err(io::Error::other)?;
    if loaded.created {
        println!(
            "Created config at {} (default port {}).",
            loaded.file.display(),
            telemetry_app::DEFAULT_PORT
        );
    }

    let config = TelemetryConfig::load(loaded.table.as_ref(), lookup);
    let port = args.port.unwrap_or(config.port);
    info!(
        data_dir = %config.data_dir.display(),
        database = %config.database_path.display(),
        "configuration loaded"
    );

    let app_state = AppState::new(config);
    if let Err(err) = app_state.setup_db() {
        return Err(io::Error::other(format!("failed to initialize database: {}", err)).into());
    }

    let shutdown = CancellationToken::new();
    let mut tasks = BackgroundTasks::start(&app_state, shutdown.clone());

    let auth_token = generate_auth_token();
    let state = HttpState::new(
        AppContext::new(app_state),
        auth_token.clone(),
        shutdown.clone(),
    );
    let limiter = state.limiter.clone();
    let cleanup_cancel = shutdown.clone();
    tasks.spawn("rate-limit-cleanup", async move {
        limiter.run_cleanup(cleanup_cancel).await;
    });
    debug!(tasks = tasks.count(), "background tasks started");
    let router = http_api::router(state);

    let (listener, actual_port, used_fallback) = bind_port(port).await?;
    let url = format!("http://127.0.0.1:{actual_port}");

    if used_fallback {
        warn!(configured = port, actual = actual_port, "configured port unavailable");
        eprintln!("Configured port {port} was unavailable; using {actual_port} for this run.");
    }

    println!("Agent Telemetry is running at {url}");
    println!("Shutdown token: {auth_token}");
    println!("Press Ctrl+C to stop.");

    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await;

    info!("server stopped, stopping background tasks");
    tasks.shutdown().await;
    served?;
    Ok(())
}

async fn bind_port(port: u16) -> Result<(tokio::net::TcpListener, u16, bool), io::Error> {
    if port == 0 {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let actual_port = listener.local_addr()?.port();
        return Ok((listener, actual_port, false));
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => Ok((listener, port, false)),
        Err(_) => {
            let listener =
                tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
            let actual_port = listener.local_addr()?.port();
            Ok((listener, actual_port, true))
        }
    }
}

/// Resolves on Ctrl+C or `POST /shutdown`, and makes sure every holder of
/// the token sees the cancellation either way.
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "failed to listen for ctrl-c");
                shutdown.cancelled().await;
            } else {
                info!("ctrl-c received, shutting down");
            }
        }
        _ = shutdown.cancelled() => info!("shutdown requested over http"),
    }
    shutdown.cancel();
}
