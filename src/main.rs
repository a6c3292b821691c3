// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, process, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use group_poll_server::{
    api::router,
    config::{ServerConfig, DEFAULT_LOG_FILTER},
    session_sweeper::SessionSweeper,
    state::AppState,
    storage::{CreateUser, Database, StoreResult, UserRepository},
};

/// In-flight requests get this long to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();
    init_tracing(config.json_logs);

    let db = match Database::open(&config.database_path()) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, path = %config.database_path().display(), "Failed to open database");
            process::exit(1);
        }
    };

    if let Err(e) = seed_admin(&db, &config) {
        error!(error = %e, "Failed to seed admin user");
        process::exit(1);
    }

    let state = AppState::new(db, config.session_ttl);
    let app = router(state.clone(), config.request_timeout);

    let addr: SocketAddr = match config.bind_address().parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, address = %config.bind_address(), "Invalid bind address");
            process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(SessionSweeper::new(state.sessions.clone()).run(shutdown.clone()));

    let handle = axum_server::Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    info!(%addr, data_dir = %config.data_dir.display(), "Group poll server listening (docs at /docs)");

    if let Err(e) = axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await
    {
        error!(error = %e, "HTTP server failed");
        shutdown.cancel();
        process::exit(1);
    }

    shutdown.cancel();
    let _ = sweeper.await;
    info!("Server stopped");
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

/// Create the configured admin when the user table is empty.
fn seed_admin(db: &Database, config: &ServerConfig) -> StoreResult<()> {
    let Some(seed) = &config.seed_admin else {
        return Ok(());
    };
    let users = UserRepository::new(db);
    if !users.is_empty()? {
        return Ok(());
    }

    let admin = users.create(&CreateUser {
        name: seed.name.clone(),
        password: seed.password.clone(),
        organizator: true,
        administrator: true,
    })?;
    info!(user_id = admin.id, name = %admin.name, "Seeded admin user");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
}
