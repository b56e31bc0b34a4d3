//! vaultgate — process entry point.
//!
//! Loads configuration from the environment (§6), constructs the OAuth,
//! session, and VCS singletons explicitly (spec.md §9: "prefer explicit
//! construction and injection" over module-level state), wires the HTTP
//! router, and drives the minute sweeper and the shutdown sequence §5
//! describes: cancel the sweeper, flush the commit coordinator, close the
//! HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vaultgate_config::{AppConfig, SECRET_ENV_VARS};
use vaultgate_gateway::{
    build_router, GatewayState, RATE_LIMITER_MAX_ENTRIES, RATE_LIMIT_WINDOW, REGISTER_RATE_LIMIT,
    TOKEN_RATE_LIMIT,
};
use vaultgate_oauth::{
    AccessTokenIssuer, AuthorizationGrantStore, ClientRegistry, FederatedIdpClient,
    FederationSessionBridge, OAuthState,
};
use vaultgate_security::RateLimiter;
use vaultgate_session::TransportSessionManager;
use vaultgate_vcs::{CoordinatorConfig, DebouncedCommitCoordinator};

#[derive(Parser)]
#[command(
    name = "vaultgate",
    version,
    about = "OAuth 2.1 gateway exposing a git-backed note vault as a streaming tool server"
)]
struct Cli {
    /// Enable debug-level logging (overridden by RUST_LOG if set)
    #[arg(short, long)]
    verbose: bool,
}

/// §4.9: "A dedicated sweeper runs every minute".
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // §7: "At startup, any configuration error aborts the process."
            error!(error = %e, "configuration error, aborting startup");
            return Err(e.into());
        }
    };

    let oauth_state = Arc::new(OAuthState {
        clients: ClientRegistry::new(trusted_frontend_hosts(&config.server_url)),
        grants: AuthorizationGrantStore::new(),
        federation: FederationSessionBridge::new(),
        tokens: AccessTokenIssuer::new(config.jwt_secret.clone()),
        idp: FederatedIdpClient::new(&config.federated_client_id, &config.federated_client_secret),
        server_url: config.server_url.clone(),
        allowed_users: config.allowed_users.clone(),
        access_token_ttl: Duration::from_secs(config.access_token_ttl),
        refresh_token_ttl: Duration::from_secs(config.refresh_token_ttl),
    });

    let coordinator = DebouncedCommitCoordinator::new(CoordinatorConfig {
        vault_path: config.vault_path.clone(),
        remote_url: config.remote_url.clone(),
        remote_branch: config.branch.clone(),
        user_name: config.user_name.clone(),
        user_email: config.user_email.clone(),
        debounce: Duration::from_secs(config.debounce_seconds),
        secret_env_vars: SECRET_ENV_VARS.iter().map(|s| s.to_string()).collect(),
    });

    let sessions = Arc::new(TransportSessionManager::new(
        config.vault_path.clone(),
        coordinator.clone(),
        config.max_sessions,
    ));

    let gateway_state = Arc::new(GatewayState {
        oauth: oauth_state,
        sessions: sessions.clone(),
        trust_proxy: config.trust_proxy,
        register_rate_limiter: Arc::new(RateLimiter::new(
            REGISTER_RATE_LIMIT,
            RATE_LIMIT_WINDOW,
            RATE_LIMITER_MAX_ENTRIES,
        )),
        token_rate_limiter: Arc::new(RateLimiter::new(
            TOKEN_RATE_LIMIT,
            RATE_LIMIT_WINDOW,
            RATE_LIMITER_MAX_ENTRIES,
        )),
    });

    let router = build_router(gateway_state.clone());

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(gateway_state.clone(), shutdown.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, max_sessions = config.max_sessions, "vaultgate listening");

    let shutdown_for_serve = shutdown.clone();
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining");
        shutdown_for_serve.cancel();
    })
    .await?;

    sweeper.abort();
    coordinator.flush().await;
    info!("vaultgate shut down cleanly");

    Ok(())
}

fn spawn_sweeper(
    gateway_state: Arc<GatewayState>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    gateway_state.oauth.cleanup();
                    gateway_state.cleanup();
                    gateway_state.sessions.sweep_idle();
                }
                _ = shutdown.cancelled() => break,
            }
        }
    })
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Seeds C3's non-loopback `https` redirect-URI allowlist with `SERVER_URL`'s
/// own host — the only front-end this single-tenant gateway is expected to
/// serve (SPEC_FULL.md §3, C3 notes).
fn trusted_frontend_hosts(server_url: &str) -> Vec<String> {
    url::Url::parse(server_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .into_iter()
        .collect()
}
