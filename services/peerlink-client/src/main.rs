//! Peerlink command-line client
//!
//! Single-binary client that:
//! 1. Loads the host store and rehydrates the session from it
//! 2. Mirrors every credential change back to the host store
//! 3. Runs one command against the Peerlink backend through the gateway
//! 4. Flushes the mirror and exits

mod cli;
mod config;
mod error;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use common::Secret;
use peerlink_api::{ApiError, PeerlinkApi, SearchOptions};
use peerlink_auth::{BoundaryEnd, BoundaryMirror, CredentialStore, MirrorHandle, Session};
use peerlink_host::{HostBridge, HostStore};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Command;
use crate::config::Config;

/// Everything one client process runs on.
struct App {
    session: Session,
    api: PeerlinkApi,
    host: HostBridge,
    mirror: MirrorHandle,
    host_task: JoinHandle<()>,
}

impl App {
    /// Wire the host store, the boundary link, and the session together.
    ///
    /// Stored credentials are applied before this returns, so the first
    /// command already sees the restored session.
    async fn start(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        let host_store = HostStore::load(config.store.path.clone())
            .await
            .with_context(|| format!("failed to load {}", config.store.path.display()))?;

        let (ui, host) = peerlink_auth::boundary_link();
        let BoundaryEnd {
            outbound,
            mut inbound,
        } = ui;
        let bridge = HostBridge::new(Arc::new(host_store), host.outbound);
        let store = CredentialStore::new();
        let mirror = BoundaryMirror::new(store.clone(), Arc::new(outbound));

        if bridge.announce().await? {
            while let Ok(message) = inbound.try_recv() {
                mirror.apply_inbound(&message);
            }
        }

        let host_task = bridge.clone().spawn(host.inbound);
        let mirror = mirror.spawn(inbound);

        let session = Session::with_store(store, client, config.server.base_url.clone());
        let api = PeerlinkApi::new(session.gateway().clone(), config.server.base_url.clone());
        info!(
            authenticated = session.store().is_authenticated(),
            "session ready"
        );

        Ok(Self {
            session,
            api,
            host: bridge,
            mirror,
            host_task,
        })
    }

    /// Run one command and return what to print.
    async fn run(&self, command: &Command, password: Option<&Secret<String>>) -> Result<String> {
        match command {
            Command::Login { username } => {
                let password = password.ok_or(error::Error::MissingPassword)?;
                self.session.login(username, password.expose()).await?;
                Ok(format!("logged in as {username}"))
            }
            Command::Register { username, email } => {
                let password = password.ok_or(error::Error::MissingPassword)?;
                self.session
                    .register(username, email, password.expose())
                    .await?;
                Ok(format!("registered and logged in as {username}"))
            }
            Command::Logout => {
                self.session.logout().await;
                Ok("logged out".to_string())
            }
            Command::Status => {
                let status = serde_json::json!({
                    "session": self.session.status(),
                    "host_session": self.host.access_token().await?.is_some(),
                });
                Ok(serde_json::to_string_pretty(&status)?)
            }
            Command::Search {
                query,
                group,
                filter,
            } => {
                let options = SearchOptions {
                    group: group.as_deref(),
                    filter: filter.as_deref(),
                };
                let results = self.api.search(query, options).await?;
                Ok(serde_json::to_string_pretty(&results)?)
            }
            Command::SendMagnet { magnet } => {
                let response = self.api.send_magnet(magnet).await?;
                Ok(serde_json::to_string_pretty(&response)?)
            }
        }
    }

    /// Push pending credential changes to the host and wait until they are
    /// persisted.
    async fn shutdown(self) {
        self.mirror.close().await;
        if let Err(e) = self.host_task.await {
            debug!(error = %e, "host bridge task ended abnormally");
        }
    }
}

/// Whether the error means the user has to log in again.
fn requires_login(err: &anyhow::Error) -> bool {
    if let Some(e) = err.downcast_ref::<ApiError>() {
        return e.requires_login();
    }
    if let Some(e) = err.downcast_ref::<peerlink_auth::Error>() {
        return e.requires_login();
    }
    false
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays parseable
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let prometheus = metrics::install_recorder()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = cli::parse(&args).map_err(|e| anyhow::anyhow!("{e}\n\n{}", cli::USAGE))?;

    let config_path = Config::resolve_path(invocation.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.server.base_url,
        store = %config.store.path.display(),
        "configuration loaded"
    );

    let app = App::start(&config).await?;
    let command = invocation.command.name();
    let result = app
        .run(&invocation.command, config.auth.password.as_ref())
        .await;
    app.shutdown().await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) if requires_login(e) => "login_required",
        Err(_) => "error",
    };
    metrics::record_command(command, outcome);
    debug!(metrics = %prometheus.render(), "session counters");

    match result {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(e) if outcome == "login_required" => {
            Err(e.context("not signed in; run `peerlink login <username>`"))
        }
        Err(e) => Err(e),
    }
}
