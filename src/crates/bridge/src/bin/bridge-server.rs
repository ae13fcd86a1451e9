//! Bridge server binary
//!
//! Binds the HTTP listener (plain or TLS), spawns the background loops, and
//! shuts down cooperatively on ctrl-c. An `EADDRINUSE` at startup gets one
//! kill-and-retry against the squatting listener before giving up.

use anyhow::Context;
use bridge::config::BridgeConfig;
use bridge::state::AppState;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BridgeConfig::from_env();
    let exit_code = match run(config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let state = AppState::new(config.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let background = state.spawn_background(shutdown_rx);

    let router = bridge::api::create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let result = match &config.tls {
        Some(tls) => serve_https(addr, router, tls).await,
        None => serve_http(addr, router).await,
    };

    // Cooperative shutdown: loops finish their current tick and stop.
    let _ = shutdown_tx.send(true);
    for handle in background {
        let _ = handle.await;
    }
    result
}

async fn serve_http(addr: SocketAddr, router: axum::Router) -> anyhow::Result<()> {
    let listener = bind_with_retry(addr).await?;
    tracing::info!(%addr, "bridge listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")
}

async fn serve_https(
    addr: SocketAddr,
    router: axum::Router,
    tls: &bridge::config::TlsSettings,
) -> anyhow::Result<()> {
    if tls.passphrase.is_some() {
        anyhow::bail!(
            "BRIDGE_SSL_PASSPHRASE is set but encrypted private keys are not supported; \
             decrypt the key first"
        );
    }
    let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
        &tls.cert_path,
        &tls.key_path,
    )
    .await
    .with_context(|| {
        format!(
            "loading TLS material from {} / {}",
            tls.cert_path, tls.key_path
        )
    })?;

    tracing::info!(%addr, "bridge listening (https)");
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    axum_server::bind_rustls(addr, rustls)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .context("HTTPS server error")
}

/// Bind the listener; on `EADDRINUSE`, kill the squatting pid, wait 500 ms,
/// and retry exactly once.
async fn bind_with_retry(addr: SocketAddr) -> anyhow::Result<tokio::net::TcpListener> {
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            tracing::warn!(%addr, "port in use; attempting to free it");
            kill_listener(addr.port());
            tokio::time::sleep(Duration::from_millis(500)).await;
            tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("port {} still in use after kill-retry", addr.port()))
        }
        Err(e) => Err(e).with_context(|| format!("binding {}", addr)),
    }
}

/// Best-effort, platform-appropriate kill of whatever owns the port.
fn kill_listener(port: u16) {
    #[cfg(unix)]
    {
        let lookup = std::process::Command::new("lsof")
            .args(["-ti", &format!(":{}", port)])
            .output();
        if let Ok(output) = lookup {
            for pid in String::from_utf8_lossy(&output.stdout).split_whitespace() {
                tracing::warn!(pid, "killing listener on contested port");
                let _ = std::process::Command::new("kill").arg(pid).status();
            }
        }
    }
    #[cfg(windows)]
    {
        let _ = std::process::Command::new("powershell")
            .args([
                "-NoProfile",
                "-Command",
                &format!(
                    "Get-NetTCPConnection -LocalPort {} | ForEach-Object {{ Stop-Process -Id $_.OwningProcess -Force }}",
                    port
                ),
            ])
            .status();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
    }
    tracing::info!("shutdown signal received");
}
