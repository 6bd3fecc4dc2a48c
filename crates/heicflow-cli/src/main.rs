use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use heicflow_core::app::{AppBuilder, GcLoop};
use heicflow_core::credentials::{ScryptParams, Signer, WalletCredentials};
use heicflow_core::impls::{
    CommandConverter, InMemoryConnector, InMemoryObjectStore, SignedHttpConnector,
};
use heicflow_core::ports::StorageConnector;
use heicflow_core::storage::StorageGateway;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod http;
mod tunnel;

use crate::config::{Cli, Command, ConverterKind, KeygenArgs, ServeArgs, StorageBackend};
use crate::http::AppState;
use crate::tunnel::Tunnel;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Keygen(args) => keygen(args),
    }
}

/// ログは stderr へ（keygen の stdout を汚さない）。既定は `info`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn keygen(args: KeygenArgs) -> Result<()> {
    let signer = Signer::generate();
    let wallet = WalletCredentials::encrypt(&signer, &args.passphrase, ScryptParams::default())
        .context("failed to encrypt wallet")?;
    println!("{}", wallet.to_json_pretty()?);
    info!(public_key = %signer.public_key_hex(), "wallet generated");
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let wallet_json = tokio::fs::read_to_string(&args.wallet)
        .await
        .with_context(|| format!("failed to read wallet {}", args.wallet.display()))?;
    let wallet = WalletCredentials::from_json(&wallet_json).context("invalid wallet file")?;

    let gateway = Arc::new(StorageGateway::new(
        storage_connector(&args)?,
        wallet,
        args.passphrase.clone(),
        args.bucket_id,
        args.gateway_url.clone(),
    ));

    let builder = AppBuilder::new()
        .gateway(gateway)
        .job_ttl(args.job_ttl())
        .max_upload_bytes(args.max_upload_bytes);
    let builder = match args.converter {
        ConverterKind::Command => builder.converter(CommandConverter::new(args.heif_dec_path.clone())),
        #[cfg(feature = "libheif")]
        ConverterKind::Libheif => builder.converter(heicflow_core::impls::LibHeifConverter::new()),
        #[cfg(not(feature = "libheif"))]
        ConverterKind::Libheif => {
            bail!("built without libheif support; rebuild with `--features libheif` or use `--converter command`")
        }
    };
    let app = builder.build()?;

    let gc = args
        .job_ttl()
        .map(|ttl| GcLoop::spawn(app.registry.clone(), GcLoop::interval_for(ttl)));

    let (state, credential_rx) = AppState::new(app.orchestrator, args.expose_errors());
    let router = http::router(state);

    let addr = args.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, bucket_id = %args.bucket_id, storage = ?args.storage, "server listening");

    let tunnel = match args.tunnel() {
        Some(config) => Some(
            Tunnel::open(&reqwest::Client::new(), &config, loopback_target(addr))
                .await
                .context("failed to start tunnel")?,
        ),
        None => None,
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(credential_rx.clone()))
        .await
        .context("server error")?;

    if let Some(tunnel) = tunnel {
        tunnel.close().await;
    }
    if let Some(gc) = gc {
        gc.shutdown_and_join().await;
    }
    info!("server closed");

    if *credential_rx.borrow() {
        bail!("stopped after a storage credential failure");
    }
    Ok(())
}

fn storage_connector(args: &ServeArgs) -> Result<Arc<dyn StorageConnector>> {
    match args.storage {
        StorageBackend::Memory => {
            warn!("using in-process storage; stored objects are lost on restart");
            let store = Arc::new(InMemoryObjectStore::new());
            Ok(Arc::new(InMemoryConnector::new(store)))
        }
        StorageBackend::Http => {
            let node_url = args
                .node_url
                .clone()
                .context("--node-url (STORAGE_NODE_URL) is required for --storage http")?;
            let connector = SignedHttpConnector::new(node_url);
            Ok(Arc::new(match &args.network {
                Some(network) => connector.with_network(network.clone()),
                None => connector,
            }))
        }
    }
}

/// 0.0.0.0 / :: で待ち受けている場合、トンネルはループバックへ繋ぐ
fn loopback_target(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}

/// SIGTERM / Ctrl-C / 署名鍵の致命的エラーのどれかで返る
async fn shutdown_signal(mut credential_rx: watch::Receiver<bool>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let credential = async {
        let closed = credential_rx.wait_for(|fatal| *fatal).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, shutting down gracefully"),
        _ = terminate => info!("SIGTERM received, shutting down gracefully"),
        _ = credential => error!("storage credentials rejected, shutting down"),
    }
}
