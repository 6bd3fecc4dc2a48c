//! Tunnel - localtunnel 互換サーバー経由でローカルポートを公開する
//!
//! # フロー
//! 1. `GET {host}/{subdomain}` で登録し、`{id, port, max_conn_count, url}` を受け取る
//! 2. トンネルサーバーの `port` へ `max_conn_count` 本の TCP 接続を張る
//! 3. 各接続をローカルポートへの接続と双方向に中継する
//! 4. 接続が閉じたら張り直す（shutdown まで）

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::TunnelConfig;

/// 接続失敗後の待ち時間
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// 登録レスポンス
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TunnelInfo {
    pub id: String,
    pub port: u16,
    #[serde(default)]
    pub max_conn_count: Option<usize>,
    pub url: String,
}

impl TunnelInfo {
    fn connections(&self) -> usize {
        self.max_conn_count.unwrap_or(1).max(1)
    }
}

/// 起動中のトンネル
pub struct Tunnel {
    pub info: TunnelInfo,
    shutdown_tx: watch::Sender<bool>,
    workers: JoinSet<()>,
}

impl Tunnel {
    /// 登録して中継ワーカーを起動する
    ///
    /// 登録に失敗した場合はエラーを返す（呼び出し側で致命的として扱う）。
    pub async fn open(
        client: &reqwest::Client,
        config: &TunnelConfig,
        local: SocketAddr,
    ) -> Result<Self> {
        let info = register(client, config).await?;
        let remote_host = reqwest::Url::parse(&config.host)
            .with_context(|| format!("invalid tunnel host {}", config.host))?
            .host_str()
            .ok_or_else(|| anyhow!("tunnel host {} has no hostname", config.host))?
            .to_string();
        let remote = (remote_host, info.port);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = JoinSet::new();
        for slot in 0..info.connections() {
            workers.spawn(pump(slot, remote.clone(), local, shutdown_rx.clone()));
        }
        info!(url = %info.url, connections = info.connections(), "tunnel started");

        Ok(Self {
            info,
            shutdown_tx,
            workers,
        })
    }

    /// 全ワーカーを止めて終了を待つ
    pub async fn close(mut self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
        while self.workers.join_next().await.is_some() {}
        info!("tunnel closed");
    }
}

async fn register(client: &reqwest::Client, config: &TunnelConfig) -> Result<TunnelInfo> {
    let url = format!(
        "{}/{}",
        config.host.trim_end_matches('/'),
        config.subdomain
    );
    let info = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("tunnel registration request to {url} failed"))?
        .error_for_status()
        .context("tunnel server refused registration")?
        .json::<TunnelInfo>()
        .await
        .context("malformed tunnel registration response")?;
    debug!(id = %info.id, port = info.port, "tunnel registered");
    Ok(info)
}

/// 1 本分の中継を shutdown まで繰り返す
async fn pump(
    slot: usize,
    remote: (String, u16),
    local: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let result = tokio::select! {
            result = pipe_once(&remote, local) => result,
            _ = shutdown.changed() => return,
        };
        match result {
            Ok((up, down)) => debug!(slot, up, down, "tunnel connection closed"),
            Err(err) => {
                warn!(slot, error = %err, "tunnel connection failed");
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
}

async fn pipe_once(remote: &(String, u16), local: SocketAddr) -> std::io::Result<(u64, u64)> {
    let mut upstream = TcpStream::connect((remote.0.as_str(), remote.1)).await?;
    let mut downstream = TcpStream::connect(local).await?;
    tokio::io::copy_bidirectional(&mut upstream, &mut downstream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// `GET /:subdomain` に登録レスポンスを返す偽トンネルサーバー
    async fn fake_tunnel_server(tcp_port: u16) -> String {
        let app = Router::new().route(
            "/:subdomain",
            get(move |Path(subdomain): Path<String>| async move {
                if subdomain == "taken" {
                    return Err(StatusCode::CONFLICT);
                }
                Ok(Json(serde_json::json!({
                    "id": subdomain,
                    "port": tcp_port,
                    "max_conn_count": 1,
                    "url": format!("https://{subdomain}.tunnel.example.net"),
                })))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// 受け取ったバイトをそのまま返すローカルサービス
    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let (mut rd, mut wr) = socket.split();
                    let _ = tokio::io::copy(&mut rd, &mut wr).await;
                });
            }
        });
        addr
    }

    #[test]
    fn missing_max_conn_count_means_one() {
        let info: TunnelInfo =
            serde_json::from_str(r#"{"id":"a","port":1234,"url":"https://a.example"}"#).unwrap();
        assert_eq!(info.connections(), 1);
    }

    #[tokio::test]
    async fn relays_bytes_between_tunnel_and_local_port() {
        let tunnel_tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = fake_tunnel_server(tunnel_tcp.local_addr().unwrap().port()).await;
        let local = echo_server().await;

        let tunnel = Tunnel::open(
            &reqwest::Client::new(),
            &TunnelConfig {
                host,
                subdomain: "heic-converter".into(),
            },
            local,
        )
        .await
        .unwrap();
        assert_eq!(tunnel.info.id, "heic-converter");
        assert_eq!(tunnel.info.url, "https://heic-converter.tunnel.example.net");

        // トンネルサーバー側から見た 1 本目の接続
        let (mut remote, _) = tunnel_tcp.accept().await.unwrap();
        remote.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut buf = [0u8; 18];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET / HTTP/1.1\r\n\r\n");

        tunnel.close().await;
    }

    #[tokio::test]
    async fn refused_registration_is_an_error() {
        let host = fake_tunnel_server(1).await;
        let result = Tunnel::open(
            &reqwest::Client::new(),
            &TunnelConfig {
                host,
                subdomain: "taken".into(),
            },
            "127.0.0.1:9".parse().unwrap(),
        )
        .await;
        assert!(result.is_err());
    }
}
