//! CLI 引数と環境変数
//!
//! すべてのフラグは環境変数でも指定できる（フラグが優先）。

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use heicflow_core::app::DEFAULT_MAX_UPLOAD_BYTES;
use heicflow_core::domain::BucketId;

#[derive(Parser, Debug)]
#[command(name = "heicflow", version, about = "HEIC to PNG conversion service with content-addressed storage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Print a freshly generated, encrypted wallet JSON
    Keygen(KeygenArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Local listen port
    #[arg(long, env = "PORT", default_value_t = 3030)]
    pub port: u16,

    /// Local listen address
    #[arg(long, env = "BIND_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Path to the wallet JSON holding the signing key
    #[arg(long, env = "WALLET_CREDS_PATH")]
    pub wallet: PathBuf,

    /// Passphrase that decrypts the wallet
    #[arg(long, env = "CERE_PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,

    /// Bucket the original and converted images are stored in
    #[arg(long, env = "CERE_BUCKET_ID")]
    pub bucket_id: BucketId,

    /// Where objects are stored
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value_t = StorageBackend::Http)]
    pub storage: StorageBackend,

    /// Signed-HTTP storage node (required for `--storage http`)
    #[arg(long, env = "STORAGE_NODE_URL")]
    pub node_url: Option<String>,

    /// Base URL used to build retrieval links
    #[arg(long, env = "STORAGE_GATEWAY_URL")]
    pub gateway_url: String,

    /// Deployment label forwarded to the storage node, if it serves several
    #[arg(long, env = "STORAGE_NETWORK")]
    pub network: Option<String>,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Seconds a job stays resolvable (0 = never evict)
    #[arg(long, env = "JOB_TTL_SECS", default_value_t = 86_400)]
    pub job_ttl_secs: u64,

    #[arg(long, env = "APP_ENV", value_enum, default_value_t = Environment::Development)]
    pub environment: Environment,

    #[arg(long, env = "HEIC_CONVERTER", value_enum, default_value_t = ConverterKind::Command)]
    pub converter: ConverterKind,

    /// External decoder used by `--converter command`
    #[arg(long, env = "HEIF_DEC_PATH", default_value = "heif-dec")]
    pub heif_dec_path: PathBuf,

    /// localtunnel-compatible server
    #[arg(long, env = "TUNNEL_HOST", requires = "tunnel_subdomain")]
    pub tunnel_host: Option<String>,

    #[arg(long, env = "TUNNEL_SUBDOMAIN", requires = "tunnel_host")]
    pub tunnel_subdomain: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct KeygenArgs {
    /// Passphrase the new wallet is encrypted with
    #[arg(long, env = "CERE_PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,
}

/// 実行環境。production では想定外エラーの詳細を隠す
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Signed-HTTP storage node
    Http,
    /// In-process store; objects are lost on restart
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConverterKind {
    /// In-process libheif (requires the `libheif` feature)
    Libheif,
    /// External `heif-dec` process
    Command,
}

/// トンネル接続先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub host: String,
    pub subdomain: String,
}

impl ServeArgs {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// 0 は「無期限」
    pub fn job_ttl(&self) -> Option<Duration> {
        (self.job_ttl_secs > 0).then(|| Duration::from_secs(self.job_ttl_secs))
    }

    pub fn expose_errors(&self) -> bool {
        self.environment != Environment::Production
    }

    pub fn tunnel(&self) -> Option<TunnelConfig> {
        match (&self.tunnel_host, &self.tunnel_subdomain) {
            (Some(host), Some(subdomain)) => Some(TunnelConfig {
                host: host.clone(),
                subdomain: subdomain.clone(),
            }),
            _ => None,
        }
    }
}
