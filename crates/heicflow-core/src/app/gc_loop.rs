//! GcLoop - 期限切れ Job のガベージコレクション
//!
//! # フロー
//! 1. `interval` ごとに JobRegistry::evict_expired() を呼ぶ
//! 2. shutdown が来たら抜ける
//!
//! shutdown は `watch` チャネルで通知する（Sender を drop しても止まる）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::registry::JobRegistry;

/// GcLoop のハンドル
pub struct GcLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl GcLoop {
    /// TTL から掃除間隔を決める（ttl / 4、最小 1 秒）
    pub fn interval_for(ttl: Duration) -> Duration {
        (ttl / 4).max(Duration::from_secs(1))
    }

    /// ループを起動する
    pub fn spawn(registry: Arc<JobRegistry>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let evicted = registry.evict_expired();
                        if evicted > 0 {
                            debug!(evicted, remaining = registry.len(), "evicted expired jobs");
                        }
                    }
                }
            }
        });

        Self { shutdown_tx, join }
    }

    /// 停止して終了を待つ
    pub async fn shutdown_and_join(self) {
        // ignore send error: receiver may already be dropped
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}
