//! JobRegistry - job id → (original CID, processed CID) の対応表
//!
//! # 設計原則
//! - サービスインスタンスが所有する（モジュールレベルのグローバルではない）
//! - 書き込みは完成形の `JobRecord` のみ（半端な Job は観測されない）
//! - 永続化しない。プロセスが再起動すれば消える
//! - TTL を設定した場合、期限切れのエントリは `get` から見えなくなり、GcLoop が掃除する

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::{Cid, JobId, JobRecord};
use crate::ports::Clock;

/// JobRegistry は in-memory の best-effort インデックス
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    clock: Arc<dyn Clock>,
    ttl: Option<chrono::Duration>,
}

impl JobRegistry {
    /// `ttl = None` なら一切 evict しない
    pub fn new(clock: Arc<dyn Clock>, ttl: Option<std::time::Duration>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            clock,
            ttl: ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()),
        }
    }

    pub fn ttl(&self) -> Option<std::time::Duration> {
        self.ttl.and_then(|ttl| ttl.to_std().ok())
    }

    /// Job を登録する（同じ id があれば上書き）
    pub fn put(&self, job_id: JobId, original_cid: Cid, processed_cid: Cid) -> JobRecord {
        let record = JobRecord::new(job_id, original_cid, processed_cid, self.clock.now());
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id, record.clone());
        record
    }

    /// Job を引く。未登録・期限切れは `None`（エラーではない）
    pub fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let record = jobs.get(job_id)?;
        match self.ttl {
            Some(ttl) if record.is_expired(self.clock.now(), ttl) => None,
            _ => Some(record.clone()),
        }
    }

    /// 期限切れのエントリを削除して、削除件数を返す
    pub fn evict_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let now = self.clock.now();
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, record| !record.is_expired(now, ttl));
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, IdGenerator, SystemClock, UlidGenerator};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn new_id() -> JobId {
        UlidGenerator::new(SystemClock).generate_job_id()
    }

    #[test]
    fn put_then_get() {
        let registry = JobRegistry::new(Arc::new(SystemClock), None);
        let id = new_id();

        registry.put(id, Cid::new("orig"), Cid::new("png"));

        let record = registry.get(&id).unwrap();
        assert_eq!(record.original_cid, Cid::new("orig"));
        assert_eq!(record.processed_cid, Cid::new("png"));
    }

    #[test]
    fn unknown_id_is_absent() {
        let registry = JobRegistry::new(Arc::new(SystemClock), None);
        assert!(registry.get(&new_id()).is_none());
    }

    #[test]
    fn put_overwrites_existing() {
        let registry = JobRegistry::new(Arc::new(SystemClock), None);
        let id = new_id();

        registry.put(id, Cid::new("a"), Cid::new("b"));
        registry.put(id, Cid::new("c"), Cid::new("d"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).unwrap().processed_cid, Cid::new("d"));
    }

    #[test]
    fn expired_entries_are_hidden_then_evicted() {
        let clock = fixed_clock();
        let registry = JobRegistry::new(clock.clone(), Some(Duration::from_secs(60)));
        let old = new_id();
        registry.put(old, Cid::new("a"), Cid::new("b"));

        clock.advance(chrono::Duration::seconds(30));
        let fresh = new_id();
        registry.put(fresh, Cid::new("c"), Cid::new("d"));

        clock.advance(chrono::Duration::seconds(30));
        assert!(registry.get(&old).is_none());
        assert!(registry.get(&fresh).is_some());
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.evict_expired(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn without_ttl_nothing_is_evicted() {
        let clock = fixed_clock();
        let registry = JobRegistry::new(clock.clone(), None);
        let id = new_id();
        registry.put(id, Cid::new("a"), Cid::new("b"));

        clock.advance(chrono::Duration::days(365));

        assert_eq!(registry.evict_expired(), 0);
        assert!(registry.get(&id).is_some());
    }

    #[test]
    fn concurrent_puts_keep_every_entry() {
        let registry = Arc::new(JobRegistry::new(Arc::new(SystemClock), None));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.put(new_id(), Cid::new("a"), Cid::new("b"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 800);
    }
}
