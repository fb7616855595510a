// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::detection::DetectionCounts;
use crate::storage::{DetectionStore, LogEntry};

/// 写入失败后的最短重试间隔
const RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Marks {
    /// 上次成功写入
    written: Option<Instant>,
    /// 上次失败的尝试
    failed: Option<Instant>,
}

/// 限频写入: 距上次成功写入超过 `interval` 才写一条
///
/// 失败不推进写入时间; 存储持续不可用时最多每 `min(interval, 1s)` 重试一次.
pub struct ThrottledLogger {
    store: Arc<dyn DetectionStore>,
    interval: Duration,
    marks: Mutex<Marks>,
}

impl ThrottledLogger {
    pub fn new(store: Arc<dyn DetectionStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            marks: Mutex::new(Marks::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn store(&self) -> &Arc<dyn DetectionStore> {
        &self.store
    }

    /// 返回是否写入了记录; 写入失败只记录日志
    pub fn observe(&self, counts: DetectionCounts, now: Instant) -> bool {
        let mut marks = self.marks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = marks.written {
            if now.saturating_duration_since(prev) <= self.interval {
                return false;
            }
        }
        if let Some(prev) = marks.failed {
            if now.saturating_duration_since(prev) < self.interval.min(RETRY_AFTER) {
                return false;
            }
        }

        let entry = LogEntry::new(Utc::now(), counts);
        match self.store.insert(&entry) {
            Ok(()) => {
                marks.written = Some(now);
                marks.failed = None;
                debug!(
                    "记录检测结果: person={} vehicle={}",
                    counts.person, counts.vehicle
                );
                true
            }
            Err(e) => {
                marks.failed = Some(now);
                warn!("检测记录写入失败: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 前 `failures` 次写入失败, 之后写入内存
    struct FailingStore {
        attempts: AtomicUsize,
        failures: usize,
        inner: MemoryStore,
    }

    impl FailingStore {
        fn new(failures: usize) -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                failures,
                inner: MemoryStore::default(),
            }
        }
    }

    impl DetectionStore for FailingStore {
        fn insert(&self, entry: &LogEntry) -> Result<(), StoreError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.insert(entry)
        }

        fn read_recent(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError> {
            self.inner.read_recent(limit)
        }
    }

    fn counts(person: u32) -> DetectionCounts {
        DetectionCounts { person, vehicle: 0 }
    }

    #[test]
    fn test_at_most_one_write_per_interval() {
        let store = Arc::new(MemoryStore::default());
        let logger = ThrottledLogger::new(store.clone(), Duration::from_secs(5));
        let t0 = Instant::now();

        // 12 秒内每 10ms 一次观测
        let mut written = 0;
        for i in 0..1200u64 {
            if logger.observe(counts(i as u32), t0 + Duration::from_millis(i * 10)) {
                written += 1;
            }
        }
        // t=0, t=5.01, t=10.02
        assert_eq!(written, 3);
        assert_eq!(store.len(), 3);

        let recent = store.read_recent(10).unwrap();
        assert_eq!(recent[0].person_count, 1002);
        assert_eq!(recent[2].person_count, 0);
    }

    #[test]
    fn test_exact_interval_not_written() {
        let store = Arc::new(MemoryStore::default());
        let logger = ThrottledLogger::new(store.clone(), Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(logger.observe(counts(1), t0));
        assert!(!logger.observe(counts(1), t0 + Duration::from_secs(5)));
        assert!(logger.observe(counts(1), t0 + Duration::from_millis(5001)));
    }

    #[test]
    fn test_failing_store_swallowed() {
        let store = Arc::new(FailingStore::new(usize::MAX));
        let logger = ThrottledLogger::new(store.clone(), Duration::from_secs(5));
        let t0 = Instant::now();
        for i in 0..10u64 {
            assert!(!logger.observe(counts(1), t0 + Duration::from_secs(i)));
        }
        // 失败不更新写入时间, 每秒都会重试
        assert_eq!(store.attempts.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_failing_store_retried_once_per_second() {
        let store = Arc::new(FailingStore::new(3));
        let logger = ThrottledLogger::new(store.clone(), Duration::from_secs(5));
        let t0 = Instant::now();

        // 每帧 10ms: t=0, 1s, 2s 失败, t=3s 写入成功, 之后按 5 秒间隔
        let written: Vec<u64> = (0..500u64)
            .filter(|i| logger.observe(counts(1), t0 + Duration::from_millis(i * 10)))
            .collect();
        assert_eq!(written, vec![300]);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(store.inner.len(), 1);
    }
}
