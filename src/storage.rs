// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测记录持久化接口 + 两个参考实现 (内存 / JSON-lines 文件)

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::detection::DetectionCounts;

/// 一条检测记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub person_count: u32,
    pub vehicle_count: u32,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, counts: DetectionCounts) -> Self {
        Self {
            timestamp,
            person_count: counts.person,
            vehicle_count: counts.vehicle,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("存储读写失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("记录序列化失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

/// 持久化边界: 只追加, 按时间倒序读取
pub trait DetectionStore: Send + Sync {
    fn insert(&self, entry: &LogEntry) -> Result<(), StoreError>;
    /// 最近 `limit` 条, 最新的在前
    fn read_recent(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError>;
}

/// 内存存储, 超过容量时丢弃最旧的记录
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl DetectionStore for MemoryStore {
    fn insert(&self, entry: &LogEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        Ok(())
    }

    fn read_recent(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}

/// 从文件尾部倒读的块大小
const TAIL_CHUNK: u64 = 8 * 1024;

/// JSON-lines 文件存储, 每行一条记录
///
/// 读取最近记录时从文件尾部倒读, 代价只与 `limit` 有关.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DetectionStore for JsonlStore {
    fn insert(&self, entry: &LogEntry) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn read_recent(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut pos = file.metadata()?.len();
        // 上一块开头不完整的行
        let mut carry: Vec<u8> = Vec::new();
        while pos > 0 && entries.len() < limit {
            let start = pos.saturating_sub(TAIL_CHUNK);
            let mut buf = vec![0u8; (pos - start) as usize];
            file.seek(SeekFrom::Start(start))?;
            file.read_exact(&mut buf)?;
            buf.extend_from_slice(&carry);
            pos = start;

            let mut lines = buf.split(|&b| b == b'\n');
            let head = if pos > 0 { lines.next() } else { None };
            let complete: Vec<&[u8]> = lines.collect();
            for line in complete.into_iter().rev() {
                if entries.len() == limit {
                    break;
                }
                let text = String::from_utf8_lossy(line);
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(text) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("跳过损坏的记录 {}: {}", self.path.display(), e),
                }
            }
            carry = head.map(<[u8]>::to_vec).unwrap_or_default();
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(sec: i64, person: u32, vehicle: u32) -> LogEntry {
        LogEntry {
            timestamp: Utc.timestamp_opt(1_700_000_000 + sec, 0).unwrap(),
            person_count: person,
            vehicle_count: vehicle,
        }
    }

    #[test]
    fn test_memory_store_recent_first() {
        let store = MemoryStore::new(3);
        for i in 0..5 {
            store.insert(&entry(i, i as u32, 0)).unwrap();
        }
        assert_eq!(store.len(), 3);
        let recent = store.read_recent(2).unwrap();
        assert_eq!(recent, vec![entry(4, 4, 0), entry(3, 3, 0)]);
    }

    #[test]
    fn test_jsonl_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("instance/detections.jsonl"));
        assert!(store.read_recent(50).unwrap().is_empty());

        store.insert(&entry(0, 1, 2)).unwrap();
        store.insert(&entry(5, 3, 4)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(store.path())
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();
        store.insert(&entry(10, 5, 6)).unwrap();

        let recent = store.read_recent(50).unwrap();
        assert_eq!(recent, vec![entry(10, 5, 6), entry(5, 3, 4), entry(0, 1, 2)]);
        assert_eq!(store.read_recent(1).unwrap(), vec![entry(10, 5, 6)]);
    }

    #[test]
    fn test_jsonl_store_reads_from_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("detections.jsonl"));
        // 多个读取块, 有记录跨越块边界
        for i in 0..2000 {
            store.insert(&entry(i, i as u32, 1)).unwrap();
        }

        let recent = store.read_recent(50).unwrap();
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0], entry(1999, 1999, 1));
        assert_eq!(recent[49], entry(1950, 1950, 1));

        let all = store.read_recent(5000).unwrap();
        assert_eq!(all.len(), 2000);
        assert!(all.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
        assert_eq!(all[1999], entry(0, 0, 1));
        assert!(store.read_recent(0).unwrap().is_empty());
    }

    #[test]
    fn test_log_entry_json_shape() {
        let v = serde_json::to_value(entry(0, 2, 1)).unwrap();
        assert_eq!(v["person_count"], 2);
        assert_eq!(v["vehicle_count"], 1);
        assert_eq!(v["ts"], "2023-11-14T22:13:20Z");
    }
}
