// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 最新计数快照 + 报警规则

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detection::DetectionCounts;

pub const PERSON_ALARM_THRESHOLD: u32 = 5;
pub const VEHICLE_ALARM_THRESHOLD: u32 = 10;
pub const PERSON_ALARM: &str = "Kişi sayısı 5 ve üzerinde!";
pub const VEHICLE_ALARM: &str = "Araç sayısı 10 ve üzerinde!";

/// 报警状态, 每帧按计数重新计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Alarms {
    pub person: bool,
    pub vehicle: bool,
}

impl Alarms {
    pub fn evaluate(person_count: u32, vehicle_count: u32) -> Self {
        Self {
            person: person_count >= PERSON_ALARM_THRESHOLD,
            vehicle: vehicle_count >= VEHICLE_ALARM_THRESHOLD,
        }
    }

    /// 报警文本, 人员在前, `" | "` 连接; 无报警返回 None
    pub fn message(&self) -> Option<String> {
        let mut parts = Vec::with_capacity(2);
        if self.person {
            parts.push(PERSON_ALARM);
        }
        if self.vehicle {
            parts.push(VEHICLE_ALARM);
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        }
    }
}

/// 计数快照, 整体原子替换
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub person_count: u32,
    pub vehicle_count: u32,
    pub timestamp: DateTime<Utc>,
    /// 是否有运行中的采集循环
    pub active: bool,
}

impl StateSnapshot {
    pub fn inactive(timestamp: DateTime<Utc>) -> Self {
        Self {
            person_count: 0,
            vehicle_count: 0,
            timestamp,
            active: false,
        }
    }

    pub fn alarms(&self) -> Alarms {
        Alarms::evaluate(self.person_count, self.vehicle_count)
    }
}

/// 生产者写, 任意读者无锁读取
#[derive(Clone)]
pub struct SharedState {
    current: Arc<ArcSwap<StateSnapshot>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(StateSnapshot::inactive(Utc::now()))),
        }
    }

    pub fn read(&self) -> Arc<StateSnapshot> {
        self.current.load_full()
    }

    /// 发布本帧计数; 时间戳不早于上一个快照
    pub fn publish(&self, counts: DetectionCounts) {
        self.publish_at(counts, Utc::now());
    }

    pub fn publish_at(&self, counts: DetectionCounts, now: DateTime<Utc>) {
        self.current.rcu(|prev| StateSnapshot {
            person_count: counts.person,
            vehicle_count: counts.vehicle,
            timestamp: now.max(prev.timestamp),
            active: true,
        });
    }

    /// 采集循环启动: 计数清零, 标记为活动
    pub fn activate(&self) {
        let now = Utc::now();
        self.current.rcu(|prev| StateSnapshot {
            active: true,
            ..StateSnapshot::inactive(now.max(prev.timestamp))
        });
    }

    /// 采集循环结束: 计数清零
    pub fn clear(&self) {
        let now = Utc::now();
        self.current
            .rcu(|prev| StateSnapshot::inactive(now.max(prev.timestamp)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::thread;

    #[test]
    fn test_alarm_messages() {
        assert_eq!(Alarms::evaluate(4, 9).message(), None);
        assert_eq!(Alarms::evaluate(5, 0).message().as_deref(), Some(PERSON_ALARM));
        assert_eq!(Alarms::evaluate(0, 10).message().as_deref(), Some(VEHICLE_ALARM));
        assert_eq!(
            Alarms::evaluate(6, 12).message().unwrap(),
            "Kişi sayısı 5 ve üzerinde! | Araç sayısı 10 ve üzerinde!"
        );
    }

    #[test]
    fn test_initial_state_inactive() {
        let state = SharedState::new();
        let s = state.read();
        assert!(!s.active);
        assert_eq!((s.person_count, s.vehicle_count), (0, 0));
    }

    #[test]
    fn test_activate_then_clear() {
        let state = SharedState::new();
        state.activate();
        let s = state.read();
        assert!(s.active);
        assert_eq!((s.person_count, s.vehicle_count), (0, 0));
        state.publish(DetectionCounts { person: 3, vehicle: 1 });
        state.clear();
        assert!(!state.read().active);
        assert_eq!(state.read().person_count, 0);
    }

    #[test]
    fn test_timestamp_never_goes_back() {
        let state = SharedState::new();
        let t0 = Utc::now() + Duration::seconds(60);
        state.publish_at(DetectionCounts { person: 1, vehicle: 0 }, t0);
        state.publish_at(DetectionCounts { person: 2, vehicle: 0 }, t0 - Duration::seconds(30));
        let s = state.read();
        assert_eq!(s.person_count, 2);
        assert_eq!(s.timestamp, t0);
        state.clear();
        assert!(state.read().timestamp >= t0);
    }

    #[test]
    fn test_concurrent_reads_never_torn() {
        let state = SharedState::new();
        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..2000u32 {
                    state.publish(DetectionCounts { person: i, vehicle: i });
                }
            })
        };
        let mut last = state.read().timestamp;
        for _ in 0..2000 {
            let s = state.read();
            assert_eq!(s.person_count, s.vehicle_count);
            assert!(s.timestamp >= last);
            last = s.timestamp;
        }
        writer.join().unwrap();
    }
}
