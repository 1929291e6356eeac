//! 活动记录与空闲判定
//!
//! ActivityTracker 由每个职责在完成有效动作后写入，供卡死看门狗读取；
//! IdleMonitor 是健康职责本地持有的「长时间未显著移动」判定。

use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;

use crate::world::Position;

/// 活动快照
#[derive(Debug, Clone, Copy)]
pub struct ActivitySnapshot {
    pub last_activity: Instant,
    pub last_known_position: Option<Position>,
    pub last_position_check: Option<Instant>,
}

/// 线程安全的活动记录（单锁）
#[derive(Debug)]
pub struct ActivityTracker {
    inner: RwLock<ActivitySnapshot>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ActivitySnapshot {
                last_activity: Instant::now(),
                last_known_position: None,
                last_position_check: None,
            }),
        }
    }

    /// 每局开始时清空
    pub fn reset(&self) {
        *self.write() = ActivitySnapshot {
            last_activity: Instant::now(),
            last_known_position: None,
            last_position_check: None,
        };
    }

    /// 记录一次活动；只有非零坐标才会更新位置字段
    pub fn record(&self, position: Position) {
        let now = Instant::now();
        let mut snap = self.write();
        snap.last_activity = now;
        if position.is_valid() {
            snap.last_known_position = Some(position);
            snap.last_position_check = Some(now);
        }
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        *self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ActivitySnapshot> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// 单次空闲判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleVerdict {
    /// 位移达到阈值，计时器已重置
    Moved,
    /// 尚未超时，附带距上次显著移动的时长
    Idle(Duration),
    Exceeded(Duration),
}

/// 长时间空闲判定：位移 ≥ 阈值重置计时，否则累计到上限后判定超时
#[derive(Debug, Clone)]
pub struct IdleMonitor {
    anchor: Option<Position>,
    since: Instant,
    movement_threshold: f64,
    max_idle: Duration,
}

impl IdleMonitor {
    pub fn new(movement_threshold: f64, max_idle: Duration, now: Instant) -> Self {
        Self {
            anchor: None,
            since: now,
            movement_threshold,
            max_idle,
        }
    }

    pub fn observe(&mut self, position: Position, now: Instant) -> IdleVerdict {
        if position.is_valid() {
            let moved = match self.anchor {
                None => true,
                Some(anchor) => anchor.distance(&position) >= self.movement_threshold,
            };
            if moved {
                self.anchor = Some(position);
                self.since = now;
                return IdleVerdict::Moved;
            }
        }
        let idle = now.saturating_duration_since(self.since);
        if idle > self.max_idle {
            IdleVerdict::Exceeded(idle)
        } else {
            IdleVerdict::Idle(idle)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(now: Instant) -> IdleMonitor {
        IdleMonitor::new(30.0, Duration::from_secs(120), now)
    }

    #[test]
    fn test_record_ignores_zeroed_position() {
        let tracker = ActivityTracker::new();
        tracker.record(Position::new(100, 100));
        tracker.record(Position::default());
        let snap = tracker.snapshot();
        assert_eq!(snap.last_known_position, Some(Position::new(100, 100)));
    }

    #[test]
    fn test_reset_clears_position() {
        let tracker = ActivityTracker::new();
        tracker.record(Position::new(1, 1));
        tracker.reset();
        assert!(tracker.snapshot().last_known_position.is_none());
    }

    #[test]
    fn test_large_movement_resets_timer_same_tick() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        assert_eq!(m.observe(Position::new(100, 100), t0), IdleVerdict::Moved);
        let later = t0 + Duration::from_secs(119);
        assert_eq!(m.observe(Position::new(130, 100), later), IdleVerdict::Moved);
        // 计时从 later 重新开始
        let after = later + Duration::from_secs(60);
        assert_eq!(
            m.observe(Position::new(131, 100), after),
            IdleVerdict::Idle(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_small_movement_for_two_minutes_exceeds() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.observe(Position::new(100, 100), t0);
        let mut now = t0;
        for step in 1..=24 {
            now = t0 + Duration::from_secs(step * 5);
            let verdict = m.observe(Position::new(100 + (step % 2) as i32 * 29, 100), now);
            assert!(matches!(verdict, IdleVerdict::Idle(_)), "step {step}");
        }
        let verdict = m.observe(Position::new(110, 100), now + Duration::from_secs(1));
        assert_eq!(verdict, IdleVerdict::Exceeded(Duration::from_secs(121)));
    }

    #[test]
    fn test_zeroed_reads_do_not_reset() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.observe(Position::new(100, 100), t0);
        let verdict = m.observe(Position::default(), t0 + Duration::from_secs(121));
        assert!(matches!(verdict, IdleVerdict::Exceeded(_)));
    }
}
