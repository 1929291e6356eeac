//! 看门狗：有界子任务、局外总时长、局内卡死检测
//!
//! 看门狗一旦触发就升级为破坏性恢复（强杀客户端），不做静默重试。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::ClientProcess;
use crate::core::{ActivityTracker, BotError, PriorityArbiter};
use crate::world::Position;

/// 在独立任务里执行一次可能挂起的客户端调用，与计时器赛跑且优先计时器。
///
/// 超时后放弃（不终止）该调用：句柄被丢弃，任务在后台自行结束，结果被忽略。
pub async fn bounded<T, F>(action: &'static str, limit: Duration, fut: F) -> Result<T, BotError>
where
    F: Future<Output = Result<T, BotError>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(fut);
    tokio::select! {
        biased;
        _ = tokio::time::sleep(limit) => {
            tracing::warn!("Menu action '{}' did not return within {:?}", action, limit);
            Err(BotError::MenuActionTimeout { action, timeout: limit })
        }
        joined = handle => match joined {
            Ok(result) => result,
            Err(e) => Err(BotError::Internal(format!("menu action '{action}' task failed: {e}"))),
        },
    }
}

/// 局外总时长守卫：无论卡在哪一步（包括状态读取冻结），超时即强杀客户端
pub async fn guard_not_in_game<T, F>(
    limit: Duration,
    process: &dyn ClientProcess,
    fut: F,
) -> Result<T, BotError>
where
    F: Future<Output = Result<T, BotError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Spent more than {:?} outside a game, killing client", limit);
            if let Err(e) = process.kill() {
                tracing::warn!("Failed to kill client: {}", e);
            }
            Err(BotError::NotInGameTimeout(limit))
        }
    }
}

/// 精确位置不变的持续时间判定；同一段静止只触发一次
#[derive(Debug, Clone)]
pub struct StuckDetector {
    max: Duration,
    last: Option<Position>,
    since: Instant,
    fired: bool,
}

impl StuckDetector {
    pub fn new(max: Duration, now: Instant) -> Self {
        Self {
            max,
            last: None,
            since: now,
            fired: false,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = None;
        self.since = now;
        self.fired = false;
    }

    /// 返回 true 表示本次观察触发了卡死
    pub fn observe(&mut self, position: Option<Position>, now: Instant) -> bool {
        let Some(position) = position else {
            self.reset(now);
            return false;
        };
        if self.last != Some(position) {
            self.last = Some(position);
            self.since = now;
            self.fired = false;
            return false;
        }
        if !self.fired && now.saturating_duration_since(self.since) >= self.max {
            self.fired = true;
            return true;
        }
        false
    }
}

/// 局内卡死看门狗，与职责调度并行运行。
///
/// 触发时强杀客户端并取消本局，返回 true；本局正常结束（token 被取消）时返回 false。
pub async fn stuck_watchdog(
    activity: Arc<ActivityTracker>,
    arbiter: Arc<PriorityArbiter>,
    process: Arc<dyn ClientProcess>,
    session: CancellationToken,
    interval: Duration,
    max_stuck: Duration,
) -> bool {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    let mut detector = StuckDetector::new(max_stuck, Instant::now());
    loop {
        tokio::select! {
            _ = session.cancelled() => return false,
            _ = ticker.tick() => {}
        }
        let now = Instant::now();
        if arbiter.is_paused() {
            detector.reset(now);
            continue;
        }
        let snap = activity.snapshot();
        if detector.observe(snap.last_known_position, now) {
            tracing::error!(
                "Character has not moved for {:?}, killing client",
                max_stuck
            );
            if let Err(e) = process.kill() {
                tracing::warn!("Failed to kill client: {}", e);
            }
            session.cancel();
            return true;
        }
    }
}
