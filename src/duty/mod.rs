//! 一局游戏内并发运行的四个职责
//!
//! - **data_sync**: 每个 tick 刷新世界快照（Background）
//! - **health**: 血量管理 + 空闲 / 单局时长判定（Background）
//! - **maintenance**: 提升到 High 执行固定顺序的维护动作，结束前恢复 Normal
//! - **runs**: 按顺序执行 Run 列表（Normal），由目标完成驱动而不是 tick

pub mod data_sync;
pub mod health;
pub mod maintenance;
pub mod policy;
pub mod runs;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::Collaborators;
use crate::config::AppConfig;
use crate::core::{ActivityTracker, ExecutionPriority, PriorityArbiter, ShutdownManager, SupervisorStatus, YieldPoint};
use crate::events::{Event, EventKind};
use crate::world::SharedWorld;

pub use policy::{belt_refill_decision, gold_threshold, town_trip_reason, BeltDecision, TownTripReason};
pub use runs::RunQueue;

/// 职责共享的一局上下文：显式注入，而不是全局变量
#[derive(Clone)]
pub struct DutyContext {
    pub session_id: String,
    pub config: Arc<AppConfig>,
    pub arbiter: Arc<PriorityArbiter>,
    pub activity: Arc<ActivityTracker>,
    pub world: SharedWorld,
    pub collab: Collaborators,
    pub shutdown: ShutdownManager,
    /// 本局取消域
    pub cancel: CancellationToken,
    pub status: Arc<watch::Sender<SupervisorStatus>>,
}

impl DutyContext {
    /// 固定 tick；错过的 tick 顺延，不补发
    pub fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.config.scheduler.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    pub fn yield_point(&self, level: ExecutionPriority) -> YieldPoint {
        YieldPoint::new(
            self.arbiter.clone(),
            level,
            self.cancel.clone(),
            self.config.scheduler.tick(),
        )
    }

    pub fn emit(&self, kind: EventKind) {
        self.collab.events.emit(Event::new(self.session_id.clone(), kind));
    }

    pub fn set_current_run(&self, run: Option<String>) {
        self.status.send_modify(|s| s.current_run = run);
    }
}
