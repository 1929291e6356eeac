//! 执行优先级仲裁
//!
//! 全进程同一时刻只有一个 ExecutionPriority 生效。抢占是协作式的：长时间运行的外部动作
//! 通过 YieldPoint 周期性轮询当前优先级，不是自己的级别或处于 Pause 时就原地等待。

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::BotError;

/// 执行优先级（有序：Stop < Pause < Background < Normal < High）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ExecutionPriority {
    Stop,
    Pause,
    Background,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy)]
struct ArbiterState {
    current: ExecutionPriority,
    /// 进入 Pause 前的值，resume 时恢复
    before_pause: ExecutionPriority,
    /// 操作员暂停请求，跨局保留直到 resume
    pause_requested: bool,
}

/// 优先级仲裁器：单锁保护，所有读改写都在一次持锁内完成
#[derive(Debug)]
pub struct PriorityArbiter {
    state: RwLock<ArbiterState>,
}

impl PriorityArbiter {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ArbiterState {
                current: ExecutionPriority::Normal,
                before_pause: ExecutionPriority::Normal,
                pause_requested: false,
            }),
        }
    }

    pub fn current(&self) -> ExecutionPriority {
        self.read().current
    }

    /// 每局开始时重置为 Normal；操作员暂停仍然有效
    pub fn reset(&self) {
        let mut state = self.write();
        state.before_pause = ExecutionPriority::Normal;
        state.current = if state.pause_requested {
            ExecutionPriority::Pause
        } else {
            ExecutionPriority::Normal
        };
    }

    /// 提升优先级。Stop / Pause 期间不生效，也不会借此降低优先级。
    ///
    /// 只有持有仲裁权的职责（维护职责提升到 High）调用。
    pub fn raise(&self, level: ExecutionPriority) -> bool {
        let mut state = self.write();
        if matches!(
            state.current,
            ExecutionPriority::Stop | ExecutionPriority::Pause
        ) || level <= state.current
        {
            return false;
        }
        state.current = level;
        true
    }

    /// 降低优先级，任何职责都可以调用；只会向下移动
    pub fn lower(&self, level: ExecutionPriority) -> bool {
        let mut state = self.write();
        if level >= state.current {
            return false;
        }
        state.current = level;
        true
    }

    /// 操作员暂停；Stop 期间只记录请求，下一局开始时生效
    pub fn pause(&self) -> bool {
        let mut state = self.write();
        state.pause_requested = true;
        match state.current {
            ExecutionPriority::Stop | ExecutionPriority::Pause => false,
            prev => {
                state.before_pause = prev;
                state.current = ExecutionPriority::Pause;
                true
            }
        }
    }

    /// 操作员恢复。High 的持有者在暂停期间已经放弃了本次 tick，最多恢复到 Normal
    pub fn resume(&self) -> bool {
        let mut state = self.write();
        state.pause_requested = false;
        if state.current != ExecutionPriority::Pause {
            return false;
        }
        state.current = state.before_pause.min(ExecutionPriority::Normal);
        true
    }

    pub fn stop(&self) {
        self.write().current = ExecutionPriority::Stop;
    }

    pub fn is_paused(&self) -> bool {
        self.current() == ExecutionPriority::Pause
    }

    pub fn pause_requested(&self) -> bool {
        self.read().pause_requested
    }

    pub fn is_stopped(&self) -> bool {
        self.current() == ExecutionPriority::Stop
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ArbiterState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ArbiterState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PriorityArbiter {
    fn default() -> Self {
        Self::new()
    }
}

/// 让步点：外部长动作（寻路、清怪、等待）持有它并周期性轮询
#[derive(Debug, Clone)]
pub struct YieldPoint {
    arbiter: Arc<PriorityArbiter>,
    own: ExecutionPriority,
    cancel: CancellationToken,
    poll: Duration,
}

impl YieldPoint {
    pub fn new(
        arbiter: Arc<PriorityArbiter>,
        own: ExecutionPriority,
        cancel: CancellationToken,
        poll: Duration,
    ) -> Self {
        Self {
            arbiter,
            own,
            cancel,
            poll,
        }
    }

    pub fn level(&self) -> ExecutionPriority {
        self.own
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.arbiter.is_stopped()
    }

    /// 当前是否轮到自己执行（非 Pause 且优先级等于自身级别）
    pub fn may_proceed(&self) -> bool {
        !self.is_cancelled() && self.arbiter.current() == self.own
    }

    /// 等到轮到自己；取消或 Stop 时返回 Cancelled，调用方不得再发出任何输入
    pub async fn wait_turn(&self) -> Result<(), BotError> {
        loop {
            if self.is_cancelled() {
                return Err(BotError::Cancelled);
            }
            if self.arbiter.current() == self.own {
                return Ok(());
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(BotError::Cancelled),
                _ = tokio::time::sleep(self.poll) => {}
            }
        }
    }
}
