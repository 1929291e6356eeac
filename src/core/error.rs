//! 控制核心错误类型与结束原因
//!
//! 与 RecoveryEngine 配合：根据 BotError 决定短重试 / 长重试 / 结束本局 / 重启客户端。
//! FinishReason 由错误按固定顺序匹配得出，用于遥测与统计。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 控制核心运行过程中可能出现的错误（血量危机、卡死、菜单超时、客户端故障等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BotError {
    /// 血量低于阈值，紧急撤离
    #[error("chicken: low health")]
    Chicken,

    /// 佣兵血量低于阈值，紧急撤离
    #[error("mercenary chicken: low mercenary health")]
    MercChicken,

    #[error("character died")]
    Died,

    #[error("character idle for {0:?}, aborting game")]
    Idle(Duration),

    #[error("character stuck at the same position for {0:?}")]
    Stuck(Duration),

    #[error("failed to equip items: {0}")]
    EquipFailure(String),

    #[error("return to town failed: {0}")]
    TownReturnFailed(String),

    #[error("max game length reached after {0:?}")]
    MaxGameLength(Duration),

    /// 会话级 deadline（tokio timeout）触发
    #[error("session deadline exceeded")]
    DeadlineExceeded,

    /// 单次菜单调用超过 menu_action_timeout
    #[error("menu action '{action}' timed out after {timeout:?}")]
    MenuActionTimeout {
        action: &'static str,
        timeout: Duration,
    },

    #[error("out of game for more than {0:?}")]
    NotInGameTimeout(Duration),

    /// 加载画面、菜单空闲等可原地重试的状态
    #[error("transient menu state: {0}")]
    MenuTransient(String),

    #[error("menu error: {0}")]
    Menu(String),

    /// 需要强杀客户端并由上层完整重启
    #[error("unrecoverable client state: {0}")]
    Unrecoverable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("client error: {0}")]
    Client(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// 属于「致命到客户端」的错误：强杀进程并向调用方返回
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            BotError::Unrecoverable(_)
                | BotError::MenuActionTimeout { .. }
                | BotError::NotInGameTimeout(_)
        )
    }

    /// 基于时长的正常结束，日志里不展开细节
    pub fn is_deadline(&self) -> bool {
        matches!(self, BotError::DeadlineExceeded | BotError::MaxGameLength(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::MenuTransient(_))
    }
}

/// 一次 Run 或一局游戏的结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Ok,
    Chicken,
    MercChicken,
    Died,
    Error,
}

impl FinishReason {
    /// 按固定顺序匹配：Chicken、MercChicken、Died，其余已知的中止原因与未知错误都归为 Error
    pub fn from_error(err: &BotError) -> Self {
        match err {
            BotError::Chicken => FinishReason::Chicken,
            BotError::MercChicken => FinishReason::MercChicken,
            BotError::Died => FinishReason::Died,
            BotError::Idle(_) | BotError::Stuck(_) | BotError::EquipFailure(_) => {
                FinishReason::Error
            }
            _ => FinishReason::Error,
        }
    }

    pub fn from_result<T>(result: &Result<T, BotError>) -> Self {
        match result {
            Ok(_) => FinishReason::Ok,
            Err(e) => Self::from_error(e),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Ok => "ok",
            FinishReason::Chicken => "chicken",
            FinishReason::MercChicken => "merc_chicken",
            FinishReason::Died => "died",
            FinishReason::Error => "error",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
