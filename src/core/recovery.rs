//! 错误恢复引擎
//!
//! 根据 BotError 类型返回 RecoveryAction，供菜单循环与会话监管决定是原地重试、结束本局还是重启客户端。
//! 恢复阶梯（由弱到强）：短暂停留重试 → 较长等待重试 → 结束本局 → 强杀客户端并上报不可恢复。

use std::time::Duration;

use crate::core::BotError;

/// 恢复动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 加载画面 / 菜单空闲：短暂等待后在同一状态重试
    RetrySoon(Duration),
    /// 一般菜单错误：较长等待后重试
    RetryLater(Duration),
    /// 结束当前这一局，监管循环继续
    EndSession,
    /// 强杀客户端，把不可恢复信号交给调用方
    RestartClient,
}

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    short_retry: Duration,
    long_retry: Duration,
}

impl RecoveryEngine {
    pub fn new(short_retry: Duration, long_retry: Duration) -> Self {
        Self {
            short_retry,
            long_retry,
        }
    }

    pub fn handle(&self, err: &BotError) -> RecoveryAction {
        if err.is_unrecoverable() {
            return RecoveryAction::RestartClient;
        }
        if err.is_transient() {
            return RecoveryAction::RetrySoon(self.short_retry);
        }
        match err {
            BotError::Menu(_) | BotError::Client(_) => RecoveryAction::RetryLater(self.long_retry),
            BotError::Stuck(_) => RecoveryAction::RestartClient,
            BotError::Chicken
            | BotError::MercChicken
            | BotError::Died
            | BotError::Idle(_)
            | BotError::EquipFailure(_)
            | BotError::TownReturnFailed(_)
            | BotError::MaxGameLength(_)
            | BotError::DeadlineExceeded => RecoveryAction::EndSession,
            _ => RecoveryAction::RetryLater(self.long_retry),
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_transient_retries_soon() {
        let engine = RecoveryEngine::default();
        let action = engine.handle(&BotError::MenuTransient("loading screen".into()));
        assert_eq!(action, RecoveryAction::RetrySoon(Duration::from_millis(500)));
    }

    #[test]
    fn test_recovery_generic_menu_error_retries_later() {
        let engine = RecoveryEngine::default();
        let action = engine.handle(&BotError::Menu("modal dismiss failed".into()));
        assert!(matches!(action, RecoveryAction::RetryLater(_)));
    }

    #[test]
    fn test_recovery_health_crisis_ends_session() {
        let engine = RecoveryEngine::default();
        assert_eq!(engine.handle(&BotError::Died), RecoveryAction::EndSession);
        assert_eq!(engine.handle(&BotError::Chicken), RecoveryAction::EndSession);
    }

    #[test]
    fn test_recovery_timeouts_restart_client() {
        let engine = RecoveryEngine::default();
        let err = BotError::MenuActionTimeout {
            action: "new_game",
            timeout: Duration::from_secs(30),
        };
        assert_eq!(engine.handle(&err), RecoveryAction::RestartClient);
        assert_eq!(
            engine.handle(&BotError::Unrecoverable("modal".into())),
            RecoveryAction::RestartClient
        );
    }
}
