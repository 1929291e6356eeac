//! 停止信号处理
//!
//! 统一的停止信号：操作员（Ctrl+C / SIGTERM / stop 命令）与维护职责（等级上限）都通过
//! ShutdownManager 请求停止，监管循环在当前这一局退出后返回。

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 停止信号管理器
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    /// 根取消 token，监管与每局的 token 都从它派生
    shutdown_token: CancellationToken,
    /// 停止原因广播
    reason_tx: broadcast::Sender<ShutdownReason>,
    /// 第一个停止原因
    first_reason: Arc<Mutex<Option<ShutdownReason>>>,
}

/// 停止原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 操作员发起（Ctrl+C 或 stop 命令）
    UserInitiated,
    /// SIGTERM 信号
    Signal,
    /// 角色达到配置的等级上限
    LevelCapReached(u32),
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(4);
        Self {
            shutdown_token: CancellationToken::new(),
            reason_tx,
            first_reason: Arc::new(Mutex::new(None)),
        }
    }

    /// 获取根 token（用于派生监管 / 每局的子 token）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 请求停止；只记录第一个原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        {
            let mut first = self
                .first_reason
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if first.is_none() {
                *first = Some(reason.clone());
            }
        }
        let _ = self.reason_tx.send(reason);
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.first_reason
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 订阅停止原因
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, stopping after the current game...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, stopping after the current game...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
