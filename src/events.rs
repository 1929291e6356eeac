//! 生命周期遥测事件：建局、Run 开始/结束、整局结束
//!
//! EventSink::emit 是「发出即忘」：不得阻塞或让控制核心失败。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::FinishReason;

/// 单条遥测事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    GameCreated {
        game_name: Option<String>,
        runs: Vec<String>,
    },
    RunStarted {
        run: String,
    },
    RunFinished {
        run: String,
        reason: FinishReason,
    },
    GameFinished {
        reason: FinishReason,
        duration_ms: u64,
        error: Option<String>,
        /// 失败时的截图路径
        screenshot: Option<String>,
    },
    /// 首局检测到缺失的按键绑定，已暂停等待操作员处理
    BindingsMissing {
        bindings: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub session_id: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(session_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            session_id: session_id.into(),
            at: Utc::now(),
            kind,
        }
    }

    pub fn game_finished(
        session_id: &str,
        reason: FinishReason,
        duration: Duration,
        error: Option<String>,
        screenshot: Option<String>,
    ) -> Self {
        Self::new(
            session_id,
            EventKind::GameFinished {
                reason,
                duration_ms: duration.as_millis() as u64,
                error,
                screenshot,
            },
        )
    }
}

/// 事件接收端
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// 通道实现：发送失败（接收端已关闭）直接丢弃
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

/// 创建通道事件接收端
pub fn channel() -> (ChannelSink, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

/// 日志实现：每个事件输出一行结构化 JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(event = %json, "telemetry"),
            Err(e) => tracing::debug!("Failed to serialize telemetry event: {}", e),
        }
    }
}
