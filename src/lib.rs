//! Hireling - 游戏客户端自动化控制核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与回写
//! - **core**: 优先级仲裁、职责调度、会话监管、看门狗、错误分类与恢复
//! - **client**: 外部协作者接口（世界读取、菜单、动作、进程）与模拟实现
//! - **duty**: 一局游戏内并发运行的四个职责
//! - **events**: 生命周期遥测事件
//! - **observability**: 日志初始化
//! - **world**: 世界快照

pub mod client;
pub mod config;
pub mod core;
pub mod duty;
pub mod events;
pub mod observability;
pub mod world;

pub use crate::core::{BotError, SessionSupervisor, SupervisorBuilder, SupervisorHandle};
