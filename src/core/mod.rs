//! 控制核心：错误与恢复、优先级仲裁、活动记录、状态投影、职责调度、会话监管、看门狗

pub mod activity;
pub mod builder;
pub mod error;
pub mod priority;
pub mod recovery;
pub mod session_supervisor;
pub mod shutdown;
pub mod state;
pub mod task_scheduler;
pub mod watchdog;

pub use activity::{ActivitySnapshot, ActivityTracker, IdleMonitor, IdleVerdict};
pub use builder::SupervisorBuilder;
pub use error::{BotError, FinishReason};
pub use priority::{ExecutionPriority, PriorityArbiter, YieldPoint};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use session_supervisor::{SessionSupervisor, SupervisorHandle};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{
    next_menu_action, ClientPredicates, MenuAction, MenuCounters, MenuMode, SessionPhase,
    SupervisorStatus, MAX_GAME_CREATE_ATTEMPTS, MAX_MODAL_DISMISS_ATTEMPTS,
};
pub use task_scheduler::{Duty, DutyScheduler};
pub use watchdog::StuckDetector;
