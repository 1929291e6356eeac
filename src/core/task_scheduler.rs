//! 职责调度：一局游戏内的四个并发职责
//!
//! 任意一个职责结束（无论成功或失败）即取消其余职责，第一个结束者的结果就是本局结果。
//! 取消后等待全部职责退出，再释放客户端输入，保证之后不再有输入发出。

use futures_util::future::{BoxFuture, FutureExt};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::core::BotError;
use crate::duty::{data_sync, health, maintenance, DutyContext, RunQueue};

/// 职责类型
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Duty {
    /// 世界快照刷新
    DataSync,
    /// 血量与空闲看门狗
    Health,
    /// 高优先级维护
    Maintenance,
    /// 按顺序执行 Run
    RunExecutor,
}

impl Duty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Duty::DataSync => "data_sync",
            Duty::Health => "health",
            Duty::Maintenance => "maintenance",
            Duty::RunExecutor => "run_executor",
        }
    }
}

impl std::fmt::Display for Duty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一局的职责调度器，消费自身运行一次
pub struct DutyScheduler {
    ctx: DutyContext,
    queue: RunQueue,
}

impl DutyScheduler {
    pub fn new(ctx: DutyContext, queue: RunQueue) -> Self {
        Self { ctx, queue }
    }

    pub async fn run(self) -> Result<(), BotError> {
        let Self { ctx, queue } = self;

        ctx.arbiter.reset();
        ctx.activity.reset();
        // 首次同步刷新，保证各职责第一个 tick 看到的不是空快照
        match ctx.collab.world.refresh().await {
            Ok(state) => ctx.world.replace(state),
            Err(e) => tracing::debug!("Initial world refresh failed: {}", e),
        }

        let started = Instant::now();
        let duties: Vec<(Duty, BoxFuture<'static, Result<(), BotError>>)> = vec![
            (Duty::DataSync, data_sync::run(ctx.clone()).boxed()),
            (Duty::Health, health::run(ctx.clone(), started).boxed()),
            (Duty::Maintenance, maintenance::run(ctx.clone()).boxed()),
            (Duty::RunExecutor, {
                let ctx = ctx.clone();
                async move { queue.execute(&ctx).await }.boxed()
            }),
        ];

        let mut set = JoinSet::new();
        for (duty, fut) in duties {
            let cancel = ctx.cancel.clone();
            let arbiter = ctx.arbiter.clone();
            set.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(BotError::Cancelled),
                    r = fut => r,
                };
                arbiter.stop();
                cancel.cancel();
                (duty, result)
            });
        }

        let first = set.join_next().await;
        ctx.cancel.cancel();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((duty, Err(e))) if e != BotError::Cancelled => {
                    tracing::debug!("Duty {} also ended with: {}", duty, e)
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Duty task panicked during drain: {}", e),
            }
        }
        ctx.arbiter.stop();
        ctx.collab.process.detach();

        match first {
            Some(Ok((duty, result))) => {
                match &result {
                    Ok(()) => tracing::info!("Game ended: duty {} completed", duty),
                    Err(e) => tracing::info!("Game ended: duty {} returned {}", duty, e),
                }
                result
            }
            Some(Err(e)) => Err(BotError::Internal(format!("duty task failed: {e}"))),
            None => Ok(()),
        }
    }
}
