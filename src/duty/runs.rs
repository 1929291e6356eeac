//! Run 执行职责：按顺序执行本局的 Run 列表
//!
//! 每个 Run 开始前等待 Normal 优先级，结束后发出遥测；任何错误都结束整个列表（并结束本局）。

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::client::{RunCatalog, RunUnit};
use crate::config::AppConfig;
use crate::core::{BotError, ExecutionPriority, FinishReason};
use crate::duty::DutyContext;
use crate::events::EventKind;

/// 本局要执行的 Run 列表，顺序在建局时固定
#[derive(Clone, Default)]
pub struct RunQueue {
    runs: Vec<Arc<dyn RunUnit>>,
}

impl RunQueue {
    pub fn new(runs: Vec<Arc<dyn RunUnit>>) -> Self {
        Self { runs }
    }

    /// 由 Run 目录构造；开启 shuffle_runs 时每局打乱一次
    pub fn from_config(catalog: &dyn RunCatalog, config: &AppConfig) -> Result<Self, BotError> {
        let mut runs = catalog.build(config)?;
        if config.game.shuffle_runs {
            runs.shuffle(&mut rand::thread_rng());
        }
        Ok(Self::new(runs))
    }

    pub fn names(&self) -> Vec<String> {
        self.runs.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// 依次执行；列表执行完返回 Ok，本局随之正常结束
    pub async fn execute(&self, ctx: &DutyContext) -> Result<(), BotError> {
        let yp = ctx.yield_point(ExecutionPriority::Normal);
        let hooks = &ctx.collab.hooks;
        let total = self.runs.len();

        for (i, run) in self.runs.iter().enumerate() {
            yp.wait_turn().await?;
            let name = run.name().to_string();
            tracing::info!("Starting run {}/{}: {}", i + 1, total, name);

            ctx.emit(EventKind::RunStarted { run: name.clone() });
            ctx.activity.record(ctx.world.position());
            ctx.set_current_run(Some(name.clone()));

            let result = match hooks.pre_run(&name, i == 0).await {
                Ok(()) => run.run(&yp).await,
                Err(e) => Err(e),
            };

            let reason = FinishReason::from_result(&result);
            ctx.emit(EventKind::RunFinished {
                run: name.clone(),
                reason,
            });
            if let Err(e) = result {
                tracing::warn!("Run '{}' finished with {}: {}", name, reason, e);
                return Err(e);
            }
            if let Err(e) = hooks.post_run(&name, i + 1 == total).await {
                tracing::warn!("Post-run hook for '{}' failed: {}", name, e);
                return Err(e);
            }
        }

        ctx.set_current_run(None);
        tracing::info!("All {} runs completed", total);
        Ok(())
    }
}
