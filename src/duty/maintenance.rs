//! 高优先级维护职责
//!
//! 每个 tick 提升到 High，按固定顺序执行：佣兵状态修正 → 渲染模式 → 关闭遮挡界面 → 区域修正 →
//! 拾取 → 加状态 → 等级上限 → 腰带补药 → 回城；结束前一定降回 Normal。

use crate::core::{BotError, ExecutionPriority, ShutdownReason};
use crate::duty::policy::{belt_refill_decision, town_trip_reason, BeltDecision};
use crate::duty::DutyContext;

pub async fn run(ctx: DutyContext) -> Result<(), BotError> {
    let mut ticker = ctx.ticker();
    loop {
        ticker.tick().await;
        if ctx.arbiter.is_paused() {
            continue;
        }
        if !ctx.arbiter.raise(ExecutionPriority::High) {
            continue;
        }
        let result = tick(&ctx).await;
        ctx.arbiter.lower(ExecutionPriority::Normal);
        result?;
    }
}

/// 维护动作失败不结束本局，记日志继续下一步
fn log_upkeep(step: &str, result: Result<(), BotError>) {
    if let Err(e) = result {
        tracing::debug!("Maintenance step '{}' failed: {}", step, e);
    }
}

async fn tick(ctx: &DutyContext) -> Result<(), BotError> {
    let world = ctx.world.snapshot();
    if !world.in_game {
        return Ok(());
    }
    let actions = &ctx.collab.actions;
    let yp = ctx.yield_point(ExecutionPriority::High);

    log_upkeep("merc_state", actions.correct_merc_state(&world).await);
    log_upkeep("render_mode", actions.ensure_render_mode(&world).await);
    log_upkeep("obstructions", actions.dismiss_obstructions().await);
    log_upkeep("area", actions.correct_area(&world, &yp).await);
    log_upkeep("pickup", actions.pick_up_items(&world, &yp).await);
    log_upkeep("buff", actions.buff(&world, &yp).await);

    let level_cap = ctx.config.character.level_cap;
    if level_cap > 0 && world.level >= level_cap {
        if !ctx.shutdown.is_shutdown() {
            tracing::info!(
                "Level cap reached ({} >= {}), stopping supervisor",
                world.level,
                level_cap
            );
            ctx.shutdown
                .shutdown(ShutdownReason::LevelCapReached(world.level));
        }
        return Ok(());
    }

    if belt_refill_decision(&world) == BeltDecision::Refill {
        log_upkeep("belt", actions.refill_belt(&world).await);
        resync(ctx).await;
    }

    let character = &ctx.config.character;
    if let Some(reason) = town_trip_reason(&world, &character.town_trip, character.use_merc) {
        tracing::info!("Returning to town: {}", reason);
        actions
            .return_to_town(&world, &yp)
            .await
            .map_err(|e| BotError::TownReturnFailed(e.to_string()))?;
        resync(ctx).await;
    }
    Ok(())
}

/// 动作改变了世界状态，立刻重读，下一个 tick 不依赖数据同步职责的先后顺序
async fn resync(ctx: &DutyContext) {
    match ctx.collab.world.refresh().await {
        Ok(state) => ctx.world.replace(state),
        Err(e) => tracing::debug!("World refresh after maintenance failed: {}", e),
    }
}
