//! 血量 / 空闲看门狗职责
//!
//! 每个 tick：外部血量管理（可能返回 Chicken / MercChicken / Died，直接结束本局）→ 记录活动 →
//! 长时间未显著移动判定 → 单局时长上限判定。

use tokio::time::Instant;

use crate::core::{BotError, IdleMonitor, IdleVerdict};
use crate::duty::DutyContext;

pub async fn run(ctx: DutyContext, started: Instant) -> Result<(), BotError> {
    let sched = &ctx.config.scheduler;
    let max_game_length = ctx.config.game.max_game_length();
    let mut idle = IdleMonitor::new(sched.idle_movement_threshold, sched.long_idle(), Instant::now());
    let mut ticker = ctx.ticker();
    let mut was_paused = false;

    loop {
        ticker.tick().await;
        if ctx.arbiter.is_paused() {
            was_paused = true;
            continue;
        }
        if was_paused {
            // 暂停期间不动是预期的，重新计时
            idle = IdleMonitor::new(sched.idle_movement_threshold, sched.long_idle(), Instant::now());
            was_paused = false;
        }

        let world = ctx.world.snapshot();
        ctx.collab.health.check_and_act(&world).await?;
        ctx.activity.record(world.position);

        let now = Instant::now();
        if let IdleVerdict::Exceeded(idle_for) = idle.observe(world.position, now) {
            tracing::warn!("Character idle for {:?}, aborting game", idle_for);
            return Err(BotError::Idle(idle_for));
        }

        if let Some(limit) = max_game_length {
            let elapsed = now.saturating_duration_since(started);
            if elapsed > limit {
                tracing::info!("Max game length reached ({:?}), exiting game", limit);
                return Err(BotError::MaxGameLength(elapsed));
            }
        }
    }
}
