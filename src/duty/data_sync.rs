//! 数据同步职责：每个 tick 刷新一次世界快照

use crate::core::BotError;
use crate::duty::DutyContext;

/// 只在取消时结束（由调度器的取消分支处理），读取失败不致命，交给看门狗兜底
pub async fn run(ctx: DutyContext) -> Result<(), BotError> {
    let mut ticker = ctx.ticker();
    let mut failures: u32 = 0;
    loop {
        ticker.tick().await;
        if ctx.arbiter.is_paused() {
            continue;
        }
        match ctx.collab.world.refresh().await {
            Ok(state) => {
                if failures > 0 {
                    tracing::debug!("World refresh recovered after {} failures", failures);
                }
                failures = 0;
                ctx.world.replace(state);
            }
            Err(e) => {
                failures += 1;
                tracing::debug!("World refresh failed ({}): {}", failures, e);
            }
        }
    }
}
