//! Hireling 入口：初始化日志、加载配置、安装信号处理并运行会话监管
//!
//! 用法：`hireling [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hireling::client::mock::{MockBehavior, MockCatalog, MockClient, MockRun};
use hireling::config::load_config;
use hireling::core::ShutdownManager;
use hireling::SupervisorBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hireling::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.clone()).context("Failed to load config")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    // 目前只有模拟客户端后端：演示运行，不会连接真实游戏进程
    tracing::warn!("No live client backend configured, running against the simulated client");
    let client = MockClient::new();
    client.wander(true);
    let catalog = MockCatalog::new(
        ["countess", "andariel", "pindleskin"]
            .into_iter()
            .map(|name| MockRun::new(name, MockBehavior::Succeed(Duration::from_secs(3))))
            .collect(),
    );

    let mut supervisor = client
        .attach(SupervisorBuilder::new(config))
        .config_path(config_path)
        .catalog(Arc::new(catalog))
        .shutdown(shutdown.as_ref().clone())
        .build()
        .context("Failed to build supervisor")?;

    supervisor
        .run()
        .await
        .context("Supervisor stopped with an unrecoverable client state")?;

    let status = supervisor.handle().status();
    tracing::info!(
        "Supervisor stopped after {} games ({:?})",
        status.games,
        status.finish_counts
    );
    Ok(())
}
