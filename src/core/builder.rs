//! 监管构建器：统一的初始化逻辑
//!
//! 把配置与全部外部协作者装配成一个 SessionSupervisor；缺少必需协作者时返回 Config 错误。

use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{
    ActionLayer, ClientProcess, Collaborators, CompanionLink, HealthManager, MenuDriver,
    NoopHooks, RunCatalog, RunHooks, WorldProvider,
};
use crate::config::{AppConfig, ConfigStore};
use crate::core::{BotError, SessionSupervisor, ShutdownManager};
use crate::events::{EventSink, LogSink};

/// 监管构建器
pub struct SupervisorBuilder {
    config: AppConfig,
    config_path: Option<PathBuf>,
    world: Option<Arc<dyn WorldProvider>>,
    health: Option<Arc<dyn HealthManager>>,
    menu: Option<Arc<dyn MenuDriver>>,
    actions: Option<Arc<dyn ActionLayer>>,
    process: Option<Arc<dyn ClientProcess>>,
    catalog: Option<Arc<dyn RunCatalog>>,
    hooks: Option<Arc<dyn RunHooks>>,
    events: Option<Arc<dyn EventSink>>,
    companion: Option<Arc<dyn CompanionLink>>,
    shutdown: Option<ShutdownManager>,
}

impl SupervisorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            config_path: None,
            world: None,
            health: None,
            menu: None,
            actions: None,
            process: None,
            catalog: None,
            hooks: None,
            events: None,
            companion: None,
            shutdown: None,
        }
    }

    /// 配置文件路径；大厅计数器会回写到这里
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn world(mut self, world: Arc<dyn WorldProvider>) -> Self {
        self.world = Some(world);
        self
    }

    pub fn health(mut self, health: Arc<dyn HealthManager>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn menu(mut self, menu: Arc<dyn MenuDriver>) -> Self {
        self.menu = Some(menu);
        self
    }

    pub fn actions(mut self, actions: Arc<dyn ActionLayer>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn process(mut self, process: Arc<dyn ClientProcess>) -> Self {
        self.process = Some(process);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn RunCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn RunHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn companion(mut self, link: Arc<dyn CompanionLink>) -> Self {
        self.companion = Some(link);
        self
    }

    /// 与信号处理共享同一个停止管理器
    pub fn shutdown(mut self, shutdown: ShutdownManager) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Result<SessionSupervisor, BotError> {
        fn required<T: ?Sized>(v: Option<Arc<T>>, name: &str) -> Result<Arc<T>, BotError> {
            v.ok_or_else(|| BotError::Config(format!("missing collaborator: {name}")))
        }

        if self.config.companion.enabled && !self.config.companion.leader && self.companion.is_none()
        {
            return Err(BotError::Config(
                "companion follower mode requires a companion link".into(),
            ));
        }

        let collab = Collaborators {
            world: required(self.world, "world")?,
            health: required(self.health, "health")?,
            menu: required(self.menu, "menu")?,
            actions: required(self.actions, "actions")?,
            process: required(self.process, "process")?,
            catalog: required(self.catalog, "catalog")?,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoopHooks)),
            events: self.events.unwrap_or_else(|| Arc::new(LogSink)),
            companion: self.companion,
        };

        Ok(SessionSupervisor::new(
            ConfigStore::new(self.config, self.config_path),
            collab,
            self.shutdown.unwrap_or_default(),
        ))
    }
}
