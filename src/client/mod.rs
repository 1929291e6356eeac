//! 外部协作者抽象
//!
//! 世界读取、血量管理、菜单/输入驱动、维护动作、客户端进程、Run 目录、队友联动。
//! 控制核心只通过这些窄接口消费它们；任何阻塞调用都可能挂起，由调用方包在有界子任务里。

pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::core::{BotError, ClientPredicates, YieldPoint};
use crate::world::WorldState;

/// 世界快照提供者
#[async_trait]
pub trait WorldProvider: Send + Sync {
    /// 读取一次完整世界状态
    async fn refresh(&self) -> Result<WorldState, BotError>;

    async fn in_game(&self) -> Result<bool, BotError>;

    /// 菜单流使用的界面谓词
    async fn predicates(&self) -> Result<ClientPredicates, BotError>;
}

/// 血量管理：喝药、撤离；Chicken / MercChicken / Died 以错误形式返回
#[async_trait]
pub trait HealthManager: Send + Sync {
    async fn check_and_act(&self, world: &WorldState) -> Result<(), BotError>;
}

/// 建局 / 加入所用的游戏名与密码
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameInvite {
    pub name: String,
    pub password: String,
}

/// 菜单驱动：每个操作都会被 menu_action_timeout 包住
#[async_trait]
pub trait MenuDriver: Send + Sync {
    async fn new_game(&self) -> Result<Option<GameInvite>, BotError>;
    async fn join_game(&self, name: &str, password: &str) -> Result<(), BotError>;
    /// 游戏名由前缀和递增计数拼成，如 `name-7`
    async fn create_lobby_game(
        &self,
        name: &str,
        password: &str,
        counter: u32,
    ) -> Result<GameInvite, BotError>;
    async fn exit_game(&self) -> Result<(), BotError>;
    async fn exit_character_creation(&self) -> Result<(), BotError>;
    /// 返回 false 表示弹窗仍在
    async fn dismiss_modal(&self) -> Result<bool, BotError>;
    async fn ensure_online(&self) -> Result<(), BotError>;
    async fn enter_lobby(&self) -> Result<(), BotError>;
    async fn exit_lobby(&self) -> Result<(), BotError>;
}

/// 维护职责按固定顺序调用的动作
#[async_trait]
pub trait ActionLayer: Send + Sync {
    /// 修正误判的佣兵状态
    async fn correct_merc_state(&self, world: &WorldState) -> Result<(), BotError>;
    /// 需要时切换渲染模式
    async fn ensure_render_mode(&self, world: &WorldState) -> Result<(), BotError>;
    /// 关闭遮挡操作的界面
    async fn dismiss_obstructions(&self) -> Result<(), BotError>;
    async fn correct_area(&self, world: &WorldState, yp: &YieldPoint) -> Result<(), BotError>;
    async fn pick_up_items(&self, world: &WorldState, yp: &YieldPoint) -> Result<(), BotError>;
    async fn buff(&self, world: &WorldState, yp: &YieldPoint) -> Result<(), BotError>;
    async fn refill_belt(&self, world: &WorldState) -> Result<(), BotError>;
    async fn return_to_town(&self, world: &WorldState, yp: &YieldPoint) -> Result<(), BotError>;
}

/// 客户端进程控制
pub trait ClientProcess: Send + Sync {
    /// 强杀外部进程
    fn kill(&self) -> Result<(), BotError>;
    /// 放开输入与内存读取，之后不再向客户端发送任何输入
    fn detach(&self);
    /// 诊断截图，返回保存路径
    fn screenshot(&self) -> Option<String>;
    /// 缺失的必需按键绑定
    fn missing_bindings(&self) -> Vec<String>;
}

/// 一个脚本化目标
#[async_trait]
pub trait RunUnit: Send + Sync {
    fn name(&self) -> &str;

    /// 长动作内部需要周期性调用 yp.wait_turn()
    async fn run(&self, yp: &YieldPoint) -> Result<(), BotError>;
}

/// 根据配置按顺序构造本局的 Run 列表
pub trait RunCatalog: Send + Sync {
    fn build(&self, config: &AppConfig) -> Result<Vec<Arc<dyn RunUnit>>, BotError>;
}

/// Run 前后钩子；post_run 只在 Run 成功后调用
#[async_trait]
pub trait RunHooks: Send + Sync {
    async fn pre_run(&self, _run: &str, _first: bool) -> Result<(), BotError> {
        Ok(())
    }

    async fn post_run(&self, _run: &str, _last: bool) -> Result<(), BotError> {
        Ok(())
    }
}

/// 默认无操作钩子
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl RunHooks for NoopHooks {}

/// 队友联动：队长广播新局，跟随者轮询邀请
#[async_trait]
pub trait CompanionLink: Send + Sync {
    async fn announce(&self, invite: &GameInvite);
    async fn poll_invite(&self) -> Option<GameInvite>;
}

/// 一次性注入监管的全部协作者
#[derive(Clone)]
pub struct Collaborators {
    pub world: Arc<dyn WorldProvider>,
    pub health: Arc<dyn HealthManager>,
    pub menu: Arc<dyn MenuDriver>,
    pub actions: Arc<dyn ActionLayer>,
    pub process: Arc<dyn ClientProcess>,
    pub catalog: Arc<dyn RunCatalog>,
    pub hooks: Arc<dyn RunHooks>,
    pub events: Arc<dyn crate::events::EventSink>,
    pub companion: Option<Arc<dyn CompanionLink>>,
}
