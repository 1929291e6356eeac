//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIRELING__*` 覆盖（双下划线表示嵌套，如 `HIRELING__GAME__SHUFFLE_RUNS=true`）。

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub supervisor: SupervisorSection,
    pub scheduler: SchedulerSection,
    pub game: GameSection,
    pub character: CharacterSection,
    pub companion: CompanionSection,
}

/// [supervisor] 段：菜单流与看门狗的各级超时
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorSection {
    /// 单次阻塞菜单调用的超时（秒）
    pub menu_action_timeout_secs: u64,
    /// 游戏外累计停留上限（秒），超过则强杀客户端
    pub max_time_not_in_game_secs: u64,
    /// 卡死看门狗检查间隔（秒）
    pub activity_check_interval_secs: u64,
    /// 位置完全不变多久判定卡死（秒）
    pub max_stuck_duration_secs: u64,
    /// 退出游戏后等待回到菜单的时长（秒），超时则强杀
    pub exit_wait_secs: u64,
    /// 建局成功后等待进入游戏的时长（秒）
    pub enter_game_wait_secs: u64,
    /// 瞬时菜单状态的重试间隔（毫秒）
    pub transient_retry_ms: u64,
    /// 一般菜单错误的重试间隔（毫秒）
    pub menu_retry_ms: u64,
    /// 轮询客户端状态的间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            menu_action_timeout_secs: 30,
            max_time_not_in_game_secs: 300,
            activity_check_interval_secs: 15,
            max_stuck_duration_secs: 180,
            exit_wait_secs: 15,
            enter_game_wait_secs: 20,
            transient_retry_ms: 500,
            menu_retry_ms: 2000,
            poll_interval_ms: 250,
        }
    }
}

impl SupervisorSection {
    pub fn menu_action_timeout(&self) -> Duration {
        Duration::from_secs(self.menu_action_timeout_secs)
    }

    pub fn max_time_not_in_game(&self) -> Duration {
        Duration::from_secs(self.max_time_not_in_game_secs)
    }

    pub fn activity_check_interval(&self) -> Duration {
        Duration::from_secs(self.activity_check_interval_secs.max(1))
    }

    pub fn max_stuck_duration(&self) -> Duration {
        Duration::from_secs(self.max_stuck_duration_secs)
    }

    pub fn exit_wait(&self) -> Duration {
        Duration::from_secs(self.exit_wait_secs)
    }

    pub fn enter_game_wait(&self) -> Duration {
        Duration::from_secs(self.enter_game_wait_secs)
    }

    pub fn transient_retry(&self) -> Duration {
        Duration::from_millis(self.transient_retry_ms)
    }

    pub fn menu_retry(&self) -> Duration {
        Duration::from_millis(self.menu_retry_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

/// [scheduler] 段：职责 tick 与空闲判定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub tick_ms: u64,
    /// 位移达到该值视为显著移动
    pub idle_movement_threshold: f64,
    /// 未显著移动超过该时长（秒）判定空闲
    pub long_idle_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            idle_movement_threshold: 30.0,
            long_idle_secs: 120,
        }
    }
}

impl SchedulerSection {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn long_idle(&self) -> Duration {
        Duration::from_secs(self.long_idle_secs)
    }
}

/// [game] 段：Run 列表、单局时长、建局方式
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GameSection {
    /// 单局最长时长（秒），0 表示不限
    pub max_game_length_secs: u64,
    pub runs: Vec<String>,
    /// 每局开始时洗牌一次
    pub shuffle_runs: bool,
    /// 在线模式下需要先切到在线标签
    pub online: bool,
    pub create_lobby_games: bool,
    pub lobby_game_name: String,
    pub lobby_game_password: String,
    /// 大厅游戏名后缀计数器，成功建局后回写配置
    pub lobby_game_counter: u32,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            max_game_length_secs: 0,
            runs: Vec::new(),
            shuffle_runs: false,
            online: false,
            create_lobby_games: false,
            lobby_game_name: "hireling".to_string(),
            lobby_game_password: String::new(),
            lobby_game_counter: 1,
        }
    }
}

impl GameSection {
    pub fn max_game_length(&self) -> Option<Duration> {
        (self.max_game_length_secs > 0).then(|| Duration::from_secs(self.max_game_length_secs))
    }
}

/// [character] 段：等级上限、佣兵、回城触发条件
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CharacterSection {
    /// 达到该等级后停止，0 表示不限
    pub level_cap: u32,
    pub use_merc: bool,
    /// 首局检查必需的按键绑定
    pub check_key_bindings: bool,
    pub town_trip: TownTripSection,
}

impl Default for CharacterSection {
    fn default() -> Self {
        Self {
            level_cap: 0,
            use_merc: true,
            check_key_bindings: true,
            town_trip: TownTripSection::default(),
        }
    }
}

/// [character.town_trip] 段：回城触发开关
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TownTripSection {
    pub no_hp_potions: bool,
    pub no_mp_potions: bool,
    pub equipment_broken: bool,
    pub merc_died: bool,
}

impl Default for TownTripSection {
    fn default() -> Self {
        Self {
            no_hp_potions: true,
            no_mp_potions: true,
            equipment_broken: true,
            merc_died: true,
        }
    }
}

/// [companion] 段：队友模式
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CompanionSection {
    pub enabled: bool,
    /// 队长负责建局并广播；跟随者加入队长的局
    pub leader: bool,
}

/// 从 config 目录加载配置，环境变量 HIRELING__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIRELING__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIRELING")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 读多写少的配置持有者；persist 在后台写盘，失败只记日志
#[derive(Debug, Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<AppConfig>>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(config: AppConfig, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path,
        }
    }

    pub fn get(&self) -> AppConfig {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 修改内存中的配置
    pub fn update<F: FnOnce(&mut AppConfig)>(&self, f: F) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }

    /// 发出即忘的回写；没有配置文件路径时什么都不做
    pub fn persist(&self) -> Option<tokio::task::JoinHandle<()>> {
        let path = self.path.clone()?;
        let snapshot = self.get();
        Some(tokio::spawn(async move {
            let text = match toml::to_string_pretty(&snapshot) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("Failed to serialize config: {}", e);
                    return;
                }
            };
            if let Err(e) = tokio::fs::write(&path, text).await {
                tracing::warn!("Failed to persist config to {}: {}", path.display(), e);
            }
        }))
    }
}
