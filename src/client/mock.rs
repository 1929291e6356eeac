//! 模拟客户端：实现全部协作者接口的小型「游戏」
//!
//! 用于测试与二进制的演示运行。建局即进入游戏，退出或强杀后回到角色选择界面；
//! 各操作的结果可以按顺序预设，也可以设置为永久挂起。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{
    ActionLayer, ClientProcess, Collaborators, CompanionLink, GameInvite, HealthManager,
    MenuDriver, RunCatalog, RunHooks, RunUnit, WorldProvider,
};
use crate::config::AppConfig;
use crate::core::{BotError, ClientPredicates, SupervisorBuilder, YieldPoint};
use crate::world::{Position, WorldState};

/// 进入游戏时的出生坐标
pub const SPAWN: Position = Position { x: 5000, y: 5000 };

#[derive(Debug, Default)]
struct MockState {
    predicates: ClientPredicates,
    world: WorldState,
    new_game_results: VecDeque<Result<(), BotError>>,
    dismiss_results: VecDeque<bool>,
    /// 接下来 n 次关闭弹窗直接返回错误
    dismiss_errors: u32,
    health_results: VecDeque<Result<(), BotError>>,
    return_to_town_error: Option<BotError>,
    hang_new_game: bool,
    hang_predicates: bool,
    /// 建局后弹窗拒绝（如游戏名已存在），不进入游戏
    reject_with_modal: u32,
    wander: bool,
    /// 建局后一直停在加载画面
    stall_loading: bool,
    games_created: u32,
    missing_bindings: Vec<String>,
    calls: Vec<String>,
    kills: u32,
    detaches: u32,
    refills: u32,
    town_returns: u32,
}

/// 模拟客户端（线程安全，所有方法都不会在持锁时 await）
#[derive(Debug)]
pub struct MockClient {
    state: Mutex<MockState>,
}

impl MockClient {
    /// 新客户端停在角色选择界面
    pub fn new() -> Arc<Self> {
        let state = MockState {
            predicates: ClientPredicates {
                in_character_selection: true,
                ..Default::default()
            },
            ..Default::default()
        };
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter_game(state: &mut MockState) {
        state.predicates = ClientPredicates {
            in_game: true,
            ..Default::default()
        };
        state.world.in_game = true;
        state.world.in_town = false;
        state.world.position = SPAWN;
    }

    fn leave_game(state: &mut MockState) {
        state.predicates = ClientPredicates {
            in_character_selection: true,
            ..Default::default()
        };
        state.world.in_game = false;
        state.world.position = Position::default();
    }

    /// 把模拟客户端装配进构建器（世界、血量、菜单、动作、进程）
    pub fn attach(self: &Arc<Self>, builder: SupervisorBuilder) -> SupervisorBuilder {
        builder
            .world(self.clone())
            .health(self.clone())
            .menu(self.clone())
            .actions(self.clone())
            .process(self.clone())
    }

    /// 直接构造职责调度所需的协作者集合
    pub fn collaborators(
        self: &Arc<Self>,
        catalog: MockCatalog,
        events: Arc<dyn crate::events::EventSink>,
    ) -> Collaborators {
        Collaborators {
            world: self.clone(),
            health: self.clone(),
            menu: self.clone(),
            actions: self.clone(),
            process: self.clone(),
            catalog: Arc::new(catalog),
            hooks: Arc::new(crate::client::NoopHooks),
            events,
            companion: None,
        }
    }

    pub fn set_predicates(&self, predicates: ClientPredicates) {
        self.lock().predicates = predicates;
    }

    pub fn predicates_now(&self) -> ClientPredicates {
        self.lock().predicates
    }

    pub fn world_now(&self) -> WorldState {
        self.lock().world.clone()
    }

    pub fn update_world<F: FnOnce(&mut WorldState)>(&self, f: F) {
        f(&mut self.lock().world);
    }

    pub fn script_new_game(&self, results: Vec<Result<(), BotError>>) {
        self.lock().new_game_results.extend(results);
    }

    pub fn script_dismiss(&self, results: Vec<bool>) {
        self.lock().dismiss_results.extend(results);
    }

    pub fn fail_dismiss(&self, n: u32) {
        self.lock().dismiss_errors = n;
    }

    pub fn script_health(&self, results: Vec<Result<(), BotError>>) {
        self.lock().health_results.extend(results);
    }

    pub fn fail_return_to_town(&self, err: BotError) {
        self.lock().return_to_town_error = Some(err);
    }

    pub fn hang_new_game(&self, hang: bool) {
        self.lock().hang_new_game = hang;
    }

    pub fn hang_predicates(&self, hang: bool) {
        self.lock().hang_predicates = hang;
    }

    /// 接下来 n 次建局都会被弹窗拒绝
    pub fn reject_with_modal(&self, n: u32) {
        self.lock().reject_with_modal = n;
    }

    /// 建局请求被接受，但游戏始终没有加载完成
    pub fn stall_loading(&self, on: bool) {
        self.lock().stall_loading = on;
    }

    /// 游戏中每次刷新都移动一段距离
    pub fn wander(&self, on: bool) {
        self.lock().wander = on;
    }

    pub fn set_missing_bindings(&self, bindings: Vec<String>) {
        self.lock().missing_bindings = bindings;
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.as_str() == name).count()
    }

    pub fn kill_count(&self) -> u32 {
        self.lock().kills
    }

    pub fn detach_count(&self) -> u32 {
        self.lock().detaches
    }

    pub fn refill_count(&self) -> u32 {
        self.lock().refills
    }

    pub fn town_return_count(&self) -> u32 {
        self.lock().town_returns
    }

    pub fn games_created(&self) -> u32 {
        self.lock().games_created
    }

    fn record(&self, call: &str) {
        self.lock().calls.push(call.to_string());
    }

    /// 建局 / 加入的公共路径
    fn create(&self, invite: GameInvite) -> Result<GameInvite, BotError> {
        let mut state = self.lock();
        if let Some(Err(e)) = state.new_game_results.pop_front() {
            return Err(e);
        }
        if state.stall_loading {
            state.predicates = ClientPredicates {
                loading_screen: true,
                ..Default::default()
            };
            return Ok(invite);
        }
        if state.reject_with_modal > 0 {
            state.reject_with_modal -= 1;
            state.predicates.dismissable_modal_present = true;
            return Ok(invite);
        }
        state.games_created += 1;
        Self::enter_game(&mut state);
        Ok(invite)
    }
}

#[async_trait]
impl WorldProvider for MockClient {
    async fn refresh(&self) -> Result<WorldState, BotError> {
        let mut state = self.lock();
        if state.wander && state.world.in_game {
            state.world.position.x += 40;
        }
        state.world.in_game = state.predicates.in_game;
        Ok(state.world.clone())
    }

    async fn in_game(&self) -> Result<bool, BotError> {
        Ok(self.lock().predicates.in_game)
    }

    async fn predicates(&self) -> Result<ClientPredicates, BotError> {
        let (hang, predicates) = {
            let state = self.lock();
            (state.hang_predicates, state.predicates)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(predicates)
    }
}

#[async_trait]
impl HealthManager for MockClient {
    async fn check_and_act(&self, _world: &WorldState) -> Result<(), BotError> {
        self.lock().health_results.pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl MenuDriver for MockClient {
    async fn new_game(&self) -> Result<Option<GameInvite>, BotError> {
        self.record("new_game");
        let hang = self.lock().hang_new_game;
        if hang {
            std::future::pending::<()>().await;
        }
        let n = self.lock().games_created + 1;
        self.create(GameInvite {
            name: format!("mock-{n}"),
            password: String::new(),
        })
        .map(Some)
    }

    async fn join_game(&self, name: &str, password: &str) -> Result<(), BotError> {
        self.record("join_game");
        self.create(GameInvite {
            name: name.to_string(),
            password: password.to_string(),
        })
        .map(|_| ())
    }

    async fn create_lobby_game(
        &self,
        name: &str,
        password: &str,
        counter: u32,
    ) -> Result<GameInvite, BotError> {
        self.record("create_lobby_game");
        let hang = self.lock().hang_new_game;
        if hang {
            std::future::pending::<()>().await;
        }
        self.create(GameInvite {
            name: format!("{name}-{counter}"),
            password: password.to_string(),
        })
    }

    async fn exit_game(&self) -> Result<(), BotError> {
        self.record("exit_game");
        Self::leave_game(&mut self.lock());
        Ok(())
    }

    async fn exit_character_creation(&self) -> Result<(), BotError> {
        self.record("exit_character_creation");
        let mut state = self.lock();
        state.predicates.in_character_creation = false;
        state.predicates.in_character_selection = true;
        Ok(())
    }

    async fn dismiss_modal(&self) -> Result<bool, BotError> {
        self.record("dismiss_modal");
        let mut state = self.lock();
        if state.dismiss_errors > 0 {
            state.dismiss_errors -= 1;
            return Err(BotError::Client("modal button not found".into()));
        }
        let dismissed = state.dismiss_results.pop_front().unwrap_or(true);
        if dismissed {
            state.predicates.dismissable_modal_present = false;
        }
        Ok(dismissed)
    }

    async fn ensure_online(&self) -> Result<(), BotError> {
        self.record("ensure_online");
        Ok(())
    }

    async fn enter_lobby(&self) -> Result<(), BotError> {
        self.record("enter_lobby");
        let mut state = self.lock();
        state.predicates.in_character_selection = false;
        state.predicates.in_lobby = true;
        Ok(())
    }

    async fn exit_lobby(&self) -> Result<(), BotError> {
        self.record("exit_lobby");
        let mut state = self.lock();
        state.predicates.in_lobby = false;
        state.predicates.in_character_selection = true;
        Ok(())
    }
}

#[async_trait]
impl ActionLayer for MockClient {
    async fn correct_merc_state(&self, _world: &WorldState) -> Result<(), BotError> {
        Ok(())
    }

    async fn ensure_render_mode(&self, _world: &WorldState) -> Result<(), BotError> {
        Ok(())
    }

    async fn dismiss_obstructions(&self) -> Result<(), BotError> {
        Ok(())
    }

    async fn correct_area(&self, _world: &WorldState, _yp: &YieldPoint) -> Result<(), BotError> {
        Ok(())
    }

    async fn pick_up_items(&self, _world: &WorldState, _yp: &YieldPoint) -> Result<(), BotError> {
        Ok(())
    }

    async fn buff(&self, _world: &WorldState, _yp: &YieldPoint) -> Result<(), BotError> {
        Ok(())
    }

    async fn refill_belt(&self, _world: &WorldState) -> Result<(), BotError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.refills += 1;
        for supply in [
            &mut state.world.healing,
            &mut state.world.mana,
            &mut state.world.rejuvenation,
        ] {
            let moved = supply.missing_in_belt.min(supply.in_inventory);
            supply.in_belt += moved;
            supply.in_inventory -= moved;
            supply.missing_in_belt -= moved;
        }
        Ok(())
    }

    async fn return_to_town(&self, _world: &WorldState, _yp: &YieldPoint) -> Result<(), BotError> {
        let mut state = self.lock();
        state.town_returns += 1;
        if let Some(e) = state.return_to_town_error.clone() {
            return Err(e);
        }
        state.world.in_town = true;
        Ok(())
    }
}

impl ClientProcess for MockClient {
    fn kill(&self) -> Result<(), BotError> {
        let mut state = self.lock();
        state.kills += 1;
        state.hang_new_game = false;
        state.hang_predicates = false;
        Self::leave_game(&mut state);
        Ok(())
    }

    fn detach(&self) {
        self.lock().detaches += 1;
    }

    fn screenshot(&self) -> Option<String> {
        let n = self.lock().games_created;
        Some(format!("screenshots/mock-{n}.png"))
    }

    fn missing_bindings(&self) -> Vec<String> {
        self.lock().missing_bindings.clone()
    }
}

/// 模拟 Run 的行为
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed(Duration),
    Fail(BotError),
    /// 永不返回，只能被取消
    Hang,
}

#[derive(Debug, Clone)]
pub struct MockRun {
    name: String,
    behavior: MockBehavior,
}

impl MockRun {
    pub fn new(name: &str, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
        }
    }

    pub fn succeed(name: &str) -> Self {
        Self::new(name, MockBehavior::Succeed(Duration::from_secs(1)))
    }

    pub fn fail(name: &str, err: BotError) -> Self {
        Self::new(name, MockBehavior::Fail(err))
    }

    pub fn hang(name: &str) -> Self {
        Self::new(name, MockBehavior::Hang)
    }
}

#[async_trait]
impl RunUnit for MockRun {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, yp: &YieldPoint) -> Result<(), BotError> {
        match &self.behavior {
            MockBehavior::Succeed(duration) => {
                // 每 100ms 一个让步点
                let step = Duration::from_millis(100);
                let mut remaining = *duration;
                while !remaining.is_zero() {
                    yp.wait_turn().await?;
                    let slice = remaining.min(step);
                    tokio::time::sleep(slice).await;
                    remaining -= slice;
                }
                Ok(())
            }
            MockBehavior::Fail(e) => Err(e.clone()),
            MockBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

/// 模拟 Run 目录；配置里列出 runs 时按配置顺序筛选
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    runs: Vec<Arc<MockRun>>,
}

impl MockCatalog {
    pub fn new(runs: Vec<MockRun>) -> Self {
        Self {
            runs: runs.into_iter().map(Arc::new).collect(),
        }
    }
}

impl RunCatalog for MockCatalog {
    fn build(&self, config: &AppConfig) -> Result<Vec<Arc<dyn RunUnit>>, BotError> {
        if config.game.runs.is_empty() {
            return Ok(self
                .runs
                .iter()
                .map(|r| r.clone() as Arc<dyn RunUnit>)
                .collect());
        }
        config
            .game
            .runs
            .iter()
            .map(|name| {
                self.runs
                    .iter()
                    .find(|r| r.name == *name)
                    .map(|r| r.clone() as Arc<dyn RunUnit>)
                    .ok_or_else(|| BotError::Config(format!("unknown run '{name}'")))
            })
            .collect()
    }
}

/// 一次钩子调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    Pre { run: String, first: bool },
    Post { run: String, last: bool },
}

#[derive(Debug, Default)]
struct HookState {
    calls: Vec<HookCall>,
    fail_pre: Option<(String, BotError)>,
    fail_post: Option<(String, BotError)>,
}

/// 记录调用顺序的 Run 钩子，可让指定 Run 的前置 / 后置钩子失败
#[derive(Debug, Default)]
pub struct MockHooks {
    state: Mutex<HookState>,
}

impl MockHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_pre(&self, run: &str, err: BotError) {
        self.lock().fail_pre = Some((run.to_string(), err));
    }

    pub fn fail_post(&self, run: &str, err: BotError) {
        self.lock().fail_post = Some((run.to_string(), err));
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl RunHooks for MockHooks {
    async fn pre_run(&self, run: &str, first: bool) -> Result<(), BotError> {
        let mut state = self.lock();
        state.calls.push(HookCall::Pre {
            run: run.to_string(),
            first,
        });
        match &state.fail_pre {
            Some((name, err)) if name == run => Err(err.clone()),
            _ => Ok(()),
        }
    }

    async fn post_run(&self, run: &str, last: bool) -> Result<(), BotError> {
        let mut state = self.lock();
        state.calls.push(HookCall::Post {
            run: run.to_string(),
            last,
        });
        match &state.fail_post {
            Some((name, err)) if name == run => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

/// 进程内的队友通道：队长 announce，跟随者 poll 到同一个邀请
#[derive(Debug, Default)]
pub struct MockCompanion {
    invite: Mutex<Option<GameInvite>>,
}

impl MockCompanion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slot(&self) -> MutexGuard<'_, Option<GameInvite>> {
        self.invite.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CompanionLink for MockCompanion {
    async fn announce(&self, invite: &GameInvite) {
        *self.slot() = Some(invite.clone());
    }

    async fn poll_invite(&self) -> Option<GameInvite> {
        self.slot().take()
    }
}
