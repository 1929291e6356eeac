//! 会话监管：客户端生命周期状态机
//!
//! NotInGame（菜单流）⇄ InGame（交给 DutyScheduler）→ Exiting → NotInGame。
//! 局外总时长、单次菜单调用、局内卡死三层看门狗都在这里装配；
//! 不可恢复错误会强杀客户端并返回给调用方，由调用方整体重启。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::client::{Collaborators, GameInvite};
use crate::config::{AppConfig, ConfigStore};
use crate::core::watchdog::{bounded, guard_not_in_game, stuck_watchdog};
use crate::core::{
    next_menu_action, ActivityTracker, BotError, DutyScheduler, FinishReason, MenuAction,
    MenuCounters, MenuMode, PriorityArbiter, RecoveryAction, RecoveryEngine, SessionPhase,
    ShutdownManager, ShutdownReason, SupervisorStatus,
};
use crate::duty::{DutyContext, RunQueue};
use crate::events::{Event, EventKind};
use crate::world::SharedWorld;

/// 操作员控制句柄：暂停 / 恢复 / 停止，以及状态订阅
#[derive(Clone)]
pub struct SupervisorHandle {
    arbiter: Arc<PriorityArbiter>,
    shutdown: ShutdownManager,
    status: Arc<watch::Sender<SupervisorStatus>>,
}

impl SupervisorHandle {
    pub fn pause(&self) {
        if self.arbiter.pause() {
            tracing::info!("Supervisor paused");
        }
        self.status.send_modify(|s| s.paused = true);
    }

    pub fn resume(&self) {
        if self.arbiter.resume() {
            tracing::info!("Supervisor resumed");
        }
        self.status.send_modify(|s| s.paused = false);
    }

    /// 结束当前这一局后停止
    pub fn stop(&self) {
        self.shutdown.shutdown(ShutdownReason::UserInitiated);
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.subscribe()
    }
}

/// 会话监管器，由 SupervisorBuilder 构造
pub struct SessionSupervisor {
    config: ConfigStore,
    collab: Collaborators,
    arbiter: Arc<PriorityArbiter>,
    activity: Arc<ActivityTracker>,
    world: SharedWorld,
    shutdown: ShutdownManager,
    status: Arc<watch::Sender<SupervisorStatus>>,
    recovery: RecoveryEngine,
    counters: MenuCounters,
    first_entry: bool,
    first_session: bool,
    current_invite: Option<GameInvite>,
}

impl SessionSupervisor {
    pub(crate) fn new(config: ConfigStore, collab: Collaborators, shutdown: ShutdownManager) -> Self {
        let sup = config.get().supervisor;
        let (status, _) = watch::channel(SupervisorStatus::default());
        Self {
            config,
            collab,
            arbiter: Arc::new(PriorityArbiter::new()),
            activity: Arc::new(ActivityTracker::new()),
            world: SharedWorld::new(),
            shutdown,
            status: Arc::new(status),
            recovery: RecoveryEngine::new(sup.transient_retry(), sup.menu_retry()),
            counters: MenuCounters::default(),
            first_entry: true,
            first_session: true,
            current_invite: None,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            arbiter: self.arbiter.clone(),
            shutdown: self.shutdown.clone(),
            status: self.status.clone(),
        }
    }

    /// 主循环：停止请求时返回 Ok，不可恢复时强杀客户端后返回 Err
    pub async fn run(&mut self) -> Result<(), BotError> {
        tracing::info!("Session supervisor started");
        loop {
            if self.shutdown.is_shutdown() {
                tracing::info!(
                    "Supervisor stopping: {:?}",
                    self.shutdown.reason().unwrap_or(ShutdownReason::UserInitiated)
                );
                self.set_phase(SessionPhase::Stopped);
                return Ok(());
            }

            self.set_phase(SessionPhase::NotInGame);
            let limit = self.config.get().supervisor.max_time_not_in_game();
            let process = self.collab.process.clone();
            match guard_not_in_game(limit, process.as_ref(), self.enter_game()).await {
                Ok(true) => {
                    if let Err(e) = self.play_session().await {
                        return Err(self.fail(e));
                    }
                }
                Ok(false) => continue,
                Err(e) => {
                    if !matches!(e, BotError::NotInGameTimeout(_)) {
                        tracing::error!("Unrecoverable menu state, killing client: {}", e);
                        if let Err(kill_err) = process.kill() {
                            tracing::warn!("Failed to kill client: {}", kill_err);
                        }
                    }
                    return Err(self.fail(e));
                }
            }
        }
    }

    fn fail(&self, err: BotError) -> BotError {
        self.status.send_modify(|s| {
            s.phase = SessionPhase::Stopped;
            s.last_error = Some(err.to_string());
        });
        err
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.status.send_modify(|s| s.phase = phase);
    }

    /// 可被停止请求打断的等待；返回 false 表示已请求停止
    async fn nap(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.wait_for_shutdown() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// 菜单流，直到进入游戏（Ok(true)）或请求停止（Ok(false)）
    async fn enter_game(&mut self) -> Result<bool, BotError> {
        let poll = self.config.get().supervisor.poll_interval();
        if self.first_entry {
            if !self.wait_for_character_selection(poll).await {
                return Ok(false);
            }
            self.first_entry = false;
        }

        loop {
            if self.shutdown.is_shutdown() {
                return Ok(false);
            }
            let cfg = self.config.get();
            match self.menu_cycle(&cfg).await {
                Ok(true) => return Ok(true),
                Ok(false) => {
                    self.nap(poll).await;
                }
                Err(e) => match self.recovery.handle(&e) {
                    RecoveryAction::RetrySoon(d) => {
                        tracing::debug!("Menu not ready ({}), retrying", e);
                        self.nap(d).await;
                    }
                    RecoveryAction::RetryLater(d) => {
                        tracing::warn!("Menu flow error, retrying in {:?}: {}", d, e);
                        self.nap(d).await;
                    }
                    RecoveryAction::EndSession => {
                        tracing::warn!("Unexpected session error in menus: {}", e);
                        self.nap(cfg.supervisor.menu_retry()).await;
                    }
                    RecoveryAction::RestartClient => return Err(e),
                },
            }
        }
    }

    /// 首次进入时等待角色选择界面；只受局外总时长约束
    async fn wait_for_character_selection(&self, poll: Duration) -> bool {
        loop {
            if self.shutdown.is_shutdown() {
                return false;
            }
            match self.collab.world.predicates().await {
                Ok(p) if p.in_character_selection => return true,
                Ok(_) => tracing::debug!("Waiting for character selection screen"),
                Err(e) => tracing::debug!("Failed to read menu state: {}", e),
            }
            self.nap(poll).await;
        }
    }

    fn menu_mode(cfg: &AppConfig) -> MenuMode {
        if cfg.companion.enabled && !cfg.companion.leader {
            MenuMode::Companion
        } else if cfg.game.create_lobby_games {
            MenuMode::Lobby
        } else {
            MenuMode::Standard
        }
    }

    /// 执行一个菜单周期；Ok(true) 表示已进入游戏
    async fn menu_cycle(&mut self, cfg: &AppConfig) -> Result<bool, BotError> {
        let predicates = self.collab.world.predicates().await?;
        let action = next_menu_action(&predicates, Self::menu_mode(cfg));
        let limit = cfg.supervisor.menu_action_timeout();
        let menu = self.collab.menu.clone();

        match action {
            MenuAction::WaitLoading => Err(BotError::MenuTransient("loading screen".into())),
            MenuAction::Unknown => Err(BotError::MenuTransient("unknown menu state".into())),
            MenuAction::ExitCharacterCreation => {
                tracing::info!("In character creation screen, leaving");
                bounded("exit_character_creation", limit, async move {
                    menu.exit_character_creation().await
                })
                .await?;
                Ok(false)
            }
            MenuAction::ExitGame => {
                tracing::warn!("Unexpectedly still in game, exiting first");
                bounded("exit_game", limit, async move { menu.exit_game().await }).await?;
                Ok(false)
            }
            MenuAction::DismissModal => {
                match bounded("dismiss_modal", limit, async move { menu.dismiss_modal().await })
                    .await
                {
                    Ok(true) => {
                        self.counters.modal_dismissed();
                        Ok(false)
                    }
                    Ok(false) => Err(self.counters.modal_dismiss_failed()),
                    Err(e) if e.is_unrecoverable() => Err(e),
                    Err(e) => {
                        tracing::debug!("Modal dismiss failed: {}", e);
                        Err(self.counters.modal_dismiss_failed())
                    }
                }
            }
            MenuAction::EnterLobby => {
                bounded("enter_lobby", limit, async move { menu.enter_lobby().await }).await?;
                Ok(false)
            }
            MenuAction::ExitLobby => {
                bounded("exit_lobby", limit, async move { menu.exit_lobby().await }).await?;
                Ok(false)
            }
            MenuAction::CreateGame => {
                if cfg.game.online {
                    let online = menu.clone();
                    bounded("ensure_online", limit, async move { online.ensure_online().await })
                        .await?;
                }
                let result = bounded("new_game", limit, async move { menu.new_game().await }).await;
                self.after_create(cfg, result).await
            }
            MenuAction::CreateLobbyGame => {
                let mut counter = 0;
                self.config.update(|c| {
                    counter = c.game.lobby_game_counter;
                    c.game.lobby_game_counter = counter.saturating_add(1);
                });
                let _ = self.config.persist();
                tracing::info!("Creating lobby game #{}", counter);
                let (name, password) = (
                    cfg.game.lobby_game_name.clone(),
                    cfg.game.lobby_game_password.clone(),
                );
                let result = bounded("create_lobby_game", limit, async move {
                    menu.create_lobby_game(&name, &password, counter).await
                })
                .await
                .map(Some);
                self.after_create(cfg, result).await
            }
            MenuAction::JoinCompanionGame => {
                let link = self.collab.companion.clone().ok_or_else(|| {
                    BotError::Config("companion mode enabled without a companion link".into())
                })?;
                let Some(invite) = link.poll_invite().await else {
                    return Err(BotError::MenuTransient("waiting for leader game".into()));
                };
                tracing::info!("Joining leader game '{}'", invite.name);
                let (name, password) = (invite.name.clone(), invite.password.clone());
                let result = bounded("join_game", limit, async move {
                    menu.join_game(&name, &password).await
                })
                .await
                .map(|()| Some(invite));
                self.after_create(cfg, result).await
            }
        }
    }

    /// 建局 / 加入之后等待进入游戏；失败计入建局计数器
    async fn after_create(
        &mut self,
        cfg: &AppConfig,
        result: Result<Option<GameInvite>, BotError>,
    ) -> Result<bool, BotError> {
        let invite = match result {
            Ok(invite) => invite,
            Err(e) if e.is_unrecoverable() => return Err(e),
            Err(e) => return Err(self.counters.game_create_failed(&e)),
        };

        let deadline = Instant::now() + cfg.supervisor.enter_game_wait();
        loop {
            // 加载中收到停止请求：直接退出菜单流，不计入建局失败
            if self.shutdown.is_shutdown() {
                tracing::info!("Stop requested while waiting for the game to start");
                return Ok(false);
            }
            let p = self.collab.world.predicates().await?;
            if p.in_game {
                self.counters.game_created();
                self.current_invite = invite;
                return Ok(true);
            }
            if p.dismissable_modal_present {
                let cause = BotError::Menu("game creation rejected".into());
                return Err(self.counters.game_create_failed(&cause));
            }
            if Instant::now() >= deadline {
                let cause = BotError::Menu("game did not start".into());
                return Err(self.counters.game_create_failed(&cause));
            }
            if !self.nap(cfg.supervisor.poll_interval()).await {
                return Ok(false);
            }
        }
    }

    /// 一局游戏：建队列 → 遥测 → 卡死看门狗 + 职责调度 → 退出 → 遥测
    async fn play_session(&mut self) -> Result<(), BotError> {
        let cfg = self.config.get();
        let queue = RunQueue::from_config(self.collab.catalog.as_ref(), &cfg)?;
        self.counters = MenuCounters::default();

        let session_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let game_name = self.current_invite.as_ref().map(|i| i.name.clone());
        tracing::info!(
            "Game started (session {}, game {:?}, {} runs)",
            session_id,
            game_name,
            queue.len()
        );
        self.status.send_modify(|s| {
            s.phase = SessionPhase::InGame;
            s.session_started_at = Some(Utc::now());
            s.current_run = None;
        });
        self.collab.events.emit(Event::new(
            session_id.as_str(),
            EventKind::GameCreated {
                game_name,
                runs: queue.names(),
            },
        ));

        if cfg.companion.enabled && cfg.companion.leader {
            if let (Some(link), Some(invite)) = (&self.collab.companion, &self.current_invite) {
                link.announce(invite).await;
            }
        }

        if self.first_session {
            self.first_session = false;
            if cfg.character.check_key_bindings {
                self.check_bindings(&session_id, cfg.supervisor.poll_interval())
                    .await;
            }
        }

        let sup = &cfg.supervisor;
        let session = self.shutdown.token().child_token();
        let watchdog = tokio::spawn(stuck_watchdog(
            self.activity.clone(),
            self.arbiter.clone(),
            self.collab.process.clone(),
            session.clone(),
            sup.activity_check_interval(),
            sup.max_stuck_duration(),
        ));

        let ctx = DutyContext {
            session_id: session_id.clone(),
            config: Arc::new(cfg.clone()),
            arbiter: self.arbiter.clone(),
            activity: self.activity.clone(),
            world: self.world.clone(),
            collab: self.collab.clone(),
            shutdown: self.shutdown.clone(),
            cancel: session.clone(),
            status: self.status.clone(),
        };
        let scheduler = DutyScheduler::new(ctx, queue);
        let result = match cfg.game.max_game_length() {
            // 健康职责在上限处正常结束本局，这里是调度器未能收尾时的兜底
            Some(limit) => {
                match tokio::time::timeout(limit + sup.exit_wait(), scheduler.run()).await {
                    Ok(r) => r,
                    Err(_) => {
                        self.collab.process.detach();
                        Err(BotError::DeadlineExceeded)
                    }
                }
            }
            None => scheduler.run().await,
        };

        session.cancel();
        self.arbiter.stop();
        let stuck = watchdog.await.unwrap_or_else(|e| {
            tracing::warn!("Stuck watchdog task failed: {}", e);
            false
        });

        let result = match result {
            _ if stuck => Err(BotError::Stuck(sup.max_stuck_duration())),
            Err(BotError::Cancelled) if self.shutdown.is_shutdown() => Ok(()),
            other => other,
        };
        match &result {
            Ok(()) => tracing::info!("Game finished successfully"),
            Err(e) if e.is_deadline() => tracing::debug!("Game ended by deadline: {}", e),
            Err(e) => tracing::warn!("Game finished with error: {}", e),
        }

        self.set_phase(SessionPhase::Exiting);
        if !stuck {
            self.exit_game(&cfg).await;
        }

        let reason = FinishReason::from_result(&result);
        let error = result.as_ref().err();
        let screenshot = error.and_then(|_| self.collab.process.screenshot());
        self.collab.events.emit(Event::game_finished(
            &session_id,
            reason,
            started.elapsed(),
            error.map(ToString::to_string),
            screenshot,
        ));
        self.status.send_modify(|s| s.record_game(reason, error));
        self.current_invite = None;

        if stuck {
            return Err(BotError::Unrecoverable(format!(
                "character stuck for {:?}",
                sup.max_stuck_duration()
            )));
        }
        Ok(())
    }

    /// 首局检查必需按键绑定；缺失时暂停，等操作员处理后 resume
    async fn check_bindings(&self, session_id: &str, poll: Duration) {
        let missing = self.collab.process.missing_bindings();
        if missing.is_empty() {
            return;
        }
        tracing::error!(
            "Missing key bindings: {}. Bind them in game and resume",
            missing.join(", ")
        );
        self.collab.events.emit(Event::new(
            session_id,
            EventKind::BindingsMissing { bindings: missing },
        ));
        let handle = self.handle();
        handle.pause();
        while self.arbiter.pause_requested() {
            if !self.nap(poll).await {
                break;
            }
        }
    }

    /// 正常退出；等待离开游戏超时则强杀
    async fn exit_game(&self, cfg: &AppConfig) {
        let limit = cfg.supervisor.menu_action_timeout();
        let menu = self.collab.menu.clone();
        if let Err(e) = bounded("exit_game", limit, async move { menu.exit_game().await }).await {
            tracing::warn!("Failed to exit game: {}", e);
        }

        let deadline = Instant::now() + cfg.supervisor.exit_wait();
        loop {
            let world = self.collab.world.clone();
            match bounded("in_game", limit, async move { world.in_game().await }).await {
                Ok(false) => return,
                Ok(true) => {}
                Err(e) => tracing::debug!("Failed to read in-game state: {}", e),
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Still in game {:?} after exit, killing client",
                    cfg.supervisor.exit_wait()
                );
                if let Err(e) = self.collab.process.kill() {
                    tracing::warn!("Failed to kill client: {}", e);
                }
                return;
            }
            tokio::time::sleep(cfg.supervisor.poll_interval()).await;
        }
    }
}
