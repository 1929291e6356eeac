//! 状态定义：菜单谓词、菜单决策、重试计数与监管状态投影
//!
//! 菜单状态机不保存状态：每个周期由 ClientPredicates 重新推导下一步动作，
//! 只有两个重试计数器（弹窗关闭失败、建局失败）跨周期保留。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{BotError, FinishReason};

/// 关闭弹窗连续失败上限
pub const MAX_MODAL_DISMISS_ATTEMPTS: u32 = 3;
/// 建局连续失败上限
pub const MAX_GAME_CREATE_ATTEMPTS: u32 = 5;

/// 菜单流每个周期读取的客户端谓词
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientPredicates {
    pub in_game: bool,
    pub loading_screen: bool,
    pub in_character_creation: bool,
    pub dismissable_modal_present: bool,
    pub in_character_selection: bool,
    pub in_lobby: bool,
}

/// 菜单流模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuMode {
    /// 角色选择界面直接建局
    Standard,
    /// 进入大厅按计数器命名建局
    Lobby,
    /// 跟随队长加入其游戏
    Companion,
}

/// 菜单流下一步动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    WaitLoading,
    ExitCharacterCreation,
    /// 仍在游戏中（上一局残留），先退出
    ExitGame,
    DismissModal,
    /// 角色选择界面：确保在线后建局
    CreateGame,
    EnterLobby,
    CreateLobbyGame,
    ExitLobby,
    /// 大厅中等待队长的邀请
    JoinCompanionGame,
    /// 无法识别的菜单状态
    Unknown,
}

/// 纯函数：根据谓词推导下一步动作，检查顺序即优先级
pub fn next_menu_action(p: &ClientPredicates, mode: MenuMode) -> MenuAction {
    if p.loading_screen {
        return MenuAction::WaitLoading;
    }
    if p.in_character_creation {
        return MenuAction::ExitCharacterCreation;
    }
    if p.in_game {
        return MenuAction::ExitGame;
    }
    if p.dismissable_modal_present {
        return MenuAction::DismissModal;
    }
    match mode {
        MenuMode::Companion if p.in_character_selection => MenuAction::EnterLobby,
        MenuMode::Companion if p.in_lobby => MenuAction::JoinCompanionGame,
        MenuMode::Lobby if p.in_character_selection => MenuAction::EnterLobby,
        MenuMode::Lobby if p.in_lobby => MenuAction::CreateLobbyGame,
        MenuMode::Standard if p.in_character_selection => MenuAction::CreateGame,
        MenuMode::Standard if p.in_lobby => MenuAction::ExitLobby,
        _ => MenuAction::Unknown,
    }
}

/// 跨周期保留的两个重试计数器
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuCounters {
    pub modal_dismiss_failures: u32,
    pub game_create_failures: u32,
}

impl MenuCounters {
    pub fn modal_dismissed(&mut self) {
        self.modal_dismiss_failures = 0;
    }

    /// 记录一次关闭失败，返回本周期的错误；达到上限时清零并返回不可恢复
    pub fn modal_dismiss_failed(&mut self) -> BotError {
        self.modal_dismiss_failures += 1;
        if self.modal_dismiss_failures >= MAX_MODAL_DISMISS_ATTEMPTS {
            self.modal_dismiss_failures = 0;
            return BotError::Unrecoverable(format!(
                "failed to dismiss modal {MAX_MODAL_DISMISS_ATTEMPTS} times in a row"
            ));
        }
        BotError::Menu(format!(
            "failed to dismiss modal (attempt {}/{MAX_MODAL_DISMISS_ATTEMPTS})",
            self.modal_dismiss_failures
        ))
    }

    pub fn game_created(&mut self) {
        self.game_create_failures = 0;
    }

    pub fn game_create_failed(&mut self, cause: &BotError) -> BotError {
        self.game_create_failures += 1;
        if self.game_create_failures >= MAX_GAME_CREATE_ATTEMPTS {
            self.game_create_failures = 0;
            return BotError::Unrecoverable(format!(
                "failed to create game {MAX_GAME_CREATE_ATTEMPTS} times in a row: {cause}"
            ));
        }
        BotError::Menu(format!(
            "game creation failed (attempt {}/{MAX_GAME_CREATE_ATTEMPTS}): {cause}",
            self.game_create_failures
        ))
    }
}

/// 监管状态机阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Starting,
    NotInGame,
    InGame,
    Exiting,
    Stopped,
}

/// 对外投影的监管状态（通过 watch 通道发布）
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub phase: SessionPhase,
    pub paused: bool,
    pub games: u64,
    pub finish_counts: HashMap<FinishReason, u64>,
    pub current_run: Option<String>,
    pub last_error: Option<String>,
    pub session_started_at: Option<DateTime<Utc>>,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Starting,
            paused: false,
            games: 0,
            finish_counts: HashMap::new(),
            current_run: None,
            last_error: None,
            session_started_at: None,
        }
    }
}

impl SupervisorStatus {
    /// 一局结束时合并结果
    pub fn record_game(&mut self, reason: FinishReason, error: Option<&BotError>) {
        self.games += 1;
        *self.finish_counts.entry(reason).or_insert(0) += 1;
        self.last_error = error.map(ToString::to_string);
        self.current_run = None;
        self.session_started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_screen_wins() {
        let p = ClientPredicates {
            loading_screen: true,
            in_game: true,
            dismissable_modal_present: true,
            ..Default::default()
        };
        assert_eq!(next_menu_action(&p, MenuMode::Standard), MenuAction::WaitLoading);
    }

    #[test]
    fn test_character_creation_then_in_game_then_modal() {
        let mut p = ClientPredicates {
            in_character_creation: true,
            in_game: true,
            dismissable_modal_present: true,
            ..Default::default()
        };
        assert_eq!(
            next_menu_action(&p, MenuMode::Standard),
            MenuAction::ExitCharacterCreation
        );
        p.in_character_creation = false;
        assert_eq!(next_menu_action(&p, MenuMode::Standard), MenuAction::ExitGame);
        p.in_game = false;
        assert_eq!(next_menu_action(&p, MenuMode::Standard), MenuAction::DismissModal);
    }

    #[test]
    fn test_mode_branches() {
        let select = ClientPredicates {
            in_character_selection: true,
            ..Default::default()
        };
        let lobby = ClientPredicates {
            in_lobby: true,
            ..Default::default()
        };
        assert_eq!(next_menu_action(&select, MenuMode::Standard), MenuAction::CreateGame);
        assert_eq!(next_menu_action(&lobby, MenuMode::Standard), MenuAction::ExitLobby);
        assert_eq!(next_menu_action(&select, MenuMode::Lobby), MenuAction::EnterLobby);
        assert_eq!(next_menu_action(&lobby, MenuMode::Lobby), MenuAction::CreateLobbyGame);
        assert_eq!(
            next_menu_action(&lobby, MenuMode::Companion),
            MenuAction::JoinCompanionGame
        );
        assert_eq!(
            next_menu_action(&ClientPredicates::default(), MenuMode::Lobby),
            MenuAction::Unknown
        );
    }

    #[test]
    fn test_modal_dismiss_escalates_on_third_failure() {
        let mut counters = MenuCounters::default();
        assert!(matches!(counters.modal_dismiss_failed(), BotError::Menu(_)));
        assert!(matches!(counters.modal_dismiss_failed(), BotError::Menu(_)));
        let third = counters.modal_dismiss_failed();
        assert!(matches!(third, BotError::Unrecoverable(_)));
        assert_eq!(counters.modal_dismiss_failures, 0);
    }

    #[test]
    fn test_modal_success_resets_counter() {
        let mut counters = MenuCounters::default();
        let _ = counters.modal_dismiss_failed();
        let _ = counters.modal_dismiss_failed();
        counters.modal_dismissed();
        assert!(matches!(counters.modal_dismiss_failed(), BotError::Menu(_)));
        assert_eq!(counters.modal_dismiss_failures, 1);
    }

    #[test]
    fn test_game_create_ceiling() {
        let mut counters = MenuCounters::default();
        let cause = BotError::Menu("create failed".into());
        for _ in 1..MAX_GAME_CREATE_ATTEMPTS {
            assert!(matches!(counters.game_create_failed(&cause), BotError::Menu(_)));
        }
        assert!(matches!(
            counters.game_create_failed(&cause),
            BotError::Unrecoverable(_)
        ));
        assert_eq!(counters.game_create_failures, 0);
    }

    #[test]
    fn test_status_record_game() {
        let mut status = SupervisorStatus::default();
        status.record_game(FinishReason::Died, Some(&BotError::Died));
        status.record_game(FinishReason::Ok, None);
        assert_eq!(status.games, 2);
        assert_eq!(status.finish_counts.get(&FinishReason::Died), Some(&1));
        assert!(status.last_error.is_none());
    }
}
