//! 会话监管集成测试：菜单流、看门狗与恢复阶梯，全部跑在模拟客户端和暂停的时钟上

use std::sync::Arc;
use std::time::Duration;

use hireling::client::mock::{MockCatalog, MockClient, MockCompanion, MockRun};
use hireling::client::CompanionLink;
use hireling::config::AppConfig;
use hireling::core::{
    BotError, ClientPredicates, FinishReason, SessionPhase, SessionSupervisor, ShutdownManager,
    ShutdownReason, SupervisorHandle,
};
use hireling::events::{self, Event, EventKind};
use hireling::SupervisorBuilder;
use tokio::sync::mpsc;

struct Rig {
    client: Arc<MockClient>,
    supervisor: SessionSupervisor,
    handle: SupervisorHandle,
    events: mpsc::UnboundedReceiver<Event>,
    shutdown: ShutdownManager,
}

fn rig(config: AppConfig, runs: Vec<MockRun>) -> Rig {
    rig_with(config, runs, None)
}

fn rig_with(
    config: AppConfig,
    runs: Vec<MockRun>,
    companion: Option<Arc<dyn CompanionLink>>,
) -> Rig {
    let client = MockClient::new();
    let (sink, events) = events::channel();
    let shutdown = ShutdownManager::new();
    let mut builder = client
        .attach(SupervisorBuilder::new(config))
        .catalog(Arc::new(MockCatalog::new(runs)))
        .events(Arc::new(sink))
        .shutdown(shutdown.clone());
    if let Some(link) = companion {
        builder = builder.companion(link);
    }
    let supervisor = builder.build().unwrap();
    let handle = supervisor.handle();
    Rig {
        client,
        supervisor,
        handle,
        events,
        shutdown,
    }
}

/// 等到打完 n 局后请求停止
async fn stop_after_games(handle: SupervisorHandle, n: u64) {
    let mut rx = handle.subscribe();
    loop {
        if rx.borrow_and_update().games >= n {
            break;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
    handle.stop();
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

fn games_finished(kinds: &[EventKind]) -> Vec<(FinishReason, Option<String>)> {
    kinds
        .iter()
        .filter_map(|k| match k {
            EventKind::GameFinished {
                reason, screenshot, ..
            } => Some((*reason, screenshot.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_games_loop_until_stopped() {
    let mut rig = rig(
        AppConfig::default(),
        vec![MockRun::succeed("countess"), MockRun::succeed("andariel")],
    );
    rig.client.wander(true);

    let (result, ()) = tokio::join!(
        rig.supervisor.run(),
        stop_after_games(rig.handle.clone(), 2)
    );

    assert_eq!(result, Ok(()));
    let status = rig.handle.status();
    assert!(status.games >= 2);
    assert_eq!(status.phase, SessionPhase::Stopped);
    assert_eq!(rig.client.kill_count(), 0);

    let kinds = drain(&mut rig.events);
    let created = kinds
        .iter()
        .filter(|k| matches!(k, EventKind::GameCreated { .. }))
        .count();
    assert!(created >= 2);
    assert!(games_finished(&kinds)
        .iter()
        .all(|(reason, screenshot)| *reason == FinishReason::Ok && screenshot.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_died_ends_game_but_supervisor_continues() {
    let mut rig = rig(
        AppConfig::default(),
        vec![MockRun::fail("andariel", BotError::Died)],
    );
    rig.client.wander(true);

    let (result, ()) = tokio::join!(
        rig.supervisor.run(),
        stop_after_games(rig.handle.clone(), 2)
    );

    assert_eq!(result, Ok(()));
    let status = rig.handle.status();
    assert!(status.finish_counts.get(&FinishReason::Died).copied().unwrap_or(0) >= 2);
    let finished = games_finished(&drain(&mut rig.events));
    assert_eq!(finished[0].0, FinishReason::Died);
    assert!(finished[0].1.is_some());
    assert_eq!(rig.client.kill_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_menu_call_times_out_and_kills_client() {
    let mut rig = rig(AppConfig::default(), vec![MockRun::succeed("pit")]);
    rig.client.hang_new_game(true);

    let result = rig.supervisor.run().await;

    assert_eq!(
        result,
        Err(BotError::MenuActionTimeout {
            action: "new_game",
            timeout: Duration::from_secs(30)
        })
    );
    assert_eq!(rig.client.kill_count(), 1);
    assert_eq!(rig.handle.status().phase, SessionPhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_modal_dismiss_ceiling_is_unrecoverable() {
    let mut rig = rig(AppConfig::default(), vec![MockRun::succeed("pit")]);
    rig.client.set_predicates(ClientPredicates {
        in_character_selection: true,
        dismissable_modal_present: true,
        ..Default::default()
    });
    rig.client.script_dismiss(vec![false, false, false]);

    let result = rig.supervisor.run().await;

    assert!(matches!(result, Err(BotError::Unrecoverable(_))));
    assert_eq!(rig.client.call_count("dismiss_modal"), 3);
    assert_eq!(rig.client.kill_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_modal_dismiss_success_resets_counter() {
    let mut rig = rig(AppConfig::default(), vec![MockRun::succeed("pit")]);
    rig.client.wander(true);
    rig.client.set_predicates(ClientPredicates {
        in_character_selection: true,
        dismissable_modal_present: true,
        ..Default::default()
    });
    rig.client.script_dismiss(vec![false, false, true]);

    let (result, ()) = tokio::join!(
        rig.supervisor.run(),
        stop_after_games(rig.handle.clone(), 1)
    );

    assert_eq!(result, Ok(()));
    assert_eq!(rig.client.kill_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_modal_dismiss_errors_count_toward_ceiling() {
    let mut rig = rig(AppConfig::default(), vec![MockRun::succeed("pit")]);
    rig.client.set_predicates(ClientPredicates {
        in_character_selection: true,
        dismissable_modal_present: true,
        ..Default::default()
    });
    rig.client.fail_dismiss(3);

    let result = rig.supervisor.run().await;

    assert!(matches!(result, Err(BotError::Unrecoverable(ref m)) if m.contains("dismiss modal")));
    assert_eq!(rig.client.call_count("dismiss_modal"), 3);
    assert_eq!(rig.client.kill_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_game_is_loading() {
    let mut rig = rig(AppConfig::default(), vec![MockRun::succeed("pit")]);
    rig.client.stall_loading(true);

    let handle = rig.handle.clone();
    let operator = async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.stop();
    };
    let (result, ()) = tokio::join!(rig.supervisor.run(), operator);

    assert_eq!(result, Ok(()));
    assert_eq!(rig.client.call_count("new_game"), 1);
    assert_eq!(rig.client.kill_count(), 0);
    let status = rig.handle.status();
    assert_eq!(status.games, 0);
    assert_eq!(status.last_error, None);
    assert!(!drain(&mut rig.events)
        .iter()
        .any(|k| matches!(k, EventKind::GameCreated { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_game_create_ceiling_is_unrecoverable() {
    let mut rig = rig(AppConfig::default(), vec![MockRun::succeed("pit")]);
    rig.client.script_new_game(
        (0..5)
            .map(|_| Err(BotError::Menu("server busy".into())))
            .collect(),
    );

    let result = rig.supervisor.run().await;

    assert!(matches!(result, Err(BotError::Unrecoverable(ref m)) if m.contains("server busy")));
    assert_eq!(rig.client.call_count("new_game"), 5);
    assert_eq!(rig.client.kill_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_modal_rejected_creation_counts_toward_ceiling() {
    let mut rig = rig(AppConfig::default(), vec![MockRun::succeed("pit")]);
    rig.client.reject_with_modal(5);

    let result = rig.supervisor.run().await;

    assert!(matches!(result, Err(BotError::Unrecoverable(ref m)) if m.contains("rejected")));
    assert_eq!(rig.client.call_count("new_game"), 5);
    assert_eq!(rig.client.kill_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_level_cap_stops_supervisor() {
    let mut config = AppConfig::default();
    config.character.level_cap = 10;
    let mut rig = rig(config, vec![MockRun::hang("chaos")]);
    rig.client.wander(true);
    rig.client.update_world(|w| w.level = 15);

    let result = rig.supervisor.run().await;

    assert_eq!(result, Ok(()));
    assert_eq!(
        rig.shutdown.reason(),
        Some(ShutdownReason::LevelCapReached(15))
    );
    assert_eq!(rig.handle.status().games, 1);
    assert_eq!(rig.client.call_count("exit_game"), 1);
    assert_eq!(rig.client.kill_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_character_kills_client_once() {
    let mut config = AppConfig::default();
    config.scheduler.long_idle_secs = 3600;
    let mut rig = rig(config, vec![MockRun::hang("stuck")]);

    let result = rig.supervisor.run().await;

    assert!(matches!(result, Err(BotError::Unrecoverable(ref m)) if m.contains("stuck")));
    assert_eq!(rig.client.kill_count(), 1);
    // 卡死时不再尝试正常退出
    assert_eq!(rig.client.call_count("exit_game"), 0);
    let finished = games_finished(&drain(&mut rig.events));
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].0, FinishReason::Error);
}

#[tokio::test(start_paused = true)]
async fn test_frozen_menu_read_hits_outer_watchdog() {
    let mut rig = rig(AppConfig::default(), vec![MockRun::succeed("pit")]);
    rig.client.hang_predicates(true);

    let result = rig.supervisor.run().await;

    assert_eq!(
        result,
        Err(BotError::NotInGameTimeout(Duration::from_secs(300)))
    );
    assert_eq!(rig.client.kill_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_max_game_length_ends_game_quietly() {
    let mut config = AppConfig::default();
    config.game.max_game_length_secs = 10;
    let mut rig = rig(config, vec![MockRun::hang("cows")]);
    rig.client.wander(true);

    let (result, ()) = tokio::join!(
        rig.supervisor.run(),
        stop_after_games(rig.handle.clone(), 1)
    );

    assert_eq!(result, Ok(()));
    let status = rig.handle.status();
    assert_eq!(status.finish_counts.get(&FinishReason::Error), Some(&1));
    let first_error = drain(&mut rig.events).into_iter().find_map(|k| match k {
        EventKind::GameFinished { error, .. } => error,
        _ => None,
    });
    assert!(first_error.is_some());
    assert_eq!(rig.client.kill_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_bindings_pause_until_resume() {
    let mut rig = rig(AppConfig::default(), vec![MockRun::succeed("pit")]);
    rig.client.wander(true);
    rig.client.set_missing_bindings(vec!["teleport".to_string()]);

    let handle = rig.handle.clone();
    let operator = async move {
        let mut rx = handle.subscribe();
        while !rx.borrow_and_update().paused {
            if rx.changed().await.is_err() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.status().games, 0);
        handle.resume();
        stop_after_games(handle, 1).await;
    };
    let (result, ()) = tokio::join!(rig.supervisor.run(), operator);

    assert_eq!(result, Ok(()));
    let kinds = drain(&mut rig.events);
    assert!(kinds.iter().any(
        |k| matches!(k, EventKind::BindingsMissing { bindings } if bindings == &["teleport"])
    ));
    assert_eq!(rig.handle.status().games, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lobby_games_use_incrementing_counter() {
    let mut config = AppConfig::default();
    config.game.create_lobby_games = true;
    config.game.lobby_game_name = "cows".to_string();
    let mut rig = rig(config, vec![MockRun::succeed("pit")]);
    rig.client.wander(true);

    let (result, ()) = tokio::join!(
        rig.supervisor.run(),
        stop_after_games(rig.handle.clone(), 2)
    );

    assert_eq!(result, Ok(()));
    let names: Vec<Option<String>> = drain(&mut rig.events)
        .into_iter()
        .filter_map(|k| match k {
            EventKind::GameCreated { game_name, .. } => Some(game_name),
            _ => None,
        })
        .collect();
    assert_eq!(names[0].as_deref(), Some("cows-1"));
    assert_eq!(names[1].as_deref(), Some("cows-2"));
    assert!(rig.client.call_count("enter_lobby") >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_follower_joins_leader_game() {
    let link = MockCompanion::new();

    let mut leader_cfg = AppConfig::default();
    leader_cfg.companion.enabled = true;
    leader_cfg.companion.leader = true;
    let mut leader = rig_with(
        leader_cfg,
        vec![MockRun::new(
            "baal",
            hireling::client::mock::MockBehavior::Succeed(Duration::from_secs(20)),
        )],
        Some(link.clone() as Arc<dyn CompanionLink>),
    );
    leader.client.wander(true);

    let mut follower_cfg = AppConfig::default();
    follower_cfg.companion.enabled = true;
    follower_cfg.companion.leader = false;
    let mut follower = rig_with(follower_cfg, vec![MockRun::succeed("baal")], Some(link as Arc<dyn CompanionLink>));
    follower.client.wander(true);

    let leader_handle = leader.handle.clone();
    let follower_handle = follower.handle.clone();
    let (leader_result, follower_result, ()) = tokio::join!(
        leader.supervisor.run(),
        follower.supervisor.run(),
        async move {
            stop_after_games(follower_handle, 1).await;
            leader_handle.stop();
        }
    );

    assert_eq!(leader_result, Ok(()));
    assert_eq!(follower_result, Ok(()));
    assert_eq!(follower.client.call_count("join_game"), 1);
    let joined = drain(&mut follower.events).into_iter().find_map(|k| match k {
        EventKind::GameCreated { game_name, .. } => game_name,
        _ => None,
    });
    assert_eq!(joined.as_deref(), Some("mock-1"));
}
