//! End-to-end tests over the loopback transport.

use std::sync::Arc;

use riftline_netcode::transport::LoopbackHub;
use riftline_netcode::{
    Buttons, GameEvent, GameEventType, InputSample, NetcodeConfig, RecordingSink,
    ReplicationManager, Role, ScriptedInput, Session, TickClock, Vec2, Vec3,
};

fn walk(direction: Vec2) -> Box<ScriptedInput> {
    Box::new(ScriptedInput::constant(InputSample::new(direction, Buttons::NONE)))
}

#[test]
fn test_late_joiner_predicts_in_step() {
    let sink = Arc::new(RecordingSink::new());
    let mut session = Session::new(NetcodeConfig::default(), sink.clone()).unwrap();
    session.add_client(1, walk(Vec2::new(1.0, 0.0)));
    let dt = session.server_clock().tick_interval();

    for _ in 0..50 {
        session.advance(dt);
    }
    session.add_client(2, walk(Vec2::new(0.0, -1.0)));
    for _ in 0..50 {
        session.advance(dt);
    }

    let late = session.client(2).unwrap();
    assert_eq!(late.engine().stats().corrections, 0);
    assert!(late.last_processed_seq() >= 45);
    assert!(late.rendered_state().position.z < 0.0);
    assert_eq!(sink.count("replication.player_joined"), 2);
}

#[test]
fn test_server_correction_is_smoothed_not_snapped() {
    let sink = Arc::new(RecordingSink::new());
    let mut session = Session::new(NetcodeConfig::default(), sink.clone()).unwrap();
    session.add_client(1, walk(Vec2::new(1.0, 0.0)));
    let dt = session.server_clock().tick_interval();
    for _ in 0..20 {
        session.advance(dt);
    }

    // Server-only rule the client cannot predict: a knockback
    let mut knocked = *session.server().player(1).map(|p| p.state()).unwrap();
    knocked.position = knocked.position + Vec3::new(-2.0, 0.0, 0.0);
    assert!(session.server_mut().set_state(1, knocked));

    let mut previous = session.client(1).unwrap().rendered_state().position.x;
    let mut jump = None;
    for _ in 0..20 {
        session.advance(dt);
        let client = session.client(1).unwrap();
        let x = client.rendered_state().position.x;
        if jump.is_none() && client.engine().stats().corrections == 1 {
            jump = Some(x - previous);
        }
        previous = x;
    }

    // The simulated state moved back 2 units, the rendered one barely moved
    let jump = jump.unwrap();
    assert!(jump.abs() < 0.5, "rendered jump {jump}");
    assert_eq!(sink.count("prediction.reconcile"), 1);

    for _ in 0..50 {
        session.advance(dt);
    }
    let client = session.client(1).unwrap();
    assert_eq!(sink.count("prediction.smoothing_complete"), 1);
    assert!(client.engine().smoother().is_settled());
    assert_eq!(client.rendered_state(), client.engine().latest_predicted());
}

#[test]
fn test_events_reach_every_client_once() {
    let mut session = Session::new(NetcodeConfig::default(), Arc::new(RecordingSink::new())).unwrap();
    for player in 1..=3 {
        session.add_client(player, walk(Vec2::new(0.0, 1.0)));
    }
    let dt = session.server_clock().tick_interval();
    session.advance(dt);
    session.advance(dt);

    let deposit = GameEvent::new(GameEventType::ScoreDeposit, 2, 3).with_value(40);
    session.server_mut().broadcast_event(deposit);
    session.advance(dt);

    for player in 1..=3 {
        let events = session
            .client_mut(player)
            .map(riftline_netcode::ClientReplication::drain_events)
            .unwrap();
        let deposits: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == GameEventType::ScoreDeposit)
            .collect();
        assert_eq!(deposits, vec![&deposit]);
    }

    let journal = session.server().journal();
    assert_eq!(journal.replay_range(2, 2).filter(|e| e.value == 40).count(), 1);
}

#[test]
fn test_config_file_round_trip() {
    let path = std::env::temp_dir().join(format!("riftline_netcode_{}.toml", std::process::id()));
    std::fs::write(&path, "tick_rate = 30\n[motion]\nmove_speed = 7.5\n").unwrap();

    let config = NetcodeConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.tick_rate, 30);
    assert!((config.motion.move_speed - 7.5).abs() < f32::EPSILON);
    assert_eq!(config.snapshot_rate, 20);
    assert!(NetcodeConfig::load("/nonexistent/riftline.toml").is_err());
}

#[test]
fn test_manager_drives_either_role() {
    let config = NetcodeConfig::default();
    let sink = Arc::new(RecordingSink::new());
    let hub = LoopbackHub::new();

    let mut server_clock = TickClock::new(&config, sink.clone());
    let mut client_clock = TickClock::new(&config, sink.clone());
    let mut server = ReplicationManager::new(Role::Server, &config, &mut server_clock, hub.server(), sink.clone());
    let mut client =
        ReplicationManager::new(Role::Client(5), &config, &mut client_clock, hub.connect(5), sink);
    server_clock.start();
    client_clock.start();

    let dt = config.tick_interval();
    for _ in 0..10 {
        client_clock.advance(dt);
        if let Some(c) = client.as_client_mut() {
            c.send_input(Vec2::new(1.0, 0.0), Buttons::NONE);
        }
        client.update(dt);
        server_clock.advance(dt);
        server.update(dt);
    }
    client.update(dt);

    assert_eq!(server.role(), Role::Server);
    assert_eq!(server.as_server().map(|s| s.player_count()), Some(1));
    assert!(client.as_client().map_or(0, |c| c.last_processed_seq()) > 0);
}
