//! # Loopback Session
//!
//! Runs one server and N predicting clients over the in-process transport
//! and prints what replication and prediction did.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=riftline_netcode=debug loopback_session --clients 4 --seconds 10
//! loopback_session --config config/netcode.toml
//! ```

use std::sync::Arc;
use std::time::Instant;

use riftline_netcode::{
    Buttons, InputSample, NetcodeConfig, RecordingSink, ScriptedInput, Session, Vec2,
};
use tracing_subscriber::EnvFilter;

/// Render frame length. Deliberately not a multiple of the tick interval.
const FRAME_DT: f32 = 1.0 / 60.0;

/// A walk that turns every second and jumps now and then.
fn script_for(player: u32) -> ScriptedInput {
    let directions = [
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(-1.0, 0.0),
        Vec2::new(0.0, -1.0),
    ];
    let offset = player as usize;
    let samples = (0..400)
        .map(|tick| {
            let direction = directions[(tick / 50 + offset) % directions.len()];
            let jump = (tick + offset * 7) % 90 == 0;
            InputSample::new(direction, Buttons::NONE.with(Buttons::JUMP, jump))
        })
        .collect();
    ScriptedInput::new(samples)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         RIFTLINE LOOPBACK SESSION                                ║");
    println!("║         ONE SERVER, N PREDICTING CLIENTS                         ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // Parse command line arguments (simple parsing, no external deps)
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut clients = 4u32;
    let mut seconds = 10.0f32;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--clients" | "-n" => {
                if i + 1 < args.len() {
                    clients = args[i + 1].parse().unwrap_or(4);
                    i += 1;
                }
            }
            "--seconds" | "-s" => {
                if i + 1 < args.len() {
                    seconds = args[i + 1].parse().unwrap_or(10.0);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: loopback_session [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>      Netcode TOML config (default: built-in)");
                println!("  -n, --clients <NUM>      Connected clients (default: 4)");
                println!("  -s, --seconds <SECS>     Simulated seconds (default: 10)");
                println!("  -h, --help               Show this help");
                return;
            }
            other => {
                tracing::warn!(argument = other, "ignoring unknown argument");
            }
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => match NetcodeConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load {path}: {err}");
                std::process::exit(1);
            }
        },
        None => NetcodeConfig::default(),
    };

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Config:             {}", config_path.as_deref().unwrap_or("built-in"));
    println!("│ Tick Rate:          {} Hz", config.tick_rate);
    println!("│ Snapshot Rate:      {} Hz", config.snapshot_rate);
    println!("│ Clients:            {clients}");
    println!("│ Simulated Time:     {seconds} s");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let sink = Arc::new(RecordingSink::new());
    let mut session = match Session::new(config, sink.clone()) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    for player in 1..=clients {
        session.add_client(player, Box::new(script_for(player)));
    }

    let frames = (seconds / FRAME_DT).ceil() as u64;
    let start = Instant::now();
    for _ in 0..frames {
        session.advance(FRAME_DT);
    }
    let wall = start.elapsed();

    let server = session.server().stats();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                    SESSION SUMMARY                               ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║ Server Ticks:       {:>10}                                   ║", session.server_clock().current_tick());
    println!("║ Inputs Processed:   {:>10}                                   ║", server.inputs_processed);
    println!("║ Snapshots Sent:     {:>10}                                   ║", server.snapshots_sent);
    println!("║ Events Broadcast:   {:>10}                                   ║", server.events_broadcast);
    println!("║ Reconciliations:    {:>10}                                   ║", sink.count("replication.reconciliation"));
    println!("║ Corrections:        {:>10}                                   ║", sink.count("prediction.reconcile"));
    println!("║ Overruns:           {:>10}                                   ║", sink.count("tick.overrun"));
    println!("║ Wall Time:          {:>10.2} ms                                ║", wall.as_secs_f64() * 1000.0);
    println!("╚══════════════════════════════════════════════════════════════════╝");

    for node in session.clients() {
        let client = node.replication();
        let rendered = client.rendered_state();
        println!(
            "player {:>3}: seq {:>5} acked, {:>3} unacked, max replay {:>3}, at ({:.2}, {:.2}, {:.2})",
            client.player_id(),
            client.last_processed_seq(),
            client.unacked_count(),
            client.stats().max_replay,
            rendered.position.x,
            rendered.position.y,
            rendered.position.z,
        );
    }
}
