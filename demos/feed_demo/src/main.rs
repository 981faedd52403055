//! Feed Demo
//!
//! Runs a server game and a client replica in one process. The server's
//! wire object goes through a [`FeedPublisher`] into a std channel; the
//! client drains the channel into a [`FeedReceiver`] and rebuilds the game
//! with [`ClientGame::from_root`].
//!
//! Each wall-clock tick advances the virtual game clock by `STEP_MS`, so a
//! short run covers construction and a few mining cycles.
//!
//! Set `RUST_LOG` to change the log filter (default `info`), and pass a RON
//! file path as the first argument to override the game rules.

use chrono::{DateTime, Utc};
use outpost_core::Scheduler;
use outpost_game::{
    dump_game, ClientGame, Game, GameConfig, HexCoord, PlaceBuildingRequest, ServerGame,
};
use outpost_sync::{FeedPublisher, FeedReceiver, FrameSource};
use std::sync::mpsc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Virtual milliseconds per wall-clock tick
const STEP_MS: u64 = 500;

/// Ticks before the demo stops
const TICKS: u32 = 60;

/// Commands the "player" sends, keyed by the tick they go out on
const COMMANDS: &[(u32, &str)] = &[
    (2, r#"{"type": "Mineshaft", "coord": {"i": 0, "j": 0}}"#),
    (4, r#"{"type": "Habitat", "coord": {"i": 1, "j": -1}}"#),
    (6, r#"{"type": "Mineshaft", "coord": {"i": 0, "j": 0}}"#),
    (8, r#"{"type": "Castle", "coord": {"i": 2, "j": 2}}"#),
];

fn load_config() -> Result<GameConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(GameConfig::load(path)?),
        None => Ok(GameConfig::default()),
    }
}

fn describe(game: &impl Game, now: u64) -> String {
    let buildings = game
        .buildings()
        .members()
        .iter()
        .map(|building| {
            format!(
                "{}@{} {:.0}%",
                building.kind.name(),
                building.coord,
                building.state.value().progress(now) * 100.0
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "counter={} xp={} iron={} buildings=[{}]",
        game.counter().value(),
        game.xp().value(),
        game.iron().value(),
        buildings
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config()?;
    let started: DateTime<Utc> = Utc::now();
    let epoch = u64::try_from(started.timestamp_millis())?;
    tracing::info!(%started, ?config, "starting feed demo");

    // Server side
    let scheduler = Scheduler::new(epoch);
    let server = ServerGame::new(scheduler.clone(), config.clone())?;
    let root = dump_game(&server)?;
    let mut publisher = FeedPublisher::start(&root, &config.feed)?;

    let (tx, mut rx) = mpsc::channel::<String>();
    let mut peer = publisher.connect(tx)?;

    // Client side
    let first = rx.recv_frame()?.ok_or("feed closed before the first frame")?;
    let mut receiver = FeedReceiver::from_encoded(&first)?;
    let client = ClientGame::from_root(&receiver.root(), &config)?;
    tracing::info!(seq = receiver.last_seq(), "client joined");

    let mut interval = tokio::time::interval(Duration::from_millis(100));
    for tick in 1..=TICKS {
        interval.tick().await;

        for body in COMMANDS
            .iter()
            .filter(|(at, _)| *at == tick)
            .map(|(_, body)| *body)
        {
            let placed = PlaceBuildingRequest::decode(body)
                .and_then(|request| server.apply_command(&request));
            match placed {
                Ok(true) => tracing::info!(tick, body, "building placed"),
                Ok(false) => tracing::info!(tick, body, "tile occupied"),
                Err(err) => tracing::warn!(tick, %err, "command rejected"),
            }
        }

        scheduler.advance_by(STEP_MS);
        let applied = receiver.drain(&mut rx)?;

        let now = scheduler.now();
        tracing::info!(
            tick,
            applied,
            seq = receiver.last_seq(),
            "client {}",
            describe(&client, now)
        );
    }

    let coord = HexCoord::new(0, 0);
    if let Some(shaft) = client.building_at(coord).value() {
        tracing::info!(%coord, complete = shaft.state.value().is_complete(), "client sees mineshaft");
    }
    let synced = receiver.document() == &publisher.document();
    tracing::info!(synced, server = %describe(&server, scheduler.now()), "final state");

    peer.cancel()?;
    publisher.stop()?;
    let elapsed = Utc::now().signed_duration_since(started);
    tracing::info!(elapsed_ms = elapsed.num_milliseconds(), "feed demo finished");
    Ok(())
}
