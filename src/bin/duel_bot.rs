//! Headless duel client.
//!
//! Joins the relay, strafes and fires at whichever opponent is visible. Falls
//! back to shooting the practice target when the relay cannot be reached.

use std::time::Duration;

use clap::Parser;
use glam::{Vec2, Vec3};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::info;

use aim_duel::client::movement::MoveKeys;
use aim_duel::client::{
    start_session, ClientGameState, FrameInput, GameMode, GameType, Notification, RelayConnection,
};
use aim_duel::ws::protocol::ServerMsg;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
/// Seconds between strafe direction flips
const STRAFE_PERIOD: f32 = 1.5;
const PING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "duel-bot")]
#[command(about = "Headless client for the aim duel relay")]
struct Args {
    #[arg(short, long, default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    #[arg(long, help = "Skip the relay and shoot the practice target")]
    practice: bool,

    #[arg(long, help = "Round length in seconds (1-300); free play when unset")]
    timed: Option<u32>,

    #[arg(long, help = "Stop after this many seconds")]
    duration: Option<u64>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let mode = match args.timed {
        Some(seconds) => GameMode::timed(seconds)?,
        None => GameMode::Free,
    };

    let url = (!args.practice).then_some(args.url.as_str());
    let (mut state, mut relay) = start_session(url, mode).await;
    info!(game_type = ?state.game_type, mode = ?state.mode, "Bot started");

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let mut frames = interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut pings = interval(PING_INTERVAL);
    let mut last_frame = Instant::now();

    let stop_at = sleep_until(deadline);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(stop_at, interrupted);

    loop {
        tokio::select! {
            _ = frames.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last_frame).as_secs_f32();
                last_frame = now;

                let input = bot_input(&mut state);
                let out = state.frame(dt, &input);
                if let Some(relay) = relay.as_ref() {
                    relay.send_all(out.outgoing);
                }
                for notification in &out.notifications {
                    report(notification);
                }
                if state.is_game_over() {
                    break;
                }
            }
            _ = pings.tick(), if relay.is_some() => {
                if let Some(relay) = relay.as_ref() {
                    relay.ping();
                }
            }
            msg = recv(&mut relay) => match msg {
                Some(msg) => {
                    for notification in state.handle_server_msg(msg) {
                        report(&notification);
                    }
                }
                None => {
                    info!("Relay closed, continuing in practice mode");
                    relay = None;
                    if state.game_type == GameType::Duel {
                        state.degrade_to_practice();
                    }
                }
            },
            _ = &mut stop_at => {
                info!("Duration elapsed");
                break;
            }
            _ = &mut interrupted => {
                info!("Interrupted");
                break;
            }
        }
    }

    info!(
        shots_fired = state.combat.shots_fired,
        shots_hit = state.combat.shots_hit,
        score = state.combat.score,
        accuracy = state.combat.accuracy(),
        "Bot finished"
    );
    Ok(())
}

/// Next relay message, or never when there is no relay
async fn recv(relay: &mut Option<RelayConnection>) -> Option<ServerMsg> {
    match relay.as_mut() {
        Some(relay) => relay.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Strafe side to side and keep the crosshair on the nearest target
fn bot_input(state: &mut ClientGameState) -> FrameInput {
    let aim_point = match state.game_type {
        GameType::Practice => state.practice_target.as_ref().map(|t| t.position),
        GameType::Duel => state
            .mirrors
            .values()
            .find(|m| m.visible)
            .map(|m| m.position + Vec3::Y),
    };

    let strafe_right = (state.clock() / STRAFE_PERIOD) as u32 % 2 == 0;
    let keys = MoveKeys {
        left: !strafe_right,
        right: strafe_right,
        ..Default::default()
    };

    match aim_point {
        Some(point) => {
            state.controller.look_at(point);
            FrameInput {
                keys,
                look_delta: Vec2::ZERO,
                trigger_pressed: false,
                trigger_held: true,
                ..Default::default()
            }
        }
        None => FrameInput {
            keys,
            ..Default::default()
        },
    }
}

fn report(notification: &Notification) {
    match notification {
        Notification::ShotFired { .. } | Notification::OpponentMoved { .. } => {}
        Notification::GameOver { score, accuracy } => {
            info!(score, accuracy, "Game over");
        }
        other => info!(event = ?other, "Duel event"),
    }
}
