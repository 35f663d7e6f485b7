//! Interactive console for the live advisor: mirror moves by hand or follow
//! a remote game, and watch the engine's ranked suggestions track the
//! position.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use advisor::config::AdvisorConfig;
use advisor::feed::HttpRelay;
use advisor::session::{AnalysisSession, EngineView};
use advisor::sync::{GameSync, SyncState, SyncStatus};
use chess_core::Game;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AdvisorConfig::from_env();
    let session = AnalysisSession::start(config.engine.clone())?;
    let mut sync = GameSync::new(
        HttpRelay::new(config.relay_url.clone()),
        config.poll_interval,
    );
    let mut updates = sync.updates().expect("update stream taken twice");
    let mut view = session.view();
    let mut sync_state = sync.state();

    let mut game = Game::new();
    session.analyze(game.position());

    println!("kibitz advisor (type 'help' for commands)");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut input = stdin.lines();
    let mut engine_ready = false;

    loop {
        tokio::select! {
            line = input.next_line() => {
                match line? {
                    None => break,
                    Some(text) => {
                        if !handle_command(text.trim(), &mut game, &session, &mut sync) {
                            break;
                        }
                    }
                }
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                // Coalesce bursts of engine output before printing.
                tokio::time::sleep(Duration::from_millis(200)).await;
                let current = view.borrow_and_update().clone();
                if current.is_ready && !engine_ready {
                    engine_ready = true;
                    println!("engine ready");
                }
                print_view(&current);
            }
            update = updates.recv() => {
                if let Some(update) = update {
                    match Game::replay_sans(&update.san_moves) {
                        Ok(remote) => {
                            game = remote;
                            if let Some((from, to)) = update.last_move {
                                println!("remote move: {from} -> {to}");
                            }
                            session.analyze(game.position());
                        }
                        Err(e) => tracing::warn!(error = %e, "could not replay remote game"),
                    }
                }
            }
            changed = sync_state.changed() => {
                if changed.is_ok() {
                    print_sync(&sync_state.borrow_and_update().clone());
                }
            }
        }
    }

    sync.stop();
    session.shutdown().await;
    Ok(())
}

/// Returns false when the user asked to quit.
fn handle_command(
    text: &str,
    game: &mut Game,
    session: &AnalysisSession,
    sync: &mut GameSync<HttpRelay>,
) -> bool {
    let (command, rest) = match text.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (text, ""),
    };

    let following_remote = sync.state().borrow().remote_game_id.is_some();

    match command {
        "" => {}
        "help" => print_help(),
        "quit" | "exit" => return false,
        "fen" => println!("{}", game.fen()),
        "move" | "m" => {
            if following_remote {
                println!("manual moves are disabled while following a remote game (use 'unsync')");
            } else {
                match game.play(rest) {
                    Ok(record) => {
                        println!("played {} ({} -> {})", record.san, record.from, record.to);
                        session.analyze(game.position());
                    }
                    Err(e) => println!("rejected: {e}"),
                }
            }
        }
        "undo" => {
            if following_remote {
                println!("the position is controlled by the remote game");
            } else if let Some(record) = game.undo() {
                println!("took back {}", record.san);
                session.analyze(game.position());
            } else {
                println!("nothing to undo");
            }
        }
        "reset" => {
            if following_remote {
                println!("the position is controlled by the remote game");
            } else {
                game.reset();
                session.analyze(game.position());
                println!("board reset");
            }
        }
        "sync" => sync.start(rest),
        "unsync" => {
            sync.stop();
            println!("stopped following the remote game");
        }
        other => println!("unknown command: {other} (try 'help')"),
    }
    true
}

fn print_help() {
    println!("commands:");
    println!("  move <san|uci>   mirror a move (e.g. 'move Nf3' or 'move g1f3')");
    println!("  undo             take back the last move");
    println!("  reset            back to the starting position");
    println!("  sync <link|id>   follow a lichess game through the relay");
    println!("  unsync           stop following and re-enable manual moves");
    println!("  fen              print the current position");
    println!("  quit             exit");
}

fn print_view(view: &EngineView) {
    if let Some(error) = &view.error {
        println!("engine error: {error}");
        return;
    }
    let snapshot = &view.suggestions;
    if snapshot.lines.is_empty() {
        return;
    }
    let depth = snapshot
        .search_depth
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("suggestions (depth {depth}):");
    for line in &snapshot.lines {
        println!("  {}. {:6} {:>7}  {}", line.rank, line.san, line.score.to_string(), line.line);
    }
}

fn print_sync(state: &SyncState) {
    let id = state.remote_game_id.as_deref().unwrap_or("?");
    match state.status {
        SyncStatus::Idle => println!("sync: idle"),
        SyncStatus::Connecting => println!("sync: connecting to {id}"),
        SyncStatus::Live => println!("sync: live ({id})"),
        SyncStatus::Error => println!(
            "sync: error: {}",
            state.last_error.as_deref().unwrap_or("unknown")
        ),
    }
}
