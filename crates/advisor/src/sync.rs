//! Remote game synchronization: polls the relay for the authoritative move
//! history and merges it into local state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use chess_core::pgn;

use crate::feed::{FeedError, GameFeed};

const GENERIC_FETCH_ERROR: &str = "Could not fetch the game record.";
const GENERIC_REPLAY_ERROR: &str = "Could not replay the fetched game record.";
const INVALID_LINK_ERROR: &str =
    "Unrecognized game link. Paste a game URL or its 8-12 character id.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Idle,
    Connecting,
    Live,
    Error,
}

/// Connection state machine exposed to consumers. While `remote_game_id`
/// is set, local manual moves are expected to be disabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    pub status: SyncStatus,
    pub remote_game_id: Option<String>,
    pub last_error: Option<String>,
}

/// Authoritative game state retrieved from the remote feed.
#[derive(Debug, Clone, PartialEq)]
pub struct GameUpdate {
    pub fen: String,
    pub san_moves: Vec<String>,
    /// Origin and destination squares of the most recent move, for
    /// highlighting.
    pub last_move: Option<(String, String)>,
}

/// Extract a remote game identifier from a bare token or a URL containing
/// one (8-12 alphanumeric characters).
pub fn extract_game_id(input: &str) -> Option<String> {
    let id = Regex::new(r"^[A-Za-z0-9]{8,12}$").unwrap();
    let trimmed = input.trim();
    if id.is_match(trimmed) {
        return Some(trimmed.to_string());
    }
    trimmed
        .split(['/', '?', '#', '&'])
        .find(|segment| id.is_match(segment))
        .map(str::to_string)
}

/// Shared cancellation state for one sync session.
#[derive(Debug, Default)]
struct Lifecycle {
    cancelled: AtomicBool,
    /// Bumped per fetch cycle and on teardown; a cycle may only apply its
    /// result while its stamp is still current.
    generation: AtomicU64,
    in_flight: Mutex<Option<AbortHandle>>,
    /// FEN of the last applied update, for idempotent merge.
    applied_fen: Mutex<Option<String>>,
}

impl Lifecycle {
    fn shutdown(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.in_flight.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn is_current(&self, stamp: u64) -> bool {
        !self.cancelled.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == stamp
    }
}

struct SyncSession {
    poll: JoinHandle<()>,
    lifecycle: Arc<Lifecycle>,
}

/// Polls the relay on a fixed interval and merges the retrieved move
/// history into local state, with lifecycle-driven cancellation.
pub struct GameSync<F: GameFeed> {
    feed: Arc<F>,
    poll_interval: Duration,
    state: Arc<watch::Sender<SyncState>>,
    updates: mpsc::UnboundedSender<GameUpdate>,
    update_rx: Option<mpsc::UnboundedReceiver<GameUpdate>>,
    session: Option<SyncSession>,
}

impl<F: GameFeed> GameSync<F> {
    pub fn new(feed: F, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        Self {
            feed: Arc::new(feed),
            poll_interval,
            state: Arc::new(state),
            updates: update_tx,
            update_rx: Some(update_rx),
            session: None,
        }
    }

    /// Subscribe to the connection state machine.
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Take the stream of authoritative game updates (single consumer).
    pub fn updates(&mut self) -> Option<mpsc::UnboundedReceiver<GameUpdate>> {
        self.update_rx.take()
    }

    /// Begin mirroring the remote game identified by `raw_link`; any active
    /// session is superseded. Invalid input is rejected before any network
    /// call.
    pub fn start(&mut self, raw_link: &str) {
        self.teardown();

        let Some(game_id) = extract_game_id(raw_link) else {
            publish_state(
                &self.state,
                SyncState {
                    status: SyncStatus::Error,
                    remote_game_id: None,
                    last_error: Some(INVALID_LINK_ERROR.to_string()),
                },
            );
            return;
        };

        publish_state(
            &self.state,
            SyncState {
                status: SyncStatus::Connecting,
                remote_game_id: Some(game_id.clone()),
                last_error: None,
            },
        );

        let lifecycle = Arc::new(Lifecycle::default());
        let poll = tokio::spawn(poll_loop(
            self.feed.clone(),
            game_id,
            self.poll_interval,
            self.state.clone(),
            self.updates.clone(),
            lifecycle.clone(),
        ));
        self.session = Some(SyncSession { poll, lifecycle });
    }

    /// Disconnect: cancel the session and return to idle.
    pub fn stop(&mut self) {
        self.teardown();
        publish_state(&self.state, SyncState::default());
    }

    /// Mark the session cancelled, abort any in-flight fetch, and stop the
    /// repeating timer.
    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.lifecycle.shutdown();
            session.poll.abort();
        }
    }
}

impl<F: GameFeed> Drop for GameSync<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn poll_loop<F: GameFeed>(
    feed: Arc<F>,
    game_id: String,
    poll_interval: Duration,
    state: Arc<watch::Sender<SyncState>>,
    updates: mpsc::UnboundedSender<GameUpdate>,
    lifecycle: Arc<Lifecycle>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        if lifecycle.cancelled.load(Ordering::SeqCst) {
            break;
        }

        // A cycle still in flight at the next tick is superseded: its stamp
        // goes stale first, then its transport work is aborted.
        let stamp = lifecycle.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cycle = tokio::spawn(fetch_cycle(
            feed.clone(),
            game_id.clone(),
            state.clone(),
            updates.clone(),
            lifecycle.clone(),
            stamp,
        ));
        let mut in_flight = lifecycle.in_flight.lock().unwrap();
        if let Some(previous) = in_flight.replace(cycle.abort_handle()) {
            previous.abort();
        }
    }
}

async fn fetch_cycle<F: GameFeed>(
    feed: Arc<F>,
    game_id: String,
    state: Arc<watch::Sender<SyncState>>,
    updates: mpsc::UnboundedSender<GameUpdate>,
    lifecycle: Arc<Lifecycle>,
    stamp: u64,
) {
    let result = feed.fetch(&game_id).await;

    // A cancelled or superseded cycle must not apply its result.
    if !lifecycle.is_current(stamp) {
        return;
    }

    match result {
        Ok(body) => match pgn::replay_movetext(&body) {
            Ok(game) => {
                let fen = game.fen();
                let already_applied = {
                    let mut applied = lifecycle.applied_fen.lock().unwrap();
                    if applied.as_deref() == Some(fen.as_str()) {
                        true
                    } else {
                        *applied = Some(fen.clone());
                        false
                    }
                };
                if !already_applied {
                    debug!(game_id = %game_id, moves = game.history().len(), "applying remote game state");
                    let _ = updates.send(GameUpdate {
                        fen,
                        san_moves: game.history().iter().map(|m| m.san.clone()).collect(),
                        last_move: game.last_move().map(|m| (m.from.clone(), m.to.clone())),
                    });
                }
                publish_state(
                    &state,
                    SyncState {
                        status: SyncStatus::Live,
                        remote_game_id: Some(game_id.clone()),
                        last_error: None,
                    },
                );
            }
            Err(e) => {
                warn!(game_id = %game_id, error = %e, "failed to replay remote game record");
                publish_state(
                    &state,
                    SyncState {
                        status: SyncStatus::Error,
                        remote_game_id: Some(game_id.clone()),
                        last_error: Some(GENERIC_REPLAY_ERROR.to_string()),
                    },
                );
            }
        },
        Err(e) => {
            let message = match &e {
                FeedError::Upstream {
                    message: Some(message),
                    ..
                } => message.clone(),
                _ => GENERIC_FETCH_ERROR.to_string(),
            };
            warn!(game_id = %game_id, error = %e, "relay fetch failed");
            publish_state(
                &state,
                SyncState {
                    status: SyncStatus::Error,
                    remote_game_id: Some(game_id.clone()),
                    last_error: Some(message),
                },
            );
        }
    }
}

fn publish_state(sender: &watch::Sender<SyncState>, state: SyncState) {
    sender.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });
}
