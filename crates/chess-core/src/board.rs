//! Position snapshots and the canonical game they belong to.

use serde::Serialize;
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position as _};

use crate::error::ChessError;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Immutable snapshot of full board state. A new `Position` is produced for
/// every accepted move; the FEN string is its serialized form.
#[derive(Debug, Clone)]
pub struct Position {
    inner: Chess,
}

/// A move accepted by the rules engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveRecord {
    /// Origin square ("e2").
    pub from: String,
    /// Destination square ("e4").
    pub to: String,
    /// Standard algebraic notation ("e4", "Nf3", "O-O").
    pub san: String,
    /// Coordinate notation ("e2e4", "e7e8q").
    pub uci: String,
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl Position {
    /// The standard starting position.
    pub fn start() -> Self {
        Self {
            inner: Chess::default(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|_| ChessError::InvalidFen(fen.to_string()))?;
        let inner = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|_| ChessError::InvalidFen(fen.to_string()))?;
        Ok(Self { inner })
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.inner, EnPassantMode::Legal).to_string()
    }

    /// Apply a coordinate move ("e2e4", "e7e8q"), producing the successor
    /// position and the accepted move record.
    pub fn apply_uci(&self, uci: &str) -> Result<(Position, MoveRecord), ChessError> {
        let parsed: UciMove = uci
            .parse()
            .map_err(|_| ChessError::InvalidMove(uci.to_string()))?;
        let mv = parsed
            .to_move(&self.inner)
            .map_err(|_| ChessError::IllegalMove(uci.to_string()))?;
        Ok(self.apply(&mv))
    }

    /// Apply a SAN move ("Nf3", "exd5", "O-O"); check and annotation
    /// suffixes are tolerated.
    pub fn apply_san(&self, san: &str) -> Result<(Position, MoveRecord), ChessError> {
        let parsed: SanPlus = san
            .parse()
            .map_err(|_| ChessError::InvalidMove(san.to_string()))?;
        let mv = parsed
            .san
            .to_move(&self.inner)
            .map_err(|_| ChessError::IllegalMove(san.to_string()))?;
        Ok(self.apply(&mv))
    }

    fn apply(&self, mv: &Move) -> (Position, MoveRecord) {
        let san = San::from_move(&self.inner, *mv).to_string();
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let (from, to) = split_squares(&uci);
        let mut next = self.inner.clone();
        next.play_unchecked(*mv);
        (Position { inner: next }, MoveRecord { from, to, san, uci })
    }
}

/// Origin and destination are always the first four characters of a
/// coordinate move.
fn split_squares(uci: &str) -> (String, String) {
    let from = uci.get(0..2).unwrap_or_default().to_string();
    let to = uci.get(2..4).unwrap_or_default().to_string();
    (from, to)
}

/// The canonical game: current position plus the accepted move history.
#[derive(Debug, Clone, Default)]
pub struct Game {
    position: Position,
    history: Vec<MoveRecord>,
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    pub fn last_move(&self) -> Option<&MoveRecord> {
        self.history.last()
    }

    pub fn fen(&self) -> String {
        self.position.fen()
    }

    /// Accept either SAN ("Nf3") or coordinate ("g1f3") input.
    pub fn play(&mut self, input: &str) -> Result<MoveRecord, ChessError> {
        match self.play_san(input) {
            Ok(record) => Ok(record),
            Err(_) => self.play_uci(input),
        }
    }

    pub fn play_san(&mut self, san: &str) -> Result<MoveRecord, ChessError> {
        let (next, record) = self.position.apply_san(san)?;
        self.position = next;
        self.history.push(record.clone());
        Ok(record)
    }

    pub fn play_uci(&mut self, uci: &str) -> Result<MoveRecord, ChessError> {
        let (next, record) = self.position.apply_uci(uci)?;
        self.position = next;
        self.history.push(record.clone());
        Ok(record)
    }

    /// Take back the last move by replaying the remaining history from the
    /// starting position.
    pub fn undo(&mut self) -> Option<MoveRecord> {
        let undone = self.history.pop()?;
        let mut position = Position::start();
        for record in &self.history {
            match position.apply_uci(&record.uci) {
                Ok((next, _)) => position = next,
                // History entries were accepted once; a failed replay means
                // the history itself is broken, so stop where we are.
                Err(_) => break,
            }
        }
        self.position = position;
        Some(undone)
    }

    /// Replay a SAN move sequence from the starting position.
    pub fn replay_sans<S: AsRef<str>>(moves: &[S]) -> Result<Game, ChessError> {
        let mut game = Game::new();
        for san in moves {
            game.play_san(san.as_ref())?;
        }
        Ok(game)
    }

    pub fn reset(&mut self) {
        *self = Game::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_fen() {
        assert_eq!(Position::start().fen(), STARTING_FEN);
    }

    #[test]
    fn test_apply_uci_produces_san() {
        let (next, record) = Position::start().apply_uci("e2e4").unwrap();
        assert_eq!(record.san, "e4");
        assert_eq!(record.from, "e2");
        assert_eq!(record.to, "e4");
        assert_eq!(record.uci, "e2e4");
        assert_ne!(next.fen(), STARTING_FEN);
    }

    #[test]
    fn test_apply_san() {
        let (_, record) = Position::start().apply_san("Nf3").unwrap();
        assert_eq!(record.uci, "g1f3");
    }

    #[test]
    fn test_illegal_move_rejected() {
        assert!(Position::start().apply_uci("e2e5").is_err());
        assert!(Position::start().apply_san("Ke2").is_err());
    }

    #[test]
    fn test_invalid_fen_rejected() {
        assert!(Position::from_fen("not a fen").is_err());
    }

    #[test]
    fn test_promotion() {
        let position = Position::from_fen("8/P7/8/8/8/8/8/k1K5 w - - 0 1").unwrap();
        let (_, record) = position.apply_uci("a7a8q").unwrap();
        assert_eq!(record.san, "a8=Q");
        assert_eq!(record.uci, "a7a8q");
    }

    #[test]
    fn test_castling() {
        let position =
            Position::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let (_, record) = position.apply_uci("e1g1").unwrap();
        assert_eq!(record.san, "O-O");
        assert_eq!(record.from, "e1");
        assert_eq!(record.to, "g1");
    }

    #[test]
    fn test_game_play_accepts_san_and_uci() {
        let mut game = Game::new();
        game.play("e4").unwrap();
        game.play("e7e5").unwrap();
        assert_eq!(game.history().len(), 2);
        assert_eq!(game.last_move().unwrap().san, "e5");
    }

    #[test]
    fn test_undo_rebuilds_position() {
        let mut game = Game::new();
        game.play_san("e4").unwrap();
        let fen_after_e4 = game.fen();
        game.play_san("e5").unwrap();

        let undone = game.undo().unwrap();
        assert_eq!(undone.san, "e5");
        assert_eq!(game.fen(), fen_after_e4);

        game.undo().unwrap();
        assert_eq!(game.fen(), STARTING_FEN);
        assert!(game.undo().is_none());
    }

    #[test]
    fn test_replay_sans() {
        let game = Game::replay_sans(&["e4", "e5", "Nf3"]).unwrap();
        assert_eq!(game.history().len(), 3);
        assert_eq!(game.last_move().unwrap().uci, "g1f3");
        assert!(Game::replay_sans(&["e5"]).is_err());
    }
}
