//! Chess domain layer: position handling, move application, and notation
//! translation on top of shakmaty.

pub mod board;
pub mod error;
pub mod notation;
pub mod pgn;

pub use board::{Game, MoveRecord, Position};
pub use error::ChessError;
