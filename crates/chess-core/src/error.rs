//! Chess-layer error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChessError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Invalid move syntax: {0}")]
    InvalidMove(String),

    #[error("Unreadable game record")]
    UnreadableRecord,
}
