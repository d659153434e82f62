//! Chess rules helpers shared by the engine protocol crates.
//!
//! Thin layer over `cozy-chess`: coordinate notation for talking to engines,
//! SAN for presenting principal variations, and a position type that keeps
//! the move history legacy engines need to be replayed.

pub mod converters;
pub mod position;
pub mod san;
pub mod uci;

pub use converters::*;
pub use position::GamePosition;
pub use san::format_san;
pub use uci::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotationError {
    #[error("Invalid move: {0}")]
    InvalidMove(String),
    #[error("Invalid square: {0}")]
    InvalidSquare(String),
    #[error("Invalid promotion: {0}")]
    InvalidPromotion(String),
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),
}
