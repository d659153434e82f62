use cozy_chess::{Board, Move};

use crate::uci::{format_uci_move, to_engine_move};
use crate::NotationError;

/// A position expressed as a start board plus the moves played from it.
///
/// Modern engines accept this directly (`position fen ... moves ...`);
/// legacy engines have no "set position" command and need the history
/// replayed move by move.
#[derive(Debug, Clone)]
pub struct GamePosition {
    start: Board,
    moves: Vec<Move>,
    current: Board,
}

impl GamePosition {
    pub fn new(start: Board) -> Self {
        Self {
            current: start.clone(),
            start,
            moves: Vec::new(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, NotationError> {
        let board = fen
            .parse::<Board>()
            .map_err(|_| NotationError::InvalidFen(fen.to_string()))?;
        Ok(Self::new(board))
    }

    /// Play a move, rejecting it if it is illegal in the current position.
    pub fn push(&mut self, mv: Move) -> Result<(), NotationError> {
        self.current
            .try_play(mv)
            .map_err(|_| NotationError::IllegalMove(format_uci_move(&mv)))?;
        self.moves.push(mv);
        Ok(())
    }

    pub fn start(&self) -> &Board {
        &self.start
    }

    pub fn board(&self) -> &Board {
        &self.current
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn start_fen(&self) -> String {
        self.start.to_string()
    }

    pub fn is_standard_start(&self) -> bool {
        self.start_fen() == Board::default().to_string()
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::new();
        self.current.generate_moves(|mvs| {
            moves.extend(mvs);
            false
        });
        moves
    }

    pub fn legal_move_count(&self) -> usize {
        let mut count = 0;
        self.current.generate_moves(|mvs| {
            count += mvs.len();
            false
        });
        count
    }

    /// The move history in the notation engines expect.
    pub fn engine_moves(&self) -> Vec<String> {
        let mut board = self.start.clone();
        self.moves
            .iter()
            .map(|&mv| {
                let text = to_engine_move(&board, mv);
                board.play_unchecked(mv);
                text
            })
            .collect()
    }
}

impl Default for GamePosition {
    fn default() -> Self {
        Self::new(Board::default())
    }
}
