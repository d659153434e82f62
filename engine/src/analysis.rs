use std::time::Duration;

use chess_common::{format_san, from_engine_move};
use cozy_chess::{Board, Color, Move};

/// Maximum number of PV moves carried in an update.
pub const MAX_PV_LENGTH: usize = 10;

/// Engine evaluation, always from White's point of view once it leaves a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Mate in N; negative when White is being mated.
    Mate(i32),
}

impl Score {
    /// Re-express a side-to-move relative score from White's perspective.
    pub fn white_relative(self, side_to_move: Color) -> Self {
        match side_to_move {
            Color::White => self,
            Color::Black => match self {
                Score::Centipawns(cp) => Score::Centipawns(-cp),
                Score::Mate(n) => Score::Mate(-n),
            },
        }
    }
}

/// One progress update of an analysis request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisInfo {
    pub depth: u32,
    pub seldepth: Option<u32>,
    pub nodes: u64,
    pub nps: u64,
    pub time: Duration,
    pub score: Option<Score>,
    /// Principal variation as legal moves, at most [`MAX_PV_LENGTH`].
    pub pv: Vec<Move>,
    /// The same variation in SAN.
    pub pv_san: Vec<String>,
    /// 1-based rank of this line; 1 is the principal line.
    pub multipv: u32,
}

impl AnalysisInfo {
    pub fn first_move(&self) -> Option<Move> {
        self.pv.first().copied()
    }
}

/// Replay engine PV tokens on a private copy of `board`.
///
/// Stops at the first token that does not parse or is not legal; whatever was
/// converted up to that point is kept.
pub fn convert_pv<S: AsRef<str>>(board: &Board, tokens: &[S]) -> (Vec<Move>, Vec<String>) {
    let mut scratch = board.clone();
    let mut moves = Vec::new();
    let mut san = Vec::new();

    for token in tokens.iter().take(MAX_PV_LENGTH) {
        let Ok(mv) = from_engine_move(&scratch, token.as_ref()) else {
            break;
        };
        let Ok(text) = format_san(&scratch, mv) else {
            break;
        };
        scratch.play_unchecked(mv);
        moves.push(mv);
        san.push(text);
    }

    (moves, san)
}
