//! Coordinate notation ("e2e4", "e7e8q") as spoken by both engine protocols.
//!
//! cozy-chess encodes castling as the king capturing its own rook (e1h1).
//! Engines use the standard king-two-squares form (e1g1), so every move that
//! crosses the process boundary goes through [`to_engine_move`] or
//! [`from_engine_move`].

use cozy_chess::{Board, File, Move, Piece, Rank, Square};

use crate::converters::{format_piece, format_square, parse_square};
use crate::NotationError;

/// Parse coordinate notation without any board context.
pub fn parse_uci_move(s: &str) -> Result<Move, NotationError> {
    if !s.is_ascii() || !(4..=5).contains(&s.len()) {
        return Err(NotationError::InvalidMove(s.to_string()));
    }

    let from = parse_square(&s[0..2])?;
    let to = parse_square(&s[2..4])?;

    let promotion = match s.get(4..5) {
        None => None,
        Some("q") => Some(Piece::Queen),
        Some("r") => Some(Piece::Rook),
        Some("b") => Some(Piece::Bishop),
        Some("n") => Some(Piece::Knight),
        Some(_) => return Err(NotationError::InvalidPromotion(s.to_string())),
    };

    Ok(Move {
        from,
        to,
        promotion,
    })
}

/// Format a move in coordinate notation exactly as stored.
pub fn format_uci_move(mv: &Move) -> String {
    let mut s = format!("{}{}", format_square(mv.from), format_square(mv.to));
    if let Some(promo) = mv.promotion {
        s.push(format_piece(promo));
    }
    s
}

/// Convert standard castling notation to cozy_chess notation.
///
/// e1g1 → e1h1, e1c1 → e1a1 (and the same on the eighth rank), but only when
/// the converted move is legal on `board`. Anything else is returned as-is.
pub fn convert_uci_castling_to_cozy(board: &Board, mv: Move) -> Move {
    let is_back_rank = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let is_king = board.piece_on(mv.from) == Some(Piece::King);

    if is_back_rank
        && is_king
        && mv.from.file() == File::E
        && mv.to.rank() == mv.from.rank()
        && mv.promotion.is_none()
    {
        let rook_file = match mv.to.file() {
            File::G => File::H,
            File::C => File::A,
            _ => return mv,
        };
        let converted = Move {
            from: mv.from,
            to: Square::new(rook_file, mv.from.rank()),
            promotion: None,
        };
        if board.is_legal(converted) {
            return converted;
        }
    }

    mv
}

/// Format a legal cozy move the way engines expect it.
pub fn to_engine_move(board: &Board, mv: Move) -> String {
    let castles = board.piece_on(mv.from) == Some(Piece::King)
        && board.color_on(mv.to) == Some(board.side_to_move());

    if castles {
        let king_file = if (mv.to.file() as u8) > (mv.from.file() as u8) {
            File::G
        } else {
            File::C
        };
        return format_uci_move(&Move {
            from: mv.from,
            to: Square::new(king_file, mv.from.rank()),
            promotion: None,
        });
    }

    format_uci_move(&mv)
}

/// Parse an engine's move text and resolve it to a legal move on `board`.
pub fn from_engine_move(board: &Board, s: &str) -> Result<Move, NotationError> {
    let mv = convert_uci_castling_to_cozy(board, parse_uci_move(s)?);
    if board.is_legal(mv) {
        Ok(mv)
    } else {
        Err(NotationError::IllegalMove(s.to_string()))
    }
}
