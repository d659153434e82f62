use cozy_chess::{Board, GameStatus, Move, Piece};

use crate::converters::{file_char, format_square, rank_char, san_piece_letter};
use crate::uci::format_uci_move;
use crate::NotationError;

/// Format a legal move as Standard Algebraic Notation ("Nbd7", "exd5", "O-O", "e8=Q+").
pub fn format_san(board: &Board, mv: Move) -> Result<String, NotationError> {
    if !board.is_legal(mv) {
        return Err(NotationError::IllegalMove(format_uci_move(&mv)));
    }
    let piece = board
        .piece_on(mv.from)
        .ok_or_else(|| NotationError::IllegalMove(format_uci_move(&mv)))?;
    let us = board.side_to_move();

    let mut san = String::new();
    if piece == Piece::King && board.color_on(mv.to) == Some(us) {
        // cozy-chess castles onto the rook square
        if (mv.to.file() as u8) > (mv.from.file() as u8) {
            san.push_str("O-O");
        } else {
            san.push_str("O-O-O");
        }
    } else {
        let is_capture = board.color_on(mv.to) == Some(!us)
            || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

        if piece == Piece::Pawn {
            if is_capture {
                san.push(file_char(mv.from.file()));
            }
        } else {
            san.push(san_piece_letter(piece));
            san.push_str(&disambiguation(board, mv, piece));
        }
        if is_capture {
            san.push('x');
        }
        san.push_str(&format_square(mv.to));
        if let Some(promo) = mv.promotion {
            san.push('=');
            san.push(san_piece_letter(promo));
        }
    }

    let mut after = board.clone();
    after.play_unchecked(mv);
    if !after.checkers().is_empty() {
        san.push(if after.status() == GameStatus::Won {
            '#'
        } else {
            '+'
        });
    }

    Ok(san)
}

/// Origin qualifier needed when another piece of the same kind can reach the target.
fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let mut rivals = Vec::new();
    board.generate_moves(|mvs| {
        if mvs.piece == piece {
            for other in mvs {
                if other.to == mv.to && other.from != mv.from && !rivals.contains(&other.from) {
                    rivals.push(other.from);
                }
            }
        }
        false
    });

    if rivals.is_empty() {
        return String::new();
    }
    if rivals.iter().all(|sq| sq.file() != mv.from.file()) {
        return file_char(mv.from.file()).to_string();
    }
    if rivals.iter().all(|sq| sq.rank() != mv.from.rank()) {
        return rank_char(mv.from.rank()).to_string();
    }
    format_square(mv.from)
}
