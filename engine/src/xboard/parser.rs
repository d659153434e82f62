use std::time::Duration;

use chess_common::parse_uci_move;

/// Classification of one line of legacy engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XboardLine {
    /// `Error (unknown command): protover` from engines without protocol v2.
    BenignProtoverError,
    /// The engine's chosen move, coordinate notation.
    Move(String),
    Thinking(ThinkingLine),
    /// Looked like thinking output but did not parse; dropped.
    Malformed,
    Feature(String),
    Error(String),
    Other,
}

/// `<ply> <score> <time> <nodes> [pv...]` while the engine searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingLine {
    pub ply: u32,
    /// Centipawns, from the side to move.
    pub score: i32,
    pub time: Duration,
    pub nodes: u64,
    pub pv: Vec<String>,
}

/// What the session expects from the engine when a line arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPhase {
    /// Thinking output is wanted.
    pub thinking: bool,
    /// A move is owed; stays set after `?` until the move arrives.
    pub awaiting_move: bool,
}

impl SearchPhase {
    pub const IDLE: Self = Self {
        thinking: false,
        awaiting_move: false,
    };
    pub const SEARCHING: Self = Self {
        thinking: true,
        awaiting_move: true,
    };
    /// `?` was sent and the engine has yet to answer with its move.
    pub const MOVE_NOW: Self = Self {
        thinking: false,
        awaiting_move: true,
    };
}

/// Classify `line`. Bare move tokens are only recognised while a move is
/// owed, thinking lines only while the engine is searching.
pub fn classify_line(line: &str, phase: SearchPhase) -> XboardLine {
    let line = line.trim();
    let lower = line.to_ascii_lowercase();

    if lower.contains("unknown command") && lower.contains("protover") {
        return XboardLine::BenignProtoverError;
    }

    if let Some(rest) = line.strip_prefix("move ") {
        return match rest.split_whitespace().next() {
            Some(mv) => XboardLine::Move(mv.to_string()),
            None => XboardLine::Malformed,
        };
    }

    if phase.awaiting_move
        && !line.contains(' ')
        && matches!(line.len(), 4 | 5)
        && parse_uci_move(line).is_ok()
    {
        return XboardLine::Move(line.to_string());
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    if phase.thinking && parts.first().is_some_and(|t| t.chars().all(|c| c.is_ascii_digit())) {
        return parse_thinking(&parts).map_or(XboardLine::Malformed, XboardLine::Thinking);
    }

    if line.starts_with("feature") {
        return XboardLine::Feature(line.to_string());
    }

    if (line.starts_with("Error") || line.starts_with("Illegal")) && !lower.contains("protover") {
        return XboardLine::Error(line.to_string());
    }

    XboardLine::Other
}

fn parse_thinking(parts: &[&str]) -> Option<ThinkingLine> {
    if parts.len() < 4 {
        return None;
    }
    let centis: u64 = parts[2].parse().ok()?;
    Some(ThinkingLine {
        ply: parts[0].parse().ok()?,
        score: parts[1].parse().ok()?,
        time: Duration::from_millis(centis * 10),
        nodes: parts[3].parse().ok()?,
        pv: parts[4..].iter().map(|s| s.to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_protover_error_is_recognised() {
        assert_eq!(
            classify_line("Error (unknown command): protover", SearchPhase::IDLE),
            XboardLine::BenignProtoverError
        );
        assert_eq!(
            classify_line("ERROR (Unknown Command): PROTOVER 2", SearchPhase::SEARCHING),
            XboardLine::BenignProtoverError
        );
    }

    #[test]
    fn test_move_prefix() {
        assert_eq!(
            classify_line("move e2e4", SearchPhase::IDLE),
            XboardLine::Move("e2e4".to_string())
        );
        assert_eq!(
            classify_line("move e7e8q", SearchPhase::SEARCHING),
            XboardLine::Move("e7e8q".to_string())
        );
    }

    #[test]
    fn test_bare_move_only_while_move_is_owed() {
        assert_eq!(
            classify_line("g1f3", SearchPhase::SEARCHING),
            XboardLine::Move("g1f3".to_string())
        );
        assert_eq!(classify_line("g1f3", SearchPhase::IDLE), XboardLine::Other);
        assert_eq!(
            classify_line("g1f3", SearchPhase::MOVE_NOW),
            XboardLine::Move("g1f3".to_string())
        );
        assert_eq!(classify_line("done", SearchPhase::SEARCHING), XboardLine::Other);
    }

    #[test]
    fn test_thinking_line() {
        let line = classify_line("9 123 456 78901 e2e4 e7e5 g1f3", SearchPhase::SEARCHING);
        assert_eq!(
            line,
            XboardLine::Thinking(ThinkingLine {
                ply: 9,
                score: 123,
                time: Duration::from_millis(4560),
                nodes: 78901,
                pv: vec!["e2e4".into(), "e7e5".into(), "g1f3".into()],
            })
        );
    }

    #[test]
    fn test_negative_score_without_pv() {
        let XboardLine::Thinking(t) = classify_line("4 -35 12 900", SearchPhase::SEARCHING) else {
            panic!("expected thinking line");
        };
        assert_eq!(t.score, -35);
        assert!(t.pv.is_empty());
    }

    #[test]
    fn test_malformed_thinking_is_dropped() {
        assert_eq!(classify_line("9 abc 456 78901", SearchPhase::SEARCHING), XboardLine::Malformed);
        assert_eq!(classify_line("9 12", SearchPhase::SEARCHING), XboardLine::Malformed);
        // not searching: numeric chatter is ignored entirely
        assert_eq!(classify_line("9 12 3 4", SearchPhase::IDLE), XboardLine::Other);
        assert_eq!(classify_line("9 12 3 4", SearchPhase::MOVE_NOW), XboardLine::Other);
    }

    #[test]
    fn test_feature_and_errors() {
        assert_eq!(
            classify_line("feature myname=\"TheKing\" done=1", SearchPhase::IDLE),
            XboardLine::Feature("feature myname=\"TheKing\" done=1".to_string())
        );
        assert_eq!(
            classify_line("Illegal move: e2e5", SearchPhase::IDLE),
            XboardLine::Error("Illegal move: e2e5".to_string())
        );
        assert_eq!(
            classify_line("Error (bad option): protover 2", SearchPhase::IDLE),
            XboardLine::Other
        );
    }
}
