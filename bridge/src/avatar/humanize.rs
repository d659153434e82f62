//! Deliberately imperfect move selection.
//!
//! With a rating-dependent probability the avatar asks the engine for its
//! top few variations and plays one that is not the best.

use std::collections::BTreeMap;
use std::time::Duration;

use chess_common::GamePosition;
use cozy_chess::Move;
use engine::{AnalysisInfo, EngineError, SearchLimit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::PlayerStyleProfile;

/// Most variations requested when looking for a sub-optimal move.
const MAX_CANDIDATES: usize = 5;
/// Positions with this many legal moves or fewer are always played straight.
const MIN_LEGAL_MOVES: usize = 3;

/// Chance of playing a sub-optimal move. Falls as rating rises.
pub fn error_probability(rating: Option<u32>) -> f64 {
    match rating {
        None => 0.10,
        Some(r) if r < 1200 => 0.30,
        Some(r) if r < 1400 => 0.25,
        Some(r) if r < 1600 => 0.15,
        Some(r) if r < 1800 => 0.10,
        Some(r) if r < 2000 => 0.05,
        Some(r) if r < 2200 => 0.03,
        Some(_) => 0.02,
    }
}

/// Search depth cap. Rises with rating.
pub fn depth_limit(rating: Option<u32>) -> u32 {
    match rating {
        None => 10,
        Some(r) if r < 1200 => 4,
        Some(r) if r < 1400 => 6,
        Some(r) if r < 1600 => 8,
        Some(r) if r < 1800 => 10,
        Some(r) if r < 2000 => 13,
        Some(r) if r < 2200 => 16,
        Some(_) => 20,
    }
}

/// The two searches humanization needs from a running session.
pub(crate) trait SearchBackend {
    /// Every analysis update of one multi-variation search.
    async fn analyse(
        &mut self,
        position: &GamePosition,
        multipv: u32,
        limit: SearchLimit,
    ) -> Result<Vec<AnalysisInfo>, EngineError>;

    async fn best_move(
        &mut self,
        position: &GamePosition,
        limit: SearchLimit,
    ) -> Result<Option<Move>, EngineError>;
}

/// Per-avatar move chooser: the imitated profile plus its random source.
#[derive(Debug, Clone)]
pub struct Humanizer {
    profile: Option<PlayerStyleProfile>,
    rng: StdRng,
}

impl Humanizer {
    pub fn new(profile: Option<PlayerStyleProfile>) -> Self {
        Self::with_rng(profile, StdRng::from_os_rng())
    }

    /// Deterministic variant for reproducible games.
    pub fn with_rng(profile: Option<PlayerStyleProfile>, rng: StdRng) -> Self {
        Self { profile, rng }
    }

    pub fn profile(&self) -> Option<&PlayerStyleProfile> {
        self.profile.as_ref()
    }

    pub fn rating(&self) -> Option<u32> {
        self.profile.as_ref().map(|p| p.estimated_rating)
    }

    pub(crate) async fn choose_move<B: SearchBackend>(
        &mut self,
        backend: &mut B,
        position: &GamePosition,
        time: Duration,
    ) -> Result<Option<Move>, EngineError> {
        let rating = self.rating();
        let draw: f64 = self.rng.random();
        let rng = &mut self.rng;
        humanized_move(backend, position, time, rating, draw, |len| {
            rng.random_range(1..len)
        })
        .await
    }
}

/// One humanized move decision.
///
/// `draw` is the uniform random value in `[0, 1)` compared against the error
/// probability; `pick(len)` chooses an index in `1..len` among the ranked
/// candidates.
pub(crate) async fn humanized_move<B, P>(
    backend: &mut B,
    position: &GamePosition,
    time: Duration,
    rating: Option<u32>,
    draw: f64,
    mut pick: P,
) -> Result<Option<Move>, EngineError>
where
    B: SearchBackend,
    P: FnMut(usize) -> usize,
{
    let limit = SearchLimit::time(time).with_depth(depth_limit(rating));
    let legal = position.legal_move_count();

    if draw < error_probability(rating) && legal > MIN_LEGAL_MOVES {
        let multipv = legal.min(MAX_CANDIDATES) as u32;
        tracing::debug!("Humanizing: looking at {} variations", multipv);
        let infos = backend.analyse(position, multipv, limit).await?;
        let candidates = first_moves_by_rank(&infos);

        if candidates.len() >= 2 {
            let index = pick(candidates.len()).clamp(1, candidates.len() - 1);
            tracing::debug!("Playing variation #{} instead of the best", index + 1);
            return Ok(Some(candidates[index]));
        }
        tracing::debug!("Only {} variation(s), playing best move", candidates.len());
    }

    backend.best_move(position, limit).await
}

/// First move of the latest update for each rank, in rank order, duplicates removed.
fn first_moves_by_rank(infos: &[AnalysisInfo]) -> Vec<Move> {
    let mut by_rank: BTreeMap<u32, Move> = BTreeMap::new();
    for info in infos {
        if let Some(mv) = info.first_move() {
            by_rank.insert(info.multipv, mv);
        }
    }

    let mut moves: Vec<Move> = Vec::with_capacity(by_rank.len());
    for mv in by_rank.into_values() {
        if !moves.contains(&mv) {
            moves.push(mv);
        }
    }
    moves
}
