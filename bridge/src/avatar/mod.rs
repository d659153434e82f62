//! Engine-backed opponents that imitate a player's strength.

pub mod humanize;
pub mod worker;

pub use humanize::{depth_limit, error_probability, Humanizer};
pub use worker::AvatarWorker;

use engine::{EngineOptions, OptionValue};
use serde::{Deserialize, Serialize};

/// The parts of a player's style analysis the avatar cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStyleProfile {
    pub username: String,
    pub estimated_rating: u32,
}

impl PlayerStyleProfile {
    pub fn new(username: impl Into<String>, estimated_rating: u32) -> Self {
        Self {
            username: username.into(),
            estimated_rating,
        }
    }
}

/// Engine skill level (0-20) for a rating.
pub fn skill_level(rating: u32) -> i32 {
    match rating {
        r if r < 1200 => 0,
        r if r < 1400 => 5,
        r if r < 1600 => 8,
        r if r < 1800 => 12,
        r if r < 2000 => 15,
        r if r < 2200 => 18,
        _ => 20,
    }
}

/// Options for an avatar engine imitating `profile`; `overrides` win.
///
/// Threads and Hash are left to the avatar snapshot defaults unless
/// overridden.
pub fn avatar_options(profile: Option<&PlayerStyleProfile>, overrides: &EngineOptions) -> EngineOptions {
    let mut options = EngineOptions::default();
    if let Some(profile) = profile {
        let rating = profile.estimated_rating;
        options.skill_level = Some(skill_level(rating));
        options.extra.insert("UCI_LimitStrength", true);
        options
            .extra
            .insert("UCI_Elo", OptionValue::Int(i64::from(rating.clamp(1000, 3000))));
    }
    options.merged_with(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::SnapshotDefaults;

    #[test]
    fn test_skill_level_brackets() {
        assert_eq!(skill_level(800), 0);
        assert_eq!(skill_level(1200), 5);
        assert_eq!(skill_level(1599), 8);
        assert_eq!(skill_level(1700), 12);
        assert_eq!(skill_level(1950), 15);
        assert_eq!(skill_level(2100), 18);
        assert_eq!(skill_level(2800), 20);
    }

    #[test]
    fn test_avatar_options_from_rating() {
        let profile = PlayerStyleProfile::new("magnus_fan", 850);
        let options = avatar_options(Some(&profile), &EngineOptions::default());
        assert_eq!(options.skill_level, Some(0));
        assert_eq!(
            options.extra.get("UCI_LimitStrength"),
            Some(&OptionValue::Bool(true))
        );
        assert_eq!(options.extra.get("UCI_Elo"), Some(&OptionValue::Int(1000)));

        let snapshot = options.configuration_snapshot(&SnapshotDefaults {
            threads: 3,
            hash_mb: 128,
        });
        assert_eq!(snapshot.get("Threads"), Some(&OptionValue::Int(3)));
        assert_eq!(snapshot.get("Hash"), Some(&OptionValue::Int(128)));
    }

    #[test]
    fn test_overrides_win() {
        let profile = PlayerStyleProfile::new("gm", 3300);
        let mut overrides = EngineOptions::default();
        overrides.skill_level = Some(3);
        overrides.hash_mb = Some(32);
        overrides.extra.insert("UCI_Elo", 1500i64);

        let options = avatar_options(Some(&profile), &overrides);
        assert_eq!(options.skill_level, Some(3));
        assert_eq!(options.hash_mb, Some(32));
        assert_eq!(options.extra.get("UCI_Elo"), Some(&OptionValue::Int(1500)));
    }

    #[test]
    fn test_no_profile_means_full_strength() {
        let options = avatar_options(None, &EngineOptions::default());
        assert_eq!(options, EngineOptions::default());
    }
}
