// Static mood tables shared by the analyzer and the suggestion engine.
// Illustrative defaults, not tuned values.

use crate::models::normalize_genre;

/// Genres that tend to suit each mood, strongest first
const MOOD_GENRES: &[(&str, &[&str])] = &[
    ("chill", &["simulation", "puzzle", "casual", "farming", "sandbox"]),
    ("relaxed", &["simulation", "puzzle", "casual", "visual-novel"]),
    ("competitive", &["shooter", "fighting", "moba", "sports", "battle-royale", "racing"]),
    ("focused", &["strategy", "puzzle", "rpg", "simulation"]),
    ("social", &["mmo", "party", "co-op", "moba", "sports"]),
    ("adventurous", &["adventure", "open-world", "rpg", "exploration"]),
    ("creative", &["sandbox", "building", "simulation", "crafting"]),
    ("nostalgic", &["platformer", "retro", "rpg", "arcade"]),
    ("energetic", &["action", "shooter", "rhythm", "racing", "roguelike"]),
    ("stressed", &["casual", "puzzle", "simulation"]),
];

const MOOD_ACTIVITIES: &[(&str, &[&str])] = &[
    ("chill", &["cozy farming or life-sim session", "short puzzle run"]),
    ("relaxed", &["cozy farming or life-sim session", "a chapter of a visual novel"]),
    ("competitive", &["a few ranked matches", "time trial or leaderboard run"]),
    ("focused", &["a strategy campaign mission", "a deep RPG quest line"]),
    ("social", &["co-op session with friends", "party game night"]),
    ("adventurous", &["explore a new open-world region", "start an unplayed story game"]),
    ("creative", &["sandbox build session", "level editor or mods"]),
    ("nostalgic", &["replay an old favorite", "retro collection"]),
    ("energetic", &["fast action run", "rhythm game set"]),
    ("stressed", &["low-stakes puzzle", "ambient exploration"]),
];

const DEFAULT_ACTIVITIES: &[&str] = &["play a familiar favorite"];

/// Affinity of `genre` for `mood` in [0, 1]; 0.5 when the mood is unknown
pub fn genre_affinity(mood: &str, genre: &str) -> f32 {
    let mood = mood.trim().to_lowercase();
    let genre = normalize_genre(genre);
    match MOOD_GENRES.iter().find(|(m, _)| *m == mood) {
        Some((_, genres)) => genres
            .iter()
            .position(|g| *g == genre)
            // strongest genre scores 1.0, later ones step down
            .map(|rank| 1.0 - rank as f32 * 0.1)
            .unwrap_or(0.2),
        None => 0.5,
    }
}

/// Best affinity of any of the game's genres for the mood
pub fn best_genre_affinity(mood: &str, genres: &[String]) -> f32 {
    genres
        .iter()
        .map(|g| genre_affinity(mood, g))
        .fold(None, |best: Option<f32>, v| Some(best.map_or(v, |b| b.max(v))))
        .unwrap_or(0.5)
}

pub fn activities_for(mood: &str) -> Vec<String> {
    let mood = mood.trim().to_lowercase();
    MOOD_ACTIVITIES
        .iter()
        .find(|(m, _)| *m == mood)
        .map(|(_, activities)| *activities)
        .unwrap_or(DEFAULT_ACTIVITIES)
        .iter()
        .map(|a| a.to_string())
        .collect()
}

/// Coarse label for an hour of day
pub fn daypart(hour: u8) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "late night",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_affinity() {
        assert!((genre_affinity("chill", "Simulation") - 1.0).abs() < 1e-6);
        assert!((genre_affinity("Competitive", "fighting") - 0.9).abs() < 1e-6);
        assert!((genre_affinity("chill", "shooter") - 0.2).abs() < 1e-6);
        assert!((genre_affinity("mystery-mood", "shooter") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_best_genre_affinity() {
        let genres = vec!["Shooter".to_string(), "Puzzle".to_string()];
        assert!((best_genre_affinity("chill", &genres) - 0.9).abs() < 1e-6);
        assert!((best_genre_affinity("chill", &[]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_activities_and_daypart() {
        assert_eq!(activities_for("social")[0], "co-op session with friends");
        assert_eq!(activities_for("unknown"), vec!["play a familiar favorite".to_string()]);
        assert_eq!(daypart(8), "morning");
        assert_eq!(daypart(20), "evening");
        assert_eq!(daypart(2), "late night");
    }
}
