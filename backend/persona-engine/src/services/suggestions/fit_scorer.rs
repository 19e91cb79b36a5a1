/// Fit Scorer
///
/// Scores one candidate game against a request context and the user's
/// behavior pattern on five dimensions, each in [0, 1]:
///
///   time      available minutes vs. typical session length for the genres
///   mood      learned mood/genre history blended with static affinities
///   energy    genre intensity vs. requested energy
///   social    game socialness vs. requested social setting
///   sequence  P(game genre | recent genre sequence)
///
/// Missing inputs score a neutral 0.5 rather than penalising the game.
use super::behavior_builder::BehaviorPattern;
use super::{EnergyLevel, FitScores, SocialContext, SuggestionContext};
use crate::models::GameRecord;
use crate::services::mood::vocabulary::best_genre_affinity;
use crate::utils::clamp_unit;
use serde::{Deserialize, Serialize};

const NEUTRAL: f32 = 0.5;
const LEARNED_MOOD_WEIGHT: f32 = 0.6;
const DEFAULT_PLAYTIME_MINUTES: f64 = 60.0;

/// Estimated intensity per genre
const GENRE_ENERGY: &[(&str, f32)] = &[
    ("shooter", 0.9),
    ("fighting", 0.9),
    ("battle-royale", 0.9),
    ("action", 0.8),
    ("racing", 0.8),
    ("rhythm", 0.8),
    ("moba", 0.8),
    ("sports", 0.75),
    ("roguelike", 0.75),
    ("platformer", 0.6),
    ("mmo", 0.55),
    ("rpg", 0.5),
    ("adventure", 0.5),
    ("open-world", 0.5),
    ("strategy", 0.45),
    ("sandbox", 0.35),
    ("simulation", 0.3),
    ("puzzle", 0.3),
    ("casual", 0.2),
    ("farming", 0.15),
    ("visual-novel", 0.1),
];

/// Estimated socialness per genre
const GENRE_SOCIALNESS: &[(&str, f32)] = &[
    ("mmo", 0.9),
    ("party", 0.9),
    ("co-op", 0.85),
    ("moba", 0.85),
    ("battle-royale", 0.8),
    ("fighting", 0.7),
    ("sports", 0.6),
    ("shooter", 0.6),
    ("racing", 0.45),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitWeights {
    pub time: f32,
    pub mood: f32,
    pub energy: f32,
    pub social: f32,
    pub sequence: f32,
}

impl Default for FitWeights {
    fn default() -> Self {
        Self {
            time: 0.25,
            mood: 0.25,
            energy: 0.2,
            social: 0.15,
            sequence: 0.15,
        }
    }
}

impl FitWeights {
    /// Weighted mean of the scores; equal weights when the configured ones are unusable
    pub fn combine(&self, scores: &FitScores) -> f32 {
        let weights = [self.time, self.mood, self.energy, self.social, self.sequence];
        let values = [scores.time, scores.mood, scores.energy, scores.social, scores.sequence];

        let total: f32 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
        if total <= 0.0 {
            return clamp_unit(values.iter().sum::<f32>() / values.len() as f32);
        }
        let weighted: f32 = weights
            .iter()
            .zip(values)
            .filter(|(w, _)| w.is_finite() && **w > 0.0)
            .map(|(w, v)| w * v)
            .sum();
        clamp_unit(weighted / total)
    }

    /// Weighted contribution per dimension, in `FitScores` order
    pub fn contributions(&self, scores: &FitScores) -> [(&'static str, f32); 5] {
        [
            ("time", self.time * scores.time),
            ("mood", self.mood * scores.mood),
            ("energy", self.energy * scores.energy),
            ("social", self.social * scores.social),
            ("sequence", self.sequence * scores.sequence),
        ]
    }
}

fn lookup(table: &[(&str, f32)], genre: &str) -> Option<f32> {
    table.iter().find(|(g, _)| *g == genre).map(|(_, v)| *v)
}

/// Mean intensity of the game's known genres
pub fn game_energy(game: &GameRecord) -> f32 {
    let known: Vec<f32> = game
        .normalized_genres()
        .iter()
        .filter_map(|g| lookup(GENRE_ENERGY, g))
        .collect();
    if known.is_empty() {
        NEUTRAL
    } else {
        known.iter().sum::<f32>() / known.len() as f32
    }
}

pub fn game_socialness(game: &GameRecord) -> f32 {
    let base = if game.multiplayer { 0.7 } else { 0.15 };
    game.normalized_genres()
        .iter()
        .filter_map(|g| lookup(GENRE_SOCIALNESS, g))
        .fold(base, f32::max)
}

fn energy_target(level: EnergyLevel) -> f32 {
    match level {
        EnergyLevel::Low => 0.2,
        EnergyLevel::Medium => 0.5,
        EnergyLevel::High => 0.85,
    }
}

fn social_target(context: SocialContext) -> f32 {
    match context {
        SocialContext::Solo => 0.1,
        SocialContext::Coop => 0.65,
        SocialContext::Competitive => 0.9,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FitScorer;

impl FitScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, game: &GameRecord, context: &SuggestionContext, pattern: &BehaviorPattern) -> FitScores {
        let genres = game.normalized_genres();
        FitScores {
            time: self.time_fit(game, &genres, context, pattern),
            mood: self.mood_fit(&genres, context, pattern),
            energy: self.energy_fit(game, context),
            social: self.social_fit(game, context),
            sequence: self.sequence_fit(&genres, pattern),
        }
    }

    /// Typical minutes this user spends on games like `game`
    pub fn expected_minutes(&self, game: &GameRecord, pattern: &BehaviorPattern) -> Option<f64> {
        pattern
            .session_lengths
            .expected_minutes(&game.normalized_genres())
            .or(game.average_session_minutes)
            .or_else(|| (pattern.session_lengths.count > 0).then_some(pattern.session_lengths.mean_minutes))
            .filter(|m| m.is_finite() && *m > 0.0)
    }

    pub fn estimated_playtime(&self, game: &GameRecord, context: &SuggestionContext, pattern: Option<&BehaviorPattern>) -> f64 {
        let expected = match pattern {
            Some(pattern) => self.expected_minutes(game, pattern),
            None => game.average_session_minutes.filter(|m| m.is_finite() && *m > 0.0),
        }
        .unwrap_or(DEFAULT_PLAYTIME_MINUTES);

        match context.available_minutes.filter(|m| m.is_finite() && *m > 0.0) {
            Some(available) => expected.min(available),
            None => expected,
        }
    }

    fn time_fit(&self, game: &GameRecord, genres: &[String], context: &SuggestionContext, pattern: &BehaviorPattern) -> f32 {
        let Some(available) = context.available_minutes.filter(|m| m.is_finite() && *m > 0.0) else {
            return NEUTRAL;
        };
        let expected = pattern
            .session_lengths
            .expected_minutes(genres)
            .or(game.average_session_minutes)
            .filter(|m| m.is_finite() && *m > 0.0);

        match expected {
            Some(expected) if expected <= available => 1.0,
            Some(expected) => clamp_unit((available / expected) as f32),
            None => NEUTRAL,
        }
    }

    fn mood_fit(&self, genres: &[String], context: &SuggestionContext, pattern: &BehaviorPattern) -> f32 {
        let Some(mood) = context.mood() else {
            return NEUTRAL;
        };
        let mood = mood.to_lowercase();
        let static_affinity = best_genre_affinity(&mood, genres);

        match pattern.mood_transitions.learned_genre_affinity(&mood, genres) {
            Some(learned) => clamp_unit(LEARNED_MOOD_WEIGHT * learned + (1.0 - LEARNED_MOOD_WEIGHT) * static_affinity),
            None => clamp_unit(static_affinity),
        }
    }

    fn energy_fit(&self, game: &GameRecord, context: &SuggestionContext) -> f32 {
        match context.effective_energy() {
            Some(level) => clamp_unit(1.0 - (game_energy(game) - energy_target(level)).abs()),
            None => NEUTRAL,
        }
    }

    fn social_fit(&self, game: &GameRecord, context: &SuggestionContext) -> f32 {
        match context.effective_social() {
            Some(setting) => clamp_unit(1.0 - (game_socialness(game) - social_target(setting)).abs()),
            None => NEUTRAL,
        }
    }

    fn sequence_fit(&self, genres: &[String], pattern: &BehaviorPattern) -> f32 {
        let table = &pattern.genre_sequences;
        if table.recent_genres.is_empty() {
            return NEUTRAL;
        }
        match table.longest_match(&table.recent_genres, table.recent_genres.len()) {
            Some((_, stats)) => genres
                .iter()
                .map(|g| stats.probability_of(g))
                .fold(0.0, f32::max),
            None => 0.0,
        }
    }
}
