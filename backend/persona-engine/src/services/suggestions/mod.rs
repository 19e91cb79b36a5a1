// ============================================
// Predictive Suggestion Engine (預測推薦)
// ============================================
//
// Ranks candidate games for a user from learned play behavior:
// 1. Behavior patterns - time, session length, genre sequences,
//    mood transitions, devices
// 2. Fit scoring - time / mood / energy / social / sequence fit in [0, 1]
// 3. Next-game prediction - longest genre-suffix match
// 4. Insights - peak hours, anomalies, recommendations
//
// Flow:
//   sessions ──► BehaviorBuilder ──► BehaviorStore (per user)
//                                         │
//   candidates + context ──► FitScorer ◄──┘ ──► SuggestionSet ──► SuggestionCache
//
// Any pattern change for a user invalidates that user's cached sets.

pub mod behavior_builder;
pub mod cache;
pub mod engine;
pub mod fit_scorer;
pub mod store;

pub use behavior_builder::{
    BehaviorBuilder, BehaviorBuilderConfig, BehaviorPattern, DevicePatterns, GenreSequenceTable,
    MoodTransitionTable, SessionLengthPatterns, TimePatterns,
};
pub use cache::SuggestionCache;
pub use engine::PredictiveSuggestionEngine;
pub use fit_scorer::{FitScorer, FitWeights};
pub use store::{BehaviorStore, InMemoryBehaviorStore};

use crate::services::traits::{Intensity, PersonaTraits, SocialStyle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("Behavior store error: {0}")]
    StoreError(String),
}

pub type Result<T> = std::result::Result<T, SuggestionError>;

/// Suggestion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionConfig {
    /// How long a cached suggestion set stays valid
    pub cache_ttl_secs: u64,
    pub max_suggestions: usize,
    pub alternatives_per_suggestion: usize,
    pub weights: FitWeights,
    /// Flat confidence for users without behavior history
    pub fallback_confidence: f32,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            max_suggestions: 5,
            alternatives_per_suggestion: 2,
            weights: FitWeights::default(),
            fallback_confidence: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl From<Intensity> for EnergyLevel {
    fn from(intensity: Intensity) -> Self {
        match intensity {
            Intensity::Low => EnergyLevel::Low,
            Intensity::Medium => EnergyLevel::Medium,
            Intensity::High => EnergyLevel::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialContext {
    Solo,
    Coop,
    Competitive,
}

impl From<SocialStyle> for SocialContext {
    fn from(style: SocialStyle) -> Self {
        match style {
            SocialStyle::Solo => SocialContext::Solo,
            SocialStyle::Coop => SocialContext::Coop,
            SocialStyle::Competitive => SocialContext::Competitive,
        }
    }
}

/// What the user asked for right now; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionContext {
    #[serde(default)]
    pub available_minutes: Option<f64>,
    #[serde(default)]
    pub current_mood: Option<String>,
    #[serde(default)]
    pub energy_level: Option<EnergyLevel>,
    #[serde(default)]
    pub social_context: Option<SocialContext>,
    #[serde(default)]
    pub current_hour: Option<u8>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub persona: Option<PersonaTraits>,
}

impl SuggestionContext {
    /// Requested energy, falling back to the persona's intensity
    pub fn effective_energy(&self) -> Option<EnergyLevel> {
        self.energy_level
            .or_else(|| self.persona.as_ref().map(|p| p.intensity.into()))
    }

    /// Requested social setting, falling back to the persona's social style
    pub fn effective_social(&self) -> Option<SocialContext> {
        self.social_context
            .or_else(|| self.persona.as_ref().map(|p| p.social_style.into()))
    }

    pub fn mood(&self) -> Option<&str> {
        self.current_mood
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Stable textual key for the suggestion cache
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Per-dimension fit, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitScores {
    pub time: f32,
    pub mood: f32,
    pub energy: f32,
    pub social: f32,
    pub sequence: f32,
}

impl FitScores {
    pub fn neutral() -> Self {
        Self {
            time: 0.5,
            mood: 0.5,
            energy: 0.5,
            social: 0.5,
            sequence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveSuggestion {
    pub game_id: String,
    pub title: String,
    pub confidence: f32,
    pub reasoning: Vec<String>,
    pub predicted_satisfaction: f32,
    pub estimated_playtime_minutes: f64,
    pub fit_scores: FitScores,
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSet {
    pub user_id: Uuid,
    /// Sorted by non-increasing confidence
    pub suggestions: Vec<PredictiveSuggestion>,
    /// True when the user had no behavior history
    pub fallback: bool,
    pub generated_at: DateTime<Utc>,
}

/// Summary of a behavior-pattern rebuild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorAnalysis {
    pub user_id: Uuid,
    pub sessions_analyzed: usize,
    pub skipped_malformed: usize,
    pub peak_hours: Vec<u8>,
    pub average_session_minutes: f64,
    pub genre_sequences: usize,
    pub mood_transitions: usize,
    pub devices: usize,
    /// False when no valid session was left and the pattern was removed
    pub stored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextGamePrediction {
    pub game_id: Option<String>,
    pub genre: Option<String>,
    pub confidence: f32,
    /// Genre suffix that matched, oldest first
    pub matched_sequence: Vec<String>,
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    PeakHours,
    SessionLengthAnomaly,
    GenreSwitchAnomaly,
    Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveInsight {
    pub kind: InsightKind,
    pub description: String,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::traits::{Archetype, Pacing, RiskProfile};

    fn persona() -> PersonaTraits {
        PersonaTraits {
            archetype: Archetype::Competitor,
            intensity: Intensity::High,
            pacing: Pacing::Flow,
            risk_profile: RiskProfile::Experimental,
            social_style: SocialStyle::Competitive,
            confidence: 0.8,
        }
    }

    #[test]
    fn test_context_falls_back_to_persona() {
        let context = SuggestionContext {
            persona: Some(persona()),
            ..SuggestionContext::default()
        };
        assert_eq!(context.effective_energy(), Some(EnergyLevel::High));
        assert_eq!(context.effective_social(), Some(SocialContext::Competitive));

        let explicit = SuggestionContext {
            energy_level: Some(EnergyLevel::Low),
            ..context
        };
        assert_eq!(explicit.effective_energy(), Some(EnergyLevel::Low));
        assert_eq!(SuggestionContext::default().effective_social(), None);
    }

    #[test]
    fn test_cache_key_distinguishes_contexts() {
        let a = SuggestionContext {
            available_minutes: Some(30.0),
            ..SuggestionContext::default()
        };
        let b = SuggestionContext {
            available_minutes: Some(90.0),
            ..SuggestionContext::default()
        };
        assert_eq!(a.cache_key(), a.clone().cache_key());
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_blank_mood_is_absent() {
        let context = SuggestionContext {
            current_mood: Some("  ".to_string()),
            ..SuggestionContext::default()
        };
        assert_eq!(context.mood(), None);
    }
}
