// ============================================
// Trait Extractor (玩家人設特徵)
// ============================================
//
// Maps aggregate play signals to persona traits:
// 1. Archetype - strict priority rules, first match wins
// 2. Intensity / Pacing - session volume and length
// 3. Risk profile - difficulty preference
// 4. Social style - multiplayer ratio
//
// Pure and total: absent signals never satisfy a threshold,
// so every rule falls through to its default bucket.

use crate::models::{normalize_genre, Session};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SPECIALIST_COMPLETION_RATE: f64 = 0.7;
const STRATEGIST_GENRE_SHARE: f64 = 0.4;
const SOCIALIZER_MULTIPLAYER_RATIO: f64 = 0.6;
const EXPLORER_GENRE_SHARE: f64 = 0.4;
const MIN_CONFIDENCE: f32 = 0.3;
const SIGNAL_FIELD_COUNT: f32 = 6.0;

/// Aggregate play signals, derived upstream from a session history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlayerSignals {
    #[serde(default)]
    pub playtime_by_genre: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub average_session_length_minutes: Option<f64>,
    #[serde(default)]
    pub sessions_per_week: Option<f64>,
    #[serde(default)]
    pub difficulty_preference: Option<String>,
    #[serde(default)]
    pub multiplayer_ratio: Option<f64>,
    #[serde(default)]
    pub completion_rate: Option<f64>,
}

impl RawPlayerSignals {
    /// Derive the session-based fields from a play history.
    ///
    /// Completion rate and difficulty preference come from the catalog
    /// collaborator, so they are passed through.
    pub fn from_sessions(
        sessions: &[Session],
        completion_rate: Option<f64>,
        difficulty_preference: Option<String>,
    ) -> Self {
        let valid: Vec<&Session> = sessions.iter().filter(|s| s.is_valid()).collect();
        if valid.is_empty() {
            return Self {
                completion_rate,
                difficulty_preference,
                ..Self::default()
            };
        }

        let mut playtime_by_genre: BTreeMap<String, f64> = BTreeMap::new();
        for session in &valid {
            if let Some(genre) = session.primary_genre() {
                *playtime_by_genre.entry(genre).or_insert(0.0) += session.duration_minutes.max(0.0);
            }
        }

        let total_minutes: f64 = valid.iter().map(|s| s.duration_minutes.max(0.0)).sum();
        let average = total_minutes / valid.len() as f64;

        let timestamps: Vec<_> = valid.iter().filter_map(|s| s.timestamp()).collect();
        let sessions_per_week = match (timestamps.iter().min(), timestamps.iter().max()) {
            (Some(first), Some(last)) => {
                let days = (*last - *first).num_days().max(0) as f64;
                let weeks = (days / 7.0).max(1.0);
                Some(timestamps.len() as f64 / weeks)
            }
            _ => None,
        };

        let flagged: Vec<bool> = valid.iter().filter_map(|s| s.is_multiplayer).collect();
        let multiplayer_ratio = if flagged.is_empty() {
            None
        } else {
            Some(flagged.iter().filter(|m| **m).count() as f64 / flagged.len() as f64)
        };

        Self {
            playtime_by_genre: Some(playtime_by_genre).filter(|m| !m.is_empty()),
            average_session_length_minutes: Some(average),
            sessions_per_week,
            difficulty_preference,
            multiplayer_ratio,
            completion_rate,
        }
    }

    fn genre_share(&self, genres: &[&str]) -> Option<f64> {
        let playtime = self.playtime_by_genre.as_ref()?;
        let total: f64 = playtime.values().filter(|v| v.is_finite() && **v > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let matched: f64 = playtime
            .iter()
            .filter(|(genre, _)| genres.contains(&normalize_genre(genre).as_str()))
            .map(|(_, minutes)| minutes.max(0.0))
            .sum();
        Some(matched / total)
    }

    fn present_field_count(&self) -> usize {
        let finite = |v: Option<f64>| v.map_or(false, f64::is_finite);
        [
            self.playtime_by_genre.as_ref().map_or(false, |m| !m.is_empty()),
            finite(self.average_session_length_minutes),
            finite(self.sessions_per_week),
            self.difficulty_preference
                .as_deref()
                .map_or(false, |d| !d.trim().is_empty()),
            finite(self.multiplayer_ratio),
            finite(self.completion_rate),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Archetype {
    Specialist,
    Strategist,
    Socializer,
    Explorer,
    Competitor,
    Achiever,
}

impl Archetype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Archetype::Specialist => "Specialist",
            Archetype::Strategist => "Strategist",
            Archetype::Socializer => "Socializer",
            Archetype::Explorer => "Explorer",
            Archetype::Competitor => "Competitor",
            Archetype::Achiever => "Achiever",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intensity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pacing {
    Burst,
    Flow,
    Marathon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskProfile {
    Comfort,
    Balanced,
    Experimental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocialStyle {
    Solo,
    Coop,
    Competitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifficultyPreference {
    Relaxed,
    Normal,
    Hard,
    Brutal,
}

impl DifficultyPreference {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relaxed" => Some(DifficultyPreference::Relaxed),
            "normal" => Some(DifficultyPreference::Normal),
            "hard" => Some(DifficultyPreference::Hard),
            "brutal" => Some(DifficultyPreference::Brutal),
            _ => None,
        }
    }
}

/// Persona traits, produced fresh on every extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaTraits {
    pub archetype: Archetype,
    pub intensity: Intensity,
    pub pacing: Pacing,
    pub risk_profile: RiskProfile,
    pub social_style: SocialStyle,
    /// Share of signal fields present, in [0.3, 1.0]
    pub confidence: f32,
}

/// Stateless trait extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct TraitExtractor;

impl TraitExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn derive_persona_traits(&self, signals: &RawPlayerSignals) -> PersonaTraits {
        derive_persona_traits(signals)
    }
}

pub fn derive_persona_traits(signals: &RawPlayerSignals) -> PersonaTraits {
    let confidence = (signals.present_field_count() as f32 / SIGNAL_FIELD_COUNT).clamp(MIN_CONFIDENCE, 1.0);

    PersonaTraits {
        archetype: archetype(signals),
        intensity: intensity(signals),
        pacing: pacing(signals),
        risk_profile: risk_profile(signals),
        social_style: social_style(signals),
        confidence,
    }
}

fn above(value: Option<f64>, threshold: f64) -> bool {
    value.map_or(false, |v| v > threshold)
}

fn below(value: Option<f64>, threshold: f64) -> bool {
    value.map_or(false, |v| v < threshold)
}

fn archetype(signals: &RawPlayerSignals) -> Archetype {
    let difficulty = signals
        .difficulty_preference
        .as_deref()
        .and_then(DifficultyPreference::parse);

    if above(signals.completion_rate, SPECIALIST_COMPLETION_RATE) {
        Archetype::Specialist
    } else if above(signals.genre_share(&["strategy"]), STRATEGIST_GENRE_SHARE) {
        Archetype::Strategist
    } else if above(signals.multiplayer_ratio, SOCIALIZER_MULTIPLAYER_RATIO) {
        Archetype::Socializer
    } else if above(signals.genre_share(&["adventure", "open-world"]), EXPLORER_GENRE_SHARE) {
        Archetype::Explorer
    } else if difficulty == Some(DifficultyPreference::Brutal) {
        Archetype::Competitor
    } else {
        Archetype::Achiever
    }
}

fn intensity(signals: &RawPlayerSignals) -> Intensity {
    let per_week = signals.sessions_per_week;
    let length = signals.average_session_length_minutes;

    if per_week.map_or(false, |v| v >= 5.0) || length.map_or(false, |v| v >= 120.0) {
        Intensity::High
    } else if per_week.map_or(false, |v| v <= 2.0) && below(length, 60.0) {
        Intensity::Low
    } else {
        Intensity::Medium
    }
}

fn pacing(signals: &RawPlayerSignals) -> Pacing {
    let length = signals.average_session_length_minutes;
    if below(length, 45.0) {
        Pacing::Burst
    } else if above(length, 120.0) {
        Pacing::Marathon
    } else {
        Pacing::Flow
    }
}

fn risk_profile(signals: &RawPlayerSignals) -> RiskProfile {
    match signals
        .difficulty_preference
        .as_deref()
        .and_then(DifficultyPreference::parse)
    {
        Some(DifficultyPreference::Relaxed) => RiskProfile::Comfort,
        Some(DifficultyPreference::Hard) | Some(DifficultyPreference::Brutal) => RiskProfile::Experimental,
        Some(DifficultyPreference::Normal) | None => RiskProfile::Balanced,
    }
}

fn social_style(signals: &RawPlayerSignals) -> SocialStyle {
    if below(signals.multiplayer_ratio, 0.2) {
        SocialStyle::Solo
    } else if above(signals.multiplayer_ratio, 0.7) {
        SocialStyle::Competitive
    } else {
        SocialStyle::Coop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn genres(pairs: &[(&str, f64)]) -> Option<BTreeMap<String, f64>> {
        Some(pairs.iter().map(|(g, m)| (g.to_string(), *m)).collect())
    }

    #[test]
    fn test_specialist_example() {
        let signals = RawPlayerSignals {
            completion_rate: Some(0.75),
            sessions_per_week: Some(6.0),
            average_session_length_minutes: Some(150.0),
            ..RawPlayerSignals::default()
        };

        let traits = derive_persona_traits(&signals);
        assert_eq!(traits.archetype, Archetype::Specialist);
        assert_eq!(traits.intensity, Intensity::High);
        assert_eq!(traits.pacing, Pacing::Marathon);
        // 3 of 6 fields present
        assert!((traits.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_completion_rate_wins_over_everything() {
        let signals = RawPlayerSignals {
            playtime_by_genre: genres(&[("Strategy", 900.0), ("Adventure", 10.0)]),
            multiplayer_ratio: Some(0.95),
            difficulty_preference: Some("Brutal".to_string()),
            completion_rate: Some(0.8),
            ..RawPlayerSignals::default()
        };
        assert_eq!(derive_persona_traits(&signals).archetype, Archetype::Specialist);
    }

    #[test]
    fn test_archetype_priority_chain() {
        let strategist = RawPlayerSignals {
            playtime_by_genre: genres(&[("strategy", 50.0), ("shooter", 50.0)]),
            multiplayer_ratio: Some(0.9),
            ..RawPlayerSignals::default()
        };
        assert_eq!(derive_persona_traits(&strategist).archetype, Archetype::Strategist);

        let socializer = RawPlayerSignals {
            playtime_by_genre: genres(&[("Open World", 80.0), ("shooter", 20.0)]),
            multiplayer_ratio: Some(0.61),
            ..RawPlayerSignals::default()
        };
        assert_eq!(derive_persona_traits(&socializer).archetype, Archetype::Socializer);

        let explorer = RawPlayerSignals {
            playtime_by_genre: genres(&[("adventure", 30.0), ("open_world", 20.0), ("puzzle", 50.0)]),
            ..RawPlayerSignals::default()
        };
        assert_eq!(derive_persona_traits(&explorer).archetype, Archetype::Explorer);

        let competitor = RawPlayerSignals {
            difficulty_preference: Some("brutal".to_string()),
            ..RawPlayerSignals::default()
        };
        assert_eq!(derive_persona_traits(&competitor).archetype, Archetype::Competitor);

        assert_eq!(
            derive_persona_traits(&RawPlayerSignals::default()).archetype,
            Archetype::Achiever
        );
    }

    #[test]
    fn test_intensity_and_pacing_buckets() {
        let low = RawPlayerSignals {
            sessions_per_week: Some(2.0),
            average_session_length_minutes: Some(30.0),
            ..RawPlayerSignals::default()
        };
        let traits = derive_persona_traits(&low);
        assert_eq!(traits.intensity, Intensity::Low);
        assert_eq!(traits.pacing, Pacing::Burst);

        let medium = RawPlayerSignals {
            sessions_per_week: Some(3.0),
            average_session_length_minutes: Some(90.0),
            ..RawPlayerSignals::default()
        };
        let traits = derive_persona_traits(&medium);
        assert_eq!(traits.intensity, Intensity::Medium);
        assert_eq!(traits.pacing, Pacing::Flow);

        let long_sessions = RawPlayerSignals {
            sessions_per_week: Some(1.0),
            average_session_length_minutes: Some(120.0),
            ..RawPlayerSignals::default()
        };
        assert_eq!(derive_persona_traits(&long_sessions).intensity, Intensity::High);
    }

    #[test]
    fn test_risk_and_social() {
        let signals = RawPlayerSignals {
            difficulty_preference: Some("Relaxed".to_string()),
            multiplayer_ratio: Some(0.1),
            ..RawPlayerSignals::default()
        };
        let traits = derive_persona_traits(&signals);
        assert_eq!(traits.risk_profile, RiskProfile::Comfort);
        assert_eq!(traits.social_style, SocialStyle::Solo);

        let signals = RawPlayerSignals {
            difficulty_preference: Some("Hard".to_string()),
            multiplayer_ratio: Some(0.75),
            ..RawPlayerSignals::default()
        };
        let traits = derive_persona_traits(&signals);
        assert_eq!(traits.risk_profile, RiskProfile::Experimental);
        assert_eq!(traits.social_style, SocialStyle::Competitive);

        let signals = RawPlayerSignals {
            difficulty_preference: Some("nightmare".to_string()),
            multiplayer_ratio: Some(0.5),
            ..RawPlayerSignals::default()
        };
        let traits = derive_persona_traits(&signals);
        assert_eq!(traits.risk_profile, RiskProfile::Balanced);
        assert_eq!(traits.social_style, SocialStyle::Coop);
    }

    #[test]
    fn test_confidence_bounds_and_determinism() {
        let empty = derive_persona_traits(&RawPlayerSignals::default());
        assert!((empty.confidence - 0.3).abs() < 1e-6);

        let full = RawPlayerSignals {
            playtime_by_genre: genres(&[("rpg", 10.0)]),
            average_session_length_minutes: Some(60.0),
            sessions_per_week: Some(3.0),
            difficulty_preference: Some("Normal".to_string()),
            multiplayer_ratio: Some(0.3),
            completion_rate: Some(0.4),
        };
        let a = derive_persona_traits(&full);
        let b = TraitExtractor::new().derive_persona_traits(&full);
        assert_eq!(a, b);
        assert!((a.confidence - 1.0).abs() < 1e-6);

        let blank_difficulty = RawPlayerSignals {
            difficulty_preference: Some("  ".to_string()),
            playtime_by_genre: Some(BTreeMap::new()),
            ..RawPlayerSignals::default()
        };
        assert!((derive_persona_traits(&blank_difficulty).confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_signals_from_sessions() {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 19, 0, 0).unwrap();
        let sessions: Vec<Session> = (0..14)
            .map(|i| {
                Session::new("civ6", start + Duration::days(i), 90.0)
                    .with_genres(["Strategy"])
                    .with_multiplayer(i % 2 == 0)
            })
            .chain(std::iter::once(Session::default()))
            .collect();

        let signals = RawPlayerSignals::from_sessions(&sessions, Some(0.2), None);
        assert_eq!(signals.average_session_length_minutes, Some(90.0));
        assert_eq!(signals.multiplayer_ratio, Some(0.5));
        // 14 sessions over 13 days
        let per_week = signals.sessions_per_week.unwrap();
        assert!((per_week - 14.0 / (13.0 / 7.0)).abs() < 1e-9);

        let traits = derive_persona_traits(&signals);
        assert_eq!(traits.archetype, Archetype::Strategist);
        assert_eq!(traits.intensity, Intensity::High);
    }
}
