use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Mood reported when nothing better is known.
pub const NEUTRAL_MOOD: &str = "neutral";

/// One observed play session, as recorded by the session collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    /// Missing or empty ids mark the record as malformed
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub point_in_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: f64,
    #[serde(default)]
    pub achievement_count: Option<u32>,
    #[serde(default)]
    pub is_multiplayer: Option<bool>,
    /// Mood tag the user attached to the session
    #[serde(default)]
    pub mood: Option<String>,
    /// Catalog genres of the game, primary genre first
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub device: Option<String>,
}

impl Session {
    pub fn new(game_id: impl Into<String>, start_time: DateTime<Utc>, duration_minutes: f64) -> Self {
        Self {
            game_id: Some(game_id.into()),
            start_time: Some(start_time),
            duration_minutes,
            ..Self::default()
        }
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_multiplayer(mut self, is_multiplayer: bool) -> Self {
        self.is_multiplayer = Some(is_multiplayer);
        self
    }

    pub fn with_achievements(mut self, count: u32) -> Self {
        self.achievement_count = Some(count);
        self
    }

    /// Game id, if present and non-empty
    pub fn game(&self) -> Option<&str> {
        self.game_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn is_valid(&self) -> bool {
        self.game().is_some()
    }

    /// Start time, falling back to the point-in-time observation
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.start_time.or(self.point_in_time)
    }

    /// End time, or start + duration when the collector did not record one.
    /// `None` when the duration is not finite or runs past the calendar range.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        if let Some(end) = self.end_time {
            return Some(end);
        }
        let start = self.timestamp()?;
        let seconds = self.duration_minutes.max(0.0) * 60.0;
        if !seconds.is_finite() || seconds >= i64::MAX as f64 {
            return None;
        }
        let duration = chrono::Duration::try_seconds(seconds as i64)?;
        start.checked_add_signed(duration)
    }

    pub fn hour(&self) -> Option<u8> {
        self.timestamp().map(|t| t.hour() as u8)
    }

    /// 0 = Monday, 6 = Sunday
    pub fn weekday(&self) -> Option<u8> {
        self.timestamp()
            .map(|t| t.weekday().num_days_from_monday() as u8)
    }

    pub fn mood_id(&self) -> Option<&str> {
        self.mood
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    pub fn primary_genre(&self) -> Option<String> {
        self.genres
            .iter()
            .map(|g| normalize_genre(g))
            .find(|g| !g.is_empty())
    }
}

/// A game from the external catalog that may be suggested
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Catalog-wide popularity in [0, 1]
    #[serde(default)]
    pub popularity: Option<f32>,
    #[serde(default)]
    pub average_session_minutes: Option<f64>,
    #[serde(default)]
    pub multiplayer: bool,
}

impl GameRecord {
    pub fn new<I, S>(id: impl Into<String>, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            genres: genres.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_popularity(mut self, popularity: f32) -> Self {
        self.popularity = Some(popularity);
        self
    }

    pub fn with_multiplayer(mut self, multiplayer: bool) -> Self {
        self.multiplayer = multiplayer;
        self
    }

    pub fn with_average_session(mut self, minutes: f64) -> Self {
        self.average_session_minutes = Some(minutes);
        self
    }

    pub fn normalized_genres(&self) -> Vec<String> {
        self.genres
            .iter()
            .map(|g| normalize_genre(g))
            .filter(|g| !g.is_empty())
            .collect()
    }

    pub fn has_genre(&self, genre: &str) -> bool {
        let genre = normalize_genre(genre);
        self.genres.iter().any(|g| normalize_genre(g) == genre)
    }
}

/// Lowercase, trim, and fold `_` / spaces into `-` so "Open World" == "open-world"
pub fn normalize_genre(genre: &str) -> String {
    genre
        .trim()
        .to_lowercase()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_genre() {
        assert_eq!(normalize_genre("Open World"), "open-world");
        assert_eq!(normalize_genre("open_world"), "open-world");
        assert_eq!(normalize_genre("  Strategy "), "strategy");
    }

    #[test]
    fn test_session_timestamp_fallback() {
        let t = Utc.with_ymd_and_hms(2026, 3, 7, 21, 15, 0).unwrap();
        let session = Session {
            game_id: Some("hades".to_string()),
            point_in_time: Some(t),
            duration_minutes: 30.0,
            ..Session::default()
        };

        assert_eq!(session.timestamp(), Some(t));
        assert_eq!(session.hour(), Some(21));
        // 2026-03-07 is a Saturday
        assert_eq!(session.weekday(), Some(5));
        assert_eq!(session.finished_at(), Some(t + chrono::Duration::minutes(30)));
    }

    #[test]
    fn test_out_of_range_duration_has_no_end() {
        let t = Utc.with_ymd_and_hms(2026, 3, 7, 21, 15, 0).unwrap();
        assert_eq!(Session::new("hades", t, 1.0e13).finished_at(), None);
        assert_eq!(Session::new("hades", t, f64::INFINITY).finished_at(), None);
        assert_eq!(Session::new("hades", t, f64::MAX).finished_at(), None);

        // negative durations clamp to zero
        assert_eq!(Session::new("hades", t, -5.0).finished_at(), Some(t));

        let recorded = Session {
            end_time: Some(t),
            ..Session::new("hades", t, 1.0e13)
        };
        assert_eq!(recorded.finished_at(), Some(t));
    }

    #[test]
    fn test_blank_game_id_is_invalid() {
        let session = Session {
            game_id: Some("   ".to_string()),
            ..Session::default()
        };
        assert!(!session.is_valid());
        assert!(!Session::default().is_valid());
    }
}
