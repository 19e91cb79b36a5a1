// ============================================
// Behavior Pattern Builder (行為模式構建器)
// ============================================
//
// Analyzes play behavior from session data:
// 1. Time patterns (when the user plays)
// 2. Session length patterns (overall and per genre)
// 3. Genre sequences (which genre follows which)
// 4. Mood transitions (which mood follows which, and what gets played)
// 5. Device patterns
//
// Batch builds fold the same per-session update used incrementally,
// so a rebuild and a stream of updates end in the same pattern.

use crate::models::{normalize_genre, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

const SEQUENCE_SEPARATOR: &str = ">";

/// Hour-of-day and day-of-week activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimePatterns {
    pub hour_counts: [u32; 24],
    /// 0 = Monday, 6 = Sunday
    pub day_counts: [u32; 7],
    /// Busiest hours, busiest first
    pub peak_hours: Vec<u8>,
}

impl TimePatterns {
    fn record(&mut self, hour: u8, weekday: u8, peak_hour_count: usize) {
        if let Some(slot) = self.hour_counts.get_mut(hour as usize) {
            *slot += 1;
        }
        if let Some(slot) = self.day_counts.get_mut(weekday as usize) {
            *slot += 1;
        }

        let mut hours: Vec<(u8, u32)> = self
            .hour_counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(h, &c)| (h as u8, c))
            .collect();
        hours.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        self.peak_hours = hours.into_iter().take(peak_hour_count).map(|(h, _)| h).collect();
    }

    pub fn total(&self) -> u32 {
        self.hour_counts.iter().sum()
    }

    /// Share of timed sessions that started in one of the peak hours
    pub fn peak_share(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let peak: u32 = self
            .peak_hours
            .iter()
            .map(|h| self.hour_counts[*h as usize])
            .sum();
        peak as f32 / total as f32
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenreLengthStats {
    pub sessions: u32,
    pub total_minutes: f64,
}

impl GenreLengthStats {
    pub fn mean_minutes(&self) -> f64 {
        if self.sessions == 0 {
            0.0
        } else {
            self.total_minutes / self.sessions as f64
        }
    }
}

/// Running session-length statistics (Welford)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLengthPatterns {
    pub count: u64,
    pub mean_minutes: f64,
    m2: f64,
    pub by_genre: BTreeMap<String, GenreLengthStats>,
    /// Most recent session lengths, oldest first
    pub recent_minutes: Vec<f64>,
}

impl SessionLengthPatterns {
    fn record(&mut self, minutes: f64, genres: &[String], window: usize) {
        let minutes = if minutes.is_finite() { minutes.max(0.0) } else { 0.0 };

        self.count += 1;
        let delta = minutes - self.mean_minutes;
        self.mean_minutes += delta / self.count as f64;
        self.m2 += delta * (minutes - self.mean_minutes);

        for genre in genres {
            let stats = self.by_genre.entry(genre.clone()).or_default();
            stats.sessions += 1;
            stats.total_minutes += minutes;
        }

        self.recent_minutes.push(minutes);
        if self.recent_minutes.len() > window {
            let excess = self.recent_minutes.len() - window;
            self.recent_minutes.drain(..excess);
        }
    }

    /// Population standard deviation
    pub fn std_dev_minutes(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / self.count as f64).sqrt()
    }

    /// Typical session length for games with any of `genres`
    pub fn expected_minutes(&self, genres: &[String]) -> Option<f64> {
        let (sessions, minutes) = genres
            .iter()
            .filter_map(|g| self.by_genre.get(g))
            .fold((0u32, 0.0), |(s, m), stats| (s + stats.sessions, m + stats.total_minutes));
        if sessions == 0 {
            None
        } else {
            Some(minutes / sessions as f64)
        }
    }

    /// How much of the user's play falls in `genres`, relative to their top genre
    pub fn genre_familiarity(&self, genres: &[String]) -> f32 {
        let top = self.by_genre.values().map(|s| s.sessions).max().unwrap_or(0);
        if top == 0 {
            return 0.0;
        }
        let best = genres
            .iter()
            .filter_map(|g| self.by_genre.get(g))
            .map(|s| s.sessions)
            .max()
            .unwrap_or(0);
        best as f32 / top as f32
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceStats {
    /// Times this sequence was followed by another session
    pub frequency: u32,
    pub next_genres: BTreeMap<String, u32>,
}

impl SequenceStats {
    /// Next genres, most frequent first
    pub fn ranked_next(&self) -> Vec<(&str, u32)> {
        let mut ranked: Vec<(&str, u32)> = self.next_genres.iter().map(|(g, c)| (g.as_str(), *c)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    pub fn probability_of(&self, genre: &str) -> f32 {
        if self.frequency == 0 {
            return 0.0;
        }
        self.next_genres.get(genre).copied().unwrap_or(0) as f32 / self.frequency as f32
    }
}

/// Genre n-grams (up to `max_sequence_length`) and what followed them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenreSequenceTable {
    pub sequences: BTreeMap<String, SequenceStats>,
    /// Trailing genres of the history, oldest first
    pub recent_genres: Vec<String>,
}

pub fn sequence_key(genres: &[String]) -> String {
    genres.join(SEQUENCE_SEPARATOR)
}

impl GenreSequenceTable {
    fn record(&mut self, genre: &str, max_length: usize) {
        let available = self.recent_genres.len().min(max_length);
        for length in 1..=available {
            let suffix = &self.recent_genres[self.recent_genres.len() - length..];
            let stats = self.sequences.entry(sequence_key(suffix)).or_default();
            stats.frequency += 1;
            *stats.next_genres.entry(genre.to_string()).or_insert(0) += 1;
        }

        self.recent_genres.push(genre.to_string());
        if self.recent_genres.len() > max_length {
            let excess = self.recent_genres.len() - max_length;
            self.recent_genres.drain(..excess);
        }
    }

    pub fn get(&self, sequence: &[String]) -> Option<&SequenceStats> {
        self.sequences.get(&sequence_key(sequence))
    }

    /// Longest suffix of `genres` with recorded successors
    pub fn longest_match<'a>(&self, genres: &'a [String], max_length: usize) -> Option<(&'a [String], &SequenceStats)> {
        let longest = genres.len().min(max_length);
        (1..=longest).rev().find_map(|length| {
            let suffix = &genres[genres.len() - length..];
            self.get(suffix)
                .filter(|stats| stats.frequency > 0)
                .map(|stats| (suffix, stats))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodTransitionStats {
    pub count: u32,
    /// Primary genre of the session that opened the new mood
    pub trigger_genres: BTreeMap<String, u32>,
}

/// Mood-to-mood transitions over mood-tagged sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodTransitionTable {
    pub transitions: BTreeMap<String, BTreeMap<String, MoodTransitionStats>>,
    /// Genres played while in each mood
    pub mood_genres: BTreeMap<String, BTreeMap<String, u32>>,
    pub last_mood: Option<String>,
}

impl MoodTransitionTable {
    fn record(&mut self, mood: &str, genre: Option<&str>) {
        if let Some(genre) = genre {
            *self
                .mood_genres
                .entry(mood.to_string())
                .or_default()
                .entry(genre.to_string())
                .or_insert(0) += 1;
        }

        if let Some(previous) = self.last_mood.take() {
            let stats = self
                .transitions
                .entry(previous)
                .or_default()
                .entry(mood.to_string())
                .or_default();
            stats.count += 1;
            if let Some(genre) = genre {
                *stats.trigger_genres.entry(genre.to_string()).or_insert(0) += 1;
            }
        }
        self.last_mood = Some(mood.to_string());
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.values().map(|to| to.len()).sum()
    }

    /// Share of what the user played in `mood` (or right after leaving it)
    /// that falls in `genres`; `None` without any history for the mood
    pub fn learned_genre_affinity(&self, mood: &str, genres: &[String]) -> Option<f32> {
        let played = self.mood_genres.get(mood).into_iter().flatten();
        let triggered = self
            .transitions
            .get(mood)
            .into_iter()
            .flat_map(|to| to.values())
            .flat_map(|stats| stats.trigger_genres.iter());

        let (matched, total) = played.chain(triggered).fold((0u32, 0u32), |(m, t), (genre, count)| {
            if genres.contains(genre) {
                (m + count, t + count)
            } else {
                (m, t + count)
            }
        });

        if total == 0 {
            None
        } else {
            Some(matched as f32 / total as f32)
        }
    }

    /// Most frequent change of mood: (from, to, count, share of `from`'s transitions)
    pub fn strongest_transition(&self) -> Option<(&str, &str, u32, f32)> {
        self.transitions
            .iter()
            .flat_map(|(from, to)| {
                let total: u32 = to.values().map(|s| s.count).sum();
                to.iter()
                    .filter(move |(mood, _)| *mood != from)
                    .map(move |(mood, stats)| {
                        (from.as_str(), mood.as_str(), stats.count, stats.count as f32 / total.max(1) as f32)
                    })
            })
            .max_by(|a, b| a.2.cmp(&b.2).then_with(|| b.0.cmp(a.0)).then_with(|| b.1.cmp(a.1)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicePatterns {
    pub counts: BTreeMap<String, u32>,
    pub primary_device: Option<String>,
}

impl DevicePatterns {
    fn record(&mut self, device: &str) {
        let device = device.trim().to_lowercase();
        if device.is_empty() {
            return;
        }
        *self.counts.entry(device).or_insert(0) += 1;
        self.primary_device = self
            .counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(d, _)| d.clone());
    }

    pub fn share(&self, device: &str) -> f32 {
        let total: u32 = self.counts.values().sum();
        if total == 0 {
            return 0.0;
        }
        let device = device.trim().to_lowercase();
        self.counts.get(&device).copied().unwrap_or(0) as f32 / total as f32
    }
}

/// User behavior pattern profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorPattern {
    pub user_id: Uuid,
    pub time_patterns: TimePatterns,
    pub session_lengths: SessionLengthPatterns,
    pub genre_sequences: GenreSequenceTable,
    pub mood_transitions: MoodTransitionTable,
    pub device_patterns: DevicePatterns,
    pub session_count: u64,
    pub last_session_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl BehaviorPattern {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            time_patterns: TimePatterns::default(),
            session_lengths: SessionLengthPatterns::default(),
            genre_sequences: GenreSequenceTable::default(),
            mood_transitions: MoodTransitionTable::default(),
            device_patterns: DevicePatterns::default(),
            session_count: 0,
            last_session_at: None,
            updated_at: Utc::now(),
        }
    }
}

/// Configuration for behavior pattern building
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorBuilderConfig {
    /// Longest genre n-gram tracked
    pub max_sequence_length: usize,
    /// Recent session lengths kept for anomaly checks
    pub recent_length_window: usize,
    pub peak_hour_count: usize,
}

impl Default for BehaviorBuilderConfig {
    fn default() -> Self {
        Self {
            max_sequence_length: 3,
            recent_length_window: 10,
            peak_hour_count: 3,
        }
    }
}

/// Behavior pattern builder
#[derive(Debug, Clone, Default)]
pub struct BehaviorBuilder {
    config: BehaviorBuilderConfig,
}

impl BehaviorBuilder {
    pub fn new(config: BehaviorBuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BehaviorBuilderConfig {
        &self.config
    }

    /// Build a fresh pattern from a session history; `None` when no session is valid
    pub fn build_pattern(&self, user_id: Uuid, sessions: &[Session]) -> Option<BehaviorPattern> {
        let mut ordered: Vec<&Session> = sessions.iter().filter(|s| s.is_valid()).collect();
        if ordered.is_empty() {
            return None;
        }
        ordered.sort_by_key(|s| s.timestamp());

        let mut pattern = BehaviorPattern::new(user_id);
        for session in ordered {
            self.apply_session(&mut pattern, session);
        }

        debug!(
            user_id = %user_id,
            sessions = pattern.session_count,
            sequences = pattern.genre_sequences.sequences.len(),
            "Behavior pattern built"
        );
        Some(pattern)
    }

    /// Fold one session into every pattern category; false for malformed sessions
    pub fn apply_session(&self, pattern: &mut BehaviorPattern, session: &Session) -> bool {
        if !session.is_valid() {
            return false;
        }

        let genres: Vec<String> = {
            let mut genres: Vec<String> = session
                .genres
                .iter()
                .map(|g| normalize_genre(g))
                .filter(|g| !g.is_empty())
                .collect();
            genres.dedup();
            genres
        };
        let primary = genres.first().map(String::as_str);

        if let (Some(hour), Some(weekday)) = (session.hour(), session.weekday()) {
            pattern
                .time_patterns
                .record(hour, weekday, self.config.peak_hour_count);
        }

        pattern.session_lengths.record(
            session.duration_minutes,
            &genres,
            self.config.recent_length_window,
        );

        if let Some(genre) = primary {
            pattern
                .genre_sequences
                .record(genre, self.config.max_sequence_length);
        }

        if let Some(mood) = session.mood_id() {
            pattern.mood_transitions.record(&mood.to_lowercase(), primary);
        }

        if let Some(device) = session.device.as_deref() {
            pattern.device_patterns.record(device);
        }

        pattern.session_count += 1;
        if let Some(ts) = session.timestamp() {
            pattern.last_session_at = Some(pattern.last_session_at.map_or(ts, |last| last.max(ts)));
        }
        pattern.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, 20, 0, 0).unwrap()
    }

    fn sessions() -> Vec<Session> {
        let plan = [
            ("hades", "Roguelike", 40.0, "energetic", "pc"),
            ("civ6", "Strategy", 120.0, "focused", "pc"),
            ("hades", "Roguelike", 45.0, "energetic", "pc"),
            ("civ6", "Strategy", 110.0, "focused", "pc"),
            ("stardew", "Simulation", 30.0, "chill", "switch"),
            ("hades", "Roguelike", 35.0, "energetic", "switch"),
            ("civ6", "Strategy", 130.0, "focused", "pc"),
        ];
        plan.iter()
            .enumerate()
            .map(|(i, (game, genre, minutes, mood, device))| {
                Session::new(*game, start() + Duration::hours(i as i64 * 25), *minutes)
                    .with_genres([*genre])
                    .with_mood(*mood)
                    .with_device(*device)
            })
            .collect()
    }

    #[test]
    fn test_build_pattern_covers_all_categories() {
        let builder = BehaviorBuilder::default();
        let user = Uuid::new_v4();
        let pattern = builder.build_pattern(user, &sessions()).unwrap();

        assert_eq!(pattern.user_id, user);
        assert_eq!(pattern.session_count, 7);
        assert_eq!(pattern.time_patterns.total(), 7);
        assert_eq!(pattern.time_patterns.peak_hours.len(), 3);

        let strategy = &pattern.session_lengths.by_genre["strategy"];
        assert_eq!(strategy.sessions, 3);
        assert!((strategy.mean_minutes() - 120.0).abs() < 1e-9);

        // roguelike is always followed by strategy
        let after_roguelike = pattern.genre_sequences.get(&["roguelike".to_string()]).unwrap();
        assert_eq!(after_roguelike.frequency, 3);
        assert!((after_roguelike.probability_of("strategy") - 1.0).abs() < 1e-6);
        assert_eq!(pattern.genre_sequences.recent_genres.len(), 3);

        let energetic = &pattern.mood_transitions.transitions["energetic"];
        assert_eq!(energetic["focused"].count, 3);
        assert_eq!(pattern.device_patterns.primary_device.as_deref(), Some("pc"));
    }

    #[test]
    fn test_incremental_matches_rebuild() {
        let builder = BehaviorBuilder::default();
        let user = Uuid::new_v4();
        let all = sessions();

        let mut incremental = builder.build_pattern(user, &all[..4]).unwrap();
        for session in &all[4..] {
            assert!(builder.apply_session(&mut incremental, session));
        }
        let rebuilt = builder.build_pattern(user, &all).unwrap();

        assert_eq!(incremental.time_patterns, rebuilt.time_patterns);
        assert_eq!(incremental.genre_sequences, rebuilt.genre_sequences);
        assert_eq!(incremental.mood_transitions, rebuilt.mood_transitions);
        assert_eq!(incremental.device_patterns, rebuilt.device_patterns);
        assert!((incremental.session_lengths.mean_minutes - rebuilt.session_lengths.mean_minutes).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_sessions_are_ignored() {
        let builder = BehaviorBuilder::default();
        assert!(builder.build_pattern(Uuid::new_v4(), &[Session::default()]).is_none());

        let mut pattern = BehaviorPattern::new(Uuid::new_v4());
        assert!(!builder.apply_session(&mut pattern, &Session::default()));
        assert_eq!(pattern.session_count, 0);
    }

    #[test]
    fn test_longest_match_prefers_longer_suffix() {
        let builder = BehaviorBuilder::default();
        let pattern = builder.build_pattern(Uuid::new_v4(), &sessions()).unwrap();
        let recent = vec!["strategy".to_string(), "roguelike".to_string()];

        let (matched, stats) = pattern.genre_sequences.longest_match(&recent, 3).unwrap();
        assert_eq!(matched, &recent[..]);
        assert_eq!(stats.ranked_next()[0].0, "strategy");

        let unknown = vec!["racing".to_string()];
        assert!(pattern.genre_sequences.longest_match(&unknown, 3).is_none());
    }

    #[test]
    fn test_session_length_statistics() {
        let mut lengths = SessionLengthPatterns::default();
        for minutes in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            lengths.record(minutes, &[], 5);
        }
        assert!((lengths.mean_minutes - 5.0).abs() < 1e-9);
        assert!((lengths.std_dev_minutes() - 2.0).abs() < 1e-9);
        assert_eq!(lengths.recent_minutes, vec![4.0, 5.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_learned_genre_affinity() {
        let builder = BehaviorBuilder::default();
        let pattern = builder.build_pattern(Uuid::new_v4(), &sessions()).unwrap();
        let table = &pattern.mood_transitions;

        let strategy = vec!["strategy".to_string()];
        let affinity = table.learned_genre_affinity("focused", &strategy).unwrap();
        assert!(affinity > 0.5);
        assert!(table.learned_genre_affinity("euphoric", &strategy).is_none());

        let (from, to, count, _) = table.strongest_transition().unwrap();
        assert_eq!((from, to, count), ("energetic", "focused", 3));
    }
}
