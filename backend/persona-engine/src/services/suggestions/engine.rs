use super::behavior_builder::{BehaviorBuilder, BehaviorBuilderConfig, BehaviorPattern};
use super::cache::SuggestionCache;
use super::fit_scorer::FitScorer;
use super::store::{BehaviorStore, InMemoryBehaviorStore};
use super::{
    BehaviorAnalysis, EnergyLevel, FitScores, InsightKind, NextGamePrediction, PredictiveInsight,
    PredictiveSuggestion, SocialContext, SuggestionConfig, SuggestionContext, SuggestionSet,
};
use crate::models::{GameRecord, Session};
use crate::utils::clamp_unit;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raw fit score a dimension needs before it is cited as a reason
const REASON_THRESHOLD: f32 = 0.6;
const MAX_REASONS: usize = 2;
const ANOMALY_SIGMA: f64 = 2.0;
const MIN_SESSIONS_FOR_ANOMALIES: u64 = 5;
/// Earlier switches away from a genre needed before a new one counts as unusual
const MIN_SWITCH_EVIDENCE: u32 = 3;
const RARE_SWITCH_PROBABILITY: f32 = 0.1;
const PRIMARY_DEVICE_SHARE: f32 = 0.6;

/// Predictive suggestion engine, one behavior pattern per user
pub struct PredictiveSuggestionEngine<S: BehaviorStore = InMemoryBehaviorStore> {
    config: SuggestionConfig,
    store: Arc<S>,
    builder: BehaviorBuilder,
    scorer: FitScorer,
    cache: SuggestionCache,
}

impl PredictiveSuggestionEngine<InMemoryBehaviorStore> {
    pub fn in_memory(config: SuggestionConfig) -> Self {
        Self::new(config, Arc::new(InMemoryBehaviorStore::new()))
    }
}

impl<S: BehaviorStore> PredictiveSuggestionEngine<S> {
    pub fn new(config: SuggestionConfig, store: Arc<S>) -> Self {
        Self::with_builder(config, store, BehaviorBuilderConfig::default())
    }

    pub fn with_builder(config: SuggestionConfig, store: Arc<S>, builder_config: BehaviorBuilderConfig) -> Self {
        let cache = SuggestionCache::new(config.cache_ttl_secs);
        Self {
            config,
            store,
            builder: BehaviorBuilder::new(builder_config),
            scorer: FitScorer::new(),
            cache,
        }
    }

    pub fn config(&self) -> &SuggestionConfig {
        &self.config
    }

    pub fn cache(&self) -> &SuggestionCache {
        &self.cache
    }

    /// Stored pattern for a user; store failures read as "no pattern"
    pub fn behavior_pattern(&self, user_id: Uuid) -> Option<BehaviorPattern> {
        match self.store.load(user_id) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load behavior pattern");
                None
            }
        }
    }

    /// Rebuild and replace the user's behavior pattern from a full history
    pub fn analyze_behavior_patterns(&self, user_id: Uuid, sessions: &[Session]) -> BehaviorAnalysis {
        let skipped_malformed = sessions.iter().filter(|s| !s.is_valid()).count();
        if skipped_malformed > 0 {
            warn!(user_id = %user_id, skipped = skipped_malformed, "Skipped sessions without a game id");
        }

        let analysis = match self.builder.build_pattern(user_id, sessions) {
            Some(pattern) => {
                let mut analysis = BehaviorAnalysis {
                    user_id,
                    sessions_analyzed: pattern.session_count as usize,
                    skipped_malformed,
                    peak_hours: pattern.time_patterns.peak_hours.clone(),
                    average_session_minutes: pattern.session_lengths.mean_minutes,
                    genre_sequences: pattern.genre_sequences.sequences.len(),
                    mood_transitions: pattern.mood_transitions.transition_count(),
                    devices: pattern.device_patterns.counts.len(),
                    stored: false,
                };
                analysis.stored = match self.store.save(pattern) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to save behavior pattern");
                        false
                    }
                };
                analysis
            }
            None => {
                if let Err(e) = self.store.remove(user_id) {
                    warn!(user_id = %user_id, error = %e, "Failed to remove behavior pattern");
                }
                BehaviorAnalysis {
                    user_id,
                    sessions_analyzed: 0,
                    skipped_malformed,
                    peak_hours: Vec::new(),
                    average_session_minutes: 0.0,
                    genre_sequences: 0,
                    mood_transitions: 0,
                    devices: 0,
                    stored: false,
                }
            }
        };

        self.cache.invalidate_user(user_id);

        info!(
            user_id = %user_id,
            sessions = analysis.sessions_analyzed,
            sequences = analysis.genre_sequences,
            transitions = analysis.mood_transitions,
            "Behavior patterns rebuilt"
        );
        analysis
    }

    pub fn generate_suggestions(
        &self,
        user_id: Uuid,
        candidates: &[GameRecord],
        context: &SuggestionContext,
    ) -> Arc<SuggestionSet> {
        self.generate_suggestions_at(user_id, candidates, context, Utc::now())
    }

    /// Same as `generate_suggestions` with an explicit clock
    pub fn generate_suggestions_at(
        &self,
        user_id: Uuid,
        candidates: &[GameRecord],
        context: &SuggestionContext,
        now: DateTime<Utc>,
    ) -> Arc<SuggestionSet> {
        let candidates: Vec<&GameRecord> = candidates.iter().filter(|g| !g.id.trim().is_empty()).collect();
        if candidates.is_empty() {
            debug!(user_id = %user_id, "No candidate games");
            return Arc::new(SuggestionSet {
                user_id,
                suggestions: Vec::new(),
                fallback: false,
                generated_at: now,
            });
        }

        let key = SuggestionCache::key(user_id, &context.cache_key());
        if let Some(cached) = self.cache.get(&key, now) {
            debug!(user_id = %user_id, "Suggestion cache hit");
            return cached;
        }
        debug!(user_id = %user_id, candidates = candidates.len(), "Suggestion cache miss");

        let set = match self.behavior_pattern(user_id) {
            Some(pattern) => self.rank(user_id, &candidates, context, &pattern, now),
            None => self.fallback_set(user_id, &candidates, context, now),
        };

        let set = Arc::new(set);
        self.cache.insert(key, user_id, Arc::clone(&set), now);
        set
    }

    fn rank(
        &self,
        user_id: Uuid,
        candidates: &[&GameRecord],
        context: &SuggestionContext,
        pattern: &BehaviorPattern,
        now: DateTime<Utc>,
    ) -> SuggestionSet {
        let mut scored: Vec<(PredictiveSuggestion, Vec<String>)> = candidates
            .iter()
            .map(|game| {
                let genres = game.normalized_genres();
                let fit_scores = self.scorer.score(game, context, pattern);
                let confidence = self.config.weights.combine(&fit_scores);
                let familiarity = pattern.session_lengths.genre_familiarity(&genres);

                let suggestion = PredictiveSuggestion {
                    game_id: game.id.clone(),
                    title: game.title.clone(),
                    confidence,
                    reasoning: self.reasoning(game, &fit_scores, context, pattern),
                    predicted_satisfaction: clamp_unit(0.6 * confidence + 0.4 * familiarity),
                    estimated_playtime_minutes: self.scorer.estimated_playtime(game, context, Some(pattern)),
                    fit_scores,
                    alternatives: Vec::new(),
                };
                (suggestion, genres)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.confidence
                .total_cmp(&a.0.confidence)
                .then_with(|| a.0.game_id.cmp(&b.0.game_id))
        });

        SuggestionSet {
            user_id,
            suggestions: self.with_alternatives(scored),
            fallback: false,
            generated_at: now,
        }
    }

    /// Popular catalog games at flat confidence, for users without history
    fn fallback_set(
        &self,
        user_id: Uuid,
        candidates: &[&GameRecord],
        context: &SuggestionContext,
        now: DateTime<Utc>,
    ) -> SuggestionSet {
        info!(user_id = %user_id, "No behavior history, using popularity fallback");

        let mut ranked: Vec<&GameRecord> = candidates.to_vec();
        ranked.sort_by(|a, b| {
            let pa = a.popularity.unwrap_or(0.0);
            let pb = b.popularity.unwrap_or(0.0);
            pb.total_cmp(&pa).then_with(|| a.id.cmp(&b.id))
        });

        let confidence = clamp_unit(self.config.fallback_confidence);
        let scored = ranked
            .into_iter()
            .map(|game| {
                let suggestion = PredictiveSuggestion {
                    game_id: game.id.clone(),
                    title: game.title.clone(),
                    confidence,
                    reasoning: vec!["No play history yet, ranked by catalog popularity".to_string()],
                    predicted_satisfaction: clamp_unit(game.popularity.unwrap_or(0.5)),
                    estimated_playtime_minutes: self.scorer.estimated_playtime(game, context, None),
                    fit_scores: FitScores::neutral(),
                    alternatives: Vec::new(),
                };
                (suggestion, game.normalized_genres())
            })
            .collect();

        SuggestionSet {
            user_id,
            suggestions: self.with_alternatives(scored),
            fallback: true,
            generated_at: now,
        }
    }

    /// Keep the top `max_suggestions`, each with alternatives drawn from the
    /// whole ranked list: same-genre games first, then the next best
    fn with_alternatives(&self, ranked: Vec<(PredictiveSuggestion, Vec<String>)>) -> Vec<PredictiveSuggestion> {
        let per_suggestion = self.config.alternatives_per_suggestion;
        let top = ranked.len().min(self.config.max_suggestions);

        (0..top)
            .map(|i| {
                let (suggestion, genres) = &ranked[i];
                let others = || ranked.iter().enumerate().filter(move |(j, _)| *j != i);

                let mut alternatives: Vec<String> = others()
                    .filter(|(_, (_, g))| g.iter().any(|genre| genres.contains(genre)))
                    .map(|(_, (s, _))| s.game_id.clone())
                    .take(per_suggestion)
                    .collect();
                for (_, (s, _)) in others() {
                    if alternatives.len() >= per_suggestion {
                        break;
                    }
                    if !alternatives.contains(&s.game_id) {
                        alternatives.push(s.game_id.clone());
                    }
                }

                PredictiveSuggestion {
                    alternatives,
                    ..suggestion.clone()
                }
            })
            .collect()
    }

    fn reasoning(
        &self,
        game: &GameRecord,
        fit: &FitScores,
        context: &SuggestionContext,
        pattern: &BehaviorPattern,
    ) -> Vec<String> {
        let mut contributions = self.config.weights.contributions(fit);
        contributions.sort_by(|a, b| b.1.total_cmp(&a.1));

        let raw = |dimension: &str| match dimension {
            "time" => fit.time,
            "mood" => fit.mood,
            "energy" => fit.energy,
            "social" => fit.social,
            _ => fit.sequence,
        };

        let reasons: Vec<String> = contributions
            .iter()
            .filter(|(dimension, _)| raw(*dimension) >= REASON_THRESHOLD)
            .take(MAX_REASONS)
            .map(|(dimension, _)| match *dimension {
                "time" => match (context.available_minutes, self.scorer.expected_minutes(game, pattern)) {
                    (Some(available), Some(expected)) => format!(
                        "Fits your {:.0} free minutes (you usually play these for ~{:.0} min)",
                        available, expected
                    ),
                    _ => "Matches your usual session length".to_string(),
                },
                "mood" => format!("Suits a {} mood", context.mood().unwrap_or("neutral")),
                "energy" => match context.effective_energy() {
                    Some(EnergyLevel::Low) => "Easy-going pace for low energy".to_string(),
                    Some(EnergyLevel::High) => "High-intensity play for high energy".to_string(),
                    _ => "Moderate intensity for your energy level".to_string(),
                },
                "social" => match context.effective_social() {
                    Some(SocialContext::Solo) => "Works well solo".to_string(),
                    Some(SocialContext::Coop) => "Good for playing with friends".to_string(),
                    _ => "Scratches the competitive itch".to_string(),
                },
                _ => "Follows your recent genre pattern".to_string(),
            })
            .collect();

        if reasons.is_empty() {
            vec!["Balanced fit with no standout factor".to_string()]
        } else {
            reasons
        }
    }

    /// Most likely next game given the recent genre sequence
    pub fn predict_next_game(
        &self,
        user_id: Uuid,
        recent_sessions: &[Session],
        available_games: &[GameRecord],
    ) -> NextGamePrediction {
        let Some(pattern) = self.behavior_pattern(user_id) else {
            return no_match("No genre pattern found: no behavior history for this user");
        };
        let max_length = self.builder.config().max_sequence_length;

        let mut recent: Vec<&Session> = recent_sessions.iter().filter(|s| s.is_valid()).collect();
        recent.sort_by_key(|s| s.timestamp());
        let last_game = recent.last().and_then(|s| s.game()).map(str::to_string);

        let mut genres: Vec<String> = recent.iter().filter_map(|s| s.primary_genre()).collect();
        if genres.is_empty() {
            genres = pattern.genre_sequences.recent_genres.clone();
        }
        if genres.len() > max_length {
            let excess = genres.len() - max_length;
            genres.drain(..excess);
        }

        for length in (1..=genres.len()).rev() {
            let suffix = &genres[genres.len() - length..];
            let Some(stats) = pattern.genre_sequences.get(suffix) else {
                continue;
            };

            for (genre, count) in stats.ranked_next() {
                let Some(game) = pick_game(genre, available_games, last_game.as_deref()) else {
                    continue;
                };
                let confidence = clamp_unit(count as f32 / stats.frequency.max(1) as f32);
                debug!(user_id = %user_id, game = %game.id, confidence = confidence, "Next game predicted");

                return NextGamePrediction {
                    game_id: Some(game.id.clone()),
                    genre: Some(genre.to_string()),
                    confidence,
                    matched_sequence: suffix.to_vec(),
                    reasoning: vec![
                        format!(
                            "After {} you played {} next in {} of {} cases",
                            suffix.join(" → "),
                            genre,
                            count,
                            stats.frequency
                        ),
                        format!("{} is the best available {} game", game.title, genre),
                    ],
                };
            }
        }

        no_match("No genre pattern matched the recent sessions")
    }

    pub fn get_predictive_insights(&self, user_id: Uuid) -> Vec<PredictiveInsight> {
        let Some(pattern) = self.behavior_pattern(user_id) else {
            return Vec::new();
        };
        let mut insights = Vec::new();

        let time = &pattern.time_patterns;
        if !time.peak_hours.is_empty() {
            let hours: Vec<String> = time.peak_hours.iter().map(|h| format!("{:02}:00", h)).collect();
            insights.push(PredictiveInsight {
                kind: InsightKind::PeakHours,
                description: format!("Most active around {}", hours.join(", ")),
                confidence: clamp_unit(time.peak_share()),
            });
        }

        let lengths = &pattern.session_lengths;
        let sigma = lengths.std_dev_minutes();
        if lengths.count >= MIN_SESSIONS_FOR_ANOMALIES && sigma > 0.0 {
            for minutes in &lengths.recent_minutes {
                let z = (minutes - lengths.mean_minutes) / sigma;
                if z.abs() > ANOMALY_SIGMA {
                    insights.push(PredictiveInsight {
                        kind: InsightKind::SessionLengthAnomaly,
                        description: format!(
                            "A recent {:.0} min session was much {} than your usual {:.0} min",
                            minutes,
                            if z > 0.0 { "longer" } else { "shorter" },
                            lengths.mean_minutes
                        ),
                        confidence: clamp_unit((z.abs() / 3.0) as f32),
                    });
                }
            }
        }

        let recent = &pattern.genre_sequences.recent_genres;
        if recent.len() >= 2 {
            let previous = &recent[recent.len() - 2..recent.len() - 1];
            let current = &recent[recent.len() - 1];
            if let Some(stats) = pattern.genre_sequences.get(previous) {
                // the latest switch is already counted; judge it against earlier history
                let earlier_total = stats.frequency.saturating_sub(1);
                let earlier_seen = stats
                    .next_genres
                    .get(current)
                    .copied()
                    .unwrap_or(0)
                    .saturating_sub(1);
                let probability = if earlier_total == 0 {
                    0.0
                } else {
                    earlier_seen as f32 / earlier_total as f32
                };
                if earlier_total >= MIN_SWITCH_EVIDENCE && probability <= RARE_SWITCH_PROBABILITY {
                    insights.push(PredictiveInsight {
                        kind: InsightKind::GenreSwitchAnomaly,
                        description: if earlier_seen == 0 {
                            format!("Switched from {} to {} for the first time", previous[0], current)
                        } else {
                            format!("Switching from {} to {} is unusual for you", previous[0], current)
                        },
                        confidence: clamp_unit(1.0 - probability),
                    });
                }
            }
        }

        if let Some(peak) = time.peak_hours.first() {
            if lengths.count > 0 {
                insights.push(PredictiveInsight {
                    kind: InsightKind::Recommendation,
                    description: format!(
                        "Plan longer games around {:02}:00; your sessions average {:.0} minutes",
                        peak, lengths.mean_minutes
                    ),
                    confidence: clamp_unit(lengths.count as f32 / (lengths.count as f32 + 5.0)),
                });
            }
        }

        if let Some((from, to, _, share)) = pattern.mood_transitions.strongest_transition() {
            let genre = pattern
                .mood_transitions
                .transitions
                .get(from)
                .and_then(|t| t.get(to))
                .and_then(|stats| stats.trigger_genres.iter().max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0))))
                .map(|(g, _)| g.clone());
            insights.push(PredictiveInsight {
                kind: InsightKind::Recommendation,
                description: match genre {
                    Some(genre) => format!(
                        "After feeling {} you usually move to {}; keep a {} game ready",
                        from, to, genre
                    ),
                    None => format!("After feeling {} you usually move to {}", from, to),
                },
                confidence: clamp_unit(share),
            });
        }

        let devices = &pattern.device_patterns;
        if let Some(device) = &devices.primary_device {
            let share = devices.share(device);
            if share >= PRIMARY_DEVICE_SHARE {
                insights.push(PredictiveInsight {
                    kind: InsightKind::Recommendation,
                    description: format!("Most of your play happens on {}; favour games that suit it", device),
                    confidence: clamp_unit(share),
                });
            }
        }

        insights.sort_by(|a, b| kind_rank(a.kind).cmp(&kind_rank(b.kind)).then_with(|| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal)
        }));
        insights
    }

    /// Fold one new session into the user's pattern and drop their cached sets
    pub fn update_behavior_patterns(&self, user_id: Uuid, new_session: &Session) -> bool {
        if !new_session.is_valid() {
            debug!(user_id = %user_id, "Skipped behavior update for session without game id");
            return false;
        }

        // Load errors drop the update; saving would overwrite the stored history
        let mut pattern = match self.store.load(user_id) {
            Ok(Some(pattern)) => pattern,
            Ok(None) => BehaviorPattern::new(user_id),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load behavior pattern, update dropped");
                self.cache.invalidate_user(user_id);
                return false;
            }
        };
        self.builder.apply_session(&mut pattern, new_session);

        let saved = match self.store.save(pattern) {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to save behavior pattern");
                false
            }
        };
        self.cache.invalidate_user(user_id);
        saved
    }
}

fn kind_rank(kind: InsightKind) -> u8 {
    match kind {
        InsightKind::PeakHours => 0,
        InsightKind::SessionLengthAnomaly => 1,
        InsightKind::GenreSwitchAnomaly => 2,
        InsightKind::Recommendation => 3,
    }
}

fn no_match(reason: &str) -> NextGamePrediction {
    NextGamePrediction {
        game_id: None,
        genre: None,
        confidence: 0.0,
        matched_sequence: Vec::new(),
        reasoning: vec![reason.to_string()],
    }
}

/// Most popular available game of `genre`, avoiding the one just played
fn pick_game<'a>(genre: &str, games: &'a [GameRecord], last_game: Option<&str>) -> Option<&'a GameRecord> {
    let mut matching: Vec<&GameRecord> = games
        .iter()
        .filter(|g| !g.id.trim().is_empty() && g.has_genre(genre))
        .collect();
    matching.sort_by(|a, b| {
        let replay_a = Some(a.id.as_str()) == last_game;
        let replay_b = Some(b.id.as_str()) == last_game;
        replay_a
            .cmp(&replay_b)
            .then_with(|| b.popularity.unwrap_or(0.0).total_cmp(&a.popularity.unwrap_or(0.0)))
            .then_with(|| a.id.cmp(&b.id))
    });
    matching.into_iter().next()
}
