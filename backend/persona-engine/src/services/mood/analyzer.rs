use super::network::{FeedForwardNetwork, TrainingExample};
use super::vocabulary::{activities_for, daypart};
use super::{MoodError, NeuralMoodConfig, Result};
use crate::models::{Session, NEUTRAL_MOOD};
use crate::utils::{argmax, hash_to_unit, mean, to_distribution, variance};
use chrono::{DateTime, Datelike, Timelike, Utc};
use parking_lot::RwLock;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Context features ahead of the previous-mood one-hot block
const CONTEXT_FEATURES: usize = 4;
const MAX_SESSION_MINUTES: f64 = 240.0;
const MAX_ASSOCIATED_GAMES: usize = 5;
const MAX_TRIGGERS: usize = 3;
/// Pseudo-count that keeps confidence low for sparsely observed moods
const PATTERN_EVIDENCE_PRIOR: f32 = 5.0;
const FALLBACK_CONFIDENCE_CEILING: f32 = 0.3;
const NEUTRAL_FALLBACK_CONFIDENCE: f32 = 0.1;
/// Anything learned from history reports at least this, so it always ranks
/// above the empty-history neutral default
const LEARNED_CONFIDENCE_FLOOR: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyzerState {
    Untrained,
    Training,
    Trained,
}

/// Hour-of-day and day-of-week buckets for one mood
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodTimePatterns {
    pub hour_counts: [u32; 24],
    pub day_counts: [u32; 7],
    pub hourly_likelihood: [f32; 24],
    pub daily_likelihood: [f32; 7],
}

impl MoodTimePatterns {
    pub fn record(&mut self, hour: u8, weekday: u8) {
        if let Some(slot) = self.hour_counts.get_mut(hour as usize) {
            *slot += 1;
        }
        if let Some(slot) = self.day_counts.get_mut(weekday as usize) {
            *slot += 1;
        }
        self.hourly_likelihood = to_distribution(&self.hour_counts);
        self.daily_likelihood = to_distribution(&self.day_counts);
    }

    pub fn peak_hour(&self) -> Option<u8> {
        if self.hour_counts.iter().all(|c| *c == 0) {
            return None;
        }
        argmax(&self.hourly_likelihood).map(|h| h as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodPattern {
    pub mood_id: String,
    pub confidence: f32,
    pub triggers: Vec<String>,
    pub time_patterns: MoodTimePatterns,
    /// Most played games in this mood, most frequent first
    pub associated_games: Vec<String>,
    pub intensity: f32,
    pub session_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodTransition {
    pub from_mood: String,
    pub to_mood: String,
    /// Share of `from_mood`'s outgoing transitions
    pub probability: f32,
    pub common_triggers: Vec<String>,
    pub average_transition_minutes: f64,
    pub count: u32,
}

/// Relative contribution of each context factor, sums to 1 for neural predictions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodFactors {
    pub time_of_day: f32,
    pub recent_games: f32,
    pub session_length: f32,
    pub day_of_week: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionSource {
    Neural,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodPrediction {
    pub predicted_mood: String,
    pub confidence: f32,
    pub factors: MoodFactors,
    pub reasoning: Vec<String>,
    pub source: PredictionSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodRecommendation {
    pub current_mood: String,
    pub target_mood: Option<String>,
    /// Moods to pass through, starting with `current_mood`
    pub path: Vec<String>,
    pub path_probability: f32,
    pub games: Vec<String>,
    pub activities: Vec<String>,
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodInsights {
    pub state: AnalyzerState,
    pub pattern_count: usize,
    /// Mood with the highest confidence × intensity
    pub dominant_mood: Option<String>,
    pub stability_score: f32,
    pub peak_hours: BTreeMap<String, u8>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub total_sessions: usize,
    pub skipped_malformed: usize,
    /// Valid sessions without a mood tag or timestamp
    pub unlabeled: usize,
    pub training_examples: usize,
    pub moods: Vec<String>,
    pub final_loss: Option<f32>,
    pub state: AnalyzerState,
}

/// Trained network plus the label order it was trained with
#[derive(Debug)]
struct MoodModel {
    network: FeedForwardNetwork,
    moods: Vec<String>,
    training_examples: usize,
}

#[derive(Debug, Default)]
struct MoodKnowledge {
    patterns: HashMap<String, MoodPattern>,
    transitions: Vec<MoodTransition>,
    model: Option<Arc<MoodModel>>,
}

/// Frontier entry for the best-first path search
struct PathCandidate {
    probability: f32,
    path: Vec<String>,
}

impl PartialEq for PathCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.probability.total_cmp(&other.probability) == Ordering::Equal
    }
}

impl Eq for PathCandidate {}

impl PartialOrd for PathCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.probability
            .total_cmp(&other.probability)
            // prefer shorter paths on ties
            .then_with(|| other.path.len().cmp(&self.path.len()))
    }
}

/// Per-user mood predictor
pub struct NeuralMoodAnalyzer {
    config: NeuralMoodConfig,
    state: RwLock<AnalyzerState>,
    knowledge: RwLock<MoodKnowledge>,
}

impl NeuralMoodAnalyzer {
    pub fn new(config: NeuralMoodConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Skip validation for configs the caller already checked
    pub(crate) fn from_validated(config: NeuralMoodConfig) -> Self {
        Self {
            config,
            state: RwLock::new(AnalyzerState::Untrained),
            knowledge: RwLock::new(MoodKnowledge::default()),
        }
    }

    pub fn config(&self) -> &NeuralMoodConfig {
        &self.config
    }

    pub fn state(&self) -> AnalyzerState {
        *self.state.read()
    }

    pub fn patterns(&self) -> Vec<MoodPattern> {
        let mut patterns: Vec<MoodPattern> = self.knowledge.read().patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.mood_id.cmp(&b.mood_id));
        patterns
    }

    pub fn transitions(&self) -> Vec<MoodTransition> {
        self.knowledge.read().transitions.clone()
    }

    /// Rebuild patterns and transitions and retrain the network from scratch
    pub fn analyze_sessions(&self, sessions: &[Session]) -> AnalysisReport {
        *self.state.write() = AnalyzerState::Training;

        let valid: Vec<&Session> = sessions.iter().filter(|s| s.is_valid()).collect();
        let skipped_malformed = sessions.len() - valid.len();
        if skipped_malformed > 0 {
            warn!(skipped = skipped_malformed, "Skipped sessions without a game id");
        }

        let mut labeled: Vec<&Session> = valid
            .iter()
            .copied()
            .filter(|s| s.mood_id().is_some() && s.timestamp().is_some())
            .collect();
        labeled.sort_by_key(|s| s.timestamp());
        let unlabeled = valid.len() - labeled.len();

        if labeled.is_empty() {
            *self.knowledge.write() = MoodKnowledge::default();
            *self.state.write() = AnalyzerState::Untrained;
            debug!(total = sessions.len(), "No mood-tagged sessions, analyzer left untrained");
            return AnalysisReport {
                total_sessions: sessions.len(),
                skipped_malformed,
                unlabeled,
                training_examples: 0,
                moods: Vec::new(),
                final_loss: None,
                state: AnalyzerState::Untrained,
            };
        }

        let patterns = build_patterns(&labeled);
        let transitions = build_transitions(&labeled);
        let mut moods: Vec<String> = patterns.keys().cloned().collect();
        moods.sort();

        let examples = build_examples(&labeled, &moods);

        match self.train_network(&examples, moods.len()) {
            Ok((network, final_loss)) => {
                let model = MoodModel {
                    network,
                    moods: moods.clone(),
                    training_examples: examples.len(),
                };
                {
                    let mut knowledge = self.knowledge.write();
                    knowledge.patterns = patterns;
                    knowledge.transitions = transitions;
                    knowledge.model = Some(Arc::new(model));
                }
                *self.state.write() = AnalyzerState::Trained;

                info!(
                    sessions = labeled.len(),
                    moods = moods.len(),
                    final_loss = final_loss,
                    "Mood network trained"
                );

                AnalysisReport {
                    total_sessions: sessions.len(),
                    skipped_malformed,
                    unlabeled,
                    training_examples: examples.len(),
                    moods,
                    final_loss: Some(final_loss),
                    state: AnalyzerState::Trained,
                }
            }
            Err(e) => {
                // Keep the previous snapshot; only the statistics are refreshed
                warn!(error = %e, "Mood network training failed, keeping previous model");
                let state = {
                    let mut knowledge = self.knowledge.write();
                    knowledge.patterns = patterns;
                    knowledge.transitions = transitions;
                    if knowledge.model.is_some() {
                        AnalyzerState::Trained
                    } else {
                        AnalyzerState::Untrained
                    }
                };
                *self.state.write() = state;

                AnalysisReport {
                    total_sessions: sessions.len(),
                    skipped_malformed,
                    unlabeled,
                    training_examples: examples.len(),
                    moods,
                    final_loss: None,
                    state,
                }
            }
        }
    }

    /// Run `analyze_sessions` on the blocking pool
    pub fn spawn_training(self: &Arc<Self>, sessions: Vec<Session>) -> tokio::task::JoinHandle<AnalysisReport> {
        let analyzer = Arc::clone(self);
        tokio::task::spawn_blocking(move || analyzer.analyze_sessions(&sessions))
    }

    fn train_network(&self, examples: &[TrainingExample], mood_count: usize) -> Result<(FeedForwardNetwork, f32)> {
        let mut network = FeedForwardNetwork::new(
            CONTEXT_FEATURES + mood_count,
            &self.config.hidden_layers,
            mood_count,
            self.config.activation_function,
            self.config.seed,
        );

        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(1));
        let mut order: Vec<usize> = (0..examples.len()).collect();
        let mut epoch_loss = 0.0;

        for _ in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut batches = 0usize;

            for chunk in order.chunks(self.config.batch_size) {
                let batch: Vec<&TrainingExample> = chunk.iter().map(|&i| &examples[i]).collect();
                loss_sum += network.train_batch(&batch, self.config.learning_rate, self.config.momentum);
                batches += 1;
            }

            epoch_loss = if batches > 0 { loss_sum / batches as f32 } else { 0.0 };
            if !epoch_loss.is_finite() {
                return Err(MoodError::TrainingFailed(format!(
                    "loss diverged to {}",
                    epoch_loss
                )));
            }
        }

        Ok((network, epoch_loss))
    }

    /// Predict the current mood from the most recent sessions
    pub fn predict_current_mood(&self, recent_sessions: &[Session], current_time: DateTime<Utc>) -> MoodPrediction {
        let (model, fallback) = {
            let knowledge = self.knowledge.read();
            (knowledge.model.clone(), heuristic_prediction(&knowledge.patterns))
        };

        let mut recent: Vec<&Session> = recent_sessions.iter().filter(|s| s.is_valid()).collect();
        recent.sort_by_key(|s| s.timestamp());

        let (Some(model), Some(latest)) = (model, recent.last().copied()) else {
            debug!(recent = recent.len(), "Using heuristic mood prediction");
            return fallback;
        };

        let average_minutes = mean(&recent.iter().map(|s| s.duration_minutes).collect::<Vec<_>>());
        let previous = latest
            .mood_id()
            .and_then(|m| model.moods.iter().position(|known| known == m));
        let features = feature_vector(
            current_time.hour() as u8,
            current_time.weekday().num_days_from_monday() as u8,
            latest.game().unwrap_or_default(),
            average_minutes,
            previous,
            model.moods.len(),
        );

        let probs = match model.network.predict(&features) {
            Ok(probs) => probs,
            Err(e) => {
                warn!(error = %e, "Mood network inference failed, using heuristic");
                return fallback;
            }
        };

        let Some(best) = argmax(&probs) else {
            return fallback;
        };
        let predicted_mood = model.moods[best].clone();
        let confidence = probs[best].clamp(LEARNED_CONFIDENCE_FLOOR, 1.0);
        let factors = factor_breakdown(&model.network.input_importance());

        let mut reasoning = vec![format!(
            "Mood network trained on {} sessions across {} moods favours '{}' ({:.0}%)",
            model.training_examples,
            model.moods.len(),
            predicted_mood,
            confidence * 100.0
        )];
        let (factor_name, factor_share) = strongest_factor(&factors);
        reasoning.push(format!(
            "{} carries the most weight ({:.0}% of the signal)",
            factor_name,
            factor_share * 100.0
        ));
        if let Some(game) = latest.game() {
            reasoning.push(format!("Most recent game: {}", game));
        }
        let runner_up = probs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != best)
            .max_by(|a, b| a.1.total_cmp(b.1));
        if let Some((i, p)) = runner_up {
            reasoning.push(format!("Runner-up: '{}' ({:.0}%)", model.moods[i], p * 100.0));
        }

        MoodPrediction {
            predicted_mood,
            confidence,
            factors,
            reasoning,
            source: PredictionSource::Neural,
        }
    }

    /// Suggest how to get from `current_mood` to `target_mood`, or where the
    /// current mood usually goes next when no target is given
    pub fn get_mood_recommendations(&self, current_mood: &str, target_mood: Option<&str>) -> MoodRecommendation {
        let knowledge = self.knowledge.read();
        let games_for = |mood: &str| {
            knowledge
                .patterns
                .get(mood)
                .map(|p| p.associated_games.clone())
                .unwrap_or_default()
        };

        match target_mood {
            Some(target) => {
                let (path, path_probability, mut reasoning) = if target == current_mood {
                    (vec![current_mood.to_string()], 1.0, vec![format!("Already in '{}'", target)])
                } else {
                    match best_path(&knowledge.transitions, current_mood, target) {
                        Some((path, probability)) => {
                            let text = format!(
                                "Most likely route {} ({:.0}% combined probability)",
                                path.join(" → "),
                                probability * 100.0
                            );
                            (path, probability, vec![text])
                        }
                        None => (
                            vec![current_mood.to_string(), target.to_string()],
                            0.0,
                            vec![format!(
                                "No recorded transition path from '{}' to '{}'",
                                current_mood, target
                            )],
                        ),
                    }
                };

                let games = games_for(target);
                if games.is_empty() {
                    reasoning.push(format!("No games associated with '{}' yet", target));
                }

                MoodRecommendation {
                    current_mood: current_mood.to_string(),
                    target_mood: Some(target.to_string()),
                    path,
                    path_probability,
                    games,
                    activities: activities_for(target),
                    reasoning,
                }
            }
            None => {
                let next = knowledge
                    .transitions
                    .iter()
                    .filter(|t| t.from_mood == current_mood && t.to_mood != current_mood)
                    .max_by(|a, b| a.probability.total_cmp(&b.probability));

                match next {
                    Some(t) => MoodRecommendation {
                        current_mood: current_mood.to_string(),
                        target_mood: Some(t.to_mood.clone()),
                        path: vec![current_mood.to_string(), t.to_mood.clone()],
                        path_probability: t.probability,
                        games: games_for(&t.to_mood),
                        activities: activities_for(&t.to_mood),
                        reasoning: vec![format!(
                            "'{}' usually leads to '{}' ({:.0}%, ~{:.0} min later)",
                            current_mood,
                            t.to_mood,
                            t.probability * 100.0,
                            t.average_transition_minutes
                        )],
                    },
                    None => MoodRecommendation {
                        current_mood: current_mood.to_string(),
                        target_mood: None,
                        path: vec![current_mood.to_string()],
                        path_probability: 0.0,
                        games: games_for(current_mood),
                        activities: activities_for(current_mood),
                        reasoning: vec![format!("No transitions recorded from '{}'", current_mood)],
                    },
                }
            }
        }
    }

    /// Fold one new session into its mood's time buckets, game list and
    /// confidence.
    ///
    /// Does not retrain the network or rebuild transitions. Returns false
    /// when the session was skipped.
    pub fn update_patterns(&self, new_session: &Session) -> bool {
        let (Some(game), Some(mood)) = (new_session.game(), new_session.mood_id()) else {
            debug!("Skipped pattern update for session without game id or mood");
            return false;
        };

        let mut knowledge = self.knowledge.write();
        let pattern = knowledge
            .patterns
            .entry(mood.to_string())
            .or_insert_with(|| MoodPattern {
                mood_id: mood.to_string(),
                confidence: 0.0,
                triggers: Vec::new(),
                time_patterns: MoodTimePatterns::default(),
                associated_games: Vec::new(),
                intensity: session_intensity(new_session),
                session_count: 0,
            });

        if let (Some(hour), Some(weekday)) = (new_session.hour(), new_session.weekday()) {
            pattern.time_patterns.record(hour, weekday);
        }
        pattern.associated_games.retain(|g| g != game);
        pattern.associated_games.insert(0, game.to_string());
        pattern.associated_games.truncate(MAX_ASSOCIATED_GAMES);
        pattern.session_count += 1;
        pattern.confidence = evidence_confidence(pattern.session_count);

        true
    }

    pub fn get_mood_insights(&self) -> MoodInsights {
        let knowledge = self.knowledge.read();
        let patterns = &knowledge.patterns;

        let dominant_mood = patterns
            .values()
            .max_by(|a, b| {
                (a.confidence * a.intensity)
                    .total_cmp(&(b.confidence * b.intensity))
                    .then_with(|| b.mood_id.cmp(&a.mood_id))
            })
            .map(|p| p.mood_id.clone());

        let probabilities: Vec<f64> = knowledge.transitions.iter().map(|t| t.probability as f64).collect();
        let stability_score = if probabilities.is_empty() {
            0.0
        } else {
            (1.0 / (1.0 + variance(&probabilities))) as f32
        };

        let peak_hours: BTreeMap<String, u8> = patterns
            .values()
            .filter_map(|p| p.time_patterns.peak_hour().map(|h| (p.mood_id.clone(), h)))
            .collect();

        let mut recommendations = Vec::new();
        if patterns.is_empty() {
            recommendations.push("Tag a few more sessions with a mood to unlock insights".to_string());
        }
        if let Some(mood) = &dominant_mood {
            let games = &patterns[mood].associated_games;
            if games.is_empty() {
                recommendations.push(format!("'{}' is your strongest mood pattern", mood));
            } else {
                recommendations.push(format!(
                    "'{}' is your strongest mood pattern; {} fit it best",
                    mood,
                    games.iter().take(2).cloned().collect::<Vec<_>>().join(" and ")
                ));
            }
        }
        if let Some(t) = knowledge
            .transitions
            .iter()
            .filter(|t| t.from_mood != t.to_mood)
            .max_by(|a, b| (a.count, a.probability).partial_cmp(&(b.count, b.probability)).unwrap_or(Ordering::Equal))
        {
            recommendations.push(format!(
                "You often move from '{}' to '{}' ({:.0}% of the time)",
                t.from_mood,
                t.to_mood,
                t.probability * 100.0
            ));
        }
        for (mood, hour) in &peak_hours {
            if daypart(*hour) == "late night" {
                recommendations.push(format!(
                    "'{}' peaks around {:02}:00; calmer games may suit late sessions",
                    mood, hour
                ));
            }
        }
        if !knowledge.transitions.is_empty() && stability_score < 0.97 {
            recommendations.push("Your mood shifts are varied; mixing genres may suit you".to_string());
        }

        MoodInsights {
            state: *self.state.read(),
            pattern_count: patterns.len(),
            dominant_mood,
            stability_score,
            peak_hours,
            recommendations,
        }
    }
}

fn evidence_confidence(sessions: usize) -> f32 {
    sessions as f32 / (sessions as f32 + PATTERN_EVIDENCE_PRIOR)
}

fn session_intensity(session: &Session) -> f32 {
    let length = (session.duration_minutes.max(0.0) / 180.0).min(1.0) as f32;
    let social = if session.is_multiplayer == Some(true) { 1.0 } else { 0.0 };
    let achievements = session
        .achievement_count
        .map_or(0.0, |c| (c as f32 / 5.0).min(1.0));
    (0.6 * length + 0.25 * social + 0.15 * achievements).clamp(0.0, 1.0)
}

fn feature_vector(
    hour: u8,
    weekday: u8,
    game_id: &str,
    duration_minutes: f64,
    previous_mood: Option<usize>,
    mood_count: usize,
) -> Vec<f32> {
    let mut features = Vec::with_capacity(CONTEXT_FEATURES + mood_count);
    features.push(hour as f32 / 23.0);
    features.push(weekday as f32 / 6.0);
    features.push(hash_to_unit(game_id));
    features.push((duration_minutes.max(0.0) / MAX_SESSION_MINUTES).min(1.0) as f32);
    features.extend((0..mood_count).map(|i| if Some(i) == previous_mood { 1.0 } else { 0.0 }));
    features
}

fn top_counts(counts: HashMap<String, u32>, limit: usize) -> Vec<String> {
    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(k, _)| k).collect()
}

fn build_patterns(labeled: &[&Session]) -> HashMap<String, MoodPattern> {
    let mut grouped: BTreeMap<&str, Vec<&Session>> = BTreeMap::new();
    for session in labeled {
        if let Some(mood) = session.mood_id() {
            grouped.entry(mood).or_default().push(session);
        }
    }

    grouped
        .into_iter()
        .map(|(mood, sessions)| {
            let mut time_patterns = MoodTimePatterns::default();
            let mut games: HashMap<String, u32> = HashMap::new();
            let mut genres: HashMap<String, u32> = HashMap::new();

            for session in &sessions {
                if let (Some(hour), Some(weekday)) = (session.hour(), session.weekday()) {
                    time_patterns.record(hour, weekday);
                }
                if let Some(game) = session.game() {
                    *games.entry(game.to_string()).or_insert(0) += 1;
                }
                if let Some(genre) = session.primary_genre() {
                    *genres.entry(genre).or_insert(0) += 1;
                }
            }

            let n = sessions.len();
            let intensity = sessions.iter().map(|s| session_intensity(s)).sum::<f32>() / n as f32;
            let average_minutes = sessions.iter().map(|s| s.duration_minutes).sum::<f64>() / n as f64;
            let multiplayer_share =
                sessions.iter().filter(|s| s.is_multiplayer == Some(true)).count() as f32 / n as f32;
            let weekend_share = time_patterns.daily_likelihood[5] + time_patterns.daily_likelihood[6];

            let mut triggers = Vec::new();
            if let Some(hour) = time_patterns.peak_hour() {
                triggers.push(format!("{} sessions", daypart(hour)));
            }
            if weekend_share > 0.5 {
                triggers.push("weekend play".to_string());
            }
            if average_minutes < 45.0 {
                triggers.push("short sessions".to_string());
            } else if average_minutes > 120.0 {
                triggers.push("long sessions".to_string());
            }
            if multiplayer_share > 0.5 {
                triggers.push("multiplayer".to_string());
            }
            triggers.extend(top_counts(genres, 1).into_iter().map(|g| format!("genre:{}", g)));

            let pattern = MoodPattern {
                mood_id: mood.to_string(),
                confidence: evidence_confidence(n),
                triggers,
                time_patterns,
                associated_games: top_counts(games, MAX_ASSOCIATED_GAMES),
                intensity,
                session_count: n,
            };
            (mood.to_string(), pattern)
        })
        .collect()
}

#[derive(Default)]
struct TransitionAccumulator {
    count: u32,
    gap_minutes: Vec<f64>,
    triggers: HashMap<String, u32>,
}

/// Transition statistics over time-ordered labeled sessions
fn build_transitions(labeled: &[&Session]) -> Vec<MoodTransition> {
    let mut pairs: BTreeMap<(String, String), TransitionAccumulator> = BTreeMap::new();
    let mut outgoing: HashMap<String, u32> = HashMap::new();

    for window in labeled.windows(2) {
        let (prev, next) = (window[0], window[1]);
        let (Some(from), Some(to)) = (prev.mood_id(), next.mood_id()) else {
            continue;
        };

        let acc = pairs.entry((from.to_string(), to.to_string())).or_default();
        acc.count += 1;
        if let (Some(ended), Some(started)) = (prev.finished_at(), next.timestamp()) {
            acc.gap_minutes.push(((started - ended).num_seconds() as f64 / 60.0).max(0.0));
        }
        if let Some(hour) = next.hour() {
            *acc.triggers.entry(format!("{} sessions", daypart(hour))).or_insert(0) += 1;
        }
        if let Some(genre) = next.primary_genre() {
            *acc.triggers.entry(format!("genre:{}", genre)).or_insert(0) += 1;
        }
        *outgoing.entry(from.to_string()).or_insert(0) += 1;
    }

    let mut transitions: Vec<MoodTransition> = pairs
        .into_iter()
        .map(|((from, to), acc)| {
            let total = outgoing.get(&from).copied().unwrap_or(acc.count).max(1);
            MoodTransition {
                probability: acc.count as f32 / total as f32,
                common_triggers: top_counts(acc.triggers, MAX_TRIGGERS),
                average_transition_minutes: mean(&acc.gap_minutes),
                count: acc.count,
                from_mood: from,
                to_mood: to,
            }
        })
        .collect();

    transitions.sort_by(|a, b| {
        a.from_mood
            .cmp(&b.from_mood)
            .then_with(|| b.probability.total_cmp(&a.probability))
            .then_with(|| a.to_mood.cmp(&b.to_mood))
    });
    transitions
}

fn build_examples(labeled: &[&Session], moods: &[String]) -> Vec<TrainingExample> {
    let index: HashMap<&str, usize> = moods.iter().enumerate().map(|(i, m)| (m.as_str(), i)).collect();
    let mut previous: Option<usize> = None;
    let mut examples = Vec::with_capacity(labeled.len());

    for session in labeled {
        let (Some(label), Some(hour), Some(weekday)) = (
            session.mood_id().and_then(|m| index.get(m).copied()),
            session.hour(),
            session.weekday(),
        ) else {
            continue;
        };

        let features = feature_vector(
            hour,
            weekday,
            session.game().unwrap_or_default(),
            session.duration_minutes,
            previous,
            moods.len(),
        );
        let mut target = vec![0.0; moods.len()];
        target[label] = 1.0;

        examples.push(TrainingExample { features, target });
        previous = Some(label);
    }

    examples
}

fn heuristic_prediction(patterns: &HashMap<String, MoodPattern>) -> MoodPrediction {
    let total: usize = patterns.values().map(|p| p.session_count).sum();
    let most_frequent = patterns
        .values()
        .filter(|p| p.session_count > 0)
        .max_by(|a, b| a.session_count.cmp(&b.session_count).then_with(|| b.mood_id.cmp(&a.mood_id)));

    match most_frequent {
        Some(pattern) if total > 0 => {
            let share = pattern.session_count as f32 / total as f32;
            MoodPrediction {
                predicted_mood: pattern.mood_id.clone(),
                confidence: (share * 0.5).clamp(LEARNED_CONFIDENCE_FLOOR, FALLBACK_CONFIDENCE_CEILING),
                factors: MoodFactors::default(),
                reasoning: vec![
                    "Insufficient training data for the mood network".to_string(),
                    format!(
                        "Using most frequent historical mood '{}' ({} of {} sessions)",
                        pattern.mood_id, pattern.session_count, total
                    ),
                ],
                source: PredictionSource::Heuristic,
            }
        }
        _ => MoodPrediction {
            predicted_mood: NEUTRAL_MOOD.to_string(),
            confidence: NEUTRAL_FALLBACK_CONFIDENCE,
            factors: MoodFactors::default(),
            reasoning: vec![
                "Insufficient training data for the mood network".to_string(),
                "No mood history yet, defaulting to neutral".to_string(),
            ],
            source: PredictionSource::Heuristic,
        },
    }
}

fn factor_breakdown(importance: &[f32]) -> MoodFactors {
    let context: Vec<f32> = importance.iter().take(CONTEXT_FEATURES).copied().collect();
    let total: f32 = context.iter().sum();
    if context.len() < CONTEXT_FEATURES || total <= 0.0 || !total.is_finite() {
        return MoodFactors::default();
    }
    MoodFactors {
        time_of_day: context[0] / total,
        day_of_week: context[1] / total,
        recent_games: context[2] / total,
        session_length: context[3] / total,
    }
}

fn strongest_factor(factors: &MoodFactors) -> (&'static str, f32) {
    [
        ("Time of day", factors.time_of_day),
        ("Recent games", factors.recent_games),
        ("Session length", factors.session_length),
        ("Day of week", factors.day_of_week),
    ]
    .into_iter()
    .fold(("Time of day", f32::MIN), |best, candidate| {
        if candidate.1 > best.1 {
            candidate
        } else {
            best
        }
    })
}

/// Highest-probability path between two moods.
///
/// Best-first search ordered by cumulative probability; since every step
/// multiplies by p <= 1, the first time the target is popped its path is optimal.
fn best_path(transitions: &[MoodTransition], from: &str, to: &str) -> Option<(Vec<String>, f32)> {
    let mut adjacency: HashMap<&str, Vec<&MoodTransition>> = HashMap::new();
    for t in transitions {
        adjacency.entry(t.from_mood.as_str()).or_default().push(t);
    }

    let mut frontier = BinaryHeap::new();
    let mut settled: HashSet<String> = HashSet::new();
    frontier.push(PathCandidate {
        probability: 1.0,
        path: vec![from.to_string()],
    });

    while let Some(candidate) = frontier.pop() {
        let Some(current) = candidate.path.last().cloned() else {
            continue;
        };
        if current == to {
            return Some((candidate.path, candidate.probability));
        }
        if !settled.insert(current.clone()) {
            continue;
        }

        for t in adjacency.get(current.as_str()).into_iter().flatten() {
            if settled.contains(&t.to_mood) || t.probability <= 0.0 {
                continue;
            }
            let mut path = candidate.path.clone();
            path.push(t.to_mood.clone());
            frontier.push(PathCandidate {
                probability: candidate.probability * t.probability,
                path,
            });
        }
    }

    None
}
