// ============================================
// Persona Engine (玩家畫像與預測推薦)
// ============================================
//
// Wires the four components behind one per-process handle:
// 1. Trait extraction - aggregate signals → persona traits
// 2. Mood analysis - one analyzer per user, trained from sessions
// 3. Mood forecast - trend summary → ranked forecasts
// 4. Predictive suggestions - behavior patterns → ranked games
//
// ┌──────────────┐   ┌──────────────────┐   ┌────────────────────┐
// │ TraitExtract │   │ NeuralMoodAnalyzer│  │ MoodForecastEngine │
// └──────┬───────┘   └────────┬─────────┘   └────────────────────┘
//        │ persona            │ current mood
//        └──────────┬─────────┘
//                   ↓
//     ┌───────────────────────────────┐
//     │  PredictiveSuggestionEngine   │ ← behavior store + cache
//     └───────────────────────────────┘

pub mod forecast;
pub mod mood;
pub mod suggestions;
pub mod traits;

pub use forecast::{ForecastError, ForecastPeriod, MoodForecastEngine, MoodForecastResult};
pub use mood::{MoodError, NeuralMoodAnalyzer, NeuralMoodConfig};
pub use suggestions::{PredictiveSuggestionEngine, SuggestionConfig, SuggestionContext};
pub use traits::{PersonaTraits, RawPlayerSignals, TraitExtractor};

use crate::models::{GameRecord, Session};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use forecast::{HistoricalMoodPoint, TrendAnalysis};
use mood::{AnalysisReport, MoodInsights, MoodPrediction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use suggestions::{
    BehaviorAnalysis, BehaviorStore, InMemoryBehaviorStore, NextGamePrediction, PredictiveInsight,
    SuggestionSet,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Engine-wide configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaEngineConfig {
    pub mood: NeuralMoodConfig,
    pub suggestions: SuggestionConfig,
}

/// Result of a full retrain for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub user_id: Uuid,
    pub mood: AnalysisReport,
    pub behavior: BehaviorAnalysis,
}

/// Suggestions together with the mood they were ranked for
#[derive(Debug, Clone)]
pub struct Recommendation {
    /// Present when the context carried no mood and one was predicted
    pub predicted_mood: Option<MoodPrediction>,
    pub suggestions: Arc<SuggestionSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInsights {
    pub user_id: Uuid,
    pub mood: MoodInsights,
    pub behavior: Vec<PredictiveInsight>,
}

/// Persona engine - owns one instance of each component
pub struct PersonaEngine<S: BehaviorStore = InMemoryBehaviorStore> {
    mood_config: NeuralMoodConfig,
    traits: TraitExtractor,
    forecaster: MoodForecastEngine,
    suggestions: PredictiveSuggestionEngine<S>,
    analyzers: DashMap<Uuid, Arc<NeuralMoodAnalyzer>>,
}

impl PersonaEngine<InMemoryBehaviorStore> {
    pub fn new(config: PersonaEngineConfig) -> Result<Self, MoodError> {
        Self::with_store(config, Arc::new(InMemoryBehaviorStore::new()))
    }
}

impl<S: BehaviorStore> PersonaEngine<S> {
    /// Build an engine over an external behavior store
    pub fn with_store(config: PersonaEngineConfig, store: Arc<S>) -> Result<Self, MoodError> {
        config.mood.validate()?;

        Ok(Self {
            mood_config: config.mood,
            traits: TraitExtractor::new(),
            forecaster: MoodForecastEngine::new(),
            suggestions: PredictiveSuggestionEngine::new(config.suggestions, store),
            analyzers: DashMap::new(),
        })
    }

    pub fn suggestion_engine(&self) -> &PredictiveSuggestionEngine<S> {
        &self.suggestions
    }

    pub fn persona_traits(&self, signals: &RawPlayerSignals) -> PersonaTraits {
        self.traits.derive_persona_traits(signals)
    }

    pub fn forecast(
        &self,
        trend_analysis: &TrendAnalysis,
        history: &[HistoricalMoodPoint],
        period: ForecastPeriod,
    ) -> Result<MoodForecastResult, ForecastError> {
        self.forecast_at(trend_analysis, history, period, Utc::now())
    }

    /// Validated forecast against an explicit clock (seasonality, `generated_at`)
    pub fn forecast_at(
        &self,
        trend_analysis: &TrendAnalysis,
        history: &[HistoricalMoodPoint],
        period: ForecastPeriod,
        now: DateTime<Utc>,
    ) -> Result<MoodForecastResult, ForecastError> {
        trend_analysis.validate()?;
        Ok(self
            .forecaster
            .calculate_mood_forecast_at(trend_analysis, history, period, now))
    }

    /// The user's analyzer, created untrained on first use
    pub fn mood_analyzer(&self, user_id: Uuid) -> Arc<NeuralMoodAnalyzer> {
        if let Some(existing) = self.analyzers.get(&user_id) {
            return Arc::clone(existing.value());
        }

        let entry = self.analyzers.entry(user_id).or_insert_with(|| {
            debug!(user_id = %user_id, "Creating mood analyzer");
            Arc::new(NeuralMoodAnalyzer::from_validated(self.mood_config.clone()))
        });
        Arc::clone(entry.value())
    }

    pub fn has_analyzer(&self, user_id: Uuid) -> bool {
        self.analyzers.contains_key(&user_id)
    }

    /// Retrain mood model and behavior patterns from a full history
    pub fn train_user(&self, user_id: Uuid, sessions: &[Session]) -> TrainingSummary {
        let mood = self.mood_analyzer(user_id).analyze_sessions(sessions);
        let behavior = self.suggestions.analyze_behavior_patterns(user_id, sessions);

        info!(
            user_id = %user_id,
            sessions = sessions.len(),
            mood_state = ?mood.state,
            behavior_stored = behavior.stored,
            "User retrained"
        );

        TrainingSummary {
            user_id,
            mood,
            behavior,
        }
    }

    /// Fold one finished session into both the mood and behavior models.
    ///
    /// Returns false when the session was rejected as malformed.
    pub fn record_session(&self, user_id: Uuid, session: &Session) -> bool {
        let mood_updated = self.mood_analyzer(user_id).update_patterns(session);
        let behavior_updated = self.suggestions.update_behavior_patterns(user_id, session);
        mood_updated || behavior_updated
    }

    /// Rank candidates for the user, predicting the mood when the context has none
    pub fn recommend(
        &self,
        user_id: Uuid,
        candidates: &[GameRecord],
        context: &SuggestionContext,
        recent_sessions: &[Session],
        now: DateTime<Utc>,
    ) -> Recommendation {
        if context.mood().is_some() {
            return Recommendation {
                predicted_mood: None,
                suggestions: self
                    .suggestions
                    .generate_suggestions_at(user_id, candidates, context, now),
            };
        }

        let prediction = self
            .mood_analyzer(user_id)
            .predict_current_mood(recent_sessions, now);
        debug!(
            user_id = %user_id,
            mood = %prediction.predicted_mood,
            confidence = prediction.confidence,
            "Filled missing mood from prediction"
        );

        let mut context = context.clone();
        context.current_mood = Some(prediction.predicted_mood.clone());

        Recommendation {
            suggestions: self
                .suggestions
                .generate_suggestions_at(user_id, candidates, &context, now),
            predicted_mood: Some(prediction),
        }
    }

    pub fn predict_next_game(
        &self,
        user_id: Uuid,
        recent_sessions: &[Session],
        available_games: &[GameRecord],
    ) -> NextGamePrediction {
        self.suggestions
            .predict_next_game(user_id, recent_sessions, available_games)
    }

    pub fn insights(&self, user_id: Uuid) -> UserInsights {
        UserInsights {
            user_id,
            mood: self.mood_analyzer(user_id).get_mood_insights(),
            behavior: self.suggestions.get_predictive_insights(user_id),
        }
    }

    /// Drop the user's analyzer and cached suggestions
    pub fn evict_user(&self, user_id: Uuid) -> bool {
        let removed = self.analyzers.remove(&user_id).is_some();
        self.suggestions.cache().invalidate_user(user_id);
        removed
    }
}
