use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use persona_engine::services::forecast::{ForecastPeriod, HistoricalMoodPoint, MoodForecastResult, TrendAnalysis};
use persona_engine::services::mood::{MoodPrediction, MoodRecommendation};
use persona_engine::services::suggestions::{NextGamePrediction, SuggestionContext, SuggestionSet};
use persona_engine::services::traits::{PersonaTraits, RawPlayerSignals};
use persona_engine::services::{TrainingSummary, UserInsights};
use persona_engine::{Config, GameRecord, PersonaEngine, Session};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Everything the engine needs for one user, as exported by the play tracker
#[derive(Debug, Deserialize)]
struct Snapshot {
    user_id: Uuid,
    #[serde(default)]
    sessions: Vec<Session>,
    #[serde(default)]
    catalog: Vec<GameRecord>,
    /// Derived from `sessions` when absent
    #[serde(default)]
    signals: Option<RawPlayerSignals>,
    #[serde(default)]
    completion_rate: Option<f64>,
    #[serde(default)]
    difficulty_preference: Option<String>,
    #[serde(default)]
    trend_analysis: Option<TrendAnalysis>,
    #[serde(default)]
    history: Vec<HistoricalMoodPoint>,
    #[serde(default)]
    forecast_period: ForecastPeriod,
    #[serde(default)]
    context: SuggestionContext,
    #[serde(default)]
    target_mood: Option<String>,
    /// Evaluation clock; wall clock when absent
    #[serde(default)]
    now: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct Report {
    user_id: Uuid,
    persona: PersonaTraits,
    training: TrainingSummary,
    current_mood: MoodPrediction,
    mood_path: MoodRecommendation,
    forecast: Option<MoodForecastResult>,
    suggestions: SuggestionSet,
    next_game: NextGamePrediction,
    insights: UserInsights,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the report, logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.snapshot_path.clone())
        .context("No snapshot path given (argument or PERSONA_SNAPSHOT_PATH)")?;

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

    info!(
        user_id = %snapshot.user_id,
        sessions = snapshot.sessions.len(),
        catalog = snapshot.catalog.len(),
        "Snapshot loaded"
    );

    let engine = Arc::new(
        PersonaEngine::new(config.engine.clone()).context("Failed to build persona engine")?,
    );
    let report = run(engine, snapshot).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(engine: Arc<PersonaEngine>, snapshot: Snapshot) -> Result<Report> {
    let user_id = snapshot.user_id;
    let now = snapshot.now.unwrap_or_else(Utc::now);

    let signals = snapshot.signals.clone().unwrap_or_else(|| {
        RawPlayerSignals::from_sessions(
            &snapshot.sessions,
            snapshot.completion_rate,
            snapshot.difficulty_preference.clone(),
        )
    });
    let persona = engine.persona_traits(&signals);

    let training = {
        let engine = Arc::clone(&engine);
        let sessions = snapshot.sessions.clone();
        tokio::task::spawn_blocking(move || engine.train_user(user_id, &sessions))
            .await
            .context("Training task panicked")?
    };

    let current_mood = engine
        .mood_analyzer(user_id)
        .predict_current_mood(&snapshot.sessions, now);
    let mood_path = engine
        .mood_analyzer(user_id)
        .get_mood_recommendations(&current_mood.predicted_mood, snapshot.target_mood.as_deref());

    let forecast = match &snapshot.trend_analysis {
        Some(trend) => {
            match engine.forecast_at(trend, &snapshot.history, snapshot.forecast_period, now) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(error = %e, "Skipping forecast");
                    None
                }
            }
        }
        None => None,
    };

    let mut context = snapshot.context.clone();
    if context.persona.is_none() {
        context.persona = Some(persona.clone());
    }
    let recommendation = engine.recommend(user_id, &snapshot.catalog, &context, &snapshot.sessions, now);
    let next_game = engine.predict_next_game(user_id, &snapshot.sessions, &snapshot.catalog);
    let insights = engine.insights(user_id);

    Ok(Report {
        user_id,
        persona,
        training,
        current_mood,
        mood_path,
        forecast,
        suggestions: recommendation.suggestions.as_ref().clone(),
        next_game,
        insights,
    })
}
