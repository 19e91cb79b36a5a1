use chrono::{DateTime, Duration, TimeZone, Utc};
use persona_engine::services::forecast::{
    ForecastPeriod, HistoricalMoodPoint, MoodTrend, TrendAnalysis, TrendDirection,
};
use persona_engine::services::mood::{AnalyzerState, PredictionSource};
use persona_engine::services::suggestions::{
    BehaviorPattern, BehaviorStore, InMemoryBehaviorStore, SuggestionContext, SuggestionError,
};
use persona_engine::services::traits::{Archetype, Intensity, Pacing, RawPlayerSignals};
use persona_engine::{GameRecord, PersonaEngine, PersonaEngineConfig, Session};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/sample_snapshot.json");

struct Fixture {
    user_id: Uuid,
    sessions: Vec<Session>,
    catalog: Vec<GameRecord>,
    trend: TrendAnalysis,
    history: Vec<HistoricalMoodPoint>,
    context: SuggestionContext,
    now: DateTime<Utc>,
}

fn load_fixture() -> Fixture {
    let raw = std::fs::read_to_string(FIXTURE).expect("fixture readable");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("fixture is JSON");
    let field = |name: &str| value[name].clone();

    Fixture {
        user_id: serde_json::from_value(field("user_id")).unwrap(),
        sessions: serde_json::from_value(field("sessions")).unwrap(),
        catalog: serde_json::from_value(field("catalog")).unwrap(),
        trend: serde_json::from_value(field("trend_analysis")).unwrap(),
        history: serde_json::from_value(field("history")).unwrap(),
        context: serde_json::from_value(field("context")).unwrap(),
        now: serde_json::from_value(field("now")).unwrap(),
    }
}

fn engine() -> PersonaEngine {
    PersonaEngine::new(PersonaEngineConfig::default()).expect("default config is valid")
}

/// Counts store traffic on top of the in-memory store
#[derive(Default)]
struct CountingStore {
    inner: InMemoryBehaviorStore,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl BehaviorStore for CountingStore {
    fn load(&self, user_id: Uuid) -> Result<Option<BehaviorPattern>, SuggestionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(user_id)
    }

    fn save(&self, pattern: BehaviorPattern) -> Result<(), SuggestionError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(pattern)
    }

    fn remove(&self, user_id: Uuid) -> Result<(), SuggestionError> {
        self.inner.remove(user_id)
    }
}

#[test]
fn test_fixture_end_to_end() {
    let fixture = load_fixture();
    let engine = engine();

    let summary = engine.train_user(fixture.user_id, &fixture.sessions);
    assert_eq!(summary.mood.state, AnalyzerState::Trained);
    assert_eq!(summary.mood.skipped_malformed, 1);
    assert_eq!(summary.behavior.skipped_malformed, 1);
    assert!(summary.behavior.stored);

    let rec = engine.recommend(
        fixture.user_id,
        &fixture.catalog,
        &fixture.context,
        &fixture.sessions,
        fixture.now,
    );
    let predicted = rec.predicted_mood.expect("context has no mood");
    assert_eq!(predicted.source, PredictionSource::Neural);

    let suggestions = &rec.suggestions.suggestions;
    assert!(!rec.suggestions.fallback);
    assert_eq!(suggestions.len(), 5);
    assert!(suggestions
        .windows(2)
        .all(|pair| pair[0].confidence >= pair[1].confidence));
    for suggestion in suggestions {
        assert!((0.0..=1.0).contains(&suggestion.confidence));
        assert!(fixture.catalog.iter().any(|g| g.id == suggestion.game_id));
    }

    let next = engine.predict_next_game(fixture.user_id, &fixture.sessions, &fixture.catalog);
    let game = next.game_id.expect("fixture has repeating genre sequences");
    assert!(fixture.catalog.iter().any(|g| g.id == game));
    assert!(next.confidence > 0.0 && next.confidence <= 1.0);

    let insights = engine.insights(fixture.user_id);
    assert_eq!(insights.mood.pattern_count, 4);
    assert!(!insights.behavior.is_empty());
}

#[test]
fn test_fixture_forecast() {
    let fixture = load_fixture();
    let result = engine()
        .forecast(&fixture.trend, &fixture.history, ForecastPeriod::Week)
        .unwrap();

    assert_eq!(result.primary.predicted_mood, "competitive");
    // four weekly points is thin history
    assert!((result.forecast_accuracy - 0.3).abs() < 1e-6);
    assert_eq!(result.alternatives.len(), 2);
    assert!(result.alternatives[0].confidence >= result.alternatives[1].confidence);
}

#[test]
fn test_rising_trend_forecast_confidence() {
    let trend = TrendAnalysis {
        dominant_trend: MoodTrend::new("competitive", TrendDirection::Increasing, 0.1, 0.9),
        trends: Vec::new(),
        volatility: 0.0,
    };
    let result = engine().forecast(&trend, &[], ForecastPeriod::Day).unwrap();
    assert!((result.primary.confidence - 0.9).abs() < 1e-6);
}

#[test]
fn test_persona_from_signals() {
    let engine = engine();
    let signals = RawPlayerSignals {
        completion_rate: Some(0.75),
        sessions_per_week: Some(6.0),
        average_session_length_minutes: Some(150.0),
        ..RawPlayerSignals::default()
    };

    let traits = engine.persona_traits(&signals);
    assert_eq!(traits.archetype, Archetype::Specialist);
    assert_eq!(traits.intensity, Intensity::High);
    assert_eq!(traits.pacing, Pacing::Marathon);
    assert_eq!(traits, engine.persona_traits(&signals));
    assert!((0.3..=1.0).contains(&traits.confidence));
}

#[test]
fn test_cache_shared_until_new_session() {
    let fixture = load_fixture();
    let engine = engine();
    engine.train_user(fixture.user_id, &fixture.sessions);

    let context = SuggestionContext {
        current_mood: Some("chill".to_string()),
        ..fixture.context.clone()
    };
    let first = engine.recommend(fixture.user_id, &fixture.catalog, &context, &[], fixture.now);
    let second = engine.recommend(
        fixture.user_id,
        &fixture.catalog,
        &context,
        &[],
        fixture.now + Duration::seconds(30),
    );
    assert!(Arc::ptr_eq(&first.suggestions, &second.suggestions));

    let session = Session::new("tetris-effect", fixture.now, 20.0)
        .with_mood("chill")
        .with_genres(["puzzle"]);
    assert!(engine.record_session(fixture.user_id, &session));

    let third = engine.recommend(
        fixture.user_id,
        &fixture.catalog,
        &context,
        &[],
        fixture.now + Duration::seconds(60),
    );
    assert!(!Arc::ptr_eq(&first.suggestions, &third.suggestions));
}

#[test]
fn test_empty_history_falls_back_to_popularity() {
    let fixture = load_fixture();
    let engine = engine();

    let summary = engine.train_user(fixture.user_id, &[]);
    assert!(!summary.behavior.stored);
    assert_eq!(summary.mood.state, AnalyzerState::Untrained);
    assert!(engine
        .suggestion_engine()
        .behavior_pattern(fixture.user_id)
        .is_none());

    let context = SuggestionContext {
        current_mood: Some("focused".to_string()),
        ..SuggestionContext::default()
    };
    let rec = engine.recommend(fixture.user_id, &fixture.catalog, &context, &[], fixture.now);
    let set = &rec.suggestions;
    assert!(set.fallback);
    assert_eq!(set.suggestions[0].game_id, "valorant");
    assert!(set
        .suggestions
        .iter()
        .all(|s| (s.confidence - 0.2).abs() < 1e-6));
}

#[test]
fn test_unmatched_genres_predict_nothing() {
    let fixture = load_fixture();
    let engine = engine();
    engine.train_user(fixture.user_id, &fixture.sessions);

    let recent = vec![Session::new("doki", fixture.now, 40.0).with_genres(["visual-novel"])];
    let next = engine.predict_next_game(fixture.user_id, &recent, &fixture.catalog);

    assert!(next.game_id.is_none());
    assert_eq!(next.confidence, 0.0);
    assert!(next.reasoning[0].contains("No genre pattern"));
}

#[test]
fn test_external_store_sees_traffic() {
    let fixture = load_fixture();
    let store = Arc::new(CountingStore::default());
    let engine =
        PersonaEngine::with_store(PersonaEngineConfig::default(), Arc::clone(&store)).unwrap();

    engine.train_user(fixture.user_id, &fixture.sessions);
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);

    let start = Utc.with_ymd_and_hms(2026, 9, 29, 8, 0, 0).unwrap();
    engine.record_session(fixture.user_id, &Session::new("civilization-vi", start, 45.0));
    assert_eq!(store.saves.load(Ordering::SeqCst), 2);
    assert!(store.loads.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_background_training_visible_through_engine() {
    let fixture = load_fixture();
    let engine = engine();
    let analyzer = engine.mood_analyzer(fixture.user_id);

    let before = analyzer.predict_current_mood(&[], fixture.now);
    assert_eq!(before.source, PredictionSource::Heuristic);

    let report = analyzer
        .spawn_training(fixture.sessions.clone())
        .await
        .expect("training task completes");
    assert_eq!(report.state, AnalyzerState::Trained);

    let analyzer = engine.mood_analyzer(fixture.user_id);
    assert_eq!(analyzer.state(), AnalyzerState::Trained);
    let after = analyzer.predict_current_mood(&fixture.sessions, fixture.now);
    assert_eq!(after.source, PredictionSource::Neural);
    assert!(after.confidence > before.confidence);
}
