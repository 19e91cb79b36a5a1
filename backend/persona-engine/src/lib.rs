pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use models::{GameRecord, Session};
pub use services::{
    MoodForecastEngine, NeuralMoodAnalyzer, PersonaEngine, PersonaEngineConfig,
    PredictiveSuggestionEngine, TraitExtractor,
};
