// ============================================
// Neural Mood Analyzer (情緒預測)
// ============================================
//
// Learns how a player's moods relate to when and what they play:
// 1. Mood patterns - hour/day likelihood, triggers, associated games
// 2. Mood transitions - which mood tends to follow which
// 3. Mood network - tiny feed-forward classifier over session context
// 4. Heuristic fallback - most frequent mood when the network is untrained
//
// State machine: Untrained → Training → Trained (re-enterable).
// Readers always see the last fully committed snapshot.

pub mod analyzer;
pub mod network;
pub mod vocabulary;

pub use analyzer::{
    AnalysisReport, AnalyzerState, MoodFactors, MoodInsights, MoodPattern, MoodPrediction,
    MoodRecommendation, MoodTimePatterns, MoodTransition, NeuralMoodAnalyzer, PredictionSource,
};
pub use network::{Activation, FeedForwardNetwork, TrainingExample};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoodError {
    #[error("Invalid mood analyzer config: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Training failed: {0}")]
    TrainingFailed(String),
}

pub type Result<T> = std::result::Result<T, MoodError>;

/// Constructor-time configuration for the mood network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralMoodConfig {
    /// SGD step size
    pub learning_rate: f32,
    /// Update inertia coefficient, in [0, 1)
    pub momentum: f32,
    /// Sizes of the hidden layers
    pub hidden_layers: Vec<usize>,
    pub activation_function: Activation,
    pub batch_size: usize,
    pub epochs: usize,
    /// Seed for weight init and batch shuffling
    pub seed: u64,
}

impl Default for NeuralMoodConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            momentum: 0.9,
            hidden_layers: vec![16, 8],
            activation_function: Activation::Relu,
            batch_size: 8,
            epochs: 60,
            seed: 7,
        }
    }
}

impl NeuralMoodConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(MoodError::InvalidConfig(
                "learning_rate must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(MoodError::InvalidConfig(
                "momentum must be in [0.0, 1.0)".to_string(),
            ));
        }
        if self.hidden_layers.iter().any(|size| *size == 0) {
            return Err(MoodError::InvalidConfig(
                "hidden layer sizes must be non-zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(MoodError::InvalidConfig("batch_size must be non-zero".to_string()));
        }
        if self.epochs == 0 {
            return Err(MoodError::InvalidConfig("epochs must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(NeuralMoodConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let cases = [
            NeuralMoodConfig { learning_rate: 0.0, ..NeuralMoodConfig::default() },
            NeuralMoodConfig { momentum: 1.0, ..NeuralMoodConfig::default() },
            NeuralMoodConfig { hidden_layers: vec![8, 0], ..NeuralMoodConfig::default() },
            NeuralMoodConfig { batch_size: 0, ..NeuralMoodConfig::default() },
            NeuralMoodConfig { epochs: 0, ..NeuralMoodConfig::default() },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(MoodError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_activation_serializes_lowercase() {
        let config = NeuralMoodConfig {
            activation_function: Activation::Tanh,
            ..NeuralMoodConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"tanh\""));
    }
}
