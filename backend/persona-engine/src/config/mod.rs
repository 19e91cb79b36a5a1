use crate::services::mood::{Activation, NeuralMoodConfig};
use crate::services::suggestions::SuggestionConfig;
use crate::services::PersonaEngineConfig;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

const ENV_PREFIX: &str = "PERSONA_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error(transparent)]
    Mood(#[from] crate::services::mood::MoodError),
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub engine: PersonaEngineConfig,
    /// Snapshot the binary reads when no path argument is given
    pub snapshot_path: Option<PathBuf>,
}

/// `PERSONA_*` variables, all optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvOverrides {
    pub learning_rate: Option<f32>,
    pub momentum: Option<f32>,
    pub hidden_layers: Option<String>,
    pub activation: Option<String>,
    pub batch_size: Option<usize>,
    pub epochs: Option<usize>,
    pub seed: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
    pub max_suggestions: Option<usize>,
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let overrides = envy::prefixed(ENV_PREFIX).from_env::<EnvOverrides>()?;
        Self::from_overrides(overrides)
    }

    /// Apply overrides on top of the defaults and validate the result
    pub fn from_overrides(overrides: EnvOverrides) -> Result<Self, ConfigError> {
        let mut mood = NeuralMoodConfig::default();
        if let Some(learning_rate) = overrides.learning_rate {
            mood.learning_rate = learning_rate;
        }
        if let Some(momentum) = overrides.momentum {
            mood.momentum = momentum;
        }
        if let Some(layers) = overrides.hidden_layers.as_deref() {
            mood.hidden_layers = parse_layers(layers)?;
        }
        if let Some(activation) = overrides.activation {
            mood.activation_function =
                Activation::parse(&activation).ok_or(ConfigError::InvalidValue {
                    name: "PERSONA_ACTIVATION",
                    value: activation,
                })?;
        }
        if let Some(batch_size) = overrides.batch_size {
            mood.batch_size = batch_size;
        }
        if let Some(epochs) = overrides.epochs {
            mood.epochs = epochs;
        }
        if let Some(seed) = overrides.seed {
            mood.seed = seed;
        }
        mood.validate()?;

        let mut suggestions = SuggestionConfig::default();
        if let Some(ttl) = overrides.cache_ttl_secs {
            suggestions.cache_ttl_secs = ttl;
        }
        if let Some(max) = overrides.max_suggestions {
            suggestions.max_suggestions = max;
        }

        Ok(Config {
            engine: PersonaEngineConfig { mood, suggestions },
            snapshot_path: overrides.snapshot_path,
        })
    }
}

/// "16,8" → [16, 8]; an empty list means no hidden layer
fn parse_layers(value: &str) -> Result<Vec<usize>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "PERSONA_HIDDEN_LAYERS",
                    value: value.to_string(),
                })
        })
        .collect()
}
