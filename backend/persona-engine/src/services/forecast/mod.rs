// ============================================
// Mood Forecast Engine (情緒趨勢預測)
// ============================================
//
// Turns an upstream mood-trend summary plus history into ranked forecasts:
// 1. Momentum continuation - rising dominant moods keep rising
// 2. Mean reversion - falling dominant moods give way to an alternative
// 3. Seasonality - static month curve per mood
// 4. Data quality - forecast accuracy degrades with thin history
//
// Stateless; every call is a pure function of its inputs and the clock.

use crate::models::NEUTRAL_MOOD;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Invalid trend analysis: {0}")]
    InvalidTrend(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

const MAX_ALTERNATIVES: usize = 3;
const ALTERNATIVE_DISCOUNT: f32 = 0.7;
const MOMENTUM_THRESHOLD: f32 = 0.6;
const MOMENTUM_BOOST: f32 = 0.2;
const MOMENTUM_CEILING: f32 = 0.9;
const REVERSION_PENALTY: f32 = 0.1;
const REVERSION_FLOOR: f32 = 0.3;
const THIN_HISTORY_POINTS: usize = 5;
const THIN_HISTORY_ACCURACY: f32 = 0.3;

/// Monthly prevalence curve per mood, January first
const SEASONAL_CURVES: &[(&str, [f32; 12])] = &[
    ("chill", [0.8, 0.75, 0.6, 0.5, 0.45, 0.4, 0.45, 0.5, 0.55, 0.65, 0.75, 0.85]),
    ("relaxed", [0.7, 0.65, 0.6, 0.55, 0.55, 0.6, 0.7, 0.7, 0.55, 0.55, 0.6, 0.75]),
    ("competitive", [0.55, 0.6, 0.65, 0.65, 0.6, 0.5, 0.45, 0.45, 0.6, 0.7, 0.7, 0.55]),
    ("focused", [0.7, 0.7, 0.65, 0.6, 0.55, 0.45, 0.4, 0.45, 0.65, 0.7, 0.7, 0.55]),
    ("social", [0.5, 0.45, 0.5, 0.55, 0.6, 0.7, 0.75, 0.75, 0.6, 0.55, 0.6, 0.8]),
    ("adventurous", [0.45, 0.45, 0.55, 0.6, 0.7, 0.75, 0.8, 0.75, 0.6, 0.5, 0.45, 0.5]),
    ("creative", [0.6, 0.6, 0.55, 0.5, 0.5, 0.5, 0.5, 0.5, 0.55, 0.6, 0.65, 0.65]),
    ("nostalgic", [0.6, 0.5, 0.45, 0.4, 0.4, 0.4, 0.45, 0.45, 0.5, 0.6, 0.7, 0.85]),
    ("energetic", [0.45, 0.5, 0.55, 0.6, 0.7, 0.75, 0.75, 0.7, 0.6, 0.55, 0.5, 0.45]),
    ("stressed", [0.6, 0.55, 0.55, 0.5, 0.6, 0.55, 0.4, 0.4, 0.55, 0.6, 0.65, 0.7]),
];

/// Where a fading mood usually goes next
const ALTERNATIVE_MOODS: &[(&str, &str)] = &[
    ("competitive", "chill"),
    ("stressed", "relaxed"),
    ("energetic", "chill"),
    ("focused", "relaxed"),
    ("chill", "energetic"),
    ("relaxed", "focused"),
    ("social", "focused"),
    ("adventurous", "creative"),
    ("creative", "adventurous"),
    ("nostalgic", "adventurous"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodTrend {
    pub mood_id: String,
    pub direction: TrendDirection,
    /// Signed change in prevalence per period
    pub change_rate: f32,
    pub confidence: f32,
}

impl MoodTrend {
    pub fn new(mood_id: impl Into<String>, direction: TrendDirection, change_rate: f32, confidence: f32) -> Self {
        Self {
            mood_id: mood_id.into(),
            direction,
            change_rate,
            confidence,
        }
    }
}

/// Trend summary produced by the upstream trend-analysis collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub dominant_trend: MoodTrend,
    #[serde(default)]
    pub trends: Vec<MoodTrend>,
    pub volatility: f32,
}

impl TrendAnalysis {
    /// Reject inputs the engine would otherwise have to guess about
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.volatility) {
            return Err(ForecastError::InvalidTrend(format!(
                "volatility {} outside [0, 1]",
                self.volatility
            )));
        }
        for trend in std::iter::once(&self.dominant_trend).chain(&self.trends) {
            if trend.mood_id.trim().is_empty() {
                return Err(ForecastError::InvalidTrend("empty mood id".to_string()));
            }
            if !trend.change_rate.is_finite() {
                return Err(ForecastError::InvalidTrend(format!(
                    "non-finite change rate for '{}'",
                    trend.mood_id
                )));
            }
            if !(0.0..=1.0).contains(&trend.confidence) {
                return Err(ForecastError::InvalidTrend(format!(
                    "confidence {} for '{}' outside [0, 1]",
                    trend.confidence, trend.mood_id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMoodPoint {
    pub timestamp: DateTime<Utc>,
    pub mood_id: String,
    /// Share of sessions in this mood at `timestamp`
    #[serde(default)]
    pub prevalence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastPeriod {
    Day,
    #[default]
    Week,
    Month,
}

impl ForecastPeriod {
    pub fn timeframe(self) -> &'static str {
        match self {
            ForecastPeriod::Day => "next 24 hours",
            ForecastPeriod::Week => "next 7 days",
            ForecastPeriod::Month => "next 30 days",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Low,
    Medium,
    High,
}

impl DataQuality {
    pub fn from_points(points: usize) -> Self {
        match points {
            n if n >= 20 => DataQuality::High,
            n if n >= 10 => DataQuality::Medium,
            _ => DataQuality::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataQuality::Low => "low",
            DataQuality::Medium => "medium",
            DataQuality::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastFactors {
    pub trend_influence: f32,
    pub seasonality_influence: f32,
    pub volatility_adjustment: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodForecast {
    pub predicted_mood: String,
    pub confidence: f32,
    pub timeframe: String,
    pub factors: ForecastFactors,
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodForecastResult {
    pub primary: MoodForecast,
    pub alternatives: Vec<MoodForecast>,
    pub forecast_accuracy: f32,
    pub data_quality: DataQuality,
    pub generated_at: DateTime<Utc>,
}

/// Seasonal prevalence of `mood_id` in `month` (1-12); 0.5 when unknown
pub fn seasonal_influence(mood_id: &str, month: u32) -> f32 {
    let mood = mood_id.trim().to_lowercase();
    SEASONAL_CURVES
        .iter()
        .find(|(m, _)| *m == mood)
        .and_then(|(_, curve)| curve.get(month.saturating_sub(1) as usize).copied())
        .unwrap_or(0.5)
}

/// Mood that tends to replace a fading `mood_id`
pub fn alternative_mood(mood_id: &str) -> &'static str {
    let mood = mood_id.trim().to_lowercase();
    ALTERNATIVE_MOODS
        .iter()
        .find(|(m, _)| *m == mood)
        .map(|(_, alt)| *alt)
        .unwrap_or(NEUTRAL_MOOD)
}

#[derive(Debug, Clone, Default)]
pub struct MoodForecastEngine;

impl MoodForecastEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate_mood_forecast(
        &self,
        trend_analysis: &TrendAnalysis,
        historical_data: &[HistoricalMoodPoint],
        forecast_period: ForecastPeriod,
    ) -> MoodForecastResult {
        self.calculate_mood_forecast_at(trend_analysis, historical_data, forecast_period, Utc::now())
    }

    /// Same as `calculate_mood_forecast` with an explicit clock
    pub fn calculate_mood_forecast_at(
        &self,
        trend_analysis: &TrendAnalysis,
        historical_data: &[HistoricalMoodPoint],
        forecast_period: ForecastPeriod,
        now: DateTime<Utc>,
    ) -> MoodForecastResult {
        let points = historical_data.len();
        let data_quality = DataQuality::from_points(points);
        let volatility = trend_analysis.volatility.clamp(0.0, 1.0);
        let dominant = &trend_analysis.dominant_trend;
        let month = now.month();

        let factors = trend_factors(dominant, volatility, month);
        let mut predicted_mood = dominant.mood_id.clone();
        let mut confidence = dominant.confidence * factors.volatility_adjustment;

        let mut reasoning = vec![format!(
            "Based on {} trend of '{}' (change rate {:+.2}, trend confidence {:.0}%)",
            direction_label(dominant.direction),
            dominant.mood_id,
            dominant.change_rate,
            dominant.confidence * 100.0
        )];

        match dominant.direction {
            TrendDirection::Increasing if confidence > MOMENTUM_THRESHOLD => {
                confidence = (confidence + MOMENTUM_BOOST).min(MOMENTUM_CEILING);
                reasoning.push(format!("Rising '{}' is likely to continue", dominant.mood_id));
            }
            TrendDirection::Decreasing if confidence > MOMENTUM_THRESHOLD => {
                predicted_mood = alternative_mood(&dominant.mood_id).to_string();
                confidence = (confidence - REVERSION_PENALTY).max(REVERSION_FLOOR);
                reasoning.push(format!(
                    "Fading '{}' tends to give way to '{}'",
                    dominant.mood_id, predicted_mood
                ));
            }
            _ => {}
        }

        reasoning.push(format!(
            "Confidence adjusted by {:.0}% for mood volatility {:.2}",
            (1.0 - factors.volatility_adjustment) * 100.0,
            volatility
        ));
        reasoning.push(format!(
            "Data quality {} ({} historical points)",
            data_quality.as_str(),
            points
        ));

        let primary = MoodForecast {
            predicted_mood,
            confidence: confidence.clamp(0.0, 1.0),
            timeframe: forecast_period.timeframe().to_string(),
            factors,
            reasoning,
        };

        let mut others: Vec<&MoodTrend> = trend_analysis
            .trends
            .iter()
            .filter(|t| t.mood_id != dominant.mood_id)
            .collect();
        others.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then_with(|| a.mood_id.cmp(&b.mood_id)));

        let alternatives = others
            .into_iter()
            .take(MAX_ALTERNATIVES)
            .map(|trend| MoodForecast {
                predicted_mood: trend.mood_id.clone(),
                confidence: (trend.confidence * ALTERNATIVE_DISCOUNT).clamp(0.0, 1.0),
                timeframe: forecast_period.timeframe().to_string(),
                factors: trend_factors(trend, volatility, month),
                reasoning: vec![format!(
                    "Alternative: {} trend of '{}'",
                    direction_label(trend.direction),
                    trend.mood_id
                )],
            })
            .collect();

        let forecast_accuracy = forecast_accuracy(trend_analysis, volatility, points);

        debug!(
            predicted_mood = %primary.predicted_mood,
            confidence = primary.confidence,
            accuracy = forecast_accuracy,
            points = points,
            "Mood forecast calculated"
        );

        MoodForecastResult {
            primary,
            alternatives,
            forecast_accuracy,
            data_quality,
            generated_at: now,
        }
    }
}

fn trend_factors(trend: &MoodTrend, volatility: f32, month: u32) -> ForecastFactors {
    ForecastFactors {
        trend_influence: (trend.change_rate.abs() * trend.confidence).clamp(0.0, 1.0),
        seasonality_influence: seasonal_influence(&trend.mood_id, month),
        volatility_adjustment: 1.0 - volatility,
    }
}

fn forecast_accuracy(analysis: &TrendAnalysis, volatility: f32, points: usize) -> f32 {
    if points < THIN_HISTORY_POINTS {
        return THIN_HISTORY_ACCURACY;
    }
    let confidences: Vec<f32> = if analysis.trends.is_empty() {
        vec![analysis.dominant_trend.confidence]
    } else {
        analysis.trends.iter().map(|t| t.confidence).collect()
    };
    let average = confidences.iter().sum::<f32>() / confidences.len() as f32;
    (average - 0.3 * volatility).clamp(0.2, 0.95)
}

fn direction_label(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::Increasing => "an increasing",
        TrendDirection::Decreasing => "a decreasing",
        TrendDirection::Stable => "a stable",
    }
}
