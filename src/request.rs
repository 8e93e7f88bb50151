//! Per-call configuration surface and process-level engine configuration: constructed
//! once by the CLI or embedder and passed explicitly, never read from global state.
//! Groups every tunable into one serde-derived record, the same shape as the graph
//! module's weight structs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::Difficulty;

/// Every scoring weight the classifier and loop generator use, collected into one
/// typed struct so a request's `scoring_weights` override is a whole replacement, not
/// a loose map of partial keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringWeights {
    pub classify_surface: f64,
    pub classify_safety: f64,
    pub classify_popularity: f64,
    pub loop_distance: f64,
    pub loop_angle: f64,
    pub loop_quality: f64,
    pub loop_diversity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            classify_surface: 0.2,
            classify_safety: 0.5,
            classify_popularity: 0.1,
            loop_distance: 0.4,
            loop_angle: 0.3,
            loop_quality: 0.2,
            loop_diversity: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub start_lat: f64,
    pub start_lon: f64,
    pub target_distance_m: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,
    #[serde(default = "default_true")]
    pub include_secondary: bool,
    #[serde(default)]
    pub surface_types: Option<Vec<crate::classify::SurfaceClass>>,
    #[serde(default)]
    pub difficulty: Option<Vec<Difficulty>>,
    #[serde(default)]
    pub scoring_weights: Option<ScoringWeights>,
    #[serde(default = "default_min_return_angle")]
    pub min_return_angle_deg: f64,
}

fn default_tolerance() -> f64 {
    0.05
}
fn default_max_variants() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_min_return_angle() -> f64 {
    90.0
}

impl GenerationRequest {
    pub fn weights(&self) -> ScoringWeights {
        self.scoring_weights.unwrap_or_default()
    }
}

/// Process-wide configuration, built once from CLI flags or environment and passed
/// explicitly into the cache and loop generator constructors.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub time_budget: Duration,
    pub compass_directions: usize,
    pub default_scoring_weights: ScoringWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_dir: PathBuf::from(".route-loopgen-cache"),
            cache_ttl: crate::cache::DEFAULT_TTL,
            time_budget: Duration::from_secs(3),
            compass_directions: 8,
            default_scoring_weights: ScoringWeights::default(),
        }
    }
}
