//! Map-element filter and classifier.
//!
//! Stateless: the whole of its configuration is the tag sets and scoring weights
//! passed in, either defaulted or taken from a [`crate::request::GenerationRequest`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::osm::TagBag;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceClass {
    Paved,
    Unpaved,
    Mixed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

fn primary_highways() -> HashSet<&'static str> {
    ["footway", "path", "track", "bridleway", "cycleway", "steps", "pedestrian"]
        .into_iter()
        .collect()
}

fn secondary_highways() -> HashSet<&'static str> {
    ["residential", "unclassified", "service", "living_street"]
        .into_iter()
        .collect()
}

fn excluded_highways() -> HashSet<&'static str> {
    ["motorway", "trunk", "primary", "secondary", "tertiary"]
        .into_iter()
        .collect()
}

fn dangerous_highways() -> HashSet<&'static str> {
    ["trunk", "primary", "secondary", "tertiary", "residential"]
        .into_iter()
        .collect()
}

fn paved_surfaces() -> HashSet<&'static str> {
    ["paved", "asphalt", "concrete", "paving_stones", "sett"]
        .into_iter()
        .collect()
}

fn unpaved_surfaces() -> HashSet<&'static str> {
    ["unpaved", "gravel", "dirt", "ground", "grass", "sand", "earth"]
        .into_iter()
        .collect()
}

/// Weights for the quality-score blend, tunable per request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassifyWeights {
    pub surface: f64,
    pub safety: f64,
    pub popularity: f64,
}

impl Default for ClassifyWeights {
    fn default() -> Self {
        ClassifyWeights {
            surface: 0.2,
            safety: 0.5,
            popularity: 0.1,
        }
    }
}

/// Whether a way is walkable, and whether it requires the request to opt into
/// secondary-class ways.
pub fn is_walkable(tags: &TagBag, include_secondary: bool) -> bool {
    let Some(highway) = tags.get("highway").map(String::as_str) else {
        return false;
    };
    if excluded_highways().contains(highway) {
        return false;
    }
    if primary_highways().contains(highway) {
        return true;
    }
    include_secondary && secondary_highways().contains(highway)
}

pub fn surface_class(tags: &TagBag) -> SurfaceClass {
    match tags.get("surface").map(String::as_str) {
        Some(s) if paved_surfaces().contains(s) => SurfaceClass::Paved,
        Some(s) if unpaved_surfaces().contains(s) => SurfaceClass::Unpaved,
        _ => SurfaceClass::Mixed,
    }
}

pub fn difficulty_class(tags: &TagBag) -> Difficulty {
    let surface = surface_class(tags);
    let tracktype_hard = tags
        .get("tracktype")
        .map(|t| matches!(t.as_str(), "grade4" | "grade5"))
        .unwrap_or(false);
    let smoothness_hard = tags
        .get("smoothness")
        .map(|s| matches!(s.as_str(), "very_bad" | "horrible" | "very_horrible" | "impassable"))
        .unwrap_or(false);

    if tracktype_hard || smoothness_hard || surface == SurfaceClass::Unpaved {
        if tracktype_hard || smoothness_hard {
            Difficulty::Hard
        } else {
            Difficulty::Medium
        }
    } else if surface == SurfaceClass::Paved {
        Difficulty::Easy
    } else {
        Difficulty::Medium
    }
}

/// Quality score in `[0, 100]`. `highway` is passed separately since it gates the
/// safety term independently of surface.
pub fn quality_score(tags: &TagBag, highway: &str, weights: ClassifyWeights) -> f64 {
    let mut score: f64 = 50.0;

    match surface_class(tags) {
        SurfaceClass::Paved => score += 25.0 * weights.surface / 0.2,
        SurfaceClass::Unpaved => score -= 15.0 * weights.surface / 0.2,
        SurfaceClass::Mixed => {}
    }

    if dangerous_highways().contains(highway) {
        score -= 30.0 * weights.safety / 0.5;
    }

    let popular = tags.contains_key("name")
        || tags.contains_key("ref")
        || tags
            .get("trail_visibility")
            .map(|v| v == "excellent")
            .unwrap_or(false);
    if popular {
        score += 15.0 * weights.popularity / 0.1;
    }

    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod test {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> TagBag {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn motorway_is_never_walkable() {
        assert!(!is_walkable(&tags(&[("highway", "motorway")]), true));
    }

    #[test]
    fn footway_always_walkable() {
        assert!(is_walkable(&tags(&[("highway", "footway")]), false));
    }

    #[test]
    fn residential_requires_opt_in() {
        let t = tags(&[("highway", "residential")]);
        assert!(!is_walkable(&t, false));
        assert!(is_walkable(&t, true));
    }

    #[test]
    fn missing_highway_rejected() {
        assert!(!is_walkable(&tags(&[]), true));
    }

    #[test]
    fn difficulty_defaults_to_medium() {
        assert_eq!(difficulty_class(&tags(&[])), Difficulty::Medium);
    }

    #[test]
    fn quality_clamped_into_range() {
        let t = tags(&[("highway", "motorway"), ("surface", "dirt")]);
        let q = quality_score(&t, "motorway", ClassifyWeights::default());
        assert!((0.0..=100.0).contains(&q));
    }
}
