//! Pure geodetic primitives. No hidden state, no I/O, never raise.
//!
//! Every scalar scorer here clamps its result to `[0, 1]`; callers should never need
//! to re-clamp downstream.

use geo::{HaversineBearing, HaversineDistance, Point};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Matches the mean radius the `geo` crate's haversine algorithms use internally, so
/// the antipodes boundary test below compares against the same constant.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two lat/lon points, in metres.
///
/// Identical points return exactly `0.0`. Delegates to the `geo` crate's
/// `HaversineDistance`, the same trait sparkling-osm-router's `Haversine.distance`
/// calls reach for.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if lat1 == lat2 && lon1 == lon2 {
        return 0.0;
    }
    let p1 = Point::new(lon1, lat1);
    let p2 = Point::new(lon2, lat2);
    p1.haversine_distance(&p2)
}

/// Initial bearing in degrees from point 1 to point 2, normalised to `[0, 360)`.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let p1 = Point::new(lon1, lat1);
    let p2 = Point::new(lon2, lat2);
    p1.haversine_bearing(p2).rem_euclid(360.0)
}

/// Midpoint of a great-circle segment (approximate, sufficient for turn-back scoring).
pub fn midpoint(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> (f64, f64) {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_lambda = (lon2 - lon1).to_radians();
    let bx = phi2.cos() * d_lambda.cos();
    let by = phi2.cos() * d_lambda.sin();
    let phi3 = (phi1.sin() + phi2.sin()).atan2(((phi1.cos() + bx).powi(2) + by.powi(2)).sqrt());
    let lambda3 = lon1.to_radians() + by.atan2(phi1.cos() + bx);
    (phi3.to_degrees(), lambda3.to_degrees())
}

/// Axis-aligned bounding box over lat/lon points. Degenerate to point for a single
/// input; `EmptyInput` (mapped to `InvalidCoordinates`) on an empty set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn from_points(points: &[(f64, f64)]) -> EngineResult<Self> {
        let mut it = points.iter();
        let (lat0, lon0) = *it.next().ok_or(EngineError::InvalidCoordinates {
            lat: f64::NAN,
            lon: f64::NAN,
        })?;
        let mut bb = BoundingBox {
            north: lat0,
            south: lat0,
            east: lon0,
            west: lon0,
        };
        for &(lat, lon) in it {
            bb.north = bb.north.max(lat);
            bb.south = bb.south.min(lat);
            bb.east = bb.east.max(lon);
            bb.west = bb.west.min(lon);
        }
        Ok(bb)
    }

    /// Approximate area in square metres, via the shoelace formula over the box's
    /// four corners, scaled from square degrees using per-degree metre factors at
    /// the box's mean latitude (fine for cache-reporting purposes, not surveying).
    pub fn area_m2(&self) -> f64 {
        let mean_lat = (self.north + self.south) / 2.0;
        let m_per_deg_lat = 111_320.0;
        let m_per_deg_lon = 111_320.0 * mean_lat.to_radians().cos();
        let corners = [
            (self.west * m_per_deg_lon, self.south * m_per_deg_lat),
            (self.east * m_per_deg_lon, self.south * m_per_deg_lat),
            (self.east * m_per_deg_lon, self.north * m_per_deg_lat),
            (self.west * m_per_deg_lon, self.north * m_per_deg_lat),
        ];
        polygon_area(&corners)
    }
}

/// Shortest distance from a point to a line segment, in degrees-space (callers scale
/// as needed). Degenerate zero-length segments fall back to point-to-endpoint.
pub fn point_to_segment_distance(
    px: f64,
    py: f64,
    ax: f64,
    ay: f64,
    bx: f64,
    by: f64,
) -> f64 {
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return ((px - ax).powi(2) + (py - ay).powi(2)).sqrt();
    }
    let t = (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0);
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Shoelace-formula area of a closed polygon given as lat/lon vertices, in square
/// degrees (callers needing metres should project first; this crate only ever uses
/// it for relative comparisons).
pub fn polygon_area(points: &[(f64, f64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..points.len() {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % points.len()];
        sum += x1 * y2 - x2 * y1;
    }
    (sum / 2.0).abs()
}

/// Smaller signed angular difference between two bearings, range `[0, 180]`.
pub fn angular_diversity(a_deg: f64, b_deg: f64) -> f64 {
    let diff = (a_deg - b_deg).abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// `1 - |actual - target| / target`, clamped to `[0, 1]`.
pub fn distance_accuracy(actual: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    clamp01(1.0 - (actual - target).abs() / target)
}

/// Fraction of distinct edges among a path's edge ids, clamped to `[0, 1]`.
pub fn path_uniqueness(edge_ids: &[String]) -> f64 {
    if edge_ids.is_empty() {
        return 0.0;
    }
    let unique: std::collections::HashSet<&String> = edge_ids.iter().collect();
    clamp01(unique.len() as f64 / edge_ids.len() as f64)
}

/// Paved-weighted surface share over a path's edges: paved counts fully, mixed half,
/// unpaved not at all. Clamped to `[0, 1]`.
pub fn surface_quality(surfaces: &[crate::classify::SurfaceClass]) -> f64 {
    if surfaces.is_empty() {
        return 0.0;
    }
    let share: f64 = surfaces
        .iter()
        .map(|s| match s {
            crate::classify::SurfaceClass::Paved => 1.0,
            crate::classify::SurfaceClass::Mixed => 0.5,
            crate::classify::SurfaceClass::Unpaved => 0.0,
        })
        .sum();
    clamp01(share / surfaces.len() as f64)
}

/// How much a path's heading changes hop to hop, clamped to `[0, 1]`. A straight
/// corridor scores low; a route that keeps turning scores high. `bearings` is the
/// sequence of segment headings along the path, in travel order.
pub fn scenery_variety(bearings: &[f64]) -> f64 {
    if bearings.len() < 2 {
        return 0.0;
    }
    let total: f64 = bearings.windows(2).map(|w| angular_diversity(w[0], w[1])).sum();
    clamp01(total / (bearings.len() - 1) as f64 / 180.0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn haversine_identical_points_is_zero() {
        assert_eq!(haversine_distance_m(48.8566, 2.3522, 48.8566, 2.3522), 0.0);
    }

    #[test]
    fn haversine_antipodes_is_half_circumference() {
        let d = haversine_distance_m(0.0, 0.0, 0.0, 180.0);
        let half_circ = std::f64::consts::PI * EARTH_RADIUS_M;
        assert!((d - half_circ).abs() < 10.0, "d={d} half_circ={half_circ}");
    }

    #[test]
    fn bbox_single_point_degenerates() {
        let bb = BoundingBox::from_points(&[(1.0, 2.0)]).unwrap();
        assert_eq!(bb.north, 1.0);
        assert_eq!(bb.south, 1.0);
        assert_eq!(bb.east, 2.0);
        assert_eq!(bb.west, 2.0);
    }

    #[test]
    fn bbox_empty_is_invalid_coordinates() {
        assert!(BoundingBox::from_points(&[]).is_err());
    }

    #[test]
    fn point_to_segment_on_segment_is_zero() {
        let d = point_to_segment_distance(0.5, 0.0, 0.0, 0.0, 1.0, 0.0);
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn angular_diversity_wraps_correctly() {
        assert_eq!(angular_diversity(350.0, 10.0), 20.0);
        assert_eq!(angular_diversity(10.0, 350.0), 20.0);
    }

    #[test]
    fn scalar_scorers_clamp() {
        assert_eq!(distance_accuracy(1000.0, 0.0), 0.0);
        assert_eq!(distance_accuracy(2000.0, 1000.0), 0.0);
        assert_eq!(distance_accuracy(1000.0, 1000.0), 1.0);
    }

    #[test]
    fn surface_quality_weights_paved_over_mixed_over_unpaved() {
        use crate::classify::SurfaceClass::*;
        assert_eq!(surface_quality(&[Paved, Paved]), 1.0);
        assert_eq!(surface_quality(&[Unpaved, Unpaved]), 0.0);
        assert_eq!(surface_quality(&[Paved, Unpaved]), 0.5);
        assert_eq!(surface_quality(&[]), 0.0);
    }

    #[test]
    fn scenery_variety_rewards_turning_over_straight() {
        let straight = [90.0, 90.0, 90.0];
        let winding = [0.0, 90.0, 180.0];
        assert_eq!(scenery_variety(&straight), 0.0);
        assert!(scenery_variety(&winding) > scenery_variety(&straight));
        assert!(scenery_variety(&winding) <= 1.0);
        assert_eq!(scenery_variety(&[45.0]), 0.0);
    }
}
