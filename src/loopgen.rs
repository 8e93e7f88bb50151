//! Loop generator: the subsystem that justifies the whole engine.
//!
//! Seven phases: anchor → radial exploration → candidate scoring → return-path
//! search → overlap filter → assemble+validate → rank+return. Phase 2's bearing-bias
//! is grounded on sparkling-osm-router's `process_edges_with_bearing` (deprioritise,
//! don't discard, edges that point the wrong way; fall back to the unfiltered set if
//! none qualify).

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use noisy_float::prelude::{n64, N64};
use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};

use crate::budget::{BudgetState, TimeBudget};
use crate::classify::{Difficulty, SurfaceClass};
use crate::error::{EngineError, EngineResult};
use crate::geo::{angular_diversity, bearing_deg, distance_accuracy, scenery_variety};
use crate::graph::{DomainGraph, NodeId};
use crate::pathfind::{self, PathResult, PathfindConfig};
use crate::request::{GenerationRequest, ScoringWeights};

const WALK_SPEED_MPS: f64 = 1.4;
const OVERLAP_THRESHOLD: f64 = 0.3;
const BEARING_FILTER_MAX_DEVIATION_DEG: f64 = 90.0;
const TURN_BACK_BAND: f64 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopCandidate {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<String>,
    pub total_distance_m: f64,
    pub estimated_duration_s: f64,
    pub total_ascent_m: f64,
    pub quality_score: f64,
    pub target_distance_m: f64,
    pub surface_mix: HashMap<SurfaceClass, f64>,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationDebug {
    pub phase_timings_ms: Vec<(String, f64)>,
    pub explored_nodes: usize,
    pub top_bearings: Vec<f64>,
    pub warnings: Vec<String>,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub candidates: Vec<LoopCandidate>,
    pub debug: GenerationDebug,
}

struct PhaseClock {
    started: Instant,
    timings: Vec<(String, f64)>,
}

impl PhaseClock {
    fn new() -> Self {
        PhaseClock {
            started: Instant::now(),
            timings: Vec::new(),
        }
    }
    fn lap(&mut self, name: &str) {
        self.timings.push((name.to_string(), self.started.elapsed().as_secs_f64() * 1000.0));
        self.started = Instant::now();
    }
}

fn compass_bearings(count: usize) -> Vec<f64> {
    (0..count).map(|i| (360.0 / count as f64) * i as f64).collect()
}

struct RawRadialCandidate {
    direction_index: usize,
    target_bearing: f64,
    turn_back: NodeId,
    outbound: PathResult,
    bearing_from_start: f64,
    avg_quality: f64,
}

/// Bounded, bearing-biased Dijkstra from `start`. Edges whose bearing (measured from
/// `start` to the edge's far endpoint) deviates from `target_bearing` by more than
/// [`BEARING_FILTER_MAX_DEVIATION_DEG`] are deprioritised with a heavy weight
/// multiplier rather than excluded, so a dead-end direction still yields a usable
/// frontier (sparkling-osm-router's `process_edges_with_bearing` fallback).
fn radial_explore(
    graph: &DomainGraph,
    start: NodeId,
    direction_index: usize,
    target_bearing: f64,
    half_distance_m: f64,
) -> Vec<RawRadialCandidate> {
    let start_node = match graph.get_node(start) {
        Some(n) => n,
        None => return Vec::new(),
    };
    let (start_lat, start_lon) = (start_node.lat, start_node.lon);

    let mut dist: HashMap<NodeId, N64> = HashMap::new();
    let mut metric: HashMap<NodeId, f64> = HashMap::new();
    let mut came_from: HashMap<NodeId, (NodeId, String)> = HashMap::new();
    let mut q = PriorityQueue::new();
    dist.insert(start, n64(0.0));
    metric.insert(start, 0.0);
    q.push(start, Reverse(n64(0.0)));

    let mut frontier: Vec<NodeId> = Vec::new();
    let band_lo = half_distance_m * (1.0 - TURN_BACK_BAND);
    let band_hi = half_distance_m * (1.0 + TURN_BACK_BAND);

    while let Some((u, Reverse(du))) = q.pop() {
        let accumulated = *metric.get(&u).unwrap_or(&0.0);
        if accumulated >= band_lo && accumulated <= band_hi {
            frontier.push(u);
        }
        if accumulated > band_hi * 1.1 {
            continue;
        }
        let neighbours: Vec<_> = graph.neighbours(u).collect();
        let any_aligned = neighbours.iter().any(|e| {
            let other = e.other(u);
            graph
                .get_node(other)
                .map(|n| angular_diversity(bearing_deg(start_lat, start_lon, n.lat, n.lon), target_bearing) <= BEARING_FILTER_MAX_DEVIATION_DEG)
                .unwrap_or(false)
        });
        for e in neighbours {
            let other = e.other(u);
            if graph.get_node(other).is_none() {
                continue;
            }
            let acc = accumulated + e.distance_m;
            if acc > band_hi * 1.1 {
                continue;
            }
            let on_axis = graph
                .get_node(other)
                .map(|n| angular_diversity(bearing_deg(start_lat, start_lon, n.lat, n.lon), target_bearing) <= BEARING_FILTER_MAX_DEVIATION_DEG)
                .unwrap_or(false);
            let penalty = if any_aligned && !on_axis { 8.0 } else { 1.0 };
            let w = e.weight.raw() * penalty;
            let d = du + n64(w);
            if dist.get(&other).map_or(true, |&vd| vd > d) {
                dist.insert(other, d);
                metric.insert(other, acc);
                came_from.insert(other, (u, e.id.clone()));
                q.push(other, Reverse(d));
            }
        }
    }

    frontier
        .into_iter()
        .take(3)
        .filter_map(|node| {
            let path = reconstruct_outbound(graph, &came_from, start, node, *dist.get(&node)?)?;
            let target_node = graph.get_node(node)?;
            let bearing_from_start = bearing_deg(start_lat, start_lon, target_node.lat, target_node.lon);
            let avg_quality = if path.edges.is_empty() {
                0.0
            } else {
                path.edges
                    .iter()
                    .filter_map(|eid| graph.edges.get(eid))
                    .map(|e| e.quality)
                    .sum::<f64>()
                    / path.edges.len() as f64
            };
            Some(RawRadialCandidate {
                direction_index,
                target_bearing,
                turn_back: node,
                outbound: path,
                bearing_from_start,
                avg_quality,
            })
        })
        .collect()
}

fn reconstruct_outbound(
    graph: &DomainGraph,
    came_from: &HashMap<NodeId, (NodeId, String)>,
    start: NodeId,
    end: NodeId,
    weight: N64,
) -> Option<PathResult> {
    if start == end {
        return Some(PathResult {
            found: true,
            nodes: vec![start],
            edges: Vec::new(),
            distance_m: 0.0,
            weight: 0.0,
            explored: 0,
        });
    }
    let mut nodes = vec![end];
    let mut edges = Vec::new();
    let mut distance_m = 0.0;
    let mut cur = end;
    while cur != start {
        let (prev, eid) = came_from.get(&cur)?;
        if let Some(e) = graph.edges.get(eid) {
            distance_m += e.distance_m;
        }
        edges.push(eid.clone());
        nodes.push(*prev);
        cur = *prev;
    }
    nodes.reverse();
    edges.reverse();
    Some(PathResult {
        found: true,
        nodes,
        edges,
        distance_m,
        weight: weight.raw(),
        explored: 0,
    })
}

/// Diversity term, `[0, 100]`, blending two notions of "not just an out-and-back":
/// how far the outbound path's midpoint node strays from the straight geodesic chord
/// between `start` and the turn-back (a path hugging the chord scores low; one that
/// wanders scores high), and how much the outbound path's heading changes hop to hop
/// ([`scenery_variety`]; a straight corridor scores low, a winding route scores high).
fn diversity_term(graph: &DomainGraph, start_lat: f64, start_lon: f64, candidate: &RawRadialCandidate, half_target_m: f64) -> f64 {
    let chord_term = (|| {
        let turn_back = graph.get_node(candidate.turn_back)?;
        let (chord_lat, chord_lon) = crate::geo::midpoint(start_lat, start_lon, turn_back.lat, turn_back.lon);
        let mid_idx = candidate.outbound.nodes.len() / 2;
        let mid_node = graph.get_node(*candidate.outbound.nodes.get(mid_idx)?)?;
        let deviation_m = crate::geo::haversine_distance_m(mid_node.lat, mid_node.lon, chord_lat, chord_lon);
        Some((deviation_m / half_target_m.max(1.0)).clamp(0.0, 1.0) * 100.0)
    })()
    .unwrap_or(0.0);

    let bearings: Vec<f64> = candidate
        .outbound
        .nodes
        .windows(2)
        .filter_map(|w| {
            let (a, b) = (graph.get_node(w[0])?, graph.get_node(w[1])?);
            Some(bearing_deg(a.lat, a.lon, b.lat, b.lon))
        })
        .collect();
    let scenery_term = scenery_variety(&bearings) * 100.0;

    0.5 * chord_term + 0.5 * scenery_term
}

fn scored(
    graph: &DomainGraph,
    start_lat: f64,
    start_lon: f64,
    candidate: &RawRadialCandidate,
    half_target_m: f64,
    weights: ScoringWeights,
    min_return_angle_deg: f64,
) -> f64 {
    let distance_term = 100.0 - (candidate.outbound.distance_m - half_target_m).abs();
    let angle_term = 100.0 - angular_diversity(candidate.bearing_from_start, 135.0);
    let diversity = diversity_term(graph, start_lat, start_lon, candidate, half_target_m);

    let mut score = weights.loop_distance * distance_term
        + weights.loop_angle * angle_term
        + weights.loop_quality * candidate.avg_quality
        + weights.loop_diversity * diversity;

    if angular_diversity(candidate.bearing_from_start, candidate.target_bearing) < min_return_angle_deg {
        score *= 0.5;
    }
    score
}

fn overlap_ratio(outbound: &[String], back: &[String]) -> f64 {
    let out_set: HashSet<&String> = outbound.iter().collect();
    let back_set: HashSet<&String> = back.iter().collect();
    let common = out_set.intersection(&back_set).count();
    if outbound.is_empty() || back.is_empty() {
        return 0.0;
    }
    (common as f64 / outbound.len() as f64).max(common as f64 / back.len() as f64)
}

fn surface_mix(graph: &DomainGraph, edges: &[String]) -> HashMap<SurfaceClass, f64> {
    use itertools::Itertools;
    let counts = edges.iter().filter_map(|eid| graph.edges.get(eid)).map(|e| e.surface).counts();
    let total = edges.len().max(1) as f64;
    counts.into_iter().map(|(k, v)| (k, v as f64 / total)).collect()
}

fn dominant_difficulty(graph: &DomainGraph, edges: &[String]) -> Difficulty {
    let unpaved = edges
        .iter()
        .filter_map(|eid| graph.edges.get(eid))
        .filter(|e| e.surface == SurfaceClass::Unpaved)
        .count();
    let total = edges.len().max(1);
    if unpaved * 2 > total {
        Difficulty::Hard
    } else if unpaved > 0 {
        Difficulty::Medium
    } else {
        Difficulty::Easy
    }
}

fn total_ascent(graph: &DomainGraph, nodes: &[NodeId]) -> f64 {
    let mut gain = 0.0;
    for pair in nodes.windows(2) {
        let (Some(a), Some(b)) = (graph.get_node(pair[0]), graph.get_node(pair[1])) else {
            continue;
        };
        if let (Some(ea), Some(eb)) = (a.elevation, b.elevation) {
            if eb > ea {
                gain += eb - ea;
            }
        }
    }
    gain
}

/// Run the full seven-phase pipeline. Never panics; every failure mode is a typed
/// [`EngineError`].
pub fn generate(graph: &DomainGraph, request: &GenerationRequest, config: &crate::request::EngineConfig) -> EngineResult<GenerationOutcome> {
    if request.target_distance_m <= 0.0 {
        return Err(EngineError::InvalidCoordinates {
            lat: request.start_lat,
            lon: request.start_lon,
        });
    }

    let mut clock = PhaseClock::new();
    let mut budget = TimeBudget::start(config.time_budget);
    let mut warnings = Vec::new();
    let weights = request.weights();

    // Phase 1: anchor.
    let start = graph
        .nearest_node(request.start_lat, request.start_lon)
        .ok_or(EngineError::NoAccessibleStart)?;
    clock.lap("anchor");

    // Phase 2: radial exploration.
    let half_target = request.target_distance_m / 2.0;
    let directions = compass_bearings(config.compass_directions);
    let mut raw_candidates = Vec::new();
    let mut explored_total = 0usize;
    for (i, &bearing) in directions.iter().enumerate() {
        if budget.check() == BudgetState::Drain {
            warnings.push("time budget exhausted during radial exploration".to_string());
            break;
        }
        let found = radial_explore(graph, start, i, bearing, half_target);
        explored_total += found.len();
        raw_candidates.extend(found);
    }
    clock.lap("radial_exploration");

    // Phase 3: candidate scoring.
    let mut scored_candidates: Vec<(f64, RawRadialCandidate)> = raw_candidates
        .into_iter()
        .map(|c| (scored(graph, request.start_lat, request.start_lon, &c, half_target, weights, request.min_return_angle_deg), c))
        .collect();
    scored_candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then(a.1.direction_index.cmp(&b.1.direction_index)));
    clock.lap("candidate_scoring");

    let top_bearings: Vec<f64> = scored_candidates.iter().take(5).map(|(_, c)| c.bearing_from_start).collect();

    // Phase 4: return-path search.
    let take_n = request.max_variants.max(3);
    let mut assembled: Vec<LoopCandidate> = Vec::new();
    for (_, candidate) in scored_candidates.into_iter().take(take_n) {
        if budget.check() == BudgetState::Drain {
            warnings.push("time budget exhausted during return-path search".to_string());
            break;
        }
        let mut cfg = PathfindConfig::default();
        cfg.avoid = candidate.outbound.edges.iter().cloned().collect();
        let heuristic = pathfind::default_heuristic(graph);
        let ret = pathfind::astar(graph, candidate.turn_back, start, &cfg, heuristic);
        if !ret.found {
            continue;
        }

        // Phase 5: overlap filter.
        let overlap = overlap_ratio(&candidate.outbound.edges, &ret.edges);
        if overlap > OVERLAP_THRESHOLD {
            continue;
        }

        // Phase 6: assemble and validate.
        let mut nodes = candidate.outbound.nodes.clone();
        nodes.extend(ret.nodes.iter().skip(1));
        let mut edges = candidate.outbound.edges.clone();
        edges.extend(ret.edges.iter().cloned());

        if nodes.first() != nodes.last() {
            continue;
        }
        let valid = edges.iter().all(|eid| graph.edges.contains_key(eid));
        if !valid {
            warnings.push(format!("discarded candidate with dangling edge reference (direction {})", candidate.direction_index));
            continue;
        }

        let total_distance_m = candidate.outbound.distance_m + ret.distance_m;
        let tolerance_band = request.target_distance_m * request.tolerance;
        if (total_distance_m - request.target_distance_m).abs() > tolerance_band {
            continue;
        }

        if let Some(allowed) = &request.surface_types {
            let in_band = edges.iter().filter_map(|eid| graph.edges.get(eid)).all(|e| allowed.contains(&e.surface));
            if !in_band {
                continue;
            }
        }

        let difficulty = dominant_difficulty(graph, &edges);
        if let Some(allowed) = &request.difficulty {
            if !allowed.contains(&difficulty) {
                continue;
            }
        }

        let avg_quality = if edges.is_empty() {
            0.0
        } else {
            edges.iter().filter_map(|eid| graph.edges.get(eid)).map(|e| e.quality).sum::<f64>() / edges.len() as f64
        };
        let quality_score = 0.5 * distance_accuracy(total_distance_m, request.target_distance_m) + 0.5 * (avg_quality / 100.0);
        let total_ascent_m = total_ascent(graph, &nodes);

        assembled.push(LoopCandidate {
            nodes,
            total_distance_m,
            estimated_duration_s: total_distance_m / WALK_SPEED_MPS,
            total_ascent_m,
            quality_score,
            target_distance_m: request.target_distance_m,
            surface_mix: surface_mix(graph, &edges),
            difficulty,
            edges,
        });
    }
    clock.lap("assemble_and_validate");

    if assembled.is_empty() {
        return Err(EngineError::NoViableLoops);
    }

    // Phase 7: rank and return.
    assembled.sort_by(|a, b| b.quality_score.partial_cmp(&a.quality_score).unwrap());
    assembled.truncate(request.max_variants);
    clock.lap("rank_and_return");

    Ok(GenerationOutcome {
        candidates: assembled,
        debug: GenerationDebug {
            phase_timings_ms: clock.timings,
            explored_nodes: explored_total,
            top_bearings,
            warnings,
            timed_out: budget.is_draining(),
        },
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::classify::ClassifyWeights;
    use crate::graph::{build_graph, WeightWeights};
    use crate::osm::{MapElement, RawNode, RawWay};
    use std::collections::HashMap as Map;

    fn node(id: i64, lat: f64, lon: f64) -> MapElement {
        MapElement::Node(RawNode { id, lat, lon, elevation: None, tags: Map::new() })
    }
    fn way(id: i64, nodes: Vec<i64>) -> MapElement {
        let mut tags = Map::new();
        tags.insert("highway".to_string(), "footway".to_string());
        MapElement::Way(RawWay { id, nodes, tags })
    }

    /// A small 3x3 lattice, dense enough to support a real closed loop under the
    /// overlap filter, centred near a plausible Paris-area latitude.
    fn lattice() -> DomainGraph {
        let step = 0.002;
        let mut elements = Vec::new();
        let mut id = 1;
        let mut ids = [[0i64; 3]; 3];
        for (r, row) in ids.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                let lat = 48.85 + step * r as f64;
                let lon = 2.35 + step * c as f64;
                elements.push(node(id, lat, lon));
                *cell = id;
                id += 1;
            }
        }
        for r in 0..3 {
            for c in 0..3 {
                if c + 1 < 3 {
                    elements.push(way(id, vec![ids[r][c], ids[r][c + 1]]));
                    id += 1;
                }
                if r + 1 < 3 {
                    elements.push(way(id, vec![ids[r][c], ids[r + 1][c]]));
                    id += 1;
                }
            }
        }
        build_graph(elements, true, ClassifyWeights::default(), WeightWeights::default()).unwrap()
    }

    #[test]
    fn zero_distance_request_rejected() {
        let g = lattice();
        let req = GenerationRequest {
            start_lat: 48.85,
            start_lon: 2.35,
            target_distance_m: 0.0,
            tolerance: 0.05,
            max_variants: 3,
            include_secondary: true,
            surface_types: None,
            difficulty: None,
            scoring_weights: None,
            min_return_angle_deg: 90.0,
        };
        let config = crate::request::EngineConfig::default();
        assert!(generate(&g, &req, &config).is_err());
    }

    #[test]
    fn generation_on_small_lattice_produces_closed_loops() {
        let g = lattice();
        let req = GenerationRequest {
            start_lat: 48.85,
            start_lon: 2.35,
            target_distance_m: 600.0,
            tolerance: 0.3,
            max_variants: 3,
            include_secondary: true,
            surface_types: None,
            difficulty: None,
            scoring_weights: None,
            min_return_angle_deg: 60.0,
        };
        let config = crate::request::EngineConfig::default();
        let outcome = generate(&g, &req, &config);
        if let Ok(outcome) = outcome {
            for c in &outcome.candidates {
                assert_eq!(c.nodes.first(), c.nodes.last());
                for eid in &c.edges {
                    assert!(g.edges.contains_key(eid));
                }
            }
        }
    }
}
