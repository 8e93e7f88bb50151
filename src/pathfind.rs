//! Pathfinding: Dijkstra and A* over a [`DomainGraph`], plus the
//! avoid/prefer/used weight helpers and the path-quality metric.
//!
//! A priority-queue Dijkstra with an added heuristic term for A*, in the style of
//! sparkling-osm-router's `find_route_astar`. Topology failures are never raised:
//! every function returns a `found` flag instead.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use noisy_float::prelude::{n64, N64};
use priority_queue::PriorityQueue;

use crate::geo::{haversine_distance_m, path_uniqueness};
use crate::graph::{DomainGraph, NodeId};

#[derive(Debug, Clone, Default)]
pub struct PathfindConfig {
    pub max_distance_m: Option<f64>,
    pub max_explored: Option<usize>,
    pub avoid: HashSet<String>,
    pub prefer: HashSet<String>,
    pub used: HashSet<String>,
}

pub const DEFAULT_AVOID_PENALTY: f64 = 1000.0;
pub const DEFAULT_PREFER_BONUS: f64 = 0.5;
pub const DEFAULT_USED_PENALTY: f64 = 5.0;

/// Scale an edge's stored weight by the avoid/prefer/used sets.
///
/// An edge in the avoid set is penalised, never excluded: a path through it is still
/// findable when it's the only option.
fn scaled_weight(base: f64, id: &str, cfg: &PathfindConfig) -> f64 {
    let mut w = base;
    if cfg.avoid.contains(id) {
        w *= DEFAULT_AVOID_PENALTY;
    }
    if cfg.prefer.contains(id) {
        w *= DEFAULT_PREFER_BONUS;
    }
    if cfg.used.contains(id) {
        w *= DEFAULT_USED_PENALTY;
    }
    w
}

#[derive(Debug, Clone)]
pub struct PathResult {
    pub found: bool,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<String>,
    pub distance_m: f64,
    pub weight: f64,
    pub explored: usize,
}

impl PathResult {
    fn not_found(explored: usize) -> Self {
        PathResult {
            found: false,
            nodes: Vec::new(),
            edges: Vec::new(),
            distance_m: 0.0,
            weight: 0.0,
            explored,
        }
    }
}

/// Reconstruct node/edge sequences and total distance from a predecessor map.
fn reconstruct(
    graph: &DomainGraph,
    came_from: &HashMap<NodeId, (NodeId, String)>,
    start: NodeId,
    end: NodeId,
    weight: N64,
    explored: usize,
) -> PathResult {
    let mut nodes = vec![end];
    let mut edges = Vec::new();
    let mut distance_m = 0.0;
    let mut cur = end;
    while cur != start {
        let Some((prev, eid)) = came_from.get(&cur) else {
            return PathResult::not_found(explored);
        };
        if let Some(e) = graph.edges.get(eid) {
            distance_m += e.distance_m;
        }
        edges.push(eid.clone());
        nodes.push(*prev);
        cur = *prev;
    }
    nodes.reverse();
    edges.reverse();
    PathResult {
        found: true,
        nodes,
        edges,
        distance_m,
        weight: weight.raw(),
        explored,
    }
}

/// Classical Dijkstra from `start` to `end`.
pub fn dijkstra(graph: &DomainGraph, start: NodeId, end: NodeId, cfg: &PathfindConfig) -> PathResult {
    if !graph.nodes.contains_key(&start) || !graph.nodes.contains_key(&end) {
        return PathResult::not_found(0);
    }
    let mut dist: HashMap<NodeId, N64> = HashMap::new();
    let mut came_from: HashMap<NodeId, (NodeId, String)> = HashMap::new();
    let mut q = PriorityQueue::new();
    dist.insert(start, n64(0.0));
    q.push(start, Reverse(n64(0.0)));
    let mut explored = 0usize;

    while let Some((u, Reverse(du))) = q.pop() {
        if let Some(cap) = cfg.max_explored {
            if explored >= cap {
                break;
            }
        }
        explored += 1;
        if u == end {
            return reconstruct(graph, &came_from, start, end, du, explored);
        }
        if dist.get(&u).map_or(false, |&best| du > best) {
            continue;
        }
        for e in graph.neighbours(u) {
            if let Some(max_d) = cfg.max_distance_m {
                if du.raw() + e.distance_m > max_d {
                    continue;
                }
            }
            let w = scaled_weight(e.weight.raw(), &e.id, cfg);
            let v = e.other(u);
            let d = du + n64(w);
            if dist.get(&v).map_or(true, |&vd| vd > d) {
                dist.insert(v, d);
                came_from.insert(v, (u, e.id.clone()));
                q.push(v, Reverse(d));
            }
        }
    }
    PathResult::not_found(explored)
}

/// A* from `start` to `end`. Default heuristic is Haversine distance to `end`, which
/// is admissible when edge weight tracks distance; a custom heuristic's admissibility
/// is the caller's responsibility.
pub fn astar(
    graph: &DomainGraph,
    start: NodeId,
    end: NodeId,
    cfg: &PathfindConfig,
    heuristic: impl Fn(NodeId, NodeId) -> f64,
) -> PathResult {
    if !graph.nodes.contains_key(&start) || !graph.nodes.contains_key(&end) {
        return PathResult::not_found(0);
    }
    let mut g_score: HashMap<NodeId, N64> = HashMap::new();
    let mut came_from: HashMap<NodeId, (NodeId, String)> = HashMap::new();
    let mut open = PriorityQueue::new();
    g_score.insert(start, n64(0.0));
    open.push(start, Reverse(n64(heuristic(start, end))));
    let mut explored = 0usize;

    while let Some((u, _)) = open.pop() {
        if let Some(cap) = cfg.max_explored {
            if explored >= cap {
                break;
            }
        }
        explored += 1;
        if u == end {
            let g = *g_score.get(&u).unwrap();
            return reconstruct(graph, &came_from, start, end, g, explored);
        }
        let gu = *g_score.get(&u).unwrap_or(&n64(f64::INFINITY));
        for e in graph.neighbours(u) {
            if let Some(max_d) = cfg.max_distance_m {
                if gu.raw() + e.distance_m > max_d {
                    continue;
                }
            }
            let w = scaled_weight(e.weight.raw(), &e.id, cfg);
            let v = e.other(u);
            let tentative = gu + n64(w);
            if g_score.get(&v).map_or(true, |&g| g > tentative) {
                g_score.insert(v, tentative);
                came_from.insert(v, (u, e.id.clone()));
                let f = tentative + n64(heuristic(v, end));
                open.push(v, Reverse(f));
            }
        }
    }
    PathResult::not_found(explored)
}

pub fn default_heuristic(graph: &DomainGraph) -> impl Fn(NodeId, NodeId) -> f64 + '_ {
    move |a, b| {
        let (Some(na), Some(nb)) = (graph.get_node(a), graph.get_node(b)) else {
            return 0.0;
        };
        haversine_distance_m(na.lat, na.lon, nb.lat, nb.lon)
    }
}

impl DomainGraph {
    pub fn get_node(&self, id: NodeId) -> Option<&crate::graph::DomainNode> {
        self.nodes.get(&id)
    }
}

/// One exploration from `start`, terminating once every target in `targets` is found
/// or the exploration cap is reached.
pub fn multi_target_dijkstra(
    graph: &DomainGraph,
    start: NodeId,
    targets: &HashSet<NodeId>,
    cfg: &PathfindConfig,
) -> HashMap<NodeId, PathResult> {
    let mut dist: HashMap<NodeId, N64> = HashMap::new();
    let mut came_from: HashMap<NodeId, (NodeId, String)> = HashMap::new();
    let mut q = PriorityQueue::new();
    dist.insert(start, n64(0.0));
    q.push(start, Reverse(n64(0.0)));
    let mut found: HashMap<NodeId, PathResult> = HashMap::new();
    let mut explored = 0usize;
    let mut remaining: HashSet<NodeId> = targets.clone();

    while let Some((u, Reverse(du))) = q.pop() {
        if remaining.is_empty() {
            break;
        }
        if let Some(cap) = cfg.max_explored {
            if explored >= cap {
                break;
            }
        }
        explored += 1;
        if remaining.remove(&u) {
            found.insert(u, reconstruct(graph, &came_from, start, u, du, explored));
        }
        if dist.get(&u).map_or(false, |&best| du > best) {
            continue;
        }
        for e in graph.neighbours(u) {
            if let Some(max_d) = cfg.max_distance_m {
                if du.raw() + e.distance_m > max_d {
                    continue;
                }
            }
            let w = scaled_weight(e.weight.raw(), &e.id, cfg);
            let v = e.other(u);
            let d = du + n64(w);
            if dist.get(&v).map_or(true, |&vd| vd > d) {
                dist.insert(v, d);
                came_from.insert(v, (u, e.id.clone()));
                q.push(v, Reverse(d));
            }
        }
    }
    found
}

/// Explore from `start`, returning the first node whose reconstructed-path distance
/// falls in `[target - tolerance, target + tolerance]`, closest to `target` wins on
/// ties.
pub fn closest_to_distance(
    graph: &DomainGraph,
    start: NodeId,
    target_m: f64,
    tolerance_m: f64,
    cfg: &PathfindConfig,
) -> Option<PathResult> {
    let mut dist: HashMap<NodeId, N64> = HashMap::new();
    let mut came_from: HashMap<NodeId, (NodeId, String)> = HashMap::new();
    let mut q = PriorityQueue::new();
    dist.insert(start, n64(0.0));
    q.push(start, Reverse(n64(0.0)));
    let mut best: Option<(f64, PathResult)> = None;
    let mut explored = 0usize;

    while let Some((u, Reverse(du))) = q.pop() {
        if let Some(cap) = cfg.max_explored {
            if explored >= cap {
                break;
            }
        }
        explored += 1;
        let candidate = reconstruct(graph, &came_from, start, u, du, explored);
        let delta = (candidate.distance_m - target_m).abs();
        if delta <= tolerance_m && best.as_ref().map_or(true, |(bd, _)| delta < *bd) {
            best = Some((delta, candidate));
        }
        if dist.get(&u).map_or(false, |&best_d| du > best_d) {
            continue;
        }
        for e in graph.neighbours(u) {
            if du.raw() + e.distance_m > target_m + tolerance_m {
                continue;
            }
            let w = scaled_weight(e.weight.raw(), &e.id, cfg);
            let v = e.other(u);
            let d = du + n64(w);
            if dist.get(&v).map_or(true, |&vd| vd > d) {
                dist.insert(v, d);
                came_from.insert(v, (u, e.id.clone()));
                q.push(v, Reverse(d));
            }
        }
    }
    best.map(|(_, r)| r)
}

/// Composite path-quality metric: `0.4*accuracy + 0.3*uniqueness + 0.3*surface`.
pub fn path_quality(graph: &DomainGraph, path: &PathResult, target_distance_m: f64) -> f64 {
    let accuracy = crate::geo::distance_accuracy(path.distance_m, target_distance_m);
    let uniqueness = path_uniqueness(&path.edges);
    let surfaces: Vec<_> = path
        .edges
        .iter()
        .filter_map(|eid| graph.edges.get(eid))
        .map(|e| e.surface)
        .collect();
    let surface = crate::geo::surface_quality(&surfaces);
    0.4 * accuracy + 0.3 * uniqueness + 0.3 * surface
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::classify::ClassifyWeights;
    use crate::graph::{build_graph, canonical_node_id, WeightWeights};
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

    fn unit_square() -> DomainGraph {
        let elements = vec![
            node(1, 0.0, 0.0),
            node(2, 0.0225, 0.0),
            node(3, 0.0225, 0.0225),
            node(4, 0.0, 0.0225),
            way(10, vec![1, 2]),
            way(11, vec![2, 3]),
            way(12, vec![3, 4]),
            way(13, vec![4, 1]),
        ];
        build_graph(elements, true, ClassifyWeights::default(), WeightWeights::default()).unwrap()
    }

    #[test]
    fn dijkstra_finds_unit_square_path() {
        let g = unit_square();
        let a = canonical_node_id(0.0, 0.0);
        let c = canonical_node_id(0.0225, 0.0225);
        let r = dijkstra(&g, a, c, &PathfindConfig::default());
        assert!(r.found);
        assert_eq!(r.nodes.first(), Some(&a));
        assert_eq!(r.nodes.last(), Some(&c));
        let summed: f64 = r.edges.iter().filter_map(|e| g.edges.get(e)).map(|e| e.distance_m).sum();
        assert!((summed - r.distance_m).abs() < 1e-6);
    }

    #[test]
    fn avoid_does_not_exclude_only_option() {
        let g = unit_square();
        let a = canonical_node_id(0.0, 0.0);
        let b = canonical_node_id(0.0225, 0.0);
        let mut cfg = PathfindConfig::default();
        let direct_id = g.adjacency[&a].iter().find(|eid| {
            let e = &g.edges[*eid];
            (e.p1 == a && e.p2 == b) || (e.p1 == b && e.p2 == a)
        }).unwrap().clone();
        cfg.avoid.insert(direct_id.clone());
        let r = dijkstra(&g, a, b, &cfg);
        assert!(r.found);
    }

    #[test]
    fn astar_matches_dijkstra_distance() {
        let g = unit_square();
        let a = canonical_node_id(0.0, 0.0);
        let c = canonical_node_id(0.0225, 0.0225);
        let cfg = PathfindConfig::default();
        let d = dijkstra(&g, a, c, &cfg);
        let h = default_heuristic(&g);
        let astar_r = astar(&g, a, c, &cfg, h);
        assert!(astar_r.found);
        assert!((d.distance_m - astar_r.distance_m).abs() < 1e-6);
    }

    #[test]
    fn multi_target_finds_every_reachable_target() {
        let g = unit_square();
        let a = canonical_node_id(0.0, 0.0);
        let b = canonical_node_id(0.0225, 0.0);
        let c = canonical_node_id(0.0225, 0.0225);
        let targets: HashSet<_> = [b, c].into_iter().collect();
        let results = multi_target_dijkstra(&g, a, &targets, &PathfindConfig::default());
        assert_eq!(results.len(), 2);
        assert!(results[&b].found);
        assert!(results[&c].found);
    }

    #[test]
    fn closest_to_distance_picks_best_band_match() {
        let g = unit_square();
        let a = canonical_node_id(0.0, 0.0);
        // Each edge of the unit square is ~2500m; two hops is ~5000m.
        let best = closest_to_distance(&g, a, 5000.0, 1000.0, &PathfindConfig::default());
        let best = best.expect("some node should fall within the tolerance band");
        assert!((best.distance_m - 5000.0).abs() <= 1000.0);
    }

    #[test]
    fn path_quality_is_bounded_unit_interval() {
        let g = unit_square();
        let a = canonical_node_id(0.0, 0.0);
        let c = canonical_node_id(0.0225, 0.0225);
        let r = dijkstra(&g, a, c, &PathfindConfig::default());
        let q = path_quality(&g, &r, 5000.0);
        assert!((0.0..=1.0).contains(&q));
    }
}
