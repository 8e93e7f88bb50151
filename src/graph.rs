//! Graph engine (generic core) and the domain graph builder.
//!
//! The `Edge` trait keeps a familiar shape for anything with two endpoints; canonical
//! node/edge identities and the actual traversal live in [`DomainGraph`] and
//! `pathfind`, not in a separate generic container.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use noisy_float::prelude::{n64, N64};
use serde::{Deserialize, Serialize};

use crate::classify::{self, ClassifyWeights, SurfaceClass};
use crate::error::{EngineError, EngineResult};
use crate::geo::{haversine_distance_m, BoundingBox};
use crate::osm::MapElement;

/// An edge of a graph.
///
/// Type Parameters:
/// - `NId`: node id
pub trait Edge<NId: Clone + Copy + Hash + Eq>: Clone + Hash + PartialEq + Eq {
    fn p1(&self) -> NId;
    fn p2(&self) -> NId;
    fn directed(&self) -> bool {
        false
    }
    fn is_cyclic(&self) -> bool {
        self.p1() == self.p2()
    }
    /// Assuming `id` is one end of the edge, what is the other end.
    fn other(&self, id: NId) -> NId {
        if id == self.p1() {
            self.p2()
        } else {
            self.p1()
        }
    }
}

/// Canonical node id: six-decimal rounded (lat, lon) packed into a single integer, so
/// the same coordinate from two different ways collapses to one vertex. Packed
/// (rather than a tuple) so it serializes as a plain JSON map key.
pub type NodeId = i64;

const LON_SHIFT: i64 = 1_000_000_000;

pub fn canonical_node_id(lat: f64, lon: f64) -> NodeId {
    let lat_i = (lat * 1_000_000.0).round() as i64;
    let lon_i = (lon * 1_000_000.0).round() as i64;
    lat_i * LON_SHIFT + lon_i
}

/// Canonical edge id: a stable ordering of its two endpoints so `(a, b)` and `(b, a)`
/// produce the same identifier string.
pub fn canonical_edge_id(a: NodeId, b: NodeId) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}_{hi}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainNode {
    pub id: NodeId,
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainEdge {
    pub id: String,
    pub p1: NodeId,
    pub p2: NodeId,
    pub distance_m: f64,
    pub surface: SurfaceClass,
    pub highway: String,
    pub quality: f64,
    pub way_id: i64,
    pub weight: N64,
}

impl Eq for DomainEdge {}
impl Hash for DomainEdge {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Edge<NodeId> for DomainEdge {
    fn p1(&self) -> NodeId {
        self.p1
    }
    fn p2(&self) -> NodeId {
        self.p2
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GraphMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    pub source_element_count: usize,
}

/// The built, immutable, walkability-filtered road graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainGraph {
    pub nodes: HashMap<NodeId, DomainNode>,
    pub edges: HashMap<String, DomainEdge>,
    pub adjacency: HashMap<NodeId, HashSet<String>>,
    pub bbox: BoundingBox,
    pub metadata: GraphMetadata,
}

impl DomainGraph {
    pub fn neighbours(&self, id: NodeId) -> impl Iterator<Item = &DomainEdge> {
        self.adjacency
            .get(&id)
            .into_iter()
            .flat_map(move |ids| ids.iter().filter_map(move |eid| self.edges.get(eid)))
    }

    /// Closest node to a requested coordinate. Used by the loop generator to anchor
    /// its start (the REDESIGN FLAG: never the first node inserted).
    pub fn nearest_node(&self, lat: f64, lon: f64) -> Option<NodeId> {
        self.nodes
            .values()
            .min_by(|a, b| {
                let da = haversine_distance_m(lat, lon, a.lat, a.lon);
                let db = haversine_distance_m(lat, lon, b.lat, b.lon);
                da.partial_cmp(&db).unwrap()
            })
            .map(|n| n.id)
    }
}

/// Edge-weight formula defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightWeights {
    pub surface: f64,
    pub safety: f64,
    pub popularity: f64,
}

impl Default for WeightWeights {
    fn default() -> Self {
        WeightWeights {
            surface: 0.2,
            safety: 0.5,
            popularity: 0.1,
        }
    }
}

fn dangerous_highway(highway: &str) -> bool {
    matches!(
        highway,
        "trunk" | "primary" | "secondary" | "tertiary" | "residential"
    )
}

fn popular(tags: &crate::osm::TagBag) -> bool {
    tags.contains_key("name") || tags.contains_key("ref")
}

fn edge_weight(distance_m: f64, surface: SurfaceClass, highway: &str, tags: &crate::osm::TagBag, w: WeightWeights) -> f64 {
    let mut weight = distance_m;
    weight *= match surface {
        SurfaceClass::Paved => 1.0 - w.surface,
        SurfaceClass::Unpaved => 1.0 + w.surface,
        SurfaceClass::Mixed => 1.0,
    };
    if dangerous_highway(highway) {
        weight *= 1.0 + w.safety;
    }
    if popular(tags) {
        weight *= 1.0 - w.popularity;
    }
    weight.max(1.0)
}

/// Build a [`DomainGraph`] from a stream of map elements.
///
/// Fails with [`EngineError::EmptyGraph`] when zero nodes or zero edges were emitted.
pub fn build_graph(
    elements: impl IntoIterator<Item = MapElement>,
    include_secondary: bool,
    classify_weights: ClassifyWeights,
    weight_weights: WeightWeights,
) -> EngineResult<DomainGraph> {
    let mut raw_nodes: HashMap<i64, crate::osm::RawNode> = HashMap::new();
    let mut raw_ways: Vec<crate::osm::RawWay> = Vec::new();
    let mut source_element_count = 0usize;

    for el in elements {
        source_element_count += 1;
        match el {
            MapElement::Node(n) => {
                if !(-90.0..=90.0).contains(&n.lat) || !(-180.0..=180.0).contains(&n.lon) {
                    return Err(EngineError::InvalidCoordinates { lat: n.lat, lon: n.lon });
                }
                raw_nodes.insert(n.id, n);
            }
            MapElement::Way(w) => raw_ways.push(w),
        }
    }

    let mut nodes: HashMap<NodeId, DomainNode> = HashMap::new();
    let mut edges: HashMap<String, DomainEdge> = HashMap::new();
    let mut adjacency: HashMap<NodeId, HashSet<String>> = HashMap::new();

    for way in &raw_ways {
        if !classify::is_walkable(&way.tags, include_secondary) {
            continue;
        }
        let highway = way.tags.get("highway").cloned().unwrap_or_default();
        let resolved: Vec<&crate::osm::RawNode> = way.nodes.iter().filter_map(|nid| raw_nodes.get(nid)).collect();
        if resolved.len() < 2 {
            continue;
        }
        let surface = classify::surface_class(&way.tags);
        let quality = classify::quality_score(&way.tags, &highway, classify_weights);

        for pair in resolved.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let id_a = canonical_node_id(a.lat, a.lon);
            let id_b = canonical_node_id(b.lat, b.lon);
            if id_a == id_b {
                continue;
            }
            nodes.entry(id_a).or_insert_with(|| DomainNode {
                id: id_a,
                lat: a.lat,
                lon: a.lon,
                elevation: a.elevation,
            });
            nodes.entry(id_b).or_insert_with(|| DomainNode {
                id: id_b,
                lat: b.lat,
                lon: b.lon,
                elevation: b.elevation,
            });

            let eid = canonical_edge_id(id_a, id_b);
            edges.entry(eid.clone()).or_insert_with(|| {
                let distance_m = haversine_distance_m(a.lat, a.lon, b.lat, b.lon);
                let weight = edge_weight(distance_m, surface, &highway, &way.tags, weight_weights);
                DomainEdge {
                    id: eid.clone(),
                    p1: id_a,
                    p2: id_b,
                    distance_m,
                    surface,
                    highway: highway.clone(),
                    quality,
                    way_id: way.id,
                    weight: n64(weight),
                }
            });
            adjacency.entry(id_a).or_default().insert(eid.clone());
            adjacency.entry(id_b).or_default().insert(eid);
        }
    }

    if nodes.is_empty() || edges.is_empty() {
        return Err(EngineError::EmptyGraph);
    }

    let points: Vec<(f64, f64)> = nodes.values().map(|n| (n.lat, n.lon)).collect();
    let bbox = BoundingBox::from_points(&points)?;

    let metadata = GraphMetadata {
        node_count: nodes.len(),
        edge_count: edges.len(),
        source_element_count,
    };

    Ok(DomainGraph {
        nodes,
        edges,
        adjacency,
        bbox,
        metadata,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::osm::{MapElement, RawNode, RawWay};

    fn node(id: i64, lat: f64, lon: f64) -> MapElement {
        MapElement::Node(RawNode { id, lat, lon, elevation: None, tags: HashMap::new() })
    }

    fn way(id: i64, nodes: Vec<i64>, highway: &str) -> MapElement {
        let mut tags = HashMap::new();
        tags.insert("highway".to_string(), highway.to_string());
        MapElement::Way(RawWay { id, nodes, tags })
    }

    #[test]
    fn unit_square_graph_has_four_nodes_four_edges() {
        let elements = vec![
            node(1, 0.0, 0.0),
            node(2, 0.0225, 0.0),
            node(3, 0.0225, 0.0225),
            node(4, 0.0, 0.0225),
            way(10, vec![1, 2], "footway"),
            way(11, vec![2, 3], "footway"),
            way(12, vec![3, 4], "footway"),
            way(13, vec![4, 1], "footway"),
        ];
        let g = build_graph(elements, true, ClassifyWeights::default(), WeightWeights::default()).unwrap();
        assert_eq!(g.nodes.len(), 4);
        assert_eq!(g.edges.len(), 4);
        for e in g.edges.values() {
            assert!(!e.way_id.to_string().is_empty());
            assert!(g.nodes.contains_key(&e.p1));
            assert!(g.nodes.contains_key(&e.p2));
        }
    }

    #[test]
    fn motorway_rejected_from_graph() {
        let elements = vec![
            node(1, 0.0, 0.0),
            node(2, 0.001, 0.0),
            node(3, 0.002, 0.0),
            way(10, vec![1, 2], "footway"),
            way(11, vec![1, 2], "motorway"),
            way(12, vec![2, 3], "motorway"),
        ];
        let g = build_graph(elements, true, ClassifyWeights::default(), WeightWeights::default()).unwrap();
        assert!(g.edges.values().all(|e| e.highway != "motorway"));
    }

    #[test]
    fn empty_area_yields_empty_graph_error() {
        let elements = vec![node(1, 0.0, 0.0), node(2, 0.001, 0.0)];
        let err = build_graph(elements, true, ClassifyWeights::default(), WeightWeights::default()).unwrap_err();
        assert_eq!(err, EngineError::EmptyGraph);
    }

    #[test]
    fn nearest_node_anchors_to_closest_not_first() {
        let elements = vec![
            node(1, 10.0, 10.0),
            node(2, 0.0, 0.0),
            node(3, 0.001, 0.001),
            way(10, vec![1, 2], "footway"),
            way(11, vec![2, 3], "footway"),
        ];
        let g = build_graph(elements, true, ClassifyWeights::default(), WeightWeights::default()).unwrap();
        let nearest = g.nearest_node(0.0005, 0.0005).unwrap();
        assert_eq!(nearest, canonical_node_id(0.001, 0.001));
    }
}
