//! On-disk graph cache.
//!
//! Keyed by a deterministic hash of (lat, lon, radius) at fixed precision. Uses the
//! same plain `serde_json` file read/write idiom as this crate's CLI entry point; the
//! read-through shape (miss on corrupt/partial/stale) follows aaru's `CacheMap`
//! pattern, adapted to disk instead of an in-process map.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::graph::DomainGraph;

pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheArea {
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
}

impl CacheArea {
    fn key(&self) -> String {
        let lat = (self.lat * 1_000_000.0).round() as i64;
        let lon = (self.lon * 1_000_000.0).round() as i64;
        let radius = (self.radius_m * 100.0).round() as i64;
        let mut hasher = DefaultHasher::new();
        (lat, lon, radius).hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    area_lat: f64,
    area_lon: f64,
    area_radius_m: f64,
    graph: DomainGraph,
    osm_data_version: String,
    created_at: DateTime<Utc>,
    nodes_count: usize,
    edges_count: usize,
}

pub struct GraphCache {
    dir: PathBuf,
    ttl: Duration,
}

impl GraphCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        GraphCache { dir: dir.into(), ttl }
    }

    fn path_for(&self, area: &CacheArea) -> PathBuf {
        self.dir.join(format!("osm-{}.json", area.key()))
    }

    /// Persist `graph` under `area`'s key. Rejects empty graphs outright; the cache
    /// never holds an envelope a reader would have to second-guess.
    pub fn write(&self, area: CacheArea, graph: &DomainGraph, osm_data_version: &str) -> EngineResult<()> {
        if graph.nodes.is_empty() || graph.edges.is_empty() {
            return Err(EngineError::EmptyGraphRejected);
        }
        fs::create_dir_all(&self.dir).map_err(|e| EngineError::CacheUnreadable { reason: e.to_string() })?;
        let envelope = Envelope {
            area_lat: area.lat,
            area_lon: area.lon,
            area_radius_m: area.radius_m,
            graph: graph.clone(),
            osm_data_version: osm_data_version.to_string(),
            created_at: Utc::now(),
            nodes_count: graph.nodes.len(),
            edges_count: graph.edges.len(),
        };
        let path = self.path_for(&area);
        let tmp_path = path.with_extension("json.tmp");
        let file = fs::File::create(&tmp_path).map_err(|e| EngineError::CacheUnreadable { reason: e.to_string() })?;
        serde_json::to_writer(file, &envelope).map_err(|e| EngineError::CacheUnreadable { reason: e.to_string() })?;
        fs::rename(&tmp_path, &path).map_err(|e| EngineError::CacheUnreadable { reason: e.to_string() })?;
        log::debug!("cached graph for area {:?} at {}", area, path.display());
        Ok(())
    }

    /// Read back a graph for `area`. Returns `None`, not an error, on a cache miss, a
    /// stale entry, a zero-count entry, or a malformed file: all of those mean the
    /// caller should rebuild.
    pub fn read(&self, area: CacheArea) -> Option<DomainGraph> {
        let path = self.path_for(&area);
        let bytes = fs::read(&path).ok()?;
        let envelope: Envelope = serde_json::from_slice(&bytes).ok()?;
        if envelope.nodes_count == 0 || envelope.edges_count == 0 {
            return None;
        }
        let age = Utc::now().signed_duration_since(envelope.created_at);
        if age.to_std().map(|a| a > self.ttl).unwrap_or(true) {
            return None;
        }
        Some(envelope.graph)
    }

    /// Delete every entry older than the configured TTL; returns the count removed.
    pub fn sweep(&self) -> EngineResult<usize> {
        let mut removed = 0usize;
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Ok(0),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let is_stale = fs::read(&path)
                .ok()
                .and_then(|b| serde_json::from_slice::<Envelope>(&b).ok())
                .map(|env| {
                    Utc::now()
                        .signed_duration_since(env.created_at)
                        .to_std()
                        .map(|a| a > self.ttl)
                        .unwrap_or(true)
                })
                .unwrap_or(true);
            if is_stale {
                if fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Entry count, total byte size, and summed covered-area across the cache
    /// directory (area per entry via [`crate::geo::BoundingBox::area_m2`]).
    pub fn stats(&self) -> EngineResult<CacheStats> {
        let mut entries = 0usize;
        let mut bytes = 0u64;
        let mut total_area_m2 = 0.0;
        if let Ok(dir) = fs::read_dir(&self.dir) {
            for entry in dir.flatten() {
                if let Ok(meta) = entry.metadata() {
                    if meta.is_file() {
                        entries += 1;
                        bytes += meta.len();
                        if let Ok(contents) = fs::read(entry.path()) {
                            if let Ok(envelope) = serde_json::from_slice::<Envelope>(&contents) {
                                total_area_m2 += envelope.graph.bbox.area_m2();
                            }
                        }
                    }
                }
            }
        }
        Ok(CacheStats { entries, bytes, total_area_m2 })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub total_area_m2: f64,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::classify::ClassifyWeights;
    use crate::graph::{build_graph, WeightWeights};
    use crate::osm::{MapElement, RawNode, RawWay};
    use std::collections::HashMap;

    fn sample_graph() -> DomainGraph {
        let mut tags = HashMap::new();
        tags.insert("highway".to_string(), "footway".to_string());
        let elements = vec![
            MapElement::Node(RawNode { id: 1, lat: 0.0, lon: 0.0, elevation: None, tags: HashMap::new() }),
            MapElement::Node(RawNode { id: 2, lat: 0.001, lon: 0.0, elevation: None, tags: HashMap::new() }),
            MapElement::Way(RawWay { id: 10, nodes: vec![1, 2], tags }),
        ];
        build_graph(elements, true, ClassifyWeights::default(), WeightWeights::default()).unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(tmp.path(), DEFAULT_TTL);
        let area = CacheArea { lat: 48.8566, lon: 2.3522, radius_m: 500.0 };
        let g = sample_graph();
        cache.write(area, &g, "v1").unwrap();
        let read_back = cache.read(area).unwrap();
        assert_eq!(read_back.nodes.len(), g.nodes.len());
        assert_eq!(read_back.edges.len(), g.edges.len());
    }

    #[test]
    fn write_rejects_empty_graph() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(tmp.path(), DEFAULT_TTL);
        let empty = DomainGraph {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            adjacency: HashMap::new(),
            bbox: crate::geo::BoundingBox { north: 0.0, south: 0.0, east: 0.0, west: 0.0 },
            metadata: crate::graph::GraphMetadata { node_count: 0, edge_count: 0, source_element_count: 0 },
        };
        let area = CacheArea { lat: 0.0, lon: 0.0, radius_m: 100.0 };
        let err = cache.write(area, &empty, "v1").unwrap_err();
        assert_eq!(err, EngineError::EmptyGraphRejected);
        assert!(cache.read(area).is_none());
    }

    #[test]
    fn read_returns_none_on_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(tmp.path(), DEFAULT_TTL);
        let area = CacheArea { lat: 1.0, lon: 1.0, radius_m: 100.0 };
        assert!(cache.read(area).is_none());
    }

    #[test]
    fn stale_entry_treated_as_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(tmp.path(), Duration::from_secs(0));
        let area = CacheArea { lat: 2.0, lon: 2.0, radius_m: 100.0 };
        let g = sample_graph();
        cache.write(area, &g, "v1").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.read(area).is_none());
    }

    #[test]
    fn sweep_removes_stale_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(tmp.path(), Duration::from_secs(0));
        let area = CacheArea { lat: 3.0, lon: 3.0, radius_m: 100.0 };
        cache.write(area, &sample_graph(), "v1").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let removed = cache.sweep().unwrap();
        assert_eq!(removed, 1);
    }
}
