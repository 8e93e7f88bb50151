//! Route-loop generation engine: ingest OSM map elements into a weighted,
//! walkability-filtered graph, cache it on disk, and search it for closed-loop
//! walking/running routes of a requested length.

pub mod budget;
pub mod cache;
pub mod classify;
pub mod error;
pub mod geo;
pub mod graph;
pub mod loopgen;
pub mod osm;
pub mod pathfind;
pub mod request;

pub use error::{EngineError, EngineResult};
