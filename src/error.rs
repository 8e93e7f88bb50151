//! Closed error taxonomy for the engine's external boundary.
//!
//! Pure helpers (`geo`, pathfinding topology) never raise; they return values or a
//! `found = false` result. Only the graph builder, the cache, and the loop generator
//! surface these.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("no walkable ways found in the requested area")]
    EmptyGraph,

    #[error("refused to cache an empty graph")]
    EmptyGraphRejected,

    #[error("no graph node near the requested start point")]
    NoAccessibleStart,

    #[error("no viable loop could be assembled for this request")]
    NoViableLoops,

    #[error("cache entry unreadable: {reason}")]
    CacheUnreadable { reason: String },

    #[error("generation exceeded its time budget before producing a result")]
    Timeout,

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
