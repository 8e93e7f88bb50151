//! Raw map-element input types, as they arrive from an OSM extract.
//!
//! These are intentionally thin: a node is an id and a position, a way is an id, an
//! ordered list of node references, and an untyped tag bag. [`crate::classify`] is
//! where tags get parsed into anything typed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type TagBag = HashMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub tags: TagBag,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawWay {
    pub id: i64,
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub tags: TagBag,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MapElement {
    Node(RawNode),
    Way(RawWay),
}
