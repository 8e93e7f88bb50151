//! CLI front end for the route-loop generation engine.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use route_loopgen::cache::{CacheArea, GraphCache};
use route_loopgen::classify::ClassifyWeights;
use route_loopgen::graph::{build_graph, WeightWeights};
use route_loopgen::loopgen;
use route_loopgen::osm::MapElement;
use route_loopgen::request::{EngineConfig, GenerationRequest};

#[derive(Parser)]
#[command(name = "route-loopgen", version, about = "Generate closed-loop walking/running routes from OpenStreetMap extracts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build/fetch a graph for a request's area and emit ranked loop candidates.
    Generate {
        /// Path to a JSON array of map elements (nodes and ways).
        #[arg(long)]
        elements: PathBuf,
        #[arg(long)]
        start_lat: f64,
        #[arg(long)]
        start_lon: f64,
        #[arg(long)]
        distance: f64,
        #[arg(long, default_value_t = 5)]
        variants: usize,
        #[arg(long, default_value_t = true)]
        include_secondary: bool,
        #[arg(long, default_value = ".route-loopgen-cache")]
        cache_dir: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Cache maintenance operations.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Stats {
        #[arg(long, default_value = ".route-loopgen-cache")]
        cache_dir: PathBuf,
    },
    Sweep {
        #[arg(long, default_value = ".route-loopgen-cache")]
        cache_dir: PathBuf,
    },
}

fn load_elements(path: &PathBuf) -> anyhow::Result<Vec<MapElement>> {
    let file = File::open(path)?;
    let elements = serde_json::from_reader(BufReader::new(file))?;
    Ok(elements)
}

fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));
    let cli = Cli::parse();

    match cli.command {
        Command::Generate {
            elements,
            start_lat,
            start_lon,
            distance,
            variants,
            include_secondary,
            cache_dir,
            out,
        } => {
            let config = EngineConfig {
                cache_dir: cache_dir.clone(),
                ..EngineConfig::default()
            };
            let request = GenerationRequest {
                start_lat,
                start_lon,
                target_distance_m: distance,
                tolerance: 0.05,
                max_variants: variants,
                include_secondary,
                surface_types: None,
                difficulty: None,
                scoring_weights: None,
                min_return_angle_deg: 90.0,
            };
            let weights = request.weights();
            let classify_weights = ClassifyWeights {
                surface: weights.classify_surface,
                safety: weights.classify_safety,
                popularity: weights.classify_popularity,
            };
            let weight_weights = WeightWeights {
                surface: weights.classify_surface,
                safety: weights.classify_safety,
                popularity: weights.classify_popularity,
            };

            let cache = GraphCache::new(&config.cache_dir, config.cache_ttl);
            let area = CacheArea {
                lat: start_lat,
                lon: start_lon,
                radius_m: distance,
            };

            let graph = match cache.read(area) {
                Some(g) => {
                    log::info!("cache hit for area ({start_lat}, {start_lon})");
                    g
                }
                None => {
                    log::info!("cache miss, building graph from {}", elements.display());
                    let els = load_elements(&elements)?;
                    let g = build_graph(els, include_secondary, classify_weights, weight_weights)?;
                    if let Err(e) = cache.write(area, &g, "cli-ingest") {
                        log::warn!("failed to persist graph to cache: {e}");
                    }
                    g
                }
            };

            let outcome = loopgen::generate(&graph, &request, &config)?;
            let json = serde_json::to_string_pretty(&outcome)?;
            match out {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Command::Cache { action } => match action {
            CacheAction::Stats { cache_dir } => {
                let cache = GraphCache::new(&cache_dir, route_loopgen::cache::DEFAULT_TTL);
                let stats = cache.stats()?;
                println!("entries={} bytes={} total_area_m2={:.1}", stats.entries, stats.bytes, stats.total_area_m2);
            }
            CacheAction::Sweep { cache_dir } => {
                let cache = GraphCache::new(&cache_dir, route_loopgen::cache::DEFAULT_TTL);
                let removed = cache.sweep()?;
                println!("removed {removed} stale entries");
            }
        },
    }

    Ok(())
}
