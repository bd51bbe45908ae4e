//! tilery is a vector map-tile server: it answers `/{layers}/{z}/{x}/{y}.mvt`
//! by querying Elasticsearch or PostGIS backends for the features that
//! intersect the tile, assembling them into a Mapbox Vector Tile, caching
//! per layer, and optionally simplifying geometries to the zoom level.

pub mod args;
pub mod cache;
pub mod config;
mod error;
pub mod es;
pub mod layer;
pub mod mvt;
pub mod pg;
mod source;
pub mod srv;
pub mod tile;
mod utils;

pub use crate::config::{parse_config, read_config, Config, ServerState};
pub use crate::error::{ConfigError, TileryError, TileryResult};
pub use crate::source::{BoxedSource, Source};
pub use crate::utils::{decode_gzip, encode_gzip};
