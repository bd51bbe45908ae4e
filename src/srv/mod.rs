//! The HTTP edge: routes, response assembly, and the per-request fan-out.

pub mod server;
pub mod tiles;

pub use server::{internal_router, new_server, router, SrvConfig};
pub use tiles::fetch_tile_layer;
