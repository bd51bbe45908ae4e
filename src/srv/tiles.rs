use std::panic::AssertUnwindSafe;

use actix_web::error::ErrorBadRequest;
use actix_web::http::header::{CACHE_CONTROL, CONTENT_ENCODING};
use actix_web::web::{Data, Path};
use actix_web::{route, HttpRequest, HttpResponse, Result as ActixResult};
use futures::future::try_join_all;
use futures::FutureExt as _;
use geozero::mvt::tile;
use log::{debug, warn};

use crate::cache::Cache;
use crate::config::ServerState;
use crate::layer::{select_layers, Layer};
use crate::mvt;
use crate::srv::server::map_internal_error;
use crate::srv::SrvConfig;
use crate::tile::{TileCoord, TileRequest};
use crate::{TileryError, TileryResult};

/// The tile endpoint: `/{layers}/{z}/{x}/{y}.mvt` where `layers` is `_all`
/// or a comma-separated name list.
#[route("/{layers}/{z}/{x}/{y}.mvt", method = "GET", method = "HEAD")]
pub async fn get_tile(
    req: HttpRequest,
    path: Path<(String, String, String, String)>,
    state: Data<ServerState>,
    srv_config: Data<SrvConfig>,
) -> ActixResult<HttpResponse> {
    let (requested, z, x, y) = path.into_inner();
    let coord = parse_coord(&z, &x, &y).map_err(ErrorBadRequest)?;
    let request = TileRequest::new(coord, TileRequest::parse_args(req.query_string()));
    // Malformed `s` args fail here, before any source is contacted.
    request.extra_source_fields().map_err(ErrorBadRequest)?;

    let mut guard = CancelGuard {
        armed: true,
        requested: &requested,
        coord,
    };
    // Panics in the pipeline are recovered into a 500, not a torn-down
    // worker connection.
    let response = AssertUnwindSafe(serve_tile(&requested, &request, &state, &srv_config))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(map_internal_error(panic_message(&panic))));
    guard.armed = false;
    response
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("Recovered from panic while serving tile: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("Recovered from panic while serving tile: {message}")
    } else {
        "Recovered from panic while serving tile".to_string()
    }
}

async fn serve_tile(
    requested: &str,
    request: &TileRequest,
    state: &ServerState,
    srv_config: &SrvConfig,
) -> ActixResult<HttpResponse> {
    let coord = request.coord;
    let selected = select_layers(&state.layers, requested, coord.z);

    // Fork-join fan-out: the first failing layer drops its siblings, and
    // results come back in selection order regardless of completion order.
    let mut tile_layers = try_join_all(selected.iter().map(|layer| {
        debug!("Retrieving vector tile for layer [{}] @ {coord}", layer.name);
        fetch_tile_layer(layer, request, state.cache.as_ref())
    }))
    .await
    .map_err(map_internal_error)?;

    if srv_config.simplify {
        for (layer, tile_layer) in selected.iter().zip(&mut tile_layers) {
            let epsilon = mvt::simplification_epsilon(layer.minzoom, layer.maxzoom, coord.z);
            debug!("Simplifying [{}] @ zoom [{}], epsilon [{epsilon}]", layer.name, coord.z);
            mvt::simplify_layer(tile_layer, epsilon);
            mvt::remove_empty(tile_layer, 1.0, 1.0);
        }
    }

    let body = mvt::marshal_gzipped(tile_layers).map_err(map_internal_error)?;
    Ok(HttpResponse::Ok()
        .insert_header((CACHE_CONTROL, "max-age=86400"))
        .insert_header((CONTENT_ENCODING, "gzip"))
        .content_type("application/x-protobuf")
        .body(body))
}

fn parse_coord(z: &str, x: &str, y: &str) -> TileryResult<TileCoord> {
    let bad = |what: &str, raw: &str| TileryError::BadTileAddress(what.to_string(), raw.to_string());
    let z = z.parse::<u32>().map_err(|_| bad("zoom", z))?;
    let x = x.parse::<u32>().map_err(|_| bad("column", x))?;
    let y = y.parse::<u32>().map_err(|_| bad("row", y))?;
    Ok(TileCoord::new(z, x, y)?)
}

/// Per-layer cache-through.
///
/// The cached artifact is the projected and clipped but *not* simplified
/// single-layer tile, gzipped. The cache stays advisory end to end: probe
/// and decode failures fall through to the source, write failures only warn.
pub async fn fetch_tile_layer(
    layer: &Layer,
    request: &TileRequest,
    cache: &dyn Cache,
) -> TileryResult<tile::Layer> {
    if !layer.cacheable {
        let collection = layer.source.get_features(request).await?;
        return Ok(mvt::build_layer(&layer.name, &collection, request.coord)?);
    }

    let key = layer.cache_key(request);
    if cache.exists(&key).await {
        match cached_layer(cache, &key).await {
            Ok(tile_layer) => {
                debug!("Key [{key}] found in cache");
                return Ok(tile_layer);
            }
            Err(e) => warn!("Ignoring unusable cache entry [{key}]: {e}"),
        }
    } else {
        debug!("Key [{key}] is not cached");
    }

    let collection = layer.source.get_features(request).await?;
    let tile_layer = mvt::build_layer(&layer.name, &collection, request.coord)?;

    match mvt::marshal_gzipped(vec![tile_layer.clone()]) {
        Ok(blob) => {
            if let Err(e) = cache.put(&key, &blob).await {
                warn!("Could not store key [{key}] in cache: {e}");
            }
        }
        Err(e) => warn!("Could not marshal layer [{}] for caching: {e}", layer.name),
    }
    Ok(tile_layer)
}

async fn cached_layer(cache: &dyn Cache, key: &str) -> TileryResult<tile::Layer> {
    let blob = cache.get(key).await?;
    let tile = mvt::unmarshal_gzipped(&blob)?;
    tile.layers
        .into_iter()
        .next()
        .ok_or_else(|| mvt::MvtError::TileDecode("cached blob holds no layer".to_string()).into())
}

/// Logs abandoned requests. The handler future being dropped before
/// completion is how a client disconnect manifests; sub-tasks are gone by
/// the time this fires, and no bytes can follow the peer (the 499
/// convention).
struct CancelGuard<'a> {
    armed: bool,
    requested: &'a str,
    coord: TileCoord,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Tile request [{}] @ {} canceled by client (499)",
                self.requested, self.coord
            );
        }
    }
}
