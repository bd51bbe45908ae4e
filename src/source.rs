use std::fmt::Debug;

use async_trait::async_trait;
use geojson::FeatureCollection;

use crate::tile::TileRequest;
use crate::TileryResult;

/// Capability every backend adapter implements: fetch the features that
/// intersect the requested tile, as WGS84 GeoJSON.
///
/// Contract:
/// - geometries come back in lon/lat, ready for projection to tile space;
/// - `properties` carries the configured source-field projections plus an
///   `"id"` key echoing the feature id, never the raw geometry field;
/// - extra `s` arguments extend the field map for this request only;
/// - in-flight I/O is abandoned when the returned future is dropped.
#[async_trait]
pub trait Source: Send + Sync + Debug {
    async fn get_features(&self, request: &TileRequest) -> TileryResult<FeatureCollection>;
}

/// Boxed source trait object, owned by its layer.
pub type BoxedSource = Box<dyn Source>;

/// Scalar JSON value → GeoJSON feature id, where one is representable.
pub(crate) fn json_value_to_id(value: &serde_json::Value) -> Option<geojson::feature::Id> {
    match value {
        serde_json::Value::String(s) => Some(geojson::feature::Id::String(s.clone())),
        serde_json::Value::Number(n) => Some(geojson::feature::Id::Number(n.clone())),
        _ => None,
    }
}
