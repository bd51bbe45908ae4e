//! Building, marshalling and post-processing of Mapbox Vector Tile layers.

mod clip;
mod geometry_decoding;
mod geometry_encoding;
mod simplify;

use geojson::FeatureCollection;
use geozero::mvt::{tile, Message as _, TagsBuilder, Tile, TileValue};

pub use self::clip::{clip_to_tile, project};
pub use self::geometry_decoding::decode_geom;
pub use self::geometry_encoding::{encode_geom, ring_area2, TileGeometry};
pub use self::simplify::{
    remove_empty, simplification_epsilon, simplify_layer, MAX_SIMPLIFY, MIN_SIMPLIFY,
};

use crate::tile::{TileCoord, EXTENT};
use crate::utils::{decode_gzip, encode_gzip};

pub type MvtResult<T> = Result<T, MvtError>;

#[derive(thiserror::Error, Debug)]
pub enum MvtError {
    #[error("Unsupported geometry type: {0}")]
    UnsupportedGeometry(&'static str),

    #[error("Invalid geometry command stream")]
    InvalidGeometry,

    #[error("Unable to convert source geometry: {0}")]
    GeometryConversion(String),

    #[error("Unable to decode tile: {0}")]
    TileDecode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Accumulates features into an MVT layer, interning keys and values.
pub struct LayerBuilder {
    name: String,
    extent: u32,
    tag_builder: TagsBuilder<String>,
    features: Vec<tile::Feature>,
}

impl LayerBuilder {
    #[must_use]
    pub fn new(name: String, extent: u32) -> Self {
        Self {
            name,
            extent,
            tag_builder: TagsBuilder::new(),
            features: Vec::new(),
        }
    }

    /// Adds one feature with an already clipped tile-space geometry. The
    /// MVT-level id is set only for numeric feature ids; string ids travel
    /// in the `id` property the source adapters put there.
    pub fn add_feature(&mut self, feature: &geojson::Feature, geom: &TileGeometry) {
        let id = match &feature.id {
            Some(geojson::feature::Id::Number(n)) => n.as_u64(),
            _ => None,
        };

        let mut tags = Vec::new();
        if let Some(properties) = &feature.properties {
            for (key, value) in properties {
                if value.is_null() {
                    continue;
                }
                let (key_idx, value_idx) = self
                    .tag_builder
                    .insert(key.clone(), tilevalue_from_json(value.clone()));
                tags.push(key_idx);
                tags.push(value_idx);
            }
        }

        self.features.push(tile::Feature {
            id,
            tags,
            r#type: Some(geom.geom_type() as i32),
            geometry: encode_geom(geom),
        });
    }

    #[must_use]
    pub fn build(self) -> tile::Layer {
        let (keys, values) = self.tag_builder.into_tags();
        tile::Layer {
            version: 2,
            name: self.name,
            features: self.features,
            keys,
            values: values.into_iter().map(Into::into).collect(),
            extent: Some(self.extent),
        }
    }
}

fn tilevalue_from_json(value: serde_json::Value) -> TileValue {
    match value {
        serde_json::Value::String(s) => TileValue::Str(s),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                TileValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                TileValue::Uint(u)
            } else {
                TileValue::Double(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::Bool(b) => TileValue::Bool(b),
        // Arrays and objects have no MVT representation; ship their JSON
        other => TileValue::Str(other.to_string()),
    }
}

fn json_from_mvt_value(value: &tile::Value) -> Option<serde_json::Value> {
    use serde_json::Value;
    if let Some(s) = &value.string_value {
        Some(Value::String(s.clone()))
    } else if let Some(f) = value.float_value {
        Some(serde_json::json!(f))
    } else if let Some(d) = value.double_value {
        Some(serde_json::json!(d))
    } else if let Some(i) = value.int_value {
        Some(Value::from(i))
    } else if let Some(u) = value.uint_value {
        Some(Value::from(u))
    } else if let Some(i) = value.sint_value {
        Some(Value::from(i))
    } else {
        value.bool_value.map(Value::Bool)
    }
}

/// Builds the MVT layer for one feature collection: every geometry is
/// projected into the tile's pixel space and clipped against the buffered
/// extent; features that vanish in the clip are dropped.
pub fn build_layer(
    name: &str,
    collection: &FeatureCollection,
    coord: TileCoord,
) -> MvtResult<tile::Layer> {
    let mut builder = LayerBuilder::new(name.to_string(), EXTENT);
    for feature in &collection.features {
        let Some(geometry) = feature.geometry.as_ref() else {
            continue;
        };
        let geom = geo::Geometry::<f64>::try_from(&geometry.value)
            .map_err(|e| MvtError::GeometryConversion(e.to_string()))?;
        if let Some(tile_geom) = clip_to_tile(&project(geom, coord)) {
            builder.add_feature(feature, &tile_geom);
        }
    }
    Ok(builder.build())
}

/// Marshals an ordered layer sequence into one gzipped tile. An empty
/// sequence still yields a valid (zero-layer) tile.
pub fn marshal_gzipped(layers: Vec<tile::Layer>) -> MvtResult<Vec<u8>> {
    let tile = Tile { layers };
    Ok(encode_gzip(&tile.encode_to_vec())?)
}

/// Unmarshals a gzipped tile produced by [`marshal_gzipped`].
pub fn unmarshal_gzipped(blob: &[u8]) -> MvtResult<Tile> {
    let raw = decode_gzip(blob)?;
    Tile::decode(raw.as_slice()).map_err(|e| MvtError::TileDecode(e.to_string()))
}

/// Decodes a feature's interned tags back into JSON properties.
#[must_use]
pub fn feature_properties(
    feature: &tile::Feature,
    layer: &tile::Layer,
) -> serde_json::Map<String, serde_json::Value> {
    let mut properties = serde_json::Map::new();
    for pair in feature.tags.chunks_exact(2) {
        let (Some(key), Some(value)) = (
            layer.keys.get(pair[0] as usize),
            layer.values.get(pair[1] as usize),
        ) else {
            continue;
        };
        if let Some(value) = json_from_mvt_value(value) {
            properties.insert(key.clone(), value);
        }
    }
    properties
}

/// Layer extent, falling back to the spec default.
#[must_use]
pub fn layer_extent(layer: &tile::Layer) -> u32 {
    layer.extent.unwrap_or(EXTENT)
}

#[cfg(test)]
mod tests {
    use geojson::{Feature, Geometry, Value};
    use geozero::mvt::tile::GeomType;
    use serde_json::json;

    use super::*;

    fn point_feature(lon: f64, lat: f64, properties: serde_json::Value) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(vec![lon, lat]))),
            id: Some(geojson::feature::Id::Number(7.into())),
            properties: properties.as_object().cloned(),
            foreign_members: None,
        }
    }

    fn collection(features: Vec<Feature>) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    #[test]
    fn builds_a_single_point_layer() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let fc = collection(vec![point_feature(0.0, 1.0, json!({"height": 3, "id": "7"}))]);
        let layer = build_layer("buildings", &fc, coord).unwrap();

        assert_eq!(layer.version, 2);
        assert_eq!(layer.name, "buildings");
        assert_eq!(layer.extent, Some(EXTENT));
        assert_eq!(layer.features.len(), 1);

        let feature = &layer.features[0];
        assert_eq!(feature.id, Some(7));
        assert_eq!(feature.r#type(), GeomType::Point);

        let properties = feature_properties(feature, &layer);
        assert_eq!(properties["height"], json!(3));
        assert_eq!(properties["id"], json!("7"));

        let TileGeometry::Points(points) = decode_geom(&feature.geometry, feature.r#type()).unwrap()
        else {
            panic!("expected a point");
        };
        let (lon, lat) = coord.unproject(EXTENT, f64::from(points[0].0), f64::from(points[0].1));
        assert!(lon.abs() < 0.1);
        assert!((lat - 1.0).abs() < 0.1);
    }

    #[test]
    fn null_properties_are_omitted() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let fc = collection(vec![point_feature(0.0, 0.0, json!({"a": null, "b": 1}))]);
        let layer = build_layer("x", &fc, coord).unwrap();
        let properties = feature_properties(&layer.features[0], &layer);
        assert!(!properties.contains_key("a"));
        assert_eq!(properties["b"], json!(1));
    }

    #[test]
    fn keys_and_values_are_interned_across_features() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let fc = collection(vec![
            point_feature(0.0, 0.0, json!({"kind": "road"})),
            point_feature(1.0, 0.0, json!({"kind": "road"})),
            point_feature(2.0, 0.0, json!({"kind": "rail"})),
        ]);
        let layer = build_layer("x", &fc, coord).unwrap();
        assert_eq!(layer.keys, vec!["kind"]);
        assert_eq!(layer.values.len(), 2);
    }

    #[test]
    fn array_properties_are_serialized_as_json_strings() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let fc = collection(vec![point_feature(0.0, 0.0, json!({"tags": [1, 2]}))]);
        let layer = build_layer("x", &fc, coord).unwrap();
        let properties = feature_properties(&layer.features[0], &layer);
        assert_eq!(properties["tags"], json!("[1,2]"));
    }

    #[test]
    fn features_outside_the_tile_are_dropped() {
        let coord = TileCoord::new(2, 0, 0).unwrap();
        let fc = collection(vec![point_feature(120.0, -45.0, json!({}))]);
        let layer = build_layer("x", &fc, coord).unwrap();
        assert!(layer.features.is_empty());
    }

    #[test]
    fn marshal_roundtrip_preserves_layer_order() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let a = build_layer("a", &collection(vec![]), coord).unwrap();
        let c = build_layer("c", &collection(vec![]), coord).unwrap();
        let blob = marshal_gzipped(vec![a, c]).unwrap();
        assert_eq!(&blob[..2], b"\x1f\x8b");

        let tile = unmarshal_gzipped(&blob).unwrap();
        let names: Vec<_> = tile.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn empty_layer_set_is_a_valid_tile() {
        let blob = marshal_gzipped(vec![]).unwrap();
        let tile = unmarshal_gzipped(&blob).unwrap();
        assert!(tile.layers.is_empty());
    }
}
