use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use geozero::mvt::{tile, Message as _, Tile};
use log::{debug, warn};
use serde_json::json;

use super::{EsConfig, EsError, EsResult};
use crate::mvt::{decode_geom, feature_properties, layer_extent, ring_area2, TileGeometry};
use crate::source::{json_value_to_id, Source};
use crate::tile::{TileCoord, TileRequest};
use crate::TileryResult;

/// Timeout for one vector-tile search round trip.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the layer carrying the documents in a vector-tile search
/// response.
const HITS_LAYER: &str = "hits";

/// Fetches features by running one vector-tile search per request and
/// converting the returned `hits` layer back to WGS84 GeoJSON.
#[derive(Debug)]
pub struct EsSource {
    client: reqwest::Client,
    config: EsConfig,
}

impl EsSource {
    pub fn new(config: &EsConfig) -> EsResult<Self> {
        if config.hosts.is_empty() {
            return Err(EsError::NoHostsConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Effective `{property → field path}` map for one request.
    fn field_map(&self, extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut fields = self.config.source_fields.clone();
        fields.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        fields
    }

    /// Search body: grid aggregations off, hit counting off, the field list,
    /// and one `query_string` filter per `q` argument.
    fn search_body(&self, request: &TileRequest, fields: &BTreeMap<String, String>) -> serde_json::Value {
        let mut body = json!({
            "grid_precision": 0,
            "track_total_hits": false,
            "fields": fields.values().collect::<Vec<_>>(),
        });
        let filters: Vec<serde_json::Value> = request
            .filters()
            .iter()
            .map(|q| json!({ "query_string": { "query": q } }))
            .collect();
        if !filters.is_empty() {
            body["query"] = json!({ "bool": { "filter": filters } });
        }
        body
    }

    async fn search(&self, request: &TileRequest, body: &serde_json::Value) -> EsResult<Vec<u8>> {
        let coord = request.coord;
        let mut last_err = None;
        for host in &self.config.hosts {
            let url = format!(
                "{}/{}/_mvt/{}/{}/{}/{}",
                host.trim_end_matches('/'),
                self.config.index,
                self.config.geometry_field,
                coord.z,
                coord.x,
                coord.y
            );
            let mut req = self.client.post(&url).json(body);
            if let Some(username) = &self.config.username {
                req = req.basic_auth(username, self.config.password.as_deref());
            }
            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(EsError::UnexpectedStatus(status, url));
                    }
                    return Ok(response.bytes().await?.to_vec());
                }
                Err(e) => {
                    warn!("Elasticsearch host [{host}] unreachable: {e}");
                    last_err = Some(e);
                }
            }
        }
        // hosts is non-empty, so at least one send error was recorded
        Err(last_err.map_or(EsError::NoHostsConfigured, EsError::Http))
    }

    /// Converts the `hits` layer of a search response into WGS84 features.
    fn layer_to_collection(
        &self,
        layer: &tile::Layer,
        coord: TileCoord,
        fields: &BTreeMap<String, String>,
    ) -> EsResult<FeatureCollection> {
        let extent = layer_extent(layer);
        let mut features = Vec::with_capacity(layer.features.len());
        for feature in &layer.features {
            let raw = feature_properties(feature, layer);
            let id = raw.get("_id").cloned();

            let mut properties = serde_json::Map::new();
            for (property, path) in fields {
                match raw.get(path) {
                    Some(value) if !value.is_null() => {
                        properties.insert(property.clone(), value.clone());
                    }
                    _ => warn!(
                        "No value at field '{path}' for feature '{id:?}' in index '{}'",
                        self.config.index
                    ),
                }
            }
            if let Some(id) = &id {
                properties.insert("id".to_string(), id.clone());
            }

            let geom = decode_geom(&feature.geometry, feature.r#type())
                .map_err(|e| EsError::BadTile(e.to_string()))?;
            features.push(Feature {
                bbox: None,
                geometry: Some(unproject_geometry(&geom, coord, extent)),
                id: id.as_ref().and_then(json_value_to_id),
                properties: Some(properties),
                foreign_members: None,
            });
        }
        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }
}

#[async_trait]
impl Source for EsSource {
    async fn get_features(&self, request: &TileRequest) -> TileryResult<FeatureCollection> {
        let fields = self.field_map(&request.extra_source_fields()?);
        let body = self.search_body(request, &fields);
        debug!(
            "Vector-tile search on [{}] @ {}: {body}",
            self.config.index, request.coord
        );

        let bytes = self.search(request, &body).await?;
        let tile =
            Tile::decode(bytes.as_slice()).map_err(|e| EsError::BadTile(e.to_string()))?;
        let Some(hits) = tile.layers.iter().find(|l| l.name == HITS_LAYER) else {
            return Ok(FeatureCollection {
                bbox: None,
                features: vec![],
                foreign_members: None,
            });
        };
        Ok(self.layer_to_collection(hits, request.coord, &fields)?)
    }
}

/// Lifts tile-space paths back to a WGS84 GeoJSON geometry.
fn unproject_geometry(geom: &TileGeometry, coord: TileCoord, extent: u32) -> Geometry {
    let position = |&(x, y): &(i32, i32)| {
        let (lon, lat) = coord.unproject(extent, f64::from(x), f64::from(y));
        vec![lon, lat]
    };
    let path = |points: &Vec<(i32, i32)>| points.iter().map(position).collect::<Vec<_>>();

    let value = match geom {
        TileGeometry::Points(points) => {
            if points.len() == 1 {
                Value::Point(position(&points[0]))
            } else {
                Value::MultiPoint(points.iter().map(|p| position(p)).collect())
            }
        }
        TileGeometry::Lines(lines) => {
            if lines.len() == 1 {
                Value::LineString(path(&lines[0]))
            } else {
                Value::MultiLineString(lines.iter().map(path).collect())
            }
        }
        TileGeometry::Polygons(rings) => {
            // A positive-area ring opens a new polygon; negative-area rings
            // are holes in the polygon that precedes them.
            let mut polygons: Vec<Vec<Vec<Vec<f64>>>> = Vec::new();
            for ring in rings {
                let mut closed = path(ring);
                if let Some(first) = closed.first().cloned() {
                    closed.push(first);
                }
                if ring_area2(ring) > 0 || polygons.is_empty() {
                    polygons.push(vec![closed]);
                } else if let Some(last) = polygons.last_mut() {
                    last.push(closed);
                }
            }
            if polygons.len() == 1 {
                Value::Polygon(polygons.remove(0))
            } else {
                Value::MultiPolygon(polygons)
            }
        }
    };
    Geometry::new(value)
}

#[cfg(test)]
mod tests {
    use geojson::feature::Id;
    use serde_json::json;

    use super::*;
    use crate::mvt::LayerBuilder;
    use crate::tile::EXTENT;

    fn config() -> EsConfig {
        EsConfig {
            hosts: vec!["http://localhost:9200".to_string()],
            username: None,
            password: None,
            index: "buildings".to_string(),
            geometry_field: "geometry".to_string(),
            source_fields: BTreeMap::from([(
                "height".to_string(),
                "properties.height".to_string(),
            )]),
        }
    }

    fn request(query: &str) -> TileRequest {
        TileRequest::new(
            TileCoord::new(0, 0, 0).unwrap(),
            TileRequest::parse_args(query),
        )
    }

    #[test]
    fn search_body_disables_aggregations_and_counts() {
        let source = EsSource::new(&config()).unwrap();
        let req = request("");
        let fields = source.field_map(&req.extra_source_fields().unwrap());
        let body = source.search_body(&req, &fields);
        assert_eq!(body["grid_precision"], json!(0));
        assert_eq!(body["track_total_hits"], json!(false));
        assert_eq!(body["fields"], json!(["properties.height"]));
        assert!(body.get("query").is_none());
    }

    #[test]
    fn every_filter_becomes_a_query_string_clause() {
        let source = EsSource::new(&config()).unwrap();
        let req = request("q=height%3A%3E3&q=kind%3Atower");
        let fields = source.field_map(&req.extra_source_fields().unwrap());
        let body = source.search_body(&req, &fields);
        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0]["query_string"]["query"], json!("height:>3"));
        assert_eq!(filters[1]["query_string"]["query"], json!("kind:tower"));
    }

    #[test]
    fn extra_source_fields_extend_the_request_only() {
        let source = EsSource::new(&config()).unwrap();
        let req = request("s=name:properties.name");
        let fields = source.field_map(&req.extra_source_fields().unwrap());
        assert_eq!(fields["name"], "properties.name");
        assert_eq!(fields["height"], "properties.height");
        // the configured map itself is untouched
        assert!(!source.config.source_fields.contains_key("name"));
    }

    #[test]
    fn hits_layer_converts_to_features() {
        let source = EsSource::new(&config()).unwrap();
        let coord = TileCoord::new(0, 0, 0).unwrap();

        let mut builder = LayerBuilder::new(HITS_LAYER.to_string(), EXTENT);
        let hit = Feature {
            bbox: None,
            geometry: None,
            id: None,
            properties: json!({
                "_id": "doc-1",
                "properties.height": 3,
                "_index": "buildings",
            })
            .as_object()
            .cloned(),
            foreign_members: None,
        };
        builder.add_feature(&hit, &TileGeometry::Points(vec![(2048, 2048)]));
        let layer = builder.build();

        let fields = source.field_map(&BTreeMap::new());
        let fc = source.layer_to_collection(&layer, coord, &fields).unwrap();
        assert_eq!(fc.features.len(), 1);

        let feature = &fc.features[0];
        assert_eq!(feature.id, Some(Id::String("doc-1".to_string())));
        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["height"], json!(3));
        assert_eq!(properties["id"], json!("doc-1"));
        // raw path keys and the index metadata never leak
        assert!(!properties.contains_key("properties.height"));
        assert!(!properties.contains_key("_index"));

        let Some(Geometry {
            value: Value::Point(position),
            ..
        }) = &feature.geometry
        else {
            panic!("expected a point");
        };
        assert!(position[0].abs() < 0.1);
        assert!(position[1].abs() < 0.1);
    }

    #[test]
    fn missing_field_is_omitted_not_null() {
        let source = EsSource::new(&config()).unwrap();
        let coord = TileCoord::new(0, 0, 0).unwrap();

        let mut builder = LayerBuilder::new(HITS_LAYER.to_string(), EXTENT);
        let hit = Feature {
            bbox: None,
            geometry: None,
            id: None,
            properties: json!({"_id": "doc-2"}).as_object().cloned(),
            foreign_members: None,
        };
        builder.add_feature(&hit, &TileGeometry::Points(vec![(0, 0)]));
        let layer = builder.build();

        let fields = source.field_map(&BTreeMap::new());
        let fc = source.layer_to_collection(&layer, coord, &fields).unwrap();
        let properties = fc.features[0].properties.as_ref().unwrap();
        assert!(!properties.contains_key("height"));
        assert_eq!(properties["id"], json!("doc-2"));
    }
}
