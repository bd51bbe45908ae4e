use std::fmt::{Debug, Display, Formatter};

use sha2::{Digest, Sha256};

use crate::config::LayerConfig;
use crate::source::BoxedSource;
use crate::tile::TileRequest;

/// Request value selecting every configured layer.
pub const ALL_LAYERS: &str = "_all";

/// A named, zoom-bounded binding of a backend source, hydrated from config.
pub struct Layer {
    pub name: String,
    pub description: String,
    pub minzoom: u8,
    pub maxzoom: u8,
    pub cacheable: bool,
    pub source: BoxedSource,
    config_digest: String,
}

impl Layer {
    /// Binds a resolved source to its configuration. The configuration is
    /// digested here so that any config change rolls the layer's cache keys;
    /// the source handle itself stays out of the digest on purpose, keeping
    /// runtime-only state (pools, clients) away from key derivation.
    #[must_use]
    pub fn new(config: &LayerConfig, source: BoxedSource) -> Self {
        let serialized =
            serde_json::to_vec(config).expect("layer config serialization is infallible");
        let config_digest = hex::encode(Sha256::digest(&serialized));
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            minzoom: config.minzoom,
            maxzoom: config.maxzoom,
            cacheable: !config.nocache,
            source,
            config_digest,
        }
    }

    /// Stable hex digest of the layer's effective configuration.
    #[must_use]
    pub fn config_digest(&self) -> &str {
        &self.config_digest
    }

    /// Zoom gate: `maxzoom == 0` means unbounded above.
    #[must_use]
    pub fn is_visible_at(&self, zoom: u8) -> bool {
        self.minzoom <= zoom && (self.maxzoom >= zoom || self.maxzoom == 0)
    }

    /// Cache key for this layer and request. Bit-exact across server
    /// instances sharing a cache:
    /// `<hex-sha256-of-layer-config>/<z>/<x>/<y>?<urlencoded-sorted-args>`.
    #[must_use]
    pub fn cache_key(&self, request: &TileRequest) -> String {
        format!(
            "{}/{}?{}",
            self.config_digest,
            request.coord,
            request.sorted_query_string()
        )
    }
}

impl Debug for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("minzoom", &self.minzoom)
            .field("maxzoom", &self.maxzoom)
            .field("cacheable", &self.cacheable)
            .finish_non_exhaustive()
    }
}

impl Display for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.config_digest)
    }
}

/// Applies the name filter, then the zoom filter.
///
/// `_all` starts from the configured list; otherwise the comma-separated
/// names are matched in request order and unknown names are dropped
/// silently. The returned order is the order of layers in the emitted tile.
#[must_use]
pub fn select_layers<'a>(layers: &'a [Layer], requested: &str, zoom: u8) -> Vec<&'a Layer> {
    let named: Vec<&Layer> = if requested == ALL_LAYERS {
        layers.iter().collect()
    } else {
        requested
            .split(',')
            .filter_map(|name| layers.iter().find(|layer| layer.name == name))
            .collect()
    };
    named
        .into_iter()
        .filter(|layer| layer.is_visible_at(zoom))
        .collect()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use geojson::FeatureCollection;

    use super::*;
    use crate::config::{LayerConfig, SourceConfig};
    use crate::tile::{TileCoord, TileRequest};
    use crate::{Source, TileryResult};

    #[derive(Debug)]
    struct EmptySource;

    #[async_trait]
    impl Source for EmptySource {
        async fn get_features(&self, _request: &TileRequest) -> TileryResult<FeatureCollection> {
            Ok(FeatureCollection {
                bbox: None,
                features: vec![],
                foreign_members: None,
            })
        }
    }

    fn layer(name: &str, minzoom: u8, maxzoom: u8) -> Layer {
        let config = LayerConfig {
            name: name.to_string(),
            description: String::new(),
            minzoom,
            maxzoom,
            nocache: false,
            source: SourceConfig::default(),
        };
        Layer::new(&config, Box::new(EmptySource))
    }

    fn names(layers: &[&Layer]) -> Vec<String> {
        layers.iter().map(|l| l.name.clone()).collect()
    }

    #[test]
    fn name_filter_preserves_request_order() {
        let layers = vec![layer("a", 0, 22), layer("b", 0, 22), layer("c", 0, 22)];
        assert_eq!(names(&select_layers(&layers, "c,a", 5)), ["c", "a"]);
        assert_eq!(names(&select_layers(&layers, "a,c", 5)), ["a", "c"]);
    }

    #[test]
    fn unknown_names_are_dropped() {
        let layers = vec![layer("a", 0, 22)];
        assert_eq!(names(&select_layers(&layers, "nope,a", 5)), ["a"]);
        assert!(select_layers(&layers, "", 5).is_empty());
    }

    #[test]
    fn all_layers_keeps_config_order() {
        let layers = vec![layer("b", 0, 22), layer("a", 0, 22)];
        assert_eq!(names(&select_layers(&layers, ALL_LAYERS, 5)), ["b", "a"]);
    }

    #[test]
    fn zoom_filter_applies_after_names() {
        let layers = vec![layer("low", 0, 5), layer("high", 6, 22)];
        assert_eq!(names(&select_layers(&layers, "high,low", 4)), ["low"]);
        assert_eq!(names(&select_layers(&layers, "high,low", 10)), ["high"]);
    }

    #[test]
    fn maxzoom_zero_is_unbounded() {
        let layers = vec![layer("open", 3, 0)];
        assert!(select_layers(&layers, ALL_LAYERS, 22).len() == 1);
        assert!(select_layers(&layers, ALL_LAYERS, 2).is_empty());
    }

    #[test]
    fn digest_tracks_configuration() {
        let a = layer("a", 0, 22);
        let same = layer("a", 0, 22);
        let different = layer("a", 1, 22);
        assert_eq!(a.config_digest(), same.config_digest());
        assert_ne!(a.config_digest(), different.config_digest());
        assert_eq!(a.config_digest().len(), 64);
    }

    #[test]
    fn cache_key_shape() {
        let l = layer("a", 0, 22);
        let coord = TileCoord::new(3, 1, 2).unwrap();
        let req = TileRequest::new(coord, TileRequest::parse_args("q=kind:road"));
        let key = l.cache_key(&req);
        assert_eq!(key, format!("{}/3/1/2?q=kind%3Aroad", l.config_digest()));
    }
}
