use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use subst::VariableMap;

use crate::cache::{BoxedCache, InMemoryCache, NoopCache, RedisCache, RedisConfig};
use crate::error::ConfigError;
use crate::es::{EsConfig, EsSource};
use crate::layer::Layer;
use crate::pg::{PgConfig, PgSource};
use crate::TileryResult;

/// Everything a running server owns: the hydrated layer list and the shared
/// cache.
pub struct ServerState {
    pub layers: Vec<Layer>,
    pub cache: BoxedCache,
}

/// Top-level keys the config model does not know about, kept so they can be
/// warned about instead of silently ignored.
pub type UnrecognizedValues = HashMap<String, serde_yaml::Value>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(flatten, skip_serializing)]
    pub unrecognized: UnrecognizedValues,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
    /// Process-local cache, mainly for single-instance setups and tests.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub in_memory: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub minzoom: u8,
    /// `0` leaves the layer unbounded above.
    #[serde(default)]
    pub maxzoom: u8,
    /// Opts this layer out of the tile cache.
    #[serde(default)]
    pub nocache: bool,
    pub source: SourceConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch: Option<EsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgis: Option<PgConfig>,
}

/// Reads and env-substitutes the YAML configuration.
pub fn read_config<'a, M>(file_name: &Path, env: &'a M) -> TileryResult<Config>
where
    M: VariableMap<'a>,
    M::Value: AsRef<str>,
{
    let mut file = File::open(file_name)
        .map_err(|e| ConfigError::ConfigLoadError(e, file_name.into()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| ConfigError::ConfigLoadError(e, file_name.into()))?;
    parse_config(&contents, env, file_name)
}

pub fn parse_config<'a, M>(contents: &str, env: &'a M, file_name: &Path) -> TileryResult<Config>
where
    M: VariableMap<'a>,
    M::Value: AsRef<str>,
{
    let config: Config = subst::yaml::from_str(contents, env)
        .map_err(|e| ConfigError::ConfigParseError(e, file_name.into()))?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Startup validation of everything that does not need I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in self.unrecognized.keys() {
            warn!(
                "Ignoring unrecognized configuration key '{key}'. Please check the config file for typos."
            );
        }
        let mut names = HashSet::new();
        for layer in &self.layers {
            if !names.insert(layer.name.as_str()) {
                return Err(ConfigError::DuplicateLayer(layer.name.clone()));
            }
            if layer.maxzoom != 0 && layer.minzoom > layer.maxzoom {
                return Err(ConfigError::InvertedZoomRange(
                    layer.name.clone(),
                    layer.minzoom,
                    layer.maxzoom,
                ));
            }
            match (
                &layer.source.elasticsearch,
                &layer.source.postgis,
            ) {
                (Some(_), Some(_)) => {
                    return Err(ConfigError::AmbiguousSource(layer.name.clone()));
                }
                (None, None) => return Err(ConfigError::NoSource(layer.name.clone())),
                _ => {}
            }
        }
        Ok(())
    }

    /// Hydrates the configuration into a running state: connects sources and
    /// the cache. Failures here abort startup.
    pub async fn resolve(self) -> TileryResult<ServerState> {
        let cache = create_cache(self.cache.as_ref()).await?;
        let mut layers = Vec::with_capacity(self.layers.len());
        for layer_config in &self.layers {
            let layer = create_layer(layer_config).await?;
            info!("Configured layer {layer}");
            layers.push(layer);
        }
        Ok(ServerState { layers, cache })
    }
}

async fn create_layer(config: &LayerConfig) -> TileryResult<Layer> {
    let source: crate::source::BoxedSource =
        if let Some(es) = &config.source.elasticsearch {
            Box::new(EsSource::new(es)?)
        } else if let Some(pg) = &config.source.postgis {
            Box::new(PgSource::new(pg).await?)
        } else {
            return Err(ConfigError::NoSource(config.name.clone()).into());
        };
    Ok(Layer::new(config, source))
}

async fn create_cache(config: Option<&CacheConfig>) -> TileryResult<BoxedCache> {
    match config {
        Some(CacheConfig {
            redis: Some(redis), ..
        }) => {
            info!("Using Redis cache at {}:{}", redis.host, redis.port);
            Ok(Box::new(RedisCache::new(redis).await?))
        }
        Some(CacheConfig {
            in_memory: true, ..
        }) => {
            info!("Using in-memory cache");
            Ok(Box::new(InMemoryCache::new()))
        }
        _ => Ok(Box::new(NoopCache)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use indoc::indoc;

    use super::*;

    fn parse(yaml: &str, env: &HashMap<String, String>) -> TileryResult<Config> {
        parse_config(yaml, env, &PathBuf::from("tilery.yml"))
    }

    #[test]
    fn parses_a_full_config() {
        let yaml = indoc! {"
            cache:
              redis:
                host: ${REDIS_HOST}
                port: 6379
                ttl: 3600
            layers:
              - name: buildings
                description: Building footprints
                minzoom: 10
                maxzoom: 0
                source:
                  elasticsearch:
                    hosts: [\"http://localhost:9200\"]
                    index: buildings
                    geometryField: geometry
                    sourceFields:
                      height: properties.height
              - name: roads
                nocache: true
                source:
                  postgis:
                    dsn: host=localhost user=tilery dbname=gis
                    schema: public
                    table: roads
                    geometryField: geom
                    sourceFields:
                      kind: road_class
        "};
        let env = HashMap::from([("REDIS_HOST".to_string(), "cache.internal".to_string())]);
        let config = parse(yaml, &env).unwrap();

        let redis = config.cache.as_ref().unwrap().redis.as_ref().unwrap();
        assert_eq!(redis.host, "cache.internal");
        assert_eq!(redis.ttl, 3600);

        assert_eq!(config.layers.len(), 2);
        let buildings = &config.layers[0];
        assert_eq!(buildings.minzoom, 10);
        assert_eq!(buildings.maxzoom, 0);
        assert!(!buildings.nocache);
        let es = buildings.source.elasticsearch.as_ref().unwrap();
        assert_eq!(es.source_fields["height"], "properties.height");

        assert!(config.layers[1].nocache);
    }

    #[test]
    fn rejects_layers_with_both_or_neither_source() {
        let env = HashMap::new();
        let both = indoc! {"
            layers:
              - name: bad
                source:
                  elasticsearch:
                    hosts: [\"http://localhost:9200\"]
                    index: x
                    geometryField: g
                  postgis:
                    dsn: host=localhost
                    table: t
                    geometryField: g
        "};
        assert!(parse(both, &env).is_err());

        let neither = indoc! {"
            layers:
              - name: bad
                source: {}
        "};
        assert!(parse(neither, &env).is_err());
    }

    #[test]
    fn rejects_duplicate_names_and_inverted_zooms() {
        let env = HashMap::new();
        let dup = indoc! {"
            layers:
              - name: a
                source:
                  elasticsearch: {hosts: [\"http://x\"], index: i, geometryField: g}
              - name: a
                source:
                  elasticsearch: {hosts: [\"http://x\"], index: i, geometryField: g}
        "};
        assert!(parse(dup, &env).is_err());

        let inverted = indoc! {"
            layers:
              - name: a
                minzoom: 9
                maxzoom: 4
                source:
                  elasticsearch: {hosts: [\"http://x\"], index: i, geometryField: g}
        "};
        assert!(parse(inverted, &env).is_err());

        // maxzoom 0 stays the unbounded overload, not an inversion
        let unbounded = indoc! {"
            layers:
              - name: a
                minzoom: 9
                source:
                  elasticsearch: {hosts: [\"http://x\"], index: i, geometryField: g}
        "};
        assert!(parse(unbounded, &env).is_ok());
    }

    #[test]
    fn unrecognized_top_level_keys_are_captured_not_fatal() {
        let env = HashMap::new();
        let yaml = indoc! {"
            cahce:
              redis:
                host: x
                port: 6379
            layers:
              - name: a
                source:
                  elasticsearch: {hosts: [\"http://x\"], index: i, geometryField: g}
        "};
        let config = parse(yaml, &env).unwrap();
        assert!(config.cache.is_none());
        assert!(config.unrecognized.contains_key("cahce"));
    }

    #[actix_rt::test]
    async fn absent_cache_config_resolves_to_noop() {
        let cache = create_cache(None).await.unwrap();
        assert!(!cache.exists("k").await);
        cache.put("k", b"v").await.unwrap();
        assert!(!cache.exists("k").await);
    }

    #[actix_rt::test]
    async fn in_memory_cache_config_resolves() {
        let config = CacheConfig {
            redis: None,
            in_memory: true,
        };
        let cache = create_cache(Some(&config)).await.unwrap();
        cache.put("k", b"v").await.unwrap();
        assert!(cache.exists("k").await);
    }
}
