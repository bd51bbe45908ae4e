use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use geojson::FeatureCollection;
use log::debug;
use tokio::time::timeout;

use super::row::row_to_feature;
use super::{PgConfig, PgError, PgPool, PgResult, POOL_SIZE_DEFAULT};
use crate::source::Source;
use crate::tile::TileRequest;
use crate::TileryResult;

/// Timeout for one tile query, transaction included.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches features with one `ST_Intersects` select per request, executed in
/// a short-lived read-only transaction.
#[derive(Debug)]
pub struct PgSource {
    pool: PgPool,
    relation: String,
    geometry_field: String,
    source_fields: BTreeMap<String, String>,
}

impl PgSource {
    pub async fn new(config: &PgConfig) -> PgResult<Self> {
        let relation = relation_from(config)?;
        let pool = PgPool::new(
            &config.dsn,
            config.pool_size.unwrap_or(POOL_SIZE_DEFAULT),
        )
        .await?;
        Ok(Self {
            pool,
            relation,
            geometry_field: config.geometry_field.clone(),
            source_fields: config.source_fields.clone(),
        })
    }
}

fn relation_from(config: &PgConfig) -> PgResult<String> {
    match (&config.table, &config.table_expression) {
        (Some(table), None) => Ok(match &config.schema {
            Some(schema) if !schema.is_empty() => format!("{schema}.{table}"),
            _ => table.clone(),
        }),
        (None, Some(expression)) => Ok(format!("({expression})")),
        _ => Err(PgError::AmbiguousRelation),
    }
}

/// The tile query: a CTE wrapping the configured relation, the geometry as
/// WKB plus one aliased expression per source field, filtered by the tile
/// envelope and every `q` expression.
fn build_query(
    relation: &str,
    geom: &str,
    request: &TileRequest,
    fields: &BTreeMap<String, String>,
) -> String {
    let mut select = vec![format!("ST_AsBinary({geom}) AS {geom}")];
    select.extend(
        fields
            .iter()
            .map(|(alias, expr)| format!("{expr} AS \"{alias}\"")),
    );

    let b = request.coord.bounds();
    let mut conditions = vec![format!(
        "ST_Intersects({geom}, ST_MakeEnvelope({}, {}, {}, {}, 4326))",
        b.left, b.bottom, b.right, b.top
    )];
    conditions.extend(request.filters().iter().map(|q| format!("({q})")));

    format!(
        "WITH src AS (SELECT * FROM {relation}) SELECT {} FROM src WHERE {}",
        select.join(", "),
        conditions.join(" AND ")
    )
}

#[async_trait]
impl Source for PgSource {
    async fn get_features(&self, request: &TileRequest) -> TileryResult<FeatureCollection> {
        let mut fields = self.source_fields.clone();
        fields.extend(request.extra_source_fields()?);
        let query = build_query(&self.relation, &self.geometry_field, request, &fields);
        debug!("SQL on [{}]: {query}", self.pool.id());

        let mut client = self.pool.get().await?;
        let tx = client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(PgError::Query)?;
        let rows = timeout(QUERY_TIMEOUT, tx.query(&query, &[]))
            .await
            .map_err(|_| PgError::QueryTimeout(QUERY_TIMEOUT))?
            .map_err(PgError::Query)?;
        tx.commit().await.map_err(PgError::Query)?;

        let features = rows
            .iter()
            .map(|row| row_to_feature(row, &self.geometry_field))
            .collect::<PgResult<Vec<_>>>()?;
        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileCoord;

    fn config() -> PgConfig {
        PgConfig {
            dsn: "host=localhost user=tilery dbname=gis".to_string(),
            schema: Some("public".to_string()),
            table: Some("roads".to_string()),
            table_expression: None,
            geometry_field: "geom".to_string(),
            source_fields: BTreeMap::from([("kind".to_string(), "road_class".to_string())]),
            pool_size: None,
        }
    }

    fn request(query_string: &str) -> TileRequest {
        TileRequest::new(
            TileCoord::new(0, 0, 0).unwrap(),
            TileRequest::parse_args(query_string),
        )
    }

    fn query_for(cfg: &PgConfig, query_string: &str) -> String {
        let relation = relation_from(cfg).unwrap();
        let req = request(query_string);
        let mut fields = cfg.source_fields.clone();
        fields.extend(req.extra_source_fields().unwrap());
        build_query(&relation, &cfg.geometry_field, &req, &fields)
    }

    #[test]
    fn relation_requires_exactly_one_of_table_and_expression() {
        let mut cfg = config();
        assert_eq!(relation_from(&cfg).unwrap(), "public.roads");

        cfg.schema = None;
        assert_eq!(relation_from(&cfg).unwrap(), "roads");

        cfg.table_expression = Some("SELECT * FROM roads".to_string());
        assert!(matches!(
            relation_from(&cfg),
            Err(PgError::AmbiguousRelation)
        ));

        cfg.table = None;
        assert_eq!(relation_from(&cfg).unwrap(), "(SELECT * FROM roads)");

        cfg.table_expression = None;
        assert!(matches!(
            relation_from(&cfg),
            Err(PgError::AmbiguousRelation)
        ));
    }

    #[test]
    fn query_selects_wkb_and_aliased_fields_from_a_cte() {
        let sql = query_for(&config(), "");
        assert!(sql.starts_with("WITH src AS (SELECT * FROM public.roads) SELECT"));
        assert!(sql.contains("ST_AsBinary(geom) AS geom"));
        assert!(sql.contains("road_class AS \"kind\""));
        assert!(sql.contains("ST_Intersects(geom, ST_MakeEnvelope(-180, "));
        assert!(sql.contains(", 4326))"));
    }

    #[test]
    fn every_filter_is_anded() {
        let sql = query_for(&config(), "q=lanes%20%3E%202&q=bridge");
        assert!(sql.contains("AND (lanes > 2) AND (bridge)"));
    }

    #[test]
    fn extra_source_fields_join_the_select_list() {
        let sql = query_for(&config(), "s=name:road_name");
        assert!(sql.contains("road_name AS \"name\""));
        assert!(sql.contains("road_class AS \"kind\""));
    }
}
