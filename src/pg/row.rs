use geojson::Feature;
use geozero::ToGeo;
use log::warn;
use tokio_postgres::types::Type;
use tokio_postgres::Row;

use super::{PgError, PgResult};
use crate::source::json_value_to_id;

/// Decodes one result row into a GeoJSON feature: the geometry column via
/// WKB, everything else as scalar properties keyed by column name. Null
/// properties are suppressed; a null or undecodable geometry fails the row.
pub fn row_to_feature(row: &Row, geometry_field: &str) -> PgResult<Feature> {
    let mut properties = serde_json::Map::new();
    let mut geometry = None;

    for (idx, column) in row.columns().iter().enumerate() {
        if column.name() == geometry_field {
            let wkb: Option<Vec<u8>> = row.try_get(idx)?;
            let wkb = wkb.ok_or_else(|| {
                PgError::BadGeometry(geometry_field.to_string(), "null value".to_string())
            })?;
            let geom = geozero::wkb::Wkb(wkb)
                .to_geo()
                .map_err(|e| PgError::BadGeometry(geometry_field.to_string(), e.to_string()))?;
            geometry = Some(geojson::Geometry::new(geojson::Value::from(&geom)));
        } else if let Some(value) = scan_column(row, idx, column.type_())? {
            properties.insert(column.name().to_string(), value);
        }
    }

    let geometry = geometry.ok_or_else(|| {
        PgError::BadGeometry(
            geometry_field.to_string(),
            "column missing from result".to_string(),
        )
    })?;

    Ok(Feature {
        bbox: None,
        geometry: Some(geometry),
        id: properties.get("id").and_then(json_value_to_id),
        properties: Some(properties),
        foreign_members: None,
    })
}

fn scan_column(row: &Row, idx: usize, ty: &Type) -> PgResult<Option<serde_json::Value>> {
    use serde_json::Value;

    // Type consts are not usable as match patterns, so dispatch by name.
    Ok(match ty.name() {
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
        "float4" => row.try_get::<_, Option<f32>>(idx)?.map(Value::from),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(Value::from),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Value::from),
        "text" | "varchar" | "bpchar" | "name" => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::from)
        }
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map(|bytes| Value::from(hex::encode(bytes))),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(|ts| Value::from(ts.to_string())),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|ts| Value::from(ts.to_rfc3339())),
        "json" | "jsonb" => row.try_get::<_, Option<serde_json::Value>>(idx)?,
        other => {
            warn!(
                "Skipping column [{}] with unsupported type {other}",
                row.columns()[idx].name()
            );
            None
        }
    })
}
