use geo::{Coord, EuclideanLength, LineString, Simplify};
use geozero::mvt::tile;
use log::warn;

use super::geometry_decoding::decode_geom;
use super::geometry_encoding::{encode_geom, ring_area2, TileGeometry};

/// Simplification radius at the layer's maximum zoom.
pub const MIN_SIMPLIFY: f64 = 1.0;
/// Simplification radius at the layer's minimum zoom.
pub const MAX_SIMPLIFY: f64 = 10.0;

/// Linear ramp from [`MAX_SIMPLIFY`] at the layer's minzoom down to
/// [`MIN_SIMPLIFY`] at its maxzoom: aggressive on coarse tiles, near-identity
/// when zoomed in. A layer whose zoom range is empty or inverted (including
/// the `maxzoom == 0` "unbounded" overload) pins the radius at
/// [`MAX_SIMPLIFY`].
#[must_use]
pub fn simplification_epsilon(minzoom: u8, maxzoom: u8, zoom: u8) -> f64 {
    if maxzoom <= minzoom {
        return MAX_SIMPLIFY;
    }
    let slope = (MIN_SIMPLIFY - MAX_SIMPLIFY) / f64::from(maxzoom - minzoom);
    MAX_SIMPLIFY + slope * (f64::from(zoom) - f64::from(minzoom))
}

/// Runs Douglas–Peucker over every feature of the layer, in place.
/// Points are untouched; degenerate paths left behind by the reduction are
/// dropped here and the features they belonged to get pruned by
/// [`remove_empty`].
pub fn simplify_layer(layer: &mut tile::Layer, epsilon: f64) {
    for feature in &mut layer.features {
        let geom = match decode_geom(&feature.geometry, feature.r#type()) {
            Ok(geom) => geom,
            Err(e) => {
                warn!("Leaving undecodable geometry as-is in layer [{}]: {e}", layer.name);
                continue;
            }
        };
        let simplified = match geom {
            TileGeometry::Points(_) => continue,
            TileGeometry::Lines(lines) => TileGeometry::Lines(
                lines
                    .iter()
                    .map(|line| simplify_path(line, epsilon, false))
                    .filter(|line| line.len() >= 2)
                    .collect(),
            ),
            TileGeometry::Polygons(rings) => TileGeometry::Polygons(
                rings
                    .iter()
                    .map(|ring| simplify_path(ring, epsilon, true))
                    .filter(|ring| ring.len() >= 3)
                    .collect(),
            ),
        };
        feature.geometry = encode_geom(&simplified);
    }
}

fn simplify_path(path: &[(i32, i32)], epsilon: f64, close: bool) -> Vec<(i32, i32)> {
    let mut coords: Vec<Coord<f64>> = path
        .iter()
        .map(|&(x, y)| Coord {
            x: f64::from(x),
            y: f64::from(y),
        })
        .collect();
    if close {
        coords.push(coords[0]);
    }
    let simplified = LineString::new(coords).simplify(&epsilon);
    let mut path: Vec<(i32, i32)> = simplified
        .0
        .iter()
        .map(|c| (c.x.round() as i32, c.y.round() as i32))
        .collect();
    if close && path.len() > 1 && path.first() == path.last() {
        path.pop();
    }
    path
}

/// Drops features whose geometry has degenerated: lines shorter than
/// `min_length`, polygons smaller than `min_area`. Point features always
/// survive.
pub fn remove_empty(layer: &mut tile::Layer, min_area: f64, min_length: f64) {
    layer.features.retain(|feature| {
        match decode_geom(&feature.geometry, feature.r#type()) {
            Ok(TileGeometry::Points(points)) => !points.is_empty(),
            Ok(TileGeometry::Lines(lines)) => total_length(&lines) >= min_length,
            Ok(TileGeometry::Polygons(rings)) => total_area(&rings) >= min_area,
            // Not this pass's job to judge what it cannot decode.
            Err(_) => true,
        }
    });
}

fn total_length(lines: &[Vec<(i32, i32)>]) -> f64 {
    lines
        .iter()
        .map(|line| {
            LineString::new(
                line.iter()
                    .map(|&(x, y)| Coord {
                        x: f64::from(x),
                        y: f64::from(y),
                    })
                    .collect(),
            )
            .euclidean_length()
        })
        .sum()
}

fn total_area(rings: &[Vec<(i32, i32)>]) -> f64 {
    // Signed sum keeps holes subtractive.
    let doubled: i64 = rings.iter().map(|ring| ring_area2(ring)).sum();
    (doubled as f64 / 2.0).abs()
}
