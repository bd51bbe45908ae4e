use geo::{BooleanOps, Coord, Geometry, LineString, MapCoords, MultiLineString, MultiPolygon, Polygon, Rect};
use log::warn;

use super::geometry_encoding::{ring_area2, TileGeometry};
use crate::tile::{TileCoord, BUFFER, EXTENT};

/// Projects a WGS84 geometry into the tile's pixel space.
#[must_use]
pub fn project(geom: Geometry<f64>, coord: TileCoord) -> Geometry<f64> {
    geom.map_coords(|c| {
        let (x, y) = coord.project(EXTENT, c.x, c.y);
        Coord { x, y }
    })
}

fn clip_bound() -> Rect<f64> {
    let min = f64::from(-BUFFER);
    let max = f64::from(EXTENT as i32 + BUFFER);
    Rect::new(Coord { x: min, y: min }, Coord { x: max, y: max })
}

/// Clips a projected geometry against the buffered tile extent and rounds it
/// to integral tile coordinates. Returns `None` when nothing of the geometry
/// survives the clip.
#[must_use]
pub fn clip_to_tile(geom: &Geometry<f64>) -> Option<TileGeometry> {
    let bound = clip_bound();
    let geom = match geom {
        Geometry::Point(p) => clip_points(&[p.0], bound),
        Geometry::MultiPoint(mp) => {
            clip_points(&mp.iter().map(|p| p.0).collect::<Vec<_>>(), bound)
        }
        Geometry::LineString(ls) => clip_lines(&MultiLineString::new(vec![ls.clone()]), bound),
        Geometry::MultiLineString(mls) => clip_lines(mls, bound),
        Geometry::Polygon(p) => clip_polygons(&MultiPolygon::new(vec![p.clone()]), bound),
        Geometry::MultiPolygon(mp) => clip_polygons(mp, bound),
        other => {
            warn!("Dropping feature with unsupported geometry type: {other:?}");
            return None;
        }
    };
    geom.filter(|g| !g.is_empty())
}

fn clip_points(points: &[Coord<f64>], bound: Rect<f64>) -> Option<TileGeometry> {
    let kept: Vec<(i32, i32)> = points
        .iter()
        .filter(|c| {
            c.x >= bound.min().x && c.x <= bound.max().x && c.y >= bound.min().y && c.y <= bound.max().y
        })
        .map(|c| round_coord(*c))
        .collect();
    Some(TileGeometry::Points(kept))
}

fn clip_lines(lines: &MultiLineString<f64>, bound: Rect<f64>) -> Option<TileGeometry> {
    let clipped = bound.to_polygon().clip(lines, false);
    let paths: Vec<Vec<(i32, i32)>> = clipped
        .iter()
        .map(|line| round_path(line))
        .filter(|path| path.len() >= 2)
        .collect();
    Some(TileGeometry::Lines(paths))
}

fn clip_polygons(polygons: &MultiPolygon<f64>, bound: Rect<f64>) -> Option<TileGeometry> {
    let window = MultiPolygon::new(vec![bound.to_polygon()]);
    let clipped = polygons.intersection(&window);
    let mut rings = Vec::new();
    for polygon in &clipped {
        append_polygon_rings(&mut rings, polygon);
    }
    Some(TileGeometry::Polygons(rings))
}

fn append_polygon_rings(rings: &mut Vec<Vec<(i32, i32)>>, polygon: &Polygon<f64>) {
    let Some(exterior) = round_ring(polygon.exterior()) else {
        return;
    };
    rings.push(oriented(exterior, true));
    for interior in polygon.interiors() {
        if let Some(ring) = round_ring(interior) {
            rings.push(oriented(ring, false));
        }
    }
}

fn oriented(mut ring: Vec<(i32, i32)>, exterior: bool) -> Vec<(i32, i32)> {
    let positive = ring_area2(&ring) > 0;
    if positive != exterior {
        ring.reverse();
    }
    ring
}

fn round_coord(c: Coord<f64>) -> (i32, i32) {
    (c.x.round() as i32, c.y.round() as i32)
}

/// Rounds a path, collapsing consecutive duplicates the rounding produced.
fn round_path(line: &LineString<f64>) -> Vec<(i32, i32)> {
    let mut path: Vec<(i32, i32)> = Vec::with_capacity(line.0.len());
    for point in &line.0 {
        let rounded = round_coord(*point);
        if path.last() != Some(&rounded) {
            path.push(rounded);
        }
    }
    path
}

/// Rounds a closed ring into open form; degenerate rings collapse to `None`.
fn round_ring(ring: &LineString<f64>) -> Option<Vec<(i32, i32)>> {
    let mut path = round_path(ring);
    if path.len() > 1 && path.first() == path.last() {
        path.pop();
    }
    (path.len() >= 3 && ring_area2(&path) != 0).then_some(path)
}
