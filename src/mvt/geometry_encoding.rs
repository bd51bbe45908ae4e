use geozero::mvt::tile::GeomType;
use geozero::mvt::{Command, CommandInteger, ParameterInteger};

/// Tile-space geometry, ready for command encoding.
///
/// Rings are stored open (no closing vertex) in exterior-then-interior order
/// with MVT winding: positive surveyor area marks an exterior ring in the
/// y-down tile plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileGeometry {
    Points(Vec<(i32, i32)>),
    Lines(Vec<Vec<(i32, i32)>>),
    Polygons(Vec<Vec<(i32, i32)>>),
}

impl TileGeometry {
    #[must_use]
    pub fn geom_type(&self) -> GeomType {
        match self {
            Self::Points(_) => GeomType::Point,
            Self::Lines(_) => GeomType::Linestring,
            Self::Polygons(_) => GeomType::Polygon,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Points(points) => points.is_empty(),
            Self::Lines(paths) | Self::Polygons(paths) => paths.is_empty(),
        }
    }
}

/// Doubled signed area of an open ring (surveyor's formula, closing edge
/// included). Positive means exterior under MVT winding.
#[must_use]
pub fn ring_area2(ring: &[(i32, i32)]) -> i64 {
    let n = ring.len();
    if n < 3 {
        return 0;
    }
    let mut sum = 0_i64;
    for i in 0..n {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % n];
        sum += i64::from(x0) * i64::from(y1) - i64::from(x1) * i64::from(y0);
    }
    sum
}

#[must_use]
pub fn encode_geom(geom: &TileGeometry) -> Vec<u32> {
    match geom {
        TileGeometry::Points(points) => encode_points(points),
        TileGeometry::Lines(lines) => encode_lines(lines),
        TileGeometry::Polygons(rings) => encode_rings(rings),
    }
}

fn push_delta(encoded: &mut Vec<u32>, cursor: &mut (i32, i32), point: (i32, i32)) {
    encoded.push(ParameterInteger::from(point.0 - cursor.0));
    encoded.push(ParameterInteger::from(point.1 - cursor.1));
    *cursor = point;
}

fn encode_points(points: &[(i32, i32)]) -> Vec<u32> {
    let mut encoded = Vec::with_capacity(points.len() * 2 + 1);
    encoded.push(CommandInteger::from(Command::MoveTo, points.len() as u32));
    let mut cursor = (0, 0);
    for &point in points {
        push_delta(&mut encoded, &mut cursor, point);
    }
    encoded
}

fn encode_lines(lines: &[Vec<(i32, i32)>]) -> Vec<u32> {
    let mut encoded = Vec::new();
    let mut cursor = (0, 0);
    for line in lines {
        encoded.push(CommandInteger::from(Command::MoveTo, 1));
        push_delta(&mut encoded, &mut cursor, line[0]);
        encoded.push(CommandInteger::from(Command::LineTo, line.len() as u32 - 1));
        for &point in &line[1..] {
            push_delta(&mut encoded, &mut cursor, point);
        }
    }
    encoded
}

fn encode_rings(rings: &[Vec<(i32, i32)>]) -> Vec<u32> {
    let mut encoded = Vec::new();
    let mut cursor = (0, 0);
    for ring in rings {
        encoded.push(CommandInteger::from(Command::MoveTo, 1));
        push_delta(&mut encoded, &mut cursor, ring[0]);
        encoded.push(CommandInteger::from(Command::LineTo, ring.len() as u32 - 1));
        for &point in &ring[1..] {
            push_delta(&mut encoded, &mut cursor, point);
        }
        encoded.push(CommandInteger::from(Command::ClosePath, 1));
    }
    encoded
}
