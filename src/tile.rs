use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt::{Display, Formatter};

/// Highest zoom level the server accepts.
pub const MAX_ZOOM: u8 = 22;

/// Tile-local coordinate space used for MVT encoding.
pub const EXTENT: u32 = 4096;

/// Clipping buffer around the tile extent, in extent units.
pub const BUFFER: i32 = 64;

/// Largest latitude representable in web-mercator.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

pub type TileResult<T> = Result<T, TileError>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TileError {
    #[error("Invalid zoom {0}: must be within [0, {MAX_ZOOM}]")]
    InvalidZoom(u32),

    #[error("Invalid tile column/row ({x}, {y}) at zoom {z}")]
    InvalidCoordinate { z: u8, x: u32, y: u32 },

    #[error("Invalid extra source field '{0}': expected 'property:path'")]
    BadSourceField(String),
}

/// A web-mercator tile address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Validates `(z, x, y)` against the slippy-map grid.
    pub fn new(z: u32, x: u32, y: u32) -> TileResult<Self> {
        if z > u32::from(MAX_ZOOM) {
            return Err(TileError::InvalidZoom(z));
        }
        let z = z as u8;
        let last = (1_u32 << z) - 1;
        if x > last || y > last {
            return Err(TileError::InvalidCoordinate { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    /// Geographic bounding box of this tile in WGS84 lon/lat.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        let n = f64::from(1_u32 << self.z);
        Bounds {
            left: f64::from(self.x) / n * 360.0 - 180.0,
            bottom: row_to_lat(f64::from(self.y) + 1.0, n),
            right: (f64::from(self.x) + 1.0) / n * 360.0 - 180.0,
            top: row_to_lat(f64::from(self.y), n),
        }
    }

    /// Projects a WGS84 position into this tile's pixel space (y grows down).
    #[must_use]
    pub fn project(&self, extent: u32, lon: f64, lat: f64) -> (f64, f64) {
        let n = f64::from(1_u32 << self.z);
        let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
        let world_x = (lon + 180.0) / 360.0 * n;
        let world_y = (1.0 - lat.tan().asinh() / PI) / 2.0 * n;
        (
            (world_x - f64::from(self.x)) * f64::from(extent),
            (world_y - f64::from(self.y)) * f64::from(extent),
        )
    }

    /// Inverse of [`project`](Self::project): tile pixels back to WGS84.
    #[must_use]
    pub fn unproject(&self, extent: u32, px: f64, py: f64) -> (f64, f64) {
        let n = f64::from(1_u32 << self.z);
        let world_x = f64::from(self.x) + px / f64::from(extent);
        let world_y = f64::from(self.y) + py / f64::from(extent);
        (world_x / n * 360.0 - 180.0, row_to_lat(world_y, n))
    }
}

fn row_to_lat(row: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * row / n)).sinh().atan().to_degrees()
}

impl Display for TileCoord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// WGS84 bounding box, `left/bottom/right/top` order.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

/// Multi-valued URL query arguments, keyed in sorted order.
pub type QueryArgs = BTreeMap<String, Vec<String>>;

/// A validated tile request: coordinate plus the raw query arguments.
///
/// Two argument names are reserved, both repeatable: `q` carries free-form
/// filter expressions handed verbatim to the backend, and `s` carries
/// `property:path` extra source fields.
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub coord: TileCoord,
    pub args: QueryArgs,
}

impl TileRequest {
    #[must_use]
    pub fn new(coord: TileCoord, args: QueryArgs) -> Self {
        Self { coord, args }
    }

    /// Parses the raw query string into multi-valued arguments.
    #[must_use]
    pub fn parse_args(query: &str) -> QueryArgs {
        let mut args = QueryArgs::new();
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            args.entry(k.into_owned()).or_default().push(v.into_owned());
        }
        args
    }

    /// The `q` filter expressions, in request order.
    #[must_use]
    pub fn filters(&self) -> &[String] {
        match self.args.get("q") {
            Some(values) => values,
            None => &[],
        }
    }

    /// Parses the `s` args into a `{property → source path}` map.
    pub fn extra_source_fields(&self) -> TileResult<BTreeMap<String, String>> {
        let mut fields = BTreeMap::new();
        for spec in self.args.get("s").into_iter().flatten() {
            let (prop, path) = spec
                .split_once(':')
                .ok_or_else(|| TileError::BadSourceField(spec.clone()))?;
            fields.insert(prop.to_string(), path.to_string());
        }
        Ok(fields)
    }

    /// Canonical `key=value&…` encoding with keys and values sorted, used in
    /// cache keys so that argument order does not fragment the cache.
    #[must_use]
    pub fn sorted_query_string(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.args {
            let mut values = values.clone();
            values.sort();
            for value in &values {
                ser.append_pair(key, value);
            }
        }
        ser.finish()
    }
}
