use geozero::mvt::tile::GeomType;
use geozero::mvt::{Command, CommandInteger, ParameterInteger};

use super::geometry_encoding::TileGeometry;
use super::MvtError;

struct CommandCursor<'a> {
    commands: &'a [u32],
    pos: usize,
    x: i32,
    y: i32,
}

impl<'a> CommandCursor<'a> {
    fn new(commands: &'a [u32]) -> Self {
        Self {
            commands,
            pos: 0,
            x: 0,
            y: 0,
        }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.commands.len()
    }

    /// Reads the next command integer, returning `(id, count)`.
    fn command(&mut self) -> Result<(u32, u32), MvtError> {
        let raw = *self
            .commands
            .get(self.pos)
            .ok_or(MvtError::InvalidGeometry)?;
        self.pos += 1;
        let command = CommandInteger(raw);
        Ok((command.id(), command.count()))
    }

    fn expect(&mut self, id: Command, count: u32) -> Result<(), MvtError> {
        if self.command()? == (id as u32, count) {
            Ok(())
        } else {
            Err(MvtError::InvalidGeometry)
        }
    }

    /// Applies the next zigzag-encoded delta pair to the cursor.
    fn point(&mut self) -> Result<(i32, i32), MvtError> {
        let dx = ParameterInteger(
            *self
                .commands
                .get(self.pos)
                .ok_or(MvtError::InvalidGeometry)?,
        );
        let dy = ParameterInteger(
            *self
                .commands
                .get(self.pos + 1)
                .ok_or(MvtError::InvalidGeometry)?,
        );
        self.pos += 2;
        self.x += dx.value();
        self.y += dy.value();
        Ok((self.x, self.y))
    }
}

/// Decodes a feature's command stream back into tile-space paths.
pub fn decode_geom(commands: &[u32], geom_type: GeomType) -> Result<TileGeometry, MvtError> {
    let mut cursor = CommandCursor::new(commands);
    match geom_type {
        GeomType::Point => {
            let (id, count) = cursor.command()?;
            if id != Command::MoveTo as u32 {
                return Err(MvtError::InvalidGeometry);
            }
            let mut points = Vec::with_capacity(count as usize);
            for _ in 0..count {
                points.push(cursor.point()?);
            }
            Ok(TileGeometry::Points(points))
        }
        GeomType::Linestring => {
            let mut lines = Vec::new();
            while !cursor.is_done() {
                cursor.expect(Command::MoveTo, 1)?;
                let mut line = vec![cursor.point()?];
                let (id, count) = cursor.command()?;
                if id != Command::LineTo as u32 || count == 0 {
                    return Err(MvtError::InvalidGeometry);
                }
                for _ in 0..count {
                    line.push(cursor.point()?);
                }
                lines.push(line);
            }
            Ok(TileGeometry::Lines(lines))
        }
        GeomType::Polygon => {
            let mut rings = Vec::new();
            while !cursor.is_done() {
                cursor.expect(Command::MoveTo, 1)?;
                let mut ring = vec![cursor.point()?];
                let (id, count) = cursor.command()?;
                if id != Command::LineTo as u32 || count == 0 {
                    return Err(MvtError::InvalidGeometry);
                }
                for _ in 0..count {
                    ring.push(cursor.point()?);
                }
                cursor.expect(Command::ClosePath, 1)?;
                rings.push(ring);
            }
            Ok(TileGeometry::Polygons(rings))
        }
        GeomType::Unknown => Err(MvtError::UnsupportedGeometry("unknown")),
    }
}
