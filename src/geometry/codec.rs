//! Decoding of raw geometry bytes into [`geo`] types, and GeoJSON encoding of merged shapes.
//!
//! Two encodings are accepted, distinguished by the first non-whitespace byte:
//!
//! - GeoJSON geometry objects (`{"type": "Polygon", "coordinates": ...}`), as found in feature
//!   collections and CSV exports
//! - WKB / EWKB (byte order marker `0x00` or `0x01`), as found in GeoParquet columns
//!
//! Supported geometry types are `Point`, `MultiPoint`, `Polygon` and `MultiPolygon`. Anything
//! else is a [`LotError::GeometryParse`].

use geo::{Coord, Geometry, LineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde::Deserialize;
use serde_json::json;

use crate::error::{LotError, LotResult};

/// Parse one raw geometry.
pub fn parse_geometry(raw: &[u8]) -> LotResult<Geometry<f64>> {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .ok_or_else(|| LotError::geometry("empty geometry"))?;
    match raw[start] {
        b'{' => parse_geojson(&raw[start..]),
        0 | 1 => WkbReader::new(&raw[start..]).read_geometry(),
        other => Err(LotError::geometry(format!(
            "unrecognized geometry encoding (first byte 0x{other:02x})"
        ))),
    }
}

#[derive(Deserialize)]
struct RawGeoJson {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

type Position = Vec<f64>;
type Ring = Vec<Position>;

/// Parse a GeoJSON geometry object.
pub fn parse_geojson(raw: &[u8]) -> LotResult<Geometry<f64>> {
    let g: RawGeoJson = serde_json::from_slice(raw)
        .map_err(|e| LotError::geometry(format!("invalid geojson: {e}")))?;
    let coords = g.coordinates;
    let decode_err = |e: serde_json::Error| LotError::geometry(format!("invalid {} coordinates: {e}", g.kind));

    match g.kind.as_str() {
        "Point" => {
            let p: Position = serde_json::from_value(coords).map_err(decode_err)?;
            Ok(Geometry::Point(Point(position(&p)?)))
        }
        "MultiPoint" => {
            let ps: Vec<Position> = serde_json::from_value(coords).map_err(decode_err)?;
            let points = ps
                .iter()
                .map(|p| position(p).map(Point))
                .collect::<LotResult<Vec<_>>>()?;
            Ok(Geometry::MultiPoint(MultiPoint::new(points)))
        }
        "Polygon" => {
            let rings: Vec<Ring> = serde_json::from_value(coords).map_err(decode_err)?;
            Ok(Geometry::Polygon(polygon(&rings)?))
        }
        "MultiPolygon" => {
            let polys: Vec<Vec<Ring>> = serde_json::from_value(coords).map_err(decode_err)?;
            let polygons = polys
                .iter()
                .map(|rings| polygon(rings))
                .collect::<LotResult<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
        }
        other => Err(LotError::geometry(format!("unsupported geometry type '{other}'"))),
    }
}

fn position(p: &[f64]) -> LotResult<Coord<f64>> {
    match p {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
        _ => Err(LotError::geometry(format!("invalid position {p:?}"))),
    }
}

fn polygon(rings: &[Ring]) -> LotResult<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| {
        ring.iter()
            .map(|p| position(p))
            .collect::<LotResult<Vec<_>>>()
            .map(LineString::new)
    });
    let exterior = rings
        .next()
        .ok_or_else(|| LotError::geometry("polygon has no rings"))??;
    if exterior.0.len() < 4 {
        return Err(LotError::geometry("polygon ring has fewer than 4 positions"));
    }
    let interiors = rings.collect::<LotResult<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Encode a geometry as a GeoJSON geometry object.
///
/// Only the shapes the aggregator produces are encoded; other variants become `null`.
pub fn to_geojson(geometry: &Geometry<f64>) -> serde_json::Value {
    match geometry {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": coord_json(p.0)}),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.0.iter().map(|p| coord_json(p.0)).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(p) => json!({"type": "Polygon", "coordinates": polygon_json(p)}),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_json).collect::<Vec<_>>(),
        }),
        _ => serde_json::Value::Null,
    }
}

fn coord_json(c: Coord<f64>) -> serde_json::Value {
    json!([c.x, c.y])
}

fn polygon_json(p: &Polygon<f64>) -> serde_json::Value {
    std::iter::once(p.exterior())
        .chain(p.interiors())
        .map(|ring| ring.0.iter().map(|c| coord_json(*c)).collect::<Vec<_>>())
        .collect::<Vec<_>>()
        .into()
}

const WKB_POINT: u32 = 1;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTIPOLYGON: u32 = 6;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

struct WkbReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

struct WkbHeader {
    little_endian: bool,
    kind: u32,
    extra_dims: usize,
}

impl<'a> WkbReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> LotResult<[u8; N]> {
        let end = self.pos + N;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| LotError::geometry(format!("truncated wkb at byte {}", self.pos)))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u32(&mut self, le: bool) -> LotResult<u32> {
        let b = self.take::<4>()?;
        Ok(if le { u32::from_le_bytes(b) } else { u32::from_be_bytes(b) })
    }

    fn f64(&mut self, le: bool) -> LotResult<f64> {
        let b = self.take::<8>()?;
        Ok(if le { f64::from_le_bytes(b) } else { f64::from_be_bytes(b) })
    }

    fn header(&mut self) -> LotResult<WkbHeader> {
        let little_endian = match self.take::<1>()?[0] {
            0 => false,
            1 => true,
            other => return Err(LotError::geometry(format!("invalid wkb byte order {other}"))),
        };
        let raw = self.u32(little_endian)?;
        if raw & EWKB_SRID != 0 {
            let _srid = self.u32(little_endian)?;
        }
        let base = raw & 0x0FFF_FFFF;
        // ISO WKB encodes Z/M/ZM as +1000/+2000/+3000.
        let iso_extra = match base / 1000 {
            1 | 2 => 1,
            3 => 2,
            _ => 0,
        };
        let extra_dims = iso_extra + usize::from(raw & EWKB_Z != 0) + usize::from(raw & EWKB_M != 0);
        Ok(WkbHeader {
            little_endian,
            kind: base % 1000,
            extra_dims,
        })
    }

    fn coord(&mut self, h: &WkbHeader) -> LotResult<Coord<f64>> {
        let x = self.f64(h.little_endian)?;
        let y = self.f64(h.little_endian)?;
        for _ in 0..h.extra_dims {
            let _ = self.f64(h.little_endian)?;
        }
        if !x.is_finite() || !y.is_finite() {
            return Err(LotError::geometry("empty or non-finite wkb point"));
        }
        Ok(Coord { x, y })
    }

    /// Read an element count and check the remaining input can hold that many elements of at
    /// least `min_bytes` each.
    fn count(&mut self, h: &WkbHeader, min_bytes: usize) -> LotResult<usize> {
        let n = self.u32(h.little_endian)? as usize;
        let remaining = self.buf.len() - self.pos;
        if n.saturating_mul(min_bytes) > remaining {
            return Err(LotError::geometry(format!(
                "wkb count {n} exceeds the {remaining} bytes left"
            )));
        }
        Ok(n)
    }

    fn polygon_body(&mut self, h: &WkbHeader) -> LotResult<Polygon<f64>> {
        let coord_bytes = 16 + 8 * h.extra_dims;
        let n_rings = self.count(h, 4)?;
        let mut rings = Vec::with_capacity(n_rings);
        for _ in 0..n_rings {
            let n = self.count(h, coord_bytes)?;
            let coords = (0..n).map(|_| self.coord(h)).collect::<LotResult<Vec<_>>>()?;
            rings.push(LineString::new(coords));
        }
        let mut rings = rings.into_iter();
        let exterior = rings
            .next()
            .ok_or_else(|| LotError::geometry("polygon has no rings"))?;
        Ok(Polygon::new(exterior, rings.collect()))
    }

    /// Header of a multi-geometry member, which must be of `kind`.
    fn member_header(&mut self, kind: u32) -> LotResult<WkbHeader> {
        let h = self.header()?;
        if h.kind != kind {
            return Err(LotError::geometry(format!(
                "wkb member of type {} where type {kind} was expected",
                h.kind
            )));
        }
        Ok(h)
    }

    fn read_geometry(&mut self) -> LotResult<Geometry<f64>> {
        let h = self.header()?;
        match h.kind {
            WKB_POINT => Ok(Geometry::Point(Point(self.coord(&h)?))),
            WKB_POLYGON => Ok(Geometry::Polygon(self.polygon_body(&h)?)),
            WKB_MULTIPOINT => {
                // Byte order, type and two ordinates.
                let n = self.count(&h, 5 + 16)?;
                let mut points = Vec::with_capacity(n);
                for _ in 0..n {
                    let member = self.member_header(WKB_POINT)?;
                    points.push(Point(self.coord(&member)?));
                }
                Ok(Geometry::MultiPoint(MultiPoint::new(points)))
            }
            WKB_MULTIPOLYGON => {
                // Byte order, type and ring count.
                let n = self.count(&h, 5 + 4)?;
                let mut polygons = Vec::with_capacity(n);
                for _ in 0..n {
                    let member = self.member_header(WKB_POLYGON)?;
                    polygons.push(self.polygon_body(&member)?);
                }
                Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
            }
            other => Err(LotError::geometry(format!("unsupported wkb geometry type {other}"))),
        }
    }
}
