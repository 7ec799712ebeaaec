//! Grouping of geometry fragments by entity key, merging and centroid computation.

use std::collections::BTreeMap;

use geo::{BooleanOps, Centroid as _, Geometry, MultiPoint, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{LotError, LotResult};
use crate::key::{EntityKey, KeyRule};
use crate::report::RecordIssue;
use crate::types::{DataSet, Value};

use super::codec::parse_geometry;

/// Decimal places kept for output coordinates.
pub const COORD_DECIMALS: i32 = 5;

/// Round a coordinate to [`COORD_DECIMALS`] places.
pub fn round_coord(v: f64) -> f64 {
    let factor = 10f64.powi(COORD_DECIMALS);
    (v * factor).round() / factor
}

/// Where a source keeps its shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeometrySource {
    /// A [`crate::types::DataType::Geometry`] (or text) column of GeoJSON/WKB.
    Column(String),
    /// Two numeric columns holding a point (e.g. transit stop latitude/longitude).
    LonLat { lon: String, lat: String },
}

/// How fragments sharing a key are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Gather the distinct parts into one multi-geometry.
    #[default]
    Collect,
    /// Boolean union of polygonal parts; shared edges and overlaps dissolve.
    Dissolve,
}

/// Representative point of a merged geometry, rounded to [`COORD_DECIMALS`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    pub lon: f64,
    pub lat: f64,
}

/// All fragments that share one [`EntityKey`], their merged shape and its centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryGroup {
    pub key: EntityKey,
    pub fragments: Vec<Geometry<f64>>,
    /// `None` when every fragment of the key failed to parse.
    pub merged: Option<Geometry<f64>>,
    pub centroid: Option<Centroid>,
}

impl GeometryGroup {
    pub fn from_fragments(key: EntityKey, fragments: Vec<Geometry<f64>>, mode: MergeMode) -> Self {
        let merged = merge_geometries(&fragments, mode);
        let centroid = merged.as_ref().and_then(centroid_of);
        Self {
            key,
            fragments,
            merged,
            centroid,
        }
    }
}

/// Merge fragments into a single multi-geometry.
///
/// Polygonal parts win over points when both are present. Returns `None` for an empty input.
/// In [`MergeMode::Collect`] the merge is idempotent: merging a merged geometry with itself
/// returns it unchanged.
pub fn merge_geometries(parts: &[Geometry<f64>], mode: MergeMode) -> Option<Geometry<f64>> {
    let mut polygons = Vec::new();
    let mut points = Vec::new();
    for part in parts {
        flatten(part, &mut polygons, &mut points);
    }

    if !polygons.is_empty() {
        let merged = match mode {
            MergeMode::Collect => MultiPolygon::new(polygons),
            MergeMode::Dissolve => dissolve(polygons),
        };
        return Some(Geometry::MultiPolygon(merged));
    }
    if !points.is_empty() {
        return Some(Geometry::MultiPoint(MultiPoint::new(points)));
    }
    None
}

fn flatten(g: &Geometry<f64>, polygons: &mut Vec<Polygon<f64>>, points: &mut Vec<Point<f64>>) {
    match g {
        Geometry::Polygon(p) => push_distinct(polygons, p.clone()),
        Geometry::MultiPolygon(mp) => mp.0.iter().for_each(|p| push_distinct(polygons, p.clone())),
        Geometry::Rect(r) => push_distinct(polygons, r.to_polygon()),
        Geometry::Triangle(t) => push_distinct(polygons, t.to_polygon()),
        Geometry::Point(p) => push_distinct(points, *p),
        Geometry::MultiPoint(mp) => mp.0.iter().for_each(|p| push_distinct(points, *p)),
        Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|g| flatten(g, polygons, points)),
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {}
    }
}

fn push_distinct<T: PartialEq>(out: &mut Vec<T>, item: T) {
    if !out.contains(&item) {
        out.push(item);
    }
}

fn dissolve(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    polygons
        .into_iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, p| {
            acc.union(&MultiPolygon::new(vec![p]))
        })
}

/// Centroid of a merged geometry, rounded for output.
pub fn centroid_of(merged: &Geometry<f64>) -> Option<Centroid> {
    let p = merged.centroid()?;
    if !p.x().is_finite() || !p.y().is_finite() {
        return None;
    }
    Some(Centroid {
        lon: round_coord(p.x()),
        lat: round_coord(p.y()),
    })
}

/// Result of aggregating one source.
#[derive(Debug, Clone, Default)]
pub struct GeometryAggregation {
    /// One group per distinct key, ordered by key.
    pub groups: Vec<GeometryGroup>,
    pub issues: Vec<RecordIssue>,
}

enum BoundGeometry {
    Column(usize),
    LonLat { lon: usize, lat: usize },
}

/// Group the records of `dataset` by key and merge each group's geometries.
///
/// Records without a key are skipped and reported. Records whose geometry fails to decode are
/// reported and contribute no fragment, but their key still gets a group so it reaches the
/// output with a null centroid.
pub fn aggregate(
    source_name: &str,
    dataset: &DataSet,
    key: &KeyRule,
    geometry: &GeometrySource,
    mode: MergeMode,
) -> LotResult<GeometryAggregation> {
    let key_rule = key.bind(&dataset.schema)?;
    let geometry = match geometry {
        GeometrySource::Column(c) => BoundGeometry::Column(dataset.schema.require(c)?),
        GeometrySource::LonLat { lon, lat } => BoundGeometry::LonLat {
            lon: dataset.schema.require(lon)?,
            lat: dataset.schema.require(lat)?,
        },
    };

    let mut by_key: BTreeMap<EntityKey, Vec<Geometry<f64>>> = BTreeMap::new();
    let mut issues = Vec::new();

    for (idx0, row) in dataset.rows.iter().enumerate() {
        let row_num = idx0 + 1;
        let Some(k) = key_rule.key_for(row) else {
            tracing::warn!(source = source_name, row = row_num, "skipping record without key");
            issues.push(RecordIssue::key_missing(source_name, row_num));
            continue;
        };

        let fragments = by_key.entry(k).or_default();
        match fragment_for(row, &geometry) {
            Ok(g) => fragments.push(g),
            Err(e) => {
                tracing::warn!(source = source_name, row = row_num, error = %e, "dropping geometry");
                issues.push(RecordIssue::geometry(source_name, row_num, &e));
            }
        }
    }

    let groups = by_key
        .into_iter()
        .map(|(k, fragments)| GeometryGroup::from_fragments(k, fragments, mode))
        .collect::<Vec<_>>();
    tracing::debug!(source = source_name, groups = groups.len(), "geometry groups merged");

    Ok(GeometryAggregation { groups, issues })
}

fn fragment_for(row: &[Value], geometry: &BoundGeometry) -> LotResult<Geometry<f64>> {
    match *geometry {
        BoundGeometry::Column(idx) => match row.get(idx) {
            Some(Value::Geometry(bytes)) => parse_geometry(bytes),
            Some(Value::Utf8(text)) => parse_geometry(text.as_bytes()),
            Some(Value::Null) | None => Err(LotError::geometry("missing geometry")),
            Some(other) => Err(LotError::geometry(format!("not a geometry: {other}"))),
        },
        BoundGeometry::LonLat { lon, lat } => {
            let lon = row.get(lon).and_then(Value::as_f64);
            let lat = row.get(lat).and_then(Value::as_f64);
            match (lon, lat) {
                (Some(x), Some(y)) if x.is_finite() && y.is_finite() => {
                    Ok(Geometry::Point(Point::new(x, y)))
                }
                _ => Err(LotError::geometry("missing or invalid lon/lat")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        aggregate, centroid_of, merge_geometries, round_coord, Centroid, GeometryGroup, GeometrySource,
        MergeMode,
    };
    use crate::key::{EntityKey, KeyRule};
    use crate::report::IssueKind;
    use crate::types::{DataSet, DataType, Field, Schema, Value};
    use geo::{polygon, Area, Contains, ConvexHull, Geometry, MultiPolygon, Point};

    fn square(x0: f64, y0: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0),
            (x: x0 + 1.0, y: y0),
            (x: x0 + 1.0, y: y0 + 1.0),
            (x: x0, y: y0 + 1.0),
            (x: x0, y: y0),
        ])
    }

    fn geojson_square(x0: f64) -> Value {
        let text = format!(
            r#"{{"type":"Polygon","coordinates":[[[{a},0],[{b},0],[{b},1],[{a},1],[{a},0]]]}}"#,
            a = x0,
            b = x0 + 1.0
        );
        Value::Geometry(text.into_bytes())
    }

    #[test]
    fn two_fragments_make_one_group_with_centroid_inside_hull() {
        let schema = Schema::new(vec![
            Field::new("pin", DataType::Utf8),
            Field::new("geometry", DataType::Geometry),
        ]);
        let ds = DataSet::new(
            schema,
            vec![
                vec![Value::Utf8("001-02".to_string()), geojson_square(0.0)],
                vec![Value::Utf8("001-02".to_string()), geojson_square(2.0)],
            ],
        );

        let out = aggregate(
            "parcels",
            &ds,
            &KeyRule::Column("pin".to_string()),
            &GeometrySource::Column("geometry".to_string()),
            MergeMode::Collect,
        )
        .unwrap();

        assert_eq!(out.groups.len(), 1);
        let group = &out.groups[0];
        assert_eq!(group.key, EntityKey::from("001-02"));
        assert_eq!(group.fragments.len(), 2);
        let c = group.centroid.unwrap();
        assert_eq!(c, Centroid { lon: 1.5, lat: 0.5 });

        let merged = match group.merged.as_ref().unwrap() {
            Geometry::MultiPolygon(mp) => mp.clone(),
            other => panic!("expected multipolygon, got {other:?}"),
        };
        assert!(merged.convex_hull().contains(&Point::new(c.lon, c.lat)));
    }

    #[test]
    fn bad_geometries_are_dropped_but_key_survives() {
        let schema = Schema::new(vec![
            Field::new("pin", DataType::Utf8),
            Field::new("geometry", DataType::Geometry),
        ]);
        let ds = DataSet::new(
            schema,
            vec![
                vec![Value::Utf8("7".to_string()), Value::Geometry(b"not a shape".to_vec())],
                vec![Value::Null, geojson_square(0.0)],
                vec![Value::Utf8("8".to_string()), geojson_square(0.0)],
                vec![Value::Utf8("8".to_string()), Value::Null],
            ],
        );

        let out = aggregate(
            "parcels",
            &ds,
            &KeyRule::Column("pin".to_string()),
            &GeometrySource::Column("geometry".to_string()),
            MergeMode::Collect,
        )
        .unwrap();

        let keys: Vec<&str> = out.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["7", "8"]);
        assert_eq!(out.groups[0].merged, None);
        assert_eq!(out.groups[0].centroid, None);
        assert_eq!(out.groups[1].centroid, Some(Centroid { lon: 0.5, lat: 0.5 }));
        assert_eq!(out.issues.len(), 3);
        assert_eq!(out.issues.iter().map(|i| i.row).collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    #[test]
    fn hostile_wkb_is_counted_not_fatal() {
        let mut nested = Vec::new();
        for _ in 0..200_000 {
            nested.push(1u8);
            nested.extend_from_slice(&4u32.to_le_bytes());
            nested.extend_from_slice(&1u32.to_le_bytes());
        }
        let mut huge_polygon = vec![1u8];
        huge_polygon.extend_from_slice(&3u32.to_le_bytes());
        huge_polygon.extend_from_slice(&u32::MAX.to_le_bytes());

        let schema = Schema::new(vec![
            Field::new("pin", DataType::Utf8),
            Field::new("geometry", DataType::Geometry),
        ]);
        let ds = DataSet::new(
            schema,
            vec![
                vec![Value::Utf8("1".to_string()), Value::Geometry(nested)],
                vec![Value::Utf8("2".to_string()), Value::Geometry(huge_polygon)],
                vec![Value::Utf8("2".to_string()), geojson_square(0.0)],
            ],
        );

        let out = aggregate(
            "stops",
            &ds,
            &KeyRule::Column("pin".to_string()),
            &GeometrySource::Column("geometry".to_string()),
            MergeMode::Collect,
        )
        .unwrap();
        assert_eq!(out.groups.len(), 2);
        assert_eq!(out.groups[0].centroid, None);
        assert_eq!(out.groups[1].centroid, Some(Centroid { lon: 0.5, lat: 0.5 }));
        assert!(out.issues.iter().all(|i| i.kind == IssueKind::GeometryParse));
        assert_eq!(out.issues.len(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let parts = vec![square(0.0, 0.0), square(2.0, 0.0), square(0.0, 0.0)];
        let merged = merge_geometries(&parts, MergeMode::Collect).unwrap();
        let again = merge_geometries(&[merged.clone(), merged.clone()], MergeMode::Collect).unwrap();
        assert_eq!(again, merged);
        match merged {
            Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected multipolygon, got {other:?}"),
        }
    }

    #[test]
    fn centroid_is_area_weighted_not_averaged_per_fragment() {
        // A 1x1 square and a 2x1 rectangle: per-fragment averaging would give lon=1.75.
        let wide = Geometry::Polygon(polygon![
            (x: 2.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 1.0),
            (x: 2.0, y: 1.0),
            (x: 2.0, y: 0.0),
        ]);
        let group = GeometryGroup::from_fragments(
            EntityKey::from("k"),
            vec![square(0.0, 0.0), wide],
            MergeMode::Collect,
        );
        let c = group.centroid.unwrap();
        assert_eq!(c.lon, round_coord((0.5 * 1.0 + 3.0 * 2.0) / 3.0));
        assert_eq!(c.lat, 0.5);
    }

    #[test]
    fn centroid_is_deterministic_and_rounded() {
        let g = Geometry::Point(Point::new(-78.4766781234, 38.0293059876));
        let first = centroid_of(&g).unwrap();
        for _ in 0..10 {
            assert_eq!(centroid_of(&g).unwrap(), first);
        }
        assert_eq!(first, Centroid { lon: -78.47668, lat: 38.02931 });
    }

    #[test]
    fn dissolve_unions_adjacent_fragments() {
        let merged = merge_geometries(&[square(0.0, 0.0), square(1.0, 0.0)], MergeMode::Dissolve).unwrap();
        let mp: MultiPolygon<f64> = match merged {
            Geometry::MultiPolygon(mp) => mp,
            other => panic!("expected multipolygon, got {other:?}"),
        };
        assert_eq!(mp.0.len(), 1);
        assert!((mp.unsigned_area() - 2.0).abs() < 1e-9);
        assert_eq!(centroid_of(&Geometry::MultiPolygon(mp)), Some(Centroid { lon: 1.0, lat: 0.5 }));
    }

    #[test]
    fn points_from_lon_lat_columns() {
        let schema = Schema::new(vec![
            Field::new("stop_code", DataType::Int64),
            Field::new("lon", DataType::Float64),
            Field::new("lat", DataType::Float64),
        ]);
        let ds = DataSet::new(
            schema,
            vec![
                vec![Value::Int64(42), Value::Float64(-78.5), Value::Float64(38.0)],
                vec![Value::Int64(42), Value::Float64(-78.5), Value::Float64(38.0)],
                vec![Value::Int64(43), Value::Null, Value::Float64(38.0)],
            ],
        );
        let out = aggregate(
            "stops",
            &ds,
            &KeyRule::Column("stop_code".to_string()),
            &GeometrySource::LonLat {
                lon: "lon".to_string(),
                lat: "lat".to_string(),
            },
            MergeMode::Collect,
        )
        .unwrap();
        assert_eq!(out.groups.len(), 2);
        assert_eq!(out.groups[0].centroid, Some(Centroid { lon: -78.5, lat: 38.0 }));
        assert_eq!(out.groups[1].centroid, None);
        assert_eq!(out.issues.len(), 1);
    }
}
