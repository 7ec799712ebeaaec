//! Geometry Aggregator: decodes per-record shapes, merges them per entity key and computes
//! a representative centroid.

pub mod aggregate;
pub mod codec;

pub use aggregate::{
    aggregate, centroid_of, merge_geometries, round_coord, Centroid, GeometryAggregation, GeometryGroup,
    GeometrySource, MergeMode, COORD_DECIMALS,
};
pub use codec::{parse_geometry, to_geojson};
