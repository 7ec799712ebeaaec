//! `lotbuild` turns heterogeneous municipal open-data extracts (parcel polygons, address points,
//! transit stops, ridership counts) into a single normalized "lots" table: one row per entity,
//! with a stable id, a representative point, descriptive attributes and a `posted` flag.
//!
//! The primary entrypoint is [`pipeline::build`], driven by a TOML [`config::BuildConfig`].
//!
//! ## Stages
//!
//! Data flows once through the stages, fully materialized between them:
//!
//! - [`ingestion`]: loads CSV, JSON / GeoJSON and Parquet into a [`types::DataSet`] typed by a
//!   declared [`types::Schema`]
//! - [`key`]: derives the [`key::EntityKey`] that correlates records across sources
//! - [`geometry`]: merges every shape sharing a key and computes its centroid
//! - [`processing`]: sentinel exclusion, deduplication, keyed reductions and the left outer join
//! - [`output`]: drop-and-recreate of the SQLite lots table with its `(filter, posted)` index
//!
//! Per-record problems (a record with no key, a geometry that does not decode) never abort a
//! build; they are collected in a [`report::BuildReport`]. Everything else is a [`LotError`].
//!
//! ## Quick example
//!
//! ```no_run
//! use std::path::Path;
//! use lotbuild::config::BuildConfig;
//!
//! # fn main() -> Result<(), lotbuild::LotError> {
//! let config = BuildConfig::load(Path::new("cville/build.toml"))?;
//! let report = lotbuild::pipeline::build(&config)?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Value types
//!
//! - [`types::DataType::Int64`]
//! - [`types::DataType::Float64`]
//! - [`types::DataType::Bool`]
//! - [`types::DataType::Utf8`]
//! - [`types::DataType::Geometry`]: GeoJSON text or (E)WKB bytes, decoded by [`geometry::codec`]
//!
//! Across formats, empty cells / empty strings / explicit JSON `null` map to [`types::Value::Null`].

pub mod config;
pub mod error;
pub mod geometry;
pub mod ingestion;
pub mod key;
pub mod output;
pub mod pipeline;
pub mod processing;
pub mod report;
pub mod types;

pub use error::{LotError, LotResult};
