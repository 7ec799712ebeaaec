//! Build configuration, read from a TOML file.
//!
//! ```toml
//! [output]
//! path = "out/lots.db"
//! table = "lots"
//! filter_column = "id"
//! load_log = "out/loads.csv"
//!
//! [primary]
//! name = "parcels"
//! path = "parcels.geojson"
//! key = "pin"
//! geometry = "geometry"
//! schema = [
//!     { name = "pin", type = "utf8" },
//!     { name = "geometry", type = "geometry" },
//! ]
//!
//! [[attributes]]
//! name = "addresses"
//! path = "addresses.csv"
//! key = "pin"
//! schema = [{ name = "pin", type = "utf8" }, { name = "street", type = "utf8" }]
//! columns = [{ name = "address", rule = "concat", column = "street" }]
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LotError, LotResult};
use crate::geometry::{GeometrySource, MergeMode};
use crate::ingestion::SourceFormat;
use crate::key::KeyRule;
use crate::output::{TableSpec, RESERVED_COLUMNS};
use crate::processing::{ColumnRule, ColumnSpec, Exclusion, ReduceSpec, Reduction};
use crate::types::Schema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub output: OutputConfig,
    /// Source that defines the set of lots and their shapes.
    pub primary: SourceConfig,
    #[serde(default)]
    pub attributes: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// SQLite database file.
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_filter_column")]
    pub filter_column: String,
    #[serde(default)]
    pub include_geometry: bool,
    /// Optional CSV export of the same table.
    #[serde(default)]
    pub csv: Option<PathBuf>,
    /// CSV file that every build appends its source load events to.
    #[serde(default)]
    pub load_log: Option<PathBuf>,
}

fn default_table() -> String {
    "lots".to_string()
}

fn default_filter_column() -> String {
    "id".to_string()
}

impl OutputConfig {
    pub fn table_spec(&self) -> TableSpec {
        TableSpec {
            table: self.table.clone(),
            filter_column: self.filter_column.clone(),
            include_geometry: self.include_geometry,
        }
    }
}

/// One input extract and how it contributes to the lots table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub path: PathBuf,
    /// Overrides detection by file extension.
    #[serde(default)]
    pub format: Option<SourceFormat>,
    pub schema: Schema,
    pub key: KeyRule,
    /// Translates this source's keys into the primary key vocabulary.
    #[serde(default)]
    pub crosswalk: Option<CrosswalkConfig>,
    /// Required on the primary source, rejected elsewhere.
    #[serde(default)]
    pub geometry: Option<GeometrySource>,
    #[serde(default)]
    pub merge: MergeMode,
    #[serde(default)]
    pub exclude: Vec<Exclusion>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub reduce: Vec<ReduceSpec>,
}

/// A two-column table mapping one key vocabulary to another (e.g. `camapin` to `pin`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: Option<SourceFormat>,
    pub schema: Schema,
    pub from: KeyRule,
    pub to: KeyRule,
}

impl BuildConfig {
    /// Parse and validate a configuration; paths are kept as written.
    pub fn from_toml_str(text: &str) -> LotResult<Self> {
        let config: BuildConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`, resolving relative source paths against its directory.
    pub fn load(path: &Path) -> LotResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        resolve(base, &mut self.output.path);
        for path in [self.output.csv.as_mut(), self.output.load_log.as_mut()].into_iter().flatten() {
            resolve(base, path);
        }
        for source in std::iter::once(&mut self.primary).chain(self.attributes.iter_mut()) {
            resolve(base, &mut source.path);
            if let Some(cw) = source.crosswalk.as_mut() {
                resolve(base, &mut cw.path);
            }
        }
    }

    /// Check everything that can be checked without reading inputs.
    pub fn validate(&self) -> LotResult<()> {
        if self.primary.geometry.is_none() {
            return Err(invalid(format!(
                "primary source '{}' needs a geometry column or lon/lat columns",
                self.primary.name
            )));
        }
        if self.primary.crosswalk.is_some() {
            return Err(invalid(format!(
                "primary source '{}' defines the key vocabulary and cannot use a crosswalk",
                self.primary.name
            )));
        }

        let mut names = HashSet::new();
        let mut outputs: HashSet<&str> = HashSet::new();
        for (i, source) in std::iter::once(&self.primary).chain(&self.attributes).enumerate() {
            if source.name.trim().is_empty() {
                return Err(invalid("source name is empty".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(invalid(format!("source '{}' is defined twice", source.name)));
            }
            if i > 0 && source.geometry.is_some() {
                return Err(invalid(format!(
                    "attribute source '{}' cannot declare geometry",
                    source.name
                )));
            }
            source.validate_columns()?;

            let column_names = source.columns.iter().map(|c| c.name.as_str());
            let reduce_names = source.reduce.iter().map(|r| r.name.as_str());
            for name in column_names.chain(reduce_names) {
                if RESERVED_COLUMNS.contains(&name) {
                    return Err(invalid(format!("output column '{name}' is reserved")));
                }
                if !outputs.insert(name) {
                    return Err(invalid(format!("output column '{name}' is defined twice")));
                }
            }
        }

        let filter = self.output.filter_column.as_str();
        if !RESERVED_COLUMNS.contains(&filter) && !outputs.contains(filter) {
            return Err(invalid(format!("filter column '{filter}' is not an output column")));
        }
        Ok(())
    }
}

impl SourceConfig {
    fn validate_columns(&self) -> LotResult<()> {
        let schema = &self.schema;
        let require = |column: &str| {
            schema.require(column).map(|_| ()).map_err(|_| {
                invalid(format!("source '{}' refers to undeclared column '{column}'", self.name))
            })
        };

        self.key.columns().into_iter().try_for_each(require)?;
        match &self.geometry {
            Some(GeometrySource::Column(c)) => require(c)?,
            Some(GeometrySource::LonLat { lon, lat }) => {
                require(lon)?;
                require(lat)?;
            }
            None => {}
        }
        for e in &self.exclude {
            require(&e.column)?;
        }
        for c in &self.columns {
            require(c.rule.column())?;
            if let ColumnRule::First { order_by, .. } | ColumnRule::Concat { order_by, .. } = &c.rule {
                order_by.iter().try_for_each(|o| require(o))?;
            }
        }
        for r in &self.reduce {
            match &r.op {
                Reduction::Average { value, bucket } => {
                    require(value)?;
                    require(bucket)?;
                }
                Reduction::DistinctCollect { column } => require(column)?,
                Reduction::Count => {}
            }
        }
        if let Some(cw) = &self.crosswalk {
            for column in cw.from.columns().into_iter().chain(cw.to.columns()) {
                cw.schema.require(column)?;
            }
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn invalid(message: String) -> LotError {
    LotError::SchemaMismatch { message }
}
