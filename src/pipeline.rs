//! End-to-end build: load every source, aggregate, join and materialize.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{BuildConfig, SourceConfig};
use crate::error::{LotError, LotResult};
use crate::geometry::aggregate;
use crate::ingestion::{
    load_from_path, CompositeObserver, LoadLog, LoadOptions, LoadSeverity, TracingObserver,
};
use crate::key::{derive_keys, EntityKey, KeyCrosswalk};
use crate::output::{materialize_to_path, write_lots_csv};
use crate::processing::{exclude_sentinels, group_by_key, joined_fields, left_join, AttributeTable};
use crate::report::BuildReport;
use crate::types::{DataSet, Lot, OutputField};

/// A loaded source together with its configuration.
#[derive(Debug, Clone)]
pub struct SourceData<'a> {
    pub config: &'a SourceConfig,
    pub dataset: DataSet,
    pub crosswalk: Option<KeyCrosswalk>,
}

/// Everything a build produces before it is written out.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub fields: Vec<OutputField>,
    /// One lot per distinct primary key, in key order.
    pub lots: Vec<Lot>,
    pub report: BuildReport,
}

/// Load a source (and its crosswalk, if any) as configured.
pub fn load_source<'a>(config: &'a SourceConfig, options: &LoadOptions) -> LotResult<SourceData<'a>> {
    let dataset = load_from_path(
        &config.name,
        &config.path,
        &config.schema,
        &LoadOptions {
            format: config.format,
            ..options.clone()
        },
    )?;

    let crosswalk = match &config.crosswalk {
        Some(cw) => {
            let table = load_from_path(
                &format!("{}.crosswalk", config.name),
                &cw.path,
                &cw.schema,
                &LoadOptions {
                    format: cw.format,
                    ..options.clone()
                },
            )?;
            Some(KeyCrosswalk::from_dataset(&config.name, &table, &cw.from, &cw.to)?)
        }
        None => None,
    };

    Ok(SourceData {
        config,
        dataset,
        crosswalk,
    })
}

/// Turn loaded sources into lots.
///
/// Output rows are driven by the primary source: one lot per distinct primary key, whether or
/// not any attribute source matches it.
pub fn assemble(primary: SourceData<'_>, attributes: Vec<SourceData<'_>>) -> LotResult<Assembled> {
    let mut report = BuildReport::default();

    let cfg = primary.config;
    let geometry = cfg.geometry.as_ref().ok_or_else(|| LotError::SchemaMismatch {
        message: format!("primary source '{}' has no geometry", cfg.name),
    })?;
    let dataset = prepare(&primary, &mut report)?;

    let aggregation = aggregate(&cfg.name, &dataset, &cfg.key, geometry, cfg.merge)?;
    report.issues.extend(aggregation.issues);
    tracing::info!(source = %cfg.name, lots = aggregation.groups.len(), "geometry aggregated");

    // Key-missing rows were already reported by the aggregation.
    let keys = derive_keys(&dataset, &cfg.key)?;
    let (groups, _) = group_by_key(&cfg.name, &dataset, &keys);
    let mut tables = vec![AttributeTable::from_groups(
        &cfg.name,
        &dataset.schema,
        &groups,
        &cfg.columns,
        &cfg.reduce,
    )?];

    for source in &attributes {
        tables.push(attribute_table(source, &mut report)?);
    }

    let fields = joined_fields(&tables)?;
    let primary_keys: Vec<EntityKey> = aggregation.groups.iter().map(|g| g.key.clone()).collect();
    let rows = left_join(&primary_keys, &tables);

    let lots: Vec<Lot> = aggregation
        .groups
        .into_iter()
        .zip(rows)
        .map(|(group, attributes)| Lot {
            id: group.key,
            lon: group.centroid.map(|c| c.lon),
            lat: group.centroid.map(|c| c.lat),
            geometry: group.merged,
            attributes,
            posted: false,
        })
        .collect();

    report.lots = lots.len();
    Ok(Assembled {
        fields,
        lots,
        report,
    })
}

fn prepare(source: &SourceData<'_>, report: &mut BuildReport) -> LotResult<DataSet> {
    let name = &source.config.name;
    let (kept, excluded) = exclude_sentinels(&source.dataset, &source.config.exclude)?;
    report.rows_loaded.insert(name.clone(), source.dataset.row_count());
    report.rows_excluded.insert(name.clone(), excluded);
    if excluded > 0 {
        tracing::debug!(source = %name, excluded, "sentinel rows excluded");
    }
    Ok(kept)
}

fn attribute_table(source: &SourceData<'_>, report: &mut BuildReport) -> LotResult<AttributeTable> {
    let cfg = source.config;
    let dataset = prepare(source, report)?;

    let mut keys = derive_keys(&dataset, &cfg.key)?;
    if let Some(cw) = &source.crosswalk {
        for key in keys.iter_mut() {
            *key = key.take().and_then(|k| cw.translate(&k).cloned());
        }
    }

    let (groups, issues) = group_by_key(&cfg.name, &dataset, &keys);
    report.issues.extend(issues);
    AttributeTable::from_groups(&cfg.name, &dataset.schema, &groups, &cfg.columns, &cfg.reduce)
}

/// Load options for a configured build: load events go to `tracing` and, when
/// `[output] load_log` is set, to the CSV load log. Failures of `Error` severity or worse alert.
pub fn load_options(config: &BuildConfig) -> LotResult<LoadOptions> {
    let mut observer = CompositeObserver::default().with(TracingObserver);
    if let Some(path) = &config.output.load_log {
        observer = observer.with(LoadLog::open(path)?);
    }
    Ok(LoadOptions {
        observer: Some(Arc::new(observer)),
        alert_at_or_above: LoadSeverity::Error,
        ..LoadOptions::default()
    })
}

/// Run a full build with the options from [`load_options`].
pub fn build(config: &BuildConfig) -> LotResult<BuildReport> {
    build_with_options(config, &load_options(config)?)
}

/// Load, assemble and materialize. Nothing is written unless every source loads and joins.
///
/// The CSV export is staged next to its target and only renamed into place once the database
/// transaction has committed.
pub fn build_with_options(config: &BuildConfig, options: &LoadOptions) -> LotResult<BuildReport> {
    config.validate()?;

    let primary = load_source(&config.primary, options)?;
    let attributes = config
        .attributes
        .iter()
        .map(|a| load_source(a, options))
        .collect::<LotResult<Vec<_>>>()?;

    let assembled = assemble(primary, attributes)?;
    let spec = config.output.table_spec();

    let staged_csv = match &config.output.csv {
        Some(csv_path) => {
            let staged = staging_path(csv_path);
            if let Err(e) = stage_csv(&staged, &assembled, spec.include_geometry) {
                let _ = fs::remove_file(&staged);
                return Err(e);
            }
            Some((staged, csv_path))
        }
        None => None,
    };

    if let Err(e) = materialize_to_path(&config.output.path, &spec, &assembled.fields, &assembled.lots) {
        if let Some((staged, _)) = &staged_csv {
            let _ = fs::remove_file(staged);
        }
        return Err(e);
    }
    if let Some((staged, csv_path)) = staged_csv {
        fs::rename(&staged, csv_path)?;
    }

    tracing::info!(output = %config.output.path.display(), report = %assembled.report, "build finished");
    Ok(assembled.report)
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    target.with_file_name(name)
}

fn stage_csv(staged: &Path, assembled: &Assembled, include_geometry: bool) -> LotResult<()> {
    if let Some(parent) = staged.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = BufWriter::new(File::create(staged)?);
    write_lots_csv(&mut file, &assembled.fields, &assembled.lots, include_geometry)?;
    file.flush()?;
    Ok(())
}
