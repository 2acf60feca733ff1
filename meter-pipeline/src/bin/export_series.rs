use anyhow::{bail, Result};
use meter_client::domain::Granularity;
use meter_pipeline::{
    config::AppConfig,
    observability,
    pipeline::{build_series_set, collect_records, OutcomeStatus},
    resolver::resolve,
    sinks::{export, ExportFormat},
    sources::{raw::RawDataset, NdjsonFileSource},
};
use serde::de::DeserializeOwned;
use std::env;

/// Reads one raw record per line; `-` stands for no file.
async fn read_records<T>(path: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    if path == "-" {
        return Ok(Vec::new());
    }

    let source = NdjsonFileSource::<T>::new(path);
    let (records, errors) = collect_records(&source).await;
    for e in &errors {
        tracing::warn!(path, error = %e, "skipping unreadable record");
    }
    if records.is_empty() {
        if let Some(first) = errors.first() {
            bail!("no usable records in '{path}': {first}");
        }
    }
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        bail!("usage: export_series <granularity> <csv|json> <sdat.ndjson|-> <esl.ndjson|->");
    }
    let granularity: Granularity = args[1].parse()?;
    let format: ExportFormat = args[2].parse()?;

    // Point METER_PIPELINE_CONFIG at a file to override mappings and export options.
    let cfg = AppConfig::load()?;

    let dataset = RawDataset {
        sdat: read_records(&args[3]).await?,
        esl: read_records(&args[4]).await?,
    };
    let outcome = build_series_set(&dataset, &cfg.pipeline)?;
    if outcome.report.status() == OutcomeStatus::Failed {
        bail!("every record failed to transform");
    }

    let resolved = resolve(&outcome.value, &granularity, &cfg.resolver);
    tracing::info!(
        selected = ?resolved.selector,
        points = resolved.series.len(),
        status = outcome.report.status().as_str(),
        "exporting series"
    );
    print!("{}", export(&resolved.series, format, &cfg.export)?);

    Ok(())
}
