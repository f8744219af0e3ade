use crate::cli::{CommonArgs, MeasuresArgs};
use crate::config::ChurnConfig;
use crate::measures::{ConversionPass, MeasureCollection, MeasureConverter, Metric};
use crate::model::ChurnRecord;
use crate::output::write_json;
use crate::util::parse_window_bound;
use anyhow::Context;
use chrono::NaiveDateTime;
use console::style;
use std::fs;
use std::path::Path;

pub fn exec(common: CommonArgs, args: MeasuresArgs) -> anyhow::Result<()> {
    let config = ChurnConfig::load(common.config.as_deref()).context("Failed to load configuration")?;

    let mut metrics = config.metrics;
    metrics.extend(args.metrics);
    if metrics.is_empty() {
        anyhow::bail!("No metrics configured; pass --metric KEY=TYPE or list them in the config file");
    }
    let prefix = args.prefix.or(config.file_prefix);

    let from = parse_window_bound(&args.from).context("Invalid --from")?;
    let to = parse_window_bound(&args.to).context("Invalid --to")?;
    if from > to {
        anyhow::bail!("Invalid window: --from ({from}) is after --to ({to})");
    }

    let mut collection = match &args.existing {
        Some(path) => read_collection(path)?,
        None => MeasureCollection::new(),
    };

    let mut total = 0;
    let mut converted = 0;
    for path in &args.ledgers {
        let records = read_ledger(path)?;
        total += records.len();
        converted += convert(&records, &metrics, from, to, prefix.clone(), &mut collection);
    }

    write_json(&args.output, &collection)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "{} of {} records converted into {} measures across {} metrics",
        style(converted).cyan(),
        style(total).cyan(),
        style(collection.measures.len()).cyan(),
        style(collection.metrics.len()).cyan()
    );
    Ok(())
}

/// Runs the records of one ledger through one converter per metric, skipping
/// records repeated within that ledger. Returns how many records fell inside
/// the window.
fn convert(
    records: &[ChurnRecord],
    metrics: &[Metric],
    from: NaiveDateTime,
    to: NaiveDateTime,
    prefix: Option<String>,
    collection: &mut MeasureCollection,
) -> usize {
    let converters: Vec<MeasureConverter> = metrics
        .iter()
        .map(|m| MeasureConverter::new(from, to, m.clone(), prefix.clone()))
        .collect();

    let mut pass = ConversionPass::new(collection);
    let mut in_window = 0;
    for record in records {
        if converters.first().is_some_and(|c| c.in_window(&record.timestamp)) {
            in_window += 1;
        }
        for converter in &converters {
            pass.process(converter, record);
        }
    }
    in_window
}

fn read_ledger(path: &Path) -> anyhow::Result<Vec<ChurnRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger {}", path.display()))?;
    let records: Vec<ChurnRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse ledger {}", path.display()))?;
    tracing::debug!(path = %path.display(), records = records.len(), "read ledger");
    Ok(records)
}

fn read_collection(path: &Path) -> anyhow::Result<MeasureCollection> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read measures {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse measures {}", path.display()))
}
