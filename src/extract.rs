use crate::bugdb::{collect_bug_database_cache, process_cache, BugDatabaseSettings, BuiltinProviders, WorkItemCache};
use crate::cache::ChangesetCache;
use crate::cli::{BugDatabaseArgs, CommonArgs, ExtractArgs};
use crate::config::ChurnConfig;
use crate::ledger::ChurnLedger;
use crate::model::OutputType;
use crate::output::JsonOutputProcessor;
use crate::processor::ChurnProcessor;
use crate::progress::MonotonicStopwatch;
use crate::source::{ChangesetSource, GitSource, JsonChangesetSource};
use anyhow::Context;
use console::style;
use std::path::Path;

pub fn exec(common: CommonArgs, args: ExtractArgs) -> anyhow::Result<()> {
    let config = ChurnConfig::load(common.config.as_deref()).context("Failed to load configuration")?;
    let settings = args.bug_database.clone().merge_into(config.bug_database);

    let work_items = prepare_work_items(&settings)?;

    let ledger = if let Some(path) = &args.changesets {
        let source = JsonChangesetSource::from_file(path)
            .with_context(|| format!("Failed to read changesets from {}", path.display()))?;
        run(source, work_items, args.output_type, &args.output_file)?
    } else {
        let source = GitSource::open(args.repo.as_ref()).context("Failed to open git repository")?;
        let range = source
            .resolve_range(args.since.as_deref(), args.until.as_deref())
            .context("Failed to resolve date range")?;
        let cache = ChangesetCache::new(args.cache.as_deref(), source.path())
            .context("Failed to initialize cache")?;
        let source = source
            .with_range(range)
            .include_merges(args.include_merges)
            .include_binary(args.binary)
            .with_cache(cache);
        run(source, work_items, args.output_type, &args.output_file)?
    };

    output_summary(&ledger);
    Ok(())
}

pub fn exec_bug_database(common: CommonArgs, args: BugDatabaseArgs) -> anyhow::Result<()> {
    let config = ChurnConfig::load(common.config.as_deref()).context("Failed to load configuration")?;
    let settings = args.merge_into(config.bug_database);
    if settings.provider.is_none() {
        anyhow::bail!("No bug database provider configured");
    }

    let wrote = collect_bug_database_cache(&settings, &BuiltinProviders, &JsonOutputProcessor)
        .context("Failed to collect bug database")?;
    if wrote {
        println!("Work items written next to {}", style(display_opt(&settings)).cyan());
    } else {
        println!("Bug database reported no work items");
    }
    Ok(())
}

fn prepare_work_items(settings: &BugDatabaseSettings) -> anyhow::Result<WorkItemCache> {
    collect_bug_database_cache(settings, &BuiltinProviders, &JsonOutputProcessor)
        .context("Failed to collect bug database")?;

    let mut work_items = WorkItemCache::new();
    let read = process_cache(settings.output_file.as_deref(), &mut work_items);
    if read > 0 {
        tracing::info!(read, distinct = work_items.len(), "loaded work item cache");
    }
    Ok(work_items)
}

fn run<S: ChangesetSource>(
    source: S,
    work_items: WorkItemCache,
    output_type: OutputType,
    output_file: &Path,
) -> anyhow::Result<ChurnLedger> {
    let mut processor = ChurnProcessor::new(
        source,
        work_items,
        JsonOutputProcessor,
        MonotonicStopwatch::start(),
    );
    processor
        .extract(output_type, output_file)
        .context("Failed to extract churn")
}

fn display_opt(settings: &BugDatabaseSettings) -> String {
    settings
        .output_file
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

fn output_summary(ledger: &ChurnLedger) {
    println!(
        "{} records over {} days",
        style(ledger.len()).cyan(),
        style(ledger.days()).cyan()
    );
    if ledger.is_empty() {
        return;
    }

    let mut busiest: Vec<_> = ledger.records().collect();
    busiest.sort_by(|a, b| b.total_lines_changed().cmp(&a.total_lines_changed()));

    println!(
        "{:<12} {:<50} {:>8} {:>8} {:>8} {:>6}",
        style("Day").bold(),
        style("Path").bold(),
        style("Added").bold(),
        style("Deleted").bold(),
        style("Changed").bold(),
        style("Fixes").bold()
    );
    println!("{}", "─".repeat(97));
    for r in busiest.iter().take(20) {
        println!(
            "{:<12} {:<50} {:>8} {:>8} {:>8} {:>6}",
            r.day().format("%Y-%m-%d"),
            r.file_name,
            r.added,
            r.deleted,
            r.changes_before + r.changes_after,
            r.number_of_changes_with_fixes
        );
    }
    if busiest.len() > 20 {
        println!("\n... and {} more records", busiest.len() - 20);
    }
}
