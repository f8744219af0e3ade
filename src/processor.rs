use crate::bugdb::BugCorrelationIndex;
use crate::error::Result;
use crate::ledger::ChurnLedger;
use crate::model::OutputType;
use crate::output::OutputSink;
use crate::progress::{ProgressNotifier, Stopwatch};
use crate::source::ChangesetSource;
use std::path::Path;

/// Drives one extraction: list, decode, fold, then hand the ledger to a sink.
pub struct ChurnProcessor<S, I, O, W> {
    source: S,
    index: I,
    sink: O,
    progress: ProgressNotifier<W>,
}

impl<S, I, O, W> ChurnProcessor<S, I, O, W>
where
    S: ChangesetSource,
    I: BugCorrelationIndex,
    O: OutputSink,
    W: Stopwatch,
{
    pub fn new(source: S, index: I, sink: O, stopwatch: W) -> Self {
        Self {
            source,
            index,
            sink,
            progress: ProgressNotifier::new(stopwatch),
        }
    }

    /// Builds the ledger without writing it. A decode failure aborts the run.
    pub fn build_ledger(&mut self) -> Result<ChurnLedger> {
        let ids = self.source.changeset_ids()?;
        let total = ids.len();
        let mut ledger = ChurnLedger::new();

        for (processed, id) in ids.iter().enumerate() {
            let changeset = self.source.describe(id)?;
            if let Some(message) = self.progress.check(processed, total) {
                tracing::info!("{message}");
            }
            ledger.accumulate(&changeset, &self.index);
        }

        tracing::info!(
            changesets = total,
            records = ledger.len(),
            "ledger complete"
        );
        Ok(ledger)
    }

    pub fn extract(&mut self, output_type: OutputType, output_file: &Path) -> Result<ChurnLedger> {
        let ledger = self.build_ledger()?;
        self.sink
            .process_output(output_type, output_file, &ledger.by_date())?;
        Ok(ledger)
    }
}
