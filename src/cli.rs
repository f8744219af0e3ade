use crate::bugdb::BugDatabaseSettings;
use crate::measures::{MeasureConverterType, Metric};
use crate::model::OutputType;
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "churnmeter")]
#[command(about = "Daily per-file code churn and windowed dashboard measures")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
pub struct BugDatabaseArgs {
    #[arg(id = "bug_database_provider", long = "bug-database-provider", help = "Bug database provider name (e.g. json-file)")]
    pub provider: Option<String>,

    #[arg(id = "bug_database_args", long = "bug-database-arg", help = "Argument passed to the bug database provider")]
    pub args: Vec<String>,

    #[arg(
        id = "bug_database_output_file",
        long = "bug-database-output-file",
        help = "Where provider results are written and re-read from"
    )]
    pub output_file: Option<PathBuf>,

    #[arg(id = "bug_database_output_type", long = "bug-database-output-type", value_enum)]
    pub output_type: Option<OutputType>,
}

impl BugDatabaseArgs {
    /// Flags override the configured values they set.
    pub fn merge_into(self, mut settings: BugDatabaseSettings) -> BugDatabaseSettings {
        if self.provider.is_some() {
            settings.provider = self.provider;
        }
        if !self.args.is_empty() {
            settings.args = self.args;
        }
        if self.output_file.is_some() {
            settings.output_file = self.output_file;
        }
        if let Some(output_type) = self.output_type {
            settings.output_type = output_type;
        }
        settings
    }
}

#[derive(Args, Clone)]
pub struct ExtractArgs {
    #[arg(long, help = "Path to git repository", conflicts_with = "changesets")]
    pub repo: Option<PathBuf>,

    #[arg(long, help = "Read pre-decoded changesets from a JSON file instead of git")]
    pub changesets: Option<PathBuf>,

    #[arg(long, help = "Directory for the decoded changeset cache")]
    pub cache: Option<PathBuf>,

    #[arg(long, help = "Include merge commits", default_value_t = false)]
    pub include_merges: bool,

    #[arg(long, help = "Include binary files", default_value_t = false)]
    pub binary: bool,

    #[arg(long, help = "Start from this commit or date (RFC3339, YYYY-MM-DD, or a duration like 90days)")]
    pub since: Option<String>,

    #[arg(long, help = "Stop before this commit or date")]
    pub until: Option<String>,

    #[arg(long, help = "Where the churn ledger is written")]
    pub output_file: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputType::SingleFile)]
    pub output_type: OutputType,

    #[clap(flatten)]
    pub bug_database: BugDatabaseArgs,
}

#[derive(Args, Clone)]
pub struct MeasuresArgs {
    #[arg(
        long = "ledger",
        required = true,
        num_args = 1..,
        help = "Ledger JSON file(s) written by extract; repeated records are skipped within a file, not across files"
    )]
    pub ledgers: Vec<PathBuf>,

    #[arg(long, help = "Window start, inclusive")]
    pub from: String,

    #[arg(long, help = "Window end, exclusive")]
    pub to: String,

    #[arg(long = "metric", value_parser = parse_metric, help = "Metric as KEY=TYPE, e.g. churn=lines-changed")]
    pub metrics: Vec<Metric>,

    #[arg(long, help = "Prefix stripped from file names")]
    pub prefix: Option<String>,

    #[arg(long, help = "Existing measures JSON to keep accumulating into")]
    pub existing: Option<PathBuf>,

    #[arg(long, help = "Where the measures JSON is written")]
    pub output: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fold changeset history into a per-day, per-file churn ledger
    Extract(ExtractArgs),
    /// Convert ledger records in a date window into dashboard measures
    Measures(MeasuresArgs),
    /// Run the bug database provider and write its work items
    Bugdb {
        #[clap(flatten)]
        bug_database: BugDatabaseArgs,
    },
}

fn parse_metric(raw: &str) -> std::result::Result<Metric, String> {
    let (key, kind) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=TYPE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("metric key missing in '{raw}'"));
    }
    let converter = MeasureConverterType::from_str(&kind.replace('_', "-"), true)?;
    Ok(Metric::new(key, converter))
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Extract(args) => crate::extract::exec(self.common, args),
            Commands::Measures(args) => crate::convert::exec(self.common, args),
            Commands::Bugdb { bug_database } => crate::extract::exec_bug_database(self.common, bug_database),
        }
    }
}
