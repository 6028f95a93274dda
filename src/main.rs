use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use order_recon::aggregate::StatusCrossTab;
use order_recon::dedup::{DuplicatePolicy, KeyMode};
use order_recon::pipeline::{self, RunOptions};
use order_recon::reconcile::ReconcileOptions;
use order_recon::schema::Layout;
use order_recon::{Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Reconcile(args) => execute_reconcile(args),
    }
}

fn execute_reconcile(args: ReconcileArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ToolError::MissingInput(args.input));
    }

    let options = args.run_options();
    let (outcome, written) = pipeline::reconcile_archive(&args.input, &args.output, &options)?;

    print!("{}", outcome.summary);
    if outcome.report.date_failures > 0 {
        println!(
            "\n{} order line(s) have an unreadable due date",
            outcome.report.date_failures
        );
    }
    println!();
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Join warehouse order exports into one table and summarise workload."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the five spreadsheets of a ZIP archive.
    Reconcile(ReconcileArgs),
}

#[derive(clap::Args)]
struct ReconcileArgs {
    /// ZIP archive holding the source workbooks.
    #[arg(long)]
    input: PathBuf,

    /// Directory the output files are written to.
    #[arg(long)]
    output: PathBuf,

    /// File and sheet naming of the archive.
    #[arg(long, value_enum, default_value_t = LayoutKind::Standard)]
    layout: LayoutKind,

    /// Which row survives when a source repeats a join key.
    #[arg(long, value_enum, default_value_t = PolicyKind::FirstWins)]
    policy: PolicyKind,

    /// Compare order and line ids separately instead of as concatenated text.
    #[arg(long)]
    tuple_keys: bool,

    /// Also write one sheet per source.
    #[arg(long)]
    per_source: bool,

    /// Also write one workbook per responsible party.
    #[arg(long)]
    per_responsible: bool,

    /// Also write the summary as JSON.
    #[arg(long)]
    summary_json: bool,

    /// Column holding the order status, for the status breakdown.
    #[arg(long, requires = "status")]
    status_column: Option<String>,

    /// Status label to count per responsible party. Repeatable.
    #[arg(long = "status", requires = "status_column")]
    status: Vec<String>,
}

impl ReconcileArgs {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            layout: self.layout.into(),
            reconcile: ReconcileOptions {
                policy: self.policy.into(),
                key_mode: if self.tuple_keys {
                    KeyMode::Tuple
                } else {
                    KeyMode::Concatenated
                },
            },
            per_source: self.per_source,
            per_responsible: self.per_responsible,
            summary_json: self.summary_json,
            cross_tab: self.status_column.as_ref().map(|column| StatusCrossTab {
                column: order_recon::normalize::normalize_label(column),
                labels: self.status.clone(),
            }),
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LayoutKind {
    Standard,
    Company,
    Inventario,
}

impl From<LayoutKind> for Layout {
    fn from(kind: LayoutKind) -> Self {
        match kind {
            LayoutKind::Standard => Layout::Standard,
            LayoutKind::Company => Layout::Company,
            LayoutKind::Inventario => Layout::Inventario,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyKind {
    FirstWins,
    LastWins,
    Error,
}

impl From<PolicyKind> for DuplicatePolicy {
    fn from(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::FirstWins => DuplicatePolicy::FirstWins,
            PolicyKind::LastWins => DuplicatePolicy::LastWins,
            PolicyKind::Error => DuplicatePolicy::Error,
        }
    }
}
