use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{ArgGroup, Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use openneuro_mirror::batch::{BatchOptions, BatchReport, BatchRunner, Dispatch};
use openneuro_mirror::config::{ConfigLoader, Settings};
use openneuro_mirror::domain::{Pipeline, parse_date};
use openneuro_mirror::error::MirrorError;
use openneuro_mirror::ledger::{CsvLedger, StatusLedger};
use openneuro_mirror::mirror::MirrorIndex;
use openneuro_mirror::mosaic::{CommandMosaicGenerator, SlurmScheduler};
use openneuro_mirror::output::{JsonOutput, OutputMode};
use openneuro_mirror::reconcile::{
    AssumeNo, AssumeYes, ConfirmGate, ReconcileReport, ReconciliationEngine,
};
use openneuro_mirror::remote::RemoteHttpClient;
use openneuro_mirror::select::DatasetSelection;
use openneuro_mirror::tui::TerminalConfirm;
use openneuro_mirror::vcs::DataladCli;

#[derive(Parser)]
#[command(name = "on-mirror")]
#[command(about = "OpenNeuro mirror maintenance: mosaic batch runs and ledger reconciliation")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "Path to a JSON config file.")]
    config: Option<String>,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch raw datasets and build mosaics")]
    Mosaics(MosaicsArgs),
    #[command(about = "Compare the status ledger with the derivatives superdataset")]
    Reconcile(ReconcileArgs),
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("selection")
        .args(["dataset_list", "dataset_list_file", "recent_snapshots", "snapshots_since"])
        .multiple(false)
))]
struct MosaicsArgs {
    #[arg(short = 'd', long, help = "Comma-separated dataset ids.")]
    dataset_list: Option<String>,

    #[arg(short = 'f', long, help = "File with one dataset id per line.")]
    dataset_list_file: Option<Utf8PathBuf>,

    #[arg(short = 'r', long, help = "Datasets modified or published in the past N days.")]
    recent_snapshots: Option<u32>,

    #[arg(short = 's', long, help = "Datasets modified since a date (YYYY-MM-DD).")]
    snapshots_since: Option<String>,

    #[arg(short = 'l', long, conflicts_with = "job", help = "Build mosaics in this process.")]
    local: bool,

    #[arg(short = 'j', long, help = "Submit mosaic generation as a cluster job.")]
    job: bool,

    #[arg(short = 'x', long, help = "Use whatever is already mirrored locally.")]
    skip_download: bool,

    #[arg(long, hide = true)]
    no_run_log: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ReconcileArgs {
    #[arg(long, value_enum, help = "Limit to one or more pipelines (default: all).")]
    pipeline: Vec<Pipeline>,

    #[arg(long, conflicts_with = "no", help = "Apply every correction without asking.")]
    yes: bool,

    #[arg(long, help = "Report only; never write to the ledger.")]
    no: bool,

    #[arg(long, help = "Skip `datalad update` on the superdataset before scanning.")]
    no_refresh: bool,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<MirrorError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MirrorError) -> u8 {
    match error {
        MirrorError::LedgerRowNotFound(_)
        | MirrorError::AmbiguousLedgerRow { .. }
        | MirrorError::LedgerColumnNotFound(_)
        | MirrorError::MissingConfig(_)
        | MirrorError::ConfigRead(_)
        | MirrorError::ConfigParse(_) => 2,
        MirrorError::RemoteHttp(_)
        | MirrorError::RemoteStatus { .. }
        | MirrorError::MissingTool(_)
        | MirrorError::Scheduler(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let settings = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Mosaics(args) => run_mosaics(args, settings),
        Commands::Reconcile(args) => run_reconcile(args, settings, output_mode),
    }
}

fn run_mosaics(args: MosaicsArgs, settings: Settings) -> miette::Result<()> {
    let selection = if let Some(list) = &args.dataset_list {
        DatasetSelection::from_list_arg(list)
    } else if let Some(path) = &args.dataset_list_file {
        DatasetSelection::ListFile(path.clone())
    } else if let Some(days) = args.recent_snapshots {
        DatasetSelection::RecentDays(days)
    } else if let Some(since) = &args.snapshots_since {
        DatasetSelection::Since(parse_date(since)?)
    } else {
        DatasetSelection::Nothing
    };

    let dispatch = if args.local {
        Dispatch::Local
    } else if args.job {
        Dispatch::Job
    } else {
        Dispatch::None
    };
    let options = BatchOptions {
        skip_download: args.skip_download,
        dispatch,
        write_run_log: !args.no_run_log,
    };

    let vcs = DataladCli::new();
    if !args.skip_download && !vcs.is_available() {
        return Err(MirrorError::MissingTool("datalad".to_string()).into());
    }
    let remote = RemoteHttpClient::new(&settings.remote_base_url, &settings.metadata_url)?;
    let generator = CommandMosaicGenerator::new(settings.mosaic_command.clone());
    let scheduler = SlurmScheduler::new(settings.slurm_script.as_std_path());
    let program = std::env::current_exe()
        .into_diagnostic()?
        .to_string_lossy()
        .to_string();
    let runner = BatchRunner::new(
        settings,
        remote.clone(),
        vcs,
        remote,
        generator,
        scheduler,
    )
    .with_program(program);

    let today = chrono::Local::now().date_naive();
    let report = runner.run(&selection, &options, today)?;

    if args.json {
        JsonOutput::print_batch(&report).into_diagnostic()?;
    } else {
        print_batch_summary(&report);
    }
    Ok(())
}

fn run_reconcile(
    args: ReconcileArgs,
    settings: Settings,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let vcs = DataladCli::new();
    let mirror = if args.no_refresh {
        MirrorIndex::scan(&settings.superdataset_root)?
    } else {
        MirrorIndex::refresh_and_scan(&vcs, &settings.superdataset_root)?
    };
    let ledger = StatusLedger::new(
        CsvLedger::new(settings.ledger.path.clone()),
        settings.ledger.clone(),
    );
    let pipelines = if args.pipeline.is_empty() {
        Pipeline::ALL.to_vec()
    } else {
        args.pipeline.clone()
    };
    let engine = ReconciliationEngine::new(&ledger, &mirror).with_pipelines(pipelines);

    let mut gate: Box<dyn ConfirmGate> = if args.yes {
        Box::new(AssumeYes)
    } else if args.no || matches!(output_mode, OutputMode::NonInteractive) {
        Box::new(AssumeNo)
    } else {
        Box::new(TerminalConfirm::new())
    };
    let report = engine.reconcile(gate.as_mut())?;

    if args.json {
        JsonOutput::print_reconcile(&report).into_diagnostic()?;
    } else {
        print_reconcile_summary(&report);
    }
    Ok(())
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

fn print_batch_summary(report: &BatchReport) {
    if report.no_datasets {
        println!("{YELLOW}No datasets found{RESET}");
        return;
    }

    println!("{CYAN}on-mirror summary{RESET}");
    println!("{GREEN}requested: {}{RESET}", report.requested.len());
    if let Some(fetch) = &report.fetch {
        for record in &fetch.records {
            let color = if record.outcome.is_success() { GREEN } else { RED };
            match &record.detail {
                Some(detail) => println!(
                    "{color}  {} {} ({}){RESET}",
                    record.dataset, record.outcome, detail
                ),
                None => println!("{color}  {} {}{RESET}", record.dataset, record.outcome),
            }
        }
    }
    println!("{GREEN}processed: {}{RESET}", report.datasets.len());
    if !report.generated.is_empty() {
        println!("{GREEN}mosaics written: {}{RESET}", report.generated.len());
    }
    for failure in &report.mosaic_failures {
        println!("{RED}  mosaic {}: {}{RESET}", failure.dataset, failure.message);
    }
    for path in &report.failure_logs {
        println!("{YELLOW}failure log: {path}{RESET}");
    }
    if let Some(path) = &report.launcher {
        println!("{CYAN}launcher: {path}{RESET}");
    }
    if let Some(name) = &report.job_name {
        println!("{CYAN}job: {name}{RESET}");
    }
    if let Some(path) = &report.dataset_log {
        println!("{CYAN}dataset log: {path}{RESET}");
    }
}

fn print_reconcile_summary(report: &ReconcileReport) {
    if report.entries.is_empty() {
        println!("{GREEN}Ledger and superdataset agree{RESET}");
        return;
    }
    for entry in &report.entries {
        println!("{YELLOW}{}{RESET}", entry.set);
        if entry.confirmed {
            println!(
                "{GREEN}  corrected {}, skipped {} (changed since detection){RESET}",
                entry.applied.written, entry.applied.skipped
            );
        } else {
            println!("{CYAN}  not corrected{RESET}");
        }
    }
}
