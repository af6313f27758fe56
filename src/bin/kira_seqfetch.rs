use std::io::Write;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use kira_seqfetch::app::{App, FetchOptions};
use kira_seqfetch::config::{ConfigLoader, ResolvedConfig};
use kira_seqfetch::domain::{Accession, parse_accession_lines, parse_accessions};
use kira_seqfetch::error::SeqFetchError;
use kira_seqfetch::output::{JsonOutput, OutputMode, print_summary, unattempted_notice};

const EXIT_PARTIAL_FAILURE: u8 = 5;

#[derive(Parser)]
#[command(name = "kira-seqfetch")]
#[command(about = "Fetch FASTA records by accession, sequentially or across a worker pool")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch many accessions and report successes and failures")]
    Fetch(FetchArgs),
    #[command(about = "Fetch one accession and print the record")]
    Get(GetArgs),
}

#[derive(Args, Clone)]
struct FetchArgs {
    accessions: Vec<String>,

    #[arg(long, help = "File with one accession per line")]
    ids_file: Option<String>,

    #[arg(long, help = "Run on a single connection instead of a worker pool")]
    sequential: bool,

    #[arg(long)]
    workers: Option<usize>,

    #[command(flatten)]
    tuning: TuningArgs,

    #[arg(long)]
    no_save: bool,

    #[arg(long)]
    save_dir: Option<String>,

    #[arg(long, help = "Exit with a non-zero status if any accession failed")]
    strict: bool,
}

#[derive(Args)]
struct GetArgs {
    accession: String,

    #[command(flatten)]
    tuning: TuningArgs,
}

#[derive(Args, Clone, Default)]
struct TuningArgs {
    #[arg(long)]
    retries: Option<u32>,

    #[arg(long)]
    backoff_ms: Option<u64>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long)]
    base_url: Option<String>,
}

impl TuningArgs {
    fn apply(&self, config: &mut ResolvedConfig) -> Result<(), SeqFetchError> {
        if let Some(retries) = self.retries {
            if retries == 0 {
                return Err(SeqFetchError::InvalidConfig(
                    "--retries must be at least 1".to_string(),
                ));
            }
            config.retries = retries;
        }
        if let Some(backoff_ms) = self.backoff_ms {
            config.backoff = std::time::Duration::from_millis(backoff_ms);
        }
        if let Some(timeout_secs) = self.timeout_secs {
            if timeout_secs == 0 {
                return Err(SeqFetchError::InvalidConfig(
                    "--timeout-secs must be at least 1".to_string(),
                ));
            }
            config.timeout = std::time::Duration::from_secs(timeout_secs);
        }
        if let Some(base_url) = &self.base_url {
            let base_url = base_url.trim().trim_end_matches('/');
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(SeqFetchError::InvalidConfig(format!(
                    "--base-url must be an http(s) URL: {base_url}"
                )));
            }
            config.base_url = base_url.to_string();
        }
        Ok(())
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<SeqFetchError>() {
                if let Some(notice) = unattempted_notice(err.unattempted()) {
                    eprintln!("\x1b[33m{notice}\x1b[0m");
                }
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &SeqFetchError) -> u8 {
    match error {
        SeqFetchError::MissingConfig
        | SeqFetchError::ConfigRead(_)
        | SeqFetchError::ConfigParse(_)
        | SeqFetchError::InvalidConfig(_)
        | SeqFetchError::InvalidAccession(_) => 2,
        SeqFetchError::HttpClient(_) | SeqFetchError::WorkerFault { .. } => 3,
        SeqFetchError::Persistence { .. } => 4,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let mut config = ConfigLoader::resolve_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, config, output_mode),
        Commands::Get(args) => {
            args.tuning.apply(&mut config)?;
            let id: Accession = args.accession.parse()?;
            let app = App::from_config(&config);
            match app.fetch_one(&id, config.retries)? {
                Some(text) => {
                    std::io::stdout()
                        .write_all(text.as_bytes())
                        .into_diagnostic()?;
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("could not fetch {id}");
                    Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
                }
            }
        }
    }
}

fn run_fetch(
    args: FetchArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    args.tuning.apply(&mut config)?;
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(
                SeqFetchError::InvalidConfig("--workers must be at least 1".to_string()).into(),
            );
        }
        config.worker_count = workers;
    }
    if args.no_save {
        config.save = false;
    }
    if let Some(dir) = &args.save_dir {
        config.save_dir = dir.into();
    }

    let mut ids = parse_accessions(&args.accessions)?;
    if let Some(path) = &args.ids_file {
        let content = std::fs::read_to_string(path).into_diagnostic()?;
        ids.extend(parse_accession_lines(&content)?);
    }
    if ids.is_empty() {
        ids = config.accessions.clone();
    }
    if ids.is_empty() {
        return Err(miette::Report::msg(
            "no accessions given (pass them as arguments, --ids-file or in kira-seqfetch.json)",
        ));
    }

    let app = App::from_config(&config);
    let options = FetchOptions::from(&config);
    let cancel = CancellationToken::new();
    watch_ctrl_c(cancel.clone());
    let job = if args.sequential {
        app.fetch_many_sequential(&ids, &options, &cancel)?
    } else {
        app.fetch_many_parallel(&ids, config.worker_count, &options, &cancel)?
    };

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_job(&job).into_diagnostic()?,
        OutputMode::Interactive => print_summary(&job),
    }

    if args.strict && (!job.failures.is_empty() || job.cancelled) {
        return Ok(ExitCode::from(EXIT_PARTIAL_FAILURE));
    }
    Ok(ExitCode::SUCCESS)
}

/// First Ctrl+C cancels the job so the partial result is still reported;
/// a second one exits immediately.
fn watch_ctrl_c(cancel: CancellationToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "could not install Ctrl+C handler");
                return;
            }
        };
        runtime.block_on(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            eprintln!("\nReceived Ctrl+C, stopping after in-flight requests...");
            cancel.cancel();

            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nReceived second Ctrl+C, aborting immediately.");
                std::process::exit(1);
            }
        });
    });
}
