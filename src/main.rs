//! jobscout command line entry point

use clap::{Args, Parser, Subcommand};
use jobscout::agent::{AgentExecutor, AgentSettings};
use jobscout::config::{load_dotenv, lookup_secret, Credentials, JobScoutConfig, DOTENV_FILE};
use jobscout::consumer::{self, ConsumeOutcome, ConsumerError, CSV_FILE};
use jobscout::criteria::parse_lead_count;
use jobscout::error::{JobScoutError, JobScoutResult};
use jobscout::input::{InputCollector, InputOverrides};
use jobscout::llm::{LlmProvider, OpenAiConfig, OpenAiProvider};
use jobscout::observability::{init_logging, LogSettings};
use jobscout::pipeline::stage::VALIDATED_FILE;
use jobscout::pipeline::{
    ApprovalGate, ApprovalPolicy, ArtifactStore, CancelSignal, Pipeline, PipelineOptions,
    PolicyApproval, TerminalApproval,
};
use jobscout::tools::builtin::{ScrapeWebsiteTool, WebSearchTool};
use jobscout::tools::ToolSystem;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Find internship and associate job leads with an agent pipeline
#[derive(Parser)]
#[command(name = "jobscout")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run discovery, extraction and validation, then write the CSV
    Run(RunArgs),
    /// Convert an existing validated_info.json to CSV
    Export {
        /// Validated records (default: <output_dir>/validated_info.json)
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
        /// CSV destination (default: <output_dir>/validated_info.csv)
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Location to search in
    #[arg(long)]
    location: Option<String>,

    /// Number of leads to generate
    #[arg(long, value_name = "N")]
    leads: Option<String>,

    /// Comma-separated industries
    #[arg(long)]
    industries: Option<String>,

    /// Never prompt; missing values are an error
    #[arg(long)]
    non_interactive: bool,

    /// Approve the discovery artifact without asking
    #[arg(long)]
    auto_approve: bool,

    /// Give up waiting for approval after SECS seconds
    #[arg(long, value_name = "SECS")]
    approval_timeout: Option<u64>,

    /// Directory for artifacts and the CSV
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(LogSettings::from_env().with_verbosity(cli.verbose));

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(exit_code = e.exit_code(), "Command failed: {}", e.user_message());
            // The consumer already printed the parse error and raw content
            if !matches!(e, JobScoutError::Consumer(ConsumerError::Malformed { .. })) {
                eprintln!("Error: {}", e.user_message());
            }
            e.exit_code()
        }
    };

    // A pending stdin read would otherwise hold up runtime shutdown
    process::exit(code);
}

async fn execute(cli: Cli) -> JobScoutResult<i32> {
    let (config, source) = JobScoutConfig::discover(cli.config.as_deref())?;
    match &source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Export { input, output } => {
            let dir = &config.pipeline.output_dir;
            let input = input.unwrap_or_else(|| dir.join(VALIDATED_FILE));
            let output = output.unwrap_or_else(|| dir.join(CSV_FILE));
            export(&input, &output)
        }
        Commands::Config { show } => show_config(&config, source.as_deref(), show),
    }
}

async fn run(config: JobScoutConfig, args: RunArgs) -> JobScoutResult<i32> {
    // Fail on missing secrets before asking the operator anything
    let credentials = Credentials::from_env(&config)?;

    let overrides = InputOverrides {
        location: args.location,
        num_leads: args.leads.as_deref().map(parse_lead_count).transpose()?,
        industries: args.industries,
    };
    let interactive = !args.non_interactive;
    // The collector holds the stdin lock; release it before the approval gate reads
    let criteria = {
        let mut collector = InputCollector::terminal(interactive);
        collector.collect(&config.criteria, overrides)?
    };
    info!(
        location = criteria.location(),
        num_leads = criteria.num_leads(),
        industries = ?criteria.industries(),
        "Search criteria collected"
    );

    let executor = build_executor(&config, &credentials)?;
    let gate = select_gate(args.auto_approve, interactive);

    let mut options = PipelineOptions::from_config(&config.pipeline);
    if let Some(secs) = args.approval_timeout {
        options.approval_timeout = Some(Duration::from_secs(secs));
    }

    let output_dir = args
        .output_dir
        .unwrap_or_else(|| config.pipeline.output_dir.clone());
    let cancel = CancelSignal::new();
    cancel.cancel_on_ctrl_c();

    let pipeline = Pipeline::new(executor, gate, ArtifactStore::new(&output_dir))
        .with_options(options)
        .with_cancel_signal(cancel);
    let outcome = pipeline.run(&criteria).await?;
    info!(
        run_id = %outcome.run_id,
        records = outcome.records.len(),
        dropped = outcome.report.dropped(),
        "Pipeline finished"
    );

    export(&output_dir.join(VALIDATED_FILE), &output_dir.join(CSV_FILE))
}

fn export(input: &Path, output: &Path) -> JobScoutResult<i32> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match consumer::consume(input, output, &mut out)? {
        ConsumeOutcome::NoResults => info!(path = %input.display(), "Nothing to export"),
        ConsumeOutcome::Written { records, csv_path } => {
            info!(records, path = %csv_path.display(), "Export complete")
        }
    }
    Ok(0)
}

/// Wire the LLM provider and the stage tools into the agent executor
fn build_executor(
    config: &JobScoutConfig,
    credentials: &Credentials,
) -> JobScoutResult<Arc<AgentExecutor>> {
    let search = WebSearchTool::new(&config.search, credentials.search_api_key.clone())
        .map_err(|e| JobScoutError::setup(format!("web search tool: {e}")))?;
    let scrape = ScrapeWebsiteTool::new(&config.scrape)
        .map_err(|e| JobScoutError::setup(format!("scrape tool: {e}")))?;
    let tools = ToolSystem::new()
        .with_tool(Arc::new(search))
        .with_tool(Arc::new(scrape));

    let provider = OpenAiProvider::new(OpenAiConfig::from_settings(&config.llm, credentials))
        .map_err(|e| JobScoutError::setup(format!("LLM provider: {e}")))?;
    let llm: Arc<dyn LlmProvider> = Arc::new(provider);

    Ok(Arc::new(AgentExecutor::new(
        llm,
        Arc::new(tools),
        AgentSettings::from_config(config),
    )))
}

fn select_gate(auto_approve: bool, interactive: bool) -> Arc<dyn ApprovalGate> {
    if auto_approve {
        Arc::new(PolicyApproval::auto_approve())
    } else if interactive {
        Arc::new(TerminalApproval::new())
    } else {
        Arc::new(PolicyApproval::new(ApprovalPolicy::Fail))
    }
}

fn show_config(
    config: &JobScoutConfig,
    source: Option<&Path>,
    show: bool,
) -> JobScoutResult<i32> {
    if show {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| JobScoutError::setup(format!("cannot render configuration: {e}")))?;
        match source {
            Some(path) => println!("# Loaded from {}", path.display()),
            None => println!("# Built-in defaults"),
        }
        println!("{rendered}");
    }

    let dotenv = load_dotenv(Path::new(DOTENV_FILE))?;
    for name in [&config.llm.api_key_env, &config.search.api_key_env] {
        let state = match lookup_secret(&dotenv, name) {
            Some(value) if !value.trim().is_empty() => "set",
            _ => "missing",
        };
        println!("{name}: {state}");
    }

    info!("Configuration validation complete");
    Ok(0)
}
