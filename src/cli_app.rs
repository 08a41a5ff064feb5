//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{ColoredString, Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use pv_teardown::cluster::apiserver::KubeAccessor;
use pv_teardown::cluster::types::TargetKind;
use pv_teardown::core::config::{Config, MAX_DEADLINE_SECS, normalize_list};
use pv_teardown::logger::activity::{ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger};
use pv_teardown::logger::jsonl::JsonlConfig;
use pv_teardown::signals::InterruptFlag;
use pv_teardown::teardown::coordinator::{FragmentEntry, FragmentStatus, TargetReport};
use pv_teardown::teardown::orchestrator::{Campaign, CampaignPlan, CampaignResult};
use pv_teardown::teardown::reporter::{ClusterStateReporter, Inventory};
use pv_teardown::teardown::sweeper::{SweepEntry, SweepStatus};
use pv_teardown::teardown::verifier::{SystemClock, VerificationOutcome, VerifyPolicy};

/// pvtd: delete volume claims and their volumes, then verify they are gone.
#[derive(Debug, Parser)]
#[command(
    name = "pvtd",
    author,
    version,
    about = "PV Teardown - delete and verify persistent storage",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run a teardown campaign: fragments, namespace sweep, final inventory.
    Cleanup(CleanupArgs),
    /// List the claims and volumes currently present.
    Inventory,
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct CleanupArgs {
    /// Claim-name fragment to delete (repeatable; replaces configured list).
    #[arg(short, long = "fragment", value_name = "FRAGMENT")]
    fragments: Vec<String>,
    /// Namespace to sweep (repeatable; replaces configured list).
    #[arg(short, long = "namespace", value_name = "NAMESPACE")]
    namespaces: Vec<String>,
    /// Sweep the namespaces configured for this chart.
    #[arg(long, value_name = "NAME", conflicts_with = "namespaces")]
    chart: Option<String>,
    /// Locate targets without deleting anything.
    #[arg(long)]
    dry_run: bool,
    /// Overall campaign deadline in seconds (0 disables).
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,
    /// Worker threads per phase.
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,
    /// Exit 4 when any item errored or any verification timed out.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Campaign completed but left items errored or unverified.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Cleanup(args) => run_cleanup(cli, args),
        Command::Inventory => run_inventory(cli),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── cleanup ────────────────────

fn run_cleanup(cli: &Cli, args: &CleanupArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let plan = build_plan(&config, args)?;
    let hash = config
        .stable_hash()
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let policy = VerifyPolicy::from_config(&config.verify);
    let accessor =
        KubeAccessor::connect(&config.cluster).map_err(|e| CliError::Runtime(e.to_string()))?;
    let interrupt = InterruptFlag::register();

    let logger = match spawn_logger(ActivityLoggerConfig {
        jsonl_config: JsonlConfig::at(config.paths.jsonl_log.clone()),
        ..ActivityLoggerConfig::default()
    }) {
        Ok(spawned) => Some(spawned),
        Err(e) => {
            eprintln!("pvtd: activity log disabled: {e}");
            None
        }
    };
    let handle: Option<&ActivityLoggerHandle> = logger.as_ref().map(|(handle, _)| handle);

    if cli.verbose && output_mode(cli) == OutputMode::Human {
        eprintln!(
            "pvtd: {} fragment(s), {} namespace(s), {} worker(s), config {hash}",
            plan.fragments.len(),
            plan.namespaces.len(),
            plan.concurrency
        );
    }

    let outcome = Campaign::new(&accessor, &SystemClock, policy, plan)
        .with_interrupt_flag(interrupt.shared())
        .with_logger(handle)
        .with_config_hash(hash)
        .run();

    let mut logger_panicked = false;
    if let Some((handle, join)) = logger {
        handle.shutdown();
        logger_panicked = join.join().is_err();
    }

    let result = outcome.map_err(|e| CliError::Runtime(format!("campaign aborted: {e}")))?;

    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                print_campaign_human(&result, cli.verbose);
            }
            if interrupt.is_set() {
                eprintln!("pvtd: interrupted; remaining deletes were skipped");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "cleanup",
                "interrupted": interrupt.is_set(),
                "summary": result.summary(),
                "result": result,
            });
            write_json_line(&payload)?;
        }
    }

    if logger_panicked {
        return Err(CliError::Internal("activity logger thread panicked".to_string()));
    }
    if args.strict && !result.is_clean() {
        let summary = result.summary();
        return Err(CliError::Partial(format!(
            "{} item(s) errored, {} interrupted, {} verification(s) timed out",
            summary.errored, summary.interrupted, summary.timed_out
        )));
    }
    Ok(())
}

/// Configured plan with command-line overrides applied.
fn build_plan(config: &Config, args: &CleanupArgs) -> Result<CampaignPlan, CliError> {
    let mut plan = CampaignPlan::from_config(&config.campaign);

    if !args.fragments.is_empty() {
        if args.fragments.iter().any(|f| f.trim().is_empty()) {
            return Err(CliError::User(
                "--fragment must not be empty (it would match every claim)".to_string(),
            ));
        }
        plan.fragments = normalize_list(&args.fragments);
    }
    if let Some(chart) = &args.chart {
        plan.namespaces = config
            .campaign
            .chart_namespaces(chart)
            .map_err(|e| CliError::User(e.to_string()))?
            .to_vec();
    } else if !args.namespaces.is_empty() {
        if args.namespaces.iter().any(|n| n.trim().is_empty()) {
            return Err(CliError::User("--namespace must not be empty".to_string()));
        }
        plan.namespaces = normalize_list(&args.namespaces);
    }
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            return Err(CliError::User("--concurrency must be >= 1".to_string()));
        }
        plan.concurrency = concurrency;
    }
    if let Some(secs) = args.deadline {
        if secs > MAX_DEADLINE_SECS {
            return Err(CliError::User(format!(
                "--deadline must be <= {MAX_DEADLINE_SECS} seconds"
            )));
        }
        plan.deadline = (secs > 0).then(|| Duration::from_secs(secs));
    }
    plan.dry_run |= args.dry_run;
    Ok(plan)
}

fn print_campaign_human(result: &CampaignResult, verbose: bool) {
    if result.dry_run {
        println!("{}", "Dry run: nothing was deleted.".yellow().bold());
    }

    println!("{}", "Fragments".bold());
    if result.fragments.is_empty() {
        println!("  (none)");
    }
    for entry in &result.fragments {
        print_fragment_entry(entry, verbose);
    }

    println!("{}", "Namespaces".bold());
    if result.namespaces.is_empty() {
        println!("  (none)");
    }
    for entry in &result.namespaces {
        print_sweep_entry(entry, verbose);
    }

    print_inventory_human(&result.inventory, "Remaining");

    let summary = result.summary();
    let mut line = format!(
        "{} confirmed, {} timed out, {} errored",
        summary.confirmed, summary.timed_out, summary.errored
    );
    if summary.interrupted > 0 {
        line.push_str(&format!(", {} interrupted", summary.interrupted));
    }
    line.push_str(&format!(" in {}", format_duration(result.duration)));
    if summary.errored > 0 {
        println!("{}", line.red());
    } else if summary.timed_out > 0 {
        println!("{}", line.yellow());
    } else {
        println!("{}", line.green());
    }
}

fn print_fragment_entry(entry: &FragmentEntry, verbose: bool) {
    let status = match &entry.status {
        FragmentStatus::NothingToDelete => "nothing to delete".dimmed(),
        FragmentStatus::Deleted => "deleted".normal(),
        FragmentStatus::Planned => "would delete".yellow(),
        FragmentStatus::Interrupted => "interrupted".yellow(),
        FragmentStatus::Errored { message, .. } => format!("error: {message}").red(),
    };
    println!("  {:<24} {status}", entry.fragment);
    for report in entry.targets() {
        print_target_report(report, verbose);
    }
}

fn print_target_report(report: &TargetReport, verbose: bool) {
    let mut detail = String::new();
    if verbose || report.outcome == Some(VerificationOutcome::TimedOut) {
        detail = format!(" ({} attempt(s))", report.attempts);
    }
    if report.already_absent {
        detail.push_str(" [already absent on delete]");
    }
    println!(
        "    {:<40} {}{detail}",
        report.target.to_string(),
        outcome_label(report.outcome)
    );
}

fn outcome_label(outcome: Option<VerificationOutcome>) -> ColoredString {
    match outcome {
        Some(VerificationOutcome::Confirmed) => "confirmed".green(),
        Some(VerificationOutcome::TimedOut) => "timed out".yellow(),
        None => "planned".dimmed(),
    }
}

fn print_sweep_entry(entry: &SweepEntry, verbose: bool) {
    let (status, claims) = match &entry.status {
        SweepStatus::NoClaims => ("no claims".dimmed(), None),
        SweepStatus::Swept { claims } => (
            format!("swept {} claim(s), not verified", claims.len()).normal(),
            Some(claims),
        ),
        SweepStatus::Planned { claims } => (
            format!("would sweep {} claim(s)", claims.len()).yellow(),
            Some(claims),
        ),
        SweepStatus::Interrupted => ("interrupted".yellow(), None),
        SweepStatus::Errored { message, .. } => (format!("error: {message}").red(), None),
    };
    println!("  {:<24} {status}", entry.namespace);
    if verbose && let Some(claims) = claims {
        for claim in claims {
            println!("    {claim}");
        }
    }
}

// ──────────────────── inventory ────────────────────

fn run_inventory(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let accessor =
        KubeAccessor::connect(&config.cluster).map_err(|e| CliError::Runtime(e.to_string()))?;
    let inventory = ClusterStateReporter::new(&accessor)
        .snapshot()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => print_inventory_human(&inventory, "Present"),
        OutputMode::Json => {
            let payload = json!({
                "command": "inventory",
                "inventory": inventory,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_inventory_human(inventory: &Inventory, heading: &str) {
    println!("{}", heading.bold());
    if inventory.is_empty() {
        println!("  {}", "no persistent volumes or claims".green());
        return;
    }
    for volume in &inventory.volumes {
        let bound = volume
            .claim_ref
            .as_ref()
            .map(|r| match &r.namespace {
                Some(ns) => format!(" -> {ns}/{}", r.name),
                None => format!(" -> {}", r.name),
            })
            .unwrap_or_default();
        println!("  {:<3} {}{bound}", TargetKind::Volume.label(), volume.name);
    }
    for claim in &inventory.claims {
        println!(
            "  {:<3} {}/{}",
            TargetKind::Claim.label(),
            claim.namespace,
            claim.name
        );
    }
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let hash = config
                        .stable_hash()
                        .map_err(|e| CliError::Runtime(e.to_string()))?;
                    let payload = json!({
                        "command": "config show",
                        "hash": hash,
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
    }
}

// ──────────────────── helpers ────────────────────

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("PVTD_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
