use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgGroup, Parser, ValueEnum};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tfstate_inventory::config::{self, Config, Overrides, Settings};
use tfstate_inventory::inventory::{project_groups, project_host};
use tfstate_inventory::output::write_json;
use tfstate_inventory::remote::StateFetcher;
use tfstate_inventory::state::{load_state_file, StateDocument};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Ansible dynamic inventory from Terraform state
#[derive(Parser, Debug)]
#[command(name = "tfstate-inventory", version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").args(["list", "host"])))]
struct Args {
    /// List all groups and their hosts
    #[arg(long)]
    list: bool,

    /// Show the variables of one host
    #[arg(long, value_name = "NAME")]
    host: Option<String>,

    /// Config file (defaults to $TF_STATE_CONFIG, then the user config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Terraform state file
    #[arg(long, value_name = "PATH")]
    state: Option<PathBuf>,

    /// Tag holding the group name
    #[arg(long, value_name = "TAG")]
    group_tag: Option<String>,

    /// Tag holding the host name
    #[arg(long, value_name = "TAG")]
    instance_tag: Option<String>,

    /// Fail when an instance lacks the group or host tag instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Which inventory view to print
enum Mode {
    List,
    Host(String),
}

// Stdout carries the inventory JSON, so logs always go to a file.
fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("tfstate-inventory started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir
            .join("tfstate-inventory")
            .join("tfstate-inventory.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".tfstate-inventory").join("tfstate-inventory.log");
    }
    PathBuf::from("tfstate-inventory.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprint!("Error: {:#}\n\n", err);
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprint!("Error: {:#}\n\n", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mode = match (args.list, args.host.clone()) {
        (true, _) => Mode::List,
        (false, Some(host)) if !host.is_empty() => Mode::Host(host),
        _ => anyhow::bail!("No action given..."),
    };

    let config_path = config::config_file_path(args.config.as_deref(), config::process_env);
    let config = Config::load(config_path.as_deref())?;

    let overrides = Overrides {
        state_file: args.state.clone(),
        group_tag: args.group_tag.clone(),
        member_tag: args.instance_tag.clone(),
        strict: args.strict,
    };
    let settings = Settings::resolve(&config, &overrides, config::process_env)?;

    tracing::info!(
        "State file: {:?}, group tag: {}, instance tag: {}, policy: {}",
        settings.state_file,
        settings.group_tag,
        settings.member_tag,
        settings.policy.as_str()
    );

    if let Some(remote) = &settings.remote {
        StateFetcher::new()?
            .download(remote, &settings.state_file)
            .await
            .context("Failed to fetch remote state")?;
    }

    let state = load_state_file(&settings.state_file)
        .with_context(|| format!("Failed to load {}", settings.state_file.display()))?;
    log_state_summary(state.as_ref());

    let mut stdout = io::stdout().lock();
    match mode {
        Mode::List => {
            let inventory = project_groups(
                state.as_ref(),
                &settings.group_tag,
                &settings.member_tag,
                settings.policy,
            )?;
            tracing::info!("Listing {} groups", inventory.len());
            write_json(&mut stdout, &inventory).context("Failed to print inventory")?;
        }
        Mode::Host(name) => {
            let host = project_host(
                state.as_ref(),
                &name,
                &settings.member_tag,
                settings.policy,
            )?;
            tracing::info!("Host {} has {} variables", name, host.len());
            write_json(&mut stdout, &host).context("Failed to print host variables")?;
        }
    }

    Ok(())
}

fn log_state_summary(state: Option<&StateDocument>) {
    let Some(state) = state else {
        tracing::warn!("State document is empty");
        return;
    };

    tracing::debug!(
        "Loaded state version {:?} (terraform {:?}), serial {:?}, lineage {:?}: {} modules, {} resources, {} instances",
        state.version,
        state.terraform_version,
        state.serial,
        state.lineage,
        state.modules.len(),
        state.resources().count(),
        state.instances().count()
    );
}
