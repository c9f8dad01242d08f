use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use xbe::api::{HttpTransport, TokenResolver};
use xbe::config::Config;
use xbe::error::CliError;
use xbe::output::{render, OutputFormat};
use xbe::resource::{Action, Dispatcher, Invocation, Registry, Verb};

/// Command-line client for the XBE platform
#[derive(Parser, Debug)]
#[command(name = "xbe", version = xbe::VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging (written to the xbe log file)
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, update, or delete resources
    // --help belongs to the resource flags, whose usage the binder generates
    #[command(disable_help_flag = true)]
    Do(ResourceArgs),
    /// List or show resources
    #[command(disable_help_flag = true)]
    View(ResourceArgs),
}

#[derive(clap::Args, Debug)]
struct ResourceArgs {
    /// Resource name, e.g. cost-indexes
    resource: String,

    /// Action to perform
    #[arg(value_enum)]
    action: Action,

    /// Resource id (show/update/delete) followed by resource flags; see --help after the action
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
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

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // XBE_LOG narrows output per module, e.g. XBE_LOG=xbe::api=trace
    let filter = EnvFilter::try_from_env("XBE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("xbe {} started with log level: {:?}", xbe::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = Config::config_dir() {
        return config_dir.join("xbe.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".xbe").join("xbe.log");
    }
    PathBuf::from("xbe.log")
}

async fn run(verb: Verb, args: ResourceArgs) -> Result<()> {
    let config = Config::load();
    let registry = Registry::builtin().context("Failed to load resource definitions")?;
    let resolver = TokenResolver::from_env(&config);
    let transport = HttpTransport::new(config.timeout()).map_err(CliError::from)?;
    let dispatcher = Dispatcher::new(&registry, &resolver, &transport, config.effective_base_url());

    let invocation = Invocation::new(verb, args.resource, args.action, args.args);

    let completion = dispatcher.execute(&invocation).await?;
    let text = render(
        &completion.outcome,
        &invocation.resource,
        invocation.action,
        OutputFormat::from_flags(completion.json, completion.omit_null),
    )?;
    println!("{text}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let (verb, resource_args) = match args.command {
        Command::Do(resource_args) => (Verb::Do, resource_args),
        Command::View(resource_args) => (Verb::View, resource_args),
    };

    match run(verb, resource_args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("Command failed: {:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Typed failures carry their own exit code; anything else exits 1
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>()
        .map_or(1, CliError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use xbe::api::TransportError;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_help_after_action_reaches_resource_args() {
        let args = Args::try_parse_from(["xbe", "do", "cost-indexes", "create", "--help"]).unwrap();
        let Command::Do(resource_args) = args.command else {
            panic!("expected the do command");
        };
        assert_eq!(resource_args.resource, "cost-indexes");
        assert_eq!(resource_args.args, vec!["--help"]);
    }

    #[test]
    fn test_client_setup_failure_exits_as_transport() {
        let err: anyhow::Error = CliError::from(TransportError::Client("no TLS backend".into())).into();
        assert_eq!(exit_code(&err), 7);

        let untyped = anyhow::anyhow!("Failed to load resource definitions");
        assert_eq!(exit_code(&untyped), 1);
    }
}
