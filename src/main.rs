use std::path::PathBuf;

use clap::{Parser, Subcommand};

use drover::config::Config;
use drover::facade::{DiagnosticsRequest, Orchestrator, PlaybookRequest};
use drover::inventory::VarMap;
use drover::{dlog, dlog_error, report, Error, Result};

/// Drover - fleet diagnostics and remediation orchestrator
#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    DROVER_DEBUG=1    Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Inventory file (overrides the configured path)
    #[arg(short = 'i', long, global = true)]
    pub inventory: Option<PathBuf>,

    /// Concurrent per-host jobs
    #[arg(long, global = true)]
    pub forks: Option<usize>,

    /// Per-host timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging (writes to ~/.drover/drover.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Fleet operations
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show the inventory's host and group structure
    Inventory,

    /// Expand a host pattern without dispatching anything
    Hosts {
        /// Pattern to expand, e.g. 'web,db' or 'all,!web1'
        pattern: String,
    },

    /// Run the diagnostic probe across matching hosts
    Check {
        /// Hosts to probe
        #[arg(default_value = "all")]
        pattern: String,

        /// Only run matching probe plugins
        #[arg(long)]
        plugins: Option<String>,
    },

    /// List available remediation playbooks
    Playbooks,

    /// Apply a remediation playbook to matching hosts
    Apply {
        /// Playbook name, with or without extension
        playbook: String,

        /// Hosts to remediate
        #[arg(default_value = "all")]
        pattern: String,

        /// Extra variable for the playbook (key=value, repeatable)
        #[arg(short = 'e', long = "extra-var", value_name = "KEY=VALUE")]
        extra_vars: Vec<String>,

        /// Report what would change without changing anything
        #[arg(short = 'C', long)]
        check: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    drover::log::init_with_debug(cli.debug);

    let mut config = Config::load()?;
    if let Some(inventory) = &cli.inventory {
        config.inventory = Some(inventory.display().to_string());
    }
    if let Some(forks) = cli.forks {
        config.forks = Some(forks);
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = Some(timeout);
    }

    let orchestrator = Orchestrator::new(config);
    let result = match cli.command {
        Command::Inventory => run_inventory(&orchestrator, cli.json),
        Command::Hosts { pattern } => run_hosts(&orchestrator, &pattern, cli.json),
        Command::Check { pattern, plugins } => run_check(&orchestrator, pattern, plugins, cli.json),
        Command::Playbooks => run_playbooks(&orchestrator, cli.json),
        Command::Apply {
            playbook,
            pattern,
            extra_vars,
            check,
        } => run_apply(&orchestrator, playbook, pattern, &extra_vars, check, cli.json),
    };
    if let Err(error) = &result {
        dlog_error!("command failed: {}", error);
    }
    result
}

fn run_inventory(orchestrator: &Orchestrator, json: bool) -> Result<()> {
    let overview = orchestrator.list_inventory(None)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
    } else {
        print!("{}", report::format_overview(&overview));
    }
    Ok(())
}

fn run_hosts(orchestrator: &Orchestrator, pattern: &str, json: bool) -> Result<()> {
    let targets = orchestrator.resolve_hosts(pattern, None)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
    } else {
        print!("{}", report::format_targets(&targets));
    }
    Ok(())
}

fn run_check(
    orchestrator: &Orchestrator,
    pattern: String,
    plugins: Option<String>,
    json: bool,
) -> Result<()> {
    dlog!("check '{}' plugins={:?}", pattern, plugins);
    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(orchestrator.run_diagnostics(DiagnosticsRequest {
        pattern,
        plugin_filter: plugins,
        ..DiagnosticsRequest::default()
    }))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", report::format_diagnostics(&summary));
    }
    Ok(())
}

fn run_playbooks(orchestrator: &Orchestrator, json: bool) -> Result<()> {
    let catalog = orchestrator.list_playbooks()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
    } else {
        print!("{}", report::format_catalog(&catalog));
    }
    Ok(())
}

fn run_apply(
    orchestrator: &Orchestrator,
    playbook: String,
    pattern: String,
    extra_vars: &[String],
    check: bool,
    json: bool,
) -> Result<()> {
    let extra_vars = parse_extra_vars(extra_vars)?;
    dlog!("apply '{}' on '{}' check={}", playbook, pattern, check);
    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(orchestrator.run_playbook(PlaybookRequest {
        playbook,
        pattern,
        extra_vars,
        check,
        ..PlaybookRequest::default()
    }))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", report::format_playbook(&summary));
    }
    Ok(())
}

/// Parse repeated `key=value` arguments.
fn parse_extra_vars(pairs: &[String]) -> Result<VarMap> {
    let mut vars = VarMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                vars.insert(key.trim().to_string(), value.to_string());
            }
            _ => {
                return Err(Error::Validation(format!(
                    "invalid extra var '{}', expected key=value",
                    pair
                )))
            }
        }
    }
    Ok(vars)
}
