//! chainfold - firewall chain flattening CLI
//!
//! # Usage
//!
//! ```bash
//! # Flatten INPUT from a captured `iptables -S`
//! iptables -S | chainfold flatten - --input-format iptables
//!
//! # Render as an nftables script, failing on any skipped jump
//! chainfold flatten rules.txt --input-format iptables --format nft --strict
//!
//! # Store a Windows capture and flatten it later
//! chainfold discover rules.txt --input-format netsh --save office
//! chainfold flatten @office
//!
//! # Compare a desired universe with what is running
//! chainfold diff desired.json @current
//! ```

use chainfold::config::{self, AppConfig};
use chainfold::discovery::{self, InputFormat};
use chainfold::render::{self, OutputFormat};
use chainfold::snapshots::{Snapshot, SnapshotStore};
use chainfold::{FirewallChain, Flattened, Flattener, Policy, utils};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "chainfold")]
#[command(about = "Flatten multi-chain firewall configurations into one chain", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten a chain into policy DROP plus ACCEPT rules
    Flatten {
        /// Input file, `-` for stdin, or `@name` for a saved snapshot
        input: String,
        /// Chain to flatten (default from config, usually INPUT)
        #[arg(short, long)]
        chain: Option<String>,
        /// Output format: text, json, iptables or nft
        #[arg(short, long)]
        format: Option<OutputFormat>,
        /// Input format: json, iptables or netsh
        #[arg(short, long, default_value = "json")]
        input_format: InputFormat,
        /// Fail when any jump branch had to be skipped
        #[arg(long)]
        strict: bool,
    },
    /// Parse a captured ruleset and print or store the chain universe
    Discover {
        /// Input file or `-` for stdin
        input: String,
        #[arg(short, long, default_value = "iptables")]
        input_format: InputFormat,
        /// Inbound default for netsh input (ACCEPT or DROP)
        #[arg(short, long)]
        policy: Option<String>,
        /// Save as a named snapshot instead of printing
        #[arg(short, long, value_name = "NAME")]
        save: Option<String>,
    },
    /// Show what changes between two flattened universes
    Diff {
        /// Desired universe (path, `-`, or `@name`)
        desired: String,
        /// Currently applied universe (path, `-`, or `@name`)
        actual: String,
        #[arg(short, long)]
        chain: Option<String>,
        #[arg(short, long, default_value = "json")]
        input_format: InputFormat,
    },
    /// Manage saved snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Show or initialize the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print build information
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to the data directory
    Init,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List saved snapshots
    List,
    /// Delete a saved snapshot
    Delete { name: String },
}

fn main() -> ExitCode {
    let _ = utils::ensure_dirs();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = runtime.block_on(config::load_config());
    init_logging(&config);

    match runtime.block_on(handle_cli(cli.command, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    if config.log_to_file
        && let Some(mut log_path) = utils::get_state_dir()
    {
        log_path.push("chainfold.log");
        if let Ok(file) = std::fs::File::create(log_path) {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
            return;
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_cli(command: Commands, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Flatten {
            input,
            chain,
            format,
            input_format,
            strict,
        } => {
            let chains = load_universe(&input, input_format, None).await?;
            let name = chain.unwrap_or_else(|| config.default_chain.clone());
            let flattener = Flattener::new(&chains)?;
            if !flattener.contains(&name) {
                let available: Vec<&str> = chains.iter().map(|c| c.name.as_str()).collect();
                return Err(format!(
                    "chain '{name}' is not defined (available: {})",
                    available.join(", ")
                )
                .into());
            }

            let flat = flattener.flatten(&name, None)?;
            report_warnings(&flat);
            let flat = if strict || config.strict {
                flat.into_strict()?
            } else {
                flat.into_chain()
            };

            let output = render::render(&flat, format.unwrap_or(config.default_format))?;
            print!("{output}");
            if !output.ends_with('\n') {
                println!();
            }
        }
        Commands::Discover {
            input,
            input_format,
            policy,
            save,
        } => {
            let chains = load_universe(&input, input_format, policy.map(Policy::from)).await?;

            if let Some(name) = save {
                let store = SnapshotStore::default_location()?;
                let snapshot = Snapshot::new(format!("{input_format}:{input}"), chains);
                store.save(&name, &snapshot).await?;
                println!("✓ Saved {} chains as '{name}'", snapshot.chains.len());
            } else {
                println!("{}", serde_json::to_string_pretty(&chains)?);
            }
        }
        Commands::Diff {
            desired,
            actual,
            chain,
            input_format,
        } => {
            let name = chain.unwrap_or_else(|| config.default_chain.clone());
            let desired = flatten_lenient(&load_universe(&desired, input_format, None).await?, &name)?;
            let actual = flatten_lenient(&load_universe(&actual, input_format, None).await?, &name)?;

            let (text, summary) = render::diff(&actual, &desired);
            if summary.is_empty() {
                println!("No changes for chain '{name}'");
            } else {
                print!("{text}");
                println!("{} added, {} removed", summary.added, summary.removed);
            }
        }
        Commands::Snapshots { action } => {
            let store = SnapshotStore::default_location()?;
            match action {
                SnapshotAction::List => {
                    let names = store.list().await?;
                    if names.is_empty() {
                        println!("No saved snapshots");
                    }
                    for name in names {
                        println!("  {name}");
                    }
                }
                SnapshotAction::Delete { name } => {
                    store.delete(&name).await?;
                    println!("✓ Deleted snapshot '{name}'");
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => println!("{}", serde_json::to_string_pretty(config)?),
            ConfigAction::Init => {
                config::save_config(config).await?;
                match utils::get_data_dir() {
                    Some(dir) => println!("✓ Wrote {}", dir.join("config.json").display()),
                    None => return Err("no data directory available".into()),
                }
            }
        },
        Commands::Version => {
            println!("chainfold {}", build::PKG_VERSION);
            println!("commit:  {}", build::SHORT_COMMIT);
            println!("branch:  {}", build::BRANCH);
            println!("built:   {}", build::BUILD_TIME);
            println!("rustc:   {}", build::RUST_VERSION);
        }
    }
    Ok(())
}

/// Loads a chain universe from a file, stdin, or `@snapshot`.
///
/// Discovery warnings go to stderr so stdout stays machine-readable.
async fn load_universe(
    input: &str,
    format: InputFormat,
    policy: Option<Policy>,
) -> Result<Vec<FirewallChain>, Box<dyn std::error::Error>> {
    if let Some(name) = input.strip_prefix('@') {
        let snapshot = SnapshotStore::default_location()?.load(name).await?;
        return Ok(snapshot.chains);
    }

    let text = utils::read_input(input).await?;
    let policy = policy
        .or_else(|| discovery::netsh::parse_inbound_policy(&text))
        .unwrap_or(Policy::Drop);
    let discovered = discovery::parse(format, &text, policy)?;
    for warning in &discovered.warnings {
        eprintln!("warning: {input}: {warning}");
    }
    Ok(discovered.chains)
}

fn flatten_lenient(chains: &[FirewallChain], name: &str) -> chainfold::Result<FirewallChain> {
    let flat = Flattener::new(chains)?.flatten(name, None)?;
    report_warnings(&flat);
    Ok(flat.into_chain())
}

fn report_warnings(flat: &Flattened) {
    for warning in &flat.warnings {
        eprintln!("warning: {warning}");
    }
}
