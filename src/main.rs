//! Strata CLI - layered JSON configuration with secure properties.

use clap::Parser;
use std::process;
use strata::{Config, LoadOptions};
use strata::cli::{Cli, Commands, DefaultCommands, LayerArgs};
use strata::commands::{self, Output, Target};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g., `debug`, `strata=trace`).
const LOG_ENV: &str = "STRATA_LOG";

fn main() {
    init_logging();

    let cli = Cli::parse();
    let human = cli.human_readable;

    let result = commands::open(
        &cli.app,
        cli.vault_file.as_deref(),
        &cli.legacy_services,
        LoadOptions::new(),
    )
    .and_then(|mut config| run_command(cli.command, &mut config, human));

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Log to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn target(layer: LayerArgs) -> Target {
    Target::new(layer.user, layer.global)
}

fn run_command(command: Commands, config: &mut Config, human: bool) -> Result<(), strata::Error> {
    match command {
        Commands::Get { path } => {
            let result = commands::get(config, &path)?;
            output(&result, human);
        }
        Commands::Set {
            path,
            value,
            secure,
            json,
            layer,
        } => {
            let value = commands::parse_value(&value, json)?;
            let result = commands::set(config, &path, value, secure, target(layer))?;
            output(&result, human);
        }
        Commands::Unset { path, layer } => {
            let result = commands::unset(config, &path, target(layer))?;
            output(&result, human);
        }
        Commands::Secure { path, layer } => {
            let result = commands::secure(config, &path, target(layer))?;
            output(&result, human);
        }
        Commands::List { show_secure } => {
            let result = commands::list(config, show_secure)?;
            output(&result, human);
        }
        Commands::Layers { layer } => {
            config.activate(layer.user, layer.global);
            output(&commands::layers(config), human);
        }
        Commands::Schema { uri, file, layer } => {
            let result = commands::schema(config, &uri, file.as_deref(), target(layer))?;
            output(&result, human);
        }
        Commands::Profile { profile } => {
            let result = commands::profile(config, &profile)?;
            output(&result, human);
        }
        Commands::Default { command } => match command {
            DefaultCommands::Get { profile_type } => {
                output(&commands::default_get(config, &profile_type), human);
            }
            DefaultCommands::Set {
                profile_type,
                profile,
                layer,
            } => {
                let result = commands::default_set(config, &profile_type, &profile, target(layer))?;
                output(&result, human);
            }
        },
    }
    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
