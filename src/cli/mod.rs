//! CLI argument definitions for Strata.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Version string with the commit the binary was built from.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("STRATA_GIT_COMMIT"),
    " ",
    env!("STRATA_BUILD_TIMESTAMP"),
    ")"
);

/// Strata - layered JSON configuration with secure properties.
///
/// Reads merge the project-user, project, global-user and global layers.
/// Writes go to the project layer unless --user/--global say otherwise.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version = VERSION, about = "Layered JSON configuration with secure properties", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Application whose config files are used (<app>.config.json)
    #[arg(long = "app", global = true, env = "STRATA_APP", default_value = "strata")]
    pub app: String,

    /// Store secure values in this JSON file instead of the OS credential store
    #[arg(long = "vault-file", global = true, env = "STRATA_VAULT_FILE")]
    pub vault_file: Option<PathBuf>,

    /// Older credential service names to read secure values from
    #[arg(long = "legacy-service", global = true)]
    pub legacy_services: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Layer selection for commands that write.
#[derive(Args, Debug, Clone, Copy)]
pub struct LayerArgs {
    /// Target the user layer (<app>.config.user.json)
    #[arg(long)]
    pub user: bool,

    /// Target the global layer in the home directory
    #[arg(long)]
    pub global: bool,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a value from the merged configuration
    Get {
        /// Dotted property path (e.g., profiles.lpar1.properties.host)
        path: String,
    },

    /// Set a value in one layer
    ///
    /// "true", "false" and integers are stored typed. If the layer already
    /// holds an array at the path, the value is appended.
    Set {
        /// Dotted property path
        path: String,
        /// Value to store
        value: String,
        /// Store the value in the secure vault instead of the file
        #[arg(long)]
        secure: bool,
        /// Parse the value as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        layer: LayerArgs,
    },

    /// Remove a value (and its vault entry) from one layer
    Unset {
        /// Dotted property path
        path: String,
        #[command(flatten)]
        layer: LayerArgs,
    },

    /// Mark a path as secure in one layer
    Secure {
        /// Dotted property path
        path: String,
        #[command(flatten)]
        layer: LayerArgs,
    },

    /// Print the merged configuration
    List {
        /// Show secure values instead of masking them
        #[arg(long)]
        show_secure: bool,
    },

    /// Show the four layer files and which one is active
    Layers {
        #[command(flatten)]
        layer: LayerArgs,
    },

    /// Set the $schema reference of one layer
    Schema {
        /// Schema URI or path, relative paths resolve against the layer directory
        uri: String,
        /// Also write this JSON schema document to the URI
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        layer: LayerArgs,
    },

    /// Show a profile's properties and where each value came from
    Profile {
        /// Dotted profile path (e.g., lpar1.zosmf)
        profile: String,
    },

    /// Default profile commands
    Default {
        #[command(subcommand)]
        command: DefaultCommands,
    },
}

/// Default profile subcommands
#[derive(Subcommand, Debug)]
pub enum DefaultCommands {
    /// Print the default profile for a type
    Get {
        /// Profile type (e.g., zosmf)
        profile_type: String,
    },

    /// Set the default profile for a type
    Set {
        /// Profile type
        profile_type: String,
        /// Dotted profile path
        profile: String,
        #[command(flatten)]
        layer: LayerArgs,
    },
}
