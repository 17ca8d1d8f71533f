//! testmate CLI
//!
//! Command-line interface for discovering, running and watching native test
//! executables

mod commands;
mod output;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;
use testmate_core::init_tracing_with_filter;
use tracing::error;

#[derive(Parser)]
#[command(name = "testmate")]
#[command(about = "testmate: discover and run Catch2 and Google Test executables")]
#[command(version = testmate_core::VERSION)]
#[command(
    long_about = "testmate finds Catch2 and Google Test executables in a workspace, lists their\n\
tests, runs them in parallel and follows rebuilds as they happen.\n\
\n\
Examples:\n  \
testmate list                         # Show all discovered tests\n  \
testmate run                          # Run everything\n  \
testmate run --filter 'Math*'         # Run matching suites and tests\n  \
testmate watch                        # Follow rebuilds of test executables\n  \
testmate config init --format yaml    # Create a configuration file"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        help = "Path to configuration file (.testmaterc.json/.testmaterc.toml/testmate.yaml)"
    )]
    config: Option<PathBuf>,

    /// Workspace directory
    #[arg(
        short,
        long,
        global = true,
        default_value = ".",
        help = "Workspace directory patterns are resolved against"
    )]
    workspace: PathBuf,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Generate shell completion script
    #[arg(
        long,
        value_enum,
        help = "Generate completion script for specified shell"
    )]
    generate_completion: Option<Shell>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover executables and print their tests
    #[command(alias = "ls")]
    List {
        #[arg(
            short,
            long,
            default_value = "human",
            help = "Output format for the test tree"
        )]
        format: OutputFormat,
    },

    /// Run tests and report results
    Run {
        #[arg(
            long,
            help = "Glob matched against suite labels and test names (can be used multiple times)"
        )]
        filter: Vec<String>,

        #[arg(
            short,
            long,
            default_value = "human",
            help = "Output format for events and summary"
        )]
        format: OutputFormat,
    },

    /// Keep the test tree in sync with the file system until interrupted
    Watch {
        #[arg(
            short,
            long,
            default_value = "human",
            help = "Output format for tree changes"
        )]
        format: OutputFormat,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Create a configuration file in the workspace
    Init {
        #[arg(long, default_value = "json", help = "Configuration file format")]
        format: ConfigFormat,

        #[arg(long, help = "Overwrite existing configuration file")]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Print the JSON schema of the configuration file
    Schema,

    /// Check a configuration file
    Validate {
        #[arg(help = "Path to configuration file (default: search the workspace)")]
        path: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.generate_completion {
        generate_completion_script(shell);
        return;
    }

    if !cli.no_color && std::env::var("NO_COLOR").is_err() {
        colored::control::set_override(true);
    } else {
        colored::control::set_override(false);
    }

    // RUST_LOG still wins over -v
    let log_level = match cli.verbose {
        0 => "testmate=warn",
        1 => "testmate=info",
        2 => "testmate=debug",
        _ => "testmate=trace",
    };
    init_tracing_with_filter(log_level);

    if let Err(e) = run_command(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn generate_completion_script(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let workspace = cli.workspace;
    let config = cli.config;
    match cli.command {
        Some(Commands::List { format }) => {
            commands::list_command(&workspace, config.as_deref(), format).await
        }
        Some(Commands::Run { filter, format }) => {
            commands::run_command(&workspace, config.as_deref(), filter, format).await
        }
        Some(Commands::Watch { format }) => {
            commands::watch_command(&workspace, config.as_deref(), format).await
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { format, force } => {
                commands::config::init_command(&workspace, format, force)
            }
            ConfigAction::Show => commands::config::show_command(&workspace, config.as_deref()),
            ConfigAction::Schema => commands::config::schema_command(),
            ConfigAction::Validate { path } => {
                commands::config::validate_command(&workspace, path.or(config))
            }
        },
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
