//! Seatwatch: watch an enrollment portal and notify or enroll when a seat opens.

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use seatwatch::{ActionMode, CancelSignal};
use seatwatch_cli::commands;
use seatwatch_cli::config::{Config, Overrides};
use seatwatch_cli::output;

#[derive(Parser)]
#[command(
    name = "seatwatch",
    about = "Watch an enrollment portal for open seats, then notify or enroll",
    version
)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Track the configured courses until enrolled or stopped (default).
    Run {
        /// Semester to watch (1-3).
        #[arg(long)]
        semester: Option<u8>,

        /// What to do when a seat opens (notify, enroll).
        #[arg(long)]
        mode: Option<ActionMode>,

        /// Seconds between portal checks.
        #[arg(long)]
        refresh: Option<u64>,
    },

    /// Fetch the enrollment page once and list every course on it.
    Catalog {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Log in and save the portal session.
    Login,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   seatwatch completions bash > ~/.local/share/bash-completion/completions/seatwatch
    ///   seatwatch completions zsh > ~/.zfunc/_seatwatch
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.unwrap_or(Commands::Run {
        semester: None,
        mode: None,
        refresh: None,
    });

    match command {
        Commands::Run {
            semester,
            mode,
            refresh,
        } => {
            let overrides = Overrides {
                semester,
                mode,
                refresh_secs: refresh,
            };
            let config = Config::load(cli.config.as_deref(), &overrides)?;

            let cancel = Arc::new(CancelSignal::new());
            let signal = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received Ctrl-C, stopping");
                    signal.cancel();
                }
            });

            let outcome = commands::run(&config, &cancel).await?;
            println!("{}", output::outcome_line(&outcome));
        }

        Commands::Catalog { json } => {
            let config = Config::load(cli.config.as_deref(), &Overrides::default())?;
            let courses = commands::catalog(&config).await?;
            if json {
                output::print_json(&courses)?;
            } else {
                print!("{}", output::catalog_table(&courses));
            }
        }

        Commands::Login => {
            let config = Config::load(cli.config.as_deref(), &Overrides::default())?;
            let store = commands::login(&config).await?;
            println!("Logged in; session saved to {}", store.path().display());
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "seatwatch", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["seatwatch", "run", "--semester", "2", "--mode", "enroll"]).unwrap();
        match cli.command {
            Some(Commands::Run { semester, mode, .. }) => {
                assert_eq!(semester, Some(2));
                assert_eq!(mode, Some(ActionMode::Enroll));
            }
            _ => panic!("expected run"),
        }
        assert!(seatwatch_cli::resolve_config_path(Some("x.json")).ends_with("x.json"));
    }
}
