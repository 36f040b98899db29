//! crds-submit — entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crds_submit::Session;
use crds_submit_cli::commands;
use crds_submit_cli::config::{resolve_session_config, ConnectionArgs};

#[derive(Parser)]
#[command(
    name = "crds-submit",
    about = "Scripted access to the CRDS web submission site",
    version
)]
struct Cli {
    /// Server root URL. Also reads CRDS_SERVER_URL.
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Account name. Also reads CRDS_USERNAME.
    #[arg(short, long, global = true)]
    username: Option<String>,

    /// Account password. Prefer CRDS_PASSWORD over the flag.
    #[arg(long, global = true)]
    password: Option<String>,

    /// Instrument to lock at login. Also reads CRDS_INSTRUMENT.
    #[arg(short, long, global = true)]
    instrument: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, checking the response for login errors.
    Login {
        /// Page to proceed to after login.
        #[arg(long, default_value = "/")]
        next: String,
    },

    /// Show the current user's lock; fails if a live instrument lock is held.
    LockStatus,

    /// Upload files, chunking large ones.
    Upload {
        /// Files to upload, in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Skip the logout after uploading (keeps the instrument locked).
        #[arg(long)]
        keep_session: bool,
    },

    /// Confirm (or cancel) a submission from its results URL.
    Confirm {
        /// Results page URL reported by the server.
        ready_url: String,

        /// Cancel instead of confirming.
        #[arg(long)]
        cancel: bool,
    },

    /// Log out, releasing any instrument lock.
    Logout,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   crds-submit completions bash > ~/.local/share/bash-completion/completions/crds-submit
    ///   crds-submit completions zsh > ~/.zfunc/_crds-submit
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "crds-submit", &mut std::io::stdout());
        return Ok(());
    }

    let args = ConnectionArgs {
        server_url: cli.server_url,
        username: cli.username,
        password: cli.password,
        instrument: cli.instrument,
    };
    let config = resolve_session_config(&args)?;
    let session = Session::connect(config)?;

    let result = run(&session, cli.command).await;
    session.shutdown().await;
    result
}

async fn run(session: &Session, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Login { next } => {
            commands::login(session, &next).await?;
            println!("Logged in.");
        }

        Commands::LockStatus => {
            let status = commands::lock_status(session).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Upload {
            files,
            keep_session,
        } => {
            let reports = commands::upload(session, &files, keep_session).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }

        Commands::Confirm { ready_url, cancel } => {
            let response = commands::confirm(session, &ready_url, cancel).await?;
            println!(
                "{} {}",
                if cancel { "Cancelled" } else { "Confirmed" },
                response.url
            );
        }

        Commands::Logout => {
            commands::logout(session).await?;
            println!("Logged out.");
        }

        // Handled before connecting.
        Commands::Completions { .. } => {}
    }
    Ok(())
}
