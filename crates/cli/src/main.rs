mod config;
mod history;
mod logging;
mod serve;

use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::ServeArgs;
use crate::logging::LogFormat;

/// How long blocking verifier calls may linger once the server has stopped.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Cadastral query verification service.
#[derive(Parser)]
#[command(name = "cadastre", version, about = "Cadastral query verification service")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Log line format on stderr
    #[arg(
        long,
        global = true,
        env = "CADASTRE_LOG_FORMAT",
        default_value = "text",
        value_enum
    )]
    log_format: LogFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve(ServeArgs),

    /// Create the ledger schema in a database
    Migrate {
        /// `sqlite://` URL of the ledger database
        #[arg(long, env = "CADASTRE_DATABASE")]
        database: String,
    },

    /// Print recorded queries, oldest first
    History {
        /// `sqlite://` URL of the ledger database
        #[arg(long, env = "CADASTRE_DATABASE")]
        database: String,
        /// Only show queries for this cadastral number
        #[arg(long)]
        cadastral_number: Option<String>,
    },
}

fn main() {
    // Settings may come from a .env file in the working directory.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve(args) => match args.validate() {
            Ok(config) => rt.block_on(serve::start_server(config)),
            Err(e) => Err(e.into()),
        },
        Commands::Migrate { database } => rt.block_on(history::cmd_migrate(&database, cli.quiet)),
        Commands::History {
            database,
            cadastral_number,
        } => rt.block_on(history::cmd_history(
            &database,
            cadastral_number.as_deref(),
            cli.output,
        )),
    };

    rt.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
