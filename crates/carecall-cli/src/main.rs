mod client;
mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, queue::QueueAction};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "carecall",
    about = "Outbound patient call queue: load records, run the queue, follow the calls",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .carecall/ or .git/)
    #[arg(long, global = true, env = "CARECALL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Address of a running `carecall serve`
    #[arg(
        long,
        global = true,
        env = "CARECALL_SERVER",
        default_value = "http://localhost:3141"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize carecall in the current project
    Init,

    /// Run the queue server and operator console
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,

        /// Open the console in a browser once listening
        #[arg(long)]
        open: bool,
    },

    /// Check a batch file without queueing anything
    Validate {
        /// YAML or JSON file of normalized rows
        file: PathBuf,
    },

    /// Show or check the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Show the queue status of a running server
    Status,

    /// List queued records and their call states
    Records,

    /// Send an operator command to the queue
    Queue {
        #[arg(value_enum)]
        action: QueueAction,
    },

    /// Upload a batch file to a running server
    Upload {
        /// YAML or JSON file of normalized rows
        file: PathBuf,
    },

    /// Report a provider event for the active call
    Report {
        /// Row number of the call
        row: u32,

        /// answered, no_answer, busy, failed or completed
        event: String,

        /// Outcome for `completed`: appointment_booked, reschedule_requested,
        /// incomplete or failed
        #[arg(long)]
        outcome: Option<String>,

        /// Failure reason for `failed`
        #[arg(long)]
        reason: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let client = client::Client::new(&cli.server);

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Serve { port, open } => cmd::serve::run(&root, port, open),
        Commands::Validate { file } => cmd::validate::run(&root, &file, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Status => cmd::status::run(&client, cli.json),
        Commands::Records => cmd::records::list(&client, cli.json),
        Commands::Queue { action } => cmd::queue::run(&client, action, cli.json),
        Commands::Upload { file } => cmd::records::upload(&client, &file, cli.json),
        Commands::Report {
            row,
            event,
            outcome,
            reason,
        } => cmd::report::parse_event(&event, outcome.as_deref(), reason.as_deref())
            .and_then(|event| cmd::report::run(&client, row, event, cli.json)),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
