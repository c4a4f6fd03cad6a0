use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "holdfast", version, about = "Holdfast CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Today's tasks on the remote store
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Run a gesture against in-process collaborators and print its events
    Simulate(commands::simulate::SimulateArgs),
    /// Photos cached by capture sessions
    Photos {
        #[command(subcommand)]
        action: commands::photos::PhotosAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Config { action } => commands::config::run(action),
        Commands::Task { action } => commands::task::run(action),
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Photos { action } => commands::photos::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
