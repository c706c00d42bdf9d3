use clap::{Parser, Subcommand};

mod commands;
mod console;
mod logging;

#[derive(Parser)]
#[command(name = "bugslayer", version, about = "Bug Slayer: hunt cockroaches by ear")]
struct Cli {
    /// Log filter, e.g. "debug" or "bugslayer_core=trace" (overrides BUGSLAYER_LOG)
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a level in the terminal
    Play(commands::play::PlayArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Player ledger: health, coins, ammo and votes
    Ledger {
        #[command(subcommand)]
        action: commands::ledger::LedgerAction,
    },
    /// Question bank and asked-question log
    Quiz {
        #[command(subcommand)]
        action: commands::quiz::QuizAction,
    },
    /// Level catalog
    Levels {
        #[command(subcommand)]
        action: commands::levels::LevelsAction,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log.as_deref());

    let result = match cli.command {
        Commands::Play(args) => commands::play::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Ledger { action } => commands::ledger::run(action),
        Commands::Quiz { action } => commands::quiz::run(action),
        Commands::Levels { action } => commands::levels::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
