//! `enginectl`: drive chess engines from the terminal.
//!
//! Engines are referred to either by their name in the registry file
//! (`ENGINEBRIDGE_ENGINES_FILE`, or `--registry`) or by a path to an
//! executable, in which case its protocol is detected first.

mod commands;

use std::path::PathBuf;

use bridge::BridgeConfig;
use clap::{Args, Parser, Subcommand, ValueEnum};
use engine::Protocol;

#[derive(Parser)]
#[command(name = "enginectl", about = "Run UCI and WinBoard chess engines")]
struct Cli {
    /// Registry file to use instead of the configured one.
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report which protocol an executable speaks.
    Detect { path: PathBuf },
    /// Inspect or edit the engine registry.
    Engines {
        #[command(subcommand)]
        action: EnginesAction,
    },
    /// Ask an engine for its best move.
    Bestmove {
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Print analysis lines as the engine reports them.
    Analyze {
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        search: SearchArgs,
        /// Number of variations.
        #[arg(long, default_value_t = 3)]
        multipv: u32,
    },
    /// Let an avatar imitating a player pick a move.
    Avatar {
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        position: PositionArgs,
        /// Estimated rating of the imitated player; full strength if omitted.
        #[arg(long)]
        rating: Option<u32>,
        #[arg(long, default_value = "player")]
        username: String,
        /// Search time in milliseconds.
        #[arg(long, default_value_t = 1000)]
        movetime: u64,
        /// Seed for reproducible move choices.
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Subcommand)]
enum EnginesAction {
    List,
    /// Register an executable. The protocol is detected unless given.
    Add {
        name: String,
        path: PathBuf,
        #[arg(long, value_enum)]
        protocol: Option<ProtocolArg>,
    },
    Remove { name: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Uci,
    Winboard,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Uci => Protocol::Modern,
            ProtocolArg::Winboard => Protocol::Legacy,
        }
    }
}

#[derive(Args)]
struct EngineArgs {
    /// Registered engine name, or path to an engine executable.
    #[arg(short, long)]
    engine: String,
}

#[derive(Args)]
struct PositionArgs {
    /// Start position; the standard one if omitted.
    #[arg(long)]
    fen: Option<String>,
    /// Moves played from the start position, in coordinate notation.
    #[arg(long, num_args = 1..)]
    moves: Vec<String>,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    position: PositionArgs,
    /// Search time in milliseconds.
    #[arg(long, default_value_t = 1000)]
    movetime: u64,
    #[arg(long)]
    depth: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = BridgeConfig::from_env();
    if let Some(registry) = cli.registry {
        config.engines_file = registry;
    }

    match cli.command {
        Commands::Detect { path } => commands::detect(&config, &path).await,
        Commands::Engines { action } => match action {
            EnginesAction::List => commands::list_engines(&config),
            EnginesAction::Add {
                name,
                path,
                protocol,
            } => commands::add_engine(&config, name, path, protocol.map(Protocol::from)).await,
            EnginesAction::Remove { name } => commands::remove_engine(&config, &name),
        },
        Commands::Bestmove { engine, search } => {
            commands::best_move(config, &engine.engine, &search).await
        }
        Commands::Analyze {
            engine,
            search,
            multipv,
        } => commands::analyze(config, &engine.engine, &search, multipv).await,
        Commands::Avatar {
            engine,
            position,
            rating,
            username,
            movetime,
            seed,
        } => {
            let request = commands::AvatarRequest {
                rating,
                username,
                movetime,
                seed,
            };
            commands::avatar_move(config, &engine.engine, &position, request).await
        }
    }
}
