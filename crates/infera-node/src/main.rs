use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use infera_node::config::NodeConfig;
use infera_node::genesis::NodeGenesis;
use infera_node::logging;
use infera_node::replay::Replayer;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_CONFIG: &str = "./infera-config.toml";

#[derive(Parser)]
#[command(name = "infera-node")]
#[command(about = "Infera regret & reputation engine - deterministic block replay", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and a devnet genesis
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Replay a genesis file block by block
    Replay {
        /// Genesis file (overrides config and INFERA_GENESIS)
        #[arg(short, long)]
        genesis: Option<PathBuf>,

        /// Number of blocks to replay
        #[arg(short, long)]
        blocks: Option<u64>,

        /// Write the final keeper state to this file
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Stop at the first rejected transaction
        #[arg(long)]
        strict: bool,
    },

    /// Check a genesis file and print its hash
    Validate {
        /// Genesis file to check
        genesis: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    // Priority order: CLI args > ENV vars > Config file > Defaults
    let mut config = match path {
        Some(path) => NodeConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => NodeConfig::from_file(Path::new(DEFAULT_CONFIG))?,
        None => NodeConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    if config.logging.show_boot_banner && cli.verbose == 0 && std::env::var("RUST_LOG").is_err() {
        logging::display_boot_banner(env!("CARGO_PKG_VERSION"));
    }
    if let Err(e) = logging::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Init { output } => {
            info!(output_dir = ?output, "🧬 Initializing node configuration");
            std::fs::create_dir_all(&output)?;

            let config_path = output.join("infera-config.toml");
            let genesis_path = output.join("genesis.json");
            config.node.data_dir = output.clone();
            config.replay.genesis = PathBuf::from("genesis.json");
            config.save_to_file(&config_path)?;

            let genesis = NodeGenesis::devnet()?;
            genesis.save_to_file(&genesis_path)?;
            info!(
                config = ?config_path,
                genesis = ?genesis_path,
                genesis_hash = %genesis.calculate_hash()?,
                "✅ Configuration written"
            );
            Ok(())
        }

        Commands::Replay {
            genesis,
            blocks,
            export,
            strict,
        } => {
            if let Some(genesis) = genesis {
                config.replay.genesis = genesis;
            }
            if blocks.is_some() {
                config.replay.blocks = blocks;
            }
            if export.is_some() {
                config.replay.export_path = export;
            }
            if strict {
                config.replay.halt_on_rejected_tx = true;
            }

            let genesis_path = config.resolve(&config.replay.genesis);
            let genesis = NodeGenesis::from_file(&genesis_path)?;
            info!(
                node = %config.node.name,
                genesis = ?genesis_path,
                genesis_hash = %genesis.calculate_hash()?,
                "🚀 Starting replay"
            );

            let mut replayer =
                Replayer::from_genesis(&genesis)?.halt_on_rejected_tx(config.replay.halt_on_rejected_tx);
            let summary = replayer.run(config.replay.blocks)?;
            println!(
                "replayed {} blocks to height {}: {} applied, {} rejected, {} scoring rounds, {} paid",
                summary.blocks,
                summary.final_height,
                summary.applied,
                summary.rejected,
                summary.scoring_rounds,
                summary.rewards_paid
            );
            println!("state hash {}", summary.state_hash);

            if let Some(path) = &config.replay.export_path {
                let path = config.resolve(path);
                let state = replayer.export()?;
                let content = serde_json::to_string_pretty(&state)?;
                std::fs::write(&path, content)
                    .with_context(|| format!("writing export {}", path.display()))?;
                info!(path = ?path, block_height = state.block_height, "📤 State exported");
            }
            Ok(())
        }

        Commands::Validate { genesis } => {
            let loaded = NodeGenesis::from_file(&genesis)?;
            loaded.verify()?;
            println!("{} ok", genesis.display());
            println!("chain id {}", loaded.chain_id);
            println!("supply {}", loaded.total_supply());
            println!("hash {}", loaded.calculate_hash()?);
            Ok(())
        }
    }
}
