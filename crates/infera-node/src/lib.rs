pub mod config;
pub mod genesis;
pub mod logging;
pub mod replay;

pub use config::{LoggingConfig, NodeConfig, ReplayConfig};
pub use genesis::{NodeGenesis, ScheduledTx};
pub use replay::{BlockSummary, ReplaySummary, Replayer};
