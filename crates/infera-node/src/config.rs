use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSettings {
    pub name: String,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for the infera crates when `RUST_LOG` is unset
    pub level: String,
    /// One of `pretty`, `compact` or `json`
    pub format: String,
    pub file_output: Option<PathBuf>,
    pub show_boot_banner: bool,
    #[serde(default)]
    pub module_filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            show_boot_banner: true,
            module_filters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub genesis: PathBuf,
    /// Blocks to replay; `None` runs until the last scheduled transaction
    pub blocks: Option<u64>,
    /// Where the final keeper state is written as a genesis file
    pub export_path: Option<PathBuf>,
    /// Abort on the first rejected transaction instead of logging it
    pub halt_on_rejected_tx: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                name: "infera-node".to_string(),
                data_dir: PathBuf::from("./data"),
            },
            logging: LoggingConfig::default(),
            replay: ReplayConfig {
                genesis: PathBuf::from("./genesis.json"),
                blocks: None,
                export_path: None,
                halt_on_rejected_tx: false,
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        // env overrides are applied by the caller so it controls precedence
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("INFERA_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = env::var("INFERA_LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }
        if let Ok(blocks) = env::var("INFERA_BLOCKS") {
            if let Ok(n) = blocks.parse() {
                self.replay.blocks = Some(n);
            }
        }
        if let Ok(genesis) = env::var("INFERA_GENESIS") {
            if !genesis.is_empty() {
                self.replay.genesis = PathBuf::from(genesis);
            }
        }
        if let Ok(dir) = env::var("INFERA_DATA_DIR") {
            self.node.data_dir = PathBuf::from(dir);
        }
    }

    /// Relative replay paths are resolved against the data directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.starts_with(".") {
            path.to_path_buf()
        } else {
            self.node.data_dir.join(path)
        }
    }
}
