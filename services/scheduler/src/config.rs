use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use weave_assign::EngineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub cycle_interval: Duration,
    pub ticks_per_cycle: u64,
    pub engine_config_path: Option<PathBuf>,
    pub scenario_path: Option<PathBuf>,
    /// Stop after this many cycles; run until shutdown when unset.
    pub max_cycles: Option<u64>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cycle_interval_ms: u64 = std::env::var("WEAVE_CYCLE_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .context("WEAVE_CYCLE_INTERVAL_MS must be an integer")?;

        let ticks_per_cycle: u64 = std::env::var("WEAVE_TICKS_PER_CYCLE")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("WEAVE_TICKS_PER_CYCLE must be an integer")?;
        if ticks_per_cycle == 0 {
            anyhow::bail!("WEAVE_TICKS_PER_CYCLE must be positive");
        }

        let engine_config_path = std::env::var("WEAVE_ENGINE_CONFIG").ok().map(PathBuf::from);
        let scenario_path = std::env::var("WEAVE_SCENARIO").ok().map(PathBuf::from);

        let max_cycles = match std::env::var("WEAVE_MAX_CYCLES") {
            Ok(v) => Some(v.parse().context("WEAVE_MAX_CYCLES must be an integer")?),
            Err(_) => None,
        };

        let log_level = std::env::var("WEAVE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            cycle_interval: Duration::from_millis(cycle_interval_ms.max(1)),
            ticks_per_cycle,
            engine_config_path,
            scenario_path,
            max_cycles,
            log_level,
        })
    }
}

/// Load an engine config from TOML. Omitted sections take their defaults.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read engine config: {}", path.display()))?;
    engine_config_from_toml_str(&contents)
        .with_context(|| format!("invalid engine config: {}", path.display()))
}

pub fn engine_config_from_toml_str(contents: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(contents).context("invalid engine config TOML")?;
    config.validate()?;
    Ok(config)
}
