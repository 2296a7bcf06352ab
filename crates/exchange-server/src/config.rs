//! Server configuration.
//!
//! Loaded from a TOML file; an unreadable or unparsable file aborts
//! startup. Endpoint ports may be set to 0 to let the OS pick (useful in
//! tests).

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub market_data: EndpointConfig,
    pub orders: EndpointConfig,
    pub history: HistoryConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

/// Exchange-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// The single instrument this exchange trades.
    pub symbol: String,
    /// Identifier that owns replayed historical orders.
    #[serde(default = "default_server_id")]
    pub server_id: String,
    /// Identifier assigned to live client orders.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Stamp client events with the replayed simulation time instead of
    /// wall-clock time.
    #[serde(default)]
    pub use_simulation_time: bool,
}

/// One TCP endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    pub port: u16,
}

impl EndpointConfig {
    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Historical data source settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Historical market event file replayed into the book.
    pub data_file: PathBuf,
    /// Run the external loader before starting (populate the store).
    #[serde(default)]
    pub populate: bool,
    /// Sleep this long per simulated second, so replay does not starve the
    /// rest of the process. Zero disables pacing.
    #[serde(default)]
    pub replay_delay_ms: u64,
}

/// Report sink settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportsConfig {
    /// Write executed trades to this CSV file.
    pub trade_log: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_server_id() -> String {
    "EXCHANGE".to_string()
}

fn default_client_id() -> String {
    "CLIENT".to_string()
}

impl Config {
    /// Load from a TOML file. Any failure here is fatal to startup.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config file {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("cannot parse config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// The configured instrument, upper-cased; symbol checks are
    /// case-insensitive.
    pub fn symbol_upper(&self) -> String {
        self.exchange.symbol.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [exchange]
        symbol = "vod.l"
        use_simulation_time = true

        [market_data]
        port = 9880

        [orders]
        bind_addr = "0.0.0.0"
        port = 9881

        [history]
        data_file = "data/vod-2011-03-01.csv"
        replay_delay_ms = 250
    "#;

    #[test]
    fn parses_a_complete_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.symbol_upper(), "VOD.L");
        assert!(config.exchange.use_simulation_time);
        assert_eq!(config.exchange.server_id, "EXCHANGE");
        assert_eq!(config.exchange.client_id, "CLIENT");
        assert_eq!(config.market_data.socket_addr_string(), "127.0.0.1:9880");
        assert_eq!(config.orders.socket_addr_string(), "0.0.0.0:9881");
        assert_eq!(config.history.replay_delay_ms, 250);
        assert!(!config.history.populate);
        assert!(config.reports.trade_log.is_none());
    }

    #[test]
    fn missing_sections_fail_to_parse() {
        let result: Result<Config, _> = toml::from_str("[exchange]\nsymbol = \"X\"\n");
        assert!(result.is_err());
    }
}
