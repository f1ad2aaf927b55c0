/// Harness configuration from environment variables
///
/// Network, binary locations, data directories and ports all come from the
/// environment (optionally a .env file), never from per-command arguments.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::network::Network;
use crate::retry::RetryPolicy;

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub network: Network,
    /// Node binary to spawn.
    pub node_binary: PathBuf,
    /// Indexer binary, used both for the server process and for the
    /// discrete wallet invocations.
    pub indexer_binary: PathBuf,
    pub node_data_dir: PathBuf,
    pub indexer_data_dir: PathBuf,
    pub rpc_port: u16,
    /// Indexer HTTP port (block-height + content endpoints).
    pub http_port: u16,
    /// Where the harness keeps its own persisted state.
    pub state_dir: PathBuf,
    pub node_ready: RetryPolicy,
    pub indexer_ready: RetryPolicy,
    /// Budget for the pre-publish index synchronization barrier.
    pub sync: RetryPolicy,
    pub node_stop_grace: Duration,
    pub indexer_stop_grace: Duration,
    /// Whether to attempt reclaiming the indexer port from orphaned
    /// prior-session processes before spawning.
    pub reclaim_orphans: bool,
}

impl HarnessConfig {
    /// Load configuration from environment variables
    ///
    /// - `HARNESS_NETWORK`: "regtest" (default), "testnet", "signet", "mainnet"
    /// - `BITCOIND_PATH` / `ORD_PATH`: binary locations (default: on $PATH)
    /// - `BITCOIN_DATADIR`: node data directory (default: ~/.bitcoin)
    /// - `ORD_DATADIR`: indexer data directory (default: platform data dir + "ord")
    /// - `RPC_PORT`: node RPC port (default: per-network standard port)
    /// - `ORD_HTTP_PORT`: indexer HTTP port (default: 8080)
    /// - `HARNESS_STATE_DIR`: harness state directory (default: platform data dir + "ord-harness")
    pub fn from_env() -> Self {
        let network = match env::var("HARNESS_NETWORK") {
            Ok(raw) => raw.parse::<Network>().unwrap_or_else(|e| {
                log::warn!("{}; defaulting to regtest", e);
                Network::Regtest
            }),
            Err(_) => Network::Regtest,
        };
        log::info!("🔧 Using {} network", network);

        let node_binary = env_path("BITCOIND_PATH").unwrap_or_else(|| PathBuf::from("bitcoind"));
        let indexer_binary = env_path("ORD_PATH").unwrap_or_else(|| PathBuf::from("ord"));

        let node_data_dir = env_path("BITCOIN_DATADIR").unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".bitcoin")
        });
        let indexer_data_dir =
            env_path("ORD_DATADIR").unwrap_or_else(|| default_data_dir().join("ord"));
        let state_dir =
            env_path("HARNESS_STATE_DIR").unwrap_or_else(|| default_data_dir().join("ord-harness"));

        let rpc_port = env_port("RPC_PORT").unwrap_or_else(|| network.default_rpc_port());
        let http_port = env_port("ORD_HTTP_PORT").unwrap_or(8080);

        Self {
            network,
            node_binary,
            indexer_binary,
            node_data_dir,
            indexer_data_dir,
            rpc_port,
            http_port,
            state_dir,
            node_ready: RetryPolicy::seconds(30),
            indexer_ready: RetryPolicy::seconds(60),
            sync: RetryPolicy::seconds(60),
            node_stop_grace: Duration::from_secs(10),
            indexer_stop_grace: Duration::from_secs(5),
            reclaim_orphans: true,
        }
    }

    pub fn rpc_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.rpc_port)
    }

    pub fn indexer_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }

    /// Path of the node's authentication cookie for the active network.
    pub fn cookie_path(&self) -> PathBuf {
        self.network.cookie_path(&self.node_data_dir)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_port(key: &str) -> Option<u16> {
    let raw = env::var(key).ok()?;
    match raw.parse::<u16>() {
        Ok(port) => Some(port),
        Err(_) => {
            log::warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports_follow_network() {
        assert_eq!(Network::Regtest.default_rpc_port(), 18443);
        assert_eq!(Network::Mainnet.default_rpc_port(), 8332);
    }

    #[test]
    fn test_cookie_path_uses_network_subdir() {
        let config = HarnessConfig {
            network: Network::Regtest,
            node_binary: PathBuf::from("bitcoind"),
            indexer_binary: PathBuf::from("ord"),
            node_data_dir: PathBuf::from("/data/btc"),
            indexer_data_dir: PathBuf::from("/data/ord"),
            rpc_port: 18443,
            http_port: 8080,
            state_dir: PathBuf::from("/data/state"),
            node_ready: RetryPolicy::seconds(30),
            indexer_ready: RetryPolicy::seconds(60),
            sync: RetryPolicy::seconds(60),
            node_stop_grace: Duration::from_secs(10),
            indexer_stop_grace: Duration::from_secs(5),
            reclaim_orphans: false,
        };
        assert_eq!(
            config.cookie_path(),
            PathBuf::from("/data/btc/regtest/.cookie")
        );
        assert_eq!(config.rpc_url(), "http://127.0.0.1:18443");
    }
}
