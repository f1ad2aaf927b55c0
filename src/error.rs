use thiserror::Error;

use crate::network::Network;

/// How much captured stderr an error value may carry.
pub const STDERR_ERROR_LIMIT: usize = 2048;

/// Truncate diagnostic text for inclusion in an error value.
pub fn truncate_diagnostic(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_ERROR_LIMIT {
        return trimmed.to_string();
    }
    let mut cut = STDERR_ERROR_LIMIT;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated)", &trimmed[..cut])
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Cookie file not found at {0} - is the node running?")]
    CookieNotFound(String),

    #[error("Failed to read cookie file: {0}")]
    CookieUnreadable(#[source] std::io::Error),

    #[error("RPC transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Failed to spawn {service}: {source}")]
    Spawn {
        service: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{service} exited before becoming ready: {stderr}")]
    StartFailed {
        service: &'static str,
        stderr: String,
    },

    #[error("{service} did not become ready after {attempts} attempts; leaving the process running for inspection")]
    ReadyTimeout {
        service: &'static str,
        attempts: u32,
    },

    #[error("Port {port} is in use but does not answer node RPC; refusing to adopt the listener")]
    PortBusy { port: u16 },

    #[error("Cookie not found at {path} - is the node running?")]
    CookieMissing { path: String },

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum WalletOpError {
    #[error("Invalid wallet name: {0:?} (allowed: letters, digits, '-', '_')")]
    InvalidName(String),

    #[error("Failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("wallet {operation} failed: {stderr}")]
    CommandFailed {
        operation: &'static str,
        stderr: String,
    },

    #[error("Could not parse {what} from wallet output: {output}")]
    Unparseable {
        what: &'static str,
        output: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Workflow failures carry the phase that failed so the caller can show
/// step-specific context instead of a generic error.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Failed to start node: {0}")]
    NodeStart(#[source] ServiceError),

    #[error("Failed to start indexer: {0}")]
    IndexerStart(#[source] ServiceError),

    #[error("Failed to stop services: {0}")]
    Stop(#[source] ServiceError),

    #[error("Indexer is unhealthy after restart: {0}")]
    Unhealthy(String),

    #[error("Mining is only available on regtest (current network: {0})")]
    MiningNotAllowed(Network),

    #[error("Failed to resolve a mining address: {0}")]
    MiningAddress(String),

    #[error("Wallet setup failed: {0}")]
    WalletSetup(#[source] WalletOpError),

    #[error("Wallet operation failed: {0}")]
    Wallet(#[source] WalletOpError),

    #[error("Indexer did not catch up to node height {node_height} (last seen {indexer_height}); publishing would race the index")]
    SyncTimeout {
        node_height: u64,
        indexer_height: u64,
    },

    #[error("Publish failed: {0}")]
    Publish(#[source] WalletOpError),

    #[error("Confirmation failed: {0}")]
    Confirm(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("State error: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_diagnostic("  boom  "), "boom");
    }

    #[test]
    fn test_truncate_long_text() {
        let long = "x".repeat(STDERR_ERROR_LIMIT + 100);
        let out = truncate_diagnostic(&long);
        assert!(out.ends_with("(truncated)"));
        assert!(out.len() < long.len());
    }
}
