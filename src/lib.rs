/// ord-harness
///
/// Coordinates a Bitcoin full node and the ord inscription indexer into a
/// local development workflow: ordered startup with readiness detection,
/// recovery from stale on-disk state, and an end-to-end
/// fund/sync/publish/confirm pipeline.
pub mod config;
pub mod diagnose;
pub mod error;
pub mod health;
pub mod network;
pub mod process;
pub mod retry;
pub mod rpc;
pub mod services;
pub mod storage;
pub mod wallet;
pub mod workflow;

pub use config::HarnessConfig;
pub use error::{RpcError, ServiceError, StorageError, WalletOpError, WorkflowError};
pub use network::Network;
pub use workflow::Orchestrator;
