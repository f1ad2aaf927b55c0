/// Node lifecycle
///
/// Owns the blockchain-node child process and a "is it accepting RPC"
/// readiness predicate. An externally-started node on the configured RPC
/// port is adopted rather than treated as a conflict, as long as it answers
/// the chain-status probe.
use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;

use crate::config::HarnessConfig;
use crate::error::{truncate_diagnostic, ServiceError};
use crate::network::Network;
use crate::process::ServiceProcess;
use crate::retry::RetryPolicy;
use crate::rpc::RpcClient;

const SERVICE: &str = "bitcoind";

pub struct NodeService {
    binary: PathBuf,
    network: Network,
    data_dir: PathBuf,
    rpc_port: u16,
    ready: RetryPolicy,
    stop_grace: Duration,
    process: Option<ServiceProcess>,
    /// True when an externally-started node was adopted; we hold no process
    /// handle for it.
    adopted: bool,
}

impl NodeService {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            binary: config.node_binary.clone(),
            network: config.network,
            data_dir: config.node_data_dir.clone(),
            rpc_port: config.rpc_port,
            ready: config.node_ready,
            stop_grace: config.node_stop_grace,
            process: None,
            adopted: false,
        }
    }

    pub fn is_running(&mut self) -> bool {
        if self.adopted {
            return true;
        }
        match self.process.as_mut() {
            Some(process) => {
                if process.is_alive() {
                    true
                } else {
                    // Exited behind our back; discard the stale handle.
                    self.process = None;
                    false
                }
            }
            None => false,
        }
    }

    /// Start the node and wait until it answers RPC.
    pub async fn start(&mut self, rpc: &RpcClient) -> Result<(), ServiceError> {
        if self.is_running() {
            log::debug!("{} already running", SERVICE);
            return Ok(());
        }

        // Pre-check: somebody may already be listening on the RPC port.
        if port_has_listener(self.rpc_port).await {
            return match rpc.get_blockchain_info().await {
                Ok(_) => {
                    log::info!(
                        "✅ Adopting externally-started {} on port {}",
                        SERVICE,
                        self.rpc_port
                    );
                    self.adopted = true;
                    Ok(())
                }
                Err(e) => {
                    log::debug!("Port {} probe failed: {}", self.rpc_port, e);
                    Err(ServiceError::PortBusy {
                        port: self.rpc_port,
                    })
                }
            };
        }

        std::fs::create_dir_all(&self.data_dir)?;

        let mut command = Command::new(&self.binary);
        if let Some(flag) = self.network.node_flag() {
            command.arg(flag);
        }
        command
            .arg(format!("-datadir={}", self.data_dir.display()))
            .arg(format!("-rpcport={}", self.rpc_port))
            .arg("-server=1")
            .arg("-txindex=1");
        if self.network == Network::Regtest {
            command.arg("-fallbackfee=0.0001");
        }

        let process =
            ServiceProcess::spawn(SERVICE, command, None).map_err(|source| ServiceError::Spawn {
                service: SERVICE,
                source,
            })?;
        self.process = Some(process);

        self.wait_until_ready(rpc).await
    }

    /// Poll the chain-status call until it succeeds. A crash fails
    /// immediately; an exhausted budget leaves the process running for
    /// diagnosis and fails with a distinct timeout error.
    async fn wait_until_ready(&mut self, rpc: &RpcClient) -> Result<(), ServiceError> {
        for attempt in 1..=self.ready.max_attempts {
            let alive = self
                .process
                .as_mut()
                .map(|process| process.is_alive())
                .unwrap_or(false);
            if !alive {
                if let Some(mut process) = self.process.take() {
                    process.drain_output().await;
                    let stderr = truncate_diagnostic(&process.stderr_tail());
                    return Err(ServiceError::StartFailed {
                        service: SERVICE,
                        stderr,
                    });
                }
            }

            match rpc.get_blockchain_info().await {
                Ok(_) => {
                    log::info!("✅ {} ready after {} attempt(s)", SERVICE, attempt);
                    return Ok(());
                }
                Err(e) => log::trace!("{} not ready yet (attempt {}): {}", SERVICE, attempt, e),
            }

            if attempt < self.ready.max_attempts {
                tokio::time::sleep(self.ready.interval).await;
            }
        }

        Err(ServiceError::ReadyTimeout {
            service: SERVICE,
            attempts: self.ready.max_attempts,
        })
    }

    /// Stop the node: graceful RPC `stop` first, then the signal-and-grace
    /// join on the process handle. No-op when nothing is running.
    pub async fn stop(&mut self, rpc: &RpcClient) -> Result<(), ServiceError> {
        if self.adopted {
            // We never held a handle; a graceful RPC stop is all we can do.
            if let Err(e) = rpc.stop().await {
                log::warn!("Adopted {} did not accept stop: {}", SERVICE, e);
            }
            self.adopted = false;
            return Ok(());
        }

        let Some(process) = self.process.take() else {
            log::debug!("{} not running; nothing to stop", SERVICE);
            return Ok(());
        };

        if let Err(e) = rpc.stop().await {
            log::debug!("RPC stop failed ({}); falling back to signal", e);
        }
        process.stop(self.stop_grace).await?;
        Ok(())
    }
}

async fn port_has_listener(port: u16) -> bool {
    tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .is_ok()
}
