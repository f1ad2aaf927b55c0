/// Indexer lifecycle
///
/// The indexer has a hard dependency on the node's cookie file and refuses
/// on-disk state written by an incompatible version. Start therefore runs a
/// small state machine: precondition check, best-effort port reclaim, spawn
/// with stderr classification, functional readiness, and at most one
/// wipe-and-retry recovery pass.
use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;

use crate::config::HarnessConfig;
use crate::error::{truncate_diagnostic, ServiceError};
use crate::health::fetch_block_count;
use crate::network::Network;
use crate::process::ServiceProcess;
use crate::retry::RetryPolicy;
use crate::services::recovery::{self, StartAttempt};

const SERVICE: &str = "ord";

pub struct IndexerService {
    binary: PathBuf,
    network: Network,
    cookie_path: PathBuf,
    data_dir: PathBuf,
    http_port: u16,
    ready: RetryPolicy,
    stop_grace: Duration,
    reclaim_orphans: bool,
    http: reqwest::Client,
    process: Option<ServiceProcess>,
}

/// Internal start outcome separating "recoverable mismatch" from everything
/// else, so the attempt machine in `start` stays flat.
enum StartFailure {
    VersionMismatch { stderr: String },
    Fatal(ServiceError),
}

impl IndexerService {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            binary: config.indexer_binary.clone(),
            network: config.network,
            cookie_path: config.cookie_path(),
            data_dir: config.indexer_data_dir.clone(),
            http_port: config.http_port,
            ready: config.indexer_ready,
            stop_grace: config.indexer_stop_grace,
            reclaim_orphans: config.reclaim_orphans,
            http: reqwest::Client::new(),
            process: None,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }

    pub fn is_running(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => {
                if process.is_alive() {
                    true
                } else {
                    self.process = None;
                    false
                }
            }
            None => false,
        }
    }

    /// Start the indexer and wait until its index answers queries. A death
    /// classified as a version mismatch wipes stale on-disk state and
    /// retries exactly once; the attempt machine makes looping impossible.
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        let mut attempt = StartAttempt::First;
        loop {
            match self.try_start().await {
                Ok(()) => return Ok(()),
                Err(StartFailure::VersionMismatch { stderr }) => {
                    if attempt.may_recover() {
                        log::warn!(
                            "💾 Indexer data is from an incompatible version; wiping and rebuilding"
                        );
                        recovery::wipe_stale_data(&self.data_dir, self.network)?;
                        attempt = StartAttempt::Recovered;
                        continue;
                    }
                    return Err(ServiceError::StartFailed {
                        service: SERVICE,
                        stderr,
                    });
                }
                Err(StartFailure::Fatal(e)) => return Err(e),
            }
        }
    }

    async fn try_start(&mut self) -> Result<(), StartFailure> {
        if self.is_running() {
            log::debug!("{} already running", SERVICE);
            return Ok(());
        }

        // Precondition, not something to poll for: the cookie only exists
        // once the node is up, and the caller is responsible for that order.
        if !self.cookie_path.exists() {
            return Err(StartFailure::Fatal(ServiceError::CookieMissing {
                path: self.cookie_path.display().to_string(),
            }));
        }

        if self.reclaim_orphans {
            reclaim_port(self.http_port).await;
        }

        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| StartFailure::Fatal(ServiceError::Io(e)))?;

        let mut command = Command::new(&self.binary);
        if let Some(flag) = self.network.indexer_flag() {
            command.arg(flag);
        }
        command
            .arg("--cookie-file")
            .arg(&self.cookie_path)
            .arg("--data-dir")
            .arg(&self.data_dir)
            .arg("server")
            .arg("--http-port")
            .arg(self.http_port.to_string());

        let process = ServiceProcess::spawn(SERVICE, command, Some(recovery::is_version_mismatch))
            .map_err(|source| {
                StartFailure::Fatal(ServiceError::Spawn {
                    service: SERVICE,
                    source,
                })
            })?;
        self.process = Some(process);

        self.wait_until_ready().await
    }

    /// Ready means `/blockcount` answers with a parseable height - the
    /// process being alive is not enough, since it listens before its
    /// catch-up pass completes.
    async fn wait_until_ready(&mut self) -> Result<(), StartFailure> {
        let base_url = self.base_url();
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
                    let mismatch = process.stderr_flagged();
                    return Err(if mismatch {
                        StartFailure::VersionMismatch { stderr }
                    } else {
                        StartFailure::Fatal(ServiceError::StartFailed {
                            service: SERVICE,
                            stderr,
                        })
                    });
                }
            }

            if let Some(height) = fetch_block_count(&self.http, &base_url).await {
                log::info!(
                    "✅ {} ready at height {} after {} attempt(s)",
                    SERVICE,
                    height,
                    attempt
                );
                return Ok(());
            }

            if attempt < self.ready.max_attempts {
                tokio::time::sleep(self.ready.interval).await;
            }
        }

        // Alive but not serving; leave it running for diagnosis.
        Err(StartFailure::Fatal(ServiceError::ReadyTimeout {
            service: SERVICE,
            attempts: self.ready.max_attempts,
        }))
    }

    /// Signal-then-kill stop with a shorter grace than the node: the indexer
    /// has little state to flush on the way down.
    pub async fn stop(&mut self) -> Result<(), ServiceError> {
        let Some(process) = self.process.take() else {
            log::debug!("{} not running; nothing to stop", SERVICE);
            return Ok(());
        };
        process.stop(self.stop_grace).await?;
        Ok(())
    }
}

/// Best-effort reclaim of the listen port from orphaned prior-session
/// processes. Failure is logged, never raised.
#[cfg(unix)]
async fn reclaim_port(port: u16) {
    match Command::new("fuser")
        .arg("-k")
        .arg(format!("{}/tcp", port))
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            log::info!("Reclaimed port {} from an orphaned process", port);
        }
        Ok(_) => log::trace!("No orphaned listener on port {}", port),
        Err(e) => log::debug!("Port reclaim unavailable: {}", e),
    }
}

#[cfg(not(unix))]
async fn reclaim_port(port: u16) {
    log::trace!("Port reclaim not supported on this platform (port {})", port);
}
