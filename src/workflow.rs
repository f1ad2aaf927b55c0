/// Workflow orchestration
///
/// Sequences the two service managers, the RPC client and the wallet CLI
/// into the user-facing operations: start/stop both services, fund by
/// mining, and publish content end to end. All steps are sequential; no two
/// operations run concurrently against the same service.
use std::path::Path;
use std::time::Duration;

use chrono::Utc;

use crate::config::HarnessConfig;
use crate::error::{StorageError, WalletOpError, WorkflowError};
use crate::health::{self, IndexerHealth};
use crate::retry::{wait_until, PollOutcome, RetryPolicy, WaitError};
use crate::rpc::RpcClient;
use crate::services::indexer::IndexerService;
use crate::services::node::NodeService;
use crate::services::recovery;
use crate::storage::{InscriptionRecord, SessionStore};
use crate::wallet::{is_valid_wallet_name, WalletCli};

/// Confirmations a coinbase reward needs before it is spendable.
pub const COINBASE_MATURITY: u64 = 100;

/// Below this spendable balance (minimal units) a regtest wallet is
/// auto-funded before publishing.
pub const MIN_FUNDING_SATS: u64 = 10_000;

/// Fallback wallet used when the active wallet cannot produce a mining
/// address.
pub const MINING_WALLET: &str = "ord-harness-mining";

pub struct Orchestrator {
    config: HarnessConfig,
    node: NodeService,
    indexer: IndexerService,
    rpc: RpcClient,
    wallet: WalletCli,
    store: SessionStore,
    http: reqwest::Client,
}

impl Orchestrator {
    pub fn new(config: HarnessConfig) -> Self {
        let node = NodeService::new(&config);
        let indexer = IndexerService::new(&config);
        let rpc = RpcClient::new(config.rpc_url(), config.cookie_path());
        let wallet = WalletCli::new(&config);
        let store = SessionStore::new(config.state_dir.clone());
        Self {
            config,
            node,
            indexer,
            rpc,
            wallet,
            store,
            http: reqwest::Client::new(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Start node then indexer, then run the cross-service health check.
    /// An unhealthy indexer is restarted once: the node may have rotated
    /// its cookie while the indexer held the stale one. This is distinct
    /// from the on-disk version-mismatch recovery inside the indexer
    /// manager, which addresses schema incompatibility, not a live
    /// credential race.
    pub async fn start_services(&mut self) -> Result<(), WorkflowError> {
        self.node
            .start(&self.rpc)
            .await
            .map_err(WorkflowError::NodeStart)?;
        self.indexer
            .start()
            .await
            .map_err(WorkflowError::IndexerStart)?;

        match health::check_indexer(&self.http, &self.indexer.base_url()).await {
            IndexerHealth::Healthy { block_count } => {
                log::info!("✅ Services up (index at height {})", block_count);
                Ok(())
            }
            IndexerHealth::Unhealthy { reason } => {
                log::warn!(
                    "🔁 Indexer unhealthy ({}); restarting it once in case it holds a stale cookie",
                    reason
                );
                self.indexer.stop().await.map_err(WorkflowError::Stop)?;
                self.indexer
                    .start()
                    .await
                    .map_err(WorkflowError::IndexerStart)?;
                match health::check_indexer(&self.http, &self.indexer.base_url()).await {
                    IndexerHealth::Healthy { block_count } => {
                        log::info!("✅ Indexer healthy after restart (height {})", block_count);
                        Ok(())
                    }
                    IndexerHealth::Unhealthy { reason } => Err(WorkflowError::Unhealthy(reason)),
                }
            }
        }
    }

    /// Reverse of startup order: the dependent service releases its
    /// connection before its dependency disappears.
    pub async fn stop_services(&mut self) -> Result<(), WorkflowError> {
        self.indexer.stop().await.map_err(WorkflowError::Stop)?;
        self.node
            .stop(&self.rpc)
            .await
            .map_err(WorkflowError::Stop)?;
        log::info!("✅ Services stopped");
        Ok(())
    }

    /// Mine `count` blocks directly through the node, bypassing the
    /// indexer. Refused on anything but regtest before any RPC is issued.
    pub async fn mine_blocks(&mut self, count: u64) -> Result<u64, WorkflowError> {
        if !self.config.network.allows_mining() {
            return Err(WorkflowError::MiningNotAllowed(self.config.network));
        }
        let address = self.mining_address().await?;
        log::info!("⛏️  Mining {} block(s) to {}", count, address);
        self.rpc.generate_to_address(count, &address).await?;
        Ok(self.rpc.get_block_count().await?)
    }

    /// Prefer the active wallet's own address; fall back to a dedicated
    /// node-side mining wallet when it cannot produce one.
    async fn mining_address(&mut self) -> Result<String, WorkflowError> {
        let wallet = self.store.current_wallet()?;
        match self.wallet.receive_address(&wallet).await {
            Ok(address) => Ok(address),
            Err(e) => {
                log::warn!(
                    "Active wallet could not produce an address ({}); using the dedicated mining wallet",
                    e
                );
                self.rpc.create_wallet(MINING_WALLET).await?;
                self.rpc.load_wallet(MINING_WALLET).await?;
                self.rpc
                    .get_new_address(MINING_WALLET)
                    .await
                    .map_err(|e| WorkflowError::MiningAddress(e.to_string()))
            }
        }
    }

    /// Bootstrap an empty wallet from zero: the first spendable coinbase
    /// needs maturity confirmations on top of its own block.
    pub async fn fund_wallet(&mut self) -> Result<u64, WorkflowError> {
        self.mine_blocks(COINBASE_MATURITY + 1).await
    }

    /// Publish a file end to end: ensure services, ensure a funded wallet,
    /// wait for the index to catch up, inscribe, record, confirm.
    pub async fn publish(
        &mut self,
        file: &Path,
        fee_rate: u64,
    ) -> Result<InscriptionRecord, WorkflowError> {
        if !self.node.is_running() || !self.indexer.is_running() {
            log::info!("Services not running; starting them first");
            self.start_services().await?;
        }

        let wallet = self.store.current_wallet()?;
        self.wallet
            .create(&wallet)
            .await
            .map_err(WorkflowError::WalletSetup)?;

        if self.config.network.allows_mining() {
            let balance = self
                .wallet
                .balance(&wallet)
                .await
                .map_err(WorkflowError::WalletSetup)?;
            if balance < MIN_FUNDING_SATS {
                log::info!(
                    "⛏️  Balance {} below {}; funding wallet '{}' by mining",
                    balance,
                    MIN_FUNDING_SATS,
                    wallet
                );
                self.fund_wallet().await?;
            }
        }

        // Publishing against a lagging index produces "output exists in the
        // wallet but not in the index" symptoms, so this barrier is
        // mandatory before the inscribe call.
        let node_height = self.rpc.get_block_count().await?;
        self.wait_for_indexer_sync(node_height).await?;

        let inscription_id = self
            .wallet
            .inscribe(&wallet, file, fee_rate)
            .await
            .map_err(WorkflowError::Publish)?;
        log::info!("📜 Published {} as {}", file.display(), inscription_id);

        let record = InscriptionRecord {
            inscription_id: inscription_id.clone(),
            source_file: file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string()),
            created_at: Utc::now(),
        };
        self.store.push_inscription(record.clone())?;

        if self.config.network.allows_mining() {
            self.mine_blocks(1)
                .await
                .map_err(|e| WorkflowError::Confirm(e.to_string()))?;
            self.verify_inscription(&inscription_id).await?;
        }

        Ok(record)
    }

    /// Block until the indexer's height reaches the node's, bounded by the
    /// configured sync budget.
    pub async fn wait_for_indexer_sync(&self, node_height: u64) -> Result<u64, WorkflowError> {
        let base_url = self.indexer.base_url();
        let result: Result<u64, WaitError<WorkflowError>> =
            wait_until(&self.config.sync, |_| {
                let http = self.http.clone();
                let url = base_url.clone();
                async move {
                    match health::fetch_block_count(&http, &url).await {
                        Some(height) if height >= node_height => PollOutcome::Ready(height),
                        _ => PollOutcome::NotYet,
                    }
                }
            })
            .await;

        match result {
            Ok(height) => {
                log::debug!("Index synced at height {}", height);
                Ok(height)
            }
            Err(WaitError::TimedOut { .. }) => {
                let indexer_height = health::fetch_block_count(&self.http, &base_url)
                    .await
                    .unwrap_or(0);
                Err(WorkflowError::SyncTimeout {
                    node_height,
                    indexer_height,
                })
            }
            Err(WaitError::Aborted(e)) => Err(e),
        }
    }

    /// Post-confirmation check: the published content must be retrievable
    /// from the index.
    async fn verify_inscription(&self, inscription_id: &str) -> Result<(), WorkflowError> {
        let url = format!("{}/inscription/{}", self.indexer.base_url(), inscription_id);
        let policy = RetryPolicy::new(Duration::from_millis(500), 10);
        let result: Result<(), WaitError<WorkflowError>> = wait_until(&policy, |_| {
            let http = self.http.clone();
            let url = url.clone();
            async move {
                match http.get(&url).send().await {
                    Ok(response) if response.status().is_success() => PollOutcome::Ready(()),
                    _ => PollOutcome::NotYet,
                }
            }
        })
        .await;

        result.map_err(|_| {
            WorkflowError::Confirm(format!(
                "inscription {} is not visible in the index",
                inscription_id
            ))
        })
    }

    // ------------------------------------------------------------------
    // Wallet surface
    // ------------------------------------------------------------------

    /// Create a wallet (default: the currently selected name) and select it.
    pub async fn create_wallet(&mut self, name: Option<String>) -> Result<String, WorkflowError> {
        let name = match name {
            Some(name) => name,
            None => self.store.current_wallet()?,
        };
        self.wallet
            .create(&name)
            .await
            .map_err(WorkflowError::Wallet)?;
        self.store.set_current_wallet(&name)?;
        Ok(name)
    }

    /// Select a different wallet; the selection persists across sessions.
    pub fn switch_wallet(&mut self, name: &str) -> Result<(), WorkflowError> {
        if !is_valid_wallet_name(name) {
            return Err(WorkflowError::Wallet(WalletOpError::InvalidName(
                name.to_string(),
            )));
        }
        self.store.set_current_wallet(name)?;
        log::info!("Switched to wallet '{}'", name);
        Ok(())
    }

    pub async fn balance(&self) -> Result<u64, WorkflowError> {
        let wallet = self.store.current_wallet()?;
        self.wallet
            .balance(&wallet)
            .await
            .map_err(WorkflowError::Wallet)
    }

    /// Wipe all indexer on-disk state for the active network plus the
    /// publication history. The indexer is stopped first so its files are
    /// released.
    pub async fn reset(&mut self) -> Result<(), WorkflowError> {
        if self.indexer.is_running() {
            self.indexer.stop().await.map_err(WorkflowError::Stop)?;
        }
        let removed = recovery::wipe_stale_data(&self.config.indexer_data_dir, self.config.network)
            .map_err(|e| WorkflowError::Storage(StorageError::Io(e)))?;
        self.store.clear_history()?;
        log::info!("🧹 Reset complete ({} path(s) removed)", removed.len());
        Ok(())
    }
}
