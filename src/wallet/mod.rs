/// Wallet operations
///
/// Each operation is a discrete invocation of the indexer binary against the
/// running server, scoped to a named wallet and authenticated with the same
/// cookie path the server uses. Operations are not long-lived connections;
/// every call pays for its own process.
pub mod parse;

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::HarnessConfig;
use crate::error::{truncate_diagnostic, WalletOpError};
use crate::network::Network;
use crate::services::recovery::{self, StartAttempt};

/// Wallet names are directory names inside the indexer's data dir; keep the
/// charset boring.
pub fn is_valid_wallet_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

struct CmdOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

pub struct WalletCli {
    binary: PathBuf,
    network: Network,
    cookie_path: PathBuf,
    data_dir: PathBuf,
    server_url: String,
}

impl WalletCli {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            binary: config.indexer_binary.clone(),
            network: config.network,
            cookie_path: config.cookie_path(),
            data_dir: config.indexer_data_dir.clone(),
            server_url: config.indexer_url(),
        }
    }

    fn validate(&self, name: &str) -> Result<(), WalletOpError> {
        if is_valid_wallet_name(name) {
            Ok(())
        } else {
            Err(WalletOpError::InvalidName(name.to_string()))
        }
    }

    fn command(&self, wallet: &str, args: &[String]) -> Command {
        let mut command = Command::new(&self.binary);
        if let Some(flag) = self.network.indexer_flag() {
            command.arg(flag);
        }
        command
            .arg("--cookie-file")
            .arg(&self.cookie_path)
            .arg("--data-dir")
            .arg(&self.data_dir)
            .arg("wallet")
            .arg("--name")
            .arg(wallet)
            .arg("--server-url")
            .arg(&self.server_url);
        command.args(args);
        command
    }

    async fn run(&self, wallet: &str, args: &[String]) -> Result<CmdOutput, WalletOpError> {
        let output = self
            .command(wallet, args)
            .output()
            .await
            .map_err(|source| WalletOpError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;
        Ok(CmdOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }

    /// Run an operation, applying the one-shot version-mismatch recovery:
    /// wipe stale on-disk data, recreate the wallet, retry once.
    async fn run_with_recovery(
        &self,
        wallet: &str,
        operation: &'static str,
        args: &[String],
    ) -> Result<CmdOutput, WalletOpError> {
        let mut attempt = StartAttempt::First;
        loop {
            let out = self.run(wallet, args).await?;
            if out.success {
                return Ok(out);
            }
            if recovery::is_version_mismatch(&out.stderr) && attempt.may_recover() {
                log::warn!(
                    "💾 Wallet {} hit incompatible on-disk data; wiping and retrying once",
                    operation
                );
                recovery::wipe_stale_data(&self.data_dir, self.network)?;
                // The wipe took the wallet database with it.
                self.create(wallet).await?;
                attempt = StartAttempt::Recovered;
                continue;
            }
            return Err(WalletOpError::CommandFailed {
                operation,
                stderr: truncate_diagnostic(&out.stderr),
            });
        }
    }

    /// Create the named wallet. "Already exists" is success, so calling this
    /// twice is safe.
    pub async fn create(&self, wallet: &str) -> Result<(), WalletOpError> {
        self.validate(wallet)?;
        let mut attempt = StartAttempt::First;
        loop {
            let out = self.run(wallet, &["create".to_string()]).await?;
            if out.success {
                log::info!("✅ Created wallet '{}'", wallet);
                return Ok(());
            }
            if out.stderr.contains("already exists") {
                log::debug!("Wallet '{}' already exists", wallet);
                return Ok(());
            }
            if recovery::is_version_mismatch(&out.stderr) && attempt.may_recover() {
                log::warn!("💾 Wallet create hit incompatible on-disk data; wiping and retrying once");
                recovery::wipe_stale_data(&self.data_dir, self.network)?;
                attempt = StartAttempt::Recovered;
                continue;
            }
            return Err(WalletOpError::CommandFailed {
                operation: "create",
                stderr: truncate_diagnostic(&out.stderr),
            });
        }
    }

    pub async fn receive_address(&self, wallet: &str) -> Result<String, WalletOpError> {
        self.validate(wallet)?;
        let out = self
            .run_with_recovery(wallet, "receive", &["receive".to_string()])
            .await?;
        parse::address(&out.stdout, self.network).ok_or_else(|| WalletOpError::Unparseable {
            what: "address",
            output: truncate_diagnostic(&out.stdout),
        })
    }

    /// Spendable balance in minimal units.
    pub async fn balance(&self, wallet: &str) -> Result<u64, WalletOpError> {
        self.validate(wallet)?;
        let out = self
            .run_with_recovery(wallet, "balance", &["balance".to_string()])
            .await?;
        parse::balance(&out.stdout).ok_or_else(|| WalletOpError::Unparseable {
            what: "balance",
            output: truncate_diagnostic(&out.stdout),
        })
    }

    /// Publish a file as an inscription and return the assigned id.
    pub async fn inscribe(
        &self,
        wallet: &str,
        file: &Path,
        fee_rate: u64,
    ) -> Result<String, WalletOpError> {
        self.validate(wallet)?;
        let args = vec![
            "inscribe".to_string(),
            "--fee-rate".to_string(),
            fee_rate.to_string(),
            "--file".to_string(),
            file.display().to_string(),
        ];
        let out = self.run_with_recovery(wallet, "inscribe", &args).await?;
        parse::inscription_id(&out.stdout).ok_or_else(|| WalletOpError::Unparseable {
            what: "inscription id",
            output: truncate_diagnostic(&out.stdout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_wallet_names() {
        for name in ["ord", "my-wallet", "wallet_2", "A1", "0", "a-b_c-9"] {
            assert!(is_valid_wallet_name(name), "{:?} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_wallet_names() {
        for name in [
            "", " ", "   ", "my wallet", "a@b", "a/b", "a.b", "a:b", "a\\b",
        ] {
            assert!(!is_valid_wallet_name(name), "{:?} should be invalid", name);
        }
    }
}
